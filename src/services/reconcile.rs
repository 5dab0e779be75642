//! Reconciles a submitted event list against the stored one.
//!
//! The submitted list is authoritative for order and content. Stored events
//! contribute their authorship metadata and votes: `createdBy`/`createdAt`
//! and the like/dislike lists are carried over on every match, and
//! `updatedBy`/`updatedAt` are carried over when none of the visible fields
//! changed.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    error::AppError,
    models::{
        event::{Event, EventStatus},
        user::UserSnapshot,
    },
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldChange {
    pub field: &'static str,
    pub old: Option<String>,
    pub new: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EventDiff {
    Created(Event),
    Updated {
        before: Event,
        after: Event,
        changes: Vec<FieldChange>,
    },
    Deleted(Event),
}

impl EventDiff {
    pub fn event_id(&self) -> &str {
        match self {
            EventDiff::Created(event) | EventDiff::Deleted(event) => &event.id,
            EventDiff::Updated { after, .. } => &after.id,
        }
    }

    pub fn is_delete(&self) -> bool {
        matches!(self, EventDiff::Deleted(_))
    }

    pub fn changed_fields(&self) -> Vec<&'static str> {
        match self {
            EventDiff::Updated { changes, .. } => changes.iter().map(|c| c.field).collect(),
            _ => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Reconciliation {
    pub merged_events: Vec<Event>,
    pub diffs: Vec<EventDiff>,
}

/// Rejects event lists the reconciler cannot interpret unambiguously.
pub fn validate_events(events: &[Event]) -> Result<(), AppError> {
    let mut seen = HashSet::with_capacity(events.len());
    for event in events {
        if event.id.trim().is_empty() {
            return Err(AppError::bad_request("event id must not be empty"));
        }
        if !seen.insert(event.id.as_str()) {
            return Err(AppError::bad_request(format!(
                "duplicate event id {}",
                event.id
            )));
        }
        if let (Some(start), Some(end)) = (event.date, event.end_date) {
            if end < start {
                return Err(AppError::bad_request(format!(
                    "event {} ends before it starts",
                    event.id
                )));
            }
        }
    }
    Ok(())
}

pub fn reconcile(
    old_events: &[Event],
    new_events: Vec<Event>,
    actor: &UserSnapshot,
    now: DateTime<Utc>,
) -> Reconciliation {
    let previous: HashMap<&str, &Event> = old_events.iter().map(|e| (e.id.as_str(), e)).collect();
    let mut diffs = Vec::new();
    let mut merged_events = Vec::with_capacity(new_events.len());

    for mut event in new_events {
        match previous.get(event.id.as_str()) {
            Some(&before) => {
                event.created_by = before.created_by.clone();
                event.created_at = before.created_at;
                // Votes change only through `apply_vote`.
                event.likes = before.likes.clone();
                event.dislikes = before.dislikes.clone();

                let changes = field_changes(before, &event);
                if changes.is_empty() {
                    event.updated_by = before.updated_by.clone();
                    event.updated_at = before.updated_at;
                } else {
                    event.updated_by = Some(actor.clone());
                    event.updated_at = Some(now);
                    diffs.push(EventDiff::Updated {
                        before: before.clone(),
                        after: event.clone(),
                        changes,
                    });
                }
            }
            None => {
                event.likes.clear();
                event.dislikes.clear();
                event.created_by = Some(actor.clone());
                event.created_at = Some(now);
                event.updated_by = Some(actor.clone());
                event.updated_at = Some(now);
                diffs.push(EventDiff::Created(event.clone()));
            }
        }
        merged_events.push(event);
    }

    let kept: HashSet<&str> = merged_events.iter().map(|e| e.id.as_str()).collect();
    diffs.extend(
        old_events
            .iter()
            .filter(|e| !kept.contains(e.id.as_str()))
            .cloned()
            .map(EventDiff::Deleted),
    );

    Reconciliation {
        merged_events,
        diffs,
    }
}

fn field_changes(before: &Event, after: &Event) -> Vec<FieldChange> {
    let old_fields: HashMap<&'static str, Option<String>> =
        before.visible_fields().into_iter().collect();

    after
        .visible_fields()
        .into_iter()
        .filter_map(|(field, new)| {
            let old = old_fields.get(field).cloned().flatten();
            (old != new).then_some(FieldChange { field, old, new })
        })
        .chain(dropped_fields(before, after))
        .collect()
}

/// Fields that only exist on the old variant, for events whose type changed.
fn dropped_fields(before: &Event, after: &Event) -> Vec<FieldChange> {
    if before.kind() == after.kind() {
        return Vec::new();
    }
    let current: HashSet<&'static str> = after.visible_fields().into_iter().map(|(f, _)| f).collect();
    before
        .visible_fields()
        .into_iter()
        .filter(|(field, value)| value.is_some() && !current.contains(field))
        .map(|(field, old)| FieldChange {
            field,
            old,
            new: None,
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Vote {
    Like,
    Dislike,
    Remove,
}

/// Records `user_id`'s vote on an exploring event, replacing any earlier vote.
pub fn apply_vote(event: &mut Event, user_id: &str, vote: Vote) -> Result<(), AppError> {
    if event.status != EventStatus::Exploring {
        return Err(AppError::bad_request(
            "only exploring events can be voted on",
        ));
    }
    event.likes.retain(|id| id != user_id);
    event.dislikes.retain(|id| id != user_id);
    match vote {
        Vote::Like => event.likes.push(user_id.to_string()),
        Vote::Dislike => event.dislikes.push(user_id.to_string()),
        Vote::Remove => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::event::{EventDetails, FlightDetails, StayDetails};
    use chrono::{Duration, TimeZone};

    fn actor(id: &str) -> UserSnapshot {
        UserSnapshot {
            id: id.into(),
            name: id.to_uppercase(),
            email: format!("{id}@example.com"),
        }
    }

    fn stay(id: &str, notes: &str) -> Event {
        let mut event = Event::new(id, EventDetails::Stay(StayDetails::default()));
        event.notes = Some(notes.into());
        event
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 1, 9, 0, 0).unwrap()
    }

    fn stored(events: Vec<Event>) -> Vec<Event> {
        reconcile(&[], events, &actor("origin"), t0()).merged_events
    }

    #[test]
    fn notes_change_yields_single_update_diff() {
        let old = stored(vec![stay("a", "old")]);
        let later = t0() + Duration::hours(1);
        let result = reconcile(&old, vec![stay("a", "new")], &actor("u"), later);

        assert_eq!(result.diffs.len(), 1);
        assert_eq!(result.diffs[0].changed_fields(), vec!["notes"]);
        let merged = &result.merged_events[0];
        assert_eq!(merged.notes.as_deref(), Some("new"));
        assert_eq!(merged.updated_by, Some(actor("u")));
        assert_eq!(merged.updated_at, Some(later));
        assert_eq!(merged.created_by, Some(actor("origin")));
        assert_eq!(merged.created_at, Some(t0()));
    }

    #[test]
    fn missing_ids_are_deleted() {
        let old = stored(vec![stay("a", "x")]);
        let result = reconcile(&old, Vec::new(), &actor("u"), t0());

        assert!(result.merged_events.is_empty());
        assert_eq!(result.diffs.len(), 1);
        assert!(result.diffs[0].is_delete());
        assert_eq!(result.diffs[0].event_id(), "a");
    }

    #[test]
    fn new_ids_are_created_with_actor_as_author() {
        let flight = Event::new(
            "b",
            EventDetails::Flight(FlightDetails {
                airline: Some("X".into()),
                ..Default::default()
            }),
        );
        let result = reconcile(&[], vec![flight], &actor("u"), t0());

        assert!(matches!(result.diffs.as_slice(), [EventDiff::Created(_)]));
        let merged = &result.merged_events[0];
        assert_eq!(merged.created_by, Some(actor("u")));
        assert_eq!(merged.created_by, merged.updated_by);
        assert_eq!(merged.created_at, merged.updated_at);
    }

    #[test]
    fn identical_lists_are_a_no_op() {
        let events = stored(vec![stay("a", "x"), stay("b", "y")]);
        let result = reconcile(&events, events.clone(), &actor("u"), t0() + Duration::days(1));

        assert!(result.diffs.is_empty());
        assert_eq!(result.merged_events, events);
    }

    #[test]
    fn empty_string_and_missing_notes_are_equal() {
        let mut before = stay("a", "");
        before.notes = None;
        let old = stored(vec![before]);
        let result = reconcile(&old, vec![stay("a", "")], &actor("u"), t0());
        assert!(result.diffs.is_empty());
    }

    #[test]
    fn merged_order_follows_submission() {
        let old = stored(vec![stay("a", "1"), stay("b", "2"), stay("c", "3")]);
        let submitted = vec![stay("c", "3"), stay("d", "4"), stay("a", "1")];
        let result = reconcile(&old, submitted, &actor("u"), t0());

        let ids: Vec<_> = result.merged_events.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "d", "a"]);
        let deleted: Vec<_> = result
            .diffs
            .iter()
            .filter(|d| d.is_delete())
            .map(|d| d.event_id())
            .collect();
        assert_eq!(deleted, vec!["b"]);
    }

    #[test]
    fn client_cannot_rewrite_authorship() {
        let old = stored(vec![stay("a", "old")]);
        let mut forged = stay("a", "new");
        forged.created_by = Some(actor("mallory"));
        forged.created_at = Some(t0() - Duration::days(30));
        let result = reconcile(&old, vec![forged], &actor("u"), t0());

        assert_eq!(result.merged_events[0].created_by, Some(actor("origin")));
        assert_eq!(result.merged_events[0].created_at, Some(t0()));
    }

    #[test]
    fn type_change_reports_tag_and_dropped_fields() {
        let mut flight = Event::new(
            "a",
            EventDetails::Flight(FlightDetails {
                airline: Some("X".into()),
                ..Default::default()
            }),
        );
        flight.notes = Some("n".into());
        let old = stored(vec![flight]);
        let result = reconcile(&old, vec![stay("a", "n")], &actor("u"), t0());

        let fields = result.diffs[0].changed_fields();
        assert!(fields.contains(&"type"));
        assert!(fields.contains(&"airline"));
        assert!(!fields.contains(&"notes"));
    }

    #[test]
    fn submitted_votes_are_ignored() {
        let mut exploring = stay("a", "x");
        exploring.status = EventStatus::Exploring;
        exploring.likes = vec!["ben".into()];
        let old = vec![exploring.clone()];

        let mut resubmitted = exploring.clone();
        resubmitted.likes = vec!["mallory".into()];
        resubmitted.dislikes = vec!["ben".into()];
        let mut fresh = stay("b", "y");
        fresh.likes = vec!["mallory".into()];

        let result = reconcile(&old, vec![resubmitted, fresh], &actor("u"), t0());

        assert_eq!(result.diffs.len(), 1);
        assert!(matches!(&result.diffs[0], EventDiff::Created(e) if e.likes.is_empty()));
        assert_eq!(result.merged_events[0], exploring);
        assert!(result.merged_events[1].likes.is_empty());
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let err = validate_events(&[stay("a", "1"), stay("a", "2")]).unwrap_err();
        assert!(matches!(err, AppError::BadRequest(msg) if msg.contains("a")));
    }

    #[test]
    fn inverted_dates_are_rejected() {
        let mut event = stay("a", "");
        event.date = Some(t0());
        event.end_date = Some(t0() - Duration::hours(2));
        assert!(validate_events(&[event]).is_err());
    }

    #[test]
    fn like_replaces_previous_dislike() {
        let mut event = stay("a", "");
        event.status = EventStatus::Exploring;
        event.dislikes = vec!["u".into(), "v".into()];

        apply_vote(&mut event, "u", Vote::Like).unwrap();
        assert_eq!(event.likes, vec!["u".to_string()]);
        assert_eq!(event.dislikes, vec!["v".to_string()]);

        apply_vote(&mut event, "u", Vote::Like).unwrap();
        assert_eq!(event.likes, vec!["u".to_string()]);

        apply_vote(&mut event, "u", Vote::Remove).unwrap();
        assert!(event.likes.is_empty());
    }

    #[test]
    fn confirmed_events_reject_votes() {
        let mut event = stay("a", "");
        assert!(matches!(
            apply_vote(&mut event, "u", Vote::Dislike),
            Err(AppError::BadRequest(_))
        ));
        assert!(event.dislikes.is_empty());
    }
}
