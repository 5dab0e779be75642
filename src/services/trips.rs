use std::collections::HashMap;

use chrono::Utc;
use serde_json::json;
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    error::AppError,
    models::{
        activity::{ActivityAction, ActivityLogEntry},
        event::{normalize, Event},
        trip::{
            Collaborator, CollaboratorRole, CollaboratorView, NewTrip, Role, Trip, TripPatch,
            TripView,
        },
        user::{UserProfile, UserSnapshot},
    },
    services::{
        access::{require_owner, require_read, require_write, resolve_access},
        activity::{diff_entry, event_label, ActivityLogger},
        reconcile::{apply_vote, reconcile, validate_events, FieldChange, Vote},
        storage::StorageService,
    },
};

const MAX_TRIP_NAME_LEN: usize = 200;

#[derive(Clone)]
pub struct TripService {
    storage: StorageService,
    activity: ActivityLogger,
}

impl TripService {
    pub fn new(storage: StorageService, activity: ActivityLogger) -> Self {
        Self { storage, activity }
    }

    pub async fn create_trip(
        &self,
        actor: &UserSnapshot,
        input: NewTrip,
    ) -> Result<TripView, AppError> {
        let name = validate_name(&input.name)?;
        let mut trip = Trip::new(&actor.id, name);
        trip.description = normalize(&input.description);
        trip.thumbnail_url = normalize(&input.thumbnail_url);
        trip.is_public = input.is_public;

        self.storage.insert_trip(&trip).await?;
        info!(trip_id = %trip.id, owner = %actor.id, "trip created");

        self.activity.log(
            ActivityLogEntry::new(
                &actor.id,
                &trip.id,
                ActivityAction::TripCreate,
                format!("{} created the trip \"{}\"", actor.name, trip.name),
            )
            .with_details(json!({ "name": trip.name })),
        );
        self.expand(trip).await
    }

    pub async fn get_trip(&self, trip_id: &str, caller_id: &str) -> Result<TripView, AppError> {
        let trip = self.load(trip_id).await?;
        let role = require_read(&trip, caller_id)?;
        let mut view = self.expand(trip).await?;
        if role.is_none() {
            view.share_token = None;
        }
        Ok(view)
    }

    pub async fn get_shared_trip(&self, token: &str) -> Result<TripView, AppError> {
        let trip = self
            .storage
            .find_trip_by_share_token(token)
            .await?
            .ok_or(AppError::NotFound)?;
        let mut view = self.expand(trip).await?;
        view.share_token = None;
        Ok(view)
    }

    pub async fn list_trips(&self, caller_id: &str) -> Result<Vec<TripView>, AppError> {
        let trips = self.storage.list_trips_for_user(caller_id).await?;
        let mut member_ids: Vec<String> = trips.iter().flat_map(Trip::member_ids).collect();
        member_ids.sort();
        member_ids.dedup();
        let profiles = self.storage.find_profiles(&member_ids).await?;

        trips
            .into_iter()
            .map(|trip| build_view(trip, &profiles))
            .collect()
    }

    /// Applies a partial update: trip fields directly, events through the
    /// reconciler. Writes once and queues one activity entry per change.
    pub async fn update_trip(
        &self,
        trip_id: &str,
        actor: &UserSnapshot,
        patch: TripPatch,
    ) -> Result<TripView, AppError> {
        let mut trip = self.load(trip_id).await?;
        require_write(&trip, &actor.id)?;
        if let Some(version) = patch.version {
            if version != trip.version {
                return Err(AppError::Conflict(format!(
                    "trip is at version {}, edit was based on {version}",
                    trip.version
                )));
            }
        }
        if let Some(events) = &patch.events {
            validate_events(events)?;
        }

        let original = trip.clone();
        let now = Utc::now();
        let mut trip_changes = apply_trip_fields(&mut trip, &patch)?;

        let mut diffs = Vec::new();
        if let Some(events) = patch.events {
            if events != trip.events {
                let reconciled = reconcile(&trip.events, events, actor, now);
                if !reconciled.diffs.is_empty() {
                    trip.events = reconciled.merged_events;
                    diffs = reconciled.diffs;
                } else if let Some(change) = order_change(&trip.events, &reconciled.merged_events) {
                    trip_changes.push(change);
                    trip.events = reconciled.merged_events;
                }
            }
        }

        if trip == original {
            debug!(trip_id, "update changed nothing, skipping write");
            return self.expand(trip).await;
        }

        trip.updated_at = now;
        self.storage.save_trip(&mut trip).await?;
        info!(
            trip_id,
            version = trip.version,
            event_changes = diffs.len(),
            "trip updated"
        );

        if !trip_changes.is_empty() {
            self.activity.log(trip_update_entry(actor, &trip, &trip_changes));
        }
        diffs.sort_by_key(|diff| !diff.is_delete());
        for diff in &diffs {
            self.activity.log(diff_entry(diff, actor, &trip.id));
        }

        self.expand(trip).await
    }

    pub async fn delete_trip(&self, trip_id: &str, actor: &UserSnapshot) -> Result<(), AppError> {
        let trip = self.load(trip_id).await?;
        require_owner(&trip, &actor.id)?;
        self.storage.delete_trip(&trip.id).await?;
        info!(trip_id, "trip deleted");

        self.activity.log(
            ActivityLogEntry::new(
                &actor.id,
                &trip.id,
                ActivityAction::TripDelete,
                format!("{} deleted the trip \"{}\"", actor.name, trip.name),
            )
            .with_details(json!({ "name": trip.name, "events": trip.events.len() })),
        );
        Ok(())
    }

    /// Issues a share token, or returns the existing one.
    pub async fn share_trip(
        &self,
        trip_id: &str,
        actor: &UserSnapshot,
    ) -> Result<TripView, AppError> {
        let mut trip = self.load(trip_id).await?;
        require_owner(&trip, &actor.id)?;
        if trip.share_token.is_some() {
            return self.expand(trip).await;
        }

        trip.share_token = Some(Uuid::new_v4().simple().to_string());
        trip.updated_at = Utc::now();
        self.storage.save_trip(&mut trip).await?;
        self.activity.log(
            ActivityLogEntry::new(
                &actor.id,
                &trip.id,
                ActivityAction::TripShare,
                format!("{} created a share link", actor.name),
            )
            .with_details(json!({ "shared": true })),
        );
        self.expand(trip).await
    }

    pub async fn unshare_trip(
        &self,
        trip_id: &str,
        actor: &UserSnapshot,
    ) -> Result<TripView, AppError> {
        let mut trip = self.load(trip_id).await?;
        require_owner(&trip, &actor.id)?;
        if trip.share_token.is_none() {
            return self.expand(trip).await;
        }

        trip.share_token = None;
        trip.updated_at = Utc::now();
        self.storage.save_trip(&mut trip).await?;
        self.activity.log(
            ActivityLogEntry::new(
                &actor.id,
                &trip.id,
                ActivityAction::TripShare,
                format!("{} revoked the share link", actor.name),
            )
            .with_details(json!({ "shared": false })),
        );
        self.expand(trip).await
    }

    pub async fn add_collaborator(
        &self,
        trip_id: &str,
        actor: &UserSnapshot,
        email: &str,
        role: CollaboratorRole,
    ) -> Result<TripView, AppError> {
        let mut trip = self.load(trip_id).await?;
        require_owner(&trip, &actor.id)?;

        let email = email.trim().to_lowercase();
        let user = self
            .storage
            .find_user_by_email(&email)
            .await?
            .ok_or(AppError::NotFound)?;
        if user.id == trip.owner_id {
            return Err(AppError::bad_request("the owner cannot be a collaborator"));
        }
        if trip.collaborator(&user.id).is_some() {
            return Err(AppError::bad_request(format!(
                "{} is already a collaborator",
                user.email
            )));
        }

        trip.collaborators.push(Collaborator {
            user_id: user.id.clone(),
            role,
        });
        trip.updated_at = Utc::now();
        self.storage.save_trip(&mut trip).await?;

        self.activity.log(
            ActivityLogEntry::new(
                &actor.id,
                &trip.id,
                ActivityAction::CollaboratorAdd,
                format!("{} added {} as {}", actor.name, user.name, Role::from(role)),
            )
            .with_details(json!({ "userId": user.id, "name": user.name, "role": role })),
        );
        self.expand(trip).await
    }

    pub async fn update_collaborator(
        &self,
        trip_id: &str,
        actor: &UserSnapshot,
        user_id: &str,
        role: CollaboratorRole,
    ) -> Result<TripView, AppError> {
        let mut trip = self.load(trip_id).await?;
        require_owner(&trip, &actor.id)?;

        let collaborator = trip
            .collaborators
            .iter_mut()
            .find(|c| c.user_id == user_id)
            .ok_or(AppError::NotFound)?;
        if collaborator.role == role {
            return self.expand(trip).await;
        }
        let previous = std::mem::replace(&mut collaborator.role, role);

        trip.updated_at = Utc::now();
        self.storage.save_trip(&mut trip).await?;

        self.activity.log(
            ActivityLogEntry::new(
                &actor.id,
                &trip.id,
                ActivityAction::CollaboratorUpdate,
                format!(
                    "{} changed a collaborator from {} to {}",
                    actor.name,
                    Role::from(previous),
                    Role::from(role)
                ),
            )
            .with_details(json!({ "userId": user_id, "old": previous, "new": role })),
        );
        self.expand(trip).await
    }

    /// Owners may remove anyone; collaborators may remove themselves.
    pub async fn remove_collaborator(
        &self,
        trip_id: &str,
        actor: &UserSnapshot,
        user_id: &str,
    ) -> Result<TripView, AppError> {
        let mut trip = self.load(trip_id).await?;
        if actor.id != user_id {
            require_owner(&trip, &actor.id)?;
        }

        let before = trip.collaborators.len();
        trip.collaborators.retain(|c| c.user_id != user_id);
        if trip.collaborators.len() == before {
            return Err(AppError::NotFound);
        }
        trip.updated_at = Utc::now();
        self.storage.save_trip(&mut trip).await?;

        let description = if actor.id == user_id {
            format!("{} left the trip", actor.name)
        } else {
            format!("{} removed a collaborator", actor.name)
        };
        self.activity.log(
            ActivityLogEntry::new(
                &actor.id,
                &trip.id,
                ActivityAction::CollaboratorRemove,
                description,
            )
            .with_details(json!({ "userId": user_id })),
        );
        self.expand(trip).await
    }

    pub async fn vote(
        &self,
        trip_id: &str,
        actor: &UserSnapshot,
        event_id: &str,
        vote: Vote,
    ) -> Result<TripView, AppError> {
        let mut trip = self.load(trip_id).await?;
        if resolve_access(&trip, &actor.id).is_none() {
            return Err(AppError::Forbidden);
        }

        let event = trip
            .events
            .iter_mut()
            .find(|e| e.id == event_id)
            .ok_or(AppError::NotFound)?;
        apply_vote(event, &actor.id, vote)?;
        let label = event_label(event);

        trip.updated_at = Utc::now();
        self.storage.save_trip(&mut trip).await?;

        let (action, verb) = match vote {
            Vote::Like => (ActivityAction::EventLike, "liked"),
            Vote::Dislike => (ActivityAction::EventDislike, "disliked"),
            Vote::Remove => (ActivityAction::EventVoteRemove, "withdrew their vote on"),
        };
        self.activity.log(
            ActivityLogEntry::new(
                &actor.id,
                &trip.id,
                action,
                format!("{} {verb} {label}", actor.name),
            )
            .with_event(event_id)
            .with_details(json!({ "name": label })),
        );
        self.expand(trip).await
    }

    pub async fn activity(
        &self,
        trip_id: &str,
        caller_id: &str,
    ) -> Result<Vec<ActivityLogEntry>, AppError> {
        let trip = self.load(trip_id).await?;
        require_read(&trip, caller_id)?;
        self.storage.list_activity(&trip.id).await
    }

    async fn load(&self, trip_id: &str) -> Result<Trip, AppError> {
        self.storage
            .load_trip(trip_id)
            .await?
            .ok_or(AppError::NotFound)
    }

    async fn expand(&self, trip: Trip) -> Result<TripView, AppError> {
        let profiles = self.storage.find_profiles(&trip.member_ids()).await?;
        build_view(trip, &profiles)
    }
}

fn build_view(trip: Trip, profiles: &HashMap<String, UserProfile>) -> Result<TripView, AppError> {
    let owner = profiles
        .get(&trip.owner_id)
        .cloned()
        .ok_or(AppError::NotFound)?;
    // Collaborators whose account is gone are left out.
    let collaborators = trip
        .collaborators
        .iter()
        .filter_map(|c| {
            profiles.get(&c.user_id).map(|user| CollaboratorView {
                user: user.clone(),
                role: c.role,
            })
        })
        .collect();

    Ok(TripView {
        id: trip.id,
        name: trip.name,
        description: trip.description,
        thumbnail_url: trip.thumbnail_url,
        owner,
        collaborators,
        events: trip.events,
        is_public: trip.is_public,
        share_token: trip.share_token,
        version: trip.version,
        created_at: trip.created_at,
        updated_at: trip.updated_at,
    })
}

fn validate_name(raw: &str) -> Result<String, AppError> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(AppError::bad_request("trip name must not be empty"));
    }
    if name.chars().count() > MAX_TRIP_NAME_LEN {
        return Err(AppError::bad_request(format!(
            "trip name is longer than {MAX_TRIP_NAME_LEN} characters"
        )));
    }
    Ok(name.to_string())
}

fn apply_trip_fields(trip: &mut Trip, patch: &TripPatch) -> Result<Vec<FieldChange>, AppError> {
    let mut changes = Vec::new();

    if let Some(raw) = &patch.name {
        let name = validate_name(raw)?;
        if name != trip.name {
            changes.push(FieldChange {
                field: "name",
                old: Some(std::mem::replace(&mut trip.name, name.clone())),
                new: Some(name),
            });
        }
    }
    if patch.description.is_some() {
        let description = normalize(&patch.description);
        if description != trip.description {
            changes.push(FieldChange {
                field: "description",
                old: std::mem::replace(&mut trip.description, description.clone()),
                new: description,
            });
        }
    }
    if patch.thumbnail_url.is_some() {
        let thumbnail = normalize(&patch.thumbnail_url);
        if thumbnail != trip.thumbnail_url {
            changes.push(FieldChange {
                field: "thumbnailUrl",
                old: std::mem::replace(&mut trip.thumbnail_url, thumbnail.clone()),
                new: thumbnail,
            });
        }
    }
    if let Some(is_public) = patch.is_public {
        if is_public != trip.is_public {
            changes.push(FieldChange {
                field: "isPublic",
                old: Some(trip.is_public.to_string()),
                new: Some(is_public.to_string()),
            });
            trip.is_public = is_public;
        }
    }

    Ok(changes)
}

/// Same ids in a different order; the only change a zero-diff
/// reconciliation can carry.
fn order_change(stored: &[Event], merged: &[Event]) -> Option<FieldChange> {
    let ids = |events: &[Event]| events.iter().map(|e| e.id.as_str()).collect::<Vec<_>>().join(",");
    let (old, new) = (ids(stored), ids(merged));
    (old != new).then(|| FieldChange {
        field: "eventOrder",
        old: Some(old),
        new: Some(new),
    })
}

fn trip_update_entry(actor: &UserSnapshot, trip: &Trip, changes: &[FieldChange]) -> ActivityLogEntry {
    let fields: Vec<&str> = changes.iter().map(|c| c.field).collect();
    let mut changed = serde_json::Map::new();
    for change in changes {
        changed.insert(
            change.field.to_string(),
            json!({ "old": change.old, "new": change.new }),
        );
    }
    ActivityLogEntry::new(
        &actor.id,
        &trip.id,
        ActivityAction::TripUpdate,
        format!("{} updated trip details ({})", actor.name, fields.join(", ")),
    )
    .with_details(json!({ "changedFields": fields, "changes": changed }))
}
