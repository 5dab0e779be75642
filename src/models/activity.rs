use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityAction {
    TripCreate,
    TripUpdate,
    TripDelete,
    TripShare,
    EventCreate,
    EventUpdate,
    EventDelete,
    EventLike,
    EventDislike,
    EventVoteRemove,
    CollaboratorAdd,
    CollaboratorUpdate,
    CollaboratorRemove,
}

impl ActivityAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityAction::TripCreate => "trip_create",
            ActivityAction::TripUpdate => "trip_update",
            ActivityAction::TripDelete => "trip_delete",
            ActivityAction::TripShare => "trip_share",
            ActivityAction::EventCreate => "event_create",
            ActivityAction::EventUpdate => "event_update",
            ActivityAction::EventDelete => "event_delete",
            ActivityAction::EventLike => "event_like",
            ActivityAction::EventDislike => "event_dislike",
            ActivityAction::EventVoteRemove => "event_vote_remove",
            ActivityAction::CollaboratorAdd => "collaborator_add",
            ActivityAction::CollaboratorUpdate => "collaborator_update",
            ActivityAction::CollaboratorRemove => "collaborator_remove",
        }
    }

    /// Reads a stored action name using the same mapping serde writes.
    pub fn parse(raw: &str) -> Option<Self> {
        serde_json::from_value(Value::String(raw.to_owned())).ok()
    }
}

impl fmt::Display for ActivityAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Append-only audit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityLogEntry {
    pub id: String,
    pub user_id: String,
    pub trip_id: String,
    pub event_id: Option<String>,
    pub action: ActivityAction,
    pub description: String,
    pub details: Value,
    pub created_at: DateTime<Utc>,
}

impl ActivityLogEntry {
    pub fn new(
        user_id: impl Into<String>,
        trip_id: impl Into<String>,
        action: ActivityAction,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            trip_id: trip_id.into(),
            event_id: None,
            action,
            description: description.into(),
            details: Value::Object(Default::default()),
            created_at: Utc::now(),
        }
    }

    pub fn with_event(mut self, event_id: impl Into<String>) -> Self {
        self.event_id = Some(event_id.into());
        self
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }
}
