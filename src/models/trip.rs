use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{event::Event, user::UserProfile};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Owner,
    Editor,
    Viewer,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Owner => "owner",
            Role::Editor => "editor",
            Role::Viewer => "viewer",
        }
    }

    pub fn can_write(&self) -> bool {
        matches!(self, Role::Owner | Role::Editor)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Roles that can be granted to a collaborator; ownership is never shared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollaboratorRole {
    Editor,
    Viewer,
}

impl From<CollaboratorRole> for Role {
    fn from(role: CollaboratorRole) -> Self {
        match role {
            CollaboratorRole::Editor => Role::Editor,
            CollaboratorRole::Viewer => Role::Viewer,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Collaborator {
    pub user_id: String,
    pub role: CollaboratorRole,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Trip {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub thumbnail_url: Option<String>,
    pub owner_id: String,
    pub collaborators: Vec<Collaborator>,
    pub events: Vec<Event>,
    pub is_public: bool,
    pub share_token: Option<String>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Trip {
    pub fn new(owner_id: impl Into<String>, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            description: None,
            thumbnail_url: None,
            owner_id: owner_id.into(),
            collaborators: Vec::new(),
            events: Vec::new(),
            is_public: false,
            share_token: None,
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn collaborator(&self, user_id: &str) -> Option<&Collaborator> {
        self.collaborators.iter().find(|c| c.user_id == user_id)
    }

    /// Every user id the trip references: the owner first, then collaborators.
    pub fn member_ids(&self) -> Vec<String> {
        std::iter::once(self.owner_id.clone())
            .chain(self.collaborators.iter().map(|c| c.user_id.clone()))
            .collect()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTrip {
    pub name: String,
    pub description: Option<String>,
    pub thumbnail_url: Option<String>,
    #[serde(default)]
    pub is_public: bool,
}

/// Partial trip update. Absent fields are left alone.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TripPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub thumbnail_url: Option<String>,
    pub is_public: Option<bool>,
    pub events: Option<Vec<Event>>,
    /// Version the caller based its edit on.
    pub version: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CollaboratorView {
    pub user: UserProfile,
    pub role: CollaboratorRole,
}

/// A trip with its owner and collaborators expanded to profiles.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TripView {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub thumbnail_url: Option<String>,
    pub owner: UserProfile,
    pub collaborators: Vec<CollaboratorView>,
    pub events: Vec<Event>,
    pub is_public: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub share_token: Option<String>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
