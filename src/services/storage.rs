use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{types::Json, FromRow, QueryBuilder, Sqlite};

use crate::{
    db::DbPool,
    error::AppError,
    models::{
        activity::{ActivityAction, ActivityLogEntry},
        event::Event,
        trip::{Collaborator, Trip},
        user::{User, UserProfile},
    },
    services::activity::ActivitySink,
};

const TRIP_COLUMNS: &str = "id, name, description, thumbnail_url, owner_id, collaborators, events, \
     is_public, share_token, version, created_at, updated_at";

const USER_COLUMNS: &str = "id, name, email, password_hash, is_admin, photo_url, created_at";

#[derive(Clone)]
pub struct StorageService {
    db: DbPool,
}

#[derive(FromRow)]
struct TripRow {
    id: String,
    name: String,
    description: Option<String>,
    thumbnail_url: Option<String>,
    owner_id: String,
    collaborators: Json<Vec<Collaborator>>,
    events: Json<Vec<Event>>,
    is_public: bool,
    share_token: Option<String>,
    version: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<TripRow> for Trip {
    fn from(row: TripRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            description: row.description,
            thumbnail_url: row.thumbnail_url,
            owner_id: row.owner_id,
            collaborators: row.collaborators.0,
            events: row.events.0,
            is_public: row.is_public,
            share_token: row.share_token,
            version: row.version,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(FromRow)]
struct ActivityRow {
    id: String,
    user_id: String,
    trip_id: String,
    event_id: Option<String>,
    action: String,
    description: String,
    details: Json<Value>,
    created_at: DateTime<Utc>,
}

impl TryFrom<ActivityRow> for ActivityLogEntry {
    type Error = AppError;

    fn try_from(row: ActivityRow) -> Result<Self, Self::Error> {
        let action = ActivityAction::parse(&row.action).ok_or_else(|| {
            AppError::Other(anyhow::anyhow!("unknown activity action {}", row.action))
        })?;
        Ok(Self {
            id: row.id,
            user_id: row.user_id,
            trip_id: row.trip_id,
            event_id: row.event_id,
            action,
            description: row.description,
            details: row.details.0,
            created_at: row.created_at,
        })
    }
}

impl StorageService {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }

    pub async fn insert_user(&self, user: &User) -> Result<(), AppError> {
        let result = sqlx::query(
            "INSERT INTO users (id, name, email, password_hash, is_admin, photo_url, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )
        .bind(&user.id)
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.is_admin)
        .bind(&user.photo_url)
        .bind(user.created_at)
        .execute(&self.db)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(err)) if err.is_unique_violation() => Err(
                AppError::bad_request(format!("email {} is already registered", user.email)),
            ),
            Err(err) => Err(err.into()),
        }
    }

    pub async fn find_user(&self, user_id: &str) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"))
            .bind(user_id)
            .fetch_optional(&self.db)
            .await?;
        Ok(user)
    }

    pub async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let user =
            sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?1"))
                .bind(email)
                .fetch_optional(&self.db)
                .await?;
        Ok(user)
    }

    pub async fn list_users(&self) -> Result<Vec<User>, AppError> {
        let users = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users ORDER BY created_at DESC"
        ))
        .fetch_all(&self.db)
        .await?;
        Ok(users)
    }

    pub async fn find_profiles(
        &self,
        user_ids: &[String],
    ) -> Result<HashMap<String, UserProfile>, AppError> {
        if user_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let mut query: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT {USER_COLUMNS} FROM users WHERE id IN ("));
        let mut ids = query.separated(", ");
        for id in user_ids {
            ids.push_bind(id.as_str());
        }
        ids.push_unseparated(")");

        let users = query.build_query_as::<User>().fetch_all(&self.db).await?;
        Ok(users
            .into_iter()
            .map(|user| (user.id.clone(), user.profile()))
            .collect())
    }

    pub async fn load_trip(&self, trip_id: &str) -> Result<Option<Trip>, AppError> {
        let row = sqlx::query_as::<_, TripRow>(&format!(
            "SELECT {TRIP_COLUMNS} FROM trips WHERE id = ?1"
        ))
        .bind(trip_id)
        .fetch_optional(&self.db)
        .await?;
        Ok(row.map(Trip::from))
    }

    pub async fn find_trip_by_share_token(&self, token: &str) -> Result<Option<Trip>, AppError> {
        let row = sqlx::query_as::<_, TripRow>(&format!(
            "SELECT {TRIP_COLUMNS} FROM trips WHERE share_token = ?1"
        ))
        .bind(token)
        .fetch_optional(&self.db)
        .await?;
        Ok(row.map(Trip::from))
    }

    /// Trips the user owns or collaborates on, most recently changed first.
    pub async fn list_trips_for_user(&self, user_id: &str) -> Result<Vec<Trip>, AppError> {
        let rows = sqlx::query_as::<_, TripRow>(&format!(
            r#"SELECT {TRIP_COLUMNS} FROM trips
               WHERE owner_id = ?1
                  OR EXISTS (
                      SELECT 1 FROM json_each(trips.collaborators)
                      WHERE json_extract(json_each.value, '$.userId') = ?1
                  )
               ORDER BY updated_at DESC"#
        ))
        .bind(user_id)
        .fetch_all(&self.db)
        .await?;
        Ok(rows.into_iter().map(Trip::from).collect())
    }

    pub async fn insert_trip(&self, trip: &Trip) -> Result<(), AppError> {
        sqlx::query(&format!(
            "INSERT INTO trips ({TRIP_COLUMNS}) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)"
        ))
        .bind(&trip.id)
        .bind(&trip.name)
        .bind(&trip.description)
        .bind(&trip.thumbnail_url)
        .bind(&trip.owner_id)
        .bind(Json(&trip.collaborators))
        .bind(Json(&trip.events))
        .bind(trip.is_public)
        .bind(&trip.share_token)
        .bind(trip.version)
        .bind(trip.created_at)
        .bind(trip.updated_at)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    /// Writes the whole trip document if nobody else has written since it
    /// was loaded. On success `trip.version` is advanced.
    pub async fn save_trip(&self, trip: &mut Trip) -> Result<(), AppError> {
        let base_version = trip.version;
        let result = sqlx::query(
            r#"UPDATE trips
               SET name = ?1, description = ?2, thumbnail_url = ?3, collaborators = ?4,
                   events = ?5, is_public = ?6, share_token = ?7, version = ?8, updated_at = ?9
               WHERE id = ?10 AND version = ?11"#,
        )
        .bind(&trip.name)
        .bind(&trip.description)
        .bind(&trip.thumbnail_url)
        .bind(Json(&trip.collaborators))
        .bind(Json(&trip.events))
        .bind(trip.is_public)
        .bind(&trip.share_token)
        .bind(base_version + 1)
        .bind(trip.updated_at)
        .bind(&trip.id)
        .bind(base_version)
        .execute(&self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::Conflict(format!(
                "trip {} was modified concurrently",
                trip.id
            )));
        }
        trip.version = base_version + 1;
        Ok(())
    }

    pub async fn delete_trip(&self, trip_id: &str) -> Result<(), AppError> {
        let result = sqlx::query("DELETE FROM trips WHERE id = ?1")
            .bind(trip_id)
            .execute(&self.db)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound);
        }
        Ok(())
    }

    pub async fn insert_activity(&self, entry: &ActivityLogEntry) -> Result<(), AppError> {
        sqlx::query(
            "INSERT INTO activity_logs \
             (id, user_id, trip_id, event_id, action, description, details, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        )
        .bind(&entry.id)
        .bind(&entry.user_id)
        .bind(&entry.trip_id)
        .bind(&entry.event_id)
        .bind(entry.action.as_str())
        .bind(&entry.description)
        .bind(Json(&entry.details))
        .bind(entry.created_at)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    /// Entries for a trip, newest first.
    pub async fn list_activity(&self, trip_id: &str) -> Result<Vec<ActivityLogEntry>, AppError> {
        let rows = sqlx::query_as::<_, ActivityRow>(
            "SELECT id, user_id, trip_id, event_id, action, description, details, created_at \
             FROM activity_logs WHERE trip_id = ?1 ORDER BY created_at DESC, rowid DESC",
        )
        .bind(trip_id)
        .fetch_all(&self.db)
        .await?;
        rows.into_iter().map(ActivityLogEntry::try_from).collect()
    }
}

#[async_trait]
impl ActivitySink for StorageService {
    async fn record(&self, entry: &ActivityLogEntry) -> Result<(), AppError> {
        self.insert_activity(entry).await
    }
}
