use axum::{extract::State, routing::get, Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{auth::CurrentUser, error::AppError, models::user::UserProfile, state::AppState};

pub fn router() -> Router<AppState> {
    Router::new().route("/users", get(users_list))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AdminUserRow {
    #[serde(flatten)]
    profile: UserProfile,
    is_admin: bool,
    created_at: DateTime<Utc>,
}

async fn users_list(
    State(state): State<AppState>,
    current: CurrentUser,
) -> Result<Json<Vec<AdminUserRow>>, AppError> {
    current.require_admin()?;
    let users = state
        .storage
        .list_users()
        .await?
        .into_iter()
        .map(|user| AdminUserRow {
            profile: user.profile(),
            is_admin: user.is_admin,
            created_at: user.created_at,
        })
        .collect();
    Ok(Json(users))
}
