use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::{
    auth::{self, CurrentUser},
    error::AppError,
    models::{trip::TripView, user::UserProfile},
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/users", post(register))
        .route("/me", get(me))
        .route("/shared/:token", get(shared_trip))
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

#[derive(Deserialize)]
struct RegisterForm {
    name: String,
    email: String,
    password: String,
}

async fn register(
    State(state): State<AppState>,
    Json(form): Json<RegisterForm>,
) -> Result<(StatusCode, Json<UserProfile>), AppError> {
    let user = auth::register_user(&state, &form.name, &form.email, &form.password).await?;
    Ok((StatusCode::CREATED, Json(user.profile())))
}

async fn me(
    State(state): State<AppState>,
    current: CurrentUser,
) -> Result<Json<UserProfile>, AppError> {
    let user = current.require_user()?;
    let stored = state
        .storage
        .find_user(&user.id)
        .await?
        .ok_or(AppError::NotFound)?;
    Ok(Json(stored.profile()))
}

async fn shared_trip(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Json<TripView>, AppError> {
    Ok(Json(state.trips.get_shared_trip(&token).await?))
}
