pub mod admin;
pub mod public;
pub mod trips;

use axum::{middleware, Router};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::{auth, error::AppError, state::AppState};

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(public::router())
        .nest("/trips", trips::router())
        .nest("/admin", admin::router())
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::resolve_identity,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Trip ids are UUIDs; anything else is a malformed request rather than a miss.
pub(crate) fn parse_trip_id(raw: &str) -> Result<String, AppError> {
    Uuid::parse_str(raw)
        .map(|id| id.to_string())
        .map_err(|_| AppError::bad_request(format!("invalid trip id {raw}")))
}
