use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, patch, post},
    Json, Router,
};
use serde::Deserialize;

use crate::{
    auth::CurrentUser,
    error::AppError,
    models::{
        activity::ActivityLogEntry,
        trip::{CollaboratorRole, NewTrip, TripPatch, TripView},
    },
    routes::parse_trip_id,
    services::reconcile::Vote,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_trips).post(create_trip))
        .route(
            "/:id",
            get(get_trip).patch(update_trip).delete(delete_trip),
        )
        .route("/:id/collaborators", post(add_collaborator))
        .route(
            "/:id/collaborators/:user_id",
            patch(update_collaborator).delete(remove_collaborator),
        )
        .route("/:id/share", post(share_trip).delete(unshare_trip))
        .route("/:id/events/:event_id/vote", post(vote))
        .route("/:id/activity", get(activity))
}

async fn list_trips(
    State(state): State<AppState>,
    current: CurrentUser,
) -> Result<Json<Vec<TripView>>, AppError> {
    let user = current.require_user()?;
    Ok(Json(state.trips.list_trips(&user.id).await?))
}

async fn create_trip(
    State(state): State<AppState>,
    current: CurrentUser,
    Json(input): Json<NewTrip>,
) -> Result<(StatusCode, Json<TripView>), AppError> {
    let user = current.require_user()?;
    let trip = state.trips.create_trip(&user.snapshot(), input).await?;
    Ok((StatusCode::CREATED, Json(trip)))
}

async fn get_trip(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<TripView>, AppError> {
    let user = current.require_user()?;
    let id = parse_trip_id(&id)?;
    Ok(Json(state.trips.get_trip(&id, &user.id).await?))
}

async fn update_trip(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<String>,
    Json(patch): Json<TripPatch>,
) -> Result<Json<TripView>, AppError> {
    let user = current.require_user()?;
    let id = parse_trip_id(&id)?;
    Ok(Json(
        state.trips.update_trip(&id, &user.snapshot(), patch).await?,
    ))
}

async fn delete_trip(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    let user = current.require_user()?;
    let id = parse_trip_id(&id)?;
    state.trips.delete_trip(&id, &user.snapshot()).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
struct AddCollaboratorForm {
    email: String,
    role: CollaboratorRole,
}

async fn add_collaborator(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<String>,
    Json(form): Json<AddCollaboratorForm>,
) -> Result<Json<TripView>, AppError> {
    let user = current.require_user()?;
    let id = parse_trip_id(&id)?;
    let trip = state
        .trips
        .add_collaborator(&id, &user.snapshot(), &form.email, form.role)
        .await?;
    Ok(Json(trip))
}

#[derive(Deserialize)]
struct RoleForm {
    role: CollaboratorRole,
}

async fn update_collaborator(
    State(state): State<AppState>,
    current: CurrentUser,
    Path((id, user_id)): Path<(String, String)>,
    Json(form): Json<RoleForm>,
) -> Result<Json<TripView>, AppError> {
    let user = current.require_user()?;
    let id = parse_trip_id(&id)?;
    let trip = state
        .trips
        .update_collaborator(&id, &user.snapshot(), &user_id, form.role)
        .await?;
    Ok(Json(trip))
}

async fn remove_collaborator(
    State(state): State<AppState>,
    current: CurrentUser,
    Path((id, user_id)): Path<(String, String)>,
) -> Result<Json<TripView>, AppError> {
    let user = current.require_user()?;
    let id = parse_trip_id(&id)?;
    let trip = state
        .trips
        .remove_collaborator(&id, &user.snapshot(), &user_id)
        .await?;
    Ok(Json(trip))
}

async fn share_trip(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<TripView>, AppError> {
    let user = current.require_user()?;
    let id = parse_trip_id(&id)?;
    Ok(Json(state.trips.share_trip(&id, &user.snapshot()).await?))
}

async fn unshare_trip(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<TripView>, AppError> {
    let user = current.require_user()?;
    let id = parse_trip_id(&id)?;
    Ok(Json(state.trips.unshare_trip(&id, &user.snapshot()).await?))
}

#[derive(Deserialize)]
struct VoteForm {
    vote: Vote,
}

async fn vote(
    State(state): State<AppState>,
    current: CurrentUser,
    Path((id, event_id)): Path<(String, String)>,
    Json(form): Json<VoteForm>,
) -> Result<Json<TripView>, AppError> {
    let user = current.require_user()?;
    let id = parse_trip_id(&id)?;
    let trip = state
        .trips
        .vote(&id, &user.snapshot(), &event_id, form.vote)
        .await?;
    Ok(Json(trip))
}

async fn activity(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<Vec<ActivityLogEntry>>, AppError> {
    let user = current.require_user()?;
    let id = parse_trip_id(&id)?;
    Ok(Json(state.trips.activity(&id, &user.id).await?))
}
