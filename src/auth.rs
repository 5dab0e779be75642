//! Caller identity.
//!
//! Sessions and tokens are issued upstream. By the time a request reaches
//! this service the auth layer has put the caller's user id in a header;
//! [`resolve_identity`] turns it into an [`AuthenticatedUser`] extension.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use async_trait::async_trait;
use axum::{
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::Response,
};
use chrono::Utc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    error::AppError,
    models::user::{User, UserSnapshot},
    state::AppState,
};

const MIN_PASSWORD_LEN: usize = 8;

#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub id: String,
    pub name: String,
    pub email: String,
    pub is_admin: bool,
}

impl AuthenticatedUser {
    pub fn snapshot(&self) -> UserSnapshot {
        UserSnapshot {
            id: self.id.clone(),
            name: self.name.clone(),
            email: self.email.clone(),
        }
    }
}

impl From<&User> for AuthenticatedUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            name: user.name.clone(),
            email: user.email.clone(),
            is_admin: user.is_admin,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CurrentUser(pub Option<AuthenticatedUser>);

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(parts.extensions.get::<AuthenticatedUser>().cloned()))
    }
}

impl CurrentUser {
    pub fn require_user(&self) -> Result<&AuthenticatedUser, AppError> {
        self.0.as_ref().ok_or(AppError::Unauthorized)
    }

    pub fn require_admin(&self) -> Result<&AuthenticatedUser, AppError> {
        let user = self.require_user()?;
        if user.is_admin {
            Ok(user)
        } else {
            Err(AppError::Forbidden)
        }
    }
}

/// Middleware: resolves the identity header to a stored user. A header naming
/// an unknown user is rejected; a missing header leaves the request anonymous.
pub async fn resolve_identity(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let user_id = request
        .headers()
        .get(state.config.auth_user_header.as_str())
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_owned);

    if let Some(user_id) = user_id {
        let Some(user) = state.storage.find_user(&user_id).await? else {
            warn!(user_id = %user_id, "identity header names an unknown user");
            return Err(AppError::Unauthorized);
        };
        debug!(user_id = %user_id, "request authenticated");
        request
            .extensions_mut()
            .insert(AuthenticatedUser::from(&user));
    }

    Ok(next.run(request).await)
}

pub async fn register_user(
    state: &AppState,
    name: &str,
    email: &str,
    password: &str,
) -> Result<User, AppError> {
    let name = name.trim();
    let email = email.trim().to_lowercase();
    if name.is_empty() {
        return Err(AppError::bad_request("name must not be empty"));
    }
    if !email.contains('@') {
        return Err(AppError::bad_request("email address is invalid"));
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::bad_request(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }

    let is_admin = state.config.admin_emails.contains(&email);
    let user = User {
        id: Uuid::new_v4().to_string(),
        name: name.to_string(),
        email,
        password_hash: hash_password(password)?,
        is_admin,
        photo_url: None,
        created_at: Utc::now(),
    };
    state.storage.insert_user(&user).await?;
    Ok(user)
}

/// Checks an email/password pair against the stored credential.
pub async fn authenticate_user(
    state: &AppState,
    email: &str,
    password: &str,
) -> Result<User, AppError> {
    let email = email.trim().to_lowercase();
    let user = state
        .storage
        .find_user_by_email(&email)
        .await?
        .ok_or(AppError::Unauthorized)?;
    let parsed = PasswordHash::new(&user.password_hash)
        .map_err(|err| AppError::Other(anyhow::anyhow!("stored hash unreadable: {err}")))?;
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .map_err(|_| AppError::Unauthorized)?;
    Ok(user)
}

fn hash_password(password: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|err| AppError::Other(anyhow::anyhow!("password hashing failed: {err}")))
}
