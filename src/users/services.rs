use tracing::{info, warn};

use super::repo_types::{NewUser, Profile, User};
use crate::{
    auth::password::hash_password_blocking,
    error::{ApiError, ApiResult},
    state::AppState,
    validation::{normalize_email, validate_email, validate_password},
};

/// Validates, hashes and inserts a user. Shared by registration and the
/// administrative create.
pub async fn create_user(
    state: &AppState,
    email: &str,
    password: &str,
    profile: Profile,
    role: Option<String>,
) -> ApiResult<User> {
    let email = normalize_email(email);
    validate_email(&email)?;
    validate_password(password)?;

    // Early exit only; the unique index on users.email is what guarantees it.
    if state.users.find_by_email(&email).await?.is_some() {
        warn!(email = %email, "email already registered");
        return Err(ApiError::Conflict("User already exists".into()));
    }

    let password_hash = hash_password_blocking(password.to_owned()).await?;
    let user = state
        .users
        .insert(NewUser {
            email,
            password_hash,
            profile,
            role,
        })
        .await
        .map_err(|e| {
            warn!(error = %e, "create user failed");
            ApiError::from(e)
        })?;

    info!(user_id = %user.id, email = %user.email, "user created");
    Ok(user)
}
