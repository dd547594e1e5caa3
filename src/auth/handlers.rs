use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::{info, instrument, warn};

use crate::{
    auth::{
        dto::{AuthResponse, LoginRequest, RegisterRequest},
        extractors::AuthUser,
        password::{burn_verification_blocking, verify_password_blocking},
    },
    error::{ApiError, ApiResult},
    extract::ApiJson,
    state::AppState,
    users::{dto::PublicUser, repo_types::User, services::create_user},
    validation::{is_valid_email, normalize_email},
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
}

pub fn me_routes() -> Router<AppState> {
    Router::new().route("/me", get(get_me))
}

fn invalid_credentials() -> ApiError {
    ApiError::Unauthenticated("Invalid credentials".into())
}

fn issue(state: &AppState, user: User) -> ApiResult<AuthResponse> {
    let token = state.jwt.sign(user.id, user.role.as_deref())?;
    Ok(AuthResponse {
        user: user.into(),
        token,
    })
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<AuthResponse>)> {
    let user = create_user(&state, &payload.email, &payload.password, payload.profile, None).await?;
    info!(user_id = %user.id, "user registered");
    Ok((StatusCode::CREATED, Json(issue(&state, user)?)))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<LoginRequest>,
) -> ApiResult<Json<AuthResponse>> {
    let email = normalize_email(&payload.email);

    // A malformed email cannot belong to anyone: same answer as an unknown one.
    let found = if is_valid_email(&email) {
        state.users.find_by_email(&email).await?
    } else {
        None
    };
    let Some(user) = found else {
        burn_verification_blocking(payload.password).await;
        warn!(email = %email, "login unknown email");
        return Err(invalid_credentials());
    };

    if !verify_password_blocking(payload.password, user.password_hash.clone()).await? {
        warn!(user_id = %user.id, "login invalid password");
        return Err(invalid_credentials());
    }

    info!(user_id = %user.id, "user logged in");
    Ok(Json(issue(&state, user)?))
}

#[instrument(skip(state))]
pub async fn get_me(
    State(state): State<AppState>,
    user: AuthUser,
) -> ApiResult<Json<PublicUser>> {
    let user = state
        .users
        .find_by_id(user.id)
        .await?
        .ok_or_else(|| ApiError::Unauthenticated("User not found".into()))?;
    Ok(Json(user.into()))
}
