use axum::{
    extract::State,
    http::StatusCode,
    middleware,
    routing::{get, post},
    Extension, Json, Router,
};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::{
    dto::{CreateUserRequest, DeletedResponse, PublicUser, RoleResponse, UpdateUserRequest},
    repo_types::UserPatch,
    services::create_user,
};
use crate::{
    auth::{
        extractors::{require_auth, AuthUser},
        password::hash_password_blocking,
    },
    error::{ApiError, ApiResult},
    extract::{ApiJson, ApiPath},
    state::AppState,
    validation::{normalize_email, validate_email, validate_password},
};

/// User administration routes, behind the auth gate unless
/// `protect_admin_routes` is off.
pub fn admin_routes(state: &AppState) -> Router<AppState> {
    let router = Router::new()
        .route("/", post(add_user))
        .route("/all", get(list_users))
        .route("/:id", get(get_user).put(update_user).delete(delete_user))
        .route("/role/:id", get(get_user_role));

    if state.config.protect_admin_routes {
        router.route_layer(middleware::from_fn_with_state(
            state.jwt.clone(),
            require_auth,
        ))
    } else {
        router
    }
}

pub const ADMIN_ROLE: &str = "admin";

fn user_not_found() -> ApiError {
    ApiError::NotFound("User not found".into())
}

/// Behind the gate only an admin token may assign roles. Without the gate
/// there is no caller identity and the routes are open by configuration.
fn ensure_may_assign_role(
    caller: Option<&AuthUser>,
    role: Option<&str>,
) -> Result<(), ApiError> {
    match (role, caller) {
        (Some(_), Some(c)) if c.role.as_deref() != Some(ADMIN_ROLE) => {
            warn!(user_id = %c.id, "role assignment by non-admin");
            Err(ApiError::Forbidden("Only admins can assign roles".into()))
        }
        _ => Ok(()),
    }
}

#[instrument(skip(state, caller, payload))]
pub async fn add_user(
    State(state): State<AppState>,
    caller: Option<Extension<AuthUser>>,
    ApiJson(payload): ApiJson<CreateUserRequest>,
) -> ApiResult<(StatusCode, Json<PublicUser>)> {
    ensure_may_assign_role(caller.as_deref(), payload.role.as_deref())?;
    let user = create_user(
        &state,
        &payload.email,
        &payload.password,
        payload.profile,
        payload.role,
    )
    .await?;
    Ok((StatusCode::CREATED, Json(user.into())))
}

#[instrument(skip(state))]
pub async fn list_users(State(state): State<AppState>) -> ApiResult<Json<Vec<PublicUser>>> {
    let users = state.users.list().await?;
    Ok(Json(users.into_iter().map(PublicUser::from).collect()))
}

#[instrument(skip(state))]
pub async fn get_user(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Json<PublicUser>> {
    let user = state.users.find_by_id(id).await?.ok_or_else(user_not_found)?;
    Ok(Json(user.into()))
}

#[instrument(skip(state, caller, payload))]
pub async fn update_user(
    State(state): State<AppState>,
    caller: Option<Extension<AuthUser>>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(payload): ApiJson<UpdateUserRequest>,
) -> ApiResult<Json<PublicUser>> {
    ensure_may_assign_role(caller.as_deref(), payload.role.as_deref())?;
    let email = match payload.email {
        Some(raw) => {
            let email = normalize_email(&raw);
            validate_email(&email)?;
            Some(email)
        }
        None => None,
    };
    let password_hash = match payload.password {
        Some(plain) => {
            validate_password(&plain)?;
            Some(hash_password_blocking(plain).await?)
        }
        None => None,
    };

    let patch = UserPatch {
        email,
        password_hash,
        profile: payload.profile,
        role: payload.role,
    };
    let user = state
        .users
        .update(id, patch)
        .await?
        .ok_or_else(user_not_found)?;

    info!(user_id = %user.id, "user updated");
    Ok(Json(user.into()))
}

#[instrument(skip(state))]
pub async fn delete_user(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Json<DeletedResponse>> {
    if !state.users.delete(id).await? {
        warn!(user_id = %id, "delete of unknown user");
        return Err(user_not_found());
    }
    info!(user_id = %id, "user deleted");
    Ok(Json(DeletedResponse { id }))
}

#[instrument(skip(state))]
pub async fn get_user_role(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Json<RoleResponse>> {
    let assignment = state.users.role_of(id).await?.ok_or_else(user_not_found)?;
    let role = RoleResponse::from_assignment(assignment)
        .ok_or_else(|| ApiError::NotFound("Role not found".into()))?;
    Ok(Json(role))
}
