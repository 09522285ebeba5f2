use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Router,
};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    auth::{
        dto::MessageResponse,
        handlers::is_valid_email,
        jwt::AuthUser,
        password::hash_password,
    },
    error::{ApiError, Json},
    state::AppState,
    users::{
        dto::{CreateUserRequest, PublicUser, UpdateUserRequest, UserResponse},
        repo::{is_unique_violation, User},
    },
};

pub fn users_routes() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users).post(create_user))
        .route(
            "/users/:id",
            get(get_user).put(update_user).delete(delete_user),
        )
}

#[instrument(skip(state))]
pub async fn list_users(
    State(state): State<AppState>,
    AuthUser(_actor): AuthUser,
) -> Result<Json<Vec<PublicUser>>, ApiError> {
    let users = User::list(&state.db).await?;
    Ok(Json(users.into_iter().map(PublicUser::from).collect()))
}

#[instrument(skip(state))]
pub async fn get_user(
    State(state): State<AppState>,
    AuthUser(_actor): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<PublicUser>, ApiError> {
    let user = User::find_by_id(&state.db, id)
        .await?
        .ok_or(ApiError::NotFound("User"))?;
    Ok(Json(user.into()))
}

#[instrument(skip(state, payload))]
pub async fn create_user(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    Json(mut payload): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<UserResponse>), ApiError> {
    payload.email = payload.email.trim().to_string();

    if !is_valid_email(&payload.email) {
        return Err(ApiError::Validation("Invalid email".into()));
    }
    if payload.password.len() < 8 {
        return Err(ApiError::Validation("Password too short".into()));
    }
    if User::find_by_email(&state.db, &payload.email).await?.is_some() {
        warn!(email = %payload.email, "email already exists");
        return Err(ApiError::DuplicateEmail);
    }

    let hash = hash_password(&payload.password)?;
    let user = match User::create(
        &state.db,
        &payload.name,
        &payload.email,
        &payload.phone,
        &hash,
        payload.role,
    )
    .await
    {
        Ok(u) => u,
        Err(e) if is_unique_violation(&e) => return Err(ApiError::DuplicateEmail),
        Err(e) => return Err(e.into()),
    };

    info!(user_id = %user.id, actor = %actor, "user created");
    Ok((
        StatusCode::CREATED,
        Json(UserResponse {
            message: "User created".into(),
            user: user.into(),
        }),
    ))
}

#[instrument(skip(state, payload))]
pub async fn update_user(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateUserRequest>,
) -> Result<Json<UserResponse>, ApiError> {
    if let Some(email) = &payload.email {
        if !is_valid_email(email.trim()) {
            return Err(ApiError::Validation("Invalid email".into()));
        }
    }

    let user = match User::update(
        &state.db,
        id,
        payload.name.as_deref(),
        payload.email.as_deref().map(str::trim),
        payload.phone.as_deref(),
        payload.role,
    )
    .await
    {
        Ok(u) => u,
        Err(e) if is_unique_violation(&e) => return Err(ApiError::DuplicateEmail),
        Err(e) => return Err(e.into()),
    };

    let user = user.ok_or(ApiError::NotFound("User"))?;
    info!(user_id = %user.id, actor = %actor, "user updated");
    Ok(Json(UserResponse {
        message: "User updated".into(),
        user: user.into(),
    }))
}

#[instrument(skip(state))]
pub async fn delete_user(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<MessageResponse>, ApiError> {
    if !User::delete(&state.db, id).await? {
        return Err(ApiError::NotFound("User"));
    }
    info!(user_id = %id, actor = %actor, "user deleted");
    Ok(Json(MessageResponse {
        message: "User deleted".into(),
    }))
}
