use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    auth::dto::is_valid_email,
    auth::extractors::CurrentUser,
    error::ApiError,
    state::AppState,
    users::dto::{
        ListUsersResponse, Pagination, PublicUser, UpdateMeRequest, UpdateUserRequest, UserData,
        UserResponse, UsersData,
    },
    users::repo::{Role, User, UserPatch},
};

#[instrument(skip(state, current))]
pub async fn list_users(
    State(state): State<AppState>,
    current: CurrentUser,
    Query(p): Query<Pagination>,
) -> Result<Json<ListUsersResponse>, ApiError> {
    current.restrict_to(&[Role::Admin])?;
    let users = User::list(&state.db, p.limit, p.offset).await?;
    let users: Vec<PublicUser> = users.into_iter().map(PublicUser::from).collect();
    Ok(Json(ListUsersResponse {
        status: "success",
        count: users.len(),
        data: UsersData { users },
    }))
}

#[instrument(skip(state, current))]
pub async fn get_user(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<Json<UserResponse>, ApiError> {
    current.restrict_to(&[Role::Admin])?;
    let user = User::find_by_id(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::NotFound("No user found with that ID".into()))?;
    Ok(Json(UserResponse {
        status: "success",
        data: UserData {
            user: PublicUser::from(user),
        },
    }))
}

/// Account creation lives on /signUp; this route exists only to say so.
pub async fn create_user() -> (StatusCode, Json<Value>) {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({
            "status": "fail",
            "message": "Use the /signUp route instead",
        })),
    )
}

#[instrument(skip(state, current, payload))]
pub async fn update_user(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateUserRequest>,
) -> Result<Json<UserResponse>, ApiError> {
    current.restrict_to(&[Role::Admin])?;

    let email = match payload.email {
        Some(raw) => {
            let email = raw.trim().to_lowercase();
            if !is_valid_email(&email) {
                return Err(ApiError::Validation("Please provide a valid email".into()));
            }
            Some(email)
        }
        None => None,
    };

    let patch = UserPatch {
        name: payload.name,
        email,
        is_active: payload.is_active,
    };
    let user = User::update_by_id(&state.db, id, patch)
        .await?
        .ok_or_else(|| ApiError::NotFound("No user found with that ID".into()))?;

    info!(user_id = %user.id, "user updated");
    Ok(Json(UserResponse {
        status: "success",
        data: UserData {
            user: PublicUser::from(user),
        },
    }))
}

#[instrument(skip(state, current))]
pub async fn delete_user(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    current.restrict_to(&[Role::Admin])?;
    let deleted = User::delete_by_id(&state.db, id).await?;
    if !deleted {
        return Err(ApiError::NotFound("No user found with that ID".into()));
    }
    info!(user_id = %id, "user deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// Self-service profile update; anything beyond the name is ignored.
#[instrument(skip(state, current, payload))]
pub async fn update_me(
    State(state): State<AppState>,
    current: CurrentUser,
    Json(payload): Json<UpdateMeRequest>,
) -> Result<Json<UserResponse>, ApiError> {
    let patch = UserPatch {
        name: payload.name,
        ..UserPatch::default()
    };
    let user = User::update_by_id(&state.db, current.0.id, patch)
        .await?
        .ok_or_else(|| {
            ApiError::Authentication("The user belonging to this token no longer exists".into())
        })?;
    Ok(Json(UserResponse {
        status: "success",
        data: UserData {
            user: PublicUser::from(user),
        },
    }))
}
