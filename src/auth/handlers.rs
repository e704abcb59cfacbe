use anyhow::Context;
use axum::{
    extract::{FromRef, Path, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    Json,
};
use serde_json::{json, Value};
use tracing::{info, instrument, warn};

use crate::{
    auth::{
        dto::{
            SignInRequest, SignUpData, SignUpRequest, SignUpResponse, TokenResponse,
            UpdatePasswordRequest, MIN_PASSWORD_LEN,
        },
        extractors::CurrentUser,
        jwt::JwtKeys,
        password,
    },
    error::ApiError,
    state::AppState,
    users::dto::PublicUser,
    users::repo::{Role, User},
};

/// `jwt` cookie mirroring the response token: a convenience transport the
/// guard accepts interchangeably with the Authorization header.
fn jwt_cookie_headers(state: &AppState, token: &str) -> Result<HeaderMap, ApiError> {
    let keys = JwtKeys::from_ref(state);
    let mut cookie = format!(
        "jwt={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        keys.ttl.as_secs()
    );
    if state.config.environment.is_production() {
        cookie.push_str("; Secure");
    }
    let value = HeaderValue::from_str(&cookie).context("build jwt cookie header")?;
    let mut headers = HeaderMap::new();
    headers.insert(header::SET_COOKIE, value);
    Ok(headers)
}

#[instrument(skip(state, payload))]
pub async fn sign_up(
    State(state): State<AppState>,
    Json(mut payload): Json<SignUpRequest>,
) -> Result<(StatusCode, HeaderMap, Json<SignUpResponse>), ApiError> {
    payload.email = payload.email.trim().to_lowercase();
    payload.validate()?;

    if matches!(payload.role, Some(Role::Admin)) {
        warn!(email = %payload.email, "caller-supplied Admin role ignored at sign-up");
    }

    let hash = password::hash_password_async(payload.password.clone()).await?;
    let user = User::create(
        &state.db,
        payload.name.trim(),
        &payload.email,
        &hash,
        payload.is_active.unwrap_or(true),
    )
    .await?;

    // fire-and-forget; a failed notification never fails the sign-up
    let mailer = state.mailer.clone();
    let url = format!("{}/me", state.config.public_url);
    let (to, name) = (user.email.clone(), user.name.clone());
    tokio::spawn(async move {
        if let Err(e) = mailer.send_welcome(&to, &name, &url).await {
            warn!(error = %e, to = %to, "welcome email failed");
        }
    });

    let keys = JwtKeys::from_ref(&state);
    let token = keys.sign(user.id)?;
    let headers = jwt_cookie_headers(&state, &token)?;

    info!(user_id = %user.id, email = %user.email, "user signed up");
    Ok((
        StatusCode::CREATED,
        headers,
        Json(SignUpResponse {
            status: "success",
            data: SignUpData {
                user: PublicUser::from(user),
            },
            jwt: token,
        }),
    ))
}

#[instrument(skip(state, payload))]
pub async fn sign_in(
    State(state): State<AppState>,
    Json(payload): Json<SignInRequest>,
) -> Result<(HeaderMap, Json<TokenResponse>), ApiError> {
    let email = payload.email.as_deref().map(str::trim).unwrap_or_default();
    let plain = payload.password.as_deref().unwrap_or_default();
    if email.is_empty() || plain.is_empty() {
        return Err(ApiError::Validation(
            "Please provide email and password".into(),
        ));
    }
    let email = email.to_lowercase();

    let user = User::find_by_email_with_secret(&state.db, &email)
        .await?
        .ok_or_else(|| {
            warn!(email = %email, "sign-in for unknown or inactive email");
            ApiError::Authentication("There is no active user associated to this email".into())
        })?;

    let matched =
        password::verify_password_async(plain.to_string(), user.password_hash.clone()).await?;
    if !matched {
        warn!(user_id = %user.user.id, "sign-in with incorrect password");
        return Err(ApiError::Authentication("Password is incorrect.".into()));
    }

    let keys = JwtKeys::from_ref(&state);
    let token = keys.sign(user.user.id)?;
    let headers = jwt_cookie_headers(&state, &token)?;

    info!(user_id = %user.user.id, "user signed in");
    Ok((
        headers,
        Json(TokenResponse {
            status: "success",
            jwt: token,
        }),
    ))
}

#[instrument(skip(state, current, payload))]
pub async fn update_my_password(
    State(state): State<AppState>,
    current: CurrentUser,
    Json(payload): Json<UpdatePasswordRequest>,
) -> Result<(HeaderMap, Json<TokenResponse>), ApiError> {
    if payload.current_password.is_empty() {
        return Err(ApiError::Validation(
            "Please provide the current password".into(),
        ));
    }
    if payload.new_password.is_empty() {
        return Err(ApiError::Validation("Please provide the new password".into()));
    }
    if payload.confirm_password.is_empty() {
        return Err(ApiError::Validation(
            "Please provide the confirm password".into(),
        ));
    }

    let stored = User::find_by_id_with_secret(&state.db, current.0.id)
        .await?
        .ok_or_else(|| {
            ApiError::Authentication("The user belonging to this token no longer exists".into())
        })?;

    let matched = password::verify_password_async(
        payload.current_password.clone(),
        stored.password_hash.clone(),
    )
    .await?;
    if !matched {
        return Err(ApiError::Validation("Current password does not match".into()));
    }

    if payload.new_password.len() < MIN_PASSWORD_LEN {
        return Err(ApiError::Validation(
            "Password must include 8 characters minimum.".into(),
        ));
    }
    if payload.new_password != payload.confirm_password {
        return Err(ApiError::Validation(
            "Password and confirm password do not match".into(),
        ));
    }

    let hash = password::hash_password_async(payload.new_password.clone()).await?;
    let user = User::update_password(&state.db, stored.user.id, &hash)
        .await?
        .ok_or_else(|| {
            ApiError::Authentication("The user belonging to this token no longer exists".into())
        })?;

    // a fresh token; everything issued before the change is now stale
    let keys = JwtKeys::from_ref(&state);
    let token = keys.sign(user.id)?;
    let headers = jwt_cookie_headers(&state, &token)?;

    info!(user_id = %user.id, "password updated");
    Ok((
        headers,
        Json(TokenResponse {
            status: "success",
            jwt: token,
        }),
    ))
}

pub async fn forget_password() -> (StatusCode, Json<Value>) {
    (
        StatusCode::NOT_IMPLEMENTED,
        Json(json!({
            "status": "error",
            "message": "This route is not yet implemented",
        })),
    )
}

pub async fn reset_password(Path(_token): Path<String>) -> (StatusCode, Json<Value>) {
    (
        StatusCode::NOT_IMPLEMENTED,
        Json(json!({
            "status": "error",
            "message": "This route is not yet implemented",
        })),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cookie_carries_the_token_and_flags() {
        let state = AppState::fake();
        let headers = jwt_cookie_headers(&state, "abc.def.ghi").expect("headers");
        let cookie = headers
            .get(header::SET_COOKIE)
            .and_then(|v| v.to_str().ok())
            .expect("set-cookie present");
        assert!(cookie.starts_with("jwt=abc.def.ghi;"));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("Max-Age=300"));
        // fake state is a development config; no Secure attribute
        assert!(!cookie.contains("Secure"));
    }

    #[test]
    fn sign_up_response_envelope_has_no_password_fields() {
        use time::OffsetDateTime;
        use uuid::Uuid;

        let response = SignUpResponse {
            status: "success",
            data: SignUpData {
                user: PublicUser::from(User {
                    id: Uuid::new_v4(),
                    name: "A".into(),
                    email: "a@x.com".into(),
                    role: Role::User,
                    is_active: true,
                    password_changed_at: None,
                    created_at: OffsetDateTime::now_utc(),
                }),
            },
            jwt: "token".into(),
        };
        let body = serde_json::to_value(&response).expect("serialize");
        assert_eq!(body["status"], "success");
        assert_eq!(body["data"]["user"]["role"], "User");
        let user = body["data"]["user"].as_object().expect("user object");
        assert!(!user.contains_key("password"));
        assert!(!user.contains_key("confirmPassword"));
        assert!(!user.contains_key("passwordHash"));
    }
}
