use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts},
};
use time::OffsetDateTime;
use tracing::warn;

use crate::{
    auth::jwt::JwtKeys,
    error::ApiError,
    state::AppState,
    users::repo::{Role, User},
};

/// Identity established for a protected request: token verified, subject
/// loaded, staleness and active checks passed. Carries no password hash.
pub struct CurrentUser(pub User);

impl CurrentUser {
    /// Pure capability check against a fixed allow-list of roles.
    pub fn restrict_to(&self, allowed: &[Role]) -> Result<(), ApiError> {
        if allowed.contains(&self.0.role) {
            Ok(())
        } else {
            Err(ApiError::Authorization(
                "You do not have permission to perform this action".into(),
            ))
        }
    }
}

/// A verified token is still rejected when it was issued before the
/// subject's most recent password change.
pub(crate) fn token_is_stale(iat: usize, password_changed_at: Option<OffsetDateTime>) -> bool {
    match password_changed_at {
        Some(changed_at) => (iat as i64) < changed_at.unix_timestamp(),
        None => false,
    }
}

fn bearer_token(parts: &Parts) -> Option<String> {
    parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer ").or_else(|| v.strip_prefix("bearer ")))
        .map(str::to_string)
}

/// The `jwt` cookie set on sign-up/sign-in is accepted equivalently to the
/// Authorization header.
fn cookie_token(parts: &Parts) -> Option<String> {
    let raw = parts.headers.get(header::COOKIE)?.to_str().ok()?;
    raw.split(';')
        .map(str::trim)
        .find_map(|kv| kv.strip_prefix("jwt="))
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)
            .or_else(|| cookie_token(parts))
            .ok_or_else(|| {
                ApiError::Authentication(
                    "You are not signed in. Please sign in to get access".into(),
                )
            })?;

        let keys = JwtKeys::from_ref(state);
        let claims = keys.verify(&token).map_err(|e| {
            warn!(error = %e, "token verification failed");
            ApiError::Authentication("Invalid or expired token. Please sign in again".into())
        })?;

        let user = User::find_by_id(&state.db, claims.sub)
            .await?
            .filter(|u| u.is_active)
            .ok_or_else(|| {
                ApiError::Authentication("The user belonging to this token no longer exists".into())
            })?;

        if token_is_stale(claims.iat, user.password_changed_at) {
            warn!(user_id = %user.id, "stale token rejected");
            return Err(ApiError::Authentication(
                "Password was changed recently. Please sign in again".into(),
            ));
        }

        Ok(CurrentUser(user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Duration;
    use uuid::Uuid;

    fn sample_user(role: Role) -> User {
        User {
            id: Uuid::new_v4(),
            name: "A".into(),
            email: "a@x.com".into(),
            role,
            is_active: true,
            password_changed_at: None,
            created_at: OffsetDateTime::now_utc(),
        }
    }

    #[test]
    fn token_with_no_password_change_is_never_stale() {
        assert!(!token_is_stale(0, None));
    }

    #[test]
    fn token_issued_before_the_change_is_stale() {
        let changed_at = OffsetDateTime::now_utc();
        let issued = (changed_at - Duration::hours(1)).unix_timestamp() as usize;
        assert!(token_is_stale(issued, Some(changed_at)));
    }

    #[test]
    fn token_issued_after_the_change_is_accepted() {
        let changed_at = OffsetDateTime::now_utc() - Duration::hours(1);
        let issued = OffsetDateTime::now_utc().unix_timestamp() as usize;
        assert!(!token_is_stale(issued, Some(changed_at)));
    }

    #[test]
    fn token_issued_in_the_same_second_as_the_change_is_accepted() {
        // the store backdates password_changed_at by a second so ties
        // resolve in the caller's favor
        let changed_at = OffsetDateTime::now_utc();
        let issued = changed_at.unix_timestamp() as usize;
        assert!(!token_is_stale(issued, Some(changed_at)));
    }

    #[test]
    fn restrict_to_passes_a_listed_role() {
        let current = CurrentUser(sample_user(Role::Admin));
        assert!(current.restrict_to(&[Role::Admin]).is_ok());
    }

    #[test]
    fn restrict_to_rejects_an_unlisted_role_with_403() {
        let current = CurrentUser(sample_user(Role::User));
        let err = current.restrict_to(&[Role::Admin]).unwrap_err();
        assert_eq!(err.status_code(), axum::http::StatusCode::FORBIDDEN);
        assert_eq!(
            err.to_string(),
            "You do not have permission to perform this action"
        );
    }

    fn parts_with_headers(headers: &[(&str, &str)]) -> Parts {
        let mut builder = axum::http::Request::builder().uri("/");
        for (k, v) in headers {
            builder = builder.header(*k, *v);
        }
        let (parts, _) = builder.body(()).expect("request").into_parts();
        parts
    }

    #[test]
    fn bearer_header_wins_over_cookie() {
        let parts = parts_with_headers(&[
            ("authorization", "Bearer from-header"),
            ("cookie", "jwt=from-cookie"),
        ]);
        assert_eq!(bearer_token(&parts).as_deref(), Some("from-header"));
    }

    #[test]
    fn cookie_token_is_found_among_other_cookies() {
        let parts = parts_with_headers(&[("cookie", "theme=dark; jwt=abc.def.ghi; lang=en")]);
        assert_eq!(cookie_token(&parts).as_deref(), Some("abc.def.ghi"));
    }

    #[test]
    fn missing_credentials_yield_neither_source() {
        let parts = parts_with_headers(&[("authorization", "Basic abc")]);
        assert_eq!(bearer_token(&parts), None);
        assert_eq!(cookie_token(&parts), None);
    }
}
