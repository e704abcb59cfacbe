use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::ApiError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "user_role")]
pub enum Role {
    Admin,
    User,
}

/// User record as handed to everything above the repo. The password hash is
/// absent by construction; callers that need it go through [`UserWithSecret`].
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub is_active: bool,
    pub password_changed_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
}

/// Credential-bearing projection, used only by sign-in and password change.
#[derive(Debug, Clone, FromRow)]
pub struct UserWithSecret {
    #[sqlx(flatten)]
    pub user: User,
    pub password_hash: String,
}

/// Optional per-field update for the administrative PATCH. `None` leaves the
/// stored value untouched.
#[derive(Debug, Default)]
pub struct UserPatch {
    pub name: Option<String>,
    pub email: Option<String>,
    pub is_active: Option<bool>,
}

impl User {
    /// Insert a new account. The email-uniqueness race is settled by the
    /// database constraint: the losing insert comes back as a unique
    /// violation and is reported as a duplicate, never retried.
    pub async fn create(
        db: &PgPool,
        name: &str,
        email: &str,
        password_hash: &str,
        is_active: bool,
    ) -> Result<User, ApiError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (name, email, password_hash, is_active)
            VALUES ($1, $2, $3, $4)
            RETURNING id, name, email, role, is_active, password_changed_at, created_at
            "#,
        )
        .bind(name)
        .bind(email)
        .bind(password_hash)
        .bind(is_active)
        .fetch_one(db)
        .await
        .map_err(|e| classify_unique_violation(e, email))?;
        Ok(user)
    }

    pub async fn find_by_id(db: &PgPool, id: Uuid) -> Result<Option<User>, ApiError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, name, email, role, is_active, password_changed_at, created_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(db)
        .await?;
        Ok(user)
    }

    pub async fn find_by_id_with_secret(
        db: &PgPool,
        id: Uuid,
    ) -> Result<Option<UserWithSecret>, ApiError> {
        let user = sqlx::query_as::<_, UserWithSecret>(
            r#"
            SELECT id, name, email, role, is_active, password_changed_at, created_at,
                   password_hash
            FROM users
            WHERE id = $1 AND is_active
            "#,
        )
        .bind(id)
        .fetch_optional(db)
        .await?;
        Ok(user)
    }

    /// Sign-in lookup. Only active accounts match.
    pub async fn find_by_email_with_secret(
        db: &PgPool,
        email: &str,
    ) -> Result<Option<UserWithSecret>, ApiError> {
        let user = sqlx::query_as::<_, UserWithSecret>(
            r#"
            SELECT id, name, email, role, is_active, password_changed_at, created_at,
                   password_hash
            FROM users
            WHERE email = $1 AND is_active
            "#,
        )
        .bind(email)
        .fetch_optional(db)
        .await?;
        Ok(user)
    }

    /// Store a fresh hash and stamp `password_changed_at` one second in the
    /// past, so a token minted in the same clock tick as the change still
    /// compares as stale.
    pub async fn update_password(
        db: &PgPool,
        id: Uuid,
        password_hash: &str,
    ) -> Result<Option<User>, ApiError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            UPDATE users
            SET password_hash = $2,
                password_changed_at = now() - interval '1 second'
            WHERE id = $1
            RETURNING id, name, email, role, is_active, password_changed_at, created_at
            "#,
        )
        .bind(id)
        .bind(password_hash)
        .fetch_optional(db)
        .await?;
        Ok(user)
    }

    pub async fn list(db: &PgPool, limit: i64, offset: i64) -> Result<Vec<User>, ApiError> {
        let users = sqlx::query_as::<_, User>(
            r#"
            SELECT id, name, email, role, is_active, password_changed_at, created_at
            FROM users
            ORDER BY created_at DESC
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(db)
        .await?;
        Ok(users)
    }

    pub async fn update_by_id(
        db: &PgPool,
        id: Uuid,
        patch: UserPatch,
    ) -> Result<Option<User>, ApiError> {
        let email_for_conflict = patch.email.clone().unwrap_or_default();
        let user = sqlx::query_as::<_, User>(
            r#"
            UPDATE users
            SET name = COALESCE($2, name),
                email = COALESCE($3, email),
                is_active = COALESCE($4, is_active)
            WHERE id = $1
            RETURNING id, name, email, role, is_active, password_changed_at, created_at
            "#,
        )
        .bind(id)
        .bind(patch.name)
        .bind(patch.email)
        .bind(patch.is_active)
        .fetch_optional(db)
        .await
        .map_err(|e| classify_unique_violation(e, &email_for_conflict))?;
        Ok(user)
    }

    pub async fn delete_by_id(db: &PgPool, id: Uuid) -> Result<bool, ApiError> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(db)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

fn classify_unique_violation(e: sqlx::Error, value: &str) -> ApiError {
    if let Some(db_err) = e.as_database_error() {
        if db_err.is_unique_violation() {
            return ApiError::Duplicate(value.to_string());
        }
    }
    ApiError::from(e)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_serializes_with_its_canonical_labels() {
        assert_eq!(serde_json::to_string(&Role::Admin).unwrap(), r#""Admin""#);
        assert_eq!(serde_json::to_string(&Role::User).unwrap(), r#""User""#);
    }

    #[test]
    fn role_deserializes_from_request_payloads() {
        let role: Role = serde_json::from_str(r#""Admin""#).unwrap();
        assert_eq!(role, Role::Admin);
        assert!(serde_json::from_str::<Role>(r#""root""#).is_err());
    }

    #[test]
    fn non_database_errors_stay_internal() {
        let err = classify_unique_violation(sqlx::Error::RowNotFound, "a@x.com");
        assert!(matches!(err, ApiError::Internal(_)));
    }
}
