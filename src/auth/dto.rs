use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, FieldError};
use crate::users::dto::PublicUser;
use crate::users::repo::Role;

pub(crate) const MIN_PASSWORD_LEN: usize = 8;

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

/// Body of POST /signUp. `role` is accepted for wire compatibility but never
/// honored: accounts always start as `User`, and elevation is a separate
/// administrative operation.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignUpRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub confirm_password: String,
    #[serde(default)]
    pub role: Option<Role>,
    #[serde(default)]
    pub is_active: Option<bool>,
}

impl SignUpRequest {
    /// Schema-level validation; reports every offending field at once, in
    /// declaration order.
    pub fn validate(&self) -> Result<(), ApiError> {
        let mut fields = Vec::new();

        if self.name.trim().is_empty() {
            fields.push(FieldError {
                field: "name",
                message: "Please provide the name",
            });
        }

        if self.email.is_empty() {
            fields.push(FieldError {
                field: "email",
                message: "Please provide the email",
            });
        } else if !is_valid_email(&self.email) {
            fields.push(FieldError {
                field: "email",
                message: "Please provide a valid email",
            });
        }

        if self.password.is_empty() {
            fields.push(FieldError {
                field: "password",
                message: "Please provide the password",
            });
        } else if self.password.len() < MIN_PASSWORD_LEN {
            fields.push(FieldError {
                field: "password",
                message: "Password must include 8 characters minimum.",
            });
        }

        if self.confirm_password.is_empty() {
            fields.push(FieldError {
                field: "confirmPassword",
                message: "Please provide the confirm password",
            });
        } else if !self.password.is_empty() && self.password != self.confirm_password {
            fields.push(FieldError {
                field: "confirmPassword",
                message: "Password and confirm password do not match",
            });
        }

        if fields.is_empty() {
            Ok(())
        } else {
            Err(ApiError::ValidationFields(fields))
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SignInRequest {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePasswordRequest {
    #[serde(default)]
    pub current_password: String,
    #[serde(default)]
    pub new_password: String,
    #[serde(default)]
    pub confirm_password: String,
}

#[derive(Debug, Serialize)]
pub struct SignUpData {
    pub user: PublicUser,
}

/// 201 envelope for sign-up: the created user (sans secrets) plus a token.
#[derive(Debug, Serialize)]
pub struct SignUpResponse {
    pub status: &'static str,
    pub data: SignUpData,
    pub jwt: String,
}

/// 200 envelope for sign-in and password change.
#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub status: &'static str,
    pub jwt: String,
}
