use crate::state::AppState;
use axum::{
    routing::{get, patch, post},
    Router,
};

pub mod dto;
pub(crate) mod extractors;
pub mod handlers;
pub mod jwt;
pub mod password;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/signUp", post(handlers::sign_up))
        .route("/signIn", post(handlers::sign_in))
        .route("/forgetPassword", get(handlers::forget_password))
        .route("/updateMyPassword", patch(handlers::update_my_password))
        .route("/updateMyPassword/:token", patch(handlers::reset_password))
}
