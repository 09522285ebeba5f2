use crate::state::AppState;
use axum::Router;

pub mod dto;
pub mod handlers;
pub mod jwt;
pub mod otp;
pub mod password;

pub fn router() -> Router<AppState> {
    handlers::auth_routes()
}
