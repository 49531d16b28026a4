pub mod auth_service;
pub mod sweeper;

pub use auth_service::{get_auth_token, validate_jwt, Identity, IdentityResolver};
