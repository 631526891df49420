//! Authentication for the REST API.
//!
//! Callers authenticate with HTTP basic auth (username/password against
//! the user table, or a bearer token in the username slot) or with an
//! `Authorization: Bearer` token from `/token`.

mod extractor;

pub use extractor::AuthUser;

use crate::config::Config;
use crate::error::{AppError, AppResult};

/// Gate for the /admin endpoints: only the configured admin username
/// passes.
pub fn require_admin(user: &AuthUser, config: &Config) -> AppResult<()> {
    match &config.admin_user {
        Some(admin) if admin == &user.username => Ok(()),
        _ => Err(AppError::Forbidden),
    }
}
