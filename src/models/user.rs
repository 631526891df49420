//! User models for the admin endpoints.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Request body for creating a user.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateUserRequest {
    pub username: String,
    pub password: String,
}

/// Response after creating a user.
#[derive(Debug, Serialize, ToSchema)]
pub struct UserCreatedResponse {
    pub username: String,
    pub userid: i32,
}

/// User info response.
#[derive(Debug, Serialize, ToSchema)]
pub struct UserResponse {
    pub username: String,
}

/// Bearer token response.
#[derive(Debug, Serialize, ToSchema)]
pub struct TokenResponse {
    pub token: String,
    /// Seconds until the token expires.
    pub duration: u64,
}
