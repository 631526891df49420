//! Admin endpoints: user administration and token issuance.

use std::time::{SystemTime, UNIX_EPOCH};

use actix_web::{HttpResponse, delete, get, post, web};
use tracing::info;

use crate::api::utcnow;
use crate::auth::{AuthUser, require_admin};
use crate::config::{Config, TOKEN_DURATION_SECS};
use crate::db::{DbPool, users};
use crate::error::{AppError, AppResult};
use crate::models::{CreateUserRequest, TokenResponse, UserCreatedResponse, UserResponse};
use crate::services::{password, token};

/// Configure admin and token routes.
pub fn configure_admin_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(create_user)
        .service(get_user)
        .service(delete_user)
        .service(get_token);
}

/// Create a user allowed to call the authenticated endpoints.
#[utoipa::path(
    post,
    path = "/rest_api/v4/admin/users",
    tag = "Admin",
    request_body = CreateUserRequest,
    responses(
        (status = 201, description = "User created", body = UserCreatedResponse),
        (status = 400, description = "Invalid input or duplicate username", body = crate::error::ErrorResponse),
        (status = 403, description = "Caller is not the admin user", body = crate::error::ErrorResponse)
    )
)]
#[post("/admin/users")]
pub async fn create_user(
    pool: web::Data<DbPool>,
    config: web::Data<Config>,
    caller: AuthUser,
    body: web::Json<CreateUserRequest>,
) -> AppResult<HttpResponse> {
    require_admin(&caller, &config)?;

    if body.username.is_empty() || body.password.is_empty() {
        return Err(AppError::Validation(
            "Missing username or password".to_string(),
        ));
    }

    let hash = password::hash_password(&body.password);
    let userid = users::add_user(pool.connection(), &body.username, &hash, utcnow()).await?;
    info!(username = %body.username, userid, "user created");

    Ok(HttpResponse::Created().json(UserCreatedResponse {
        username: body.username.clone(),
        userid,
    }))
}

/// Look up a user.
#[utoipa::path(
    get,
    path = "/rest_api/v4/admin/users/{id}",
    tag = "Admin",
    params(("id" = i32, Path, description = "User id")),
    responses(
        (status = 200, description = "User info", body = UserResponse),
        (status = 404, description = "No such user", body = crate::error::ErrorResponse)
    )
)]
#[get("/admin/users/{id}")]
pub async fn get_user(
    pool: web::Data<DbPool>,
    config: web::Data<Config>,
    caller: AuthUser,
    path: web::Path<i32>,
) -> AppResult<HttpResponse> {
    require_admin(&caller, &config)?;

    let id = path.into_inner();
    let user = users::get_user(pool.connection(), id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("User {}", id)))?;

    Ok(HttpResponse::Ok().json(UserResponse {
        username: user.username,
    }))
}

/// Delete a user.
#[utoipa::path(
    delete,
    path = "/rest_api/v4/admin/users/{id}",
    tag = "Admin",
    params(("id" = i32, Path, description = "User id")),
    responses(
        (status = 204, description = "User deleted"),
        (status = 404, description = "No such user", body = crate::error::ErrorResponse)
    )
)]
#[delete("/admin/users/{id}")]
pub async fn delete_user(
    pool: web::Data<DbPool>,
    config: web::Data<Config>,
    caller: AuthUser,
    path: web::Path<i32>,
) -> AppResult<HttpResponse> {
    require_admin(&caller, &config)?;

    let id = path.into_inner();
    if !users::delete_user(pool.connection(), id).await? {
        return Err(AppError::NotFound(format!("User {}", id)));
    }
    info!(userid = id, "user deleted");

    Ok(HttpResponse::NoContent().finish())
}

/// Trade basic-auth credentials for a short-lived bearer token.
#[utoipa::path(
    get,
    path = "/rest_api/v4/token",
    tag = "Admin",
    responses(
        (status = 200, description = "Token issued", body = TokenResponse),
        (status = 401, description = "Bad credentials", body = crate::error::ErrorResponse)
    )
)]
#[get("/token")]
pub async fn get_token(
    config: web::Data<Config>,
    caller: AuthUser,
) -> AppResult<HttpResponse> {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| AppError::Internal(format!("clock before epoch: {}", e)))?
        .as_secs();
    let token = token::issue(caller.id, &config.secret_key, now)?;

    Ok(HttpResponse::Ok().json(TokenResponse {
        token,
        duration: TOKEN_DURATION_SECS,
    }))
}
