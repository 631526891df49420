//! Actix-web extractor for authenticated callers.
//!
//! Credential forms, checked in order:
//! 1. `Authorization: Bearer <token>` - a token issued by `/token`
//! 2. `Authorization: Basic <token>:` - the same token in the username
//!    slot with an empty password, for clients that only speak basic auth
//! 3. `Authorization: Basic <username>:<password>` - user-table lookup
//!
//! Password digests are compared in constant time; tokens are verified,
//! never logged.

use actix_web::http::header::AUTHORIZATION;
use actix_web::{FromRequest, HttpRequest, dev::Payload, web};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use futures_util::future::LocalBoxFuture;

use crate::config::Config;
use crate::db::{DbPool, users};
use crate::error::{AppError, AppResult};
use crate::services::{password, token};

/// An authenticated caller, resolved against the user table.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: i32,
    pub username: String,
}

fn basic_credentials(header: &str) -> Option<(String, String)> {
    let encoded = header.strip_prefix("Basic ")?;
    let decoded = BASE64.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (username, pass) = decoded.split_once(':')?;
    Some((username.to_string(), pass.to_string()))
}

async fn resolve(req: &HttpRequest) -> AppResult<AuthUser> {
    let pool = req
        .app_data::<web::Data<DbPool>>()
        .ok_or_else(|| AppError::Internal("DbPool not configured".to_string()))?;
    let config = req
        .app_data::<web::Data<Config>>()
        .ok_or_else(|| AppError::Internal("Config not configured".to_string()))?;

    let header = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(AppError::Unauthorized)?;

    let db = pool.connection();

    if let Some(bearer) = header.strip_prefix("Bearer ") {
        let user_id = token::verify(bearer.trim(), &config.secret_key).ok_or(AppError::Unauthorized)?;
        let user = users::get_user(db, user_id)
            .await?
            .ok_or(AppError::Unauthorized)?;
        return Ok(AuthUser {
            id: user.id,
            username: user.username,
        });
    }

    let (username_or_token, pass) =
        basic_credentials(header).ok_or(AppError::Unauthorized)?;

    // the username slot may carry a token instead of a username
    if let Some(user_id) = token::verify(&username_or_token, &config.secret_key) {
        if let Some(user) = users::get_user(db, user_id).await? {
            return Ok(AuthUser {
                id: user.id,
                username: user.username,
            });
        }
    }

    let user = users::find_by_username(db, &username_or_token)
        .await?
        .ok_or(AppError::Unauthorized)?;
    if !password::verify_password(&pass, &user.password_hash) {
        return Err(AppError::Unauthorized);
    }

    Ok(AuthUser {
        id: user.id,
        username: user.username,
    })
}

impl FromRequest for AuthUser {
    type Error = AppError;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let req = req.clone();
        Box::pin(async move { resolve(&req).await })
    }
}
