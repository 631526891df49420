//! API endpoint modules.

pub mod admin;
pub mod health;
pub mod job;
pub mod jobs;
pub mod openapi;
pub mod projects;

pub use admin::configure_admin_routes;
pub use health::configure_health_routes;
pub use job::configure_job_routes;
pub use jobs::configure_jobs_routes;
pub use openapi::ApiDoc;
pub use projects::configure_project_routes;

use actix_web::HttpRequest;
use chrono::{NaiveDateTime, Timelike};

use crate::error::{AppError, AppResult};
use crate::models::parse_datetime;

/// API version segment on the wire.
pub const API_VERSION: &str = "v4";

/// Absolute root of the API, derived from the request so links survive
/// reverse proxies, e.g. `http://localhost:5000/rest_api/v4`.
pub fn api_root(req: &HttpRequest) -> String {
    let info = req.connection_info();
    format!("{}://{}/rest_api/{}", info.scheme(), info.host(), API_VERSION)
}

/// Project identifiers: ASCII, starts with a letter, at most 64 chars.
pub fn validate_project_name(project: &str) -> AppResult<()> {
    let mut chars = project.chars();
    let valid = match chars.next() {
        Some(first) => {
            first.is_ascii_alphabetic()
                && project.len() <= 64
                && chars.all(|c| c.is_ascii_alphanumeric())
        }
        None => false,
    };
    if valid {
        Ok(())
    } else {
        Err(AppError::Validation(format!(
            "Bad project name: '{}'",
            project
        )))
    }
}

/// Parse an optional timestamp query parameter.
pub fn parse_time_param(value: Option<&str>) -> AppResult<Option<NaiveDateTime>> {
    match value {
        None | Some("") => Ok(None),
        Some(raw) => parse_datetime(raw)
            .map(Some)
            .ok_or_else(|| AppError::Validation(format!("Bad time format: '{}'", raw))),
    }
}

/// Current UTC wall-clock time, truncated to whole seconds so stored
/// timestamps round-trip through the wire format.
pub fn utcnow() -> NaiveDateTime {
    let now = chrono::Utc::now().naive_utc();
    now.with_nanosecond(0).unwrap_or(now)
}
