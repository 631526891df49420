//! Domain models and wire DTOs.

pub mod job;
pub mod project;
pub mod user;

use chrono::NaiveDateTime;

pub use job::{
    ClaimInfoResponse, ClaimResponse, CountBucket, CountsResponse, FailedJobSummary,
    FailureLine, FailuresResponse, FetchResponse, JobInsert, JobStatus, JobsListResponse,
    OutputResponse, OutputUpdateResponse, PrettyJob, ScoredLine, StatusResponse,
    StatusUpdateResponse, TimePeriod, WorkerJob, WorkerJobUrls,
};
pub use project::{PrettyProject, ProjectSettings, ProjectStatusResponse, ProjectsListResponse};
pub use user::{CreateUserRequest, TokenResponse, UserCreatedResponse, UserResponse};

/// Parse a timestamp in any of the accepted wire formats.
///
/// Naive timestamps only; the service runs on UTC wall-clock time.
pub fn parse_datetime(value: &str) -> Option<NaiveDateTime> {
    const FORMATS: &[&str] = &[
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M",
    ];
    let value = value.trim();
    for format in FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(value, format) {
            return Some(ts);
        }
    }
    // A bare date has no time component to parse into a NaiveDateTime
    value
        .parse::<chrono::NaiveDate>()
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

/// Render a timestamp as a naive ISO-8601 string, e.g. `2000-01-01T10:00:00`.
pub fn fmt_datetime(ts: NaiveDateTime) -> String {
    if ts.and_utc().timestamp_subsec_micros() == 0 {
        ts.format("%Y-%m-%dT%H:%M:%S").to_string()
    } else {
        ts.format("%Y-%m-%dT%H:%M:%S%.6f").to_string()
    }
}

/// Render an optional timestamp; None stays None on the wire.
pub fn fmt_datetime_opt(ts: Option<NaiveDateTime>) -> Option<String> {
    ts.map(fmt_datetime)
}

/// Render a whole number of seconds the way Python's timedelta prints,
/// e.g. `0:30:00` or `2 days, 1:03:20`.
pub fn fmt_eta(total_secs: i64) -> String {
    let days = total_secs / 86_400;
    let rest = total_secs % 86_400;
    let hours = rest / 3600;
    let minutes = (rest % 3600) / 60;
    let seconds = rest % 60;
    if days == 1 {
        format!("1 day, {}:{:02}:{:02}", hours, minutes, seconds)
    } else if days > 1 {
        format!("{} days, {}:{:02}:{:02}", days, hours, minutes, seconds)
    } else {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    }
}
