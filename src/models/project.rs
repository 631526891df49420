//! Project domain models and wire DTOs.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use serde::Serialize;
use serde_json::Value as JsonValue;
use utoipa::ToSchema;

use crate::entity::project;
use crate::models::{fmt_datetime, fmt_datetime_opt, parse_datetime};

/// Fields a caller may set on PUT; everything else on a project row is
/// immutable or maintained by the lifecycle transactions.
const SETTABLE_FIELDS: &[&str] = &["name", "deadline", "processing_image_url", "environment"];

/// Validated PUT payload for a project.
///
/// The outer Option distinguishes "field absent" from an explicit null,
/// which clears the stored value.
#[derive(Debug, Clone, Default)]
pub struct ProjectSettings {
    pub name: Option<String>,
    pub deadline: Option<Option<NaiveDateTime>>,
    pub processing_image_url: Option<Option<String>>,
    pub environment: Option<JsonValue>,
}

impl ProjectSettings {
    pub fn from_value(value: &JsonValue) -> Result<Self, String> {
        let object = value.as_object().ok_or("Expected a JSON object")?;

        let mut unallowed: Vec<&str> = object
            .keys()
            .filter(|k| !SETTABLE_FIELDS.contains(&k.as_str()))
            .map(|k| k.as_str())
            .collect();
        if !unallowed.is_empty() {
            unallowed.sort_unstable();
            return Err(format!(
                "These fields cannot be set by users: {}",
                unallowed.join(", ")
            ));
        }

        let name = match object.get("name") {
            None | Some(JsonValue::Null) => None,
            Some(JsonValue::String(s)) => Some(s.clone()),
            Some(_) => return Err("Expected string in field 'name'".to_string()),
        };

        let deadline = match object.get("deadline") {
            None => None,
            Some(JsonValue::Null) => Some(None),
            Some(JsonValue::String(s)) => Some(Some(
                parse_datetime(s).ok_or_else(|| format!("Bad time format: '{}'", s))?,
            )),
            Some(_) => return Err("Expected string in field 'deadline'".to_string()),
        };

        let processing_image_url = match object.get("processing_image_url") {
            None => None,
            Some(JsonValue::Null) => Some(None),
            Some(JsonValue::String(s)) => Some(Some(s.clone())),
            Some(_) => {
                return Err("Expected string in field 'processing_image_url'".to_string());
            }
        };

        let environment = match object.get("environment") {
            None => None,
            Some(JsonValue::Null) => Some(JsonValue::Object(Default::default())),
            Some(v @ JsonValue::Object(_)) => Some(v.clone()),
            Some(_) => return Err("Expected object in field 'environment'".to_string()),
        };

        Ok(ProjectSettings {
            name,
            deadline,
            processing_image_url,
            environment,
        })
    }

    /// True when the payload carries no field at all (e.g. a bare PUT that
    /// only creates the project).
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.deadline.is_none()
            && self.processing_image_url.is_none()
            && self.environment.is_none()
    }
}

/// Decode the stored environment JSON string; NULL means an empty mapping.
pub fn decode_environment(stored: Option<&str>) -> JsonValue {
    stored
        .and_then(|s| serde_json::from_str(s).ok())
        .unwrap_or_else(|| JsonValue::Object(Default::default()))
}

/// Project links on the wire.
#[derive(Debug, Serialize, ToSchema)]
pub struct PrettyProjectUrls {
    #[serde(rename = "URL-Status")]
    pub status: String,
    #[serde(rename = "URL-Processing-image")]
    pub processing_image: Option<String>,
    #[serde(rename = "URL-Jobs", skip_serializing_if = "Option::is_none")]
    pub jobs: Option<String>,
    #[serde(rename = "URL-DailyCount", skip_serializing_if = "Option::is_none")]
    pub daily_count: Option<String>,
    #[serde(rename = "URL-Workers", skip_serializing_if = "Option::is_none")]
    pub workers: Option<String>,
}

/// Project as rendered on the wire.
#[derive(Debug, Serialize, ToSchema)]
pub struct PrettyProject {
    #[serde(rename = "Id")]
    pub id: String,
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Environment")]
    pub environment: JsonValue,
    #[serde(rename = "CreatedBy")]
    pub created_by: String,
    #[serde(rename = "CreatedAt")]
    pub created_at: String,
    #[serde(rename = "LastJobAddedAt")]
    pub last_job_added_at: Option<String>,
    #[serde(rename = "NrJobsAdded")]
    pub nr_jobs_added: i64,
    #[serde(rename = "LastJobClaimedAt")]
    pub last_job_claimed_at: Option<String>,
    #[serde(rename = "NrJobsClaimed")]
    pub nr_jobs_claimed: i64,
    #[serde(rename = "NrJobsFinished")]
    pub nr_jobs_finished: i64,
    #[serde(rename = "NrJobsFailed")]
    pub nr_jobs_failed: i64,
    #[serde(rename = "TotalProcessingTime")]
    pub total_processing_time: f64,
    #[serde(rename = "Deadline")]
    pub deadline: Option<String>,
    #[serde(rename = "PrioScore")]
    pub prio_score: Option<f64>,
    #[serde(rename = "URLS")]
    pub urls: PrettyProjectUrls,
}

impl PrettyProject {
    pub fn from_model(model: &project::Model, prio_score: Option<f64>, api_root: &str) -> Self {
        PrettyProject {
            id: model.id.clone(),
            name: model.name.clone(),
            environment: decode_environment(model.environment.as_deref()),
            created_by: model.created_by.clone(),
            created_at: fmt_datetime(model.created_at),
            last_job_added_at: fmt_datetime_opt(model.last_added_at),
            nr_jobs_added: model.nr_added,
            last_job_claimed_at: fmt_datetime_opt(model.last_claimed_at),
            nr_jobs_claimed: model.nr_claimed,
            nr_jobs_finished: model.nr_finished,
            nr_jobs_failed: model.nr_failed,
            total_processing_time: model.processing_time_total,
            deadline: fmt_datetime_opt(model.deadline),
            prio_score,
            urls: PrettyProjectUrls {
                status: format!("{}/{}", api_root, model.id),
                processing_image: model.processing_image_url.clone(),
                jobs: None,
                daily_count: None,
                workers: None,
            },
        }
    }

    /// Add the drill-down links shown on the status view.
    pub fn with_status_urls(mut self, api_root: &str) -> Self {
        self.urls.jobs = Some(format!("{}/{}/jobs", api_root, self.id));
        self.urls.daily_count = Some(format!("{}/{}/jobs/count?period=daily", api_root, self.id));
        self.urls.workers = Some(format!("{}/{}/workers", api_root, self.id));
        self
    }
}

/// Project listing envelope.
#[derive(Debug, Serialize, ToSchema)]
pub struct ProjectsListResponse {
    #[serde(rename = "Version")]
    pub version: &'static str,
    #[serde(rename = "Projects")]
    pub projects: Vec<PrettyProject>,
}

/// Project status envelope: the pretty project plus live aggregates.
#[derive(Debug, Serialize, ToSchema)]
pub struct ProjectStatusResponse {
    #[serde(rename = "Version")]
    pub version: &'static str,
    #[serde(rename = "Project")]
    pub project: String,
    #[serde(flatten)]
    pub pretty: PrettyProject,
    /// Row counts per status, Title-cased keys.
    #[serde(rename = "JobStates")]
    pub job_states: BTreeMap<String, i64>,
    /// Estimated time to drain the available pool, from the most recent
    /// complete hourly claim rate. None without claim history.
    #[serde(rename = "ETA")]
    pub eta: Option<String>,
}
