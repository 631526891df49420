//! Job domain models and wire DTOs.
//!
//! The wire format renames internal snake_case to PascalCase and groups
//! links under an `URLS` object with `URL-…` keys.

use std::collections::BTreeMap;

use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use utoipa::ToSchema;

use crate::entity::job;
use crate::models::{fmt_datetime_opt, parse_datetime};

/// Job lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum JobStatus {
    Available,
    Claimed,
    Started,
    Finished,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Available => "AVAILABLE",
            Self::Claimed => "CLAIMED",
            Self::Started => "STARTED",
            Self::Finished => "FINISHED",
            Self::Failed => "FAILED",
        }
    }

    /// Title-cased form used in count keys and status maps, e.g. `Claimed`.
    pub fn title(&self) -> &'static str {
        match self {
            Self::Available => "Available",
            Self::Claimed => "Claimed",
            Self::Started => "Started",
            Self::Finished => "Finished",
            Self::Failed => "Failed",
        }
    }

    /// Parse a wire status; lower-case input is accepted.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "AVAILABLE" => Some(Self::Available),
            "CLAIMED" => Some(Self::Claimed),
            "STARTED" => Some(Self::Started),
            "FINISHED" => Some(Self::Finished),
            "FAILED" => Some(Self::Failed),
            _ => None,
        }
    }

    /// The timestamp column that records entry into this state.
    pub fn timestamp_column(&self) -> &'static str {
        match self {
            Self::Available => "added_at",
            Self::Claimed | Self::Started => "claimed_at",
            Self::Finished => "finished_at",
            Self::Failed => "failed_at",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Grouping granularity for the count endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ToSchema)]
pub enum TimePeriod {
    Hourly,
    Daily,
    Monthly,
    Yearly,
}

impl TimePeriod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hourly => "HOURLY",
            Self::Daily => "DAILY",
            Self::Monthly => "MONTHLY",
            Self::Yearly => "YEARLY",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Self::Hourly => "Hourly",
            Self::Daily => "Daily",
            Self::Monthly => "Monthly",
            Self::Yearly => "Yearly",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "HOURLY" => Some(Self::Hourly),
            "DAILY" => Some(Self::Daily),
            "MONTHLY" => Some(Self::Monthly),
            "YEARLY" => Some(Self::Yearly),
            _ => None,
        }
    }

    /// Bucket label for a bucket starting at `start`.
    pub fn label(&self, start: NaiveDateTime) -> String {
        let format = match self {
            Self::Hourly => "%Y-%m-%d %H:00",
            Self::Daily => "%Y-%m-%d",
            Self::Monthly => "%Y-%m",
            Self::Yearly => "%Y",
        };
        start.format(format).to_string()
    }

    /// Nominal bucket width; months use 365/12 days like the count links.
    pub fn delta(&self) -> Duration {
        match self {
            Self::Hourly => Duration::hours(1),
            Self::Daily => Duration::days(1),
            Self::Monthly => Duration::hours(730),
            Self::Yearly => Duration::days(365),
        }
    }
}

/// Fields the caller must provide when posting a job.
const REQUIRED_FIELDS: &[&str] = &["id", "source_url"];

/// Fields the caller may provide. The timestamp/status/worker fields exist
/// for backdated inserts (imports and fixtures); everything else is
/// internal and rejected.
const SETTABLE_FIELDS: &[&str] = &[
    "id",
    "type",
    "source_url",
    "target_url",
    "view_result_url",
    "added_timestamp",
    "claimed_timestamp",
    "finished_timestamp",
    "failed_timestamp",
    "current_status",
    "worker",
    "processing_time",
];

/// A validated job insert payload.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobInsert {
    pub id: String,
    pub job_type: Option<String>,
    pub source_url: String,
    pub target_url: Option<String>,
    pub view_result_url: Option<String>,
    pub added_at: Option<NaiveDateTime>,
    pub claimed_at: Option<NaiveDateTime>,
    pub finished_at: Option<NaiveDateTime>,
    pub failed_at: Option<NaiveDateTime>,
    pub current_status: Option<JobStatus>,
    pub worker: Option<String>,
    pub processing_time: Option<f64>,
}

impl JobInsert {
    /// Validate a dynamic JSON payload against the settable field set.
    pub fn from_value(value: &JsonValue) -> Result<Self, String> {
        let object = value.as_object().ok_or("Expected a JSON object")?;

        let missing: Vec<&str> = REQUIRED_FIELDS
            .iter()
            .filter(|f| !object.contains_key(**f))
            .copied()
            .collect();
        if !missing.is_empty() {
            return Err(format!("Missing required fields: {}", missing.join(", ")));
        }

        let mut unallowed: Vec<&str> = object
            .keys()
            .filter(|k| !SETTABLE_FIELDS.contains(&k.as_str()))
            .map(|k| k.as_str())
            .collect();
        if !unallowed.is_empty() {
            unallowed.sort_unstable();
            return Err(format!(
                "These fields do not exist or are for internal use: {}",
                unallowed.join(", ")
            ));
        }

        fn string_field(object: &serde_json::Map<String, JsonValue>, field: &str)
        -> Result<Option<String>, String> {
            match object.get(field) {
                None | Some(JsonValue::Null) => Ok(None),
                Some(JsonValue::String(s)) => Ok(Some(s.clone())),
                Some(_) => Err(format!("Expected string in field '{}'", field)),
            }
        }

        fn time_field(object: &serde_json::Map<String, JsonValue>, field: &str)
        -> Result<Option<NaiveDateTime>, String> {
            match string_field(object, field)? {
                None => Ok(None),
                Some(raw) => parse_datetime(&raw)
                    .map(Some)
                    .ok_or_else(|| format!("Bad time format: '{}'", raw)),
            }
        }

        let current_status = match string_field(object, "current_status")? {
            None => None,
            Some(raw) => Some(
                JobStatus::parse(&raw).ok_or_else(|| format!("Unsupported status: '{}'", raw))?,
            ),
        };

        let processing_time = match object.get("processing_time") {
            None | Some(JsonValue::Null) => None,
            Some(v) => Some(
                v.as_f64()
                    .ok_or("Expected number in field 'processing_time'")?,
            ),
        };

        Ok(JobInsert {
            id: string_field(object, "id")?.ok_or("Expected string in field 'id'")?,
            job_type: string_field(object, "type")?,
            source_url: string_field(object, "source_url")?
                .ok_or("Expected string in field 'source_url'")?,
            target_url: string_field(object, "target_url")?,
            view_result_url: string_field(object, "view_result_url")?,
            added_at: time_field(object, "added_timestamp")?,
            claimed_at: time_field(object, "claimed_timestamp")?,
            finished_at: time_field(object, "finished_timestamp")?,
            failed_at: time_field(object, "failed_timestamp")?,
            current_status,
            worker: string_field(object, "worker")?,
            processing_time,
        })
    }

    /// A backdated insert claims the job when both claim markers are given.
    pub fn is_claimed(&self) -> bool {
        self.claimed_at.is_some() && self.worker.is_some()
    }

    /// Whether an existing row carries exactly this payload, which makes a
    /// repeated POST idempotent instead of a conflict.
    pub fn matches(&self, row: &job::Model) -> bool {
        self.job_type == row.job_type
            && self.source_url == row.source_url
            && self.target_url == row.target_url
            && self.view_result_url == row.view_result_url
            && self.added_at.is_none_or(|ts| ts == row.added_at)
            && self.claimed_at == row.claimed_at
            && self.finished_at == row.finished_at
            && self.failed_at == row.failed_at
            && self
                .current_status
                .is_none_or(|s| s.as_str() == row.current_status)
            && self.worker == row.worker
            && self.processing_time == row.processing_time
    }
}

/// Job links on the wire.
#[derive(Debug, Serialize, ToSchema)]
pub struct PrettyJobUrls {
    #[serde(rename = "URL-Input")]
    pub input: Option<String>,
    #[serde(rename = "URL-Output")]
    pub output: String,
    #[serde(rename = "URL-Result")]
    pub result: Option<String>,
}

/// Job as listed on the wire; worker output is deliberately omitted.
#[derive(Debug, Serialize, ToSchema)]
pub struct PrettyJob {
    #[serde(rename = "Id")]
    pub id: String,
    #[serde(rename = "Type")]
    pub job_type: Option<String>,
    #[serde(rename = "Status")]
    pub status: String,
    #[serde(rename = "Added")]
    pub added: Option<String>,
    #[serde(rename = "Claimed")]
    pub claimed: Option<String>,
    #[serde(rename = "IsClaimed")]
    pub is_claimed: bool,
    #[serde(rename = "Finished")]
    pub finished: Option<String>,
    #[serde(rename = "Failed")]
    pub failed: Option<String>,
    #[serde(rename = "ProcessingTime")]
    pub processing_time: Option<f64>,
    #[serde(rename = "Worker")]
    pub worker: Option<String>,
    #[serde(rename = "URLS")]
    pub urls: PrettyJobUrls,
}

/// Build the canonical URL of a per-job endpoint.
pub fn make_job_url(api_root: &str, project: &str, job_id: &str, endpoint: &str) -> String {
    format!("{}/{}/jobs/{}/{}", api_root, project, job_id, endpoint)
}

impl PrettyJob {
    pub fn from_model(model: job::Model, api_root: &str) -> Self {
        let output_url = make_job_url(api_root, &model.project_id, &model.id, "output");
        PrettyJob {
            urls: PrettyJobUrls {
                input: Some(model.source_url),
                output: output_url,
                result: model.view_result_url,
            },
            id: model.id,
            job_type: model.job_type,
            status: model.current_status,
            added: fmt_datetime_opt(Some(model.added_at)),
            claimed: fmt_datetime_opt(model.claimed_at),
            is_claimed: model.claimed,
            finished: fmt_datetime_opt(model.finished_at),
            failed: fmt_datetime_opt(model.failed_at),
            processing_time: model.processing_time,
            worker: model.worker,
        }
    }
}

/// Job listing response envelope.
#[derive(Debug, Serialize, ToSchema)]
pub struct JobsListResponse {
    #[serde(rename = "Version")]
    pub version: &'static str,
    #[serde(rename = "Project")]
    pub project: String,
    #[serde(rename = "Jobs")]
    pub jobs: Vec<PrettyJob>,
    #[serde(rename = "Status")]
    pub status: Option<String>,
    #[serde(rename = "Start")]
    pub start: Option<String>,
    #[serde(rename = "End")]
    pub end: Option<String>,
    #[serde(rename = "Worker")]
    pub worker: Option<String>,
}

/// The links a worker needs to run one job.
#[derive(Debug, Serialize, ToSchema)]
pub struct WorkerJobUrls {
    #[serde(rename = "URL-image")]
    pub image: Option<String>,
    #[serde(rename = "URL-source")]
    pub source: String,
    #[serde(rename = "URL-target")]
    pub target: Option<String>,
    #[serde(rename = "URL-claim")]
    pub claim: String,
    #[serde(rename = "URL-status")]
    pub status: String,
    #[serde(rename = "URL-output")]
    pub output: String,
}

/// Worker-facing job shape returned by the fetch endpoints.
#[derive(Debug, Serialize, ToSchema)]
pub struct WorkerJob {
    #[serde(rename = "JobID")]
    pub job_id: String,
    #[serde(rename = "Environment")]
    pub environment: JsonValue,
    #[serde(rename = "URLS")]
    pub urls: WorkerJobUrls,
}

impl WorkerJob {
    /// Combine a job row with its project's image and environment.
    pub fn new(
        model: job::Model,
        image_url: Option<String>,
        environment: JsonValue,
        api_root: &str,
    ) -> Self {
        let project = &model.project_id;
        WorkerJob {
            urls: WorkerJobUrls {
                image: image_url,
                source: model.source_url.clone(),
                target: model.target_url.clone(),
                claim: make_job_url(api_root, project, &model.id, "claim"),
                status: make_job_url(api_root, project, &model.id, "status"),
                output: make_job_url(api_root, project, &model.id, "output"),
            },
            environment,
            job_id: model.id,
        }
    }
}

/// Fetch response envelope.
#[derive(Debug, Serialize, ToSchema)]
pub struct FetchResponse {
    #[serde(rename = "Version")]
    pub version: &'static str,
    #[serde(rename = "Project")]
    pub project: String,
    #[serde(rename = "Job")]
    pub job: WorkerJob,
}

/// One time bucket of the count endpoint.
#[derive(Debug, Serialize, ToSchema)]
pub struct CountBucket {
    #[serde(rename = "Period")]
    pub period: String,
    #[serde(rename = "JobsClaimed")]
    pub jobs_claimed: i64,
    #[serde(rename = "JobsFinished")]
    pub jobs_finished: i64,
    #[serde(rename = "JobsFailed")]
    pub jobs_failed: i64,
    #[serde(rename = "ActiveWorkers")]
    pub active_workers: i64,
    #[serde(rename = "URLS")]
    pub urls: BTreeMap<String, String>,
}

/// Count response envelope.
#[derive(Debug, Serialize, ToSchema)]
pub struct CountsResponse {
    #[serde(rename = "Version")]
    pub version: &'static str,
    #[serde(rename = "Project")]
    pub project: String,
    #[serde(rename = "PeriodType")]
    pub period_type: String,
    #[serde(rename = "Start")]
    pub start: Option<String>,
    #[serde(rename = "End")]
    pub end: Option<String>,
    #[serde(rename = "Counts")]
    pub counts: Vec<CountBucket>,
}

/// A line with its analyzer score.
#[derive(Debug, Serialize, ToSchema)]
pub struct ScoredLine {
    #[serde(rename = "Line")]
    pub line: String,
    #[serde(rename = "Score")]
    pub score: f64,
}

/// One cluster of error lines sharing the same set of failed jobs.
#[derive(Debug, Serialize, ToSchema)]
pub struct FailureLine {
    #[serde(rename = "Score")]
    pub score: f64,
    #[serde(rename = "Line")]
    pub line: String,
    #[serde(rename = "CommonLines")]
    pub common_lines: Vec<ScoredLine>,
    #[serde(rename = "Jobs")]
    pub jobs: Vec<String>,
}

/// Failed-job summary keyed by job id in the failures response.
#[derive(Debug, Serialize, ToSchema)]
pub struct FailedJobSummary {
    #[serde(rename = "Id")]
    pub id: String,
    #[serde(rename = "ProcessingTime")]
    pub processing_time: Option<f64>,
    #[serde(rename = "Worker")]
    pub worker: Option<String>,
    #[serde(rename = "Failed")]
    pub failed: Option<String>,
}

/// Failure analysis response envelope.
#[derive(Debug, Serialize, ToSchema)]
pub struct FailuresResponse {
    #[serde(rename = "Version")]
    pub version: &'static str,
    #[serde(rename = "Project")]
    pub project: String,
    #[serde(rename = "Start")]
    pub start: Option<String>,
    #[serde(rename = "End")]
    pub end: Option<String>,
    #[serde(rename = "Lines")]
    pub lines: Vec<FailureLine>,
    #[serde(rename = "Jobs")]
    pub jobs: BTreeMap<String, FailedJobSummary>,
}

/// Claim state view.
#[derive(Debug, Serialize, ToSchema)]
pub struct ClaimInfoResponse {
    #[serde(rename = "Version")]
    pub version: &'static str,
    #[serde(rename = "Project")]
    pub project: String,
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "Claimed")]
    pub claimed: bool,
    #[serde(rename = "ClaimedByWorker")]
    pub claimed_by_worker: Option<String>,
    #[serde(rename = "ClaimedAtTime")]
    pub claimed_at_time: Option<String>,
}

/// Successful claim acknowledgement.
#[derive(Debug, Serialize, ToSchema)]
pub struct ClaimResponse {
    #[serde(rename = "Version")]
    pub version: &'static str,
    #[serde(rename = "Project")]
    pub project: String,
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "Call")]
    pub call: &'static str,
    #[serde(rename = "Time", skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
    #[serde(rename = "ClaimedBy", skip_serializing_if = "Option::is_none")]
    pub claimed_by: Option<String>,
}

/// Current status view.
#[derive(Debug, Serialize, ToSchema)]
pub struct StatusResponse {
    #[serde(rename = "Status")]
    pub status: String,
}

/// Status update acknowledgement.
#[derive(Debug, Serialize, ToSchema)]
pub struct StatusUpdateResponse {
    #[serde(rename = "Version")]
    pub version: &'static str,
    #[serde(rename = "Project")]
    pub project: String,
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "Call")]
    pub call: &'static str,
    #[serde(rename = "Status")]
    pub status: String,
}

/// Worker output view.
#[derive(Debug, Serialize, ToSchema)]
pub struct OutputResponse {
    #[serde(rename = "Output")]
    pub output: Option<String>,
}

/// Output update acknowledgement.
#[derive(Debug, Serialize, ToSchema)]
pub struct OutputUpdateResponse {
    #[serde(rename = "Version")]
    pub version: &'static str,
    #[serde(rename = "Project")]
    pub project: String,
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "Call")]
    pub call: &'static str,
}
