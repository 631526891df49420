//! Job collection endpoints: listing, insertion, worker fetch, time
//! bucket counts and failure analysis.

use std::collections::BTreeMap;

use actix_web::{HttpRequest, HttpResponse, get, post, web};
use chrono::NaiveDateTime;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use tracing::{info, warn};

use crate::api::{API_VERSION, api_root, parse_time_param, utcnow, validate_project_name};
use crate::auth::AuthUser;
use crate::db::{DbPool, jobs};
use crate::error::{AppError, AppResult};
use crate::models::{
    CountBucket, CountsResponse, FailedJobSummary, FailuresResponse, FetchResponse, JobInsert,
    JobStatus, JobsListResponse, PrettyJob, TimePeriod, WorkerJob, fmt_datetime,
    fmt_datetime_opt,
};
use crate::services::{analyzer, lifecycle};

/// Configure job collection routes. `fetch` and `count` are literal
/// segments below `jobs` and must precede the per-job routes.
pub fn configure_jobs_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(fetch_job)
        .service(count_jobs)
        .service(list_jobs)
        .service(post_jobs)
        .service(failures);
}

#[derive(Debug, Deserialize)]
pub struct ListJobsQuery {
    #[serde(rename = "type")]
    job_type: Option<String>,
    status: Option<String>,
    worker: Option<String>,
    start: Option<String>,
    end: Option<String>,
    limit: Option<u64>,
}

/// List jobs, optionally filtered by type, worker, status and a time
/// window on the status's timestamp.
#[utoipa::path(
    get,
    path = "/rest_api/v4/{project}/jobs",
    tag = "Jobs",
    params(
        ("project" = String, Path, description = "Project id"),
        ("type" = Option<String>, Query, description = "Job type filter"),
        ("status" = Option<String>, Query, description = "Status filter"),
        ("worker" = Option<String>, Query, description = "Worker filter"),
        ("start" = Option<String>, Query, description = "Window start; requires status"),
        ("end" = Option<String>, Query, description = "Window end; requires status"),
        ("limit" = Option<u64>, Query, description = "Maximum rows")
    ),
    responses(
        (status = 200, description = "Job list", body = JobsListResponse),
        (status = 400, description = "Bad filter", body = crate::error::ErrorResponse)
    )
)]
#[get("/{project}/jobs")]
pub async fn list_jobs(
    req: HttpRequest,
    pool: web::Data<DbPool>,
    path: web::Path<String>,
    query: web::Query<ListJobsQuery>,
) -> AppResult<HttpResponse> {
    let project_id = path.into_inner();
    validate_project_name(&project_id)?;

    let status = match query.status.as_deref() {
        None | Some("") => None,
        Some(raw) => Some(
            JobStatus::parse(raw)
                .ok_or_else(|| AppError::Validation(format!("Unsupported status: '{}'", raw)))?,
        ),
    };
    let start = parse_time_param(query.start.as_deref())?;
    let end = parse_time_param(query.end.as_deref())?;

    let mut filter = jobs::JobFilter {
        job_type: query.job_type.clone(),
        worker: query.worker.clone(),
        status,
        limit: query.limit,
        ..Default::default()
    };

    if start.is_some() || end.is_some() {
        let Some(state) = status else {
            return Err(AppError::Validation(
                "Param @start and @end can only be used together with @status".to_string(),
            ));
        };
        if !matches!(
            state,
            JobStatus::Claimed | JobStatus::Finished | JobStatus::Failed
        ) {
            return Err(AppError::Validation(format!(
                "Unsupported status: '{}'",
                state
            )));
        }
        // the window selects on the state's timestamp, not the current
        // status: a FINISHED job still counts as claimed in its window
        filter.status = None;
        filter.time_state = Some(state);
        filter.start = start;
        filter.end = end;
    }

    let models = jobs::list_jobs(pool.connection(), &project_id, &filter).await?;
    let root = api_root(&req);
    let pretty = models
        .into_iter()
        .map(|m| PrettyJob::from_model(m, &root))
        .collect();

    Ok(HttpResponse::Ok().json(JobsListResponse {
        version: API_VERSION,
        project: project_id,
        jobs: pretty,
        status: status.map(|s| s.as_str().to_string()),
        start: fmt_datetime_opt(start),
        end: fmt_datetime_opt(end),
        worker: query.worker.clone(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct PostJobsQuery {
    now: Option<String>,
}

/// Add one job or a list of jobs. Lists are all-or-nothing; item errors
/// are reported as `Job#<i>: <message>`.
#[utoipa::path(
    post,
    path = "/rest_api/v4/{project}/jobs",
    tag = "Jobs",
    params(
        ("project" = String, Path, description = "Project id"),
        ("now" = Option<String>, Query, description = "Backdated insert time")
    ),
    responses(
        (status = 201, description = "Jobs stored"),
        (status = 400, description = "Validation failure", body = crate::error::ErrorResponse),
        (status = 409, description = "Conflicting job id", body = crate::error::ErrorResponse)
    )
)]
#[post("/{project}/jobs")]
pub async fn post_jobs(
    pool: web::Data<DbPool>,
    caller: AuthUser,
    path: web::Path<String>,
    query: web::Query<PostJobsQuery>,
    body: web::Json<JsonValue>,
) -> AppResult<HttpResponse> {
    let project_id = path.into_inner();
    validate_project_name(&project_id)?;
    let backdate = parse_time_param(query.now.as_deref())?;

    let mut inserts: Vec<JobInsert> = match &*body {
        JsonValue::Object(_) => {
            vec![JobInsert::from_value(&body).map_err(AppError::Validation)?]
        }
        JsonValue::Array(items) => {
            let mut inserts = Vec::with_capacity(items.len());
            let mut errors: Vec<String> = Vec::new();
            for (index, item) in items.iter().enumerate() {
                match JobInsert::from_value(item) {
                    Ok(insert) => inserts.push(insert),
                    Err(message) => errors.push(format!("Job#{}: {}", index, message)),
                }
            }
            if !errors.is_empty() {
                return Err(AppError::Validation(errors.join("\n")));
            }
            inserts
        }
        _ => return Err(AppError::Validation("Invalid input".to_string())),
    };

    if let Some(backdate) = backdate {
        for insert in &mut inserts {
            insert.added_at = Some(backdate);
        }
    }

    let inserted = lifecycle::insert_jobs(
        pool.connection(),
        &project_id,
        &caller.username,
        &inserts,
        utcnow(),
    )
    .await
    .inspect_err(|e| {
        if matches!(e, AppError::Conflict(_)) {
            warn!(project = %project_id, user = %caller.username, "job insert conflict");
        }
    })?;
    info!(
        project = %project_id,
        user = %caller.username,
        inserted,
        "jobs added"
    );

    Ok(HttpResponse::Created().finish())
}

/// Fetch the next unclaimed job of this project in the worker shape.
#[utoipa::path(
    get,
    path = "/rest_api/v4/{project}/jobs/fetch",
    tag = "Jobs",
    params(("project" = String, Path, description = "Project id")),
    responses(
        (status = 200, description = "A job to work on", body = FetchResponse),
        (status = 404, description = "Nothing unclaimed", body = crate::error::ErrorResponse)
    )
)]
#[get("/{project}/jobs/fetch")]
pub async fn fetch_job(
    req: HttpRequest,
    pool: web::Data<DbPool>,
    _caller: AuthUser,
    path: web::Path<String>,
) -> AppResult<HttpResponse> {
    let project_id = path.into_inner();
    validate_project_name(&project_id)?;

    let (job, image_url, environment) = lifecycle::fetch_unclaimed(pool.connection(), &project_id)
        .await?
        .ok_or(AppError::NoJobsAvailable)?;

    let root = api_root(&req);
    Ok(HttpResponse::Ok().json(FetchResponse {
        version: API_VERSION,
        project: project_id,
        job: WorkerJob::new(job, image_url, environment, &root),
    }))
}

#[derive(Debug, Deserialize)]
pub struct CountJobsQuery {
    period: Option<String>,
    start: Option<String>,
    end: Option<String>,
}

fn count_url(
    root: &str,
    project: &str,
    state: JobStatus,
    start: NaiveDateTime,
    end: NaiveDateTime,
) -> String {
    format!(
        "{}/{}/jobs?status={}&start={}&end={}",
        root,
        project,
        state.as_str(),
        urlencoding::encode(&fmt_datetime(start)),
        urlencoding::encode(&fmt_datetime(end)),
    )
}

/// Count jobs per time bucket, split by lifecycle state, with distinct
/// active workers per bucket.
#[utoipa::path(
    get,
    path = "/rest_api/v4/{project}/jobs/count",
    tag = "Jobs",
    params(
        ("project" = String, Path, description = "Project id"),
        ("period" = Option<String>, Query, description = "HOURLY, DAILY, MONTHLY or YEARLY"),
        ("start" = Option<String>, Query, description = "Window start"),
        ("end" = Option<String>, Query, description = "Window end")
    ),
    responses(
        (status = 200, description = "Bucketed counts", body = CountsResponse),
        (status = 400, description = "Bad period or window", body = crate::error::ErrorResponse)
    )
)]
#[get("/{project}/jobs/count")]
pub async fn count_jobs(
    req: HttpRequest,
    pool: web::Data<DbPool>,
    path: web::Path<String>,
    query: web::Query<CountJobsQuery>,
) -> AppResult<HttpResponse> {
    let project_id = path.into_inner();
    validate_project_name(&project_id)?;

    let period = match query.period.as_deref() {
        None | Some("") => TimePeriod::Daily,
        Some(raw) => TimePeriod::parse(raw)
            .ok_or_else(|| AppError::Validation(format!("Unsupported period: '{}'", raw)))?,
    };
    let start = parse_time_param(query.start.as_deref())?;
    let end = parse_time_param(query.end.as_deref())?;

    let db = pool.connection();
    let root = api_root(&req);
    let mut buckets: BTreeMap<String, CountBucket> = BTreeMap::new();

    fn bucket_entry<'a>(
        buckets: &'a mut BTreeMap<String, CountBucket>,
        label: &str,
    ) -> &'a mut CountBucket {
        buckets
            .entry(label.to_string())
            .or_insert_with(|| CountBucket {
                period: label.to_string(),
                jobs_claimed: 0,
                jobs_finished: 0,
                jobs_failed: 0,
                active_workers: 0,
                urls: BTreeMap::new(),
            })
    }

    for state in [JobStatus::Claimed, JobStatus::Failed, JobStatus::Finished] {
        let counts =
            jobs::count_by_time_period(db, &project_id, state, period, start, end, false).await?;
        for count in counts {
            let bucket = bucket_entry(&mut buckets, &count.label);
            match state {
                JobStatus::Claimed => bucket.jobs_claimed = count.count,
                JobStatus::Failed => bucket.jobs_failed = count.count,
                _ => bucket.jobs_finished = count.count,
            }
            bucket.urls.insert(
                format!("URL-Jobs{}", state.title()),
                count_url(&root, &project_id, state, count.start, count.end),
            );
            if period == TimePeriod::Daily {
                bucket.urls.insert(
                    "URL-Zoom".to_string(),
                    format!(
                        "{}/{}/jobs/count?period=HOURLY&start={}&end={}",
                        root,
                        project_id,
                        urlencoding::encode(&fmt_datetime(count.start)),
                        urlencoding::encode(&fmt_datetime(count.end)),
                    ),
                );
            }
        }
    }

    let worker_counts =
        jobs::count_by_time_period(db, &project_id, JobStatus::Claimed, period, start, end, true)
            .await?;
    for count in worker_counts {
        let bucket = bucket_entry(&mut buckets, &count.label);
        bucket.active_workers = count.count;
        bucket.urls.insert(
            "URL-ActiveWorkers".to_string(),
            format!(
                "{}/{}/workers?start={}&end={}",
                root,
                project_id,
                urlencoding::encode(&fmt_datetime(count.start)),
                urlencoding::encode(&fmt_datetime(count.end)),
            ),
        );
    }

    Ok(HttpResponse::Ok().json(CountsResponse {
        version: API_VERSION,
        project: project_id,
        period_type: period.title().to_string(),
        start: fmt_datetime_opt(start),
        end: fmt_datetime_opt(end),
        counts: buckets.into_values().collect(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct FailuresQuery {
    start: Option<String>,
    end: Option<String>,
}

/// Analyze worker output across failed jobs and rank the informative
/// error lines.
#[utoipa::path(
    get,
    path = "/rest_api/v4/{project}/failures",
    tag = "Jobs",
    params(
        ("project" = String, Path, description = "Project id"),
        ("start" = Option<String>, Query, description = "Window start"),
        ("end" = Option<String>, Query, description = "Window end")
    ),
    responses(
        (status = 200, description = "Ranked error lines", body = FailuresResponse),
        (status = 400, description = "Bad window", body = crate::error::ErrorResponse)
    )
)]
#[get("/{project}/failures")]
pub async fn failures(
    pool: web::Data<DbPool>,
    path: web::Path<String>,
    query: web::Query<FailuresQuery>,
) -> AppResult<HttpResponse> {
    const ANALYZER_PAGE: u64 = 1000;

    let project_id = path.into_inner();
    validate_project_name(&project_id)?;
    let start = parse_time_param(query.start.as_deref())?;
    let end = parse_time_param(query.end.as_deref())?;

    let failed =
        jobs::failed_jobs_in_range(pool.connection(), &project_id, start, end, ANALYZER_PAGE)
            .await?;

    let outputs: Vec<(String, String)> = failed
        .iter()
        .map(|job| {
            (
                job.id.clone(),
                job.worker_output.clone().unwrap_or_default(),
            )
        })
        .collect();
    let lines = analyzer::rank_errors(&outputs);

    let summaries: BTreeMap<String, FailedJobSummary> = failed
        .into_iter()
        .map(|job| {
            (
                job.id.clone(),
                FailedJobSummary {
                    id: job.id,
                    processing_time: job.processing_time,
                    worker: job.worker,
                    failed: fmt_datetime_opt(job.failed_at),
                },
            )
        })
        .collect();

    Ok(HttpResponse::Ok().json(FailuresResponse {
        version: API_VERSION,
        project: project_id,
        start: fmt_datetime_opt(start),
        end: fmt_datetime_opt(end),
        lines,
        jobs: summaries,
    }))
}
