//! Project endpoints: listing, status, create/update/delete, and the
//! cross-project prioritized fetch.

use actix_web::{HttpRequest, HttpResponse, delete, get, put, web};
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::ToSchema;

use crate::api::{API_VERSION, api_root, parse_time_param, utcnow, validate_project_name};
use crate::auth::AuthUser;
use crate::db::{DbPool, jobs, projects};
use crate::error::{AppError, AppResult};
use crate::models::{
    FetchResponse, JobStatus, PrettyProject, ProjectSettings, ProjectStatusResponse,
    ProjectsListResponse, TimePeriod, WorkerJob, fmt_eta,
};
use crate::services::{lifecycle, scheduler};

/// Configure project routes. The literal `projects` and the prioritized
/// fetch must come before the `{project}` catch-alls.
pub fn configure_project_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(list_projects)
        .service(fetch_job_prio)
        .service(project_status)
        .service(put_project)
        .service(delete_project);
}

#[derive(Debug, Deserialize)]
pub struct ListProjectsQuery {
    only_active: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ProjectStatusQuery {
    now: Option<String>,
}

/// Minimal `{Version, Project}` acknowledgement.
#[derive(Debug, Serialize, ToSchema)]
pub struct ProjectAck {
    #[serde(rename = "Version")]
    pub version: &'static str,
    #[serde(rename = "Project")]
    pub project: String,
}

/// List all projects with their current priority scores.
#[utoipa::path(
    get,
    path = "/rest_api/v4/projects",
    tag = "Projects",
    params(("only_active" = Option<String>, Query, description = "1 keeps only projects with unclaimed jobs")),
    responses((status = 200, description = "Project list", body = ProjectsListResponse))
)]
#[get("/projects")]
pub async fn list_projects(
    req: HttpRequest,
    pool: web::Data<DbPool>,
    query: web::Query<ListProjectsQuery>,
) -> AppResult<HttpResponse> {
    let only_active = matches!(query.only_active.as_deref(), Some("1") | Some("true"));
    let root = api_root(&req);
    let now = utcnow();

    let models = projects::list_projects(pool.connection(), only_active).await?;
    let projects = models
        .iter()
        .map(|p| {
            let weight = scheduler::priority_weight(p, now);
            PrettyProject::from_model(p, Some(weight), &root)
        })
        .collect();

    Ok(HttpResponse::Ok().json(ProjectsListResponse {
        version: API_VERSION,
        projects,
    }))
}

/// Estimated time to drain the available pool, from the most recent
/// complete hourly claim bucket.
fn compute_eta(nr_available: i64, hourly_claims: &[jobs::PeriodCount]) -> Option<String> {
    if hourly_claims.is_empty() {
        return None;
    }
    // the last bucket is usually still filling; prefer the one before it
    let index = hourly_claims.len().saturating_sub(2);
    let rate = hourly_claims[index].count;
    if rate <= 0 {
        return None;
    }
    let eta_secs = (3600.0 * nr_available as f64 / rate as f64) as i64;
    Some(fmt_eta(eta_secs))
}

/// Project status: the pretty project plus live aggregates.
#[utoipa::path(
    get,
    path = "/rest_api/v4/{project}",
    tag = "Projects",
    params(
        ("project" = String, Path, description = "Project id"),
        ("now" = Option<String>, Query, description = "Priority score reference time")
    ),
    responses(
        (status = 200, description = "Project status", body = ProjectStatusResponse),
        (status = 404, description = "No such project", body = crate::error::ErrorResponse)
    )
)]
#[get("/{project}")]
pub async fn project_status(
    req: HttpRequest,
    pool: web::Data<DbPool>,
    path: web::Path<String>,
    query: web::Query<ProjectStatusQuery>,
) -> AppResult<HttpResponse> {
    let project_id = path.into_inner();
    validate_project_name(&project_id)?;
    let now = parse_time_param(query.now.as_deref())?.unwrap_or_else(utcnow);

    let db = pool.connection();
    let model = projects::get_project(db, &project_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Project '{}'", project_id)))?;

    let job_states: std::collections::BTreeMap<String, i64> =
        jobs::count_by_status(db, &project_id)
            .await?
            .into_iter()
            .map(|(status, count)| {
                let key = JobStatus::parse(&status)
                    .map(|s| s.title().to_string())
                    .unwrap_or(status);
                (key, count)
            })
            .collect();

    let hourly_claims = jobs::count_by_time_period(
        db,
        &project_id,
        JobStatus::Claimed,
        TimePeriod::Hourly,
        None,
        None,
        false,
    )
    .await?;
    let nr_available = job_states
        .get(JobStatus::Available.title())
        .copied()
        .unwrap_or(0);
    let eta = compute_eta(nr_available, &hourly_claims);

    let root = api_root(&req);
    let weight = scheduler::priority_weight(&model, now);
    let pretty = PrettyProject::from_model(&model, Some(weight), &root).with_status_urls(&root);

    Ok(HttpResponse::Ok().json(ProjectStatusResponse {
        version: API_VERSION,
        project: project_id,
        pretty,
        job_states,
        eta,
    }))
}

/// Create a project, or update the caller-settable fields of an existing
/// one. Bodies with any other field are rejected.
#[utoipa::path(
    put,
    path = "/rest_api/v4/{project}",
    tag = "Projects",
    params(("project" = String, Path, description = "Project id")),
    request_body(content = Vec<u8>, description = "Project settings JSON body"),
    responses(
        (status = 201, description = "Project created", body = ProjectAck),
        (status = 204, description = "Project updated"),
        (status = 400, description = "Invalid field in body", body = crate::error::ErrorResponse)
    )
)]
#[put("/{project}")]
pub async fn put_project(
    pool: web::Data<DbPool>,
    caller: AuthUser,
    path: web::Path<String>,
    body: web::Bytes,
) -> AppResult<HttpResponse> {
    let project_id = path.into_inner();
    validate_project_name(&project_id)?;

    let settings = if body.is_empty() {
        ProjectSettings::default()
    } else {
        let value: serde_json::Value = serde_json::from_slice(&body)?;
        ProjectSettings::from_value(&value).map_err(AppError::Validation)?
    };

    let db = pool.connection();
    if projects::update_settings(db, &project_id, &settings).await? {
        return Ok(HttpResponse::NoContent().finish());
    }

    projects::insert_project(db, &project_id, &caller.username, &settings, utcnow()).await?;
    info!(project = %project_id, user = %caller.username, "project created");

    Ok(HttpResponse::Created().json(ProjectAck {
        version: API_VERSION,
        project: project_id,
    }))
}

/// Delete a project and all its jobs.
#[utoipa::path(
    delete,
    path = "/rest_api/v4/{project}",
    tag = "Projects",
    params(("project" = String, Path, description = "Project id")),
    responses((status = 200, description = "Project removed", body = ProjectAck))
)]
#[delete("/{project}")]
pub async fn delete_project(
    pool: web::Data<DbPool>,
    caller: AuthUser,
    path: web::Path<String>,
) -> AppResult<HttpResponse> {
    let project_id = path.into_inner();
    validate_project_name(&project_id)?;

    lifecycle::remove_project(pool.connection(), &project_id).await?;
    info!(project = %project_id, user = %caller.username, "project deleted");

    Ok(HttpResponse::Ok().json(ProjectAck {
        version: API_VERSION,
        project: project_id,
    }))
}

/// Serve the next job from the project most in need of work, sampled
/// proportionally to the priority weights.
#[utoipa::path(
    get,
    path = "/rest_api/v4/projects/jobs/fetch",
    tag = "Projects",
    responses(
        (status = 200, description = "A job to work on", body = FetchResponse),
        (status = 404, description = "No unclaimed jobs anywhere", body = crate::error::ErrorResponse)
    )
)]
#[get("/projects/jobs/fetch")]
pub async fn fetch_job_prio(
    req: HttpRequest,
    pool: web::Data<DbPool>,
    _caller: AuthUser,
) -> AppResult<HttpResponse> {
    let db = pool.connection();
    let now = utcnow();

    let candidates = projects::list_projects(db, true).await?;
    let weights: Vec<(String, f64)> = candidates
        .iter()
        .map(|p| (p.id.clone(), scheduler::priority_weight(p, now)))
        .collect();
    let total: f64 = weights.iter().map(|(_, w)| w).sum();
    if total <= 0.0 {
        return Err(AppError::NoJobsAvailable);
    }

    let r = rand::random_range(0.0..total);
    let project_id = scheduler::pick_weighted(&weights, r)
        .ok_or_else(|| AppError::NoJobsAvailable)?
        .to_string();

    let (job, image_url, environment) = lifecycle::fetch_unclaimed(db, &project_id)
        .await?
        .ok_or_else(|| AppError::NoJobsAvailable)?;

    let root = api_root(&req);
    Ok(HttpResponse::Ok().json(FetchResponse {
        version: API_VERSION,
        project: project_id,
        job: WorkerJob::new(job, image_url, environment, &root),
    }))
}
