//! Per-job endpoints: claim, status and output.

use actix_web::{HttpResponse, delete, get, put, web};
use serde_json::Value as JsonValue;
use tracing::warn;

use crate::api::{API_VERSION, utcnow, validate_project_name};
use crate::auth::AuthUser;
use crate::db::{DbPool, jobs};
use crate::error::{AppError, AppResult};
use crate::models::{
    ClaimInfoResponse, ClaimResponse, JobStatus, OutputResponse, OutputUpdateResponse,
    StatusResponse, StatusUpdateResponse, fmt_datetime, fmt_datetime_opt,
};
use crate::services::lifecycle;

/// Configure per-job routes.
pub fn configure_job_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(get_claim)
        .service(put_claim)
        .service(delete_claim)
        .service(get_status)
        .service(put_status)
        .service(get_output)
        .service(put_output);
}

async fn load_job(
    pool: &DbPool,
    project_id: &str,
    job_id: &str,
) -> AppResult<crate::entity::job::Model> {
    jobs::get_job(pool.connection(), project_id, job_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Job '{}'", job_id)))
}

/// Extract a required string field from a JSON body, naming it on failure.
fn required_field<'a>(body: &'a JsonValue, field: &str) -> AppResult<&'a str> {
    body.get(field)
        .and_then(|v| v.as_str())
        .ok_or_else(|| {
            AppError::Validation(format!("Missing \"{}\" field in request data", field))
        })
}

/// See which worker has claimed a job and when.
#[utoipa::path(
    get,
    path = "/rest_api/v4/{project}/jobs/{job_id}/claim",
    tag = "Job",
    params(
        ("project" = String, Path, description = "Project id"),
        ("job_id" = String, Path, description = "Job id")
    ),
    responses(
        (status = 200, description = "Claim state", body = ClaimInfoResponse),
        (status = 404, description = "No such job", body = crate::error::ErrorResponse)
    )
)]
#[get("/{project}/jobs/{job_id}/claim")]
pub async fn get_claim(
    pool: web::Data<DbPool>,
    path: web::Path<(String, String)>,
) -> AppResult<HttpResponse> {
    let (project_id, job_id) = path.into_inner();
    validate_project_name(&project_id)?;

    let job = load_job(&pool, &project_id, &job_id).await?;
    Ok(HttpResponse::Ok().json(ClaimInfoResponse {
        version: API_VERSION,
        project: project_id,
        id: job_id,
        claimed: job.claimed,
        claimed_by_worker: job.worker,
        claimed_at_time: fmt_datetime_opt(job.claimed_at),
    }))
}

/// Claim a job for a worker. At most one concurrent caller wins; the
/// rest see 409.
#[utoipa::path(
    put,
    path = "/rest_api/v4/{project}/jobs/{job_id}/claim",
    tag = "Job",
    params(
        ("project" = String, Path, description = "Project id"),
        ("job_id" = String, Path, description = "Job id")
    ),
    responses(
        (status = 200, description = "Claimed", body = ClaimResponse),
        (status = 400, description = "Missing Worker field", body = crate::error::ErrorResponse),
        (status = 404, description = "No such job", body = crate::error::ErrorResponse),
        (status = 409, description = "Already claimed", body = crate::error::ErrorResponse)
    )
)]
#[put("/{project}/jobs/{job_id}/claim")]
pub async fn put_claim(
    pool: web::Data<DbPool>,
    caller: AuthUser,
    path: web::Path<(String, String)>,
    body: web::Json<JsonValue>,
) -> AppResult<HttpResponse> {
    let (project_id, job_id) = path.into_inner();
    validate_project_name(&project_id)?;
    let worker = required_field(&body, "Worker")?;

    let now = utcnow();
    lifecycle::claim(pool.connection(), &project_id, &job_id, worker, now)
        .await
        .inspect_err(|e| {
            if matches!(e, AppError::Conflict(_)) {
                warn!(
                    project = %project_id,
                    job = %job_id,
                    user = %caller.username,
                    "claim conflict"
                );
            }
        })?;

    Ok(HttpResponse::Ok().json(ClaimResponse {
        version: API_VERSION,
        project: project_id,
        id: job_id,
        call: "PUT",
        time: Some(fmt_datetime(now)),
        claimed_by: Some(worker.to_string()),
    }))
}

/// Release a claim so the job can be handed out again.
#[utoipa::path(
    delete,
    path = "/rest_api/v4/{project}/jobs/{job_id}/claim",
    tag = "Job",
    params(
        ("project" = String, Path, description = "Project id"),
        ("job_id" = String, Path, description = "Job id")
    ),
    responses(
        (status = 200, description = "Released", body = ClaimResponse),
        (status = 404, description = "No such job", body = crate::error::ErrorResponse)
    )
)]
#[delete("/{project}/jobs/{job_id}/claim")]
pub async fn delete_claim(
    pool: web::Data<DbPool>,
    _caller: AuthUser,
    path: web::Path<(String, String)>,
) -> AppResult<HttpResponse> {
    let (project_id, job_id) = path.into_inner();
    validate_project_name(&project_id)?;

    lifecycle::release(pool.connection(), &project_id, &job_id).await?;

    Ok(HttpResponse::Ok().json(ClaimResponse {
        version: API_VERSION,
        project: project_id,
        id: job_id,
        call: "DELETE",
        time: None,
        claimed_by: None,
    }))
}

/// Current job status.
#[utoipa::path(
    get,
    path = "/rest_api/v4/{project}/jobs/{job_id}/status",
    tag = "Job",
    params(
        ("project" = String, Path, description = "Project id"),
        ("job_id" = String, Path, description = "Job id")
    ),
    responses(
        (status = 200, description = "Status", body = StatusResponse),
        (status = 404, description = "No such job", body = crate::error::ErrorResponse)
    )
)]
#[get("/{project}/jobs/{job_id}/status")]
pub async fn get_status(
    pool: web::Data<DbPool>,
    path: web::Path<(String, String)>,
) -> AppResult<HttpResponse> {
    let (project_id, job_id) = path.into_inner();
    validate_project_name(&project_id)?;

    let job = load_job(&pool, &project_id, &job_id).await?;
    Ok(HttpResponse::Ok().json(StatusResponse {
        status: job.current_status,
    }))
}

/// Report a status transition; FINISHED/FAILED carry the processing time.
#[utoipa::path(
    put,
    path = "/rest_api/v4/{project}/jobs/{job_id}/status",
    tag = "Job",
    params(
        ("project" = String, Path, description = "Project id"),
        ("job_id" = String, Path, description = "Job id")
    ),
    responses(
        (status = 200, description = "Status updated", body = StatusUpdateResponse),
        (status = 400, description = "Missing or bad Status", body = crate::error::ErrorResponse),
        (status = 404, description = "No such job", body = crate::error::ErrorResponse),
        (status = 409, description = "Opposite final state already recorded", body = crate::error::ErrorResponse)
    )
)]
#[put("/{project}/jobs/{job_id}/status")]
pub async fn put_status(
    pool: web::Data<DbPool>,
    caller: AuthUser,
    path: web::Path<(String, String)>,
    body: web::Json<JsonValue>,
) -> AppResult<HttpResponse> {
    let (project_id, job_id) = path.into_inner();
    validate_project_name(&project_id)?;

    let raw_status = required_field(&body, "Status")?;
    let status = JobStatus::parse(raw_status)
        .ok_or_else(|| AppError::Validation(format!("Unsupported status: '{}'", raw_status)))?;

    let processing_time = match body.get("ProcessingTime") {
        None | Some(JsonValue::Null) => None,
        Some(v) => Some(v.as_f64().ok_or_else(|| {
            AppError::Validation("Expected number in field 'ProcessingTime'".to_string())
        })?),
    };

    lifecycle::set_status(
        pool.connection(),
        &project_id,
        &job_id,
        status,
        processing_time,
        utcnow(),
    )
    .await
    .inspect_err(|e| {
        if matches!(e, AppError::Conflict(_)) {
            warn!(
                project = %project_id,
                job = %job_id,
                user = %caller.username,
                "status conflict"
            );
        }
    })?;

    Ok(HttpResponse::Ok().json(StatusUpdateResponse {
        version: API_VERSION,
        project: project_id,
        id: job_id,
        call: "PUT",
        status: status.as_str().to_string(),
    }))
}

/// Stored worker output.
#[utoipa::path(
    get,
    path = "/rest_api/v4/{project}/jobs/{job_id}/output",
    tag = "Job",
    params(
        ("project" = String, Path, description = "Project id"),
        ("job_id" = String, Path, description = "Job id")
    ),
    responses(
        (status = 200, description = "Output", body = OutputResponse),
        (status = 404, description = "No such job", body = crate::error::ErrorResponse)
    )
)]
#[get("/{project}/jobs/{job_id}/output")]
pub async fn get_output(
    pool: web::Data<DbPool>,
    path: web::Path<(String, String)>,
) -> AppResult<HttpResponse> {
    let (project_id, job_id) = path.into_inner();
    validate_project_name(&project_id)?;

    let job = load_job(&pool, &project_id, &job_id).await?;
    Ok(HttpResponse::Ok().json(OutputResponse {
        output: job.worker_output,
    }))
}

/// Replace the stored worker output with the worker's latest snapshot.
#[utoipa::path(
    put,
    path = "/rest_api/v4/{project}/jobs/{job_id}/output",
    tag = "Job",
    params(
        ("project" = String, Path, description = "Project id"),
        ("job_id" = String, Path, description = "Job id")
    ),
    responses(
        (status = 200, description = "Output stored", body = OutputUpdateResponse),
        (status = 400, description = "Missing Output field", body = crate::error::ErrorResponse),
        (status = 404, description = "No such job", body = crate::error::ErrorResponse)
    )
)]
#[put("/{project}/jobs/{job_id}/output")]
pub async fn put_output(
    pool: web::Data<DbPool>,
    _caller: AuthUser,
    path: web::Path<(String, String)>,
    body: web::Json<JsonValue>,
) -> AppResult<HttpResponse> {
    let (project_id, job_id) = path.into_inner();
    validate_project_name(&project_id)?;
    let output = required_field(&body, "Output")?;

    lifecycle::set_output(pool.connection(), &project_id, &job_id, output).await?;

    Ok(HttpResponse::Ok().json(OutputUpdateResponse {
        version: API_VERSION,
        project: project_id,
        id: job_id,
        call: "PUT",
    }))
}
