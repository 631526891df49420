//! Job lifecycle transitions.
//!
//! Drives jobs through AVAILABLE -> CLAIMED -> STARTED -> FINISHED/FAILED
//! and keeps the project counters in step: every transition and its
//! counter bump commit in one transaction, or neither does.

use chrono::NaiveDateTime;
use sea_orm::{DatabaseConnection, TransactionTrait};
use serde_json::Value as JsonValue;
use tracing::info;

use crate::db::{jobs, projects};
use crate::entity::job;
use crate::error::{AppError, AppResult};
use crate::models::{JobInsert, JobStatus, ProjectSettings};

fn job_not_found(job_id: &str) -> AppError {
    AppError::NotFound(format!("Job '{}'", job_id))
}

/// Insert a batch of jobs, all-or-nothing.
///
/// The project is created on first use, owned by `username`. Backdated
/// lifecycle fields move the counters exactly as live transitions would
/// have. Returns the number of newly inserted jobs (exact duplicates are
/// accepted silently).
pub async fn insert_jobs(
    db: &DatabaseConnection,
    project_id: &str,
    username: &str,
    inserts: &[JobInsert],
    now: NaiveDateTime,
) -> AppResult<usize> {
    let txn = db.begin().await?;

    if !projects::project_exists(&txn, project_id).await? {
        projects::insert_project(&txn, project_id, username, &ProjectSettings::default(), now)
            .await?;
    }

    let mut inserted = 0usize;
    let mut errors: Vec<String> = Vec::new();
    for (index, insert) in inserts.iter().enumerate() {
        match jobs::insert_job(&txn, project_id, insert, now).await {
            Ok(jobs::InsertOutcome::Inserted) => {
                if insert.is_claimed() {
                    let when = insert.claimed_at.unwrap_or(now);
                    projects::job_claimed(&txn, project_id, when).await?;
                }
                if insert.finished_at.is_some() {
                    projects::job_finished(&txn, project_id, insert.processing_time.unwrap_or(0.0))
                        .await?;
                }
                if insert.failed_at.is_some() {
                    projects::job_failed(&txn, project_id, insert.processing_time.unwrap_or(0.0))
                        .await?;
                }
                inserted += 1;
            }
            Ok(jobs::InsertOutcome::Duplicate) => {}
            Err(AppError::Conflict(message)) => {
                if inserts.len() == 1 {
                    return Err(AppError::Conflict(message));
                }
                errors.push(format!("Job#{}: {}", index, message));
            }
            Err(other) => return Err(other),
        }
    }

    if !errors.is_empty() {
        return Err(AppError::Conflict(errors.join("\n")));
    }

    if inserted > 0 {
        projects::job_added(&txn, project_id, inserted as i64, now).await?;
    }

    txn.commit().await?;
    Ok(inserted)
}

/// Claim a job for a worker.
///
/// The conditional UPDATE on `claimed` guarantees a single winner among
/// concurrent callers; the loser sees a conflict.
pub async fn claim(
    db: &DatabaseConnection,
    project_id: &str,
    job_id: &str,
    worker: &str,
    now: NaiveDateTime,
) -> AppResult<()> {
    let txn = db.begin().await?;

    if !jobs::job_exists(&txn, project_id, job_id).await? {
        return Err(job_not_found(job_id));
    }
    if !jobs::claim_job(&txn, project_id, job_id).await? {
        return Err(AppError::Conflict("The job is already claimed".to_string()));
    }
    jobs::set_claim_details(&txn, project_id, job_id, worker, now).await?;
    projects::job_claimed(&txn, project_id, now).await?;

    txn.commit().await?;
    info!(project = project_id, job = job_id, worker, "job claimed");
    Ok(())
}

/// Release a claim, returning the job to AVAILABLE.
///
/// A job that had already reached FAILED gives back its failure count and
/// stamp, so the re-attempt starts a clean lifecycle.
pub async fn release(
    db: &DatabaseConnection,
    project_id: &str,
    job_id: &str,
) -> AppResult<()> {
    let txn = db.begin().await?;

    let Some(job) = jobs::get_job(&txn, project_id, job_id).await? else {
        return Err(job_not_found(job_id));
    };
    if !job.claimed {
        return Ok(());
    }

    let was_failed = job.current_status == JobStatus::Failed.as_str();
    jobs::clear_claim(&txn, project_id, job_id, was_failed).await?;
    projects::job_unclaimed(&txn, project_id, was_failed).await?;

    txn.commit().await?;
    info!(project = project_id, job = job_id, "job released");
    Ok(())
}

/// Report a status transition.
///
/// FINISHED and FAILED stamp their timestamp, store the processing time
/// and move the project counters exactly once: repeating a final status
/// is a no-op, reporting the opposite final status is a conflict.
/// STARTED is informational and counts like CLAIMED.
pub async fn set_status(
    db: &DatabaseConnection,
    project_id: &str,
    job_id: &str,
    status: JobStatus,
    processing_time: Option<f64>,
    now: NaiveDateTime,
) -> AppResult<()> {
    let txn = db.begin().await?;

    let Some(job) = jobs::get_job(&txn, project_id, job_id).await? else {
        return Err(job_not_found(job_id));
    };

    match status {
        JobStatus::Finished => {
            if job.finished_at.is_some() {
                return Ok(());
            }
            if job.failed_at.is_some() {
                return Err(AppError::Conflict(format!(
                    "Job '{}' has already failed",
                    job_id
                )));
            }
            jobs::set_final_state(&txn, project_id, job_id, status, now, processing_time).await?;
            projects::job_finished(&txn, project_id, processing_time.unwrap_or(0.0)).await?;
        }
        JobStatus::Failed => {
            if job.failed_at.is_some() {
                return Ok(());
            }
            if job.finished_at.is_some() {
                return Err(AppError::Conflict(format!(
                    "Job '{}' has already finished",
                    job_id
                )));
            }
            jobs::set_final_state(&txn, project_id, job_id, status, now, processing_time).await?;
            projects::job_failed(&txn, project_id, processing_time.unwrap_or(0.0)).await?;
        }
        // counters already moved at claim time
        JobStatus::Available | JobStatus::Claimed | JobStatus::Started => {
            jobs::set_status(&txn, project_id, job_id, status).await?;
        }
    }

    txn.commit().await?;
    info!(
        project = project_id,
        job = job_id,
        status = status.as_str(),
        "job status updated"
    );
    Ok(())
}

/// Store the worker's streamed output.
pub async fn set_output(
    db: &DatabaseConnection,
    project_id: &str,
    job_id: &str,
    output: &str,
) -> AppResult<()> {
    if !jobs::job_exists(db, project_id, job_id).await? {
        return Err(job_not_found(job_id));
    }
    jobs::set_output(db, project_id, job_id, output).await?;
    Ok(())
}

/// Remove a project and every job row it owns.
pub async fn remove_project(db: &DatabaseConnection, project_id: &str) -> AppResult<()> {
    let txn = db.begin().await?;
    projects::remove_project(&txn, project_id).await?;
    jobs::delete_project_jobs(&txn, project_id).await?;
    txn.commit().await?;
    info!(project = project_id, "project removed");
    Ok(())
}

/// Fetch an unclaimed job for the worker-facing shape, drawn at random
/// from a bounded prefix to spread concurrent fetchers over the pool.
pub async fn fetch_unclaimed(
    db: &DatabaseConnection,
    project_id: &str,
) -> AppResult<Option<(job::Model, Option<String>, JsonValue)>> {
    const FETCH_CANDIDATES: u64 = 500;

    let candidates = jobs::unclaimed_jobs(db, project_id, FETCH_CANDIDATES).await?;
    if candidates.is_empty() {
        return Ok(None);
    }
    let index = rand::random_range(0..candidates.len());
    let job = candidates.into_iter().nth(index).expect("index in bounds");

    let project = projects::get_project(db, project_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Project '{}'", project_id)))?;
    let environment =
        crate::models::project::decode_environment(project.environment.as_deref());
    Ok(Some((job, project.processing_image_url, environment)))
}
