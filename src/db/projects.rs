//! Database queries for the project registry.
//!
//! Counter columns are only ever moved incrementally (`col = col + n`);
//! the lifecycle transactions call the `job_*` hooks here so a counter
//! bump commits or rolls back together with the job-row write it mirrors.

use chrono::NaiveDateTime;
use sea_orm::sea_query::{Expr, ExprTrait};
use sea_orm::*;

use crate::entity::project::{self, Entity as Project};
use crate::error::AppResult;
use crate::models::ProjectSettings;

/// Insert a new project; the name defaults to the id.
pub async fn insert_project<C: ConnectionTrait>(
    db: &C,
    project_id: &str,
    created_by: &str,
    settings: &ProjectSettings,
    now: NaiveDateTime,
) -> AppResult<()> {
    let environment = settings
        .environment
        .as_ref()
        .map(|env| env.to_string());

    let model = project::ActiveModel {
        id: Set(project_id.to_string()),
        name: Set(settings
            .name
            .clone()
            .unwrap_or_else(|| project_id.to_string())),
        created_at: Set(now),
        created_by: Set(created_by.to_string()),
        processing_image_url: Set(settings.processing_image_url.clone().flatten()),
        environment: Set(environment),
        deadline: Set(settings.deadline.flatten()),
        last_added_at: Set(None),
        last_claimed_at: Set(None),
        nr_added: Set(0),
        nr_claimed: Set(0),
        nr_finished: Set(0),
        nr_failed: Set(0),
        processing_time_total: Set(0.0),
    };

    Project::insert(model).exec(db).await?;

    Ok(())
}

/// Get a project by id.
pub async fn get_project<C: ConnectionTrait>(
    db: &C,
    project_id: &str,
) -> AppResult<Option<project::Model>> {
    let result = Project::find_by_id(project_id).one(db).await?;
    Ok(result)
}

/// Check whether a project exists.
pub async fn project_exists<C: ConnectionTrait>(db: &C, project_id: &str) -> AppResult<bool> {
    Ok(get_project(db, project_id).await?.is_some())
}

/// List projects ordered by last claim activity.
///
/// `only_active` keeps projects that still have unclaimed jobs.
pub async fn list_projects<C: ConnectionTrait>(
    db: &C,
    only_active: bool,
) -> AppResult<Vec<project::Model>> {
    let mut query = Project::find().order_by_asc(project::Column::LastClaimedAt);
    if only_active {
        query = query.filter(
            Expr::col(project::Column::NrAdded).gt(Expr::col(project::Column::NrClaimed)),
        );
    }
    let result = query.all(db).await?;
    Ok(result)
}

/// Apply the caller-settable fields. Returns false when the project does
/// not exist.
pub async fn update_settings<C: ConnectionTrait>(
    db: &C,
    project_id: &str,
    settings: &ProjectSettings,
) -> AppResult<bool> {
    if settings.is_empty() {
        return project_exists(db, project_id).await;
    }

    let mut update = Project::update_many().filter(project::Column::Id.eq(project_id));

    if let Some(name) = &settings.name {
        update = update.col_expr(project::Column::Name, Expr::value(name.clone()));
    }
    if let Some(deadline) = settings.deadline {
        update = update.col_expr(project::Column::Deadline, Expr::value(deadline));
    }
    if let Some(url) = &settings.processing_image_url {
        update = update.col_expr(project::Column::ProcessingImageUrl, Expr::value(url.clone()));
    }
    if let Some(environment) = &settings.environment {
        update = update.col_expr(
            project::Column::Environment,
            Expr::value(environment.to_string()),
        );
    }

    let result = update.exec(db).await?;
    Ok(result.rows_affected > 0)
}

/// Delete a project row. The caller removes the job rows in the same
/// transaction.
pub async fn remove_project<C: ConnectionTrait>(db: &C, project_id: &str) -> AppResult<bool> {
    let result = Project::delete_by_id(project_id).exec(db).await?;
    Ok(result.rows_affected > 0)
}

/// Report that `n` jobs were added. Returns false when the project does
/// not exist.
pub async fn job_added<C: ConnectionTrait>(
    db: &C,
    project_id: &str,
    n: i64,
    when: NaiveDateTime,
) -> AppResult<bool> {
    let result = Project::update_many()
        .col_expr(
            project::Column::NrAdded,
            Expr::col(project::Column::NrAdded).add(n),
        )
        .col_expr(project::Column::LastAddedAt, Expr::value(when))
        .filter(project::Column::Id.eq(project_id))
        .exec(db)
        .await?;
    Ok(result.rows_affected > 0)
}

/// Report that a job was claimed.
pub async fn job_claimed<C: ConnectionTrait>(
    db: &C,
    project_id: &str,
    when: NaiveDateTime,
) -> AppResult<bool> {
    let result = Project::update_many()
        .col_expr(
            project::Column::NrClaimed,
            Expr::col(project::Column::NrClaimed).add(1),
        )
        .col_expr(project::Column::LastClaimedAt, Expr::value(when))
        .filter(project::Column::Id.eq(project_id))
        .exec(db)
        .await?;
    Ok(result.rows_affected > 0)
}

/// Report that a claim was released. A job that had already failed gives
/// its failure count back as well, so a re-attempt cannot double-count.
pub async fn job_unclaimed<C: ConnectionTrait>(
    db: &C,
    project_id: &str,
    was_failed: bool,
) -> AppResult<bool> {
    let mut update = Project::update_many()
        .col_expr(
            project::Column::NrClaimed,
            Expr::col(project::Column::NrClaimed).sub(1),
        )
        .filter(project::Column::Id.eq(project_id));
    if was_failed {
        update = update.col_expr(
            project::Column::NrFailed,
            Expr::col(project::Column::NrFailed).sub(1),
        );
    }
    let result = update.exec(db).await?;
    Ok(result.rows_affected > 0)
}

/// Report a finished job and its processing time in seconds.
pub async fn job_finished<C: ConnectionTrait>(
    db: &C,
    project_id: &str,
    processing_time: f64,
) -> AppResult<bool> {
    let result = Project::update_many()
        .col_expr(
            project::Column::NrFinished,
            Expr::col(project::Column::NrFinished).add(1),
        )
        .col_expr(
            project::Column::ProcessingTimeTotal,
            Expr::col(project::Column::ProcessingTimeTotal).add(processing_time),
        )
        .filter(project::Column::Id.eq(project_id))
        .exec(db)
        .await?;
    Ok(result.rows_affected > 0)
}

/// Report a failed job and its processing time in seconds.
pub async fn job_failed<C: ConnectionTrait>(
    db: &C,
    project_id: &str,
    processing_time: f64,
) -> AppResult<bool> {
    let result = Project::update_many()
        .col_expr(
            project::Column::NrFailed,
            Expr::col(project::Column::NrFailed).add(1),
        )
        .col_expr(
            project::Column::ProcessingTimeTotal,
            Expr::col(project::Column::ProcessingTimeTotal).add(processing_time),
        )
        .filter(project::Column::Id.eq(project_id))
        .exec(db)
        .await?;
    Ok(result.rows_affected > 0)
}
