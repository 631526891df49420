//! Database queries for job rows.
//!
//! All projects share one `jobs` table; every query filters on the
//! project id. The claim operation is the single place that relies on
//! the atomicity of a conditional UPDATE.

use chrono::{NaiveDate, NaiveDateTime};
use sea_orm::sea_query::Expr;
use sea_orm::*;

use crate::entity::job::{self, Entity as Job};
use crate::error::{AppError, AppResult};
use crate::models::{JobInsert, JobStatus, TimePeriod};

/// Outcome of a duplicate-aware insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// A new row was written.
    Inserted,
    /// The exact same payload already exists; nothing was written.
    Duplicate,
}

/// Insert a job unless an identical one exists.
///
/// An existing row with the same id but a different payload is a conflict.
pub async fn insert_job<C: ConnectionTrait>(
    db: &C,
    project_id: &str,
    insert: &JobInsert,
    now: NaiveDateTime,
) -> AppResult<InsertOutcome> {
    if let Some(existing) = get_job(db, project_id, &insert.id).await? {
        if insert.matches(&existing) {
            return Ok(InsertOutcome::Duplicate);
        }
        return Err(AppError::Conflict(format!(
            "Job '{}' already exists with different content",
            insert.id
        )));
    }

    let status = insert
        .current_status
        .unwrap_or(JobStatus::Available)
        .as_str()
        .to_string();

    let model = job::ActiveModel {
        project_id: Set(project_id.to_string()),
        id: Set(insert.id.clone()),
        job_type: Set(insert.job_type.clone()),
        source_url: Set(insert.source_url.clone()),
        target_url: Set(insert.target_url.clone()),
        view_result_url: Set(insert.view_result_url.clone()),
        claimed: Set(insert.is_claimed()),
        current_status: Set(status),
        worker: Set(insert.worker.clone()),
        worker_output: Set(None),
        added_at: Set(insert.added_at.unwrap_or(now)),
        claimed_at: Set(insert.claimed_at),
        finished_at: Set(insert.finished_at),
        failed_at: Set(insert.failed_at),
        processing_time: Set(insert.processing_time),
    };

    match Job::insert(model).exec(db).await {
        Ok(_) => Ok(InsertOutcome::Inserted),
        // a concurrent insert can still win the primary key between the
        // duplicate check and here
        Err(e) => match e.sql_err() {
            Some(SqlErr::UniqueConstraintViolation(_)) => Err(AppError::Conflict(format!(
                "Job '{}' already exists with different content",
                insert.id
            ))),
            _ => Err(e.into()),
        },
    }
}

/// Get a job by id.
pub async fn get_job<C: ConnectionTrait>(
    db: &C,
    project_id: &str,
    job_id: &str,
) -> AppResult<Option<job::Model>> {
    let result = Job::find_by_id((project_id.to_string(), job_id.to_string()))
        .one(db)
        .await?;
    Ok(result)
}

/// Check whether a job exists.
pub async fn job_exists<C: ConnectionTrait>(
    db: &C,
    project_id: &str,
    job_id: &str,
) -> AppResult<bool> {
    Ok(get_job(db, project_id, job_id).await?.is_some())
}

/// Equality filters and time window for job listings.
#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    pub job_type: Option<String>,
    pub worker: Option<String>,
    pub status: Option<JobStatus>,
    /// Filter and sort on the timestamp column of this state.
    pub time_state: Option<JobStatus>,
    pub start: Option<NaiveDateTime>,
    pub end: Option<NaiveDateTime>,
    pub limit: Option<u64>,
}

fn timestamp_column(state: JobStatus) -> job::Column {
    match state {
        JobStatus::Available => job::Column::AddedAt,
        JobStatus::Claimed | JobStatus::Started => job::Column::ClaimedAt,
        JobStatus::Finished => job::Column::FinishedAt,
        JobStatus::Failed => job::Column::FailedAt,
    }
}

/// List jobs matching the filter.
///
/// With a time state the listing is restricted to `[start, end)` on that
/// state's timestamp and sorted by it ascending; otherwise insertion
/// order (added_at) is used.
pub async fn list_jobs<C: ConnectionTrait>(
    db: &C,
    project_id: &str,
    filter: &JobFilter,
) -> AppResult<Vec<job::Model>> {
    let mut query = Job::find().filter(job::Column::ProjectId.eq(project_id));

    if let Some(job_type) = &filter.job_type {
        query = query.filter(job::Column::JobType.eq(job_type));
    }
    if let Some(worker) = &filter.worker {
        query = query.filter(job::Column::Worker.eq(worker));
    }
    if let Some(status) = filter.status {
        query = query.filter(job::Column::CurrentStatus.eq(status.as_str()));
    }

    if let Some(state) = filter.time_state {
        let column = timestamp_column(state);
        if let Some(start) = filter.start {
            query = query.filter(column.gte(start));
        }
        if let Some(end) = filter.end {
            query = query.filter(column.lt(end));
        }
        query = query.filter(column.is_not_null()).order_by_asc(column);
    } else {
        query = query.order_by_asc(job::Column::AddedAt);
    }

    if let Some(limit) = filter.limit {
        query = query.limit(limit);
    }

    let result = query.all(db).await?;
    Ok(result)
}

/// Unclaimed jobs, bounded, for the fetch endpoints to sample from.
pub async fn unclaimed_jobs<C: ConnectionTrait>(
    db: &C,
    project_id: &str,
    limit: u64,
) -> AppResult<Vec<job::Model>> {
    let result = Job::find()
        .filter(job::Column::ProjectId.eq(project_id))
        .filter(job::Column::Claimed.eq(false))
        .limit(limit)
        .all(db)
        .await?;
    Ok(result)
}

/// Claim a job: a conditional UPDATE whose WHERE clause requires
/// `claimed = false`. Exactly one concurrent caller sees an affected row.
pub async fn claim_job<C: ConnectionTrait>(
    db: &C,
    project_id: &str,
    job_id: &str,
) -> AppResult<bool> {
    let result = Job::update_many()
        .col_expr(job::Column::Claimed, Expr::value(true))
        .filter(job::Column::ProjectId.eq(project_id))
        .filter(job::Column::Id.eq(job_id))
        .filter(job::Column::Claimed.eq(false))
        .exec(db)
        .await?;
    Ok(result.rows_affected == 1)
}

/// Stamp the claim details after a successful conditional claim.
pub async fn set_claim_details<C: ConnectionTrait>(
    db: &C,
    project_id: &str,
    job_id: &str,
    worker: &str,
    when: NaiveDateTime,
) -> AppResult<()> {
    Job::update_many()
        .col_expr(job::Column::ClaimedAt, Expr::value(when))
        .col_expr(job::Column::Worker, Expr::value(worker))
        .col_expr(
            job::Column::CurrentStatus,
            Expr::value(JobStatus::Claimed.as_str()),
        )
        .filter(job::Column::ProjectId.eq(project_id))
        .filter(job::Column::Id.eq(job_id))
        .exec(db)
        .await?;
    Ok(())
}

/// Release a claim and return the job to AVAILABLE.
///
/// `clear_failed` also erases the failure stamp so the next attempt starts
/// a clean lifecycle.
pub async fn clear_claim<C: ConnectionTrait>(
    db: &C,
    project_id: &str,
    job_id: &str,
    clear_failed: bool,
) -> AppResult<()> {
    let mut update = Job::update_many()
        .col_expr(job::Column::Claimed, Expr::value(false))
        .col_expr(job::Column::ClaimedAt, Expr::value(None::<NaiveDateTime>))
        .col_expr(job::Column::Worker, Expr::value(None::<String>))
        .col_expr(
            job::Column::CurrentStatus,
            Expr::value(JobStatus::Available.as_str()),
        )
        .filter(job::Column::ProjectId.eq(project_id))
        .filter(job::Column::Id.eq(job_id));
    if clear_failed {
        update = update.col_expr(job::Column::FailedAt, Expr::value(None::<NaiveDateTime>));
    }
    update.exec(db).await?;
    Ok(())
}

/// Set only the status string; counters and timestamps untouched.
pub async fn set_status<C: ConnectionTrait>(
    db: &C,
    project_id: &str,
    job_id: &str,
    status: JobStatus,
) -> AppResult<()> {
    Job::update_many()
        .col_expr(job::Column::CurrentStatus, Expr::value(status.as_str()))
        .filter(job::Column::ProjectId.eq(project_id))
        .filter(job::Column::Id.eq(job_id))
        .exec(db)
        .await?;
    Ok(())
}

/// Record a final state with its timestamp and processing time.
pub async fn set_final_state<C: ConnectionTrait>(
    db: &C,
    project_id: &str,
    job_id: &str,
    status: JobStatus,
    when: NaiveDateTime,
    processing_time: Option<f64>,
) -> AppResult<()> {
    let timestamp = match status {
        JobStatus::Finished => job::Column::FinishedAt,
        JobStatus::Failed => job::Column::FailedAt,
        other => {
            return Err(AppError::Internal(format!(
                "{} is not a final state",
                other
            )));
        }
    };
    Job::update_many()
        .col_expr(job::Column::CurrentStatus, Expr::value(status.as_str()))
        .col_expr(timestamp, Expr::value(when))
        .col_expr(job::Column::ProcessingTime, Expr::value(processing_time))
        .filter(job::Column::ProjectId.eq(project_id))
        .filter(job::Column::Id.eq(job_id))
        .exec(db)
        .await?;
    Ok(())
}

/// Replace the stored worker output.
pub async fn set_output<C: ConnectionTrait>(
    db: &C,
    project_id: &str,
    job_id: &str,
    output: &str,
) -> AppResult<()> {
    Job::update_many()
        .col_expr(job::Column::WorkerOutput, Expr::value(output))
        .filter(job::Column::ProjectId.eq(project_id))
        .filter(job::Column::Id.eq(job_id))
        .exec(db)
        .await?;
    Ok(())
}

/// Row counts grouped by status.
pub async fn count_by_status<C: ConnectionTrait>(
    db: &C,
    project_id: &str,
) -> AppResult<Vec<(String, i64)>> {
    let result = Job::find()
        .select_only()
        .column(job::Column::CurrentStatus)
        .column_as(job::Column::Id.count(), "count")
        .filter(job::Column::ProjectId.eq(project_id))
        .group_by(job::Column::CurrentStatus)
        .into_tuple::<(String, i64)>()
        .all(db)
        .await?;
    Ok(result)
}

/// One bucket of the time-grouped count.
#[derive(Debug, Clone, PartialEq)]
pub struct PeriodCount {
    pub label: String,
    pub count: i64,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

#[derive(Debug, FromQueryResult)]
struct BucketRow {
    count: i64,
    year: i32,
    month: Option<i32>,
    day: Option<i32>,
    hour: Option<i32>,
}

/// Count jobs per time bucket of the timestamp recording entry into
/// `state`. Rows that never reached the state are skipped. With
/// `distinct_workers` the count is of distinct workers instead of rows.
pub async fn count_by_time_period<C: ConnectionTrait>(
    db: &C,
    project_id: &str,
    state: JobStatus,
    period: TimePeriod,
    start: Option<NaiveDateTime>,
    end: Option<NaiveDateTime>,
    distinct_workers: bool,
) -> AppResult<Vec<PeriodCount>> {
    let ts = state.timestamp_column();
    let count_expr = if distinct_workers {
        "COUNT(DISTINCT worker)"
    } else {
        "COUNT(*)"
    };

    // Grouping columns, widest first, down to the requested period.
    let parts: &[(&str, &str)] = match period {
        TimePeriod::Yearly => &[("year", "YEAR")],
        TimePeriod::Monthly => &[("year", "YEAR"), ("month", "MONTH")],
        TimePeriod::Daily => &[("year", "YEAR"), ("month", "MONTH"), ("day", "DAY")],
        TimePeriod::Hourly => &[
            ("year", "YEAR"),
            ("month", "MONTH"),
            ("day", "DAY"),
            ("hour", "HOUR"),
        ],
    };

    let select_parts: Vec<String> = parts
        .iter()
        .map(|(name, field)| format!("CAST(EXTRACT({field} FROM {ts}) AS INT4) AS {name}"))
        .collect();
    let group_refs: Vec<String> = (2..parts.len() + 2).map(|i| i.to_string()).collect();

    let mut sql = format!(
        "SELECT {count_expr} AS count, {} FROM jobs \
         WHERE project_id = $1 AND {ts} IS NOT NULL",
        select_parts.join(", "),
    );
    let mut values: Vec<Value> = vec![project_id.into()];
    if let Some(start) = start {
        values.push(start.into());
        sql.push_str(&format!(" AND {ts} >= ${}", values.len()));
    }
    if let Some(end) = end {
        values.push(end.into());
        sql.push_str(&format!(" AND {ts} < ${}", values.len()));
    }
    sql.push_str(&format!(" GROUP BY {}", group_refs.join(", ")));

    let rows = BucketRow::find_by_statement(Statement::from_sql_and_values(
        db.get_database_backend(),
        sql,
        values,
    ))
    .all(db)
    .await?;

    let mut counts = Vec::with_capacity(rows.len());
    for row in rows {
        let date = NaiveDate::from_ymd_opt(
            row.year,
            row.month.unwrap_or(1) as u32,
            row.day.unwrap_or(1) as u32,
        )
        .ok_or_else(|| AppError::Internal("bad bucket date from database".into()))?;
        let start = date
            .and_hms_opt(row.hour.unwrap_or(0) as u32, 0, 0)
            .ok_or_else(|| AppError::Internal("bad bucket time from database".into()))?;
        counts.push(PeriodCount {
            label: period.label(start),
            count: row.count,
            start,
            end: start + period.delta(),
        });
    }
    counts.sort_by_key(|c| c.start);
    Ok(counts)
}

/// Failed jobs inside the window, oldest first, bounded.
pub async fn failed_jobs_in_range<C: ConnectionTrait>(
    db: &C,
    project_id: &str,
    start: Option<NaiveDateTime>,
    end: Option<NaiveDateTime>,
    limit: u64,
) -> AppResult<Vec<job::Model>> {
    let filter = JobFilter {
        status: Some(JobStatus::Failed),
        time_state: Some(JobStatus::Failed),
        start,
        end,
        limit: Some(limit),
        ..Default::default()
    };
    list_jobs(db, project_id, &filter).await
}

/// Delete all job rows of a project.
pub async fn delete_project_jobs<C: ConnectionTrait>(
    db: &C,
    project_id: &str,
) -> AppResult<u64> {
    let result = Job::delete_many()
        .filter(job::Column::ProjectId.eq(project_id))
        .exec(db)
        .await?;
    Ok(result.rows_affected)
}
