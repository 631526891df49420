//! Job entity for SeaORM.
//!
//! One physical table for all projects, keyed by `(project_id, id)`.
//! Job rows are never joined to project rows; the two stores are linked
//! by `project_id` only.

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "jobs")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub project_id: String,
    /// Caller-supplied identifier, unique per project.
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub job_type: Option<String>,
    pub source_url: String,
    pub target_url: Option<String>,
    pub view_result_url: Option<String>,
    /// Exclusive-assignment flag, flipped by a conditional UPDATE only.
    pub claimed: bool,
    /// AVAILABLE, CLAIMED, STARTED, FINISHED or FAILED.
    pub current_status: String,
    pub worker: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub worker_output: Option<String>,
    pub added_at: DateTime,
    pub claimed_at: Option<DateTime>,
    pub finished_at: Option<DateTime>,
    pub failed_at: Option<DateTime>,
    /// Seconds, reported by the worker with the final status.
    pub processing_time: Option<f64>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
