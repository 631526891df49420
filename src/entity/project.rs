//! Project entity for SeaORM.

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "projects")]
pub struct Model {
    /// Caller-supplied identifier, `[A-Za-z][A-Za-z0-9]*`, at most 64 chars.
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub name: String,
    pub created_at: DateTime,
    /// Username of the creator; immutable after insert.
    pub created_by: String,
    pub processing_image_url: Option<String>,
    /// Opaque key/value mapping, stored as a JSON string.
    #[sea_orm(column_type = "Text", nullable)]
    pub environment: Option<String>,
    pub deadline: Option<DateTime>,
    pub last_added_at: Option<DateTime>,
    pub last_claimed_at: Option<DateTime>,
    pub nr_added: i64,
    pub nr_claimed: i64,
    pub nr_finished: i64,
    pub nr_failed: i64,
    /// Sum of worker-reported processing times, in seconds.
    pub processing_time_total: f64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
