//! Migration: Create projects table.
//!
//! A project is a namespace of jobs sharing a processing image and an
//! optional deadline. The nr_* counters are redundant aggregates over the
//! project's job rows, kept in step by the lifecycle transactions so that
//! status reads are O(1).

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .get_connection()
            .execute_unprepared(
                r#"
                CREATE TABLE projects (
                    id VARCHAR(64) PRIMARY KEY,
                    name VARCHAR(128) NOT NULL,
                    created_at TIMESTAMP NOT NULL DEFAULT (NOW() AT TIME ZONE 'utc'),
                    created_by VARCHAR(32) NOT NULL,

                    processing_image_url VARCHAR(512),
                    -- opaque key/value mapping, serialized JSON
                    environment TEXT,
                    deadline TIMESTAMP,

                    last_added_at TIMESTAMP,
                    last_claimed_at TIMESTAMP,
                    nr_added BIGINT NOT NULL DEFAULT 0,
                    nr_claimed BIGINT NOT NULL DEFAULT 0,
                    nr_finished BIGINT NOT NULL DEFAULT 0,
                    nr_failed BIGINT NOT NULL DEFAULT 0,
                    -- seconds, summed from worker reports
                    processing_time_total DOUBLE PRECISION NOT NULL DEFAULT 0
                );

                CREATE INDEX idx_projects_created_at ON projects(created_at);
                CREATE INDEX idx_projects_deadline ON projects(deadline);
                CREATE INDEX idx_projects_last_claimed_at ON projects(last_claimed_at);
                "#,
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .get_connection()
            .execute_unprepared("DROP TABLE IF EXISTS projects;")
            .await?;

        Ok(())
    }
}
