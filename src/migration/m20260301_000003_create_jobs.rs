//! Migration: Create jobs table.
//!
//! All projects share one table; every query filters on project_id.
//! Deleting a project deletes its job rows in the same unit of work.

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
                CREATE TABLE jobs (
                    project_id VARCHAR(64) NOT NULL,
                    id VARCHAR(64) NOT NULL,

                    job_type VARCHAR(64),
                    source_url VARCHAR(512) NOT NULL,
                    target_url VARCHAR(512),
                    view_result_url VARCHAR(512),

                    -- exclusive assignment; flipped by a conditional UPDATE
                    claimed BOOLEAN NOT NULL DEFAULT FALSE,
                    current_status VARCHAR(64) NOT NULL DEFAULT 'AVAILABLE'
                        CHECK (current_status IN
                            ('AVAILABLE', 'CLAIMED', 'STARTED', 'FINISHED', 'FAILED')),
                    worker VARCHAR(64),
                    worker_output TEXT,

                    added_at TIMESTAMP NOT NULL DEFAULT (NOW() AT TIME ZONE 'utc'),
                    claimed_at TIMESTAMP,
                    finished_at TIMESTAMP,
                    failed_at TIMESTAMP,
                    -- seconds, reported by the worker
                    processing_time DOUBLE PRECISION,

                    PRIMARY KEY (project_id, id)
                );

                CREATE INDEX idx_jobs_added_at ON jobs(project_id, added_at);
                CREATE INDEX idx_jobs_claimed_at ON jobs(project_id, claimed_at);
                CREATE INDEX idx_jobs_finished_at ON jobs(project_id, finished_at);
                CREATE INDEX idx_jobs_failed_at ON jobs(project_id, failed_at);
                CREATE INDEX idx_jobs_current_status ON jobs(project_id, current_status);
                CREATE INDEX idx_jobs_worker ON jobs(project_id, worker);

                -- accelerates the fetch-next-available scan
                CREATE INDEX idx_jobs_claimed_type ON jobs(project_id, claimed, job_type);
                "#,
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .get_connection()
            .execute_unprepared("DROP TABLE IF EXISTS jobs;")
            .await?;

        Ok(())
    }
}
