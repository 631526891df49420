//! OpenAPI documentation configuration.

use utoipa::OpenApi;

use crate::{api, error, models};

/// OpenAPI documentation.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "uService",
        version = "0.4.0",
        description = "Multi-project job queue API server coordinating producers and workers"
    ),
    servers(
        (url = "/", description = "Local server")
    ),
    paths(
        // Health endpoints
        api::health::health,
        // Admin endpoints
        api::admin::create_user,
        api::admin::get_user,
        api::admin::delete_user,
        api::admin::get_token,
        // Project endpoints
        api::projects::list_projects,
        api::projects::project_status,
        api::projects::put_project,
        api::projects::delete_project,
        api::projects::fetch_job_prio,
        // Job collection endpoints
        api::jobs::list_jobs,
        api::jobs::post_jobs,
        api::jobs::fetch_job,
        api::jobs::count_jobs,
        api::jobs::failures,
        // Per-job endpoints
        api::job::get_claim,
        api::job::put_claim,
        api::job::delete_claim,
        api::job::get_status,
        api::job::put_status,
        api::job::get_output,
        api::job::put_output,
    ),
    components(
        schemas(
            // Common
            error::ErrorResponse,
            api::health::HealthResponse,
            // Admin
            models::CreateUserRequest,
            models::UserCreatedResponse,
            models::UserResponse,
            models::TokenResponse,
            // Projects
            models::project::PrettyProjectUrls,
            models::PrettyProject,
            models::ProjectsListResponse,
            models::ProjectStatusResponse,
            api::projects::ProjectAck,
            // Jobs
            models::JobStatus,
            models::job::PrettyJobUrls,
            models::PrettyJob,
            models::JobsListResponse,
            models::WorkerJob,
            models::WorkerJobUrls,
            models::FetchResponse,
            models::CountBucket,
            models::CountsResponse,
            models::ScoredLine,
            models::FailureLine,
            models::FailedJobSummary,
            models::FailuresResponse,
            models::ClaimInfoResponse,
            models::ClaimResponse,
            models::StatusResponse,
            models::StatusUpdateResponse,
            models::OutputResponse,
            models::OutputUpdateResponse,
        )
    ),
    tags(
        (name = "Health", description = "Service health"),
        (name = "Admin", description = "User administration and tokens"),
        (name = "Projects", description = "Project registry and scheduling"),
        (name = "Jobs", description = "Job collections per project"),
        (name = "Job", description = "Single-job lifecycle")
    )
)]
pub struct ApiDoc;
