//! uService - Main entry point.
//!
//! Starts the Actix-web server with configured routes and middleware.

mod api;
mod auth;
mod config;
mod db;
mod entity;
mod error;
mod middleware;
mod migration;
mod models;
mod services;

use actix_cors::Cors;
use actix_web::{App, HttpRequest, HttpServer, error::JsonPayloadError, http::header, web};
use secrecy::ExposeSecret;
use sea_orm_migration::MigratorTrait;
use tracing::{Level, error, info, warn};
use tracing_subscriber::FmtSubscriber;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::api::utcnow;
use crate::config::Config;
use crate::db::{DbPool, users};
use crate::error::AppError;
use crate::migration::Migrator;
use crate::services::password;

/// Perform health check (for Docker healthcheck).
async fn health_check() -> bool {
    Config::from_env().is_ok()
}

/// Insert the configured admin user when missing, so a fresh deployment
/// can authenticate at all.
async fn bootstrap_admin(pool: &DbPool, config: &Config) {
    let (Some(username), Some(admin_password)) = (&config.admin_user, &config.admin_password)
    else {
        warn!("No admin credentials configured; /admin endpoints are unreachable");
        return;
    };

    let db = pool.connection();
    match users::find_by_username(db, username).await {
        Ok(Some(_)) => {}
        Ok(None) => {
            let hash = password::hash_password(admin_password.expose_secret());
            match users::add_user(db, username, &hash, utcnow()).await {
                Ok(_) => info!(username = %username, "admin user created"),
                Err(e) => error!("Failed to create admin user: {}", e),
            }
        }
        Err(e) => error!("Failed to look up admin user: {}", e),
    }
}

/// Map JSON body failures onto the uniform error shape.
fn json_error_handler(err: JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
    match err {
        JsonPayloadError::ContentType => AppError::UnsupportedMedia.into(),
        other => AppError::Validation(format!("Invalid JSON body: {}", other)).into(),
    }
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Check for --health-check flag (used by Docker HEALTHCHECK)
    let args: Vec<String> = std::env::args().collect();
    if args.iter().any(|arg| arg == "--health-check") {
        dotenvy::dotenv().ok();
        if health_check().await {
            std::process::exit(0);
        } else {
            std::process::exit(1);
        }
    }

    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");

    // Load configuration
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            error!("");
            error!("Please check your environment variables:");
            error!("  - USERVICE_DATABASE_URI must point at a PostgreSQL instance");
            error!("  - In production (USERV_API_PRODUCTION set), USERVICE_SECRET_KEY,");
            error!("    USERVICE_ADMIN_USER and USERVICE_ADMIN_PASSWORD are required");
            std::process::exit(1);
        }
    };

    info!("========================================");
    info!("  uService job queue");
    info!("  Environment: {}", config.environment);
    info!("========================================");

    if config.is_development() {
        warn!("Running in DEVELOPMENT mode - do not use in production!");
    }

    // Connect and migrate
    let pool = DbPool::connect(&config)
        .await
        .expect("Failed to initialize database");
    info!("Database connection established");

    Migrator::up(pool.connection(), None)
        .await
        .expect("Failed to run migrations");
    info!("Database migrations complete");

    bootstrap_admin(&pool, &config).await;

    let bind_address = config.bind_address();
    let is_development = config.is_development();

    let worker_count = if is_development {
        info!(
            "Starting server at http://{} (4 workers - development mode)",
            bind_address
        );
        4
    } else {
        let cpus = num_cpus::get();
        info!(
            "Starting server at http://{} ({} workers)",
            bind_address, cpus
        );
        cpus
    };

    // Start HTTP server
    HttpServer::new(move || {
        let cors = Cors::default()
            .allowed_methods(vec!["GET", "POST", "PUT", "DELETE", "OPTIONS"])
            .allowed_headers(vec![
                header::AUTHORIZATION,
                header::ACCEPT,
                header::CONTENT_TYPE,
            ])
            .max_age(3600);

        App::new()
            .wrap(cors)
            .wrap(middleware::RequestLogger)
            .app_data(web::Data::new(pool.clone()))
            .app_data(web::Data::new(config.clone()))
            .app_data(web::JsonConfig::default().error_handler(json_error_handler))
            .configure(api::configure_health_routes)
            .service(
                // literal segments (admin, token, projects) are registered
                // before the {project} catch-alls
                web::scope("/rest_api/v4")
                    .configure(api::configure_admin_routes)
                    .configure(api::configure_project_routes)
                    .configure(api::configure_jobs_routes)
                    .configure(api::configure_job_routes),
            )
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}")
                    .url("/api-docs/openapi.json", api::ApiDoc::openapi()),
            )
    })
    .workers(worker_count)
    .bind(bind_address)?
    .run()
    .await
}
