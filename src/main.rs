// src/main.rs

use std::sync::Arc;
use std::time::Duration;

use competency_backend::config::Config;
use competency_backend::routes;
use competency_backend::services::{
    AssessmentService, CertificateService, CertificateTrigger, HttpCertificateService,
    UnconfiguredCertificateService, spawn_retry_worker,
};
use competency_backend::state::AppState;
use competency_backend::store::{
    AssessmentRepository, InMemoryAssessmentRepository, InMemoryQuestionRepository,
    PgAssessmentRepository, PgQuestionRepository, QuestionRepository,
};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    // Load configuration from environment (.env included)
    let config = Config::from_env()?;

    let file_appender = tracing_appender::rolling::daily("logs", "app.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let env_filter = EnvFilter::new(&config.rust_log);
    let stdout_layer = fmt::layer().with_writer(std::io::stdout).with_target(false);
    let file_layer = fmt::layer().with_writer(non_blocking).with_ansi(false);

    // Initialize Tracing (Logging)
    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layer)
        .init();

    let (assessments, questions): (Arc<dyn AssessmentRepository>, Arc<dyn QuestionRepository>) =
        match &config.database_url {
            Some(url) => {
                let pool = connect_with_retry(url).await?;

                // Run Migrations Automatically
                tracing::info!("Running migrations...");
                sqlx::migrate!("./migrations").run(&pool).await?;
                tracing::info!("Migrations applied successfully.");

                let assessments: Arc<dyn AssessmentRepository> =
                    Arc::new(PgAssessmentRepository::new(pool.clone()));
                let questions: Arc<dyn QuestionRepository> = Arc::new(PgQuestionRepository::new(pool));
                (assessments, questions)
            }
            None => {
                tracing::warn!("DATABASE_URL not set, using the in-memory store; data is lost on exit");
                let assessments: Arc<dyn AssessmentRepository> = Arc::new(InMemoryAssessmentRepository::new());
                let questions: Arc<dyn QuestionRepository> = Arc::new(InMemoryQuestionRepository::new());
                (assessments, questions)
            }
        };

    let certificate_service: Arc<dyn CertificateService> = match &config.certificate_service_url {
        Some(url) => {
            tracing::info!("Certificates are issued through {}", url);
            Arc::new(HttpCertificateService::new(url, Duration::from_secs(10))?)
        }
        None => {
            tracing::warn!("CERTIFICATE_SERVICE_URL not set, awarded certificates stay pending");
            Arc::new(UnconfiguredCertificateService)
        }
    };

    let trigger = CertificateTrigger::new(assessments.clone(), certificate_service);
    let service = Arc::new(AssessmentService::new(
        assessments,
        questions.clone(),
        trigger,
        config.assessment.clone(),
    ));

    let retry_interval = Duration::from_secs(config.assessment.certificate_retry_interval_secs);
    let _retry_worker = spawn_retry_worker(service.clone(), retry_interval);

    let state = AppState {
        service,
        questions,
        config: config.clone(),
    };

    // Create the Axum application router
    let app = routes::create_router(state);

    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    tracing::info!("Listening on {}", config.listen_addr);

    // Start the server
    axum::serve(listener, app).await?;
    Ok(())
}

/// Connects to Postgres, retrying while the database comes up.
async fn connect_with_retry(url: &str) -> Result<PgPool, sqlx::Error> {
    let mut retry_count = 0;
    loop {
        match PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(3))
            .connect(url)
            .await
        {
            Ok(pool) => {
                tracing::info!("Database connected...");
                return Ok(pool);
            }
            Err(e) => {
                retry_count += 1;
                if retry_count > 5 {
                    tracing::error!("Failed to connect to database after 5 retries: {}", e);
                    return Err(e);
                }
                tracing::warn!("Database not ready, retrying in 2s... (Attempt {})", retry_count);
                tokio::time::sleep(Duration::from_secs(2)).await;
            }
        }
    }
}
