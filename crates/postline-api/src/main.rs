//! Postline API server.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

use postline_api::{AppConfig, AppState, routes};
use postline_db::{JobStore, PgJobStore, PgScheduleStore, ScheduleStore};
use postline_engine::StageHandlers;
use postline_stages::{
    CreateStage, DeployStage, ExportStage, GitHubClient, GitHubConfig, InferenceClient,
    InferenceConfig, ResearchStage, ReviewStage, SearchClient, SearchConfig, ValidateStage,
    WriteStage,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::from_env();

    info!("Connecting to database...");
    let pool = postline_db::create_pool(&config.database_url).await?;
    postline_db::run_migrations(&pool).await?;
    info!("Database ready");

    let jobs: Arc<dyn JobStore> = Arc::new(PgJobStore::new(pool.clone()));
    let schedules: Arc<dyn ScheduleStore> = Arc::new(PgScheduleStore::new(pool));

    let inference = Arc::new(InferenceClient::new(
        InferenceConfig::from_env().context("INFERENCE_API_KEY is not set")?,
    ));
    let search = Arc::new(SearchClient::new(
        SearchConfig::from_env().context("SEARCH_API_URL / SEARCH_API_KEY are not set")?,
    ));
    let github = Arc::new(GitHubClient::new(
        GitHubConfig::from_env().context("GITHUB_TOKEN / GITHUB_CONTENT_REPO are not set")?,
    ));

    let handlers = StageHandlers {
        research: Arc::new(ResearchStage {
            search,
            llm: inference.clone(),
        }),
        write: Arc::new(WriteStage {
            llm: inference.clone(),
        }),
        review: Arc::new(ReviewStage {
            llm: inference.clone(),
        }),
        create: Arc::new(CreateStage { llm: inference }),
        export: Arc::new(ExportStage {
            content_dir: config.content_dir.clone(),
        }),
        validate: Arc::new(ValidateStage),
        deploy: Arc::new(DeployStage { github }),
    };

    let port = config.port;
    let state = AppState::new(config, jobs, schedules, handlers);

    let app = routes::router(state)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Starting server on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
