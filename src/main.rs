use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use clap::Parser;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use lesewelt::config::{Cli, Config};
use lesewelt::db;
use lesewelt::rate_limit::InMemoryRateLimiter;
use lesewelt::routes;
use lesewelt::state::AppState;

// Question audio may be up to 10 MB; leave headroom for the rest of
// the form.
const BODY_LIMIT_BYTES: usize = 12 * 1024 * 1024;

const PROGRESS_HITS_PER_MINUTE: u32 = 60;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Parse CLI args and load config
    let cli = Cli::parse();
    let data_dir = Config::data_dir(&cli);
    std::fs::create_dir_all(&data_dir)?;
    tracing::info!("Data directory: {}", data_dir.display());

    let config = Config::load(&cli)?;

    // Ensure upload directories exist
    std::fs::create_dir_all(config.avatars_dir())?;
    std::fs::create_dir_all(config.question_audio_dir())?;
    std::fs::create_dir_all(config.word_photos_dir())?;

    // Initialize database
    let pool = db::create_pool(config.db_path())?;
    db::run_migrations(&pool)?;

    let state = AppState {
        db: pool,
        config: config.clone(),
        rate_limiter: Arc::new(InMemoryRateLimiter::per_minute(PROGRESS_HITS_PER_MINUTE)),
    };

    let app = routes::router()
        .nest_service("/assets", ServeDir::new("assets"))
        .nest_service("/uploads", ServeDir::new(config.uploads_root()))
        .nest_service("/wordsPhotos", ServeDir::new(config.word_photos_dir()))
        .layer(DefaultBodyLimit::max(BODY_LIMIT_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    tracing::info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
