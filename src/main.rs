use clap::Parser;
use dotenv::dotenv;
use photovault::ai::{ChatBackend, ImageTagger, ModelClient, QueryTranslator};
use photovault::db::schema::ensure_schema;
use photovault::ingest::IngestPipeline;
use photovault::media::MediaStore;
use photovault::server::config::ServerConfig;
use photovault::services::auth_service::AuthKeys;
use photovault::tasks::TaggingQueue;
use photovault::web::{AppState, create_axum_router};
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_appender::rolling;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long)]
    config: Option<String>,
}

fn init_logging(log_dir: &Path) {
    // Log to a file: JSON format, daily rotation
    let file_appender = rolling::daily(log_dir, "photovault.log");
    let file_layer = fmt::layer()
        .with_writer(file_appender)
        .with_ansi(false)
        .json();

    // Log to stdout: human-readable format
    let stdout_layer = fmt::layer().with_writer(std::io::stdout);

    // Default to `info,sea_orm=warn` level if RUST_LOG is not set.
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,sea_orm=warn,sqlx::query=warn"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stdout_layer)
        .init();
}

struct AiComponents {
    query_translator: Arc<QueryTranslator>,
    image_tagger: Arc<ImageTagger>,
}

fn build_ai_components(config: &ServerConfig) -> Option<AiComponents> {
    let Some(settings) = config.ai_settings() else {
        warn!("AI_API_KEY is not set; image analysis and natural-language search are disabled.");
        return None;
    };
    let client = match ModelClient::new(&settings) {
        Ok(client) => client,
        Err(e) => {
            error!(error = %e, "Failed to create model client; AI features are disabled.");
            return None;
        }
    };
    let backend: Arc<dyn ChatBackend> = Arc::new(client);
    info!(
        model = %settings.model,
        fallback_models = ?settings.fallback_models,
        timeout_secs = settings.timeout.as_secs(),
        "Model client initialized."
    );
    Some(AiComponents {
        query_translator: Arc::new(QueryTranslator::new(
            backend.clone(),
            settings.model.clone(),
            settings.fallback_models.clone(),
        )),
        image_tagger: Arc::new(ImageTagger::new(backend, settings.model)),
    })
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal.");
        return;
    }
    info!("Shutdown signal received, stopping server.");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let args = Args::parse();
    dotenv().ok();

    // --- Server Config Setup ---
    let server_config = match ServerConfig::load(args.config.as_deref()) {
        Ok(config) => Arc::new(config),
        Err(e) => {
            eprintln!("Failed to load server configuration: {e}");
            return Err(e.into());
        }
    };

    init_logging(&server_config.log_dir);
    info!(version = env!("CARGO_PKG_VERSION"), "Starting photovault server.");

    if server_config.jwt_secret_is_default {
        warn!("JWT_SECRET is not set; using the development secret. Do not run like this in production.");
    }
    let auth_keys = match AuthKeys::new(&server_config.jwt_secret, server_config.token_ttl_hours) {
        Ok(keys) => Arc::new(keys),
        Err(e) => {
            error!(error = %e, "Invalid token signing settings.");
            return Err(e.into());
        }
    };

    // --- Database Pool Setup ---
    let mut opt = ConnectOptions::new(server_config.database_url.clone());
    opt.max_connections(10).sqlx_logging(false);
    let db_pool: DatabaseConnection = Database::connect(opt).await.map_err(|e| {
        error!(error = %e, "Failed to create database connection.");
        e
    })?;
    ensure_schema(&db_pool).await?;
    info!("Database schema is ready.");

    // --- Media Storage Setup ---
    let media_store = MediaStore::new(&server_config.upload_dir);
    media_store.ensure_dirs().await?;
    let ingest = IngestPipeline::new(db_pool.clone(), media_store.clone());

    // --- AI Setup ---
    let ai = build_ai_components(&server_config);
    let tagging_queue = ai.as_ref().map(|ai| {
        TaggingQueue::start(
            db_pool.clone(),
            ai.image_tagger.clone(),
            server_config.tagging_queue_capacity,
        )
    });

    let app_state = Arc::new(AppState {
        db_pool,
        config: server_config.clone(),
        auth_keys,
        media_store,
        ingest,
        query_translator: ai.as_ref().map(|ai| ai.query_translator.clone()),
        image_tagger: ai.map(|ai| ai.image_tagger),
        tagging_queue,
    });
    let app = create_axum_router(app_state);

    let addr: SocketAddr = server_config.listen_addr.parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "HTTP server listening.");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped.");
    Ok(())
}
