//! Entry point: load config, wire dependencies, and run the server.

use std::sync::Arc;

use axum::http::{header, HeaderValue, Method};
use chatsock::auth::JwtSecret;
use chatsock::config::Config;
use chatsock::db::{self, PgGroupDirectory, PgMessageStore, PgUserPresenceStore};
use chatsock::{create_app, AppState, ConnectionRegistry, FanoutEngine, PresenceNotifier, RoomRouter};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = Config::from_env().map_err(|e| anyhow::anyhow!("config: {}", e))?;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))?;
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let db_pool = db::create_pool(&config.database_url, config.db_max_connections).await?;

    let registry = Arc::new(ConnectionRegistry::new());
    let router = Arc::new(RoomRouter::new());
    let messages = Arc::new(PgMessageStore::new(db_pool.clone()));
    let groups = Arc::new(PgGroupDirectory::new(db_pool.clone()));
    let presence_store = Arc::new(PgUserPresenceStore::new(db_pool));

    let fanout = FanoutEngine::new(
        registry.clone(),
        router.clone(),
        messages,
        groups.clone(),
        config.persist_timeout,
    );
    let presence = PresenceNotifier::new(registry.clone(), presence_store);
    let jwt_secret = JwtSecret::new(config.jwt_secret.clone());

    let state = AppState {
        registry,
        router,
        fanout,
        presence,
        groups,
        jwt_secret,
    };

    let cors = CorsLayer::new()
        .allow_origin(config.allowed_origin.parse::<HeaderValue>()?)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_credentials(true);

    let app = create_app(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    tracing::info!(addr = %config.server_addr, "listening");
    let listener = tokio::net::TcpListener::bind(config.server_addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
