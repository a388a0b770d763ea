use std::{net::SocketAddr, sync::Arc};

use auth::SessionConfig;
use server_api::ApiContext;
use storage::Storage;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod app_state;
mod config;
mod routes;

use app_state::AppState;
use config::{load_settings, normalize_database_url};
use routes::build_router;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let settings = load_settings()?;
    let database_url = normalize_database_url(&settings.database_url);
    let storage = Storage::new(&database_url).await.map_err(|error| {
        error!(
            %database_url,
            %error,
            "failed to open SQLite database; verify parent directory exists and permissions are correct"
        );
        error
    })?;

    let api = ApiContext {
        storage,
        session: SessionConfig {
            issuer: settings.session_issuer,
            secret: settings.session_secret,
            ttl_seconds: settings.session_ttl_seconds,
        },
        public_url: settings.server_public_url,
        max_blob_bytes: settings.max_blob_bytes,
    };
    let app = build_router(Arc::new(AppState { api }));

    let addr: SocketAddr = settings.server_bind.parse()?;
    info!(%addr, "catalog server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
