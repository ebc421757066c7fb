use std::sync::Arc;

use axum::http::{header, Method};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::EnvFilter;

mod annotation;
mod config;
mod db;
pub mod error;
mod gmail;
mod handlers;
mod llm;
mod models;
mod schema;
mod services;
mod store;
#[cfg(test)]
mod testing;

use crate::annotation::AnnotationEngine;
use crate::config::AppConfig;
use crate::gmail::GmailConnector;
use crate::handlers::AppState;
use crate::llm::OpenAiClient;
use crate::store::{PgStore, Store};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::from_env()?;
    tracing::info!("LLM provider: {:?}", config.llm);

    // Establish database connection pool
    let pool = db::establish_connection_pool(&config.database_url)?;
    let store: Arc<dyn Store> = Arc::new(PgStore::new(pool));

    let engine = AnnotationEngine::new(Arc::new(OpenAiClient::new(&config.llm)?));
    let mail = Arc::new(GmailConnector::new(
        store.clone(),
        config.google_client_id.clone(),
        config.google_client_secret.clone(),
        config.gmail_timeout,
    ));

    let state = AppState {
        store,
        engine,
        mail,
        sync: config.sync.clone(),
    };

    let app = handlers::routes(state)
        .layer(build_cors_layer())
        .layer(TraceLayer::new_for_http());

    tracing::info!("Server listening on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Build CORS layer based on environment configuration.
///
/// If CORS_ALLOWED_ORIGINS is set, only those origins are allowed.
/// If not set, defaults to permissive CORS (for development only).
fn build_cors_layer() -> CorsLayer {
    let allowed_origins = std::env::var("CORS_ALLOWED_ORIGINS").ok();

    match allowed_origins {
        Some(origins) => {
            let origins: Vec<_> = origins
                .split(',')
                .filter_map(|s| s.trim().parse().ok())
                .collect();

            if origins.is_empty() {
                tracing::warn!(
                    "CORS_ALLOWED_ORIGINS is set but empty, using permissive CORS (not recommended for production)"
                );
                CorsLayer::permissive()
            } else {
                tracing::info!("CORS configured for origins: {:?}", origins);
                CorsLayer::new()
                    .allow_origin(AllowOrigin::list(origins))
                    .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
                    .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
            }
        }
        None => {
            tracing::warn!(
                "CORS_ALLOWED_ORIGINS not set, using permissive CORS (not recommended for production)"
            );
            CorsLayer::permissive()
        }
    }
}
