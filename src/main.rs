// src/main.rs
// FOCUS ROOM - API SERVER
// Runs LLM-simulated focus groups and serves live transcripts via REST (Actix-Web)

use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

// Modules
mod api;
mod config;
mod error;
mod generation;
mod participant;
mod prompt;
mod reporter;
mod runner;
mod session;
mod transcript;

use config::AppConfig;
use generation::{GeminiGenerator, TranscriptGenerator};
use session::SessionStore;

// Shared State for the Server
pub struct AppState {
    pub generator: Arc<dyn TranscriptGenerator>, // Streams the simulated discussion
    pub sessions: SessionStore,                  // In-memory session store
    pub config: AppConfig,
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // 1. Load configuration
    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            error!(error = %err, "refusing to start");
            return Err(std::io::Error::new(std::io::ErrorKind::InvalidInput, err.to_string()));
        }
    };
    if config.api_key.is_none() {
        info!("no API key configured; runs will be rejected until one is set");
    }

    // 2. Build the generator (ONCE at startup)
    let generator = GeminiGenerator::from_config(&config)
        .map_err(|err| std::io::Error::new(std::io::ErrorKind::Other, err.to_string()))?;

    let bind = config.bind.clone();

    // 3. Create Shared State
    let app_state = web::Data::new(AppState {
        generator: Arc::new(generator),
        sessions: SessionStore::new(),
        config,
    });

    info!(bind = %bind, "focus room server starting");

    // 4. Start HTTP Server
    HttpServer::new(move || {
        let cors = Cors::permissive();

        App::new()
            .wrap(cors)
            .app_data(app_state.clone())
            .configure(api::configure)
    })
    .bind(bind)?
    .run()
    .await
}
