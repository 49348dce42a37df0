// Modules
pub mod ai;
pub mod catalog;
pub mod config;
pub mod error;
pub mod search;
pub mod server;

use ai::credentials::{KeychainStore, MemoryStore, SecretStore};
use ai::{CredentialManager, GeminiClient, RecommendationClient};
use catalog::Catalog;
use config::Config;
use error::StartupError;
use search::SearchMachine;
use server::AppState;
use std::sync::{Arc, Once};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_LOG_FILTER: &str = "research_librarian_lib=debug,tower_http=info";

/// Install the global tracing subscriber (stderr, `RUST_LOG` aware)
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init();
    });
}

/// Wire the catalog, credentials, Gemini client and search machine together
pub fn build_state(config: &Config) -> Result<Arc<AppState>, StartupError> {
    let catalog = match &config.catalog_path {
        Some(path) => Catalog::load(path)?,
        None => {
            let catalog = Catalog::sample();
            tracing::info!("Using built-in sample catalog ({} entries)", catalog.len());
            catalog
        }
    };
    let catalog = Arc::new(catalog);

    let store: Box<dyn SecretStore> = if config.use_keychain {
        Box::new(KeychainStore::new())
    } else {
        Box::new(MemoryStore::default())
    };
    let credentials = Arc::new(CredentialManager::new(config.api_key.clone(), Some(store)));
    if credentials.resolve().is_none() {
        tracing::warn!("No API key yet; searches will ask for one");
    }

    let generator = Arc::new(GeminiClient::new(&config.api_base, &config.model, config.request_timeout)?);
    let recommender = Arc::new(RecommendationClient::new(
        generator,
        credentials.clone(),
        catalog.clone(),
        config.mode,
        config.request_timeout,
    ));

    Ok(Arc::new(AppState {
        machine: Arc::new(SearchMachine::new(recommender, config.min_display)),
        credentials,
        catalog,
        mode: config.mode,
    }))
}

/// Load configuration, start the server and run until Ctrl-C
pub async fn run() -> Result<(), StartupError> {
    // A missing .env file is fine
    dotenvy::dotenv().ok();
    init_tracing();

    let config = Config::from_env()?;
    tracing::info!(
        "Starting Research Librarian v{} ({:?} mode, model {})",
        env!("CARGO_PKG_VERSION"),
        config.mode,
        config.model
    );

    let state = build_state(&config)?;
    let app = server::router(state, config.ui_dir.clone());
    let running = server::start_server(config.bind, config.port, app).await?;
    tracing::info!("Research Librarian ready at http://{}", running.addr);

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl-C: {}", e);
    }
    running.shutdown().await;
    Ok(())
}
