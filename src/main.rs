use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use folio_ingest::config::IngestConfig;
use folio_ingest::database::SqliteStore;
use folio_ingest::server::{AppState, router};
use folio_ingest::tracker::{Ingestor, Stores};

#[tokio::main]
async fn main() {
    let config = IngestConfig::from_env().expect("Invalid configuration");

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let aliases = config.load_aliases().expect("Failed to load header aliases");
    let store = SqliteStore::open(&config.database_url).expect("Failed to initialize database");
    info!("Using database {}", config.database_url);

    let ingestor = Ingestor::new(
        Stores::shared(Arc::new(store)),
        Arc::new(aliases),
        &config.placeholder_email_domain,
    );
    let app = router(Arc::new(AppState { ingestor }));

    let addr = format!("0.0.0.0:{}", config.server_port);
    let listener = tokio::net::TcpListener::bind(&addr).await.unwrap();
    info!("listening on {}", listener.local_addr().unwrap());
    axum::serve(listener, app).await.unwrap();
}
