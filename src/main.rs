//! OpenSASE Orders - order lifecycle service

use anyhow::Result;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use opensase_orders::api::{self, AppState};
use opensase_orders::config::Config;
use opensase_orders::infrastructure::events::{EventPublisher, LogPublisher, NatsPublisher};
use opensase_orders::infrastructure::memory::MemoryStore;
use opensase_orders::infrastructure::postgres::PgStore;
use opensase_orders::OrderService;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let events: Arc<dyn EventPublisher> = match &config.nats_url {
        Some(url) => match NatsPublisher::connect(url, config.nats_subject_prefix.clone()).await {
            Ok(publisher) => Arc::new(publisher),
            Err(e) => {
                tracing::warn!(error = %e, "NATS unavailable, events will only be logged");
                Arc::new(LogPublisher)
            }
        },
        None => Arc::new(LogPublisher),
    };

    let service = match &config.database_url {
        Some(url) => {
            let store = PgStore::connect(url, config.database_max_connections).await?;
            store.migrate().await?;
            OrderService::with_store(Arc::new(store), events)
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory storage");
            OrderService::with_store(Arc::new(MemoryStore::new()), events)
        }
    };

    let app = api::router(AppState::new(service, config.default_currency.clone()))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr = config.bind_addr();
    tracing::info!("OpenSASE Orders listening on {}", addr);
    axum::serve(tokio::net::TcpListener::bind(&addr).await?, app).await?;
    Ok(())
}
