//! Conversation sync server binary
//!
//! Wires the core sync service and the Slack provider into one axum app.
//! Tenants are seeded from a JSON file at boot (`TENANTS_FILE`, default
//! `tenants.json`); everything else is driven by webhooks and the dashboard
//! API.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use conversations::logic::tenant::Tenant;
use conversations::repository::{Repository, TenantRepositoryLike};
use conversations::service::{SyncService, SyncServiceParams};
use conversations_slack::{SlackClient, SlackSyncService};
use tower_http::cors::CorsLayer;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    shared::logging::configure_logging()?;

    let repository = Repository::new();
    seed_tenants(&repository).await?;

    let sync = Arc::new(SyncService::new(SyncServiceParams {
        repository: repository.clone(),
    }));
    let slack_service = Arc::new(SlackSyncService::new(
        sync.clone(),
        Arc::new(SlackClient::new()),
    ));

    let (conversations_router, _) = conversations::router::create_router().split_for_parts();
    let (slack_router, _) = conversations_slack::router::create_router().split_for_parts();
    let router = Router::new()
        .merge(conversations_router.with_state(sync))
        .merge(slack_router.with_state(slack_service))
        .layer(CorsLayer::permissive());

    let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port: u16 = std::env::var("PORT")
        .unwrap_or_else(|_| "8080".to_string())
        .parse()?;
    let addr: SocketAddr = format!("{host}:{port}").parse()?;

    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down");
        })
        .await?;
    Ok(())
}

/// Load tenants from the seed file, if present. A missing file is an empty
/// directory, not an error.
async fn seed_tenants(repository: &Repository) -> Result<(), anyhow::Error> {
    let path = std::env::var("TENANTS_FILE").unwrap_or_else(|_| "tenants.json".to_string());
    let contents = match std::fs::read_to_string(&path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            info!(path = %path, "No tenant seed file; starting with an empty directory");
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };
    let tenants: Vec<Tenant> = serde_json::from_str(&contents)?;
    let count = tenants.len();
    for tenant in &tenants {
        repository.save_tenant(tenant).await?;
    }
    info!(count = count, path = %path, "Seeded tenants");
    Ok(())
}
