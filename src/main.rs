use std::time::Duration;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mediabox::services::buckets as bucket_service;
use mediabox::{AppState, Config};

/// Runs one reconciliation pass over every bucket owner.
async fn reconcile_all(state: &AppState) -> mediabox::Result<usize> {
    let mut corrected = 0;
    for user_id in state.buckets.list_owners().await? {
        match bucket_service::reconcile_usage(state, user_id).await {
            Ok(n) => corrected += n,
            Err(e) => {
                tracing::error!("Reconciliation failed for user {}", user_id);
                e.log();
            }
        }
    }
    Ok(corrected)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    dotenvy::dotenv().ok();

    let config = Config::from_env()?;
    tracing::info!("Configuration loaded");

    let state = AppState::new(&config).await?;
    tracing::info!("AppState initialized");

    let reconcile_state = state.clone();
    let mut ticker = tokio::time::interval(Duration::from_secs(config.reconcile_interval_secs));
    let reconciler = tokio::spawn(async move {
        loop {
            ticker.tick().await;
            tracing::info!("Reconciling storage bucket accounting...");
            match reconcile_all(&reconcile_state).await {
                Ok(corrected) => {
                    tracing::info!("Reconciliation completed, {} buckets corrected", corrected);
                }
                Err(e) => {
                    tracing::error!("Reconciliation pass failed: {}", e);
                }
            }
        }
    });

    tracing::info!(
        "Bucket reconciliation running every {}s; press Ctrl-C to stop",
        config.reconcile_interval_secs
    );

    tokio::signal::ctrl_c().await?;
    reconciler.abort();
    tracing::info!("Shutting down");

    Ok(())
}
