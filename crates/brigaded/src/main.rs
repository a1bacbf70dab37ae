//! brigaded — Brigade worker/manager daemon.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};

use brigade_bus::{Bus, MemoryBus};
use brigade_core::BrigadeConfig;
use brigade_manager::SystemManager;
use brigade_worker::Worker;

mod handlers;

use handlers::RelayHandler;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // Load config
    if let Err(e) = BrigadeConfig::write_default_if_missing() {
        tracing::warn!(error = %e, "failed to write default config");
    }
    let config = BrigadeConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load config, using defaults");
        BrigadeConfig::default()
    });

    let mut args = std::env::args().skip(1);
    let role = args.next().unwrap_or_else(|| "demo".to_string());
    match role.as_str() {
        "worker" => {
            let Some(kind) = args.next() else {
                bail!("usage: brigaded worker <KIND>");
            };
            run_worker(config, &kind).await
        }
        "manager" => run_manager(config).await,
        "demo" => run_demo(config).await,
        other => {
            eprintln!("unknown role: {other}");
            eprintln!("usage: brigaded [worker <KIND> | manager | demo]");
            std::process::exit(2);
        }
    }
}

/// One worker of the given kind on a fresh bus, relaying jobs until
/// ctrl-c.
async fn run_worker(config: BrigadeConfig, kind: &str) -> Result<()> {
    let bus: Arc<dyn Bus> = Arc::new(MemoryBus::new());
    tracing::info!(kind, "brigaded starting in worker role");

    let handler = Arc::new(RelayHandler::new(kind));
    let worker = Worker::spawn(bus, &config, kind, handler).await?;
    tracing::info!(worker = %worker.descriptor().id, "worker online");

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown signal received");
    worker.shutdown().await;
    Ok(())
}

/// The system manager alone, watching the directory until ctrl-c.
async fn run_manager(config: BrigadeConfig) -> Result<()> {
    let bus: Arc<dyn Bus> = Arc::new(MemoryBus::new());
    tracing::info!("brigaded starting in manager role");

    let manager = SystemManager::spawn(bus, &config).await?;

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown signal received");
    manager.shutdown();
    Ok(())
}

/// A complete two-hop pipeline in one process: a manager, a WA worker
/// and a WB worker share the bus, and WA seeds a job that travels
/// WA -> WB.
async fn run_demo(config: BrigadeConfig) -> Result<()> {
    let bus: Arc<dyn Bus> = Arc::new(MemoryBus::new());
    tracing::info!("brigaded starting in demo role");

    let manager = SystemManager::spawn(bus.clone(), &config).await?;
    let wa = Worker::spawn(
        bus.clone(),
        &config,
        "WA",
        Arc::new(RelayHandler::new("WA")),
    )
    .await?;
    let wb = Worker::spawn(
        bus.clone(),
        &config,
        "WB",
        Arc::new(RelayHandler::new("WB")),
    )
    .await?;

    // Let announcements settle before the first send.
    tokio::time::sleep(Duration::from_millis(500)).await;
    wa.send_to_next_worker(
        vec!["WA:*".to_string(), "WB:*".to_string()],
        serde_json::json!({ "title": "toto" }),
    );

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown signal received");
    wa.shutdown().await;
    wb.shutdown().await;
    manager.shutdown();
    Ok(())
}
