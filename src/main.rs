use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::info;

use fleetbook::command::Driver;
use fleetbook::config::Config;
use fleetbook::engine::Engine;
use fleetbook::notify::NotifyHub;
use fleetbook::store::{FleetDirectory, LocalStore, ReservationStore};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // stdout carries responses; logs go to stderr.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .init();

    let config = Config::from_env();
    fleetbook::observability::init(config.metrics_port)?;

    let seed = config.vehicles.iter().copied();
    let (store, directory) = if config.in_memory {
        (LocalStore::in_memory(), FleetDirectory::with_vehicles(seed))
    } else {
        std::fs::create_dir_all(&config.data_dir)?;
        (
            LocalStore::open(&config.wal_path())?,
            FleetDirectory::open(&config.directory_path(), seed)?,
        )
    };
    let (store, directory) = (Arc::new(store), Arc::new(directory));
    let engine = Engine::new(store.clone(), directory.clone(), Arc::new(NotifyHub::new()));

    info!("fleetbook ready");
    info!(
        "  storage: {}",
        if store.is_durable() {
            config.wal_path().display().to_string()
        } else {
            "in-memory".to_string()
        }
    );
    info!("  vehicles: {}", directory.len());
    info!(
        "  metrics: {}",
        config
            .metrics_port
            .map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics"))
    );

    if let Some(period) = config.activate_interval {
        let reservations: Arc<dyn ReservationStore> = store.clone();
        tokio::spawn(fleetbook::activator::run_activator(
            engine.clone(),
            reservations,
            period,
        ));
    }
    if store.is_durable() {
        tokio::spawn(fleetbook::activator::run_compactor(
            store.clone(),
            config.compact_threshold,
        ));
    }

    let driver = Driver::new(engine, directory);

    let shutdown = async {
        let ctrl_c = tokio::signal::ctrl_c();
        #[cfg(unix)]
        {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    tokio::select! {
                        _ = ctrl_c => {}
                        _ = sigterm.recv() => {}
                    }
                }
                Err(e) => {
                    tracing::warn!("cannot listen for SIGTERM: {e}");
                    ctrl_c.await.ok();
                }
            }
        }
        #[cfg(not(unix))]
        {
            ctrl_c.await.ok();
        }
    };
    tokio::pin!(shutdown);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    info!("stdin closed");
                    break;
                };
                if line.trim().is_empty() {
                    continue;
                }
                let response = driver.handle_line(&line).await;
                let mut out = response.to_string();
                out.push('\n');
                stdout.write_all(out.as_bytes()).await?;
                stdout.flush().await?;
            }
            _ = &mut shutdown => {
                info!("shutdown signal received");
                break;
            }
        }
    }

    // Compact on clean shutdown.
    if store.is_durable()
        && store.appends_since_compact().await > 0
        && let Err(e) = store.compact().await
    {
        tracing::warn!("final compaction failed: {e}");
    }
    info!("fleetbook stopped");
    Ok(())
}
