use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::info;

use bridge_worker::audit::{LoggingAuditSink, NullAuditSink};
use bridge_worker::broker::ChannelBroker;
use bridge_worker::cache::DeviceCache;
use bridge_worker::config::BridgeConfig;
use bridge_worker::health;
use bridge_worker::plates::NoopPlateLookup;
use bridge_worker::session::SessionTable;
use bridge_worker::worker::{Protocol, Worker};

/// Periodic liveness check (§4.7): ticks every 60s, logging each worker's
/// counters and exiting the process if any worker has gone unhealthy and
/// stays that way after one reconnect attempt, for an external supervisor
/// to restart.
async fn run_liveness_loop(workers: &[Arc<Worker>], shutdown: CancellationToken) {
    let mut interval = tokio::time::interval(Duration::from_secs(60));
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = interval.tick() => {
                for w in workers {
                    health::liveness_tick(&w.health(), Duration::from_secs(300));
                }
            }
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = BridgeConfig::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            if config.verbose { "bridge_worker=debug".into() } else { "bridge_worker=info".into() }
        }))
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        mqtt_broker_host = %config.mqtt_broker_host,
        "bridge-worker starting"
    );

    let broker: Arc<dyn bridge_worker::broker::BrokerClient> = ChannelBroker::new();
    let sessions = Arc::new(SessionTable::new());
    let cache = Arc::new(DeviceCache::new());
    let audit: Arc<dyn bridge_worker::audit::AuditSink> =
        if config.elastic_url.is_some() { Arc::new(LoggingAuditSink) } else { Arc::new(NullAuditSink) };
    let plates: Arc<dyn bridge_worker::plates::PlateLookup> = Arc::new(NoopPlateLookup);

    let shutdown = health::shutdown_token();
    let mut workers = Vec::with_capacity(Protocol::ALL.len());
    let mut tasks = JoinSet::new();

    for protocol in Protocol::ALL {
        let worker = Arc::new(Worker::new(
            protocol,
            broker.clone(),
            sessions.clone(),
            cache.clone(),
            audit.clone(),
            plates.clone(),
            config.clone(),
        ));
        workers.push(worker.clone());

        let worker_shutdown = shutdown.clone();
        tasks.spawn(async move { worker.run(worker_shutdown).await });
    }

    let liveness_shutdown = shutdown.clone();
    let liveness_workers = workers.clone();
    tasks.spawn(async move { run_liveness_loop(&liveness_workers, liveness_shutdown).await });

    tokio::signal::ctrl_c().await.expect("failed to listen for ctrl-c");
    info!("bridge-worker: shutdown signal received");
    shutdown.cancel();

    while tasks.join_next().await.is_some() {}
    info!("bridge-worker: all workers stopped, exiting");
    Ok(())
}
