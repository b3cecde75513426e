use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use metrics::gauge;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use wallet_ledger_domain::{
    config::{ConfigError, MonitorConfig},
    model::WalletId,
    services::{SchedulerError, TelemetryError},
    storage::{EventLedger, StorageError, WalletRegistry},
};

use crate::{rpc::LedgerProvider, sync::WalletSynchronizer};

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("rpc error: {0}")]
    Rpc(String),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("telemetry error: {0}")]
    Telemetry(#[from] TelemetryError),
    #[error("scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),
}

impl From<reqwest::Error> for MonitorError {
    fn from(value: reqwest::Error) -> Self {
        Self::Rpc(value.to_string())
    }
}

impl From<serde_json::Error> for MonitorError {
    fn from(value: serde_json::Error) -> Self {
        Self::Decode(value.to_string())
    }
}

/// Polling cadence of the monitor loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorSettings {
    pub poll_interval: Duration,
    pub error_backoff: Duration,
    pub wallet_batch_size: usize,
    pub wallet_batch_pause: Duration,
}

impl From<&MonitorConfig> for MonitorSettings {
    fn from(config: &MonitorConfig) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            error_backoff: config.error_backoff(),
            wallet_batch_size: config.wallet_batch_size(),
            wallet_batch_pause: config.wallet_batch_pause(),
        }
    }
}

/// Polls every active wallet until `stop` flips to `true` (or its sender is
/// dropped). A failing wallet never stops the loop; a failing tick backs off
/// for `error_backoff` before the next attempt.
pub async fn run_monitor<P, L, R>(
    settings: MonitorSettings,
    synchronizer: Arc<WalletSynchronizer<P, L>>,
    registry: Arc<R>,
    mut stop: watch::Receiver<bool>,
) -> Result<(), MonitorError>
where
    P: LedgerProvider + ?Sized + 'static,
    L: EventLedger + ?Sized + 'static,
    R: WalletRegistry + ?Sized,
{
    info!(
        poll_interval_ms = settings.poll_interval.as_millis() as u64,
        batch_size = settings.wallet_batch_size,
        "monitor started"
    );

    loop {
        if *stop.borrow() {
            break;
        }

        let delay = match run_tick(&settings, &synchronizer, registry.as_ref(), &stop).await {
            Ok(()) => settings.poll_interval,
            Err(err) => {
                warn!(%err, "monitor tick failed; backing off");
                settings.error_backoff
            }
        };

        tokio::select! {
            _ = sleep(delay) => {}
            changed = stop.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }

    info!("monitor stopped");
    Ok(())
}

async fn run_tick<P, L, R>(
    settings: &MonitorSettings,
    synchronizer: &Arc<WalletSynchronizer<P, L>>,
    registry: &R,
    stop: &watch::Receiver<bool>,
) -> Result<(), MonitorError>
where
    P: LedgerProvider + ?Sized + 'static,
    L: EventLedger + ?Sized + 'static,
    R: WalletRegistry + ?Sized,
{
    let wallets = registry.list_active().await?;
    gauge!("monitor_active_wallets").set(wallets.len() as f64);

    let active: HashSet<WalletId> = wallets.iter().map(|w| w.wallet_id.clone()).collect();
    let pruned = synchronizer.cursors().retain(&active);
    if pruned > 0 {
        debug!(pruned, "dropped cursors of removed wallets");
    }

    let batch_size = settings.wallet_batch_size.max(1);
    let batch_count = wallets.len().div_ceil(batch_size);
    for (index, batch) in wallets.chunks(batch_size).enumerate() {
        if *stop.borrow() {
            return Ok(());
        }

        let mut running = JoinSet::new();
        for wallet in batch.iter().cloned() {
            let synchronizer = synchronizer.clone();
            running.spawn(async move {
                let outcome = synchronizer.sync(&wallet).await;
                (wallet, outcome)
            });
        }

        while let Some(joined) = running.join_next().await {
            match joined {
                Ok((_, Ok(_))) => {}
                Ok((wallet, Err(err))) => {
                    warn!(wallet_id = %wallet.wallet_id, %err, "wallet sync failed")
                }
                Err(err) => warn!(%err, "wallet sync task aborted"),
            }
        }

        if index + 1 < batch_count {
            sleep(settings.wallet_batch_pause).await;
        }
    }

    Ok(())
}
