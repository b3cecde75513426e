//! Monitor binary that tails the configured wallets over Solana JSON-RPC.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{info, warn};
use wallet_ledger_domain::config::MonitorConfig;
use wallet_ledger_domain::services::{
    init_telemetry, InMemoryEventKeyCache, KnownAssetSource, MetadataChain, PriceChain,
    PriceSource, RequestScheduler, StablecoinPriceSource, TelemetryConfig,
};
use wallet_ledger_domain::storage::WalletRegistry;
use wallet_ledger_monitor::pricing::HttpPriceSource;
use wallet_ledger_monitor::{
    run_monitor, CursorStore, Enrichment, MonitorError, MonitorSettings, RpcLedgerProvider,
    SyncSettings, WalletSynchronizer,
};
use wallet_ledger_storage::SeaOrmStorage;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> io::Result<()> {
    if let Err(err) = bootstrap().await {
        eprintln!("[monitor] bootstrap failed: {err}");
        return Err(io::Error::other(err.to_string()));
    }

    Ok(())
}

async fn bootstrap() -> Result<(), MonitorError> {
    let config = MonitorConfig::load_from_env()?;
    let telemetry_config = TelemetryConfig::from_env("MONITOR");
    init_telemetry(&telemetry_config)?;

    let storage = Arc::new(
        SeaOrmStorage::builder()
            .database_url(config.database_url())
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .await?,
    );
    for wallet in config.seed_wallets() {
        storage.add(&wallet.wallet_id, &wallet.address).await?;
    }

    let scheduler = RequestScheduler::new(config.rpc_max_per_second());
    let provider = Arc::new(RpcLedgerProvider::new(config.rpc_url(), scheduler.clone())?);

    let mut price_sources: Vec<Box<dyn PriceSource>> = vec![Box::new(StablecoinPriceSource)];
    if let Some(url) = config.price_api_url() {
        price_sources.push(Box::new(HttpPriceSource::new(url, scheduler.clone())));
    }
    let enrichment = Enrichment::new(
        Arc::new(PriceChain::new(price_sources)),
        Arc::new(MetadataChain::new(vec![Box::new(KnownAssetSource)])),
    );

    let cursors = Arc::new(CursorStore::rehydrate(storage.as_ref()).await?);
    info!(wallets = cursors.len(), "cursors rehydrated");

    let synchronizer = Arc::new(WalletSynchronizer::new(
        provider,
        storage.clone(),
        Arc::new(InMemoryEventKeyCache::default()),
        cursors,
        enrichment,
        SyncSettings::from(&config),
    ));

    let (stop_tx, stop_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("shutdown requested");
                let _ = stop_tx.send(true);
            }
            Err(err) => {
                warn!(%err, "ctrl-c handler unavailable");
                // Keep the sender alive so the monitor keeps running.
                std::future::pending::<()>().await;
            }
        }
    });

    run_monitor(MonitorSettings::from(&config), synchronizer, storage, stop_rx).await
}
