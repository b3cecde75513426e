//! One sync pass for one wallet: discover, resolve, classify, persist, and
//! advance the cursor chunk by chunk in chronological order.
//!
//! Pages are persisted as they arrive and the walk's position is kept as a
//! resume point until it completes, so a provider error deep in a long
//! history costs only the page in flight.

use std::sync::Arc;

use metrics::counter;
use tracing::{debug, info};
use wallet_ledger_domain::config::{MonitorConfig, PagingConfig};
use wallet_ledger_domain::model::{RawSignatureEntry, Wallet};
use wallet_ledger_domain::services::EventKeyCache;
use wallet_ledger_domain::storage::EventLedger;

use crate::cursor::{CursorStore, ResumePoint};
use crate::fetcher::{PagePlan, SignatureFetcher, SyncMode};
use crate::gate::PersistenceGate;
use crate::pipeline::{process_transaction, Enrichment};
use crate::resolver::BatchResolver;
use crate::rpc::LedgerProvider;
use crate::worker::MonitorError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncSettings {
    pub backfill: PagingConfig,
    pub incremental: PagingConfig,
}

impl From<&MonitorConfig> for SyncSettings {
    fn from(config: &MonitorConfig) -> Self {
        Self {
            backfill: config.backfill(),
            incremental: config.incremental(),
        }
    }
}

/// Tally of one sync pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub mode: SyncMode,
    pub signatures: usize,
    pub failed: usize,
    pub already_recorded: usize,
    pub unresolved: usize,
    pub classified: usize,
    pub events_written: usize,
}

impl SyncReport {
    fn new(mode: SyncMode) -> Self {
        Self {
            mode,
            signatures: 0,
            failed: 0,
            already_recorded: 0,
            unresolved: 0,
            classified: 0,
            events_written: 0,
        }
    }
}

pub struct WalletSynchronizer<P: ?Sized, L: ?Sized> {
    fetcher: SignatureFetcher<P>,
    resolver: BatchResolver<P>,
    ledger: Arc<L>,
    gate: PersistenceGate<L>,
    cursors: Arc<CursorStore>,
    enrichment: Enrichment,
    settings: SyncSettings,
}

impl<P, L> WalletSynchronizer<P, L>
where
    P: LedgerProvider + ?Sized,
    L: EventLedger + ?Sized,
{
    pub fn new(
        provider: Arc<P>,
        ledger: Arc<L>,
        cache: Arc<dyn EventKeyCache>,
        cursors: Arc<CursorStore>,
        enrichment: Enrichment,
        settings: SyncSettings,
    ) -> Self {
        Self {
            fetcher: SignatureFetcher::new(provider.clone()),
            resolver: BatchResolver::new(provider),
            gate: PersistenceGate::new(ledger.clone(), cache),
            ledger,
            cursors,
            enrichment,
            settings,
        }
    }

    pub fn cursors(&self) -> &Arc<CursorStore> {
        &self.cursors
    }

    /// An interrupted walk is finished first. Otherwise wallets without a
    /// cursor are backfilled from the start of their history and the rest
    /// only fetch what is newer than the cursor.
    pub fn plan_for(&self, wallet: &Wallet) -> PagePlan {
        if let Some(point) = self.cursors.resume_point(&wallet.wallet_id) {
            let paging = match point.mode {
                SyncMode::Backfill => self.settings.backfill,
                SyncMode::Incremental => self.settings.incremental,
            };
            return PagePlan::resume(paging, point);
        }
        match self.cursors.get(&wallet.wallet_id) {
            Some(cursor) => PagePlan::incremental(self.settings.incremental, cursor.last_signature),
            None => PagePlan::backfill(self.settings.backfill),
        }
    }

    pub async fn sync(&self, wallet: &Wallet) -> Result<SyncReport, MonitorError> {
        let plan = self.plan_for(wallet);
        let outcome = self.run(wallet, &plan).await;
        let label = if outcome.is_ok() { "ok" } else { "error" };
        counter!(
            "monitor_wallet_syncs_total",
            "mode" => plan.mode.as_ref().to_string(),
            "result" => label
        )
        .increment(1);
        outcome
    }

    async fn run(&self, wallet: &Wallet, plan: &PagePlan) -> Result<SyncReport, MonitorError> {
        let mut report = SyncReport::new(plan.mode);
        let mut pager = self.fetcher.pages(wallet, plan);
        // Until the walk completes, a failed pass restarts at the page in flight.
        self.cursors
            .set_resume_point(&wallet.wallet_id, plan.start_point());

        while let Some(page) = pager.next_page(self.ledger.as_ref()).await? {
            report.signatures += page.entries.len();
            for chunk in page.entries.chunks(plan.resolve_chunk) {
                self.process_chunk(wallet, chunk, plan.resolve_chunk, &mut report)
                    .await?;
                // Entries are ascending, so the last one is the newest in the chunk.
                if let Some(newest) = chunk.last() {
                    self.cursors
                        .advance(&wallet.wallet_id, &newest.signature, newest.slot);
                }
            }

            match page.next_before {
                Some(before) => self.cursors.set_resume_point(
                    &wallet.wallet_id,
                    ResumePoint {
                        mode: plan.mode,
                        before: Some(before),
                        until: plan.until.clone(),
                    },
                ),
                None => self.cursors.clear_resume_point(&wallet.wallet_id),
            }
        }

        if report.signatures > 0 {
            info!(
                wallet_id = %wallet.wallet_id,
                mode = %report.mode,
                signatures = report.signatures,
                classified = report.classified,
                written = report.events_written,
                unresolved = report.unresolved,
                failed = report.failed,
                "wallet synced"
            );
        }
        Ok(report)
    }

    async fn process_chunk(
        &self,
        wallet: &Wallet,
        chunk: &[RawSignatureEntry],
        resolve_chunk: usize,
        report: &mut SyncReport,
    ) -> Result<(), MonitorError> {
        let mut pending: Vec<String> = Vec::with_capacity(chunk.len());
        for entry in chunk {
            if entry.is_failed() {
                report.failed += 1;
                counter!("monitor_signatures_total", "result" => "failed").increment(1);
                continue;
            }
            if self.ledger.exists(&wallet.wallet_id, &entry.signature).await? {
                report.already_recorded += 1;
                counter!("monitor_signatures_total", "result" => "known").increment(1);
                continue;
            }
            pending.push(entry.signature.clone());
        }
        if pending.is_empty() {
            return Ok(());
        }

        let mut resolved = self.resolver.resolve(&pending, resolve_chunk).await?;
        for signature in &pending {
            let Some(tx) = resolved.remove(signature).flatten() else {
                report.unresolved += 1;
                counter!("monitor_signatures_total", "result" => "unresolved").increment(1);
                debug!(wallet_id = %wallet.wallet_id, %signature, "dropping unresolved signature");
                continue;
            };
            report.classified += 1;
            counter!("monitor_signatures_total", "result" => "classified").increment(1);
            report.events_written +=
                process_transaction(&self.gate, &self.enrichment, wallet, &tx).await?;
        }
        Ok(())
    }
}
