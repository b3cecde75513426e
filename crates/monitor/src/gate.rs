use std::sync::Arc;

use metrics::counter;
use tracing::debug;
use wallet_ledger_domain::model::{AppendOutcome, NewEvent};
use wallet_ledger_domain::services::EventKeyCache;
use wallet_ledger_domain::storage::EventLedger;

use crate::worker::MonitorError;

/// Single write path into the ledger: an event is appended at most once per
/// (signature, wallet, asset) key, however often its transaction is replayed.
pub struct PersistenceGate<L: ?Sized> {
    ledger: Arc<L>,
    cache: Arc<dyn EventKeyCache>,
}

impl<L> PersistenceGate<L>
where
    L: EventLedger + ?Sized,
{
    pub fn new(ledger: Arc<L>, cache: Arc<dyn EventKeyCache>) -> Self {
        Self { ledger, cache }
    }

    pub async fn try_append(&self, event: NewEvent) -> Result<AppendOutcome, MonitorError> {
        let key = event.key();
        if self.cache.known_persisted(&key) || self.ledger.event_exists(&key).await? {
            self.cache.mark_persisted(&key);
            counter!("monitor_events_total", "result" => "duplicate").increment(1);
            debug!(signature = %key.signature, asset_id = %key.asset_id, "event already recorded");
            return Ok(AppendOutcome::SkippedDuplicate);
        }

        let outcome = self.ledger.append(event).await?;
        self.cache.mark_persisted(&key);
        let label = match outcome {
            AppendOutcome::Written => "written",
            AppendOutcome::SkippedDuplicate => "duplicate",
        };
        counter!("monitor_events_total", "result" => label).increment(1);
        Ok(outcome)
    }
}
