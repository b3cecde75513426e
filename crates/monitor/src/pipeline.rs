//! Classification and enrichment of one resolved transaction for one wallet.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;
use wallet_ledger_domain::model::{AppendOutcome, NewEvent, RawTransaction, Wallet};
use wallet_ledger_domain::services::{MetadataResolver, PriceResolver};
use wallet_ledger_domain::storage::EventLedger;

use crate::classify::{classify, ClassifiedEvent, ClassifyInput};
use crate::extract::extract_deltas;
use crate::gate::PersistenceGate;
use crate::venue::detect;
use crate::worker::MonitorError;

/// Price and display-field lookups applied to every classified event.
#[derive(Clone)]
pub struct Enrichment {
    prices: Arc<dyn PriceResolver>,
    metadata: Arc<dyn MetadataResolver>,
}

impl Enrichment {
    pub fn new(prices: Arc<dyn PriceResolver>, metadata: Arc<dyn MetadataResolver>) -> Self {
        Self { prices, metadata }
    }

    async fn enrich(
        &self,
        wallet: &Wallet,
        tx: &RawTransaction,
        classified: ClassifiedEvent,
    ) -> NewEvent {
        let price = self.prices.price_of(&classified.asset_id).await;
        let asset = self.metadata.metadata_of(&classified.asset_id).await;
        let usd_value = if price > 0.0 {
            classified.amount.abs() * price
        } else {
            0.0
        };

        NewEvent {
            signature: tx.signature.clone(),
            wallet_id: wallet.wallet_id.clone(),
            slot: tx.slot,
            event_type: classified.event_type,
            venue: classified.venue,
            asset_id: classified.asset_id,
            asset,
            amount: classified.amount,
            usd_value,
            counterparty_from: classified.counterparty_from,
            counterparty_to: classified.counterparty_to,
            timestamp: block_timestamp(tx.block_time),
        }
    }
}

fn block_timestamp(block_time: Option<i64>) -> DateTime<Utc> {
    block_time
        .and_then(|seconds| DateTime::from_timestamp(seconds, 0))
        .unwrap_or_else(Utc::now)
}

/// Classifies `tx` from the wallet's point of view and appends every
/// resulting event through the gate. Returns how many events were written.
pub async fn process_transaction<L>(
    gate: &PersistenceGate<L>,
    enrichment: &Enrichment,
    wallet: &Wallet,
    tx: &RawTransaction,
) -> Result<usize, MonitorError>
where
    L: EventLedger + ?Sized,
{
    let deltas = extract_deltas(tx, &wallet.address);
    let classified = classify(&ClassifyInput {
        tx,
        wallet: &wallet.address,
        deltas: &deltas,
        venue: detect(tx),
    });
    if classified.is_empty() {
        debug!(wallet_id = %wallet.wallet_id, signature = %tx.signature, "no events");
        return Ok(0);
    }

    let mut written = 0;
    for event in classified {
        let event = enrichment.enrich(wallet, tx, event).await;
        if gate.try_append(event).await? == AppendOutcome::Written {
            written += 1;
        }
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MemoryLedger, StaticPrices, TxBuilder};
    use std::collections::HashMap;
    use wallet_ledger_domain::model::{EventType, NATIVE_ASSET_ID};
    use wallet_ledger_domain::services::{InMemoryEventKeyCache, KnownAssetSource, MetadataChain};

    fn enrichment(sol_price: f64) -> Enrichment {
        let prices = HashMap::from([(NATIVE_ASSET_ID.to_string(), sol_price)]);
        Enrichment::new(
            Arc::new(StaticPrices(prices)),
            Arc::new(MetadataChain::new(vec![Box::new(KnownAssetSource)])),
        )
    }

    fn gate(ledger: &Arc<MemoryLedger>) -> PersistenceGate<MemoryLedger> {
        PersistenceGate::new(ledger.clone(), Arc::new(InMemoryEventKeyCache::default()))
    }

    #[tokio::test]
    async fn fee_only_send_is_enriched_and_written() {
        let ledger = Arc::new(MemoryLedger::default());
        let wallet = Wallet::new("w1", "W");
        let tx = TxBuilder::new("SIG1")
            .slot(42)
            .signer("W", 10_000_000_000, 9_999_995_000)
            .fee(5_000)
            .build();

        let written = process_transaction(&gate(&ledger), &enrichment(200.0), &wallet, &tx)
            .await
            .unwrap();
        assert_eq!(written, 1);

        let events = ledger.events();
        let event = &events[0];
        assert_eq!(event.signature, "SIG1");
        assert_eq!(event.slot, 42);
        assert_eq!(event.event_type, EventType::Send);
        assert_eq!(event.amount, -0.000005);
        assert!((event.usd_value - 0.001).abs() < 1e-12);
        assert_eq!(event.asset.symbol, "SOL");
        assert_eq!(event.timestamp.timestamp(), 1_700_000_000);
    }

    #[tokio::test]
    async fn replaying_a_transaction_writes_nothing_new() {
        let ledger = Arc::new(MemoryLedger::default());
        let gate = gate(&ledger);
        let wallet = Wallet::new("w1", "W");
        let tx = TxBuilder::new("SIG1")
            .signer("W", 10_000_000_000, 9_000_000_000)
            .account("R", 0, 1_000_000_000)
            .build();

        assert_eq!(
            process_transaction(&gate, &enrichment(0.0), &wallet, &tx).await.unwrap(),
            1
        );
        assert_eq!(
            process_transaction(&gate, &enrichment(0.0), &wallet, &tx).await.unwrap(),
            0
        );
        assert_eq!(ledger.events().len(), 1);
        assert_eq!(ledger.events()[0].usd_value, 0.0);
    }

    #[tokio::test]
    async fn failed_transaction_writes_nothing() {
        let ledger = Arc::new(MemoryLedger::default());
        let tx = TxBuilder::new("SIG1")
            .signer("W", 10_000, 5_000)
            .failed()
            .build();

        let written = process_transaction(
            &gate(&ledger),
            &enrichment(1.0),
            &Wallet::new("w1", "W"),
            &tx,
        )
        .await
        .unwrap();
        assert_eq!(written, 0);
        assert_eq!(ledger.append_calls(), 0);
    }

    #[test]
    fn missing_block_time_falls_back_to_now() {
        let before = Utc::now();
        assert!(block_timestamp(None) >= before);
        assert_eq!(block_timestamp(Some(60)).timestamp(), 60);
    }
}
