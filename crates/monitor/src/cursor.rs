//! In-memory sync position per wallet, rebuilt from the ledger at startup.
//!
//! Alongside the cursor each wallet may carry a resume point: the place an
//! interrupted signature walk continues from on the next pass. Resume points
//! are not persisted; after a restart the cursor alone decides the mode.

use std::collections::{HashMap, HashSet};
use std::sync::{PoisonError, RwLock};

use chrono::Utc;
use tracing::debug;
use wallet_ledger_domain::model::{Cursor, WalletId};
use wallet_ledger_domain::storage::{EventLedger, StorageResult};

use crate::fetcher::SyncMode;

/// Where an interrupted walk continues.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResumePoint {
    pub mode: SyncMode,
    /// Upper bound of the first page still to process; `None` is the head.
    pub before: Option<String>,
    /// Lower bound of the interrupted walk.
    pub until: Option<String>,
}

#[derive(Debug, Default)]
pub struct CursorStore {
    cursors: RwLock<HashMap<WalletId, Cursor>>,
    resume_points: RwLock<HashMap<WalletId, ResumePoint>>,
}

impl CursorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds one cursor per wallet from its newest recorded event.
    pub async fn rehydrate<L>(ledger: &L) -> StorageResult<Self>
    where
        L: EventLedger + ?Sized,
    {
        let store = Self::new();
        let seeds = ledger.latest_cursors().await?;
        debug!(count = seeds.len(), "rehydrating cursors");
        for seed in seeds {
            store.advance(&seed.wallet_id, &seed.signature, seed.slot);
        }
        Ok(store)
    }

    pub fn get(&self, wallet_id: &WalletId) -> Option<Cursor> {
        self.cursors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(wallet_id)
            .cloned()
    }

    /// Moves the cursor to `signature` unless that would go back to an older
    /// slot. Returns whether the cursor changed.
    pub fn advance(&self, wallet_id: &WalletId, signature: &str, slot: u64) -> bool {
        let mut cursors = self.cursors.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(current) = cursors.get(wallet_id) {
            if slot < current.slot || current.last_signature == signature {
                return false;
            }
        }
        cursors.insert(
            wallet_id.clone(),
            Cursor {
                wallet_id: wallet_id.clone(),
                last_signature: signature.to_string(),
                slot,
                last_sync_time: Utc::now(),
            },
        );
        true
    }

    pub fn resume_point(&self, wallet_id: &WalletId) -> Option<ResumePoint> {
        self.resume_points
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(wallet_id)
            .cloned()
    }

    pub fn set_resume_point(&self, wallet_id: &WalletId, point: ResumePoint) {
        self.resume_points
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(wallet_id.clone(), point);
    }

    pub fn clear_resume_point(&self, wallet_id: &WalletId) {
        self.resume_points
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(wallet_id);
    }

    /// Drops cursors and resume points of wallets that are no longer
    /// monitored and returns how many cursors were removed.
    pub fn retain(&self, active: &HashSet<WalletId>) -> usize {
        self.resume_points
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|wallet_id, _| active.contains(wallet_id));
        let mut cursors = self.cursors.write().unwrap_or_else(PoisonError::into_inner);
        let before = cursors.len();
        cursors.retain(|wallet_id, _| active.contains(wallet_id));
        before - cursors.len()
    }

    pub fn len(&self) -> usize {
        self.cursors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryLedger;
    use chrono::Utc;
    use wallet_ledger_domain::model::{
        AssetMetadata, EventType, NewEvent, NATIVE_ASSET_ID, UNKNOWN_VENUE,
    };

    fn event(wallet: &str, signature: &str, slot: u64) -> NewEvent {
        NewEvent {
            signature: signature.into(),
            wallet_id: WalletId::from(wallet),
            slot,
            event_type: EventType::Receive,
            venue: UNKNOWN_VENUE.into(),
            asset_id: NATIVE_ASSET_ID.into(),
            asset: AssetMetadata::placeholder(NATIVE_ASSET_ID),
            amount: 1.0,
            usd_value: 0.0,
            counterparty_from: None,
            counterparty_to: None,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn never_regresses_to_older_slot() {
        let store = CursorStore::new();
        let wallet = WalletId::from("w1");

        assert!(store.advance(&wallet, "s10", 10));
        assert!(store.advance(&wallet, "s12", 12));
        assert!(!store.advance(&wallet, "s11", 11));
        assert!(!store.advance(&wallet, "s12", 12));
        assert!(store.advance(&wallet, "s12b", 12));

        let cursor = store.get(&wallet).unwrap();
        assert_eq!(cursor.last_signature, "s12b");
        assert_eq!(cursor.slot, 12);
    }

    #[test]
    fn retain_prunes_removed_wallets() {
        let store = CursorStore::new();
        store.advance(&WalletId::from("w1"), "a", 1);
        store.advance(&WalletId::from("w2"), "b", 1);
        store.set_resume_point(
            &WalletId::from("w1"),
            ResumePoint {
                mode: SyncMode::Backfill,
                before: Some("a".into()),
                until: None,
            },
        );

        let active: HashSet<WalletId> = [WalletId::from("w2")].into_iter().collect();
        assert_eq!(store.retain(&active), 1);
        assert!(store.get(&WalletId::from("w1")).is_none());
        assert!(store.resume_point(&WalletId::from("w1")).is_none());
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn rehydrates_newest_signature_per_wallet() {
        let ledger = MemoryLedger::default();
        ledger.append(event("w1", "old", 5)).await.unwrap();
        ledger.append(event("w1", "new", 9)).await.unwrap();
        ledger.append(event("w2", "only", 3)).await.unwrap();

        let store = CursorStore::rehydrate(&ledger).await.unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.get(&WalletId::from("w1")).unwrap().last_signature, "new");
        assert_eq!(store.get(&WalletId::from("w2")).unwrap().slot, 3);
    }
}
