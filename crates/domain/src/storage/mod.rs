//! Storage contracts implemented by the persistence adapters.

use async_trait::async_trait;
use thiserror::Error;

use crate::model::{
    AppendOutcome, CursorSeed, EventKey, EventRecord, NewEvent, Wallet, WalletId,
};

/// Common result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(String),
    #[error("corrupt row: {0}")]
    Corrupt(String),
}

impl StorageError {
    pub fn from_source(err: impl std::fmt::Display) -> Self {
        Self::Database(err.to_string())
    }
}

/// Append-only ledger of classified wallet events.
#[async_trait]
pub trait EventLedger: Send + Sync {
    /// Whether any event was already recorded for this wallet and signature.
    async fn exists(&self, wallet_id: &WalletId, signature: &str) -> StorageResult<bool>;
    /// Whether the exact event key was already recorded.
    async fn event_exists(&self, key: &EventKey) -> StorageResult<bool>;
    /// Inserts the event unless its key is taken; never updates existing rows.
    async fn append(&self, event: NewEvent) -> StorageResult<AppendOutcome>;
    async fn most_recent_signature(&self, wallet_id: &WalletId) -> StorageResult<Option<String>>;
    /// Newest recorded signature for every wallet that has events.
    async fn latest_cursors(&self) -> StorageResult<Vec<CursorSeed>>;
    /// Events of one wallet in chronological order.
    async fn list_events(&self, wallet_id: &WalletId) -> StorageResult<Vec<EventRecord>>;
}

/// Registry of monitored addresses, editable while the monitor runs.
#[async_trait]
pub trait WalletRegistry: Send + Sync {
    async fn list_active(&self) -> StorageResult<Vec<Wallet>>;
    async fn add(&self, wallet_id: &WalletId, address: &str) -> StorageResult<()>;
    async fn remove(&self, wallet_id: &WalletId) -> StorageResult<bool>;
}
