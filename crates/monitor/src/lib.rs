//! Wallet activity monitor: discovers signatures for every registered wallet,
//! resolves and classifies them into ledger events, and persists each event
//! exactly once. The binary in `main.rs` wires the production adapters; the
//! library surface lets the loop run against any provider and ledger.

pub mod classify;
pub mod cursor;
pub mod extract;
pub mod fetcher;
pub mod gate;
pub mod pipeline;
pub mod pricing;
pub mod resolver;
pub mod rpc;
pub mod sync;
pub mod venue;
pub mod worker;

#[cfg(test)]
mod testing;

pub use cursor::CursorStore;
pub use pipeline::Enrichment;
pub use rpc::{LedgerProvider, RpcLedgerProvider, SignatureQuery};
pub use sync::{SyncReport, SyncSettings, WalletSynchronizer};
pub use venue::{detect, Venue};
pub use worker::{run_monitor, MonitorError, MonitorSettings};
