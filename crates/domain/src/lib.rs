//! Domain-level building blocks shared by the storage adapters and the
//! monitor: the wallet event model, storage contracts, environment
//! configuration, and process-wide services (telemetry, request scheduling,
//! price/metadata resolution).

pub mod config;
pub mod model;
pub mod services;
pub mod storage;

pub use model::*;
pub use storage::*;
