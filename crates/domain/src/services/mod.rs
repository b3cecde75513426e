//! Shared service helpers: persisted-key caching, request scheduling,
//! price/metadata resolution, and telemetry wiring.

pub mod cache;
pub mod pricing;
pub mod scheduler;
pub mod telemetry;

pub use cache::*;
pub use pricing::*;
pub use scheduler::*;
pub use telemetry::*;
