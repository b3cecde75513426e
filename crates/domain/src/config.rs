//! Environment-driven configuration for the monitor binary.

use std::env;
use std::time::Duration;

use thiserror::Error;

use crate::model::{Wallet, WalletId};

const DEFAULT_POLL_INTERVAL_MS: u64 = 2_000;
const DEFAULT_ERROR_BACKOFF_MS: u64 = 30_000;
const DEFAULT_WALLET_BATCH_SIZE: u64 = 5;
const DEFAULT_WALLET_BATCH_PAUSE_MS: u64 = 500;
const DEFAULT_RPC_MAX_PER_SECOND: u64 = 10;
/// Largest page `getSignaturesForAddress` accepts.
pub const MAX_SIGNATURE_PAGE: usize = 1_000;
const DEFAULT_INCREMENTAL_PAGE_SIZE: u64 = 20;
const DEFAULT_BACKFILL_RESOLVE_CHUNK: u64 = 100;
const DEFAULT_INCREMENTAL_RESOLVE_CHUNK: u64 = 10;

/// Paging and batching knobs for one sync mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PagingConfig {
    pub page_size: usize,
    pub resolve_chunk: usize,
}

/// Key configuration derived from `.env`/process variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorConfig {
    database_url: String,
    rpc_url: String,
    price_api_url: Option<String>,
    poll_interval: Duration,
    error_backoff: Duration,
    wallet_batch_size: usize,
    wallet_batch_pause: Duration,
    rpc_max_per_second: u32,
    backfill: PagingConfig,
    incremental: PagingConfig,
    seed_wallets: Vec<Wallet>,
}

impl MonitorConfig {
    /// Loads configuration by hydrating `.env` (if present) and reading the
    /// process variables. Only the database and RPC endpoints are required;
    /// missing or malformed entries surface as `ConfigError`.
    pub fn load_from_env() -> Result<Self, ConfigError> {
        hydrate_env_file()?;

        let database_url = get_required_var("DATABASE_URL")?;
        let rpc_url = get_required_var("SOLANA_RPC_URL")?;
        let backfill_page =
            get_number_or("BACKFILL_PAGE_SIZE", MAX_SIGNATURE_PAGE as u64)? as usize;

        Ok(Self {
            database_url,
            rpc_url,
            price_api_url: get_optional_var("PRICE_API_URL"),
            poll_interval: Duration::from_millis(get_number_or(
                "MONITOR_POLL_INTERVAL_MS",
                DEFAULT_POLL_INTERVAL_MS,
            )?),
            error_backoff: Duration::from_millis(get_number_or(
                "MONITOR_ERROR_BACKOFF_MS",
                DEFAULT_ERROR_BACKOFF_MS,
            )?),
            wallet_batch_size: get_number_or("MONITOR_WALLET_BATCH_SIZE", DEFAULT_WALLET_BATCH_SIZE)?
                .max(1) as usize,
            wallet_batch_pause: Duration::from_millis(get_number_or(
                "MONITOR_WALLET_BATCH_PAUSE_MS",
                DEFAULT_WALLET_BATCH_PAUSE_MS,
            )?),
            rpc_max_per_second: get_number_or("RPC_MAX_PER_SECOND", DEFAULT_RPC_MAX_PER_SECOND)?
                .clamp(1, u64::from(u32::MAX)) as u32,
            backfill: PagingConfig {
                page_size: backfill_page.clamp(1, MAX_SIGNATURE_PAGE),
                resolve_chunk: get_number_or("BACKFILL_RESOLVE_CHUNK", DEFAULT_BACKFILL_RESOLVE_CHUNK)?
                    .max(1) as usize,
            },
            incremental: PagingConfig {
                page_size: (get_number_or("INCREMENTAL_PAGE_SIZE", DEFAULT_INCREMENTAL_PAGE_SIZE)?
                    as usize)
                    .clamp(1, MAX_SIGNATURE_PAGE),
                resolve_chunk: get_number_or(
                    "INCREMENTAL_RESOLVE_CHUNK",
                    DEFAULT_INCREMENTAL_RESOLVE_CHUNK,
                )?
                .max(1) as usize,
            },
            seed_wallets: parse_wallet_list(get_optional_var("MONITOR_WALLETS").as_deref())?,
        })
    }

    pub fn database_url(&self) -> &str {
        &self.database_url
    }

    pub fn rpc_url(&self) -> &str {
        &self.rpc_url
    }

    pub fn price_api_url(&self) -> Option<&str> {
        self.price_api_url.as_deref()
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn error_backoff(&self) -> Duration {
        self.error_backoff
    }

    pub fn wallet_batch_size(&self) -> usize {
        self.wallet_batch_size
    }

    pub fn wallet_batch_pause(&self) -> Duration {
        self.wallet_batch_pause
    }

    pub fn rpc_max_per_second(&self) -> u32 {
        self.rpc_max_per_second
    }

    pub fn backfill(&self) -> PagingConfig {
        self.backfill
    }

    pub fn incremental(&self) -> PagingConfig {
        self.incremental
    }

    pub fn seed_wallets(&self) -> &[Wallet] {
        &self.seed_wallets
    }
}

/// Parses `id=address,id2=address2`.
fn parse_wallet_list(raw: Option<&str>) -> Result<Vec<Wallet>, ConfigError> {
    let Some(raw) = raw else {
        return Ok(Vec::new());
    };

    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let (id, address) = entry
                .split_once('=')
                .ok_or_else(|| ConfigError::InvalidWallet(entry.to_string()))?;
            let (id, address) = (id.trim(), address.trim());
            if id.is_empty() || address.is_empty() {
                return Err(ConfigError::InvalidWallet(entry.to_string()));
            }
            Ok(Wallet::new(WalletId::from(id), address))
        })
        .collect()
}

fn get_required_var(key: &'static str) -> Result<String, ConfigError> {
    get_optional_var(key).ok_or(ConfigError::MissingVar { key })
}

fn get_optional_var(key: &'static str) -> Option<String> {
    env::var(key).ok().and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn get_number_or(key: &'static str, default: u64) -> Result<u64, ConfigError> {
    match get_optional_var(key) {
        Some(value) => value
            .parse()
            .map_err(|source| ConfigError::InvalidNumber { key, source }),
        None => Ok(default),
    }
}

pub fn hydrate_env_file() -> Result<(), ConfigError> {
    if env::var_os("WALLET_LEDGER_SKIP_DOTENV").is_some() {
        return Ok(());
    }
    match dotenvy::dotenv() {
        Ok(_) => {}
        Err(dotenvy::Error::Io(err)) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => return Err(ConfigError::Dotenv { source: err }),
    }

    Ok(())
}

/// Errors emitted when `.env` hydration or environment parsing fails.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable `{key}`")]
    MissingVar { key: &'static str },
    #[error("invalid integer in `{key}`: {source}")]
    InvalidNumber {
        key: &'static str,
        #[source]
        source: std::num::ParseIntError,
    },
    #[error("invalid wallet entry `{0}`, expected `id=address`")]
    InvalidWallet(String),
    #[error("failed to load .env file: {source}")]
    Dotenv {
        #[from]
        source: dotenvy::Error,
    },
}
