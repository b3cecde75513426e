//! Data structures shared across the storage adapters and the monitor.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};

/// Well-known mint id the ledger reserves for the native coin.
pub const NATIVE_ASSET_ID: &str = "So11111111111111111111111111111111111111112";
/// Native coin precision (lamports per coin = 10^9).
pub const NATIVE_DECIMALS: u8 = 9;
/// System program id, used as the structural counterparty for burns and
/// rent recovery.
pub const SYSTEM_PROGRAM_ID: &str = "11111111111111111111111111111111";
/// Asset id recorded when a closed token account's mint cannot be determined.
pub const UNKNOWN_ASSET_ID: &str = "unknown";
/// Venue recorded for transactions that did not route through a known program.
pub const UNKNOWN_VENUE: &str = "Unknown";

/// Converts a raw integer amount into whole units for the given precision.
pub fn to_ui_amount(raw: i128, decimals: u8) -> f64 {
    raw as f64 / 10f64.powi(i32::from(decimals))
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WalletId(String);

impl WalletId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl From<&str> for WalletId {
    fn from(value: &str) -> Self {
        Self::new(value.to_owned())
    }
}

impl fmt::Display for WalletId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A monitored address as handed out by the wallet registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Wallet {
    pub wallet_id: WalletId,
    pub address: String,
}

impl Wallet {
    pub fn new(wallet_id: impl Into<WalletId>, address: impl Into<String>) -> Self {
        Self {
            wallet_id: wallet_id.into(),
            address: address.into(),
        }
    }
}

impl From<String> for WalletId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Last processed signature for one wallet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cursor {
    pub wallet_id: WalletId,
    pub last_signature: String,
    pub slot: u64,
    pub last_sync_time: DateTime<Utc>,
}

/// Newest persisted signature per wallet, used to rebuild cursors at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CursorSeed {
    pub wallet_id: WalletId,
    pub signature: String,
    pub slot: u64,
}

/// One entry of a wallet's signature history as reported by the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawSignatureEntry {
    pub signature: String,
    pub slot: u64,
    pub err: Option<String>,
}

impl RawSignatureEntry {
    pub fn is_failed(&self) -> bool {
        self.err.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountKey {
    pub pubkey: String,
    pub signer: bool,
    pub writable: bool,
}

/// Program-decoded view of an instruction (`type` + `info` object).
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedInstruction {
    pub kind: String,
    pub info: serde_json::Value,
}

impl ParsedInstruction {
    pub fn info_str(&self, field: &str) -> Option<&str> {
        self.info.get(field).and_then(serde_json::Value::as_str)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    pub program_id: String,
    pub accounts: Vec<String>,
    pub parsed: Option<ParsedInstruction>,
}

/// Token balance of one token account before or after a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenBalance {
    pub account_index: usize,
    pub mint: String,
    pub owner: Option<String>,
    /// Raw amount in the mint's smallest unit.
    pub amount: u128,
    pub decimals: u8,
}

/// Fully resolved transaction body. Absent metadata lists decode as empty.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RawTransaction {
    pub signature: String,
    pub slot: u64,
    pub block_time: Option<i64>,
    pub err: Option<String>,
    pub fee: u64,
    pub account_keys: Vec<AccountKey>,
    pub instructions: Vec<Instruction>,
    /// Inner (CPI) instructions flattened in execution order.
    pub inner_instructions: Vec<Instruction>,
    pub pre_balances: Vec<u64>,
    pub post_balances: Vec<u64>,
    pub pre_token_balances: Vec<TokenBalance>,
    pub post_token_balances: Vec<TokenBalance>,
}

impl RawTransaction {
    pub fn is_failed(&self) -> bool {
        self.err.is_some()
    }

    /// Fee payer: the first signing account key.
    pub fn signer(&self) -> Option<&str> {
        self.account_keys
            .iter()
            .find(|key| key.signer)
            .map(|key| key.pubkey.as_str())
    }

    pub fn account_index(&self, address: &str) -> Option<usize> {
        self.account_keys
            .iter()
            .position(|key| key.pubkey == address)
    }

    pub fn account_key(&self, index: usize) -> Option<&str> {
        self.account_keys.get(index).map(|key| key.pubkey.as_str())
    }

    /// Top-level instructions followed by inner instructions.
    pub fn all_instructions(&self) -> impl Iterator<Item = &Instruction> {
        self.instructions.iter().chain(self.inner_instructions.iter())
    }

    /// Native balance change for the account at `index`, in lamports.
    pub fn native_delta_at(&self, index: usize) -> Option<i128> {
        let pre = self.pre_balances.get(index)?;
        let post = self.post_balances.get(index)?;
        Some(i128::from(*post) - i128::from(*pre))
    }
}

/// Change of one asset's balance for the monitored address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalanceDelta {
    pub asset_id: String,
    pub raw_delta: i128,
    pub decimals: u8,
}

impl BalanceDelta {
    pub fn amount(&self) -> f64 {
        to_ui_amount(self.raw_delta, self.decimals)
    }

    pub fn is_native(&self) -> bool {
        self.asset_id == NATIVE_ASSET_ID
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, AsRefStr, EnumIter,
)]
#[strum(serialize_all = "snake_case")]
pub enum EventType {
    Send,
    Receive,
    Swap,
    Burn,
    Close,
}

/// Display fields for an asset. Resolvers always return a value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetMetadata {
    pub name: String,
    pub symbol: String,
    pub logo: Option<String>,
}

impl AssetMetadata {
    /// Fallback derived from the mint address itself.
    pub fn placeholder(asset_id: &str) -> Self {
        let short: String = asset_id.chars().take(4).collect();
        Self {
            name: format!("Unknown Token ({short})"),
            symbol: short.to_ascii_uppercase(),
            logo: None,
        }
    }
}

/// Uniqueness key of a persisted event.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EventKey {
    pub signature: String,
    pub wallet_id: WalletId,
    pub asset_id: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewEvent {
    pub signature: String,
    pub wallet_id: WalletId,
    pub slot: u64,
    pub event_type: EventType,
    pub venue: String,
    pub asset_id: String,
    pub asset: AssetMetadata,
    /// Signed whole units: negative left the wallet, positive entered it.
    pub amount: f64,
    pub usd_value: f64,
    pub counterparty_from: Option<String>,
    pub counterparty_to: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl NewEvent {
    pub fn key(&self) -> EventKey {
        EventKey {
            signature: self.signature.clone(),
            wallet_id: self.wallet_id.clone(),
            asset_id: self.asset_id.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EventRecord {
    pub event: NewEvent,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    Written,
    SkippedDuplicate,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn ui_amount_scales_by_decimals() {
        assert_eq!(to_ui_amount(-5_000, NATIVE_DECIMALS), -0.000005);
        assert_eq!(to_ui_amount(1_500_000, 6), 1.5);
        assert_eq!(to_ui_amount(42, 0), 42.0);
    }

    #[test]
    fn event_type_round_trips_through_strings() {
        assert_eq!(EventType::Close.to_string(), "close");
        assert_eq!(EventType::from_str("swap").unwrap(), EventType::Swap);
        assert!(EventType::from_str("mint").is_err());
    }

    #[test]
    fn signer_is_first_signing_key() {
        let tx = RawTransaction {
            account_keys: vec![
                AccountKey {
                    pubkey: "payer".into(),
                    signer: true,
                    writable: true,
                },
                AccountKey {
                    pubkey: "other".into(),
                    signer: false,
                    writable: true,
                },
            ],
            pre_balances: vec![10, 0],
            post_balances: vec![4, 5],
            ..Default::default()
        };
        assert_eq!(tx.signer(), Some("payer"));
        assert_eq!(tx.account_index("other"), Some(1));
        assert_eq!(tx.native_delta_at(0), Some(-6));
        assert_eq!(tx.native_delta_at(2), None);
    }

    #[test]
    fn placeholder_metadata_uses_mint_prefix() {
        let meta = AssetMetadata::placeholder("abcdXYZ");
        assert_eq!(meta.symbol, "ABCD");
        assert!(meta.name.contains("abcd"));
        assert!(meta.logo.is_none());
    }
}
