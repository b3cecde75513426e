//! In-memory doubles and transaction builders shared by the unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use wallet_ledger_domain::model::{
    AccountKey, AppendOutcome, AssetMetadata, CursorSeed, EventKey, EventRecord, EventType,
    Instruction, NewEvent, ParsedInstruction, RawSignatureEntry, RawTransaction, TokenBalance,
    Wallet, WalletId, NATIVE_ASSET_ID, UNKNOWN_VENUE,
};
use wallet_ledger_domain::services::PriceResolver;
use wallet_ledger_domain::storage::{EventLedger, StorageResult, WalletRegistry};

use crate::rpc::{LedgerProvider, SignatureQuery};
use crate::worker::MonitorError;

pub struct TxBuilder {
    tx: RawTransaction,
}

impl TxBuilder {
    pub fn new(signature: &str) -> Self {
        Self {
            tx: RawTransaction {
                signature: signature.to_string(),
                slot: 100,
                block_time: Some(1_700_000_000),
                ..Default::default()
            },
        }
    }

    pub fn slot(mut self, slot: u64) -> Self {
        self.tx.slot = slot;
        self
    }

    pub fn fee(mut self, fee: u64) -> Self {
        self.tx.fee = fee;
        self
    }

    pub fn failed(mut self) -> Self {
        self.tx.err = Some(r#"{"InstructionError":[0,"Custom"]}"#.to_string());
        self
    }

    pub fn signer(self, pubkey: &str, pre: u64, post: u64) -> Self {
        self.key(pubkey, true, pre, post)
    }

    pub fn account(self, pubkey: &str, pre: u64, post: u64) -> Self {
        self.key(pubkey, false, pre, post)
    }

    fn key(mut self, pubkey: &str, signer: bool, pre: u64, post: u64) -> Self {
        self.tx.account_keys.push(AccountKey {
            pubkey: pubkey.to_string(),
            signer,
            writable: true,
        });
        self.tx.pre_balances.push(pre);
        self.tx.post_balances.push(post);
        self
    }

    pub fn instruction(mut self, instruction: Instruction) -> Self {
        self.tx.instructions.push(instruction);
        self
    }

    pub fn inner(mut self, instruction: Instruction) -> Self {
        self.tx.inner_instructions.push(instruction);
        self
    }

    pub fn pre_token(mut self, balance: TokenBalance) -> Self {
        self.tx.pre_token_balances.push(balance);
        self
    }

    pub fn post_token(mut self, balance: TokenBalance) -> Self {
        self.tx.post_token_balances.push(balance);
        self
    }

    pub fn build(self) -> RawTransaction {
        self.tx
    }
}

pub fn token_balance(
    account_index: usize,
    mint: &str,
    owner: &str,
    amount: u128,
    decimals: u8,
) -> TokenBalance {
    TokenBalance {
        account_index,
        mint: mint.to_string(),
        owner: Some(owner.to_string()),
        amount,
        decimals,
    }
}

pub fn program_ix(program_id: &str) -> Instruction {
    Instruction {
        program_id: program_id.to_string(),
        accounts: Vec::new(),
        parsed: None,
    }
}

pub fn parsed_ix(program_id: &str, kind: &str, info: Value) -> Instruction {
    Instruction {
        program_id: program_id.to_string(),
        accounts: Vec::new(),
        parsed: Some(ParsedInstruction {
            kind: kind.to_string(),
            info,
        }),
    }
}

pub fn entry(signature: &str, slot: u64) -> RawSignatureEntry {
    RawSignatureEntry {
        signature: signature.to_string(),
        slot,
        err: None,
    }
}

pub fn failed_entry(signature: &str, slot: u64) -> RawSignatureEntry {
    RawSignatureEntry {
        err: Some("InstructionError".to_string()),
        ..entry(signature, slot)
    }
}

/// Chain double: per-address histories (newest first) and resolvable bodies.
/// Failures can be injected per address, per listing call, or per signature.
#[derive(Default)]
pub struct MockProvider {
    histories: Mutex<HashMap<String, Vec<RawSignatureEntry>>>,
    transactions: Mutex<HashMap<String, RawTransaction>>,
    failing_addresses: Mutex<HashSet<String>>,
    failing_signatures: Mutex<HashSet<String>>,
    failing_list_call: Mutex<Option<usize>>,
    pub queries: Mutex<Vec<SignatureQuery>>,
    pub batches: Mutex<Vec<Vec<String>>>,
    pub list_calls: AtomicUsize,
}

impl MockProvider {
    pub fn set_history(&self, address: &str, newest_first: Vec<RawSignatureEntry>) {
        self.histories
            .lock()
            .unwrap()
            .insert(address.to_string(), newest_first);
    }

    /// Records a new signature at the head of the address history.
    pub fn push_newest(&self, address: &str, entry: RawSignatureEntry) {
        self.histories
            .lock()
            .unwrap()
            .entry(address.to_string())
            .or_default()
            .insert(0, entry);
    }

    pub fn insert_transaction(&self, tx: RawTransaction) {
        self.transactions
            .lock()
            .unwrap()
            .insert(tx.signature.clone(), tx);
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    /// Every listing for `address` fails until [`Self::heal_address`].
    pub fn fail_address(&self, address: &str) {
        self.failing_addresses
            .lock()
            .unwrap()
            .insert(address.to_string());
    }

    pub fn heal_address(&self, address: &str) {
        self.failing_addresses.lock().unwrap().remove(address);
    }

    /// The `call`-th listing (1-based, counted across addresses) fails once.
    pub fn fail_list_call(&self, call: usize) {
        *self.failing_list_call.lock().unwrap() = Some(call);
    }

    pub fn heal_batches(&self) {
        self.failing_signatures.lock().unwrap().clear();
    }

    /// Any batch containing `signature` fails as a whole.
    pub fn fail_batches_with(&self, signature: &str) {
        self.failing_signatures
            .lock()
            .unwrap()
            .insert(signature.to_string());
    }
}

#[async_trait]
impl LedgerProvider for MockProvider {
    async fn list_signatures(
        &self,
        address: &str,
        query: SignatureQuery,
    ) -> Result<Vec<RawSignatureEntry>, MonitorError> {
        let call = self.list_calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.queries.lock().unwrap().push(query.clone());
        if self.failing_addresses.lock().unwrap().contains(address) {
            return Err(MonitorError::Rpc(format!("listing {address} refused")));
        }
        {
            let mut failing = self.failing_list_call.lock().unwrap();
            if *failing == Some(call) {
                *failing = None;
                return Err(MonitorError::Rpc(format!("listing call {call} timed out")));
            }
        }

        let histories = self.histories.lock().unwrap();
        let history = histories.get(address).cloned().unwrap_or_default();
        let start = match &query.before {
            Some(before) => match history.iter().position(|e| &e.signature == before) {
                Some(index) => index + 1,
                None => return Ok(Vec::new()),
            },
            None => 0,
        };

        Ok(history
            .into_iter()
            .skip(start)
            .take_while(|e| query.until.as_deref() != Some(e.signature.as_str()))
            .take(query.limit)
            .collect())
    }

    async fn get_transactions(
        &self,
        signatures: &[String],
    ) -> Result<Vec<Option<RawTransaction>>, MonitorError> {
        self.batches.lock().unwrap().push(signatures.to_vec());
        let failing = self.failing_signatures.lock().unwrap();
        if signatures.iter().any(|signature| failing.contains(signature)) {
            return Err(MonitorError::Rpc("batch rejected".to_string()));
        }
        drop(failing);
        let transactions = self.transactions.lock().unwrap();
        Ok(signatures
            .iter()
            .map(|signature| transactions.get(signature).cloned())
            .collect())
    }
}

/// Ledger double with the same per-key uniqueness as the database.
#[derive(Default)]
pub struct MemoryLedger {
    events: Mutex<Vec<NewEvent>>,
    pub append_calls: AtomicUsize,
    pub key_lookups: AtomicUsize,
}

impl MemoryLedger {
    pub fn events(&self) -> Vec<NewEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn append_calls(&self) -> usize {
        self.append_calls.load(Ordering::SeqCst)
    }

    /// Stores a bare native receive so `signature` counts as recorded.
    pub fn record_signature(&self, wallet: &str, signature: &str, slot: u64) {
        self.events.lock().unwrap().push(NewEvent {
            signature: signature.to_string(),
            wallet_id: WalletId::from(wallet),
            slot,
            event_type: EventType::Receive,
            venue: UNKNOWN_VENUE.to_string(),
            asset_id: NATIVE_ASSET_ID.to_string(),
            asset: AssetMetadata::placeholder(NATIVE_ASSET_ID),
            amount: 1.0,
            usd_value: 0.0,
            counterparty_from: None,
            counterparty_to: None,
            timestamp: Utc::now(),
        });
    }
}

#[async_trait]
impl EventLedger for MemoryLedger {
    async fn exists(&self, wallet_id: &WalletId, signature: &str) -> StorageResult<bool> {
        Ok(self
            .events
            .lock()
            .unwrap()
            .iter()
            .any(|e| &e.wallet_id == wallet_id && e.signature == signature))
    }

    async fn event_exists(&self, key: &EventKey) -> StorageResult<bool> {
        self.key_lookups.fetch_add(1, Ordering::SeqCst);
        Ok(self.events.lock().unwrap().iter().any(|e| &e.key() == key))
    }

    async fn append(&self, event: NewEvent) -> StorageResult<AppendOutcome> {
        self.append_calls.fetch_add(1, Ordering::SeqCst);
        let mut events = self.events.lock().unwrap();
        if events.iter().any(|e| e.key() == event.key()) {
            return Ok(AppendOutcome::SkippedDuplicate);
        }
        events.push(event);
        Ok(AppendOutcome::Written)
    }

    async fn most_recent_signature(&self, wallet_id: &WalletId) -> StorageResult<Option<String>> {
        Ok(self
            .events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| &e.wallet_id == wallet_id)
            .max_by_key(|e| e.slot)
            .map(|e| e.signature.clone()))
    }

    async fn latest_cursors(&self) -> StorageResult<Vec<CursorSeed>> {
        let events = self.events.lock().unwrap();
        let mut newest: HashMap<WalletId, &NewEvent> = HashMap::new();
        for event in events.iter() {
            let current = newest.entry(event.wallet_id.clone()).or_insert(event);
            if event.slot >= current.slot {
                *current = event;
            }
        }
        Ok(newest
            .into_values()
            .map(|event| CursorSeed {
                wallet_id: event.wallet_id.clone(),
                signature: event.signature.clone(),
                slot: event.slot,
            })
            .collect())
    }

    async fn list_events(&self, wallet_id: &WalletId) -> StorageResult<Vec<EventRecord>> {
        let mut events: Vec<NewEvent> = self
            .events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| &e.wallet_id == wallet_id)
            .cloned()
            .collect();
        events.sort_by_key(|e| e.slot);
        Ok(events
            .into_iter()
            .map(|event| EventRecord {
                event,
                recorded_at: Utc::now(),
            })
            .collect())
    }
}

#[derive(Default)]
pub struct MemoryRegistry {
    wallets: Mutex<Vec<Wallet>>,
}

#[async_trait]
impl WalletRegistry for MemoryRegistry {
    async fn list_active(&self) -> StorageResult<Vec<Wallet>> {
        Ok(self.wallets.lock().unwrap().clone())
    }

    async fn add(&self, wallet_id: &WalletId, address: &str) -> StorageResult<()> {
        let mut wallets = self.wallets.lock().unwrap();
        wallets.retain(|w| &w.wallet_id != wallet_id);
        wallets.push(Wallet::new(wallet_id.clone(), address));
        Ok(())
    }

    async fn remove(&self, wallet_id: &WalletId) -> StorageResult<bool> {
        let mut wallets = self.wallets.lock().unwrap();
        let before = wallets.len();
        wallets.retain(|w| &w.wallet_id != wallet_id);
        Ok(wallets.len() != before)
    }
}

/// Fixed price table; unknown assets are unpriced.
#[derive(Default)]
pub struct StaticPrices(pub HashMap<String, f64>);

#[async_trait]
impl PriceResolver for StaticPrices {
    async fn price_of(&self, asset_id: &str) -> f64 {
        self.0.get(asset_id).copied().unwrap_or(0.0)
    }
}
