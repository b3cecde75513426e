//! Wire shapes for the Solana JSON-RPC methods the monitor consumes, plus
//! their conversion into domain types. Every list in transaction metadata is
//! optional on the wire; absent lists decode as empty.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use wallet_ledger_domain::model::{
    AccountKey, Instruction, ParsedInstruction, RawSignatureEntry, RawTransaction, TokenBalance,
};

#[derive(Debug, Serialize)]
pub struct JsonRpcRequest<T> {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: &'static str,
    pub params: T,
}

impl<T> JsonRpcRequest<T> {
    pub fn new(id: u64, method: &'static str, params: T) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            method,
            params,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct JsonRpcResponse<T> {
    #[serde(default)]
    pub id: Option<u64>,
    pub result: Option<T>,
    pub error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignaturesRequestConfig {
    pub limit: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub before: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub until: Option<String>,
    pub commitment: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRequestConfig {
    pub encoding: &'static str,
    pub commitment: &'static str,
    pub max_supported_transaction_version: u8,
}

impl Default for TransactionRequestConfig {
    fn default() -> Self {
        Self {
            encoding: "jsonParsed",
            commitment: "confirmed",
            max_supported_transaction_version: 0,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SignatureInfo {
    pub signature: String,
    pub slot: u64,
    #[serde(default)]
    pub err: Option<Value>,
}

impl From<SignatureInfo> for RawSignatureEntry {
    fn from(info: SignatureInfo) -> Self {
        Self {
            signature: info.signature,
            slot: info.slot,
            err: info.err.map(|err| err.to_string()),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncodedTransaction {
    pub slot: u64,
    #[serde(default)]
    pub block_time: Option<i64>,
    #[serde(default)]
    pub meta: Option<TransactionMeta>,
    pub transaction: TransactionBody,
}

#[derive(Debug, Deserialize)]
pub struct TransactionBody {
    #[serde(default)]
    pub signatures: Vec<String>,
    pub message: Message,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    #[serde(default)]
    pub account_keys: Vec<WireAccountKey>,
    #[serde(default)]
    pub instructions: Vec<WireInstruction>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum WireAccountKey {
    Parsed {
        pubkey: String,
        #[serde(default)]
        signer: bool,
        #[serde(default)]
        writable: bool,
    },
    Plain(String),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireInstruction {
    #[serde(default)]
    pub program_id: Option<String>,
    #[serde(default)]
    pub program_id_index: Option<usize>,
    #[serde(default)]
    pub accounts: Vec<Value>,
    #[serde(default)]
    pub parsed: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionMeta {
    #[serde(default)]
    pub err: Option<Value>,
    #[serde(default)]
    pub fee: u64,
    #[serde(default)]
    pub pre_balances: Option<Vec<u64>>,
    #[serde(default)]
    pub post_balances: Option<Vec<u64>>,
    #[serde(default)]
    pub pre_token_balances: Option<Vec<WireTokenBalance>>,
    #[serde(default)]
    pub post_token_balances: Option<Vec<WireTokenBalance>>,
    #[serde(default)]
    pub inner_instructions: Option<Vec<WireInnerInstructions>>,
}

#[derive(Debug, Deserialize)]
pub struct WireInnerInstructions {
    pub index: u32,
    #[serde(default)]
    pub instructions: Vec<WireInstruction>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireTokenBalance {
    pub account_index: usize,
    pub mint: String,
    #[serde(default)]
    pub owner: Option<String>,
    pub ui_token_amount: UiTokenAmount,
}

#[derive(Debug, Deserialize)]
pub struct UiTokenAmount {
    pub amount: String,
    pub decimals: u8,
}

impl EncodedTransaction {
    /// Converts the wire body into the domain representation. `fallback_signature`
    /// is used when the body carries no signature list.
    pub fn into_raw(self, fallback_signature: &str) -> RawTransaction {
        let account_keys: Vec<AccountKey> = self
            .transaction
            .message
            .account_keys
            .into_iter()
            .map(|key| match key {
                WireAccountKey::Parsed {
                    pubkey,
                    signer,
                    writable,
                } => AccountKey {
                    pubkey,
                    signer,
                    writable,
                },
                WireAccountKey::Plain(pubkey) => AccountKey {
                    pubkey,
                    signer: false,
                    writable: false,
                },
            })
            .collect();

        let instructions = self
            .transaction
            .message
            .instructions
            .into_iter()
            .filter_map(|ix| convert_instruction(ix, &account_keys))
            .collect();

        let signature = self
            .transaction
            .signatures
            .into_iter()
            .next()
            .unwrap_or_else(|| fallback_signature.to_string());

        let meta = self.meta.unwrap_or_default();
        let mut inner_groups = meta.inner_instructions.unwrap_or_default();
        inner_groups.sort_by_key(|group| group.index);
        let inner_instructions = inner_groups
            .into_iter()
            .flat_map(|group| group.instructions)
            .filter_map(|ix| convert_instruction(ix, &account_keys))
            .collect();

        RawTransaction {
            signature,
            slot: self.slot,
            block_time: self.block_time,
            err: meta.err.filter(|err| !err.is_null()).map(|err| err.to_string()),
            fee: meta.fee,
            account_keys,
            instructions,
            inner_instructions,
            pre_balances: meta.pre_balances.unwrap_or_default(),
            post_balances: meta.post_balances.unwrap_or_default(),
            pre_token_balances: convert_token_balances(meta.pre_token_balances),
            post_token_balances: convert_token_balances(meta.post_token_balances),
        }
    }
}

fn convert_instruction(ix: WireInstruction, account_keys: &[AccountKey]) -> Option<Instruction> {
    let program_id = ix.program_id.or_else(|| {
        ix.program_id_index
            .and_then(|index| account_keys.get(index))
            .map(|key| key.pubkey.clone())
    })?;

    let accounts = ix
        .accounts
        .into_iter()
        .filter_map(|account| match account {
            Value::String(pubkey) => Some(pubkey),
            Value::Number(index) => index
                .as_u64()
                .and_then(|index| account_keys.get(index as usize))
                .map(|key| key.pubkey.clone()),
            _ => None,
        })
        .collect();

    // Programs without a JSON parser report `parsed` as a plain string.
    let parsed = ix.parsed.and_then(|parsed| {
        let kind = parsed.get("type")?.as_str()?.to_string();
        let info = parsed.get("info").cloned().unwrap_or(Value::Null);
        Some(ParsedInstruction { kind, info })
    });

    Some(Instruction {
        program_id,
        accounts,
        parsed,
    })
}

fn convert_token_balances(balances: Option<Vec<WireTokenBalance>>) -> Vec<TokenBalance> {
    balances
        .unwrap_or_default()
        .into_iter()
        .filter_map(|balance| {
            let amount = balance.ui_token_amount.amount.parse().ok()?;
            Some(TokenBalance {
                account_index: balance.account_index,
                mint: balance.mint,
                owner: balance.owner,
                amount,
                decimals: balance.ui_token_amount.decimals,
            })
        })
        .collect()
}
