use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use metrics::counter;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::worker::MonitorError;
use wallet_ledger_domain::model::{RawSignatureEntry, RawTransaction};
use wallet_ledger_domain::services::RequestScheduler;

mod types;

pub use types::{
    EncodedTransaction, JsonRpcError, JsonRpcRequest, JsonRpcResponse, SignatureInfo,
    SignaturesRequestConfig, TransactionRequestConfig,
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Paging window for one `getSignaturesForAddress` call.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SignatureQuery {
    pub limit: usize,
    /// Exclusive upper pointer: only signatures older than this one.
    pub before: Option<String>,
    /// Exclusive lower pointer: stop once this signature is reached.
    pub until: Option<String>,
}

/// Read access to the chain. Signature lists come back newest-first.
#[async_trait]
pub trait LedgerProvider: Send + Sync {
    async fn list_signatures(
        &self,
        address: &str,
        query: SignatureQuery,
    ) -> Result<Vec<RawSignatureEntry>, MonitorError>;

    /// Resolves every signature in one round trip. The output has one slot
    /// per input signature, in the same order; entries the provider could not
    /// resolve are `None`.
    async fn get_transactions(
        &self,
        signatures: &[String],
    ) -> Result<Vec<Option<RawTransaction>>, MonitorError>;
}

/// JSON-RPC provider whose every request goes through the shared scheduler.
pub struct RpcLedgerProvider {
    client: reqwest::Client,
    url: String,
    scheduler: RequestScheduler,
    next_id: AtomicU64,
}

impl RpcLedgerProvider {
    pub fn new(url: impl Into<String>, scheduler: RequestScheduler) -> Result<Self, MonitorError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            url: url.into(),
            scheduler,
            next_id: AtomicU64::new(1),
        })
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    async fn post<R>(&self, method: &'static str, body: Value) -> Result<R, MonitorError>
    where
        R: DeserializeOwned + Send + 'static,
    {
        let client = self.client.clone();
        let url = self.url.clone();
        let outcome = self
            .scheduler
            .enqueue(move || async move {
                let response = client
                    .post(url)
                    .json(&body)
                    .send()
                    .await?
                    .error_for_status()?;
                response.json::<R>().await
            })
            .await?;

        match outcome {
            Ok(parsed) => {
                counter!("monitor_rpc_calls_total", "method" => method, "result" => "ok")
                    .increment(1);
                Ok(parsed)
            }
            Err(err) => {
                counter!("monitor_rpc_calls_total", "method" => method, "result" => "error")
                    .increment(1);
                Err(err.into())
            }
        }
    }
}

#[async_trait]
impl LedgerProvider for RpcLedgerProvider {
    async fn list_signatures(
        &self,
        address: &str,
        query: SignatureQuery,
    ) -> Result<Vec<RawSignatureEntry>, MonitorError> {
        let config = SignaturesRequestConfig {
            limit: query.limit,
            before: query.before,
            until: query.until,
            commitment: "confirmed",
        };
        let request = JsonRpcRequest::new(
            self.next_id(),
            "getSignaturesForAddress",
            json!([address, config]),
        );
        let body = serde_json::to_value(request)?;
        let response: JsonRpcResponse<Vec<SignatureInfo>> =
            self.post("getSignaturesForAddress", body).await?;

        if let Some(error) = response.error {
            return Err(MonitorError::Rpc(format!(
                "getSignaturesForAddress failed ({}): {}",
                error.code, error.message
            )));
        }

        let entries: Vec<RawSignatureEntry> = response
            .result
            .unwrap_or_default()
            .into_iter()
            .map(RawSignatureEntry::from)
            .collect();
        debug!(address, count = entries.len(), "listed signatures");
        Ok(entries)
    }

    async fn get_transactions(
        &self,
        signatures: &[String],
    ) -> Result<Vec<Option<RawTransaction>>, MonitorError> {
        if signatures.is_empty() {
            return Ok(Vec::new());
        }

        let config = TransactionRequestConfig::default();
        let mut slots = HashMap::with_capacity(signatures.len());
        let mut batch = Vec::with_capacity(signatures.len());
        for (position, signature) in signatures.iter().enumerate() {
            let id = self.next_id();
            slots.insert(id, position);
            batch.push(JsonRpcRequest::new(
                id,
                "getTransaction",
                json!([signature, &config]),
            ));
        }

        let body = serde_json::to_value(batch)?;
        let responses: Vec<JsonRpcResponse<Value>> = self.post("getTransaction", body).await?;

        let mut resolved: Vec<Option<RawTransaction>> = vec![None; signatures.len()];
        for response in responses {
            let Some(position) = response.id.and_then(|id| slots.get(&id).copied()) else {
                warn!(id = ?response.id, "batch response with unknown id");
                continue;
            };
            let signature = &signatures[position];
            if let Some(error) = response.error {
                warn!(%signature, code = error.code, message = %error.message, "transaction lookup failed");
                continue;
            }
            let Some(result) = response.result.filter(|value| !value.is_null()) else {
                debug!(%signature, "transaction not available");
                continue;
            };
            match serde_json::from_value::<EncodedTransaction>(result) {
                Ok(encoded) => resolved[position] = Some(encoded.into_raw(signature)),
                Err(err) => warn!(%signature, %err, "undecodable transaction body"),
            }
        }

        Ok(resolved)
    }
}
