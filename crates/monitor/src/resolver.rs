use std::collections::HashMap;
use std::sync::Arc;

use metrics::histogram;
use tracing::debug;
use wallet_ledger_domain::model::RawTransaction;

use crate::rpc::LedgerProvider;
use crate::worker::MonitorError;

/// Resolves signatures into transaction bodies, one provider round trip per
/// chunk. Signatures the provider could not resolve map to `None`; they never
/// fail the rest of the chunk.
pub struct BatchResolver<P: ?Sized> {
    provider: Arc<P>,
}

impl<P> BatchResolver<P>
where
    P: LedgerProvider + ?Sized,
{
    pub fn new(provider: Arc<P>) -> Self {
        Self { provider }
    }

    pub async fn resolve(
        &self,
        signatures: &[String],
        chunk_size: usize,
    ) -> Result<HashMap<String, Option<RawTransaction>>, MonitorError> {
        let mut resolved = HashMap::with_capacity(signatures.len());
        for chunk in signatures.chunks(chunk_size.max(1)) {
            histogram!("monitor_batch_entries").record(chunk.len() as f64);
            let mut bodies = self.provider.get_transactions(chunk).await?.into_iter();
            for signature in chunk {
                // A short response leaves the remaining signatures unresolved.
                let body = bodies.next().flatten();
                if body.is_none() {
                    debug!(%signature, "signature unresolved");
                }
                resolved.insert(signature.clone(), body);
            }
        }
        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockProvider, TxBuilder};

    #[tokio::test]
    async fn partial_failures_map_to_none() {
        let provider = Arc::new(MockProvider::default());
        for signature in ["a", "c", "e"] {
            provider.insert_transaction(TxBuilder::new(signature).build());
        }
        let resolver = BatchResolver::new(provider.clone());
        let signatures: Vec<String> = ["a", "b", "c", "d", "e"].map(String::from).to_vec();

        let resolved = resolver.resolve(&signatures, 10).await.unwrap();

        assert_eq!(resolved.len(), 5);
        assert_eq!(resolved.values().filter(|body| body.is_some()).count(), 3);
        assert!(resolved["b"].is_none());
        assert_eq!(resolved["e"].as_ref().unwrap().signature, "e");
        assert_eq!(provider.batches.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn splits_into_chunks() {
        let provider = Arc::new(MockProvider::default());
        let resolver = BatchResolver::new(provider.clone());
        let signatures: Vec<String> = (0..7).map(|i| format!("s{i}")).collect();

        resolver.resolve(&signatures, 3).await.unwrap();

        let sizes: Vec<usize> = provider
            .batches
            .lock()
            .unwrap()
            .iter()
            .map(Vec::len)
            .collect();
        assert_eq!(sizes, vec![3, 3, 1]);
    }
}
