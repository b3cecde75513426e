//! Price and metadata resolution contracts.
//!
//! Both resolvers are expressed as ordered chains of sources tried in a fixed
//! sequence; the first source that produces a value wins. Resolvers never
//! fail: an unavailable price is `0.0` and unavailable metadata falls back to
//! a placeholder derived from the asset id.

use std::time::Duration;

use async_trait::async_trait;
use moka::sync::Cache;
use thiserror::Error;
use tracing::{debug, warn};

use crate::model::{AssetMetadata, NATIVE_ASSET_ID};

pub const USDC_MINT: &str = "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v";
pub const USDT_MINT: &str = "Es9vMFrzaCERmJfrF4H2FYD4KCoNkY11McCe8BenwNYB";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PricingError {
    #[error("price source request failed: {0}")]
    Request(String),
    #[error("price source returned malformed data: {0}")]
    Malformed(String),
}

/// USD price lookup. `0.0` means "unavailable".
#[async_trait]
pub trait PriceResolver: Send + Sync {
    async fn price_of(&self, asset_id: &str) -> f64;
}

/// Display-field lookup that always yields a value.
#[async_trait]
pub trait MetadataResolver: Send + Sync {
    async fn metadata_of(&self, asset_id: &str) -> AssetMetadata;
}

/// One strategy inside a [`PriceChain`].
#[async_trait]
pub trait PriceSource: Send + Sync {
    fn name(&self) -> &'static str;
    async fn fetch_price(&self, asset_id: &str) -> Result<Option<f64>, PricingError>;
}

/// One strategy inside a [`MetadataChain`].
#[async_trait]
pub trait MetadataSource: Send + Sync {
    fn name(&self) -> &'static str;
    async fn fetch_metadata(&self, asset_id: &str)
        -> Result<Option<AssetMetadata>, PricingError>;
}

pub struct PriceChain {
    sources: Vec<Box<dyn PriceSource>>,
    cache: Cache<String, f64>,
}

impl PriceChain {
    pub const DEFAULT_TTL: Duration = Duration::from_secs(60);

    pub fn new(sources: Vec<Box<dyn PriceSource>>) -> Self {
        Self::with_ttl(sources, Self::DEFAULT_TTL)
    }

    pub fn with_ttl(sources: Vec<Box<dyn PriceSource>>, ttl: Duration) -> Self {
        Self {
            sources,
            cache: Cache::builder().time_to_live(ttl).max_capacity(10_000).build(),
        }
    }
}

#[async_trait]
impl PriceResolver for PriceChain {
    async fn price_of(&self, asset_id: &str) -> f64 {
        if let Some(price) = self.cache.get(asset_id) {
            return price;
        }

        for source in &self.sources {
            match source.fetch_price(asset_id).await {
                Ok(Some(price)) if price.is_finite() && price > 0.0 => {
                    self.cache.insert(asset_id.to_string(), price);
                    return price;
                }
                Ok(_) => {}
                Err(err) => warn!(source = source.name(), asset_id, %err, "price source failed"),
            }
        }

        debug!(asset_id, "no price available");
        0.0
    }
}

pub struct MetadataChain {
    sources: Vec<Box<dyn MetadataSource>>,
    cache: Cache<String, AssetMetadata>,
}

impl MetadataChain {
    pub const DEFAULT_TTL: Duration = Duration::from_secs(3_600);

    pub fn new(sources: Vec<Box<dyn MetadataSource>>) -> Self {
        Self {
            sources,
            cache: Cache::builder()
                .time_to_live(Self::DEFAULT_TTL)
                .max_capacity(10_000)
                .build(),
        }
    }
}

#[async_trait]
impl MetadataResolver for MetadataChain {
    async fn metadata_of(&self, asset_id: &str) -> AssetMetadata {
        if let Some(found) = self.cache.get(asset_id) {
            return found;
        }

        for source in &self.sources {
            match source.fetch_metadata(asset_id).await {
                Ok(Some(found)) => {
                    self.cache.insert(asset_id.to_string(), found.clone());
                    return found;
                }
                Ok(None) => {}
                Err(err) => {
                    warn!(source = source.name(), asset_id, %err, "metadata source failed")
                }
            }
        }

        AssetMetadata::placeholder(asset_id)
    }
}

/// Pegged stablecoins priced at one dollar.
#[derive(Debug, Default, Clone, Copy)]
pub struct StablecoinPriceSource;

#[async_trait]
impl PriceSource for StablecoinPriceSource {
    fn name(&self) -> &'static str {
        "stablecoin"
    }

    async fn fetch_price(&self, asset_id: &str) -> Result<Option<f64>, PricingError> {
        Ok(matches!(asset_id, USDC_MINT | USDT_MINT).then_some(1.0))
    }
}

/// Static table for assets whose metadata never changes.
#[derive(Debug, Default, Clone, Copy)]
pub struct KnownAssetSource;

#[async_trait]
impl MetadataSource for KnownAssetSource {
    fn name(&self) -> &'static str {
        "known_assets"
    }

    async fn fetch_metadata(
        &self,
        asset_id: &str,
    ) -> Result<Option<AssetMetadata>, PricingError> {
        let (name, symbol) = match asset_id {
            NATIVE_ASSET_ID => ("Solana", "SOL"),
            USDC_MINT => ("USD Coin", "USDC"),
            USDT_MINT => ("Tether USD", "USDT"),
            _ => return Ok(None),
        };
        Ok(Some(AssetMetadata {
            name: name.to_string(),
            symbol: symbol.to_string(),
            logo: None,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct FailingSource;

    #[async_trait]
    impl PriceSource for FailingSource {
        fn name(&self) -> &'static str {
            "failing"
        }

        async fn fetch_price(&self, _asset_id: &str) -> Result<Option<f64>, PricingError> {
            Err(PricingError::Request("offline".into()))
        }
    }

    struct CountingSource {
        calls: Arc<AtomicUsize>,
        price: f64,
    }

    #[async_trait]
    impl PriceSource for CountingSource {
        fn name(&self) -> &'static str {
            "counting"
        }

        async fn fetch_price(&self, _asset_id: &str) -> Result<Option<f64>, PricingError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Some(self.price))
        }
    }

    #[tokio::test]
    async fn chain_falls_through_failures_and_caches() {
        let calls = Arc::new(AtomicUsize::new(0));
        let chain = PriceChain::new(vec![
            Box::new(FailingSource),
            Box::new(StablecoinPriceSource),
            Box::new(CountingSource {
                calls: calls.clone(),
                price: 142.5,
            }),
        ]);

        assert_eq!(chain.price_of(USDC_MINT).await, 1.0);
        assert_eq!(chain.price_of(NATIVE_ASSET_ID).await, 142.5);
        assert_eq!(chain.price_of(NATIVE_ASSET_ID).await, 142.5);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unavailable_price_is_zero() {
        let chain = PriceChain::new(vec![Box::new(FailingSource)]);
        assert_eq!(chain.price_of("mint").await, 0.0);
    }

    #[tokio::test]
    async fn metadata_falls_back_to_placeholder() {
        let chain = MetadataChain::new(vec![Box::new(KnownAssetSource)]);
        assert_eq!(chain.metadata_of(NATIVE_ASSET_ID).await.symbol, "SOL");
        assert_eq!(
            chain.metadata_of("zzzzMint").await,
            AssetMetadata::placeholder("zzzzMint")
        );
    }
}
