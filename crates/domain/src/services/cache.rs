use std::time::Duration;

use moka::sync::Cache;

use crate::model::EventKey;

/// Hint cache for event keys known to be persisted.
pub trait EventKeyCache: Send + Sync {
    /// Returns `true` if the key is known to be in the ledger already.
    fn known_persisted(&self, key: &EventKey) -> bool;

    fn mark_persisted(&self, key: &EventKey);
}

/// Bounded TTL cache. A miss only means "ask the ledger".
#[derive(Debug)]
pub struct InMemoryEventKeyCache {
    positives: Cache<EventKey, ()>,
}

impl EventKeyCache for InMemoryEventKeyCache {
    fn known_persisted(&self, key: &EventKey) -> bool {
        self.positives.contains_key(key)
    }

    fn mark_persisted(&self, key: &EventKey) {
        self.positives.insert(key.clone(), ());
    }
}

impl InMemoryEventKeyCache {
    pub const DEFAULT_TTL: Duration = Duration::from_secs(600);
    pub const DEFAULT_CAPACITY: u64 = 100_000;

    pub fn new(ttl: Duration) -> Self {
        Self::with_capacity(ttl, Self::DEFAULT_CAPACITY)
    }

    pub fn with_capacity(ttl: Duration, capacity: u64) -> Self {
        let capacity = capacity.max(1);
        Self {
            positives: Cache::builder()
                .time_to_live(ttl)
                .max_capacity(capacity)
                .build(),
        }
    }
}

impl Default for InMemoryEventKeyCache {
    fn default() -> Self {
        Self::new(Self::DEFAULT_TTL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::WalletId;

    fn key(asset: &str) -> EventKey {
        EventKey {
            signature: "sig".into(),
            wallet_id: WalletId::from("w1"),
            asset_id: asset.into(),
        }
    }

    #[test]
    fn marks_presence_per_key() {
        let cache = InMemoryEventKeyCache::default();
        assert!(!cache.known_persisted(&key("mint-a")));
        cache.mark_persisted(&key("mint-a"));
        assert!(cache.known_persisted(&key("mint-a")));
        assert!(!cache.known_persisted(&key("mint-b")));
    }
}
