use std::{sync::Arc, time::Duration};

use crate::{
    domain::{Listing, ListingId},
    ports::KeyValueStore,
    Result,
};

pub const DEFAULT_TTL: Duration = Duration::from_secs(6 * 60 * 60);
pub const DEFAULT_KEY_PREFIX: &str = "kwork_project";

/// "Already notified" policy on top of an expiring key-value store.
///
/// A record exists only for listings that were delivered; absence of a record
/// is the only signal needed to attempt a notification.
#[derive(Clone)]
pub struct Deduplicator {
    store: Arc<dyn KeyValueStore>,
    ttl: Duration,
    prefix: String,
}

impl Deduplicator {
    pub fn new(store: Arc<dyn KeyValueStore>, ttl: Duration, prefix: impl Into<String>) -> Self {
        Self {
            store,
            ttl,
            prefix: prefix.into(),
        }
    }

    pub fn key(&self, id: ListingId) -> String {
        format!("{}:{id}", self.prefix)
    }

    pub async fn has(&self, id: ListingId) -> Result<bool> {
        Ok(self.store.get(&self.key(id)).await?.is_some())
    }

    /// Record a delivered listing. Marking again before expiry refreshes the TTL.
    pub async fn mark(&self, listing: &Listing) -> Result<()> {
        let value = serde_json::to_string(listing)?;
        self.store.set(&self.key(listing.id), &value, self.ttl).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{domain::RawListing, testing::MemoryStore};

    fn listing(id: i64) -> Listing {
        Listing::from_raw(RawListing {
            id: Some(id),
            title: Some(format!("project {id}")),
            ..Default::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn has_reflects_marks_under_prefixed_keys() {
        let store = Arc::new(MemoryStore::default());
        let dedup = Deduplicator::new(store.clone(), DEFAULT_TTL, DEFAULT_KEY_PREFIX);

        assert!(!dedup.has(ListingId(42)).await.unwrap());
        dedup.mark(&listing(42)).await.unwrap();
        assert!(dedup.has(ListingId(42)).await.unwrap());
        assert!(!dedup.has(ListingId(43)).await.unwrap());

        let stored = store.raw("kwork_project:42").unwrap();
        let back: Listing = serde_json::from_str(&stored).unwrap();
        assert_eq!(back.id, ListingId(42));
    }

    #[tokio::test(start_paused = true)]
    async fn records_expire_and_marking_again_refreshes() {
        let store = Arc::new(MemoryStore::default());
        let dedup = Deduplicator::new(store, Duration::from_secs(60), "p");

        dedup.mark(&listing(1)).await.unwrap();
        tokio::time::advance(Duration::from_secs(45)).await;
        dedup.mark(&listing(1)).await.unwrap();
        tokio::time::advance(Duration::from_secs(45)).await;
        assert!(dedup.has(ListingId(1)).await.unwrap());

        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(!dedup.has(ListingId(1)).await.unwrap());
    }
}
