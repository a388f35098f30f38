use std::time::Duration;

use async_trait::async_trait;

use crate::{
    domain::{Filter, Listing, PageResponse},
    Result,
};

/// Marketplace side: one page of candidate listings per call.
///
/// Authentication and session handling stay behind this trait.
#[async_trait]
pub trait ListingSource: Send + Sync {
    /// `page` is 1-based.
    async fn fetch_page(&self, filter: &Filter, page: u32) -> Result<PageResponse>;

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Shared key-value storage with per-key expiry.
///
/// `connect` is called once by the bootstrap before any cycle runs; the hot
/// path never connects lazily.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn connect(&self) -> Result<()>;
    async fn close(&self) -> Result<()>;

    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;
}

/// Delivers one listing to the operator.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn send(&self, listing: &Listing) -> Result<()>;
}
