/// Core error type for the notifier.
///
/// Adapter crates map their specific errors into this type so the poll cycle
/// can count a failure against one listing without caring where it came from.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// The listing source answered, but reported an application-level failure.
    #[error("upstream error: {0}")]
    Upstream(String),

    #[error("dedup store error: {0}")]
    Store(String),

    #[error("delivery error: {0}")]
    Delivery(String),

    #[error("invalid listing: {0}")]
    InvalidListing(String),

    #[error("external error: {0}")]
    External(String),
}

pub type Result<T> = std::result::Result<T, Error>;
