use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::{errors::Error, formatting::html_to_text, Result};

/// Public site the listing links point at.
pub const KWORK_SITE_URL: &str = "https://kwork.ru";

/// Telegram user id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct UserId(pub i64);

/// Telegram chat id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ChatId(pub i64);

/// Telegram message id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MessageId(pub i32);

/// A stable reference to a Telegram message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MessageRef {
    pub chat_id: ChatId,
    pub message_id: MessageId,
}

/// Marketplace identity of a project posting.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ListingId(pub i64);

impl fmt::Display for ListingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The query applied on every poll cycle. Built once from configuration.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Filter {
    pub categories: Vec<i64>,
    /// Budget from (inclusive).
    pub price_from: Option<u64>,
    /// Budget to (inclusive).
    pub price_to: Option<u64>,
    /// Minimum hiring rate of the buyer, percent.
    pub hiring_from: Option<u32>,
    /// Offer count from (exclusive).
    pub offers_from: Option<u32>,
    /// Offer count to (inclusive).
    pub offers_to: Option<u32>,
    pub query: Option<String>,
}

/// One project record as the listing source returns it.
///
/// Every field is optional at decode time; [`Listing::from_raw`] enforces the
/// invariants. Numbers are accepted both as JSON numbers and numeric strings.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct RawListing {
    #[serde(default, deserialize_with = "lenient_i64")]
    pub id: Option<i64>,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub user_id: Option<i64>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub profile_picture: Option<String>,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub price: Option<i64>,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub possible_price_limit: Option<i64>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub offers: Option<i64>,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub time_left: Option<i64>,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub date_confirm: Option<i64>,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub category_id: Option<i64>,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub parent_category_id: Option<i64>,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub user_projects_count: Option<i64>,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub user_hired_percent: Option<i64>,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub allow_higher_price: Option<bool>,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub is_viewed: Option<bool>,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub already_work: Option<bool>,
}

/// A validated marketplace posting.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    pub id: ListingId,
    pub title: String,
    /// Raw markup until [`Listing::sanitized`] is applied.
    pub description: String,
    pub price: Option<i64>,
    pub price_limit: Option<i64>,
    pub offers_count: Option<i64>,
    pub category_id: Option<i64>,
    pub posted_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub author_id: Option<i64>,
    pub author_name: Option<String>,
    pub author_hired_percent: Option<i64>,
    pub author_projects_count: Option<i64>,
}

impl Listing {
    /// Validate a raw record. Records without an `id` are rejected.
    pub fn from_raw(raw: RawListing) -> Result<Self> {
        let id = raw.id.ok_or_else(|| {
            Error::InvalidListing(format!(
                "missing id (title: {:?})",
                raw.title.as_deref().unwrap_or("")
            ))
        })?;

        Ok(Self {
            id: ListingId(id),
            title: raw.title.unwrap_or_default().trim().to_string(),
            description: raw.description.unwrap_or_default(),
            price: raw.price,
            price_limit: raw.possible_price_limit,
            offers_count: raw.offers,
            category_id: raw.category_id,
            posted_at: raw.date_confirm.and_then(epoch_to_utc),
            expires_at: raw.time_left.and_then(epoch_to_utc),
            author_id: raw.user_id,
            author_name: raw.username.filter(|s| !s.trim().is_empty()),
            author_hired_percent: raw.user_hired_percent,
            author_projects_count: raw.user_projects_count,
        })
    }

    /// Same listing with the description reduced from markup to plain text.
    pub fn sanitized(mut self) -> Self {
        self.description = html_to_text(&self.description);
        self
    }

    pub fn detail_url(&self) -> String {
        format!("{KWORK_SITE_URL}/projects/{}", self.id)
    }

    pub fn reply_url(&self) -> String {
        format!("{KWORK_SITE_URL}/new_offer?project={}", self.id)
    }

    pub fn author_url(&self) -> Option<String> {
        self.author_name
            .as_deref()
            .map(|name| format!("{KWORK_SITE_URL}/user/{name}"))
    }
}

/// One page of the listing source.
#[derive(Clone, Debug)]
pub enum PageResponse {
    /// An empty `listings` is the "no data" signal.
    Page { listings: Vec<RawListing>, pages: u32 },
    /// The source's own success flag was false.
    Failed { error: String },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CycleOutcome {
    Completed,
    /// The first page could not be fetched; nothing was processed.
    Aborted { reason: String },
}

/// Per-run summary of a poll cycle. Only ever logged or displayed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PollCycleResult {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub fetched: usize,
    pub skipped: usize,
    pub sent: usize,
    pub failed: usize,
    pub outcome: CycleOutcome,
}

impl PollCycleResult {
    pub fn aborted(started_at: DateTime<Utc>, reason: String) -> Self {
        Self {
            started_at,
            finished_at: Utc::now(),
            fetched: 0,
            skipped: 0,
            sent: 0,
            failed: 0,
            outcome: CycleOutcome::Aborted { reason },
        }
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self.outcome, CycleOutcome::Aborted { .. })
    }
}

fn epoch_to_utc(secs: i64) -> Option<DateTime<Utc>> {
    if secs <= 0 {
        return None;
    }
    DateTime::<Utc>::from_timestamp(secs, 0)
}

fn lenient_i64<'de, D>(de: D) -> std::result::Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Option::<serde_json::Value>::deserialize(de)?;
    Ok(match v {
        Some(serde_json::Value::Number(n)) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Some(serde_json::Value::String(s)) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().map(|f| f as i64))
        }
        _ => None,
    })
}

fn lenient_bool<'de, D>(de: D) -> std::result::Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Option::<serde_json::Value>::deserialize(de)?;
    Ok(match v {
        Some(serde_json::Value::Bool(b)) => Some(b),
        Some(serde_json::Value::Number(n)) => n.as_i64().map(|i| i != 0),
        Some(serde_json::Value::String(s)) => match s.trim() {
            "1" | "true" => Some(true),
            "0" | "false" => Some(false),
            _ => None,
        },
        _ => None,
    })
}
