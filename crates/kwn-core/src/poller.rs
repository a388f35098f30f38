//! The poll cycle: page through the listing source, drop what was already
//! notified, deliver the rest with pacing, and count the outcome.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::{
    dedup::Deduplicator,
    domain::{CycleOutcome, Filter, Listing, PageResponse, PollCycleResult, RawListing},
    pacing::Pacer,
    ports::{ListingSource, NotificationSink},
    scheduler::ScheduledJob,
    Error, Result,
};

enum ListingOutcome {
    Sent,
    Skipped,
    Failed,
}

/// One filter's poll-dedup-notify pass.
///
/// Passes never overlap: a second `run` waits until the first completes.
pub struct PollCycle {
    filter: Filter,
    source: Arc<dyn ListingSource>,
    dedup: Deduplicator,
    sink: Arc<dyn NotificationSink>,
    pacer: Arc<dyn Pacer>,
    check_seen: bool,
    pass: Mutex<()>,
    last: RwLock<Option<PollCycleResult>>,
}

impl PollCycle {
    pub fn new(
        filter: Filter,
        source: Arc<dyn ListingSource>,
        dedup: Deduplicator,
        sink: Arc<dyn NotificationSink>,
        pacer: Arc<dyn Pacer>,
    ) -> Self {
        Self {
            filter,
            source,
            dedup,
            sink,
            pacer,
            check_seen: true,
            pass: Mutex::new(()),
            last: RwLock::new(None),
        }
    }

    /// When disabled, every fetched listing is sent regardless of the store.
    /// Delivered listings are still marked.
    pub fn with_seen_check(mut self, enabled: bool) -> Self {
        self.check_seen = enabled;
        self
    }

    pub fn filter(&self) -> &Filter {
        &self.filter
    }

    /// Summary of the most recently finished pass, if any.
    pub fn last_result(&self) -> Option<PollCycleResult> {
        self.last.read().ok().and_then(|g| g.clone())
    }

    pub async fn run(&self) -> PollCycleResult {
        let _pass = self.pass.lock().await;
        let started_at = Utc::now();

        let result = match self.collect().await {
            Err(e) => {
                error!(error = %e, "poll cycle aborted: first page failed");
                PollCycleResult::aborted(started_at, e.to_string())
            }
            Ok(records) => {
                let fetched = records.len();
                let (mut sent, mut skipped, mut failed) = (0usize, 0usize, 0usize);

                for (idx, record) in records.into_iter().enumerate() {
                    let is_last = idx + 1 == fetched;
                    match self.process(record, is_last).await {
                        ListingOutcome::Sent => sent += 1,
                        ListingOutcome::Skipped => skipped += 1,
                        ListingOutcome::Failed => failed += 1,
                    }
                }

                PollCycleResult {
                    started_at,
                    finished_at: Utc::now(),
                    fetched,
                    skipped,
                    sent,
                    failed,
                    outcome: CycleOutcome::Completed,
                }
            }
        };

        if !result.is_aborted() {
            info!(
                fetched = result.fetched,
                sent = result.sent,
                skipped = result.skipped,
                failed = result.failed,
                "poll cycle finished"
            );
        }

        if let Ok(mut last) = self.last.write() {
            *last = Some(result.clone());
        }
        result
    }

    /// Drain the source page by page.
    ///
    /// Only a failure of the first page is an error. Later failures end
    /// paging early and keep what was already collected.
    async fn collect(&self) -> Result<Vec<RawListing>> {
        let (mut records, pages) = match self.source.fetch_page(&self.filter, 1).await? {
            PageResponse::Failed { error } => return Err(Error::Upstream(error)),
            PageResponse::Page { listings, pages } => (listings, pages),
        };
        debug!(page = 1, pages, count = records.len(), "fetched listings page");

        if records.is_empty() {
            return Ok(records);
        }

        for page in 2..=pages {
            match self.source.fetch_page(&self.filter, page).await {
                Ok(PageResponse::Page { listings, .. }) if listings.is_empty() => {
                    debug!(page, "empty page, stop paging");
                    break;
                }
                Ok(PageResponse::Page { listings, .. }) => {
                    debug!(page, pages, count = listings.len(), "fetched listings page");
                    records.extend(listings);
                }
                Ok(PageResponse::Failed { error }) => {
                    warn!(page, %error, "listing source refused page, stop paging");
                    break;
                }
                Err(e) => {
                    warn!(page, error = %e, "listing page request failed, stop paging");
                    break;
                }
            }
        }

        Ok(records)
    }

    /// Handle one record. A delivered listing is followed by a pacing pause
    /// unless it is the last record of the cycle.
    async fn process(&self, record: RawListing, is_last: bool) -> ListingOutcome {
        let listing = match Listing::from_raw(record) {
            Ok(l) => l,
            Err(e) => {
                warn!(error = %e, "rejecting listing");
                return ListingOutcome::Failed;
            }
        };

        if self.check_seen {
            match self.dedup.has(listing.id).await {
                Ok(true) => {
                    debug!(id = %listing.id, "already notified, skipping");
                    return ListingOutcome::Skipped;
                }
                Ok(false) => {}
                Err(e) => {
                    warn!(id = %listing.id, error = %e, "dedup lookup failed");
                    return ListingOutcome::Failed;
                }
            }
        }

        let listing = listing.sanitized();

        if let Err(e) = self.sink.send(&listing).await {
            warn!(id = %listing.id, error = %e, "notification failed");
            return ListingOutcome::Failed;
        }

        // Mark strictly after delivery.
        let outcome = match self.dedup.mark(&listing).await {
            Ok(()) => {
                debug!(id = %listing.id, "notified");
                ListingOutcome::Sent
            }
            Err(e) => {
                warn!(id = %listing.id, error = %e, "notified but could not record; may repeat");
                ListingOutcome::Failed
            }
        };

        if !is_last {
            self.pacer.pause().await;
        }
        outcome
    }
}

#[async_trait]
impl ScheduledJob for PollCycle {
    fn name(&self) -> &str {
        "poll_kwork_projects"
    }

    async fn execute(&self) {
        self.run().await;
    }
}
