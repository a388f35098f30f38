//! Fixed-interval trigger driver for the poll cycle.
//!
//! - fires once at start, then every `interval`
//! - at most `max_instances` runs in flight; a trigger that finds the ceiling
//!   reached is dropped, not queued
//! - a trigger that is already older than `misfire_grace` is dropped
//! - can be paused/resumed without losing its timer

use std::{
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::{
    sync::Semaphore,
    task::JoinHandle,
    time::{interval, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Work driven by the scheduler.
#[async_trait]
pub trait ScheduledJob: Send + Sync + 'static {
    fn name(&self) -> &str;
    async fn execute(&self);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScheduleConfig {
    pub interval: Duration,
    pub max_instances: usize,
    pub misfire_grace: Duration,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10 * 60),
            max_instances: 3,
            misfire_grace: Duration::from_secs(60 * 60),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SchedulerStatus {
    pub running: bool,
    pub paused: bool,
    pub interval: Duration,
    pub active_instances: usize,
    pub fired: u64,
    pub dropped: u64,
    pub last_fired_at: Option<DateTime<Utc>>,
}

#[derive(Clone)]
pub struct IntervalScheduler {
    inner: Arc<SchedulerInner>,
}

struct SchedulerInner {
    job: Arc<dyn ScheduledJob>,
    cfg: ScheduleConfig,
    permits: Arc<Semaphore>,
    paused: AtomicBool,
    fired: AtomicU64,
    dropped: AtomicU64,
    state: tokio::sync::Mutex<SchedulerState>,
}

#[derive(Default)]
struct SchedulerState {
    ticker: Option<JoinHandle<()>>,
    cancel: Option<CancellationToken>,
    last_fired_at: Option<DateTime<Utc>>,
}

impl IntervalScheduler {
    pub fn new(job: Arc<dyn ScheduledJob>, cfg: ScheduleConfig) -> Self {
        let max_instances = cfg.max_instances.max(1);
        Self {
            inner: Arc::new(SchedulerInner {
                job,
                cfg: ScheduleConfig {
                    max_instances,
                    ..cfg
                },
                permits: Arc::new(Semaphore::new(max_instances)),
                paused: AtomicBool::new(false),
                fired: AtomicU64::new(0),
                dropped: AtomicU64::new(0),
                state: tokio::sync::Mutex::new(SchedulerState::default()),
            }),
        }
    }

    /// Start the ticker. Calling it on a running scheduler is a no-op.
    pub async fn start(&self) {
        let mut st = self.inner.state.lock().await;
        if st.ticker.is_some() {
            return;
        }

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let scheduler = self.clone();
        let period = self.inner.cfg.interval;
        let handle = tokio::spawn(async move {
            let mut tick = interval(period);
            tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    scheduled = tick.tick() => {
                        scheduler.fire(scheduled.elapsed()).await;
                    }
                }
            }
        });

        st.ticker = Some(handle);
        st.cancel = Some(cancel);
        info!(
            job = self.inner.job.name(),
            interval_secs = period.as_secs(),
            max_instances = self.inner.cfg.max_instances,
            "scheduler started"
        );
    }

    /// Stop the ticker and wait for in-flight runs to finish.
    pub async fn stop(&self) {
        let handle = {
            let mut st = self.inner.state.lock().await;
            if let Some(tok) = st.cancel.take() {
                tok.cancel();
            }
            st.ticker.take()
        };
        if let Some(handle) = handle {
            let _ = handle.await;
        }

        let all = self.inner.cfg.max_instances as u32;
        if let Ok(permits) = self.inner.permits.acquire_many(all).await {
            drop(permits);
        }
        info!(job = self.inner.job.name(), "scheduler stopped");
    }

    pub fn pause(&self) {
        self.inner.paused.store(true, Ordering::SeqCst);
        info!(job = self.inner.job.name(), "scheduler paused");
    }

    pub fn resume(&self) {
        self.inner.paused.store(false, Ordering::SeqCst);
        info!(job = self.inner.job.name(), "scheduler resumed");
    }

    pub fn is_paused(&self) -> bool {
        self.inner.paused.load(Ordering::SeqCst)
    }

    /// Trigger an out-of-band run. Returns false when the instance ceiling is reached.
    pub async fn run_now(&self) -> bool {
        self.launch().await
    }

    pub async fn status(&self) -> SchedulerStatus {
        let st = self.inner.state.lock().await;
        SchedulerStatus {
            running: st.ticker.is_some(),
            paused: self.is_paused(),
            interval: self.inner.cfg.interval,
            active_instances: self.inner.cfg.max_instances
                - self.inner.permits.available_permits(),
            fired: self.inner.fired.load(Ordering::SeqCst),
            dropped: self.inner.dropped.load(Ordering::SeqCst),
            last_fired_at: st.last_fired_at,
        }
    }

    async fn fire(&self, lateness: Duration) {
        if self.is_paused() {
            debug!(job = self.inner.job.name(), "paused, trigger ignored");
            return;
        }
        if lateness > self.inner.cfg.misfire_grace {
            self.inner.dropped.fetch_add(1, Ordering::SeqCst);
            warn!(
                job = self.inner.job.name(),
                late_secs = lateness.as_secs(),
                "trigger missed its grace period, dropped"
            );
            return;
        }
        self.launch().await;
    }

    async fn launch(&self) -> bool {
        let permit = match self.inner.permits.clone().try_acquire_owned() {
            Ok(p) => p,
            Err(_) => {
                self.inner.dropped.fetch_add(1, Ordering::SeqCst);
                warn!(
                    job = self.inner.job.name(),
                    max_instances = self.inner.cfg.max_instances,
                    "maximum running instances reached, trigger dropped"
                );
                return false;
            }
        };

        self.inner.fired.fetch_add(1, Ordering::SeqCst);
        self.inner.state.lock().await.last_fired_at = Some(Utc::now());

        let job = self.inner.job.clone();
        tokio::spawn(async move {
            job.execute().await;
            drop(permit);
        });
        true
    }
}
