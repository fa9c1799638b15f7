//! Timer-driven polling of the results pages.
//!
//! One tick fetches the current page, advances pagination, extracts the
//! listings and merges the unknown ones into Unseen. Ticks never overlap:
//! the timer for the next tick is armed only after the previous one has
//! finished. A fetch failure either halts scheduling (the default) or backs
//! off exponentially, depending on the [`FailurePolicy`].

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::config::{Config, FailurePolicyKind, PollConfig, SourceConfig};
use crate::error::Result;
use crate::models::Partition;
use crate::scrapers::{DaftExtractor, Direction, Fetcher, PageNavigator};
use crate::store::{unique_by_id, RecordStore};

/// Reaction to a failed tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Clear the interval; nothing runs until it is set again.
    Halt,
    /// Wait `initial * 2^(n-1)` (capped at `max`) after the n-th consecutive
    /// failure, and halt once `max_attempts` is exceeded.
    Backoff {
        initial: Duration,
        max: Duration,
        max_attempts: u32,
    },
}

impl FailurePolicy {
    pub fn from_config(poll: &PollConfig) -> Self {
        match poll.failure_policy {
            FailurePolicyKind::Halt => FailurePolicy::Halt,
            FailurePolicyKind::Backoff => FailurePolicy::Backoff {
                initial: Duration::from_secs(poll.backoff_initial_secs),
                max: Duration::from_secs(poll.backoff_max_secs),
                max_attempts: poll.backoff_max_attempts,
            },
        }
    }

    /// Delay before retrying after `failures` consecutive failures, or
    /// `None` if polling should halt.
    pub fn retry_delay(&self, failures: u32) -> Option<Duration> {
        match *self {
            FailurePolicy::Halt => None,
            FailurePolicy::Backoff {
                initial,
                max,
                max_attempts,
            } => {
                if failures == 0 || failures > max_attempts {
                    return None;
                }
                let factor = 1u32 << (failures - 1).min(16);
                Some(initial.saturating_mul(factor).min(max))
            }
        }
    }
}

/// Scheduling state of the loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LoopState {
    Running,
    /// No interval set by the user
    Paused,
    /// Stopped by a failure; waits for the interval to be set again
    Halted,
}

/// Observable loop status.
#[derive(Debug, Clone, Serialize)]
pub struct PollStatus {
    pub state: LoopState,
    pub ticks: u64,
    pub consecutive_failures: u32,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl PollStatus {
    fn new(state: LoopState) -> Self {
        Self {
            state,
            ticks: 0,
            consecutive_failures: 0,
            last_success_at: None,
            last_error: None,
        }
    }
}

/// Outcome of one successful tick.
#[derive(Debug, Clone)]
pub struct TickReport {
    /// Page path that was fetched
    pub page: String,
    /// Page path the next tick will fetch
    pub next_page: String,
    pub direction: Direction,
    /// The page had no pagination links; the same page is fetched again
    pub navigation_stalled: bool,
    pub extracted: usize,
    pub dropped: usize,
    /// Listings not known to any partition, merged into Unseen
    pub added: usize,
}

/// Control surface for a running loop.
#[derive(Clone)]
pub struct PollHandle {
    interval: Arc<watch::Sender<Option<Duration>>>,
    status: watch::Receiver<PollStatus>,
}

impl PollHandle {
    /// Change the tick interval; `None` or zero pauses, a value re-arms a
    /// paused or halted loop.
    pub fn set_interval(&self, interval: Option<Duration>) {
        self.interval.send_replace(interval);
    }

    pub fn pause(&self) {
        self.set_interval(None);
    }

    pub fn interval(&self) -> Option<Duration> {
        *self.interval.borrow()
    }

    pub fn status(&self) -> PollStatus {
        self.status.borrow().clone()
    }
}

/// Fetch, extract, dedupe and merge on a fixed interval.
pub struct PollLoop {
    fetcher: Arc<dyn Fetcher>,
    extractor: DaftExtractor,
    source: SourceConfig,
    navigator: PageNavigator,
    store: RecordStore,
    policy: FailurePolicy,
    retry_after: Option<Duration>,
    interval: Arc<watch::Sender<Option<Duration>>>,
    status: watch::Sender<PollStatus>,
}

impl PollLoop {
    /// Loop starting at the source's first page, halting on failure, with
    /// no interval set.
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        extractor: DaftExtractor,
        source: SourceConfig,
        store: RecordStore,
    ) -> Self {
        let navigator = PageNavigator::new(source.start_path());
        let (interval, _) = watch::channel(None);
        let (status, _) = watch::channel(PollStatus::new(LoopState::Paused));
        Self {
            fetcher,
            extractor,
            source,
            navigator,
            store,
            policy: FailurePolicy::Halt,
            retry_after: None,
            interval: Arc::new(interval),
            status,
        }
    }

    /// Build a loop from application configuration.
    pub fn from_config(config: &Config, fetcher: Arc<dyn Fetcher>, store: RecordStore) -> Result<Self> {
        let extractor = DaftExtractor::new(&config.source.host_url, &config.selectors)?;
        Ok(Self::new(fetcher, extractor, config.source.clone(), store)
            .with_policy(FailurePolicy::from_config(&config.poll))
            .with_interval(config.poll.interval()))
    }

    pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_interval(self, interval: Option<Duration>) -> Self {
        self.interval.send_replace(interval);
        self
    }

    pub fn handle(&self) -> PollHandle {
        PollHandle {
            interval: Arc::clone(&self.interval),
            status: self.status.subscribe(),
        }
    }

    pub fn navigator(&self) -> &PageNavigator {
        &self.navigator
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut RecordStore {
        &mut self.store
    }

    pub fn into_store(self) -> RecordStore {
        self.store
    }

    /// Run one fetch → navigate → extract → merge pass.
    ///
    /// Only fetch failures are returned. A page without pagination links
    /// is logged and retried next tick; a failed write is logged and the
    /// merged listings stay in memory.
    pub async fn tick(&mut self) -> Result<TickReport> {
        let page = self.navigator.current_url().to_string();
        let request_url = self.source.request_url(&page)?;
        info!(
            "Fetching {} ({}, via {})",
            request_url,
            self.navigator.direction(),
            self.fetcher.source_name()
        );

        let html = self.fetcher.fetch(&request_url).await?;
        let parsed = self.extractor.parse_page(&html);

        let navigation_stalled = match self.navigator.advance(&parsed.links) {
            Ok(next) => {
                debug!("Next page: {}", next);
                false
            }
            Err(e) => {
                warn!("{}; fetching the same page next tick", e);
                true
            }
        };

        let extracted = unique_by_id(parsed.rentals);
        let novel = self.store.novel(&extracted);
        let added = novel.len();
        if added > 0 {
            if let Err(e) = self.store.merge(Partition::Unseen, novel).await {
                error!("Failed to persist new listings: {}", e);
            }
        }

        info!(
            "Extracted {} listings ({} dropped), {} new",
            extracted.len(),
            parsed.dropped,
            added
        );

        Ok(TickReport {
            page,
            next_page: self.navigator.current_url().to_string(),
            direction: self.navigator.direction(),
            navigation_stalled,
            extracted: extracted.len(),
            dropped: parsed.dropped,
            added,
        })
    }

    /// Tick and apply the failure policy; used by the scheduler.
    pub async fn tick_and_record(&mut self) -> Option<TickReport> {
        match self.tick().await {
            Ok(report) => {
                self.retry_after = None;
                self.status.send_modify(|status| {
                    status.ticks += 1;
                    status.consecutive_failures = 0;
                    status.last_success_at = Some(Utc::now());
                    status.last_error = None;
                });
                Some(report)
            }
            Err(e) => {
                error!("Tick failed: {}", e);
                let mut failures = 0;
                self.status.send_modify(|status| {
                    status.ticks += 1;
                    status.consecutive_failures += 1;
                    status.last_error = Some(e.to_string());
                    failures = status.consecutive_failures;
                });

                // Retrying only helps when the page could not be reached
                let retry = if e.is_fetch_failure() {
                    self.policy.retry_delay(failures)
                } else {
                    None
                };
                match retry {
                    Some(delay) => {
                        warn!("Retrying in {:?} (failure {})", delay, failures);
                        self.retry_after = Some(delay);
                    }
                    None => {
                        error!("Polling halted after {} consecutive failure(s)", failures);
                        self.retry_after = None;
                        self.interval.send_replace(None);
                        self.set_state(LoopState::Halted);
                    }
                }
                None
            }
        }
    }

    /// Schedule ticks until `shutdown` resolves.
    ///
    /// An in-flight tick always runs to completion; shutdown and interval
    /// changes are only observed while waiting for the next tick.
    pub async fn run<F>(&mut self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut interval_rx = self.interval.subscribe();

        loop {
            let requested = *interval_rx.borrow_and_update();
            let period = match requested.filter(|d| !d.is_zero()) {
                Some(period) => period,
                None => {
                    if self.status.borrow().state == LoopState::Running {
                        info!("Polling paused");
                        self.set_state(LoopState::Paused);
                    }
                    let stop = tokio::select! {
                        _ = &mut shutdown => true,
                        _ = interval_rx.changed() => false,
                    };
                    if stop {
                        break;
                    }
                    continue;
                }
            };

            if self.status.borrow().state != LoopState::Running {
                info!("Polling every {:?}", period);
                self.status.send_modify(|status| {
                    if status.state == LoopState::Halted {
                        status.consecutive_failures = 0;
                    }
                    status.state = LoopState::Running;
                });
            }

            let wait = self.retry_after.map_or(period, |delay| delay.max(period));
            tokio::select! {
                _ = &mut shutdown => break,
                _ = interval_rx.changed() => continue,
                _ = tokio::time::sleep(wait) => {}
            }

            self.tick_and_record().await;
        }

        info!("Poll loop stopped");
    }

    fn set_state(&self, state: LoopState) {
        self.status.send_modify(|status| status.state = state);
    }
}
