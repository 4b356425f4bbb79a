//! Harvest orchestrator: drives result pages through fetch, extraction and
//! validation, then deduplicates and summarises.
//!
//! Pages are fetched concurrently up to `max_concurrent_requests`. Each page
//! slot waits for its own pacing pause before fetching; the pause schedule is
//! drawn from one shared counter so concurrency cannot skip rest breaks.
//! Results are absorbed in completion order by this task alone.

use crate::dedup::merge;
use crate::error::{FetchError, Result, ValidationRejected};
use crate::extract::{ExtractionPipeline, SelectorSet};
use crate::fetch::{BackoffState, Fetcher, Page};
use crate::pacing::PacingController;
use crate::summary::{HarvestSession, HarvestSummary, PageReport, PageStatus};
use crate::url_builder::{build_search_url, SearchQuery};
use crate::validate::Validator;
use futures::stream::{FuturesUnordered, StreamExt};
use jobharvest_browser::{Identity, IdentityRotator};
use jobharvest_core::{HarvestingConfiguration, JobRecord};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Why a run stopped before every page was processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "reason")]
pub enum AbortReason {
    /// A page was blocked and the policy is abort-on-block
    Blocked {
        /// Index of the blocked page
        page: u32,
    },
    /// Every identity in the pool has been blocked
    IdentitiesExhausted {
        /// Index of the page whose block exhausted the pool
        page: u32,
    },
    /// Too many pages in a row failed
    ConsecutiveFailures {
        /// Failures in the run that tripped the ceiling
        count: u32,
    },
}

/// How a run ended. None of these are errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "terminal", content = "detail")]
pub enum Terminal {
    /// Every requested page was processed
    Completed,
    /// The run stopped early
    Aborted(AbortReason),
    /// The cancellation token fired
    Cancelled,
}

/// Everything a run produced.
#[derive(Debug, Clone, Serialize)]
pub struct HarvestReport {
    /// How the run ended
    pub terminal: Terminal,
    /// One entry per requested page, in page order
    pub pages: Vec<PageReport>,
    /// Final records: accepted, in fetch-completion order, deduplicated
    pub records: Vec<JobRecord>,
    /// Aggregate statistics
    pub summary: HarvestSummary,
}

/// Result of one page slot.
struct PageOutcome {
    index: u32,
    identity: Identity,
    result: std::result::Result<Page, FetchError>,
}

impl Terminal {
    /// Page whose block ended the run; later pages are not kept.
    fn blocked_at(self) -> Option<u32> {
        match self {
            Self::Aborted(
                AbortReason::Blocked { page } | AbortReason::IdentitiesExhausted { page },
            ) => Some(page),
            _ => None,
        }
    }
}

/// Coordinates a harvest run.
pub struct HarvestOrchestrator {
    config: HarvestingConfiguration,
    fetcher: Arc<dyn Fetcher>,
    rotator: Arc<IdentityRotator>,
    backoff: Arc<BackoffState>,
    pacing: PacingController,
    extraction: ExtractionPipeline,
    validator: Validator,
}

impl HarvestOrchestrator {
    /// Build an orchestrator with default selectors and a private rotator.
    ///
    /// Use [`with_rotator`](Self::with_rotator) and
    /// [`with_backoff_state`](Self::with_backoff_state) to share state with
    /// the fetcher.
    pub fn new(config: HarvestingConfiguration, fetcher: Arc<dyn Fetcher>) -> Result<Self> {
        config.validate()?;
        let rotator = Arc::new(IdentityRotator::from_config(&config.identity)?);
        let extraction = ExtractionPipeline::new(SelectorSet::default(), config.extraction.clone())?;
        let validator =
            Validator::new(config.validation.clone()).with_extraction(config.extraction.clone());

        Ok(Self {
            pacing: PacingController::new(config.pacing.clone()),
            config,
            fetcher,
            rotator,
            backoff: Arc::new(BackoffState::new()),
            extraction,
            validator,
        })
    }

    /// Share the fetcher's rotator so blocks and rotations are seen by both.
    #[must_use]
    pub fn with_rotator(mut self, rotator: Arc<IdentityRotator>) -> Self {
        self.rotator = rotator;
        self
    }

    /// Counters reported in the summary's `fetch` section.
    #[must_use]
    pub fn with_backoff_state(mut self, state: Arc<BackoffState>) -> Self {
        self.backoff = state;
        self
    }

    /// Replace the selector set, e.g. after a site layout change.
    pub fn with_selectors(mut self, selectors: SelectorSet) -> Result<Self> {
        self.extraction = ExtractionPipeline::new(selectors, self.config.extraction.clone())?;
        Ok(self)
    }

    /// Wait out any cool-off and the page's pacing pause, fetch the page,
    /// then linger for its reading time.
    async fn fetch_page(
        &self,
        index: u32,
        url: String,
        not_before: Option<Instant>,
    ) -> PageOutcome {
        if let Some(deadline) = not_before {
            tokio::time::sleep_until(deadline).await;
        }

        let pause = self.pacing.next_pause();
        if pause.index > 0 && !pause.duration.is_zero() {
            tokio::time::sleep(pause.duration).await;
        }

        let identity = self.rotator.next_identity();
        tracing::debug!(page = index, %url, profile = %identity.profile_name, "Fetching result page");
        let result = self.fetcher.fetch(&url, &identity).await;

        if let Ok(page) = &result {
            let reading = self.pacing.reading_time(page.body.len());
            if !reading.is_zero() {
                tracing::trace!(page = index, millis = reading.as_millis(), "Reading page");
                tokio::time::sleep(reading).await;
            }
        }

        PageOutcome {
            index,
            identity,
            result,
        }
    }

    /// Extract and validate a fetched page into the session.
    fn absorb_page(&self, page: &Page, report: &mut PageReport, session: &mut HarvestSession) {
        let raws = self.extraction.extract_page(page, self.config.region);
        report.tally.listings = raws.len();

        for raw in raws {
            if let Some(incomplete) = raw.incompleteness() {
                report.tally.incomplete += 1;
                tracing::trace!(missing = incomplete.missing.len(), "Incomplete listing");
            }
            match self.validator.validate_and_score(raw) {
                Ok(record) => {
                    report.tally.accepted += 1;
                    session.accepted.push((report.index, record));
                }
                Err(ValidationRejected::Structural(reason)) => {
                    report.tally.structural_rejections += 1;
                    tracing::debug!(page = report.index, %reason, "Dropped listing");
                }
                Err(ValidationRejected::Spam(reason)) => {
                    report.tally.spam_rejections += 1;
                    tracing::debug!(page = report.index, %reason, "Dropped spam listing");
                }
            }
        }
    }

    /// Fold one page outcome into the session.
    ///
    /// Returns a stop decision, or a cool-off to apply before further pages
    /// after a blocked page was skipped.
    fn absorb(
        &self,
        outcome: PageOutcome,
        session: &mut HarvestSession,
        consecutive_failures: &mut u32,
    ) -> Absorbed {
        let index = outcome.index;
        let Some(position) = session.pages.iter().position(|p| p.index == index) else {
            return Absorbed::Continue;
        };
        let mut report = session.pages[position].clone();

        let absorbed = match outcome.result {
            Ok(page) => {
                *consecutive_failures = 0;
                self.rotator.report_success();
                self.absorb_page(&page, &mut report, session);
                report.status = PageStatus::Succeeded;
                tracing::info!(page = index, listings = report.tally.listings, "Page harvested");
                Absorbed::Continue
            }
            Err(FetchError::Blocked { reason, slot, .. }) => {
                report.status = PageStatus::Blocked;
                *consecutive_failures += 1;
                // The retry loop may have moved on from the identity the page started with
                let refused = slot.unwrap_or(outcome.identity.slot);
                let exhausted = self.rotator.report_blocked_slot(refused);
                tracing::warn!(page = index, %reason, slot = refused, exhausted, "Page blocked");
                if exhausted {
                    Absorbed::Stop(Terminal::Aborted(AbortReason::IdentitiesExhausted {
                        page: index,
                    }))
                } else if self.config.orchestration.abort_on_block {
                    Absorbed::Stop(Terminal::Aborted(AbortReason::Blocked { page: index }))
                } else if let Some(stop) = self.failure_ceiling(*consecutive_failures) {
                    Absorbed::Stop(stop)
                } else {
                    let cooldown = self.pacing.block_cooldown();
                    tracing::info!(
                        page = index,
                        seconds = cooldown.as_secs(),
                        "Cooling off after block"
                    );
                    Absorbed::CoolOff(cooldown)
                }
            }
            Err(error) => {
                report.status = PageStatus::Failed(error.kind());
                *consecutive_failures += 1;
                tracing::warn!(page = index, "Page skipped: {}", error);
                self.failure_ceiling(*consecutive_failures)
                    .map_or(Absorbed::Continue, Absorbed::Stop)
            }
        };

        session.pages[position] = report;
        absorbed
    }

    fn failure_ceiling(&self, consecutive_failures: u32) -> Option<Terminal> {
        let ceiling = self.config.orchestration.max_consecutive_page_failures;
        (ceiling > 0 && consecutive_failures >= ceiling).then_some(Terminal::Aborted(
            AbortReason::ConsecutiveFailures {
                count: consecutive_failures,
            },
        ))
    }

    /// Harvest up to `max_pages` result pages for `query`.
    ///
    /// Per-page failures never fail the run. Cancellation, aborts and
    /// completion all produce a report from whatever was accepted so far.
    ///
    /// When a block ends the run, pages before the blocked one that are still
    /// in flight are allowed to finish, and everything after it is discarded
    /// and reported as not attempted.
    pub async fn run(
        &self,
        query: &SearchQuery,
        max_pages: u32,
        cancel: CancellationToken,
    ) -> Result<HarvestReport> {
        let region = self.config.region;
        let page_size = self.config.orchestration.page_size;
        let mut pages = Vec::with_capacity(max_pages as usize);
        for index in 0..max_pages {
            let url = build_search_url(region, query, index, page_size)?;
            pages.push(PageReport::pending(index, url));
        }

        let mut session = HarvestSession::new(pages);
        tracing::info!(
            session = %session.id,
            %region,
            keywords = %query.keywords,
            location = %query.location,
            max_pages,
            "Starting harvest"
        );

        let concurrency = self.config.orchestration.max_concurrent_requests.max(1);
        let mut in_flight = FuturesUnordered::new();
        let mut in_flight_pages: HashSet<u32> = HashSet::new();
        let mut next_page = 0u32;
        let mut consecutive_failures = 0u32;
        let mut not_before: Option<Instant> = None;
        let mut stop: Option<Terminal> = None;
        let mut cancelled = false;

        loop {
            if stop.is_none() {
                while in_flight.len() < concurrency && next_page < max_pages {
                    let url = session.pages[next_page as usize].url.clone();
                    in_flight.push(self.fetch_page(next_page, url, not_before));
                    in_flight_pages.insert(next_page);
                    next_page += 1;
                }
            }

            // After a stop, only earlier pages of a block-ended run are awaited
            let boundary = stop.and_then(Terminal::blocked_at);
            let waiting = match (stop, boundary) {
                (None, _) => !in_flight.is_empty(),
                (Some(_), Some(page)) => in_flight_pages.iter().any(|&i| i < page),
                (Some(_), None) => false,
            };
            if !waiting {
                break;
            }

            let outcome = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    cancelled = true;
                    break;
                }
                Some(outcome) = in_flight.next() => outcome,
            };

            in_flight_pages.remove(&outcome.index);
            if boundary.is_some_and(|page| outcome.index > page) {
                continue;
            }

            match self.absorb(outcome, &mut session, &mut consecutive_failures) {
                Absorbed::Continue => {}
                Absorbed::CoolOff(cooldown) => {
                    let until = Instant::now() + cooldown;
                    not_before = Some(not_before.map_or(until, |current| current.max(until)));
                }
                Absorbed::Stop(terminal) => match (stop, boundary, terminal.blocked_at()) {
                    (None, _, _) => stop = Some(terminal),
                    // An earlier page blocked while draining: it becomes the boundary
                    (Some(_), Some(current), Some(page)) if page < current => stop = Some(terminal),
                    (Some(_), _, _) => {}
                },
            }
        }

        // Dropping the futures abandons in-flight fetches and releases any browser session
        drop(in_flight);
        let boundary = stop.and_then(Terminal::blocked_at);
        if let Some(page) = boundary {
            let dropped = session.discard_after(page);
            if dropped > 0 {
                tracing::info!(page, dropped, "Discarded records harvested after the blocked page");
            }
        }
        for report in &mut session.pages {
            if in_flight_pages.contains(&report.index) {
                report.status = if boundary.is_some_and(|page| report.index > page) {
                    PageStatus::NotAttempted
                } else {
                    PageStatus::Abandoned
                };
            }
        }

        let terminal = match stop {
            Some(terminal) => terminal,
            None if cancelled => Terminal::Cancelled,
            None => Terminal::Completed,
        };

        let accepted = session.accepted_records();
        let (records, duplicates_removed) = if self.config.orchestration.remove_duplicates {
            let outcome = merge(accepted);
            (outcome.records, outcome.duplicates_removed)
        } else {
            (accepted, 0)
        };

        let summary = HarvestSummary::from_session(
            &session,
            &records,
            duplicates_removed,
            self.backoff.snapshot(),
            self.rotator.rotations(),
        );
        tracing::info!(
            session = %session.id,
            terminal = ?terminal,
            pages_succeeded = summary.pages_succeeded,
            records = summary.total_records,
            average_quality = summary.average_quality_score,
            "Harvest finished"
        );

        Ok(HarvestReport {
            terminal,
            pages: session.pages,
            records,
            summary,
        })
    }
}

/// What absorbing one page asks of the run loop.
enum Absorbed {
    Continue,
    /// Hold back further pages for this long
    CoolOff(Duration),
    Stop(Terminal),
}
