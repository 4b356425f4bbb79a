use async_trait::async_trait;
use jobharvest_browser::{identity_pool, Identity, IdentityRotator};
use jobharvest_core::{
    ExtractionConfig, ExtractionMethod, HarvestingConfiguration, Region, ValidationConfig,
};
use jobharvest_pipeline::{
    merge, AbortReason, AttemptError, ExtractionPipeline, FetchError, Fetcher,
    HarvestOrchestrator, Page, PageSource, PageStatus, RetryPolicy, RetryingFetcher, SearchQuery,
    SelectorSet, Terminal, Validator,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const POSTING: &str = r#"<script type="application/ld+json">
{
  "@context": "https://schema.org",
  "@type": "JobPosting",
  "title": "Staff Rust Engineer",
  "url": "https://www.linkedin.com/jobs/view/4242",
  "datePosted": "2025-03-01",
  "employmentType": "FULL_TIME",
  "hiringOrganization": {"@type": "Organization", "name": "Initech"},
  "jobLocation": {"@type": "Place", "address": {"addressLocality": "Austin", "addressRegion": "TX"}}
}
</script>"#;

fn card(id: u32) -> String {
    format!(
        r#"<li><div class="base-card">
            <a class="base-card__full-link" href="https://www.linkedin.com/jobs/view/{id}?trk=public_jobs"></a>
            <h3 class="base-search-card__title">Backend Engineer {id}</h3>
            <h4 class="base-search-card__subtitle"><a href="/company/vandelay">Vandelay Industries</a></h4>
            <span class="job-search-card__location">Berlin, Germany</span>
            <time class="job-search-card__listdate" datetime="2025-03-0{}"></time>
        </div></li>"#,
        id % 9 + 1
    )
}

/// Serves a results page of two cards, except for pages listed as blocked.
struct ResultPages {
    blocked: Vec<u32>,
    requested: Mutex<Vec<u32>>,
}

impl ResultPages {
    fn new(blocked: Vec<u32>) -> Self {
        Self {
            blocked,
            requested: Mutex::new(Vec::new()),
        }
    }

    fn requested(&self) -> Vec<u32> {
        self.requested.lock().expect("requested lock").clone()
    }
}

#[async_trait]
impl Fetcher for ResultPages {
    async fn fetch(&self, url: &str, _identity: &Identity) -> Result<Page, FetchError> {
        let start: u32 = url
            .rsplit("start=")
            .next()
            .and_then(|s| s.parse().ok())
            .expect("start parameter");
        let page = start / 25;
        self.requested.lock().expect("requested lock").push(page);

        if self.blocked.contains(&page) {
            return Err(FetchError::Blocked {
                url: url.to_string(),
                reason: "redirected to /authwall".to_string(),
                slot: None,
            });
        }
        let body = format!(
            "<html><body><ul>{}{}</ul></body></html>",
            card(page * 2),
            card(page * 2 + 1)
        );
        Ok(Page::html(url, body))
    }
}

fn quiet_config() -> HarvestingConfiguration {
    let mut config = HarvestingConfiguration::default();
    config.region = Region::De;
    config.pacing.min_delay_ms = 0;
    config.pacing.max_delay_ms = 0;
    config.pacing.break_every = 0;
    config.pacing.reading_words_per_minute = 0;
    config.pacing.block_cooldown_min_ms = 0;
    config.pacing.block_cooldown_max_ms = 0;
    config
}

#[tokio::test]
async fn test_abort_on_block_keeps_first_page_only() {
    let mut config = quiet_config();
    config.orchestration.abort_on_block = true;
    config.orchestration.max_concurrent_requests = 1;

    let fetcher = Arc::new(ResultPages::new(vec![1]));
    let orchestrator = HarvestOrchestrator::new(config, fetcher.clone()).expect("orchestrator");
    let report = orchestrator
        .run(&SearchQuery::new("rust", "Berlin"), 5, CancellationToken::new())
        .await
        .expect("run");

    assert_eq!(report.terminal, Terminal::Aborted(AbortReason::Blocked { page: 1 }));
    assert_eq!(report.records.len(), 2);
    assert!(report.records.iter().all(|r| r.title.ends_with('0') || r.title.ends_with('1')));

    let statuses: Vec<PageStatus> = report.pages.iter().map(|p| p.status).collect();
    assert_eq!(
        statuses,
        vec![
            PageStatus::Succeeded,
            PageStatus::Blocked,
            PageStatus::NotAttempted,
            PageStatus::NotAttempted,
            PageStatus::NotAttempted,
        ]
    );
    assert_eq!(report.summary.pages_failed, 0);
    assert_eq!(report.summary.pages_not_attempted, 3);
    assert_eq!(fetcher.requested(), vec![0, 1]);
}

#[tokio::test]
async fn test_abort_on_block_at_default_concurrency_keeps_first_page_only() {
    /// Answers the blocked page late, after later pages have already succeeded.
    struct SlowBlock(ResultPages);

    #[async_trait]
    impl Fetcher for SlowBlock {
        async fn fetch(&self, url: &str, identity: &Identity) -> Result<Page, FetchError> {
            let result = self.0.fetch(url, identity).await;
            if result.is_err() {
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
            result
        }
    }

    let mut config = quiet_config();
    config.orchestration.abort_on_block = true;
    assert_eq!(config.orchestration.max_concurrent_requests, 3);

    let fetcher = Arc::new(SlowBlock(ResultPages::new(vec![1])));
    let orchestrator = HarvestOrchestrator::new(config, fetcher).expect("orchestrator");
    let report = orchestrator
        .run(&SearchQuery::new("rust", "Berlin"), 5, CancellationToken::new())
        .await
        .expect("run");

    assert_eq!(report.terminal, Terminal::Aborted(AbortReason::Blocked { page: 1 }));
    assert_eq!(report.records.len(), 2);
    assert!(report.records.iter().all(|r| r.title.ends_with('0') || r.title.ends_with('1')));
    let statuses: Vec<PageStatus> = report.pages.iter().map(|p| p.status).collect();
    assert_eq!(
        statuses,
        vec![
            PageStatus::Succeeded,
            PageStatus::Blocked,
            PageStatus::NotAttempted,
            PageStatus::NotAttempted,
            PageStatus::NotAttempted,
        ]
    );
    assert_eq!(report.summary.pages_succeeded, 1);
    assert_eq!(report.summary.pages_not_attempted, 3);
    assert_eq!(report.summary.listings_extracted, 2);
}

/// Times out on the first attempt of every page and answers 403 on the retry.
struct TimeoutThenForbidden {
    calls: Mutex<u32>,
}

#[async_trait]
impl PageSource for TimeoutThenForbidden {
    fn name(&self) -> &'static str {
        "timeout-then-forbidden"
    }

    async fn fetch_once(&self, url: &str, _identity: &Identity) -> Result<Page, AttemptError> {
        let mut calls = self.calls.lock().expect("calls lock");
        *calls += 1;
        if *calls % 2 == 1 {
            return Err(AttemptError::Timeout);
        }
        Ok(Page {
            status: 403,
            ..Page::html(url, "")
        })
    }
}

#[tokio::test]
async fn test_block_after_retry_counts_one_identity_per_page() {
    let pool: Vec<_> = identity_pool(&[]).into_iter().cycle().take(10).collect();
    let rotator = Arc::new(IdentityRotator::new(pool, 1_000, 0).expect("non-empty pool"));
    let source = Arc::new(TimeoutThenForbidden {
        calls: Mutex::new(0),
    });
    let policy = RetryPolicy {
        max_attempts: 3,
        base_backoff: Duration::from_millis(1),
        multiplier: 2.0,
        max_backoff: Duration::from_millis(5),
    };
    let fetcher = RetryingFetcher::new(source, policy).with_rotator(Arc::clone(&rotator));

    let mut config = quiet_config();
    config.orchestration.abort_on_block = false;
    config.orchestration.max_consecutive_page_failures = 0;
    config.orchestration.max_concurrent_requests = 1;
    let orchestrator = HarvestOrchestrator::new(config, Arc::new(fetcher))
        .expect("orchestrator")
        .with_rotator(Arc::clone(&rotator));
    let report = orchestrator
        .run(&SearchQuery::new("rust", ""), 8, CancellationToken::new())
        .await
        .expect("run");

    assert_eq!(report.terminal, Terminal::Completed);
    assert!(report.pages.iter().all(|p| p.status == PageStatus::Blocked));
    assert!(!rotator.is_exhausted());
}

#[tokio::test]
async fn test_concurrent_run_collects_every_page() {
    let mut config = quiet_config();
    config.orchestration.max_concurrent_requests = 3;

    let fetcher = Arc::new(ResultPages::new(Vec::new()));
    let orchestrator = HarvestOrchestrator::new(config, fetcher.clone()).expect("orchestrator");
    let report = orchestrator
        .run(&SearchQuery::new("rust", ""), 4, CancellationToken::new())
        .await
        .expect("run");

    assert_eq!(report.terminal, Terminal::Completed);
    assert_eq!(report.records.len(), 8);
    assert_eq!(report.summary.records_accepted, 8);
    assert!(report.summary.average_quality_score > 0.0);
    assert!(report
        .records
        .iter()
        .all(|r| r.data_source_region == Region::De && r.source_url.ends_with(char::is_numeric)));
    let mut requested = fetcher.requested();
    requested.sort_unstable();
    assert_eq!(requested, vec![0, 1, 2, 3]);
}

#[tokio::test]
async fn test_duplicate_listings_across_pages_are_merged() {
    /// Every page carries the same two cards.
    struct RepeatingPages;

    #[async_trait]
    impl Fetcher for RepeatingPages {
        async fn fetch(&self, url: &str, _identity: &Identity) -> Result<Page, FetchError> {
            Ok(Page::html(
                url,
                format!("<html><body><ul>{}{}</ul></body></html>", card(1), card(2)),
            ))
        }
    }

    let mut config = quiet_config();
    config.orchestration.max_concurrent_requests = 1;
    let orchestrator =
        HarvestOrchestrator::new(config, Arc::new(RepeatingPages)).expect("orchestrator");
    let report = orchestrator
        .run(&SearchQuery::new("rust", ""), 3, CancellationToken::new())
        .await
        .expect("run");

    assert_eq!(report.summary.records_accepted, 6);
    assert_eq!(report.summary.duplicates_removed, 4);
    assert_eq!(report.records.len(), 2);
}

#[test]
fn test_structured_only_page_matches_structured_plus_markup_page() {
    let pipeline = ExtractionPipeline::new(SelectorSet::default(), ExtractionConfig::default())
        .expect("pipeline");

    let structured_only = Page::html(
        "https://www.linkedin.com/jobs/view/4242",
        format!("<html><head>{POSTING}</head><body></body></html>"),
    );
    let with_markup = Page::html(
        "https://www.linkedin.com/jobs/view/4242",
        format!(
            r#"<html><head>{POSTING}</head><body>
            <h1 class="top-card-layout__title">Rust Developer (markup)</h1>
            <a class="topcard__org-name-link" href="/company/other">Other Company</a>
            <span class="topcard__flavor--bullet">Somewhere Else</span>
            </body></html>"#
        ),
    );

    let a = pipeline.extract_page(&structured_only, Region::Us);
    let b = pipeline.extract_page(&with_markup, Region::Us);
    assert_eq!(a.len(), 1);
    assert_eq!(b.len(), 1);
    assert_eq!(a[0].extraction_method(), ExtractionMethod::StructuredData);
    assert_eq!(b[0].extraction_method(), ExtractionMethod::StructuredData);
    assert_eq!(a[0].fields, b[0].fields);
    assert_eq!(a[0].text(jobharvest_core::JobField::Company), Some("Initech"));

    let validator = Validator::new(ValidationConfig::default());
    let record = validator
        .validate_and_score(a[0].clone())
        .expect("structured record accepted");
    assert_eq!(record.extraction_method, ExtractionMethod::StructuredData);
    assert_eq!(record.location.as_deref(), Some("Austin, TX"));
}

#[test]
fn test_merge_prefers_higher_score_in_either_order() {
    let validator = Validator::new(ValidationConfig::default());
    let pipeline = ExtractionPipeline::new(SelectorSet::default(), ExtractionConfig::default())
        .expect("pipeline");
    let page = Page::html(
        "https://www.linkedin.com/jobs/search",
        format!("<html><body><ul>{}</ul></body></html>", card(7)),
    );
    let raw = pipeline.extract_page(&page, Region::Us).remove(0);
    let base = validator.validate_and_score(raw).expect("accepted");

    let mut high = base.clone();
    high.data_quality_score = 0.9;
    let mut low = base;
    low.data_quality_score = 0.5;

    for input in [vec![high.clone(), low.clone()], vec![low.clone(), high.clone()]] {
        let outcome = merge(input);
        assert_eq!(outcome.records.len(), 1);
        assert!((outcome.records[0].data_quality_score - 0.9).abs() < f64::EPSILON);
    }
}
