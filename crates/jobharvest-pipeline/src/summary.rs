//! Run accumulator and the summary derived from it.

use crate::error::FetchErrorKind;
use crate::fetch::BackoffSnapshot;
use chrono::{DateTime, Utc};
use jobharvest_core::{ExtractionMethod, JobField, JobRecord};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

/// Scores at or above this count as high quality.
const HIGH_QUALITY: f64 = 0.8;
/// Scores at or above this (and below [`HIGH_QUALITY`]) count as medium.
const MEDIUM_QUALITY: f64 = 0.5;
/// Entries kept in the top-companies and top-locations lists.
const TOP_N: usize = 5;

/// What happened to one result page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "kind")]
pub enum PageStatus {
    /// Never scheduled because the run stopped first
    NotAttempted,
    /// Fetched and extracted
    Succeeded,
    /// Fetch failed for a reason other than a block
    Failed(FetchErrorKind),
    /// The site refused the fetch
    Blocked,
    /// In flight when the run stopped; its result was discarded
    Abandoned,
}

/// Extraction and validation counts for one page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PageTally {
    /// Listings found on the page
    pub listings: usize,
    /// Listings that became records
    pub accepted: usize,
    /// Listings dropped for a missing title, company or URL
    pub structural_rejections: usize,
    /// Listings dropped by the spam heuristic
    pub spam_rejections: usize,
    /// Listings missing at least one attempted field
    pub incomplete: usize,
}

/// Outcome of one result page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageReport {
    /// Zero-based page number
    pub index: u32,
    /// Search URL requested for this page
    pub url: String,
    /// What happened to the page
    pub status: PageStatus,
    /// Counts from the page's listings
    #[serde(flatten)]
    pub tally: PageTally,
}

impl PageReport {
    /// A page that has not been scheduled yet.
    #[must_use]
    pub fn pending(index: u32, url: impl Into<String>) -> Self {
        Self {
            index,
            url: url.into(),
            status: PageStatus::NotAttempted,
            tally: PageTally::default(),
        }
    }
}

/// Mutable state of one harvest run. Only the orchestrator task touches it.
#[derive(Debug, Clone)]
pub struct HarvestSession {
    /// Run identifier, repeated in the summary
    pub id: Uuid,
    /// When the session was created
    pub started_at: DateTime<Utc>,
    /// One report per requested page, in page order
    pub pages: Vec<PageReport>,
    /// Accepted records with their page index, in fetch-completion order
    pub accepted: Vec<(u32, JobRecord)>,
}

impl HarvestSession {
    /// Fresh session with a new id.
    #[must_use]
    pub fn new(pages: Vec<PageReport>) -> Self {
        Self {
            id: Uuid::new_v4(),
            started_at: Utc::now(),
            pages,
            accepted: Vec::new(),
        }
    }

    /// Accepted records in fetch-completion order.
    #[must_use]
    pub fn accepted_records(&self) -> Vec<JobRecord> {
        self.accepted.iter().map(|(_, record)| record.clone()).collect()
    }

    /// Forget everything harvested from pages after `index`.
    ///
    /// Those pages go back to `NotAttempted` with empty tallies. Returns the
    /// number of accepted records dropped.
    pub fn discard_after(&mut self, index: u32) -> usize {
        let before = self.accepted.len();
        self.accepted.retain(|(page, _)| *page <= index);
        for report in self.pages.iter_mut().filter(|p| p.index > index) {
            report.status = PageStatus::NotAttempted;
            report.tally = PageTally::default();
        }
        before - self.accepted.len()
    }

    fn count_pages(&self, matches: impl Fn(&PageStatus) -> bool) -> usize {
        self.pages.iter().filter(|p| matches(&p.status)).count()
    }

    fn total(&self, count: impl Fn(&PageTally) -> usize) -> usize {
        self.pages.iter().map(|p| count(&p.tally)).sum()
    }
}

/// Output records bucketed by quality score.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QualityDistribution {
    /// Scores of 0.8 and above
    pub high: usize,
    /// Scores from 0.5 up to 0.8
    pub medium: usize,
    /// Everything lower
    pub low: usize,
}

/// Aggregate view of a finished (or stopped) run.
///
/// Always producible: a run with no pages or no records yields zeros and
/// empty maps rather than an error.
#[derive(Debug, Clone, Serialize)]
pub struct HarvestSummary {
    /// Run identifier
    pub session_id: Uuid,
    /// Pages the run was asked for
    pub pages_requested: usize,
    /// Pages with a fetch result, of any kind
    pub pages_attempted: usize,
    /// Pages fetched and extracted
    pub pages_succeeded: usize,
    /// Pages that failed without a block
    pub pages_failed: usize,
    /// Pages the site refused
    pub pages_blocked: usize,
    /// Pages in flight when the run stopped
    pub pages_abandoned: usize,
    /// Pages never scheduled, or dropped after a block
    pub pages_not_attempted: usize,
    /// Failed and blocked pages by error kind
    pub failures_by_kind: BTreeMap<FetchErrorKind, usize>,
    /// Listings found across kept pages
    pub listings_extracted: usize,
    /// Records that passed validation, before deduplication
    pub records_accepted: usize,
    /// Listings missing title, company or URL
    pub structural_rejections: usize,
    /// Listings rejected as spam
    pub spam_rejections: usize,
    /// Listings with at least one attempted field missing
    pub incomplete_records: usize,
    /// Records dropped as duplicates
    pub duplicates_removed: usize,
    /// Records in the final output, after deduplication
    pub total_records: usize,
    /// Mean score of the output records, 0 when there are none
    pub average_quality_score: f64,
    /// Share of output records carrying each field, in [0, 1]
    pub field_completion_rates: BTreeMap<JobField, f64>,
    /// Output records by score bucket
    pub quality_distribution: QualityDistribution,
    /// Output records by coarsest extraction strategy
    pub extraction_methods: BTreeMap<ExtractionMethod, usize>,
    /// Most frequent companies with counts
    pub top_companies: Vec<(String, usize)>,
    /// Most frequent locations with counts
    pub top_locations: Vec<(String, usize)>,
    /// Fetch attempt and backoff counters
    pub fetch: BackoffSnapshot,
    /// Identity rotations over the run
    pub identity_rotations: u64,
    /// When the session was created
    pub started_at: DateTime<Utc>,
    /// When the summary was built
    pub finished_at: DateTime<Utc>,
}

/// Most frequent values, ties broken alphabetically.
fn top_values<'a>(values: impl Iterator<Item = &'a str>) -> Vec<(String, usize)> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for value in values {
        *counts.entry(value).or_default() += 1;
    }
    let mut ranked: Vec<(String, usize)> = counts
        .into_iter()
        .map(|(value, count)| (value.to_string(), count))
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.truncate(TOP_N);
    ranked
}

impl HarvestSummary {
    /// Summarise `session` given the final (deduplicated) record set.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn from_session(
        session: &HarvestSession,
        records: &[JobRecord],
        duplicates_removed: usize,
        fetch: BackoffSnapshot,
        identity_rotations: u64,
    ) -> Self {
        let mut failures_by_kind = BTreeMap::new();
        for page in &session.pages {
            if let PageStatus::Failed(kind) = page.status {
                *failures_by_kind.entry(kind).or_insert(0) += 1;
            }
        }

        let total = records.len();
        let average_quality_score = if total == 0 {
            0.0
        } else {
            records.iter().map(|r| r.data_quality_score).sum::<f64>() / total as f64
        };

        let field_completion_rates = JobField::ALL
            .iter()
            .map(|&field| {
                let rate = if total == 0 {
                    0.0
                } else {
                    records.iter().filter(|r| r.field_present(field)).count() as f64 / total as f64
                };
                (field, rate)
            })
            .collect();

        let mut quality_distribution = QualityDistribution::default();
        let mut extraction_methods = BTreeMap::new();
        for record in records {
            match record.data_quality_score {
                s if s >= HIGH_QUALITY => quality_distribution.high += 1,
                s if s >= MEDIUM_QUALITY => quality_distribution.medium += 1,
                _ => quality_distribution.low += 1,
            }
            *extraction_methods.entry(record.extraction_method).or_insert(0) += 1;
        }

        Self {
            session_id: session.id,
            pages_requested: session.pages.len(),
            pages_attempted: session.count_pages(|s| {
                !matches!(s, PageStatus::NotAttempted | PageStatus::Abandoned)
            }),
            pages_succeeded: session.count_pages(|s| matches!(s, PageStatus::Succeeded)),
            pages_failed: session.count_pages(|s| matches!(s, PageStatus::Failed(_))),
            pages_blocked: session.count_pages(|s| matches!(s, PageStatus::Blocked)),
            pages_abandoned: session.count_pages(|s| matches!(s, PageStatus::Abandoned)),
            pages_not_attempted: session.count_pages(|s| matches!(s, PageStatus::NotAttempted)),
            failures_by_kind,
            listings_extracted: session.total(|t| t.listings),
            records_accepted: session.accepted.len(),
            structural_rejections: session.total(|t| t.structural_rejections),
            spam_rejections: session.total(|t| t.spam_rejections),
            incomplete_records: session.total(|t| t.incomplete),
            duplicates_removed,
            total_records: total,
            average_quality_score,
            field_completion_rates,
            quality_distribution,
            extraction_methods,
            top_companies: top_values(records.iter().map(|r| r.company.as_str())),
            top_locations: top_values(records.iter().filter_map(|r| r.location.as_deref())),
            fetch,
            identity_rotations,
            started_at: session.started_at,
            finished_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jobharvest_core::Region;

    fn record(company: &str, location: Option<&str>, score: f64) -> JobRecord {
        JobRecord {
            source_url: format!("https://www.linkedin.com/jobs/view/{company}"),
            title: "Engineer".to_string(),
            company: company.to_string(),
            location: location.map(str::to_string),
            posted_date: None,
            description: None,
            requirements: None,
            responsibilities: None,
            benefits: None,
            salary_info: None,
            applicant_count: None,
            experience_level: None,
            employment_type: None,
            remote_work_option: None,
            company_size: None,
            company_industry: None,
            extraction_method: ExtractionMethod::Markup,
            field_methods: BTreeMap::new(),
            data_source_region: Region::Us,
            harvested_at: Utc::now(),
            data_quality_score: score,
        }
    }

    fn page(index: u32, status: PageStatus) -> PageReport {
        PageReport {
            status,
            ..PageReport::pending(
                index,
                format!("https://www.linkedin.com/jobs/search?start={}", index * 25),
            )
        }
    }

    #[test]
    fn test_empty_run_is_zero_safe() {
        let session = HarvestSession::new(Vec::new());
        let summary = HarvestSummary::from_session(&session, &[], 0, BackoffSnapshot::default(), 0);
        assert_eq!(summary.total_records, 0);
        assert!(summary.average_quality_score.abs() < f64::EPSILON);
        assert!(summary.field_completion_rates.values().all(|r| *r == 0.0));
        assert!(summary.top_companies.is_empty());
        assert!(serde_json::to_string(&summary).is_ok());
    }

    #[test]
    fn test_page_counts() {
        let session = HarvestSession::new(vec![
            page(0, PageStatus::Succeeded),
            page(1, PageStatus::Blocked),
            page(2, PageStatus::Failed(FetchErrorKind::Transient)),
            page(3, PageStatus::Abandoned),
            page(4, PageStatus::NotAttempted),
        ]);
        let summary = HarvestSummary::from_session(&session, &[], 0, BackoffSnapshot::default(), 1);
        assert_eq!(summary.pages_requested, 5);
        assert_eq!(summary.pages_attempted, 3);
        assert_eq!(summary.pages_failed, 1);
        assert_eq!(summary.pages_not_attempted, 1);
        assert_eq!(summary.failures_by_kind.get(&FetchErrorKind::Transient), Some(&1));
    }

    #[test]
    fn test_quality_metrics() {
        let records = vec![
            record("Acme", Some("Berlin"), 0.9),
            record("Acme", None, 0.6),
            record("Globex", Some("Berlin"), 0.3),
        ];
        let session = HarvestSession::new(Vec::new());
        let summary = HarvestSummary::from_session(&session, &records, 2, BackoffSnapshot::default(), 0);
        assert!((summary.average_quality_score - 0.6).abs() < 1e-9);
        assert_eq!(
            summary.quality_distribution,
            QualityDistribution { high: 1, medium: 1, low: 1 }
        );
        assert!((summary.field_completion_rates[&JobField::Location] - 2.0 / 3.0).abs() < 1e-9);
        assert!((summary.field_completion_rates[&JobField::Title] - 1.0).abs() < f64::EPSILON);
        assert_eq!(summary.top_companies[0], ("Acme".to_string(), 2));
        assert_eq!(summary.top_locations, vec![("Berlin".to_string(), 2)]);
        assert_eq!(summary.duplicates_removed, 2);
    }

    #[test]
    fn test_discard_after_resets_later_pages() {
        let mut session = HarvestSession::new(vec![
            page(0, PageStatus::Succeeded),
            page(1, PageStatus::Blocked),
            page(2, PageStatus::Succeeded),
        ]);
        session.pages[0].tally.accepted = 1;
        session.pages[2].tally = PageTally {
            listings: 3,
            accepted: 2,
            spam_rejections: 1,
            ..PageTally::default()
        };
        session.accepted = vec![
            (2, record("Late", None, 0.7)),
            (0, record("Early", None, 0.7)),
            (2, record("Later", None, 0.7)),
        ];

        assert_eq!(session.discard_after(1), 2);
        assert_eq!(session.accepted_records()[0].company, "Early");
        assert_eq!(session.pages[2].status, PageStatus::NotAttempted);
        assert_eq!(session.pages[1].status, PageStatus::Blocked);

        let summary = HarvestSummary::from_session(
            &session,
            &session.accepted_records(),
            0,
            BackoffSnapshot::default(),
            0,
        );
        assert_eq!(summary.records_accepted, 1);
        assert_eq!(summary.listings_extracted, 0);
        assert_eq!(summary.spam_rejections, 0);
        assert_eq!(summary.pages_not_attempted, 1);
    }

    #[test]
    fn test_page_status_serialization() {
        let json = serde_json::to_string(&PageStatus::Failed(FetchErrorKind::NotFound)).expect("serialize");
        assert_eq!(json, r#"{"state":"failed","kind":"not_found"}"#);
    }
}
