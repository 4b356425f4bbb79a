//! Layout anchors for the markup strategy.
//!
//! Each field has an ordered list of CSS selectors; the first one that yields
//! usable text wins. The lists are plain data so a markup change on the site
//! can be handled by configuration.

use crate::error::{PipelineError, Result};
use scraper::Selector;
use serde::{Deserialize, Serialize};

fn list(selectors: &[&str]) -> Vec<String> {
    selectors.iter().map(|s| (*s).to_string()).collect()
}

/// Selector lists per field, in priority order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorSet {
    /// Each job card on a results page
    pub job_cards: Vec<String>,
    /// Link to the job's detail page
    pub job_url: Vec<String>,
    /// Job title
    pub title: Vec<String>,
    /// Hiring company
    pub company: Vec<String>,
    /// Job location
    pub location: Vec<String>,
    /// Posting date, preferably a `datetime` attribute
    pub posted_date: Vec<String>,
    /// Salary text
    pub salary: Vec<String>,
    /// Job insight items
    pub insights: Vec<String>,
    /// Applicant count text
    pub applicant_count: Vec<String>,
    /// Full description on a detail page
    pub description: Vec<String>,
    /// One criteria row on a detail page
    pub criteria_item: Vec<String>,
    /// Criteria row label
    pub criteria_header: Vec<String>,
    /// Criteria row value
    pub criteria_value: Vec<String>,
}

impl Default for SelectorSet {
    fn default() -> Self {
        Self {
            job_cards: list(&[
                "div.job-search-card",
                "div.base-card",
                "li.result-card",
                "div.jobs-search-results__list-item",
                "div[data-entity-urn*=\"jobPosting\"]",
                "li[data-occludable-job-id]",
                "div.scaffold-layout__list-item",
                "article.job-card",
                ".job-result-card",
                "[data-job-id]",
            ]),
            job_url: list(&[
                "a[href*=\"/jobs/view/\"]",
                "a.base-card__full-link",
                "h3 a[href]",
                ".job-title-link[href]",
                "a[data-entity-urn*=\"jobPosting\"]",
                "a[href*=\"linkedin.com/jobs\"]",
                "[data-job-id] a",
            ]),
            title: list(&[
                "h3.base-search-card__title a",
                "h3.job-search-card__title a",
                "h3 a[data-cy=\"job-title\"]",
                ".job-title-link",
                "a[data-cy=\"job-title\"]",
                ".base-search-card__title",
                ".result-card__title a",
                "h2.job-title a",
                ".job-card__title a",
                "h1.top-card-layout__title",
                "h3 > a",
            ]),
            company: list(&[
                "h4.base-search-card__subtitle a",
                "h4.job-search-card__subtitle-link",
                "h4 a[data-cy=\"job-company-name\"]",
                ".job-search-card__subtitle-link",
                "a[data-cy=\"job-company-name\"]",
                ".base-search-card__subtitle",
                ".result-card__subtitle",
                ".company-name-link",
                "a.topcard__org-name-link",
                "h4 > a",
                ".job-card__company-name a",
            ]),
            location: list(&[
                ".job-search-card__location",
                "[data-cy=\"job-location\"]",
                ".result-card__location",
                ".base-search-card__metadata .job-search-card__location",
                ".job-location",
                ".location-text",
                "span.topcard__flavor--bullet",
            ]),
            posted_date: list(&[
                "time[datetime]",
                ".job-search-card__listdate",
                ".job-result-card__listdate",
                ".posted-time-ago",
                "[data-cy=\"posting-date\"]",
            ]),
            salary: list(&[
                ".job-search-card__salary-info",
                ".salary-snippet",
                ".job-insight[data-test-id*=\"salary\"]",
                ".compensation-text",
                "[data-test-id=\"job-salary\"]",
                ".salary.compensation__salary",
            ]),
            insights: list(&[
                "li.job-search-card__job-insight",
                ".job-insights-container li",
                ".job-criteria li",
                ".job-benefits li",
                "[data-cy=\"job-insight\"]",
            ]),
            applicant_count: list(&[
                ".num-applicants__caption",
                ".job-search-card__subtitle-wrapper",
                ".applicant-count",
                ".num-applicants",
                "[data-cy=\"applicant-count\"]",
            ]),
            description: list(&[
                ".show-more-less-html__markup",
                ".description__text",
                ".jobs-description__content",
                "[data-cy=\"job-description\"]",
                ".job-description",
            ]),
            criteria_item: list(&["li.description__job-criteria-item", ".job-criteria__item"]),
            criteria_header: list(&["h3.description__job-criteria-subheader", ".job-criteria__subtitle"]),
            criteria_value: list(&["span.description__job-criteria-text", ".job-criteria__text"]),
        }
    }
}

/// A [`SelectorSet`] parsed once.
#[derive(Debug)]
pub(crate) struct CompiledSelectors {
    pub job_cards: Vec<Selector>,
    pub job_url: Vec<Selector>,
    pub title: Vec<Selector>,
    pub company: Vec<Selector>,
    pub location: Vec<Selector>,
    pub posted_date: Vec<Selector>,
    pub salary: Vec<Selector>,
    pub insights: Vec<Selector>,
    pub applicant_count: Vec<Selector>,
    pub description: Vec<Selector>,
    pub criteria_item: Vec<Selector>,
    pub criteria_header: Vec<Selector>,
    pub criteria_value: Vec<Selector>,
}

fn compile(selectors: &[String]) -> Result<Vec<Selector>> {
    selectors
        .iter()
        .map(|s| {
            Selector::parse(s).map_err(|e| PipelineError::InvalidSelector {
                selector: s.clone(),
                reason: e.to_string(),
            })
        })
        .collect()
}

impl CompiledSelectors {
    pub(crate) fn compile(set: &SelectorSet) -> Result<Self> {
        Ok(Self {
            job_cards: compile(&set.job_cards)?,
            job_url: compile(&set.job_url)?,
            title: compile(&set.title)?,
            company: compile(&set.company)?,
            location: compile(&set.location)?,
            posted_date: compile(&set.posted_date)?,
            salary: compile(&set.salary)?,
            insights: compile(&set.insights)?,
            applicant_count: compile(&set.applicant_count)?,
            description: compile(&set.description)?,
            criteria_item: compile(&set.criteria_item)?,
            criteria_header: compile(&set.criteria_header)?,
            criteria_value: compile(&set.criteria_value)?,
        })
    }
}
