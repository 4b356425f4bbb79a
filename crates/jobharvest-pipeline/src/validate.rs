//! Validation, normalisation and quality scoring.

use crate::clean::{clean_company, clean_text, has_letters, truncate_chars};
use crate::error::ValidationRejected;
use crate::extract::RawRecord;
use chrono::{NaiveDate, NaiveDateTime};
use jobharvest_core::{ExtractionConfig, ExtractionMethod, JobField, JobRecord, ValidationConfig};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use url::Url;

/// Query parameters kept on a canonical URL; everything else is tracking.
const KEPT_QUERY_PARAMS: [&str; 2] = ["currentJobId", "jobId"];

static RELATIVE_DATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(just now|today|yesterday|(minute|hour|day|week|month|year)s?\s+ago)\b")
        .expect("Relative date regex is hardcoded and valid")
});

/// Canonical form of a listing URL, or `None` if it is not a usable http(s) URL.
///
/// Forces https, drops the fragment and every query parameter except job ids,
/// and trims a trailing slash.
#[must_use]
pub fn canonicalize_url(raw: &str) -> Option<String> {
    let mut url = Url::parse(raw.trim()).ok()?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().map_or(true, str::is_empty) {
        return None;
    }
    if url.scheme() == "http" {
        url.set_scheme("https").ok()?;
    }
    url.set_fragment(None);

    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| KEPT_QUERY_PARAMS.contains(&key.as_ref()))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if kept.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(kept);
    }

    let path = url.path().to_string();
    if path.len() > 1 && path.ends_with('/') {
        url.set_path(path.trim_end_matches('/'));
    }
    Some(url.to_string())
}

/// Whether a posted-date string is an ISO date/time or a relative phrase.
fn is_parseable_date(text: &str) -> bool {
    let text = text.trim();
    NaiveDate::parse_from_str(text, "%Y-%m-%d").is_ok()
        || NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S").is_ok()
        || chrono::DateTime::parse_from_rfc3339(text).is_ok()
        || RELATIVE_DATE.is_match(text)
}

fn has_digit(text: &str) -> bool {
    text.chars().any(|c| c.is_ascii_digit())
}

/// Turns raw records into validated, scored [`JobRecord`]s.
#[derive(Debug, Clone)]
pub struct Validator {
    config: ValidationConfig,
    extraction: ExtractionConfig,
    banned_upper: Vec<String>,
}

impl Validator {
    /// Validator with default extraction limits.
    #[must_use]
    pub fn new(config: ValidationConfig) -> Self {
        let banned_upper = config
            .banned_title_tokens
            .iter()
            .map(|t| t.to_uppercase())
            .collect();
        Self {
            config,
            extraction: ExtractionConfig::default(),
            banned_upper,
        }
    }

    /// Fields switched off here are left out of the score's denominator.
    #[must_use]
    pub fn with_extraction(mut self, extraction: ExtractionConfig) -> Self {
        self.extraction = extraction;
        self
    }

    fn text(raw: &RawRecord, field: JobField) -> Option<String> {
        raw.text(field)
            .map(clean_text)
            .filter(|t| !t.is_empty())
    }

    fn list(raw: &RawRecord, field: JobField) -> Option<Vec<String>> {
        let items: Vec<String> = raw
            .list(field)?
            .iter()
            .map(|item| clean_text(item))
            .filter(|item| !item.is_empty())
            .collect();
        (!items.is_empty()).then_some(items)
    }

    fn check_spam(&self, title: &str) -> Result<(), ValidationRejected> {
        if title.chars().count() < self.config.min_title_length {
            return Err(ValidationRejected::Spam(format!(
                "title '{title}' shorter than {} characters",
                self.config.min_title_length
            )));
        }
        if self.config.spam_detection_enabled {
            let upper = title.to_uppercase();
            if let Some(token) = self.banned_upper.iter().find(|t| upper.contains(t.as_str())) {
                return Err(ValidationRejected::Spam(format!(
                    "title '{title}' contains banned token '{token}'"
                )));
            }
        }
        Ok(())
    }

    /// Normalise and score a raw record, or say why it was dropped.
    pub fn validate_and_score(&self, raw: RawRecord) -> Result<JobRecord, ValidationRejected> {
        let title = Self::text(&raw, JobField::Title)
            .ok_or_else(|| ValidationRejected::Structural("missing title".to_string()))?;
        let company = raw
            .text(JobField::Company)
            .map(clean_company)
            .filter(|c| !c.is_empty())
            .ok_or_else(|| ValidationRejected::Structural("missing company".to_string()))?;
        if company.chars().count() < self.config.min_company_length || !has_letters(&company) {
            return Err(ValidationRejected::Structural(format!(
                "company '{company}' is not a name"
            )));
        }
        let source_url = raw
            .text(JobField::SourceUrl)
            .and_then(canonicalize_url)
            .ok_or_else(|| {
                ValidationRejected::Structural(format!(
                    "missing or malformed source URL {:?}",
                    raw.text(JobField::SourceUrl)
                ))
            })?;

        self.check_spam(&title)?;
        let title = truncate_chars(&title, self.config.max_title_length);

        let field_methods = raw
            .fields
            .iter()
            .map(|(field, extracted)| (*field, extracted.method))
            .collect::<BTreeMap<_, _>>();

        let mut record = JobRecord {
            source_url,
            title,
            company,
            location: Self::text(&raw, JobField::Location),
            posted_date: Self::text(&raw, JobField::PostedDate),
            description: Self::text(&raw, JobField::Description),
            requirements: Self::list(&raw, JobField::Requirements),
            responsibilities: Self::list(&raw, JobField::Responsibilities),
            benefits: Self::list(&raw, JobField::Benefits),
            salary_info: Self::text(&raw, JobField::SalaryInfo),
            applicant_count: Self::text(&raw, JobField::ApplicantCount),
            experience_level: Self::text(&raw, JobField::ExperienceLevel),
            employment_type: Self::text(&raw, JobField::EmploymentType),
            remote_work_option: Self::text(&raw, JobField::RemoteWorkOption),
            company_size: Self::text(&raw, JobField::CompanySize),
            company_industry: Self::text(&raw, JobField::CompanyIndustry),
            extraction_method: raw.extraction_method(),
            field_methods,
            data_source_region: raw.region,
            harvested_at: raw.harvested_at,
            data_quality_score: 0.0,
        };
        // Normalisation can empty a field; its method goes with it
        let present: Vec<JobField> = JobField::ALL
            .iter()
            .copied()
            .filter(|f| record.field_present(*f))
            .collect();
        record.field_methods.retain(|field, _| present.contains(field));
        if let Some(method) = record
            .field_methods
            .values()
            .copied()
            .reduce(ExtractionMethod::coarsest)
        {
            record.extraction_method = method;
        }
        record.data_quality_score = self.score(&record);
        Ok(record)
    }

    /// Presence/validity indicator of one field in [0, 1].
    fn indicator(record: &JobRecord, field: JobField) -> f64 {
        if !record.field_present(field) {
            return 0.0;
        }
        let valid = match field {
            JobField::PostedDate => record.text(field).is_some_and(is_parseable_date),
            JobField::Location => record.text(field).is_some_and(has_letters),
            JobField::SalaryInfo | JobField::ApplicantCount | JobField::CompanySize => {
                record.text(field).is_some_and(has_digit)
            }
            JobField::SourceUrl => canonicalize_url(&record.source_url).is_some(),
            _ => true,
        };
        if valid {
            1.0
        } else {
            0.5
        }
    }

    /// Weighted average of the per-field indicators over attempted fields.
    #[must_use]
    pub fn score(&self, record: &JobRecord) -> f64 {
        let (weighted, total) = JobField::ALL
            .iter()
            .filter(|f| self.extraction.attempts(**f))
            .fold((0.0, 0.0), |(weighted, total), &field| {
                let weight = self.config.scoring.weight(field);
                (weighted + weight * Self::indicator(record, field), total + weight)
            });
        if total <= 0.0 {
            return 0.0;
        }
        (weighted / total).clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::FieldValue;
    use jobharvest_core::Region;

    fn text(value: &str) -> FieldValue {
        FieldValue::Text(value.to_string())
    }

    fn minimal() -> RawRecord {
        RawRecord::new(Region::Us)
            .with_field(JobField::Title, text("  Rust   Engineer "), ExtractionMethod::Markup)
            .with_field(JobField::Company, text("Acme - Hiring now"), ExtractionMethod::Markup)
            .with_field(
                JobField::SourceUrl,
                text("http://www.linkedin.com/jobs/view/123/?trk=public&refId=x#top"),
                ExtractionMethod::Markup,
            )
    }

    fn full() -> RawRecord {
        let s = ExtractionMethod::StructuredData;
        minimal()
            .with_field(JobField::Location, text("Berlin, Germany"), s)
            .with_field(JobField::PostedDate, text("2025-01-02"), s)
            .with_field(JobField::Description, text("Build things"), s)
            .with_field(JobField::Requirements, FieldValue::List(vec![" Rust ".into(), "".into()]), s)
            .with_field(JobField::Responsibilities, FieldValue::List(vec!["Ship".into()]), s)
            .with_field(JobField::Benefits, FieldValue::List(vec!["Pension".into()]), s)
            .with_field(JobField::SalaryInfo, text("EUR 90000"), s)
            .with_field(JobField::ApplicantCount, text("12 applicants"), s)
            .with_field(JobField::ExperienceLevel, text("Senior"), s)
            .with_field(JobField::EmploymentType, text("Full-time"), s)
            .with_field(JobField::RemoteWorkOption, text("Remote"), s)
            .with_field(JobField::CompanySize, text("51-200 employees"), s)
            .with_field(JobField::CompanyIndustry, text("Software"), s)
    }

    fn validator() -> Validator {
        Validator::new(ValidationConfig::default())
    }

    #[test]
    fn test_normalises_accepted_record() {
        let record = validator().validate_and_score(minimal()).expect("accepted");
        assert_eq!(record.title, "Rust Engineer");
        assert_eq!(record.company, "Acme");
        assert_eq!(record.source_url, "https://www.linkedin.com/jobs/view/123");
        assert!(record.location.is_none());
        assert_eq!(record.extraction_method, ExtractionMethod::Markup);
    }

    #[test]
    fn test_structural_rejections() {
        let v = validator();
        let mut raw = minimal();
        raw.fields.remove(&JobField::Company);
        assert!(matches!(v.validate_and_score(raw), Err(ValidationRejected::Structural(_))));

        let raw = minimal().with_field(JobField::SourceUrl, text("not a url"), ExtractionMethod::Fallback);
        assert!(matches!(v.validate_and_score(raw), Err(ValidationRejected::Structural(_))));

        let raw = minimal().with_field(JobField::Company, text("1234"), ExtractionMethod::Markup);
        assert!(matches!(v.validate_and_score(raw), Err(ValidationRejected::Structural(_))));
    }

    #[test]
    fn test_spam_rejections() {
        let v = validator();
        let raw = minimal().with_field(JobField::Title, text("urgent hire!!"), ExtractionMethod::Markup);
        assert!(matches!(v.validate_and_score(raw), Err(ValidationRejected::Spam(_))));

        let raw = minimal().with_field(JobField::Title, text("Dev \u{1f680}"), ExtractionMethod::Markup);
        assert!(matches!(v.validate_and_score(raw), Err(ValidationRejected::Spam(_))));

        let raw = minimal().with_field(JobField::Title, text("QA"), ExtractionMethod::Markup);
        assert!(matches!(v.validate_and_score(raw), Err(ValidationRejected::Spam(_))));
    }

    #[test]
    fn test_spam_detection_can_be_disabled() {
        let config = ValidationConfig {
            spam_detection_enabled: false,
            ..ValidationConfig::default()
        };
        let raw = minimal().with_field(JobField::Title, text("URGENT hire"), ExtractionMethod::Markup);
        assert!(Validator::new(config).validate_and_score(raw).is_ok());
    }

    #[test]
    fn test_long_title_truncated() {
        let long = "Engineer ".repeat(40);
        let raw = minimal().with_field(JobField::Title, text(&long), ExtractionMethod::Markup);
        let record = validator().validate_and_score(raw).expect("accepted");
        assert!(record.title.chars().count() <= 200);
    }

    #[test]
    fn test_lists_are_trimmed_and_ordered() {
        let record = validator().validate_and_score(full()).expect("accepted");
        assert_eq!(record.requirements, Some(vec!["Rust".to_string()]));
    }

    #[test]
    fn test_full_record_scores_strictly_higher() {
        let v = validator();
        let sparse = v.validate_and_score(minimal()).expect("accepted");
        let rich = v.validate_and_score(full()).expect("accepted");
        assert!(rich.data_quality_score > sparse.data_quality_score);
        assert!((rich.data_quality_score - 1.0).abs() < f64::EPSILON);
        assert!((0.0..=1.0).contains(&sparse.data_quality_score));
    }

    #[test]
    fn test_invalid_value_scores_half() {
        let v = validator();
        let good = v.validate_and_score(full()).expect("accepted");
        let raw = full().with_field(JobField::PostedDate, text("sometime"), ExtractionMethod::Fallback);
        let vague = v.validate_and_score(raw).expect("accepted");
        assert!(vague.data_quality_score < good.data_quality_score);
        assert!(vague.data_quality_score > 0.9);
        assert_eq!(vague.extraction_method, ExtractionMethod::Fallback);
    }

    #[test]
    fn test_unattempted_fields_leave_denominator() {
        let extraction = ExtractionConfig {
            extended_fields: Vec::new(),
        };
        let v = validator().with_extraction(extraction);
        let raw = minimal()
            .with_field(JobField::Location, text("Austin, TX"), ExtractionMethod::Markup)
            .with_field(JobField::PostedDate, text("3 days ago"), ExtractionMethod::Markup);
        let record = v.validate_and_score(raw).expect("accepted");
        assert!((record.data_quality_score - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_canonicalize_url() {
        assert_eq!(
            canonicalize_url("https://WWW.LinkedIn.com/jobs/view/9?currentJobId=9&utm_source=x&trackingId=abc").as_deref(),
            Some("https://www.linkedin.com/jobs/view/9?currentJobId=9")
        );
        assert_eq!(canonicalize_url("ftp://example.com/x"), None);
        assert_eq!(canonicalize_url("/jobs/view/1"), None);
    }

    #[test]
    fn test_date_validity() {
        assert!(is_parseable_date("2025-01-02"));
        assert!(is_parseable_date("2025-01-02T10:00:00Z"));
        assert!(is_parseable_date("3 weeks ago"));
        assert!(!is_parseable_date("soon"));
    }
}
