//! Shared types used across the harvester.
//!
//! This module defines the record shape handed to output writers together
//! with the small enums that describe where each value came from.

use crate::error::HarvestError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Regional listing site. Selects the base domain every page is fetched from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Region {
    /// United States
    #[default]
    Us,
    /// United Kingdom
    Uk,
    /// Canada
    Ca,
    /// Australia
    Au,
    /// Germany
    De,
    /// France
    Fr,
    /// Spain
    Es,
    /// Italy
    It,
    /// India
    In,
    /// Brazil
    Br,
    /// Japan
    Jp,
    /// Singapore
    Sg,
}

impl Region {
    /// Every supported region.
    pub const ALL: [Region; 12] = [
        Self::Us,
        Self::Uk,
        Self::Ca,
        Self::Au,
        Self::De,
        Self::Fr,
        Self::Es,
        Self::It,
        Self::In,
        Self::Br,
        Self::Jp,
        Self::Sg,
    ];

    /// Two-letter region code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Us => "US",
            Self::Uk => "UK",
            Self::Ca => "CA",
            Self::Au => "AU",
            Self::De => "DE",
            Self::Fr => "FR",
            Self::Es => "ES",
            Self::It => "IT",
            Self::In => "IN",
            Self::Br => "BR",
            Self::Jp => "JP",
            Self::Sg => "SG",
        }
    }

    /// Listing site domain for this region.
    #[must_use]
    pub fn base_domain(&self) -> &'static str {
        match self {
            Self::Us => "www.linkedin.com",
            Self::Uk => "uk.linkedin.com",
            Self::Ca => "ca.linkedin.com",
            Self::Au => "au.linkedin.com",
            Self::De => "de.linkedin.com",
            Self::Fr => "fr.linkedin.com",
            Self::Es => "es.linkedin.com",
            Self::It => "it.linkedin.com",
            Self::In => "in.linkedin.com",
            Self::Br => "br.linkedin.com",
            Self::Jp => "jp.linkedin.com",
            Self::Sg => "sg.linkedin.com",
        }
    }

    /// `https://` origin for this region.
    #[must_use]
    pub fn base_url(&self) -> String {
        format!("https://{}", self.base_domain())
    }

    /// Parse a region code, falling back to [`Region::Us`] for unknown codes.
    #[must_use]
    pub fn from_code_or_default(code: &str) -> Self {
        code.parse().unwrap_or_else(|_| {
            tracing::warn!(code, "unknown region code, falling back to US");
            Self::default()
        })
    }
}

impl FromStr for Region {
    type Err = HarvestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let code = s.trim().to_ascii_uppercase();
        // GB is the ISO code; the listing site uses UK.
        let code = if code == "GB" { "UK".to_string() } else { code };
        Self::ALL
            .into_iter()
            .find(|r| r.code() == code)
            .ok_or_else(|| HarvestError::UnknownRegion(s.to_string()))
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// The fixed set of fields a job record is scored on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobField {
    /// Job title
    Title,
    /// Hiring company
    Company,
    /// Job location
    Location,
    /// Canonical listing URL
    SourceUrl,
    /// Raw posting date ("2025-01-02", "3 days ago")
    PostedDate,
    /// Free-text description
    Description,
    /// Requirements list
    Requirements,
    /// Responsibilities list
    Responsibilities,
    /// Benefits list
    Benefits,
    /// Salary text
    SalaryInfo,
    /// Applicant count text
    ApplicantCount,
    /// Seniority level
    ExperienceLevel,
    /// Full-time, contract, ...
    EmploymentType,
    /// Remote, hybrid, on-site
    RemoteWorkOption,
    /// Company headcount band
    CompanySize,
    /// Company industry
    CompanyIndustry,
}

impl JobField {
    /// Every scored field, core fields first.
    pub const ALL: [JobField; 16] = [
        Self::Title,
        Self::Company,
        Self::Location,
        Self::SourceUrl,
        Self::PostedDate,
        Self::Description,
        Self::Requirements,
        Self::Responsibilities,
        Self::Benefits,
        Self::SalaryInfo,
        Self::ApplicantCount,
        Self::ExperienceLevel,
        Self::EmploymentType,
        Self::RemoteWorkOption,
        Self::CompanySize,
        Self::CompanyIndustry,
    ];

    /// Optional fields whose extraction can be switched off per run.
    pub const EXTENDED: [JobField; 11] = [
        Self::Description,
        Self::Requirements,
        Self::Responsibilities,
        Self::Benefits,
        Self::SalaryInfo,
        Self::ApplicantCount,
        Self::ExperienceLevel,
        Self::EmploymentType,
        Self::RemoteWorkOption,
        Self::CompanySize,
        Self::CompanyIndustry,
    ];

    /// Core fields carry more weight in the quality score.
    #[must_use]
    pub fn is_core(&self) -> bool {
        matches!(
            self,
            Self::Title | Self::Company | Self::Location | Self::SourceUrl | Self::PostedDate
        )
    }

    /// List-shaped fields are stored as ordered string sequences.
    #[must_use]
    pub fn is_list(&self) -> bool {
        matches!(
            self,
            Self::Requirements | Self::Responsibilities | Self::Benefits
        )
    }

    /// Stable snake_case name, used as the key in completion-rate maps.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Title => "title",
            Self::Company => "company",
            Self::Location => "location",
            Self::SourceUrl => "source_url",
            Self::PostedDate => "posted_date",
            Self::Description => "description",
            Self::Requirements => "requirements",
            Self::Responsibilities => "responsibilities",
            Self::Benefits => "benefits",
            Self::SalaryInfo => "salary_info",
            Self::ApplicantCount => "applicant_count",
            Self::ExperienceLevel => "experience_level",
            Self::EmploymentType => "employment_type",
            Self::RemoteWorkOption => "remote_work_option",
            Self::CompanySize => "company_size",
            Self::CompanyIndustry => "company_industry",
        }
    }
}

impl fmt::Display for JobField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Extraction strategy that produced a value, ordered from most to least trusted.
///
/// The derived `Ord` is the trust order: a larger value is a coarser strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMethod {
    /// Page-embedded machine-readable metadata (JSON-LD)
    StructuredData,
    /// Known layout anchors matched by CSS selectors
    Markup,
    /// Loose text patterns
    Fallback,
}

impl ExtractionMethod {
    /// The less trusted of two strategies.
    #[must_use]
    pub fn coarsest(self, other: Self) -> Self {
        self.max(other)
    }

    /// Stable snake_case name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StructuredData => "structured_data",
            Self::Markup => "markup",
            Self::Fallback => "fallback",
        }
    }
}

impl fmt::Display for ExtractionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One harvested, validated job listing.
///
/// Built by the validator from a raw extraction result. `title`, `company`
/// and `source_url` are never empty on a constructed record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    /// Canonical listing URL; the identity key
    pub source_url: String,
    pub title: String,
    pub company: String,
    pub location: Option<String>,
    /// Loosely normalised; formats vary and may be relative
    pub posted_date: Option<String>,
    pub description: Option<String>,
    pub requirements: Option<Vec<String>>,
    pub responsibilities: Option<Vec<String>>,
    pub benefits: Option<Vec<String>>,
    pub salary_info: Option<String>,
    pub applicant_count: Option<String>,
    pub experience_level: Option<String>,
    pub employment_type: Option<String>,
    pub remote_work_option: Option<String>,
    pub company_size: Option<String>,
    pub company_industry: Option<String>,
    /// Coarsest strategy used across all present fields
    pub extraction_method: ExtractionMethod,
    /// Strategy chosen per present field
    pub field_methods: BTreeMap<JobField, ExtractionMethod>,
    pub data_source_region: Region,
    pub harvested_at: DateTime<Utc>,
    /// Weighted completeness/validity in [0, 1]
    pub data_quality_score: f64,
}

impl JobRecord {
    /// Whether a field holds a value. Empty lists count as absent.
    #[must_use]
    pub fn field_present(&self, field: JobField) -> bool {
        match field {
            JobField::Title => !self.title.is_empty(),
            JobField::Company => !self.company.is_empty(),
            JobField::SourceUrl => !self.source_url.is_empty(),
            JobField::Requirements => self.requirements.as_ref().is_some_and(|v| !v.is_empty()),
            JobField::Responsibilities => self
                .responsibilities
                .as_ref()
                .is_some_and(|v| !v.is_empty()),
            JobField::Benefits => self.benefits.as_ref().is_some_and(|v| !v.is_empty()),
            _ => self.text(field).is_some(),
        }
    }

    /// Text value of a scalar field. List fields return `None`.
    #[must_use]
    pub fn text(&self, field: JobField) -> Option<&str> {
        match field {
            JobField::Title => Some(self.title.as_str()),
            JobField::Company => Some(self.company.as_str()),
            JobField::SourceUrl => Some(self.source_url.as_str()),
            JobField::Location => self.location.as_deref(),
            JobField::PostedDate => self.posted_date.as_deref(),
            JobField::Description => self.description.as_deref(),
            JobField::SalaryInfo => self.salary_info.as_deref(),
            JobField::ApplicantCount => self.applicant_count.as_deref(),
            JobField::ExperienceLevel => self.experience_level.as_deref(),
            JobField::EmploymentType => self.employment_type.as_deref(),
            JobField::RemoteWorkOption => self.remote_work_option.as_deref(),
            JobField::CompanySize => self.company_size.as_deref(),
            JobField::CompanyIndustry => self.company_industry.as_deref(),
            JobField::Requirements | JobField::Responsibilities | JobField::Benefits => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> JobRecord {
        JobRecord {
            source_url: "https://www.linkedin.com/jobs/view/123".to_string(),
            title: "Backend Engineer".to_string(),
            company: "Acme".to_string(),
            location: Some("Berlin, Germany".to_string()),
            posted_date: None,
            description: None,
            requirements: Some(vec![]),
            responsibilities: Some(vec!["Ship code".to_string()]),
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
            data_source_region: Region::De,
            harvested_at: Utc::now(),
            data_quality_score: 0.0,
        }
    }

    #[test]
    fn test_region_parse() {
        assert_eq!("us".parse::<Region>().expect("parse us"), Region::Us);
        assert_eq!("GB".parse::<Region>().expect("parse gb"), Region::Uk);
        assert!("XX".parse::<Region>().is_err());
        assert_eq!(Region::from_code_or_default("nowhere"), Region::Us);
    }

    #[test]
    fn test_region_domains() {
        assert_eq!(Region::Us.base_url(), "https://www.linkedin.com");
        assert_eq!(Region::Jp.base_domain(), "jp.linkedin.com");
        for region in Region::ALL {
            assert!(region.base_domain().ends_with("linkedin.com"));
        }
    }

    #[test]
    fn test_region_serialization() {
        let json = serde_json::to_string(&Region::Uk).expect("serialize region");
        assert_eq!(json, "\"UK\"");
    }

    #[test]
    fn test_extraction_method_trust_order() {
        assert_eq!(
            ExtractionMethod::StructuredData.coarsest(ExtractionMethod::Markup),
            ExtractionMethod::Markup
        );
        assert_eq!(
            ExtractionMethod::Fallback.coarsest(ExtractionMethod::StructuredData),
            ExtractionMethod::Fallback
        );
    }

    #[test]
    fn test_field_sets() {
        assert_eq!(JobField::ALL.iter().filter(|f| f.is_core()).count(), 5);
        assert!(JobField::EXTENDED.iter().all(|f| !f.is_core()));
        assert_eq!(
            serde_json::to_string(&JobField::RemoteWorkOption).expect("serialize field"),
            "\"remote_work_option\""
        );
    }

    #[test]
    fn test_field_present_distinguishes_empty_lists() {
        let rec = record();
        assert!(rec.field_present(JobField::Location));
        assert!(!rec.field_present(JobField::PostedDate));
        assert!(!rec.field_present(JobField::Requirements));
        assert!(rec.field_present(JobField::Responsibilities));
    }
}
