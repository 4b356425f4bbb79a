//! Search filters and their query-string codes.

#![allow(clippy::must_use_candidate)]

use serde::{Deserialize, Serialize};

/// Seniority filter (`f_E`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExperienceLevel {
    /// Internship
    Internship,
    /// Entry level
    EntryLevel,
    /// Associate
    Associate,
    /// Mid-senior level
    MidSenior,
    /// Director
    Director,
    /// Executive
    Executive,
}

impl ExperienceLevel {
    /// Value of the `f_E` parameter.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Internship => "1",
            Self::EntryLevel => "2",
            Self::Associate => "3",
            Self::MidSenior => "4",
            Self::Director => "5",
            Self::Executive => "6",
        }
    }
}

/// Contract type filter (`f_JT`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    /// Full-time
    FullTime,
    /// Part-time
    PartTime,
    /// Contract
    Contract,
    /// Temporary
    Temporary,
    /// Volunteer
    Volunteer,
    /// Internship
    Internship,
    /// Anything else
    Other,
}

impl JobType {
    /// Value of the `f_JT` parameter.
    pub fn code(&self) -> &'static str {
        match self {
            Self::FullTime => "F",
            Self::PartTime => "P",
            Self::Contract => "C",
            Self::Temporary => "T",
            Self::Volunteer => "V",
            Self::Internship => "I",
            Self::Other => "O",
        }
    }
}

/// Posting age filter (`f_TPR`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatePosted {
    /// No age limit; the parameter is omitted
    #[default]
    Any,
    /// Last 24 hours
    PastDay,
    /// Last 7 days
    PastWeek,
    /// Last 30 days
    PastMonth,
}

impl DatePosted {
    /// Value of the `f_TPR` parameter, empty for [`DatePosted::Any`].
    pub fn code(&self) -> &'static str {
        match self {
            Self::Any => "",
            Self::PastDay => "r86400",
            Self::PastWeek => "r604800",
            Self::PastMonth => "r2592000",
        }
    }
}

/// Workplace filter (`f_WT`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkType {
    /// On-site
    OnSite,
    /// Remote
    Remote,
    /// Hybrid
    Hybrid,
}

impl WorkType {
    /// Value of the `f_WT` parameter.
    pub fn code(&self) -> &'static str {
        match self {
            Self::OnSite => "1",
            Self::Remote => "2",
            Self::Hybrid => "3",
        }
    }
}

/// Optional search filters. Unset filters are left out of the URL.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchFilters {
    /// Seniority (`f_E`)
    pub experience_level: Option<ExperienceLevel>,
    /// Contract type (`f_JT`)
    pub job_type: Option<JobType>,
    /// Posting age (`f_TPR`)
    pub date_posted: DatePosted,
    /// Workplace (`f_WT`)
    pub work_type: Option<WorkType>,
    /// Salary band code (`f_SB2`)
    pub salary_min: Option<String>,
    /// Company id (`f_C`)
    pub company: Option<String>,
    /// Industry id (`f_I`)
    pub industry: Option<String>,
    /// Company size code (`f_CF`)
    pub company_size: Option<String>,
}

impl SearchFilters {
    /// Query parameters in the order the listing site expects them.
    pub fn params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("f_TPR", self.date_posted.code().to_string()),
            (
                "f_E",
                self.experience_level
                    .map(|e| e.code().to_string())
                    .unwrap_or_default(),
            ),
            (
                "f_JT",
                self.job_type.map(|j| j.code().to_string()).unwrap_or_default(),
            ),
            ("f_SB2", self.salary_min.clone().unwrap_or_default()),
            ("f_C", self.company.clone().unwrap_or_default()),
            ("f_I", self.industry.clone().unwrap_or_default()),
            ("f_CF", self.company_size.clone().unwrap_or_default()),
            (
                "f_WT",
                self.work_type.map(|w| w.code().to_string()).unwrap_or_default(),
            ),
        ];
        params.retain(|(_, v)| !v.trim().is_empty());
        params
    }
}
