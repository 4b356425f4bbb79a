//! Fallback strategy: loose text patterns over the raw markup and visible text.
//!
//! Used only for fields that neither JSON-LD nor the selector anchors
//! produced. Values found here are the least trusted.

use super::FieldValue;
use crate::clean::{clean_company, clean_text, strip_html};
use jobharvest_core::JobField;
use once_cell::sync::Lazy;
use regex::Regex;

static HEADING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<h([1-4])[^>]*>(.*?)</h[1-4]>").expect("Heading regex is hardcoded and valid")
});

static COMPANY_JSON: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#""companyName"\s*:\s*"([^"]{2,})"|data-company-name="([^"]{2,})""#)
        .expect("Company regex is hardcoded and valid")
});

static LOCATION_JSON: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#""formattedLocation"\s*:\s*"([^"]{2,})"|data-location="([^"]{2,})""#)
        .expect("Location regex is hardcoded and valid")
});

static VIEW_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"https?://[^"'\s<>]*/jobs/view/[^"'\s<>]+"#)
        .expect("View URL regex is hardcoded and valid")
});

static POSTING_URN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"urn:li:jobPosting:(\d+)").expect("Posting URN regex is hardcoded and valid")
});

static RELATIVE_DATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(\d+|an?)\s+(minute|hour|day|week|month)s?\s+ago\b")
        .expect("Relative date regex is hardcoded and valid")
});

static ISO_DATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(\d{4}-\d{2}-\d{2})\b").expect("ISO date regex is hardcoded and valid")
});

static META_DESCRIPTION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)<meta\s+[^>]*name="description"[^>]*content="([^"]+)""#)
        .expect("Meta description regex is hardcoded and valid")
});

static SALARY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)[$\x{20ac}\x{a3}]\s?\d[\d,.]*\s*k?(?:\s*[-\x{2013}]\s*[$\x{20ac}\x{a3}]?\s?\d[\d,.]*\s*k?)?(?:\s*/\s*(?:yr|year|hr|hour|month|mo))?",
    )
    .expect("Salary regex is hardcoded and valid")
});

static APPLICANTS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(\d[\d,]*)\s+applicants?\b").expect("Applicant regex is hardcoded and valid")
});

static EXPERIENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(internship|entry level|associate|mid-senior level|director|executive)\b")
        .expect("Experience regex is hardcoded and valid")
});

static EMPLOYMENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(full-time|part-time|contract|temporary|volunteer)\b")
        .expect("Employment regex is hardcoded and valid")
});

static REMOTE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(remote|hybrid|on-site)\b").expect("Remote regex is hardcoded and valid")
});

static COMPANY_SIZE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(\d[\d,]*(?:\s*-\s*\d[\d,]*|\+)?)\s+employees\b")
        .expect("Company size regex is hardcoded and valid")
});

static INDUSTRY_JSON: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#""industry"\s*:\s*"([^"]{2,})""#).expect("Industry regex is hardcoded and valid")
});

/// First non-empty capture group of the first match.
fn capture(regex: &Regex, haystack: &str) -> Option<String> {
    regex.captures_iter(haystack).find_map(|caps| {
        caps.iter()
            .skip(1)
            .flatten()
            .map(|m| clean_text(m.as_str()))
            .find(|s| !s.is_empty())
    })
}

fn whole_match(regex: &Regex, haystack: &str) -> Option<String> {
    regex
        .find(haystack)
        .map(|m| clean_text(m.as_str()))
        .filter(|s| !s.is_empty())
}

fn title(html: &str) -> Option<String> {
    HEADING
        .captures_iter(html)
        .filter_map(|caps| caps.get(2).map(|m| clean_text(&strip_html(m.as_str()))))
        .find(|t| t.chars().count() >= 3)
}

fn source_url(html: &str, base_url: &str) -> Option<String> {
    if let Some(found) = VIEW_URL.find(html) {
        return Some(found.as_str().replace("&amp;", "&"));
    }
    let id = capture(&POSTING_URN, html)?;
    Some(format!("{}/jobs/view/{id}", base_url.trim_end_matches('/')))
}

/// Value of `field` from loose patterns.
///
/// `html` is the listing markup with JSON-LD blocks removed; `visible` is its
/// visible text.
pub(crate) fn extract_field(
    html: &str,
    visible: &str,
    field: JobField,
    base_url: &str,
) -> Option<FieldValue> {
    let text = match field {
        JobField::Title => title(html),
        JobField::Company => capture(&COMPANY_JSON, html)
            .map(|c| clean_company(&c))
            .filter(|c| !c.is_empty()),
        JobField::Location => capture(&LOCATION_JSON, html),
        JobField::SourceUrl => source_url(html, base_url),
        JobField::PostedDate => {
            whole_match(&RELATIVE_DATE, visible).or_else(|| capture(&ISO_DATE, visible))
        }
        JobField::Description => capture(&META_DESCRIPTION, html).map(|d| strip_html(&d)),
        JobField::SalaryInfo => whole_match(&SALARY, visible),
        JobField::ApplicantCount => {
            capture(&APPLICANTS, visible).map(|n| format!("{n} applicants"))
        }
        JobField::ExperienceLevel => capture(&EXPERIENCE, visible),
        JobField::EmploymentType => capture(&EMPLOYMENT, visible),
        JobField::RemoteWorkOption => capture(&REMOTE, visible),
        JobField::CompanySize => capture(&COMPANY_SIZE, visible).map(|n| format!("{n} employees")),
        JobField::CompanyIndustry => capture(&INDUSTRY_JSON, html),
        JobField::Requirements | JobField::Responsibilities | JobField::Benefits => None,
    };
    text.map(FieldValue::Text)
}
