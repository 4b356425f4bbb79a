//! Structured-data strategy: schema.org `JobPosting` objects embedded as JSON-LD.

use super::FieldValue;
use crate::clean::{clean_company, clean_text, strip_html};
use jobharvest_core::JobField;
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use serde_json::Value;

static LD_JSON: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(r#"script[type="application/ld+json"]"#)
        .expect("JSON-LD selector is hardcoded and valid")
});

static LIST_ITEM: Lazy<Selector> =
    Lazy::new(|| Selector::parse("li").expect("List item selector is hardcoded and valid"));

/// Every `JobPosting` object in the document's JSON-LD blocks.
///
/// Blocks that fail to parse are skipped; postings nested in arrays or
/// `@graph` containers are found too.
pub fn find_job_postings(document: &Html) -> Vec<Value> {
    let mut postings = Vec::new();
    for script in document.select(&LD_JSON) {
        let raw: String = script.text().collect();
        match serde_json::from_str::<Value>(raw.trim()) {
            Ok(value) => collect_postings(value, &mut postings),
            Err(e) => tracing::debug!("Skipping unparseable JSON-LD block: {}", e),
        }
    }
    postings
}

fn collect_postings(value: Value, out: &mut Vec<Value>) {
    match value {
        Value::Array(items) => {
            for item in items {
                collect_postings(item, out);
            }
        }
        Value::Object(mut map) => {
            if let Some(graph) = map.remove("@graph") {
                collect_postings(graph, out);
            }
            let is_posting = match map.get("@type") {
                Some(Value::String(t)) => t == "JobPosting",
                Some(Value::Array(types)) => types.iter().any(|t| t == "JobPosting"),
                _ => false,
            };
            if is_posting {
                out.push(Value::Object(map));
            }
        }
        _ => {}
    }
}

/// Render a JSON number without a trailing `.0`.
fn number_text(value: &Value) -> Option<String> {
    let n = value.as_f64()?;
    if n.fract() == 0.0 && n.abs() < 1e15 {
        #[allow(clippy::cast_possible_truncation)]
        return Some(format!("{}", n as i64));
    }
    Some(n.to_string())
}

fn text_of(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => strip_html(s),
        Value::Number(_) => number_text(value)?,
        Value::Object(map) => map.get("name").and_then(text_of)?,
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().filter_map(text_of).collect();
            parts.join(", ")
        }
        _ => return None,
    };
    let text = clean_text(&text);
    (!text.is_empty()).then_some(text)
}

fn list_of(value: &Value) -> Option<Vec<String>> {
    let items: Vec<String> = match value {
        Value::Array(items) => items.iter().filter_map(text_of).collect(),
        Value::String(s) if s.contains("<li") => Html::parse_fragment(s)
            .select(&LIST_ITEM)
            .map(|li| clean_text(&li.text().collect::<Vec<_>>().join(" ")))
            .collect(),
        Value::String(s) => s
            .replace("<br>", "\n")
            .split(['\n', '\u{2022}', ';'])
            .map(|part| clean_text(&strip_html(part)))
            .collect(),
        _ => return None,
    };
    let items: Vec<String> = items.into_iter().filter(|s| !s.is_empty()).collect();
    (!items.is_empty()).then_some(items)
}

fn location(posting: &Value) -> Option<String> {
    let place = match posting.get("jobLocation")? {
        Value::Array(places) => places.first()?.clone(),
        other => other.clone(),
    };
    let address = place.get("address").unwrap_or(&place);
    if let Value::String(s) = address {
        return text_of(&Value::String(s.clone()));
    }
    let parts: Vec<String> = ["addressLocality", "addressRegion", "addressCountry"]
        .iter()
        .filter_map(|key| address.get(*key).and_then(text_of))
        .collect();
    (!parts.is_empty()).then(|| parts.join(", "))
}

fn salary(posting: &Value) -> Option<String> {
    let amount = posting
        .get("baseSalary")
        .or_else(|| posting.get("estimatedSalary"))?;
    if let Some(text) = amount.as_str() {
        return text_of(&Value::String(text.to_string()));
    }
    let currency = amount.get("currency").and_then(Value::as_str).unwrap_or("");
    let value = amount.get("value").unwrap_or(amount);
    let unit = value
        .get("unitText")
        .and_then(Value::as_str)
        .map(str::to_ascii_lowercase);

    let range = match (
        value.get("minValue").and_then(number_text),
        value.get("maxValue").and_then(number_text),
        value.get("value").and_then(number_text).or_else(|| number_text(value)),
    ) {
        (Some(min), Some(max), _) => format!("{min}-{max}"),
        (Some(single), None, _) | (None, Some(single), _) | (None, None, Some(single)) => single,
        (None, None, None) => return None,
    };

    let mut text = format!("{currency} {range}").trim().to_string();
    if let Some(unit) = unit {
        text.push_str(" per ");
        text.push_str(&unit);
    }
    Some(text)
}

fn employment_type(value: &Value) -> Option<String> {
    let humanize = |raw: &str| match raw.trim().to_ascii_uppercase().as_str() {
        "FULL_TIME" => "Full-time".to_string(),
        "PART_TIME" => "Part-time".to_string(),
        "CONTRACTOR" | "CONTRACT" => "Contract".to_string(),
        "TEMPORARY" => "Temporary".to_string(),
        "INTERN" | "INTERNSHIP" => "Internship".to_string(),
        "VOLUNTEER" => "Volunteer".to_string(),
        "PER_DIEM" => "Per diem".to_string(),
        "OTHER" => "Other".to_string(),
        _ => clean_text(raw),
    };
    let parts: Vec<String> = match value {
        Value::String(s) => s.split(',').map(humanize).collect(),
        Value::Array(items) => items.iter().filter_map(Value::as_str).map(humanize).collect(),
        _ => return None,
    };
    let parts: Vec<String> = parts.into_iter().filter(|p| !p.is_empty()).collect();
    (!parts.is_empty()).then(|| parts.join(", "))
}

fn experience(value: &Value) -> Option<String> {
    if let Some(months) = value.get("monthsOfExperience").and_then(number_text) {
        return Some(format!("{months} months of experience"));
    }
    text_of(value)
}

fn company_size(organization: &Value) -> Option<String> {
    let employees = organization.get("numberOfEmployees")?;
    match (
        employees.get("minValue").and_then(number_text),
        employees.get("maxValue").and_then(number_text),
    ) {
        (Some(min), Some(max)) => Some(format!("{min}-{max} employees")),
        (Some(min), None) => Some(format!("{min}+ employees")),
        _ => employees
            .get("value")
            .and_then(number_text)
            .or_else(|| number_text(employees))
            .map(|n| format!("{n} employees")),
    }
}

/// Value of `field` in one posting, if the posting carries it.
pub fn extract_field(posting: &Value, field: JobField) -> Option<FieldValue> {
    let organization = posting.get("hiringOrganization");
    let text = match field {
        JobField::Title => posting.get("title").and_then(text_of),
        JobField::Company => organization
            .and_then(text_of)
            .map(|c| clean_company(&c))
            .filter(|c| !c.is_empty()),
        JobField::Location => location(posting),
        JobField::SourceUrl => posting.get("url").and_then(Value::as_str).map(str::to_string),
        JobField::PostedDate => posting.get("datePosted").and_then(text_of),
        JobField::Description => posting.get("description").and_then(text_of),
        JobField::Requirements => {
            return posting
                .get("qualifications")
                .or_else(|| posting.get("skills"))
                .and_then(list_of)
                .map(FieldValue::List)
        }
        JobField::Responsibilities => {
            return posting
                .get("responsibilities")
                .and_then(list_of)
                .map(FieldValue::List)
        }
        JobField::Benefits => {
            return posting
                .get("jobBenefits")
                .and_then(list_of)
                .map(FieldValue::List)
        }
        JobField::SalaryInfo => salary(posting),
        JobField::ApplicantCount => None,
        JobField::ExperienceLevel => posting.get("experienceRequirements").and_then(experience),
        JobField::EmploymentType => posting.get("employmentType").and_then(employment_type),
        JobField::RemoteWorkOption => posting
            .get("jobLocationType")
            .and_then(Value::as_str)
            .filter(|t| t.eq_ignore_ascii_case("TELECOMMUTE"))
            .map(|_| "Remote".to_string()),
        JobField::CompanySize => organization.and_then(company_size),
        JobField::CompanyIndustry => posting
            .get("industry")
            .or_else(|| organization.and_then(|o| o.get("industry")))
            .and_then(text_of),
    };
    text.map(FieldValue::Text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn posting() -> Value {
        json!({
            "@context": "https://schema.org",
            "@type": "JobPosting",
            "title": "Senior Rust Engineer",
            "url": "https://www.linkedin.com/jobs/view/3812345678",
            "datePosted": "2025-01-02",
            "description": "<p>Build <strong>fast</strong> services.</p>",
            "employmentType": ["FULL_TIME", "CONTRACTOR"],
            "jobLocationType": "TELECOMMUTE",
            "hiringOrganization": {
                "@type": "Organization",
                "name": "Acme Robotics",
                "numberOfEmployees": {"minValue": 201, "maxValue": 500}
            },
            "jobLocation": {
                "@type": "Place",
                "address": {
                    "addressLocality": "Berlin",
                    "addressRegion": "BE",
                    "addressCountry": {"@type": "Country", "name": "Germany"}
                }
            },
            "baseSalary": {
                "@type": "MonetaryAmount",
                "currency": "EUR",
                "value": {"minValue": 90000, "maxValue": 120000.0, "unitText": "YEAR"}
            },
            "qualifications": "<ul><li>5 years Rust</li><li>Async experience</li></ul>",
            "jobBenefits": ["Remote budget", "30 days leave"],
            "industry": "Robotics"
        })
    }

    fn text(field: JobField) -> Option<String> {
        match extract_field(&posting(), field)? {
            FieldValue::Text(t) => Some(t),
            FieldValue::List(_) => None,
        }
    }

    #[test]
    fn test_scalar_fields() {
        assert_eq!(text(JobField::Title).as_deref(), Some("Senior Rust Engineer"));
        assert_eq!(text(JobField::Company).as_deref(), Some("Acme Robotics"));
        assert_eq!(text(JobField::Location).as_deref(), Some("Berlin, BE, Germany"));
        assert_eq!(text(JobField::Description).as_deref(), Some("Build fast services."));
        assert_eq!(text(JobField::EmploymentType).as_deref(), Some("Full-time, Contract"));
        assert_eq!(text(JobField::RemoteWorkOption).as_deref(), Some("Remote"));
        assert_eq!(text(JobField::SalaryInfo).as_deref(), Some("EUR 90000-120000 per year"));
        assert_eq!(text(JobField::CompanySize).as_deref(), Some("201-500 employees"));
        assert_eq!(text(JobField::CompanyIndustry).as_deref(), Some("Robotics"));
        assert!(text(JobField::ApplicantCount).is_none());
    }

    #[test]
    fn test_list_fields() {
        assert_eq!(
            extract_field(&posting(), JobField::Requirements),
            Some(FieldValue::List(vec![
                "5 years Rust".to_string(),
                "Async experience".to_string()
            ]))
        );
        assert_eq!(
            extract_field(&posting(), JobField::Benefits),
            Some(FieldValue::List(vec![
                "Remote budget".to_string(),
                "30 days leave".to_string()
            ]))
        );
    }

    #[test]
    fn test_find_postings_in_graph_and_arrays() {
        let html = format!(
            r#"<html><head>
            <script type="application/ld+json">{{"@graph": [{}, {{"@type": "Organization"}}]}}</script>
            <script type="application/ld+json">[{{"@type": "JobPosting", "title": "Second"}}]</script>
            <script type="application/ld+json">not json</script>
            </head><body></body></html>"#,
            posting()
        );
        let document = Html::parse_document(&html);
        let postings = find_job_postings(&document);
        assert_eq!(postings.len(), 2);
        assert_eq!(postings[1]["title"], "Second");
    }
}
