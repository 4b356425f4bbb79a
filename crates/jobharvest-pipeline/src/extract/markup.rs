//! Markup strategy: CSS selectors against known layout anchors.

use super::selectors::CompiledSelectors;
use super::FieldValue;
use crate::clean::{clean_company, clean_text};
use jobharvest_core::JobField;
use scraper::{ElementRef, Html, Selector};

/// Minimum length for selector text to count as a value.
const MIN_TEXT_LEN: usize = 2;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Section {
    Requirements,
    Responsibilities,
    Benefits,
}

fn element_text(element: &ElementRef<'_>) -> String {
    clean_text(&element.text().collect::<Vec<_>>().join(" "))
}

/// First element matching the selectors in priority order.
fn first_element<'a>(root: ElementRef<'a>, selectors: &[Selector]) -> Option<ElementRef<'a>> {
    selectors.iter().find_map(|s| root.select(s).next())
}

/// Text of the first element, in selector priority order, with usable text.
fn first_text(root: ElementRef<'_>, selectors: &[Selector]) -> Option<String> {
    selectors.iter().find_map(|selector| {
        root.select(selector)
            .map(|el| element_text(&el))
            .find(|text| text.chars().count() >= MIN_TEXT_LEN)
    })
}

fn absolutize(href: &str, base_url: &str) -> Option<String> {
    let href = href.trim();
    if href.starts_with("http://") || href.starts_with("https://") {
        Some(href.to_string())
    } else if href.starts_with('/') {
        Some(format!("{}{}", base_url.trim_end_matches('/'), href))
    } else {
        None
    }
}

fn job_url(root: ElementRef<'_>, selectors: &CompiledSelectors, base_url: &str) -> Option<String> {
    selectors.job_url.iter().find_map(|selector| {
        root.select(selector)
            .filter_map(|el| el.value().attr("href"))
            .find_map(|href| absolutize(href, base_url))
    })
}

fn posted_date(root: ElementRef<'_>, selectors: &CompiledSelectors) -> Option<String> {
    let element = first_element(root, &selectors.posted_date)?;
    element
        .value()
        .attr("datetime")
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(str::to_string)
        .or_else(|| Some(element_text(&element)).filter(|t| !t.is_empty()))
}

fn insights(root: ElementRef<'_>, selectors: &CompiledSelectors) -> Vec<String> {
    selectors
        .insights
        .iter()
        .flat_map(|selector| root.select(selector))
        .map(|el| element_text(&el))
        .filter(|t| !t.is_empty())
        .collect()
}

/// Value of a "Seniority level" style criteria row whose header contains `label`.
fn criterion(root: ElementRef<'_>, selectors: &CompiledSelectors, label: &str) -> Option<String> {
    selectors
        .criteria_item
        .iter()
        .flat_map(|selector| root.select(selector))
        .find_map(|item| {
            let header = first_text(item, &selectors.criteria_header)?;
            if !header.to_lowercase().contains(label) {
                return None;
            }
            first_text(item, &selectors.criteria_value)
        })
}

fn section_for(heading: &str) -> Option<Section> {
    let heading = heading.to_lowercase();
    if heading.contains("requirement")
        || heading.contains("qualification")
        || heading.contains("what you bring")
        || heading.contains("skills")
    {
        Some(Section::Requirements)
    } else if heading.contains("responsibilit")
        || heading.contains("what you'll do")
        || heading.contains("what you will do")
        || heading.contains("duties")
    {
        Some(Section::Responsibilities)
    } else if heading.contains("benefit") || heading.contains("perks") || heading.contains("we offer") {
        Some(Section::Benefits)
    } else {
        None
    }
}

/// List items of the description grouped under the last heading seen.
fn description_section(
    root: ElementRef<'_>,
    selectors: &CompiledSelectors,
    wanted: Section,
) -> Option<Vec<String>> {
    let description = first_element(root, &selectors.description)?;
    let mut current = None;
    let mut items = Vec::new();

    for node in description.descendants() {
        let Some(element) = ElementRef::wrap(node) else {
            continue;
        };
        match element.value().name() {
            "h1" | "h2" | "h3" | "h4" | "strong" | "b" => {
                let heading = element_text(&element);
                // Bold text inside a bullet is emphasis, not a heading
                if !element_is_in_list(&element) {
                    current = section_for(&heading).or(current.filter(|_| heading.is_empty()));
                }
            }
            "li" if current == Some(wanted) => {
                let text = element_text(&element);
                if !text.is_empty() {
                    items.push(text);
                }
            }
            _ => {}
        }
    }

    (!items.is_empty()).then_some(items)
}

fn element_is_in_list(element: &ElementRef<'_>) -> bool {
    element
        .ancestors()
        .filter_map(ElementRef::wrap)
        .any(|a| a.value().name() == "li")
}

/// Value of `field` from the listing's markup.
pub(crate) fn extract_field(
    document: &Html,
    selectors: &CompiledSelectors,
    field: JobField,
    base_url: &str,
) -> Option<FieldValue> {
    let root = document.root_element();
    let text = match field {
        JobField::Title => first_text(root, &selectors.title),
        JobField::Company => first_text(root, &selectors.company)
            .map(|c| clean_company(&c))
            .filter(|c| !c.is_empty()),
        JobField::Location => first_text(root, &selectors.location),
        JobField::SourceUrl => job_url(root, selectors, base_url),
        JobField::PostedDate => posted_date(root, selectors),
        JobField::Description => first_element(root, &selectors.description)
            .map(|el| element_text(&el))
            .filter(|t| !t.is_empty()),
        JobField::Requirements => {
            return description_section(root, selectors, Section::Requirements).map(FieldValue::List)
        }
        JobField::Responsibilities => {
            return description_section(root, selectors, Section::Responsibilities)
                .map(FieldValue::List)
        }
        JobField::Benefits => {
            return description_section(root, selectors, Section::Benefits).map(FieldValue::List)
        }
        JobField::SalaryInfo => first_text(root, &selectors.salary),
        JobField::ApplicantCount => first_text(root, &selectors.applicant_count)
            .filter(|t| t.to_lowercase().contains("applicant")),
        JobField::ExperienceLevel => criterion(root, selectors, "seniority"),
        JobField::EmploymentType => criterion(root, selectors, "employment type"),
        JobField::CompanyIndustry => criterion(root, selectors, "industr"),
        JobField::RemoteWorkOption => insights(root, selectors).into_iter().find_map(|insight| {
            let lowered = insight.to_lowercase();
            ["remote", "hybrid", "on-site"]
                .into_iter()
                .find(|option| lowered.contains(option))
                .map(|_| insight)
        }),
        JobField::CompanySize => insights(root, selectors)
            .into_iter()
            .find(|insight| insight.to_lowercase().contains("employees")),
    };
    text.map(FieldValue::Text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::selectors::SelectorSet;

    const CARD: &str = r#"
        <div class="base-card" data-entity-urn="urn:li:jobPosting:3812345678">
            <a class="base-card__full-link" href="https://www.linkedin.com/jobs/view/senior-rust-engineer-3812345678?refId=abc&trackingId=xyz"></a>
            <h3 class="base-search-card__title">  Senior Rust Engineer  New </h3>
            <h4 class="base-search-card__subtitle"><a href="/company/acme">Acme Robotics - Hiring now</a></h4>
            <div class="base-search-card__metadata">
                <span class="job-search-card__location">Berlin, Germany</span>
                <span class="job-search-card__salary-info">€90,000 - €120,000</span>
                <time class="job-search-card__listdate" datetime="2025-01-02">2 weeks ago</time>
            </div>
            <ul>
                <li class="job-search-card__job-insight">Hybrid</li>
                <li class="job-search-card__job-insight">201-500 employees</li>
            </ul>
            <span class="num-applicants__caption">Over 200 applicants</span>
        </div>"#;

    const DETAIL: &str = r#"
        <section>
            <div class="show-more-less-html__markup">
                <p>We build robots.</p>
                <strong>Responsibilities</strong>
                <ul><li>Ship firmware</li><li>Review <b>code</b></li></ul>
                <strong>Requirements</strong>
                <ul><li>Rust</li><li>Tokio</li></ul>
                <h3>Benefits</h3>
                <ul><li>Pension</li></ul>
            </div>
            <ul>
                <li class="description__job-criteria-item">
                    <h3 class="description__job-criteria-subheader">Seniority level</h3>
                    <span class="description__job-criteria-text">Mid-Senior level</span>
                </li>
                <li class="description__job-criteria-item">
                    <h3 class="description__job-criteria-subheader">Employment type</h3>
                    <span class="description__job-criteria-text">Full-time</span>
                </li>
                <li class="description__job-criteria-item">
                    <h3 class="description__job-criteria-subheader">Industries</h3>
                    <span class="description__job-criteria-text">Robotics Engineering</span>
                </li>
            </ul>
        </section>"#;

    fn extract(html: &str, field: JobField) -> Option<FieldValue> {
        let selectors = CompiledSelectors::compile(&SelectorSet::default()).expect("compile defaults");
        extract_field(&Html::parse_document(html), &selectors, field, "https://www.linkedin.com")
    }

    fn text(html: &str, field: JobField) -> Option<String> {
        match extract(html, field)? {
            FieldValue::Text(t) => Some(t),
            FieldValue::List(_) => None,
        }
    }

    #[test]
    fn test_card_fields() {
        assert_eq!(text(CARD, JobField::Title).as_deref(), Some("Senior Rust Engineer"));
        assert_eq!(text(CARD, JobField::Company).as_deref(), Some("Acme Robotics"));
        assert_eq!(text(CARD, JobField::Location).as_deref(), Some("Berlin, Germany"));
        assert_eq!(text(CARD, JobField::PostedDate).as_deref(), Some("2025-01-02"));
        assert_eq!(text(CARD, JobField::SalaryInfo).as_deref(), Some("€90,000 - €120,000"));
        assert_eq!(text(CARD, JobField::RemoteWorkOption).as_deref(), Some("Hybrid"));
        assert_eq!(text(CARD, JobField::CompanySize).as_deref(), Some("201-500 employees"));
        assert_eq!(text(CARD, JobField::ApplicantCount).as_deref(), Some("Over 200 applicants"));
        assert!(text(CARD, JobField::SourceUrl)
            .is_some_and(|u| u.starts_with("https://www.linkedin.com/jobs/view/senior-rust-engineer-3812345678")));
    }

    #[test]
    fn test_relative_url_is_absolutized() {
        let html = r#"<div><a href="/jobs/view/42">x</a></div>"#;
        assert_eq!(
            text(html, JobField::SourceUrl).as_deref(),
            Some("https://www.linkedin.com/jobs/view/42")
        );
    }

    #[test]
    fn test_criteria_rows() {
        assert_eq!(text(DETAIL, JobField::ExperienceLevel).as_deref(), Some("Mid-Senior level"));
        assert_eq!(text(DETAIL, JobField::EmploymentType).as_deref(), Some("Full-time"));
        assert_eq!(text(DETAIL, JobField::CompanyIndustry).as_deref(), Some("Robotics Engineering"));
    }

    #[test]
    fn test_description_sections() {
        assert_eq!(
            extract(DETAIL, JobField::Responsibilities),
            Some(FieldValue::List(vec!["Ship firmware".to_string(), "Review code".to_string()]))
        );
        assert_eq!(
            extract(DETAIL, JobField::Requirements),
            Some(FieldValue::List(vec!["Rust".to_string(), "Tokio".to_string()]))
        );
        assert_eq!(
            extract(DETAIL, JobField::Benefits),
            Some(FieldValue::List(vec!["Pension".to_string()]))
        );
    }

    #[test]
    fn test_missing_anchor_is_absent() {
        assert!(extract("<div><p>nothing here</p></div>", JobField::Title).is_none());
        assert!(extract(CARD, JobField::Requirements).is_none());
    }
}
