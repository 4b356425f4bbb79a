//! Extraction pipeline: turns fetched pages into raw records.
//!
//! Every field runs through the same fixed chain of strategies,
//! [`STRATEGY_ORDER`], and keeps the first non-empty value. The strategy that
//! produced each value is recorded so the validator can carry it into the
//! final record.

mod fallback;
mod markup;
pub mod selectors;
pub mod structured;

pub use selectors::SelectorSet;

use crate::clean::strip_html;
use crate::error::Result;
use crate::fetch::Page;
use crate::validate::canonicalize_url;
use chrono::{DateTime, Utc};
use jobharvest_core::{ExtractionConfig, ExtractionMethod, JobField, Region};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::Html;
use selectors::CompiledSelectors;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

/// Strategies in the order they are tried for every field.
pub const STRATEGY_ORDER: [ExtractionMethod; 3] = [
    ExtractionMethod::StructuredData,
    ExtractionMethod::Markup,
    ExtractionMethod::Fallback,
];

static LD_JSON_BLOCK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)<script[^>]*application/ld\+json[^>]*>.*?</script>"#)
        .expect("JSON-LD block regex is hardcoded and valid")
});

static NON_VISIBLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<script\b[^>]*>.*?</script>|<style\b[^>]*>.*?</style>")
        .expect("Script/style regex is hardcoded and valid")
});

/// An extracted value: scalar text or an ordered list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    /// Single text value
    Text(String),
    /// Ordered items, e.g. job insights
    List(Vec<String>),
}

impl FieldValue {
    /// Blank text, or a list of only blank items.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Text(text) => text.trim().is_empty(),
            Self::List(items) => items.iter().all(|i| i.trim().is_empty()),
        }
    }
}

/// A value together with the strategy that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedField {
    /// Cleaned value
    pub value: FieldValue,
    /// Strategy that produced it
    pub method: ExtractionMethod,
}

/// Attempted fields that no strategy produced.
///
/// Not an error: the record still goes to validation and simply scores lower.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionIncomplete {
    /// Missing fields, in attempt order
    pub missing: Vec<JobField>,
}

/// Output of extraction for one listing, before validation.
///
/// Fields no strategy produced are absent from `fields`; they are never
/// stored as empty strings.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRecord {
    /// Values found, keyed by field
    pub fields: BTreeMap<JobField, ExtractedField>,
    /// Fields the configuration asked for, in [`JobField::ALL`] order
    pub attempted: Vec<JobField>,
    /// Region the listing was harvested from
    pub region: Region,
    /// When extraction ran
    pub harvested_at: DateTime<Utc>,
}

impl RawRecord {
    /// An empty record for `region`, attempting every field.
    #[must_use]
    pub fn new(region: Region) -> Self {
        Self {
            fields: BTreeMap::new(),
            attempted: JobField::ALL.to_vec(),
            region,
            harvested_at: Utc::now(),
        }
    }

    /// Builder-style insert, mostly for tests and hand-built records.
    #[must_use]
    pub fn with_field(mut self, field: JobField, value: FieldValue, method: ExtractionMethod) -> Self {
        self.fields.insert(field, ExtractedField { value, method });
        self
    }

    /// Text value; `None` for absent or list-valued fields.
    #[must_use]
    pub fn text(&self, field: JobField) -> Option<&str> {
        match &self.fields.get(&field)?.value {
            FieldValue::Text(text) => Some(text.as_str()),
            FieldValue::List(_) => None,
        }
    }

    /// List value; a scalar value for a list field is returned as one item.
    #[must_use]
    pub fn list(&self, field: JobField) -> Option<Vec<String>> {
        match &self.fields.get(&field)?.value {
            FieldValue::List(items) => Some(items.clone()),
            FieldValue::Text(text) => Some(vec![text.clone()]),
        }
    }

    /// Strategy that produced `field`.
    #[must_use]
    pub fn method(&self, field: JobField) -> Option<ExtractionMethod> {
        self.fields.get(&field).map(|f| f.method)
    }

    /// Coarsest strategy across present fields; `Fallback` when nothing was found.
    #[must_use]
    pub fn extraction_method(&self) -> ExtractionMethod {
        self.fields
            .values()
            .map(|f| f.method)
            .reduce(ExtractionMethod::coarsest)
            .unwrap_or(ExtractionMethod::Fallback)
    }

    /// Attempted fields that came back empty, if any.
    #[must_use]
    pub fn incompleteness(&self) -> Option<ExtractionIncomplete> {
        let missing: Vec<JobField> = self
            .attempted
            .iter()
            .copied()
            .filter(|f| !self.fields.contains_key(f))
            .collect();
        (!missing.is_empty()).then_some(ExtractionIncomplete { missing })
    }
}

/// One listing's inputs to the strategy chain.
#[derive(Debug, Clone)]
pub struct Listing {
    /// The listing's JSON-LD `JobPosting`, when the page embeds one
    pub structured: Option<Value>,
    /// The listing's markup: a job card or a whole detail page
    pub html: Option<String>,
    /// Used to absolutize relative links
    pub base_url: String,
    /// Region the listing belongs to
    pub region: Region,
}

impl Listing {
    /// Markup-only listing with the region's base URL.
    #[must_use]
    pub fn from_html(html: impl Into<String>, region: Region) -> Self {
        Self {
            structured: None,
            html: Some(html.into()),
            base_url: region.base_url(),
            region,
        }
    }
}

/// Per-listing parsed state shared by the strategies.
struct ListingContext<'a> {
    posting: Option<&'a Value>,
    document: Option<Html>,
    /// Markup without JSON-LD blocks, and its visible text
    loose: Option<(String, String)>,
    base_url: &'a str,
}

impl<'a> ListingContext<'a> {
    fn new(listing: &'a Listing) -> Self {
        let document = listing.html.as_deref().map(Html::parse_document);
        let loose = listing.html.as_deref().map(|html| {
            let without_ld = LD_JSON_BLOCK.replace_all(html, " ").into_owned();
            let visible = strip_html(&NON_VISIBLE.replace_all(html, " "));
            (without_ld, visible)
        });
        Self {
            posting: listing.structured.as_ref(),
            document,
            loose,
            base_url: &listing.base_url,
        }
    }
}

/// Applies the strategy chain to listings.
#[derive(Debug)]
pub struct ExtractionPipeline {
    selectors: CompiledSelectors,
    config: ExtractionConfig,
}

impl ExtractionPipeline {
    /// Compile the selector set. Fails on a selector that does not parse.
    pub fn new(selectors: SelectorSet, config: ExtractionConfig) -> Result<Self> {
        Ok(Self {
            selectors: CompiledSelectors::compile(&selectors)?,
            config,
        })
    }

    fn run_strategy(
        &self,
        method: ExtractionMethod,
        field: JobField,
        ctx: &ListingContext<'_>,
    ) -> Option<FieldValue> {
        match method {
            ExtractionMethod::StructuredData => ctx
                .posting
                .and_then(|posting| structured::extract_field(posting, field)),
            ExtractionMethod::Markup => ctx.document.as_ref().and_then(|document| {
                markup::extract_field(document, &self.selectors, field, ctx.base_url)
            }),
            ExtractionMethod::Fallback => ctx.loose.as_ref().and_then(|(html, visible)| {
                fallback::extract_field(html, visible, field, ctx.base_url)
            }),
        }
    }

    /// Extract every attempted field of one listing.
    #[must_use]
    pub fn extract(&self, listing: &Listing) -> RawRecord {
        let ctx = ListingContext::new(listing);
        let attempted: Vec<JobField> = JobField::ALL
            .iter()
            .copied()
            .filter(|f| self.config.attempts(*f))
            .collect();

        let mut fields = BTreeMap::new();
        for &field in &attempted {
            let found = STRATEGY_ORDER.iter().find_map(|&method| {
                self.run_strategy(method, field, &ctx)
                    .filter(|value| !value.is_empty())
                    .map(|value| ExtractedField { value, method })
            });
            if let Some(extracted) = found {
                fields.insert(field, extracted);
            }
        }

        let record = RawRecord {
            fields,
            attempted,
            region: listing.region,
            harvested_at: Utc::now(),
        };
        tracing::trace!(
            method = %record.extraction_method(),
            fields = record.fields.len(),
            "Extracted listing"
        );
        record
    }

    /// Canonical URL of a card, from its markup.
    fn card_url(&self, card: &str, base_url: &str) -> Option<String> {
        let document = Html::parse_document(card);
        match markup::extract_field(&document, &self.selectors, JobField::SourceUrl, base_url) {
            Some(FieldValue::Text(url)) => canonicalize_url(&url),
            _ => None,
        }
    }

    /// Split a page into listings.
    ///
    /// Job cards are paired with JSON-LD postings that share their canonical
    /// URL; unpaired postings become listings of their own. A page with no
    /// cards and a single posting is one listing with the whole page as
    /// markup, as is a card-less detail page whose markup has a title.
    #[must_use]
    pub fn listings(&self, page: &Page, region: Region) -> Vec<Listing> {
        let base_url = region.base_url();
        let document = Html::parse_document(&page.body);
        let postings = structured::find_job_postings(&document);
        let cards: Vec<String> = self
            .selectors
            .job_cards
            .iter()
            .map(|selector| document.select(selector).map(|el| el.html()).collect::<Vec<_>>())
            .find(|found| !found.is_empty())
            .unwrap_or_default();

        let listing = |structured: Option<Value>, html: Option<String>| Listing {
            structured,
            html,
            base_url: base_url.clone(),
            region,
        };

        if cards.is_empty() {
            return match postings.len() {
                0 => {
                    let has_title = markup::extract_field(
                        &document,
                        &self.selectors,
                        JobField::Title,
                        &base_url,
                    )
                    .is_some();
                    if has_title {
                        vec![listing(None, Some(page.body.clone()))]
                    } else {
                        Vec::new()
                    }
                }
                1 => postings
                    .into_iter()
                    .map(|posting| listing(Some(posting), Some(page.body.clone())))
                    .collect(),
                _ => postings
                    .into_iter()
                    .map(|posting| listing(Some(posting), None))
                    .collect(),
            };
        }

        let mut by_url: HashMap<String, Value> = HashMap::new();
        let mut unkeyed = Vec::new();
        for posting in postings {
            match posting
                .get("url")
                .and_then(Value::as_str)
                .and_then(canonicalize_url)
            {
                Some(url) => {
                    by_url.entry(url).or_insert(posting);
                }
                None => unkeyed.push(posting),
            }
        }

        let mut listings = Vec::with_capacity(cards.len() + by_url.len() + unkeyed.len());
        for card in cards {
            let structured = self
                .card_url(&card, &base_url)
                .and_then(|url| by_url.remove(&url));
            listings.push(listing(structured, Some(card)));
        }
        let mut leftover: Vec<(String, Value)> = by_url.into_iter().collect();
        leftover.sort_by(|a, b| a.0.cmp(&b.0));
        listings.extend(leftover.into_iter().map(|(_, posting)| listing(Some(posting), None)));
        listings.extend(unkeyed.into_iter().map(|posting| listing(Some(posting), None)));
        listings
    }

    /// Extract every listing on a page.
    #[must_use]
    pub fn extract_page(&self, page: &Page, region: Region) -> Vec<RawRecord> {
        let records: Vec<RawRecord> = self
            .listings(page, region)
            .iter()
            .map(|listing| self.extract(listing))
            .collect();
        tracing::debug!(url = %page.url, listings = records.len(), "Extracted page");
        records
    }
}
