//! Search-results URL construction per region.

use crate::error::Result;
use crate::filter::SearchFilters;
use jobharvest_core::Region;
use serde::{Deserialize, Serialize};
use url::Url;

/// What to search for.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchQuery {
    /// Free-text keywords
    pub keywords: String,
    /// Location text, empty for none
    pub location: String,
    /// Optional filters
    #[serde(default)]
    pub filters: SearchFilters,
}

impl SearchQuery {
    /// Query with no filters.
    pub fn new(keywords: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            keywords: keywords.into(),
            location: location.into(),
            filters: SearchFilters::default(),
        }
    }
}

/// Search URL for result page `page` (zero-based) on `region`'s domain.
///
/// Page `n` starts at listing `n * page_size`. Empty parameters are omitted.
pub fn build_search_url(
    region: Region,
    query: &SearchQuery,
    page: u32,
    page_size: u32,
) -> Result<Url> {
    let mut url = Url::parse(&format!("{}/jobs/search", region.base_url()))?;

    {
        let mut pairs = url.query_pairs_mut();
        for (key, value) in [("keywords", query.keywords.trim()), ("location", query.location.trim())] {
            if !value.is_empty() {
                pairs.append_pair(key, value);
            }
        }
        pairs.append_pair("sortBy", "R");
        for (key, value) in query.filters.params() {
            pairs.append_pair(key, &value);
        }
        pairs.append_pair("start", &(u64::from(page) * u64::from(page_size)).to_string());
    }

    Ok(url)
}
