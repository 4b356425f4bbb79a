//! Text normalisation shared by extraction and validation.

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::Html;

static WHITESPACE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+").expect("Whitespace regex is hardcoded and valid"));

static TRAILING_BADGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\s*\b(?:new|hiring|actively recruiting)\s*$")
        .expect("Badge regex is hardcoded and valid")
});

static COMPANY_NOISE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\s*(?:-|\x{2013}|\x{2014})\s*hiring now.*$|\s*\|.*$")
        .expect("Company noise regex is hardcoded and valid")
});

/// Trim and collapse internal whitespace runs to one space.
#[must_use]
pub fn collapse_whitespace(text: &str) -> String {
    WHITESPACE.replace_all(text.trim(), " ").into_owned()
}

/// Collapse whitespace and strip trailing "new"/"hiring" badges.
#[must_use]
pub fn clean_text(text: &str) -> String {
    let collapsed = collapse_whitespace(text);
    TRAILING_BADGE.replace(&collapsed, "").trim().to_string()
}

/// [`clean_text`] plus removal of "- Hiring now" and "| tagline" suffixes.
#[must_use]
pub fn clean_company(text: &str) -> String {
    let cleaned = clean_text(text);
    COMPANY_NOISE.replace(&cleaned, "").trim().to_string()
}

/// Cut `text` to at most `max` characters on a char boundary.
#[must_use]
pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((byte_index, _)) => text[..byte_index].trim_end().to_string(),
        None => text.to_string(),
    }
}

/// Whether `text` contains at least one letter.
#[must_use]
pub fn has_letters(text: &str) -> bool {
    text.chars().any(char::is_alphabetic)
}

/// Visible text of an HTML fragment, whitespace-collapsed.
#[must_use]
pub fn strip_html(fragment: &str) -> String {
    if !fragment.contains('<') {
        return collapse_whitespace(fragment);
    }
    let parsed = Html::parse_fragment(fragment);
    let text: Vec<&str> = parsed.root_element().text().collect();
    collapse_whitespace(&text.join(" "))
}
