use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Window size advertised by an identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

/// One entry of the identity pool: a browser build with its full header set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrowserProfile {
    pub name: String,
    pub user_agent: String,
    pub accept_language: String,
    pub headers: Vec<(String, String)>,
    pub viewport: Viewport,
}

/// A browser-like client identity presented to the listing site.
///
/// `slot` is the identity's position in the pool; the rotator uses it to
/// tell whether a block report concerns the identity currently in use.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub slot: usize,
    pub profile_name: String,
    pub user_agent: String,
    pub accept_language: String,
    pub headers: Vec<(String, String)>,
    pub viewport: Viewport,
}

impl Identity {
    pub(crate) fn from_profile(slot: usize, profile: &BrowserProfile) -> Self {
        Self {
            slot,
            profile_name: profile.name.clone(),
            user_agent: profile.user_agent.clone(),
            accept_language: profile.accept_language.clone(),
            headers: profile.headers.clone(),
            viewport: profile.viewport,
        }
    }

    /// Value of a header by case-insensitive name.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Clone, Copy)]
enum Family {
    Chrome,
    Firefox,
    Edge,
}

struct Profile {
    name: &'static str,
    family: Family,
    platform: &'static str,
    user_agent: &'static str,
}

const PROFILES: [Profile; 10] = [
    Profile {
        name: "chrome-windows",
        family: Family::Chrome,
        platform: "\"Windows\"",
        user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    },
    Profile {
        name: "chrome-macos",
        family: Family::Chrome,
        platform: "\"macOS\"",
        user_agent: "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    },
    Profile {
        name: "chrome-linux",
        family: Family::Chrome,
        platform: "\"Linux\"",
        user_agent: "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36",
    },
    Profile {
        name: "chrome-windows-119",
        family: Family::Chrome,
        platform: "\"Windows\"",
        user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36",
    },
    Profile {
        name: "firefox-windows",
        family: Family::Firefox,
        platform: "Windows",
        user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0",
    },
    Profile {
        name: "firefox-macos",
        family: Family::Firefox,
        platform: "macOS",
        user_agent: "Mozilla/5.0 (Macintosh; Intel Mac OS X 10.15; rv:121.0) Gecko/20100101 Firefox/121.0",
    },
    Profile {
        name: "firefox-linux",
        family: Family::Firefox,
        platform: "Linux",
        user_agent: "Mozilla/5.0 (X11; Linux x86_64; rv:120.0) Gecko/20100101 Firefox/120.0",
    },
    Profile {
        name: "firefox-windows-119",
        family: Family::Firefox,
        platform: "Windows",
        user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:109.0) Gecko/20100101 Firefox/119.0",
    },
    Profile {
        name: "edge-windows",
        family: Family::Edge,
        platform: "\"Windows\"",
        user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36 Edg/120.0.0.0",
    },
    Profile {
        name: "edge-macos",
        family: Family::Edge,
        platform: "\"macOS\"",
        user_agent: "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36 Edg/120.0.0.0",
    },
];

// Common desktop viewport sizes
const VIEWPORTS: [(u32, u32); 5] = [(1920, 1080), (1366, 768), (1536, 864), (1440, 900), (1280, 720)];

const POOL_SEED: u64 = 0x6a6f_6268_6172_7665;

/// Build the identity pool, pairing each profile with one of `languages`
/// and a viewport.
///
/// The pairing is drawn from a fixed seed, so the pool (and therefore the
/// rotation sequence) is identical for identical input. An empty language
/// list falls back to `en-US`.
#[must_use]
pub fn identity_pool(languages: &[String]) -> Vec<BrowserProfile> {
    let fallback = ["en-US".to_string()];
    let languages = if languages.is_empty() {
        &fallback[..]
    } else {
        languages
    };
    let mut rng = StdRng::seed_from_u64(POOL_SEED);

    PROFILES
        .iter()
        .map(|profile| {
            let accept_language = accept_language(&languages[rng.gen_range(0..languages.len())]);
            let (width, height) = VIEWPORTS[rng.gen_range(0..VIEWPORTS.len())];
            BrowserProfile {
                name: profile.name.to_string(),
                user_agent: profile.user_agent.to_string(),
                headers: headers_for(profile, &accept_language),
                accept_language,
                viewport: Viewport { width, height },
            }
        })
        .collect()
}

/// `de-DE` becomes `de-DE,de;q=0.9,en;q=0.8`.
fn accept_language(tag: &str) -> String {
    let primary = tag.split('-').next().unwrap_or(tag);
    if primary == "en" {
        format!("{tag},en;q=0.9")
    } else {
        format!("{tag},{primary};q=0.9,en;q=0.8")
    }
}

fn headers_for(profile: &Profile, accept_language: &str) -> Vec<(String, String)> {
    let mut headers = vec![
        (
            "Accept".to_string(),
            "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8".to_string(),
        ),
        ("Accept-Language".to_string(), accept_language.to_string()),
        ("Accept-Encoding".to_string(), "gzip, deflate, br".to_string()),
        ("Upgrade-Insecure-Requests".to_string(), "1".to_string()),
        ("Sec-Fetch-Dest".to_string(), "document".to_string()),
        ("Sec-Fetch-Mode".to_string(), "navigate".to_string()),
        ("Sec-Fetch-Site".to_string(), "none".to_string()),
    ];

    match profile.family {
        Family::Chrome | Family::Edge => {
            let brand = match profile.family {
                Family::Edge => "\"Microsoft Edge\";v=\"120\"",
                _ => "\"Google Chrome\";v=\"120\"",
            };
            headers.push((
                "Sec-Ch-Ua".to_string(),
                format!("\"Not_A Brand\";v=\"8\", \"Chromium\";v=\"120\", {brand}"),
            ));
            headers.push(("Sec-Ch-Ua-Mobile".to_string(), "?0".to_string()));
            headers.push(("Sec-Ch-Ua-Platform".to_string(), profile.platform.to_string()));
        }
        Family::Firefox => {
            headers.push(("DNT".to_string(), "1".to_string()));
            headers.push(("Pragma".to_string(), "no-cache".to_string()));
        }
    }

    headers
}
