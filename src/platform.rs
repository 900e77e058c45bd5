/// Platform detection and URL pattern matching for the supported site families
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;

/// One of the site families the content script knows how to handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Platform {
    Instagram,
    TikTok,
    YouTube,
    Unsupported,
}

impl Platform {
    /// Tag used by the backend and in log prefixes.
    pub fn tag(&self) -> &'static str {
        match self {
            Platform::Instagram => "INSTAGRAM",
            Platform::TikTok => "TIKTOK",
            Platform::YouTube => "YOUTUBE",
            Platform::Unsupported => "UNSUPPORTED",
        }
    }

    pub fn is_supported(&self) -> bool {
        !matches!(self, Platform::Unsupported)
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Domain fragments, checked in order.
const PLATFORM_DOMAINS: &[(&str, Platform)] = &[
    ("instagram.com", Platform::Instagram),
    ("tiktok.com", Platform::TikTok),
    ("youtube.com", Platform::YouTube),
    ("youtu.be", Platform::YouTube),
];

/// Map a hostname to a platform.
///
/// Total and side-effect free: a hostname that matches nothing is simply
/// `Unsupported`.
pub fn detect(hostname: &str) -> Platform {
    let hostname = hostname.trim().to_lowercase();

    PLATFORM_DOMAINS
        .iter()
        .find(|(domain, _)| hostname.contains(domain))
        .map(|(_, platform)| *platform)
        .unwrap_or(Platform::Unsupported)
}

/// Detect the platform of a full page URL.
pub fn detect_url(href: &str) -> Platform {
    hostname_of(href).map_or(Platform::Unsupported, |host| detect(&host))
}

/// Extract the hostname from a URL string.
///
/// Falls back to a lenient split when the string is not an absolute URL
/// (e.g. "www.tiktok.com/@user/video/123").
pub fn hostname_of(href: &str) -> Option<String> {
    if let Ok(parsed) = url::Url::parse(href.trim()) {
        if let Some(host) = parsed.host_str() {
            return Some(host.to_lowercase());
        }
    }

    let url_clean = href
        .trim()
        .replace("https://", "")
        .replace("http://", "");

    // Everything before the first '/', without the port
    let hostname = url_clean
        .split('/')
        .next()?
        .split(':')
        .next()?
        .to_lowercase();

    if hostname.is_empty() {
        None
    } else {
        Some(hostname)
    }
}

static INSTAGRAM_SHORTCODE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"instagram\.com/(?:[^/?#]+/)?(?:p|reels?)/([A-Za-z0-9_-]+)").expect("valid pattern")
});
static TIKTOK_VIDEO: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"tiktok\.com/@[^/]+/video/(\d+)").expect("valid pattern"));
static YOUTUBE_VIDEO: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:youtube\.com/watch\?(?:[^#]*&)?v=|youtube\.com/shorts/|youtube\.com/embed/|youtu\.be/)([A-Za-z0-9_-]+)")
        .expect("valid pattern")
});

/// Extract the platform-specific content id (post shortcode, video id) from a page URL.
pub fn extract_video_id(platform: Platform, href: &str) -> Option<String> {
    let pattern = match platform {
        Platform::Instagram => &INSTAGRAM_SHORTCODE,
        Platform::TikTok => &TIKTOK_VIDEO,
        Platform::YouTube => &YOUTUBE_VIDEO,
        Platform::Unsupported => return None,
    };

    pattern
        .captures(href)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// YouTube Shorts pages use a different player layout from watch pages.
pub fn is_shorts_url(href: &str) -> bool {
    href.contains("youtube.com/shorts/")
}
