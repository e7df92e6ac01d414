//! Image lookups across Unsplash, Google Places and Wikimedia Commons
//!
//! Each provider adapter fetches a single image for a request, enforces its own
//! enablement (and, for Unsplash, rate-limit) policy, and derives the attribution
//! that must accompany the image. `Provider` closes over the three adapters so the
//! orchestrator can iterate them in a fixed priority order without caring which
//! one it is talking to.

pub mod orchestrator;
pub mod places;
pub mod rate_limit;
pub mod store;
pub mod unsplash;
pub mod wikimedia;

pub use orchestrator::{MediaAsset, MediaOrchestrator};
pub use places::PlacesAdapter;
pub use rate_limit::SlidingWindowLimiter;
pub use store::{CachedPhoto, DiskPhotoStore, PhotoStore};
pub use unsplash::UnsplashAdapter;
pub use wikimedia::WikimediaAdapter;

use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::sync::OnceLock;
use std::time::Duration;

use crate::config::Config;
use crate::error::{check_status, ServiceError};

/// Content type assumed when an upstream omits the header
const DEFAULT_CONTENT_TYPE: &str = "image/jpeg";

/// The image providers we know how to talk to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Unsplash,
    Places,
    Wikimedia,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Unsplash => "unsplash",
            ProviderKind::Places => "places",
            ProviderKind::Wikimedia => "wikimedia",
        }
    }

    /// Parses a provider name, accepting a few common aliases
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "unsplash" => Some(ProviderKind::Unsplash),
            "places" | "google" | "google-places" | "googleplaces" => Some(ProviderKind::Places),
            "wikimedia" | "commons" | "wikipedia" => Some(ProviderKind::Wikimedia),
            _ => None,
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What to look up
///
/// `id` means a provider-native identifier: an Unsplash photo id, a Google photo
/// reference, or a Commons file title. `url` is only understood by Wikimedia.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageRequest {
    pub id: Option<String>,
    pub query: Option<String>,
    pub url: Option<String>,
    /// Desired width in pixels
    pub width: Option<u32>,
    /// Restrict the lookup to a single provider
    pub provider: Option<ProviderKind>,
}

impl ImageRequest {
    pub fn by_id(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            ..Default::default()
        }
    }

    pub fn by_query(query: impl Into<String>) -> Self {
        Self {
            query: Some(query.into()),
            ..Default::default()
        }
    }

    pub fn by_url(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Default::default()
        }
    }

    pub fn with_width(mut self, width: u32) -> Self {
        self.width = Some(width);
        self
    }

    pub fn with_provider(mut self, provider: ProviderKind) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Whether the request names anything to look up at all
    pub fn is_empty(&self) -> bool {
        [&self.id, &self.query, &self.url]
            .iter()
            .all(|field| field.as_deref().map_or(true, |v| v.trim().is_empty()))
    }
}

/// Provider-side facts about a fetched image, kept for attribution
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageMeta {
    pub author_name: Option<String>,
    pub author_url: Option<String>,
    /// Page describing the image on the provider's site
    pub source_url: Option<String>,
    /// The URL the bytes were downloaded from
    pub image_url: Option<String>,
    pub license: Option<String>,
    /// Google photo reference the image was resolved to
    pub photo_reference: Option<String>,
}

/// A fetched image
#[derive(Debug, Clone)]
pub struct ImageResult {
    pub buffer: Vec<u8>,
    pub content_type: String,
    /// How long the image may be reused before fetching again
    pub ttl: Duration,
    pub meta: ImageMeta,
}

/// Citation that must accompany an image
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributionInfo {
    pub provider: ProviderKind,
    pub attribution_text: String,
    pub attribution_url: String,
    pub license: String,
}

/// One of the supported image providers
#[derive(Debug)]
pub enum Provider {
    Unsplash(UnsplashAdapter),
    Places(PlacesAdapter),
    Wikimedia(WikimediaAdapter),
}

impl Provider {
    /// Builds every adapter in default priority order: Unsplash, Places, Wikimedia
    pub fn all_from_config(config: &Config) -> Vec<Provider> {
        let client = Client::new();
        vec![
            Provider::Unsplash(UnsplashAdapter::with_client(client.clone(), &config.unsplash)),
            Provider::Places(PlacesAdapter::with_client(client.clone(), &config.places)),
            Provider::Wikimedia(WikimediaAdapter::with_client(client, &config.wikimedia)),
        ]
    }

    pub fn kind(&self) -> ProviderKind {
        match self {
            Provider::Unsplash(_) => ProviderKind::Unsplash,
            Provider::Places(_) => ProviderKind::Places,
            Provider::Wikimedia(_) => ProviderKind::Wikimedia,
        }
    }

    pub fn is_enabled(&self) -> bool {
        match self {
            Provider::Unsplash(a) => a.is_enabled(),
            Provider::Places(a) => a.is_enabled(),
            Provider::Wikimedia(a) => a.is_enabled(),
        }
    }

    pub async fn fetch_image(&self, request: &ImageRequest) -> Result<ImageResult, ServiceError> {
        match self {
            Provider::Unsplash(a) => a.fetch_image(request).await,
            Provider::Places(a) => a.fetch_image(request).await,
            Provider::Wikimedia(a) => a.fetch_image(request).await,
        }
    }

    pub fn attribution(&self, request: &ImageRequest, result: &ImageResult) -> AttributionInfo {
        match self {
            Provider::Unsplash(a) => a.attribution(request, result),
            Provider::Places(a) => a.attribution(request, result),
            Provider::Wikimedia(a) => a.attribution(request, result),
        }
    }
}

/// Downloads image bytes, returning them with their content type
pub(crate) async fn download_image(
    client: &Client,
    provider: &str,
    url: &str,
) -> Result<(Vec<u8>, String), ServiceError> {
    tracing::debug!(provider, url, "Downloading image");
    let response = check_status(provider, client.get(url).send().await?)?;
    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string())
        .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string());
    let bytes = response.bytes().await?;
    Ok((bytes.to_vec(), content_type))
}

fn tag_regex() -> Option<&'static Regex> {
    static TAG: OnceLock<Option<Regex>> = OnceLock::new();
    TAG.get_or_init(|| Regex::new(r"<[^>]*>").ok()).as_ref()
}

fn href_regex() -> Option<&'static Regex> {
    static HREF: OnceLock<Option<Regex>> = OnceLock::new();
    HREF.get_or_init(|| Regex::new(r#"(?i)href\s*=\s*(?:"([^"]*)"|'([^']*)')"#).ok())
        .as_ref()
}

/// Removes HTML tags, decodes entities and collapses whitespace
pub(crate) fn strip_html(input: &str) -> String {
    let text = match tag_regex() {
        Some(re) => re.replace_all(input, ""),
        None => Cow::Borrowed(input),
    };
    // Decode after stripping so escaped markup stays text
    let text = html_escape::decode_html_entities(&text);
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Extracts the first `href` value from an HTML fragment
///
/// Entities are decoded and protocol-relative links get an `https:` scheme.
pub(crate) fn first_href(input: &str) -> Option<String> {
    let captures = href_regex()?.captures(input)?;
    let raw = captures.get(1).or_else(|| captures.get(2))?.as_str();
    let href = html_escape::decode_html_entities(raw.trim());
    if href.is_empty() {
        return None;
    }
    Some(match href.strip_prefix("//") {
        Some(rest) => format!("https://{}", rest),
        None => href.into_owned(),
    })
}
