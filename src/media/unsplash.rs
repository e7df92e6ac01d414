//! Unsplash API adapter
//!
//! Looks up a photo by id or by search query, then downloads a width-bounded
//! rendition from the Unsplash CDN. Requests are limited locally with a sliding
//! window (50 per hour by default, the demo-tier quota).

use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use url::Url;

use super::{download_image, AttributionInfo, ImageMeta, ImageRequest, ImageResult, ProviderKind};
use super::rate_limit::SlidingWindowLimiter;
use crate::config::UnsplashConfig;
use crate::error::{check_status, read_json, ServiceError};
use crate::http::endpoint_url;

const PROVIDER: &str = "unsplash";

/// Rolling window for the request quota
const RATE_WINDOW: Duration = Duration::from_secs(60 * 60);

/// Width requested when the caller does not ask for one
const DEFAULT_WIDTH: u32 = 1080;

/// Unsplash photos may be reused for a week
const RESULT_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

#[derive(Debug, Deserialize)]
struct UnsplashPhoto {
    #[allow(dead_code)]
    id: String,
    urls: PhotoUrls,
    user: UnsplashUser,
    #[serde(default)]
    links: Option<PhotoLinks>,
}

#[derive(Debug, Deserialize)]
struct PhotoUrls {
    raw: String,
}

#[derive(Debug, Deserialize)]
struct PhotoLinks {
    html: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UnsplashUser {
    name: String,
    #[serde(default)]
    links: Option<UserLinks>,
}

#[derive(Debug, Deserialize)]
struct UserLinks {
    html: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    results: Vec<UnsplashPhoto>,
}

/// Client for the Unsplash API
#[derive(Debug)]
pub struct UnsplashAdapter {
    client: Client,
    base_url: String,
    access_key: Option<String>,
    app_name: String,
    limiter: SlidingWindowLimiter,
}

impl UnsplashAdapter {
    pub fn new(config: &UnsplashConfig) -> Self {
        Self::with_client(Client::new(), config)
    }

    /// Creates an adapter sharing an existing HTTP client
    pub fn with_client(client: Client, config: &UnsplashConfig) -> Self {
        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            access_key: config.access_key.clone(),
            app_name: config.app_name.clone(),
            limiter: SlidingWindowLimiter::new(config.rate_limit, RATE_WINDOW),
        }
    }

    /// Replaces the request quota
    pub fn with_rate_limit(mut self, max_requests: usize, window: Duration) -> Self {
        self.limiter = SlidingWindowLimiter::new(max_requests, window);
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.access_key.is_some()
    }

    /// Requests left in the current window
    pub fn remaining_requests(&self) -> usize {
        self.limiter.remaining()
    }

    /// Fetches one photo by `id`, or the best match for `query`
    pub async fn fetch_image(&self, request: &ImageRequest) -> Result<ImageResult, ServiceError> {
        let access_key = self
            .access_key
            .as_deref()
            .ok_or_else(|| ServiceError::NotEnabled("Unsplash".to_string()))?;

        self.limiter
            .check()
            .map_err(|reset_at| ServiceError::RateLimited {
                provider: PROVIDER.to_string(),
                reset_at,
            })?;

        let photo = if let Some(id) = request.id.as_deref().filter(|s| !s.is_empty()) {
            self.photo_by_id(id, access_key).await?
        } else if let Some(query) = request.query.as_deref().filter(|s| !s.trim().is_empty()) {
            self.search_photo(query, access_key).await?
        } else {
            return Err(ServiceError::NotFound(
                "Unsplash lookup needs a photo id or query".to_string(),
            ));
        };

        let image_url = sized_url(&photo.urls.raw, request.width.unwrap_or(DEFAULT_WIDTH))?;
        let (buffer, content_type) = download_image(&self.client, PROVIDER, &image_url).await?;

        self.limiter.record();

        Ok(ImageResult {
            buffer,
            content_type,
            ttl: RESULT_TTL,
            meta: ImageMeta {
                author_name: Some(photo.user.name),
                author_url: photo.user.links.and_then(|l| l.html),
                source_url: photo.links.and_then(|l| l.html),
                image_url: Some(image_url),
                license: Some("Unsplash License".to_string()),
                photo_reference: None,
            },
        })
    }

    /// "Photo by {name} on Unsplash", linking the photographer with referral params
    pub fn attribution(&self, _request: &ImageRequest, result: &ImageResult) -> AttributionInfo {
        let name = result.meta.author_name.as_deref().unwrap_or("Unknown");
        let profile = result
            .meta
            .author_url
            .as_deref()
            .unwrap_or("https://unsplash.com/");

        AttributionInfo {
            provider: ProviderKind::Unsplash,
            attribution_text: format!("Photo by {} on Unsplash", name),
            attribution_url: self.referral_url(profile),
            license: "Unsplash License".to_string(),
        }
    }

    fn referral_url(&self, base: &str) -> String {
        match Url::parse(base) {
            Ok(mut url) => {
                url.query_pairs_mut()
                    .append_pair("utm_source", &self.app_name)
                    .append_pair("utm_medium", "referral");
                url.to_string()
            }
            Err(_) => base.to_string(),
        }
    }

    async fn photo_by_id(&self, id: &str, access_key: &str) -> Result<UnsplashPhoto, ServiceError> {
        let url = endpoint_url(PROVIDER, &self.base_url, &["photos", id])?;
        tracing::debug!(url = %url, "Fetching Unsplash photo");

        let response = self.authorized_get(url.as_str(), access_key).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(ServiceError::NotFound(format!("Unsplash photo {}", id)));
        }
        read_json(PROVIDER, check_status(PROVIDER, response)?).await
    }

    async fn search_photo(&self, query: &str, access_key: &str) -> Result<UnsplashPhoto, ServiceError> {
        let url = format!("{}/search/photos", self.base_url);
        tracing::debug!(url = %url, query, "Searching Unsplash");

        let response = self
            .authorized_get(&url, access_key)
            .query(&[
                ("query", query),
                ("per_page", "1"),
                ("orientation", "landscape"),
            ])
            .send()
            .await?;
        let search: SearchResponse = read_json(PROVIDER, check_status(PROVIDER, response)?).await?;

        search
            .results
            .into_iter()
            .next()
            .ok_or_else(|| ServiceError::NotFound(format!("No Unsplash photo for '{}'", query)))
    }

    fn authorized_get(&self, url: &str, access_key: &str) -> reqwest::RequestBuilder {
        self.client
            .get(url)
            .header("Accept-Version", "v1")
            .header(reqwest::header::AUTHORIZATION, format!("Client-ID {}", access_key))
    }
}

/// Adds Imgix sizing parameters to a raw Unsplash image URL
fn sized_url(raw: &str, width: u32) -> Result<String, ServiceError> {
    let mut url = Url::parse(raw)
        .map_err(|e| ServiceError::malformed(PROVIDER, format!("bad image URL {}: {}", raw, e)))?;
    url.query_pairs_mut()
        .append_pair("w", &width.to_string())
        .append_pair("fit", "max")
        .append_pair("q", "80");
    Ok(url.to_string())
}
