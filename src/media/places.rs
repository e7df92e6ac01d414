//! Google Places photo adapter
//!
//! Accepts either a photo reference directly or a free-text query, which is
//! resolved to a reference through a "find place" call. The HTML attributions
//! Google returns alongside a reference are remembered so they can be shown with
//! the image later.

use parking_lot::Mutex;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use url::Url;

use super::{
    download_image, first_href, strip_html, AttributionInfo, ImageMeta, ImageRequest, ImageResult,
    ProviderKind,
};
use crate::config::PlacesConfig;
use crate::error::{check_status, read_json, ServiceError};

const PROVIDER: &str = "places";

/// Width requested when the caller does not ask for one (API maximum is 4800)
const DEFAULT_MAX_WIDTH: u32 = 1600;

/// Google's terms allow short-lived caching of place photos only
const RESULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

const FALLBACK_ATTRIBUTION_URL: &str = "https://www.google.com/maps";

#[derive(Debug, Deserialize)]
struct FindPlaceResponse {
    status: String,
    #[serde(default)]
    candidates: Vec<PlaceCandidate>,
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PlaceCandidate {
    #[allow(dead_code)]
    name: Option<String>,
    #[serde(default)]
    photos: Vec<PlacePhoto>,
}

#[derive(Debug, Deserialize)]
struct PlacePhoto {
    photo_reference: String,
    #[serde(default)]
    html_attributions: Vec<String>,
}

/// Client for the Google Places photo API
#[derive(Debug)]
pub struct PlacesAdapter {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    /// photo reference -> html attributions, as returned by find place
    attributions: Mutex<HashMap<String, Vec<String>>>,
}

impl PlacesAdapter {
    pub fn new(config: &PlacesConfig) -> Self {
        Self::with_client(Client::new(), config)
    }

    pub fn with_client(client: Client, config: &PlacesConfig) -> Self {
        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            attributions: Mutex::new(HashMap::new()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.api_key.is_some()
    }

    /// Attributions recorded for a photo reference, if any were seen
    pub fn cached_attributions(&self, photo_reference: &str) -> Option<Vec<String>> {
        self.attributions.lock().get(photo_reference).cloned()
    }

    /// Fetches the photo for `id` (a photo reference) or the first photo of the
    /// place best matching `query`
    pub async fn fetch_image(&self, request: &ImageRequest) -> Result<ImageResult, ServiceError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| ServiceError::NotEnabled("Google Places".to_string()))?;

        let reference = if let Some(id) = request.id.as_deref().filter(|s| !s.is_empty()) {
            id.to_string()
        } else if let Some(query) = request.query.as_deref().filter(|s| !s.trim().is_empty()) {
            self.find_photo_reference(query, api_key).await?
        } else {
            return Err(ServiceError::NotFound(
                "Places lookup needs a photo reference or query".to_string(),
            ));
        };

        let max_width = request.width.unwrap_or(DEFAULT_MAX_WIDTH).to_string();
        let url = format!("{}/photo", self.base_url);
        tracing::debug!(url = %url, reference = %reference, "Fetching Places photo");

        let response = self
            .client
            .get(&url)
            .query(&[
                ("maxwidth", max_width.as_str()),
                ("photo_reference", reference.as_str()),
                ("key", api_key),
            ])
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(ServiceError::NotFound(format!("Places photo {}", reference)));
        }
        let response = check_status(PROVIDER, response)?;
        let image_url = without_api_key(response.url());
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("image/jpeg")
            .to_string();
        let buffer = response.bytes().await?.to_vec();

        Ok(ImageResult {
            buffer,
            content_type,
            ttl: RESULT_TTL,
            meta: ImageMeta {
                image_url: Some(image_url),
                photo_reference: Some(reference),
                ..Default::default()
            },
        })
    }

    /// Builds attribution from the html attributions recorded for the photo reference
    pub fn attribution(&self, request: &ImageRequest, result: &ImageResult) -> AttributionInfo {
        let reference = result
            .meta
            .photo_reference
            .as_deref()
            .or(request.id.as_deref())
            .unwrap_or_default();
        let html = self.cached_attributions(reference).unwrap_or_default();

        let names: Vec<String> = html
            .iter()
            .map(|h| strip_html(h))
            .filter(|s| !s.is_empty())
            .collect();
        let attribution_text = if names.is_empty() {
            "Google".to_string()
        } else {
            names.join(", ")
        };
        let attribution_url = html
            .iter()
            .find_map(|h| first_href(h))
            .unwrap_or_else(|| FALLBACK_ATTRIBUTION_URL.to_string());

        AttributionInfo {
            provider: ProviderKind::Places,
            attribution_text,
            attribution_url,
            license: "Google Maps Platform Terms".to_string(),
        }
    }

    async fn find_photo_reference(&self, query: &str, api_key: &str) -> Result<String, ServiceError> {
        let url = format!("{}/findplacefromtext/json", self.base_url);
        tracing::debug!(url = %url, query, "Resolving place for photo");

        let response = self
            .client
            .get(&url)
            .query(&[
                ("input", query),
                ("inputtype", "textquery"),
                ("fields", "photos,name,place_id"),
                ("key", api_key),
            ])
            .send()
            .await?;
        let body: FindPlaceResponse = read_json(PROVIDER, check_status(PROVIDER, response)?).await?;

        match body.status.as_str() {
            "OK" => {}
            "ZERO_RESULTS" => {
                return Err(ServiceError::NotFound(format!("No place matches '{}'", query)));
            }
            other => {
                return Err(ServiceError::malformed(
                    PROVIDER,
                    body.error_message.unwrap_or_else(|| other.to_string()),
                ));
            }
        }

        let photo = body
            .candidates
            .into_iter()
            .flat_map(|c| c.photos)
            .next()
            .ok_or_else(|| ServiceError::NotFound(format!("Place '{}' has no photos", query)))?;

        self.attributions
            .lock()
            .insert(photo.photo_reference.clone(), photo.html_attributions);

        Ok(photo.photo_reference)
    }
}

/// Drops the `key` query pair so the stored URL never carries the API key
fn without_api_key(url: &Url) -> String {
    let mut url = url.clone();
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(name, _)| name != "key")
        .map(|(name, value)| (name.into_owned(), value.into_owned()))
        .collect();
    if kept.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(kept);
    }
    url.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(base_url: &str, key: Option<&str>) -> PlacesConfig {
        PlacesConfig {
            base_url: base_url.to_string(),
            api_key: key.map(|k| k.to_string()),
        }
    }

    async fn mount_photo(server: &MockServer, reference: &str) {
        Mock::given(method("GET"))
            .and(path("/photo"))
            .and(query_param("photo_reference", reference))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "image/png")
                    .set_body_bytes(vec![9u8, 9]),
            )
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_fetch_by_photo_reference() {
        let server = MockServer::start().await;
        mount_photo(&server, "ref-1").await;

        let adapter = PlacesAdapter::new(&config(&server.uri(), Some("key")));
        let result = adapter
            .fetch_image(&ImageRequest::by_id("ref-1").with_width(800))
            .await
            .unwrap();

        assert_eq!(result.buffer, vec![9, 9]);
        assert_eq!(result.content_type, "image/png");
        assert_eq!(result.meta.photo_reference.as_deref(), Some("ref-1"));

        let image_url = result.meta.image_url.expect("Image URL should be recorded");
        assert!(!image_url.contains("key="), "API key leaked: {}", image_url);
        assert!(image_url.contains("photo_reference=ref-1"));
        assert!(image_url.contains("maxwidth=800"));
    }

    #[test]
    fn test_without_api_key() {
        let url = Url::parse("https://maps.googleapis.com/photo?maxwidth=400&key=secret").unwrap();
        assert_eq!(without_api_key(&url), "https://maps.googleapis.com/photo?maxwidth=400");

        let url = Url::parse("https://lh3.googleusercontent.com/p/abc?key=secret").unwrap();
        assert_eq!(without_api_key(&url), "https://lh3.googleusercontent.com/p/abc");
    }

    #[tokio::test]
    async fn test_fetch_by_query_records_attributions() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/findplacefromtext/json"))
            .and(query_param("input", "Eiffel Tower"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "OK",
                "candidates": [{
                    "name": "Eiffel Tower",
                    "photos": [{
                        "photo_reference": "ref-eiffel",
                        "html_attributions": [
                            "<a href=\"https://maps.google.com/maps/contrib/42\">Pierre</a>"
                        ]
                    }]
                }]
            })))
            .expect(1)
            .mount(&server)
            .await;
        mount_photo(&server, "ref-eiffel").await;

        let adapter = PlacesAdapter::new(&config(&server.uri(), Some("key")));
        let request = ImageRequest::by_query("Eiffel Tower");
        let result = adapter.fetch_image(&request).await.unwrap();

        assert_eq!(
            adapter.cached_attributions("ref-eiffel").map(|a| a.len()),
            Some(1)
        );

        let attribution = adapter.attribution(&request, &result);
        assert_eq!(attribution.provider, ProviderKind::Places);
        assert_eq!(attribution.attribution_text, "Pierre");
        assert_eq!(
            attribution.attribution_url,
            "https://maps.google.com/maps/contrib/42"
        );
    }

    #[tokio::test]
    async fn test_zero_results_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/findplacefromtext/json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "ZERO_RESULTS",
                "candidates": []
            })))
            .mount(&server)
            .await;

        let adapter = PlacesAdapter::new(&config(&server.uri(), Some("key")));
        let err = adapter
            .fetch_image(&ImageRequest::by_query("qwertyuiop"))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_request_denied_is_upstream() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/findplacefromtext/json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "REQUEST_DENIED",
                "error_message": "The provided API key is invalid."
            })))
            .mount(&server)
            .await;

        let adapter = PlacesAdapter::new(&config(&server.uri(), Some("bad")));
        let err = adapter
            .fetch_image(&ImageRequest::by_query("Lima"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("API key is invalid"));
    }

    #[tokio::test]
    async fn test_disabled_adapter_makes_no_requests() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let adapter = PlacesAdapter::new(&config(&server.uri(), None));
        let err = adapter
            .fetch_image(&ImageRequest::by_query("Lima"))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotEnabled(_)));
    }

    #[test]
    fn test_attribution_without_recorded_html_falls_back_to_google() {
        let adapter = PlacesAdapter::new(&config("http://localhost", Some("key")));
        let result = ImageResult {
            buffer: vec![],
            content_type: "image/jpeg".to_string(),
            ttl: RESULT_TTL,
            meta: ImageMeta {
                photo_reference: Some("unknown-ref".to_string()),
                ..Default::default()
            },
        };

        let attribution = adapter.attribution(&ImageRequest::by_id("unknown-ref"), &result);
        assert_eq!(attribution.attribution_text, "Google");
        assert_eq!(attribution.attribution_url, FALLBACK_ATTRIBUTION_URL);
    }
}
