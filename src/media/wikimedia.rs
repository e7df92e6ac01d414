//! Wikimedia Commons adapter
//!
//! Three lookup modes: a direct upload URL, a file title, or a free-text search
//! restricted to the File namespace. No credentials are needed, so the adapter is
//! gated by a configuration flag instead.

use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use url::Url;

use super::{download_image, strip_html, AttributionInfo, ImageMeta, ImageRequest, ImageResult, ProviderKind};
use crate::config::WikimediaConfig;
use crate::error::{check_status, read_json, ServiceError};

const PROVIDER: &str = "wikimedia";

/// Commons asks API clients to identify themselves
const USER_AGENT: &str = concat!("wayfarer/", env!("CARGO_PKG_VERSION"), " (media lookups)");

/// Width requested from the API when the caller does not ask for one
const DEFAULT_WIDTH: u32 = 1280;

/// Commons files rarely change
const RESULT_TTL: Duration = Duration::from_secs(30 * 24 * 60 * 60);

#[derive(Debug, Deserialize)]
struct QueryResponse {
    query: Option<QueryPages>,
}

#[derive(Debug, Deserialize)]
struct QueryPages {
    #[serde(default)]
    pages: Vec<Page>,
}

#[derive(Debug, Deserialize)]
struct Page {
    title: Option<String>,
    #[serde(default)]
    missing: bool,
    #[serde(default)]
    imageinfo: Vec<ImageInfo>,
}

#[derive(Debug, Deserialize)]
struct ImageInfo {
    url: String,
    thumburl: Option<String>,
    descriptionurl: Option<String>,
    #[serde(default)]
    extmetadata: HashMap<String, MetadataValue>,
}

#[derive(Debug, Deserialize)]
struct MetadataValue {
    value: serde_json::Value,
}

impl ImageInfo {
    fn metadata(&self, key: &str) -> Option<String> {
        let value = self.extmetadata.get(key)?;
        let text = match &value.value {
            serde_json::Value::String(s) => strip_html(s),
            other => other.to_string(),
        };
        Some(text).filter(|t| !t.is_empty())
    }
}

/// Client for the Wikimedia Commons API
#[derive(Debug)]
pub struct WikimediaAdapter {
    client: Client,
    base_url: String,
    /// Direct URLs are only downloaded from this origin
    upload_base: Option<Url>,
    enabled: bool,
}

impl WikimediaAdapter {
    pub fn new(config: &WikimediaConfig) -> Self {
        Self::with_client(Client::new(), config)
    }

    pub fn with_client(client: Client, config: &WikimediaConfig) -> Self {
        Self {
            client,
            base_url: config.base_url.clone(),
            upload_base: Url::parse(&config.upload_base_url).ok(),
            enabled: config.enabled,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Fetches an image by direct `url`, by file title in `id`, or by searching `query`
    pub async fn fetch_image(&self, request: &ImageRequest) -> Result<ImageResult, ServiceError> {
        if !self.enabled {
            return Err(ServiceError::NotEnabled("Wikimedia".to_string()));
        }

        let meta = if let Some(url) = request.url.as_deref().filter(|s| !s.is_empty()) {
            if !self.is_upload_url(url) {
                return Err(ServiceError::NotFound(format!(
                    "{} is not a Wikimedia Commons upload URL",
                    url
                )));
            }
            ImageMeta {
                image_url: Some(url.to_string()),
                ..Default::default()
            }
        } else if let Some(title) = request.id.as_deref().filter(|s| !s.is_empty()) {
            self.lookup_title(title, request.width).await?
        } else if let Some(query) = request.query.as_deref().filter(|s| !s.trim().is_empty()) {
            self.search(query, request.width).await?
        } else {
            return Err(ServiceError::NotFound(
                "Wikimedia lookup needs a URL, file title or query".to_string(),
            ));
        };

        let resolved = meta
            .image_url
            .as_deref()
            .ok_or_else(|| ServiceError::malformed(PROVIDER, "no image URL"))?;
        let image_url = match request.width {
            Some(width) => rewrite_thumb_width(resolved, width)?,
            None => resolved.to_string(),
        };

        let (buffer, content_type) = download_image(&self.client, PROVIDER, &image_url).await?;

        Ok(ImageResult {
            buffer,
            content_type,
            ttl: RESULT_TTL,
            meta: ImageMeta {
                image_url: Some(image_url),
                ..meta
            },
        })
    }

    /// "{Artist} / Wikimedia Commons", linking the file description page
    pub fn attribution(&self, _request: &ImageRequest, result: &ImageResult) -> AttributionInfo {
        let attribution_text = match result.meta.author_name.as_deref() {
            Some(artist) => format!("{} / Wikimedia Commons", artist),
            None => "Wikimedia Commons".to_string(),
        };
        let attribution_url = result
            .meta
            .source_url
            .clone()
            .or_else(|| result.meta.image_url.clone())
            .unwrap_or_else(|| "https://commons.wikimedia.org/".to_string());

        AttributionInfo {
            provider: ProviderKind::Wikimedia,
            attribution_text,
            attribution_url,
            license: result
                .meta
                .license
                .clone()
                .unwrap_or_else(|| "See Wikimedia Commons".to_string()),
        }
    }

    /// Same scheme, host and port as the upload origin
    fn is_upload_url(&self, url: &str) -> bool {
        match (Url::parse(url), &self.upload_base) {
            (Ok(url), Some(base)) => url.origin() == base.origin(),
            _ => false,
        }
    }

    async fn lookup_title(&self, title: &str, width: Option<u32>) -> Result<ImageMeta, ServiceError> {
        let title = if title.starts_with("File:") {
            title.to_string()
        } else {
            format!("File:{}", title)
        };
        let params = [("titles", title.as_str())];
        self.query_image_info(&params, width, &title).await
    }

    async fn search(&self, query: &str, width: Option<u32>) -> Result<ImageMeta, ServiceError> {
        let params = [
            ("generator", "search"),
            ("gsrsearch", query),
            ("gsrnamespace", "6"),
            ("gsrlimit", "1"),
        ];
        self.query_image_info(&params, width, query).await
    }

    async fn query_image_info(
        &self,
        params: &[(&str, &str)],
        width: Option<u32>,
        what: &str,
    ) -> Result<ImageMeta, ServiceError> {
        let width = width.unwrap_or(DEFAULT_WIDTH).to_string();
        tracing::debug!(url = %self.base_url, what, "Querying Wikimedia Commons");

        let response = self
            .client
            .get(&self.base_url)
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .query(&[
                ("action", "query"),
                ("format", "json"),
                ("formatversion", "2"),
                ("prop", "imageinfo"),
                ("iiprop", "url|extmetadata|mime"),
                ("iiurlwidth", width.as_str()),
            ])
            .query(params)
            .send()
            .await?;
        let body: QueryResponse = read_json(PROVIDER, check_status(PROVIDER, response)?).await?;

        let page = body
            .query
            .and_then(|q| q.pages.into_iter().find(|p| !p.missing))
            .ok_or_else(|| ServiceError::NotFound(format!("No Commons file for '{}'", what)))?;
        let title = page.title;
        let info = page
            .imageinfo
            .into_iter()
            .next()
            .ok_or_else(|| ServiceError::NotFound(format!("No image info for '{}'", what)))?;

        tracing::debug!(title = ?title, "Resolved Commons file");

        Ok(ImageMeta {
            author_name: info.metadata("Artist"),
            author_url: None,
            source_url: info.descriptionurl.clone(),
            image_url: Some(info.thumburl.clone().unwrap_or_else(|| info.url.clone())),
            license: info.metadata("LicenseShortName"),
            photo_reference: None,
        })
    }
}

/// Rewrites the `NNNpx-` prefix of a Commons thumbnail file name to `width`
///
/// URLs that are not thumbnails are returned unchanged.
pub fn rewrite_thumb_width(url: &str, width: u32) -> Result<String, ServiceError> {
    let mut parsed = Url::parse(url)
        .map_err(|e| ServiceError::malformed(PROVIDER, format!("bad image URL {}: {}", url, e)))?;

    let path = parsed.path().to_string();
    let Some((dir, last)) = path.rsplit_once('/') else {
        return Ok(url.to_string());
    };
    let Some(rest) = thumb_suffix(last) else {
        return Ok(url.to_string());
    };

    parsed.set_path(&format!("{}/{}px-{}", dir, width, rest));
    Ok(parsed.to_string())
}

/// For "800px-Foo.jpg" returns "Foo.jpg"
fn thumb_suffix(segment: &str) -> Option<&str> {
    let (digits, rest) = segment.split_once("px-")?;
    if !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()) {
        Some(rest)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(server: &MockServer, enabled: bool) -> WikimediaConfig {
        WikimediaConfig {
            base_url: format!("{}/w/api.php", server.uri()),
            upload_base_url: server.uri(),
            enabled,
        }
    }

    fn api_response(server: &MockServer) -> serde_json::Value {
        serde_json::json!({
            "batchcomplete": true,
            "query": {
                "pages": [{
                    "pageid": 1,
                    "ns": 6,
                    "title": "File:Machu Picchu.jpg",
                    "imageinfo": [{
                        "url": format!("{}/wikipedia/commons/a/ab/Machu_Picchu.jpg", server.uri()),
                        "thumburl": format!("{}/wikipedia/commons/thumb/a/ab/Machu_Picchu.jpg/640px-Machu_Picchu.jpg", server.uri()),
                        "descriptionurl": "https://commons.wikimedia.org/wiki/File:Machu_Picchu.jpg",
                        "extmetadata": {
                            "Artist": { "value": "<a href=\"//commons.wikimedia.org/wiki/User:Ana\">Ana</a>" },
                            "LicenseShortName": { "value": "CC BY-SA 4.0" }
                        }
                    }]
                }]
            }
        })
    }

    async fn mount_thumb(server: &MockServer, file: &str) {
        Mock::given(method("GET"))
            .and(path(format!("/wikipedia/commons/thumb/a/ab/Machu_Picchu.jpg/{}", file)))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "image/jpeg")
                    .set_body_bytes(vec![7u8; 4]),
            )
            .expect(1)
            .mount(server)
            .await;
    }

    #[test]
    fn test_rewrite_thumb_width() {
        let url = "https://upload.wikimedia.org/wikipedia/commons/thumb/a/ab/Foo.jpg/800px-Foo.jpg";
        assert_eq!(
            rewrite_thumb_width(url, 320).unwrap(),
            "https://upload.wikimedia.org/wikipedia/commons/thumb/a/ab/Foo.jpg/320px-Foo.jpg"
        );
    }

    #[test]
    fn test_rewrite_leaves_originals_alone() {
        let url = "https://upload.wikimedia.org/wikipedia/commons/a/ab/Foo.jpg";
        assert_eq!(rewrite_thumb_width(url, 320).unwrap(), url);

        let url = "https://upload.wikimedia.org/wikipedia/commons/a/ab/Xpx-Foo.jpg";
        assert_eq!(rewrite_thumb_width(url, 320).unwrap(), url);
    }

    #[tokio::test]
    async fn test_fetch_by_title() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/w/api.php"))
            .and(query_param("titles", "File:Machu Picchu.jpg"))
            .respond_with(ResponseTemplate::new(200).set_body_json(api_response(&server)))
            .mount(&server)
            .await;
        mount_thumb(&server, "640px-Machu_Picchu.jpg").await;

        let adapter = WikimediaAdapter::new(&config(&server, true));
        let request = ImageRequest::by_id("Machu Picchu.jpg");
        let result = adapter.fetch_image(&request).await.unwrap();

        assert_eq!(result.buffer.len(), 4);
        let attribution = adapter.attribution(&request, &result);
        assert_eq!(attribution.attribution_text, "Ana / Wikimedia Commons");
        assert_eq!(attribution.license, "CC BY-SA 4.0");
        assert_eq!(
            attribution.attribution_url,
            "https://commons.wikimedia.org/wiki/File:Machu_Picchu.jpg"
        );
    }

    #[tokio::test]
    async fn test_search_with_width_rewrites_thumbnail() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/w/api.php"))
            .and(query_param("generator", "search"))
            .and(query_param("gsrsearch", "machu picchu"))
            .respond_with(ResponseTemplate::new(200).set_body_json(api_response(&server)))
            .mount(&server)
            .await;
        mount_thumb(&server, "300px-Machu_Picchu.jpg").await;

        let adapter = WikimediaAdapter::new(&config(&server, true));
        let result = adapter
            .fetch_image(&ImageRequest::by_query("machu picchu").with_width(300))
            .await
            .unwrap();

        assert!(result
            .meta
            .image_url
            .unwrap()
            .ends_with("/300px-Machu_Picchu.jpg"));
    }

    #[tokio::test]
    async fn test_direct_url_skips_api() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/w/api.php"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;
        mount_thumb(&server, "200px-Machu_Picchu.jpg").await;

        let adapter = WikimediaAdapter::new(&config(&server, true));
        let url = format!(
            "{}/wikipedia/commons/thumb/a/ab/Machu_Picchu.jpg/640px-Machu_Picchu.jpg",
            server.uri()
        );
        let request = ImageRequest::by_url(url).with_width(200);
        let result = adapter.fetch_image(&request).await.unwrap();

        let attribution = adapter.attribution(&request, &result);
        assert_eq!(attribution.attribution_text, "Wikimedia Commons");
        assert!(attribution.attribution_url.ends_with("200px-Machu_Picchu.jpg"));
    }

    #[tokio::test]
    async fn test_search_without_results_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/w/api.php"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "batchcomplete": true
            })))
            .mount(&server)
            .await;

        let adapter = WikimediaAdapter::new(&config(&server, true));
        let err = adapter
            .fetch_image(&ImageRequest::by_query("zzzzzz"))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_disabled_adapter_makes_no_requests() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let adapter = WikimediaAdapter::new(&config(&server, false));
        let err = adapter
            .fetch_image(&ImageRequest::by_query("Lima"))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotEnabled(_)));
    }

    #[tokio::test]
    async fn test_direct_url_from_foreign_host_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"secret".to_vec()))
            .expect(0)
            .mount(&server)
            .await;

        let adapter = WikimediaAdapter::new(&WikimediaConfig {
            upload_base_url: "https://upload.wikimedia.org".to_string(),
            ..config(&server, true)
        });
        let foreign = format!("{}/latest/meta-data/iam", server.uri());

        let err = adapter
            .fetch_image(&ImageRequest::by_url(foreign))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_upload_url_must_match_scheme_and_host() {
        let adapter = WikimediaAdapter::new(&WikimediaConfig {
            base_url: "https://commons.wikimedia.org/w/api.php".to_string(),
            upload_base_url: "https://upload.wikimedia.org".to_string(),
            enabled: true,
        });

        assert!(adapter.is_upload_url("https://upload.wikimedia.org/wikipedia/commons/a/ab/Foo.jpg"));
        assert!(!adapter.is_upload_url("http://upload.wikimedia.org/wikipedia/commons/a/ab/Foo.jpg"));
        assert!(!adapter.is_upload_url("https://upload.wikimedia.org.evil.test/Foo.jpg"));
        assert!(!adapter.is_upload_url("http://169.254.169.254/latest/meta-data/"));
        assert!(!adapter.is_upload_url("not a url"));
    }
}
