//! GeoNames API client

use reqwest::Client;
use serde::{Deserialize, Deserializer};

use super::CityRecord;
use crate::error::{check_status, read_json, ServiceError};

const PROVIDER: &str = "geonames";

/// GeoNames status code for "no result found"
const STATUS_NO_RESULT: i64 = 15;

#[derive(Debug, Deserialize)]
struct GeoNamesResponse {
    #[serde(default)]
    geonames: Vec<RawPlace>,
    status: Option<GeoNamesStatus>,
}

#[derive(Debug, Deserialize)]
struct GeoNamesStatus {
    message: String,
    value: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPlace {
    geoname_id: Option<u64>,
    name: String,
    #[serde(deserialize_with = "lenient_f64")]
    lat: f64,
    #[serde(deserialize_with = "lenient_f64")]
    lng: f64,
    country_code: Option<String>,
    admin_name1: Option<String>,
    population: Option<u64>,
}

/// GeoNames returns coordinates as strings; accept numbers too
fn lenient_f64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumberOrString {
        Number(f64),
        String(String),
    }

    match NumberOrString::deserialize(deserializer)? {
        NumberOrString::Number(n) => Ok(n),
        NumberOrString::String(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

/// Client for the GeoNames web services
#[derive(Debug, Clone)]
pub struct CitiesClient {
    client: Client,
    base_url: String,
    username: Option<String>,
}

impl CitiesClient {
    pub fn new(base_url: &str, username: Option<String>) -> Self {
        Self::with_client(Client::new(), base_url, username)
    }

    pub fn with_client(client: Client, base_url: &str, username: Option<String>) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            username,
        }
    }

    /// GeoNames requires a registered username
    pub fn is_enabled(&self) -> bool {
        self.username.is_some()
    }

    /// Nearest populated place to the coordinates
    pub async fn nearby(&self, lat: f64, lng: f64, lang: &str) -> Result<CityRecord, ServiceError> {
        let url = format!("{}/findNearbyPlaceNameJSON", self.base_url);
        let (lat, lng) = (lat.to_string(), lng.to_string());
        self.fetch(&url, &[("lat", lat.as_str()), ("lng", lng.as_str())], lang)
            .await
    }

    /// Best populated-place match for `name`, optionally within a country
    pub async fn search(
        &self,
        name: &str,
        country_code: Option<&str>,
        lang: &str,
    ) -> Result<CityRecord, ServiceError> {
        let url = format!("{}/searchJSON", self.base_url);
        let mut params = vec![("q", name), ("maxRows", "1"), ("featureClass", "P")];
        if let Some(country) = country_code {
            params.push(("country", country));
        }
        self.fetch(&url, &params, lang).await
    }

    async fn fetch(
        &self,
        url: &str,
        params: &[(&str, &str)],
        lang: &str,
    ) -> Result<CityRecord, ServiceError> {
        let username = self
            .username
            .as_deref()
            .ok_or_else(|| ServiceError::NotEnabled("GeoNames".to_string()))?;

        tracing::debug!(url, "Fetching city");
        let response = self
            .client
            .get(url)
            .query(params)
            .query(&[("username", username), ("lang", lang)])
            .send()
            .await?;
        let body: GeoNamesResponse = read_json(PROVIDER, check_status(PROVIDER, response)?).await?;

        // GeoNames reports errors in the body with a 200 status
        if let Some(status) = body.status {
            return Err(if status.value == STATUS_NO_RESULT {
                ServiceError::NotFound(status.message)
            } else {
                ServiceError::malformed(PROVIDER, status.message)
            });
        }

        let place = body
            .geonames
            .into_iter()
            .next()
            .ok_or_else(|| ServiceError::NotFound("No matching place".to_string()))?;

        Ok(CityRecord {
            geoname_id: place.geoname_id,
            name: place.name,
            country_code: place.country_code.map(|c| c.to_uppercase()),
            admin_name: place.admin_name1.filter(|a| !a.is_empty()),
            lat: place.lat,
            lng: place.lng,
            population: place.population,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn lima_json() -> serde_json::Value {
        serde_json::json!({
            "geonames": [{
                "geonameId": 3936456,
                "name": "Lima",
                "lat": "-12.04318",
                "lng": "-77.02824",
                "countryCode": "PE",
                "adminName1": "Lima",
                "population": 7737002
            }]
        })
    }

    #[tokio::test]
    async fn test_search_parses_string_coordinates() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/searchJSON"))
            .and(query_param("q", "Lima"))
            .and(query_param("country", "PE"))
            .and(query_param("username", "demo"))
            .respond_with(ResponseTemplate::new(200).set_body_json(lima_json()))
            .mount(&server)
            .await;

        let client = CitiesClient::new(&server.uri(), Some("demo".to_string()));
        let city = client.search("Lima", Some("PE"), "en").await.unwrap();

        assert_eq!(city.name, "Lima");
        assert_eq!(city.country_code.as_deref(), Some("PE"));
        assert!((city.lat + 12.04318).abs() < 1e-9);
        assert!((city.lng + 77.02824).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_nearby_uses_coordinates() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/findNearbyPlaceNameJSON"))
            .and(query_param("lat", "-12.0464"))
            .respond_with(ResponseTemplate::new(200).set_body_json(lima_json()))
            .mount(&server)
            .await;

        let client = CitiesClient::new(&server.uri(), Some("demo".to_string()));
        let city = client.nearby(-12.0464, -77.0428, "en").await.unwrap();
        assert_eq!(city.geoname_id, Some(3936456));
    }

    #[tokio::test]
    async fn test_status_in_body_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/searchJSON"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": { "message": "user account not enabled to use the free webservice", "value": 10 }
            })))
            .mount(&server)
            .await;

        let client = CitiesClient::new(&server.uri(), Some("demo".to_string()));
        let err = client.search("Lima", None, "en").await.unwrap_err();
        assert!(matches!(err, ServiceError::Upstream { .. }));
    }

    #[tokio::test]
    async fn test_empty_result_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/searchJSON"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "totalResultsCount": 0, "geonames": []
            })))
            .mount(&server)
            .await;

        let client = CitiesClient::new(&server.uri(), Some("demo".to_string()));
        assert!(client.search("Qqqq", None, "en").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_without_username_is_not_enabled() {
        let client = CitiesClient::new("http://127.0.0.1:9", None);
        assert!(!client.is_enabled());
        let err = client.search("Lima", None, "en").await.unwrap_err();
        assert!(matches!(err, ServiceError::NotEnabled(_)));
    }
}
