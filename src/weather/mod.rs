//! Current weather and daily forecast with caching
//!
//! `WeatherService` serves a `WeatherResponse` for a coordinate pair. Current
//! conditions and the forecast are cached separately but only count as a hit
//! together; on any miss both are fetched again in parallel.

mod client;

pub use client::{OpenWeatherClient, FORECAST_DAYS};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::cache::TtlCache;
use crate::config::WeatherConfig;
use crate::error::ServiceError;

pub const CURRENT_TTL: Duration = Duration::from_secs(10 * 60);

pub const FORECAST_TTL: Duration = Duration::from_secs(60 * 60);

const PROVIDER: &str = "openweather";

/// Measurement system for temperatures and wind speed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Units {
    /// Celsius, m/s
    #[default]
    Metric,
    /// Fahrenheit, mph
    Imperial,
    /// Kelvin, m/s
    Standard,
}

impl Units {
    pub fn as_str(&self) -> &'static str {
        match self {
            Units::Metric => "metric",
            Units::Imperial => "imperial",
            Units::Standard => "standard",
        }
    }

    /// Parse units from a string (case-insensitive)
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "metric" | "c" | "celsius" => Some(Units::Metric),
            "imperial" | "f" | "fahrenheit" => Some(Units::Imperial),
            "standard" | "k" | "kelvin" => Some(Units::Standard),
            _ => None,
        }
    }
}

impl fmt::Display for Units {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeatherOptions {
    pub units: Units,
    /// Language for descriptions, defaults to `"en"`
    pub lang: String,
}

impl Default for WeatherOptions {
    fn default() -> Self {
        Self {
            units: Units::Metric,
            lang: "en".to_string(),
        }
    }
}

/// Conditions at observation time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentWeather {
    pub temp: f64,
    pub feels_like: Option<f64>,
    /// Relative humidity percentage
    pub humidity: Option<u8>,
    /// Sea-level pressure in hPa
    pub pressure: Option<f64>,
    pub wind_speed: f64,
    pub wind_deg: Option<f64>,
    /// Cloud cover percentage
    pub clouds: Option<u8>,
    /// Visibility in meters
    pub visibility: Option<u32>,
    pub description: String,
    pub icon: String,
    pub sunrise: Option<DateTime<Utc>>,
    pub sunset: Option<DateTime<Utc>>,
    pub location_name: Option<String>,
    pub observed_at: DateTime<Utc>,
}

/// Forecast summary for one local calendar day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyForecast {
    pub date: NaiveDate,
    pub temp_min: f64,
    pub temp_max: f64,
    /// Highest probability of precipitation during the day, 0-100
    pub pop: u8,
    /// Mean wind speed across the day's samples
    pub wind_speed: f64,
    pub description: String,
    pub icon: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeatherMeta {
    pub provider: String,
    pub cache_hit: bool,
    pub units: Units,
    pub lang: String,
    pub fetched_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeatherResponse {
    pub current: CurrentWeather,
    /// At most `FORECAST_DAYS` entries, in date order
    pub forecast: Vec<DailyForecast>,
    pub meta: WeatherMeta,
}

/// Which cached payload a key refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeatherKind {
    Current,
    Forecast,
}

impl WeatherKind {
    fn as_str(&self) -> &'static str {
        match self {
            WeatherKind::Current => "current",
            WeatherKind::Forecast => "forecast",
        }
    }
}

pub fn weather_cache_key(kind: WeatherKind, lat: f64, lng: f64, options: &WeatherOptions) -> String {
    format!(
        "weather:{}:{:.4}:{:.4}:{}:{}",
        kind.as_str(),
        lat,
        lng,
        options.units,
        options.lang.to_lowercase()
    )
}

/// Weather lookups backed by OpenWeather and the shared cache
#[derive(Debug, Clone)]
pub struct WeatherService {
    client: OpenWeatherClient,
    enabled: bool,
    cache: Arc<TtlCache>,
}

impl WeatherService {
    pub fn new(config: &WeatherConfig, cache: Arc<TtlCache>) -> Self {
        Self {
            client: OpenWeatherClient::new(&config.base_url, config.api_key.clone()),
            enabled: config.enabled,
            cache,
        }
    }

    /// Enabled only with both the flag and an API key
    pub fn is_enabled(&self) -> bool {
        self.enabled && self.client.has_api_key()
    }

    /// Current conditions plus up to five daily forecasts for a location
    ///
    /// # Arguments
    /// * `lat` - Latitude coordinate
    /// * `lng` - Longitude coordinate
    /// * `options` - Units and language
    ///
    /// # Returns
    /// * `Ok(WeatherResponse)` - Weather for the location, possibly from cache
    /// * `Err(ServiceError::NotEnabled)` - If weather is switched off or has no key
    pub async fn get_by_lat_lng(
        &self,
        lat: f64,
        lng: f64,
        options: &WeatherOptions,
    ) -> Result<WeatherResponse, ServiceError> {
        if !self.is_enabled() {
            return Err(ServiceError::NotEnabled("Weather".to_string()));
        }

        let current_key = weather_cache_key(WeatherKind::Current, lat, lng, options);
        let forecast_key = weather_cache_key(WeatherKind::Forecast, lat, lng, options);

        let cached = (
            self.cache.get::<CurrentWeather>(&current_key),
            self.cache.get::<Vec<DailyForecast>>(&forecast_key),
        );
        let (current, forecast, cache_hit) = match cached {
            (Some(current), Some(forecast)) => {
                tracing::debug!(key = %current_key, "Weather cache hit");
                (current, forecast, true)
            }
            // Either one missing refreshes both
            _ => {
                tracing::debug!(key = %current_key, "Weather cache miss");
                let (current, forecast) = futures::future::try_join(
                    self.client.current(lat, lng, options),
                    self.client.forecast(lat, lng, options),
                )
                .await?;
                self.cache.set(&current_key, &current, CURRENT_TTL);
                self.cache.set(&forecast_key, &forecast, FORECAST_TTL);
                (current, forecast, false)
            }
        };

        Ok(WeatherResponse {
            current,
            forecast,
            meta: WeatherMeta {
                provider: PROVIDER.to_string(),
                cache_hit,
                units: options.units,
                lang: options.lang.clone(),
                fetched_at: Utc::now(),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn current_json() -> serde_json::Value {
        serde_json::json!({
            "weather": [{ "description": "overcast clouds", "icon": "04d" }],
            "main": { "temp": 18.2, "feels_like": 18.0, "temp_min": 17.0, "temp_max": 19.0, "humidity": 80 },
            "wind": { "speed": 3.1 },
            "dt": 1_721_001_600,
            "name": "Lima"
        })
    }

    fn forecast_json() -> serde_json::Value {
        serde_json::json!({
            "list": [{
                "dt": 1_721_001_600,
                "main": { "temp": 17.0, "temp_min": 16.0, "temp_max": 18.0 },
                "weather": [{ "description": "light rain", "icon": "10d" }],
                "wind": { "speed": 2.0 },
                "pop": 0.4
            }],
            "city": { "timezone": 0 }
        })
    }

    fn config(base_url: &str, key: Option<&str>, enabled: bool) -> WeatherConfig {
        WeatherConfig {
            base_url: base_url.to_string(),
            api_key: key.map(|k| k.to_string()),
            enabled,
        }
    }

    async fn mount_both(server: &MockServer, expected_calls: u64) {
        Mock::given(method("GET"))
            .and(path("/weather"))
            .respond_with(ResponseTemplate::new(200).set_body_json(current_json()))
            .expect(expected_calls)
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/forecast"))
            .respond_with(ResponseTemplate::new(200).set_body_json(forecast_json()))
            .expect(expected_calls)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_second_call_served_from_cache() {
        let server = MockServer::start().await;
        mount_both(&server, 1).await;

        let service = WeatherService::new(
            &config(&server.uri(), Some("key"), true),
            Arc::new(TtlCache::new()),
        );
        let options = WeatherOptions::default();

        let first = service.get_by_lat_lng(-12.05, -77.04, &options).await.unwrap();
        assert!(!first.meta.cache_hit);
        assert_eq!(first.current.description, "overcast clouds");
        assert_eq!(first.forecast.len(), 1);
        assert_eq!(first.forecast[0].pop, 40);

        let second = service.get_by_lat_lng(-12.05, -77.04, &options).await.unwrap();
        assert!(second.meta.cache_hit);
        assert_eq!(second.meta.provider, "openweather");
        assert_eq!(second.current, first.current);
    }

    #[tokio::test]
    async fn test_missing_forecast_refetches_both() {
        let server = MockServer::start().await;
        mount_both(&server, 2).await;

        let cache = Arc::new(TtlCache::new());
        let service = WeatherService::new(&config(&server.uri(), Some("key"), true), cache.clone());
        let options = WeatherOptions::default();

        service.get_by_lat_lng(1.0, 2.0, &options).await.unwrap();
        assert!(cache.remove(&weather_cache_key(WeatherKind::Forecast, 1.0, 2.0, &options)));

        let again = service.get_by_lat_lng(1.0, 2.0, &options).await.unwrap();
        assert!(!again.meta.cache_hit);
    }

    #[tokio::test]
    async fn test_disabled_makes_no_requests() {
        let server = MockServer::start().await;
        mount_both(&server, 0).await;

        for (key, enabled) in [(Some("key"), false), (None, true)] {
            let service =
                WeatherService::new(&config(&server.uri(), key, enabled), Arc::new(TtlCache::new()));
            let err = service
                .get_by_lat_lng(0.0, 0.0, &WeatherOptions::default())
                .await
                .unwrap_err();
            assert!(matches!(err, ServiceError::NotEnabled(_)));
        }
    }

    #[tokio::test]
    async fn test_failed_half_fails_the_call() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/weather"))
            .respond_with(ResponseTemplate::new(200).set_body_json(current_json()))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/forecast"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let cache = Arc::new(TtlCache::new());
        let service = WeatherService::new(&config(&server.uri(), Some("key"), true), cache.clone());
        let err = service
            .get_by_lat_lng(0.0, 0.0, &WeatherOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(err, ServiceError::Upstream { status: Some(503), .. }));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_cache_key_includes_units_and_lang() {
        let metric = WeatherOptions::default();
        let imperial = WeatherOptions {
            units: Units::Imperial,
            lang: "EN".to_string(),
        };

        assert_eq!(
            weather_cache_key(WeatherKind::Current, -12.04641, -77.0, &metric),
            "weather:current:-12.0464:-77.0000:metric:en"
        );
        assert_ne!(
            weather_cache_key(WeatherKind::Current, 0.0, 0.0, &metric),
            weather_cache_key(WeatherKind::Current, 0.0, 0.0, &imperial)
        );
    }

    #[test]
    fn test_units_from_str() {
        assert_eq!(Units::from_str("Imperial"), Some(Units::Imperial));
        assert_eq!(Units::from_str("k"), Some(Units::Standard));
        assert_eq!(Units::from_str("rankine"), None);
    }
}
