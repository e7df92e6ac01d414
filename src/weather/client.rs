//! OpenWeather API client
//!
//! Fetches current conditions from `/weather` and the 5 day / 3 hour forecast from
//! `/forecast`, and folds the 3-hourly samples into one entry per local day.

use chrono::{DateTime, NaiveDate, Utc};
use reqwest::Client;
use serde::Deserialize;

use super::{CurrentWeather, DailyForecast, WeatherOptions};
use crate::error::{check_status, read_json, ServiceError};

const PROVIDER: &str = "openweather";

/// Number of days kept from the forecast
pub const FORECAST_DAYS: usize = 5;

#[derive(Debug, Deserialize)]
struct RawCondition {
    description: String,
    icon: String,
}

#[derive(Debug, Deserialize)]
struct RawMain {
    temp: f64,
    feels_like: Option<f64>,
    temp_min: f64,
    temp_max: f64,
    pressure: Option<f64>,
    humidity: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct RawWind {
    #[serde(default)]
    speed: f64,
    deg: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RawSys {
    sunrise: Option<i64>,
    sunset: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct RawClouds {
    all: Option<f64>,
}

/// `/weather` response
#[derive(Debug, Deserialize)]
struct CurrentResponse {
    #[serde(default)]
    weather: Vec<RawCondition>,
    main: RawMain,
    #[serde(default)]
    wind: RawWind,
    clouds: Option<RawClouds>,
    visibility: Option<u32>,
    dt: i64,
    sys: Option<RawSys>,
    name: Option<String>,
}

/// One 3-hourly forecast sample
#[derive(Debug, Deserialize)]
pub(crate) struct ForecastSample {
    dt: i64,
    main: RawMain,
    #[serde(default)]
    weather: Vec<RawCondition>,
    #[serde(default)]
    wind: RawWind,
    /// Probability of precipitation, 0.0 to 1.0
    #[serde(default)]
    pop: f64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ForecastCity {
    /// Offset from UTC in seconds
    #[serde(default)]
    timezone: i64,
}

/// `/forecast` response
#[derive(Debug, Deserialize)]
pub(crate) struct ForecastResponse {
    #[serde(default)]
    list: Vec<ForecastSample>,
    city: Option<ForecastCity>,
}

/// Client for the OpenWeather 2.5 API
#[derive(Debug, Clone)]
pub struct OpenWeatherClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl OpenWeatherClient {
    pub fn new(base_url: &str, api_key: Option<String>) -> Self {
        Self::with_client(Client::new(), base_url, api_key)
    }

    pub fn with_client(client: Client, base_url: &str, api_key: Option<String>) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Fetch current conditions for the given coordinates
    ///
    /// # Arguments
    /// * `lat` - Latitude coordinate
    /// * `lng` - Longitude coordinate
    /// * `options` - Units and language for the response
    pub async fn current(
        &self,
        lat: f64,
        lng: f64,
        options: &WeatherOptions,
    ) -> Result<CurrentWeather, ServiceError> {
        let raw: CurrentResponse = self.get("weather", lat, lng, options).await?;

        let condition = raw.weather.into_iter().next();
        let sys = raw.sys;
        Ok(CurrentWeather {
            temp: raw.main.temp,
            feels_like: raw.main.feels_like,
            humidity: raw.main.humidity.map(|h| h.round() as u8),
            pressure: raw.main.pressure,
            wind_speed: raw.wind.speed,
            wind_deg: raw.wind.deg,
            clouds: raw.clouds.and_then(|c| c.all).map(|c| c.round() as u8),
            visibility: raw.visibility,
            description: condition.as_ref().map(|c| c.description.clone()).unwrap_or_default(),
            icon: condition.map(|c| c.icon).unwrap_or_default(),
            sunrise: sys.as_ref().and_then(|s| s.sunrise).and_then(timestamp),
            sunset: sys.and_then(|s| s.sunset).and_then(timestamp),
            location_name: raw.name.filter(|n| !n.is_empty()),
            observed_at: timestamp(raw.dt).unwrap_or_else(Utc::now),
        })
    }

    /// Fetch the 5 day forecast, one entry per local calendar day
    pub async fn forecast(
        &self,
        lat: f64,
        lng: f64,
        options: &WeatherOptions,
    ) -> Result<Vec<DailyForecast>, ServiceError> {
        let raw: ForecastResponse = self.get("forecast", lat, lng, options).await?;
        Ok(normalize_forecast(raw))
    }

    async fn get<T: serde::de::DeserializeOwned>(
        &self,
        endpoint: &str,
        lat: f64,
        lng: f64,
        options: &WeatherOptions,
    ) -> Result<T, ServiceError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| ServiceError::NotEnabled("OpenWeather".to_string()))?;

        let url = format!("{}/{}", self.base_url, endpoint);
        tracing::debug!(url = %url, lat, lng, "Fetching weather");

        let response = self
            .client
            .get(&url)
            .query(&[
                ("lat", lat.to_string()),
                ("lon", lng.to_string()),
                ("units", options.units.as_str().to_string()),
                ("lang", options.lang.clone()),
                ("appid", api_key.to_string()),
            ])
            .send()
            .await?;
        read_json(PROVIDER, check_status(PROVIDER, response)?).await
    }
}

fn timestamp(secs: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0)
}

/// Groups samples by local date and keeps the first `FORECAST_DAYS` dates
///
/// Per day: min of `temp_min`, max of `temp_max`, the highest precipitation
/// probability as a percentage, the mean wind speed, and the description and icon
/// of the day's first sample.
pub(crate) fn normalize_forecast(response: ForecastResponse) -> Vec<DailyForecast> {
    let offset = response.city.map_or(0, |c| c.timezone);

    let mut days: Vec<(NaiveDate, Vec<ForecastSample>)> = Vec::new();
    for sample in response.list {
        let Some(local) = timestamp(sample.dt + offset) else {
            continue;
        };
        let date = local.date_naive();
        match days.iter_mut().find(|(d, _)| *d == date) {
            Some((_, samples)) => samples.push(sample),
            None => days.push((date, vec![sample])),
        }
    }

    days.into_iter()
        .take(FORECAST_DAYS)
        .map(|(date, samples)| summarize_day(date, samples))
        .collect()
}

fn summarize_day(date: NaiveDate, samples: Vec<ForecastSample>) -> DailyForecast {
    let temp_min = samples
        .iter()
        .map(|s| s.main.temp_min)
        .fold(f64::INFINITY, f64::min);
    let temp_max = samples
        .iter()
        .map(|s| s.main.temp_max)
        .fold(f64::NEG_INFINITY, f64::max);
    let max_pop = samples.iter().map(|s| s.pop).fold(0.0, f64::max);
    let wind_speed = samples.iter().map(|s| s.wind.speed).sum::<f64>() / samples.len() as f64;

    let first = samples.into_iter().next().and_then(|s| s.weather.into_iter().next());

    DailyForecast {
        date,
        temp_min,
        temp_max,
        pop: (max_pop * 100.0).round().clamp(0.0, 100.0) as u8,
        wind_speed,
        description: first.as_ref().map(|c| c.description.clone()).unwrap_or_default(),
        icon: first.map(|c| c.icon).unwrap_or_default(),
    }
}
