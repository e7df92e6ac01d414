//! Runtime configuration for the upstream integrations
//!
//! Everything is read from environment variables (optionally seeded from a `.env`
//! file). Base URLs are configurable so the integrations can be pointed at mock
//! servers in tests.

use std::path::PathBuf;

const UNSPLASH_BASE_URL: &str = "https://api.unsplash.com";
const PLACES_BASE_URL: &str = "https://maps.googleapis.com/maps/api/place";
const WIKIMEDIA_BASE_URL: &str = "https://commons.wikimedia.org/w/api.php";
const WIKIMEDIA_UPLOAD_BASE_URL: &str = "https://upload.wikimedia.org";
const OPENWEATHER_BASE_URL: &str = "https://api.openweathermap.org/data/2.5";
const RESTCOUNTRIES_BASE_URL: &str = "https://restcountries.com/v3.1";
const GEONAMES_BASE_URL: &str = "http://api.geonames.org";

/// Default Unsplash quota per rolling hour (demo-tier limit)
pub const DEFAULT_UNSPLASH_RATE_LIMIT: usize = 50;

/// Unsplash settings
#[derive(Debug, Clone)]
pub struct UnsplashConfig {
    pub base_url: String,
    pub access_key: Option<String>,
    /// Requests allowed per rolling hour
    pub rate_limit: usize,
    /// Application name used in referral links
    pub app_name: String,
}

/// Google Places settings
#[derive(Debug, Clone)]
pub struct PlacesConfig {
    pub base_url: String,
    pub api_key: Option<String>,
}

/// Wikimedia Commons settings
#[derive(Debug, Clone)]
pub struct WikimediaConfig {
    pub base_url: String,
    /// Origin that direct image URLs must belong to
    pub upload_base_url: String,
    pub enabled: bool,
}

/// OpenWeather settings
#[derive(Debug, Clone)]
pub struct WeatherConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub enabled: bool,
}

/// RestCountries and GeoNames settings
#[derive(Debug, Clone)]
pub struct GeoConfig {
    pub countries_base_url: String,
    pub geonames_base_url: String,
    pub geonames_username: Option<String>,
}

/// Complete configuration for all integrations
#[derive(Debug, Clone)]
pub struct Config {
    pub unsplash: UnsplashConfig,
    pub places: PlacesConfig,
    pub wikimedia: WikimediaConfig,
    pub weather: WeatherConfig,
    pub geo: GeoConfig,
    /// Directory for persisted photos; `None` means the XDG cache directory
    pub cache_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl Config {
    /// Loads configuration from the process environment, reading `.env` first if present
    pub fn from_env() -> Self {
        let _ = dotenv::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds configuration from an arbitrary key lookup
    ///
    /// Empty values are treated as unset.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let url = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());

        Self {
            unsplash: UnsplashConfig {
                base_url: url("UNSPLASH_BASE_URL", UNSPLASH_BASE_URL),
                access_key: get("UNSPLASH_ACCESS_KEY"),
                rate_limit: get("UNSPLASH_RATE_LIMIT")
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(DEFAULT_UNSPLASH_RATE_LIMIT),
                app_name: get("UNSPLASH_APP_NAME").unwrap_or_else(|| "wayfarer".to_string()),
            },
            places: PlacesConfig {
                base_url: url("GOOGLE_PLACES_BASE_URL", PLACES_BASE_URL),
                api_key: get("GOOGLE_PLACES_API_KEY"),
            },
            wikimedia: WikimediaConfig {
                base_url: url("WIKIMEDIA_BASE_URL", WIKIMEDIA_BASE_URL),
                upload_base_url: url("WIKIMEDIA_UPLOAD_BASE_URL", WIKIMEDIA_UPLOAD_BASE_URL),
                enabled: get("WIKIMEDIA_ENABLED").is_some_and(|v| parse_flag(&v)),
            },
            weather: WeatherConfig {
                base_url: url("OPENWEATHER_BASE_URL", OPENWEATHER_BASE_URL),
                api_key: get("OPENWEATHER_API_KEY"),
                enabled: get("WEATHER_ENABLED").is_some_and(|v| parse_flag(&v)),
            },
            geo: GeoConfig {
                countries_base_url: url("RESTCOUNTRIES_BASE_URL", RESTCOUNTRIES_BASE_URL),
                geonames_base_url: url("GEONAMES_BASE_URL", GEONAMES_BASE_URL),
                geonames_username: get("GEONAMES_USERNAME"),
            },
            cache_dir: get("WAYFARER_CACHE_DIR").map(PathBuf::from),
        }
    }
}

/// Interprets an environment flag value
pub fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
