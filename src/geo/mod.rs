//! Country and city basics
//!
//! `GeoService` resolves a country through RestCountries and, when a city is
//! named or coordinates are given, the nearest populated place through GeoNames.
//! Both lookups go through the shared TTL cache.

mod cities;
mod countries;

pub use cities::CitiesClient;
pub use countries::CountriesClient;

use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::cache::TtlCache;
use crate::config::GeoConfig;
use crate::error::ServiceError;

/// Country data changes rarely
pub const COUNTRY_TTL: Duration = Duration::from_secs(24 * 60 * 60);

pub const CITY_TTL: Duration = Duration::from_secs(6 * 60 * 60);

const DEFAULT_LANG: &str = "en";

/// Normalized country facts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountryRecord {
    /// ISO 3166-1 alpha-2, uppercase
    pub code: String,
    pub code3: Option<String>,
    pub name: String,
    pub official_name: Option<String>,
    pub capital: Option<String>,
    pub region: Option<String>,
    pub subregion: Option<String>,
    pub population: Option<u64>,
    /// ISO 4217 codes, sorted
    pub currencies: Vec<String>,
    /// Language names, sorted
    pub languages: Vec<String>,
    pub flag: Option<String>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub timezones: Vec<String>,
}

/// A populated place
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CityRecord {
    pub geoname_id: Option<u64>,
    pub name: String,
    pub country_code: Option<String>,
    /// First-level administrative division (state, region)
    pub admin_name: Option<String>,
    pub lat: f64,
    pub lng: f64,
    pub population: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeoMeta {
    /// Providers consulted for this response
    pub provider: Vec<String>,
    pub cache_hit: bool,
    pub lang: String,
    pub fetched_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeoBasicsResponse {
    pub country: CountryRecord,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub city: Option<CityRecord>,
    pub meta: GeoMeta,
}

/// Lookup parameters; any combination may be given
#[derive(Debug, Clone, Default)]
pub struct GeoParams {
    pub country_code: Option<String>,
    pub country_name: Option<String>,
    pub city_name: Option<String>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    /// Defaults to `"en"`
    pub lang: Option<String>,
}

impl GeoParams {
    pub fn lang(&self) -> &str {
        non_empty(&self.lang).unwrap_or(DEFAULT_LANG)
    }

    fn coordinates(&self) -> Option<(f64, f64)> {
        self.lat.zip(self.lng)
    }
}

/// How a country is identified
#[derive(Debug, Clone, PartialEq)]
pub enum CountryIdent {
    Code(String),
    Name(String),
}

impl CountryIdent {
    /// A code wins over a name
    fn from_params(params: &GeoParams) -> Option<Self> {
        non_empty(&params.country_code)
            .map(|c| Self::Code(c.to_string()))
            .or_else(|| non_empty(&params.country_name).map(|n| Self::Name(n.to_string())))
    }
}

/// How a city is located
#[derive(Debug, Clone, PartialEq)]
pub enum CityQuery {
    Near { lat: f64, lng: f64 },
    Named { name: String, country_code: Option<String> },
}

impl CityQuery {
    /// Coordinates take precedence over a name
    fn from_params(params: &GeoParams, country_code: Option<&str>) -> Option<Self> {
        if let Some((lat, lng)) = params.coordinates() {
            return Some(Self::Near { lat, lng });
        }
        non_empty(&params.city_name).map(|name| Self::Named {
            name: name.to_string(),
            country_code: country_code.map(str::to_string),
        })
    }
}

pub fn country_cache_key(ident: &CountryIdent, lang: &str) -> String {
    let id = match ident {
        CountryIdent::Code(code) => code.trim().to_lowercase(),
        CountryIdent::Name(name) => name.trim().to_lowercase(),
    };
    format!("geo:country:{}:{}", id, lang.to_lowercase())
}

/// Coordinates are rounded to 4 decimals (about 11 m)
pub fn city_cache_key(query: &CityQuery) -> String {
    match query {
        CityQuery::Near { lat, lng } => format!("geo:city:{:.4}:{:.4}", lat, lng),
        CityQuery::Named {
            name,
            country_code: Some(country),
        } => format!("geo:city:{}:{}", slugify(name), country.to_lowercase()),
        CityQuery::Named { name, .. } => format!("geo:city:{}", slugify(name)),
    }
}

/// Lowercases and joins alphanumeric runs with `-`
pub fn slugify(text: &str) -> String {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// Outcome of a city lookup that was actually attempted
struct CityLookup {
    record: Option<CityRecord>,
    cache_hit: bool,
}

/// Resolves country and city basics with caching
#[derive(Debug, Clone)]
pub struct GeoService {
    countries: CountriesClient,
    cities: CitiesClient,
    cache: Arc<TtlCache>,
}

impl GeoService {
    pub fn new(config: &GeoConfig, cache: Arc<TtlCache>) -> Self {
        let client = Client::new();
        Self {
            countries: CountriesClient::with_client(client.clone(), &config.countries_base_url),
            cities: CitiesClient::with_client(
                client,
                &config.geonames_base_url,
                config.geonames_username.clone(),
            ),
            cache,
        }
    }

    /// Resolves the country and, if requested, the city
    ///
    /// Returns `Ok(None)` when no country can be identified or the country does not
    /// exist. City failures only leave `city` empty.
    pub async fn get_basics(
        &self,
        params: &GeoParams,
    ) -> Result<Option<GeoBasicsResponse>, ServiceError> {
        let lang = params.lang();
        let mut city_lookup = None;
        let mut ident = CountryIdent::from_params(params);

        // Coordinates alone: let the nearest place tell us the country
        if ident.is_none() {
            if let Some(query) = CityQuery::from_params(params, None) {
                city_lookup = self.lookup_city(&query, lang).await;
                ident = city_lookup
                    .as_ref()
                    .and_then(|l| l.record.as_ref())
                    .and_then(|c| c.country_code.clone())
                    .map(CountryIdent::Code);
            }
        }

        let Some(ident) = ident else {
            tracing::debug!("No country identifier, nothing to look up");
            return Ok(None);
        };

        let (country, country_hit) = match self.lookup_country(&ident, lang).await {
            Ok(found) => found,
            Err(e) if e.is_not_found() => {
                tracing::debug!(error = %e, "Country not found");
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        if city_lookup.is_none() {
            if let Some(query) = CityQuery::from_params(params, Some(&country.code)) {
                city_lookup = self.lookup_city(&query, lang).await;
            }
        }

        let mut provider = vec!["restcountries".to_string()];
        let mut cache_hit = country_hit;
        let mut city = None;
        if let Some(lookup) = city_lookup {
            provider.push("geonames".to_string());
            cache_hit = cache_hit && lookup.cache_hit;
            city = lookup.record;
        }

        Ok(Some(GeoBasicsResponse {
            country,
            city,
            meta: GeoMeta {
                provider,
                cache_hit,
                lang: lang.to_string(),
                fetched_at: Utc::now(),
            },
        }))
    }

    async fn lookup_country(
        &self,
        ident: &CountryIdent,
        lang: &str,
    ) -> Result<(CountryRecord, bool), ServiceError> {
        let key = country_cache_key(ident, lang);
        if let Some(country) = self.cache.get::<CountryRecord>(&key) {
            tracing::debug!(key = %key, "Country cache hit");
            return Ok((country, true));
        }

        tracing::debug!(key = %key, "Country cache miss");
        let country = match ident {
            CountryIdent::Code(code) => self.countries.by_code(code, lang).await?,
            CountryIdent::Name(name) => self.countries.by_name(name, lang).await?,
        };
        self.cache.set(&key, &country, COUNTRY_TTL);
        Ok((country, false))
    }

    /// `None` when GeoNames is not configured
    async fn lookup_city(&self, query: &CityQuery, lang: &str) -> Option<CityLookup> {
        if !self.cities.is_enabled() {
            tracing::info!("GEONAMES_USERNAME not set, skipping city lookup");
            return None;
        }

        let key = city_cache_key(query);
        if let Some(city) = self.cache.get::<CityRecord>(&key) {
            tracing::debug!(key = %key, "City cache hit");
            return Some(CityLookup {
                record: Some(city),
                cache_hit: true,
            });
        }

        let result = match query {
            CityQuery::Near { lat, lng } => self.cities.nearby(*lat, *lng, lang).await,
            CityQuery::Named { name, country_code } => {
                self.cities.search(name, country_code.as_deref(), lang).await
            }
        };

        let record = match result {
            Ok(city) => {
                self.cache.set(&key, &city, CITY_TTL);
                Some(city)
            }
            Err(e) => {
                tracing::warn!(key = %key, "City lookup failed: {}", e);
                None
            }
        };
        Some(CityLookup {
            record,
            cache_hit: false,
        })
    }
}
