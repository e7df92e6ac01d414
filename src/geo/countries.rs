//! RestCountries API client

use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::collections::HashMap;
use url::Url;

use super::CountryRecord;
use crate::error::{check_status, read_json, ServiceError};
use crate::http::endpoint_url;

const PROVIDER: &str = "restcountries";

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    Many(Vec<RawCountry>),
    One(Box<RawCountry>),
}

#[derive(Debug, Deserialize)]
struct RawCountry {
    name: RawName,
    cca2: String,
    cca3: Option<String>,
    #[serde(default)]
    capital: Vec<String>,
    region: Option<String>,
    subregion: Option<String>,
    population: Option<u64>,
    #[serde(default)]
    currencies: HashMap<String, serde_json::Value>,
    #[serde(default)]
    languages: HashMap<String, String>,
    flag: Option<String>,
    #[serde(default)]
    latlng: Vec<f64>,
    #[serde(default)]
    timezones: Vec<String>,
    #[serde(default)]
    translations: HashMap<String, RawName>,
}

#[derive(Debug, Deserialize)]
struct RawName {
    common: String,
    official: Option<String>,
}

/// Client for the RestCountries v3.1 API
#[derive(Debug, Clone)]
pub struct CountriesClient {
    client: Client,
    base_url: String,
}

impl CountriesClient {
    pub fn new(base_url: &str) -> Self {
        Self::with_client(Client::new(), base_url)
    }

    pub fn with_client(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Looks up a country by ISO 3166 alpha-2 or alpha-3 code
    pub async fn by_code(&self, code: &str, lang: &str) -> Result<CountryRecord, ServiceError> {
        let url = endpoint_url(PROVIDER, &self.base_url, &["alpha", code.trim()])?;
        self.fetch(url, &[], code, lang).await
    }

    /// Looks up a country by its full common or official name
    pub async fn by_name(&self, name: &str, lang: &str) -> Result<CountryRecord, ServiceError> {
        let url = endpoint_url(PROVIDER, &self.base_url, &["name", name.trim()])?;
        self.fetch(url, &[("fullText", "true")], name, lang).await
    }

    async fn fetch(
        &self,
        url: Url,
        query: &[(&str, &str)],
        what: &str,
        lang: &str,
    ) -> Result<CountryRecord, ServiceError> {
        tracing::debug!(url = %url, "Fetching country");
        let response = self.client.get(url).query(query).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(ServiceError::NotFound(format!("Country '{}'", what)));
        }
        let body: OneOrMany = read_json(PROVIDER, check_status(PROVIDER, response)?).await?;

        let raw = match body {
            OneOrMany::One(raw) => *raw,
            OneOrMany::Many(list) => list
                .into_iter()
                .next()
                .ok_or_else(|| ServiceError::NotFound(format!("Country '{}'", what)))?,
        };
        Ok(to_record(raw, lang))
    }
}

/// ISO 639-1 → the ISO 639-2 keys RestCountries uses for translations
fn translation_key(lang: &str) -> Option<&'static str> {
    let key = match lang.split(['-', '_']).next()?.to_lowercase().as_str() {
        "ar" => "ara",
        "br" => "bre",
        "cs" => "ces",
        "cy" => "cym",
        "de" => "deu",
        "es" => "spa",
        "et" => "est",
        "fa" => "per",
        "fi" => "fin",
        "fr" => "fra",
        "hr" => "hrv",
        "hu" => "hun",
        "it" => "ita",
        "ja" => "jpn",
        "ko" => "kor",
        "nl" => "nld",
        "pl" => "pol",
        "pt" => "por",
        "ru" => "rus",
        "sk" => "slk",
        "sv" => "swe",
        "ur" => "urd",
        "zh" => "zho",
        _ => return None,
    };
    Some(key)
}

fn to_record(raw: RawCountry, lang: &str) -> CountryRecord {
    let localized = translation_key(lang).and_then(|k| raw.translations.get(k));
    let (name, official_name) = match localized {
        Some(t) => (t.common.clone(), t.official.clone()),
        None => (raw.name.common, raw.name.official),
    };

    let mut currencies: Vec<String> = raw.currencies.into_keys().collect();
    currencies.sort();
    let mut languages: Vec<String> = raw.languages.into_values().collect();
    languages.sort();

    CountryRecord {
        code: raw.cca2.to_uppercase(),
        code3: raw.cca3,
        name,
        official_name,
        capital: raw.capital.into_iter().next(),
        region: raw.region,
        subregion: raw.subregion,
        population: raw.population,
        currencies,
        languages,
        flag: raw.flag,
        lat: raw.latlng.first().copied(),
        lng: raw.latlng.get(1).copied(),
        timezones: raw.timezones,
    }
}
