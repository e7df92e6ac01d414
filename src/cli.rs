//! Command-line interface parsing for wayfarer
//!
//! Three subcommands map onto the three services: `weather`, `geo` and `photo`.
//! Free-form values (units, provider names) are parsed after clap so that the
//! error messages can list the accepted values.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use thiserror::Error;

use crate::geo::GeoParams;
use crate::media::{ImageRequest, ProviderKind};
use crate::weather::{Units, WeatherOptions};

/// Error types for CLI argument parsing
#[derive(Debug, Error)]
pub enum CliError {
    /// The specified provider name is not recognized
    #[error("Invalid provider: '{0}'. Valid providers: unsplash, places, wikimedia")]
    InvalidProvider(String),

    /// The specified units are not recognized
    #[error("Invalid units: '{0}'. Valid units: metric, imperial, standard")]
    InvalidUnits(String),

    /// `photo` was given nothing to look up
    #[error("Nothing to look up: pass --id, --query or --url")]
    MissingImageSource,
}

/// Wayfarer - travel media, country basics and weather lookups
#[derive(Parser, Debug)]
#[command(name = "wayfarer")]
#[command(about = "Travel photos with attribution, country and city basics, and weather")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Current weather and a 5 day forecast for a location
    Weather(WeatherArgs),
    /// Country and city basics
    Geo(GeoArgs),
    /// Fetch a photo with attribution
    ///
    /// Examples:
    ///   wayfarer photo --query "Machu Picchu" --out machu.jpg
    ///   wayfarer photo --id "File:Lima.jpg" --provider wikimedia
    Photo(PhotoArgs),
}

#[derive(Args, Debug)]
pub struct WeatherArgs {
    #[arg(long, allow_negative_numbers = true)]
    pub lat: f64,
    #[arg(long, allow_negative_numbers = true)]
    pub lng: f64,
    /// metric, imperial or standard
    #[arg(long, default_value = "metric")]
    pub units: String,
    #[arg(long, default_value = "en")]
    pub lang: String,
}

impl WeatherArgs {
    pub fn options(&self) -> Result<WeatherOptions, CliError> {
        Ok(WeatherOptions {
            units: parse_units_arg(&self.units)?,
            lang: self.lang.clone(),
        })
    }
}

#[derive(Args, Debug)]
pub struct GeoArgs {
    /// ISO 3166 alpha-2 or alpha-3 code
    #[arg(long, value_name = "CODE")]
    pub country_code: Option<String>,
    #[arg(long, value_name = "NAME", conflicts_with = "country_code")]
    pub country_name: Option<String>,
    #[arg(long, value_name = "NAME")]
    pub city: Option<String>,
    #[arg(long, allow_negative_numbers = true, requires = "lng")]
    pub lat: Option<f64>,
    #[arg(long, allow_negative_numbers = true, requires = "lat")]
    pub lng: Option<f64>,
    #[arg(long, default_value = "en")]
    pub lang: String,
}

impl GeoArgs {
    pub fn params(&self) -> GeoParams {
        GeoParams {
            country_code: self.country_code.clone(),
            country_name: self.country_name.clone(),
            city_name: self.city.clone(),
            lat: self.lat,
            lng: self.lng,
            lang: Some(self.lang.clone()),
        }
    }
}

#[derive(Args, Debug)]
pub struct PhotoArgs {
    /// Provider-native id: Unsplash photo id, Google photo reference or Commons file title
    #[arg(long)]
    pub id: Option<String>,
    #[arg(long)]
    pub query: Option<String>,
    /// Direct Wikimedia Commons image URL
    #[arg(long)]
    pub url: Option<String>,
    #[arg(long)]
    pub width: Option<u32>,
    /// Only ask this provider (unsplash, places, wikimedia)
    #[arg(long)]
    pub provider: Option<String>,
    /// Pin the photo as the primary photo of this location
    #[arg(long, value_name = "ID")]
    pub location_id: Option<String>,
    /// Where to write the image bytes
    #[arg(long, value_name = "FILE")]
    pub out: Option<PathBuf>,
}

impl PhotoArgs {
    pub fn request(&self) -> Result<ImageRequest, CliError> {
        let request = ImageRequest {
            id: self.id.clone(),
            query: self.query.clone(),
            url: self.url.clone(),
            width: self.width,
            provider: self.provider.as_deref().map(parse_provider_arg).transpose()?,
        };
        if request.is_empty() {
            return Err(CliError::MissingImageSource);
        }
        Ok(request)
    }
}

/// Parses a provider name into a ProviderKind.
///
/// # Arguments
/// * `s` - The provider string from CLI
///
/// # Returns
/// * `Ok(ProviderKind)` if the string names a known provider
/// * `Err(CliError::InvalidProvider)` if it doesn't
pub fn parse_provider_arg(s: &str) -> Result<ProviderKind, CliError> {
    ProviderKind::from_str(s).ok_or_else(|| CliError::InvalidProvider(s.to_string()))
}

/// Parses a units string into Units.
pub fn parse_units_arg(s: &str) -> Result<Units, CliError> {
    Units::from_str(s).ok_or_else(|| CliError::InvalidUnits(s.to_string()))
}
