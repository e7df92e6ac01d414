//! Persistence for fetched images
//!
//! `PhotoStore` is the storage collaborator the orchestrator writes through.
//! `DiskPhotoStore` keeps each image as a binary file plus a JSON metadata file
//! holding its attribution and expiry, and remembers which photo is pinned as the
//! primary photo of a location.

use chrono::{DateTime, Duration, Utc};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::PathBuf;

use super::orchestrator::MediaAsset;
use super::{AttributionInfo, ImageMeta};

/// Storage collaborator for fetched images
pub trait PhotoStore: Send + Sync {
    /// Reads a stored image, fresh or expired
    fn load(&self, key: &str) -> Option<CachedPhoto>;

    /// Stores an image, expiring after the asset's own TTL
    fn save(&self, key: &str, asset: &MediaAsset) -> io::Result<()>;

    /// Reads the image pinned as a location's primary photo
    fn primary_location_photo(&self, location_id: &str) -> Option<CachedPhoto>;

    /// Pins a stored image as a location's primary photo
    fn set_primary_location_photo(&self, location_id: &str, key: &str) -> io::Result<()>;
}

/// Metadata written next to each image file
#[derive(Debug, Serialize, Deserialize)]
struct PhotoEntry {
    key: String,
    content_type: String,
    attribution: AttributionInfo,
    #[serde(default)]
    meta: ImageMeta,
    cached_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

/// A stored image with freshness information
#[derive(Debug, Clone)]
pub struct CachedPhoto {
    pub key: String,
    pub buffer: Vec<u8>,
    pub content_type: String,
    pub attribution: AttributionInfo,
    pub meta: ImageMeta,
    pub cached_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// Whether the entry is past its expiry
    pub is_expired: bool,
}

/// Stores images in an XDG-compliant cache directory
///
/// Uses `~/.cache/wayfarer/photos/` on Linux, or the platform equivalent.
#[derive(Debug, Clone)]
pub struct DiskPhotoStore {
    dir: PathBuf,
}

impl DiskPhotoStore {
    /// Returns `None` if the cache directory cannot be determined (e.g., no home directory)
    pub fn new() -> Option<Self> {
        let project_dirs = ProjectDirs::from("", "", "wayfarer")?;
        Some(Self {
            dir: project_dirs.cache_dir().join("photos"),
        })
    }

    pub fn with_dir(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn dir(&self) -> &PathBuf {
        &self.dir
    }

    fn meta_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", file_stem(key)))
    }

    fn data_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.bin", file_stem(key)))
    }

    fn location_path(&self, location_id: &str) -> PathBuf {
        self.dir
            .join("locations")
            .join(format!("{}.json", file_stem(location_id)))
    }
}

impl PhotoStore for DiskPhotoStore {
    fn load(&self, key: &str) -> Option<CachedPhoto> {
        let content = fs::read_to_string(self.meta_path(key)).ok()?;
        let entry: PhotoEntry = serde_json::from_str(&content).ok()?;
        let buffer = fs::read(self.data_path(key)).ok()?;

        Some(CachedPhoto {
            is_expired: Utc::now() > entry.expires_at,
            key: entry.key,
            buffer,
            content_type: entry.content_type,
            attribution: entry.attribution,
            meta: entry.meta,
            cached_at: entry.cached_at,
            expires_at: entry.expires_at,
        })
    }

    fn save(&self, key: &str, asset: &MediaAsset) -> io::Result<()> {
        fs::create_dir_all(&self.dir)?;

        let now = Utc::now();
        let ttl = Duration::from_std(asset.image.ttl).unwrap_or(Duration::MAX);
        let entry = PhotoEntry {
            key: key.to_string(),
            content_type: asset.image.content_type.clone(),
            attribution: asset.attribution.clone(),
            meta: asset.image.meta.clone(),
            cached_at: now,
            expires_at: now.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC),
        };
        let json = serde_json::to_string_pretty(&entry)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        // Bytes first so a metadata file never points at a missing image
        fs::write(self.data_path(key), &asset.image.buffer)?;
        fs::write(self.meta_path(key), json)
    }

    fn primary_location_photo(&self, location_id: &str) -> Option<CachedPhoto> {
        let key = fs::read_to_string(self.location_path(location_id)).ok()?;
        let key: String = serde_json::from_str(&key).ok()?;
        self.load(&key)
    }

    fn set_primary_location_photo(&self, location_id: &str, key: &str) -> io::Result<()> {
        let path = self.location_path(location_id);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string(key)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        fs::write(path, json)
    }
}

/// Length of the hash suffix in hex characters
const HASH_SUFFIX_LEN: usize = 16;

/// Maps an arbitrary key to a safe, stable file name
///
/// Alphanumerics are kept, everything else becomes `_`, and a BLAKE3 suffix keeps
/// keys that sanitize to the same text apart.
fn file_stem(key: &str) -> String {
    let readable: String = key
        .chars()
        .take(80)
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
        .collect();
    let hash = blake3::hash(key.as_bytes()).to_hex();
    format!("{}_{}", readable, &hash.as_str()[..HASH_SUFFIX_LEN])
}
