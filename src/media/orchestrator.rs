//! Provider selection, fallback and persistence for image lookups

use std::sync::Arc;

use super::store::{CachedPhoto, DiskPhotoStore, PhotoStore};
use super::{AttributionInfo, ImageRequest, ImageResult, Provider, ProviderKind};
use crate::config::Config;
use crate::error::ServiceError;

/// An image together with the attribution that must accompany it
#[derive(Debug, Clone)]
pub struct MediaAsset {
    pub image: ImageResult,
    pub attribution: AttributionInfo,
    /// Whether the image came from the photo store instead of a provider
    pub cache_hit: bool,
}

impl MediaAsset {
    fn from_cached(photo: CachedPhoto) -> Self {
        let remaining = (photo.expires_at - chrono::Utc::now())
            .to_std()
            .unwrap_or_default();
        Self {
            image: ImageResult {
                buffer: photo.buffer,
                content_type: photo.content_type,
                ttl: remaining,
                meta: photo.meta,
            },
            attribution: photo.attribution,
            cache_hit: true,
        }
    }
}

/// Tries providers in priority order and persists what they return
pub struct MediaOrchestrator {
    providers: Vec<Provider>,
    store: Option<Arc<dyn PhotoStore>>,
}

impl std::fmt::Debug for MediaOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaOrchestrator")
            .field("providers", &self.providers)
            .field("store", &self.store.is_some())
            .finish()
    }
}

impl MediaOrchestrator {
    /// `providers` are tried in the order given
    pub fn new(providers: Vec<Provider>, store: Option<Arc<dyn PhotoStore>>) -> Self {
        Self { providers, store }
    }

    /// Builds all adapters from configuration, storing photos on disk
    pub fn from_config(config: &Config) -> Self {
        let store = match &config.cache_dir {
            Some(dir) => Some(DiskPhotoStore::with_dir(dir.join("photos"))),
            None => DiskPhotoStore::new(),
        };
        if store.is_none() {
            tracing::warn!("No cache directory available, photos will not be persisted");
        }
        Self::new(
            Provider::all_from_config(config),
            store.map(|s| Arc::new(s) as Arc<dyn PhotoStore>),
        )
    }

    /// All configured providers, in priority order
    pub fn providers(&self) -> Vec<ProviderKind> {
        self.providers.iter().map(Provider::kind).collect()
    }

    pub fn enabled_providers(&self) -> Vec<ProviderKind> {
        self.providers
            .iter()
            .filter(|p| p.is_enabled())
            .map(Provider::kind)
            .collect()
    }

    /// Returns a stored image for the request, or fetches one
    ///
    /// Enabled providers are tried in priority order (or only the pinned one); a
    /// provider failure moves on to the next and the last failure is returned if
    /// none succeeds.
    pub async fn fetch(&self, request: &ImageRequest) -> Result<MediaAsset, ServiceError> {
        if request.is_empty() {
            return Err(ServiceError::NotFound(
                "Image request has no id, URL or query".to_string(),
            ));
        }

        let key = media_cache_key(request);
        if let Some(photo) = self.store.as_ref().and_then(|s| s.load(&key)) {
            if !photo.is_expired {
                tracing::debug!(key = %key, "Photo store hit");
                return Ok(MediaAsset::from_cached(photo));
            }
            tracing::debug!(key = %key, "Stored photo expired");
        }

        let mut last_error = None;
        let candidates = self
            .providers
            .iter()
            .filter(|p| request.provider.map_or(true, |kind| p.kind() == kind));

        for provider in candidates {
            let kind = provider.kind();
            if !provider.is_enabled() {
                tracing::debug!(provider = %kind, "Skipping disabled provider");
                continue;
            }

            match provider.fetch_image(request).await {
                Ok(image) => {
                    let attribution = provider.attribution(request, &image);
                    let asset = MediaAsset {
                        image,
                        attribution,
                        cache_hit: false,
                    };
                    tracing::info!(provider = %kind, key = %key, "Fetched image");
                    self.persist(&key, &asset);
                    return Ok(asset);
                }
                Err(e) => {
                    tracing::warn!(provider = %kind, error = %e, "Image provider failed");
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            let name = request
                .provider
                .map(|k| k.to_string())
                .unwrap_or_else(|| "Image provider".to_string());
            ServiceError::NotEnabled(name)
        }))
    }

    /// Returns the photo pinned for a location, fetching and pinning one if needed
    pub async fn primary_location_photo(
        &self,
        location_id: &str,
        request: &ImageRequest,
    ) -> Result<MediaAsset, ServiceError> {
        if let Some(photo) = self
            .store
            .as_ref()
            .and_then(|s| s.primary_location_photo(location_id))
        {
            if !photo.is_expired {
                return Ok(MediaAsset::from_cached(photo));
            }
        }

        let asset = self.fetch(request).await?;
        if let Some(store) = &self.store {
            if let Err(e) = store.set_primary_location_photo(location_id, &media_cache_key(request)) {
                tracing::warn!(location_id, error = %e, "Failed to pin location photo");
            }
        }
        Ok(asset)
    }

    fn persist(&self, key: &str, asset: &MediaAsset) {
        if let Some(store) = &self.store {
            if let Err(e) = store.save(key, asset) {
                tracing::warn!(key, error = %e, "Failed to persist photo");
            }
        }
    }
}

/// Normalized storage key for an image request
///
/// Ids and URLs are kept verbatim (Unsplash ids are case-sensitive); queries are
/// lowercased with whitespace collapsed.
pub fn media_cache_key(request: &ImageRequest) -> String {
    let provider = request.provider.map_or("any", |p| p.as_str());

    let mut parts = Vec::new();
    if let Some(id) = request.id.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        parts.push(format!("id={}", id));
    }
    if let Some(url) = request.url.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        parts.push(format!("url={}", url));
    }
    if let Some(query) = request.query.as_deref() {
        let normalized = query
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase();
        if !normalized.is_empty() {
            parts.push(format!("q={}", normalized));
        }
    }

    let width = request
        .width
        .map_or_else(|| "auto".to_string(), |w| w.to_string());

    format!("media:{}:{}:{}", provider, parts.join("|"), width)
}
