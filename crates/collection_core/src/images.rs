//! crates/collection_core/src/images.rs
//!
//! The image sync manager: discovers the stored photos of each item, pairs
//! full-size and thumbnail variants and resolves them to signed display URLs.

use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::domain::ImageEntry;
use crate::error::{CatalogError, CatalogResult};
use crate::ports::{AuthService, ListOptions, ListOrder, ObjectStorage, PortError};

/// Upper bound on objects listed per item.
pub const IMAGE_LIST_LIMIT: u32 = 48;

/// Lifetime of a signed display URL.
pub const SIGNED_URL_TTL: Duration = Duration::from_secs(3600);

/// Marker between the base name and the extension of a thumbnail object.
pub const THUMB_MARKER: &str = ".thumb";

/// Storage prefix holding every object of one item.
pub fn item_prefix(user_id: Uuid, item_id: Uuid) -> String {
    format!("{user_id}/{item_id}")
}

/// Splits an object name into its shared base key and whether it is a thumbnail.
fn split_variant(name: &str) -> (&str, bool) {
    let stem = match name.rfind('.') {
        Some(dot) if dot > 0 => &name[..dot],
        _ => name,
    };
    match stem.strip_suffix(THUMB_MARKER) {
        Some(base) if !base.is_empty() => (base, true),
        _ => (stem, false),
    }
}

/// A full variant and its thumbnail, if one was listed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantPair {
    pub full: String,
    pub thumb: Option<String>,
}

/// Groups object names by base key, keeping the order in which bases first appear.
///
/// Thumbnails whose base has no full variant are dropped.
pub fn pair_variants<'a>(names: impl IntoIterator<Item = &'a str>) -> Vec<VariantPair> {
    let mut order: Vec<&str> = Vec::new();
    let mut slots: HashMap<&str, (Option<&str>, Option<&str>)> = HashMap::new();

    for name in names {
        let (base, is_thumb) = split_variant(name);
        let slot = slots.entry(base).or_insert_with(|| {
            order.push(base);
            (None, None)
        });
        if is_thumb {
            slot.1 = Some(name);
        } else {
            slot.0 = Some(name);
        }
    }

    order
        .into_iter()
        .filter_map(|base| {
            let (full, thumb) = slots.remove(base)?;
            Some(VariantPair {
                full: full?.to_string(),
                thumb: thumb.map(str::to_string),
            })
        })
        .collect()
}

pub struct ImageSyncManager {
    storage: Arc<dyn ObjectStorage>,
    auth: Arc<dyn AuthService>,
    cache: Mutex<HashMap<Uuid, Vec<ImageEntry>>>,
}

impl ImageSyncManager {
    pub fn new(storage: Arc<dyn ObjectStorage>, auth: Arc<dyn AuthService>) -> Self {
        Self {
            storage,
            auth,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// The cached entries of an item; empty when it was never synced.
    pub async fn entries(&self, item_id: Uuid) -> Vec<ImageEntry> {
        self.cache
            .lock()
            .await
            .get(&item_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Re-syncs one item. On failure its cached entries are left untouched.
    pub async fn sync_item(&self, item_id: Uuid) -> CatalogResult<Vec<ImageEntry>> {
        let entries = self.load_entries(item_id).await?;
        self.cache.lock().await.insert(item_id, entries.clone());
        Ok(entries)
    }

    /// Re-syncs several items concurrently and returns the ones that succeeded.
    ///
    /// Every successful item is replaced in one update; failed items keep their
    /// previous entries.
    pub async fn sync_items(&self, item_ids: &[Uuid]) -> HashMap<Uuid, Vec<ImageEntry>> {
        let results = join_all(item_ids.iter().map(|&item_id| async move {
            (item_id, self.load_entries(item_id).await)
        }))
        .await;

        let mut synced = HashMap::new();
        for (item_id, result) in results {
            match result {
                Ok(entries) => {
                    synced.insert(item_id, entries);
                }
                Err(e) => warn!(%item_id, "Image sync failed: {}", e),
            }
        }

        if !synced.is_empty() {
            let mut cache = self.cache.lock().await;
            for (item_id, entries) in &synced {
                cache.insert(*item_id, entries.clone());
            }
        }
        synced
    }

    /// Drops one image from an item's cached list after it was removed from storage.
    pub async fn forget(&self, item_id: Uuid, path_full: &str) {
        if let Some(entries) = self.cache.lock().await.get_mut(&item_id) {
            entries.retain(|e| e.path_full != path_full);
        }
    }

    async fn load_entries(&self, item_id: Uuid) -> CatalogResult<Vec<ImageEntry>> {
        let user_id = self
            .auth
            .current_user()
            .await
            .map_err(|_| CatalogError::NoSession)?
            .ok_or(CatalogError::NoSession)?;

        let prefix = item_prefix(user_id, item_id);
        let objects = self
            .storage
            .list(
                &prefix,
                ListOptions {
                    limit: IMAGE_LIST_LIMIT,
                    order: ListOrder::NewestFirst,
                },
            )
            .await
            .map_err(CatalogError::Storage)?;

        let pairs: Vec<(String, Option<String>)> = pair_variants(objects.iter().map(|o| o.name.as_str()))
            .into_iter()
            .map(|pair| {
                (
                    format!("{prefix}/{}", pair.full),
                    pair.thumb.map(|thumb| format!("{prefix}/{thumb}")),
                )
            })
            .collect();

        let to_sign: Vec<String> = pairs
            .iter()
            .flat_map(|(full, thumb)| std::iter::once(full.clone()).chain(thumb.clone()))
            .collect();
        if to_sign.is_empty() {
            return Ok(Vec::new());
        }

        let signed: HashMap<String, String> = self
            .storage
            .create_signed_urls(&to_sign, SIGNED_URL_TTL)
            .await
            .map_err(CatalogError::Storage)?
            .into_iter()
            .map(|s| (s.path, s.url))
            .collect();

        // A partial answer would shrink the cached list, so it fails the whole item.
        if let Some(missing) = to_sign.iter().find(|p| !signed.contains_key(*p)) {
            debug!(%item_id, path = %missing, "Signing returned no URL for a listed object.");
            return Err(CatalogError::Storage(PortError::Unexpected(format!(
                "No signed URL returned for {missing}"
            ))));
        }

        let entries = pairs
            .into_iter()
            .map(|(path_full, path_thumb)| ImageEntry {
                url_full: signed.get(&path_full).cloned().unwrap_or_default(),
                url_thumb: path_thumb.as_ref().and_then(|p| signed.get(p).cloned()),
                path_full,
                path_thumb,
            })
            .collect();
        Ok(entries)
    }
}
