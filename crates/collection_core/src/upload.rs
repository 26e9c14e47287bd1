//! crates/collection_core/src/upload.rs
//!
//! The upload pipeline: compresses a raw photo into a full-size and a thumbnail
//! variant, stores both under the item's prefix and refreshes the item's images.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::{CompressionOptions, ImageEntry, RasterFormat};
use crate::error::{CatalogError, CatalogResult};
use crate::images::{item_prefix, ImageSyncManager, THUMB_MARKER};
use crate::ports::{AuthService, ImageCompressor, ObjectStorage};

/// Constraints for the full-size variant.
pub const FULL_VARIANT: CompressionOptions = CompressionOptions {
    max_dimension: 1000,
    quality: 0.8,
    format: RasterFormat::Jpeg,
};

/// Constraints for the thumbnail variant.
pub const THUMB_VARIANT: CompressionOptions = CompressionOptions {
    max_dimension: 250,
    quality: 0.75,
    format: RasterFormat::Jpeg,
};

/// Object paths of one uploaded image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadPaths {
    pub full: String,
    pub thumb: String,
}

impl UploadPaths {
    pub fn new(user_id: Uuid, item_id: Uuid, base: Uuid, format: RasterFormat) -> Self {
        let stem = format!("{}/{base}", item_prefix(user_id, item_id));
        let ext = format.extension();
        Self {
            full: format!("{stem}.{ext}"),
            thumb: format!("{stem}{THUMB_MARKER}.{ext}"),
        }
    }
}

pub struct UploadPipeline {
    auth: Arc<dyn AuthService>,
    storage: Arc<dyn ObjectStorage>,
    compressor: Arc<dyn ImageCompressor>,
    images: Arc<ImageSyncManager>,
    /// Running uploads per item.
    busy: Mutex<HashMap<Uuid, usize>>,
}

impl UploadPipeline {
    pub fn new(
        auth: Arc<dyn AuthService>,
        storage: Arc<dyn ObjectStorage>,
        compressor: Arc<dyn ImageCompressor>,
        images: Arc<ImageSyncManager>,
    ) -> Self {
        Self {
            auth,
            storage,
            compressor,
            images,
            busy: Mutex::new(HashMap::new()),
        }
    }

    /// Whether an upload for this item is currently running.
    pub async fn is_busy(&self, item_id: Uuid) -> bool {
        self.busy.lock().await.contains_key(&item_id)
    }

    /// Uploads one photo for an item and returns the item's refreshed images.
    ///
    /// The item stays busy until its last running upload ends, whatever the outcome.
    pub async fn upload(&self, item_id: Uuid, source: &[u8]) -> CatalogResult<Vec<ImageEntry>> {
        *self.busy.lock().await.entry(item_id).or_insert(0) += 1;
        let result = self.run(item_id, source).await;
        {
            let mut busy = self.busy.lock().await;
            if let Some(running) = busy.get_mut(&item_id) {
                *running -= 1;
                if *running == 0 {
                    busy.remove(&item_id);
                }
            }
        }
        result
    }

    async fn run(&self, item_id: Uuid, source: &[u8]) -> CatalogResult<Vec<ImageEntry>> {
        let user_id = self
            .auth
            .current_user()
            .await
            .map_err(|_| CatalogError::NoSession)?
            .ok_or(CatalogError::NoSession)?;

        let full = self
            .compressor
            .compress(source, &FULL_VARIANT)
            .await
            .map_err(CatalogError::Compression)?;
        let thumb = self
            .compressor
            .compress(source, &THUMB_VARIANT)
            .await
            .map_err(CatalogError::Compression)?;

        let paths = UploadPaths::new(user_id, item_id, Uuid::new_v4(), full.format);

        self.storage
            .upload(&paths.full, full.bytes, full.format.content_type())
            .await
            .map_err(CatalogError::Storage)?;

        if let Err(e) = self
            .storage
            .upload(&paths.thumb, thumb.bytes, thumb.format.content_type())
            .await
        {
            warn!(path = %paths.thumb, "Thumbnail upload failed: {}", e);
        }
        info!(%item_id, path = %paths.full, "Image uploaded.");

        match self.images.sync_item(item_id).await {
            Ok(entries) => Ok(entries),
            Err(e) => {
                warn!(%item_id, "Image refresh after upload failed: {}", e);
                Ok(self.images.entries(item_id).await)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeCompressor, FixedAuth, HeldListStorage, MemoryStorage};

    struct Fixture {
        storage: Arc<MemoryStorage>,
        images: Arc<ImageSyncManager>,
        pipeline: Arc<UploadPipeline>,
        user: Uuid,
    }

    fn fixture(user: Option<Uuid>) -> Fixture {
        let storage = Arc::new(MemoryStorage::default());
        let auth = Arc::new(FixedAuth(user));
        let images = Arc::new(ImageSyncManager::new(storage.clone(), auth.clone()));
        let pipeline = Arc::new(UploadPipeline::new(
            auth,
            storage.clone(),
            Arc::new(FakeCompressor::default()),
            images.clone(),
        ));
        Fixture {
            storage,
            images,
            pipeline,
            user: user.unwrap_or_default(),
        }
    }

    #[test]
    fn paths_are_namespaced_by_user_and_item() {
        let (user, item, base) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let paths = UploadPaths::new(user, item, base, RasterFormat::Jpeg);
        assert_eq!(paths.full, format!("{user}/{item}/{base}.jpg"));
        assert_eq!(paths.thumb, format!("{user}/{item}/{base}.thumb.jpg"));
    }

    #[tokio::test]
    async fn upload_stores_both_variants_and_syncs() {
        let f = fixture(Some(Uuid::new_v4()));
        let item = Uuid::new_v4();

        let entries = f.pipeline.upload(item, b"raw photo").await.expect("upload");

        assert_eq!(entries.len(), 1);
        assert!(entries[0].path_full.starts_with(&format!("{}/{item}/", f.user)));
        assert!(entries[0].path_thumb.is_some());
        assert_eq!(f.storage.uploads().await.len(), 2);
        assert_eq!(f.images.entries(item).await, entries);
        assert!(!f.pipeline.is_busy(item).await);
    }

    #[tokio::test]
    async fn failed_full_upload_skips_thumbnail_and_sync() {
        let f = fixture(Some(Uuid::new_v4()));
        let item = Uuid::new_v4();
        f.storage.fail_uploads_matching(|path| !path.contains(".thumb.")).await;

        let err = f.pipeline.upload(item, b"raw").await.expect_err("full upload fails");

        assert!(matches!(err, CatalogError::Storage(_)));
        assert!(f.storage.uploads().await.is_empty());
        assert_eq!(f.storage.list_calls().await, 0);
        assert!(!f.pipeline.is_busy(item).await);
    }

    #[tokio::test]
    async fn failed_thumbnail_upload_is_not_fatal() {
        let f = fixture(Some(Uuid::new_v4()));
        let item = Uuid::new_v4();
        f.storage.fail_uploads_matching(|path| path.contains(".thumb.")).await;

        let entries = f.pipeline.upload(item, b"raw").await.expect("degraded upload");

        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].path_thumb, None);
        assert_eq!(f.storage.uploads().await.len(), 1);
    }

    #[tokio::test]
    async fn item_stays_busy_until_its_last_upload_ends() {
        let auth = Arc::new(FixedAuth(Some(Uuid::new_v4())));
        // The first upload parks in its post-upload listing.
        let storage = Arc::new(HeldListStorage::holding_first(1));
        let images = Arc::new(ImageSyncManager::new(storage.clone(), auth.clone()));
        let pipeline = Arc::new(UploadPipeline::new(
            auth,
            storage.clone(),
            Arc::new(FakeCompressor::default()),
            images,
        ));
        let item = Uuid::new_v4();

        let first = tokio::spawn({
            let pipeline = pipeline.clone();
            async move { pipeline.upload(item, b"one").await }
        });
        storage.wait_for_held(1).await;

        pipeline.upload(item, b"two").await.expect("second upload");
        assert!(pipeline.is_busy(item).await);

        storage.release();
        first.await.expect("join").expect("first upload");
        assert!(!pipeline.is_busy(item).await);
    }

    #[tokio::test]
    async fn upload_without_session_is_rejected() {
        let f = fixture(None);
        let item = Uuid::new_v4();
        let err = f.pipeline.upload(item, b"raw").await.expect_err("no session");
        assert!(matches!(err, CatalogError::NoSession));
        assert_eq!(err.to_string(), "No user session");
        assert!(!f.pipeline.is_busy(item).await);
    }

    #[tokio::test]
    async fn error_message_is_surfaced_verbatim() {
        let f = fixture(Some(Uuid::new_v4()));
        f.storage.fail_uploads_matching(|_| true).await;
        let err = f
            .pipeline
            .upload(Uuid::new_v4(), b"raw")
            .await
            .expect_err("upload fails");
        assert_eq!(err.to_string(), "upload rejected");
    }
}
