//! crates/collection_core/src/mutations.rs
//!
//! The mutation gateway: item create/update/delete, image removal, and the
//! compensating delete that keeps a failed create from leaving an orphan row.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::domain::{ConfirmPrompt, ImageEntry, ItemDraft, ItemFields};
use crate::error::{CatalogError, CatalogResult};
use crate::images::ImageSyncManager;
use crate::ports::{Confirmer, ItemStore, ObjectStorage};

pub struct MutationGateway {
    store: Arc<dyn ItemStore>,
    storage: Arc<dyn ObjectStorage>,
    images: Arc<ImageSyncManager>,
    confirmer: Arc<dyn Confirmer>,
    creating: AtomicBool,
    /// Full path of the image whose removal is in flight.
    deleting: watch::Sender<Option<String>>,
}

impl MutationGateway {
    pub fn new(
        store: Arc<dyn ItemStore>,
        storage: Arc<dyn ObjectStorage>,
        images: Arc<ImageSyncManager>,
        confirmer: Arc<dyn Confirmer>,
    ) -> Self {
        Self {
            store,
            storage,
            images,
            confirmer,
            creating: AtomicBool::new(false),
            deleting: watch::channel(None).0,
        }
    }

    pub fn watch_deleting(&self) -> watch::Receiver<Option<String>> {
        self.deleting.subscribe()
    }

    /// Creates an item linked to `category_id`.
    ///
    /// Returns `Ok(None)` without touching the store when the title is blank or
    /// another create is still in flight. If linking fails, the inserted row is
    /// deleted again before the link error is returned.
    pub async fn create_item(
        &self,
        category_id: Uuid,
        draft: &ItemDraft,
    ) -> CatalogResult<Option<Uuid>> {
        let Some(fields) = ItemFields::from_draft(draft) else {
            return Ok(None);
        };
        if self.creating.swap(true, Ordering::AcqRel) {
            return Ok(None);
        }
        let result = self.insert_linked(category_id, &fields).await;
        self.creating.store(false, Ordering::Release);
        result.map(Some)
    }

    async fn insert_linked(&self, category_id: Uuid, fields: &ItemFields) -> CatalogResult<Uuid> {
        let item_id = self
            .store
            .insert_item(fields)
            .await
            .map_err(CatalogError::Store)?;

        if let Err(link_err) = self.store.link_category(item_id, category_id).await {
            warn!(%item_id, %category_id, "Linking item to category failed: {}", link_err);
            if let Err(e) = self.store.delete_item(item_id).await {
                error!(%item_id, "Compensating delete of orphaned item failed: {}", e);
            }
            return Err(CatalogError::Store(link_err));
        }

        info!(%item_id, %category_id, "Item created.");
        Ok(item_id)
    }

    /// Overwrites an item's editable fields. Returns the normalised record that was
    /// written, or `None` when the title is blank.
    pub async fn update_item(
        &self,
        item_id: Uuid,
        draft: &ItemDraft,
    ) -> CatalogResult<Option<ItemFields>> {
        let Some(fields) = ItemFields::from_draft(draft) else {
            return Ok(None);
        };
        self.store
            .update_item(item_id, &fields)
            .await
            .map_err(CatalogError::Store)?;
        Ok(Some(fields))
    }

    /// Deletes an item after the user confirmed. Returns `false` when declined.
    pub async fn delete_item(&self, item_id: Uuid) -> CatalogResult<bool> {
        if !self
            .confirmer
            .confirm(ConfirmPrompt::DeleteItem { item_id })
            .await
        {
            return Ok(false);
        }
        self.store
            .delete_item(item_id)
            .await
            .map_err(CatalogError::Store)?;
        info!(%item_id, "Item deleted.");
        Ok(true)
    }

    /// Removes both variants of an image after the user confirmed and drops it
    /// from the cached list. Returns `false` when declined.
    pub async fn delete_image(&self, item_id: Uuid, image: &ImageEntry) -> CatalogResult<bool> {
        if !self
            .confirmer
            .confirm(ConfirmPrompt::DeleteImage {
                item_id,
                path_full: image.path_full.clone(),
            })
            .await
        {
            return Ok(false);
        }

        self.deleting.send_replace(Some(image.path_full.clone()));
        let paths: Vec<String> = std::iter::once(image.path_full.clone())
            .chain(image.path_thumb.clone())
            .collect();
        let result = self.storage.remove(&paths).await;
        self.deleting.send_replace(None);

        result.map_err(CatalogError::Storage)?;
        self.images.forget(item_id, &image.path_full).await;
        Ok(true)
    }
}
