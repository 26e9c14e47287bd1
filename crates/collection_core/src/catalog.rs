//! crates/collection_core/src/catalog.rs
//!
//! The catalog view: one category's result page with its images, wired to the
//! query coordinator, image sync manager, upload pipeline and mutation gateway.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::domain::{ImageEntry, ItemDraft};
use crate::error::{CatalogError, CatalogResult};
use crate::images::ImageSyncManager;
use crate::mutations::MutationGateway;
use crate::ports::{
    AuthService, Confirmer, ImageCompressor, ItemStore, ObjectStorage, PortError, PrefStore,
};
use crate::prefs::PanelPref;
use crate::query::{FetchOutcome, PageView, QueryCoordinator};
use crate::upload::UploadPipeline;

/// The ports a catalog view is built from.
#[derive(Clone)]
pub struct CatalogServices {
    pub store: Arc<dyn ItemStore>,
    pub storage: Arc<dyn ObjectStorage>,
    pub auth: Arc<dyn AuthService>,
    pub compressor: Arc<dyn ImageCompressor>,
    pub confirmer: Arc<dyn Confirmer>,
    pub prefs: Arc<dyn PrefStore>,
}

/// A visible page together with the images of its items.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageWithImages {
    /// Request token of the fetch that produced `page`.
    pub token: u64,
    pub page: PageView,
    pub images: HashMap<Uuid, Vec<ImageEntry>>,
}

/// The outcome of an image delete request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImageDeletion {
    pub deleted: bool,
    /// The deleted image was open in the full-screen viewer, which is now closed.
    pub viewer_closed: bool,
}

pub struct CatalogView {
    prefs: Arc<dyn PrefStore>,
    query: QueryCoordinator,
    images: Arc<ImageSyncManager>,
    uploads: UploadPipeline,
    mutations: MutationGateway,
    panel: Mutex<PanelPref>,
    /// Full path of the image shown in the full-screen viewer.
    viewer: Mutex<Option<String>>,
}

impl CatalogView {
    pub fn new(services: CatalogServices, category_id: Uuid) -> Self {
        let images = Arc::new(ImageSyncManager::new(
            services.storage.clone(),
            services.auth.clone(),
        ));
        Self {
            query: QueryCoordinator::new(services.store.clone(), category_id),
            uploads: UploadPipeline::new(
                services.auth.clone(),
                services.storage.clone(),
                services.compressor.clone(),
                images.clone(),
            ),
            mutations: MutationGateway::new(
                services.store.clone(),
                services.storage.clone(),
                images.clone(),
                services.confirmer.clone(),
            ),
            panel: Mutex::new(PanelPref::load(services.prefs.clone(), category_id, false)),
            prefs: services.prefs,
            images,
            viewer: Mutex::new(None),
        }
    }

    pub async fn snapshot(&self) -> PageView {
        self.query.snapshot().await
    }

    pub async fn images(&self, item_id: Uuid) -> Vec<ImageEntry> {
        self.images.entries(item_id).await
    }

    /// Fetches the current page and re-syncs its images.
    ///
    /// Returns `None` when a newer request was issued before the page or its
    /// images were ready.
    pub async fn refresh(&self) -> CatalogResult<Option<PageWithImages>> {
        let (token, page) = match self.query.fetch().await? {
            FetchOutcome::Applied { token, view } => (token, view),
            FetchOutcome::Stale => return Ok(None),
        };

        let ids: Vec<Uuid> = page.items.iter().map(|i| i.id).collect();
        if !ids.is_empty() {
            self.images.sync_items(&ids).await;
        }
        if !self.query.is_current(token).await {
            debug!(token, "Page superseded during image sync; not publishing.");
            return Ok(None);
        }

        let mut images = HashMap::with_capacity(ids.len());
        for id in ids {
            images.insert(id, self.images.entries(id).await);
        }
        Ok(Some(PageWithImages {
            token,
            page,
            images,
        }))
    }

    /// Whether `token` still belongs to the most recently issued fetch.
    pub async fn is_current(&self, token: u64) -> bool {
        self.query.is_current(token).await
    }

    /// Handles a keystroke in the search box. Fetches once the input settles.
    pub async fn search(&self, raw: &str) -> CatalogResult<Option<PageWithImages>> {
        if self.query.settle_query(raw).await {
            self.refresh().await
        } else {
            Ok(None)
        }
    }

    pub async fn select_category(&self, category_id: Uuid) -> CatalogResult<Option<PageWithImages>> {
        if !self.query.set_category(category_id).await {
            return Ok(None);
        }
        *self.panel.lock().await = PanelPref::load(self.prefs.clone(), category_id, false);
        self.refresh().await
    }

    pub async fn select_page(&self, page: u32) -> CatalogResult<Option<PageWithImages>> {
        if !self.query.set_page(page).await {
            return Ok(None);
        }
        self.refresh().await
    }

    pub async fn panel_open(&self) -> bool {
        self.panel.lock().await.is_open()
    }

    pub async fn set_panel_open(&self, open: bool) {
        self.panel.lock().await.set(open);
    }

    /// Creates an item in the current category, closes the "add entry" panel
    /// and reloads the page.
    pub async fn create_item(&self, draft: &ItemDraft) -> CatalogResult<Option<Uuid>> {
        let category_id = self.query.category_id().await;
        let created = self.mutations.create_item(category_id, draft).await?;
        if created.is_some() {
            self.set_panel_open(false).await;
            self.reload_after_mutation().await;
        }
        Ok(created)
    }

    /// Overwrites an item and patches it on the visible page.
    pub async fn update_item(&self, item_id: Uuid, draft: &ItemDraft) -> CatalogResult<bool> {
        match self.mutations.update_item(item_id, draft).await? {
            Some(fields) => {
                self.query.patch_item(item_id, &fields).await;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub async fn delete_item(&self, item_id: Uuid) -> CatalogResult<bool> {
        let deleted = self.mutations.delete_item(item_id).await?;
        if deleted {
            self.reload_after_mutation().await;
        }
        Ok(deleted)
    }

    pub async fn upload_image(&self, item_id: Uuid, source: &[u8]) -> CatalogResult<Vec<ImageEntry>> {
        self.uploads.upload(item_id, source).await
    }

    pub async fn is_uploading(&self, item_id: Uuid) -> bool {
        self.uploads.is_busy(item_id).await
    }

    /// Follows the full path of the image whose removal is in flight.
    pub fn watch_deleting(&self) -> watch::Receiver<Option<String>> {
        self.mutations.watch_deleting()
    }

    pub async fn delete_image(&self, item_id: Uuid, path_full: &str) -> CatalogResult<ImageDeletion> {
        let entry = self
            .images
            .entries(item_id)
            .await
            .into_iter()
            .find(|e| e.path_full == path_full)
            .ok_or_else(|| CatalogError::Storage(PortError::NotFound(path_full.to_string())))?;

        if !self.mutations.delete_image(item_id, &entry).await? {
            return Ok(ImageDeletion::default());
        }

        let mut viewer = self.viewer.lock().await;
        let viewer_closed = viewer.as_deref() == Some(path_full);
        if viewer_closed {
            *viewer = None;
        }
        Ok(ImageDeletion {
            deleted: true,
            viewer_closed,
        })
    }

    /// Opens an image in the full-screen viewer and returns its signed URL.
    pub async fn open_viewer(&self, item_id: Uuid, path_full: &str) -> Option<String> {
        let url = self
            .images
            .entries(item_id)
            .await
            .into_iter()
            .find(|e| e.path_full == path_full)
            .map(|e| e.url_full)?;
        *self.viewer.lock().await = Some(path_full.to_string());
        Some(url)
    }

    pub async fn close_viewer(&self) {
        *self.viewer.lock().await = None;
    }

    pub async fn viewer(&self) -> Option<String> {
        self.viewer.lock().await.clone()
    }

    async fn reload_after_mutation(&self) {
        if let Err(e) = self.refresh().await {
            warn!("Reload after mutation failed: {}", e);
        }
    }
}
