//! In-memory fakes of the service ports, shared by the unit tests.

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::{oneshot, Mutex};
use uuid::Uuid;

use crate::domain::{
    Category, CompressedImage, CompressionOptions, ConfirmPrompt, Item, ItemFields, ItemPage,
    ItemQuery, PlaceCandidate, SignedUrl, StoredObject,
};
use crate::ports::{
    AuthService, Confirmer, Geocoder, ImageCompressor, ItemStore, ListOptions, ListOrder,
    ObjectStorage, PortError, PortResult, PrefStore,
};

fn unused<T>() -> PortResult<T> {
    Err(PortError::Unexpected("not used by this test".into()))
}

pub fn item(title: &str) -> Item {
    Item {
        id: Uuid::new_v4(),
        title: title.into(),
        description: None,
        place: None,
        tags: Vec::new(),
        created_at: Utc::now(),
    }
}

//=========================================================================================
// Item stores
//=========================================================================================

#[derive(Debug, Clone)]
pub struct StoredRow {
    pub item: Item,
    pub categories: Vec<Uuid>,
}

#[derive(Default)]
struct MemoryStoreState {
    rows: Vec<StoredRow>,
    categories: Vec<Category>,
    deleted: usize,
    fail_search: bool,
    fail_link: bool,
}

/// A relational store kept in memory, with switchable failures.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryStoreState>,
}

impl MemoryStore {
    /// Inserts items into a category; earlier titles are newer.
    pub async fn seed(&self, category_id: Uuid, titles: &[&str]) {
        let mut state = self.state.lock().await;
        let now = Utc::now();
        for (i, title) in titles.iter().enumerate() {
            let mut it = item(title);
            it.created_at = now - ChronoDuration::seconds(i as i64);
            state.rows.push(StoredRow {
                item: it,
                categories: vec![category_id],
            });
        }
    }

    pub async fn seed_categories(&self, names: &[&str]) {
        let mut state = self.state.lock().await;
        for name in names {
            state.categories.push(Category {
                id: Uuid::new_v4(),
                name: name.to_string(),
            });
        }
    }

    pub async fn fail_search(&self, fail: bool) {
        self.state.lock().await.fail_search = fail;
    }

    pub async fn fail_link(&self, fail: bool) {
        self.state.lock().await.fail_link = fail;
    }

    pub async fn row(&self, item_id: Uuid) -> Option<StoredRow> {
        let state = self.state.lock().await;
        state.rows.iter().find(|r| r.item.id == item_id).cloned()
    }

    pub async fn row_count(&self) -> usize {
        self.state.lock().await.rows.len()
    }

    pub async fn deleted_count(&self) -> usize {
        self.state.lock().await.deleted
    }
}

fn matches_needle(item: &Item, needle: &str) -> bool {
    let needle = needle.to_lowercase();
    let contains = |s: &str| s.to_lowercase().contains(&needle);
    contains(item.title.as_str())
        || item.description.as_deref().is_some_and(contains)
        || item.place.as_deref().is_some_and(contains)
        || contains(item.tags.join(" ").as_str())
}

#[async_trait]
impl ItemStore for MemoryStore {
    async fn search_items(&self, query: &ItemQuery) -> PortResult<ItemPage> {
        let state = self.state.lock().await;
        if state.fail_search {
            return Err(PortError::Unexpected("search failed".into()));
        }
        let mut matching: Vec<Item> = state
            .rows
            .iter()
            .filter(|r| r.categories.contains(&query.category_id))
            .filter(|r| {
                query
                    .needle
                    .as_deref()
                    .map_or(true, |n| matches_needle(&r.item, n))
            })
            .map(|r| r.item.clone())
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let total = matching.len() as u64;
        let items = matching
            .into_iter()
            .skip(query.offset() as usize)
            .take(query.page_size as usize)
            .collect();
        Ok(ItemPage { items, total })
    }

    async fn insert_item(&self, fields: &ItemFields) -> PortResult<Uuid> {
        let mut it = item(&fields.title);
        it.apply(fields);
        let id = it.id;
        self.state.lock().await.rows.push(StoredRow {
            item: it,
            categories: Vec::new(),
        });
        Ok(id)
    }

    async fn link_category(&self, item_id: Uuid, category_id: Uuid) -> PortResult<()> {
        let mut state = self.state.lock().await;
        if state.fail_link {
            return Err(PortError::Unexpected("link failed".into()));
        }
        let row = state
            .rows
            .iter_mut()
            .find(|r| r.item.id == item_id)
            .ok_or_else(|| PortError::NotFound(item_id.to_string()))?;
        row.categories.push(category_id);
        Ok(())
    }

    async fn update_item(&self, item_id: Uuid, fields: &ItemFields) -> PortResult<()> {
        let mut state = self.state.lock().await;
        let row = state
            .rows
            .iter_mut()
            .find(|r| r.item.id == item_id)
            .ok_or_else(|| PortError::NotFound(item_id.to_string()))?;
        row.item.apply(fields);
        Ok(())
    }

    async fn delete_item(&self, item_id: Uuid) -> PortResult<()> {
        let mut state = self.state.lock().await;
        let before = state.rows.len();
        state.rows.retain(|r| r.item.id != item_id);
        state.deleted += before - state.rows.len();
        Ok(())
    }

    async fn list_categories(&self) -> PortResult<Vec<Category>> {
        Ok(self.state.lock().await.categories.clone())
    }

    async fn create_category(&self, name: &str) -> PortResult<Category> {
        let category = Category {
            id: Uuid::new_v4(),
            name: name.to_string(),
        };
        self.state.lock().await.categories.push(category.clone());
        Ok(category)
    }

    async fn delete_category(&self, category_id: Uuid) -> PortResult<()> {
        self.state
            .lock()
            .await
            .categories
            .retain(|c| c.id != category_id);
        Ok(())
    }
}

/// A store whose searches stay pending until the test resolves them,
/// so responses can be delivered out of issue order.
#[derive(Default)]
pub struct GatedStore {
    calls: Mutex<Vec<Option<oneshot::Sender<PortResult<ItemPage>>>>>,
}

impl GatedStore {
    /// Number of searches issued so far.
    pub async fn pending(&self) -> usize {
        self.calls.lock().await.len()
    }

    /// Yields to the scheduler until `count` searches were issued.
    pub async fn wait_for(&self, count: usize) {
        for _ in 0..10_000 {
            if self.pending().await >= count {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("expected {count} searches to be issued");
    }

    /// Completes the `index`-th issued search (0-based, issue order).
    pub async fn resolve(&self, index: usize, result: PortResult<ItemPage>) {
        let sender = self.calls.lock().await[index]
            .take()
            .expect("search already resolved");
        let _ = sender.send(result);
    }
}

#[async_trait]
impl ItemStore for GatedStore {
    async fn search_items(&self, _query: &ItemQuery) -> PortResult<ItemPage> {
        let (tx, rx) = oneshot::channel();
        self.calls.lock().await.push(Some(tx));
        rx.await
            .unwrap_or_else(|_| Err(PortError::Unexpected("gate dropped".into())))
    }

    async fn insert_item(&self, _fields: &ItemFields) -> PortResult<Uuid> {
        unused()
    }

    async fn link_category(&self, _item_id: Uuid, _category_id: Uuid) -> PortResult<()> {
        unused()
    }

    async fn update_item(&self, _item_id: Uuid, _fields: &ItemFields) -> PortResult<()> {
        unused()
    }

    async fn delete_item(&self, _item_id: Uuid) -> PortResult<()> {
        unused()
    }

    async fn list_categories(&self) -> PortResult<Vec<Category>> {
        unused()
    }

    async fn create_category(&self, _name: &str) -> PortResult<Category> {
        unused()
    }

    async fn delete_category(&self, _category_id: Uuid) -> PortResult<()> {
        unused()
    }
}

//=========================================================================================
// Object storage
//=========================================================================================

type UploadFilter = Box<dyn Fn(&str) -> bool + Send + Sync>;

#[derive(Default)]
struct MemoryStorageState {
    /// Object paths in insertion order (oldest first).
    objects: Vec<String>,
    uploads: Vec<String>,
    removals: Vec<Vec<String>>,
    list_calls: usize,
    sign_batches: usize,
    fail_list: bool,
    fail_sign: bool,
    fail_upload: Option<UploadFilter>,
}

/// An object store kept in memory. Signed URLs embed a counter so repeated
/// signing of the same path yields different URLs.
#[derive(Default)]
pub struct MemoryStorage {
    state: Mutex<MemoryStorageState>,
}

impl MemoryStorage {
    pub async fn put(&self, path: &str) {
        self.state.lock().await.objects.push(path.to_string());
    }

    pub async fn fail_list(&self, fail: bool) {
        self.state.lock().await.fail_list = fail;
    }

    pub async fn fail_sign(&self, fail: bool) {
        self.state.lock().await.fail_sign = fail;
    }

    pub async fn fail_uploads_matching(&self, filter: impl Fn(&str) -> bool + Send + Sync + 'static) {
        self.state.lock().await.fail_upload = Some(Box::new(filter));
    }

    /// Paths of successful uploads.
    pub async fn uploads(&self) -> Vec<String> {
        self.state.lock().await.uploads.clone()
    }

    pub async fn removals(&self) -> Vec<Vec<String>> {
        self.state.lock().await.removals.clone()
    }

    pub async fn list_calls(&self) -> usize {
        self.state.lock().await.list_calls
    }

    pub async fn sign_batches(&self) -> usize {
        self.state.lock().await.sign_batches
    }
}

#[async_trait]
impl ObjectStorage for MemoryStorage {
    async fn list(&self, prefix: &str, options: ListOptions) -> PortResult<Vec<StoredObject>> {
        let mut state = self.state.lock().await;
        state.list_calls += 1;
        if state.fail_list {
            return Err(PortError::Unexpected("list failed".into()));
        }
        let dir = format!("{prefix}/");
        let mut names: Vec<StoredObject> = state
            .objects
            .iter()
            .filter_map(|p| p.strip_prefix(&dir))
            .map(|name| StoredObject {
                name: name.to_string(),
            })
            .collect();
        if options.order == ListOrder::NewestFirst {
            names.reverse();
        }
        names.truncate(options.limit as usize);
        Ok(names)
    }

    async fn upload(&self, path: &str, _bytes: Vec<u8>, _content_type: &str) -> PortResult<()> {
        let mut state = self.state.lock().await;
        if state.fail_upload.as_ref().is_some_and(|f| f(path)) {
            return Err(PortError::Unexpected("upload rejected".into()));
        }
        state.objects.push(path.to_string());
        state.uploads.push(path.to_string());
        Ok(())
    }

    async fn create_signed_url(&self, path: &str, _expires_in: Duration) -> PortResult<String> {
        let state = self.state.lock().await;
        if state.fail_sign {
            return Err(PortError::Unexpected("sign failed".into()));
        }
        Ok(format!("https://signed.test/{path}?n={}", state.sign_batches))
    }

    async fn create_signed_urls(
        &self,
        paths: &[String],
        _expires_in: Duration,
    ) -> PortResult<Vec<SignedUrl>> {
        let mut state = self.state.lock().await;
        if state.fail_sign {
            return Err(PortError::Unexpected("sign failed".into()));
        }
        state.sign_batches += 1;
        let n = state.sign_batches;
        Ok(paths
            .iter()
            .map(|path| SignedUrl {
                path: path.clone(),
                url: format!("https://signed.test/{path}?n={n}"),
            })
            .collect())
    }

    async fn remove(&self, paths: &[String]) -> PortResult<()> {
        let mut state = self.state.lock().await;
        state.objects.retain(|p| !paths.contains(p));
        state.removals.push(paths.to_vec());
        Ok(())
    }
}

/// Signs one path per call through the provided batch method, failing the
/// paths that match `fail_path`.
#[derive(Default)]
pub struct PerPathStorage {
    pub inner: MemoryStorage,
    pub fail_path: Option<String>,
    pub sign_calls: std::sync::atomic::AtomicUsize,
}

#[async_trait]
impl ObjectStorage for PerPathStorage {
    async fn list(&self, prefix: &str, options: ListOptions) -> PortResult<Vec<StoredObject>> {
        self.inner.list(prefix, options).await
    }

    async fn upload(&self, path: &str, bytes: Vec<u8>, content_type: &str) -> PortResult<()> {
        self.inner.upload(path, bytes, content_type).await
    }

    async fn create_signed_url(&self, path: &str, expires_in: Duration) -> PortResult<String> {
        self.sign_calls
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        if self.fail_path.as_deref() == Some(path) {
            return Err(PortError::NotFound(path.to_string()));
        }
        self.inner.create_signed_url(path, expires_in).await
    }

    async fn remove(&self, paths: &[String]) -> PortResult<()> {
        self.inner.remove(paths).await
    }
}

/// A batch signer that silently answers for the first path only.
#[derive(Default)]
pub struct PartialBatchStorage {
    pub inner: MemoryStorage,
}

#[async_trait]
impl ObjectStorage for PartialBatchStorage {
    async fn list(&self, prefix: &str, options: ListOptions) -> PortResult<Vec<StoredObject>> {
        self.inner.list(prefix, options).await
    }

    async fn upload(&self, path: &str, bytes: Vec<u8>, content_type: &str) -> PortResult<()> {
        self.inner.upload(path, bytes, content_type).await
    }

    async fn create_signed_url(&self, path: &str, expires_in: Duration) -> PortResult<String> {
        self.inner.create_signed_url(path, expires_in).await
    }

    async fn create_signed_urls(
        &self,
        paths: &[String],
        expires_in: Duration,
    ) -> PortResult<Vec<SignedUrl>> {
        let mut signed = self.inner.create_signed_urls(paths, expires_in).await?;
        signed.truncate(1);
        Ok(signed)
    }

    async fn remove(&self, paths: &[String]) -> PortResult<()> {
        self.inner.remove(paths).await
    }
}

/// Holds the first `held` listings until [`HeldListStorage::release`]; later
/// listings pass straight through.
pub struct HeldListStorage {
    pub inner: MemoryStorage,
    held: std::sync::atomic::AtomicUsize,
    waiting: std::sync::atomic::AtomicUsize,
    gate: tokio::sync::Semaphore,
}

impl HeldListStorage {
    pub fn holding_first(held: usize) -> Self {
        Self {
            inner: MemoryStorage::default(),
            held: std::sync::atomic::AtomicUsize::new(held),
            waiting: Default::default(),
            gate: tokio::sync::Semaphore::new(0),
        }
    }

    /// Yields to the scheduler until `count` listings are parked at the gate.
    pub async fn wait_for_held(&self, count: usize) {
        for _ in 0..10_000 {
            if self.waiting.load(std::sync::atomic::Ordering::SeqCst) >= count {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("expected {count} listings to be held");
    }

    /// Lets every held listing continue.
    pub fn release(&self) {
        self.gate.close();
    }
}

#[async_trait]
impl ObjectStorage for HeldListStorage {
    async fn list(&self, prefix: &str, options: ListOptions) -> PortResult<Vec<StoredObject>> {
        use std::sync::atomic::Ordering::SeqCst;
        if self
            .held
            .fetch_update(SeqCst, SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            self.waiting.fetch_add(1, SeqCst);
            // Closing the semaphore is the release signal.
            let _ = self.gate.acquire().await;
        }
        self.inner.list(prefix, options).await
    }

    async fn upload(&self, path: &str, bytes: Vec<u8>, content_type: &str) -> PortResult<()> {
        self.inner.upload(path, bytes, content_type).await
    }

    async fn create_signed_url(&self, path: &str, expires_in: Duration) -> PortResult<String> {
        self.inner.create_signed_url(path, expires_in).await
    }

    async fn create_signed_urls(
        &self,
        paths: &[String],
        expires_in: Duration,
    ) -> PortResult<Vec<SignedUrl>> {
        self.inner.create_signed_urls(paths, expires_in).await
    }

    async fn remove(&self, paths: &[String]) -> PortResult<()> {
        self.inner.remove(paths).await
    }
}

//=========================================================================================
// Small collaborators
//=========================================================================================

pub struct FixedAuth(pub Option<Uuid>);

#[async_trait]
impl AuthService for FixedAuth {
    async fn current_user(&self) -> PortResult<Option<Uuid>> {
        Ok(self.0)
    }
}

/// Returns the source bytes tagged with the requested size.
#[derive(Default)]
pub struct FakeCompressor;

#[async_trait]
impl ImageCompressor for FakeCompressor {
    async fn compress(
        &self,
        source: &[u8],
        options: &CompressionOptions,
    ) -> PortResult<CompressedImage> {
        let mut bytes = options.max_dimension.to_le_bytes().to_vec();
        bytes.extend_from_slice(source);
        Ok(CompressedImage {
            bytes,
            format: options.format,
        })
    }
}

/// Answers every confirmation with the same decision.
pub struct ScriptedConfirmer(pub bool);

#[async_trait]
impl Confirmer for ScriptedConfirmer {
    async fn confirm(&self, _prompt: ConfirmPrompt) -> bool {
        self.0
    }
}

/// A preference store backed by a map; `broken` makes every access fail.
#[derive(Default)]
pub struct MemoryPrefs {
    pub values: std::sync::Mutex<HashMap<String, bool>>,
    pub broken: bool,
}

impl PrefStore for MemoryPrefs {
    fn get_bool(&self, key: &str) -> Option<bool> {
        if self.broken {
            return None;
        }
        self.values.lock().ok()?.get(key).copied()
    }

    fn set_bool(&self, key: &str, value: bool) -> PortResult<()> {
        if self.broken {
            return Err(PortError::Unexpected("storage unavailable".into()));
        }
        self.values
            .lock()
            .map_err(|e| PortError::Unexpected(e.to_string()))?
            .insert(key.to_string(), value);
        Ok(())
    }
}

/// A geocoder that answers after a delay and counts how many lookups completed.
pub struct SlowGeocoder {
    pub delay: Duration,
    pub hits: Vec<PlaceCandidate>,
    pub completed: std::sync::atomic::AtomicUsize,
    pub queries: Mutex<Vec<String>>,
}

impl SlowGeocoder {
    pub fn new(delay: Duration, hits: Vec<PlaceCandidate>) -> Self {
        Self {
            delay,
            hits,
            completed: Default::default(),
            queries: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl Geocoder for SlowGeocoder {
    async fn search(&self, query: &str, _limit: usize, _lang: &str) -> PortResult<Vec<PlaceCandidate>> {
        self.queries.lock().await.push(query.to_string());
        tokio::time::sleep(self.delay).await;
        self.completed
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        Ok(self.hits.clone())
    }
}
