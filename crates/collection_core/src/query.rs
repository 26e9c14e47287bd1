//! crates/collection_core/src/query.rs
//!
//! The query coordinator: owns the filter and page state of a catalog view,
//! issues searches against the item store and discards out-of-order responses.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use crate::domain::{Item, ItemFields, ItemQuery};
use crate::error::{CatalogError, CatalogResult};
use crate::ports::ItemStore;

/// Number of items shown per result page.
pub const PAGE_SIZE: u32 = 6;

/// Quiet period before typed search text becomes the applied query.
pub const SEARCH_DEBOUNCE: Duration = Duration::from_millis(200);

/// Total page count for a result set of `total` rows.
pub fn total_pages(total: u64) -> u32 {
    u32::try_from(total.div_ceil(u64::from(PAGE_SIZE))).unwrap_or(u32::MAX)
}

/// A snapshot of what the catalog view currently displays.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageView {
    pub category_id: Uuid,
    pub query: String,
    pub page: u32,
    pub total: u64,
    pub total_pages: u32,
    pub loading: bool,
    pub items: Vec<Item>,
}

/// The result of one fetch cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The response belonged to the latest request and is now visible.
    ///
    /// Work derived from it should re-check `token` with
    /// [`QueryCoordinator::is_current`] before it is shown.
    Applied { token: u64, view: PageView },
    /// A newer request was issued while this one was pending; its result was dropped.
    Stale,
}

struct QueryState {
    category_id: Uuid,
    applied_query: String,
    page: u32,
    items: Vec<Item>,
    total: u64,
    loading: bool,
    /// Token of the most recently issued fetch.
    latest_token: u64,
    /// Bumped on every keystroke; only the newest input survives the debounce window.
    input_generation: u64,
}

impl QueryState {
    fn view(&self) -> PageView {
        PageView {
            category_id: self.category_id,
            query: self.applied_query.clone(),
            page: self.page,
            total: self.total,
            total_pages: total_pages(self.total),
            loading: self.loading,
            items: self.items.clone(),
        }
    }
}

pub struct QueryCoordinator {
    store: Arc<dyn ItemStore>,
    state: Mutex<QueryState>,
}

impl QueryCoordinator {
    pub fn new(store: Arc<dyn ItemStore>, category_id: Uuid) -> Self {
        Self {
            store,
            state: Mutex::new(QueryState {
                category_id,
                applied_query: String::new(),
                page: 1,
                items: Vec::new(),
                total: 0,
                loading: false,
                latest_token: 0,
                input_generation: 0,
            }),
        }
    }

    pub async fn snapshot(&self) -> PageView {
        self.state.lock().await.view()
    }

    pub async fn category_id(&self) -> Uuid {
        self.state.lock().await.category_id
    }

    /// Whether no fetch was issued after the one that returned `token`.
    pub async fn is_current(&self, token: u64) -> bool {
        self.state.lock().await.latest_token == token
    }

    /// Switches the category. Returns `true` (and resets to page 1) when it changed.
    pub async fn set_category(&self, category_id: Uuid) -> bool {
        let mut state = self.state.lock().await;
        if state.category_id == category_id {
            return false;
        }
        state.category_id = category_id;
        state.page = 1;
        true
    }

    /// Makes `query` the applied query immediately, bypassing the debounce window.
    /// Returns `true` (and resets to page 1) when it changed.
    pub async fn apply_query(&self, query: &str) -> bool {
        let query = query.trim();
        let mut state = self.state.lock().await;
        if state.applied_query == query {
            return false;
        }
        state.applied_query = query.to_string();
        state.page = 1;
        true
    }

    /// Records a keystroke and waits out the debounce window.
    ///
    /// The input is applied only if no newer input arrived in the meantime.
    /// Returns `true` when the applied query changed and a fetch is due.
    pub async fn settle_query(&self, raw: &str) -> bool {
        let generation = {
            let mut state = self.state.lock().await;
            state.input_generation += 1;
            state.input_generation
        };

        tokio::time::sleep(SEARCH_DEBOUNCE).await;

        if self.state.lock().await.input_generation != generation {
            return false;
        }
        self.apply_query(raw).await
    }

    /// Selects a page. Bounds are the caller's concern; see [`Pagination`].
    pub async fn set_page(&self, page: u32) -> bool {
        let page = page.max(1);
        let mut state = self.state.lock().await;
        if state.page == page {
            return false;
        }
        state.page = page;
        true
    }

    /// Issues a search for the current parameters.
    ///
    /// Only the response to the most recently issued request is applied. A failed
    /// latest request leaves the previous results in place and clears the loading flag.
    pub async fn fetch(&self) -> CatalogResult<FetchOutcome> {
        let (token, query) = {
            let mut state = self.state.lock().await;
            state.latest_token += 1;
            state.loading = true;
            let needle = (!state.applied_query.is_empty()).then(|| state.applied_query.clone());
            let query = ItemQuery {
                category_id: state.category_id,
                needle,
                page: state.page,
                page_size: PAGE_SIZE,
            };
            (state.latest_token, query)
        };

        let result = self.store.search_items(&query).await;

        let mut state = self.state.lock().await;
        if token != state.latest_token {
            debug!(token, latest = state.latest_token, "Discarding stale item page.");
            return Ok(FetchOutcome::Stale);
        }
        state.loading = false;

        let page = result.map_err(CatalogError::Store)?;
        state.items = page.items;
        state.total = page.total;
        Ok(FetchOutcome::Applied {
            token,
            view: state.view(),
        })
    }

    /// Overwrites an item on the visible page after a successful update.
    pub async fn patch_item(&self, item_id: Uuid, fields: &ItemFields) {
        let mut state = self.state.lock().await;
        if let Some(item) = state.items.iter_mut().find(|i| i.id == item_id) {
            item.apply(fields);
        }
    }
}

/// The page-selection control's view of the result set: it only offers valid pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: u32,
    pub total_pages: u32,
}

impl Pagination {
    pub fn new(page: u32, total_pages: u32) -> Self {
        Self { page, total_pages }
    }

    /// A single page of results needs no control at all.
    pub fn is_visible(&self) -> bool {
        self.total_pages > 1
    }

    pub fn previous(&self) -> Option<u32> {
        (self.page > 1).then(|| self.page - 1)
    }

    pub fn next(&self) -> Option<u32> {
        (self.page < self.total_pages).then(|| self.page + 1)
    }

    pub fn pages(&self) -> impl Iterator<Item = u32> {
        1..=self.total_pages
    }

    /// Clamps a requested page into the selectable range.
    pub fn clamp(&self, requested: u32) -> u32 {
        requested.clamp(1, self.total_pages.max(1))
    }
}
