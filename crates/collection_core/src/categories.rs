//! crates/collection_core/src/categories.rs
//!
//! The user's category list, kept sorted for display.

use std::cmp::Ordering;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;
use uuid::Uuid;

use crate::domain::{Category, ConfirmPrompt};
use crate::error::{CatalogError, CatalogResult};
use crate::ports::{Confirmer, ItemStore};

/// Case-insensitive ordering by name, with the raw name as a stable tie-break.
pub fn compare_names(a: &str, b: &str) -> Ordering {
    a.to_lowercase()
        .cmp(&b.to_lowercase())
        .then_with(|| a.cmp(b))
}

pub fn sort_categories(categories: &mut [Category]) {
    categories.sort_by(|a, b| compare_names(&a.name, &b.name));
}

pub struct CategoryList {
    store: Arc<dyn ItemStore>,
    confirmer: Arc<dyn Confirmer>,
    categories: Mutex<Vec<Category>>,
}

impl CategoryList {
    pub fn new(store: Arc<dyn ItemStore>, confirmer: Arc<dyn Confirmer>) -> Self {
        Self {
            store,
            confirmer,
            categories: Mutex::new(Vec::new()),
        }
    }

    pub async fn categories(&self) -> Vec<Category> {
        self.categories.lock().await.clone()
    }

    pub async fn reload(&self) -> CatalogResult<Vec<Category>> {
        let mut list = self
            .store
            .list_categories()
            .await
            .map_err(CatalogError::Store)?;
        sort_categories(&mut list);
        *self.categories.lock().await = list.clone();
        Ok(list)
    }

    /// Creates a category from a trimmed name. Blank names are ignored.
    pub async fn create(&self, name: &str) -> CatalogResult<Option<Category>> {
        let name = name.trim();
        if name.is_empty() {
            return Ok(None);
        }
        let category = self
            .store
            .create_category(name)
            .await
            .map_err(CatalogError::Store)?;
        info!(category_id = %category.id, "Category created.");
        self.reload().await?;
        Ok(Some(category))
    }

    /// Deletes a category after the user confirmed. Returns `false` when declined.
    pub async fn delete(&self, category_id: Uuid) -> CatalogResult<bool> {
        if !self
            .confirmer
            .confirm(ConfirmPrompt::DeleteCategory { category_id })
            .await
        {
            return Ok(false);
        }
        self.store
            .delete_category(category_id)
            .await
            .map_err(CatalogError::Store)?;
        self.reload().await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MemoryStore, ScriptedConfirmer};

    #[tokio::test]
    async fn reload_sorts_case_insensitively() {
        let store = Arc::new(MemoryStore::default());
        store.seed_categories(&["stamps", "Coins", "banknotes"]).await;
        let list = CategoryList::new(store, Arc::new(ScriptedConfirmer(true)));

        let names: Vec<String> = list
            .reload()
            .await
            .expect("reload")
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, vec!["banknotes", "Coins", "stamps"]);
    }

    #[tokio::test]
    async fn create_trims_and_rejects_blank_names() {
        let store = Arc::new(MemoryStore::default());
        let list = CategoryList::new(store, Arc::new(ScriptedConfirmer(true)));

        assert_eq!(list.create("   ").await.expect("blank"), None);
        let created = list.create("  Minerals ").await.expect("create").expect("created");
        assert_eq!(created.name, "Minerals");
        assert_eq!(list.categories().await, vec![created]);
    }

    #[tokio::test]
    async fn delete_requires_confirmation() {
        let store = Arc::new(MemoryStore::default());
        store.seed_categories(&["Coins"]).await;
        let declining = CategoryList::new(store.clone(), Arc::new(ScriptedConfirmer(false)));
        let id = declining.reload().await.expect("reload")[0].id;

        assert!(!declining.delete(id).await.expect("declined"));
        assert_eq!(declining.reload().await.expect("reload").len(), 1);

        let accepting = CategoryList::new(store, Arc::new(ScriptedConfirmer(true)));
        assert!(accepting.delete(id).await.expect("deleted"));
        assert!(accepting.categories().await.is_empty());
    }
}
