//! crates/collection_core/src/prefs.rs
//!
//! The per-category "add entry" panel preference.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::ports::PrefStore;

pub fn panel_key(category_id: Uuid) -> String {
    format!("cb_open_{category_id}")
}

/// Whether a category's "add entry" panel is open, persisted on every change.
///
/// Store failures are ignored: reads fall back to the initial value and writes
/// only update the in-memory flag.
pub struct PanelPref {
    store: Arc<dyn PrefStore>,
    key: String,
    open: AtomicBool,
}

impl PanelPref {
    pub fn load(store: Arc<dyn PrefStore>, category_id: Uuid, initial: bool) -> Self {
        let key = panel_key(category_id);
        let open = store.get_bool(&key).unwrap_or(initial);
        Self {
            store,
            key,
            open: AtomicBool::new(open),
        }
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    pub fn set(&self, open: bool) {
        self.open.store(open, Ordering::Release);
        if let Err(e) = self.store.set_bool(&self.key, open) {
            debug!(key = %self.key, "Could not persist panel preference: {}", e);
        }
    }
}
