//! crates/collection_core/src/domain.rs
//!
//! Defines the pure, core data structures for the catalog.
//! These structs are independent of any database or serialization format.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A user-defined grouping label for items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: Uuid,
    pub name: String,
}

/// A single catalogued collectible, as shown on a result page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub place: Option<String>,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl Item {
    /// Overwrites the editable fields with a normalised record.
    pub fn apply(&mut self, fields: &ItemFields) {
        self.title = fields.title.clone();
        self.description = fields.description.clone();
        self.place = fields.place.clone();
        self.tags = fields.tags.clone();
    }
}

/// Raw form values as entered by the user, before normalisation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemDraft {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub place: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl ItemDraft {
    /// Adds a tag from free-text input. Empty or already-present tags are ignored.
    ///
    /// Returns `true` when the tag list changed.
    pub fn add_tag(&mut self, input: &str) -> bool {
        let tag = input.trim();
        if tag.is_empty() || self.tags.iter().any(|t| t == tag) {
            return false;
        }
        self.tags.push(tag.to_string());
        true
    }

    pub fn remove_tag(&mut self, tag: &str) {
        self.tags.retain(|t| t != tag);
    }
}

/// The whole-record payload written to the item store on create and update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemFields {
    pub title: String,
    pub description: Option<String>,
    pub place: Option<String>,
    pub tags: Vec<String>,
}

impl ItemFields {
    /// Normalises a draft. Returns `None` when the trimmed title is empty.
    pub fn from_draft(draft: &ItemDraft) -> Option<Self> {
        let title = draft.title.trim();
        if title.is_empty() {
            return None;
        }
        Some(Self {
            title: title.to_string(),
            description: non_empty(&draft.description),
            place: non_empty(&draft.place),
            tags: draft.tags.clone(),
        })
    }
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Parameters of a single search request against the item store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemQuery {
    pub category_id: Uuid,
    /// Trimmed free-text needle; `None` means no text filter.
    pub needle: Option<String>,
    /// 1-based page number.
    pub page: u32,
    pub page_size: u32,
}

impl ItemQuery {
    /// Zero-based index of the first row on the requested page.
    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.page_size)
    }
}

/// One page of search results together with the exact total row count.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemPage {
    pub items: Vec<Item>,
    pub total: u64,
}

/// An object entry returned by a storage listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub name: String,
}

/// A signed read URL for one stored object path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedUrl {
    pub path: String,
    pub url: String,
}

/// One logical image of an item: the full variant and its optional thumbnail,
/// each with a freshly signed display URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageEntry {
    pub path_full: String,
    pub url_full: String,
    pub path_thumb: Option<String>,
    pub url_thumb: Option<String>,
}

/// The raster formats the compressor is asked to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RasterFormat {
    Jpeg,
}

impl RasterFormat {
    pub fn extension(self) -> &'static str {
        match self {
            RasterFormat::Jpeg => "jpg",
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            RasterFormat::Jpeg => "image/jpeg",
        }
    }
}

/// Target constraints for one compression pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompressionOptions {
    /// Bound on the longer side, in pixels.
    pub max_dimension: u32,
    /// Encoder quality in `0.0..=1.0`.
    pub quality: f32,
    pub format: RasterFormat,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressedImage {
    pub bytes: Vec<u8>,
    pub format: RasterFormat,
}

/// A geocoder hit offered by the place autocomplete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlaceCandidate {
    pub osm_id: i64,
    pub name: Option<String>,
    pub city: Option<String>,
    pub town: Option<String>,
    pub village: Option<String>,
    pub municipality: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
    pub country_code: Option<String>,
}

/// What a destructive action is about to remove; shown to the user before the call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmPrompt {
    DeleteItem { item_id: Uuid },
    DeleteImage { item_id: Uuid, path_full: String },
    DeleteCategory { category_id: Uuid },
}

impl ConfirmPrompt {
    /// Translation key of the question asked for this action.
    pub fn message_key(&self) -> &'static str {
        match self {
            ConfirmPrompt::DeleteItem { .. } => "item_list.confirm_delete",
            ConfirmPrompt::DeleteImage { .. } => "item_list.confirm_delete_image",
            ConfirmPrompt::DeleteCategory { .. } => "category_select.confirm_delete",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn draft_normalisation_trims_and_drops_empty_optionals() {
        let draft = ItemDraft {
            title: "  Denarius ".into(),
            description: "   ".into(),
            place: " Rome ".into(),
            tags: vec!["silver".into()],
        };
        let fields = ItemFields::from_draft(&draft).expect("title present");
        assert_eq!(fields.title, "Denarius");
        assert_eq!(fields.description, None);
        assert_eq!(fields.place.as_deref(), Some("Rome"));
        assert_eq!(fields.tags, vec!["silver".to_string()]);
    }

    #[test]
    fn blank_title_is_rejected() {
        let draft = ItemDraft {
            title: " \t ".into(),
            ..Default::default()
        };
        assert!(ItemFields::from_draft(&draft).is_none());
    }

    #[test]
    fn add_tag_ignores_blank_and_duplicate_input() {
        let mut draft = ItemDraft::default();
        assert!(draft.add_tag(" a "));
        assert!(draft.add_tag("b"));
        assert!(!draft.add_tag("a"));
        assert!(!draft.add_tag("  "));
        assert_eq!(draft.tags, vec!["a".to_string(), "b".to_string()]);

        draft.remove_tag("a");
        assert_eq!(draft.tags, vec!["b".to_string()]);
    }

    #[test]
    fn query_offset_is_zero_based() {
        let query = ItemQuery {
            category_id: Uuid::nil(),
            needle: None,
            page: 3,
            page_size: 6,
        };
        assert_eq!(query.offset(), 12);
    }
}
