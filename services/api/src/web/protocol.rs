//! services/api/src/web/protocol.rs
//!
//! Defines the WebSocket message protocol between the browser client and the API server
//! for the catalog view.

use collection_core::domain::{ImageEntry, ItemDraft, PlaceCandidate};
use collection_core::places::{display, label};
use collection_core::query::{PageView, Pagination};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

//=========================================================================================
// Messages Sent FROM the Client (Browser) TO the Server
//=========================================================================================
// NOTE: Photo bytes are sent as raw Binary frames between `UploadStarted` and
// `UploadEnded`, not as part of this enum.
//=========================================================================================

/// Represents the structured text messages a client can send to the server.
#[derive(Deserialize, Debug)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Opens the catalog view for a category. This must be the first message sent.
    Init {
        category_id: Uuid,
        /// Locale tag such as `de-AT`; picks the translations and geocoder language.
        #[serde(default)]
        lang: Option<String>,
    },

    /// A keystroke in the search box; the raw input, untrimmed.
    Search { query: String },

    SelectPage { page: u32 },

    SelectCategory { category_id: Uuid },

    CreateItem { draft: ItemDraft },

    UpdateItem { item_id: Uuid, draft: ItemDraft },

    DeleteItem { item_id: Uuid },

    DeleteImage { item_id: Uuid, path_full: String },

    OpenViewer { item_id: Uuid, path_full: String },

    CloseViewer,

    SetPanelOpen { open: bool },

    /// Announces a photo for `item_id`; binary frames carry its bytes.
    UploadStarted { item_id: Uuid },

    /// The photo announced by `UploadStarted` is complete.
    UploadEnded,

    /// A keystroke in the place field.
    PlaceQuery { input: String },

    /// The user's answer to a `ConfirmRequest`.
    ConfirmResponse { request_id: u64, approved: bool },
}

//=========================================================================================
// Messages Sent FROM the Server TO the Client (Browser)
//=========================================================================================

/// Represents the structured text messages the server can send to the client.
#[derive(Serialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// The visible result page.
    Page {
        #[serde(flatten)]
        view: PageView,
        /// Selectable page numbers; empty when a single page needs no control.
        pages: Vec<u32>,
        /// Targets of the prev/next controls; `None` disables the control.
        previous: Option<u32>,
        next: Option<u32>,
    },

    /// The current images of one item.
    Images { item_id: Uuid, images: Vec<ImageEntry> },

    /// Whether an upload for the item is running.
    Busy { item_id: Uuid, busy: bool },

    /// The image whose removal is in flight, or `None` once it settled.
    Deleting { path_full: Option<String> },

    ViewerOpened { path_full: String, url: String },

    ViewerClosed,

    /// State of the "add entry" panel.
    Panel { open: bool },

    Places { places: Vec<PlaceSuggestion> },

    /// Asks the user to approve a destructive action.
    ConfirmRequest { request_id: u64, message: String },

    /// Reports an error to the client, which should display the message.
    Error { message: String },
}

impl ServerMessage {
    pub fn page(view: PageView) -> Self {
        let pagination = Pagination::new(view.page, view.total_pages);
        let pages = if pagination.is_visible() {
            pagination.pages().collect()
        } else {
            Vec::new()
        };
        ServerMessage::Page {
            view,
            pages,
            previous: pagination.previous(),
            next: pagination.next(),
        }
    }
}

/// One place autocomplete row as the client renders it.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct PlaceSuggestion {
    pub osm_id: i64,
    pub city: String,
    pub line2: String,
    /// Value stored in the item's place field when this row is chosen.
    pub label: String,
}

impl From<&PlaceCandidate> for PlaceSuggestion {
    fn from(candidate: &PlaceCandidate) -> Self {
        let shown = display(candidate);
        Self {
            osm_id: candidate.osm_id,
            city: shown.city,
            line2: shown.line2,
            label: label(candidate),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    #[test]
    fn client_messages_are_tagged_by_type() {
        let msg: ClientMessage = serde_json::from_str(
            r#"{"type":"update_item","item_id":"00000000-0000-0000-0000-000000000001",
                "draft":{"title":"Coin","tags":["a","b","c"]}}"#,
        )
        .expect("valid message");
        match msg {
            ClientMessage::UpdateItem { draft, .. } => {
                assert_eq!(draft.title, "Coin");
                assert_eq!(draft.description, "");
                assert_eq!(draft.tags, vec!["a", "b", "c"]);
            }
            other => panic!("unexpected message: {other:?}"),
        }

        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"init","category_id":"00000000-0000-0000-0000-000000000002"}"#)
                .expect("valid message");
        assert!(matches!(msg, ClientMessage::Init { lang: None, .. }));
    }

    #[test]
    fn page_message_flattens_the_view() {
        let view = PageView {
            category_id: Uuid::nil(),
            query: "coin".into(),
            page: 2,
            total: 7,
            total_pages: 2,
            loading: false,
            items: Vec::new(),
        };
        let value: Value = serde_json::to_value(ServerMessage::page(view)).expect("serialize");
        assert_eq!(value["type"], "page");
        assert_eq!(value["page"], 2);
        assert_eq!(value["total"], 7);
        assert_eq!(value["pages"], json!([1, 2]));
        assert_eq!(value["previous"], 1);
        assert_eq!(value["next"], Value::Null);
    }

    #[test]
    fn single_page_offers_no_page_numbers() {
        let view = PageView {
            category_id: Uuid::nil(),
            query: String::new(),
            page: 1,
            total: 3,
            total_pages: 1,
            loading: false,
            items: Vec::new(),
        };
        let value = serde_json::to_value(ServerMessage::page(view)).expect("serialize");
        assert_eq!(value["pages"], json!([]));
        assert_eq!(value["previous"], Value::Null);
        assert_eq!(value["next"], Value::Null);
    }

    #[test]
    fn deleting_marker_serializes_its_path() {
        let value = serde_json::to_value(ServerMessage::Deleting {
            path_full: Some("u/i/a.jpg".into()),
        })
        .expect("serialize");
        assert_eq!(value, json!({"type": "deleting", "path_full": "u/i/a.jpg"}));
    }
}
