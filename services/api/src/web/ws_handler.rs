//! services/api/src/web/ws_handler.rs
//!
//! This is the main entry point and control loop for a WebSocket connection.
//! Each connection hosts one catalog view and delegates every command to it.

use crate::web::{
    protocol::{ClientMessage, PlaceSuggestion, ServerMessage},
    state::{AppState, AuthContext},
};
use async_trait::async_trait;
use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
    Extension,
};
use collection_core::{
    catalog::{CatalogView, PageWithImages},
    domain::ConfirmPrompt,
    error::{CatalogError, CatalogResult},
    i18n::{Language, Translations},
    places::PlaceAutocomplete,
    ports::Confirmer,
    query::{PageView, Pagination},
};
use bytes::BytesMut;
use futures::{SinkExt, StreamExt};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Upper bound on one buffered photo.
const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Messages queued for the connection's writer task.
type Outbox = mpsc::UnboundedSender<ServerMessage>;

/// The handler for upgrading HTTP requests to WebSocket connections.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(app_state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, app_state, auth))
}

async fn handle_socket(socket: WebSocket, app_state: Arc<AppState>, auth: AuthContext) {
    info!("New WebSocket connection established for user: {}", auth.user_id);

    let (mut sink, mut receiver) = socket.split();

    // --- 1. Initialization Phase ---
    let (category_id, locale) = match receiver.next().await {
        Some(Ok(Message::Text(init_json))) => {
            match serde_json::from_str::<ClientMessage>(&init_json) {
                Ok(ClientMessage::Init { category_id, lang }) => {
                    (category_id, lang.unwrap_or_default())
                }
                _ => {
                    error!("First message was not a valid Init message.");
                    return;
                }
            }
        }
        _ => {
            error!("Client disconnected before sending Init message.");
            return;
        }
    };
    info!("Opening catalog view for category: {}", category_id);

    let (outbox, mut outgoing) = mpsc::unbounded_channel::<ServerMessage>();
    let writer = tokio::spawn(async move {
        while let Some(msg) = outgoing.recv().await {
            let json = match serde_json::to_string(&msg) {
                Ok(json) => json,
                Err(e) => {
                    error!("Failed to serialize server message: {}", e);
                    continue;
                }
            };
            if sink.send(Message::Text(json.into())).await.is_err() {
                warn!("Failed to send message; client is gone.");
                break;
            }
        }
    });

    let translations = Arc::new(Translations::bundled(Language::from_locale(&locale)));
    let confirmer = Arc::new(WsConfirmer::new(outbox.clone(), translations.clone()));
    let services = app_state.catalog_services(&auth, confirmer.clone());
    let conn = Connection {
        view: Arc::new(CatalogView::new(services, category_id)),
        places: Arc::new(PlaceAutocomplete::new(app_state.geocoder.clone(), &locale)),
        confirmer,
        translations,
        outbox,
        publishing: Arc::new(Mutex::new(())),
        shutdown: CancellationToken::new(),
    };

    conn.send(ServerMessage::Panel {
        open: conn.view.panel_open().await,
    });
    {
        let c = conn.clone();
        conn.spawn(async move {
            let result = c.view.refresh().await;
            c.publish(result).await;
        });
    }
    {
        let c = conn.clone();
        let mut deleting = conn.view.watch_deleting();
        conn.spawn(async move {
            while deleting.changed().await.is_ok() {
                let path_full = deleting.borrow_and_update().clone();
                c.send(ServerMessage::Deleting { path_full });
            }
        });
    }

    // --- 2. Main Message Loop ---
    let mut upload: Option<(Uuid, BytesMut)> = None;
    while let Some(frame) = receiver.next().await {
        match frame {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(msg) => conn.dispatch(msg, &mut upload),
                Err(e) => warn!("Failed to deserialize client message: {}", e),
            },
            Ok(Message::Binary(data)) => match upload.as_mut() {
                Some((_, buffer)) if buffer.len() + data.len() <= MAX_UPLOAD_BYTES => {
                    buffer.extend_from_slice(&data);
                }
                Some((item_id, _)) => {
                    let item_id = *item_id;
                    upload = None;
                    warn!(%item_id, "Upload exceeds {} bytes; discarded.", MAX_UPLOAD_BYTES);
                    conn.send(ServerMessage::Error {
                        message: "File too large".to_string(),
                    });
                }
                None => warn!("Binary frame received outside of an upload; ignored."),
            },
            Ok(Message::Close(_)) => {
                info!("Client sent close message.");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                warn!("WebSocket receive failed: {}", e);
                break;
            }
        }
    }

    // --- 3. Cleanup ---
    conn.shutdown.cancel();
    conn.places.cancel().await;
    writer.abort();
    info!("WebSocket connection closed.");
}

//=========================================================================================
// Per-connection Command Dispatch
//=========================================================================================

#[derive(Clone)]
struct Connection {
    view: Arc<CatalogView>,
    places: Arc<PlaceAutocomplete>,
    confirmer: Arc<WsConfirmer>,
    translations: Arc<Translations>,
    outbox: Outbox,
    /// Serializes page publishing so a superseded page never follows a newer one.
    publishing: Arc<Mutex<()>>,
    shutdown: CancellationToken,
}

impl Connection {
    fn send(&self, msg: ServerMessage) {
        if self.outbox.send(msg).is_err() {
            warn!("Outbox closed; dropping server message.");
        }
    }

    fn send_error(&self, err: &CatalogError) {
        self.send(ServerMessage::Error {
            message: error_message(&self.translations, err),
        });
    }

    /// Runs a command in the background so the loop keeps reading frames,
    /// e.g. the answer to a confirmation the command is waiting for.
    fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let token = self.shutdown.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = task => {}
            }
        });
    }

    fn dispatch(&self, msg: ClientMessage, upload: &mut Option<(Uuid, BytesMut)>) {
        let c = self.clone();
        match msg {
            ClientMessage::Init { .. } => {
                warn!("Received subsequent Init message, which is ignored.");
            }
            ClientMessage::Search { query } => self.spawn(async move {
                let result = c.view.search(&query).await;
                c.publish(result).await;
            }),
            ClientMessage::SelectPage { page } => self.spawn(async move {
                let current = c.view.snapshot().await;
                let page = Pagination::new(current.page, current.total_pages).clamp(page);
                let result = c.view.select_page(page).await;
                c.publish(result).await;
            }),
            ClientMessage::SelectCategory { category_id } => self.spawn(async move {
                let result = c.view.select_category(category_id).await;
                c.send(ServerMessage::Panel {
                    open: c.view.panel_open().await,
                });
                c.publish(result).await;
            }),
            ClientMessage::CreateItem { draft } => self.spawn(async move {
                match c.view.create_item(&draft).await {
                    Ok(Some(_)) => {
                        c.send(ServerMessage::Panel { open: false });
                        c.send_current_page().await;
                    }
                    Ok(None) => {}
                    Err(e) => c.send_error(&e),
                }
            }),
            ClientMessage::UpdateItem { item_id, draft } => self.spawn(async move {
                match c.view.update_item(item_id, &draft).await {
                    Ok(true) => c.send(ServerMessage::page(c.view.snapshot().await)),
                    Ok(false) => {}
                    Err(e) => c.send_error(&e),
                }
            }),
            ClientMessage::DeleteItem { item_id } => self.spawn(async move {
                match c.view.delete_item(item_id).await {
                    Ok(true) => c.send_current_page().await,
                    Ok(false) => {}
                    Err(e) => c.send_error(&e),
                }
            }),
            ClientMessage::DeleteImage { item_id, path_full } => self.spawn(async move {
                match c.view.delete_image(item_id, &path_full).await {
                    Ok(outcome) if outcome.deleted => {
                        if outcome.viewer_closed {
                            c.send(ServerMessage::ViewerClosed);
                        }
                        c.send(ServerMessage::Images {
                            item_id,
                            images: c.view.images(item_id).await,
                        });
                    }
                    Ok(_) => {}
                    Err(e) => c.send_error(&e),
                }
            }),
            ClientMessage::OpenViewer { item_id, path_full } => self.spawn(async move {
                match c.view.open_viewer(item_id, &path_full).await {
                    Some(url) => c.send(ServerMessage::ViewerOpened { path_full, url }),
                    None => warn!(%item_id, "Viewer requested for an unknown image."),
                }
            }),
            ClientMessage::CloseViewer => self.spawn(async move {
                c.view.close_viewer().await;
                c.send(ServerMessage::ViewerClosed);
            }),
            ClientMessage::SetPanelOpen { open } => self.spawn(async move {
                c.view.set_panel_open(open).await;
                c.send(ServerMessage::Panel { open });
            }),
            ClientMessage::UploadStarted { item_id } => {
                if let Some((previous, _)) = upload.replace((item_id, BytesMut::new())) {
                    warn!(item_id = %previous, "Unfinished upload replaced by a new one.");
                }
            }
            ClientMessage::UploadEnded => match upload.take() {
                Some((item_id, bytes)) => self.spawn(async move {
                    c.send(ServerMessage::Busy { item_id, busy: true });
                    match c.view.upload_image(item_id, &bytes).await {
                        Ok(images) => c.send(ServerMessage::Images { item_id, images }),
                        Err(e) => c.send_error(&e),
                    }
                    c.send(ServerMessage::Busy {
                        item_id,
                        busy: c.view.is_uploading(item_id).await,
                    });
                }),
                None => warn!("UploadEnded without UploadStarted; ignored."),
            },
            ClientMessage::PlaceQuery { input } => self.spawn(async move {
                if let Some(candidates) = c.places.lookup(&input).await {
                    c.send(ServerMessage::Places {
                        places: candidates.iter().map(PlaceSuggestion::from).collect(),
                    });
                }
            }),
            ClientMessage::ConfirmResponse {
                request_id,
                approved,
            } => self.spawn(async move {
                c.confirmer.resolve(request_id, approved).await;
            }),
        }
    }

    async fn publish(&self, result: CatalogResult<Option<PageWithImages>>) {
        match result {
            Ok(Some(PageWithImages {
                token,
                page,
                mut images,
            })) => {
                let _publishing = self.publishing.lock().await;
                if !self.view.is_current(token).await {
                    return;
                }
                let ids: Vec<Uuid> = page.items.iter().map(|i| i.id).collect();
                self.send(ServerMessage::page(page));
                for item_id in ids {
                    self.send(ServerMessage::Images {
                        item_id,
                        images: images.remove(&item_id).unwrap_or_default(),
                    });
                }
            }
            Ok(None) => {}
            Err(e) => self.send_error(&e),
        }
    }

    async fn send_current_page(&self) {
        let _publishing = self.publishing.lock().await;
        let page: PageView = self.view.snapshot().await;
        let ids: Vec<Uuid> = page.items.iter().map(|i| i.id).collect();
        self.send(ServerMessage::page(page));
        for item_id in ids {
            self.send(ServerMessage::Images {
                item_id,
                images: self.view.images(item_id).await,
            });
        }
    }
}

/// The user-facing text of a catalog error.
fn error_message(translations: &Translations, err: &CatalogError) -> String {
    match err {
        CatalogError::NoSession => translations.t("item_list.no_user_session").to_string(),
        other => other.to_string(),
    }
}

//=========================================================================================
// Confirmation Round-trip
//=========================================================================================

/// Asks the connected client to approve destructive actions.
///
/// Each prompt is sent as a `ConfirmRequest` and answered by a matching
/// `ConfirmResponse`. A prompt that can no longer be answered counts as declined.
pub struct WsConfirmer {
    outbox: Outbox,
    translations: Arc<Translations>,
    next_id: AtomicU64,
    pending: Mutex<HashMap<u64, oneshot::Sender<bool>>>,
}

impl WsConfirmer {
    pub fn new(outbox: Outbox, translations: Arc<Translations>) -> Self {
        Self {
            outbox,
            translations,
            next_id: AtomicU64::new(1),
            pending: Mutex::new(HashMap::new()),
        }
    }

    pub async fn resolve(&self, request_id: u64, approved: bool) {
        match self.pending.lock().await.remove(&request_id) {
            Some(answer) => {
                let _ = answer.send(approved);
            }
            None => warn!(request_id, "Confirmation answer for an unknown request."),
        }
    }
}

#[async_trait]
impl Confirmer for WsConfirmer {
    async fn confirm(&self, prompt: ConfirmPrompt) -> bool {
        let request_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (answer, answered) = oneshot::channel();
        self.pending.lock().await.insert(request_id, answer);

        let request = ServerMessage::ConfirmRequest {
            request_id,
            message: self.translations.t(prompt.message_key()).to_string(),
        };
        if self.outbox.send(request).is_err() {
            self.pending.lock().await.remove(&request_id);
            return false;
        }
        answered.await.unwrap_or(false)
    }
}
