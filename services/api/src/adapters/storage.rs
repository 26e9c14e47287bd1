//! services/api/src/adapters/storage.rs
//!
//! The object-storage adapter. It implements the `ObjectStorage` port against a
//! Supabase-style storage REST surface, authenticated as the connected user.

use async_trait::async_trait;
use collection_core::domain::{SignedUrl, StoredObject};
use collection_core::ports::{ListOptions, ListOrder, ObjectStorage, PortError, PortResult};
use reqwest::{header::CONTENT_TYPE, Client, RequestBuilder, Response, StatusCode, Url};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// Storage access for one bucket, authorized with one user's access token.
#[derive(Clone)]
pub struct BaasStorageAdapter {
    client: Client,
    base_url: String,
    anon_key: String,
    bucket: String,
    access_token: String,
}

impl BaasStorageAdapter {
    pub fn new(
        client: Client,
        base_url: &str,
        anon_key: &str,
        bucket: &str,
        access_token: &str,
    ) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            anon_key: anon_key.to_string(),
            bucket: bucket.to_string(),
            access_token: access_token.to_string(),
        }
    }

    /// `{base}/storage/v1/{action}/{bucket}/{path}` with every path segment percent-encoded.
    fn endpoint(&self, action: &[&str], path: Option<&str>) -> PortResult<Url> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| PortError::Unexpected(format!("Invalid storage URL: {e}")))?;
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| PortError::Unexpected("Storage URL cannot be a base".into()))?;
            segments.pop_if_empty().extend(["storage", "v1"]);
            segments.extend(action);
            segments.push(&self.bucket);
            if let Some(path) = path {
                segments.extend(path.split('/').filter(|s| !s.is_empty()));
            }
        }
        Ok(url)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .bearer_auth(&self.access_token)
            .header("apikey", &self.anon_key)
    }

    /// A batch answer is all or nothing: any entry carrying an error fails the batch.
    fn signed_batch(&self, entries: Vec<BatchSignEntry>) -> PortResult<Vec<SignedUrl>> {
        entries
            .into_iter()
            .map(|e| match (e.path, e.signed_url, e.error) {
                (Some(path), Some(signed), None) => Ok(SignedUrl {
                    url: self.absolute(&signed),
                    path,
                }),
                (path, _, error) => Err(PortError::Unexpected(format!(
                    "Could not sign {}: {}",
                    path.as_deref().unwrap_or("<unknown path>"),
                    error.as_deref().unwrap_or("no signed URL returned"),
                ))),
            })
            .collect()
    }

    /// Signed URLs come back relative to `/storage/v1`.
    fn absolute(&self, signed: &str) -> String {
        if signed.starts_with("http://") || signed.starts_with("https://") {
            return signed.to_string();
        }
        let signed = signed.trim_start_matches('/');
        format!("{}/storage/v1/{}", self.base_url, signed)
    }
}

//=========================================================================================
// Wire Types
//=========================================================================================

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ListRequest<'a> {
    prefix: &'a str,
    limit: u32,
    offset: u32,
    sort_by: SortBy,
}

#[derive(Serialize)]
struct SortBy {
    column: &'static str,
    order: &'static str,
}

#[derive(Deserialize)]
struct ListEntry {
    name: String,
    /// Folders are listed without an id.
    #[serde(default)]
    id: Option<String>,
}

#[derive(Deserialize)]
struct SignResponse {
    #[serde(rename = "signedURL")]
    signed_url: String,
}

#[derive(Deserialize)]
struct BatchSignEntry {
    path: Option<String>,
    #[serde(rename = "signedURL")]
    signed_url: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Maps a failed response to a port error, keeping the backend's message verbatim.
pub(crate) async fn check(response: Response) -> PortResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(error_from_body(status, &body))
}

pub(crate) fn error_from_body(status: StatusCode, body: &str) -> PortError {
    if status == StatusCode::UNAUTHORIZED {
        return PortError::Unauthorized;
    }
    let message = serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.message.or(b.error))
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| format!("HTTP {}: {}", status.as_u16(), body.trim()));
    if status == StatusCode::NOT_FOUND {
        PortError::NotFound(message)
    } else {
        PortError::Unexpected(message)
    }
}

fn transport(e: reqwest::Error) -> PortError {
    PortError::Unexpected(e.to_string())
}

//=========================================================================================
// `ObjectStorage` Trait Implementation
//=========================================================================================

#[async_trait]
impl ObjectStorage for BaasStorageAdapter {
    async fn list(&self, prefix: &str, options: ListOptions) -> PortResult<Vec<StoredObject>> {
        let body = ListRequest {
            prefix,
            limit: options.limit,
            offset: 0,
            sort_by: SortBy {
                column: "created_at",
                order: match options.order {
                    ListOrder::NewestFirst => "desc",
                    ListOrder::OldestFirst => "asc",
                },
            },
        };
        let url = self.endpoint(&["object", "list"], None)?;
        let response = self
            .authorized(self.client.post(url))
            .json(&body)
            .send()
            .await
            .map_err(transport)?;
        let entries: Vec<ListEntry> = check(response).await?.json().await.map_err(transport)?;

        Ok(entries
            .into_iter()
            .filter(|e| e.id.is_some())
            .map(|e| StoredObject { name: e.name })
            .collect())
    }

    async fn upload(&self, path: &str, bytes: Vec<u8>, content_type: &str) -> PortResult<()> {
        let url = self.endpoint(&["object"], Some(path))?;
        let response = self
            .authorized(self.client.post(url))
            .header(CONTENT_TYPE, content_type)
            .header("x-upsert", "false")
            .body(bytes)
            .send()
            .await
            .map_err(transport)?;
        check(response).await?;
        Ok(())
    }

    async fn create_signed_url(&self, path: &str, expires_in: Duration) -> PortResult<String> {
        let url = self.endpoint(&["object", "sign"], Some(path))?;
        let response = self
            .authorized(self.client.post(url))
            .json(&json!({ "expiresIn": expires_in.as_secs() }))
            .send()
            .await
            .map_err(transport)?;
        let signed: SignResponse = check(response).await?.json().await.map_err(transport)?;
        Ok(self.absolute(&signed.signed_url))
    }

    async fn create_signed_urls(
        &self,
        paths: &[String],
        expires_in: Duration,
    ) -> PortResult<Vec<SignedUrl>> {
        if paths.is_empty() {
            return Ok(Vec::new());
        }
        let url = self.endpoint(&["object", "sign"], None)?;
        let response = self
            .authorized(self.client.post(url))
            .json(&json!({ "expiresIn": expires_in.as_secs(), "paths": paths }))
            .send()
            .await
            .map_err(transport)?;
        let entries: Vec<BatchSignEntry> =
            check(response).await?.json().await.map_err(transport)?;
        self.signed_batch(entries)
    }

    async fn remove(&self, paths: &[String]) -> PortResult<()> {
        let url = self.endpoint(&["object"], None)?;
        let response = self
            .authorized(self.client.delete(url))
            .json(&json!({ "prefixes": paths }))
            .send()
            .await
            .map_err(transport)?;
        check(response).await?;
        Ok(())
    }
}
