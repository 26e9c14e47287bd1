//! services/api/src/adapters/auth.rs
//!
//! Resolves access tokens against the backend's auth endpoint and exposes the
//! resolved user to the core through the `AuthService` port.

use async_trait::async_trait;
use collection_core::ports::{AuthService, PortError, PortResult};
use reqwest::{Client, Url};
use serde::Deserialize;
use uuid::Uuid;

use super::storage::check;

/// Verifies bearer tokens with `GET {base}/auth/v1/user`.
#[derive(Clone)]
pub struct BaasAuthClient {
    client: Client,
    base_url: String,
    anon_key: String,
}

#[derive(Deserialize)]
struct UserResponse {
    id: Uuid,
}

impl BaasAuthClient {
    pub fn new(client: Client, base_url: &str, anon_key: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            anon_key: anon_key.to_string(),
        }
    }

    /// Returns the user that owns `access_token`.
    pub async fn user_for_token(&self, access_token: &str) -> PortResult<Uuid> {
        let url = Url::parse(&format!("{}/auth/v1/user", self.base_url))
            .map_err(|e| PortError::Unexpected(format!("Invalid auth URL: {e}")))?;
        let response = self
            .client
            .get(url)
            .bearer_auth(access_token)
            .header("apikey", &self.anon_key)
            .send()
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        let user: UserResponse = check(response)
            .await?
            .json()
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        Ok(user.id)
    }
}

/// The user behind one authenticated connection.
#[derive(Debug, Clone, Copy)]
pub struct SessionAuth {
    user_id: Option<Uuid>,
}

impl SessionAuth {
    pub fn new(user_id: Option<Uuid>) -> Self {
        Self { user_id }
    }
}

#[async_trait]
impl AuthService for SessionAuth {
    async fn current_user(&self) -> PortResult<Option<Uuid>> {
        Ok(self.user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_response_reads_the_id() {
        let user: UserResponse = serde_json::from_str(
            r#"{"id":"6f1b5d3e-2f0a-4a6b-9a53-7c1f0c2b9d11","aud":"authenticated","email":"a@b.c"}"#,
        )
        .expect("valid user");
        assert_eq!(user.id.to_string(), "6f1b5d3e-2f0a-4a6b-9a53-7c1f0c2b9d11");
    }

    #[tokio::test]
    async fn session_auth_reports_its_user() {
        let id = Uuid::new_v4();
        assert_eq!(SessionAuth::new(Some(id)).current_user().await.ok(), Some(Some(id)));
        assert_eq!(SessionAuth::new(None).current_user().await.ok(), Some(None));
    }
}
