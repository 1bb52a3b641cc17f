//! HTTP client for the platform REST API

use std::collections::HashMap;
use std::time::Duration;

use platform_models::{ErrorResponse, MachineTokenRequest, SessionResponse, SiteNameResponse};
use reqwest::{header, Client, Response};
use secrecy::{ExposeSecret, SecretString};
use serde::{de::DeserializeOwned, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, error, info};

use crate::errors::DeployError;

/// Client name sent when authorizing a machine token
const CLIENT_NAME: &str = "safe-deploy";

/// Authenticated session
struct Session {
    token: SecretString,
    user_id: String,
}

/// HTTP client for the platform API
pub struct PlatformClient {
    client: Client,
    base_url: String,
    machine_token: SecretString,
    poll_interval: Duration,
    session: RwLock<Option<Session>>,
    site_ids: RwLock<HashMap<String, String>>,
}

impl PlatformClient {
    /// Create a new platform client
    pub fn new(
        base_url: &str,
        machine_token: SecretString,
        poll_interval: Duration,
    ) -> Result<Self, DeployError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            machine_token,
            poll_interval,
            session: RwLock::new(None),
            site_ids: RwLock::new(HashMap::new()),
        })
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Interval between workflow status polls
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Exchange the machine token for a session, once per client
    pub async fn authorize(&self) -> Result<(), DeployError> {
        if self.session.read().await.is_some() {
            return Ok(());
        }

        let url = format!("{}/authorize/machine-token", self.base_url);
        debug!("POST {} (authorize)", url);

        let body = MachineTokenRequest {
            machine_token: self.machine_token.expose_secret().to_string(),
            client: CLIENT_NAME.to_string(),
        };
        let response = self.client.post(&url).json(&body).send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!("Authorization failed: {} - {}", status, body);
            return Err(DeployError::Platform(format!(
                "Authorization failed: {} - {}",
                status,
                error_message(body)
            )));
        }

        let session: SessionResponse = response.json().await?;
        info!("Authenticated as user {}", session.user_id);
        *self.session.write().await = Some(Session {
            token: SecretString::from(session.session),
            user_id: session.user_id,
        });
        Ok(())
    }

    /// ID of the authenticated user
    pub async fn user_id(&self) -> Result<String, DeployError> {
        self.authorize().await?;
        self.session
            .read()
            .await
            .as_ref()
            .map(|s| s.user_id.clone())
            .ok_or_else(|| DeployError::Internal("No active session".to_string()))
    }

    async fn bearer(&self) -> Result<String, DeployError> {
        self.authorize().await?;
        self.session
            .read()
            .await
            .as_ref()
            .map(|s| format!("Bearer {}", s.token.expose_secret()))
            .ok_or_else(|| DeployError::Internal("No active session".to_string()))
    }

    /// Make a GET request
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, DeployError> {
        let url = format!("{}{}", self.base_url, path);
        debug!("GET {}", url);

        let response = self
            .client
            .get(&url)
            .header(header::AUTHORIZATION, self.bearer().await?)
            .send()
            .await?;

        read_json("GET", response).await
    }

    /// Make a POST request
    pub async fn post<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, DeployError> {
        let url = format!("{}{}", self.base_url, path);
        debug!("POST {}", url);

        let response = self
            .client
            .post(&url)
            .header(header::AUTHORIZATION, self.bearer().await?)
            .json(body)
            .send()
            .await?;

        read_json("POST", response).await
    }

    /// Resolve a site name to its platform ID
    pub async fn site_id(&self, site_name: &str) -> Result<String, DeployError> {
        if let Some(id) = self.site_ids.read().await.get(site_name) {
            return Ok(id.clone());
        }

        let response: SiteNameResponse = self.get(&format!("/site-names/{}", site_name)).await?;
        self.site_ids
            .write()
            .await
            .insert(site_name.to_string(), response.id.clone());
        Ok(response.id)
    }
}

async fn read_json<T: DeserializeOwned>(method: &str, response: Response) -> Result<T, DeployError> {
    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        error!("HTTP {} failed: {} - {}", method, status, body);
        return Err(DeployError::Platform(format!(
            "{}: {}",
            status,
            error_message(body)
        )));
    }

    let body = response.json().await?;
    Ok(body)
}

/// Prefer the structured error message when the body carries one
fn error_message(body: String) -> String {
    serde_json::from_str::<ErrorResponse>(&body)
        .map(|e| e.message)
        .unwrap_or(body)
}
