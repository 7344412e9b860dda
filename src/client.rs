/*!
    TMC REST client.

    `TmcClient` wraps a reqwest client with bearer authentication against the TMC
    API. The access token is obtained by exchanging the VMware Cloud API token and
    is refreshed once when the API answers 401. Responses are classified into
    not-found, unauthorized and other API errors so resource handlers can branch
    on them.
*/

use log::{debug, error, info, warn};
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;

use crate::config::ProviderConfig;
use crate::error::{ProviderError, ProviderResult};

pub const API_TOKEN_AUTHORIZE_PATH: &str = "/csp/gateway/am/api/auth/api-tokens/authorize";

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

pub struct TmcClient {
    /// Reqwest HTTP client for making API requests.
    client: Client,
    /// TMC endpoint, scheme included.
    base_url: String,
    /// VMware Cloud endpoint the API token is exchanged at.
    cloud_url: String,
    api_token: String,
    access_token: RwLock<Option<String>>,
}

impl TmcClient {
    pub fn new(config: &ProviderConfig) -> Self {
        Self::with_urls(&config.endpoint_url(), &config.vmw_cloud_url(), &config.vmw_cloud_api_token)
    }

    pub fn with_urls(base_url: &str, cloud_url: &str, api_token: &str) -> Self {
        TmcClient {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            cloud_url: cloud_url.trim_end_matches('/').to_string(),
            api_token: api_token.to_string(),
            access_token: RwLock::new(None),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Seeds the access token, skipping the first exchange.
    pub async fn set_access_token(&self, token: &str) {
        *self.access_token.write().await = Some(token.to_string());
    }

    async fn access_token(&self) -> ProviderResult<String> {
        if let Some(token) = self.access_token.read().await.as_ref() {
            return Ok(token.clone());
        }
        self.refresh_token().await
    }

    /// Exchanges the API token for a fresh access token and caches it.
    pub async fn refresh_token(&self) -> ProviderResult<String> {
        if self.api_token.trim().is_empty() {
            error!("VMware Cloud API token is empty!");
            return Err(ProviderError::Unauthorized("API token is empty".to_string()));
        }
        let url = format!("{}{}", self.cloud_url, API_TOKEN_AUTHORIZE_PATH);
        debug!("Exchanging API token at {}", url);
        let response = self
            .client
            .post(&url)
            .query(&[("refresh_token", self.api_token.as_str())])
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await?;
        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            error!("Token exchange at {} failed with status {}: {}", url, status, text);
            return Err(ProviderError::Unauthorized(format!("token exchange failed ({}): {}", status, text)));
        }
        let token: TokenResponse = serde_json::from_str(&text)
            .map_err(|e| ProviderError::Unauthorized(format!("failed to parse token response: {}", e)))?;
        info!("Obtained TMC access token");
        *self.access_token.write().await = Some(token.access_token.clone());
        Ok(token.access_token)
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<&Value>,
    ) -> ProviderResult<String> {
        let token = self.access_token().await?;
        match self.send_once(method.clone(), path, query, body, &token).await {
            Err(e) if e.is_unauthorized() => {
                warn!("{} {} was unauthorized, refreshing access token and retrying", method, path);
                let token = self.refresh_token().await?;
                self.send_once(method, path, query, body, &token).await
            }
            other => other,
        }
    }

    async fn send_once(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<&Value>,
        token: &str,
    ) -> ProviderResult<String> {
        let url = format!("{}{}", self.base_url, path);
        debug!("Attempting {} request for URL: '{}'", method, url);
        let mut request = self
            .client
            .request(method.clone(), &url)
            .header(reqwest::header::AUTHORIZATION, format!("Bearer {}", token))
            .header(reqwest::header::ACCEPT, "application/json")
            .header(reqwest::header::USER_AGENT, "tmc-provider");
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(body) = body {
            debug!("{} body: {}", method, body);
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();
        debug!("{} {} returned status: {}", method, url, status);
        let text = response.text().await?;
        if status.is_success() {
            return Ok(text);
        }
        let described = format!("{} {}: {}", method, path, text);
        match status {
            StatusCode::NOT_FOUND => Err(ProviderError::NotFound(described)),
            StatusCode::UNAUTHORIZED => Err(ProviderError::Unauthorized(described)),
            _ => {
                error!("{} {} failed with status {}: {}", method, url, status, text);
                Err(ProviderError::Api {
                    status: status.as_u16(),
                    message: text,
                })
            }
        }
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> ProviderResult<T> {
        let text = self.send(Method::GET, path, query, None).await?;
        parse_body(path, &text)
    }

    pub async fn post_json<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> ProviderResult<T> {
        let body = serde_json::to_value(body)?;
        let text = self.send(Method::POST, path, &[], Some(&body)).await?;
        parse_body(path, &text)
    }

    pub async fn put_json<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> ProviderResult<T> {
        let body = serde_json::to_value(body)?;
        let text = self.send(Method::PUT, path, &[], Some(&body)).await?;
        parse_body(path, &text)
    }

    pub async fn delete(&self, path: &str, query: &[(&str, &str)]) -> ProviderResult<()> {
        self.send(Method::DELETE, path, query, None).await?;
        Ok(())
    }
}

fn parse_body<T: DeserializeOwned>(path: &str, text: &str) -> ProviderResult<T> {
    let text = if text.trim().is_empty() { "{}" } else { text };
    serde_json::from_str(text).map_err(|e| ProviderError::Api {
        status: 200,
        message: format!("failed to parse response from {}: {}", path, e),
    })
}
