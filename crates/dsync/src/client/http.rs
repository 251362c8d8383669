//! 📡 The reqwest-backed `ApiClient`. One struct, one account, two API keys.
//!
//! Config lives right next to the client that uses it, so nobody goes on a
//! scavenger hunt at 2am to find out where `api_url` is defined.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::trace;

use crate::client::{ApiClient, HttpMethod, QueryParams};
use crate::errors::ClientError;

/// 🔐 How to reach one account: where it lives and how to prove we're allowed in.
#[derive(Debug, Deserialize, Clone)]
pub struct ConnectionConfig {
    /// 📡 API base URL, scheme included. `https://api.datadoghq.com`, not `datadoghq.com`.
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// 🔒 Sent as `DD-API-KEY`.
    pub api_key: String,
    /// 🔒 Sent as `DD-APPLICATION-KEY`.
    pub app_key: String,
}

fn default_api_url() -> String {
    "https://api.datadoghq.com".to_string()
}

/// 📡 A thin, honest HTTP client. No retries. No backoff. No lies.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: reqwest::Client,
    base_url: reqwest::Url,
    api_key: String,
    app_key: String,
}

impl HttpClient {
    /// 🚀 Build the client. Fails if the URL is garbage or the TLS stack is having a day.
    pub fn new(
        config: &ConnectionConfig,
        connect_timeout: Duration,
        timeout: Duration,
    ) -> Result<Self> {
        let base_url = reqwest::Url::parse(&config.api_url).with_context(|| {
            format!(
                "💀 '{}' is not a URL. It might be a hostname, a vibe, or a typo, but it is not a URL.",
                config.api_url
            )
        })?;
        if base_url.cannot_be_a_base() {
            return Err(ClientError::InvalidUrl {
                url: config.api_url.clone(),
            })
            .context("💀 The API URL can't have paths appended to it");
        }

        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(timeout)
            .build()
            .context("💀 The HTTP client refused to be born. Probably TLS. It's always TLS.")?;

        Ok(Self {
            client,
            base_url,
            api_key: config.api_key.clone(),
            app_key: config.app_key.clone(),
        })
    }

    /// 🔧 Glue `path` onto the base URL one segment at a time, so a channel called
    /// `#alerts` becomes `%23alerts` instead of a URL fragment that silently eats the rest.
    fn url_for(&self, path: &str, params: &QueryParams) -> Result<reqwest::Url, ClientError> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url.path_segments_mut().map_err(|_| ClientError::InvalidUrl {
                url: self.base_url.to_string(),
            })?;
            segments.pop_if_empty();
            for segment in path.split('/').filter(|segment| !segment.is_empty()) {
                segments.push(segment);
            }
        }
        if !params.is_empty() {
            url.query_pairs_mut()
                .extend_pairs(params.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        }
        Ok(url)
    }
}

fn reqwest_method(method: HttpMethod) -> reqwest::Method {
    match method {
        HttpMethod::Get => reqwest::Method::GET,
        HttpMethod::Post => reqwest::Method::POST,
        HttpMethod::Put => reqwest::Method::PUT,
        HttpMethod::Patch => reqwest::Method::PATCH,
        HttpMethod::Delete => reqwest::Method::DELETE,
    }
}

#[async_trait]
impl ApiClient for HttpClient {
    async fn request(
        &self,
        method: HttpMethod,
        path: &str,
        params: &QueryParams,
        body: Option<&Value>,
    ) -> Result<Value, ClientError> {
        let url = self.url_for(path, params)?;
        trace!("📡 {} {}", method, url);

        let mut request = self
            .client
            .request(reqwest_method(method), url.clone())
            .header("Accept", "application/json")
            .header("DD-API-KEY", &self.api_key)
            .header("DD-APPLICATION-KEY", &self.app_key);
        if let Some(body) = body {
            request = request
                .header("Content-Type", "application/json")
                .body(body.to_string());
        }

        let transport = |source| ClientError::Transport {
            method,
            url: url.to_string(),
            source,
        };
        let response = request.send().await.map_err(transport)?;
        let status = response.status();
        let text = response.text().await.map_err(transport)?;

        if !status.is_success() {
            return Err(ClientError::Http {
                method,
                path: path.to_string(),
                status: status.as_u16(),
                body: text,
            });
        }

        // -- 🫙 204s and empty 200s are a thing. Null is the honest answer.
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|source| ClientError::Decode {
            method,
            path: path.to_string(),
            source,
        })
    }
}
