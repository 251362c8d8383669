//! 📡 The API client seam: everything that talks to an account goes through here.
//!
//! 🧠 Knowledge graph:
//! - `ApiClient` is the trait. One required method (`request`), five convenience verbs.
//! - `HttpClient` (reqwest) is the real thing, `InMemoryClient` is the stunt double for tests.
//! - Adapters never see reqwest. They see `&dyn ApiClient` and JSON. That's the deal.
//!
//! Retries, backoff and rate limiting are somebody else's problem. We make one request,
//! we report what happened, we go home. 🦆

use std::fmt;

use async_trait::async_trait;
use serde_json::Value;

use crate::errors::ClientError;

pub(crate) mod http;
#[cfg(test)]
pub(crate) mod in_mem;

pub use http::{ConnectionConfig, HttpClient};

/// 🔧 Query parameters as ordered pairs. Order matters to exactly nobody but tests.
pub type QueryParams = [(String, String)];

/// 🎭 The five verbs we speak.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verb = match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        };
        f.write_str(verb)
    }
}

/// 📡 Anything that can answer API calls for one account.
///
/// # Contract 📜
/// - `path` is absolute (`/api/v1/...`) and relative to the account's API base URL.
/// - Bodies go out as JSON. Responses come back as JSON; an empty body is `Value::Null`.
/// - Any non-2xx response is a `ClientError::Http` carrying the status code.
#[async_trait]
pub trait ApiClient: Send + Sync + fmt::Debug {
    /// 🚀 The one method implementors actually write.
    async fn request(
        &self,
        method: HttpMethod,
        path: &str,
        params: &QueryParams,
        body: Option<&Value>,
    ) -> Result<Value, ClientError>;

    async fn get(&self, path: &str) -> Result<Value, ClientError> {
        self.request(HttpMethod::Get, path, &[], None).await
    }

    async fn get_with_params(&self, path: &str, params: &QueryParams) -> Result<Value, ClientError> {
        self.request(HttpMethod::Get, path, params, None).await
    }

    async fn post(&self, path: &str, body: &Value) -> Result<Value, ClientError> {
        self.request(HttpMethod::Post, path, &[], Some(body)).await
    }

    /// 🔄 PUT takes params because composite-keyed APIs want the natural key in the query.
    async fn put(&self, path: &str, body: &Value, params: &QueryParams) -> Result<Value, ClientError> {
        self.request(HttpMethod::Put, path, params, Some(body)).await
    }

    async fn patch(&self, path: &str, body: &Value) -> Result<Value, ClientError> {
        self.request(HttpMethod::Patch, path, &[], Some(body)).await
    }

    /// 🗑️ Some DELETEs identify their target by body. Yes, a body on DELETE. We don't make the rules.
    async fn delete(&self, path: &str, body: Option<&Value>) -> Result<(), ClientError> {
        self.request(HttpMethod::Delete, path, &[], body).await?;
        Ok(())
    }
}
