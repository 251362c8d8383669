//! # Previously, on dsync...
//!
//! 🎬 Somewhere, an API lives on a server we are not allowed to touch in unit tests.
//! So we built one out of a HashMap and a call log. It answers instantly, never
//! rate-limits, and remembers every single thing you said to it. Like a therapist,
//! but it bills nothing.
//!
//! `InMemoryClient` is the stunt double for `ApiClient`:
//! - canned responses per `(method, path)`; queue several and they play in order,
//!   the last one sticks around for encores
//! - `fail(method, path, status)` to make a path return an HTTP error
//! - `outage()` to pretend the network fell into the sea, or `unreachable(method, path)`
//!   for a transport failure on just one route
//! - unconfigured GETs are 404, unconfigured writes echo the body back, unconfigured
//!   DELETEs return nothing
//!
//! ⚠️ Test-only. If this shows up in prod, something has gone very wrong upstream. 🦆

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use crate::client::{ApiClient, HttpMethod, QueryParams};
use crate::errors::ClientError;

/// 📜 One recorded call. The receipts.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct RecordedCall {
    pub(crate) method: HttpMethod,
    pub(crate) path: String,
    pub(crate) params: Vec<(String, String)>,
    pub(crate) body: Option<Value>,
}

#[derive(Debug, Clone)]
enum Canned {
    Json(Value),
    Status(u16),
    Unreachable,
}

#[derive(Debug, Default)]
struct Inner {
    canned: HashMap<(HttpMethod, String), VecDeque<Canned>>,
    calls: Vec<RecordedCall>,
    outage: bool,
}

/// 🎭 A fake account that lives in RAM.
#[derive(Debug, Default)]
pub(crate) struct InMemoryClient {
    inner: Mutex<Inner>,
}

impl InMemoryClient {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// 📦 Queue a JSON response for `method path`.
    pub(crate) fn respond(&self, method: HttpMethod, path: &str, body: Value) -> &Self {
        self.push(method, path, Canned::Json(body))
    }

    /// 💀 Queue an HTTP failure for `method path`.
    pub(crate) fn fail(&self, method: HttpMethod, path: &str, status: u16) -> &Self {
        self.push(method, path, Canned::Status(status))
    }

    /// 🔌 Queue a transport failure for `method path`.
    pub(crate) fn unreachable(&self, method: HttpMethod, path: &str) -> &Self {
        self.push(method, path, Canned::Unreachable)
    }

    /// 🔌 Every call from now on is a transport failure.
    pub(crate) fn outage(&self) -> &Self {
        self.lock().outage = true;
        self
    }

    /// 📜 Everything that was asked of us, in order.
    pub(crate) fn calls(&self) -> Vec<RecordedCall> {
        self.lock().calls.clone()
    }

    /// 🔢 Calls with this method, optionally narrowed to one path.
    pub(crate) fn calls_to(&self, method: HttpMethod, path: Option<&str>) -> Vec<RecordedCall> {
        self.calls()
            .into_iter()
            .filter(|call| call.method == method)
            .filter(|call| path.is_none_or(|p| call.path == p))
            .collect()
    }

    pub(crate) fn count(&self, method: HttpMethod) -> usize {
        self.calls_to(method, None).len()
    }

    fn push(&self, method: HttpMethod, path: &str, canned: Canned) -> &Self {
        self.lock()
            .canned
            .entry((method, path.to_string()))
            .or_default()
            .push_back(canned);
        self
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // -- 🧪 a poisoned lock in a test double means a test already panicked; keep going
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl ApiClient for InMemoryClient {
    async fn request(
        &self,
        method: HttpMethod,
        path: &str,
        params: &QueryParams,
        body: Option<&Value>,
    ) -> Result<Value, ClientError> {
        let mut inner = self.lock();
        inner.calls.push(RecordedCall {
            method,
            path: path.to_string(),
            params: params.to_vec(),
            body: body.cloned(),
        });

        if inner.outage {
            return Err(ClientError::InvalidUrl {
                url: format!("in-memory://down{path}"),
            });
        }

        let canned = match inner.canned.get_mut(&(method, path.to_string())) {
            Some(queue) if queue.len() > 1 => queue.pop_front(),
            Some(queue) => queue.front().cloned(),
            None => None,
        };

        match canned {
            Some(Canned::Json(value)) => Ok(value),
            Some(Canned::Status(status)) => Err(ClientError::Http {
                method,
                path: path.to_string(),
                status,
                body: String::new(),
            }),
            Some(Canned::Unreachable) => Err(ClientError::InvalidUrl {
                url: format!("in-memory://unreachable{path}"),
            }),
            None => match method {
                HttpMethod::Get => Err(ClientError::Http {
                    method,
                    path: path.to_string(),
                    status: 404,
                    body: String::new(),
                }),
                HttpMethod::Delete => Ok(Value::Null),
                _ => Ok(body.cloned().unwrap_or(Value::Null)),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn the_one_where_the_last_canned_reply_sticks_around() {
        let client = InMemoryClient::new();
        client
            .respond(HttpMethod::Get, "/x", json!(1))
            .respond(HttpMethod::Get, "/x", json!(2));

        assert_eq!(client.get("/x").await.expect("first"), json!(1));
        assert_eq!(client.get("/x").await.expect("second"), json!(2));
        assert_eq!(client.get("/x").await.expect("encore"), json!(2));
        assert_eq!(client.count(HttpMethod::Get), 3);
    }

    #[tokio::test]
    async fn the_one_where_unknown_paths_behave_like_a_polite_api() {
        let client = InMemoryClient::new();
        let err = client.get("/nope").await.expect_err("unconfigured GET is a 404");
        assert!(err.is_not_found());

        let echoed = client.post("/things", &json!({"a": 1})).await.expect("echo");
        assert_eq!(echoed, json!({"a": 1}));
        client.delete("/things/1", None).await.expect("delete is fine");
    }
}
