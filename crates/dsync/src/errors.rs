//! 💀 Errors: the taxonomy of things going sideways.
//!
//! Everything in dsync propagates `anyhow::Result` with context strings stacked
//! like pancakes. But the engine needs to tell a 404 from a dead network from a
//! "you called update before create" bug, and you can't do that by squinting at
//! a string. So the leaves are typed (`ClientError`, `EngineError`) and the engine
//! downcasts through the anyhow chain to decide how loudly to panic. 🦆

use thiserror::Error;

use crate::client::HttpMethod;

/// 📡 What the HTTP layer can throw at you.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The server answered, and the answer was "no".
    #[error("💀 {method} {path} came back with HTTP {status}: {body}")]
    Http {
        method: HttpMethod,
        path: String,
        status: u16,
        body: String,
    },

    /// The server never answered. Connection refused, DNS, timeouts, TLS sadness.
    #[error("💀 {method} {url} never made it to the other side")]
    Transport {
        method: HttpMethod,
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// 2xx, but the body is not JSON. Bold move.
    #[error("💀 {method} {path} answered with something that is not JSON")]
    Decode {
        method: HttpMethod,
        path: String,
        #[source]
        source: serde_json::Error,
    },

    /// The configured base URL can't carry a path. Caught at startup, usually.
    #[error("💀 '{url}' is not a usable API base URL")]
    InvalidUrl { url: String },
}

impl ClientError {
    /// 🔢 The HTTP status, if the server got far enough to have one.
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// 🔍 404: the object is simply not there. Recoverable, drives "absent" logic.
    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }

    /// 🔌 True when the transport itself is down, not just one request being rejected.
    pub fn is_outage(&self) -> bool {
        matches!(self, ClientError::Transport { .. } | ClientError::InvalidUrl { .. })
    }
}

/// 🧠 Engine-level failures that are not the network's fault.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Update/delete asked for an identity the State Store never recorded at the
    /// destination. The create phase never ran for it: that's an ordering bug.
    #[error(
        "💀 no destination state for {resource_type} '{identity}': update/delete ran before anything was ever created"
    )]
    MissingDestinationState {
        resource_type: String,
        identity: String,
    },

    #[error("🔍 {resource_type} '{identity}' was not found in the source account")]
    NotFoundInSource {
        resource_type: String,
        identity: String,
    },

    #[error("🤷 unknown resource type '{0}'")]
    UnknownResourceType(String),

    #[error("💀 malformed filter '{filter}': {reason}")]
    InvalidFilter { filter: String, reason: String },
}

/// 🚦 How bad is it? The engine's triage verdict for one failed operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Severity {
    /// Log it, count it, move on to the next item.
    Item,
    /// The transport is down: stop this resource type, keep what already landed.
    TypeAbort,
    /// Invariant violation: stop the whole run.
    Fatal,
}

/// 🚦 Walk the anyhow chain and decide how the engine should react.
pub(crate) fn classify(err: &anyhow::Error) -> Severity {
    for cause in err.chain() {
        if let Some(engine_err) = cause.downcast_ref::<EngineError>() {
            return match engine_err {
                EngineError::MissingDestinationState { .. } => Severity::Fatal,
                _ => Severity::Item,
            };
        }
        if let Some(client_err) = cause.downcast_ref::<ClientError>() {
            return if client_err.is_outage() {
                Severity::TypeAbort
            } else {
                Severity::Item
            };
        }
    }
    Severity::Item
}

/// 🔍 Did this failure bottom out in a 404?
pub(crate) fn is_not_found(err: &anyhow::Error) -> bool {
    err.chain()
        .filter_map(|cause| cause.downcast_ref::<ClientError>())
        .any(ClientError::is_not_found)
}
