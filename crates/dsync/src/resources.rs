//! 🧩 Resources: one adapter per kind of thing we know how to sync.
//!
//! 🎭 This module is the casting agency. Every adapter plays the same role
//! (list, import, create, update, delete, plus two hooks), and the engine never
//! needs to know which actor is on stage. Adapters are stateless. Anything that
//! smells like state (the destination cache, the identity mapping) arrives through
//! the context arguments and leaves with them.
//!
//! 🧠 Knowledge graph:
//! - `Resource` is the contract. Hooks and the upsert flow have defaults.
//! - `ResourceConfig` is the static description: type name, base path, excluded
//!   attributes, concurrency, pagination, whether there's a list endpoint at all.
//! - `ResourceBackend` is the enum of all eight, so selecting by name is a match,
//!   not a `Box<dyn>` scavenger hunt.
//!
//! 🦆 The duck stays. The duck always stays.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::cache::DestinationCache;
use crate::client::ApiClient;
use crate::context::{ApplyContext, SyncContext};
use crate::errors::EngineError;
use crate::pagination::{PaginationConfig, paginate};

pub(crate) mod aws_integration;
pub(crate) mod azure_integration;
pub(crate) mod fastly_integration;
pub(crate) mod gcp_integration;
pub(crate) mod pagerduty_integration;
pub(crate) mod service_definition;
pub(crate) mod slack_integration_channels;
pub(crate) mod webhooks_integration;

pub use aws_integration::AwsIntegration;
pub use azure_integration::AzureIntegration;
pub use fastly_integration::FastlyIntegration;
pub use gcp_integration::GcpIntegration;
pub use pagerduty_integration::PagerDutyIntegration;
pub use service_definition::ServiceDefinition;
pub use slack_integration_channels::SlackIntegrationChannels;
pub use webhooks_integration::WebhooksIntegration;

/// 📋 The static facts about a resource type.
#[derive(Debug, Clone, Copy)]
pub struct ResourceConfig {
    pub resource_type: &'static str,
    pub base_path: &'static str,
    /// Dotted paths ignored by change detection and stripped from payloads.
    pub excluded_attributes: &'static [&'static str],
    /// May several instances of this type be written at once?
    pub concurrent: bool,
    pub pagination: Option<PaginationConfig>,
    /// `Some(field)` for APIs that can't list and only fetch by that field.
    pub lookup_field: Option<&'static str>,
}

impl ResourceConfig {
    pub const fn new(resource_type: &'static str, base_path: &'static str) -> Self {
        Self {
            resource_type,
            base_path,
            excluded_attributes: &[],
            concurrent: true,
            pagination: None,
            lookup_field: None,
        }
    }

    pub const fn excluding(mut self, excluded_attributes: &'static [&'static str]) -> Self {
        self.excluded_attributes = excluded_attributes;
        self
    }

    pub const fn paginated(mut self, pagination: PaginationConfig) -> Self {
        self.pagination = Some(pagination);
        self
    }

    /// 🙈 No list endpoint: instances are fetched one by one via `lookup_field`.
    pub const fn unlistable(mut self, lookup_field: &'static str) -> Self {
        self.lookup_field = Some(lookup_field);
        self
    }

    /// 🔧 `base_path/segment`
    pub fn path_for(&self, segment: &str) -> String {
        format!("{}/{}", self.base_path, segment)
    }
}

/// 🧩 The adapter contract.
///
/// # Contract 📜
/// - `identity` is a pure function of natural-key fields. It never fails.
/// - `create` is an upsert: when the destination cache already holds the match key,
///   it seeds the destination state with the cached instance and becomes `update`.
/// - `update` and `delete` target the destination using the State Store, not the cache.
/// - Returned instances are what the destination looks like after the write.
#[async_trait]
pub trait Resource: Send + Sync + std::fmt::Debug {
    fn config(&self) -> &ResourceConfig;

    fn identity(&self, instance: &Value) -> String;

    /// 🔑 Key used to match this instance against the destination cache.
    /// `None` means "never matches anything at the destination".
    fn match_key(&self, instance: &Value) -> Option<String> {
        Some(self.identity(instance))
    }

    /// 📋 Every instance the account has. Missing envelopes read as empty.
    async fn list(&self, client: &dyn ApiClient) -> Result<Vec<Value>>;

    /// 📥 Resolve one source instance, either from the payload we already have or
    /// by fetching `id` from the source account.
    async fn import(
        &self,
        ctx: &SyncContext,
        id: Option<&str>,
        instance: Option<Value>,
    ) -> Result<(String, Value)>;

    /// 🚧 Runs once per apply pass, before any write. Builds the destination cache.
    async fn pre_apply(&self, ctx: &SyncContext) -> Result<DestinationCache> {
        let config = self.config();
        let instances = self.list(ctx.destination()).await.with_context(|| {
            format!("💀 Failed to list {} at the destination", config.resource_type)
        })?;
        Ok(DestinationCache::index(instances, |instance| {
            self.match_key(instance)
        }))
    }

    /// 🪝 Runs right before each create or update.
    async fn pre_action(&self, _ctx: &ApplyContext<'_>, _id: &str, _instance: &Value) -> Result<()> {
        Ok(())
    }

    /// 🔄 Upsert. Use the cache to decide between `insert` and `update`.
    async fn create(&self, ctx: &ApplyContext<'_>, id: &str, instance: &Value) -> Result<(String, Value)> {
        let config = self.config();
        if let Some(existing) = self.match_key(instance).and_then(|key| ctx.cache.get(&key)) {
            debug!(
                "🔄 {} '{}' already exists at the destination, updating instead of creating",
                config.resource_type, id
            );
            ctx.run
                .record_destination(config.resource_type, id, existing.clone())
                .await;
            return self.update(ctx, id, instance).await;
        }
        self.insert(ctx, id, instance).await
    }

    /// 🆕 The actual create call.
    async fn insert(&self, ctx: &ApplyContext<'_>, id: &str, instance: &Value) -> Result<(String, Value)>;

    async fn update(&self, ctx: &ApplyContext<'_>, id: &str, instance: &Value) -> Result<(String, Value)>;

    async fn delete(&self, ctx: &ApplyContext<'_>, id: &str) -> Result<()>;
}

/// 📋 Shared `list` body for the common shapes: paginated, enveloped under `key`,
/// or a bare array when `key` is `None`.
pub(crate) async fn list_from(
    client: &dyn ApiClient,
    config: &ResourceConfig,
    key: Option<&str>,
) -> Result<Vec<Value>> {
    if let Some(pagination) = &config.pagination {
        return paginate(client, config.base_path, pagination)
            .await
            .with_context(|| format!("💀 Failed to page through {}", config.resource_type));
    }
    let response = client
        .get(config.base_path)
        .await
        .with_context(|| format!("💀 Failed to list {}", config.resource_type))?;
    Ok(items_under(response, key))
}

/// 📦 Pull an array out of a response. Anything unexpected is an empty list.
pub(crate) fn items_under(response: Value, key: Option<&str>) -> Vec<Value> {
    let items = match key {
        Some(key) => response.get(key).cloned(),
        None => Some(response),
    };
    match items {
        Some(Value::Array(items)) => items,
        _ => Vec::new(),
    }
}

/// 🔍 Find `id` among a full source listing, for APIs without a single-item fetch.
pub(crate) async fn find_in_source<R: Resource + ?Sized>(
    resource: &R,
    ctx: &SyncContext,
    id: &str,
) -> Result<Value> {
    resource
        .list(ctx.source())
        .await?
        .into_iter()
        .find(|candidate| resource.identity(candidate) == id)
        .ok_or_else(|| {
            EngineError::NotFoundInSource {
                resource_type: resource.config().resource_type.to_string(),
                identity: id.to_string(),
            }
            .into()
        })
}

/// 📦 `response.data`, or the response itself when the envelope is missing.
pub(crate) fn data_of(response: Value) -> Value {
    match response {
        Value::Object(mut map) if map.contains_key("data") => {
            map.remove("data").unwrap_or(Value::Null)
        }
        other => other,
    }
}

/// 📥 GET `base/{id}` from the source and unwrap `data`. No object under `data`
/// means the source doesn't have it.
pub(crate) async fn fetch_data(
    ctx: &SyncContext,
    config: &ResourceConfig,
    id: &str,
) -> Result<Value> {
    let response = ctx
        .source()
        .get(&config.path_for(id))
        .await
        .with_context(|| format!("💀 Failed to fetch {} '{}'", config.resource_type, id))?;
    match response.get("data") {
        Some(data) if data.is_object() => Ok(data.clone()),
        _ => Err(EngineError::NotFoundInSource {
            resource_type: config.resource_type.to_string(),
            identity: id.to_string(),
        }
        .into()),
    }
}

/// 🧰 Copy `instance` and lay `response`'s top-level fields over it.
pub(crate) fn merged(instance: &Value, response: &Value) -> Value {
    let mut merged = instance.clone();
    if let (Value::Object(target), Value::Object(extra)) = (&mut merged, response) {
        for (key, value) in extra {
            target.insert(key.clone(), value.clone());
        }
    }
    merged
}

/// 🔧 An import with no id has to bring its own instance.
pub(crate) fn require_instance(resource_type: &str, instance: Option<Value>) -> Result<Value> {
    instance.ok_or_else(|| {
        anyhow::anyhow!("💀 {resource_type} import needs either an id or an instance, got neither")
    })
}

/// 🎭 All eight adapters, selectable by name.
#[derive(Debug, Clone, Copy)]
pub enum ResourceBackend {
    Aws(AwsIntegration),
    Azure(AzureIntegration),
    Fastly(FastlyIntegration),
    Gcp(GcpIntegration),
    PagerDuty(PagerDutyIntegration),
    ServiceDefinition(ServiceDefinition),
    SlackChannels(SlackIntegrationChannels),
    Webhooks(WebhooksIntegration),
}

impl ResourceBackend {
    /// 📜 Every supported type, in the order they're synced.
    pub fn all() -> Vec<ResourceBackend> {
        vec![
            ResourceBackend::Aws(AwsIntegration),
            ResourceBackend::Azure(AzureIntegration),
            ResourceBackend::Fastly(FastlyIntegration),
            ResourceBackend::Gcp(GcpIntegration),
            ResourceBackend::PagerDuty(PagerDutyIntegration),
            ResourceBackend::ServiceDefinition(ServiceDefinition),
            ResourceBackend::SlackChannels(SlackIntegrationChannels),
            ResourceBackend::Webhooks(WebhooksIntegration),
        ]
    }

    pub fn all_names() -> Vec<&'static str> {
        Self::all()
            .iter()
            .map(|backend| backend.resource_type())
            .collect()
    }

    pub fn from_name(name: &str) -> Result<ResourceBackend, EngineError> {
        Self::all()
            .into_iter()
            .find(|backend| backend.resource_type() == name)
            .ok_or_else(|| EngineError::UnknownResourceType(name.to_string()))
    }

    pub fn resource_type(&self) -> &'static str {
        self.as_resource().config().resource_type
    }

    pub fn as_resource(&self) -> &dyn Resource {
        match self {
            ResourceBackend::Aws(r) => r,
            ResourceBackend::Azure(r) => r,
            ResourceBackend::Fastly(r) => r,
            ResourceBackend::Gcp(r) => r,
            ResourceBackend::PagerDuty(r) => r,
            ResourceBackend::ServiceDefinition(r) => r,
            ResourceBackend::SlackChannels(r) => r,
            ResourceBackend::Webhooks(r) => r,
        }
    }
}
