//! 🪝 Webhooks, the resource with no list endpoint.
//!
//! Webhooks can only be fetched by name, so:
//! - `list` returns nothing and says so. Import them by naming them in `Equals` filters.
//! - the destination cache is rebuilt by fetching, one by one, every name we already
//!   know about from the State Store (destination side first, then source side).

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use tracing::warn;

use crate::cache::DestinationCache;
use crate::client::ApiClient;
use crate::context::{ApplyContext, SyncContext};
use crate::identity::{IdentityResolver, KeyPart, field_str};
use crate::resources::{Resource, ResourceConfig, require_instance};

const CONFIG: ResourceConfig = ResourceConfig::new(
    "webhooks_integration",
    "/api/v1/integration/webhooks/configuration/webhooks",
)
.unlistable("name");

const IDENTITY: IdentityResolver = IdentityResolver::Simple(KeyPart::Field("name"));

#[derive(Debug, Default, Clone, Copy)]
pub struct WebhooksIntegration;

#[async_trait]
impl Resource for WebhooksIntegration {
    fn config(&self) -> &ResourceConfig {
        &CONFIG
    }

    fn identity(&self, instance: &Value) -> String {
        IDENTITY.resolve(instance)
    }

    async fn list(&self, _client: &dyn ApiClient) -> Result<Vec<Value>> {
        warn!(
            "⚠️ The webhooks API can't list webhooks. Name the ones you want with filters like \
             'Type=webhooks_integration;Name=name;Value=<webhook>'."
        );
        Ok(Vec::new())
    }

    async fn import(
        &self,
        ctx: &SyncContext,
        id: Option<&str>,
        instance: Option<Value>,
    ) -> Result<(String, Value)> {
        let instance = match id {
            Some(id) => ctx
                .source()
                .get(&CONFIG.path_for(id))
                .await
                .with_context(|| format!("💀 Failed to fetch webhook '{id}'"))?,
            None => require_instance(CONFIG.resource_type, instance)?,
        };
        Ok((self.identity(&instance), instance))
    }

    async fn pre_apply(&self, ctx: &SyncContext) -> Result<DestinationCache> {
        let names: Vec<String> = {
            let state = ctx.state().await;
            let mut names: Vec<String> = Vec::new();
            for instance in state
                .destination(CONFIG.resource_type)
                .values()
                .chain(state.source(CONFIG.resource_type).values())
            {
                let name = field_str(instance, "name");
                if !name.is_empty() && !names.contains(&name) {
                    names.push(name);
                }
            }
            names
        };

        let mut cache = DestinationCache::new();
        for name in names {
            let result = ctx.destination().get(&CONFIG.path_for(&name)).await;
            cache.absorb_lookup(CONFIG.resource_type, &name, result);
        }
        Ok(cache)
    }

    async fn insert(&self, ctx: &ApplyContext<'_>, id: &str, instance: &Value) -> Result<(String, Value)> {
        let response = ctx
            .destination()
            .post(CONFIG.base_path, instance)
            .await
            .with_context(|| format!("💀 Failed to create webhook '{id}'"))?;
        Ok((id.to_string(), response))
    }

    async fn update(&self, ctx: &ApplyContext<'_>, id: &str, instance: &Value) -> Result<(String, Value)> {
        let destination = ctx
            .run
            .destination_entry(CONFIG.resource_type, id)
            .await?;
        let response = ctx
            .destination()
            .put(&CONFIG.path_for(&field_str(&destination, "name")), instance, &[])
            .await
            .with_context(|| format!("💀 Failed to update webhook '{id}'"))?;
        Ok((id.to_string(), response))
    }

    async fn delete(&self, ctx: &ApplyContext<'_>, id: &str) -> Result<()> {
        let destination = ctx
            .run
            .destination_entry(CONFIG.resource_type, id)
            .await?;
        ctx.destination()
            .delete(&CONFIG.path_for(&field_str(&destination, "name")), None)
            .await
            .with_context(|| format!("💀 Failed to delete webhook '{id}'"))
    }
}
