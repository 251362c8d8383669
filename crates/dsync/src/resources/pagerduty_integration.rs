//! 📟 PagerDuty service objects, addressed by `service_name` in both accounts.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;

use crate::client::ApiClient;
use crate::context::{ApplyContext, SyncContext};
use crate::identity::{IdentityResolver, KeyPart, field_str};
use crate::resources::{Resource, ResourceConfig, list_from, require_instance};

const CONFIG: ResourceConfig = ResourceConfig::new(
    "pagerduty_integration",
    "/api/v1/integration/pagerduty/configuration/services",
)
.excluding(&["service_key"]);

const IDENTITY: IdentityResolver = IdentityResolver::Simple(KeyPart::Field("service_name"));

#[derive(Debug, Default, Clone, Copy)]
pub struct PagerDutyIntegration;

fn written(instance: &Value, response: Value) -> Value {
    if response.is_null() {
        instance.clone()
    } else {
        response
    }
}

#[async_trait]
impl Resource for PagerDutyIntegration {
    fn config(&self) -> &ResourceConfig {
        &CONFIG
    }

    fn identity(&self, instance: &Value) -> String {
        IDENTITY.resolve(instance)
    }

    async fn list(&self, client: &dyn ApiClient) -> Result<Vec<Value>> {
        list_from(client, &CONFIG, Some("services")).await
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
                .with_context(|| format!("💀 Failed to fetch pagerduty service '{id}'"))?,
            None => require_instance(CONFIG.resource_type, instance)?,
        };
        Ok((self.identity(&instance), instance))
    }

    async fn insert(&self, ctx: &ApplyContext<'_>, id: &str, instance: &Value) -> Result<(String, Value)> {
        let response = ctx
            .destination()
            .post(CONFIG.base_path, instance)
            .await
            .with_context(|| format!("💀 Failed to create pagerduty service '{id}'"))?;
        Ok((id.to_string(), written(instance, response)))
    }

    async fn update(&self, ctx: &ApplyContext<'_>, id: &str, instance: &Value) -> Result<(String, Value)> {
        let destination = ctx
            .run
            .destination_entry(CONFIG.resource_type, id)
            .await?;
        let path = CONFIG.path_for(&field_str(&destination, "service_name"));
        let response = ctx
            .destination()
            .put(&path, instance, &[])
            .await
            .with_context(|| format!("💀 Failed to update pagerduty service '{id}'"))?;
        Ok((id.to_string(), written(instance, response)))
    }

    async fn delete(&self, ctx: &ApplyContext<'_>, id: &str) -> Result<()> {
        let destination = ctx
            .run
            .destination_entry(CONFIG.resource_type, id)
            .await?;
        ctx.destination()
            .delete(&CONFIG.path_for(&field_str(&destination, "service_name")), None)
            .await
            .with_context(|| format!("💀 Failed to delete pagerduty service '{id}'"))
    }
}
