//! 🔷 Azure integration accounts, keyed by `tenant_name:client_id`.
//!
//! The list endpoint answers with a bare array. Updates PUT the whole config to the
//! base path (the body already names the tenant and client), deletes name them in
//! the body.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::{Value, json};

use crate::client::ApiClient;
use crate::context::{ApplyContext, SyncContext};
use crate::identity::{IdentityResolver, KeyPart, field_str};
use crate::resources::{Resource, ResourceConfig, find_in_source, list_from, require_instance};

const CONFIG: ResourceConfig = ResourceConfig::new("azure_integration", "/api/v1/integration/azure")
    .excluding(&["client_secret", "errors"]);

const IDENTITY: IdentityResolver =
    IdentityResolver::Composite(&[KeyPart::Field("tenant_name"), KeyPart::Field("client_id")]);

#[derive(Debug, Default, Clone, Copy)]
pub struct AzureIntegration;

#[async_trait]
impl Resource for AzureIntegration {
    fn config(&self) -> &ResourceConfig {
        &CONFIG
    }

    fn identity(&self, instance: &Value) -> String {
        IDENTITY.resolve(instance)
    }

    async fn list(&self, client: &dyn ApiClient) -> Result<Vec<Value>> {
        list_from(client, &CONFIG, None).await
    }

    async fn import(
        &self,
        ctx: &SyncContext,
        id: Option<&str>,
        instance: Option<Value>,
    ) -> Result<(String, Value)> {
        let instance = match id {
            Some(id) => find_in_source(self, ctx, id).await?,
            None => require_instance(CONFIG.resource_type, instance)?,
        };
        Ok((self.identity(&instance), instance))
    }

    async fn insert(&self, ctx: &ApplyContext<'_>, id: &str, instance: &Value) -> Result<(String, Value)> {
        ctx.destination()
            .post(CONFIG.base_path, instance)
            .await
            .with_context(|| format!("💀 Failed to create azure_integration '{id}'"))?;
        Ok((id.to_string(), instance.clone()))
    }

    async fn update(&self, ctx: &ApplyContext<'_>, id: &str, instance: &Value) -> Result<(String, Value)> {
        // -- 🔒 the body names the tenant, but an update with no destination state is still a bug
        ctx.run
            .destination_entry(CONFIG.resource_type, id)
            .await?;
        ctx.destination()
            .put(CONFIG.base_path, instance, &[])
            .await
            .with_context(|| format!("💀 Failed to update azure_integration '{id}'"))?;
        Ok((id.to_string(), instance.clone()))
    }

    async fn delete(&self, ctx: &ApplyContext<'_>, id: &str) -> Result<()> {
        let destination = ctx
            .run
            .destination_entry(CONFIG.resource_type, id)
            .await?;
        let body = json!({
            "tenant_name": field_str(&destination, "tenant_name"),
            "client_id": field_str(&destination, "client_id"),
        });
        ctx.destination()
            .delete(CONFIG.base_path, Some(&body))
            .await
            .with_context(|| format!("💀 Failed to delete azure_integration '{id}'"))
    }
}
