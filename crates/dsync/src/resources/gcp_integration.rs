//! 🌩️ GCP service accounts (v2, STS). Same envelope dance as Fastly, but accounts
//! are matched across orgs by `attributes.client_email`, and only when it's set.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::{Value, json};

use crate::client::ApiClient;
use crate::context::{ApplyContext, SyncContext};
use crate::identity::{IdentityResolver, KeyPart, field_str};
use crate::resources::{
    Resource, ResourceConfig, data_of, fetch_data, list_from, require_instance,
};

const CONFIG: ResourceConfig =
    ResourceConfig::new("gcp_integration", "/api/v2/integration/gcp/accounts").excluding(&["id"]);

const IDENTITY: IdentityResolver = IdentityResolver::Simple(KeyPart::Field("id"));

#[derive(Debug, Default, Clone, Copy)]
pub struct GcpIntegration;

#[async_trait]
impl Resource for GcpIntegration {
    fn config(&self) -> &ResourceConfig {
        &CONFIG
    }

    fn identity(&self, instance: &Value) -> String {
        IDENTITY.resolve(instance)
    }

    fn match_key(&self, instance: &Value) -> Option<String> {
        Some(field_str(instance, "attributes.client_email")).filter(|email| !email.is_empty())
    }

    async fn list(&self, client: &dyn ApiClient) -> Result<Vec<Value>> {
        list_from(client, &CONFIG, Some("data")).await
    }

    async fn import(
        &self,
        ctx: &SyncContext,
        id: Option<&str>,
        instance: Option<Value>,
    ) -> Result<(String, Value)> {
        let instance = match id {
            Some(id) => fetch_data(ctx, &CONFIG, id).await?,
            None => require_instance(CONFIG.resource_type, instance)?,
        };
        Ok((self.identity(&instance), instance))
    }

    async fn insert(&self, ctx: &ApplyContext<'_>, id: &str, instance: &Value) -> Result<(String, Value)> {
        let response = ctx
            .destination()
            .post(CONFIG.base_path, &json!({ "data": instance }))
            .await
            .with_context(|| format!("💀 Failed to create gcp_integration '{id}'"))?;
        Ok((id.to_string(), data_of(response)))
    }

    async fn update(&self, ctx: &ApplyContext<'_>, id: &str, instance: &Value) -> Result<(String, Value)> {
        let destination = ctx
            .run
            .destination_entry(CONFIG.resource_type, id)
            .await?;
        let response = ctx
            .destination()
            .patch(
                &CONFIG.path_for(&field_str(&destination, "id")),
                &json!({ "data": instance }),
            )
            .await
            .with_context(|| format!("💀 Failed to update gcp_integration '{id}'"))?;
        Ok((id.to_string(), data_of(response)))
    }

    async fn delete(&self, ctx: &ApplyContext<'_>, id: &str) -> Result<()> {
        let destination = ctx
            .run
            .destination_entry(CONFIG.resource_type, id)
            .await?;
        ctx.destination()
            .delete(&CONFIG.path_for(&field_str(&destination, "id")), None)
            .await
            .with_context(|| format!("💀 Failed to delete gcp_integration '{id}'"))
    }
}
