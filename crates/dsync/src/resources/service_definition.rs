//! 📚 Service Catalog definitions.
//!
//! 🧠 Things worth knowing before touching this file:
//! - Listing is paginated (`page[size]=100`) and stops on `meta.page.total_count`.
//! - The service name hides in different places depending on schema version and on
//!   whether the object came from a list or was hand-written: `attributes.schema."dd-service"`
//!   (v2.x), `attributes.schema.name` (v3), then the same two at the top level, then `id`.
//! - Create and update are the same call: POST the raw schema to the base path.
//!   The response's `data` may be a list; the first element is the one we wrote.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;

use crate::client::ApiClient;
use crate::context::{ApplyContext, SyncContext};
use crate::identity::{IdentityResolver, KeyPart, lookup};
use crate::pagination::{PaginationConfig, remaining_from_total_count};
use crate::resources::{
    Resource, ResourceConfig, data_of, fetch_data, list_from, require_instance,
};

const CONFIG: ResourceConfig =
    ResourceConfig::new("service_definition", "/api/v2/services/definitions")
        .excluding(&["meta"])
        .paginated(PaginationConfig::new(100, remaining_from_total_count));

const IDENTITY: IdentityResolver = IdentityResolver::Simple(KeyPart::FirstOf(&[
    "attributes.schema.dd-service",
    "attributes.schema.name",
    "dd-service",
    "name",
    "id",
]));

#[derive(Debug, Default, Clone, Copy)]
pub struct ServiceDefinition;

/// 📦 The POST body is the bare schema, not the API's wrapped view of it.
fn schema_of(instance: &Value) -> &Value {
    lookup(instance, "attributes.schema").unwrap_or(instance)
}

/// 📦 `data`, or `data[0]` when the API answers with a list.
fn written(response: Value) -> Value {
    match data_of(response) {
        Value::Array(mut items) if !items.is_empty() => items.swap_remove(0),
        other => other,
    }
}

#[async_trait]
impl Resource for ServiceDefinition {
    fn config(&self) -> &ResourceConfig {
        &CONFIG
    }

    fn identity(&self, instance: &Value) -> String {
        IDENTITY.resolve(instance)
    }

    fn match_key(&self, instance: &Value) -> Option<String> {
        Some(self.identity(instance)).filter(|name| !name.is_empty())
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
            .post(CONFIG.base_path, schema_of(instance))
            .await
            .with_context(|| format!("💀 Failed to create service definition '{id}'"))?;
        Ok((id.to_string(), written(response)))
    }

    /// 🔄 Same POST as create: the API upserts by service name on its own.
    /// The destination entry is still required, like every other update.
    async fn update(&self, ctx: &ApplyContext<'_>, id: &str, instance: &Value) -> Result<(String, Value)> {
        ctx.run
            .destination_entry(CONFIG.resource_type, id)
            .await?;
        let response = ctx
            .destination()
            .post(CONFIG.base_path, schema_of(instance))
            .await
            .with_context(|| format!("💀 Failed to update service definition '{id}'"))?;
        Ok((id.to_string(), written(response)))
    }

    async fn delete(&self, ctx: &ApplyContext<'_>, id: &str) -> Result<()> {
        let destination = ctx
            .run
            .destination_entry(CONFIG.resource_type, id)
            .await?;
        let name = Some(self.identity(&destination))
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| id.to_string());
        ctx.destination()
            .delete(&CONFIG.path_for(&name), None)
            .await
            .with_context(|| format!("💀 Failed to delete service definition '{id}'"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::DestinationCache;
    use crate::client::HttpMethod;
    use crate::resources::test_support::harness;
    use serde_json::json;

    const PATH: &str = "/api/v2/services/definitions";

    fn wrapped(name: &str) -> Value {
        json!({
            "id": format!("uuid-{name}"),
            "type": "service-definition",
            "attributes": {
                "schema": {"schema-version": "v2.2", "dd-service": name, "team": "core"},
                "meta": {"last-modified-time": "2024-01-01"}
            }
        })
    }

    #[test]
    fn the_one_where_the_name_is_found_wherever_it_hides() {
        let sd = ServiceDefinition;
        assert_eq!(sd.identity(&wrapped("checkout")), "checkout");
        assert_eq!(
            sd.identity(&json!({"attributes": {"schema": {"schema-version": "v3", "name": "cart"}}})),
            "cart"
        );
        assert_eq!(sd.identity(&json!({"dd-service": "raw"})), "raw");
        assert_eq!(sd.identity(&json!({"name": "plain"})), "plain");
        assert_eq!(sd.identity(&json!({"id": "abc"})), "abc");
        assert_eq!(sd.identity(&json!({})), "");
        assert_eq!(sd.match_key(&json!({})), None);
    }

    #[tokio::test]
    async fn the_one_where_listing_pages_until_the_count_runs_out() {
        let (source, _, ctx) = harness();
        source
            .respond(
                HttpMethod::Get,
                PATH,
                json!({"data": [wrapped("a")], "meta": {"page": {"total_count": 101}}}),
            )
            .respond(
                HttpMethod::Get,
                PATH,
                json!({"data": [wrapped("b")], "meta": {"page": {"total_count": 101}}}),
            );
        let listed = ServiceDefinition.list(ctx.source()).await.expect("list");
        assert_eq!(listed.len(), 2);
        assert_eq!(source.count(HttpMethod::Get), 2);
    }

    #[tokio::test]
    async fn the_one_where_create_posts_the_bare_schema_and_takes_the_first_result() {
        let (_, destination, ctx) = harness();
        destination.respond(HttpMethod::Post, PATH, json!({"data": [wrapped("checkout"), wrapped("other")]}));
        let cache = DestinationCache::new();
        let apply = ApplyContext::new(&ctx, &cache);

        let (id, created) = ServiceDefinition
            .create(&apply, "checkout", &wrapped("checkout"))
            .await
            .expect("create");
        assert_eq!(id, "checkout");
        assert_eq!(created, wrapped("checkout"));
        let post = &destination.calls_to(HttpMethod::Post, Some(PATH))[0];
        assert_eq!(
            post.body,
            Some(json!({"schema-version": "v2.2", "dd-service": "checkout", "team": "core"}))
        );
    }

    #[tokio::test]
    async fn the_one_where_an_existing_definition_is_still_a_post() {
        let (_, destination, ctx) = harness();
        destination.respond(HttpMethod::Post, PATH, json!({"data": wrapped("checkout")}));
        let mut cache = DestinationCache::new();
        cache.insert("checkout".into(), wrapped("checkout"));
        let apply = ApplyContext::new(&ctx, &cache);

        let (_, updated) = ServiceDefinition
            .create(&apply, "checkout", &wrapped("checkout"))
            .await
            .expect("upsert");
        assert_eq!(updated, wrapped("checkout"));
        assert_eq!(destination.count(HttpMethod::Post), 1);
        assert!(ctx.state().await.destination("service_definition").contains_key("checkout"));
    }

    #[tokio::test]
    async fn the_one_where_delete_goes_by_service_name() {
        let (_, destination, ctx) = harness();
        ctx.record_destination("service_definition", "checkout", wrapped("checkout")).await;
        let cache = DestinationCache::new();
        let apply = ApplyContext::new(&ctx, &cache);

        ServiceDefinition.delete(&apply, "checkout").await.expect("delete");
        assert_eq!(destination.calls_to(HttpMethod::Delete, None)[0].path, format!("{PATH}/checkout"));
    }
}
