//! 💬 Slack channels, one level below Slack accounts.
//!
//! Listing is two-step: accounts first, then each account's channels. Every channel
//! gets an `_account_name` stamped on it so it can be found again, and the identity
//! is `account:channel`. Channel names can contain `:`, so the id is split on the
//! first separator only. `_account_name` is bookkeeping and never goes over the wire.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use tracing::warn;

use crate::client::ApiClient;
use crate::context::{ApplyContext, SyncContext};
use crate::identity::{IdentityResolver, KeyPart, field_str, split_composite};
use crate::resources::{Resource, ResourceConfig, items_under, require_instance};

const CONFIG: ResourceConfig = ResourceConfig::new(
    "slack_integration_channels",
    "/api/v1/integration/slack/configuration/accounts",
);

const ACCOUNT_FIELD: &str = "_account_name";

const IDENTITY: IdentityResolver = IdentityResolver::Composite(&[
    KeyPart::Field(ACCOUNT_FIELD),
    KeyPart::FirstOf(&["channel_name", "name"]),
]);

#[derive(Debug, Default, Clone, Copy)]
pub struct SlackIntegrationChannels;

fn channels_path(account: &str) -> String {
    format!("{}/{}/channels", CONFIG.base_path, account)
}

fn channel_path(account: &str, channel: &str) -> String {
    format!("{}/{}", channels_path(account), channel)
}

fn stamped(mut channel: Value, account: &str) -> Value {
    if let Value::Object(map) = &mut channel {
        map.insert(ACCOUNT_FIELD.to_string(), Value::String(account.to_string()));
    }
    channel
}

fn payload(instance: &Value) -> Value {
    let mut payload = instance.clone();
    if let Value::Object(map) = &mut payload {
        map.remove(ACCOUNT_FIELD);
    }
    payload
}

#[async_trait]
impl Resource for SlackIntegrationChannels {
    fn config(&self) -> &ResourceConfig {
        &CONFIG
    }

    fn identity(&self, instance: &Value) -> String {
        IDENTITY.resolve(instance)
    }

    async fn list(&self, client: &dyn ApiClient) -> Result<Vec<Value>> {
        let accounts = client
            .get(CONFIG.base_path)
            .await
            .context("💀 Failed to list Slack accounts")?;

        let mut channels = Vec::new();
        for account in items_under(accounts, None) {
            let name = Some(field_str(&account, "name"))
                .filter(|name| !name.is_empty())
                .unwrap_or_else(|| field_str(&account, "account_name"));
            if name.is_empty() {
                continue;
            }
            // -- 🧯 one broken workspace shouldn't hide every other workspace's channels
            match client.get(&channels_path(&name)).await {
                Ok(response) => channels.extend(
                    items_under(response, None)
                        .into_iter()
                        .map(|channel| stamped(channel, &name)),
                ),
                Err(e) => warn!("⚠️ Couldn't list channels for Slack account '{}': {}", name, e),
            }
        }
        Ok(channels)
    }

    async fn import(
        &self,
        ctx: &SyncContext,
        id: Option<&str>,
        instance: Option<Value>,
    ) -> Result<(String, Value)> {
        let instance = match id {
            Some(id) => {
                let (account, channel) = split_composite(id);
                let fetched = ctx
                    .source()
                    .get(&channel_path(account, channel))
                    .await
                    .with_context(|| format!("💀 Failed to fetch Slack channel '{id}'"))?;
                stamped(fetched, account)
            }
            None => require_instance(CONFIG.resource_type, instance)?,
        };
        Ok((self.identity(&instance), instance))
    }

    async fn insert(&self, ctx: &ApplyContext<'_>, id: &str, instance: &Value) -> Result<(String, Value)> {
        let account = field_str(instance, ACCOUNT_FIELD);
        let response = ctx
            .destination()
            .post(&channels_path(&account), &payload(instance))
            .await
            .with_context(|| format!("💀 Failed to create Slack channel '{id}'"))?;
        Ok((id.to_string(), stamped(response, &account)))
    }

    async fn update(&self, ctx: &ApplyContext<'_>, id: &str, instance: &Value) -> Result<(String, Value)> {
        ctx.run
            .destination_entry(CONFIG.resource_type, id)
            .await?;
        let (account, channel) = split_composite(id);
        let response = ctx
            .destination()
            .patch(&channel_path(account, channel), &payload(instance))
            .await
            .with_context(|| format!("💀 Failed to update Slack channel '{id}'"))?;
        Ok((id.to_string(), stamped(response, account)))
    }

    async fn delete(&self, ctx: &ApplyContext<'_>, id: &str) -> Result<()> {
        let destination = ctx
            .run
            .destination_entry(CONFIG.resource_type, id)
            .await?;
        let known = self.identity(&destination);
        let (account, channel) = split_composite(if known == ":" { id } else { known.as_str() });
        ctx.destination()
            .delete(&channel_path(account, channel), None)
            .await
            .with_context(|| format!("💀 Failed to delete Slack channel '{id}'"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::DestinationCache;
    use crate::client::HttpMethod;
    use crate::resources::test_support::harness;
    use serde_json::json;

    const ACCOUNTS: &str = "/api/v1/integration/slack/configuration/accounts";

    fn channel(name: &str) -> Value {
        json!({"name": name, "display": {"message": true, "notified": false}})
    }

    #[tokio::test]
    async fn the_one_where_every_channel_knows_its_workspace() {
        let (source, _, ctx) = harness();
        source
            .respond(
                HttpMethod::Get,
                ACCOUNTS,
                json!([{"name": "main"}, {"account_name": "ops"}, {"name": ""}]),
            )
            .respond(HttpMethod::Get, &format!("{ACCOUNTS}/main/channels"), json!([channel("#general")]))
            .fail(HttpMethod::Get, &format!("{ACCOUNTS}/ops/channels"), 500);

        let listed = SlackIntegrationChannels.list(ctx.source()).await.expect("list");
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0]["_account_name"], "main");
        assert_eq!(SlackIntegrationChannels.identity(&listed[0]), "main:#general");
        // -- 🔢 accounts + main + ops; the nameless account is skipped
        assert_eq!(source.count(HttpMethod::Get), 3);
    }

    #[tokio::test]
    async fn the_one_where_a_non_list_accounts_reply_means_no_channels() {
        let (source, _, ctx) = harness();
        source.respond(HttpMethod::Get, ACCOUNTS, json!({"error": "nope"}));
        assert!(SlackIntegrationChannels.list(ctx.source()).await.expect("list").is_empty());
    }

    #[tokio::test]
    async fn the_one_where_import_splits_on_the_first_colon_only() {
        let (source, _, ctx) = harness();
        source.respond(
            HttpMethod::Get,
            &format!("{ACCOUNTS}/workspace/channels/#channel:with:colons"),
            channel("#channel:with:colons"),
        );
        let (id, instance) = SlackIntegrationChannels
            .import(&ctx, Some("workspace:#channel:with:colons"), None)
            .await
            .expect("import");
        assert_eq!(id, "workspace:#channel:with:colons");
        assert_eq!(instance["_account_name"], "workspace");
    }

    #[tokio::test]
    async fn the_one_where_bookkeeping_stays_home() {
        let (_, destination, ctx) = harness();
        let cache = DestinationCache::new();
        let apply = ApplyContext::new(&ctx, &cache);

        let (_, created) = SlackIntegrationChannels
            .create(&apply, "main:#alerts", &stamped(channel("#alerts"), "main"))
            .await
            .expect("create");
        let post = &destination.calls_to(HttpMethod::Post, Some(format!("{ACCOUNTS}/main/channels").as_str()))[0];
        assert_eq!(post.body, Some(channel("#alerts")));
        assert_eq!(created["_account_name"], "main");
    }

    #[tokio::test]
    async fn the_one_where_a_known_channel_is_patched_in_place() {
        let (_, destination, ctx) = harness();
        let mut cache = DestinationCache::new();
        cache.insert("main:#alerts".into(), stamped(channel("#alerts"), "main"));
        let apply = ApplyContext::new(&ctx, &cache);

        SlackIntegrationChannels
            .create(&apply, "main:#alerts", &stamped(channel("#alerts"), "main"))
            .await
            .expect("upsert");
        assert_eq!(destination.count(HttpMethod::Post), 0);
        let patch = &destination.calls_to(HttpMethod::Patch, None)[0];
        assert_eq!(patch.path, format!("{ACCOUNTS}/main/channels/#alerts"));
        assert_eq!(patch.body, Some(channel("#alerts")));
    }

    #[tokio::test]
    async fn the_one_where_delete_hits_the_channel_path() {
        let (_, destination, ctx) = harness();
        ctx.record_destination(
            "slack_integration_channels",
            "main:#alerts",
            stamped(channel("#alerts"), "main"),
        )
        .await;
        let cache = DestinationCache::new();
        let apply = ApplyContext::new(&ctx, &cache);

        SlackIntegrationChannels.delete(&apply, "main:#alerts").await.expect("delete");
        assert_eq!(
            destination.calls_to(HttpMethod::Delete, None)[0].path,
            format!("{ACCOUNTS}/main/channels/#alerts")
        );
    }
}
