//! 📄 Pagination: "are we there yet?" asked one page at a time.
//!
//! The driver knows nothing about envelopes beyond where the items live. Whether
//! to keep going is the resource's call, via a `remaining` function that looks at
//! the last response and returns how many items are still out there. Zero means
//! stop. An empty page also means stop, because an API that says "there's more"
//! while handing over nothing is an API that will say it forever. 🦆

use serde_json::Value;
use tracing::trace;

use crate::client::ApiClient;
use crate::errors::ClientError;

/// 🔢 `(page_index, last_response, page_size, page_number) -> items still remaining`
pub type RemainingFn = fn(usize, &Value, usize, usize) -> usize;

/// 📐 How one resource type pages.
#[derive(Debug, Clone, Copy)]
pub struct PaginationConfig {
    pub page_size: usize,
    pub page_size_param: &'static str,
    pub page_number_param: &'static str,
    /// Top-level key holding the page's items.
    pub items_key: &'static str,
    pub remaining: RemainingFn,
}

impl PaginationConfig {
    /// 🏗️ The common `page[size]` / `page[number]` / `data` shape.
    pub const fn new(page_size: usize, remaining: RemainingFn) -> Self {
        Self {
            page_size,
            page_size_param: "page[size]",
            page_number_param: "page[number]",
            items_key: "data",
            remaining,
        }
    }
}

/// 📊 `remaining` for envelopes carrying `meta.page.total_count`.
/// No count metadata reads as zero, so the driver stops after the first page.
pub fn remaining_from_total_count(
    _page_index: usize,
    response: &Value,
    page_size: usize,
    page_number: usize,
) -> usize {
    let total = response
        .pointer("/meta/page/total_count")
        .and_then(Value::as_u64)
        .unwrap_or(0) as usize;
    total.saturating_sub(page_size * (page_number + 1))
}

/// 🔄 Fetch every page of `path` and return the items in order.
pub async fn paginate(
    client: &dyn ApiClient,
    path: &str,
    config: &PaginationConfig,
) -> Result<Vec<Value>, ClientError> {
    let mut collected = Vec::new();
    let mut page_index = 0;
    let mut page_number = 0;

    loop {
        let params = [
            (config.page_size_param.to_string(), config.page_size.to_string()),
            (config.page_number_param.to_string(), page_number.to_string()),
        ];
        let response = client.get_with_params(path, &params).await?;

        let items = match response.get(config.items_key) {
            Some(Value::Array(items)) => items.clone(),
            _ => Vec::new(),
        };
        let page_was_empty = items.is_empty();
        collected.extend(items);

        let remaining = (config.remaining)(page_index, &response, config.page_size, page_number);
        trace!(
            "📄 {} page {} done, {} collected, {} remaining",
            path,
            page_number,
            collected.len(),
            remaining
        );
        if remaining == 0 || page_was_empty {
            break;
        }
        page_index += 1;
        page_number += 1;
    }

    Ok(collected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::HttpMethod;
    use crate::client::in_mem::InMemoryClient;
    use serde_json::json;

    const PATH: &str = "/api/v2/services/definitions";

    fn page(ids: std::ops::Range<usize>, total: usize) -> Value {
        json!({
            "data": ids.map(|i| json!({"id": i})).collect::<Vec<_>>(),
            "meta": {"page": {"total_count": total}}
        })
    }

    #[test]
    fn the_one_where_250_items_take_exactly_three_pages() {
        let resp = json!({"meta": {"page": {"total_count": 250}}});
        assert_eq!(remaining_from_total_count(0, &resp, 100, 0), 150);
        assert_eq!(remaining_from_total_count(1, &resp, 100, 1), 50);
        assert_eq!(remaining_from_total_count(2, &resp, 100, 2), 0);
        assert_eq!(remaining_from_total_count(0, &json!({"data": []}), 100, 0), 0);
    }

    #[tokio::test]
    async fn the_one_where_the_driver_walks_all_the_pages() {
        let client = InMemoryClient::new();
        client
            .respond(HttpMethod::Get, PATH, page(0..100, 250))
            .respond(HttpMethod::Get, PATH, page(100..200, 250))
            .respond(HttpMethod::Get, PATH, page(200..250, 250));

        let config = PaginationConfig::new(100, remaining_from_total_count);
        let items = paginate(&client, PATH, &config).await.expect("pages");

        assert_eq!(items.len(), 250);
        assert_eq!(items[249]["id"], 249);
        let calls = client.calls();
        assert_eq!(calls.len(), 3);
        assert_eq!(
            calls[2].params,
            vec![
                ("page[size]".to_string(), "100".to_string()),
                ("page[number]".to_string(), "2".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn the_one_where_no_metadata_means_one_page_and_done() {
        let client = InMemoryClient::new();
        client.respond(HttpMethod::Get, PATH, json!({"data": [{"id": 1}]}));

        let config = PaginationConfig::new(100, remaining_from_total_count);
        let items = paginate(&client, PATH, &config).await.expect("one page");

        assert_eq!(items.len(), 1);
        assert_eq!(client.count(HttpMethod::Get), 1);
    }

    #[tokio::test]
    async fn the_one_where_an_empty_page_ends_a_lying_count() {
        let client = InMemoryClient::new();
        client.respond(HttpMethod::Get, PATH, json!({"data": [], "meta": {"page": {"total_count": 9000}}}));

        let config = PaginationConfig::new(100, remaining_from_total_count);
        let items = paginate(&client, PATH, &config).await.expect("empty");

        assert!(items.is_empty());
        assert_eq!(client.count(HttpMethod::Get), 1);
    }
}
