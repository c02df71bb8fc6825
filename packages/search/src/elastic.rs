//! Elasticsearch over HTTP.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use serde::Deserialize;
use serde_json::{Value, json};

use crate::{BulkBuffer, SearchClient, SearchError};

/// Connection settings.
#[derive(Debug, Clone)]
pub struct ElasticConfig {
    /// Base URLs, used round-robin.
    pub urls: Vec<String>,
    /// Alias that clients query; indices are named `<index>-<unix secs>`.
    pub index: String,
    /// Index creation body (settings and mappings). Falls back to
    /// [`default_index_body`] when absent.
    pub settings: Option<String>,
}

/// Mapping used when no settings document is configured.
#[must_use]
pub fn default_index_body() -> Value {
    json!({
        "mappings": {
            "properties": {
                "location": { "type": "geo_point" },
                "shape": { "type": "geo_shape" }
            }
        }
    })
}

/// Elasticsearch implementation of [`SearchClient`].
pub struct ElasticClient {
    client: reqwest::Client,
    urls: Vec<String>,
    next: AtomicUsize,
    alias: String,
    settings: Option<String>,
    created: Mutex<Option<String>>,
}

impl ElasticClient {
    /// Creates a client. Trailing slashes on the URLs are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::NoUrls`] if `config.urls` is empty.
    pub fn new(config: ElasticConfig) -> Result<Self, SearchError> {
        let urls: Vec<String> = config
            .urls
            .iter()
            .map(|url| url.trim().trim_end_matches('/').to_string())
            .filter(|url| !url.is_empty())
            .collect();

        if urls.is_empty() {
            return Err(SearchError::NoUrls);
        }

        Ok(Self {
            client: reqwest::Client::new(),
            urls,
            next: AtomicUsize::new(0),
            alias: config.index,
            settings: config.settings,
            created: Mutex::new(None),
        })
    }

    /// The index created by the last [`SearchClient::update_index`] call.
    #[must_use]
    pub fn created_index(&self) -> Option<String> {
        self.created
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn url(&self, path: &str) -> String {
        let i = self.next.fetch_add(1, Ordering::Relaxed) % self.urls.len();
        format!("{}/{path}", self.urls[i])
    }

    fn require_created(&self) -> Result<String, SearchError> {
        self.created_index().ok_or(SearchError::NoIndex)
    }

    /// Indices currently carrying the alias. A missing alias is not an
    /// error.
    async fn aliased_indices(&self) -> Result<Vec<String>, SearchError> {
        let url = self.url(&format!("_alias/{}", self.alias));
        let response = self.client.get(&url).send().await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(vec![]);
        }

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(SearchError::Status {
                url,
                status: status.as_u16(),
                body,
            });
        }

        let aliases: BTreeMap<String, Value> = serde_json::from_str(&body)?;
        Ok(aliases.into_keys().collect())
    }
}

#[async_trait::async_trait]
impl SearchClient for ElasticClient {
    async fn update_index(&self) -> Result<String, SearchError> {
        let name = index_name(&self.alias, chrono::Utc::now().timestamp());
        log::info!("Creating index {name}");

        let body = match &self.settings {
            Some(settings) => settings.clone(),
            None => default_index_body().to_string(),
        };

        let url = self.url(&name);
        let request = self
            .client
            .put(&url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body);
        send(url, request).await?;

        let previous = self.aliased_indices().await?;
        log::info!(
            "Pointing alias {} at {name} (was: {})",
            self.alias,
            if previous.is_empty() {
                "none".to_string()
            } else {
                previous.join(", ")
            }
        );

        let url = self.url("_aliases");
        let request = self
            .client
            .post(&url)
            .json(&alias_actions(&self.alias, &name, &previous));
        send(url, request).await?;

        *self.created.lock().unwrap_or_else(PoisonError::into_inner) = Some(name.clone());

        Ok(name)
    }

    async fn bulk_write(&self, buffer: &BulkBuffer) -> Result<(), SearchError> {
        let index = self.require_created()?;

        if buffer.is_empty() {
            return Ok(());
        }

        log::debug!(
            "Bulk writing {} {} record(s) to {index}",
            buffer.records(),
            buffer.source()
        );

        let url = self.url(&format!("{index}/_bulk"));
        let request = self
            .client
            .post(&url)
            .header(reqwest::header::CONTENT_TYPE, "application/x-ndjson")
            .body(buffer.body().to_vec());
        let body = send(url, request).await?;

        check_bulk_response(buffer.source(), &body)
    }

    async fn delete_stale_indices(&self) -> Result<Vec<String>, SearchError> {
        let created = self.require_created()?;

        let url = self.url(&format!("_cat/indices/{}-*?format=json&h=index", self.alias));
        let request = self.client.get(&url);
        let body = send(url, request).await?;
        let listed: Vec<CatIndex> = serde_json::from_str(&body)?;

        let stale = stale_indices(&self.alias, &created, listed);
        if stale.is_empty() {
            log::info!("No stale indices to delete");
            return Ok(stale);
        }

        log::info!("Deleting stale indices: {}", stale.join(", "));
        let url = self.url(&stale.join(","));
        let request = self.client.delete(&url);
        send(url, request).await?;

        Ok(stale)
    }
}

/// Sends a request and returns the body of a successful response.
async fn send(url: String, request: reqwest::RequestBuilder) -> Result<String, SearchError> {
    let response = request.send().await?;
    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        return Err(SearchError::Status {
            url,
            status: status.as_u16(),
            body,
        });
    }

    Ok(body)
}

#[derive(Debug, Deserialize)]
struct CatIndex {
    index: String,
}

#[derive(Debug, Deserialize)]
struct BulkResponse {
    #[serde(default)]
    errors: bool,
    #[serde(default)]
    items: Vec<BTreeMap<String, BulkItem>>,
}

#[derive(Debug, Deserialize)]
struct BulkItem {
    #[serde(default)]
    error: Option<Value>,
}

fn index_name(alias: &str, timestamp: i64) -> String {
    format!("{alias}-{timestamp}")
}

fn alias_actions(alias: &str, created: &str, previous: &[String]) -> Value {
    let mut actions: Vec<Value> = previous
        .iter()
        .filter(|index| index.as_str() != created)
        .map(|index| json!({ "remove": { "index": index, "alias": alias } }))
        .collect();
    actions.push(json!({ "add": { "index": created, "alias": alias } }));
    json!({ "actions": actions })
}

fn stale_indices(alias: &str, created: &str, listed: Vec<CatIndex>) -> Vec<String> {
    let prefix = format!("{alias}-");
    let mut stale: Vec<String> = listed
        .into_iter()
        .map(|cat| cat.index)
        .filter(|index| index.starts_with(&prefix) && index != created)
        .collect();
    stale.sort();
    stale
}

fn check_bulk_response(source: &str, body: &str) -> Result<(), SearchError> {
    let response: BulkResponse = serde_json::from_str(body)?;
    if !response.errors {
        return Ok(());
    }

    let errors: Vec<&Value> = response
        .items
        .iter()
        .flat_map(BTreeMap::values)
        .filter_map(|item| item.error.as_ref())
        .collect();

    let reason = errors
        .first()
        .map(|error| {
            error
                .get("reason")
                .and_then(Value::as_str)
                .map_or_else(|| error.to_string(), ToString::to_string)
        })
        .unwrap_or_else(|| "unknown".to_string());

    Err(SearchError::Bulk {
        source_name: source.to_string(),
        failed: errors.len(),
        reason,
    })
}
