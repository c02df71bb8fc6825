#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Search-engine client used by the export pipeline.
//!
//! An import never writes into the live index. [`SearchClient::update_index`]
//! creates a fresh timestamped index and moves the public alias onto it,
//! every [`SearchClient::bulk_write`] then targets that new index, and
//! [`SearchClient::delete_stale_indices`] drops the indices left behind by
//! earlier imports.

pub mod bulk;
pub mod elastic;

pub use bulk::BulkBuffer;
pub use elastic::{ElasticClient, ElasticConfig};

use thiserror::Error;

/// Errors from the search engine.
#[derive(Debug, Error)]
pub enum SearchError {
    /// HTTP transport failure.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success HTTP status.
    #[error("HTTP {status} for {url}: {body}")]
    Status {
        /// Request URL.
        url: String,
        /// HTTP status code.
        status: u16,
        /// Response body, for diagnostics.
        body: String,
    },

    /// The bulk request was accepted but some items were rejected.
    #[error("Bulk write from {source_name} rejected {failed} item(s): {reason}")]
    Bulk {
        /// Producer of the rejected buffer.
        source_name: String,
        /// Number of rejected items.
        failed: usize,
        /// First rejection reason reported by the engine.
        reason: String,
    },

    /// A bulk write or cleanup was attempted before an index was created.
    #[error("No index has been created yet")]
    NoIndex,

    /// The client was configured without any base URL.
    #[error("No search engine URLs configured")]
    NoUrls,

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Index lifecycle and bulk ingestion.
#[async_trait::async_trait]
pub trait SearchClient: Send + Sync {
    /// Creates a new timestamped index and points the alias at it.
    /// Returns the created index name.
    ///
    /// # Errors
    ///
    /// Returns an error if index creation or the alias update fails.
    async fn update_index(&self) -> Result<String, SearchError>;

    /// Writes one bulk buffer into the index created by
    /// [`Self::update_index`].
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or any item is rejected.
    async fn bulk_write(&self, buffer: &BulkBuffer) -> Result<(), SearchError>;

    /// Deletes every index of this alias family except the created one.
    /// Returns the deleted names.
    ///
    /// # Errors
    ///
    /// Returns an error if listing or deleting fails.
    async fn delete_stale_indices(&self) -> Result<Vec<String>, SearchError>;
}
