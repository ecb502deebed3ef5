//! Boundary to the analytics warehouse.
//!
//! Handlers only see the [`Warehouse`] trait. Production wires in
//! [`bigquery::BigQueryClient`]; tests wire in [`fake::StaticWarehouse`].

pub mod auth;
pub mod bigquery;
pub mod fake;

use crate::query::builder::QueryText;
use async_trait::async_trait;
use std::path::PathBuf;

/// Errors raised while authenticating to or querying the warehouse.
#[derive(Debug, thiserror::Error)]
pub enum WarehouseError {
    #[error("failed to read credentials file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid credentials: {0}")]
    Credentials(String),

    #[error("token exchange failed: {0}")]
    Token(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("BigQuery API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("unexpected BigQuery response: {0}")]
    Decode(String),
}

pub type Result<T> = std::result::Result<T, WarehouseError>;

/// A materialised query result. Cells are kept as the warehouse's string
/// rendering; `None` is SQL NULL.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
}

impl Table {
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

/// Executes queries against the analytics warehouse.
///
/// Each call issues the query exactly once. Failures propagate to the caller
/// unchanged; there is no retry.
#[async_trait]
pub trait Warehouse: Send + Sync {
    /// Plan the query without running it and return the projected bytes
    /// processed. The query cache is bypassed so the figure is not zero for
    /// repeated queries.
    async fn dry_run(&self, query: &QueryText) -> Result<u64>;

    /// Run the query and materialise every result row.
    async fn query(&self, query: &QueryText) -> Result<Table>;
}
