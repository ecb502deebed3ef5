use crate::query::builder::QueryText;
use crate::warehouse::{Result, Table, Warehouse, WarehouseError};
use async_trait::async_trait;
use parking_lot::Mutex;

/// How a query reached the warehouse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    DryRun,
    Query,
}

/// In-process warehouse returning fixed responses.
///
/// Records every query it receives so callers can assert on exactly what
/// would have been sent upstream.
pub struct StaticWarehouse {
    bytes_processed: u64,
    table: Table,
    failure: Option<String>,
    calls: Mutex<Vec<(CallKind, QueryText)>>,
}

impl StaticWarehouse {
    pub fn new(bytes_processed: u64, table: Table) -> Self {
        Self {
            bytes_processed,
            table,
            failure: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// A warehouse whose every call fails with an API error.
    pub fn failing(message: &str) -> Self {
        Self {
            failure: Some(message.to_string()),
            ..Self::new(0, Table::default())
        }
    }

    /// Queries received so far, oldest first.
    pub fn calls(&self) -> Vec<(CallKind, QueryText)> {
        self.calls.lock().clone()
    }

    fn record(&self, kind: CallKind, query: &QueryText) -> Result<()> {
        self.calls.lock().push((kind, query.clone()));
        match &self.failure {
            Some(message) => Err(WarehouseError::Api {
                status: 500,
                message: message.clone(),
            }),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl Warehouse for StaticWarehouse {
    async fn dry_run(&self, query: &QueryText) -> Result<u64> {
        self.record(CallKind::DryRun, query)?;
        Ok(self.bytes_processed)
    }

    async fn query(&self, query: &QueryText) -> Result<Table> {
        self.record(CallKind::Query, query)?;
        Ok(self.table.clone())
    }
}
