mod clickhouse;

pub use clickhouse::ClickHouseStore;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::error::ApiError;

/// Maximum rows returned to a caller from any single execution.
pub const ROW_CAP: usize = 20;

/// One result row keyed by column name. Values are restricted to the canonical
/// model: string, integer, float, boolean, ISO-8601 date string, array of
/// string, or null. Driver-native temporal and array types never cross this
/// boundary.
pub type NormalizedRow = serde_json::Map<String, Value>;

#[derive(Debug, Clone, Serialize)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<NormalizedRow>,
    pub truncated: bool,
}

impl QueryResult {
    pub fn empty() -> Self {
        Self { columns: Vec::new(), rows: Vec::new(), truncated: false }
    }

    /// Apply the row cap, recording whether anything was dropped.
    pub fn capped(columns: Vec<String>, mut rows: Vec<NormalizedRow>) -> Self {
        let truncated = rows.len() > ROW_CAP;
        rows.truncate(ROW_CAP);
        Self { columns, rows, truncated }
    }
}

/// Read-only access to the encounters store. All permitted statements are
/// SELECTs, so a failed execution never leaves partial state behind.
#[async_trait]
pub trait EncounterStore: Send + Sync {
    async fn execute(&self, sql: &str) -> Result<QueryResult, ApiError>;

    /// Execute with server-side bound parameters (`{name:Type}` placeholders).
    /// Binding, not interpolation: caller-supplied values never touch the
    /// query text.
    async fn execute_bound(
        &self,
        sql: &str,
        params: &[(&str, &str)],
    ) -> Result<QueryResult, ApiError>;

    /// First cell of the first row as an unsigned integer, for COUNT-style
    /// aggregates. Zero when the result is empty.
    async fn scalar_u64(&self, sql: &str) -> Result<u64, ApiError> {
        let result = self.execute(sql).await?;
        let value = result
            .rows
            .first()
            .and_then(|row| result.columns.first().and_then(|c| row.get(c)))
            .and_then(|v| v.as_u64())
            .unwrap_or(0);
        Ok(value)
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    fn row(n: u64) -> NormalizedRow {
        let mut m = NormalizedRow::new();
        m.insert("n".to_string(), Value::from(n));
        m
    }

    #[test]
    fn capped_truncates_and_flags() {
        let rows: Vec<NormalizedRow> = (0..25).map(row).collect();
        let result = QueryResult::capped(vec!["n".to_string()], rows);
        assert!(result.truncated);
        assert_eq!(result.rows.len(), ROW_CAP);
    }

    #[test]
    fn capped_leaves_small_results_alone() {
        let rows: Vec<NormalizedRow> = (0..3).map(row).collect();
        let result = QueryResult::capped(vec!["n".to_string()], rows);
        assert!(!result.truncated);
        assert_eq!(result.rows.len(), 3);
    }

    #[tokio::test]
    async fn scalar_u64_reads_first_cell() {
        let store = testing::MockStore::with_responses(vec![Ok(testing::MockStore::single_row(
            &["count"],
            vec![Value::from(42u64)],
        ))]);
        assert_eq!(store.scalar_u64("SELECT count()").await.unwrap(), 42);
    }

    #[tokio::test]
    async fn scalar_u64_defaults_to_zero_on_empty() {
        let store = testing::MockStore::with_responses(vec![Ok(QueryResult::empty())]);
        assert_eq!(store.scalar_u64("SELECT count()").await.unwrap(), 0);
    }
}
