use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::config::StoreConfig;
use crate::error::ApiError;

use super::{EncounterStore, NormalizedRow, QueryResult};

const STORE_TIMEOUT: Duration = Duration::from_secs(10);

/// ClickHouse executor over the HTTP interface. Queries are POSTed with
/// `JSONCompact` output so column metadata comes back alongside the rows.
pub struct ClickHouseStore {
    client: Client,
    base_url: String,
    database: String,
    user: String,
    password: String,
}

#[derive(Deserialize)]
struct CompactResponse {
    meta: Vec<CompactColumn>,
    data: Vec<Vec<Value>>,
}

#[derive(Deserialize)]
struct CompactColumn {
    name: String,
    #[serde(rename = "type")]
    kind: String,
}

impl ClickHouseStore {
    pub fn new(config: &StoreConfig) -> Self {
        let client = Client::builder()
            .timeout(STORE_TIMEOUT)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            base_url: config.http_url(),
            database: config.database.clone(),
            user: config.user.clone(),
            password: config.password.clone(),
        }
    }

    async fn run(&self, sql: &str, params: &[(&str, &str)]) -> Result<QueryResult, ApiError> {
        let mut query: Vec<(String, String)> = vec![
            ("database".to_string(), self.database.clone()),
            ("default_format".to_string(), "JSONCompact".to_string()),
        ];
        for (name, value) in params {
            query.push((format!("param_{}", name), value.to_string()));
        }

        debug!("Executing against ClickHouse: {}", sql);
        let res = self
            .client
            .post(&self.base_url)
            .query(&query)
            .header("X-ClickHouse-User", &self.user)
            .header("X-ClickHouse-Key", &self.password)
            .body(sql.to_string())
            .send()
            .await
            .map_err(|e| ApiError::Execution(e.to_string()))?;

        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(ApiError::Execution(format!("{}: {}", status, body.trim())));
        }

        let body = res
            .text()
            .await
            .map_err(|e| ApiError::Execution(e.to_string()))?;
        parse_compact_response(&body)
    }
}

#[async_trait]
impl EncounterStore for ClickHouseStore {
    async fn execute(&self, sql: &str) -> Result<QueryResult, ApiError> {
        self.run(sql, &[]).await
    }

    async fn execute_bound(
        &self,
        sql: &str,
        params: &[(&str, &str)],
    ) -> Result<QueryResult, ApiError> {
        self.run(sql, params).await
    }
}

/// Decode a `JSONCompact` body into the canonical value model.
fn parse_compact_response(body: &str) -> Result<QueryResult, ApiError> {
    let parsed: CompactResponse =
        serde_json::from_str(body).map_err(|e| ApiError::Execution(format!("bad response: {e}")))?;

    let columns: Vec<String> = parsed.meta.iter().map(|c| c.name.clone()).collect();
    let rows = parsed
        .data
        .into_iter()
        .map(|raw| {
            let mut row = NormalizedRow::new();
            for (i, col) in parsed.meta.iter().enumerate() {
                let value = raw.get(i).cloned().unwrap_or(Value::Null);
                row.insert(col.name.clone(), normalize_value(value, &col.kind));
            }
            row
        })
        .collect();

    Ok(QueryResult::capped(columns, rows))
}

/// Map one driver value to the canonical model, guided by the declared column
/// type. Unrecognized types fall back to their string representation.
fn normalize_value(value: Value, ch_type: &str) -> Value {
    if value.is_null() {
        return Value::Null;
    }

    let inner = strip_wrappers(ch_type);

    if inner.starts_with("Int") || inner.starts_with("UInt") {
        // 64-bit integers arrive quoted by default; narrower ones as numbers.
        return match value {
            Value::String(s) => s
                .parse::<i64>()
                .map(Value::from)
                .or_else(|_| s.parse::<u64>().map(Value::from))
                .unwrap_or(Value::String(s)),
            other => other,
        };
    }

    if inner.starts_with("Float") {
        return match value {
            Value::String(s) => s.parse::<f64>().map(Value::from).unwrap_or(Value::String(s)),
            other => other,
        };
    }

    if inner.starts_with("DateTime") {
        // "2025-10-04 10:30:00" -> ISO-8601
        if let Value::String(s) = value {
            return Value::String(s.replacen(' ', "T", 1));
        }
        return value;
    }

    if inner == "Date" || inner == "Date32" || inner == "String" || inner.starts_with("FixedString")
    {
        return value;
    }

    if inner.starts_with("Array(") {
        if let Value::Array(items) = value {
            return Value::Array(
                items
                    .into_iter()
                    .map(|item| match item {
                        Value::String(s) => Value::String(s),
                        other => Value::String(other.to_string()),
                    })
                    .collect(),
            );
        }
        return value;
    }

    if inner == "Bool" {
        return value;
    }

    match value {
        Value::String(s) => Value::String(s),
        other if other.is_number() => other,
        other => Value::String(other.to_string()),
    }
}

fn strip_wrappers(ch_type: &str) -> &str {
    let mut t = ch_type;
    for wrapper in ["Nullable(", "LowCardinality("] {
        if let Some(rest) = t.strip_prefix(wrapper) {
            t = rest.strip_suffix(')').unwrap_or(rest);
        }
    }
    t
}
