use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use crate::core::store::{EncounterStore, QueryResult};

const VOLUME_SQL: &str = "SELECT toStartOfWeek(encounter_date) AS week, COUNT(*) AS encounters, \
     COUNT(DISTINCT CASE WHEN encounter_type = 'Inpatient' THEN patient_id END) AS admissions \
     FROM encounters WHERE encounter_date >= now() - INTERVAL 8 WEEK \
     GROUP BY week ORDER BY week";

const CONDITIONS_SQL: &str =
    "SELECT arrayJoin(conditions) AS condition, COUNT(DISTINCT patient_id) AS count \
     FROM encounters GROUP BY condition ORDER BY count DESC LIMIT 5";

const TYPES_SQL: &str =
    "SELECT encounter_type, COUNT(*) AS count FROM encounters GROUP BY encounter_type";

const COMPLAINTS_SQL: &str = "SELECT chief_complaint, COUNT(*) AS count FROM encounters \
     WHERE chief_complaint != '' GROUP BY chief_complaint ORDER BY count DESC LIMIT 10";

const TOTAL_SQL: &str = "SELECT COUNT(DISTINCT patient_id) FROM encounters";

#[derive(Debug, Serialize)]
pub struct VolumePoint {
    pub date: String,
    pub encounters: u64,
    pub admissions: u64,
}

#[derive(Debug, Serialize)]
pub struct ConditionCount {
    pub condition: String,
    pub count: u64,
    pub change: i64,
}

#[derive(Debug, Serialize)]
pub struct TypeCount {
    pub name: String,
    pub value: u64,
}

#[derive(Debug, Serialize)]
pub struct ComplaintCount {
    pub complaint: String,
    pub count: u64,
}

#[derive(Debug, Serialize)]
pub struct AnalyticsReport {
    #[serde(rename = "totalPatients")]
    pub total_patients: u64,
    #[serde(rename = "volumeData")]
    pub volume_data: Vec<VolumePoint>,
    #[serde(rename = "conditionsData")]
    pub conditions_data: Vec<ConditionCount>,
    #[serde(rename = "encounterTypesData")]
    pub encounter_types_data: Vec<TypeCount>,
    #[serde(rename = "complaintsData")]
    pub complaints_data: Vec<ComplaintCount>,
}

impl AnalyticsReport {
    /// The zeroed dashboard shape for degraded mode.
    pub fn empty() -> Self {
        Self {
            total_patients: 0,
            volume_data: Vec::new(),
            conditions_data: Vec::new(),
            encounter_types_data: Vec::new(),
            complaints_data: Vec::new(),
        }
    }
}

fn str_cell(row: &serde_json::Map<String, Value>, column: &str) -> String {
    row.get(column).and_then(Value::as_str).unwrap_or_default().to_string()
}

fn u64_cell(row: &serde_json::Map<String, Value>, column: &str) -> u64 {
    row.get(column).and_then(Value::as_u64).unwrap_or(0)
}

/// Each aggregate degrades independently: a failed query logs and contributes
/// its empty section instead of taking the dashboard down.
async fn rows_or_empty(store: &Arc<dyn EncounterStore>, sql: &str, section: &str) -> QueryResult {
    match store.execute(sql).await {
        Ok(result) => result,
        Err(e) => {
            warn!("Analytics section '{}' failed: {}", section, e);
            QueryResult::empty()
        }
    }
}

pub async fn analytics_report(store: Option<&Arc<dyn EncounterStore>>) -> AnalyticsReport {
    let Some(store) = store else {
        return AnalyticsReport::empty();
    };

    let total_patients = store.scalar_u64(TOTAL_SQL).await.unwrap_or_else(|e| {
        warn!("Analytics total-patients query failed: {}", e);
        0
    });

    let volume = rows_or_empty(store, VOLUME_SQL, "volume").await;
    let conditions = rows_or_empty(store, CONDITIONS_SQL, "conditions").await;
    let types = rows_or_empty(store, TYPES_SQL, "encounter_types").await;
    let complaints = rows_or_empty(store, COMPLAINTS_SQL, "complaints").await;

    AnalyticsReport {
        total_patients,
        volume_data: volume
            .rows
            .iter()
            .enumerate()
            .map(|(i, row)| VolumePoint {
                date: format!("Week {}", i + 1),
                encounters: u64_cell(row, "encounters"),
                admissions: u64_cell(row, "admissions"),
            })
            .collect(),
        conditions_data: conditions
            .rows
            .iter()
            .map(|row| ConditionCount {
                condition: str_cell(row, "condition"),
                count: u64_cell(row, "count"),
                change: 0,
            })
            .collect(),
        encounter_types_data: types
            .rows
            .iter()
            .map(|row| TypeCount {
                name: str_cell(row, "encounter_type"),
                value: u64_cell(row, "count"),
            })
            .collect(),
        complaints_data: complaints
            .rows
            .iter()
            .map(|row| ComplaintCount {
                complaint: str_cell(row, "chief_complaint"),
                count: u64_cell(row, "count"),
            })
            .collect(),
    }
}
