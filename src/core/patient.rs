use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use crate::core::llm::{ChatMessage, LlmClient};
use crate::core::store::{EncounterStore, NormalizedRow};

/// Encounter history lookup. The id is bound server-side ({pid:String}), never
/// spliced into the query text.
const HISTORY_SQL: &str =
    "SELECT * FROM encounters WHERE patient_id = {pid:String} ORDER BY encounter_date DESC";

#[derive(Debug, Serialize)]
pub struct PatientProfile {
    pub id: String,
    pub name: String,
    pub age: i64,
    pub mrn: String,
    pub gender: String,
    pub dob: String,
    pub phone: String,
    pub email: String,
    pub address: String,
    #[serde(rename = "primaryCare")]
    pub primary_care: String,
    #[serde(rename = "riskScore")]
    pub risk_score: i64,
    pub conditions: Value,
    pub allergies: Vec<String>,
    #[serde(rename = "careGaps")]
    pub care_gaps: Value,
    pub timeline: Value,
    #[serde(rename = "aiSummary")]
    pub ai_summary: String,
}

/// Demographics assembled from the store (or the documented fallback literal),
/// serialized into the profile-generation prompt.
#[derive(Debug, Serialize)]
struct Demographics {
    id: String,
    age: i64,
    conditions: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_a1c_date: Option<Value>,
    all_encounters: Vec<NormalizedRow>,
}

impl Demographics {
    fn fallback(patient_id: &str) -> Self {
        Self {
            id: patient_id.to_string(),
            age: 67,
            conditions: serde_json::json!(["Type 2 Diabetes", "Hypertension"]),
            last_a1c_date: None,
            all_encounters: Vec::new(),
        }
    }

    fn from_history(patient_id: &str, rows: Vec<NormalizedRow>) -> Self {
        let latest = rows.first().cloned().unwrap_or_default();
        Self {
            id: patient_id.to_string(),
            age: latest.get("age").and_then(Value::as_i64).unwrap_or(67),
            conditions: latest.get("conditions").cloned().unwrap_or(Value::Array(Vec::new())),
            last_a1c_date: latest.get("last_a1c_date").cloned(),
            all_encounters: rows,
        }
    }
}

fn derive_mrn(patient_id: &str) -> String {
    match patient_id.strip_prefix('P') {
        Some(rest) if !rest.is_empty() => format!("MRN-{}56", rest),
        _ => format!("MRN-{}", patient_id),
    }
}

/// Build the full profile for one patient. Every external dependency has an
/// explicit fallback branch: store miss or outage uses the documented
/// demographic literal, generation outage uses deterministic defaults.
pub async fn patient_profile(
    patient_id: &str,
    store: Option<&Arc<dyn EncounterStore>>,
    llm: &dyn LlmClient,
) -> PatientProfile {
    let demographics = match store {
        Some(store) => match store.execute_bound(HISTORY_SQL, &[("pid", patient_id)]).await {
            Ok(result) if !result.rows.is_empty() => {
                Demographics::from_history(patient_id, result.rows)
            }
            Ok(_) => Demographics::fallback(patient_id),
            Err(e) => {
                warn!("Patient history lookup failed for {}: {}", patient_id, e);
                Demographics::fallback(patient_id)
            }
        },
        None => Demographics::fallback(patient_id),
    };

    let demographics_json =
        serde_json::to_string(&demographics).unwrap_or_else(|_| "{}".to_string());
    let messages = [
        ChatMessage::system(
            "Generate a patient profile. Return JSON with: name, gender, dob, \
             riskScore (0-100), careGaps array, timeline array, aiSummary.",
        ),
        ChatMessage::user(format!("Generate patient profile for: {demographics_json}")),
    ];

    let generated: Value = match llm.generate(&messages, true).await {
        Ok(text) => serde_json::from_str(&text).unwrap_or_else(|e| {
            warn!("Profile generation returned non-JSON for {}: {}", patient_id, e);
            Value::Null
        }),
        Err(e) => {
            warn!("Profile generation degraded for {}: {}", patient_id, e);
            Value::Null
        }
    };

    let name = generated
        .get("name")
        .and_then(Value::as_str)
        .unwrap_or("Unknown Patient")
        .to_string();
    let email = format!("{}@email.com", name.to_lowercase().replace(' ', "."));

    PatientProfile {
        id: demographics.id.clone(),
        mrn: derive_mrn(patient_id),
        age: demographics.age,
        gender: generated
            .get("gender")
            .and_then(Value::as_str)
            .unwrap_or("Unknown")
            .to_string(),
        dob: generated.get("dob").and_then(Value::as_str).unwrap_or("Unknown").to_string(),
        phone: "(555) 123-4567".to_string(),
        email,
        address: "123 Main St, New York, NY 10001".to_string(),
        primary_care: "Dr. James Wilson".to_string(),
        risk_score: generated.get("riskScore").and_then(Value::as_i64).unwrap_or(50),
        conditions: demographics.conditions.clone(),
        allergies: vec!["Penicillin".to_string()],
        care_gaps: generated.get("careGaps").cloned().unwrap_or(Value::Array(Vec::new())),
        timeline: generated.get("timeline").cloned().unwrap_or(Value::Array(Vec::new())),
        ai_summary: generated
            .get("aiSummary")
            .and_then(Value::as_str)
            .unwrap_or("Patient data under review.")
            .to_string(),
        name,
    }
}
