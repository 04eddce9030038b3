use tracing::warn;

use crate::core::llm::{ChatMessage, LlmClient};
use crate::core::store::QueryResult;
use crate::error::ApiError;

/// Rows included in the narration prompt. Keeps prompt size bounded; the full
/// result still goes back to the caller.
const NARRATION_SAMPLE_ROWS: usize = 5;

pub async fn narrate(
    question: &str,
    result: &QueryResult,
    llm: &dyn LlmClient,
) -> Result<String, ApiError> {
    let sample: Vec<_> = result.rows.iter().take(NARRATION_SAMPLE_ROWS).collect();
    let sample_json = serde_json::to_string(&sample).unwrap_or_else(|_| "[]".to_string());

    let messages = [
        ChatMessage::system(
            "You are a clinical AI assistant. Summarize patient query results \
             in 2-3 sentences with actionable insights.",
        ),
        ChatMessage::user(format!(
            "Query: {}\n\nResults: {} records found.\nData: {}\n\nProvide a brief clinical summary.",
            question,
            result.rows.len(),
            sample_json,
        )),
    ];

    llm.generate(&messages, false).await
}

/// Narrate, degrading to a templated sentence when generation is down. The
/// narrative must never block returning the underlying data.
pub async fn narrate_or_default(
    question: &str,
    result: &QueryResult,
    llm: &dyn LlmClient,
) -> String {
    match narrate(question, result, llm).await {
        Ok(text) => text,
        Err(e) => {
            warn!("Narration degraded to template: {}", e);
            format!("{} records found matching the query.", result.rows.len())
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::Value;

    use super::*;
    use crate::core::llm::testing::MockLlm;
    use crate::core::store::testing::MockStore;

    #[tokio::test]
    async fn narration_prompt_samples_at_most_five_rows() {
        let mut result = MockStore::single_row(&["patient_id"], vec![Value::from("P1")]);
        let row = result.rows[0].clone();
        for _ in 0..9 {
            result.rows.push(row.clone());
        }

        let llm = MockLlm::replies(vec!["Ten patients match; review A1c scheduling."]);
        let text = narrate("overdue diabetics", &result, &llm).await.unwrap();
        assert!(text.contains("review A1c"));

        let prompts = llm.prompts.lock().unwrap();
        let user = &prompts[0][1].content;
        assert!(user.contains("Results: 10 records found."));
        // Five sampled rows serialize as five objects.
        assert_eq!(user.matches("patient_id").count(), 5);
    }

    #[tokio::test]
    async fn outage_degrades_to_template_with_count() {
        let result = MockStore::single_row(&["patient_id"], vec![Value::from("P1")]);
        let llm = MockLlm::unavailable();
        let text = narrate_or_default("anything", &result, &llm).await;
        assert_eq!(text, "1 records found matching the query.");
    }
}
