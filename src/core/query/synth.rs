use crate::core::llm::{ChatMessage, LlmClient};
use crate::core::schema::TableSpec;
use crate::error::ApiError;

use super::CandidateQuery;

/// Turn a natural-language question into a candidate ClickHouse query.
///
/// The prompt pins the exact table name, the column list, and the dialect
/// rules the generator keeps getting wrong, most importantly array
/// containment: `has(conditions, 'COPD')`, never `'COPD' IN conditions`.
pub async fn synthesize(
    question: &str,
    table: &TableSpec,
    llm: &dyn LlmClient,
) -> Result<CandidateQuery, ApiError> {
    let question = question.trim();
    if question.is_empty() {
        return Err(ApiError::Validation("question must not be empty".into()));
    }

    let system = format!(
        "You are a SQL query generator for a ClickHouse database with a {table} table.\n\
         \n\
         Table schema (table name: {table}):\n\
         {columns}\n\
         \n\
         IMPORTANT: Always use the table name '{table}' in your queries.\n\
         \n\
         CRITICAL ClickHouse syntax rules:\n\
         - To check if an array contains a value, use has(array_column, 'value') \
         NOT 'value' IN array_column\n\
         - Example: has(conditions, 'COPD') NOT 'COPD' IN conditions\n\
         \n\
         Generate a valid ClickHouse SQL query based on the user's question. \
         Return ONLY the SQL query, no explanation.",
        table = table.name,
        columns = table.prompt_lines(),
    );

    let messages = [ChatMessage::system(system), ChatMessage::user(question)];
    let text = llm.generate(&messages, false).await?;

    Ok(CandidateQuery::generated(text.trim()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::llm::testing::MockLlm;

    #[tokio::test]
    async fn empty_question_is_rejected_before_generation() {
        let llm = MockLlm::replies(vec!["SELECT 1"]);
        let err = synthesize("   ", &TableSpec::encounters(), &llm).await.unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
        assert!(llm.prompts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn prompt_carries_schema_and_containment_rule() {
        let llm = MockLlm::replies(vec![
            "SELECT patient_id FROM encounters WHERE age > 60 AND has(conditions, 'Type 2 Diabetes')",
        ]);
        let candidate = synthesize("patients over 60 with diabetes", &TableSpec::encounters(), &llm)
            .await
            .unwrap();

        assert!(candidate.text.contains("has(conditions,"));
        assert!(!candidate.text.contains(" IN conditions"));

        let prompts = llm.prompts.lock().unwrap();
        let system = &prompts[0][0].content;
        assert!(system.contains("table name: encounters"));
        assert!(system.contains("- conditions (Array(String))"));
        assert!(system.contains("has(array_column, 'value')"));
    }

    #[tokio::test]
    async fn generation_outage_propagates() {
        let llm = MockLlm::unavailable();
        let err = synthesize("anything", &TableSpec::encounters(), &llm).await.unwrap_err();
        assert!(matches!(err, ApiError::GenerationUnavailable(_)));
    }
}
