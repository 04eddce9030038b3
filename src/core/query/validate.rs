use regex::Regex;
use tracing::debug;

use crate::core::store::ROW_CAP;
use crate::error::ApiError;

use super::CandidateQuery;

/// Tables a generated query may touch.
const ALLOWED_TABLES: &[&str] = &["encounters"];

/// Statement kinds that must never reach the store.
const BLOCKED_KEYWORDS: &[&str] = &["drop", "delete", "insert", "alter", "truncate", "update"];

/// Static inspection of a candidate query before execution. This is the
/// injection-defense boundary: generated text is never trusted past this
/// function. Returns the executable query string with the row cap applied.
pub fn sanitize(candidate: &CandidateQuery) -> Result<String, ApiError> {
    debug!("Sanitizing {:?} candidate query", candidate.source);
    let sql = strip_code_fence(&candidate.text);
    let sql = sql.trim().trim_end_matches(';').trim().to_string();

    if sql.is_empty() {
        return Err(ApiError::UnsafeQuery("empty query".into()));
    }

    let lowered = sql.to_lowercase();

    if !lowered.starts_with("select") {
        return Err(ApiError::UnsafeQuery("only SELECT statements are allowed".into()));
    }

    // A separator after stripping the trailing one means multiple statements.
    if sql.contains(';') {
        return Err(ApiError::UnsafeQuery("multiple statements are not allowed".into()));
    }

    let keyword_re =
        Regex::new(&format!(r"(?i)\b({})\b", BLOCKED_KEYWORDS.join("|"))).unwrap();
    if let Some(m) = keyword_re.find(&sql) {
        return Err(ApiError::UnsafeQuery(format!(
            "mutating keyword '{}' is not allowed",
            m.as_str()
        )));
    }

    let table_re = Regex::new(r"(?i)\b(?:from|join)\s+([A-Za-z_][A-Za-z0-9_.]*)").unwrap();
    for captures in table_re.captures_iter(&sql) {
        let table = captures[1].trim_end_matches('.').to_lowercase();
        if !ALLOWED_TABLES.contains(&table.as_str()) {
            return Err(ApiError::UnsafeQuery(format!("table '{}' is not allowed", table)));
        }
    }

    Ok(apply_row_cap(&sql))
}

/// Remove one Markdown code-fence wrapper, with or without a language tag.
/// Applying this to already-unwrapped text returns it unchanged.
fn strip_code_fence(text: &str) -> String {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed.to_string();
    };
    let rest = rest.strip_suffix("```").unwrap_or(rest);

    let body = match rest.split_once('\n') {
        // First line is a bare language hint ("sql", "SQL", ...): drop it.
        Some((first, body)) if first.trim().chars().all(|c| c.is_ascii_alphanumeric()) => body,
        _ => rest.strip_prefix("sql").unwrap_or(rest),
    };
    body.trim().to_string()
}

/// Append `LIMIT 20` when the query has none, clamp an explicit larger limit.
fn apply_row_cap(sql: &str) -> String {
    let limit_re = Regex::new(r"(?i)\blimit\s+(\d+)").unwrap();
    match limit_re.captures(sql) {
        Some(captures) => {
            let explicit: usize = captures[1].parse().unwrap_or(ROW_CAP);
            if explicit > ROW_CAP {
                limit_re.replace(sql, format!("LIMIT {ROW_CAP}")).into_owned()
            } else {
                sql.to_string()
            }
        }
        None => format!("{sql} LIMIT {ROW_CAP}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::query::CandidateQuery;

    fn sanitize_text(text: &str) -> Result<String, ApiError> {
        sanitize(&CandidateQuery::generated(text))
    }

    #[test]
    fn plain_select_gets_row_cap_appended() {
        let sql = sanitize_text("SELECT patient_id FROM encounters WHERE age > 60").unwrap();
        assert_eq!(sql, "SELECT patient_id FROM encounters WHERE age > 60 LIMIT 20");
    }

    #[test]
    fn explicit_small_limit_is_preserved() {
        let sql = sanitize_text("SELECT * FROM encounters LIMIT 5").unwrap();
        assert_eq!(sql, "SELECT * FROM encounters LIMIT 5");
    }

    #[test]
    fn oversized_limit_is_clamped() {
        let sql = sanitize_text("SELECT * FROM encounters LIMIT 5000").unwrap();
        assert_eq!(sql, "SELECT * FROM encounters LIMIT 20");
    }

    #[test]
    fn mutating_keywords_reject_in_any_casing() {
        for sql in [
            "DROP TABLE encounters",
            "SELECT * FROM encounters WHERE 1=1; DeLeTe FROM encounters",
            "select * from encounters where Insert = 1",
            "SELECT * FROM encounters UNION ALL SELECT * FROM encounters WHERE TRUNCATE",
        ] {
            let err = sanitize_text(sql).unwrap_err();
            assert!(matches!(err, ApiError::UnsafeQuery(_)), "accepted: {sql}");
        }
    }

    #[test]
    fn keyword_must_match_whole_word() {
        // "updated_at" contains "update" but is not a mutation.
        let sql = "SELECT updated_at FROM encounters";
        // No such column in the real schema, but the validator is static.
        assert!(sanitize_text(sql).is_ok());
    }

    #[test]
    fn non_select_statements_reject() {
        let err = sanitize_text("SHOW TABLES").unwrap_err();
        assert!(matches!(err, ApiError::UnsafeQuery(_)));
    }

    #[test]
    fn interior_statement_separator_rejects() {
        let err = sanitize_text("SELECT 1 FROM encounters; SELECT 2 FROM encounters").unwrap_err();
        assert!(matches!(err, ApiError::UnsafeQuery(_)));
    }

    #[test]
    fn single_trailing_separator_is_tolerated() {
        let sql = sanitize_text("SELECT count() FROM encounters;").unwrap();
        assert_eq!(sql, "SELECT count() FROM encounters LIMIT 20");
    }

    #[test]
    fn unknown_tables_reject() {
        for sql in [
            "SELECT * FROM system.tables",
            "SELECT * FROM patients",
            "SELECT * FROM encounters e JOIN admissions a ON e.patient_id = a.patient_id",
        ] {
            let err = sanitize_text(sql).unwrap_err();
            assert!(matches!(err, ApiError::UnsafeQuery(_)), "accepted: {sql}");
        }
    }

    #[test]
    fn fence_stripping_handles_language_tags() {
        let fenced = "```sql\nSELECT count() FROM encounters\n```";
        let bare = "SELECT count() FROM encounters";
        assert_eq!(sanitize_text(fenced).unwrap(), sanitize_text(bare).unwrap());

        let untagged = "```\nSELECT count() FROM encounters\n```";
        assert_eq!(sanitize_text(untagged).unwrap(), sanitize_text(bare).unwrap());
    }

    #[test]
    fn fence_stripping_is_idempotent() {
        let fenced = "```sql\nSELECT count() FROM encounters\n```";
        let once = strip_code_fence(fenced);
        let twice = strip_code_fence(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn empty_generation_output_rejects() {
        let err = sanitize_text("```sql\n```").unwrap_err();
        assert!(matches!(err, ApiError::UnsafeQuery(_)));
    }
}
