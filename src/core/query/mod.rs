pub mod synth;
pub mod validate;

/// Where a query came from. Generated text is untrusted until it clears the
/// validator; fixed queries are authored in this crate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum QuerySource {
    Generated,
    Fixed,
}

/// A query that has not yet passed validation. Owned by the request that
/// produced it; never persisted or reused.
#[derive(Debug, Clone)]
pub struct CandidateQuery {
    pub text: String,
    pub source: QuerySource,
}

impl CandidateQuery {
    pub fn generated(text: impl Into<String>) -> Self {
        Self { text: text.into(), source: QuerySource::Generated }
    }
}
