use crate::alignment::transcript::ReferenceTranscript;
use crate::types::Span;

/// Normalized edit-distance score between a reference slice and a hypothesis.
///
/// Implementations must return values in [0, 1], with 0 meaning identical.
pub trait ErrorRateMetric: Send + Sync {
    fn error_rate(&self, reference: &[char], hypothesis: &[char]) -> f64;
}

/// Language-specific cleanup and span post-processing.
pub trait LanguageProfile: Send + Sync {
    fn id(&self) -> &str;

    /// Terminators used as anchors; the last one is appended by the combiner.
    fn ending_punctuations(&self) -> &str;

    fn clean_prediction(&self, text: &str) -> String;

    fn clean_reference(&self, text: &str) -> String;

    /// Adjusts an accepted span. The result must not begin before `floor`.
    fn adjust_span(&self, _transcript: &ReferenceTranscript, span: Span, _floor: usize) -> Span {
        span
    }
}
