use crate::classify::result::AnalysisResult;
use crate::schedule::Verdict;

/// Turns a captured payload into a scored verdict.
///
/// Implementations must treat the payload as read-only and must not retain it
/// past the call. Failures (undecodable payloads included) are reported in the
/// returned result, never by panicking.
pub trait MarkerClassifier {
    /// Classifier identifier, for logs and reports.
    fn name(&self) -> &'static str;

    fn classify(&self, payload: &[u8], expected: Verdict) -> AnalysisResult;
}
