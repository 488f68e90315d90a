use crate::error::SubmissionError;
use crate::inference::result::{DetectRequest, InferenceResult};

/// Transport to the remote disease-detection endpoint.
///
/// Implementations perform exactly one attempt per call. Retrying is deliberately absent: the
/// next sampler tick supersedes a lost sample.
pub trait InferenceTransport: Send + Sync {
    /// Transport identifier.
    fn name(&self) -> &'static str;

    /// Send one frame and decode the response.
    fn detect(&self, request: &DetectRequest) -> Result<InferenceResult, SubmissionError>;
}
