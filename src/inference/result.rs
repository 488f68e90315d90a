use serde::{Deserialize, Serialize};

use crate::error::SubmissionError;

/// Crop contexts the disease model understands. The endpoint defaults to `TOMATO`.
pub const CROP_CONTEXTS: [&str; 3] = ["TOMATO", "POTATO", "PEPPER"];

/// Body of a disease-detection request.
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct DetectRequest {
    /// `data:image/jpeg;base64,...`
    pub frame: String,
    /// Optional crop context for label filtering.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crop: Option<String>,
}

/// Decoded response of the disease-detection endpoint.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct InferenceResult {
    /// e.g. "HEALTHY", "DISEASED", "SCANNING"
    pub status: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    /// Score in [0, 1].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

impl InferenceResult {
    /// Decode and validate a response body.
    pub fn parse(body: &[u8]) -> Result<Self, SubmissionError> {
        let result: InferenceResult =
            serde_json::from_slice(body).map_err(|e| SubmissionError::Decode(e.to_string()))?;
        result.validate()?;
        Ok(result)
    }

    pub fn validate(&self) -> Result<(), SubmissionError> {
        if let Some(confidence) = self.confidence {
            if !(0.0..=1.0).contains(&confidence) {
                return Err(SubmissionError::Rejected(format!(
                    "confidence {} outside [0, 1]",
                    confidence
                )));
            }
        }
        Ok(())
    }

    /// Confidence as a rounded percentage; 0 when absent.
    pub fn confidence_percent(&self) -> u32 {
        (self.confidence.unwrap_or(0.0) * 100.0).round() as u32
    }

    /// One-line status as shown in the scan panel: `status || label || NN%`.
    pub fn summary(&self) -> String {
        format!(
            "{} || {} || {}%",
            self.status,
            self.label.as_deref().unwrap_or(""),
            self.confidence_percent()
        )
    }
}
