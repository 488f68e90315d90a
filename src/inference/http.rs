//! HTTP transport for the disease-detection endpoint.
//!
//! Posts `{"frame": <data url>, "crop"?: <context>}` as JSON and decodes
//! `{"status", "label"?, "confidence"?}`. One attempt per call, bounded by the agent timeout.

use anyhow::{anyhow, Context, Result};
use std::io::Read;
use std::time::Duration;
use url::Url;

use super::result::{DetectRequest, InferenceResult};
use super::transport::InferenceTransport;
use crate::error::SubmissionError;

const MAX_RESPONSE_BYTES: usize = 64 * 1024;

pub struct HttpTransport {
    endpoint: Url,
    language: Option<String>,
    agent: ureq::Agent,
}

impl HttpTransport {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self> {
        let endpoint = Url::parse(endpoint).context("parse inference endpoint")?;
        match endpoint.scheme() {
            "http" | "https" => {}
            other => {
                return Err(anyhow!(
                    "unsupported endpoint scheme '{}'; expected http(s)",
                    other
                ))
            }
        }
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();
        Ok(Self {
            endpoint,
            language: None,
            agent,
        })
    }

    /// Send `X-Language` with every request.
    pub fn with_language(mut self, language: Option<String>) -> Self {
        self.language = language.filter(|lang| !lang.trim().is_empty());
        self
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

impl InferenceTransport for HttpTransport {
    fn name(&self) -> &'static str {
        "http"
    }

    fn detect(&self, request: &DetectRequest) -> Result<InferenceResult, SubmissionError> {
        let body =
            serde_json::to_string(request).map_err(|e| SubmissionError::Transport(e.to_string()))?;

        let mut call = self
            .agent
            .post(self.endpoint.as_str())
            .set("Content-Type", "application/json");
        if let Some(language) = &self.language {
            call = call.set("X-Language", language);
        }

        let response = match call.send_string(&body) {
            Ok(response) => response,
            Err(ureq::Error::Status(code, _)) => return Err(SubmissionError::Status(code)),
            Err(err) => return Err(SubmissionError::Transport(err.to_string())),
        };
        let status = response.status();
        if !(200..300).contains(&status) {
            return Err(SubmissionError::Status(status));
        }

        let mut bytes = Vec::new();
        response
            .into_reader()
            .take(MAX_RESPONSE_BYTES as u64 + 1)
            .read_to_end(&mut bytes)
            .map_err(|e| SubmissionError::Transport(e.to_string()))?;
        if bytes.len() > MAX_RESPONSE_BYTES {
            return Err(SubmissionError::Decode("response too large".to_string()));
        }
        InferenceResult::parse(&bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_http_endpoint() {
        assert!(HttpTransport::new("ftp://host/detect", Duration::from_secs(1)).is_err());
        assert!(HttpTransport::new("not a url", Duration::from_secs(1)).is_err());
    }

    #[test]
    fn blank_language_is_not_sent() -> Result<()> {
        let transport = HttpTransport::new(
            "http://127.0.0.1:5000/api/detect-disease",
            Duration::from_secs(1),
        )?
        .with_language(Some("  ".to_string()));
        assert!(transport.language.is_none());
        assert_eq!(transport.endpoint().path(), "/api/detect-disease");
        Ok(())
    }
}
