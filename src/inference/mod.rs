//! Disease inference submission.
//!
//! - `InferenceTransport`: one request/response to the detection endpoint
//! - `HttpTransport`: JSON over HTTP (ureq)
//! - `InferenceSubmitter`: fire-and-forget submission of sampled frames

mod http;
mod result;
mod submitter;
mod transport;

pub use http::HttpTransport;
pub use result::{DetectRequest, InferenceResult, CROP_CONTEXTS};
pub use submitter::{InferenceSubmitter, SubmissionHandle, SubmitterStats};
pub use transport::InferenceTransport;
