//! Error taxonomy for the scan core.
//!
//! Only `SessionError` crosses into the controller. Tick and submission failures are absorbed
//! inside the sampler and submitter and only ever show up in the log.

use thiserror::Error;

use crate::session::SessionState;

/// Failure of a lifecycle operation on a `CameraSession`.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Permission denied, device busy, or enumeration failed. The session stays retryable.
    #[error("camera unavailable: {0}")]
    CameraUnavailable(String),

    /// Another lifecycle operation is already in flight.
    #[error("camera session busy ({0:?})")]
    Busy(SessionState),

    #[error("cannot {op} while session is {state:?}")]
    InvalidState {
        op: &'static str,
        state: SessionState,
    },

    /// `stop()` arrived while the start was still acquiring the stream.
    #[error("camera start cancelled by stop")]
    Cancelled,
}

impl SessionError {
    pub fn is_camera_unavailable(&self) -> bool {
        matches!(self, SessionError::CameraUnavailable(_))
    }
}

/// Outcome of a sampler tick that did not produce a frame.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TickError {
    /// The video reports zero width; the stream is not producing frames yet.
    #[error("no frame available yet")]
    NoFrameYet,

    #[error("rasterize frame: {0}")]
    Raster(String),
}

/// Failure of a single inference submission. Never retried, never surfaced.
#[derive(Debug, Error)]
pub enum SubmissionError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("endpoint returned status {0}")]
    Status(u16),

    #[error("malformed response: {0}")]
    Decode(String),

    #[error("response rejected: {0}")]
    Rejected(String),
}
