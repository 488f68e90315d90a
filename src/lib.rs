//! Leafscan scan-client core
//!
//! Drives a live camera, samples frames on a fixed cadence and submits them to a remote
//! plant-disease inference endpoint, rendering whatever verdict comes back.
//!
//! # Architecture
//!
//! - At most one camera stream and one sampler exist at a time, owned by `CameraSession`.
//! - Lifecycle operations (start, stop, switch) are serialized; overlapping ones are rejected.
//! - Sampling is fire-and-forget: a slow or failed submission never delays the next tick and
//!   never reaches the user as an error.
//! - Switching cameras releases the current stream before acquiring the next one.
//!
//! # Module Structure
//!
//! - `platform`: media device traits plus the synthetic (`stub://`) and V4L2 platforms
//! - `catalog`: enumerated video inputs and the current selection
//! - `session`: camera lifecycle state machine
//! - `sampler`: fixed-interval frame grabbing
//! - `frame`: reusable canvas and JPEG data-URL encoding
//! - `inference`: request/result types, HTTP transport, detached submitter
//! - `observer`: render callback and result board
//! - `config`: file + environment configuration

pub mod catalog;
pub mod config;
pub mod error;
pub mod frame;
pub mod inference;
pub mod observer;
pub mod platform;
pub mod sampler;
pub mod session;

pub use catalog::{CatalogSummary, DeviceCatalog, SharedCatalog, VideoDevice};
pub use config::{InferenceSettings, ScanConfig};
pub use error::{SessionError, SubmissionError, TickError};
pub use frame::{Canvas, CapturedFrame, FrameGrabber};
pub use inference::{
    DetectRequest, HttpTransport, InferenceResult, InferenceSubmitter, InferenceTransport,
    SubmissionHandle, SubmitterStats,
};
pub use observer::{Liveness, NullObserver, ResultBoard, ScanObserver};
pub use platform::{
    DeviceDescriptor, DeviceKind, FacingMode, MediaDevices, MediaStream, StreamConstraints,
    SyntheticCamera, SyntheticDevices, VideoElement,
};
pub use sampler::{FrameSampler, SamplerProbe, SamplerSettings, SamplerStats};
pub use session::{CameraSession, SessionState};
