//! Platform media-device seam.
//!
//! The scan core never talks to camera hardware directly. It goes through:
//! - `MediaDevices`: device enumeration and stream acquisition
//! - `MediaStream`: an acquired stream handle, owned exclusively by the camera session
//! - `VideoElement`: a read-only tap on the stream that the sampler draws frames from
//!
//! Available platforms:
//! - Synthetic cameras (`stub://` sources) for tests and demos
//! - V4L2 devices (feature: platform-v4l2)

use anyhow::{anyhow, Result};
use std::sync::Arc;

use crate::frame::Canvas;

#[cfg(feature = "platform-v4l2")]
mod normalize;
pub mod synthetic;
#[cfg(feature = "platform-v4l2")]
pub mod v4l2;

pub use synthetic::{SyntheticCamera, SyntheticDevices};
#[cfg(feature = "platform-v4l2")]
pub use v4l2::V4l2Devices;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DeviceKind {
    VideoInput,
    AudioInput,
}

/// Device descriptor as reported by the platform.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceDescriptor {
    /// Opaque identifier. May be empty before the user grants camera permission.
    pub device_id: String,
    pub label: String,
    pub kind: DeviceKind,
}

impl DeviceDescriptor {
    pub fn video(device_id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            label: label.into(),
            kind: DeviceKind::VideoInput,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FacingMode {
    Environment,
    User,
}

/// Constraints for stream acquisition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamConstraints {
    /// Exactly this device.
    Device(String),
    /// Any camera facing this way.
    Facing(FacingMode),
}

pub trait MediaDevices: Send + Sync {
    /// Platform identifier.
    fn name(&self) -> &'static str;

    /// List every input/output device the platform knows about.
    fn enumerate_devices(&self) -> Result<Vec<DeviceDescriptor>>;

    /// Acquire a live stream. Fails when permission is denied or the device is busy.
    fn get_user_media(&self, constraints: &StreamConstraints) -> Result<Box<dyn MediaStream>>;
}

/// An acquired hardware stream.
///
/// Tracks keep the device open until `stop_tracks` is called. Implementations also stop their
/// tracks on drop.
pub trait MediaStream: Send {
    /// Identifier of the device backing the stream.
    fn device_id(&self) -> &str;

    /// Read-only tap for the frame sampler.
    fn video(&self) -> Arc<dyn VideoElement>;

    /// Stop every track and release the device. Idempotent.
    fn stop_tracks(&mut self);

    fn is_active(&self) -> bool;
}

/// The rendering end of a stream.
pub trait VideoElement: Send + Sync {
    /// Live `(width, height)`. Zero while the stream has not produced a frame.
    fn dimensions(&self) -> (u32, u32);

    /// Draw the current frame into `canvas` at the origin.
    fn draw(&self, canvas: &mut Canvas) -> Result<()>;
}

/// Open the platform named by `source`.
///
/// - `stub://<name>`: synthetic front and back cameras
/// - `v4l2`: local V4L2 devices (requires the platform-v4l2 feature)
pub fn open(source: &str) -> Result<Arc<dyn MediaDevices>> {
    if source.starts_with("stub://") {
        return Ok(Arc::new(SyntheticDevices::demo()));
    }
    match source {
        #[cfg(feature = "platform-v4l2")]
        "v4l2" => Ok(Arc::new(V4l2Devices::new())),
        #[cfg(not(feature = "platform-v4l2"))]
        "v4l2" => Err(anyhow!("v4l2 source requires the platform-v4l2 feature")),
        other => Err(anyhow!(
            "unsupported camera source '{}'; expected stub://<name> or v4l2",
            other
        )),
    }
}
