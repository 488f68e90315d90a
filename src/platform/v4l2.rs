//! V4L2 camera platform.
//!
//! Enumerates local capture devices and streams from them with libv4l. Each acquired stream
//! runs a capture thread that owns the device and keeps the most recent frame, converted to
//! RGB24, in a slot the sampler draws from. Stopping the tracks ends the capture thread and
//! closes the device.

use anyhow::{anyhow, Context, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use super::normalize::{normalize_to_rgb, PixelFormat};
use super::{DeviceDescriptor, MediaDevices, MediaStream, StreamConstraints, VideoElement};
use crate::frame::Canvas;

/// Frame periods a capture read may wait before the stop flag is checked again.
const STALL_FRAMES: u32 = 5;
const MIN_READ_TIMEOUT: Duration = Duration::from_millis(500);
const MAX_READ_TIMEOUT: Duration = Duration::from_secs(2);

/// Requested capture format. Drivers may pick something else; the actual format is used.
#[derive(Clone, Copy, Debug)]
pub struct V4l2Format {
    pub width: u32,
    pub height: u32,
    pub target_fps: u32,
}

impl Default for V4l2Format {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            target_fps: 10,
        }
    }
}

pub struct V4l2Devices {
    format: V4l2Format,
}

impl V4l2Devices {
    pub fn new() -> Self {
        Self::with_format(V4l2Format::default())
    }

    pub fn with_format(format: V4l2Format) -> Self {
        Self { format }
    }
}

impl Default for V4l2Devices {
    fn default() -> Self {
        Self::new()
    }
}

impl MediaDevices for V4l2Devices {
    fn name(&self) -> &'static str {
        "v4l2"
    }

    /// Capture-capable nodes only; metadata nodes are skipped.
    fn enumerate_devices(&self) -> Result<Vec<DeviceDescriptor>> {
        let mut devices = Vec::new();
        for node in v4l::context::enum_devices() {
            let path = node.path().display().to_string();
            let caps = match v4l::Device::with_path(node.path()).and_then(|d| d.query_caps()) {
                Ok(caps) => caps,
                Err(err) => {
                    log::debug!("V4l2Devices: skipping {}: {}", path, err);
                    continue;
                }
            };
            if !caps
                .capabilities
                .contains(v4l::capability::Flags::VIDEO_CAPTURE)
            {
                continue;
            }
            let label = if caps.card.is_empty() {
                node.name().unwrap_or_else(|| path.clone())
            } else {
                caps.card.clone()
            };
            devices.push(DeviceDescriptor::video(path, label));
        }
        devices.sort_by(|a, b| a.device_id.cmp(&b.device_id));
        Ok(devices)
    }

    fn get_user_media(&self, constraints: &StreamConstraints) -> Result<Box<dyn MediaStream>> {
        let path = match constraints {
            StreamConstraints::Device(path) => path.clone(),
            // No facing information on V4L2: take the first capture device.
            StreamConstraints::Facing(_) => self
                .enumerate_devices()?
                .into_iter()
                .next()
                .map(|d| d.device_id)
                .ok_or_else(|| anyhow!("no v4l2 capture device found"))?,
        };
        Ok(Box::new(V4l2Stream::open(path, self.format)?))
    }
}

#[derive(Default)]
struct LatestFrame {
    pixels: Vec<u8>,
    width: u32,
    height: u32,
}

#[derive(Default)]
struct V4l2Video {
    slot: Mutex<LatestFrame>,
}

impl VideoElement for V4l2Video {
    fn dimensions(&self) -> (u32, u32) {
        match self.slot.lock() {
            Ok(frame) => (frame.width, frame.height),
            Err(_) => (0, 0),
        }
    }

    fn draw(&self, canvas: &mut Canvas) -> Result<()> {
        let frame = self
            .slot
            .lock()
            .map_err(|_| anyhow!("v4l2 frame slot poisoned"))?;
        canvas.draw_rgb(&frame.pixels, frame.width, frame.height)
    }
}

struct V4l2Stream {
    device: String,
    video: Arc<V4l2Video>,
    stop: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl V4l2Stream {
    fn open(device: String, format: V4l2Format) -> Result<Self> {
        let video = Arc::new(V4l2Video::default());
        let stop = Arc::new(AtomicBool::new(false));
        let (ready_tx, ready_rx) = mpsc::sync_channel::<Result<(), String>>(1);

        let thread_device = device.clone();
        let thread_video = video.clone();
        let thread_stop = stop.clone();
        let join = std::thread::Builder::new()
            .name("leafscan-v4l2".to_string())
            .spawn(move || {
                capture_loop(&thread_device, format, &thread_video, &thread_stop, ready_tx)
            })
            .context("spawn v4l2 capture thread")?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Self {
                device,
                video,
                stop,
                join: Some(join),
            }),
            Ok(Err(err)) => {
                let _ = join.join();
                Err(anyhow!(err))
            }
            Err(_) => {
                let _ = join.join();
                Err(anyhow!("v4l2 capture thread exited during setup"))
            }
        }
    }
}

impl MediaStream for V4l2Stream {
    fn device_id(&self) -> &str {
        &self.device
    }

    fn video(&self) -> Arc<dyn VideoElement> {
        self.video.clone()
    }

    fn stop_tracks(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            if join.join().is_err() {
                log::warn!("V4l2Devices: capture thread for {} panicked", self.device);
            }
            if let Ok(mut frame) = self.video.slot.lock() {
                *frame = LatestFrame::default();
            }
            log::info!("V4l2Devices: closed {}", self.device);
        }
    }

    fn is_active(&self) -> bool {
        self.join.is_some()
    }
}

impl Drop for V4l2Stream {
    fn drop(&mut self) {
        self.stop_tracks();
    }
}

fn capture_loop(
    path: &str,
    requested: V4l2Format,
    video: &V4l2Video,
    stop: &AtomicBool,
    ready: mpsc::SyncSender<Result<(), String>>,
) {
    use v4l::buffer::Type;
    use v4l::io::traits::CaptureStream;

    let (device, width, height, pixel_format) = match open_device(path, requested) {
        Ok(opened) => opened,
        Err(err) => {
            let _ = ready.send(Err(format!("{:#}", err)));
            return;
        }
    };
    let mut stream = match v4l::prelude::MmapStream::with_buffers(&device, Type::VideoCapture, 4) {
        Ok(stream) => stream,
        Err(err) => {
            let _ = ready.send(Err(format!("create v4l2 buffer stream on {}: {}", path, err)));
            return;
        }
    };
    // `next()` must return within a bounded time so `stop_tracks` can join this thread.
    stream.set_timeout(read_timeout(requested.target_fps));
    let _ = ready.send(Ok(()));
    log::info!(
        "V4l2Devices: streaming {} ({}x{} {:?})",
        path,
        width,
        height,
        pixel_format
    );

    pump_frames(stop, video, width, height, || match stream.next() {
        Ok((buf, _meta)) => match normalize_to_rgb(buf, width, height, pixel_format) {
            Ok(pixels) => Ok(Some(pixels)),
            Err(err) => {
                log::debug!("V4l2Devices: dropped frame from {}: {:#}", path, err);
                Ok(None)
            }
        },
        Err(err) if err.kind() == std::io::ErrorKind::TimedOut => {
            log::trace!("V4l2Devices: no frame from {} within timeout", path);
            Ok(None)
        }
        Err(err) => Err(err),
    });
    log::debug!("V4l2Devices: capture on {} finished", path);
}

/// Publish frames from `read` until `stop` is raised or `read` fails.
///
/// `read` yields `Ok(None)` when no usable frame arrived in time; the stop flag is checked
/// between every call.
fn pump_frames(
    stop: &AtomicBool,
    video: &V4l2Video,
    width: u32,
    height: u32,
    mut read: impl FnMut() -> std::io::Result<Option<Vec<u8>>>,
) {
    while !stop.load(Ordering::SeqCst) {
        match read() {
            Ok(Some(pixels)) => {
                if let Ok(mut frame) = video.slot.lock() {
                    *frame = LatestFrame {
                        pixels,
                        width,
                        height,
                    };
                }
            }
            Ok(None) => {}
            Err(err) => {
                log::warn!("V4l2Devices: capture failed: {}", err);
                break;
            }
        }
    }
}

fn open_device(path: &str, requested: V4l2Format) -> Result<(v4l::Device, u32, u32, PixelFormat)> {
    use v4l::video::Capture;

    let device =
        v4l::Device::with_path(path).with_context(|| format!("open v4l2 device {}", path))?;
    let mut format = device.format().context("read v4l2 format")?;
    format.width = requested.width;
    format.height = requested.height;
    format.fourcc = v4l::FourCC::new(b"RGB3");

    let format = match device.set_format(&format) {
        Ok(format) => format,
        Err(err) => {
            log::warn!("V4l2Devices: failed to set format on {}: {}", path, err);
            device
                .format()
                .context("read v4l2 format after set failure")?
        }
    };

    if requested.target_fps > 0 {
        let params = v4l::video::capture::Parameters::with_fps(requested.target_fps);
        if let Err(err) = device.set_params(&params) {
            log::warn!("V4l2Devices: failed to set fps on {}: {}", path, err);
        }
    }

    let pixel_format = PixelFormat::from_fourcc(&format.fourcc.repr).ok_or_else(|| {
        anyhow!(
            "unsupported v4l2 pixel format {} on {}",
            format.fourcc,
            path
        )
    })?;
    Ok((device, format.width, format.height, pixel_format))
}

fn read_timeout(target_fps: u32) -> Duration {
    if target_fps == 0 {
        return MAX_READ_TIMEOUT;
    }
    (Duration::from_secs(1) * STALL_FRAMES / target_fps).clamp(MIN_READ_TIMEOUT, MAX_READ_TIMEOUT)
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Instant;

    #[test]
    fn stalled_reads_still_observe_stop() {
        let stop = Arc::new(AtomicBool::new(false));
        let video = Arc::new(V4l2Video::default());
        let (thread_stop, thread_video) = (stop.clone(), video.clone());
        let join = std::thread::spawn(move || {
            // A camera that never delivers: every read times out.
            pump_frames(&thread_stop, &thread_video, 2, 2, || {
                std::thread::sleep(Duration::from_millis(20));
                Ok(None)
            })
        });

        std::thread::sleep(Duration::from_millis(60));
        let stopped_at = Instant::now();
        stop.store(true, Ordering::SeqCst);
        join.join().expect("capture thread");
        assert!(stopped_at.elapsed() < Duration::from_secs(1));
        assert_eq!(video.dimensions(), (0, 0));
    }

    #[test]
    fn frames_are_published_until_read_fails() {
        let stop = AtomicBool::new(false);
        let video = V4l2Video::default();
        let mut reads = 0;
        pump_frames(&stop, &video, 1, 1, || {
            reads += 1;
            match reads {
                1 => Ok(Some(vec![10, 20, 30])),
                2 => Ok(None),
                _ => Err(std::io::Error::new(std::io::ErrorKind::Other, "device gone")),
            }
        });
        assert_eq!(reads, 3);
        assert_eq!(video.dimensions(), (1, 1));
    }

    #[test]
    fn read_timeout_spans_a_few_frames_within_bounds() {
        assert_eq!(read_timeout(5), Duration::from_secs(1));
        assert_eq!(read_timeout(60), MIN_READ_TIMEOUT);
        assert_eq!(read_timeout(1), MAX_READ_TIMEOUT);
        assert_eq!(read_timeout(0), MAX_READ_TIMEOUT);
    }
}
