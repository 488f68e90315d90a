//! Synthetic camera platform (`stub://` sources).
//!
//! Generates patterned frames in-memory and records how streams are acquired and released,
//! so lifecycle properties (one live stream, no leaked handles) can be asserted in tests.
//! Failure paths are injectable: denied permission, one-off acquisition failures, and a pause
//! gate that holds `get_user_media` open to simulate a slow permission prompt.

use anyhow::{anyhow, Result};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};

use super::{
    DeviceDescriptor, DeviceKind, FacingMode, MediaDevices, MediaStream, StreamConstraints,
    VideoElement,
};
use crate::frame::Canvas;

const REAR_HINTS: [&str; 3] = ["back", "rear", "environment"];

/// A simulated camera.
#[derive(Clone, Debug)]
pub struct SyntheticCamera {
    pub device_id: String,
    pub label: String,
    pub width: u32,
    pub height: u32,
    /// Number of dimension polls that report zero width before frames flow.
    pub warmup_polls: u32,
    /// Acquisition fails with "device busy".
    pub busy: bool,
}

impl SyntheticCamera {
    pub fn new(device_id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            label: label.into(),
            width: 64,
            height: 48,
            warmup_polls: 0,
            busy: false,
        }
    }

    pub fn with_resolution(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn with_warmup(mut self, polls: u32) -> Self {
        self.warmup_polls = polls;
        self
    }

    pub fn busy(mut self) -> Self {
        self.busy = true;
        self
    }
}

#[derive(Default)]
struct Counters {
    live_streams: AtomicUsize,
    max_live_streams: AtomicUsize,
    acquisitions: AtomicU64,
    releases: AtomicU64,
    enumerations: AtomicU64,
    frames_drawn: AtomicU64,
}

#[derive(Default)]
struct GateState {
    paused: bool,
    waiting: usize,
}

/// Synthetic `MediaDevices` implementation.
pub struct SyntheticDevices {
    cameras: Mutex<Vec<SyntheticCamera>>,
    counters: Arc<Counters>,
    deny_permission: AtomicBool,
    fail_next: AtomicUsize,
    gate: Arc<(Mutex<GateState>, Condvar)>,
    last_constraints: Mutex<Option<StreamConstraints>>,
}

impl SyntheticDevices {
    pub fn new(cameras: Vec<SyntheticCamera>) -> Self {
        Self {
            cameras: Mutex::new(cameras),
            counters: Arc::new(Counters::default()),
            deny_permission: AtomicBool::new(false),
            fail_next: AtomicUsize::new(0),
            gate: Arc::new((Mutex::new(GateState::default()), Condvar::new())),
            last_constraints: Mutex::new(None),
        }
    }

    /// A front and a back camera, as found on most phones.
    pub fn demo() -> Self {
        Self::new(vec![
            SyntheticCamera::new("stub-front", "Front Camera")
                .with_resolution(640, 480)
                .with_warmup(1),
            SyntheticCamera::new("stub-back", "Back Camera")
                .with_resolution(1280, 720)
                .with_warmup(1),
        ])
    }

    /// Replace the attached cameras (simulates plugging or unplugging a device).
    pub fn set_cameras(&self, cameras: Vec<SyntheticCamera>) {
        if let Ok(mut guard) = self.cameras.lock() {
            *guard = cameras;
        }
    }

    pub fn deny_permission(&self, deny: bool) {
        self.deny_permission.store(deny, Ordering::SeqCst);
    }

    /// Fail the next `count` acquisitions.
    pub fn fail_next_acquisitions(&self, count: usize) {
        self.fail_next.store(count, Ordering::SeqCst);
    }

    /// Hold every subsequent `get_user_media` call until `resume_acquisition`.
    pub fn pause_acquisition(&self) {
        let (lock, _) = &*self.gate;
        if let Ok(mut state) = lock.lock() {
            state.paused = true;
        }
    }

    pub fn resume_acquisition(&self) {
        let (lock, cvar) = &*self.gate;
        if let Ok(mut state) = lock.lock() {
            state.paused = false;
        }
        cvar.notify_all();
    }

    /// Number of `get_user_media` calls currently held by the pause gate.
    pub fn pending_acquisitions(&self) -> usize {
        let (lock, _) = &*self.gate;
        lock.lock().map(|state| state.waiting).unwrap_or(0)
    }

    pub fn live_streams(&self) -> usize {
        self.counters.live_streams.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneously live streams seen so far.
    pub fn max_live_streams(&self) -> usize {
        self.counters.max_live_streams.load(Ordering::SeqCst)
    }

    pub fn acquisitions(&self) -> u64 {
        self.counters.acquisitions.load(Ordering::SeqCst)
    }

    pub fn releases(&self) -> u64 {
        self.counters.releases.load(Ordering::SeqCst)
    }

    pub fn enumerations(&self) -> u64 {
        self.counters.enumerations.load(Ordering::SeqCst)
    }

    pub fn frames_drawn(&self) -> u64 {
        self.counters.frames_drawn.load(Ordering::SeqCst)
    }

    pub fn last_constraints(&self) -> Option<StreamConstraints> {
        self.last_constraints
            .lock()
            .ok()
            .and_then(|guard| guard.clone())
    }

    fn wait_at_gate(&self) {
        let (lock, cvar) = &*self.gate;
        let Ok(mut state) = lock.lock() else {
            return;
        };
        state.waiting += 1;
        while state.paused {
            state = match cvar.wait(state) {
                Ok(state) => state,
                Err(_) => return,
            };
        }
        state.waiting -= 1;
    }

    fn resolve(&self, constraints: &StreamConstraints) -> Result<SyntheticCamera> {
        let cameras = self
            .cameras
            .lock()
            .map_err(|_| anyhow!("synthetic camera list poisoned"))?;
        let camera = match constraints {
            StreamConstraints::Device(id) => cameras
                .iter()
                .find(|camera| &camera.device_id == id)
                .ok_or_else(|| anyhow!("requested device not found: {}", id))?,
            StreamConstraints::Facing(FacingMode::Environment) => cameras
                .iter()
                .find(|camera| {
                    let label = camera.label.to_lowercase();
                    REAR_HINTS.iter().any(|hint| label.contains(hint))
                })
                .or_else(|| cameras.first())
                .ok_or_else(|| anyhow!("no camera available"))?,
            StreamConstraints::Facing(FacingMode::User) => cameras
                .first()
                .ok_or_else(|| anyhow!("no camera available"))?,
        };
        Ok(camera.clone())
    }
}

impl MediaDevices for SyntheticDevices {
    fn name(&self) -> &'static str {
        "synthetic"
    }

    fn enumerate_devices(&self) -> Result<Vec<DeviceDescriptor>> {
        self.counters.enumerations.fetch_add(1, Ordering::SeqCst);
        let cameras = self
            .cameras
            .lock()
            .map_err(|_| anyhow!("synthetic camera list poisoned"))?;
        let mut devices = vec![DeviceDescriptor {
            device_id: "stub-mic".to_string(),
            label: "Synthetic Microphone".to_string(),
            kind: DeviceKind::AudioInput,
        }];
        devices.extend(
            cameras
                .iter()
                .map(|camera| DeviceDescriptor::video(&camera.device_id, &camera.label)),
        );
        Ok(devices)
    }

    fn get_user_media(&self, constraints: &StreamConstraints) -> Result<Box<dyn MediaStream>> {
        self.wait_at_gate();
        if let Ok(mut last) = self.last_constraints.lock() {
            *last = Some(constraints.clone());
        }

        if self.deny_permission.load(Ordering::SeqCst) {
            return Err(anyhow!("permission denied"));
        }
        let fail = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if fail {
            return Err(anyhow!("device could not be started"));
        }

        let camera = self.resolve(constraints)?;
        if camera.busy {
            return Err(anyhow!("device busy: {}", camera.device_id));
        }

        self.counters.acquisitions.fetch_add(1, Ordering::SeqCst);
        let live = self.counters.live_streams.fetch_add(1, Ordering::SeqCst) + 1;
        self.counters
            .max_live_streams
            .fetch_max(live, Ordering::SeqCst);

        log::debug!(
            "SyntheticDevices: opened {} ({}x{})",
            camera.device_id,
            camera.width,
            camera.height
        );

        Ok(Box::new(SyntheticStream {
            device_id: camera.device_id.clone(),
            video: Arc::new(SyntheticVideo::new(&camera, self.counters.clone())),
            counters: self.counters.clone(),
            active: true,
        }))
    }
}

struct SyntheticStream {
    device_id: String,
    video: Arc<SyntheticVideo>,
    counters: Arc<Counters>,
    active: bool,
}

impl MediaStream for SyntheticStream {
    fn device_id(&self) -> &str {
        &self.device_id
    }

    fn video(&self) -> Arc<dyn VideoElement> {
        self.video.clone()
    }

    fn stop_tracks(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;
        self.video.ended.store(true, Ordering::SeqCst);
        self.counters.live_streams.fetch_sub(1, Ordering::SeqCst);
        self.counters.releases.fetch_add(1, Ordering::SeqCst);
        log::debug!("SyntheticDevices: released {}", self.device_id);
    }

    fn is_active(&self) -> bool {
        self.active
    }
}

impl Drop for SyntheticStream {
    fn drop(&mut self) {
        self.stop_tracks();
    }
}

struct SyntheticVideo {
    width: u32,
    height: u32,
    warmup_remaining: AtomicU32,
    ended: AtomicBool,
    frame_count: AtomicU64,
    counters: Arc<Counters>,
}

impl SyntheticVideo {
    fn new(camera: &SyntheticCamera, counters: Arc<Counters>) -> Self {
        Self {
            width: camera.width,
            height: camera.height,
            warmup_remaining: AtomicU32::new(camera.warmup_polls),
            ended: AtomicBool::new(false),
            frame_count: AtomicU64::new(0),
            counters,
        }
    }

    /// Leaf-green gradient with a little sensor noise.
    fn generate_pixels(&self, frame_count: u64) -> Vec<u8> {
        let pixel_count = (self.width * self.height) as usize;
        let mut pixels = vec![0u8; pixel_count * 3];
        let noise: u8 = rand::random::<u8>() % 8;
        for (i, pixel) in pixels.chunks_exact_mut(3).enumerate() {
            let x = (i % self.width as usize) as u64;
            pixel[0] = ((x + frame_count) % 64) as u8 + noise;
            pixel[1] = 140 + ((x * 3 + frame_count) % 96) as u8;
            pixel[2] = 40 + noise;
        }
        pixels
    }
}

impl VideoElement for SyntheticVideo {
    fn dimensions(&self) -> (u32, u32) {
        if self.ended.load(Ordering::SeqCst) {
            return (0, 0);
        }
        let warming = self
            .warmup_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if warming {
            return (0, 0);
        }
        (self.width, self.height)
    }

    fn draw(&self, canvas: &mut Canvas) -> Result<()> {
        if self.ended.load(Ordering::SeqCst) {
            return Err(anyhow!("stream ended"));
        }
        let frame_count = self.frame_count.fetch_add(1, Ordering::SeqCst) + 1;
        let pixels = self.generate_pixels(frame_count);
        canvas.draw_rgb(&pixels, self.width, self.height)?;
        self.counters.frames_drawn.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_cameras() -> SyntheticDevices {
        SyntheticDevices::new(vec![
            SyntheticCamera::new("a", "Front"),
            SyntheticCamera::new("b", "Back Camera"),
        ])
    }

    #[test]
    fn enumerate_reports_all_device_kinds() -> Result<()> {
        let devices = two_cameras().enumerate_devices()?;
        assert_eq!(devices.len(), 3);
        assert_eq!(devices[0].kind, DeviceKind::AudioInput);
        assert_eq!(devices[1].device_id, "a");
        assert_eq!(devices[2].label, "Back Camera");
        Ok(())
    }

    #[test]
    fn facing_environment_prefers_rear_label() -> Result<()> {
        let platform = two_cameras();
        let stream = platform.get_user_media(&StreamConstraints::Facing(FacingMode::Environment))?;
        assert_eq!(stream.device_id(), "b");
        Ok(())
    }

    #[test]
    fn dropping_stream_releases_device() -> Result<()> {
        let platform = two_cameras();
        let stream = platform.get_user_media(&StreamConstraints::Device("a".into()))?;
        assert_eq!(platform.live_streams(), 1);
        drop(stream);
        assert_eq!(platform.live_streams(), 0);
        assert_eq!(platform.releases(), 1);
        Ok(())
    }

    #[test]
    fn stop_tracks_is_idempotent() -> Result<()> {
        let platform = two_cameras();
        let mut stream = platform.get_user_media(&StreamConstraints::Device("a".into()))?;
        stream.stop_tracks();
        stream.stop_tracks();
        assert!(!stream.is_active());
        assert_eq!(platform.releases(), 1);
        assert_eq!(stream.video().dimensions(), (0, 0));
        Ok(())
    }

    #[test]
    fn warmup_reports_zero_width_first() -> Result<()> {
        let platform = SyntheticDevices::new(vec![SyntheticCamera::new("a", "Front")
            .with_resolution(8, 4)
            .with_warmup(2)]);
        let stream = platform.get_user_media(&StreamConstraints::Device("a".into()))?;
        let video = stream.video();
        assert_eq!(video.dimensions(), (0, 0));
        assert_eq!(video.dimensions(), (0, 0));
        assert_eq!(video.dimensions(), (8, 4));
        Ok(())
    }

    #[test]
    fn injected_failures_are_one_shot() {
        let platform = two_cameras();
        platform.fail_next_acquisitions(1);
        let constraints = StreamConstraints::Device("a".into());
        assert!(platform.get_user_media(&constraints).is_err());
        assert!(platform.get_user_media(&constraints).is_ok());
    }

    #[test]
    fn busy_camera_cannot_be_opened() {
        let platform = SyntheticDevices::new(vec![SyntheticCamera::new("a", "Front").busy()]);
        let err = platform
            .get_user_media(&StreamConstraints::Device("a".into()))
            .err()
            .expect("busy device");
        assert!(err.to_string().contains("busy"));
        assert_eq!(platform.live_streams(), 0);
    }
}
