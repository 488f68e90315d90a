//! Camera session lifecycle.
//!
//! A `CameraSession` is the sole owner of one hardware stream and the sampler that reads it.
//!
//! ```text
//!   Idle --start--> Starting --acquired--> Active --stop--> Idle
//!                      |  \--failed--> Idle (CameraUnavailable)
//!                      \--stop--> Stopping --acquired/failed--> Idle (Cancelled)
//!   Active --switch_camera--> Starting (same serialized operation)
//! ```
//!
//! Lifecycle operations are serialized: a start or switch arriving while another is in flight
//! is rejected with `SessionError::Busy`. Platform calls run with the state lock released, so
//! `stop()` stays responsive while a permission prompt is pending.
//!
//! Invariants:
//! - at most one stream and at most one sampler are held at any time
//! - the sampler is never held without the stream
//! - `stop()` cancels the sampler before releasing the stream, and returns only after both

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::catalog::{CatalogSummary, DeviceCatalog, SharedCatalog};
use crate::error::SessionError;
use crate::inference::InferenceSubmitter;
use crate::observer::Liveness;
use crate::platform::{FacingMode, MediaDevices, MediaStream, StreamConstraints};
use crate::sampler::{FrameSampler, SamplerProbe, SamplerSettings};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Starting,
    Active,
    /// A stop arrived during Starting; the pending start will release what it acquires.
    Stopping,
}

struct SessionInner {
    state: SessionState,
    stream: Option<Box<dyn MediaStream>>,
    sampler: Option<FrameSampler>,
    last_probe: Option<SamplerProbe>,
}

pub struct CameraSession {
    platform: Arc<dyn MediaDevices>,
    catalog: SharedCatalog,
    submitter: InferenceSubmitter,
    settings: SamplerSettings,
    inner: Mutex<SessionInner>,
    liveness: Liveness,
}

impl CameraSession {
    pub fn new(
        platform: Arc<dyn MediaDevices>,
        catalog: SharedCatalog,
        submitter: InferenceSubmitter,
        settings: SamplerSettings,
    ) -> Self {
        Self {
            platform,
            catalog,
            submitter,
            settings,
            inner: Mutex::new(SessionInner {
                state: SessionState::Idle,
                stream: None,
                sampler: None,
                last_probe: None,
            }),
            liveness: Liveness::new(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.lock_inner().state
    }

    /// Raised while Active. Observers check it before applying late results.
    pub fn liveness(&self) -> Liveness {
        self.liveness.clone()
    }

    pub fn catalog(&self) -> SharedCatalog {
        self.catalog.clone()
    }

    pub fn submitter(&self) -> &InferenceSubmitter {
        &self.submitter
    }

    /// Device backing the current stream.
    pub fn active_device_id(&self) -> Option<String> {
        self.lock_inner()
            .stream
            .as_ref()
            .map(|stream| stream.device_id().to_string())
    }

    pub fn holds_stream(&self) -> bool {
        self.lock_inner().stream.is_some()
    }

    pub fn holds_sampler(&self) -> bool {
        self.lock_inner().sampler.is_some()
    }

    /// Counters of the current or most recent sampler.
    pub fn sampler_probe(&self) -> Option<SamplerProbe> {
        self.lock_inner().last_probe.clone()
    }

    /// Acquire a stream for the selected camera and start sampling.
    ///
    /// Enumerates devices first if the catalog is still empty. A failure returns the
    /// session to Idle; a later `start()` may retry.
    pub fn start(&self) -> Result<(), SessionError> {
        {
            let mut inner = self.lock_inner();
            match inner.state {
                SessionState::Idle => inner.state = SessionState::Starting,
                SessionState::Active => {
                    return Err(SessionError::InvalidState {
                        op: "start",
                        state: SessionState::Active,
                    })
                }
                busy => return Err(SessionError::Busy(busy)),
            }
        }
        log::info!("CameraSession: starting");
        self.acquire_and_activate()
    }

    /// Stop sampling and release the stream. No-op when Idle.
    ///
    /// When a start is still acquiring, the start is cancelled: it releases whatever it
    /// acquires and returns `SessionError::Cancelled`.
    pub fn stop(&self) {
        let mut inner = self.lock_inner();
        match inner.state {
            SessionState::Idle | SessionState::Stopping => {}
            SessionState::Starting => {
                inner.state = SessionState::Stopping;
                log::info!("CameraSession: stop requested while starting");
            }
            SessionState::Active => {
                self.teardown(&mut inner);
                inner.state = SessionState::Idle;
                log::info!("CameraSession: stopped");
            }
        }
    }

    /// Move to the next camera.
    ///
    /// Only acts while Active with at least two cameras; returns `Ok(false)` otherwise. The
    /// teardown, selection advance and restart form one lifecycle operation.
    pub fn switch_camera(&self) -> Result<bool, SessionError> {
        let summary = {
            let mut inner = self.lock_inner();
            if inner.state != SessionState::Active {
                log::debug!("CameraSession: switch ignored while {:?}", inner.state);
                return Ok(false);
            }
            let mut catalog = self.lock_catalog();
            if !catalog.can_switch() {
                log::debug!("CameraSession: switch ignored, {} camera(s)", catalog.len());
                return Ok(false);
            }
            if let Some(stream) = inner.stream.as_ref() {
                catalog.select(stream.device_id());
            }
            self.teardown(&mut inner);
            inner.state = SessionState::Starting;
            catalog.advance();
            catalog.summary()
        };
        log::info!(
            "CameraSession: switching to camera {} ({})",
            summary.selected_index,
            summary.selected_label.as_deref().unwrap_or("unlabelled")
        );
        self.submitter.observer().on_devices(&summary);
        self.acquire_and_activate().map(|()| true)
    }

    /// Re-enumerate devices (e.g. after a camera was plugged in or removed).
    ///
    /// While a stream is live the selection stays on its device, as long as that device is
    /// still listed.
    pub fn refresh_devices(&self) -> Result<CatalogSummary, SessionError> {
        let active = self.active_device_id();
        let summary = {
            let mut catalog = self.lock_catalog();
            let keep = active.as_deref();
            catalog.enumerate_keeping(self.platform.as_ref(), keep).map_err(|e| {
                SessionError::CameraUnavailable(format!("enumerate devices: {:#}", e))
            })?;
            catalog.summary()
        };
        self.submitter.observer().on_devices(&summary);
        Ok(summary)
    }

    fn acquire_and_activate(&self) -> Result<(), SessionError> {
        let constraints = match self.resolve_constraints() {
            Ok(constraints) => constraints,
            Err(err) => {
                self.lock_inner().state = SessionState::Idle;
                log::warn!("CameraSession: {}", err);
                return Err(err);
            }
        };

        let acquired = self.platform.get_user_media(&constraints);

        let mut inner = self.lock_inner();
        if inner.state == SessionState::Stopping {
            if let Ok(mut stream) = acquired {
                stream.stop_tracks();
            }
            inner.state = SessionState::Idle;
            log::info!("CameraSession: start cancelled");
            return Err(SessionError::Cancelled);
        }

        let mut stream = match acquired {
            Ok(stream) => stream,
            Err(err) => {
                inner.state = SessionState::Idle;
                log::warn!("CameraSession: camera unavailable: {:#}", err);
                return Err(SessionError::CameraUnavailable(format!("{:#}", err)));
            }
        };

        let sampler = match FrameSampler::start(stream.video(), self.submitter.clone(), self.settings)
        {
            Ok(sampler) => sampler,
            Err(err) => {
                stream.stop_tracks();
                inner.state = SessionState::Idle;
                log::warn!("CameraSession: sampler failed to start: {:#}", err);
                return Err(SessionError::CameraUnavailable(format!("{:#}", err)));
            }
        };

        log::info!(
            "CameraSession: active on {} via {}",
            stream.device_id(),
            self.platform.name()
        );
        inner.last_probe = Some(sampler.probe());
        inner.stream = Some(stream);
        inner.sampler = Some(sampler);
        inner.state = SessionState::Active;
        self.liveness.set(true);
        Ok(())
    }

    /// Exact device id of the selection, or the environment facing hint when none is known.
    fn resolve_constraints(&self) -> Result<StreamConstraints, SessionError> {
        let (constraints, enumerated) = {
            let mut catalog = self.lock_catalog();
            let mut enumerated = None;
            if !catalog.is_populated() || catalog.is_empty() {
                catalog.enumerate(self.platform.as_ref()).map_err(|e| {
                    SessionError::CameraUnavailable(format!("enumerate devices: {:#}", e))
                })?;
                enumerated = Some(catalog.summary());
            }
            (constraints_for(&catalog), enumerated)
        };
        if let Some(summary) = enumerated {
            self.submitter.observer().on_devices(&summary);
        }
        Ok(constraints)
    }

    fn teardown(&self, inner: &mut SessionInner) {
        self.liveness.set(false);
        if let Some(mut sampler) = inner.sampler.take() {
            sampler.stop();
        }
        if let Some(mut stream) = inner.stream.take() {
            stream.stop_tracks();
            log::debug!("CameraSession: released {}", stream.device_id());
        }
    }

    fn lock_inner(&self) -> MutexGuard<'_, SessionInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_catalog(&self) -> MutexGuard<'_, DeviceCatalog> {
        self.catalog.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for CameraSession {
    fn drop(&mut self) {
        self.stop();
    }
}

fn constraints_for(catalog: &DeviceCatalog) -> StreamConstraints {
    // Browsers report empty ids until camera permission is granted.
    match catalog.selected() {
        Some(device) if !device.id.is_empty() => StreamConstraints::Device(device.id.clone()),
        _ => StreamConstraints::Facing(FacingMode::Environment),
    }
}
