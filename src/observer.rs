//! Render callback contract.
//!
//! The scan core never touches display state. The controller registers a `ScanObserver` and
//! receives catalog changes and inference results through it.
//!
//! Results can land after the session has stopped (a submission issued by the last tick is
//! allowed to finish). Observers that mutate display state should check the session's
//! `Liveness` first.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::catalog::CatalogSummary;
use crate::inference::InferenceResult;

pub trait ScanObserver: Send + Sync {
    /// Device list or selection changed.
    fn on_devices(&self, _summary: &CatalogSummary) {}

    /// A submission completed successfully. Called from the submission thread.
    fn on_result(&self, result: &InferenceResult);
}

/// Observer that discards everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullObserver;

impl ScanObserver for NullObserver {
    fn on_result(&self, _result: &InferenceResult) {}
}

/// Liveness flag of a camera session. Raised while Active.
#[derive(Clone, Debug, Default)]
pub struct Liveness(Arc<AtomicBool>);

impl Liveness {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_live(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub(crate) fn set(&self, live: bool) {
        self.0.store(live, Ordering::SeqCst);
    }
}

/// Keeps the latest result and catalog summary, last writer wins.
///
/// This is the state a result panel renders from. Results arriving while the attached liveness
/// flag is lowered are counted as stale and do not replace the displayed result.
#[derive(Default)]
pub struct ResultBoard {
    latest: Mutex<Option<InferenceResult>>,
    devices: Mutex<Option<CatalogSummary>>,
    liveness: Mutex<Option<Liveness>>,
    received: AtomicU64,
    stale: AtomicU64,
}

impl ResultBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ignore results that land while `liveness` is lowered.
    pub fn attach(&self, liveness: Liveness) {
        if let Ok(mut guard) = self.liveness.lock() {
            *guard = Some(liveness);
        }
    }

    pub fn latest(&self) -> Option<InferenceResult> {
        self.latest.lock().ok().and_then(|guard| guard.clone())
    }

    pub fn devices(&self) -> Option<CatalogSummary> {
        self.devices.lock().ok().and_then(|guard| guard.clone())
    }

    /// Every result delivered, stale ones included.
    pub fn received(&self) -> u64 {
        self.received.load(Ordering::SeqCst)
    }

    pub fn stale(&self) -> u64 {
        self.stale.load(Ordering::SeqCst)
    }

    fn is_live(&self) -> bool {
        match self.liveness.lock() {
            Ok(guard) => guard.as_ref().map(Liveness::is_live).unwrap_or(true),
            Err(_) => false,
        }
    }
}

impl ScanObserver for ResultBoard {
    fn on_devices(&self, summary: &CatalogSummary) {
        if let Ok(mut guard) = self.devices.lock() {
            *guard = Some(summary.clone());
        }
    }

    fn on_result(&self, result: &InferenceResult) {
        self.received.fetch_add(1, Ordering::SeqCst);
        if !self.is_live() {
            self.stale.fetch_add(1, Ordering::SeqCst);
            return;
        }
        if let Ok(mut guard) = self.latest.lock() {
            *guard = Some(result.clone());
        }
    }
}
