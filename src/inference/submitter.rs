//! Fire-and-forget frame submission.
//!
//! Every frame goes out on its own thread. The caller never waits: a slow submission from one
//! tick must not delay the next. Successful results go to the observer; every failure is logged
//! at debug level and dropped.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use super::result::{DetectRequest, InferenceResult};
use super::transport::InferenceTransport;
use crate::error::SubmissionError;
use crate::frame::CapturedFrame;
use crate::observer::ScanObserver;

#[derive(Default)]
struct Counters {
    submitted: AtomicU64,
    delivered: AtomicU64,
    dropped: AtomicU64,
}

/// Submission statistics.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SubmitterStats {
    pub submitted: u64,
    pub delivered: u64,
    pub dropped: u64,
}

impl SubmitterStats {
    pub fn in_flight(&self) -> u64 {
        self.submitted
            .saturating_sub(self.delivered)
            .saturating_sub(self.dropped)
    }
}

/// Handle to one in-flight submission. Dropping it detaches the submission.
pub struct SubmissionHandle {
    join: Option<JoinHandle<()>>,
}

impl SubmissionHandle {
    /// Block until the submission has finished and its callback (if any) has run.
    pub fn wait(mut self) {
        if let Some(join) = self.join.take() {
            if join.join().is_err() {
                log::warn!("inference submission thread panicked");
            }
        }
    }
}

#[derive(Clone)]
pub struct InferenceSubmitter {
    transport: Arc<dyn InferenceTransport>,
    observer: Arc<dyn ScanObserver>,
    crop: Option<String>,
    counters: Arc<Counters>,
}

impl InferenceSubmitter {
    pub fn new(transport: Arc<dyn InferenceTransport>, observer: Arc<dyn ScanObserver>) -> Self {
        Self {
            transport,
            observer,
            crop: None,
            counters: Arc::new(Counters::default()),
        }
    }

    /// Crop context sent with every frame.
    pub fn with_crop(mut self, crop: Option<String>) -> Self {
        self.crop = crop;
        self
    }

    pub fn observer(&self) -> Arc<dyn ScanObserver> {
        self.observer.clone()
    }

    pub fn stats(&self) -> SubmitterStats {
        SubmitterStats {
            submitted: self.counters.submitted.load(Ordering::SeqCst),
            delivered: self.counters.delivered.load(Ordering::SeqCst),
            dropped: self.counters.dropped.load(Ordering::SeqCst),
        }
    }

    /// Submit a frame without waiting for the outcome.
    pub fn submit(&self, frame: CapturedFrame) -> SubmissionHandle {
        self.counters.submitted.fetch_add(1, Ordering::SeqCst);
        let submitter = self.clone();
        let spawned = std::thread::Builder::new()
            .name("leafscan-submit".to_string())
            .spawn(move || submitter.deliver(frame));
        match spawned {
            Ok(join) => SubmissionHandle { join: Some(join) },
            Err(err) => {
                self.counters.dropped.fetch_add(1, Ordering::SeqCst);
                log::warn!("inference submission not started: {}", err);
                SubmissionHandle { join: None }
            }
        }
    }

    fn deliver(&self, frame: CapturedFrame) {
        let request = DetectRequest {
            frame: frame.data_url,
            crop: self.crop.clone(),
        };
        match self.transport.detect(&request) {
            Ok(result) => {
                self.counters.delivered.fetch_add(1, Ordering::SeqCst);
                log::trace!(
                    "inference result after {} ms: {}",
                    frame.captured_at.elapsed().as_millis(),
                    result.summary()
                );
                self.observer.on_result(&result);
            }
            Err(err) => self.drop_sample(err),
        }
    }

    fn drop_sample(&self, err: SubmissionError) {
        self.counters.dropped.fetch_add(1, Ordering::SeqCst);
        log::debug!(
            "inference sample dropped ({}): {}",
            self.transport.name(),
            err
        );
    }
}
