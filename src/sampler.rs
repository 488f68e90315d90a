//! Fixed-cadence frame sampler.
//!
//! One background thread per sampler. Every `interval` it grabs the current video frame and
//! hands it to the submitter without waiting for the outcome. Ticks with no frame yet are
//! skipped silently.
//!
//! `stop()` signals the thread and joins it, so no tick fires after it returns. A submission
//! started by the last tick may still complete afterwards.

use anyhow::{anyhow, Result};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::error::TickError;
use crate::frame::{FrameGrabber, DEFAULT_JPEG_QUALITY};
use crate::inference::InferenceSubmitter;
use crate::platform::VideoElement;

/// Sampling period used by the scan views.
pub const DEFAULT_SAMPLE_INTERVAL: Duration = Duration::from_millis(1500);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SamplerSettings {
    pub interval: Duration,
    pub jpeg_quality: u8,
}

impl Default for SamplerSettings {
    fn default() -> Self {
        Self {
            interval: DEFAULT_SAMPLE_INTERVAL,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

#[derive(Default)]
struct TickCounters {
    ticks: AtomicU64,
    submitted: AtomicU64,
    skipped: AtomicU64,
    failed: AtomicU64,
}

/// Tick statistics for a sampler.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SamplerStats {
    pub ticks: u64,
    pub submitted: u64,
    /// Ticks skipped because the video had no frame yet.
    pub skipped: u64,
    pub failed: u64,
}

/// Shared view of a sampler's counters that outlives the sampler itself.
#[derive(Clone, Default)]
pub struct SamplerProbe(Arc<TickCounters>);

impl SamplerProbe {
    pub fn stats(&self) -> SamplerStats {
        SamplerStats {
            ticks: self.0.ticks.load(Ordering::SeqCst),
            submitted: self.0.submitted.load(Ordering::SeqCst),
            skipped: self.0.skipped.load(Ordering::SeqCst),
            failed: self.0.failed.load(Ordering::SeqCst),
        }
    }
}

pub struct FrameSampler {
    stop_tx: Option<Sender<()>>,
    join: Option<JoinHandle<()>>,
    probe: SamplerProbe,
}

impl FrameSampler {
    /// Start ticking on a background thread. The first tick fires one interval from now.
    pub fn start(
        video: Arc<dyn VideoElement>,
        submitter: InferenceSubmitter,
        settings: SamplerSettings,
    ) -> Result<Self> {
        if settings.interval.is_zero() {
            return Err(anyhow!("sample interval must be greater than zero"));
        }
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let probe = SamplerProbe::default();
        let counters = probe.0.clone();

        let join = std::thread::Builder::new()
            .name("leafscan-sampler".to_string())
            .spawn(move || {
                let mut grabber = FrameGrabber::new(settings.jpeg_quality);
                let mut next_tick = Instant::now() + settings.interval;
                loop {
                    let wait = next_tick.saturating_duration_since(Instant::now());
                    match stop_rx.recv_timeout(wait) {
                        Err(RecvTimeoutError::Timeout) => {}
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                    run_tick(&mut grabber, video.as_ref(), &submitter, &counters);
                    next_tick += settings.interval;
                    // Fell behind: resync instead of bursting.
                    let now = Instant::now();
                    if next_tick < now {
                        next_tick = now + settings.interval;
                    }
                }
            })
            .map_err(|e| anyhow!("spawn sampler thread: {}", e))?;

        log::debug!(
            "FrameSampler: started, interval {} ms",
            settings.interval.as_millis()
        );
        Ok(Self {
            stop_tx: Some(stop_tx),
            join: Some(join),
            probe,
        })
    }

    pub fn probe(&self) -> SamplerProbe {
        self.probe.clone()
    }

    pub fn stats(&self) -> SamplerStats {
        self.probe.stats()
    }

    pub fn is_running(&self) -> bool {
        self.join.is_some()
    }

    /// Cancel the timer. Returns once the sampler thread has exited.
    pub fn stop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Some(join) = self.join.take() {
            if join.join().is_err() {
                log::warn!("FrameSampler: sampler thread panicked");
            }
            log::debug!("FrameSampler: stopped after {} ticks", self.stats().ticks);
        }
    }
}

impl Drop for FrameSampler {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_tick(
    grabber: &mut FrameGrabber,
    video: &dyn VideoElement,
    submitter: &InferenceSubmitter,
    counters: &TickCounters,
) {
    counters.ticks.fetch_add(1, Ordering::SeqCst);
    match grabber.grab(video) {
        Ok(frame) => {
            counters.submitted.fetch_add(1, Ordering::SeqCst);
            // Detached: the next tick never waits on this one.
            let _ = submitter.submit(frame);
        }
        Err(TickError::NoFrameYet) => {
            counters.skipped.fetch_add(1, Ordering::SeqCst);
            log::trace!("FrameSampler: no frame yet, tick skipped");
        }
        Err(err) => {
            counters.failed.fetch_add(1, Ordering::SeqCst);
            log::debug!("FrameSampler: {}", err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SubmissionError;
    use crate::frame::Canvas;
    use crate::inference::{DetectRequest, InferenceResult, InferenceTransport};
    use crate::observer::NullObserver;
    use std::sync::atomic::AtomicBool;
    use std::sync::Mutex;

    struct BlankVideo {
        ready: AtomicBool,
    }

    impl VideoElement for BlankVideo {
        fn dimensions(&self) -> (u32, u32) {
            if self.ready.load(Ordering::SeqCst) {
                (8, 8)
            } else {
                (0, 0)
            }
        }

        fn draw(&self, canvas: &mut Canvas) -> Result<()> {
            canvas.draw_rgb(&[90u8; 8 * 8 * 3], 8, 8)
        }
    }

    /// Blocks every request until released, counting calls.
    struct SlowTransport {
        calls: AtomicU64,
        release: Mutex<bool>,
    }

    impl InferenceTransport for SlowTransport {
        fn name(&self) -> &'static str {
            "slow"
        }

        fn detect(&self, _request: &DetectRequest) -> Result<InferenceResult, SubmissionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            while !*self.release.lock().unwrap() {
                std::thread::sleep(Duration::from_millis(5));
            }
            Err(SubmissionError::Transport("released".into()))
        }
    }

    fn settings(ms: u64) -> SamplerSettings {
        SamplerSettings {
            interval: Duration::from_millis(ms),
            jpeg_quality: 70,
        }
    }

    #[test]
    fn rejects_zero_interval() {
        let video = Arc::new(BlankVideo {
            ready: AtomicBool::new(true),
        });
        let transport = Arc::new(SlowTransport {
            calls: AtomicU64::new(0),
            release: Mutex::new(true),
        });
        let submitter = InferenceSubmitter::new(transport, Arc::new(NullObserver));
        assert!(FrameSampler::start(video, submitter, settings(0)).is_err());
    }

    #[test]
    fn zero_width_ticks_submit_nothing() -> Result<()> {
        let video = Arc::new(BlankVideo {
            ready: AtomicBool::new(false),
        });
        let transport = Arc::new(SlowTransport {
            calls: AtomicU64::new(0),
            release: Mutex::new(true),
        });
        let submitter = InferenceSubmitter::new(transport.clone(), Arc::new(NullObserver));
        let mut sampler = FrameSampler::start(video, submitter, settings(10))?;
        std::thread::sleep(Duration::from_millis(80));
        sampler.stop();

        let stats = sampler.stats();
        assert!(stats.ticks > 0);
        assert_eq!(stats.skipped, stats.ticks);
        assert_eq!(stats.submitted, 0);
        assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
        Ok(())
    }

    #[test]
    fn slow_submissions_do_not_block_ticks() -> Result<()> {
        let video = Arc::new(BlankVideo {
            ready: AtomicBool::new(true),
        });
        let transport = Arc::new(SlowTransport {
            calls: AtomicU64::new(0),
            release: Mutex::new(false),
        });
        let submitter = InferenceSubmitter::new(transport.clone(), Arc::new(NullObserver));
        let mut sampler = FrameSampler::start(video, submitter.clone(), settings(10))?;
        std::thread::sleep(Duration::from_millis(120));
        sampler.stop();

        // Several ticks fired while every submission was still blocked.
        assert!(sampler.stats().submitted >= 3);
        assert!(submitter.stats().in_flight() >= 3);

        *transport.release.lock().unwrap() = true;
        Ok(())
    }

    #[test]
    fn no_tick_after_stop() -> Result<()> {
        let video = Arc::new(BlankVideo {
            ready: AtomicBool::new(true),
        });
        let transport = Arc::new(SlowTransport {
            calls: AtomicU64::new(0),
            release: Mutex::new(true),
        });
        let submitter = InferenceSubmitter::new(transport, Arc::new(NullObserver));
        let mut sampler = FrameSampler::start(video, submitter, settings(5))?;
        std::thread::sleep(Duration::from_millis(40));
        sampler.stop();
        assert!(!sampler.is_running());

        let ticks = sampler.stats().ticks;
        std::thread::sleep(Duration::from_millis(40));
        assert_eq!(sampler.stats().ticks, ticks);
        Ok(())
    }
}
