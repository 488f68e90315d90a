//! leafscan - live leaf-disease scanner
//!
//! Opens the configured camera platform, picks the rear camera when there is one, samples a
//! frame every interval and posts it to the disease-detection endpoint. Results are logged as
//! they arrive. Ctrl-C stops the session and releases the camera.

use anyhow::{anyhow, Result};
use clap::Parser;
use std::sync::{mpsc, Arc};
use std::time::{Duration, Instant};

use leafscan::{
    platform, CameraSession, CatalogSummary, DeviceCatalog, HttpTransport, InferenceResult,
    InferenceSubmitter, ResultBoard, ScanConfig, ScanObserver,
};

const STATS_EVERY: Duration = Duration::from_secs(10);

#[derive(Parser, Debug)]
#[command(author, version, about = "Scan leaves for plant disease from a live camera")]
struct Args {
    /// Camera platform: stub://<name> or v4l2. Overrides the config file.
    #[arg(long)]
    source: Option<String>,

    /// Stop after this many seconds (0 runs until Ctrl-C).
    #[arg(long, default_value_t = 0)]
    seconds: u64,

    /// Switch to the next camera every N seconds.
    #[arg(long)]
    switch_every: Option<u64>,

    /// Print the video inputs and exit.
    #[arg(long)]
    list_devices: bool,
}

/// Logs results and keeps the latest one on a board.
struct ConsoleObserver {
    board: Arc<ResultBoard>,
}

impl ScanObserver for ConsoleObserver {
    fn on_devices(&self, summary: &CatalogSummary) {
        log::info!(
            "cameras: {} (selected {}: {}, switch {})",
            summary.device_count,
            summary.selected_index,
            summary.selected_label.as_deref().unwrap_or("unlabelled"),
            if summary.can_switch { "available" } else { "hidden" }
        );
        self.board.on_devices(summary);
    }

    fn on_result(&self, result: &InferenceResult) {
        let stale_before = self.board.stale();
        self.board.on_result(result);
        if self.board.stale() == stale_before {
            log::info!("result: {}", result.summary());
        }
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut config = ScanConfig::load()?;
    if let Some(source) = args.source {
        config.source = source;
    }
    let platform = platform::open(&config.source)?;

    if args.list_devices {
        let mut catalog = DeviceCatalog::new();
        catalog.enumerate(platform.as_ref())?;
        for (index, device) in catalog.devices().iter().enumerate() {
            let marker = if index == catalog.selected_index() { "*" } else { " " };
            println!("{} {} {} ({})", marker, index, device.label, device.id);
        }
        return Ok(());
    }

    let transport = HttpTransport::new(&config.inference.endpoint, config.inference.timeout)?
        .with_language(config.inference.language.clone());
    log::info!(
        "leafscan: {} -> {} every {} ms",
        config.source,
        transport.endpoint(),
        config.sampler.interval.as_millis()
    );

    let board = Arc::new(ResultBoard::new());
    let observer = Arc::new(ConsoleObserver {
        board: board.clone(),
    });
    let submitter = InferenceSubmitter::new(Arc::new(transport), observer)
        .with_crop(config.inference.crop.clone());
    let session = CameraSession::new(
        platform,
        DeviceCatalog::shared(),
        submitter,
        config.sampler,
    );
    board.attach(session.liveness());

    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })
    .map_err(|e| anyhow!("error setting Ctrl-C handler: {}", e))?;

    if let Err(err) = session.start() {
        if err.is_camera_unavailable() {
            log::error!("camera unavailable; check permissions or close other apps using it");
        }
        return Err(err.into());
    }

    let started = Instant::now();
    let deadline = (args.seconds > 0).then(|| started + Duration::from_secs(args.seconds));
    let switch_every = args.switch_every.filter(|s| *s > 0).map(Duration::from_secs);
    let mut next_switch = switch_every.map(|every| started + every);
    let mut next_stats = started + STATS_EVERY;

    loop {
        match rx.recv_timeout(Duration::from_millis(250)) {
            Ok(()) => {
                log::info!("shutdown signal received, stopping camera...");
                break;
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {}
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
        let now = Instant::now();
        if deadline.map(|d| now >= d).unwrap_or(false) {
            break;
        }
        if let (Some(due), Some(every)) = (next_switch, switch_every) {
            if now >= due {
                match session.switch_camera() {
                    Ok(true) => {}
                    Ok(false) => log::info!("only one camera; not switching"),
                    Err(err) => {
                        log::error!("camera switch failed: {}", err);
                        return Err(err.into());
                    }
                }
                next_switch = Some(now + every);
            }
        }
        if now >= next_stats {
            log_stats(&session, &board);
            next_stats = now + STATS_EVERY;
        }
    }

    session.stop();
    log_stats(&session, &board);
    Ok(())
}

fn log_stats(session: &CameraSession, board: &ResultBoard) {
    let ticks = session.sampler_probe().map(|p| p.stats()).unwrap_or_default();
    let submissions = session.submitter().stats();
    log::info!(
        "stats: ticks={} skipped={} submitted={} delivered={} dropped={} in_flight={} stale={}",
        ticks.ticks,
        ticks.skipped,
        submissions.submitted,
        submissions.delivered,
        submissions.dropped,
        submissions.in_flight(),
        board.stale()
    );
}
