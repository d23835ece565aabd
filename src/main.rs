use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use anyhow::{Context, Result};
use battery_drain_test::window::{self, WindowOptions};
use battery_drain_test::{
    App, Config, Error, PowerController, ReportLogger, SystemBattery, SystemPower, VideoPlayer,
};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(version, about = "Loop a video full-screen, keep the display awake and log battery drain")]
struct Args {
    /// TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Video file to loop.
    #[arg(long)]
    video: Option<PathBuf>,

    /// File the battery report lines are appended to.
    #[arg(long)]
    report: Option<PathBuf>,

    /// Seconds between report lines.
    #[arg(long)]
    report_interval_secs: Option<u64>,

    /// Milliseconds between battery label refreshes.
    #[arg(long)]
    status_interval_ms: Option<u64>,

    /// Milliseconds between video frames.
    #[arg(long)]
    frame_interval_ms: Option<u64>,

    /// Display brightness (0-100) to hold during the test.
    #[arg(long)]
    brightness: Option<u8>,

    /// Leave the OS sleep settings alone.
    #[arg(long)]
    no_keep_awake: bool,

    /// Run in a normal window instead of full-screen.
    #[arg(long)]
    windowed: bool,

    /// Width frames are decoded at before stretching.
    #[arg(long)]
    decode_width: Option<u32>,

    /// Height frames are decoded at before stretching.
    #[arg(long)]
    decode_height: Option<u32>,

    /// Logging level (error|warn|info|debug|trace).
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Args {
    fn into_config(self) -> Result<Config> {
        let mut config = match self.config.as_deref() {
            Some(path) => Config::load(path)
                .with_context(|| format!("failed to load configuration from {}", path.display()))?,
            None => Config::default(),
        };

        if let Some(video) = self.video {
            config.video = video;
        }
        if let Some(report) = self.report {
            config.report = Some(report);
        }
        if let Some(secs) = self.report_interval_secs {
            config.report_interval_secs = secs;
        }
        if let Some(ms) = self.status_interval_ms {
            config.status_interval_ms = ms;
        }
        if let Some(ms) = self.frame_interval_ms {
            config.frame_interval_ms = ms;
        }
        if self.brightness.is_some() {
            config.brightness = self.brightness;
        }
        if self.no_keep_awake {
            config.keep_awake = false;
        }
        if self.windowed {
            config.fullscreen = false;
        }
        if let Some(width) = self.decode_width {
            config.decode_width = width;
        }
        if let Some(height) = self.decode_height {
            config.decode_height = height;
        }

        config.validate().context("invalid configuration")?;
        Ok(config)
    }
}

fn init_tracing(level: &str) -> Result<()> {
    let filter = match std::env::var("RUST_LOG") {
        Ok(env) if !env.is_empty() => EnvFilter::builder()
            .parse(&env)
            .with_context(|| format!("invalid RUST_LOG '{env}'"))?,
        _ => EnvFilter::builder()
            .parse(level)
            .with_context(|| format!("invalid log level '{level}'"))?,
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
    Ok(())
}

fn run(args: Args) -> Result<()> {
    init_tracing(&args.log_level)?;
    let config = args.into_config()?;

    // Nothing is shown and nothing is changed on the host until the video opens.
    let video = config.resolve_video();
    let player = VideoPlayer::open(&video, config.decode_width, config.decode_height)
        .with_context(|| format!("error opening video stream or file {}", video.display()))?;

    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&shutdown);
    ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        flag.store(true, Ordering::SeqCst);
    })
    .context("failed to install Ctrl-C handler")?;

    let report = ReportLogger::new(config.report_path());
    info!("Writing battery report to {}", report.path().display());

    let power = PowerController::new(
        SystemPower::new(&config.power_options()),
        "Battery duration test",
    );
    let mut app = App::new(
        player,
        SystemBattery::new(),
        report,
        power,
        config.intervals(),
        Instant::now(),
    );

    if config.keep_awake {
        app.disable_sleep();
    }
    if let Some(percent) = config.brightness {
        if let Err(e) = app.set_brightness(percent) {
            warn!("{e}");
        }
    }

    window::run(
        app,
        WindowOptions {
            fullscreen: config.fullscreen,
            ..WindowOptions::default()
        },
        shutdown,
    )?;
    info!("Done");
    Ok(())
}

fn main() -> ExitCode {
    match run(Args::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            let video_failed = e.chain().any(|cause| {
                matches!(
                    cause.downcast_ref::<Error>(),
                    Some(Error::VideoNotFound(_) | Error::VideoUnreadable { .. })
                )
            });
            if video_failed {
                ExitCode::from(2)
            } else {
                ExitCode::FAILURE
            }
        }
    }
}
