//! battery-drain-test: keep the screen awake, loop a video and log battery drain.
//!
//! The pieces are usable on their own:
//! ```no_run
//! use battery_drain_test::{BatteryReader, ElapsedTimer, ReportLogger, SystemBattery};
//!
//! let clock = ElapsedTimer::start();
//! let mut battery = SystemBattery::new();
//! let logger = ReportLogger::new("Battery Report.txt");
//! logger.append_report(clock.elapsed(), &battery.poll())?;
//! # Ok::<(), battery_drain_test::Error>(())
//! ```
//!
//! [`App`] ties them together behind three periodic timers and [`window`] puts
//! it on screen.

use std::path::PathBuf;

pub mod app;
pub mod battery;
pub mod clock;
pub mod config;
pub mod overlay;
pub mod power;
pub mod report;
pub mod video;
pub mod window;

pub use app::{App, AppState, TickOutcome};
pub use battery::{BatteryReader, BatteryReading, SystemBattery};
pub use clock::ElapsedTimer;
pub use config::Config;
pub use power::{PowerBackend, PowerController, SystemPower};
pub use report::ReportLogger;
pub use video::{FfmpegSource, Frame, FrameSource, VideoPlayer};

/// Error type shared by every component.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Generic OS error (e.g. Win32 GetLastError, a failed helper command).
    #[error("OS error: {0}")]
    Os(String),
    /// D-Bus error (Linux).
    #[error("D-Bus error: {0}")]
    Dbus(String),
    /// Not supported in the current environment.
    #[error("Unsupported: {0}")]
    Unsupported(String),
    /// Brightness outside 0..=100.
    #[error("brightness {0}% is out of range (0-100)")]
    InvalidBrightness(u8),
    /// The video file does not exist.
    #[error("video file not found: {}", .0.display())]
    VideoNotFound(PathBuf),
    /// The video file exists but no frame could be decoded from it.
    #[error("cannot decode video {}: {reason}", path.display())]
    VideoUnreadable { path: PathBuf, reason: String },
    /// The decoder failed after the video was opened.
    #[error("decoder error: {0}")]
    Decoder(String),
    /// Invalid configuration value or file.
    #[error("config error: {0}")]
    Config(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
