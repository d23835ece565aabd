//! Append-only battery report file.
//!
//! Line format:
//!
//! ```text
//! HH:MM:SS - Battery: <percent>% - <Charging|Discharging>[ - Time left: <minutes> minutes]
//! HH:MM:SS - Battery: Not Available
//! ```

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::info;

use crate::Result;
use crate::battery::{BatteryReading, UNAVAILABLE};
use crate::clock::format_hms;

const REPORT_FILE_NAME: &str = "Battery Report.txt";
const FALLBACK_FILE_NAME: &str = "battery_report.txt";

/// Formats one report line (without the trailing newline).
pub fn format_line(elapsed: Duration, reading: &BatteryReading) -> String {
    let stamp = format_hms(elapsed);
    let Some(level) = reading.percent else {
        return format!("{stamp} - Battery: {UNAVAILABLE}");
    };
    let mut line = format!("{stamp} - Battery: {level}% - {}", reading.status());
    if let Some(minutes) = reading.minutes_remaining {
        line.push_str(&format!(" - Time left: {minutes:.1} minutes"));
    }
    line
}

/// `~/Desktop/Battery Report.txt` when a Desktop directory exists, else
/// `battery_report.txt` in the working directory.
pub fn default_report_path() -> PathBuf {
    let home = std::env::var_os("USERPROFILE").or_else(|| std::env::var_os("HOME"));
    if let Some(home) = home {
        let desktop = Path::new(&home).join("Desktop");
        if desktop.is_dir() {
            return desktop.join(REPORT_FILE_NAME);
        }
    }
    PathBuf::from(FALLBACK_FILE_NAME)
}

/// Appends report lines to a fixed file.
#[derive(Clone, Debug)]
pub struct ReportLogger {
    path: PathBuf,
}

impl ReportLogger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one line, creating the file if needed, and returns it.
    ///
    /// The file is opened in append mode for every call and the line is
    /// handed to the OS in a single write, so lines from concurrent writers
    /// never interleave.
    pub fn append_report(&self, elapsed: Duration, reading: &BatteryReading) -> Result<String> {
        let line = format_line(elapsed, reading);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(format!("{line}\n").as_bytes())?;
        info!("{line}");
        Ok(line)
    }
}
