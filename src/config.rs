//! Run settings, loaded from an optional TOML file.
//!
//! ```toml
//! video = "test.mp4"
//! report = "C:/Users/me/Desktop/Battery Report.txt"
//! report-interval-secs = 300
//! brightness = 80
//!
//! [power]
//! monitor-ac = 10
//! standby-dc = 15
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::app::Intervals;
use crate::power::{PowerOptions, SleepTimeouts};
use crate::report::default_report_path;
use crate::{Error, Result};

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct Config {
    /// Video to loop. Relative paths are also looked up next to the executable.
    pub video: PathBuf,
    /// Report file; see [`default_report_path`] when unset.
    pub report: Option<PathBuf>,
    pub frame_interval_ms: u64,
    pub status_interval_ms: u64,
    pub report_interval_secs: u64,
    /// Disable system sleep and screen dimming while running.
    pub keep_awake: bool,
    /// Display brightness to apply at start, restored on exit.
    pub brightness: Option<u8>,
    pub fullscreen: bool,
    /// Frames are decoded at this size and stretched to the window.
    pub decode_width: u32,
    pub decode_height: u32,
    /// Timeouts written back on exit where the power plan was changed.
    pub power: SleepTimeouts,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            video: PathBuf::from("test.mp4"),
            report: None,
            frame_interval_ms: 33,
            status_interval_ms: 1000,
            report_interval_secs: 300,
            keep_awake: true,
            brightness: None,
            fullscreen: true,
            decode_width: 1280,
            decode_height: 720,
            power: SleepTimeouts::default(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.frame_interval_ms == 0
            || self.status_interval_ms == 0
            || self.report_interval_secs == 0
        {
            return Err(Error::Config("timer intervals must be non-zero".to_string()));
        }
        if self.decode_width == 0 || self.decode_height == 0 {
            return Err(Error::Config("decode size must be non-zero".to_string()));
        }
        if let Some(percent) = self.brightness {
            if percent > 100 {
                return Err(Error::InvalidBrightness(percent));
            }
        }
        Ok(())
    }

    pub fn intervals(&self) -> Intervals {
        Intervals {
            frame: Duration::from_millis(self.frame_interval_ms),
            status: Duration::from_millis(self.status_interval_ms),
            report: Duration::from_secs(self.report_interval_secs),
        }
    }

    pub fn report_path(&self) -> PathBuf {
        self.report.clone().unwrap_or_else(default_report_path)
    }

    pub fn power_options(&self) -> PowerOptions {
        PowerOptions {
            restore_timeouts: self.power,
            ..PowerOptions::default()
        }
    }

    /// The configured video path, or the same relative path beside the
    /// executable when it is missing from the working directory.
    pub fn resolve_video(&self) -> PathBuf {
        if self.video.is_absolute() || self.video.exists() {
            return self.video.clone();
        }
        std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(|dir| dir.join(&self.video)))
            .filter(|bundled| bundled.exists())
            .unwrap_or_else(|| self.video.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        assert_eq!(Config::from_toml("").unwrap(), Config::default());
    }

    #[test]
    fn parses_kebab_case_fields() {
        let config = Config::from_toml(
            r#"
            video = "clip.mkv"
            report-interval-secs = 5
            brightness = 80
            keep-awake = false

            [power]
            monitor-ac = 20
            "#,
        )
        .unwrap();
        assert_eq!(config.video, PathBuf::from("clip.mkv"));
        assert_eq!(config.intervals().report, Duration::from_secs(5));
        assert_eq!(config.intervals().frame, Duration::from_millis(33));
        assert_eq!(config.brightness, Some(80));
        assert!(!config.keep_awake);
        assert_eq!(config.power.monitor_ac, 20);
        assert_eq!(config.power.standby_dc, 15);
    }

    #[test]
    fn rejects_bad_values() {
        assert!(matches!(
            Config::from_toml("brightness = 101"),
            Err(Error::InvalidBrightness(101))
        ));
        assert!(matches!(
            Config::from_toml("frame-interval-ms = 0"),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            Config::from_toml("video = 3"),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn unknown_keys_are_errors() {
        // Snake case is a likely typo for `report-interval-secs`.
        assert!(matches!(
            Config::from_toml("report_interval_secs = 5"),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            Config::from_toml("[power]\nmonitor_ac = 20"),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn explicit_report_path_wins() {
        let config = Config {
            report: Some(PathBuf::from("out.txt")),
            ..Config::default()
        };
        assert_eq!(config.report_path(), PathBuf::from("out.txt"));
    }

    #[test]
    fn missing_video_resolves_to_itself() {
        let config = Config {
            video: PathBuf::from("no-such-video-anywhere.mp4"),
            ..Config::default()
        };
        assert_eq!(config.resolve_video(), config.video);
    }
}
