//! Sleep inhibition and display brightness.
//!
//! [`PowerController`] is the only thing the rest of the crate talks to. It
//! validates input, remembers what it changed and puts it back on
//! [`PowerController::restore`] or on drop. The OS work happens in a
//! [`PowerBackend`]; [`SystemPower`] is the one for the current target.

use cfg_if::cfg_if;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::{Error, Result};

cfg_if! {
    if #[cfg(target_os = "windows")] {
        mod windows;
        pub use self::windows::SystemPower;
    } else if #[cfg(target_os = "macos")] {
        mod macos;
        pub use self::macos::SystemPower;
    } else if #[cfg(target_os = "linux")] {
        mod linux;
        pub use self::linux::SystemPower;
    } else {
        mod unsupported;
        pub use self::unsupported::SystemPower;
    }
}

/// Timeouts (minutes) written back when sleep is re-enabled on platforms that
/// change the power plan itself.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct SleepTimeouts {
    pub monitor_ac: u32,
    pub monitor_dc: u32,
    pub standby_ac: u32,
    pub standby_dc: u32,
}

impl Default for SleepTimeouts {
    fn default() -> Self {
        // Stock Windows "Balanced" plan.
        Self {
            monitor_ac: 10,
            monitor_dc: 5,
            standby_ac: 30,
            standby_dc: 15,
        }
    }
}

/// Options handed to [`SystemPower::new`].
#[derive(Clone, Debug)]
pub struct PowerOptions {
    /// App id (often reverse-DNS) used by D-Bus inhibitors.
    pub application_id: String,
    pub restore_timeouts: SleepTimeouts,
}

impl Default for PowerOptions {
    fn default() -> Self {
        Self {
            application_id: "battery_drain_test".to_string(),
            restore_timeouts: SleepTimeouts::default(),
        }
    }
}

/// OS-facing half of the controller.
pub trait PowerBackend {
    /// Keep the system and the display awake.
    fn disable_sleep(&mut self, reason: &str) -> Result<()>;
    /// Undo [`PowerBackend::disable_sleep`].
    fn enable_sleep(&mut self) -> Result<()>;
    /// Current display brightness in percent.
    fn brightness(&mut self) -> Result<u8>;
    /// `percent` is already validated to be within 0..=100.
    fn set_brightness(&mut self, percent: u8) -> Result<()>;
}

/// Applies and reverts sleep/brightness changes.
///
/// Platform failures are logged and swallowed; only invalid input is an
/// error. Whatever was changed is reverted exactly once, either by
/// [`PowerController::restore`] or when the controller is dropped.
pub struct PowerController<B: PowerBackend = SystemPower> {
    backend: B,
    reason: String,
    sleep_disabled: bool,
    saved_brightness: Option<u8>,
}

impl<B: PowerBackend> PowerController<B> {
    pub fn new(backend: B, reason: impl Into<String>) -> Self {
        Self {
            backend,
            reason: reason.into(),
            sleep_disabled: false,
            saved_brightness: None,
        }
    }

    /// Returns whether sleep is now disabled.
    pub fn disable_sleep(&mut self) -> bool {
        if self.sleep_disabled {
            return true;
        }
        match self.backend.disable_sleep(&self.reason) {
            Ok(()) => {
                info!("Sleep and screen dimming disabled");
                self.sleep_disabled = true;
            }
            Err(e) => warn!("Cannot disable sleep, continuing without it: {e}"),
        }
        self.sleep_disabled
    }

    /// Re-enables sleep if this controller disabled it; otherwise a no-op.
    pub fn enable_sleep(&mut self) {
        if !self.sleep_disabled {
            return;
        }
        self.sleep_disabled = false;
        match self.backend.enable_sleep() {
            Ok(()) => info!("Sleep settings restored"),
            Err(e) => warn!("Failed to restore sleep settings: {e}"),
        }
    }

    /// Sets the display brightness, remembering the previous level for
    /// [`PowerController::restore`].
    pub fn set_brightness(&mut self, percent: u8) -> Result<()> {
        if percent > 100 {
            return Err(Error::InvalidBrightness(percent));
        }

        let previous = match self.backend.brightness() {
            Ok(level) => Some(level),
            Err(e) => {
                debug!("Current brightness unknown: {e}");
                None
            }
        };

        match self.backend.set_brightness(percent) {
            Ok(()) => {
                info!("Display brightness set to {percent}%");
                if self.saved_brightness.is_none() {
                    self.saved_brightness = previous;
                }
            }
            Err(e) => warn!("Cannot set brightness, continuing without it: {e}"),
        }
        Ok(())
    }

    /// Reverts every change made through this controller.
    pub fn restore(&mut self) {
        self.enable_sleep();
        if let Some(level) = self.saved_brightness.take() {
            match self.backend.set_brightness(level) {
                Ok(()) => info!("Display brightness restored to {level}%"),
                Err(e) => warn!("Failed to restore brightness: {e}"),
            }
        }
    }

    pub fn is_sleep_disabled(&self) -> bool {
        self.sleep_disabled
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }
}

impl<B: PowerBackend> Drop for PowerController<B> {
    fn drop(&mut self) {
        self.restore();
    }
}
