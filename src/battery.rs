//! Battery status polling using starship-battery.

use std::fmt;

use starship_battery::units::{ratio, time};
use starship_battery::{Manager, State};
use tracing::{debug, warn};

/// Text shown in place of the percentage when no battery is reported.
pub const UNAVAILABLE: &str = "Not Available";

/// One battery poll.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BatteryReading {
    /// Charge level 0-100, `None` when the OS reports no battery.
    pub percent: Option<u8>,
    /// On external power; reported as "Charging" even when full.
    pub charging: bool,
    /// OS estimate for the current state (until full while charging, until
    /// empty while discharging).
    pub minutes_remaining: Option<f32>,
}

impl BatteryReading {
    /// Sentinel for machines without a battery (or a failing battery API).
    pub const UNAVAILABLE: Self = Self {
        percent: None,
        charging: false,
        minutes_remaining: None,
    };

    pub fn new(percent: u8, charging: bool) -> Self {
        Self {
            percent: Some(percent.min(100)),
            charging,
            minutes_remaining: None,
        }
    }

    pub fn with_minutes_remaining(mut self, minutes: f32) -> Self {
        self.minutes_remaining = Some(minutes);
        self
    }

    pub fn is_available(&self) -> bool {
        self.percent.is_some()
    }

    pub fn status(&self) -> &'static str {
        match (self.percent, self.charging) {
            (None, _) => UNAVAILABLE,
            (Some(_), true) => "Charging",
            (Some(_), false) => "Discharging",
        }
    }

    /// Overlay label text, e.g. `Battery: 80% - Discharging`.
    pub fn label(&self) -> String {
        self.to_string()
    }
}

impl Default for BatteryReading {
    fn default() -> Self {
        Self::UNAVAILABLE
    }
}

impl fmt::Display for BatteryReading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.percent {
            Some(level) => write!(f, "Battery: {level}% - {}", self.status()),
            None => write!(f, "Battery: {UNAVAILABLE}"),
        }
    }
}

/// Source of battery readings. Never fails: problems become the sentinel.
pub trait BatteryReader {
    fn poll(&mut self) -> BatteryReading;
}

/// Whether the machine is on AC power. A full battery, or one held at a
/// charge threshold (`Unknown`), is plugged in even though it is not charging.
fn is_plugged(state: State) -> bool {
    !matches!(state, State::Discharging | State::Empty)
}

/// Reads the first battery the OS exposes.
pub struct SystemBattery {
    manager: Option<Manager>,
}

impl SystemBattery {
    pub fn new() -> Self {
        let manager = match Manager::new() {
            Ok(m) => Some(m),
            Err(e) => {
                warn!("Failed to create battery manager: {}", e);
                None
            }
        };
        Self { manager }
    }
}

impl Default for SystemBattery {
    fn default() -> Self {
        Self::new()
    }
}

impl BatteryReader for SystemBattery {
    fn poll(&mut self) -> BatteryReading {
        let Some(manager) = self.manager.as_ref() else {
            return BatteryReading::UNAVAILABLE;
        };

        let battery = match manager.batteries() {
            Ok(mut batteries) => match batteries.next() {
                Some(Ok(b)) => b,
                Some(Err(e)) => {
                    warn!("Failed to read battery: {}", e);
                    return BatteryReading::UNAVAILABLE;
                }
                None => {
                    debug!("No batteries found");
                    return BatteryReading::UNAVAILABLE;
                }
            },
            Err(e) => {
                warn!("Failed to enumerate batteries: {}", e);
                return BatteryReading::UNAVAILABLE;
            }
        };

        let level = battery
            .state_of_charge()
            .get::<ratio::percent>()
            .round()
            .clamp(0.0, 100.0) as u8;
        let state = battery.state();
        let charging = is_plugged(state);
        let remaining = if charging {
            battery.time_to_full()
        } else {
            battery.time_to_empty()
        };

        let mut reading = BatteryReading::new(level, charging);
        if let Some(left) = remaining {
            reading = reading.with_minutes_remaining(left.get::<time::minute>());
        }
        debug!(
            "Battery state: level={}%, state={:?}, on_ac={}",
            level, state, charging
        );
        reading
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_shows_percent_and_status() {
        assert_eq!(
            BatteryReading::new(80, false).label(),
            "Battery: 80% - Discharging"
        );
        assert_eq!(BatteryReading::new(100, true).label(), "Battery: 100% - Charging");
    }

    #[test]
    fn unavailable_uses_sentinel() {
        let reading = BatteryReading::UNAVAILABLE;
        assert!(!reading.is_available());
        assert_eq!(reading.status(), UNAVAILABLE);
        assert_eq!(reading.label(), "Battery: Not Available");
    }

    #[test]
    fn only_draining_states_count_as_unplugged() {
        for (state, plugged) in [
            (State::Charging, true),
            (State::Full, true),
            (State::Unknown, true),
            (State::Discharging, false),
            (State::Empty, false),
        ] {
            assert_eq!(is_plugged(state), plugged, "{state:?}");
        }
    }

    #[test]
    fn percent_is_clamped() {
        assert_eq!(BatteryReading::new(130, false).percent, Some(100));
    }

    #[test]
    fn system_poll_does_not_panic() {
        // Either a real reading or the sentinel, depending on the host.
        let reading = SystemBattery::new().poll();
        if let Some(level) = reading.percent {
            assert!(level <= 100);
        }
    }
}
