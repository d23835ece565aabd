use std::os::windows::process::CommandExt;
use std::process::Command;

use tracing::debug;
use windows::Win32::Foundation::{CloseHandle, HANDLE};
use windows::Win32::System::Power::{
    POWER_REQUEST_TYPE, PowerClearRequest, PowerCreateRequest, PowerSetRequest,
};
use windows::Win32::System::Threading::{
    POWER_REQUEST_CONTEXT_FLAGS, REASON_CONTEXT, REASON_CONTEXT_0,
};
use windows::core::PWSTR;

use super::{PowerBackend, PowerOptions, SleepTimeouts};
use crate::{Error, Result};

// Values from Win32 headers.
const POWER_REQUEST_CONTEXT_VERSION: u32 = 0;
const POWER_REQUEST_CONTEXT_SIMPLE_STRING: u32 = 0x0000_0001;
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

// `POWER_REQUEST_TYPE` is a C enum; in `windows` it's projected as a tuple struct.
const POWER_REQUEST_DISPLAY_REQUIRED: POWER_REQUEST_TYPE = POWER_REQUEST_TYPE(0);
const POWER_REQUEST_SYSTEM_REQUIRED: POWER_REQUEST_TYPE = POWER_REQUEST_TYPE(1);

fn os(e: windows::core::Error) -> Error {
    Error::Os(e.to_string())
}

/// Power request that keeps system and display awake while it is held.
struct PowerRequest {
    handle: HANDLE,
    // Keep the buffer alive during the `PowerCreateRequest` call.
    _reason_wide: Vec<u16>,
}

impl PowerRequest {
    fn acquire(reason: &str) -> Result<Self> {
        let mut reason_wide: Vec<u16> = reason.encode_utf16().collect();
        reason_wide.push(0);

        let ctx = REASON_CONTEXT {
            Version: POWER_REQUEST_CONTEXT_VERSION,
            Flags: POWER_REQUEST_CONTEXT_FLAGS(POWER_REQUEST_CONTEXT_SIMPLE_STRING),
            Reason: REASON_CONTEXT_0 {
                SimpleReasonString: PWSTR(reason_wide.as_mut_ptr()),
            },
        };

        let handle = unsafe { PowerCreateRequest(&ctx) }.map_err(os)?;

        // Docs recommend pairing DisplayRequired with SystemRequired.
        let set = unsafe {
            PowerSetRequest(handle, POWER_REQUEST_SYSTEM_REQUIRED)
                .and_then(|()| PowerSetRequest(handle, POWER_REQUEST_DISPLAY_REQUIRED))
        };
        if let Err(e) = set {
            unsafe {
                let _ = CloseHandle(handle);
            }
            return Err(os(e));
        }

        Ok(Self {
            handle,
            _reason_wide: reason_wide,
        })
    }

    fn release(self) -> Result<()> {
        unsafe {
            let _ = PowerClearRequest(self.handle, POWER_REQUEST_DISPLAY_REQUIRED);
            let _ = PowerClearRequest(self.handle, POWER_REQUEST_SYSTEM_REQUIRED);
            CloseHandle(self.handle).map_err(os)
        }
    }
}

/// Runs a console helper without flashing a window and returns its stdout.
fn run(program: &str, args: &[&str]) -> Result<String> {
    let output = Command::new(program)
        .args(args)
        .creation_flags(CREATE_NO_WINDOW)
        .output()?;
    if !output.status.success() {
        return Err(Error::Os(format!(
            "{program} {} failed ({}): {}",
            args.join(" "),
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

fn powershell(script: &str) -> Result<String> {
    run(
        "powershell",
        &["-NoProfile", "-NonInteractive", "-Command", script],
    )
}

/// Writes each timeout through `change` in order, stopping at the first
/// failure. Returns how many settings were written alongside the outcome.
fn apply_timeouts(
    timeouts: SleepTimeouts,
    mut change: impl FnMut(&str, u32) -> Result<()>,
) -> (usize, Result<()>) {
    let settings = [
        ("monitor-timeout-ac", timeouts.monitor_ac),
        ("monitor-timeout-dc", timeouts.monitor_dc),
        ("standby-timeout-ac", timeouts.standby_ac),
        ("standby-timeout-dc", timeouts.standby_dc),
    ];
    for (applied, (setting, minutes)) in settings.into_iter().enumerate() {
        if let Err(e) = change(setting, minutes) {
            return (applied, Err(e));
        }
    }
    (settings.len(), Ok(()))
}

fn powercfg_change(setting: &str, minutes: u32) -> Result<()> {
    run("powercfg", &["/change", setting, &minutes.to_string()]).map(|_| ())
}

/// Power request plus `powercfg` timeouts; brightness through WMI.
pub struct SystemPower {
    request: Option<PowerRequest>,
    plan_changed: bool,
    restore_timeouts: SleepTimeouts,
}

impl SystemPower {
    pub fn new(options: &PowerOptions) -> Self {
        Self {
            request: None,
            plan_changed: false,
            restore_timeouts: options.restore_timeouts,
        }
    }
}

impl PowerBackend for SystemPower {
    fn disable_sleep(&mut self, reason: &str) -> Result<()> {
        if self.request.is_none() {
            self.request = Some(PowerRequest::acquire(reason)?);
        }
        // The plan change is persistent, so any setting written must be put
        // back. The power request alone covers this process if powercfg is
        // denied.
        let zero = SleepTimeouts {
            monitor_ac: 0,
            monitor_dc: 0,
            standby_ac: 0,
            standby_dc: 0,
        };
        let (applied, result) = apply_timeouts(zero, powercfg_change);
        if applied > 0 {
            self.plan_changed = true;
        }
        if let Err(e) = result {
            debug!("powercfg failed after {applied} of 4 settings: {e}");
        }
        Ok(())
    }

    fn enable_sleep(&mut self) -> Result<()> {
        let request = self.request.take().map(PowerRequest::release);
        if self.plan_changed {
            self.plan_changed = false;
            apply_timeouts(self.restore_timeouts, powercfg_change).1?;
        }
        request.unwrap_or(Ok(()))
    }

    fn brightness(&mut self) -> Result<u8> {
        let out = powershell(
            "(Get-WmiObject -Namespace root/WMI -Class WmiMonitorBrightness).CurrentBrightness",
        )?;
        out.lines()
            .find_map(|line| line.trim().parse::<u8>().ok())
            .ok_or_else(|| Error::Unsupported("no WMI-controllable display".to_string()))
    }

    fn set_brightness(&mut self, percent: u8) -> Result<()> {
        powershell(&format!(
            "(Get-WmiObject -Namespace root/WMI -Class WmiMonitorBrightnessMethods).WmiSetBrightness(1, {percent})"
        ))
        .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_powercfg_failure_reports_what_was_written() {
        let mut written = Vec::new();
        let (applied, result) = apply_timeouts(SleepTimeouts::default(), |setting, minutes| {
            if setting == "standby-timeout-ac" {
                return Err(Error::Os("access denied".to_string()));
            }
            written.push((setting.to_string(), minutes));
            Ok(())
        });
        assert_eq!(applied, 2);
        assert!(result.is_err());
        assert_eq!(
            written,
            vec![
                ("monitor-timeout-ac".to_string(), 10),
                ("monitor-timeout-dc".to_string(), 5),
            ]
        );
    }

    #[test]
    fn nothing_written_when_first_change_fails() {
        let (applied, result) = apply_timeouts(SleepTimeouts::default(), |_, _| {
            Err(Error::Os("powercfg missing".to_string()))
        });
        assert_eq!(applied, 0);
        assert!(result.is_err());
    }

    #[test]
    fn all_four_settings_written_in_order() {
        let mut seen = Vec::new();
        let (applied, result) = apply_timeouts(SleepTimeouts::default(), |setting, _| {
            seen.push(setting.to_string());
            Ok(())
        });
        assert_eq!(applied, 4);
        assert!(result.is_ok());
        assert_eq!(seen.len(), 4);
        assert_eq!(seen[3], "standby-timeout-dc");
    }
}
