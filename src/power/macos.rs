use objc2_core_foundation::CFString;
use objc2_io_kit::{
    IOPMAssertionCreateWithName, IOPMAssertionID, IOPMAssertionRelease, kIOPMAssertionLevelOn,
    kIOReturnSuccess,
};

use super::{PowerBackend, PowerOptions};
use crate::{Error, Result};

const ASSERTION_TYPE_NO_DISPLAY_SLEEP: &str = "NoDisplaySleepAssertion";

/// IOKit power assertion. Display brightness has no public API here.
pub struct SystemPower {
    assertion: Option<IOPMAssertionID>,
}

impl SystemPower {
    pub fn new(_options: &PowerOptions) -> Self {
        Self { assertion: None }
    }
}

impl PowerBackend for SystemPower {
    fn disable_sleep(&mut self, reason: &str) -> Result<()> {
        if self.assertion.is_some() {
            return Ok(());
        }
        let assertion_type = CFString::from_static_str(ASSERTION_TYPE_NO_DISPLAY_SLEEP);
        let assertion_name = CFString::from_str(reason);

        let mut id: IOPMAssertionID = 0;
        let rc = unsafe {
            IOPMAssertionCreateWithName(
                Some(&assertion_type),
                kIOPMAssertionLevelOn,
                Some(&assertion_name),
                &mut id as *mut IOPMAssertionID,
            )
        };

        if rc != kIOReturnSuccess {
            return Err(Error::Os(format!(
                "IOPMAssertionCreateWithName failed (IOReturn={rc})"
            )));
        }
        self.assertion = Some(id);
        Ok(())
    }

    fn enable_sleep(&mut self) -> Result<()> {
        if let Some(id) = self.assertion.take() {
            let rc = IOPMAssertionRelease(id);
            if rc != kIOReturnSuccess {
                return Err(Error::Os(format!(
                    "IOPMAssertionRelease failed (IOReturn={rc})"
                )));
            }
        }
        Ok(())
    }

    fn brightness(&mut self) -> Result<u8> {
        Err(Error::Unsupported("display brightness on macOS".to_string()))
    }

    fn set_brightness(&mut self, _percent: u8) -> Result<()> {
        Err(Error::Unsupported("display brightness on macOS".to_string()))
    }
}
