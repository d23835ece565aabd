use super::{PowerBackend, PowerOptions};
use crate::{Error, Result};

fn unsupported() -> Error {
    Error::Unsupported(format!("power control on {}", std::env::consts::OS))
}

/// Fallback for targets without a power backend: every call reports
/// `Unsupported` and the controller carries on without the effect.
pub struct SystemPower;

impl SystemPower {
    pub fn new(_options: &PowerOptions) -> Self {
        Self
    }
}

impl PowerBackend for SystemPower {
    fn disable_sleep(&mut self, _reason: &str) -> Result<()> {
        Err(unsupported())
    }

    fn enable_sleep(&mut self) -> Result<()> {
        Err(unsupported())
    }

    fn brightness(&mut self) -> Result<u8> {
        Err(unsupported())
    }

    fn set_brightness(&mut self, _percent: u8) -> Result<()> {
        Err(unsupported())
    }
}
