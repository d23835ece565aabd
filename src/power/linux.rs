use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;
use zbus::blocking::{Connection, Proxy};
use zbus::zvariant::{OwnedFd, OwnedObjectPath, OwnedValue, Str};

use super::{PowerBackend, PowerOptions};
use crate::{Error, Result};

const GNOME_INHIBIT_IDLE: u32 = 8;
const PORTAL_INHIBIT_IDLE: u32 = 8;
const BACKLIGHT_ROOT: &str = "/sys/class/backlight";

fn dbus(e: zbus::Error) -> Error {
    Error::Dbus(e.to_string())
}

enum Inhibitor {
    // Session bus APIs (cookie + same connection must remain alive)
    GnomeSession {
        conn: Connection,
        cookie: u32,
    },
    FdoScreenSaver {
        conn: Connection,
        cookie: u32,
    },
    FdoPowerManagement {
        conn: Connection,
        cookie: u32,
    },
    XdgPortal {
        conn: Connection,
        handle: OwnedObjectPath,
    },

    // System bus (fd must remain open)
    Logind {
        _conn: Connection,
        _fd: OwnedFd,
    },
}

impl Inhibitor {
    fn acquire(application_id: &str, reason: &str) -> Result<Self> {
        // Prefer session-bus mechanisms when available.
        if let Ok(conn) = Connection::session() {
            if let Ok(cookie) = try_gnome_session(&conn, application_id, reason) {
                return Ok(Self::GnomeSession { conn, cookie });
            }
            if let Ok(cookie) = try_fdo_screensaver(&conn, application_id, reason) {
                return Ok(Self::FdoScreenSaver { conn, cookie });
            }
            if let Ok(cookie) = try_fdo_powermanagement(&conn, application_id, reason) {
                return Ok(Self::FdoPowerManagement { conn, cookie });
            }
            if let Ok(handle) = try_xdg_portal(&conn, reason) {
                return Ok(Self::XdgPortal { conn, handle });
            }
        }

        // Fallback: systemd-logind idle inhibitor (system bus).
        if let Ok((conn, fd)) = try_logind(application_id, reason) {
            return Ok(Self::Logind {
                _conn: conn,
                _fd: fd,
            });
        }

        Err(Error::Unsupported(
            "no suitable Linux inhibition backend found".to_string(),
        ))
    }

    fn name(&self) -> &'static str {
        match self {
            Self::GnomeSession { .. } => "org.gnome.SessionManager",
            Self::FdoScreenSaver { .. } => "org.freedesktop.ScreenSaver",
            Self::FdoPowerManagement { .. } => "org.freedesktop.PowerManagement",
            Self::XdgPortal { .. } => "org.freedesktop.portal.Inhibit",
            Self::Logind { .. } => "org.freedesktop.login1",
        }
    }

    fn release(self) -> Result<()> {
        match self {
            Self::GnomeSession { conn, cookie } => uninhibit(
                &conn,
                "org.gnome.SessionManager",
                "/org/gnome/SessionManager",
                "org.gnome.SessionManager",
                "Uninhibit",
                cookie,
            ),
            Self::FdoScreenSaver { conn, cookie } => uninhibit(
                &conn,
                "org.freedesktop.ScreenSaver",
                "/org/freedesktop/ScreenSaver",
                "org.freedesktop.ScreenSaver",
                "UnInhibit",
                cookie,
            ),
            Self::FdoPowerManagement { conn, cookie } => uninhibit(
                &conn,
                "org.freedesktop.PowerManagement",
                "/org/freedesktop/PowerManagement/Inhibit",
                "org.freedesktop.PowerManagement.Inhibit",
                "UnInhibit",
                cookie,
            ),
            Self::XdgPortal { conn, handle } => {
                // Released by closing the request object the portal returned.
                let proxy = Proxy::new(
                    &conn,
                    "org.freedesktop.portal.Desktop",
                    handle,
                    "org.freedesktop.portal.Request",
                )
                .map_err(dbus)?;
                proxy.call::<_, _, ()>("Close", &()).map_err(dbus)
            }
            // The inhibitor is released when the fd is closed (dropped).
            Self::Logind { .. } => Ok(()),
        }
    }
}

fn uninhibit(
    conn: &Connection,
    destination: &str,
    path: &str,
    interface: &str,
    method: &str,
    cookie: u32,
) -> Result<()> {
    let proxy = Proxy::new(conn, destination, path, interface).map_err(dbus)?;
    proxy.call::<_, _, ()>(method, &(cookie)).map_err(dbus)
}

fn try_gnome_session(conn: &Connection, application_id: &str, reason: &str) -> zbus::Result<u32> {
    let proxy = Proxy::new(
        conn,
        "org.gnome.SessionManager",
        "/org/gnome/SessionManager",
        "org.gnome.SessionManager",
    )?;
    proxy.call(
        "Inhibit",
        &(application_id, 0u32, reason, GNOME_INHIBIT_IDLE),
    )
}

fn try_fdo_screensaver(conn: &Connection, application_id: &str, reason: &str) -> zbus::Result<u32> {
    let proxy = Proxy::new(
        conn,
        "org.freedesktop.ScreenSaver",
        "/org/freedesktop/ScreenSaver",
        "org.freedesktop.ScreenSaver",
    )?;
    proxy.call("Inhibit", &(application_id, reason))
}

fn try_fdo_powermanagement(
    conn: &Connection,
    application_id: &str,
    reason: &str,
) -> zbus::Result<u32> {
    let proxy = Proxy::new(
        conn,
        "org.freedesktop.PowerManagement",
        "/org/freedesktop/PowerManagement/Inhibit",
        "org.freedesktop.PowerManagement.Inhibit",
    )?;
    proxy.call("Inhibit", &(application_id, reason))
}

fn try_xdg_portal(conn: &Connection, reason: &str) -> zbus::Result<OwnedObjectPath> {
    let proxy = Proxy::new(
        conn,
        "org.freedesktop.portal.Desktop",
        "/org/freedesktop/portal/desktop",
        "org.freedesktop.portal.Inhibit",
    )?;

    let mut options: BTreeMap<String, OwnedValue> = BTreeMap::new();
    options.insert("reason".to_string(), OwnedValue::from(Str::from(reason)));

    proxy.call("Inhibit", &("", PORTAL_INHIBIT_IDLE, options))
}

fn try_logind(application_id: &str, reason: &str) -> zbus::Result<(Connection, OwnedFd)> {
    let conn = Connection::system()?;
    let proxy = Proxy::new(
        &conn,
        "org.freedesktop.login1",
        "/org/freedesktop/login1",
        "org.freedesktop.login1.Manager",
    )?;

    // what: "idle" (inhibit idle actions), mode: "block".
    let fd: OwnedFd = proxy.call("Inhibit", &("idle", application_id, reason, "block"))?;
    Ok((conn, fd))
}

/// A `/sys/class/backlight` device.
struct Backlight {
    name: String,
    dir: PathBuf,
}

impl Backlight {
    fn first() -> Result<Self> {
        let mut names: Vec<String> = fs::read_dir(BACKLIGHT_ROOT)
            .map_err(|e| Error::Unsupported(format!("{BACKLIGHT_ROOT}: {e}")))?
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| entry.file_name().into_string().ok())
            .collect();
        names.sort();
        let name = names
            .into_iter()
            .next()
            .ok_or_else(|| Error::Unsupported("no backlight device".to_string()))?;
        let dir = Path::new(BACKLIGHT_ROOT).join(&name);
        Ok(Self { name, dir })
    }

    fn read(&self, file: &str) -> Result<u32> {
        let text = fs::read_to_string(self.dir.join(file))?;
        text.trim()
            .parse()
            .map_err(|e| Error::Os(format!("{}/{file}: {e}", self.dir.display())))
    }
}

fn raw_to_percent(raw: u32, max: u32) -> u8 {
    if max == 0 {
        return 0;
    }
    ((u64::from(raw.min(max)) * 100 + u64::from(max) / 2) / u64::from(max)) as u8
}

fn percent_to_raw(percent: u8, max: u32) -> u32 {
    ((u64::from(percent.min(100)) * u64::from(max) + 50) / 100) as u32
}

/// D-Bus idle inhibitor plus logind backlight control.
pub struct SystemPower {
    application_id: String,
    inhibitor: Option<Inhibitor>,
}

impl SystemPower {
    pub fn new(options: &PowerOptions) -> Self {
        Self {
            application_id: options.application_id.clone(),
            inhibitor: None,
        }
    }
}

impl PowerBackend for SystemPower {
    fn disable_sleep(&mut self, reason: &str) -> Result<()> {
        if self.inhibitor.is_none() {
            let inhibitor = Inhibitor::acquire(&self.application_id, reason)?;
            debug!("Idle inhibited through {}", inhibitor.name());
            self.inhibitor = Some(inhibitor);
        }
        Ok(())
    }

    fn enable_sleep(&mut self) -> Result<()> {
        match self.inhibitor.take() {
            Some(inhibitor) => inhibitor.release(),
            None => Ok(()),
        }
    }

    fn brightness(&mut self) -> Result<u8> {
        let device = Backlight::first()?;
        let max = device.read("max_brightness")?;
        let raw = device.read("brightness")?;
        Ok(raw_to_percent(raw, max))
    }

    fn set_brightness(&mut self, percent: u8) -> Result<()> {
        let device = Backlight::first()?;
        let value = percent_to_raw(percent, device.read("max_brightness")?);

        // Unprivileged writes go through logind rather than sysfs.
        let conn = Connection::system().map_err(dbus)?;
        let proxy = Proxy::new(
            &conn,
            "org.freedesktop.login1",
            "/org/freedesktop/login1/session/auto",
            "org.freedesktop.login1.Session",
        )
        .map_err(dbus)?;
        proxy
            .call::<_, _, ()>("SetBrightness", &("backlight", device.name.as_str(), value))
            .map_err(dbus)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_between_raw_and_percent() {
        assert_eq!(raw_to_percent(0, 255), 0);
        assert_eq!(raw_to_percent(255, 255), 100);
        assert_eq!(raw_to_percent(128, 255), 50);
        assert_eq!(raw_to_percent(10, 0), 0);
        assert_eq!(percent_to_raw(100, 96_000), 96_000);
        assert_eq!(percent_to_raw(50, 255), 128);
        assert_eq!(percent_to_raw(0, 255), 0);
    }

    #[test]
    fn percent_survives_a_round_trip() {
        for percent in 0..=100u8 {
            assert_eq!(raw_to_percent(percent_to_raw(percent, 19_393), 19_393), percent);
        }
    }
}
