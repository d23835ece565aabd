//! Composition root: one owned state struct driven by three periodic timers.
//!
//! [`App`] knows nothing about the window system. The event loop calls
//! [`App::tick`] with the current time, sleeps until [`App::next_deadline`]
//! and hands a pixel buffer to [`App::render`] when a redraw is needed.

use std::time::{Duration, Instant};

use tracing::{error, info};

use crate::Result;
use crate::battery::{BatteryReader, BatteryReading, SystemBattery};
use crate::clock::{ElapsedTimer, format_hms};
use crate::overlay::{self, Canvas, Layout};
use crate::power::{PowerBackend, PowerController, SystemPower};
use crate::report::ReportLogger;
use crate::video::{FfmpegSource, Frame, FrameSource, VideoPlayer};

/// Periods of the three timers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Intervals {
    pub frame: Duration,
    pub status: Duration,
    pub report: Duration,
}

impl Default for Intervals {
    fn default() -> Self {
        Self {
            frame: Duration::from_millis(33),
            status: Duration::from_secs(1),
            report: Duration::from_secs(300),
        }
    }
}

/// Fixed-period timer polled with the current time.
#[derive(Clone, Copy, Debug)]
pub struct Ticker {
    period: Duration,
    next: Instant,
}

impl Ticker {
    /// First fire is one period after `start`.
    pub fn new(period: Duration, start: Instant) -> Self {
        Self {
            period,
            next: start + period,
        }
    }

    /// Fires at most once per call. Missed periods are skipped rather than
    /// replayed in a burst.
    pub fn fire(&mut self, now: Instant) -> bool {
        if now < self.next {
            return false;
        }
        self.next += self.period;
        if self.next <= now {
            self.next = now + self.period;
        }
        true
    }

    pub fn deadline(&self) -> Instant {
        self.next
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AppState {
    Running,
    Closed,
}

/// Which timers fired during one [`App::tick`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TickOutcome {
    pub frame: bool,
    pub status: bool,
    pub report: bool,
}

impl TickOutcome {
    pub fn needs_redraw(&self) -> bool {
        self.frame || self.status
    }
}

pub struct App<
    S: FrameSource = FfmpegSource,
    B: BatteryReader = SystemBattery,
    P: PowerBackend = SystemPower,
> {
    clock: ElapsedTimer,
    player: Option<VideoPlayer<S>>,
    battery: B,
    reading: BatteryReading,
    logger: ReportLogger,
    power: PowerController<P>,
    frame_timer: Ticker,
    status_timer: Ticker,
    report_timer: Ticker,
    layout: Layout,
    state: AppState,
    reports_written: u64,
    blank: Frame,
}

impl<S: FrameSource, B: BatteryReader, P: PowerBackend> App<S, B, P> {
    /// Starts the stopwatch and all three timers at `now`.
    pub fn new(
        player: VideoPlayer<S>,
        mut battery: B,
        logger: ReportLogger,
        power: PowerController<P>,
        intervals: Intervals,
        now: Instant,
    ) -> Self {
        let reading = battery.poll();
        let mut app = Self {
            clock: ElapsedTimer::started_at(now),
            player: Some(player),
            battery,
            reading,
            logger,
            power,
            frame_timer: Ticker::new(intervals.frame, now),
            status_timer: Ticker::new(intervals.status, now),
            report_timer: Ticker::new(intervals.report, now),
            layout: Layout::for_window(0, 0),
            state: AppState::Running,
            reports_written: 0,
            blank: Frame::new(0, 0),
        };
        app.on_frame_tick();
        app
    }

    /// Disables OS sleep for the rest of the run; see [`PowerController`].
    pub fn disable_sleep(&mut self) -> bool {
        self.power.disable_sleep()
    }

    pub fn set_brightness(&mut self, percent: u8) -> Result<()> {
        self.power.set_brightness(percent)
    }

    /// Runs every timer that is due at `now`.
    pub fn tick(&mut self, now: Instant) -> TickOutcome {
        let mut outcome = TickOutcome::default();
        if self.state == AppState::Closed {
            return outcome;
        }
        if self.frame_timer.fire(now) {
            self.on_frame_tick();
            outcome.frame = true;
        }
        if self.status_timer.fire(now) {
            self.on_status_tick();
            outcome.status = true;
        }
        if self.report_timer.fire(now) {
            self.on_report_tick(now);
            outcome.report = true;
        }
        outcome
    }

    fn on_frame_tick(&mut self) {
        if let Some(player) = self.player.as_mut() {
            if let Err(e) = player.next_frame() {
                error!("Failed to decode frame: {e}");
            }
        }
    }

    fn on_status_tick(&mut self) {
        self.reading = self.battery.poll();
    }

    fn on_report_tick(&mut self, now: Instant) {
        self.reading = self.battery.poll();
        match self
            .logger
            .append_report(self.clock.elapsed_at(now), &self.reading)
        {
            Ok(_) => self.reports_written += 1,
            Err(e) => error!(
                "Failed to append to {}: {e}",
                self.logger.path().display()
            ),
        }
    }

    /// Earliest instant at which a timer is due; `None` once closed.
    pub fn next_deadline(&self) -> Option<Instant> {
        if self.state == AppState::Closed {
            return None;
        }
        [&self.frame_timer, &self.status_timer, &self.report_timer]
            .into_iter()
            .map(Ticker::deadline)
            .min()
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.layout = Layout::for_window(width, height);
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Whether a click at window coordinates hits the exit control.
    pub fn hits_exit(&self, x: f64, y: f64) -> bool {
        self.layout.exit_button.contains(x, y)
    }

    pub fn timer_text(&self, now: Instant) -> String {
        format!("Time: {}", format_hms(self.clock.elapsed_at(now)))
    }

    pub fn battery_text(&self) -> String {
        self.reading.label()
    }

    pub fn last_reading(&self) -> BatteryReading {
        self.reading
    }

    pub fn current_frame(&self) -> &Frame {
        self.player
            .as_ref()
            .map_or(&self.blank, |player| player.current_frame())
    }

    pub fn player(&self) -> Option<&VideoPlayer<S>> {
        self.player.as_ref()
    }

    /// Paints the window into `pixels` (`width * height` words, `0x00RRGGBB`).
    pub fn render(&self, pixels: &mut [u32], width: u32, height: u32, now: Instant) {
        let layout = Layout::for_window(width, height);
        let mut canvas = Canvas::new(pixels, width, height);
        overlay::render(
            &mut canvas,
            self.current_frame(),
            &layout,
            &self.timer_text(now),
            &self.battery_text(),
        );
    }

    /// Stops the timers, releases the decoder and restores power settings.
    /// Safe to call more than once.
    pub fn close(&mut self) {
        if self.state == AppState::Closed {
            return;
        }
        self.state = AppState::Closed;
        self.player = None;
        self.power.restore();
        info!(
            "Closed after {} ({} reports written)",
            format_hms(self.clock.elapsed()),
            self.reports_written
        );
    }

    pub fn state(&self) -> AppState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == AppState::Running
    }

    pub fn reports_written(&self) -> u64 {
        self.reports_written
    }

    pub fn power(&self) -> &PowerController<P> {
        &self.power
    }

    pub fn logger(&self) -> &ReportLogger {
        &self.logger
    }
}
