use std::cell::Cell;
use std::rc::Rc;
use std::time::{Duration, Instant};

use battery_drain_test::app::Intervals;
use battery_drain_test::clock::parse_hms;
use battery_drain_test::{
    App, BatteryReader, BatteryReading, FrameSource, PowerBackend, PowerController, ReportLogger,
    Result, VideoPlayer,
};
use tempfile::TempDir;

const FPS: u32 = 30;

/// Ten seconds of 4x4 video; frame `i` has red channel `i % 256`.
struct TenSecondClip {
    pos: u32,
    rewinds: Rc<Cell<u32>>,
}

impl FrameSource for TenSecondClip {
    fn dimensions(&self) -> (u32, u32) {
        (4, 4)
    }

    fn read_frame(&mut self, rgb: &mut [u8]) -> Result<bool> {
        if self.pos == 10 * FPS {
            return Ok(false);
        }
        for chunk in rgb.chunks_exact_mut(3) {
            chunk.copy_from_slice(&[(self.pos % 256) as u8, 0, 0]);
        }
        self.pos += 1;
        Ok(true)
    }

    fn rewind(&mut self) -> Result<()> {
        self.pos = 0;
        self.rewinds.set(self.rewinds.get() + 1);
        Ok(())
    }
}

/// Discharging battery whose level the test controls.
struct Gauge(Rc<Cell<u8>>);

impl BatteryReader for Gauge {
    fn poll(&mut self) -> BatteryReading {
        BatteryReading::new(self.0.get(), false)
    }
}

#[derive(Default)]
struct Calls {
    disable: Cell<u32>,
    enable: Cell<u32>,
}

struct FakePower(Rc<Calls>);

impl PowerBackend for FakePower {
    fn disable_sleep(&mut self, _reason: &str) -> Result<()> {
        self.0.disable.set(self.0.disable.get() + 1);
        Ok(())
    }

    fn enable_sleep(&mut self) -> Result<()> {
        self.0.enable.set(self.0.enable.get() + 1);
        Ok(())
    }

    fn brightness(&mut self) -> Result<u8> {
        Ok(50)
    }

    fn set_brightness(&mut self, _percent: u8) -> Result<()> {
        Ok(())
    }
}

struct Harness {
    _dir: TempDir,
    report: std::path::PathBuf,
    level: Rc<Cell<u8>>,
    calls: Rc<Calls>,
    rewinds: Rc<Cell<u32>>,
    start: Instant,
    app: App<TenSecondClip, Gauge, FakePower>,
}

fn harness(report_every: Duration) -> Harness {
    let dir = TempDir::new().unwrap();
    let report = dir.path().join("Battery Report.txt");
    let level = Rc::new(Cell::new(80));
    let calls = Rc::new(Calls::default());
    let rewinds = Rc::new(Cell::new(0));
    let start = Instant::now();
    let app = App::new(
        VideoPlayer::new(TenSecondClip {
            pos: 0,
            rewinds: rewinds.clone(),
        }),
        Gauge(level.clone()),
        ReportLogger::new(&report),
        PowerController::new(FakePower(calls.clone()), "scenario"),
        Intervals {
            frame: Duration::from_millis(1000 / u64::from(FPS)),
            status: Duration::from_secs(1),
            report: report_every,
        },
        start,
    );
    Harness {
        _dir: dir,
        report,
        level,
        calls,
        rewinds,
        start,
        app,
    }
}

fn read_lines(path: &std::path::Path) -> Vec<String> {
    std::fs::read_to_string(path)
        .unwrap_or_default()
        .lines()
        .map(str::to_owned)
        .collect()
}

#[test]
fn two_report_ticks_write_two_lines() {
    let mut h = harness(Duration::from_secs(5));
    h.app.disable_sleep();

    h.app.tick(h.start + Duration::from_secs(5));
    h.level.set(79);
    h.app.tick(h.start + Duration::from_secs(10));

    assert_eq!(
        read_lines(&h.report),
        vec![
            "00:00:05 - Battery: 80% - Discharging",
            "00:00:10 - Battery: 79% - Discharging",
        ]
    );

    h.app.close();
    drop(h.app);
    assert_eq!(h.calls.disable.get(), 1);
    assert_eq!(h.calls.enable.get(), 1);
}

#[test]
fn k_ticks_append_k_well_formed_lines() {
    let mut h = harness(Duration::from_secs(1));
    std::fs::write(&h.report, "previous run\n").unwrap();

    const K: u64 = 25;
    for s in 1..=K {
        h.level.set(100 - s as u8);
        h.app.tick(h.start + Duration::from_secs(s));
    }

    let lines = read_lines(&h.report);
    assert_eq!(lines.len() as u64, K + 1);
    assert_eq!(lines[0], "previous run");
    for (i, line) in lines[1..].iter().enumerate() {
        let (stamp, rest) = line.split_once(" - ").unwrap();
        assert_eq!(parse_hms(stamp), Some(Duration::from_secs(i as u64 + 1)));
        assert_eq!(rest, format!("Battery: {}% - Discharging", 99 - i));
    }
    assert_eq!(h.app.reports_written(), K);
}

#[test]
fn playback_loops_forever() {
    let mut h = harness(Duration::from_secs(3600));
    let frame = Duration::from_millis(1000 / u64::from(FPS));

    // Three and a half passes through the ten-second clip.
    let ticks = 35 * FPS;
    for n in 1..=ticks {
        let outcome = h.app.tick(h.start + frame * n);
        assert!(outcome.frame);
    }

    let player = h.app.player().unwrap();
    assert_eq!(h.rewinds.get(), 3);
    assert_eq!(player.loops(), 3);
    // The first frame is decoded at construction.
    assert_eq!(player.frames_shown(), u64::from(ticks) + 1);
    assert!(h.app.is_running());
}

#[test]
fn overlays_reflect_latest_poll() {
    let mut h = harness(Duration::from_secs(300));
    h.level.set(64);
    h.app.tick(h.start + Duration::from_secs(1));
    assert_eq!(h.app.battery_text(), "Battery: 64% - Discharging");
    assert_eq!(
        h.app.timer_text(h.start + Duration::from_secs(1)),
        "Time: 00:00:01"
    );
}
