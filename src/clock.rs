//! Stopwatch anchored to a single start instant.

use std::time::{Duration, Instant};

/// Elapsed time since the test started.
///
/// Durations are always derived as `now - start`; nothing is accumulated per
/// tick, so the stopwatch cannot drift however late the timers fire.
#[derive(Clone, Copy, Debug)]
pub struct ElapsedTimer {
    start: Instant,
}

impl ElapsedTimer {
    pub fn start() -> Self {
        Self::started_at(Instant::now())
    }

    pub fn started_at(start: Instant) -> Self {
        Self { start }
    }

    pub fn start_instant(&self) -> Instant {
        self.start
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed_at(Instant::now())
    }

    /// Elapsed time at `now`; instants before the start count as zero.
    pub fn elapsed_at(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.start)
    }
}

/// Formats a duration as `HH:MM:SS`, truncating sub-second precision.
///
/// Hours are not wrapped, so a run of 100 hours prints as `100:00:00`.
pub fn format_hms(elapsed: Duration) -> String {
    let total = elapsed.as_secs();
    let (hours, rest) = (total / 3600, total % 3600);
    let (minutes, seconds) = (rest / 60, rest % 60);
    format!("{hours:02}:{minutes:02}:{seconds:02}")
}

/// Parses the output of [`format_hms`] back into a duration.
pub fn parse_hms(text: &str) -> Option<Duration> {
    let mut parts = text.split(':');
    let hours: u64 = parts.next()?.parse().ok()?;
    let minutes: u64 = parts.next()?.parse().ok()?;
    let seconds: u64 = parts.next()?.parse().ok()?;
    if parts.next().is_some() || minutes >= 60 || seconds >= 60 {
        return None;
    }
    Some(Duration::from_secs(hours * 3600 + minutes * 60 + seconds))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_zero_padded_fields() {
        assert_eq!(format_hms(Duration::ZERO), "00:00:00");
        assert_eq!(format_hms(Duration::from_secs(5)), "00:00:05");
        assert_eq!(format_hms(Duration::from_secs(3661)), "01:01:01");
        assert_eq!(format_hms(Duration::from_secs(360_000)), "100:00:00");
    }

    #[test]
    fn truncates_fractional_seconds() {
        assert_eq!(format_hms(Duration::from_millis(59_999)), "00:00:59");
    }

    #[test]
    fn format_round_trips_within_a_second() {
        let mut millis = 0u64;
        while millis < 200_000_000 {
            let elapsed = Duration::from_millis(millis);
            let parsed = parse_hms(&format_hms(elapsed)).expect("well-formed");
            assert!(parsed <= elapsed);
            assert!(elapsed - parsed < Duration::from_secs(1));
            millis = millis * 3 + 7_919;
        }
    }

    #[test]
    fn rejects_malformed_text() {
        assert_eq!(parse_hms("00:60:00"), None);
        assert_eq!(parse_hms("00:00"), None);
        assert_eq!(parse_hms("00:00:00:00"), None);
        assert_eq!(parse_hms("aa:00:00"), None);
    }

    #[test]
    fn elapsed_is_derived_from_start() {
        let start = Instant::now();
        let clock = ElapsedTimer::started_at(start);
        assert_eq!(
            clock.elapsed_at(start + Duration::from_secs(10)),
            Duration::from_secs(10)
        );
        assert_eq!(clock.elapsed_at(start), Duration::ZERO);
    }
}
