use spdlog::info;
use std::time::Instant;

const UNITS: [(f64, &str); 3] = [(1e9, "b"), (1e6, "m"), (1e3, "k")];

/// Logs how many trace lines a pass has consumed.
pub struct Progress {
    pass: &'static str,
    interval: u64,
    lines: u64,
    /// Line count of the next report, `None` when reports are off.
    next_report: Option<u64>,
    started: Instant,
    last_report: Instant,
}

impl Progress {
    /// An `interval` of 0 disables periodic reports.
    pub fn new(pass: &'static str, interval: u64) -> Self {
        let now = Instant::now();
        Self {
            pass,
            interval,
            lines: 0,
            next_report: (interval > 0).then_some(interval),
            started: now,
            last_report: now,
        }
    }

    #[inline(always)]
    pub fn tick(&mut self) {
        self.lines += 1;
        if self.next_report == Some(self.lines) {
            self.report();
            self.next_report = Some(self.lines + self.interval);
        }
    }

    #[cold]
    fn report(&mut self) {
        let now = Instant::now();
        let recent = per_second(self.interval, now.duration_since(self.last_report));
        let overall = per_second(self.lines, now.duration_since(self.started));
        info!(
            "[{}] {} lines read, {} lines/s now, {} lines/s overall",
            self.pass,
            human(self.lines as f64),
            human(recent),
            human(overall)
        );
        self.last_report = now;
    }

    pub fn lines(&self) -> u64 {
        self.lines
    }

    pub fn finish(&self) {
        info!(
            "[{}] done, {} lines in {:?}",
            self.pass,
            human(self.lines as f64),
            self.started.elapsed()
        );
    }
}

fn per_second(lines: u64, elapsed: std::time::Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 { lines as f64 / secs } else { 0.0 }
}

/// `1234567.0` becomes `1.23m`.
fn human(value: f64) -> String {
    for (scale, suffix) in UNITS {
        if value >= scale {
            return format!("{:.2}{suffix}", value / scale);
        }
    }
    format!("{value:.0}")
}
