use std::fmt::Display;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq)]
enum Tally {
    Pending,
    Rows { rows: usize, pages: usize },
    Done,
}

/// Drop guard around one scrape or migration run. Logs a summary line when
/// it goes out of scope; a run that never reports is logged as aborted.
pub struct RunTimer {
    what: String,
    start: Instant,
    tally: Tally,
}

impl RunTimer {
    pub fn start(what: impl Display) -> Self {
        let what = what.to_string();
        debug!("Starting: {}", what);
        Self { what, start: Instant::now(), tally: Tally::Pending }
    }

    /// Rows stored and pages visited by a finished scrape.
    pub fn record(&mut self, rows: usize, pages: usize) {
        self.tally = Tally::Rows { rows, pages };
    }

    /// Marks a run with nothing to count as finished.
    pub fn done(&mut self) {
        self.tally = Tally::Done;
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    fn summary(&self) -> String {
        let took = self.start.elapsed();
        match self.tally {
            Tally::Pending => format!("{} aborted after {:.2?}", self.what, took),
            Tally::Rows { rows, pages } => format!(
                "{}: {} rows from {} pages in {:.2?}",
                self.what,
                group_thousands(rows as i64),
                pages,
                took
            ),
            Tally::Done => format!("{} finished in {:.2?}", self.what, took),
        }
    }
}

impl Drop for RunTimer {
    fn drop(&mut self) {
        if self.tally == Tally::Pending {
            warn!("{}", self.summary());
        } else {
            info!("{}", self.summary());
        }
    }
}

/// `1234567` → `"1,234,567"`.
pub fn group_thousands(n: i64) -> String {
    let digits = n.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if n < 0 {
        out.push('-');
    }
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unreported_run_is_aborted() {
        let t = RunTimer::start("rankings scrape");
        assert!(t.summary().starts_with("rankings scrape aborted after"));
    }

    #[test]
    fn test_recorded_run_reports_rows_and_pages() {
        let mut t = RunTimer::start("rankings scrape");
        t.record(1200, 3);
        assert!(t.summary().starts_with("rankings scrape: 1,200 rows from 3 pages in"));

        let mut m = RunTimer::start("Migrations");
        m.done();
        assert!(m.summary().starts_with("Migrations finished in"));
    }

    #[test]
    fn test_elapsed_grows() {
        let t = RunTimer::start("noop");
        std::thread::sleep(Duration::from_millis(2));
        assert!(t.elapsed() >= Duration::from_millis(2));
    }

    #[test]
    fn test_group_thousands() {
        assert_eq!(group_thousands(1_234_567), "1,234,567");
        assert_eq!(group_thousands(0), "0");
        assert_eq!(group_thousands(-42_000), "-42,000");
        assert_eq!(group_thousands(999), "999");
        assert_eq!(group_thousands(1000), "1,000");
    }
}
