use std::io::Write;
use std::time::Instant;

/// Periodic progress line for the sampling loops.
///
/// Rendered inline on stderr from the sampler thread itself — sampling is
/// strictly sequential, so there is nothing to synchronize. `verbosity` is
/// the fraction of iterations that report: 0.01 prints every 100th
/// iteration; zero or negative disables reporting.
pub struct Progress {
    start: Instant,
    every: usize,
    /// Completion target: iterations in Monte Carlo mode, acceptances in
    /// Las Vegas mode. `None` renders without a bar or ETA.
    target: Option<usize>,
    by_accepted: bool,
}

impl Progress {
    pub fn new(verbosity: f64, target: Option<usize>, by_accepted: bool) -> Self {
        let every = if verbosity > 0.0 {
            ((1.0 / verbosity).round() as usize).max(1)
        } else {
            usize::MAX
        };
        Self {
            start: Instant::now(),
            every,
            target,
            by_accepted,
        }
    }

    pub fn tick(&self, iteration: usize, accepted: usize) {
        if self.every != usize::MAX && iteration > 0 && iteration % self.every == 0 {
            self.render(iteration, accepted, false);
        }
    }

    pub fn finish(&self, iteration: usize, accepted: usize) {
        if self.every != usize::MAX {
            self.render(iteration, accepted, true);
        }
    }

    fn render(&self, iteration: usize, accepted: usize, done: bool) {
        let elapsed = self.start.elapsed().as_secs_f64();
        let speed = if elapsed > 0.05 {
            iteration as f64 / elapsed
        } else {
            0.0
        };
        let completed = if self.by_accepted { accepted } else { iteration };

        let mut err = std::io::stderr().lock();
        match self.target {
            Some(total) if total > 0 => {
                let pct = (completed * 100 / total).min(100);
                let bar_width = 30;
                let filled = ((bar_width * completed) / total).min(bar_width);
                let bar: String = "━".repeat(filled) + &"╌".repeat(bar_width - filled);
                let _ = write!(
                    err,
                    "\rABC sampling {} {:>3}% │ {} accepted │ {} iters │ {} it/s │ {}\x1b[K",
                    bar,
                    pct,
                    fmt_count(accepted),
                    fmt_count(iteration),
                    fmt_speed(speed),
                    fmt_time(elapsed),
                );
            }
            _ => {
                let _ = write!(
                    err,
                    "\rABC sampling │ {} accepted │ {} iters │ {} it/s │ {}\x1b[K",
                    fmt_count(accepted),
                    fmt_count(iteration),
                    fmt_speed(speed),
                    fmt_time(elapsed),
                );
            }
        }
        if done {
            let _ = writeln!(err);
        }
        let _ = err.flush();
    }
}

fn fmt_count(n: usize) -> String {
    if n >= 1_000_000 {
        format!("{:.1}M", n as f64 / 1_000_000.0)
    } else if n >= 10_000 {
        format!("{:.1}k", n as f64 / 1_000.0)
    } else {
        format!("{}", n)
    }
}

fn fmt_speed(n: f64) -> String {
    if n >= 1_000_000.0 {
        format!("{:.1}M", n / 1_000_000.0)
    } else if n >= 1_000.0 {
        format!("{:.1}k", n / 1_000.0)
    } else {
        format!("{:.0}", n)
    }
}

fn fmt_time(secs: f64) -> String {
    if secs < 60.0 {
        format!("{:.1}s", secs)
    } else {
        let mins = (secs / 60.0) as usize;
        let s = (secs % 60.0) as usize;
        format!("{}:{:02}", mins, s)
    }
}
