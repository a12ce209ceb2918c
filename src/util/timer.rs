use std::time::{Duration, Instant};

/// Wall clock timer for the load, compute and store phases.
#[derive(Clone, Copy, Debug)]
pub struct PregelTimer(Instant);

/// Time taken by a phase.
#[derive(Clone, Copy, Debug)]
pub struct Elapsed(Duration);

impl PregelTimer {
    pub fn now() -> Self {
        PregelTimer(Instant::now())
    }

    pub fn elapsed(&self) -> Elapsed {
        Elapsed(self.0.elapsed())
    }
}

impl Elapsed {
    /// Seconds with millisecond precision, for log lines.
    pub fn to_seconds_string(&self) -> String {
        format!("{:.3} s", self.0.as_secs_f64())
    }

    /// Seconds rounded to microseconds, as reported in `JobResult` and the phase stats.
    pub fn seconds(&self) -> f64 {
        (self.0.as_secs_f64() * 1e6).round() / 1e6
    }
}

#[cfg(test)]
mod tests {
    use crate::util::timer::{Elapsed, PregelTimer};
    use std::time::Duration;

    #[test]
    fn reported_seconds() {
        let elapsed = Elapsed(Duration::new(152, 628_093_400));
        assert_eq!(elapsed.to_seconds_string(), "152.628 s");
        assert!((elapsed.seconds() - 152.628_093).abs() < 1e-9);

        assert!(PregelTimer::now().elapsed().seconds() >= 0.0);
    }
}
