use rand::Rng;
use std::time::Duration;

/// Exponential backoff with multiplicative jitter.
#[derive(Debug, Clone)]
pub struct Backoff {
    pub initial: Duration,
    pub factor: f64,
    pub steps: u32,
    /// Each step may grow by up to `jitter * step` extra.
    pub jitter: f64,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(20),
            factor: 4.0,
            steps: 5,
            jitter: 0.5,
        }
    }
}

impl Backoff {
    pub fn without_jitter(mut self) -> Self {
        self.jitter = 0.0;
        self
    }

    /// Delay for the given retry count, never above `cap`.
    pub fn delay(&self, tick: u32, cap: Duration) -> Duration {
        let mut rng = rand::rng();
        let mut duration = self.initial.as_nanos() as f64;
        let cap_nanos = cap.as_nanos() as f64;

        for _ in 0..tick.min(self.steps) {
            let adjusted = if self.jitter > 0.0 {
                duration + rng.random_range(0.0..1.0_f64) * self.jitter * duration
            } else {
                duration
            };
            duration = adjusted * self.factor;
            if duration > cap_nanos {
                return cap;
            }
        }

        Duration::from_nanos(duration.min(cap_nanos) as u64)
    }
}
