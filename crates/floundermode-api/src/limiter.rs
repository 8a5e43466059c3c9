use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Monotonic time source. Readings are offsets from an arbitrary origin.
pub trait Clock: Send + Sync {
    fn now(&self) -> Duration;
    fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl Default for SystemClock {
    fn default() -> Self {
        Self { origin: Instant::now() }
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Clock that only moves when told to. `sleep` advances it instantly.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Mutex<Duration>,
}

impl ManualClock {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    pub max_calls: usize,
    pub window: Duration,
    pub buffer: Duration,
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self { max_calls: 5, window: Duration::from_millis(1000), buffer: Duration::from_millis(100) }
    }
}

/// Sliding-window limiter: at most `max_calls` starts inside any `window`.
pub struct RateLimiter {
    policy: RateLimitPolicy,
    clock: Arc<dyn Clock>,
    starts: Mutex<VecDeque<Duration>>,
}

impl RateLimiter {
    #[must_use]
    pub fn new(policy: RateLimitPolicy, clock: Arc<dyn Clock>) -> Self {
        Self { policy, clock, starts: Mutex::new(VecDeque::new()) }
    }

    #[must_use]
    pub fn policy(&self) -> RateLimitPolicy {
        self.policy
    }

    /// Block until a call may start, then record the start. Returns how long
    /// the caller waited.
    pub fn acquire(&self) -> Duration {
        let max_calls = self.policy.max_calls.max(1);
        let mut waited = Duration::ZERO;
        loop {
            let wait = {
                let mut starts = self.starts.lock().unwrap_or_else(PoisonError::into_inner);
                let now = self.clock.now();
                while starts
                    .front()
                    .is_some_and(|oldest| now.saturating_sub(*oldest) >= self.policy.window)
                {
                    starts.pop_front();
                }
                match starts.front().copied() {
                    Some(oldest) if starts.len() >= max_calls => {
                        self.policy.window.saturating_sub(now.saturating_sub(oldest))
                            + self.policy.buffer
                    }
                    _ => {
                        starts.push_back(now);
                        return waited;
                    }
                }
            };
            tracing::debug!(wait_ms = wait.as_millis(), "rate limit reached; delaying call");
            self.clock.sleep(wait);
            waited += wait;
        }
    }
}
