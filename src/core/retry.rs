//! Bounded retry with an injectable sleep.

use std::time::Duration;

/// Something that can block the current thread.
pub trait Sleeper {
    fn sleep(&self, duration: Duration);
}

impl<T: Sleeper + ?Sized> Sleeper for &T {
    fn sleep(&self, duration: Duration) {
        (**self).sleep(duration);
    }
}

/// Real sleep via [`std::thread::sleep`].
#[derive(Clone, Copy, Debug, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            std::thread::sleep(duration);
        }
    }
}

/// How the wait grows between attempts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Backoff {
    /// Same wait every time.
    #[default]
    Fixed,
    /// Doubles after every attempt, never exceeding `cap`. Used while
    /// waiting for the tunnel interface to appear.
    Exponential { cap: Duration },
}

/// Attempt budget and wait between attempts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub wait: Duration,
    pub backoff: Backoff,
}

impl RetryPolicy {
    #[must_use]
    pub const fn fixed(attempts: u32, wait: Duration) -> Self {
        Self {
            attempts,
            wait,
            backoff: Backoff::Fixed,
        }
    }

    /// Wait to apply after the zero-based attempt `attempt` failed.
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed => self.wait,
            Backoff::Exponential { cap } => {
                let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
                self.wait.saturating_mul(factor).min(cap)
            }
        }
    }
}

/// Call `probe` until it returns `true` or the attempt budget runs out.
///
/// Sleeps between attempts only, never after the last one. Returns whether
/// the probe eventually succeeded. A zero budget never calls the probe.
pub fn poll_until<S, F>(policy: RetryPolicy, sleeper: &S, mut probe: F) -> bool
where
    S: Sleeper + ?Sized,
    F: FnMut(u32) -> bool,
{
    for attempt in 0..policy.attempts {
        if probe(attempt) {
            return true;
        }
        if attempt + 1 < policy.attempts {
            sleeper.sleep(policy.delay(attempt));
        }
    }
    false
}

/// Sleeper that only records requested durations.
#[cfg(test)]
pub mod recording {
    use std::cell::RefCell;
    use std::time::Duration;

    use super::Sleeper;

    #[derive(Default)]
    pub struct RecordingSleeper {
        pub slept: RefCell<Vec<Duration>>,
    }

    impl Sleeper for RecordingSleeper {
        fn sleep(&self, duration: Duration) {
            self.slept.borrow_mut().push(duration);
        }
    }
}
