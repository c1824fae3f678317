use std::thread;
use std::time::Duration;

use tracing::info;

use crate::config::EffectiveConfig;

/// Blocks the current thread. Swapped out in tests to count waits.
pub trait Sleeper {
    fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        thread::sleep(duration);
    }
}

impl<S: Sleeper + ?Sized> Sleeper for &S {
    fn sleep(&self, duration: Duration) {
        (**self).sleep(duration)
    }
}

/// Fixed pauses between topic requests and before the aggregate request.
#[derive(Debug, Clone)]
pub struct DelayScheduler<S> {
    between_topics: Duration,
    before_aggregate: Duration,
    sleeper: S,
}

impl<S: Sleeper> DelayScheduler<S> {
    pub fn new(config: &EffectiveConfig, sleeper: S) -> Self {
        Self::with_durations(config.delay_between_topics, config.delay_before_aggregate, sleeper)
    }

    pub fn with_durations(between_topics: Duration, before_aggregate: Duration, sleeper: S) -> Self {
        Self {
            between_topics,
            before_aggregate,
            sleeper,
        }
    }

    /// Pause after a topic. Nothing happens after the last one.
    pub fn wait_between(&self, is_last: bool) {
        if is_last {
            return;
        }
        info!(
            seconds = self.between_topics.as_secs_f64(),
            "Waiting before next topic"
        );
        self.pause(self.between_topics);
    }

    pub fn wait_before_aggregate(&self) {
        info!(
            seconds = self.before_aggregate.as_secs_f64(),
            "Waiting before aggregate request"
        );
        self.pause(self.before_aggregate);
    }

    fn pause(&self, duration: Duration) {
        if !duration.is_zero() {
            self.sleeper.sleep(duration);
        }
    }
}
