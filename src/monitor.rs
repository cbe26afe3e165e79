//! Completion Monitor Module
//!
//! Decides when message arrivals have caught up with acknowledged publishes.
//! Delivery is best effort, so the wait is capped by a number of poll rounds.

use std::time::Duration;

use crate::tracker::{Category, Progress};

pub struct CompletionMonitor {
    progress: Progress,
    poll_interval: Duration,
}

impl CompletionMonitor {
    pub fn new(progress: Progress) -> Self {
        Self {
            progress,
            poll_interval: Duration::from_secs(1),
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn is_caught_up(&self) -> bool {
        self.progress.done(Category::Message) == self.progress.done(Category::Publish)
    }

    /// Poll up to `max_rounds` times; `true` as soon as arrivals match publishes.
    ///
    /// No sleep follows the final poll, so this never blocks longer than
    /// `(max_rounds - 1) * poll_interval`.
    pub async fn wait_until_caught_up(&self, max_rounds: u32) -> bool {
        log::info!("Waiting up to {} rounds for messages ...", max_rounds);
        for round in 1..=max_rounds {
            if self.is_caught_up() {
                log::info!("All messages arrived");
                return true;
            }
            if round < max_rounds {
                tokio::time::sleep(self.poll_interval).await;
            }
        }

        let caught_up = max_rounds == 0 && self.is_caught_up();
        if !caught_up {
            log::warn!(
                "Stopped waiting: {} of {} messages arrived",
                self.progress.done(Category::Message),
                self.progress.done(Category::Publish)
            );
        }
        caught_up
    }
}
