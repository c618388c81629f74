//! Wall-clock implementation of the scheduler clock.

use std::time::Duration;

use mbs_core::Clock;
use tokio::time::Instant;

/// Clock backed by the tokio timer.
#[derive(Debug, Clone, Copy)]
pub struct TokioClock {
    started: Instant,
}

impl TokioClock {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
        }
    }
}

impl Default for TokioClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TokioClock {
    fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> {
        tokio::time::sleep(duration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sleep_advances_elapsed() {
        let clock = TokioClock::new();
        clock.sleep(Duration::from_millis(20)).await;
        assert!(clock.elapsed() >= Duration::from_millis(20));
    }
}
