use std::time::Duration;

use async_trait::async_trait;
use rand::seq::SliceRandom;

/// Pause inserted between consecutive notification sends.
#[async_trait]
pub trait Pacer: Send + Sync {
    async fn pause(&self);
}

/// Sleeps for a delay picked uniformly from a fixed set.
#[derive(Clone, Debug)]
pub struct RandomPacer {
    choices: Vec<Duration>,
}

impl RandomPacer {
    pub fn new(choices: Vec<Duration>) -> Self {
        Self { choices }
    }

    pub fn next_delay(&self) -> Duration {
        self.choices
            .choose(&mut rand::thread_rng())
            .copied()
            .unwrap_or(Duration::ZERO)
    }
}

impl Default for RandomPacer {
    fn default() -> Self {
        Self::new(vec![
            Duration::from_secs(1),
            Duration::from_secs(2),
            Duration::from_secs(3),
        ])
    }
}

#[async_trait]
impl Pacer for RandomPacer {
    async fn pause(&self) {
        let delay = self.next_delay();
        if delay > Duration::ZERO {
            tokio::time::sleep(delay).await;
        }
    }
}
