//! Bounded polling for remote jobs that finish asynchronously.

use anyhow::Result;
use std::future::Future;
use std::task::Poll;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundedPoll {
    pub max_attempts: u32,
    pub delay: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome<T> {
    Ready(T),
    TimedOut { attempts: u32 },
}

impl Default for BoundedPoll {
    fn default() -> Self {
        Self {
            max_attempts: 50,
            delay: Duration::from_secs(1),
        }
    }
}

impl BoundedPoll {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }

    /// Sleeps `delay` before every attempt and stops at the first
    /// `Poll::Ready`, the first error, or after `max_attempts` attempts.
    pub async fn run<T, F, Fut>(&self, mut attempt: F) -> Result<PollOutcome<T>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<Poll<T>>>,
    {
        for n in 1..=self.max_attempts {
            tokio::time::sleep(self.delay).await;
            if let Poll::Ready(value) = attempt(n).await? {
                return Ok(PollOutcome::Ready(value));
            }
            debug!(attempt = n, max_attempts = self.max_attempts, "job still running");
        }

        Ok(PollOutcome::TimedOut {
            attempts: self.max_attempts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let poll = BoundedPoll::new(5, Duration::from_millis(200));
        let started = tokio::time::Instant::now();

        let counter = calls.clone();
        let outcome = poll
            .run(|_| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(Poll::<()>::Pending)
                }
            })
            .await
            .unwrap();

        assert_eq!(outcome, PollOutcome::TimedOut { attempts: 5 });
        assert_eq!(calls.load(Ordering::SeqCst), 5);
        assert_eq!(started.elapsed(), Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn returns_as_soon_as_ready() {
        let poll = BoundedPoll::default();
        let outcome = poll
            .run(|n| async move {
                if n == 3 {
                    Ok(Poll::Ready("done"))
                } else {
                    Ok(Poll::Pending)
                }
            })
            .await
            .unwrap();
        assert_eq!(outcome, PollOutcome::Ready("done"));
    }

    #[tokio::test(start_paused = true)]
    async fn errors_stop_polling() {
        let poll = BoundedPoll::new(10, Duration::from_millis(10));
        let result = poll
            .run(|n| async move {
                if n == 2 {
                    anyhow::bail!("prediction failed")
                }
                Ok(Poll::<()>::Pending)
            })
            .await;
        assert!(result.is_err());
    }
}
