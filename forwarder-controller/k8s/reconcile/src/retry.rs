use crate::Result;
use std::future::Future;
use tokio::time::{self, Duration};

/// Bounded exponential backoff applied to optimistic-concurrency conflicts.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Backoff {
    pub attempts: u32,
    pub initial: Duration,
    pub max: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            attempts: 5,
            initial: Duration::from_millis(10),
            max: Duration::from_secs(1),
        }
    }
}

/// Runs `op` until it succeeds, fails with anything other than a conflict, or exhausts the
/// backoff. Each attempt must re-read the object it writes.
pub async fn on_conflict<F, Fut, T>(backoff: Backoff, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut delay = backoff.initial;
    let mut attempt = 1;
    loop {
        match op().await {
            Err(error) if error.is_conflict() && attempt < backoff.attempts => {
                tracing::debug!(%error, attempt, ?delay, "Retrying after conflict");
                time::sleep(delay).await;
                delay = (delay * 2).min(backoff.max);
                attempt += 1;
            }
            res => return res,
        }
    }
}
