// ganglion-transport/src/deadline.rs
//
// Adapted from the teacher's resilience helpers. The pool and applier
// use this for every fixed timeout spec.md §5 names (forward dial,
// enqueue limit); it is not a retrying wrapper -- spec.md §4.2 is
// explicit that "the pool does not retry".

use std::time::Duration;
use tokio::time::timeout;

#[derive(Clone, Copy, Debug)]
pub struct Deadline {
    duration: Duration,
}

impl Deadline {
    pub fn new(duration: Duration) -> Self {
        Self { duration }
    }

    pub async fn execute<F, T, E>(&self, f: F) -> Result<T, DeadlineError<E>>
    where
        F: std::future::Future<Output = Result<T, E>>,
    {
        match timeout(self.duration, f).await {
            Ok(result) => result.map_err(DeadlineError::Inner),
            Err(_) => Err(DeadlineError::Elapsed(self.duration)),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DeadlineError<E> {
    #[error("deadline of {0:?} elapsed")]
    Elapsed(Duration),
    #[error(transparent)]
    Inner(E),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn elapses_past_the_deadline() {
        let d = Deadline::new(Duration::from_millis(10));
        let result: Result<(), DeadlineError<anyhow::Error>> = d
            .execute(async {
                tokio::time::sleep(Duration::from_millis(100)).await;
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(DeadlineError::Elapsed(_))));
    }

    #[tokio::test]
    async fn completes_within_deadline() {
        let d = Deadline::new(Duration::from_millis(100));
        let result: Result<i32, DeadlineError<anyhow::Error>> =
            d.execute(async { Ok(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }
}
