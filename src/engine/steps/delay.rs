use super::super::error::ExecutionError;
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

/// 지정 시간만큼 대기하되 취소되면 즉시 깨어난다.
pub(super) async fn cancellable_sleep(
    ms: u64,
    cancel: &CancellationToken,
) -> Result<(), ExecutionError> {
    tokio::select! {
        _ = cancel.cancelled() => Err(ExecutionError::Cancelled),
        _ = sleep(Duration::from_millis(ms)) => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[tokio::test]
    async fn cancellation_wakes_sleep_early() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });
        let started = Instant::now();
        assert_eq!(
            cancellable_sleep(5_000, &cancel).await,
            Err(ExecutionError::Cancelled)
        );
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn uncancelled_sleep_completes() {
        let cancel = CancellationToken::new();
        assert_eq!(cancellable_sleep(5, &cancel).await, Ok(()));
    }
}
