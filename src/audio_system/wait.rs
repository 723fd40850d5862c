/// Waiting for playback to finish
///
/// Waiters sleep on the engine's tick counter and re-check their condition
/// after each tick. No engine lock is held across an await.
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// What happens to the playback when a completion wait is cancelled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CancelBehaviour {
    #[default]
    Stop,
    Pause,
    /// Leave the playback running
    Keep,
}

/// The wait ended through its cancellation token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Interrupted;

/// Wait until `busy` reports false, re-checking after every engine tick.
///
/// Returns `Ok` once idle or when the engine goes away, `Err(Interrupted)`
/// when `cancel` fires first.
pub(crate) async fn wait_while(
    mut ticks: watch::Receiver<u64>,
    cancel: &CancellationToken,
    mut busy: impl FnMut() -> bool,
) -> Result<(), Interrupted> {
    loop {
        if !busy() {
            return Ok(());
        }
        if cancel.is_cancelled() {
            return Err(Interrupted);
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Interrupted),
            changed = ticks.changed() => {
                if changed.is_err() {
                    // Engine dropped; nothing will ever tick again
                    return Ok(());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_returns_immediately_when_idle() {
        let (_tx, rx) = watch::channel(0u64);
        let cancel = CancellationToken::new();
        assert_eq!(wait_while(rx, &cancel, || false).await, Ok(()));
    }

    #[tokio::test]
    async fn test_idle_takes_precedence_over_cancel() {
        let (_tx, rx) = watch::channel(0u64);
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert_eq!(wait_while(rx, &cancel, || false).await, Ok(()));
    }

    #[tokio::test]
    async fn test_cancel_interrupts() {
        let (_tx, rx) = watch::channel(0u64);
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();

        let waiter = tokio::spawn(async move { wait_while(rx, &cancel, || true).await });
        tokio::task::yield_now().await;
        trigger.cancel();

        assert_eq!(waiter.await.unwrap(), Err(Interrupted));
    }

    #[tokio::test]
    async fn test_wakes_on_tick() {
        let (tx, rx) = watch::channel(0u64);
        let cancel = CancellationToken::new();
        let busy = Arc::new(AtomicBool::new(true));
        let flag = busy.clone();

        let waiter =
            tokio::spawn(async move { wait_while(rx, &cancel, move || flag.load(Ordering::SeqCst)).await });
        tokio::task::yield_now().await;

        busy.store(false, Ordering::SeqCst);
        tx.send_modify(|count| *count += 1);

        assert_eq!(waiter.await.unwrap(), Ok(()));
    }

    #[tokio::test]
    async fn test_dropped_sender_ends_wait() {
        let (tx, rx) = watch::channel(0u64);
        let cancel = CancellationToken::new();
        drop(tx);
        assert_eq!(wait_while(rx, &cancel, || true).await, Ok(()));
    }
}
