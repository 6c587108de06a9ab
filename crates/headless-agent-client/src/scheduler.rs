use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::bootstrap::BootstrapCheck;

/// Deferred work an agent hands back to its own event loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Continuation {
    Bootstrap(BootstrapCheck),
    /// `turn` is the sequence number of the `yourTurn` that armed it.
    SendDecision { turn: u64 },
}

/// Timer source for one agent. Continuations are delivered through a channel
/// so they run on the agent task, serialized with inbound events.
#[derive(Debug, Clone)]
pub struct Scheduler {
    tx: mpsc::UnboundedSender<Continuation>,
    cancel: CancellationToken,
}

impl Scheduler {
    #[must_use]
    pub fn new(cancel: CancellationToken) -> (Self, mpsc::UnboundedReceiver<Continuation>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx, cancel }, rx)
    }

    pub fn schedule(&self, delay: Duration, continuation: Continuation) {
        let tx = self.tx.clone();
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                () = cancel.cancelled() => {}
                () = tokio::time::sleep(delay) => {
                    let _ = tx.send(continuation);
                }
            }
        });
    }

    /// Drops every pending continuation; later `schedule` calls are inert.
    pub fn cancel_all(&self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn continuations_fire_in_deadline_order() {
        let (scheduler, mut rx) = Scheduler::new(CancellationToken::new());
        scheduler.schedule(
            Duration::from_millis(3_000),
            Continuation::Bootstrap(BootstrapCheck::Fallback),
        );
        scheduler.schedule(
            Duration::from_millis(2_000),
            Continuation::Bootstrap(BootstrapCheck::Discovery),
        );
        scheduler.schedule(Duration::ZERO, Continuation::SendDecision { turn: 1 });

        assert_eq!(rx.recv().await, Some(Continuation::SendDecision { turn: 1 }));
        assert_eq!(
            rx.recv().await,
            Some(Continuation::Bootstrap(BootstrapCheck::Discovery))
        );
        assert_eq!(
            rx.recv().await,
            Some(Continuation::Bootstrap(BootstrapCheck::Fallback))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_all_discards_pending_work() {
        let (scheduler, mut rx) = Scheduler::new(CancellationToken::new());
        scheduler.schedule(Duration::from_millis(500), Continuation::SendDecision { turn: 7 });
        scheduler.cancel_all();
        tokio::time::sleep(Duration::from_millis(1_000)).await;
        assert!(rx.try_recv().is_err());
    }
}
