use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Latched view of a run's cancel channel.
///
/// Callers signal cancellation with a broadcast send. A watcher task turns the
/// first message into a flag that stays set, so a worker that starts waiting
/// after the signal still sees it.
#[derive(Clone)]
pub struct CancelFlag {
    rx: watch::Receiver<bool>,
}

impl CancelFlag {
    pub fn watch(mut cancel: broadcast::Receiver<()>) -> (Self, JoinHandle<()>) {
        let (tx, rx) = watch::channel(false);
        let watcher = tokio::spawn(async move {
            match cancel.recv().await {
                Ok(()) | Err(RecvError::Lagged(_)) => {
                    let _ = tx.send(true);
                }
                // Every sender is gone; nobody can cancel this run any more.
                Err(RecvError::Closed) => {}
            }
        });
        (Self { rx }, watcher)
    }

    pub fn is_set(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancellation is requested; never if it cannot be.
    pub async fn cancelled(&mut self) {
        loop {
            let set = *self.rx.borrow_and_update();
            if set {
                return;
            }
            if self.rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}
