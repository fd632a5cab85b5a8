//! Operator interrupt plumbing.
//!
//! [`InterruptWatcher`] owns the task waiting for Ctrl-C and publishes the
//! number of presses into a `watch` cell. Stages hold an [`Interrupt`] and
//! either poll it or await it next to their child process. The first press
//! asks the running stage to terminate; a second one forces it.

use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct Interrupt {
    rx: watch::Receiver<u32>,
}

impl Interrupt {
    /// An interrupt that never fires.
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(0);
        Self { rx }
    }

    /// A manually triggered interrupt, used by tests and embedders.
    pub fn manual() -> (InterruptHandle, Self) {
        let (tx, rx) = watch::channel(0);
        (InterruptHandle { tx }, Self { rx })
    }

    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow() > 0
    }

    /// Resolves once the interrupt fires. Pends forever if the sender is gone
    /// without having fired.
    pub async fn triggered(&self) {
        self.reached(1).await
    }

    /// Resolves once the interrupt has fired a second time.
    pub async fn forced(&self) {
        self.reached(2).await
    }

    async fn reached(&self, presses: u32) {
        let mut rx = self.rx.clone();
        if rx.wait_for(|count| *count >= presses).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

#[derive(Debug, Clone)]
pub struct InterruptHandle {
    tx: watch::Sender<u32>,
}

impl InterruptHandle {
    pub fn trigger(&self) {
        self.tx.send_modify(|count| *count += 1);
    }
}

/// Owns the Ctrl-C listener. Dropping the watcher stops the listener.
pub struct InterruptWatcher {
    task: JoinHandle<()>,
    interrupt: Interrupt,
}

impl InterruptWatcher {
    pub fn spawn() -> Self {
        let (handle, interrupt) = Interrupt::manual();
        let task = tokio::spawn(async move {
            let mut sigint = match signal(SignalKind::interrupt()) {
                Ok(sigint) => sigint,
                Err(e) => {
                    warn!("Unable to listen for Ctrl-C: {}", e);
                    return;
                }
            };
            let mut presses = 0u32;
            while sigint.recv().await.is_some() {
                presses += 1;
                if presses == 1 {
                    warn!("Interrupt received, stopping current stage");
                } else {
                    warn!("Interrupt received again, killing current stage");
                }
                handle.trigger();
            }
        });
        Self { task, interrupt }
    }

    pub fn interrupt(&self) -> Interrupt {
        self.interrupt.clone()
    }
}

impl Drop for InterruptWatcher {
    fn drop(&mut self) {
        self.task.abort();
    }
}
