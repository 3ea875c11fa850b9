//! Links between the tasks of a running pipeline.
//!
//! Stages inside one branch are joined by bounded channels, so a slow stage
//! paces the stages feeding it. The tap feeds each fork through its own
//! unbounded channel, so a slow fork never stalls its siblings.

use tokio::sync::mpsc;

/// The receiving end of a stage's input.
pub(crate) enum Inlet<T> {
    Bounded(mpsc::Receiver<T>),
    Unbounded(mpsc::UnboundedReceiver<T>),
}

impl<T> Inlet<T> {
    /// Receives the next item, or `None` once the upstream is exhausted.
    pub(crate) async fn recv(&mut self) -> Option<T> {
        match self {
            Self::Bounded(rx) => rx.recv().await,
            Self::Unbounded(rx) => rx.recv().await,
        }
    }
}

/// Where a stage sends its output.
pub(crate) enum Outlet<T> {
    Channel(mpsc::Sender<T>),
    /// Terminal stage of a fork: output is dropped.
    Discard,
}

impl<T> Outlet<T> {
    /// Sends one item downstream.
    ///
    /// Returns false if the downstream has gone away.
    pub(crate) async fn send(&self, item: T) -> bool {
        match self {
            Self::Channel(tx) => tx.send(item).await.is_ok(),
            Self::Discard => true,
        }
    }
}

/// Creates a bounded link between two tasks of the same branch.
pub(crate) fn link<T>(capacity: usize) -> (Outlet<T>, Inlet<T>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (Outlet::Channel(tx), Inlet::Bounded(rx))
}
