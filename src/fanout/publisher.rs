use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::{Hub, Published};

/// Hands new posts to the dispatcher task.
#[derive(Clone)]
pub struct Publisher {
    tx: mpsc::Sender<Published>,
}

impl Publisher {
    /// Waits only for room in the dispatch queue, never for delivery.
    pub async fn publish(&self, published: Published) {
        let post_id = published.view.id.clone();
        if self.tx.send(published).await.is_err() {
            tracing::warn!(post = %post_id, "Dispatcher has stopped; post not delivered live");
        }
    }
}

/// Start the single dispatcher. Posts are dispatched in the order published.
/// The task ends once every [`Publisher`] clone is dropped.
pub fn spawn_dispatcher(hub: Hub, capacity: usize) -> (Publisher, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::channel::<Published>(capacity);

    let handle = tokio::spawn(async move {
        while let Some(published) = rx.recv().await {
            let delivered = hub.dispatch(&published);
            tracing::debug!(post = %published.view.id, delivered, "Dispatched post");
        }
        tracing::info!("Dispatcher stopped");
    });

    (Publisher { tx }, handle)
}
