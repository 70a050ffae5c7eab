use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use uuid::Uuid;

use super::{envelope, Published, Timeline};

struct Subscriber {
    user_id: String,
    timeline: Timeline,
    tx: mpsc::Sender<Arc<str>>,
}

/// Registry of live sessions.
///
/// The lock is only taken for synchronous map access; it is never held across
/// an `.await`.
#[derive(Clone)]
pub struct Hub {
    subscribers: Arc<RwLock<HashMap<Uuid, Subscriber>>>,
    session_buffer: usize,
}

impl Hub {
    pub fn new(session_buffer: usize) -> Self {
        Self {
            subscribers: Arc::new(RwLock::new(HashMap::new())),
            session_buffer,
        }
    }

    /// Add a session. Dropping the returned [`Registration`] removes it again.
    pub fn register(
        &self,
        user_id: &str,
        timeline: Timeline,
    ) -> (Registration, mpsc::Receiver<Arc<str>>) {
        let (tx, rx) = mpsc::channel(self.session_buffer);
        let id = Uuid::new_v4();

        self.subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                id,
                Subscriber {
                    user_id: user_id.to_string(),
                    timeline,
                    tx,
                },
            );
        tracing::debug!(session = %id, user = %user_id, "Registered {} stream", timeline.as_str());

        (
            Registration {
                id,
                hub: self.clone(),
            },
            rx,
        )
    }

    fn unregister(&self, id: Uuid) {
        let removed = self
            .subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
        if removed.is_some() {
            tracing::debug!(session = %id, "Unregistered");
        }
    }

    pub fn len(&self) -> usize {
        self.subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Push a post onto every entitled session's queue and return how many
    /// sessions accepted it. A full or closed queue is logged and skipped.
    pub fn dispatch(&self, published: &Published) -> usize {
        let mut frames: HashMap<Timeline, Arc<str>> = HashMap::new();
        let subscribers = self
            .subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner);

        let mut delivered = 0;
        for (id, subscriber) in subscribers.iter() {
            if !published.entitles(&subscriber.user_id, subscriber.timeline) {
                continue;
            }

            let frame = match frames.get(&subscriber.timeline) {
                Some(frame) => frame.clone(),
                None => match envelope(subscriber.timeline, &published.view) {
                    Ok(frame) => {
                        frames.insert(subscriber.timeline, frame.clone());
                        frame
                    }
                    Err(e) => {
                        tracing::error!(post = %published.view.id, "Failed to serialize post: {}", e);
                        return delivered;
                    }
                },
            };

            match subscriber.tx.try_send(frame) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    tracing::warn!(session = %id, post = %published.view.id, "Session queue full, dropping post");
                }
                Err(TrySendError::Closed(_)) => {
                    tracing::debug!(session = %id, "Session queue closed");
                }
            }
        }

        delivered
    }
}

/// Keeps a session registered for as long as it lives.
pub struct Registration {
    id: Uuid,
    hub: Hub,
}

impl Registration {
    pub fn id(&self) -> Uuid {
        self.id
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.hub.unregister(self.id);
    }
}
