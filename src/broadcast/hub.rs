use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::ws::{Message, Utf8Bytes};
use parking_lot::RwLock;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::event::JobStatusEvent;

/// Default capacity of the publish channel
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Default number of frames buffered per live connection
pub const DEFAULT_CONNECTION_BUFFER: usize = 64;

/// A registered live observer
struct Connection {
    user: String,
    sender: mpsc::Sender<Message>,
}

/// Fan-out of job status events to every live connection.
///
/// Producers call [`publish`](Self::publish), which never blocks: events go
/// into a bounded broadcast channel and the oldest are dropped when a
/// consumer falls behind. A single dispatcher task drains that channel and
/// writes each event to every registered connection's outbound buffer. A
/// connection whose buffer is full or closed is dropped from the registry;
/// the others are unaffected.
pub struct StatusBroadcaster {
    sender: broadcast::Sender<JobStatusEvent>,
    connections: RwLock<HashMap<Uuid, Connection>>,
    connection_buffer: usize,
}

impl StatusBroadcaster {
    pub fn new(capacity: usize, connection_buffer: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            connections: RwLock::new(HashMap::new()),
            connection_buffer: connection_buffer.max(1),
        }
    }

    /// Publish an event without waiting for delivery
    pub fn publish(&self, event: JobStatusEvent) {
        debug!(job_id = %event.id, job = %event.job, status = %event.status, "Publishing job status");
        // A send error only means nobody is subscribed yet
        let _ = self.sender.send(event);
    }

    /// In-process receiver of every published event
    pub fn subscribe(&self) -> broadcast::Receiver<JobStatusEvent> {
        self.sender.subscribe()
    }

    /// Register a live connection and return its id and outbound receiver
    pub fn register(&self, user: impl Into<String>) -> (Uuid, mpsc::Receiver<Message>) {
        let (tx, rx) = mpsc::channel(self.connection_buffer);
        let id = Uuid::new_v4();
        let user = user.into();

        self.connections.write().insert(
            id,
            Connection {
                user: user.clone(),
                sender: tx,
            },
        );
        info!(conn_id = %id, user = %user, "Status stream connection registered");

        (id, rx)
    }

    /// Remove a connection; returns false if it was already gone
    pub fn unregister(&self, conn_id: &Uuid) -> bool {
        match self.connections.write().remove(conn_id) {
            Some(conn) => {
                info!(conn_id = %conn_id, user = %conn.user, "Status stream connection removed");
                true
            }
            None => false,
        }
    }

    pub fn connection_count(&self) -> usize {
        self.connections.read().len()
    }

    /// Write one event to every registered connection.
    ///
    /// Returns the number of connections the frame was queued for.
    pub fn deliver(&self, event: &JobStatusEvent) -> usize {
        let text: Utf8Bytes = match serde_json::to_string(event) {
            Ok(json) => json.into(),
            Err(e) => {
                warn!(job_id = %event.id, error = %e, "Failed to serialize job status");
                return 0;
            }
        };

        let mut failed = Vec::new();
        let mut delivered = 0;
        {
            let conns = self.connections.read();
            for (id, conn) in conns.iter() {
                match conn.sender.try_send(Message::Text(text.clone())) {
                    Ok(()) => delivered += 1,
                    Err(e) => {
                        warn!(conn_id = %id, user = %conn.user, error = %e, "Dropping status stream connection");
                        failed.push(*id);
                    }
                }
            }
        }

        if !failed.is_empty() {
            let mut conns = self.connections.write();
            for id in &failed {
                conns.remove(id);
            }
        }

        delivered
    }

    /// Spawn the dispatcher loop that drains published events until `cancel` fires
    pub fn spawn_dispatcher(self: &Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        let hub = Arc::clone(self);
        let mut rx = self.sender.subscribe();

        tokio::spawn(async move {
            info!("Status dispatcher started");
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    received = rx.recv() => match received {
                        Ok(event) => {
                            let delivered = hub.deliver(&event);
                            debug!(job_id = %event.id, status = %event.status, delivered, "Job status dispatched");
                        }
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!(skipped, "Status dispatcher lagged, oldest events dropped");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
            hub.close_all();
            info!("Status dispatcher stopped");
        })
    }

    /// Send a Close frame to every connection and clear the registry
    pub fn close_all(&self) {
        let mut conns = self.connections.write();
        let count = conns.len();
        for conn in conns.values() {
            let _ = conn.sender.try_send(Message::Close(None));
        }
        conns.clear();
        if count > 0 {
            info!(count, "Closed all status stream connections");
        }
    }
}

impl Default for StatusBroadcaster {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY, DEFAULT_CONNECTION_BUFFER)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::JobStatus;
    use std::time::Duration;

    fn event(name: &str, status: JobStatus) -> JobStatusEvent {
        JobStatusEvent::new(Uuid::now_v7(), name, status)
    }

    fn text_of(message: Message) -> String {
        match message {
            Message::Text(text) => text.as_str().to_owned(),
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[test]
    fn test_register_and_unregister() {
        let hub = StatusBroadcaster::default();
        let (id, _rx) = hub.register("alice@example.com");

        assert_eq!(hub.connection_count(), 1);
        assert!(hub.unregister(&id));
        assert!(!hub.unregister(&id));
        assert_eq!(hub.connection_count(), 0);
    }

    #[test]
    fn test_deliver_to_all_connections() {
        let hub = StatusBroadcaster::default();
        let (_a, mut rx_a) = hub.register("a");
        let (_b, mut rx_b) = hub.register("b");

        let delivered = hub.deliver(&event("Add Task", JobStatus::Queued));
        assert_eq!(delivered, 2);

        for rx in [&mut rx_a, &mut rx_b] {
            let frame: serde_json::Value = serde_json::from_str(&text_of(rx.try_recv().unwrap())).unwrap();
            assert_eq!(frame["job"], "Add Task");
            assert_eq!(frame["status"], "queued");
        }
    }

    #[test]
    fn test_closed_connection_is_removed_others_kept() {
        let hub = StatusBroadcaster::default();
        let (_gone, rx_gone) = hub.register("gone");
        let (_alive, mut rx_alive) = hub.register("alive");
        drop(rx_gone);

        let delivered = hub.deliver(&event("Delete Task", JobStatus::Success));

        assert_eq!(delivered, 1);
        assert_eq!(hub.connection_count(), 1);
        assert!(rx_alive.try_recv().is_ok());
    }

    #[test]
    fn test_full_connection_is_removed() {
        let hub = StatusBroadcaster::new(16, 1);
        let (_slow, _rx_slow) = hub.register("slow");

        assert_eq!(hub.deliver(&event("Edit Task", JobStatus::Queued)), 1);
        // Buffer of one is now full
        assert_eq!(hub.deliver(&event("Edit Task", JobStatus::InProgress)), 0);
        assert_eq!(hub.connection_count(), 0);
    }

    #[tokio::test]
    async fn test_dispatcher_forwards_published_events() {
        let hub = Arc::new(StatusBroadcaster::default());
        let cancel = CancellationToken::new();
        let handle = hub.spawn_dispatcher(cancel.clone());
        let (_id, mut rx) = hub.register("observer");

        hub.publish(event("Complete Task", JobStatus::Failure));

        let frame = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(text_of(frame).contains("\"failure\""));

        cancel.cancel();
        handle.await.unwrap();
        assert_eq!(hub.connection_count(), 0);
    }

    #[test]
    fn test_publish_without_subscribers_is_silent() {
        let hub = StatusBroadcaster::default();
        hub.publish(event("Add Task", JobStatus::Queued));
        let mut rx = hub.subscribe();
        hub.publish(event("Add Task", JobStatus::Success));
        assert_eq!(rx.try_recv().unwrap().status, JobStatus::Success);
    }
}
