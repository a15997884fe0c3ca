//! ClientRegistry: the set of live WebSocket subscribers.
//!
//! Each subscriber is represented by a [`ClientHandle`]: a bounded outbound
//! queue drained by that subscriber's own socket writer task.  The registry
//! never touches a socket.  Fan-out is a non-blocking `try_send` per
//! subscriber, so one slow browser cannot delay the others.
//!
//! # Drop policy
//!
//! A subscriber whose queue is full (it has fallen `queue_depth` events
//! behind) or whose writer task has gone away is removed during the
//! broadcast that discovered it.  Dropping the handle closes the queue, which
//! makes the writer task finish and close the socket.

use std::collections::HashMap;

use elcb_core::ClientCommand;
use tokio::sync::mpsc;
use tracing::{debug, trace};
use uuid::Uuid;

/// Opaque subscriber identity, unique for the process lifetime.
pub type ClientId = Uuid;

/// Sending half of one subscriber's outbound queue.
#[derive(Debug, Clone)]
pub struct ClientHandle {
    id: ClientId,
    outbound: mpsc::Sender<String>,
}

impl ClientHandle {
    /// Creates a handle with a fresh id and a queue of `queue_depth` frames.
    ///
    /// The receiver goes to the subscriber's socket writer.
    pub fn channel(queue_depth: usize) -> (Self, mpsc::Receiver<String>) {
        let (outbound, rx) = mpsc::channel(queue_depth.max(1));
        let handle = Self {
            id: Uuid::new_v4(),
            outbound,
        };
        (handle, rx)
    }

    pub fn id(&self) -> ClientId {
        self.id
    }
}

/// Why a frame was not queued for a subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendFailure {
    /// The subscriber is not registered.
    Unknown,
    /// The subscriber's queue is full.
    Stalled,
    /// The subscriber's writer task has exited.
    Closed,
}

/// Result of one broadcast.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Subscribers the frame was queued for.
    pub delivered: usize,
    /// Subscribers removed because the frame could not be queued.
    pub dropped: Vec<(ClientId, SendFailure)>,
}

/// In-memory registry of connected subscribers.
///
/// Owned by the bridge controller task; no locking is needed.
#[derive(Debug, Default)]
pub struct ClientRegistry {
    clients: HashMap<ClientId, ClientHandle>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a subscriber.  Returns `false` if the id was already present.
    pub fn register(&mut self, handle: ClientHandle) -> bool {
        let id = handle.id;
        if self.clients.contains_key(&id) {
            return false;
        }
        self.clients.insert(id, handle);
        debug!("subscriber {id} registered ({} total)", self.clients.len());
        true
    }

    /// Removes a subscriber.  Unknown ids are ignored.
    pub fn unregister(&mut self, id: ClientId) -> bool {
        let removed = self.clients.remove(&id).is_some();
        if removed {
            debug!("subscriber {id} unregistered ({} remaining)", self.clients.len());
        }
        removed
    }

    /// Queues `frame` for every subscriber.
    ///
    /// Subscribers that cannot accept the frame are unregistered and listed
    /// in the report.
    pub fn broadcast(&mut self, frame: &str) -> BroadcastReport {
        let mut report = BroadcastReport::default();

        for (id, handle) in &self.clients {
            match handle.outbound.try_send(frame.to_owned()) {
                Ok(()) => report.delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    report.dropped.push((*id, SendFailure::Stalled));
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    report.dropped.push((*id, SendFailure::Closed));
                }
            }
        }

        for (id, _) in &report.dropped {
            self.clients.remove(id);
        }

        trace!(
            "broadcast to {} subscriber(s), dropped {}",
            report.delivered,
            report.dropped.len()
        );
        report
    }

    /// Queues `frame` for a single subscriber.
    ///
    /// On `Stalled` or `Closed` the subscriber is unregistered.
    pub fn send_to(&mut self, id: ClientId, frame: &str) -> Result<(), SendFailure> {
        let handle = self.clients.get(&id).ok_or(SendFailure::Unknown)?;
        let failure = match handle.outbound.try_send(frame.to_owned()) {
            Ok(()) => return Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => SendFailure::Stalled,
            Err(mpsc::error::TrySendError::Closed(_)) => SendFailure::Closed,
        };
        self.clients.remove(&id);
        Err(failure)
    }

    /// Interprets a text message from a registered subscriber.
    ///
    /// Returns `None` for unknown senders and for text that is not a
    /// recognised command.
    pub fn receive_from_client(&self, id: ClientId, text: &str) -> Option<ClientCommand> {
        if !self.clients.contains_key(&id) {
            debug!("ignoring message from unregistered subscriber {id}");
            return None;
        }
        let command = ClientCommand::parse(text);
        if command.is_none() {
            trace!("subscriber {id} sent unrecognised text ({} bytes)", text.len());
        }
        command
    }

    pub fn contains(&self, id: ClientId) -> bool {
        self.clients.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn registered(registry: &mut ClientRegistry, depth: usize) -> (ClientId, mpsc::Receiver<String>) {
        let (handle, rx) = ClientHandle::channel(depth);
        let id = handle.id();
        assert!(registry.register(handle));
        (id, rx)
    }

    #[test]
    fn test_register_and_unregister() {
        // Arrange
        let mut registry = ClientRegistry::new();
        let (id, _rx) = registered(&mut registry, 4);

        // Assert
        assert!(registry.contains(id));
        assert_eq!(registry.len(), 1);

        // Act
        assert!(registry.unregister(id));

        // Assert
        assert!(registry.is_empty());
        assert!(!registry.unregister(id), "second unregister is a no-op");
    }

    #[test]
    fn test_register_same_handle_twice_is_rejected() {
        let mut registry = ClientRegistry::new();
        let (handle, _rx) = ClientHandle::channel(4);

        assert!(registry.register(handle.clone()));
        assert!(!registry.register(handle));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_broadcast_reaches_every_subscriber() {
        // Arrange
        let mut registry = ClientRegistry::new();
        let (_a, mut rx_a) = registered(&mut registry, 4);
        let (_b, mut rx_b) = registered(&mut registry, 4);

        // Act
        let report = registry.broadcast(r#"{"type":"hardware_reset"}"#);

        // Assert
        assert_eq!(report.delivered, 2);
        assert!(report.dropped.is_empty());
        assert_eq!(rx_a.try_recv().unwrap(), r#"{"type":"hardware_reset"}"#);
        assert_eq!(rx_b.try_recv().unwrap(), r#"{"type":"hardware_reset"}"#);
    }

    #[test]
    fn test_broadcast_with_no_subscribers_is_noop() {
        let mut registry = ClientRegistry::new();
        let report = registry.broadcast("{}");
        assert_eq!(report, BroadcastReport::default());
    }

    #[test]
    fn test_stalled_subscriber_is_dropped_without_affecting_others() {
        // Arrange: 100 subscribers, #37 never drains its single-slot queue.
        let mut registry = ClientRegistry::new();
        let mut subscribers: Vec<(ClientId, mpsc::Receiver<String>)> =
            (0..100).map(|_| registered(&mut registry, 1)).collect();
        let stalled_id = subscribers[37].0;
        registry.send_to(stalled_id, "backlog").unwrap();

        // Act
        let report = registry.broadcast("frame");

        // Assert
        assert_eq!(report.delivered, 99);
        assert_eq!(report.dropped, vec![(stalled_id, SendFailure::Stalled)]);
        assert!(!registry.contains(stalled_id));
        assert_eq!(registry.len(), 99);
        for (index, (_, rx)) in subscribers.iter_mut().enumerate() {
            let first = rx.try_recv().unwrap();
            if index == 37 {
                assert_eq!(first, "backlog");
            } else {
                assert_eq!(first, "frame");
            }
        }
    }

    #[test]
    fn test_closed_subscriber_is_dropped_on_broadcast() {
        let mut registry = ClientRegistry::new();
        let (gone, rx_gone) = registered(&mut registry, 4);
        let (_alive, mut rx_alive) = registered(&mut registry, 4);
        drop(rx_gone);

        let report = registry.broadcast("frame");

        assert_eq!(report.dropped, vec![(gone, SendFailure::Closed)]);
        assert_eq!(rx_alive.try_recv().unwrap(), "frame");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_send_to_unknown_subscriber() {
        let mut registry = ClientRegistry::new();
        assert_eq!(registry.send_to(Uuid::new_v4(), "x"), Err(SendFailure::Unknown));
    }

    #[test]
    fn test_receive_reset_from_registered_subscriber() {
        let mut registry = ClientRegistry::new();
        let (id, _rx) = registered(&mut registry, 4);

        assert_eq!(registry.receive_from_client(id, "  reset  "), Some(ClientCommand::Reset));
        assert_eq!(registry.receive_from_client(id, "hello"), None);
    }

    #[test]
    fn test_receive_from_unknown_subscriber_is_ignored() {
        let registry = ClientRegistry::new();
        assert_eq!(registry.receive_from_client(Uuid::new_v4(), "RESET"), None);
    }
}
