use std::time::Duration;

use comms::event::Event;
use nanoid::nanoid;
use tokio::sync::mpsc::{self, error::SendTimeoutError};

/// Outcome of handing an event to a single connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// The event is queued for the connection's writer
    Delivered,
    /// The connection's writer is gone, the connection is on its way out
    Closed,
    /// The connection's queue stayed full for the whole timeout
    TimedOut,
}

#[derive(Debug, Clone)]
/// [ConnectionHandle] is the registry's view of one connected client.
///
/// It is created when a client connects and is cloned into the room it joins.
/// Events sent through the handle are queued and written to the client's socket
/// by a writer task owned by the client's session.
pub struct ConnectionHandle {
    /// Unique id of the connection, two handles are the same connection iff their ids match
    id: String,
    /// The queue of events waiting to be written to this client
    outbound_tx: mpsc::Sender<Event>,
}

impl ConnectionHandle {
    /// Create a handle with a fresh id and an outbound queue holding up to `capacity` events
    ///
    /// # Returns
    ///
    /// - The handle which is shared with the registry
    /// - The receiving end of the outbound queue for the connection's writer
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Event>) {
        let (outbound_tx, outbound_rx) = mpsc::channel(capacity);

        (
            ConnectionHandle {
                id: nanoid!(),
                outbound_tx,
            },
            outbound_rx,
        )
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// True once the writer of this connection dropped its end of the queue
    pub fn is_closed(&self) -> bool {
        self.outbound_tx.is_closed()
    }

    /// Queue an event for this connection, waiting at most `timeout` for room in the queue
    pub async fn send(&self, event: Event, timeout: Duration) -> Delivery {
        match self.outbound_tx.send_timeout(event, timeout).await {
            Ok(()) => Delivery::Delivered,
            Err(SendTimeoutError::Closed(_)) => Delivery::Closed,
            Err(SendTimeoutError::Timeout(_)) => Delivery::TimedOut,
        }
    }
}

impl PartialEq for ConnectionHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ConnectionHandle {}
