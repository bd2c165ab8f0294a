use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::db::PollId;

/// A serialized outbound frame, shared by every connection of one broadcast.
pub type Frame = Arc<str>;

/// Unique identity of one live connection. Never reused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn_{}", self.0.simple())
    }
}

/// What a connection is listening to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Subscription {
    Global,
    Poll(PollId),
}

impl From<Option<PollId>> for Subscription {
    fn from(poll_id: Option<PollId>) -> Self {
        match poll_id {
            Some(id) => Subscription::Poll(id),
            None => Subscription::Global,
        }
    }
}

impl fmt::Display for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Subscription::Global => f.write_str("global"),
            Subscription::Poll(id) => write!(f, "poll:{id}"),
        }
    }
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("outbound queue full, client too slow")]
    Backpressure,
    #[error("connection closed")]
    Closed,
}

/// Handle to one client channel.
///
/// The registry holds the only long-lived clone. Once it is dropped the
/// socket task's writer sees its queue close and shuts the socket down.
#[derive(Clone, Debug)]
pub struct Connection {
    id: ConnectionId,
    tx: mpsc::Sender<Frame>,
}

impl Connection {
    /// Open a connection with a bounded outbound queue.
    pub fn open(capacity: usize) -> (Self, mpsc::Receiver<Frame>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let connection = Self {
            id: ConnectionId::new(),
            tx,
        };
        (connection, rx)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// A sender that does not keep the queue alive, for the socket's own replies.
    pub fn downgrade(&self) -> mpsc::WeakSender<Frame> {
        self.tx.downgrade()
    }

    /// Non-blocking enqueue. A full queue counts as a failed delivery.
    pub fn send(&self, frame: Frame) -> Result<(), DeliveryError> {
        self.tx.try_send(frame).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => DeliveryError::Backpressure,
            mpsc::error::TrySendError::Closed(_) => DeliveryError::Closed,
        })
    }
}

impl PartialEq for Connection {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Connection {}

impl Hash for Connection {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}
