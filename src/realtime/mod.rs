//! Live updates over WebSocket.
//!
//! Connections register as global or per-poll listeners; committed mutations
//! go through the [`EventRouter`], which resolves the audience from the
//! [`ConnectionRegistry`] and hands it to the [`Broadcaster`].

pub mod broadcaster;
pub mod connection;
pub mod envelope;
pub mod registry;
pub mod router;
pub mod ws;

pub use broadcaster::{Broadcaster, DeliveryReport};
pub use connection::{Connection, ConnectionId, DeliveryError, Frame, Subscription};
pub use envelope::{Envelope, EventKind, LikeUpdate, VoteUpdate};
pub use registry::{Audience, ConnectionRegistry, RegistryStats};
pub use router::{AudiencePolicy, EventRouter};
pub use ws::ws_handler;
