use std::sync::Arc;

use crate::db::PollId;
use crate::error::RealtimeError;
use crate::realtime::connection::{Connection, ConnectionId, Subscription};
use crate::realtime::envelope::Envelope;
use crate::realtime::registry::{Audience, ConnectionRegistry};

/// Outcome of one broadcast.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DeliveryReport {
    pub delivered: usize,
    pub pruned: Vec<ConnectionId>,
}

/// Fans envelopes out to registered connections and prunes the ones that fail.
#[derive(Clone, Default)]
pub struct Broadcaster {
    registry: Arc<ConnectionRegistry>,
}

impl Broadcaster {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    pub fn connect(
        &self,
        connection: Connection,
        poll_id: Option<PollId>,
    ) -> Result<Subscription, RealtimeError> {
        let target = Subscription::from(poll_id);
        self.registry.register(connection, target)?;
        self.registry.log_state("connected", Some(target));
        Ok(target)
    }

    pub fn disconnect(&self, id: &ConnectionId) -> Option<Subscription> {
        let removed = self.registry.unregister(id);
        if removed.is_some() {
            self.registry.log_state("disconnected", removed);
        }
        removed
    }

    /// Send to everyone watching `poll_id`, plus global listeners when asked.
    pub fn broadcast_to_poll(
        &self,
        poll_id: PollId,
        envelope: &Envelope,
        include_global: bool,
    ) -> Result<DeliveryReport, RealtimeError> {
        let mut audience = self.registry.poll_audience(poll_id);
        if include_global {
            audience.merge(self.registry.global_audience());
        }
        self.deliver(&audience, envelope)
    }

    pub fn broadcast_to_global(&self, envelope: &Envelope) -> Result<DeliveryReport, RealtimeError> {
        let audience = self.registry.global_audience();
        self.deliver(&audience, envelope)
    }

    pub fn broadcast_to_all(&self, envelope: &Envelope) -> Result<DeliveryReport, RealtimeError> {
        let audience = self.registry.all_connections();
        self.deliver(&audience, envelope)
    }

    /// Deliver one envelope to each connection of `audience`.
    ///
    /// Failures are collected during the pass and pruned afterwards. Only a
    /// serialization failure is returned as an error, and it prunes nobody.
    pub fn deliver(
        &self,
        audience: &Audience,
        envelope: &Envelope,
    ) -> Result<DeliveryReport, RealtimeError> {
        if audience.is_empty() {
            return Ok(DeliveryReport::default());
        }

        let frame = envelope.to_frame().map_err(|source| RealtimeError::Serialize {
            kind: envelope.kind(),
            poll_id: envelope.poll_id(),
            source,
        })?;

        let mut report = DeliveryReport::default();
        let mut failed = Vec::new();

        for connection in audience.iter() {
            match connection.send(frame.clone()) {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    warn!(
                        connection_id = %connection.id(),
                        kind = %envelope.kind(),
                        poll_id = envelope.poll_id(),
                        "Error broadcasting: {e}"
                    );
                    failed.push(connection.id());
                }
            }
        }

        for id in failed {
            if let Some(target) = self.registry.unregister(&id) {
                self.registry.log_state("pruned", Some(target));
                report.pruned.push(id);
            }
        }

        debug!(
            kind = %envelope.kind(),
            delivered = report.delivered,
            pruned = report.pruned.len(),
            "Broadcast complete"
        );
        Ok(report)
    }
}
