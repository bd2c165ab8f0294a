use crate::config::RealtimeConfig;
use crate::db::PollId;
use crate::error::RealtimeError;
use crate::polls::PollResponse;
use crate::realtime::broadcaster::{Broadcaster, DeliveryReport};
use crate::realtime::envelope::{Envelope, LikeUpdate, VoteUpdate};

/// Who hears about a mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudiencePolicy {
    /// Global listeners also receive poll-scoped events (votes, likes).
    pub global_receives_poll_events: bool,
}

impl Default for AudiencePolicy {
    fn default() -> Self {
        Self {
            global_receives_poll_events: true,
        }
    }
}

impl From<&RealtimeConfig> for AudiencePolicy {
    fn from(config: &RealtimeConfig) -> Self {
        Self {
            global_receives_poll_events: config.global_receives_poll_events,
        }
    }
}

/// Turns committed mutations into broadcasts.
///
/// | event        | audience                        |
/// |--------------|---------------------------------|
/// | poll created | global                          |
/// | vote cast    | poll watchers (+ global, policy)|
/// | like changed | poll watchers (+ global, policy)|
///
/// Handlers call this after their write commits. Nothing here can fail the
/// request: delivery problems are logged and swallowed.
#[derive(Clone, Default)]
pub struct EventRouter {
    broadcaster: Broadcaster,
    policy: AudiencePolicy,
}

impl EventRouter {
    pub fn new(broadcaster: Broadcaster, policy: AudiencePolicy) -> Self {
        Self {
            broadcaster,
            policy,
        }
    }

    pub fn broadcaster(&self) -> &Broadcaster {
        &self.broadcaster
    }

    pub fn poll_created(&self, poll: PollResponse) -> DeliveryReport {
        let envelope = Envelope::PollCreated(Box::new(poll));
        self.finish(&envelope, self.broadcaster.broadcast_to_global(&envelope))
    }

    pub fn vote_cast(&self, update: VoteUpdate) -> DeliveryReport {
        self.to_poll(Envelope::VoteUpdate(update))
    }

    pub fn like_changed(&self, poll_id: PollId, total_likes: i64) -> DeliveryReport {
        self.to_poll(Envelope::LikeUpdate(LikeUpdate {
            poll_id,
            total_likes,
        }))
    }

    fn to_poll(&self, envelope: Envelope) -> DeliveryReport {
        let result = self.broadcaster.broadcast_to_poll(
            envelope.poll_id(),
            &envelope,
            self.policy.global_receives_poll_events,
        );
        self.finish(&envelope, result)
    }

    fn finish(
        &self,
        envelope: &Envelope,
        result: Result<DeliveryReport, RealtimeError>,
    ) -> DeliveryReport {
        match result {
            Ok(report) => report,
            Err(e) => {
                error!(
                    kind = %envelope.kind(),
                    poll_id = envelope.poll_id(),
                    "Dropping broadcast: {e}"
                );
                DeliveryReport::default()
            }
        }
    }
}
