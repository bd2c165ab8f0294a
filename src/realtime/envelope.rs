use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::db::{OptionId, PollId};
use crate::polls::PollResponse;
use crate::realtime::connection::Frame;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    PollCreated,
    VoteUpdate,
    LikeUpdate,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::PollCreated => "poll_created",
            EventKind::VoteUpdate => "vote_update",
            EventKind::LikeUpdate => "like_update",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VoteUpdate {
    pub poll_id: PollId,
    pub option_id: OptionId,
    /// Votes per option id. Options without votes are absent.
    pub vote_counts: BTreeMap<OptionId, i64>,
    pub total_votes: i64,
}

impl VoteUpdate {
    pub fn new(poll_id: PollId, option_id: OptionId, vote_counts: BTreeMap<OptionId, i64>) -> Self {
        let total_votes = vote_counts.values().sum();
        Self {
            poll_id,
            option_id,
            vote_counts,
            total_votes,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LikeUpdate {
    pub poll_id: PollId,
    pub total_likes: i64,
}

/// Outbound message, serialized as `{"type": ..., "data": {...}}`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Envelope {
    PollCreated(Box<PollResponse>),
    VoteUpdate(VoteUpdate),
    LikeUpdate(LikeUpdate),
}

impl Envelope {
    pub fn kind(&self) -> EventKind {
        match self {
            Envelope::PollCreated(_) => EventKind::PollCreated,
            Envelope::VoteUpdate(_) => EventKind::VoteUpdate,
            Envelope::LikeUpdate(_) => EventKind::LikeUpdate,
        }
    }

    pub fn poll_id(&self) -> PollId {
        match self {
            Envelope::PollCreated(poll) => poll.id,
            Envelope::VoteUpdate(update) => update.poll_id,
            Envelope::LikeUpdate(update) => update.poll_id,
        }
    }

    pub fn to_frame(&self) -> Result<Frame, serde_json::Error> {
        serde_json::to_string(self).map(Frame::from)
    }
}
