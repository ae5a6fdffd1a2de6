//! # Vote Ledger
//!
//! Every (user, target) pair holds at most one active vote. Casting the same
//! vote twice retracts it, casting the opposite vote flips it. Counters move by
//! deltas only, so concurrent voters commute.
//!
//! The transition itself is pure. Stores call [`VoteState::transition`] inside
//! the transaction that reads the current record and writes the counter.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, Result};

/// A single up or down vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VoteValue {
    Up,
    Down,
}

impl VoteValue {
    pub fn delta(self) -> i64 {
        match self {
            VoteValue::Up => 1,
            VoteValue::Down => -1,
        }
    }
}

impl TryFrom<i64> for VoteValue {
    type Error = AppError;

    fn try_from(raw: i64) -> Result<Self> {
        match raw {
            1 => Ok(VoteValue::Up),
            -1 => Ok(VoteValue::Down),
            other => Err(AppError::ValidationError(format!(
                "vote must be 1 or -1, got {other}"
            ))),
        }
    }
}

impl From<VoteValue> for i64 {
    fn from(v: VoteValue) -> i64 {
        v.delta()
    }
}

impl Serialize for VoteValue {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        s.serialize_i64(self.delta())
    }
}

impl<'de> Deserialize<'de> for VoteValue {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let raw = i64::deserialize(d)?;
        VoteValue::try_from(raw).map_err(serde::de::Error::custom)
    }
}

/// The state of one (user, target) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteState {
    NoVote,
    Voted(VoteValue),
}

impl From<Option<VoteValue>> for VoteState {
    fn from(v: Option<VoteValue>) -> Self {
        v.map_or(VoteState::NoVote, VoteState::Voted)
    }
}

/// What a store must do to apply one incoming vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoteTransition {
    /// Amount to add to the target's counter.
    pub delta: i64,
    /// The vote record after the transition; `None` means delete it.
    pub next: Option<VoteValue>,
}

impl VoteState {
    pub fn transition(self, incoming: VoteValue) -> VoteTransition {
        match self {
            VoteState::NoVote => VoteTransition {
                delta: incoming.delta(),
                next: Some(incoming),
            },
            VoteState::Voted(current) if current == incoming => VoteTransition {
                delta: -current.delta(),
                next: None,
            },
            VoteState::Voted(current) => VoteTransition {
                delta: incoming.delta() - current.delta(),
                next: Some(incoming),
            },
        }
    }
}

/// The thing being voted on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VoteTarget {
    Post(Uuid),
    Comment { post_id: Uuid, comment_id: Uuid },
}

impl VoteTarget {
    pub fn post_id(&self) -> Uuid {
        match self {
            VoteTarget::Post(id) => *id,
            VoteTarget::Comment { post_id, .. } => *post_id,
        }
    }
}

/// One vote request after validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoteCast {
    pub user_id: String,
    pub target: VoteTarget,
    pub value: VoteValue,
}

/// Result of applying a [`VoteCast`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoteOutcome {
    pub previous: Option<VoteValue>,
    pub current: Option<VoteValue>,
    /// The target's counter after the update.
    pub count: i64,
}

/// A stored vote, as listed in a user's vote history.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteRecord {
    pub post_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment_id: Option<Uuid>,
    pub vote: VoteValue,
    pub updated_at: DateTime<Utc>,
}
