//! Out-of-sequence detection for registry notifications.
//!
//! Each subscription keeps two ordering marks, one for attribute changes and
//! one for everything else. A notification is applied only if its token is
//! strictly newer than the mark on its channel; otherwise it is dropped and
//! the TN is reported as out of sequence.
//!
//! The regime decides which token is compared:
//! - `token`: the registry invoke id (live traffic)
//! - `timestamp`: the registry send time (recovery replays, where invoke
//!   ids restart)

use crate::error::ValidationError;
use crate::status::NotificationKind;
use crate::tn::TelephoneNumber;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderingRegime {
    #[default]
    Token,
    Timestamp,
}

impl OrderingRegime {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Token => "token",
            Self::Timestamp => "timestamp",
        }
    }
}

impl Display for OrderingRegime {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum OrderingToken {
    InvokeId(u64),
    SentAt(DateTime<Utc>),
}

impl OrderingToken {
    fn compare(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Self::InvokeId(a), Self::InvokeId(b)) => Some(a.cmp(b)),
            (Self::SentAt(a), Self::SentAt(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

impl Display for OrderingToken {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvokeId(id) => write!(f, "invoke-id {id}"),
            Self::SentAt(at) => write!(f, "sent-at {}", at.to_rfc3339()),
        }
    }
}

/// The two ordering values one notification carries, or one channel stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SequenceMarks {
    pub invoke_id: Option<u64>,
    pub sent_at: Option<DateTime<Utc>>,
}

impl SequenceMarks {
    pub fn new(invoke_id: Option<u64>, sent_at: Option<DateTime<Utc>>) -> Self {
        Self { invoke_id, sent_at }
    }

    pub fn token(&self, regime: OrderingRegime) -> Option<OrderingToken> {
        match regime {
            OrderingRegime::Token => self.invoke_id.map(OrderingToken::InvokeId),
            OrderingRegime::Timestamp => self.sent_at.map(OrderingToken::SentAt),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SequenceChannel {
    Attribute,
    Status,
}

impl SequenceChannel {
    /// Object-creation notifications open a subscription and are never ordered.
    pub fn for_notification(kind: NotificationKind) -> Option<Self> {
        match kind {
            NotificationKind::ObjectCreation => None,
            NotificationKind::AttributeChange => Some(Self::Attribute),
            _ => Some(Self::Status),
        }
    }
}

/// Last-applied marks stored on a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SvMarks {
    pub attribute: SequenceMarks,
    pub status: SequenceMarks,
}

impl SvMarks {
    pub fn channel(&self, channel: SequenceChannel) -> &SequenceMarks {
        match channel {
            SequenceChannel::Attribute => &self.attribute,
            SequenceChannel::Status => &self.status,
        }
    }

    /// Store an accepted notification's marks on its channel.
    pub fn record(&mut self, kind: NotificationKind, incoming: SequenceMarks) {
        match SequenceChannel::for_notification(kind) {
            Some(SequenceChannel::Attribute) => self.attribute = incoming,
            Some(SequenceChannel::Status) => self.status = incoming,
            None => {}
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceVerdict {
    Accept,
    OutOfSequence {
        stored: OrderingToken,
        incoming: OrderingToken,
    },
}

impl SequenceVerdict {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accept)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SequenceGuard {
    regime: OrderingRegime,
}

impl SequenceGuard {
    pub fn new(regime: OrderingRegime) -> Self {
        Self { regime }
    }

    pub fn regime(&self) -> OrderingRegime {
        self.regime
    }

    /// The incoming token under this regime. Missing tokens are a validation
    /// error for every ordered notification kind.
    pub fn incoming_token(
        &self,
        tn: &TelephoneNumber,
        kind: NotificationKind,
        incoming: &SequenceMarks,
    ) -> Result<Option<OrderingToken>, ValidationError> {
        if SequenceChannel::for_notification(kind).is_none() {
            return Ok(incoming.token(self.regime));
        }
        incoming
            .token(self.regime)
            .map(Some)
            .ok_or_else(|| ValidationError::MissingOrderingToken {
                tn: tn.to_string(),
                regime: self.regime.as_str(),
            })
    }

    /// Strict comparison against the stored mark of the notification's
    /// channel. A subscription with no stored mark accepts anything.
    pub fn check(
        &self,
        tn: &TelephoneNumber,
        kind: NotificationKind,
        stored: &SvMarks,
        incoming: &SequenceMarks,
    ) -> Result<SequenceVerdict, ValidationError> {
        let Some(channel) = SequenceChannel::for_notification(kind) else {
            return Ok(SequenceVerdict::Accept);
        };
        let Some(incoming) = self.incoming_token(tn, kind, incoming)? else {
            return Ok(SequenceVerdict::Accept);
        };
        let Some(stored) = stored.channel(channel).token(self.regime) else {
            return Ok(SequenceVerdict::Accept);
        };
        match incoming.compare(&stored) {
            Some(Ordering::Greater) | None => Ok(SequenceVerdict::Accept),
            Some(_) => Ok(SequenceVerdict::OutOfSequence { stored, incoming }),
        }
    }

    pub fn accept(
        &self,
        tn: &TelephoneNumber,
        kind: NotificationKind,
        stored: &SvMarks,
        incoming: &SequenceMarks,
    ) -> Result<bool, ValidationError> {
        Ok(self.check(tn, kind, stored, incoming)?.is_accepted())
    }
}
