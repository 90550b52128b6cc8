//! The subscription-version state machine.
//!
//! `transition` is a pure function of the current subscription (if any) and
//! one event. It never touches storage: the persister turns the returned
//! `Transition` into row writes.
//!
//! ## Shapes
//!
//! ```text
//! Insert { then }   no usable subscription: insert `creating`, then move to `then`
//! Recreate          NPAC create failure retried: new key, dependents rewritten
//! Update(..)        move an existing subscription, with side effects
//! Ignore            event is a no-op (terminal subscription)
//! ```

use crate::status::{NotificationKind, RequestKind, Side, SvStatus};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// What the machine needs to know about an existing subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SvView {
    pub status: SvStatus,
    pub spid: String,
    pub onsp: Option<String>,
    pub nnsp: Option<String>,
    pub last_request_type: Option<RequestKind>,
    pub activated: bool,
}

impl SvView {
    pub fn side(&self) -> Option<Side> {
        Side::of(&self.spid, self.onsp.as_deref(), self.nnsp.as_deref())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SvEvent {
    Request(RequestKind),
    Notification {
        kind: NotificationKind,
        /// Status carried by status-change and object-creation notifications.
        reported: Option<SvStatus>,
        immediate_activation: bool,
    },
}

impl SvEvent {
    pub fn notification(kind: NotificationKind) -> Self {
        Self::Notification {
            kind,
            reported: None,
            immediate_activation: false,
        }
    }
}

impl Display for SvEvent {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Request(kind) => write!(f, "{kind}"),
            Self::Notification {
                kind,
                reported: Some(status),
                ..
            } => write!(f, "{kind}({status})"),
            Self::Notification { kind, .. } => write!(f, "{kind}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "effect", content = "side")]
pub enum Effect {
    /// Record the request's attributes as a pending-attribute snapshot.
    Snapshot,
    StampActivated,
    StampDisconnected,
    StampCanceled,
    /// Stamp the conflict-resolution time of the given side.
    ConflictResolved(Side),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Update {
    pub next: SvStatus,
    pub effects: Vec<Effect>,
}

impl Update {
    fn to(next: SvStatus) -> Self {
        Self {
            next,
            effects: Vec::new(),
        }
    }

    fn with(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    Insert { then: SvStatus },
    Recreate,
    Update(Update),
    Ignore,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("{event} is not valid for a subscription in status {from}")]
    Invalid { from: SvStatus, event: SvEvent },

    #[error("{event} addresses no known subscription")]
    UnknownSubscription { event: SvEvent },

    #[error("{event} carries no reported status")]
    MissingStatus { event: SvEvent },
}

pub fn transition(
    current: Option<&SvView>,
    event: &SvEvent,
) -> Result<Transition, TransitionError> {
    match *event {
        SvEvent::Request(kind) => request_transition(current, kind, event),
        SvEvent::Notification {
            kind,
            reported,
            immediate_activation,
        } => notification_transition(current, kind, reported, immediate_activation, event),
    }
}

fn request_transition(
    current: Option<&SvView>,
    kind: RequestKind,
    event: &SvEvent,
) -> Result<Transition, TransitionError> {
    use SvStatus::*;

    let sv = match current {
        Some(sv) if !sv.status.is_terminal() => sv,
        _ if kind.inserts_when_absent() => return Ok(Transition::Insert { then: Creating }),
        _ => return Err(TransitionError::UnknownSubscription { event: *event }),
    };
    let kept = Update::to(sv.status);
    let invalid = || TransitionError::Invalid {
        from: sv.status,
        event: *event,
    };

    let update = match kind {
        RequestKind::Create | RequestKind::Release | RequestKind::ReleaseInConflict => {
            match sv.status {
                Creating => kept,
                NpacCreateFailure => return Ok(Transition::Recreate),
                Pending | Conflict | DisconnectPending | Active if !kind.is_release() => {
                    kept.with(Effect::Snapshot)
                }
                _ => kept,
            }
        }
        RequestKind::Modify => match sv.status {
            Pending | Conflict | Active | DisconnectPending => kept.with(Effect::Snapshot),
            _ => return Err(invalid()),
        },
        RequestKind::Disconnect => match sv.status {
            Active => Update::to(DisconnectPending).with(Effect::Snapshot),
            _ => return Err(invalid()),
        },
        RequestKind::Activate => match sv.status {
            Pending => kept,
            _ => return Err(invalid()),
        },
        RequestKind::RemoveFromConflict => match sv.status {
            Conflict => kept,
            _ => return Err(invalid()),
        },
        RequestKind::Cancel => match sv.status {
            Pending | CancelPending => kept,
            _ => return Err(invalid()),
        },
        RequestKind::CancelAckAsNew | RequestKind::CancelAckAsOld => match sv.status {
            CancelPending => kept,
            _ => return Err(invalid()),
        },
        RequestKind::Query => kept,
    };
    Ok(Transition::Update(update))
}

fn notification_transition(
    current: Option<&SvView>,
    kind: NotificationKind,
    reported: Option<SvStatus>,
    immediate_activation: bool,
    event: &SvEvent,
) -> Result<Transition, TransitionError> {
    use SvStatus::*;

    if kind == NotificationKind::ObjectCreation {
        let then = reported.unwrap_or(Pending);
        return match current {
            None => Ok(Transition::Insert { then }),
            Some(sv) if sv.status.is_terminal() => Ok(Transition::Insert { then }),
            Some(sv) if sv.status == Creating => Ok(Transition::Update(activation(sv, then))),
            Some(sv) => Err(TransitionError::Invalid {
                from: sv.status,
                event: *event,
            }),
        };
    }

    let Some(sv) = current else {
        return Err(TransitionError::UnknownSubscription { event: *event });
    };
    let invalid = || TransitionError::Invalid {
        from: sv.status,
        event: *event,
    };

    let update = match kind {
        NotificationKind::ObjectCreation => return Err(invalid()),
        NotificationKind::CreateAck => match sv.status {
            Creating if immediate_activation => activation(sv, Active),
            Creating => Update::to(Pending),
            _ => return Err(invalid()),
        },
        NotificationKind::CreateFailure => match sv.status {
            Creating => Update::to(NpacCreateFailure),
            _ => return Err(invalid()),
        },
        NotificationKind::Activate | NotificationKind::PortToOriginal => match sv.status {
            Pending | Sending | DownloadFailed | DownloadFailedPartial | Active => {
                activation(sv, Active)
            }
            _ => return Err(invalid()),
        },
        NotificationKind::StatusChange => {
            if sv.status.is_terminal() {
                return Ok(Transition::Ignore);
            }
            let next = reported.ok_or(TransitionError::MissingStatus { event: *event })?;
            status_change(sv, next)
        }
        NotificationKind::AttributeChange => {
            if sv.status.is_terminal() {
                return Ok(Transition::Ignore);
            }
            Update::to(sv.status)
        }
        NotificationKind::Disconnect => match sv.status {
            Active | Sending | DownloadFailed | DownloadFailedPartial => {
                Update::to(DisconnectPending)
            }
            _ => return Err(invalid()),
        },
        NotificationKind::Cancel => match sv.status {
            Pending | Conflict | Creating => Update::to(CancelPending),
            _ => return Err(invalid()),
        },
        NotificationKind::Sending => match sv.status {
            Pending | Active | DisconnectPending | DownloadFailed | DownloadFailedPartial => {
                Update::to(Sending)
            }
            _ => return Err(invalid()),
        },
        NotificationKind::DownloadFailed => match sv.status {
            Sending | Active | DownloadFailed | DownloadFailedPartial => Update::to(DownloadFailed),
            _ => return Err(invalid()),
        },
        NotificationKind::DownloadFailedPartial => match sv.status {
            Sending | Active | DownloadFailed | DownloadFailedPartial => {
                Update::to(DownloadFailedPartial)
            }
            _ => return Err(invalid()),
        },
    };
    Ok(Transition::Update(update))
}

fn activation(sv: &SvView, next: SvStatus) -> Update {
    let update = Update::to(next);
    if next == SvStatus::Active && !sv.activated {
        update.with(Effect::StampActivated)
    } else {
        update
    }
}

/// Conflict cleared by a remove-from-conflict request is attributed to the
/// local side; cleared any other way, to the opposite side.
fn status_change(sv: &SvView, next: SvStatus) -> Update {
    let mut update = activation(sv, next);
    match (sv.status, next) {
        (SvStatus::Conflict, SvStatus::Pending) => {
            if let Some(local) = sv.side() {
                let side = if sv.last_request_type == Some(RequestKind::RemoveFromConflict) {
                    local
                } else {
                    local.opposite()
                };
                update.effects.push(Effect::ConflictResolved(side));
            }
        }
        (SvStatus::DisconnectPending, SvStatus::Old) => {
            update.effects.push(Effect::StampDisconnected);
        }
        (_, SvStatus::Canceled) => update.effects.push(Effect::StampCanceled),
        _ => {}
    }
    update
}
