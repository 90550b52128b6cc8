//! Subscription-version statuses and the request/notification vocabularies.
//!
//! Wire strings are the registry's spelling (`download-failed-partial`,
//! `NPACCreateFailure`, `SvCreateRequest`, ...). Every enum round-trips
//! through `as_str` / `FromStr` and serializes as that string.

use crate::error::ValidationError;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::str::FromStr;

macro_rules! wire_enum {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident ($kind:literal) {
            $($(#[$vmeta:meta])* $variant:ident => $wire:tt,)+
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        $vis enum $name {
            $($(#[$vmeta])* #[serde(rename = $wire)] $variant,)+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant,)+];

            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $wire,)+
                }
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = ValidationError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($wire => Ok($name::$variant),)+
                    _ => Err(ValidationError::UnknownTag {
                        kind: $kind,
                        tag: s.to_string(),
                    }),
                }
            }
        }
    };
}

wire_enum! {
    /// Per-TN porting state.
    pub enum SvStatus ("subscription status") {
        /// Initial state, assigned on first insert.
        Creating => "creating",
        Pending => "pending",
        Active => "active",
        Conflict => "conflict",
        Sending => "sending",
        DownloadFailed => "download-failed",
        DownloadFailedPartial => "download-failed-partial",
        CancelPending => "cancel-pending",
        DisconnectPending => "disconnect-pending",
        Old => "old",
        Canceled => "canceled",
        NpacCreateFailure => "NPACCreateFailure",
    }
}

impl SvStatus {
    /// `Old` and `Canceled` close a lineage.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Old | Self::Canceled)
    }

    /// Statuses covered by the one-open-lineage-per-(tn, spid) constraint.
    pub fn holds_lineage(self) -> bool {
        !matches!(self, Self::Active | Self::Old | Self::Canceled)
    }
}

wire_enum! {
    pub enum RequestKind ("request type") {
        Create => "SvCreateRequest",
        Release => "SvReleaseRequest",
        ReleaseInConflict => "SvReleaseInConflictRequest",
        Activate => "SvActivateRequest",
        Modify => "SvModifyRequest",
        Disconnect => "SvDisconnectRequest",
        Cancel => "SvCancelRequest",
        CancelAckAsNew => "SvCancelAckAsNewRequest",
        CancelAckAsOld => "SvCancelAckAsOldRequest",
        RemoveFromConflict => "SvRemoveFromConflictRequest",
        Query => "SvQueryRequest",
    }
}

const CREATE_FAMILY_SCOPE: &[SvStatus] = &[
    SvStatus::Conflict,
    SvStatus::Pending,
    SvStatus::Creating,
    SvStatus::NpacCreateFailure,
    SvStatus::Sending,
    SvStatus::DownloadFailedPartial,
    SvStatus::DownloadFailed,
    SvStatus::CancelPending,
    SvStatus::DisconnectPending,
];

const MAINTENANCE_SCOPE: &[SvStatus] = &[
    SvStatus::Conflict,
    SvStatus::Pending,
    SvStatus::Active,
    SvStatus::Sending,
    SvStatus::DownloadFailedPartial,
    SvStatus::DownloadFailed,
    SvStatus::CancelPending,
    SvStatus::DisconnectPending,
];

impl RequestKind {
    /// Create, release and release-in-conflict open a new lineage.
    pub fn is_create_family(self) -> bool {
        matches!(
            self,
            Self::Create | Self::Release | Self::ReleaseInConflict
        )
    }

    pub fn is_release(self) -> bool {
        matches!(self, Self::Release | Self::ReleaseInConflict)
    }

    /// Whether an absent subscription is created rather than rejected.
    pub fn inserts_when_absent(self) -> bool {
        matches!(
            self,
            Self::Create
                | Self::Release
                | Self::ReleaseInConflict
                | Self::Modify
                | Self::Disconnect
        )
    }

    /// Statuses an existing subscription must hold to be found for this request.
    pub fn lookup_scope(self) -> Vec<SvStatus> {
        if self.is_create_family() {
            CREATE_FAMILY_SCOPE.to_vec()
        } else if self == Self::Query {
            let mut scope = CREATE_FAMILY_SCOPE.to_vec();
            for status in MAINTENANCE_SCOPE {
                if !scope.contains(status) {
                    scope.push(*status);
                }
            }
            scope
        } else {
            MAINTENANCE_SCOPE.to_vec()
        }
    }
}

wire_enum! {
    pub enum NotificationKind ("notification type") {
        ObjectCreation => "ObjectCreation",
        CreateAck => "CreateAck",
        CreateFailure => "CreateFailure",
        StatusChange => "StatusChange",
        AttributeChange => "AttributeChange",
        Activate => "Activate",
        PortToOriginal => "PortToOriginal",
        Disconnect => "Disconnect",
        Cancel => "Cancel",
        Sending => "Sending",
        DownloadFailed => "DownloadFailed",
        DownloadFailedPartial => "DownloadFailedPartial",
    }
}

/// Which carrier role the local SPID plays on a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    NewProvider,
    OldProvider,
}

impl Side {
    /// `None` when `spid` matches neither provider.
    pub fn of(spid: &str, onsp: Option<&str>, nnsp: Option<&str>) -> Option<Self> {
        if nnsp == Some(spid) {
            Some(Self::NewProvider)
        } else if onsp == Some(spid) {
            Some(Self::OldProvider)
        } else {
            None
        }
    }

    pub fn opposite(self) -> Self {
        match self {
            Self::NewProvider => Self::OldProvider,
            Self::OldProvider => Self::NewProvider,
        }
    }
}
