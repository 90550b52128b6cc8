//! Cancellation sub-classification.

use crate::status::{RequestKind, SvStatus};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum CancelKind {
    /// The port is withdrawn before either side committed.
    #[serde(rename = "CANCEL")]
    Cancel,
    /// The old provider acknowledges a pending cancellation.
    #[serde(rename = "CANCELOLD")]
    CancelOld,
    /// The new provider acknowledges a pending cancellation.
    #[serde(rename = "CANCELNEW")]
    CancelNew,
}

impl CancelKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cancel => "CANCEL",
            Self::CancelOld => "CANCELOLD",
            Self::CancelNew => "CANCELNEW",
        }
    }

    /// The request type logged and queued for a classified cancel.
    pub fn request_kind(self) -> RequestKind {
        match self {
            Self::Cancel => RequestKind::Cancel,
            Self::CancelOld => RequestKind::CancelAckAsOld,
            Self::CancelNew => RequestKind::CancelAckAsNew,
        }
    }
}

impl Display for CancelKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("cannot classify cancellation from status {status} for spid {spid}")]
pub struct Unclassifiable {
    pub status: SvStatus,
    pub spid: String,
}

/// Classify a cancel request against one subscription's current state.
///
/// A cancel-pending subscription where the acting SPID is both providers
/// (an intra-provider port) classifies as the old side.
pub fn classify_cancellation(
    status: SvStatus,
    spid: &str,
    onsp: Option<&str>,
    nnsp: Option<&str>,
) -> Result<CancelKind, Unclassifiable> {
    match status {
        SvStatus::Pending => Ok(CancelKind::Cancel),
        SvStatus::CancelPending if onsp == Some(spid) => Ok(CancelKind::CancelOld),
        SvStatus::CancelPending if nnsp == Some(spid) => Ok(CancelKind::CancelNew),
        _ => Err(Unclassifiable {
            status,
            spid: spid.to_string(),
        }),
    }
}
