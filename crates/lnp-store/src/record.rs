//! Row types for the persisted state.

use chrono::{DateTime, Utc};
use lnp_kernel::{
    MessageKey, RangeKey, ReferenceKey, RequestKind, SequenceMarks, SvMarks, SvStatus, SvView,
    TelephoneNumber,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// The durable per-TN state record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionVersion {
    pub reference_key: ReferenceKey,
    pub tn: TelephoneNumber,
    pub spid: String,
    pub onsp: Option<String>,
    pub nnsp: Option<String>,
    pub status: SvStatus,
    pub last_request_type: Option<RequestKind>,
    pub object_id: Option<u64>,
    pub region: Option<u8>,
    pub marks: SvMarks,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub activated_at: Option<DateTime<Utc>>,
    pub disconnected_at: Option<DateTime<Utc>>,
    pub canceled_at: Option<DateTime<Utc>>,
    pub old_sp_conflict_resolved_at: Option<DateTime<Utc>>,
    pub new_sp_conflict_resolved_at: Option<DateTime<Utc>>,
}

impl SubscriptionVersion {
    pub fn view(&self) -> SvView {
        SvView {
            status: self.status,
            spid: self.spid.clone(),
            onsp: self.onsp.clone(),
            nnsp: self.nnsp.clone(),
            last_request_type: self.last_request_type,
            activated: self.activated_at.is_some(),
        }
    }
}

/// Column list matching `SubscriptionVersion::from_row`.
pub(crate) const SV_COLUMNS: &str = "reference_key, tn, spid, onsp, nnsp, status, \
    last_request_type, object_id, region, attr_invoke_id, attr_sent_at, status_invoke_id, \
    status_sent_at, created_at, updated_at, activated_at, disconnected_at, canceled_at, \
    old_sp_conflict_resolved_at, new_sp_conflict_resolved_at";

impl SubscriptionVersion {
    pub(crate) fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        let tn: String = row.get(1)?;
        let status: String = row.get(5)?;
        let last_request_type: Option<String> = row.get(6)?;
        Ok(Self {
            reference_key: ReferenceKey(row.get(0)?),
            tn: parse_column(1, &tn)?,
            spid: row.get(2)?,
            onsp: row.get(3)?,
            nnsp: row.get(4)?,
            status: parse_column(5, &status)?,
            last_request_type: last_request_type
                .as_deref()
                .map(|text| parse_column(6, text))
                .transpose()?,
            object_id: row.get(7)?,
            region: row.get(8)?,
            marks: SvMarks {
                attribute: SequenceMarks::new(row.get(9)?, row.get(10)?),
                status: SequenceMarks::new(row.get(11)?, row.get(12)?),
            },
            created_at: row.get(13)?,
            updated_at: row.get(14)?,
            activated_at: row.get(15)?,
            disconnected_at: row.get(16)?,
            canceled_at: row.get(17)?,
            old_sp_conflict_resolved_at: row.get(18)?,
            new_sp_conflict_resolved_at: row.get(19)?,
        })
    }
}

fn parse_column<T>(index: usize, text: &str) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    text.parse::<T>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(index, rusqlite::types::Type::Text, Box::new(e))
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueueStatus {
    #[serde(rename = "Queued")]
    Queued,
    #[serde(rename = "Data Error")]
    DataError,
}

impl QueueStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "Queued",
            Self::DataError => "Data Error",
        }
    }
}

impl Display for QueueStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueueStatus {
    type Err = UnknownQueueStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Queued" => Ok(Self::Queued),
            "Data Error" => Ok(Self::DataError),
            other => Err(UnknownQueueStatus(other.to_string())),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown queue status: {0:?}")]
pub struct UnknownQueueStatus(String);

/// One logged sub-request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub message_key: MessageKey,
    /// `None` for data errors on TNs that never had a subscription.
    pub reference_key: Option<ReferenceKey>,
    pub request_type: String,
    /// TN or range text this message covers.
    pub tns: String,
    pub body: Value,
    pub queue_status: QueueStatus,
    pub created_at: DateTime<Utc>,
}

pub(crate) const MESSAGE_COLUMNS: &str =
    "message_key, reference_key, request_type, tns, body, queue_status, created_at";

impl Message {
    pub(crate) fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        let body: String = row.get(4)?;
        let queue_status: String = row.get(5)?;
        Ok(Self {
            message_key: MessageKey(row.get(0)?),
            reference_key: row.get::<_, Option<i64>>(1)?.map(ReferenceKey),
            request_type: row.get(2)?,
            tns: row.get(3)?,
            body: serde_json::from_str(&body).map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(
                    4,
                    rusqlite::types::Type::Text,
                    Box::new(e),
                )
            })?,
            queue_status: parse_column(5, &queue_status)?,
            created_at: row.get(6)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RangeGroup {
    pub range_key: RangeKey,
    pub request_type: String,
    pub message_key: MessageKey,
    pub tn_range: String,
    pub created_at: DateTime<Utc>,
    pub members: Vec<ReferenceKey>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingAttributeSnapshot {
    pub reference_key: ReferenceKey,
    pub spid: String,
    pub request_type: RequestKind,
    pub attributes: Value,
    pub created_at: DateTime<Utc>,
}

/// A `Queued` message waiting for the registry adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueEntry {
    pub queue_id: i64,
    pub message_key: MessageKey,
    pub request_type: String,
    pub body: Value,
    pub enqueued_at: DateTime<Utc>,
}
