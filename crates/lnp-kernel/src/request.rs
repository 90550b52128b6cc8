//! Inbound documents and the validated values built from them.
//!
//! `InboundDocument` is the wire shape (camelCase JSON, tagged by `kind`).
//! `into_submission` validates it once and produces an immutable
//! `Submission`; nothing downstream sees the raw document again.

use crate::error::ValidationError;
use crate::machine::SvEvent;
use crate::range::{TnRange, TnSelection};
use crate::sequence::SequenceMarks;
use crate::status::{NotificationKind, RequestKind, SvStatus};
use crate::tn::TelephoneNumber;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;

pub type Attributes = Map<String, Value>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum InboundDocument {
    Request(RequestDocument),
    Notification(NotificationDocument),
}

/// `{"tn": ...}`, `{"tnRange": ...}` or `{"tnList": [...]}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SubscriptionAddress {
    Tn(TelephoneNumber),
    TnRange(TnRange),
    TnList(Vec<TnRange>),
}

impl SubscriptionAddress {
    fn into_selection(self) -> Result<TnSelection, ValidationError> {
        let selection = match self {
            Self::Tn(tn) => TnSelection::Single(tn),
            Self::TnRange(range) => TnSelection::Range(range),
            Self::TnList(ranges) => TnSelection::List(ranges),
        };
        selection.validate()?;
        Ok(selection)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestDocument {
    pub request_type: RequestKind,
    pub spid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub onsp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nnsp: Option<String>,
    pub subscription: SubscriptionAddress,
    #[serde(default)]
    pub immediate_activation: bool,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub attributes: Attributes,
    /// TNs the upstream field-population rules already rejected.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failed_tns: Vec<TelephoneNumber>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationDocument {
    pub notification_type: NotificationKind,
    pub spid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscription: Option<SubscriptionAddress>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub object_ids: Vec<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invoke_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sent_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<SvStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub onsp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nnsp: Option<String>,
    #[serde(default)]
    pub immediate_activation: bool,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub attributes: Attributes,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub kind: RequestKind,
    pub spid: String,
    pub onsp: Option<String>,
    pub nnsp: Option<String>,
    pub selection: TnSelection,
    pub immediate_activation: bool,
    pub attributes: Attributes,
    pub prevalidation_failures: BTreeSet<TelephoneNumber>,
}

impl Request {
    pub fn event(&self) -> SvEvent {
        SvEvent::Request(self.kind)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationTarget {
    /// Addressed by TN; `object_ids`, when present, are positional per TN.
    Tns {
        selection: TnSelection,
        object_ids: Vec<u64>,
        region: Option<u8>,
    },
    /// Addressed only by registry object ids.
    ObjectIds { ids: Vec<u64>, region: u8 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub kind: NotificationKind,
    pub spid: String,
    pub target: NotificationTarget,
    pub marks: SequenceMarks,
    pub reported: Option<SvStatus>,
    pub onsp: Option<String>,
    pub nnsp: Option<String>,
    pub immediate_activation: bool,
    pub attributes: Attributes,
}

impl Notification {
    pub fn event(&self) -> SvEvent {
        SvEvent::Notification {
            kind: self.kind,
            reported: self.reported,
            immediate_activation: self.immediate_activation,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Submission {
    Request(Request),
    Notification(Notification),
}

impl InboundDocument {
    pub fn from_json(text: &str) -> Result<Self, ValidationError> {
        serde_json::from_str(text).map_err(|e| ValidationError::Document(e.to_string()))
    }

    pub fn into_submission(self) -> Result<Submission, ValidationError> {
        match self {
            Self::Request(doc) => doc.into_request().map(Submission::Request),
            Self::Notification(doc) => doc.into_notification().map(Submission::Notification),
        }
    }
}

impl RequestDocument {
    pub fn into_request(self) -> Result<Request, ValidationError> {
        if self.spid.trim().is_empty() {
            return Err(ValidationError::Document("request carries no spid".to_string()));
        }
        Ok(Request {
            kind: self.request_type,
            spid: self.spid,
            onsp: self.onsp,
            nnsp: self.nnsp,
            selection: self.subscription.into_selection()?,
            immediate_activation: self.immediate_activation,
            attributes: self.attributes,
            prevalidation_failures: self.failed_tns.into_iter().collect(),
        })
    }
}

impl NotificationDocument {
    pub fn into_notification(self) -> Result<Notification, ValidationError> {
        if self.spid.trim().is_empty() {
            return Err(ValidationError::Document(
                "notification carries no spid".to_string(),
            ));
        }
        if self.notification_type == NotificationKind::StatusChange && self.status.is_none() {
            return Err(ValidationError::Document(
                "StatusChange notification carries no status".to_string(),
            ));
        }

        let target = match self.subscription {
            // A start TN plus N object ids names N consecutive stations.
            Some(SubscriptionAddress::Tn(start)) if self.object_ids.len() > 1 => {
                let range = TnRange::from_object_count(start, self.object_ids.len())?;
                NotificationTarget::Tns {
                    selection: TnSelection::Range(range),
                    object_ids: self.object_ids,
                    region: self.region,
                }
            }
            Some(address) => {
                let selection = address.into_selection()?;
                let tns = selection.expand().len();
                if !self.object_ids.is_empty() && self.object_ids.len() != tns {
                    return Err(ValidationError::ObjectIdCount {
                        tns,
                        ids: self.object_ids.len(),
                    });
                }
                NotificationTarget::Tns {
                    selection,
                    object_ids: self.object_ids,
                    region: self.region,
                }
            }
            None => {
                if self.object_ids.is_empty() {
                    return Err(ValidationError::EmptySelection);
                }
                let region = self.region.ok_or_else(|| {
                    ValidationError::Document(
                        "object-id addressed notification carries no region".to_string(),
                    )
                })?;
                NotificationTarget::ObjectIds {
                    ids: self.object_ids,
                    region,
                }
            }
        };

        Ok(Notification {
            kind: self.notification_type,
            spid: self.spid,
            target,
            marks: SequenceMarks::new(self.invoke_id, self.sent_at),
            reported: self.status,
            onsp: self.onsp,
            nnsp: self.nnsp,
            immediate_activation: self.immediate_activation,
            attributes: self.attributes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn submission(text: &str) -> Submission {
        InboundDocument::from_json(text)
            .and_then(InboundDocument::into_submission)
            .unwrap_or_else(|e| panic!("fixture document should validate: {e}"))
    }

    #[test]
    fn request_with_range_and_prevalidation_failures() {
        let Submission::Request(request) = submission(
            r#"{
                "kind": "request",
                "requestType": "SvCreateRequest",
                "spid": "1111",
                "onsp": "2222",
                "nnsp": "1111",
                "subscription": {"tnRange": "530-012-8391-8393"},
                "attributes": {"lnpType": "lspp"},
                "failedTns": ["530-012-8392"]
            }"#,
        ) else {
            panic!("expected a request");
        };
        assert_eq!(request.kind, RequestKind::Create);
        assert_eq!(request.selection.expand().len(), 3);
        assert_eq!(request.attributes["lnpType"], "lspp");
        assert!(
            request
                .prevalidation_failures
                .contains(&"530-012-8392".parse().expect("tn should parse"))
        );
    }

    #[test]
    fn tn_list_may_mix_singles_and_ranges() {
        let Submission::Request(request) = submission(
            r#"{"kind":"request","requestType":"SvCancelRequest","spid":"1111",
                "subscription":{"tnList":["530-012-0001","530-012-0005-0006"]}}"#,
        ) else {
            panic!("expected a request");
        };
        assert_eq!(request.selection.elements().len(), 2);
        assert_eq!(request.selection.expand().len(), 3);
    }

    #[test]
    fn start_tn_with_object_ids_addresses_a_range() {
        let Submission::Notification(notification) = submission(
            r#"{"kind":"notification","notificationType":"ObjectCreation","spid":"1111",
                "subscription":{"tn":"530-012-0098"},"objectIds":[70,71,72],"region":3,
                "invokeId":12}"#,
        ) else {
            panic!("expected a notification");
        };
        match notification.target {
            NotificationTarget::Tns {
                selection: TnSelection::Range(range),
                object_ids,
                region,
            } => {
                assert_eq!(range.to_string(), "530-012-0098-0100");
                assert_eq!(object_ids, vec![70, 71, 72]);
                assert_eq!(region, Some(3));
            }
            other => panic!("expected a range target, got {other:?}"),
        }
        assert_eq!(notification.marks.invoke_id, Some(12));
    }

    #[test]
    fn object_id_addressing_requires_region() {
        let doc = InboundDocument::from_json(
            r#"{"kind":"notification","notificationType":"Activate","spid":"1111","objectIds":[70]}"#,
        )
        .expect("document should parse");
        assert!(matches!(doc.into_submission(), Err(ValidationError::Document(_))));
    }

    #[test]
    fn rejects_inconsistent_documents() {
        let status_change = InboundDocument::from_json(
            r#"{"kind":"notification","notificationType":"StatusChange","spid":"1111",
                "subscription":{"tn":"530-012-0001"},"invokeId":4}"#,
        )
        .expect("document should parse");
        assert!(matches!(status_change.into_submission(), Err(ValidationError::Document(_))));

        let miscounted = InboundDocument::from_json(
            r#"{"kind":"notification","notificationType":"CreateAck","spid":"1111",
                "subscription":{"tnRange":"530-012-0001-0003"},"objectIds":[1,2],"invokeId":4}"#,
        )
        .expect("document should parse");
        assert!(matches!(
            miscounted.into_submission(),
            Err(ValidationError::ObjectIdCount { tns: 3, ids: 2 })
        ));

        let empty_list = InboundDocument::from_json(
            r#"{"kind":"request","requestType":"SvCreateRequest","spid":"1111","subscription":{"tnList":[]}}"#,
        )
        .expect("document should parse");
        assert!(matches!(empty_list.into_submission(), Err(ValidationError::EmptySelection)));

        assert!(matches!(
            InboundDocument::from_json(r#"{"kind":"request","requestType":"SvFrob","spid":"1"}"#),
            Err(ValidationError::Document(_))
        ));
    }
}
