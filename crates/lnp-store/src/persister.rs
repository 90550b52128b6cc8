//! Batch persistence: one submission, many TNs, one atomic write.
//!
//! `apply` runs in two phases against the same open scope:
//!
//! 1. **plan**: split the submission, look up every TN, run the sequence
//!    guard, the state machine and the cancellation classifier. Per-TN
//!    rejections are decided here, before anything is written.
//! 2. **write**: allocate keys, insert/update/recreate subscriptions, then
//!    log messages, range groups and the outbound queue.
//!
//! Any store error in the write phase aborts the batch; the caller's scope
//! rolls everything back.

use crate::correlation::{CorrelationStore, NewMessage, NewSubscription, StoreError, SvChange};
use crate::record::{QueueStatus, SubscriptionVersion};
use crate::splitter::{RequestSplitter, SplitBatch, TnItem};
use chrono::{DateTime, Utc};
use lnp_kernel::{
    Attributes, CancelKind, Effect, EngineConfig, MessageKey, Notification, ReferenceKey,
    Request, RequestKind, SequenceChannel, SequenceGuard, SequenceVerdict, Side, Submission,
    SvEvent, SvMarks, SvStatus, TelephoneNumber, TnRange, Transition, TransitionError, Update,
    ValidationError, classify_cancellation, collapse, transition,
};
use serde::Serialize;
use serde_json::{Map, Value, json};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{Display, Formatter};

const SIMPLE_PORT_INDICATORS: [&str; 2] = ["nnspSimplePortIndicator", "onspSimplePortIndicator"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum RejectionReason {
    /// Rejected upstream by field-population rules.
    Prevalidation,
    UnknownSubscription,
    InvalidTransition { status: SvStatus, event: String },
    Unclassifiable { status: SvStatus },
    MissingStatus { event: String },
}

impl Display for RejectionReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Prevalidation => write!(f, "failed pre-validation"),
            Self::UnknownSubscription => write!(f, "unknown subscription"),
            Self::InvalidTransition { status, event } => {
                write!(f, "{event} is not valid in status {status}")
            }
            Self::Unclassifiable { status } => {
                write!(f, "cancellation cannot be classified in status {status}")
            }
            Self::MissingStatus { event } => write!(f, "{event} reports no status"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TnRejection {
    pub tn: TelephoneNumber,
    pub reference_key: Option<ReferenceKey>,
    #[serde(flatten)]
    pub reason: RejectionReason,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Reassignment {
    pub tn: TelephoneNumber,
    pub from: ReferenceKey,
    pub to: ReferenceKey,
    pub messages: usize,
    pub range_members: usize,
    pub snapshots: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    /// Accepted TNs and their correlation keys.
    pub correlation: BTreeMap<TelephoneNumber, ReferenceKey>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub rejected: Vec<TnRejection>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub out_of_sequence: Vec<TelephoneNumber>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub unresolved_object_ids: Vec<u64>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub cancel_kinds: BTreeMap<TelephoneNumber, CancelKind>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub reassigned: Vec<Reassignment>,
    pub messages: Vec<MessageKey>,
}

/// The caller always gets either every TN correlated, or a report naming
/// which TNs were rejected and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "report", rename_all = "snake_case")]
pub enum BatchResult {
    Complete(BatchReport),
    Partial(BatchReport),
}

impl BatchResult {
    pub fn report(&self) -> &BatchReport {
        match self {
            Self::Complete(report) | Self::Partial(report) => report,
        }
    }

    pub fn into_report(self) -> BatchReport {
        match self {
            Self::Complete(report) | Self::Partial(report) => report,
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Complete(_))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("reassigning reference key {old} for {tn} failed: {source}")]
    Reassign {
        tn: TelephoneNumber,
        old: ReferenceKey,
        #[source]
        source: StoreError,
    },
}

#[derive(Debug, Clone)]
enum Op {
    Insert { then: SvStatus },
    Recreate { old: ReferenceKey },
    Update { key: ReferenceKey, update: Update },
    Ignore { key: ReferenceKey },
}

#[derive(Debug, Clone)]
struct PlannedTn {
    tn: TelephoneNumber,
    object_id: Option<u64>,
    region: Option<u8>,
    op: Op,
    cancel_kind: Option<CancelKind>,
}

#[derive(Debug, Clone)]
enum Outcome {
    Accepted(PlannedTn),
    Rejected(TnRejection),
    OutOfSequence(TelephoneNumber),
}

#[derive(Debug, Clone)]
struct PlannedElement {
    range: TnRange,
    outcomes: Vec<Outcome>,
}

/// Everything decided before the first write.
#[derive(Debug, Clone)]
pub struct BatchPlan {
    elements: Vec<PlannedElement>,
    unresolved_object_ids: Vec<u64>,
}

impl BatchPlan {
    pub fn rejected_count(&self) -> usize {
        self.outcomes()
            .filter(|o| matches!(o, Outcome::Rejected(_)))
            .count()
    }

    pub fn accepted_count(&self) -> usize {
        self.outcomes()
            .filter(|o| matches!(o, Outcome::Accepted(_)))
            .count()
    }

    fn outcomes(&self) -> impl Iterator<Item = &Outcome> {
        self.elements.iter().flat_map(|e| e.outcomes.iter())
    }
}

pub struct BatchPersister<'a> {
    config: &'a EngineConfig,
    guard: SequenceGuard,
}

impl<'a> BatchPersister<'a> {
    pub fn new(config: &'a EngineConfig) -> Self {
        Self {
            config,
            guard: SequenceGuard::new(config.ordering_regime),
        }
    }

    pub fn apply(
        &self,
        store: &CorrelationStore<'_>,
        submission: &Submission,
    ) -> Result<BatchResult, PersistError> {
        let plan = self.plan(store, submission)?;
        self.write(store, submission, plan)
    }

    pub fn plan(
        &self,
        store: &CorrelationStore<'_>,
        submission: &Submission,
    ) -> Result<BatchPlan, PersistError> {
        let splitter = RequestSplitter::new(self.config);
        match submission {
            Submission::Request(request) => {
                let batch = splitter.split_request(store, request)?;
                Ok(self.plan_request(request, batch))
            }
            Submission::Notification(notification) => {
                let batch = splitter.split_notification(store, notification)?;
                self.plan_notification(notification, batch)
            }
        }
    }

    fn plan_request(&self, request: &Request, batch: SplitBatch) -> BatchPlan {
        let event = request.event();
        let elements = batch
            .elements
            .into_iter()
            .map(|element| PlannedElement {
                range: element.range,
                outcomes: element
                    .items
                    .into_iter()
                    .map(|item| self.plan_request_tn(request, &event, item))
                    .collect(),
            })
            .collect();
        BatchPlan {
            elements,
            unresolved_object_ids: Vec::new(),
        }
    }

    fn plan_request_tn(&self, request: &Request, event: &SvEvent, item: TnItem) -> Outcome {
        let key = item.current.as_ref().map(|sv| sv.reference_key);
        if request.prevalidation_failures.contains(&item.tn) {
            return reject(&item, RejectionReason::Prevalidation);
        }

        let view = item.current.as_ref().map(SubscriptionVersion::view);
        let transition = match transition(view.as_ref(), event) {
            Ok(transition) => transition,
            Err(err) => return reject(&item, rejection_reason(err)),
        };

        let mut cancel_kind = None;
        if request.kind == RequestKind::Cancel
            && let Some(sv) = &item.current
        {
            let onsp = sv.onsp.as_deref().or(request.onsp.as_deref());
            let nnsp = sv.nnsp.as_deref().or(request.nnsp.as_deref());
            match classify_cancellation(sv.status, &request.spid, onsp, nnsp) {
                Ok(kind) => cancel_kind = Some(kind),
                Err(err) => {
                    tracing::warn!(tn = %item.tn, error = %err, "cancellation not classifiable");
                    return reject(&item, RejectionReason::Unclassifiable { status: err.status });
                }
            }
        }

        match op_for(transition, key) {
            Some(op) => Outcome::Accepted(PlannedTn {
                tn: item.tn,
                object_id: None,
                region: None,
                op,
                cancel_kind,
            }),
            None => reject(&item, RejectionReason::UnknownSubscription),
        }
    }

    fn plan_notification(
        &self,
        notification: &Notification,
        batch: SplitBatch,
    ) -> Result<BatchPlan, PersistError> {
        let event = notification.event();
        let mut elements = Vec::with_capacity(batch.elements.len());
        for element in batch.elements {
            let mut outcomes = Vec::with_capacity(element.items.len());
            for item in element.items {
                outcomes.push(self.plan_notification_tn(notification, &event, item)?);
            }
            elements.push(PlannedElement {
                range: element.range,
                outcomes,
            });
        }
        Ok(BatchPlan {
            elements,
            unresolved_object_ids: batch.unresolved_object_ids,
        })
    }

    fn plan_notification_tn(
        &self,
        notification: &Notification,
        event: &SvEvent,
        item: TnItem,
    ) -> Result<Outcome, PersistError> {
        let stored = item
            .current
            .as_ref()
            .map(|sv| sv.marks)
            .unwrap_or_default();
        let verdict = self
            .guard
            .check(&item.tn, notification.kind, &stored, &notification.marks)?;
        if let SequenceVerdict::OutOfSequence { stored, incoming } = verdict {
            tracing::warn!(
                tn = %item.tn,
                notification = %notification.kind,
                stored = %stored,
                incoming = %incoming,
                "out-of-sequence notification dropped"
            );
            return Ok(Outcome::OutOfSequence(item.tn));
        }

        let key = item.current.as_ref().map(|sv| sv.reference_key);
        let view = item.current.as_ref().map(SubscriptionVersion::view);
        let transition = match transition(view.as_ref(), event) {
            Ok(transition) => transition,
            Err(err) => return Ok(reject(&item, rejection_reason(err))),
        };
        Ok(match op_for(transition, key) {
            Some(op) => Outcome::Accepted(PlannedTn {
                tn: item.tn,
                object_id: item.object_id,
                region: item.region,
                op,
                cancel_kind: None,
            }),
            None => reject(&item, RejectionReason::UnknownSubscription),
        })
    }

    pub fn write(
        &self,
        store: &CorrelationStore<'_>,
        submission: &Submission,
        plan: BatchPlan,
    ) -> Result<BatchResult, PersistError> {
        let now = Utc::now();
        let mut report = BatchReport {
            unresolved_object_ids: plan.unresolved_object_ids.clone(),
            ..BatchReport::default()
        };

        for outcome in plan.outcomes() {
            match outcome {
                Outcome::Accepted(planned) => {
                    let key = self.write_tn(store, submission, planned, now, &mut report)?;
                    report.correlation.insert(planned.tn, key);
                    if let Some(kind) = planned.cancel_kind {
                        report.cancel_kinds.insert(planned.tn, kind);
                    }
                }
                Outcome::Rejected(rejection) => {
                    tracing::info!(tn = %rejection.tn, reason = %rejection.reason, "TN rejected");
                    report.rejected.push(rejection.clone());
                }
                Outcome::OutOfSequence(tn) => report.out_of_sequence.push(*tn),
            }
        }

        if let Submission::Request(request) = submission {
            let mut log = MessageLog {
                store,
                request,
                now,
                report: &mut report,
            };
            if request.kind == RequestKind::Cancel {
                log.cancel_messages(&plan)?;
            } else {
                log.element_messages(&plan)?;
            }
        }

        tracing::debug!(
            accepted = report.correlation.len(),
            rejected = report.rejected.len(),
            out_of_sequence = report.out_of_sequence.len(),
            messages = report.messages.len(),
            "batch written"
        );
        if report.rejected.is_empty() && report.unresolved_object_ids.is_empty() {
            Ok(BatchResult::Complete(report))
        } else {
            Ok(BatchResult::Partial(report))
        }
    }

    fn write_tn(
        &self,
        store: &CorrelationStore<'_>,
        submission: &Submission,
        planned: &PlannedTn,
        now: DateTime<Utc>,
        report: &mut BatchReport,
    ) -> Result<ReferenceKey, PersistError> {
        let tn = planned.tn;
        match &planned.op {
            Op::Insert { then } => {
                let key = store.allocate_reference_key()?;
                store.insert_subscription(&self.new_subscription(submission, planned, key, now))?;
                tracing::debug!(tn = %tn, reference_key = %key, "subscription inserted");
                let change = self.change_for(submission, planned, *then, &[], now);
                if *then != SvStatus::Creating || has_marks(&change) {
                    store.update_subscription(key, &change, now)?;
                }
                Ok(key)
            }
            Op::Recreate { old } => {
                let key = store.allocate_reference_key()?;
                let moved = store
                    .reassign(*old, key)
                    .map_err(|source| PersistError::Reassign {
                        tn,
                        old: *old,
                        source,
                    })?;
                store.insert_subscription(&self.new_subscription(submission, planned, key, now))?;
                tracing::info!(
                    tn = %tn,
                    old_reference_key = %old,
                    reference_key = %key,
                    messages = moved.messages,
                    range_members = moved.range_members,
                    "reference key reassigned after registry create failure"
                );
                report.reassigned.push(Reassignment {
                    tn,
                    from: *old,
                    to: key,
                    messages: moved.messages,
                    range_members: moved.range_members,
                    snapshots: moved.snapshots,
                });
                Ok(key)
            }
            Op::Update { key, update } => {
                let read_only = matches!(
                    submission,
                    Submission::Request(r) if r.kind == RequestKind::Query
                );
                if !read_only {
                    let change =
                        self.change_for(submission, planned, update.next, &update.effects, now);
                    store.update_subscription(*key, &change, now)?;
                    tracing::debug!(
                        tn = %tn,
                        reference_key = %key,
                        status = %update.next,
                        "subscription updated"
                    );
                }
                if update.effects.contains(&Effect::Snapshot)
                    && let Submission::Request(request) = submission
                {
                    let attributes = self.snapshot_attributes(&tn, &request.attributes);
                    store.insert_snapshot(*key, &request.spid, request.kind, &attributes, now)?;
                }
                Ok(*key)
            }
            Op::Ignore { key } => {
                tracing::debug!(
                    tn = %tn,
                    reference_key = %key,
                    "notification ignored on closed subscription"
                );
                Ok(*key)
            }
        }
    }

    fn new_subscription<'s>(
        &self,
        submission: &'s Submission,
        planned: &PlannedTn,
        key: ReferenceKey,
        now: DateTime<Utc>,
    ) -> NewSubscription<'s> {
        let (spid, onsp, nnsp, last_request_type) = match submission {
            Submission::Request(r) => (&r.spid, &r.onsp, &r.nnsp, Some(r.kind)),
            Submission::Notification(n) => (&n.spid, &n.onsp, &n.nnsp, None),
        };
        NewSubscription {
            reference_key: key,
            tn: planned.tn,
            spid,
            onsp: onsp.as_deref(),
            nnsp: nnsp.as_deref(),
            last_request_type,
            object_id: planned.object_id,
            region: planned.region,
            at: now,
        }
    }

    fn change_for(
        &self,
        submission: &Submission,
        planned: &PlannedTn,
        next: SvStatus,
        effects: &[Effect],
        now: DateTime<Utc>,
    ) -> SvChange {
        let mut change = SvChange {
            status: Some(next),
            ..SvChange::default()
        };
        match submission {
            Submission::Request(request) => {
                change.last_request_type = Some(request.kind);
                change.onsp = request.onsp.clone();
                change.nnsp = request.nnsp.clone();
            }
            Submission::Notification(notification) => {
                change.onsp = notification.onsp.clone();
                change.nnsp = notification.nnsp.clone();
                change.object_id = planned.object_id;
                change.region = planned.region;
                let mut marks = SvMarks::default();
                marks.record(notification.kind, notification.marks);
                match SequenceChannel::for_notification(notification.kind) {
                    Some(SequenceChannel::Attribute) => {
                        change.attribute_marks = Some(marks.attribute)
                    }
                    Some(SequenceChannel::Status) => change.status_marks = Some(marks.status),
                    None => {}
                }
            }
        }
        for effect in effects {
            match effect {
                Effect::Snapshot => {}
                Effect::StampActivated => change.activated_at = Some(now),
                Effect::StampDisconnected => change.disconnected_at = Some(now),
                Effect::StampCanceled => change.canceled_at = Some(now),
                Effect::ConflictResolved(Side::OldProvider) => {
                    change.old_sp_conflict_resolved_at = Some(now)
                }
                Effect::ConflictResolved(Side::NewProvider) => {
                    change.new_sp_conflict_resolved_at = Some(now)
                }
            }
        }
        change
    }

    /// Simple-port indicators are not kept for Canadian NPAs or when the
    /// capability is off.
    fn snapshot_attributes(&self, tn: &TelephoneNumber, attributes: &Attributes) -> Attributes {
        let mut attributes = attributes.clone();
        if !self.config.capabilities.keeps_simple_port_indicator(tn) {
            for name in SIMPLE_PORT_INDICATORS {
                attributes.remove(name);
            }
        }
        attributes
    }
}

fn has_marks(change: &SvChange) -> bool {
    change.attribute_marks.is_some() || change.status_marks.is_some()
}

fn reject(item: &TnItem, reason: RejectionReason) -> Outcome {
    Outcome::Rejected(TnRejection {
        tn: item.tn,
        reference_key: item.current.as_ref().map(|sv| sv.reference_key),
        reason,
    })
}

fn rejection_reason(err: TransitionError) -> RejectionReason {
    match err {
        TransitionError::Invalid { from, event } => RejectionReason::InvalidTransition {
            status: from,
            event: event.to_string(),
        },
        TransitionError::UnknownSubscription { .. } => RejectionReason::UnknownSubscription,
        TransitionError::MissingStatus { event } => RejectionReason::MissingStatus {
            event: event.to_string(),
        },
    }
}

fn op_for(transition: Transition, key: Option<ReferenceKey>) -> Option<Op> {
    match (transition, key) {
        (Transition::Insert { then }, _) => Some(Op::Insert { then }),
        (Transition::Recreate, Some(old)) => Some(Op::Recreate { old }),
        (Transition::Update(update), Some(key)) => Some(Op::Update { key, update }),
        (Transition::Ignore, Some(key)) => Some(Op::Ignore { key }),
        _ => None,
    }
}

/// Writes the message rows for one request batch.
struct MessageLog<'r, 'c> {
    store: &'r CorrelationStore<'c>,
    request: &'r Request,
    now: DateTime<Utc>,
    report: &'r mut BatchReport,
}

impl MessageLog<'_, '_> {
    /// A range element that resolved uniformly logs one message and a range
    /// group; anything else logs one message per TN.
    fn element_messages(&mut self, plan: &BatchPlan) -> Result<(), StoreError> {
        for element in &plan.elements {
            let all_accepted = element.outcomes.iter().all(|o| matches!(o, Outcome::Accepted(_)));
            let all_rejected = element.outcomes.iter().all(|o| matches!(o, Outcome::Rejected(_)));
            let whole_range =
                !element.range.is_single() && element.outcomes.len() == element.range.len();

            if whole_range && (all_accepted || all_rejected) {
                let members: Vec<ReferenceKey> = element
                    .outcomes
                    .iter()
                    .filter_map(|o| self.outcome_key(o))
                    .collect();
                let (status, reason) = if all_accepted {
                    (QueueStatus::Queued, None)
                } else {
                    (QueueStatus::DataError, first_reason(&element.outcomes))
                };
                self.range_message(&element.range, &members, status, None, reason)?;
                continue;
            }

            for outcome in &element.outcomes {
                self.tn_message(outcome, None)?;
            }
        }
        Ok(())
    }

    /// Cancels are classified per TN. Accepted TNs collapse back to one
    /// message only when they share a classification and form one range.
    fn cancel_messages(&mut self, plan: &BatchPlan) -> Result<(), StoreError> {
        let accepted: Vec<&PlannedTn> = plan
            .outcomes()
            .filter_map(|o| match o {
                Outcome::Accepted(planned) => Some(planned),
                _ => None,
            })
            .collect();
        let kinds: BTreeSet<Option<CancelKind>> = accepted.iter().map(|p| p.cancel_kind).collect();
        let shared_kind = match kinds.len() {
            1 => kinds.first().copied().flatten(),
            _ => None,
        };
        let ranges = collapse(accepted.iter().map(|p| p.tn));

        if let (Some(kind), [range]) = (shared_kind, ranges.as_slice())
            && !range.is_single()
        {
            let members: Vec<ReferenceKey> = accepted
                .iter()
                .filter_map(|p| self.report.correlation.get(&p.tn).copied())
                .collect();
            tracing::debug!(range = %range, cancel_kind = %kind, "cancellation re-collapsed");
            self.range_message(range, &members, QueueStatus::Queued, Some(kind), None)?;
        } else {
            for planned in &accepted {
                self.tn_message(&Outcome::Accepted((*planned).clone()), planned.cancel_kind)?;
            }
        }

        for outcome in plan.outcomes() {
            if matches!(outcome, Outcome::Rejected(_)) {
                self.tn_message(outcome, None)?;
            }
        }
        Ok(())
    }

    fn outcome_key(&self, outcome: &Outcome) -> Option<ReferenceKey> {
        match outcome {
            Outcome::Accepted(planned) => self.report.correlation.get(&planned.tn).copied(),
            Outcome::Rejected(rejection) => rejection.reference_key,
            Outcome::OutOfSequence(_) => None,
        }
    }

    fn range_message(
        &mut self,
        range: &TnRange,
        members: &[ReferenceKey],
        status: QueueStatus,
        cancel_kind: Option<CancelKind>,
        reason: Option<&RejectionReason>,
    ) -> Result<(), StoreError> {
        let reference_key = members.first().copied();
        let request_type = self.request_type(cancel_kind);
        let body = self.body(range, reference_key, cancel_kind, reason);
        let message_key = self.store.insert_message(&NewMessage {
            reference_key,
            request_type: request_type.as_str(),
            tns: range.to_string(),
            body: &body,
            queue_status: status,
            at: self.now,
        })?;
        let range_key = self.store.insert_range_group(
            request_type.as_str(),
            message_key,
            &range.to_string(),
            members,
            self.now,
        )?;
        tracing::debug!(
            range = %range,
            message_key = %message_key,
            range_key = range_key.0,
            queue_status = %status,
            "range message logged"
        );
        self.report.messages.push(message_key);
        Ok(())
    }

    fn tn_message(
        &mut self,
        outcome: &Outcome,
        cancel_kind: Option<CancelKind>,
    ) -> Result<(), StoreError> {
        let (tn, status, reason) = match outcome {
            Outcome::Accepted(planned) => (planned.tn, QueueStatus::Queued, None),
            Outcome::Rejected(rejection) => {
                (rejection.tn, QueueStatus::DataError, Some(&rejection.reason))
            }
            Outcome::OutOfSequence(_) => return Ok(()),
        };
        let reference_key = self.outcome_key(outcome);
        let range = TnRange::single(tn);
        let body = self.body(&range, reference_key, cancel_kind, reason);
        let message_key = self.store.insert_message(&NewMessage {
            reference_key,
            request_type: self.request_type(cancel_kind).as_str(),
            tns: tn.to_string(),
            body: &body,
            queue_status: status,
            at: self.now,
        })?;
        self.report.messages.push(message_key);
        Ok(())
    }

    /// Classified cancels are logged under the acknowledging side's type.
    fn request_type(&self, cancel_kind: Option<CancelKind>) -> RequestKind {
        cancel_kind.map_or(self.request.kind, CancelKind::request_kind)
    }

    fn body(
        &self,
        range: &TnRange,
        reference_key: Option<ReferenceKey>,
        cancel_kind: Option<CancelKind>,
        reason: Option<&RejectionReason>,
    ) -> Value {
        let request = self.request;
        let mut body = Map::new();
        body.insert("requestType".into(), json!(self.request_type(cancel_kind)));
        body.insert("spid".into(), json!(request.spid));
        if let Some(onsp) = &request.onsp {
            body.insert("onsp".into(), json!(onsp));
        }
        if let Some(nnsp) = &request.nnsp {
            body.insert("nnsp".into(), json!(nnsp));
        }
        if range.is_single() {
            body.insert("tn".into(), json!(range.start_tn()));
        } else {
            body.insert("tnRange".into(), json!(range));
        }
        if let Some(key) = reference_key {
            body.insert("referenceKey".into(), json!(key));
        }
        if let Some(kind) = cancel_kind {
            body.insert("cancelKind".into(), json!(kind));
        }
        if request.immediate_activation {
            body.insert("immediateActivation".into(), json!(true));
        }
        if !request.attributes.is_empty() {
            body.insert("attributes".into(), Value::Object(request.attributes.clone()));
        }
        if let Some(reason) = reason {
            body.insert("reason".into(), json!(reason.to_string()));
        }
        Value::Object(body)
    }
}

fn first_reason(outcomes: &[Outcome]) -> Option<&RejectionReason> {
    outcomes.iter().find_map(|o| match o {
        Outcome::Rejected(rejection) => Some(&rejection.reason),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::open_in_memory;
    use lnp_kernel::{InboundDocument, StoreConfig};

    fn submission(text: &str) -> Submission {
        InboundDocument::from_json(text)
            .and_then(InboundDocument::into_submission)
            .unwrap_or_else(|e| panic!("fixture document should validate: {e}"))
    }

    #[test]
    fn plan_rejects_before_any_write() {
        let conn = open_in_memory(&StoreConfig::default()).expect("store should open");
        let store = CorrelationStore::new(&conn);
        let config = EngineConfig::default();
        let persister = BatchPersister::new(&config);

        let plan = persister
            .plan(
                &store,
                &submission(
                    r#"{"kind":"request","requestType":"SvActivateRequest","spid":"1111",
                        "subscription":{"tnRange":"530-012-0001-0003"}}"#,
                ),
            )
            .expect("plan should succeed");
        assert_eq!(plan.rejected_count(), 3);
        assert_eq!(plan.accepted_count(), 0);
        assert_eq!(
            store
                .count(crate::correlation::Table::SubscriptionVersion)
                .expect("count"),
            0
        );
    }

    #[test]
    fn snapshot_drops_simple_port_indicators_for_canadian_npas() {
        let mut config = EngineConfig::default();
        config.capabilities.canadian_npas.insert("204".to_string());
        let persister = BatchPersister::new(&config);

        let mut attributes = Attributes::new();
        attributes.insert("lnpType".into(), json!("lspp"));
        attributes.insert("nnspSimplePortIndicator".into(), json!(true));
        attributes.insert("onspSimplePortIndicator".into(), json!(false));

        let canadian: TelephoneNumber = "204-555-0100".parse().expect("tn should parse");
        let domestic: TelephoneNumber = "530-012-0001".parse().expect("tn should parse");
        let kept = persister.snapshot_attributes(&canadian, &attributes);
        assert_eq!(kept.len(), 1);
        assert!(kept.contains_key("lnpType"));
        assert_eq!(persister.snapshot_attributes(&domestic, &attributes).len(), 3);
    }

    #[test]
    fn report_serializes_with_outcome_tag() {
        let mut report = BatchReport::default();
        report
            .correlation
            .insert("530-012-0001".parse().expect("tn should parse"), ReferenceKey(4));
        report.messages.push(MessageKey(2));
        report.rejected.push(TnRejection {
            tn: "530-012-0002".parse().expect("tn should parse"),
            reference_key: None,
            reason: RejectionReason::UnknownSubscription,
        });
        insta::assert_json_snapshot!(BatchResult::Partial(report), @r#"
        {
          "outcome": "partial",
          "report": {
            "correlation": {
              "530-012-0001": 4
            },
            "rejected": [
              {
                "tn": "530-012-0002",
                "referenceKey": null,
                "reason": "unknown_subscription"
              }
            ],
            "messages": [
              2
            ]
          }
        }
        "#);
    }
}
