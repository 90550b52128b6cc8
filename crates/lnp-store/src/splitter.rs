//! Splitting one submission into per-TN work items.
//!
//! Each submitted element (single TN or range) keeps its identity so the
//! persister can tell whether a range resolved uniformly. Repeated TNs keep
//! their first position only; object ids stay paired with the position they
//! were sent against.

use crate::correlation::{CorrelationStore, StoreError};
use crate::record::SubscriptionVersion;
use lnp_kernel::{
    EngineConfig, Notification, NotificationTarget, Request, TelephoneNumber, TnRange,
};
use std::collections::BTreeSet;

/// One TN and what the store currently holds for it.
#[derive(Debug, Clone)]
pub struct TnItem {
    pub tn: TelephoneNumber,
    pub current: Option<SubscriptionVersion>,
    /// Registry object id carried positionally by the notification.
    pub object_id: Option<u64>,
    pub region: Option<u8>,
}

#[derive(Debug, Clone)]
pub struct SplitElement {
    pub range: TnRange,
    pub items: Vec<TnItem>,
}

#[derive(Debug, Clone, Default)]
pub struct SplitBatch {
    pub elements: Vec<SplitElement>,
    /// Object ids that resolved to no subscription.
    pub unresolved_object_ids: Vec<u64>,
}

pub struct RequestSplitter<'a> {
    config: &'a EngineConfig,
}

impl<'a> RequestSplitter<'a> {
    pub fn new(config: &'a EngineConfig) -> Self {
        Self { config }
    }

    pub fn split_request(
        &self,
        store: &CorrelationStore<'_>,
        request: &Request,
    ) -> Result<SplitBatch, StoreError> {
        let elements = dedupe(request.selection.elements());
        let tns = distinct_tns(&elements);
        let scope = request.kind.lookup_scope();
        let mut found = store.lookup_batch(
            &tns,
            &request.spid,
            request.onsp.as_deref(),
            request.nnsp.as_deref(),
            Some(&scope),
            self.config.lookup_chunk_size,
        )?;
        tracing::debug!(
            request_type = %request.kind,
            tns = tns.len(),
            found = found.len(),
            "request split"
        );

        let elements = elements
            .into_iter()
            .map(|element| SplitElement {
                range: element.range,
                items: element
                    .tns
                    .into_iter()
                    .map(|(_, tn)| TnItem {
                        tn,
                        current: found.remove(&tn),
                        object_id: None,
                        region: None,
                    })
                    .collect(),
            })
            .collect();
        Ok(SplitBatch {
            elements,
            unresolved_object_ids: Vec::new(),
        })
    }

    /// Notifications see the newest subscription regardless of status.
    pub fn split_notification(
        &self,
        store: &CorrelationStore<'_>,
        notification: &Notification,
    ) -> Result<SplitBatch, StoreError> {
        match &notification.target {
            NotificationTarget::Tns {
                selection,
                object_ids,
                region,
            } => {
                let elements = dedupe(selection.elements());
                let tns = distinct_tns(&elements);
                let mut found = store.lookup_batch(
                    &tns,
                    &notification.spid,
                    None,
                    None,
                    None,
                    self.config.lookup_chunk_size,
                )?;

                let elements = elements
                    .into_iter()
                    .map(|element| SplitElement {
                        range: element.range,
                        items: element
                            .tns
                            .into_iter()
                            .map(|(position, tn)| TnItem {
                                tn,
                                current: found.remove(&tn),
                                object_id: object_ids.get(position).copied(),
                                region: *region,
                            })
                            .collect(),
                    })
                    .collect();
                Ok(SplitBatch {
                    elements,
                    unresolved_object_ids: Vec::new(),
                })
            }
            NotificationTarget::ObjectIds { ids, region } => {
                let mut batch = SplitBatch::default();
                let mut seen = BTreeSet::new();
                for id in ids {
                    match store.lookup_by_object_id(*id, &notification.spid, *region)? {
                        Some(sv) if seen.insert(sv.tn) => batch.elements.push(SplitElement {
                            range: TnRange::single(sv.tn),
                            items: vec![TnItem {
                                tn: sv.tn,
                                current: Some(sv),
                                object_id: Some(*id),
                                region: Some(*region),
                            }],
                        }),
                        Some(_) => {}
                        None => {
                            tracing::warn!(
                                object_id = id,
                                region = region,
                                "object id resolves to no subscription"
                            );
                            batch.unresolved_object_ids.push(*id);
                        }
                    }
                }
                Ok(batch)
            }
        }
    }
}

/// A submitted element after repeats are dropped.
#[derive(Debug)]
struct DedupedElement {
    range: TnRange,
    /// Kept TNs with their position in the full expansion.
    tns: Vec<(usize, TelephoneNumber)>,
}

/// Expand each element, dropping TNs an earlier element already named.
fn dedupe(elements: Vec<TnRange>) -> Vec<DedupedElement> {
    let mut seen = BTreeSet::new();
    let mut position = 0;
    let mut deduped = Vec::with_capacity(elements.len());
    for range in elements {
        let mut tns = Vec::new();
        for tn in range.iter() {
            if seen.insert(tn) {
                tns.push((position, tn));
            }
            position += 1;
        }
        if tns.len() < range.len() {
            tracing::debug!(range = %range, kept = tns.len(), "repeated TNs dropped");
        }
        if !tns.is_empty() {
            deduped.push(DedupedElement { range, tns });
        }
    }
    deduped
}

fn distinct_tns(elements: &[DedupedElement]) -> Vec<TelephoneNumber> {
    elements
        .iter()
        .flat_map(|e| e.tns.iter().map(|(_, tn)| *tn))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range(text: &str) -> TnRange {
        text.parse()
            .unwrap_or_else(|e| panic!("fixture range {text} should parse: {e}"))
    }

    #[test]
    fn dedupe_keeps_first_occurrence() {
        let split = dedupe(vec![
            range("530-012-0001-0003"),
            range("530-012-0002"),
            range("530-012-0003-0004"),
        ]);
        assert_eq!(split.len(), 2);
        assert_eq!(split[0].tns.len(), 3);
        assert_eq!(split[1].range, range("530-012-0003-0004"));
        assert_eq!(
            split[1].tns.iter().map(|(_, tn)| tn.to_string()).collect::<Vec<_>>(),
            vec!["530-012-0004"]
        );
    }

    #[test]
    fn kept_tns_remember_their_expansion_position() {
        let split = dedupe(vec![range("530-012-0002"), range("530-012-0001-0003")]);
        let positions: Vec<(usize, String)> = split
            .iter()
            .flat_map(|e| e.tns.iter().map(|(p, tn)| (*p, tn.to_string())))
            .collect();
        assert_eq!(
            positions,
            vec![
                (0, "530-012-0002".to_string()),
                (1, "530-012-0001".to_string()),
                (3, "530-012-0003".to_string()),
            ]
        );
    }
}
