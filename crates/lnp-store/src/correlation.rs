//! The correlation store: TN and object-id lookups, key allocation, key
//! reassignment, and the row writes the persister issues.
//!
//! `CorrelationStore` borrows a `Connection`; callers hand it the open
//! transaction (or savepoint) so every read and write of one batch shares a
//! single atomic scope.

use crate::record::{
    MESSAGE_COLUMNS, Message, PendingAttributeSnapshot, QueueEntry, QueueStatus, RangeGroup,
    SV_COLUMNS, SubscriptionVersion,
};
use chrono::{DateTime, Utc};
use lnp_kernel::{
    Attributes, MessageKey, RangeKey, ReferenceKey, RequestKind, SequenceMarks, SvStatus,
    TelephoneNumber,
};
use rusqlite::{Connection, ErrorCode, OptionalExtension, params, params_from_iter};
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A uniqueness constraint rejected an insert.
    #[error("duplicate correlation: {0}")]
    Duplicate(String),

    #[error("database error: {0}")]
    Db(rusqlite::Error),

    #[error("subscription {0} not found")]
    MissingSubscription(ReferenceKey),

    #[error("corrupt store: {0}")]
    Corrupt(String),

    #[error("store I/O error: {0}")]
    Io(String),

    #[error("serialization error: {0}")]
    Serialize(String),
}

impl StoreError {
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::Duplicate(_))
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::SqliteFailure(failure, message)
                if failure.code == ErrorCode::ConstraintViolation
                    && matches!(
                        failure.extended_code,
                        rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                            | rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
                    ) =>
            {
                Self::Duplicate(message.unwrap_or_else(|| failure.to_string()))
            }
            other => Self::Db(other),
        }
    }
}

/// Independent key counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySpace {
    Reference,
    Message,
    Range,
}

impl KeySpace {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Reference => "reference_key",
            Self::Message => "message_key",
            Self::Range => "range_key",
        }
    }
}

/// Dependent-row counts rewritten by `reassign`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReassignReport {
    pub messages: usize,
    pub range_members: usize,
    pub snapshots: usize,
}

/// Fields for a freshly inserted subscription version.
#[derive(Debug, Clone)]
pub struct NewSubscription<'a> {
    pub reference_key: ReferenceKey,
    pub tn: TelephoneNumber,
    pub spid: &'a str,
    pub onsp: Option<&'a str>,
    pub nnsp: Option<&'a str>,
    pub last_request_type: Option<RequestKind>,
    pub object_id: Option<u64>,
    pub region: Option<u8>,
    pub at: DateTime<Utc>,
}

/// A status move plus the stamps and marks that accompany it.
#[derive(Debug, Clone, Default)]
pub struct SvChange {
    pub status: Option<SvStatus>,
    pub last_request_type: Option<RequestKind>,
    pub onsp: Option<String>,
    pub nnsp: Option<String>,
    pub object_id: Option<u64>,
    pub region: Option<u8>,
    pub attribute_marks: Option<SequenceMarks>,
    pub status_marks: Option<SequenceMarks>,
    pub activated_at: Option<DateTime<Utc>>,
    pub disconnected_at: Option<DateTime<Utc>>,
    pub canceled_at: Option<DateTime<Utc>>,
    pub old_sp_conflict_resolved_at: Option<DateTime<Utc>>,
    pub new_sp_conflict_resolved_at: Option<DateTime<Utc>>,
}

pub struct NewMessage<'a> {
    pub reference_key: Option<ReferenceKey>,
    pub request_type: &'a str,
    pub tns: String,
    pub body: &'a Value,
    pub queue_status: QueueStatus,
    pub at: DateTime<Utc>,
}

pub struct CorrelationStore<'c> {
    conn: &'c Connection,
}

impl<'c> CorrelationStore<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    /// Most recently created SV for the TN whose status is in `scope`.
    /// `onsp` / `nnsp` narrow the match only when given.
    pub fn lookup_by_tn_and_sides(
        &self,
        tn: &TelephoneNumber,
        spid: &str,
        onsp: Option<&str>,
        nnsp: Option<&str>,
        scope: &[SvStatus],
    ) -> Result<Option<SubscriptionVersion>, StoreError> {
        let found = self.lookup_batch(&[*tn], spid, onsp, nnsp, Some(scope), usize::MAX)?;
        Ok(found.into_values().next())
    }

    /// Batch form of `lookup_by_tn_and_sides`, issued in chunks of
    /// `chunk_size` TNs. `scope = None` matches any status.
    pub fn lookup_batch(
        &self,
        tns: &[TelephoneNumber],
        spid: &str,
        onsp: Option<&str>,
        nnsp: Option<&str>,
        scope: Option<&[SvStatus]>,
        chunk_size: usize,
    ) -> Result<BTreeMap<TelephoneNumber, SubscriptionVersion>, StoreError> {
        let mut found = BTreeMap::new();
        if tns.is_empty() || scope.is_some_and(<[SvStatus]>::is_empty) {
            return Ok(found);
        }

        for chunk in tns.chunks(chunk_size.max(1)) {
            let mut args: Vec<String> = chunk.iter().map(ToString::to_string).collect();
            let mut sql = format!(
                "SELECT {SV_COLUMNS} FROM subscription_version WHERE tn IN ({}) AND spid = ?",
                placeholders(chunk.len())
            );
            args.push(spid.to_string());
            if let Some(scope) = scope {
                sql.push_str(&format!(" AND status IN ({})", placeholders(scope.len())));
                args.extend(scope.iter().map(|s| s.as_str().to_string()));
            }
            if let Some(onsp) = onsp {
                sql.push_str(" AND (onsp IS NULL OR onsp = ?)");
                args.push(onsp.to_string());
            }
            if let Some(nnsp) = nnsp {
                sql.push_str(" AND (nnsp IS NULL OR nnsp = ?)");
                args.push(nnsp.to_string());
            }
            // Keys are monotonic, so the last row per TN is the newest.
            sql.push_str(" ORDER BY reference_key ASC");

            let mut stmt = self.conn.prepare(&sql)?;
            let rows =
                stmt.query_map(params_from_iter(args.iter()), SubscriptionVersion::from_row)?;
            for row in rows {
                let sv = row?;
                found.insert(sv.tn, sv);
            }
        }
        Ok(found)
    }

    pub fn lookup_by_object_id(
        &self,
        object_id: u64,
        spid: &str,
        region: u8,
    ) -> Result<Option<SubscriptionVersion>, StoreError> {
        let sql = format!(
            "SELECT {SV_COLUMNS} FROM subscription_version \
             WHERE object_id = ?1 AND spid = ?2 AND region = ?3 \
             ORDER BY reference_key DESC LIMIT 1"
        );
        Ok(self
            .conn
            .query_row(&sql, params![object_id, spid, region], SubscriptionVersion::from_row)
            .optional()?)
    }

    pub fn lookup_by_reference_key(
        &self,
        key: ReferenceKey,
    ) -> Result<Option<SubscriptionVersion>, StoreError> {
        let sql = format!("SELECT {SV_COLUMNS} FROM subscription_version WHERE reference_key = ?1");
        Ok(self
            .conn
            .query_row(&sql, params![key.0], SubscriptionVersion::from_row)
            .optional()?)
    }

    /// Every SV ever recorded for the TN, oldest first.
    pub fn history(&self, tn: &TelephoneNumber) -> Result<Vec<SubscriptionVersion>, StoreError> {
        let sql = format!(
            "SELECT {SV_COLUMNS} FROM subscription_version WHERE tn = ?1 ORDER BY reference_key"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![tn.to_string()], SubscriptionVersion::from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Issue the next key in `space`.
    pub fn allocate(&self, space: KeySpace) -> Result<i64, StoreError> {
        Ok(self.conn.query_row(
            "INSERT INTO key_sequence (space, last_value) VALUES (?1, 1) \
             ON CONFLICT (space) DO UPDATE SET last_value = last_value + 1 \
             RETURNING last_value",
            params![space.as_str()],
            |row| row.get(0),
        )?)
    }

    pub fn allocate_reference_key(&self) -> Result<ReferenceKey, StoreError> {
        self.allocate(KeySpace::Reference).map(ReferenceKey)
    }

    /// Point every dependent row of `old` at `new`, then delete the SV that
    /// owned `old`. The replacement SV is inserted by the caller in the same
    /// transaction; deferred foreign keys reject the commit otherwise.
    pub fn reassign(
        &self,
        old: ReferenceKey,
        new: ReferenceKey,
    ) -> Result<ReassignReport, StoreError> {
        let messages = self.conn.execute(
            "UPDATE message SET reference_key = ?2 WHERE reference_key = ?1",
            params![old.0, new.0],
        )?;
        let range_members = self.conn.execute(
            "UPDATE range_member SET reference_key = ?2 WHERE reference_key = ?1",
            params![old.0, new.0],
        )?;
        let snapshots = self.conn.execute(
            "UPDATE pending_attribute_snapshot SET reference_key = ?2 WHERE reference_key = ?1",
            params![old.0, new.0],
        )?;
        let deleted = self.conn.execute(
            "DELETE FROM subscription_version WHERE reference_key = ?1",
            params![old.0],
        )?;
        if deleted == 0 {
            return Err(StoreError::MissingSubscription(old));
        }
        Ok(ReassignReport {
            messages,
            range_members,
            snapshots,
        })
    }

    pub fn insert_subscription(&self, sv: &NewSubscription<'_>) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT INTO subscription_version (
                reference_key, tn, spid, onsp, nnsp, status, last_request_type,
                object_id, region, created_at, updated_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)",
            params![
                sv.reference_key.0,
                sv.tn.to_string(),
                sv.spid,
                sv.onsp,
                sv.nnsp,
                SvStatus::Creating.as_str(),
                sv.last_request_type.map(RequestKind::as_str),
                sv.object_id,
                sv.region,
                sv.at,
            ],
        )?;
        Ok(())
    }

    /// Apply a change. Unset fields keep their stored value, and
    /// `activated_at` is never overwritten once stamped.
    pub fn update_subscription(
        &self,
        key: ReferenceKey,
        change: &SvChange,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let (attr_set, attr_invoke, attr_sent) = marks_params(change.attribute_marks);
        let (status_set, status_invoke, status_sent) = marks_params(change.status_marks);
        let updated = self.conn.execute(
            "UPDATE subscription_version SET
                status = COALESCE(?2, status),
                last_request_type = COALESCE(?3, last_request_type),
                onsp = COALESCE(onsp, ?4),
                nnsp = COALESCE(nnsp, ?5),
                object_id = COALESCE(?6, object_id),
                region = COALESCE(?7, region),
                attr_invoke_id = CASE WHEN ?8 THEN ?9 ELSE attr_invoke_id END,
                attr_sent_at = CASE WHEN ?8 THEN ?10 ELSE attr_sent_at END,
                status_invoke_id = CASE WHEN ?11 THEN ?12 ELSE status_invoke_id END,
                status_sent_at = CASE WHEN ?11 THEN ?13 ELSE status_sent_at END,
                activated_at = COALESCE(activated_at, ?14),
                disconnected_at = COALESCE(?15, disconnected_at),
                canceled_at = COALESCE(?16, canceled_at),
                old_sp_conflict_resolved_at = COALESCE(?17, old_sp_conflict_resolved_at),
                new_sp_conflict_resolved_at = COALESCE(?18, new_sp_conflict_resolved_at),
                updated_at = ?19
             WHERE reference_key = ?1",
            params![
                key.0,
                change.status.map(SvStatus::as_str),
                change.last_request_type.map(RequestKind::as_str),
                change.onsp,
                change.nnsp,
                change.object_id,
                change.region,
                attr_set,
                attr_invoke,
                attr_sent,
                status_set,
                status_invoke,
                status_sent,
                change.activated_at,
                change.disconnected_at,
                change.canceled_at,
                change.old_sp_conflict_resolved_at,
                change.new_sp_conflict_resolved_at,
                at,
            ],
        )?;
        if updated == 0 {
            return Err(StoreError::MissingSubscription(key));
        }
        Ok(())
    }

    pub fn insert_message(&self, message: &NewMessage<'_>) -> Result<MessageKey, StoreError> {
        let key = MessageKey(self.allocate(KeySpace::Message)?);
        let body = serde_json::to_string(message.body)
            .map_err(|e| StoreError::Serialize(e.to_string()))?;
        self.conn.execute(
            "INSERT INTO message
                 (message_key, reference_key, request_type, tns, body, queue_status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                key.0,
                message.reference_key.map(|k| k.0),
                message.request_type,
                message.tns,
                body,
                message.queue_status.as_str(),
                message.at,
            ],
        )?;
        if message.queue_status == QueueStatus::Queued {
            self.conn.execute(
                "INSERT INTO request_queue (message_key, request_type, body, enqueued_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![key.0, message.request_type, body, message.at],
            )?;
        }
        Ok(key)
    }

    pub fn insert_range_group(
        &self,
        request_type: &str,
        message_key: MessageKey,
        tn_range: &str,
        members: &[ReferenceKey],
        at: DateTime<Utc>,
    ) -> Result<RangeKey, StoreError> {
        let key = RangeKey(self.allocate(KeySpace::Range)?);
        self.conn.execute(
            "INSERT INTO range_group (range_key, request_type, message_key, tn_range, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![key.0, request_type, message_key.0, tn_range, at],
        )?;
        let mut stmt = self
            .conn
            .prepare("INSERT INTO range_member (range_key, reference_key) VALUES (?1, ?2)")?;
        for member in members {
            stmt.execute(params![key.0, member.0])?;
        }
        Ok(key)
    }

    pub fn insert_snapshot(
        &self,
        key: ReferenceKey,
        spid: &str,
        request_type: RequestKind,
        attributes: &Attributes,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let attributes = serde_json::to_string(attributes)
            .map_err(|e| StoreError::Serialize(e.to_string()))?;
        self.conn.execute(
            "INSERT INTO pending_attribute_snapshot
                 (reference_key, spid, request_type, attributes, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![key.0, spid, request_type.as_str(), attributes, at],
        )?;
        Ok(())
    }

    pub fn messages_for(&self, key: ReferenceKey) -> Result<Vec<Message>, StoreError> {
        let sql = format!(
            "SELECT {MESSAGE_COLUMNS} FROM message WHERE reference_key = ?1 \
             OR message_key IN (SELECT g.message_key FROM range_group g \
                JOIN range_member m ON m.range_key = g.range_key WHERE m.reference_key = ?1) \
             ORDER BY message_key"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![key.0], Message::from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn message(&self, key: MessageKey) -> Result<Option<Message>, StoreError> {
        let sql = format!("SELECT {MESSAGE_COLUMNS} FROM message WHERE message_key = ?1");
        Ok(self
            .conn
            .query_row(&sql, params![key.0], Message::from_row)
            .optional()?)
    }

    pub fn range_groups_for(&self, key: ReferenceKey) -> Result<Vec<RangeGroup>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT g.range_key, g.request_type, g.message_key, g.tn_range, g.created_at
             FROM range_group g JOIN range_member m ON m.range_key = g.range_key
             WHERE m.reference_key = ?1 ORDER BY g.range_key",
        )?;
        let groups = stmt
            .query_map(params![key.0], |row| {
                Ok(RangeGroup {
                    range_key: RangeKey(row.get(0)?),
                    request_type: row.get(1)?,
                    message_key: MessageKey(row.get(2)?),
                    tn_range: row.get(3)?,
                    created_at: row.get(4)?,
                    members: Vec::new(),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut members = self.conn.prepare(
            "SELECT reference_key FROM range_member WHERE range_key = ?1 ORDER BY reference_key",
        )?;
        groups
            .into_iter()
            .map(|mut group| -> Result<RangeGroup, StoreError> {
                group.members = members
                    .query_map(params![group.range_key.0], |row| row.get(0).map(ReferenceKey))?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(group)
            })
            .collect()
    }

    pub fn snapshots_for(
        &self,
        key: ReferenceKey,
    ) -> Result<Vec<PendingAttributeSnapshot>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT reference_key, spid, request_type, attributes, created_at
             FROM pending_attribute_snapshot WHERE reference_key = ?1 ORDER BY snapshot_id",
        )?;
        let rows = stmt.query_map(params![key.0], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, DateTime<Utc>>(4)?,
            ))
        })?;
        let mut snapshots = Vec::new();
        for row in rows {
            let (reference_key, spid, request_type, attributes, created_at) = row?;
            snapshots.push(PendingAttributeSnapshot {
                reference_key: ReferenceKey(reference_key),
                spid,
                request_type: request_type
                    .parse()
                    .map_err(|e| StoreError::Corrupt(format!("snapshot request type: {e}")))?,
                attributes: serde_json::from_str(&attributes)
                    .map_err(|e| StoreError::Corrupt(format!("snapshot attributes: {e}")))?,
                created_at,
            });
        }
        Ok(snapshots)
    }

    pub fn queue_entries(&self) -> Result<Vec<QueueEntry>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT queue_id, message_key, request_type, body, enqueued_at
             FROM request_queue ORDER BY queue_id",
        )?;
        let rows = stmt.query_map(params![], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, DateTime<Utc>>(4)?,
            ))
        })?;
        let mut entries = Vec::new();
        for row in rows {
            let (queue_id, message_key, request_type, body, enqueued_at) = row?;
            entries.push(QueueEntry {
                queue_id,
                message_key: MessageKey(message_key),
                request_type,
                body: serde_json::from_str(&body)
                    .map_err(|e| StoreError::Corrupt(format!("queue body: {e}")))?,
                enqueued_at,
            });
        }
        Ok(entries)
    }

    pub fn count(&self, table: Table) -> Result<i64, StoreError> {
        Ok(self.conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", table.as_str()),
            params![],
            |row| row.get(0),
        )?)
    }
}

/// Tables exposed for row counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Table {
    SubscriptionVersion,
    Message,
    RangeGroup,
    RangeMember,
    PendingAttributeSnapshot,
    RequestQueue,
}

impl Table {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SubscriptionVersion => "subscription_version",
            Self::Message => "message",
            Self::RangeGroup => "range_group",
            Self::RangeMember => "range_member",
            Self::PendingAttributeSnapshot => "pending_attribute_snapshot",
            Self::RequestQueue => "request_queue",
        }
    }
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

fn marks_params(marks: Option<SequenceMarks>) -> (bool, Option<u64>, Option<DateTime<Utc>>) {
    match marks {
        Some(marks) => (true, marks.invoke_id, marks.sent_at),
        None => (false, None, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::open_in_memory;
    use lnp_kernel::StoreConfig;

    fn tn(text: &str) -> TelephoneNumber {
        text.parse()
            .unwrap_or_else(|e| panic!("fixture tn {text} should parse: {e}"))
    }

    fn insert(store: &CorrelationStore<'_>, tn_text: &str, status: SvStatus) -> ReferenceKey {
        let key = store.allocate_reference_key().expect("key should allocate");
        store
            .insert_subscription(&NewSubscription {
                reference_key: key,
                tn: tn(tn_text),
                spid: "1111",
                onsp: Some("2222"),
                nnsp: Some("1111"),
                last_request_type: Some(RequestKind::Create),
                object_id: None,
                region: None,
                at: Utc::now(),
            })
            .expect("subscription should insert");
        if status != SvStatus::Creating {
            store
                .update_subscription(
                    key,
                    &SvChange {
                        status: Some(status),
                        ..SvChange::default()
                    },
                    Utc::now(),
                )
                .expect("status should update");
        }
        key
    }

    #[test]
    fn allocate_is_monotonic_per_space() {
        let conn = open_in_memory(&StoreConfig::default()).expect("store should open");
        let store = CorrelationStore::new(&conn);
        assert_eq!(store.allocate(KeySpace::Reference).expect("allocate"), 1);
        assert_eq!(store.allocate(KeySpace::Reference).expect("allocate"), 2);
        assert_eq!(store.allocate(KeySpace::Message).expect("allocate"), 1);
        assert_eq!(store.allocate(KeySpace::Reference).expect("allocate"), 3);
    }

    #[test]
    fn lookup_respects_scope_and_recency() {
        let conn = open_in_memory(&StoreConfig::default()).expect("store should open");
        let store = CorrelationStore::new(&conn);
        let old = insert(&store, "530-012-0001", SvStatus::Old);
        let active = insert(&store, "530-012-0001", SvStatus::Active);

        let found = store
            .lookup_by_tn_and_sides(
                &tn("530-012-0001"),
                "1111",
                None,
                None,
                &RequestKind::Modify.lookup_scope(),
            )
            .expect("lookup should succeed")
            .expect("active SV should be found");
        assert_eq!(found.reference_key, active);

        let create_scope = store
            .lookup_by_tn_and_sides(
                &tn("530-012-0001"),
                "1111",
                None,
                None,
                &RequestKind::Create.lookup_scope(),
            )
            .expect("lookup should succeed");
        assert!(create_scope.is_none());

        let any = store
            .lookup_batch(&[tn("530-012-0001")], "1111", None, None, None, 10)
            .expect("lookup should succeed");
        assert_eq!(any[&tn("530-012-0001")].reference_key, active);
        assert_ne!(old, active);

        let other_side = store
            .lookup_by_tn_and_sides(
                &tn("530-012-0001"),
                "1111",
                Some("9999"),
                None,
                &[SvStatus::Active],
            )
            .expect("lookup should succeed");
        assert!(other_side.is_none());
    }

    #[test]
    fn lookup_batch_chunks_large_inputs() {
        let conn = open_in_memory(&StoreConfig::default()).expect("store should open");
        let store = CorrelationStore::new(&conn);
        let tns: Vec<TelephoneNumber> = (0..7)
            .map(|i| tn(&format!("530-012-{i:04}")))
            .collect();
        for t in &tns {
            insert(&store, &t.to_string(), SvStatus::Pending);
        }
        let found = store
            .lookup_batch(&tns, "1111", None, None, Some(&[SvStatus::Pending]), 3)
            .expect("lookup should succeed");
        assert_eq!(found.len(), 7);
    }

    #[test]
    fn open_lineage_is_unique_per_tn_and_spid() {
        let conn = open_in_memory(&StoreConfig::default()).expect("store should open");
        let store = CorrelationStore::new(&conn);
        insert(&store, "530-012-0001", SvStatus::Pending);
        let key = store.allocate_reference_key().expect("key should allocate");
        let err = store
            .insert_subscription(&NewSubscription {
                reference_key: key,
                tn: tn("530-012-0001"),
                spid: "1111",
                onsp: None,
                nnsp: None,
                last_request_type: None,
                object_id: None,
                region: None,
                at: Utc::now(),
            })
            .expect_err("second open lineage should be rejected");
        assert!(err.is_duplicate(), "expected duplicate, got {err:?}");
    }

    #[test]
    fn reassign_moves_dependents_and_deletes_owner() {
        let mut conn = open_in_memory(&StoreConfig::default()).expect("store should open");
        let tx = conn.transaction().expect("transaction should begin");
        {
            let store = CorrelationStore::new(&tx);
            let old = insert(&store, "530-012-0001", SvStatus::NpacCreateFailure);
            let body = serde_json::json!({"tn": "530-012-0001"});
            store
                .insert_message(&NewMessage {
                    reference_key: Some(old),
                    request_type: "SvCreateRequest",
                    tns: "530-012-0001".to_string(),
                    body: &body,
                    queue_status: QueueStatus::Queued,
                    at: Utc::now(),
                })
                .expect("message should insert");

            let new = store.allocate_reference_key().expect("key should allocate");
            let report = store.reassign(old, new).expect("reassign should succeed");
            assert_eq!(report.messages, 1);
            assert!(store.lookup_by_reference_key(old).expect("lookup").is_none());

            store
                .insert_subscription(&NewSubscription {
                    reference_key: new,
                    tn: tn("530-012-0001"),
                    spid: "1111",
                    onsp: None,
                    nnsp: None,
                    last_request_type: Some(RequestKind::Create),
                    object_id: None,
                    region: None,
                    at: Utc::now(),
                })
                .expect("replacement should insert");
            assert_eq!(store.messages_for(new).expect("messages").len(), 1);
        }
        tx.commit().expect("commit should succeed");
    }

    #[test]
    fn orphaned_dependents_fail_the_commit() {
        let mut conn = open_in_memory(&StoreConfig::default()).expect("store should open");
        let tx = conn.transaction().expect("transaction should begin");
        {
            let store = CorrelationStore::new(&tx);
            let old = insert(&store, "530-012-0001", SvStatus::NpacCreateFailure);
            let body = serde_json::json!({});
            store
                .insert_message(&NewMessage {
                    reference_key: Some(old),
                    request_type: "SvCreateRequest",
                    tns: "530-012-0001".to_string(),
                    body: &body,
                    queue_status: QueueStatus::DataError,
                    at: Utc::now(),
                })
                .expect("message should insert");
            store.reassign(old, ReferenceKey(999)).expect("reassign should run");
        }
        assert!(tx.commit().is_err());
    }
}
