//! # lnp-store
//!
//! Durable side of the LNP correlation engine.
//!
//! This crate provides:
//! - the SQLite schema and connection setup (`schema`)
//! - `CorrelationStore`: lookups, key allocation, reassignment, row writes
//! - `RequestSplitter`: one submission to per-TN work items
//! - `BatchPersister`: plan then write, one atomic batch per submission
//! - `Gateway`: write-scope selection and the duplicate-retry driver
//! - JSONL reading of inbound documents
//!
//! ## Data flow
//!
//! ```text
//! InboundDocument ──validate──▶ Submission
//!     │
//!     ▼  Gateway::submit (IMMEDIATE tx or savepoint)
//! RequestSplitter ──lookup_batch──▶ TnItem per TN
//!     │
//!     ▼  BatchPersister::plan (sequence guard, state machine, cancel classifier)
//! BatchPlan ──write──▶ subscription_version, message, range_group, queue
//! ```

pub mod atomic_store;
pub mod correlation;
pub mod gateway;
pub mod jsonl;
pub mod persister;
pub mod record;
pub mod schema;
pub mod splitter;

pub use atomic_store::{AtomicScopeError, ScopeMode, mutate_in_scope};
pub use correlation::{
    CorrelationStore, KeySpace, NewMessage, NewSubscription, ReassignReport, StoreError, SvChange,
    Table,
};
pub use gateway::{EngineError, Gateway};
pub use jsonl::{JsonlError, NumberedDocument, read_documents, read_documents_from_path};
pub use persister::{
    BatchPersister, BatchPlan, BatchReport, BatchResult, PersistError, Reassignment,
    RejectionReason, TnRejection,
};
pub use record::{
    Message, PendingAttributeSnapshot, QueueEntry, QueueStatus, RangeGroup, SubscriptionVersion,
};
pub use schema::{SCHEMA_VERSION, open_connection, open_in_memory};
pub use splitter::{RequestSplitter, SplitBatch, SplitElement, TnItem};
