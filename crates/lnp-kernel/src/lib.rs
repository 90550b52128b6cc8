//! # lnp-kernel
//!
//! Pure domain logic for the LNP gateway's TN range and correlation engine.
//!
//! This crate provides:
//! - `TelephoneNumber`, `TnRange`, `TnSelection` and the range codec
//!   (`expand`, `expand_list`, `collapse`)
//! - the subscription-version status vocabulary and state machine
//! - the cancellation sub-classifier
//! - `SequenceGuard` for out-of-sequence notification detection
//! - inbound document values and engine configuration
//!
//! Nothing here performs I/O except `EngineConfig::load`. Persistence and
//! transaction scoping live in `lnp-store`.
//!
//! ## Data flow
//!
//! ```text
//! InboundDocument ──into_submission──▶ Submission
//!     │ TnSelection::expand
//!     ▼
//! TelephoneNumber* ──SequenceGuard (notifications)──▶ accepted TNs
//!     │ transition(current, event)
//!     ▼
//! Transition ──(lnp-store persister)──▶ rows ──collapse──▶ TnRange*
//! ```

pub mod cancel;
pub mod config;
pub mod error;
pub mod key;
pub mod machine;
pub mod range;
pub mod request;
pub mod sequence;
pub mod status;
pub mod tn;

pub use cancel::{CancelKind, Unclassifiable, classify_cancellation};
pub use config::{Capabilities, ConfigError, EngineConfig, JournalMode, StoreConfig};
pub use error::ValidationError;
pub use key::{MessageKey, RangeKey, ReferenceKey};
pub use machine::{Effect, SvEvent, SvView, Transition, TransitionError, Update, transition};
pub use range::{TnIter, TnParts, TnRange, TnSelection, collapse, expand, expand_list};
pub use request::{
    Attributes, InboundDocument, Notification, NotificationDocument, NotificationTarget, Request,
    RequestDocument, SubscriptionAddress, Submission,
};
pub use sequence::{
    OrderingRegime, OrderingToken, SequenceChannel, SequenceGuard, SequenceMarks,
    SequenceVerdict, SvMarks,
};
pub use status::{NotificationKind, RequestKind, Side, SvStatus};
pub use tn::{TelephoneNumber, TnPrefix};
