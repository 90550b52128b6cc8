//! Validation errors for inbound TN data and documents.

/// Input rejected before any store access.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// Text is not a `NNN-NNN-NNNN` telephone number.
    #[error("malformed telephone number: {0:?}")]
    MalformedTn(String),

    /// Text is not a `NNN-NNN-NNNN-NNNN` range.
    #[error("malformed TN range: {0:?}")]
    MalformedRange(String),

    #[error("reversed TN range: start station {start:04} is after end station {end:04}")]
    ReversedRange { start: u16, end: u16 },

    /// A range must stay inside one NPA-NXX.
    #[error("TN range spans prefixes {start} and {end}")]
    SpansPrefixes { start: String, end: String },

    #[error("range starting at {start} with {count} object id(s) runs past station 9999")]
    StationOverflow { start: String, count: usize },

    #[error("TN selection is empty")]
    EmptySelection,

    /// The configured ordering regime needs a token the notification lacks.
    #[error("notification for {tn} carries no {regime} ordering token")]
    MissingOrderingToken { tn: String, regime: &'static str },

    #[error("unknown {kind}: {tag:?}")]
    UnknownTag { kind: &'static str, tag: String },

    /// Object ids are positional per TN, so the counts must agree.
    #[error("notification addresses {tns} TN(s) but carries {ids} object id(s)")]
    ObjectIdCount { tns: usize, ids: usize },

    #[error("malformed document: {0}")]
    Document(String),
}
