//! Submission entry point.
//!
//! `Gateway::submit` validates an inbound document, opens the write scope
//! the configuration asks for and runs the batch persister inside it.
//! Duplicate correlations come back as a retryable error carrying the
//! attempt number; `submit_with_retry` drives the resubmission loop.

use crate::atomic_store::{AtomicScopeError, ScopeMode, mutate_in_scope};
use crate::correlation::{CorrelationStore, StoreError};
use crate::persister::{BatchPersister, BatchResult, PersistError};
use lnp_kernel::{
    EngineConfig, InboundDocument, ReferenceKey, Submission, TelephoneNumber, ValidationError,
};
use rusqlite::Connection;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("duplicate correlation on attempt {attempt} of {max_attempts}: {detail}")]
    DuplicateCorrelation {
        attempt: u32,
        max_attempts: u32,
        detail: String,
    },

    #[error("duplicate correlation persisted after {attempts} attempts: {detail}")]
    RetriesExhausted { attempts: u32, detail: String },

    #[error("reference key reassignment for {tn} (key {old}) failed: {source}")]
    Reassign {
        tn: TelephoneNumber,
        old: ReferenceKey,
        #[source]
        source: StoreError,
    },

    #[error("transaction failed: {0}")]
    Transaction(#[source] StoreError),
}

impl EngineError {
    /// Only a duplicate under the attempt cap may be resubmitted.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::DuplicateCorrelation { .. })
    }
}

pub struct Gateway<'a> {
    config: &'a EngineConfig,
}

impl<'a> Gateway<'a> {
    pub fn new(config: &'a EngineConfig) -> Self {
        Self { config }
    }

    /// Process one document as attempt number `attempt` (1-based).
    pub fn submit(
        &self,
        conn: &mut Connection,
        document: &InboundDocument,
        attempt: u32,
    ) -> Result<BatchResult, EngineError> {
        let submission = document.clone().into_submission()?;
        self.submit_validated(conn, &submission, attempt)
    }

    /// Resubmit on duplicate correlation, sleeping `attempt * retry_backoff_ms`
    /// between attempts, until success or a non-retryable error.
    pub fn submit_with_retry(
        &self,
        conn: &mut Connection,
        document: &InboundDocument,
    ) -> Result<BatchResult, EngineError> {
        let submission = document.clone().into_submission()?;
        let mut attempt = 1;
        loop {
            match self.submit_validated(conn, &submission, attempt) {
                Err(err) if err.is_retryable() => {
                    let delay_ms = u64::from(attempt) * self.config.retry_backoff_ms;
                    tracing::warn!(
                        attempt,
                        delay_ms,
                        error = %err,
                        "resubmitting after duplicate correlation"
                    );
                    std::thread::sleep(Duration::from_millis(delay_ms));
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    pub fn submit_validated(
        &self,
        conn: &mut Connection,
        submission: &Submission,
        attempt: u32,
    ) -> Result<BatchResult, EngineError> {
        let persister = BatchPersister::new(self.config);
        let mode = ScopeMode::from_flag(self.config.participate_in_ambient_transaction);
        let result = mutate_in_scope(conn, mode, |tx| {
            persister.apply(&CorrelationStore::new(tx), submission)
        });
        match result {
            Ok(batch) => {
                let report = batch.report();
                tracing::info!(
                    attempt,
                    complete = batch.is_complete(),
                    accepted = report.correlation.len(),
                    rejected = report.rejected.len(),
                    out_of_sequence = report.out_of_sequence.len(),
                    "submission committed"
                );
                Ok(batch)
            }
            Err(err) => {
                let err = self.classify(err, attempt);
                tracing::warn!(attempt, error = %err, "submission rolled back");
                Err(err)
            }
        }
    }

    fn classify(&self, err: AtomicScopeError<PersistError>, attempt: u32) -> EngineError {
        let store_error = match err {
            AtomicScopeError::Begin(err) | AtomicScopeError::Commit(err) => StoreError::from(err),
            AtomicScopeError::Mutation(PersistError::Validation(err)) => {
                return EngineError::Validation(err);
            }
            AtomicScopeError::Mutation(PersistError::Reassign { tn, old, source }) => {
                return EngineError::Reassign { tn, old, source };
            }
            AtomicScopeError::Mutation(PersistError::Store(err)) => err,
        };

        match store_error {
            StoreError::Duplicate(detail) if attempt < self.config.retry_max_attempts => {
                EngineError::DuplicateCorrelation {
                    attempt,
                    max_attempts: self.config.retry_max_attempts,
                    detail,
                }
            }
            StoreError::Duplicate(detail) => EngineError::RetriesExhausted {
                attempts: attempt,
                detail,
            },
            other => EngineError::Transaction(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gateway_config(max_attempts: u32) -> EngineConfig {
        EngineConfig {
            retry_max_attempts: max_attempts,
            ..EngineConfig::default()
        }
    }

    #[test]
    fn duplicate_is_retryable_only_under_the_cap() {
        let config = gateway_config(3);
        let gateway = Gateway::new(&config);
        let duplicate = || {
            AtomicScopeError::Mutation(PersistError::Store(StoreError::Duplicate(
                "sv_open_lineage".to_string(),
            )))
        };

        let first = gateway.classify(duplicate(), 1);
        assert!(first.is_retryable());
        assert!(matches!(
            first,
            EngineError::DuplicateCorrelation {
                attempt: 1,
                max_attempts: 3,
                ..
            }
        ));

        let last = gateway.classify(duplicate(), 3);
        assert!(!last.is_retryable());
        assert!(matches!(last, EngineError::RetriesExhausted { attempts: 3, .. }));
    }

    #[test]
    fn validation_errors_are_not_retried() {
        let config = gateway_config(3);
        let gateway = Gateway::new(&config);
        let err = gateway.classify(
            AtomicScopeError::Mutation(PersistError::Validation(ValidationError::EmptySelection)),
            1,
        );
        assert!(matches!(err, EngineError::Validation(ValidationError::EmptySelection)));
        assert!(!err.is_retryable());
    }
}
