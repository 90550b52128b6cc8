//! Transaction-scoped atomic mutation of the store.
//!
//! A submission either owns its transaction (`BEGIN IMMEDIATE`, so the write
//! lock is taken before any lookup) or joins the caller's ambient
//! transaction as a savepoint. Either way the mutator's writes land
//! all-or-nothing: an `Err` from the mutator rolls the scope back.

use rusqlite::{Connection, TransactionBehavior};
use std::error::Error as StdError;
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeMode {
    /// `BEGIN IMMEDIATE ... COMMIT` owned by this call.
    Owned,
    /// `SAVEPOINT ... RELEASE` nested in whatever the caller has open.
    Ambient,
}

impl ScopeMode {
    pub fn from_flag(participate_in_ambient_transaction: bool) -> Self {
        if participate_in_ambient_transaction {
            Self::Ambient
        } else {
            Self::Owned
        }
    }
}

#[derive(Debug)]
pub enum AtomicScopeError<E> {
    Begin(rusqlite::Error),
    Commit(rusqlite::Error),
    Mutation(E),
}

impl<E: Display> Display for AtomicScopeError<E> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Begin(err) => write!(f, "failed to open write scope: {err}"),
            Self::Commit(err) => write!(f, "failed to commit write scope: {err}"),
            Self::Mutation(err) => write!(f, "{err}"),
        }
    }
}

impl<E> StdError for AtomicScopeError<E> where E: Display + std::fmt::Debug + StdError + 'static {}

/// Run `mutator` inside one atomic write scope.
///
/// The mutator sees a plain `&Connection`; it must not open or end
/// transactions itself.
pub fn mutate_in_scope<T, E, F>(
    conn: &mut Connection,
    mode: ScopeMode,
    mutator: F,
) -> Result<T, AtomicScopeError<E>>
where
    F: FnOnce(&Connection) -> Result<T, E>,
{
    match mode {
        ScopeMode::Owned => {
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(AtomicScopeError::Begin)?;
            let value = mutator(&tx).map_err(|err| {
                tracing::debug!("write scope rolled back");
                AtomicScopeError::Mutation(err)
            })?;
            tx.commit().map_err(AtomicScopeError::Commit)?;
            Ok(value)
        }
        ScopeMode::Ambient => {
            if conn.is_autocommit() {
                tracing::debug!("no ambient transaction open; savepoint runs standalone");
            }
            let sp = conn.savepoint().map_err(AtomicScopeError::Begin)?;
            let value = mutator(&sp).map_err(|err| {
                tracing::debug!("savepoint rolled back");
                AtomicScopeError::Mutation(err)
            })?;
            sp.commit().map_err(AtomicScopeError::Commit)?;
            Ok(value)
        }
    }
}
