/// Persistence port for rating curves.
///
/// A repository is the only persistent owner of each procedure's curve. It
/// stores whole curves: `replace` swaps the complete segment list in one
/// step, and readers always get a complete snapshot, old or new, never a mix.
/// Writers to the same store are serialized by the backend.
///
/// Backends:
/// - `memory`: process-local map, for tests and embedding.
/// - `rcv`: one pipe-delimited `.rcv` file per procedure.
/// - `postgres`: segment rows in PostgreSQL.

pub mod memory;
pub mod postgres;
pub mod rcv;

use std::sync::Arc;

use thiserror::Error;

use crate::curve::Curve;

pub use memory::MemoryRepository;
pub use postgres::PostgresRepository;
pub use rcv::RcvRepository;

/// Load, replace, and clear the curve of a procedure.
///
/// `replace` takes a `Curve`, which can only exist once validated, so a
/// backend never stores an unchecked segment list.
pub trait CurveRepository: Send + Sync {
    /// Current curve for `procedure_id`, or `PersistError::NotFound`.
    fn load(&self, procedure_id: &str) -> Result<Arc<Curve>, PersistError>;

    /// Atomically replaces the whole curve of `procedure_id`. Fails with
    /// `ProcedureMismatch` when `curve` belongs to another procedure.
    fn replace(&self, procedure_id: &str, curve: &Curve) -> Result<(), PersistError>;

    /// Deletes every segment of `procedure_id`. Clearing a procedure with no
    /// curve is not an error.
    fn clear(&self, procedure_id: &str) -> Result<(), PersistError>;
}

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("no rating curve stored for procedure '{0}'")]
    NotFound(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("database error: {0}")]
    Database(#[from] ::postgres::Error),
    /// Stored data exists but does not parse or no longer validates.
    #[error("stored curve for '{procedure}' is unusable: {reason}")]
    Corrupt { procedure: String, reason: String },
    /// A concurrent writer got there first; the caller may resubmit.
    #[error("concurrent update of procedure '{0}'")]
    Conflict(String),
    /// The configured database schema does not exist or is not a plain
    /// identifier.
    #[error("rating curve schema '{0}' is missing; apply sql/001_rating_curves.sql")]
    SchemaMissing(String),
    /// The procedure id cannot be used as a storage key.
    #[error("invalid procedure id '{0}'")]
    InvalidProcedure(String),
    #[error("curve of procedure '{curve}' cannot be stored under '{target}'")]
    ProcedureMismatch { target: String, curve: String },
}

impl PersistError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, PersistError::NotFound(_))
    }
}

/// Procedure ids become file names and SQL keys; keep them to a safe
/// alphabet.
pub(crate) fn check_procedure_id(procedure_id: &str) -> Result<(), PersistError> {
    let valid = !procedure_id.is_empty()
        && procedure_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
        && !procedure_id.starts_with('.');
    if valid {
        Ok(())
    } else {
        Err(PersistError::InvalidProcedure(procedure_id.to_string()))
    }
}

/// Checks a `replace` target: a safe id, and the curve's own id.
pub(crate) fn check_replace_target(procedure_id: &str, curve: &Curve) -> Result<(), PersistError> {
    check_procedure_id(procedure_id)?;
    if curve.procedure_id() != procedure_id {
        return Err(PersistError::ProcedureMismatch {
            target: procedure_id.to_string(),
            curve: curve.procedure_id().to_string(),
        });
    }
    Ok(())
}
