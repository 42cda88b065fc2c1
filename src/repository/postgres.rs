/// PostgreSQL curve store.
///
/// Tables are created by `sql/001_rating_curves.sql`:
///   - `<schema>.curves`: one header row per procedure, with a version
///     counter bumped on each replace.
///   - `<schema>.segments`: one row per segment, keyed by
///     `(procedure_id, position)`.
///
/// `replace` locks the header row and rewrites all segment rows inside one
/// transaction; `load` reads inside a read-only REPEATABLE READ transaction,
/// so it never observes half of a replace.

use std::sync::{Arc, Mutex, MutexGuard};

use ::postgres::error::SqlState;
use ::postgres::{Client, IsolationLevel, NoTls};
use chrono::{DateTime, Utc};

use super::{CurveRepository, PersistError, check_replace_target};
use crate::curve::Curve;
use crate::model::{Coefficients, Segment};

/// Schema used when the configuration does not name one.
pub const DEFAULT_SCHEMA: &str = "rating";

pub struct PostgresRepository {
    client: Mutex<Client>,
    schema: String,
}

impl std::fmt::Debug for PostgresRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresRepository")
            .field("schema", &self.schema)
            .finish()
    }
}

impl PostgresRepository {
    /// Connects and checks that `schema` exists.
    ///
    /// Fails with `SchemaMissing` when the migration has not been applied.
    pub fn connect(database_url: &str, schema: &str) -> Result<Self, PersistError> {
        if !is_identifier(schema) {
            return Err(PersistError::SchemaMissing(schema.to_string()));
        }

        let mut client = Client::connect(database_url, NoTls)?;
        let row = client.query_one(
            "SELECT EXISTS (SELECT 1 FROM information_schema.schemata WHERE schema_name = $1)",
            &[&schema],
        )?;
        let exists: bool = row.get(0);
        if !exists {
            return Err(PersistError::SchemaMissing(schema.to_string()));
        }

        Ok(Self {
            client: Mutex::new(client),
            schema: schema.to_string(),
        })
    }

    /// Number of times the procedure's curve has been replaced, or `None`
    /// if it has never been stored.
    pub fn version(&self, procedure_id: &str) -> Result<Option<i64>, PersistError> {
        let mut client = self.client();
        let row = client.query_opt(
            &*format!("SELECT version FROM {}.curves WHERE procedure_id = $1", self.schema),
            &[&procedure_id],
        )?;
        Ok(row.map(|r| r.get(0)))
    }

    fn client(&self) -> MutexGuard<'_, Client> {
        self.client.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl CurveRepository for PostgresRepository {
    fn load(&self, procedure_id: &str) -> Result<Arc<Curve>, PersistError> {
        let mut client = self.client();
        let mut tx = client
            .build_transaction()
            .isolation_level(IsolationLevel::RepeatableRead)
            .read_only(true)
            .start()?;

        let query = format!(
            "SELECT from_time, to_time, low_val, up_val, a, b, c, k
             FROM {}.segments
             WHERE procedure_id = $1
             ORDER BY position",
            self.schema
        );
        let rows = tx
            .query(query.as_str(), &[&procedure_id])
            .map_err(|e| classify(procedure_id, e))?;
        tx.commit().map_err(|e| classify(procedure_id, e))?;

        if rows.is_empty() {
            return Err(PersistError::NotFound(procedure_id.to_string()));
        }

        let corrupt = |reason: String| PersistError::Corrupt {
            procedure: procedure_id.to_string(),
            reason,
        };

        let mut segments = Vec::with_capacity(rows.len());
        for row in rows {
            let from: DateTime<Utc> = row.get(0);
            let to: DateTime<Utc> = row.get(1);
            let coefficients = Coefficients {
                a: row.get(4),
                b: row.get(5),
                c: row.get(6),
                k: row.get(7),
            };
            let segment = Segment::new(from, to, row.get(2), row.get(3), coefficients)
                .map_err(|e| corrupt(e.to_string()))?;
            segments.push(segment);
        }

        Curve::new(procedure_id, segments)
            .map(Arc::new)
            .map_err(|e| corrupt(e.to_string()))
    }

    fn replace(&self, procedure_id: &str, curve: &Curve) -> Result<(), PersistError> {
        check_replace_target(procedure_id, curve)?;
        let schema = &self.schema;
        let mut client = self.client();
        let mut tx = client.transaction()?;

        let result = (|| -> Result<(), ::postgres::Error> {
            tx.execute(
                &*format!(
                    "INSERT INTO {}.curves (procedure_id) VALUES ($1)
                     ON CONFLICT (procedure_id) DO NOTHING",
                    schema
                ),
                &[&procedure_id],
            )?;
            tx.query_one(
                &*format!("SELECT version FROM {}.curves WHERE procedure_id = $1 FOR UPDATE", schema),
                &[&procedure_id],
            )?;
            tx.execute(
                &*format!("DELETE FROM {}.segments WHERE procedure_id = $1", schema),
                &[&procedure_id],
            )?;

            let insert = tx.prepare(&*format!(
                "INSERT INTO {}.segments
                    (procedure_id, position, from_time, to_time, low_val, up_val, a, b, c, k)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
                schema
            ))?;
            for (position, segment) in curve.segments().iter().enumerate() {
                let co = segment.coefficients();
                tx.execute(
                    &insert,
                    &[
                        &procedure_id,
                        &(position as i32),
                        &segment.from(),
                        &segment.to(),
                        &segment.low_val(),
                        &segment.up_val(),
                        &co.a,
                        &co.b,
                        &co.c,
                        &co.k,
                    ],
                )?;
            }

            tx.execute(
                &*format!(
                    "UPDATE {}.curves SET version = version + 1, updated_at = now()
                     WHERE procedure_id = $1",
                    schema
                ),
                &[&procedure_id],
            )?;
            Ok(())
        })();

        // Dropping an uncommitted transaction rolls it back.
        result.map_err(|e| classify(procedure_id, e))?;
        tx.commit().map_err(|e| classify(procedure_id, e))
    }

    fn clear(&self, procedure_id: &str) -> Result<(), PersistError> {
        let mut client = self.client();
        // Segment rows go with the header via ON DELETE CASCADE.
        client
            .execute(
                &*format!("DELETE FROM {}.curves WHERE procedure_id = $1", self.schema),
                &[&procedure_id],
            )
            .map_err(|e| classify(procedure_id, e))?;
        Ok(())
    }
}

/// Serialization failures and deadlocks mean another writer won; everything
/// else is a plain database error.
fn classify(procedure_id: &str, err: ::postgres::Error) -> PersistError {
    match err.code() {
        Some(code)
            if *code == SqlState::T_R_SERIALIZATION_FAILURE
                || *code == SqlState::T_R_DEADLOCK_DETECTED =>
        {
            PersistError::Conflict(procedure_id.to_string())
        }
        _ => PersistError::Database(err),
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_lowercase() || c == '_')
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
