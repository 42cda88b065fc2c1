//! In-process curve store.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use super::{check_replace_target, CurveRepository, PersistError};
use crate::curve::Curve;

/// Curves held in a map of shared snapshots.
///
/// `replace` swaps the `Arc` under the write lock; a reader that already
/// holds the previous `Arc` keeps evaluating against it.
#[derive(Debug, Default)]
pub struct MemoryRepository {
    curves: RwLock<HashMap<String, Arc<Curve>>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Procedure ids that currently have a curve, sorted.
    pub fn procedures(&self) -> Vec<String> {
        let curves = self.curves.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut ids: Vec<String> = curves.keys().cloned().collect();
        ids.sort();
        ids
    }
}

impl CurveRepository for MemoryRepository {
    fn load(&self, procedure_id: &str) -> Result<Arc<Curve>, PersistError> {
        let curves = self.curves.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        curves
            .get(procedure_id)
            .cloned()
            .ok_or_else(|| PersistError::NotFound(procedure_id.to_string()))
    }

    fn replace(&self, procedure_id: &str, curve: &Curve) -> Result<(), PersistError> {
        check_replace_target(procedure_id, curve)?;
        let snapshot = Arc::new(curve.clone());
        let mut curves = self.curves.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        curves.insert(procedure_id.to_string(), snapshot);
        Ok(())
    }

    fn clear(&self, procedure_id: &str) -> Result<(), PersistError> {
        let mut curves = self.curves.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        curves.remove(procedure_id);
        Ok(())
    }
}
