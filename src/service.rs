//! Rating curve service facade.
//!
//! Ties the validator, evaluator and a repository backend together the way
//! the admin editor and the SOS server use them:
//!
//! - write path: validate the full candidate list, and only then replace the
//!   stored curve. A rejected list leaves the stored curve untouched.
//! - read path: take one snapshot of the stored curve and evaluate against
//!   it, so a concurrent replace never mixes old and new segments.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::config::{ConfigError, ServiceConfig};
use crate::curve::Curve;
use crate::evaluate::series::{evaluate_series, DischargeObservation, LevelReading};
use crate::evaluate::{DischargeEstimate, EvaluationError, Evaluator};
use crate::logging::{self, Component};
use crate::model::{Segment, SegmentRecord};
use crate::repository::{CurveRepository, PersistError};
use crate::validate::{validate_records, ValidationError};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Evaluation(#[from] EvaluationError),
    #[error(transparent)]
    Persist(#[from] PersistError),
}

pub struct RatingService {
    repository: Arc<dyn CurveRepository>,
    evaluator: Evaluator,
}

impl RatingService {
    pub fn new(repository: Arc<dyn CurveRepository>, evaluator: Evaluator) -> Self {
        Self {
            repository,
            evaluator,
        }
    }

    /// Builds the service from config: repository backend and formula.
    pub fn from_config(config: &ServiceConfig) -> Result<Self, ConfigError> {
        Ok(Self::new(config.open_repository()?, config.evaluator()))
    }

    pub fn evaluator(&self) -> &Evaluator {
        &self.evaluator
    }

    // -----------------------------------------------------------------------
    // Write path
    // -----------------------------------------------------------------------

    /// Validates `segments` and, if they pass, replaces the stored curve.
    pub fn submit(&self, procedure_id: &str, segments: Vec<Segment>) -> Result<(), ServiceError> {
        let curve = Curve::new(procedure_id, segments).map_err(|e| {
            logging::log_validation_failure(procedure_id, &e);
            e
        })?;
        self.commit(procedure_id, &curve)
    }

    /// Same as `submit`, for editor records.
    pub fn submit_records(
        &self,
        procedure_id: &str,
        records: &[SegmentRecord],
    ) -> Result<(), ServiceError> {
        let curve = Curve::from_records(procedure_id, records).map_err(|e| {
            logging::log_validation_failure(procedure_id, &e);
            e
        })?;
        self.commit(procedure_id, &curve)
    }

    /// Validation only, for the editor's "check" action. Nothing is stored.
    pub fn check_records(&self, records: &[SegmentRecord]) -> Result<(), ValidationError> {
        validate_records(records).map(|_| ())
    }

    /// Removes the stored curve of `procedure_id`.
    pub fn clear(&self, procedure_id: &str) -> Result<(), ServiceError> {
        self.repository.clear(procedure_id).map_err(|e| {
            logging::log_persist_failure(procedure_id, "clear", &e);
            e
        })?;
        logging::info(Component::Repository, Some(procedure_id), "rating curve cleared");
        Ok(())
    }

    fn commit(&self, procedure_id: &str, curve: &Curve) -> Result<(), ServiceError> {
        self.repository.replace(procedure_id, curve).map_err(|e| {
            logging::log_persist_failure(procedure_id, "replace", &e);
            e
        })?;
        logging::info(
            Component::Repository,
            Some(procedure_id),
            &format!("rating curve replaced ({} segments)", curve.len()),
        );
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Read path
    // -----------------------------------------------------------------------

    /// Current stored curve snapshot.
    pub fn curve(&self, procedure_id: &str) -> Result<Arc<Curve>, ServiceError> {
        self.repository.load(procedure_id).map_err(|e| {
            logging::log_persist_failure(procedure_id, "load", &e);
            ServiceError::from(e)
        })
    }

    /// Discharge for one level reading.
    pub fn discharge(
        &self,
        procedure_id: &str,
        at: DateTime<Utc>,
        level: f64,
    ) -> Result<f64, ServiceError> {
        self.evaluate(procedure_id, at, level).map(|estimate| estimate.value)
    }

    /// Discharge plus the segment used and the advisory stage band flag.
    pub fn evaluate(
        &self,
        procedure_id: &str,
        at: DateTime<Utc>,
        level: f64,
    ) -> Result<DischargeEstimate, ServiceError> {
        let curve = self.curve(procedure_id)?;
        let estimate = self.evaluator.evaluate(&curve, at, level).map_err(|e| {
            logging::log_evaluation_failure(procedure_id, &e);
            e
        })?;

        if estimate.out_of_range {
            let segment = &curve.segments()[estimate.segment_index];
            logging::warn(
                Component::Evaluator,
                Some(procedure_id),
                &format!(
                    "level {} at {} outside calibrated stage band [{}, {}] of segment {}",
                    level,
                    at.to_rfc3339(),
                    segment.low_val(),
                    segment.up_val(),
                    estimate.segment_index + 1
                ),
            );
        }
        Ok(estimate)
    }

    /// Converts a level series against one snapshot of the stored curve.
    pub fn convert_series(
        &self,
        procedure_id: &str,
        readings: &[LevelReading],
    ) -> Result<Vec<DischargeObservation>, ServiceError> {
        let curve = self.curve(procedure_id)?;
        let (observations, summary) = evaluate_series(&self.evaluator, &curve, readings);
        logging::log_series_summary(procedure_id, &summary);
        Ok(observations)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
