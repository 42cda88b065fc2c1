//! Stage-discharge rating curve service.
//!
//! Converts water level (stage) readings from a gauging station into
//! discharge through a piecewise rating curve: a time-ordered list of
//! calibration segments, each with its own coefficients and validity window.
//!
//! Modules, leaf first:
//! - `model`: segments, the editor record shape, timestamps.
//! - `validate`: ordering and continuity checks over a candidate list.
//! - `curve`: a validated curve and segment lookup by time.
//! - `evaluate`: discharge computation and level series conversion.
//! - `repository`: load / replace / clear of stored curves.
//! - `service`: validate-before-commit facade over a repository.
//! - `config`, `logging`: ambient setup.

pub mod config;
pub mod curve;
pub mod evaluate;
pub mod logging;
pub mod model;
pub mod repository;
pub mod service;
pub mod validate;

pub use curve::Curve;
pub use evaluate::{discharge, DischargeEstimate, EvaluationError, Evaluator};
pub use model::{Coefficients, Segment, SegmentError, SegmentRecord};
pub use repository::{CurveRepository, PersistError};
pub use service::{RatingService, ServiceError};
pub use validate::{validate, validate_records, ValidationError, ValidationErrorKind};
