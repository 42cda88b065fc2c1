/// Discharge evaluation over a rating curve.
///
/// The evaluator borrows an immutable `Curve` and holds nothing but the
/// formula, so one instance can be shared across threads and evaluations of
/// the same snapshot always agree.
///
/// Submodules:
/// - `formula`: the injectable stage-to-discharge conversion.
/// - `series`: batch conversion of a level time series with quality flags.

pub mod formula;
pub mod series;

use std::ops::Range;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::curve::Curve;
use crate::model::Segment;
use formula::{PowerLaw, RatingFormula};

// ---------------------------------------------------------------------------
// Result and error types
// ---------------------------------------------------------------------------

/// A computed discharge and the segment that produced it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DischargeEstimate {
    pub value: f64,
    /// 0-based index of the segment used, within `curve.segments()`.
    pub segment_index: usize,
    /// The level lies outside `[low_val, up_val]` of the segment used.
    /// Advisory only: the value is still computed.
    pub out_of_range: bool,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvaluationError {
    /// No segment covers the requested time; there is no calibration data
    /// for this period.
    #[error("no calibration data for {at}")]
    NoApplicableSegment { at: DateTime<Utc> },
    /// The level itself is NaN or infinite.
    #[error("level {level} is not a finite number")]
    InvalidLevel { level: f64 },
    /// The formula has no finite value for this level.
    #[error("discharge undefined for level {level} at {at} (segment {segment})")]
    UndefinedDischarge {
        at: DateTime<Utc>,
        level: f64,
        /// 1-based segment position, matching validation row numbers.
        segment: usize,
    },
}

impl EvaluationError {
    /// `true` for the "no calibration data for this period" case, which the
    /// server reports explicitly instead of defaulting a value.
    pub fn is_no_calibration(&self) -> bool {
        matches!(self, EvaluationError::NoApplicableSegment { .. })
    }
}

// ---------------------------------------------------------------------------
// Evaluator
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct Evaluator {
    formula: Arc<dyn RatingFormula>,
}

impl Default for Evaluator {
    fn default() -> Self {
        Self::new(Arc::new(PowerLaw))
    }
}

impl std::fmt::Debug for Evaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Evaluator")
            .field("formula", &self.formula.name())
            .finish()
    }
}

impl Evaluator {
    pub fn new(formula: Arc<dyn RatingFormula>) -> Self {
        Self { formula }
    }

    pub fn formula_name(&self) -> &str {
        self.formula.name()
    }

    /// Discharge for `level` observed at `at`.
    pub fn discharge(
        &self,
        curve: &Curve,
        at: DateTime<Utc>,
        level: f64,
    ) -> Result<f64, EvaluationError> {
        self.evaluate(curve, at, level).map(|estimate| estimate.value)
    }

    /// Like `discharge`, but also reports which segment was used and whether
    /// the level fell outside its advisory stage band.
    pub fn evaluate(
        &self,
        curve: &Curve,
        at: DateTime<Utc>,
        level: f64,
    ) -> Result<DischargeEstimate, EvaluationError> {
        if !level.is_finite() {
            return Err(EvaluationError::InvalidLevel { level });
        }

        let group = curve
            .locate(at)
            .ok_or(EvaluationError::NoApplicableSegment { at })?;
        let segments = curve.segments();
        let segment_index = select_band(segments, group, level);
        let segment = &segments[segment_index];

        let value = self
            .formula
            .discharge(level, segment.coefficients())
            .filter(|q| q.is_finite())
            .ok_or(EvaluationError::UndefinedDischarge {
                at,
                level,
                segment: segment_index + 1,
            })?;

        Ok(DischargeEstimate {
            value,
            segment_index,
            out_of_range: !(segment.low_val() <= level && level <= segment.up_val()),
        })
    }
}

/// Discharge using the default power-law formula.
pub fn discharge(curve: &Curve, at: DateTime<Utc>, level: f64) -> Result<f64, EvaluationError> {
    Evaluator::default().discharge(curve, at, level)
}

/// Picks the segment of a same-period group whose stage band holds `level`.
///
/// Bands are half-open `[low_val, up_val)`. A level outside every band uses
/// the nearest one: the first band when below it, otherwise the last.
fn select_band(segments: &[Segment], group: Range<usize>, level: f64) -> usize {
    let bands = &segments[group.clone()];
    if let Some(offset) = bands.iter().position(|s| s.stage_in_band(level)) {
        return group.start + offset;
    }

    match bands.first() {
        Some(first) if level < first.low_val() => group.start,
        _ => group.end - 1,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Coefficients;
    use chrono::{Duration, TimeZone};
    use formula::ShiftedPowerLaw;

    fn date(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    fn seg(from: DateTime<Utc>, to: DateTime<Utc>, low: f64, up: f64, c: f64) -> Segment {
        let coefficients = Coefficients { a: 0.0, b: 1.0, c, k: 0.0 };
        Segment::new(from, to, low, up, coefficients).unwrap()
    }

    /// Two periods; with a = 0, b = 1, k = 0 the power law is Q = c * h.
    fn two_period_curve() -> Curve {
        Curve::new(
            "BELLINZONA_Q",
            vec![
                seg(date(2020, 1, 1), date(2020, 6, 1), 0.0, 1.0, 10.0),
                seg(date(2020, 6, 1), date(2021, 1, 1), 1.0, 2.0, 20.0),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_discharge_uses_covering_segment() {
        let curve = two_period_curve();
        assert_eq!(discharge(&curve, date(2020, 3, 1), 0.5), Ok(5.0));
        assert_eq!(discharge(&curve, date(2020, 9, 1), 1.5), Ok(30.0));
    }

    #[test]
    fn test_boundary_resolves_to_next_segment() {
        let curve = two_period_curve();
        let estimate = Evaluator::default()
            .evaluate(&curve, date(2020, 6, 1), 1.5)
            .unwrap();
        assert_eq!(estimate.segment_index, 1);
        assert_eq!(estimate.value, 30.0);
    }

    #[test]
    fn test_before_first_segment_has_no_calibration() {
        let curve = two_period_curve();
        let at = date(2020, 1, 1) - Duration::seconds(1);
        let err = discharge(&curve, at, 0.5).unwrap_err();
        assert_eq!(err, EvaluationError::NoApplicableSegment { at });
        assert!(err.is_no_calibration());
    }

    #[test]
    fn test_at_last_to_has_no_calibration() {
        let curve = two_period_curve();
        let err = discharge(&curve, date(2021, 1, 1), 1.5).unwrap_err();
        assert!(err.is_no_calibration());
    }

    #[test]
    fn test_level_outside_band_is_flagged_not_rejected() {
        let curve = two_period_curve();
        let estimate = Evaluator::default()
            .evaluate(&curve, date(2020, 3, 1), 4.0)
            .expect("out-of-band levels are still evaluated");
        assert_eq!(estimate.value, 40.0);
        assert!(estimate.out_of_range);
    }

    #[test]
    fn test_level_at_upper_bound_is_in_range() {
        let curve = two_period_curve();
        let estimate = Evaluator::default()
            .evaluate(&curve, date(2020, 3, 1), 1.0)
            .unwrap();
        assert!(!estimate.out_of_range);
    }

    #[test]
    fn test_nan_level_is_rejected() {
        let curve = two_period_curve();
        let err = discharge(&curve, date(2020, 3, 1), f64::NAN).unwrap_err();
        assert!(matches!(err, EvaluationError::InvalidLevel { .. }));
    }

    #[test]
    fn test_level_below_zero_flow_stage_is_undefined() {
        let curve = Curve::new(
            "BELLINZONA_Q",
            vec![Segment::new(
                date(2020, 1, 1),
                date(2021, 1, 1),
                0.0,
                5.0,
                Coefficients { a: 0.3, b: 1.5, c: 12.0, k: 0.0 },
            )
            .unwrap()],
        )
        .unwrap();
        let err = discharge(&curve, date(2020, 3, 1), 0.1).unwrap_err();
        assert_eq!(
            err,
            EvaluationError::UndefinedDischarge { at: date(2020, 3, 1), level: 0.1, segment: 1 }
        );
    }

    #[test]
    fn test_stage_bands_select_by_level() {
        let curve = Curve::new(
            "BELLINZONA_Q",
            vec![
                seg(date(2020, 1, 1), date(2021, 1, 1), 0.0, 1.0, 10.0),
                seg(date(2020, 1, 1), date(2021, 1, 1), 1.0, 2.0, 20.0),
                seg(date(2020, 1, 1), date(2021, 1, 1), 2.0, 3.0, 30.0),
            ],
        )
        .unwrap();
        let evaluator = Evaluator::default();
        let at = date(2020, 7, 1);

        assert_eq!(evaluator.evaluate(&curve, at, 0.5).unwrap().segment_index, 0);
        assert_eq!(evaluator.evaluate(&curve, at, 1.0).unwrap().segment_index, 1);
        assert_eq!(evaluator.evaluate(&curve, at, 2.5).unwrap().segment_index, 2);

        let above = evaluator.evaluate(&curve, at, 3.5).unwrap();
        assert_eq!(above.segment_index, 2);
        assert!(above.out_of_range);

        let below = evaluator.evaluate(&curve, at, -0.5).unwrap();
        assert_eq!(below.segment_index, 0);
        assert!(below.out_of_range);
    }

    #[test]
    fn test_injected_formula_is_used() {
        let curve = two_period_curve();
        let constant = |_h: f64, _co: &Coefficients| 42.0;
        let evaluator = Evaluator::new(Arc::new(constant));
        assert_eq!(evaluator.discharge(&curve, date(2020, 3, 1), 0.5), Ok(42.0));
    }

    #[test]
    fn test_shifted_power_law_evaluator() {
        // K + A * (h - B)^C with A = 0, so the value is K = 0 everywhere
        // at or above B = 1.
        let curve = two_period_curve();
        let evaluator = Evaluator::new(Arc::new(ShiftedPowerLaw));
        assert_eq!(evaluator.discharge(&curve, date(2020, 9, 1), 1.5), Ok(0.0));
        assert!(evaluator.discharge(&curve, date(2020, 9, 1), 0.5).is_err());
    }

    #[test]
    fn test_repeated_evaluation_is_identical() {
        let curve = two_period_curve();
        let evaluator = Evaluator::default();
        let first = evaluator.evaluate(&curve, date(2020, 9, 1), 1.7);
        let second = evaluator.evaluate(&curve, date(2020, 9, 1), 1.7);
        assert_eq!(first, second);
    }

    #[test]
    fn test_evaluator_is_shareable_across_threads() {
        let curve = Arc::new(two_period_curve());
        let evaluator = Evaluator::default();
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let curve = Arc::clone(&curve);
                let evaluator = evaluator.clone();
                std::thread::spawn(move || {
                    evaluator.discharge(&curve, date(2020, 3, 1), 0.1 * i as f64)
                })
            })
            .collect();
        for (i, handle) in handles.into_iter().enumerate() {
            let value = handle.join().expect("evaluation thread panicked").unwrap();
            assert!((value - i as f64).abs() < 1e-9);
        }
    }
}
