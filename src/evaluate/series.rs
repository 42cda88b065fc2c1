/// Batch conversion of a level time series into discharge observations.
///
/// The SOS server hands over level readings in time order and expects one
/// discharge observation back per reading. Readings that cannot be converted
/// are not dropped: they come back as `NODATA_VALUE` with a quality index
/// saying why, so gaps stay visible downstream.

use chrono::{DateTime, Utc};

use super::{EvaluationError, Evaluator};
use crate::curve::Curve;
use crate::model::{NODATA_VALUE, QUALITY_MISSING_LEVEL, QUALITY_NO_RATING};

/// One stage observation from the level gauge.
#[derive(Debug, Clone, PartialEq)]
pub struct LevelReading {
    pub time: DateTime<Utc>,
    /// `None` when the gauge reported no value.
    pub level: Option<f64>,
    /// Quality index attached to the reading, if the source provides one.
    pub quality: Option<i32>,
}

/// One derived discharge observation.
#[derive(Debug, Clone, PartialEq)]
pub struct DischargeObservation {
    pub time: DateTime<Utc>,
    /// Discharge, or `NODATA_VALUE` when it could not be computed.
    pub value: f64,
    /// The reading's own quality on success, otherwise
    /// `QUALITY_MISSING_LEVEL` or `QUALITY_NO_RATING`.
    pub quality: Option<i32>,
    pub out_of_range: bool,
}

impl DischargeObservation {
    pub fn is_nodata(&self) -> bool {
        self.value == NODATA_VALUE
    }
}

/// Counts produced by `evaluate_series`, for logging.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeriesSummary {
    pub total: usize,
    pub computed: usize,
    pub missing_level: usize,
    pub no_rating: usize,
    pub out_of_range: usize,
}

/// Converts every reading, in order.
pub fn evaluate_series(
    evaluator: &Evaluator,
    curve: &Curve,
    readings: &[LevelReading],
) -> (Vec<DischargeObservation>, SeriesSummary) {
    let mut summary = SeriesSummary {
        total: readings.len(),
        ..SeriesSummary::default()
    };

    let observations = readings
        .iter()
        .map(|reading| {
            let observation = convert(evaluator, curve, reading);
            if !observation.is_nodata() {
                summary.computed += 1;
                if observation.out_of_range {
                    summary.out_of_range += 1;
                }
            } else if observation.quality == Some(QUALITY_MISSING_LEVEL) {
                summary.missing_level += 1;
            } else {
                summary.no_rating += 1;
            }
            observation
        })
        .collect();

    (observations, summary)
}

fn convert(evaluator: &Evaluator, curve: &Curve, reading: &LevelReading) -> DischargeObservation {
    let nodata = |quality: i32| DischargeObservation {
        time: reading.time,
        value: NODATA_VALUE,
        quality: Some(quality),
        out_of_range: false,
    };

    // Levels below -999 are gauge placeholders for a missing value.
    let level = match reading.level {
        Some(level) if level.is_finite() && level >= -999.0 => level,
        _ => return nodata(QUALITY_MISSING_LEVEL),
    };

    match evaluator.evaluate(curve, reading.time, level) {
        Ok(estimate) => DischargeObservation {
            time: reading.time,
            value: estimate.value,
            quality: reading.quality,
            out_of_range: estimate.out_of_range,
        },
        Err(EvaluationError::InvalidLevel { .. }) => nodata(QUALITY_MISSING_LEVEL),
        Err(EvaluationError::NoApplicableSegment { .. })
        | Err(EvaluationError::UndefinedDischarge { .. }) => nodata(QUALITY_NO_RATING),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
