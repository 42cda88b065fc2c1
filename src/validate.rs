//! Ordering and continuity checks for candidate rating curves.
//!
//! Validation runs over the rows exactly as they were submitted (top to
//! bottom, the way the editor grid shows them) and stops at the first
//! problem, so the editor always has one actionable message to show. Row
//! numbers in errors are 1-based.

use thiserror::Error;

use crate::model::{Segment, SegmentError, SegmentRecord};

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Reason codes for a rejected candidate curve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationErrorKind {
    EmptyCurve,
    MalformedSegment,
    InvertedInterval,
    TemporalGap,
    DiscontinuousRange,
}

/// The first violation found in a candidate curve.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("curve must contain at least one segment")]
    EmptyCurve,
    #[error("row {row}: {source}")]
    MalformedSegment { row: usize, source: SegmentError },
    #[error("row {row}: From must be before To")]
    InvertedInterval { row: usize },
    #[error("row {row}: From must equal To of previous segment")]
    TemporalGap { row: usize },
    #[error("row {row}: Low must equal Up of previous segment")]
    DiscontinuousRange { row: usize },
}

impl ValidationError {
    /// 1-based position of the offending row, if the error concerns one.
    pub fn row(&self) -> Option<usize> {
        match self {
            ValidationError::EmptyCurve => None,
            ValidationError::MalformedSegment { row, .. }
            | ValidationError::InvertedInterval { row }
            | ValidationError::TemporalGap { row }
            | ValidationError::DiscontinuousRange { row } => Some(*row),
        }
    }

    pub fn kind(&self) -> ValidationErrorKind {
        match self {
            ValidationError::EmptyCurve => ValidationErrorKind::EmptyCurve,
            ValidationError::MalformedSegment { .. } => ValidationErrorKind::MalformedSegment,
            ValidationError::InvertedInterval { .. } => ValidationErrorKind::InvertedInterval,
            ValidationError::TemporalGap { .. } => ValidationErrorKind::TemporalGap,
            ValidationError::DiscontinuousRange { .. } => ValidationErrorKind::DiscontinuousRange,
        }
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Checks a candidate ordered list of typed segments.
///
/// Pure: no I/O and no side effects, so validating the same list any number
/// of times gives the same answer.
pub fn validate(segments: &[Segment]) -> Result<(), ValidationError> {
    if segments.is_empty() {
        return Err(ValidationError::EmptyCurve);
    }

    for (i, segment) in segments.iter().enumerate() {
        let previous = if i > 0 { Some(&segments[i - 1]) } else { None };
        check_row(i + 1, segment, previous)?;
    }

    Ok(())
}

/// Checks a candidate list in the serialized record shape and returns the
/// typed segments on success.
///
/// Each row is parsed, then checked against its predecessor, before the next
/// row is looked at; a malformed row 3 is therefore never reported ahead of
/// a gap at row 2.
pub fn validate_records(records: &[SegmentRecord]) -> Result<Vec<Segment>, ValidationError> {
    if records.is_empty() {
        return Err(ValidationError::EmptyCurve);
    }

    let mut segments: Vec<Segment> = Vec::with_capacity(records.len());
    for (i, record) in records.iter().enumerate() {
        let row = i + 1;
        let segment = record
            .to_segment()
            .map_err(|source| ValidationError::MalformedSegment { row, source })?;
        check_row(row, &segment, segments.last())?;
        segments.push(segment);
    }

    Ok(segments)
}

fn check_row(
    row: usize,
    segment: &Segment,
    previous: Option<&Segment>,
) -> Result<(), ValidationError> {
    if segment.from() >= segment.to() {
        return Err(ValidationError::InvertedInterval { row });
    }

    let Some(previous) = previous else {
        return Ok(());
    };

    if segment.same_interval(previous) {
        // Another stage band for the same period: bands must be contiguous.
        if segment.low_val() != previous.up_val() {
            return Err(ValidationError::DiscontinuousRange { row });
        }
    } else if segment.from() != previous.to() {
        return Err(ValidationError::TemporalGap { row });
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
