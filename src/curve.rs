//! Validated rating curve for one virtual procedure.
//!
//! A `Curve` can only be built through `validate`, so holding one is proof
//! that its segments tile time without gaps or overlaps and that stage bands
//! within a period are contiguous. Curves are immutable; a new calibration
//! replaces the whole curve.

use std::ops::Range;

use chrono::{DateTime, Utc};

use crate::model::{Segment, SegmentRecord};
use crate::validate::{validate, validate_records, ValidationError};

#[derive(Debug, Clone, PartialEq)]
pub struct Curve {
    procedure_id: String,
    segments: Vec<Segment>,
}

impl Curve {
    /// Validates `segments` in the given order and wraps them.
    pub fn new(procedure_id: &str, segments: Vec<Segment>) -> Result<Self, ValidationError> {
        validate(&segments)?;
        Ok(Self {
            procedure_id: procedure_id.to_string(),
            segments,
        })
    }

    /// Parses and validates editor records in one pass.
    pub fn from_records(
        procedure_id: &str,
        records: &[SegmentRecord],
    ) -> Result<Self, ValidationError> {
        let segments = validate_records(records)?;
        Ok(Self {
            procedure_id: procedure_id.to_string(),
            segments,
        })
    }

    pub fn procedure_id(&self) -> &str {
        &self.procedure_id
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Always `false` for a constructed curve; kept for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Overall validity window `[first.from, last.to)`.
    pub fn coverage(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let first = self.segments.first()?;
        let last = self.segments.last()?;
        Some((first.from(), last.to()))
    }

    /// The curve in the serialized record shape, in segment order.
    pub fn to_records(&self) -> Vec<SegmentRecord> {
        self.segments.iter().map(SegmentRecord::from).collect()
    }

    /// Index range of the segments whose window `[from, to)` contains `at`.
    ///
    /// Usually a single segment; several when one period is split into stage
    /// bands. `None` before the first segment or at/after the last `to`.
    /// Binary search over `from`, which is non-decreasing in a valid curve.
    pub fn locate(&self, at: DateTime<Utc>) -> Option<Range<usize>> {
        let end = self.segments.partition_point(|s| s.from() <= at);
        if end == 0 {
            return None;
        }

        let candidate = &self.segments[end - 1];
        if !candidate.covers(at) {
            return None;
        }

        let start = self.segments[..end - 1]
            .iter()
            .rposition(|s| !s.same_interval(candidate))
            .map_or(0, |p| p + 1);

        Some(start..end)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
