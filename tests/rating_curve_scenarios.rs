/// End-to-end checks of the rating curve engine through the public API.
///
/// Covers the editor workflow (JSON records in, validation verdict out),
/// evaluation at period boundaries, and the ordering properties every
/// accepted curve must satisfy.
///
/// Run with: cargo test --test rating_curve_scenarios

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};

use rating_service::evaluate::series::LevelReading;
use rating_service::model::{NODATA_VALUE, QUALITY_MISSING_LEVEL, QUALITY_NO_RATING};
use rating_service::repository::MemoryRepository;
use rating_service::{
    discharge, validate, Coefficients, Curve, EvaluationError, Evaluator, RatingService,
    Segment, SegmentRecord, ServiceError, ValidationError, ValidationErrorKind,
};

// ---------------------------------------------------------------------------
// Test Helpers
// ---------------------------------------------------------------------------

fn date(y: i32, m: u32, d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
}

/// Segment whose power law reduces to Q = c * h (a = 0, b = 1, k = 0).
fn linear(from: DateTime<Utc>, to: DateTime<Utc>, low: f64, up: f64, c: f64) -> Segment {
    Segment::new(from, to, low, up, Coefficients { a: 0.0, b: 1.0, c, k: 0.0 }).unwrap()
}

fn records(json: &str) -> Vec<SegmentRecord> {
    serde_json::from_str(json).expect("test JSON should deserialize")
}

fn two_period_segments() -> Vec<Segment> {
    vec![
        linear(date(2020, 1, 1), date(2020, 6, 1), 0.0, 1.0, 10.0),
        linear(date(2020, 6, 1), date(2021, 1, 1), 1.0, 2.0, 20.0),
    ]
}

// ---------------------------------------------------------------------------
// Validation scenarios
// ---------------------------------------------------------------------------

#[test]
fn test_contiguous_periods_validate() {
    let rows = records(
        r#"[
            {"from": "2020-01-01", "to": "2020-06-01", "low_val": 0, "up_val": 1,
             "A": 0.1, "B": 1.6, "C": 12.5, "K": 0},
            {"from": "2020-06-01", "to": "2021-01-01", "low_val": 1, "up_val": 2,
             "A": 0.1, "B": 1.6, "C": 12.5, "K": 0}
        ]"#,
    );
    let curve = Curve::from_records("T_LUGANO_Q", &rows).expect("contiguous periods are valid");
    assert_eq!(curve.len(), 2);
}

#[test]
fn test_gap_between_periods_is_rejected_at_row_2() {
    let rows = records(
        r#"[
            {"from": "2020-01-01", "to": "2020-06-01", "low_val": 0, "up_val": 1,
             "A": 0, "B": 1, "C": 1, "K": 0},
            {"from": "2020-07-01", "to": "2021-01-01", "low_val": 1, "up_val": 2,
             "A": 0, "B": 1, "C": 1, "K": 0}
        ]"#,
    );
    let err = Curve::from_records("T_LUGANO_Q", &rows).unwrap_err();
    assert_eq!(err, ValidationError::TemporalGap { row: 2 });
    assert_eq!(err.kind(), ValidationErrorKind::TemporalGap);
    assert_eq!(err.to_string(), "row 2: From must equal To of previous segment");
}

#[test]
fn test_same_period_with_mismatched_band_is_rejected_at_row_2() {
    let err = validate(&[
        linear(date(2020, 1, 1), date(2020, 6, 1), 0.0, 1.0, 1.0),
        linear(date(2020, 1, 1), date(2020, 6, 1), 0.5, 2.0, 1.0),
    ])
    .unwrap_err();
    assert_eq!(err, ValidationError::DiscontinuousRange { row: 2 });
    assert_eq!(err.row(), Some(2));
}

#[test]
fn test_empty_list_is_rejected() {
    assert_eq!(validate(&[]), Err(ValidationError::EmptyCurve));
    assert_eq!(Curve::from_records("T_LUGANO_Q", &records("[]")), Err(ValidationError::EmptyCurve));
}

#[test]
fn test_malformed_record_reports_its_row() {
    let rows = records(
        r#"[
            {"from": "2020-01-01", "to": "2020-06-01", "low_val": 0, "up_val": 1,
             "A": 0, "B": 1, "C": 1, "K": 0},
            {"from": "2020-06-01", "to": "2021-01-01", "low_val": 1, "up_val": 2,
             "A": "abc", "B": 1, "C": 1, "K": 0}
        ]"#,
    );
    let err = Curve::from_records("T_LUGANO_Q", &rows).unwrap_err();
    assert_eq!(err.row(), Some(2));
    assert_eq!(err.kind(), ValidationErrorKind::MalformedSegment);
}

#[test]
fn test_wrong_typed_cell_reports_its_row() {
    let rows = records(
        r#"[
            {"from": "2020-01-01", "to": "2020-06-01", "low_val": 0, "up_val": 1,
             "A": 0, "B": 1, "C": 1, "K": 0},
            {"from": "2020-06-01", "to": "2021-01-01", "low_val": 1, "up_val": 2,
             "A": true, "B": 1, "C": 1, "K": 0}
        ]"#,
    );
    let err = Curve::from_records("T_LUGANO_Q", &rows).unwrap_err();
    assert!(
        matches!(err, ValidationError::MalformedSegment { row: 2, .. }),
        "got {:?}",
        err
    );
    assert_eq!(err.to_string(), "row 2: field 'A' is not a number: 'true'");
}

#[test]
fn test_numeric_timestamp_reports_its_row() {
    let rows = records(
        r#"[
            {"from": 2020, "to": "2020-06-01", "low_val": 0, "up_val": 1,
             "A": 0, "B": 1, "C": 1, "K": 0}
        ]"#,
    );
    let err = Curve::from_records("T_LUGANO_Q", &rows).unwrap_err();
    assert!(matches!(err, ValidationError::MalformedSegment { row: 1, .. }), "got {:?}", err);
}

#[test]
fn test_first_offending_row_is_reported() {
    // Row 2 is inverted and row 3 leaves a gap; only row 2 is reported.
    let err = validate(&[
        linear(date(2020, 1, 1), date(2020, 6, 1), 0.0, 1.0, 1.0),
        linear(date(2020, 6, 1), date(2020, 3, 1), 1.0, 2.0, 1.0),
        linear(date(2020, 9, 1), date(2021, 1, 1), 2.0, 3.0, 1.0),
    ])
    .unwrap_err();
    assert_eq!(err, ValidationError::InvertedInterval { row: 2 });
}

#[test]
fn test_validating_twice_gives_same_verdict() {
    let segments = two_period_segments();
    assert_eq!(validate(&segments), Ok(()));
    assert_eq!(validate(&segments), Ok(()));
    assert_eq!(segments, two_period_segments());
}

#[test]
fn test_accepted_curves_keep_ordering_invariant() {
    let curve = Curve::new(
        "T_LUGANO_Q",
        vec![
            linear(date(2019, 1, 1), date(2020, 1, 1), 0.0, 3.0, 5.0),
            linear(date(2020, 1, 1), date(2021, 1, 1), 0.0, 1.0, 10.0),
            linear(date(2020, 1, 1), date(2021, 1, 1), 1.0, 2.0, 20.0),
            linear(date(2021, 1, 1), date(2022, 1, 1), 2.0, 4.0, 30.0),
        ],
    )
    .expect("curve should validate");

    for pair in curve.segments().windows(2) {
        let (prev, next) = (&pair[0], &pair[1]);
        let continues = next.from() == prev.to();
        let same_period = next.from() == prev.from() && next.to() == prev.to();
        assert!(continues || same_period, "{:?} does not follow {:?}", next, prev);
    }
}

// ---------------------------------------------------------------------------
// Evaluation scenarios
// ---------------------------------------------------------------------------

#[test]
fn test_one_second_before_coverage_has_no_calibration() {
    let curve = Curve::new("T_LUGANO_Q", two_period_segments()).unwrap();
    let at = date(2020, 1, 1) - Duration::seconds(1);
    assert_eq!(discharge(&curve, at, 0.5), Err(EvaluationError::NoApplicableSegment { at }));
}

#[test]
fn test_boundary_uses_following_segment() {
    let curve = Curve::new("T_LUGANO_Q", two_period_segments()).unwrap();
    // Segment 1 would give 15.0, segment 2 gives 30.0.
    assert_eq!(discharge(&curve, date(2020, 6, 1), 1.5), Ok(30.0));
}

#[test]
fn test_evaluation_is_deterministic() {
    let curve = Curve::new("T_LUGANO_Q", two_period_segments()).unwrap();
    let evaluator = Evaluator::default();
    let at = date(2020, 8, 15);
    assert_eq!(evaluator.evaluate(&curve, at, 1.234), evaluator.evaluate(&curve, at, 1.234));
}

#[test]
fn test_power_law_matches_hand_computation() {
    let segment = Segment::new(
        date(2020, 1, 1),
        date(2021, 1, 1),
        0.0,
        5.0,
        Coefficients { a: 0.2, b: 1.5, c: 12.0, k: 0.3 },
    )
    .unwrap();
    let curve = Curve::new("T_LUGANO_Q", vec![segment]).unwrap();
    let expected = 12.0 * (1.2_f64 - 0.2).powf(1.5) + 0.3;
    let value = discharge(&curve, date(2020, 5, 1), 1.2).unwrap();
    assert!((value - expected).abs() < 1e-12);
}

// ---------------------------------------------------------------------------
// Service workflow
// ---------------------------------------------------------------------------

#[test]
fn test_service_editor_round_trip() {
    let service = RatingService::new(Arc::new(MemoryRepository::new()), Evaluator::default());
    let curve = Curve::new("T_LUGANO_Q", two_period_segments()).unwrap();

    let json = serde_json::to_string(&curve.to_records()).unwrap();
    service.submit_records("T_LUGANO_Q", &records(&json)).unwrap();

    let stored = service.curve("T_LUGANO_Q").unwrap();
    assert_eq!(*stored, curve);
    assert_eq!(service.discharge("T_LUGANO_Q", date(2020, 3, 1), 0.5).unwrap(), 5.0);
}

#[test]
fn test_service_rejects_without_touching_stored_curve() {
    let service = RatingService::new(Arc::new(MemoryRepository::new()), Evaluator::default());
    service.submit("T_LUGANO_Q", two_period_segments()).unwrap();

    let err = service.submit("T_LUGANO_Q", vec![]).unwrap_err();
    assert!(matches!(err, ServiceError::Validation(ValidationError::EmptyCurve)));
    assert_eq!(service.curve("T_LUGANO_Q").unwrap().len(), 2);
}

#[test]
fn test_service_series_flags_unusable_readings() {
    let service = RatingService::new(Arc::new(MemoryRepository::new()), Evaluator::default());
    service.submit("T_LUGANO_Q", two_period_segments()).unwrap();

    let readings = [
        LevelReading { time: date(2020, 2, 1), level: Some(0.4), quality: Some(100) },
        LevelReading { time: date(2020, 2, 2), level: None, quality: None },
        LevelReading { time: date(2020, 2, 3), level: Some(-999.9), quality: Some(100) },
        LevelReading { time: date(2023, 1, 1), level: Some(0.4), quality: Some(100) },
    ];
    let out = service.convert_series("T_LUGANO_Q", &readings).unwrap();

    assert_eq!(out.len(), 4);
    assert_eq!(out[0].value, 4.0);
    assert_eq!(out[1].value, NODATA_VALUE);
    assert_eq!(out[1].quality, Some(QUALITY_MISSING_LEVEL));
    assert_eq!(out[2].quality, Some(QUALITY_MISSING_LEVEL));
    assert_eq!(out[3].quality, Some(QUALITY_NO_RATING));
}
