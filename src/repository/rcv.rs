/// `.rcv` rating curve files.
///
/// One file per procedure at `<folder>/<procedure>/<procedure>.rcv`, the
/// layout the virtual procedure folder of an istSOS deployment uses. The
/// first line is a pipe-delimited header; columns are located by name, so
/// hand-edited files with reordered columns still load:
///
/// ```text
/// from|to|low_val|up_val|A|B|C|K
/// 2020-01-01T00:00:00+00:00|2020-06-01T00:00:00+00:00|0|1|0.1|1.6|12.5|0
/// ```
///
/// Writes go to a temporary file in the same directory which is then renamed
/// over the old one, so a reader sees either the previous or the new curve.
/// Writers are serialized process-wide, whichever `RcvRepository` instance
/// they go through, and every temporary file name is unique.

use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use super::{check_procedure_id, check_replace_target, CurveRepository, PersistError};
use crate::curve::Curve;
use crate::model::{NumericField, SegmentRecord, SEGMENT_FIELDS};

const EXTENSION: &str = "rcv";

/// Shared by every repository instance in the process.
static WRITE_LOCK: Mutex<()> = Mutex::new(());

/// Sequence number for temporary file names.
static TMP_SEQ: AtomicU64 = AtomicU64::new(0);

#[derive(Debug)]
pub struct RcvRepository {
    folder: PathBuf,
}

impl RcvRepository {
    pub fn new(folder: impl Into<PathBuf>) -> Self {
        Self {
            folder: folder.into(),
        }
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }

    /// Path of the `.rcv` file for `procedure_id`.
    pub fn curve_path(&self, procedure_id: &str) -> PathBuf {
        self.folder
            .join(procedure_id)
            .join(format!("{}.{}", procedure_id, EXTENSION))
    }
}

impl CurveRepository for RcvRepository {
    fn load(&self, procedure_id: &str) -> Result<Arc<Curve>, PersistError> {
        check_procedure_id(procedure_id)?;
        let text = match fs::read_to_string(self.curve_path(procedure_id)) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(PersistError::NotFound(procedure_id.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        parse_rcv(procedure_id, &text).map(Arc::new)
    }

    fn replace(&self, procedure_id: &str, curve: &Curve) -> Result<(), PersistError> {
        check_replace_target(procedure_id, curve)?;
        let _guard = WRITE_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        let path = self.curve_path(procedure_id);
        let dir = self.folder.join(procedure_id);
        fs::create_dir_all(&dir)?;

        let tmp = dir.join(format!(
            ".{}.{}.{}-{}.tmp",
            procedure_id,
            EXTENSION,
            std::process::id(),
            TMP_SEQ.fetch_add(1, Ordering::Relaxed)
        ));
        let result = write_file(&tmp, &render_rcv(curve)).and_then(|_| fs::rename(&tmp, &path));
        if result.is_err() {
            let _ = fs::remove_file(&tmp);
        }
        Ok(result?)
    }

    fn clear(&self, procedure_id: &str) -> Result<(), PersistError> {
        check_procedure_id(procedure_id)?;
        let _guard = WRITE_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        match fs::remove_file(self.curve_path(procedure_id)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

fn write_file(path: &Path, contents: &str) -> std::io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(contents.as_bytes())?;
    file.sync_all()
}

// ---------------------------------------------------------------------------
// Format
// ---------------------------------------------------------------------------

/// Renders a curve in `.rcv` form with the canonical column order.
pub fn render_rcv(curve: &Curve) -> String {
    let mut out = SEGMENT_FIELDS.join("|");
    out.push('\n');
    for segment in curve.segments() {
        let co = segment.coefficients();
        let row = [
            segment.from().to_rfc3339(),
            segment.to().to_rfc3339(),
            segment.low_val().to_string(),
            segment.up_val().to_string(),
            co.a.to_string(),
            co.b.to_string(),
            co.c.to_string(),
            co.k.to_string(),
        ];
        out.push_str(&row.join("|"));
        out.push('\n');
    }
    out
}

/// Parses `.rcv` text and validates it as a curve.
///
/// A file that parses but no longer validates (hand edited, for example) is
/// reported as `Corrupt` rather than silently evaluated.
pub fn parse_rcv(procedure_id: &str, text: &str) -> Result<Curve, PersistError> {
    let corrupt = |reason: String| PersistError::Corrupt {
        procedure: procedure_id.to_string(),
        reason,
    };

    let mut lines = text.lines().filter(|l| !l.trim().is_empty());
    let header: Vec<&str> = lines
        .next()
        .ok_or_else(|| corrupt("empty file".to_string()))?
        .split('|')
        .map(str::trim)
        .collect();

    let mut columns = [0usize; SEGMENT_FIELDS.len()];
    for (slot, name) in columns.iter_mut().zip(SEGMENT_FIELDS) {
        *slot = header
            .iter()
            .position(|h| *h == name)
            .ok_or_else(|| corrupt(format!("header has no '{}' column", name)))?;
    }

    let mut records = Vec::new();
    for (i, line) in lines.enumerate() {
        let cells: Vec<&str> = line.split('|').map(str::trim).collect();
        if cells.len() < header.len() {
            return Err(corrupt(format!(
                "line {} has {} columns, header has {}",
                i + 2,
                cells.len(),
                header.len()
            )));
        }
        let cell = |col: usize| Some(cells[columns[col]].to_string());
        let number = |col: usize| Some(NumericField::Text(cells[columns[col]].to_string()));
        records.push(SegmentRecord {
            from: cell(0),
            to: cell(1),
            low_val: number(2),
            up_val: number(3),
            a: number(4),
            b: number(5),
            c: number(6),
            k: number(7),
        });
    }

    Curve::from_records(procedure_id, &records).map_err(|e| corrupt(e.to_string()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    const SAMPLE: &str = "\
from|to|low_val|up_val|A|B|C|K
2020-01-01T00:00:00+00:00|2020-06-01T00:00:00+00:00|0|1|0.1|1.6|12.5|0
2020-06-01T00:00:00+00:00|2021-01-01T00:00:00+00:00|1|2|0.1|1.7|13|0.2
";

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "rating_service_rcv_{}_{}",
            name,
            std::process::id()
        ));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn test_parse_sample_file() {
        let curve = parse_rcv("VEDEGGIO_Q", SAMPLE).expect("sample should parse");
        assert_eq!(curve.len(), 2);
        assert_eq!(
            curve.segments()[1].from(),
            Utc.with_ymd_and_hms(2020, 6, 1, 0, 0, 0).unwrap()
        );
        assert_eq!(curve.segments()[1].coefficients().k, 0.2);
    }

    #[test]
    fn test_parse_reordered_columns() {
        let text = "\
K|C|B|A|up_val|low_val|to|from
0|12.5|1.6|0.1|1|0|2020-06-01T00:00:00Z|2020-01-01T00:00:00Z
";
        let curve = parse_rcv("VEDEGGIO_Q", text).expect("column order should not matter");
        let segment = &curve.segments()[0];
        assert_eq!(segment.up_val(), 1.0);
        assert_eq!(segment.coefficients().c, 12.5);
    }

    #[test]
    fn test_parse_missing_column_is_corrupt() {
        let text = "from|to|low_val|up_val|A|B|C\n";
        assert!(matches!(parse_rcv("VEDEGGIO_Q", text), Err(PersistError::Corrupt { .. })));
    }

    #[test]
    fn test_parse_gap_is_corrupt() {
        let text = "\
from|to|low_val|up_val|A|B|C|K
2020-01-01T00:00:00Z|2020-06-01T00:00:00Z|0|1|0.1|1.6|12.5|0
2020-07-01T00:00:00Z|2021-01-01T00:00:00Z|1|2|0.1|1.6|12.5|0
";
        let err = parse_rcv("VEDEGGIO_Q", text).unwrap_err();
        assert!(err.to_string().contains("From must equal To of previous segment"));
    }

    #[test]
    fn test_render_then_parse_is_identity() {
        let curve = parse_rcv("VEDEGGIO_Q", SAMPLE).unwrap();
        let reparsed = parse_rcv("VEDEGGIO_Q", &render_rcv(&curve)).unwrap();
        assert_eq!(reparsed, curve);
    }

    #[test]
    fn test_replace_load_clear_on_disk() {
        let dir = scratch_dir("cycle");
        let repo = RcvRepository::new(&dir);
        let curve = parse_rcv("VEDEGGIO_Q", SAMPLE).unwrap();

        assert!(repo.load("VEDEGGIO_Q").unwrap_err().is_not_found());
        repo.replace("VEDEGGIO_Q", &curve).unwrap();
        assert!(repo.curve_path("VEDEGGIO_Q").exists());
        assert_eq!(*repo.load("VEDEGGIO_Q").unwrap(), curve);

        repo.clear("VEDEGGIO_Q").unwrap();
        repo.clear("VEDEGGIO_Q").unwrap();
        assert!(repo.load("VEDEGGIO_Q").unwrap_err().is_not_found());

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_replace_leaves_no_temp_files() {
        let dir = scratch_dir("tmpfiles");
        let repo = RcvRepository::new(&dir);
        let curve = parse_rcv("VEDEGGIO_Q", SAMPLE).unwrap();
        repo.replace("VEDEGGIO_Q", &curve).unwrap();
        repo.replace("VEDEGGIO_Q", &curve).unwrap();

        let entries: Vec<_> = fs::read_dir(dir.join("VEDEGGIO_Q"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(entries, vec!["VEDEGGIO_Q.rcv".to_string()]);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_replace_refuses_curve_of_other_procedure() {
        let dir = scratch_dir("mismatch");
        let repo = RcvRepository::new(&dir);
        let curve = parse_rcv("VEDEGGIO_Q", SAMPLE).unwrap();
        assert!(matches!(
            repo.replace("CASSARATE_Q", &curve),
            Err(PersistError::ProcedureMismatch { .. })
        ));
        assert!(!repo.curve_path("CASSARATE_Q").exists());
    }

    #[test]
    fn test_path_traversal_is_refused() {
        let repo = RcvRepository::new(scratch_dir("traversal"));
        assert!(matches!(
            repo.load("../secrets"),
            Err(PersistError::InvalidProcedure(_))
        ));
    }
}
