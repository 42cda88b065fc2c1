/// Structured logging for the rating curve service
///
/// Provides context-rich logging with procedure identifiers, timestamps,
/// and severity levels. Supports both console output and file-based logging
/// for long-running deployments.

use chrono::Utc;
use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::sync::Mutex;

use crate::evaluate::EvaluationError;
use crate::evaluate::series::SeriesSummary;
use crate::repository::PersistError;
use crate::validate::ValidationError;

// ---------------------------------------------------------------------------
// Log Levels
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Debug => write!(f, "DEBUG"),
            LogLevel::Info => write!(f, "INFO"),
            LogLevel::Warning => write!(f, "WARN"),
            LogLevel::Error => write!(f, "ERROR"),
        }
    }
}

impl LogLevel {
    /// Parses the names used in the `[logging]` config section.
    pub fn parse(name: &str) -> Option<LogLevel> {
        match name.trim().to_ascii_lowercase().as_str() {
            "debug" => Some(LogLevel::Debug),
            "info" => Some(LogLevel::Info),
            "warn" | "warning" => Some(LogLevel::Warning),
            "error" => Some(LogLevel::Error),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Components
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Component {
    Validator,
    Evaluator,
    Repository,
    Config,
    System,
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Component::Validator => write!(f, "VALIDATE"),
            Component::Evaluator => write!(f, "EVAL"),
            Component::Repository => write!(f, "REPO"),
            Component::Config => write!(f, "CONFIG"),
            Component::System => write!(f, "SYS"),
        }
    }
}

// ---------------------------------------------------------------------------
// Failure Classification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureType {
    /// Expected failure - the input is outside what the calibration covers
    Expected,
    /// Unexpected failure - indicates bad calibration data or a storage fault
    Unexpected,
    /// Unknown - cannot determine if this is expected or not
    Unknown,
}

impl fmt::Display for FailureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureType::Expected => write!(f, "EXPECTED"),
            FailureType::Unexpected => write!(f, "UNEXPECTED"),
            FailureType::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

// ---------------------------------------------------------------------------
// Logger Configuration
// ---------------------------------------------------------------------------

/// Global logger instance
static LOGGER: Mutex<Option<Logger>> = Mutex::new(None);

pub struct Logger {
    /// Minimum log level to display
    min_level: LogLevel,
    /// Optional file path for logging
    log_file: Option<String>,
    /// Whether to include timestamps in console output
    console_timestamps: bool,
}

impl Logger {
    /// Initialize the global logger
    pub fn init(min_level: LogLevel, log_file: Option<String>, console_timestamps: bool) {
        let logger = Logger {
            min_level,
            log_file,
            console_timestamps,
        };

        let mut slot = LOGGER.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *slot = Some(logger);
    }

    fn log(&self, level: LogLevel, component: Component, procedure: Option<&str>, message: &str) {
        if level < self.min_level {
            return;
        }

        let entry = format_entry(level, component, procedure, message);
        let procedure_part = procedure.map(|p| format!(" [{}]", p)).unwrap_or_default();

        // Console output
        if self.console_timestamps {
            match level {
                LogLevel::Error | LogLevel::Warning => eprintln!("{}", entry),
                LogLevel::Info | LogLevel::Debug => println!("{}", entry),
            }
        } else {
            match level {
                LogLevel::Error => eprintln!("   ✗ {}{}: {}", component, procedure_part, message),
                LogLevel::Warning => eprintln!("   ⚠ {}{}: {}", component, procedure_part, message),
                LogLevel::Info => println!("   {}", message),
                LogLevel::Debug => println!("   [DEBUG] {}", message),
            }
        }

        // File output
        if let Some(ref path) = self.log_file {
            if let Err(e) = Self::append_to_file(path, &entry) {
                eprintln!("Failed to write to log file {}: {}", path, e);
            }
        }
    }

    fn append_to_file(path: &str, entry: &str) -> std::io::Result<()> {
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        writeln!(file, "{}", entry)?;
        Ok(())
    }
}

/// One log line: `<timestamp> <LEVEL> <COMPONENT> [procedure]: message`.
fn format_entry(level: LogLevel, component: Component, procedure: Option<&str>, message: &str) -> String {
    let timestamp = Utc::now().format("%Y-%m-%d %H:%M:%S UTC");
    let procedure_part = procedure.map(|p| format!(" [{}]", p)).unwrap_or_default();
    format!("{} {} {}{}: {}", timestamp, level, component, procedure_part, message)
}

// ---------------------------------------------------------------------------
// Public Logging Functions
// ---------------------------------------------------------------------------

/// Initialize the global logger
pub fn init_logger(min_level: LogLevel, log_file: Option<&str>, console_timestamps: bool) {
    Logger::init(min_level, log_file.map(String::from), console_timestamps);
}

fn dispatch(level: LogLevel, component: Component, procedure: Option<&str>, message: &str) {
    let guard = LOGGER.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    if let Some(logger) = guard.as_ref() {
        logger.log(level, component, procedure, message);
    }
}

/// Log a general informational message
pub fn info(component: Component, procedure: Option<&str>, message: &str) {
    dispatch(LogLevel::Info, component, procedure, message);
}

/// Log a warning message
pub fn warn(component: Component, procedure: Option<&str>, message: &str) {
    dispatch(LogLevel::Warning, component, procedure, message);
}

/// Log an error message
pub fn error(component: Component, procedure: Option<&str>, message: &str) {
    dispatch(LogLevel::Error, component, procedure, message);
}

/// Log a debug message
pub fn debug(component: Component, procedure: Option<&str>, message: &str) {
    dispatch(LogLevel::Debug, component, procedure, message);
}

// ---------------------------------------------------------------------------
// Failure Classification Helpers
// ---------------------------------------------------------------------------

/// Classify an evaluation failure.
///
/// Asking for a period with no calibration is routine (e.g. before the
/// first gauging campaign); an undefined discharge points at a curve whose
/// zero-flow stage does not fit the gauge.
pub fn classify_evaluation_failure(err: &EvaluationError) -> FailureType {
    match err {
        EvaluationError::NoApplicableSegment { .. } => FailureType::Expected,
        EvaluationError::InvalidLevel { .. } => FailureType::Unknown,
        EvaluationError::UndefinedDischarge { .. } => FailureType::Unexpected,
    }
}

/// Classify a repository failure
pub fn classify_persist_failure(err: &PersistError) -> FailureType {
    match err {
        PersistError::NotFound(_) => FailureType::Expected,
        PersistError::Conflict(_) => FailureType::Unknown,
        PersistError::InvalidProcedure(_) => FailureType::Expected,
        PersistError::ProcedureMismatch { .. } => FailureType::Unexpected,
        PersistError::Io(_)
        | PersistError::Database(_)
        | PersistError::Corrupt { .. }
        | PersistError::SchemaMissing(_) => FailureType::Unexpected,
    }
}

fn log_classified(component: Component, procedure: &str, failure: FailureType, message: &str) {
    match failure {
        FailureType::Expected => debug(component, Some(procedure), message),
        FailureType::Unexpected => error(component, Some(procedure), message),
        FailureType::Unknown => warn(component, Some(procedure), message),
    }
}

// ---------------------------------------------------------------------------
// Structured Failure Logging
// ---------------------------------------------------------------------------

/// Log a rejected submission. Always a warning: the editor is expected to
/// fix the row and resubmit.
pub fn log_validation_failure(procedure: &str, err: &ValidationError) {
    warn(Component::Validator, Some(procedure), &format!("curve rejected: {}", err));
}

/// Log an evaluation failure with automatic classification
pub fn log_evaluation_failure(procedure: &str, err: &EvaluationError) {
    let failure = classify_evaluation_failure(err);
    let message = format!("evaluation failed [{}]: {}", failure, err);
    log_classified(Component::Evaluator, procedure, failure, &message);
}

/// Log a repository failure with automatic classification
pub fn log_persist_failure(procedure: &str, operation: &str, err: &PersistError) {
    let failure = classify_persist_failure(err);
    let message = format!("{} failed [{}]: {}", operation, failure, err);
    log_classified(Component::Repository, procedure, failure, &message);
}

// ---------------------------------------------------------------------------
// Series Summary Logging
// ---------------------------------------------------------------------------

/// Log a summary of a series conversion
pub fn log_series_summary(procedure: &str, summary: &SeriesSummary) {
    let message = format!(
        "Series converted: {}/{} computed, {} missing level, {} without rating, {} outside stage band",
        summary.computed,
        summary.total,
        summary.missing_level,
        summary.no_rating,
        summary.out_of_range
    );

    if summary.computed == summary.total {
        info(Component::Evaluator, Some(procedure), &message);
    } else if summary.computed == 0 {
        error(Component::Evaluator, Some(procedure), &message);
    } else {
        warn(Component::Evaluator, Some(procedure), &message);
    }
}
