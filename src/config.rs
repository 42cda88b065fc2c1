//! Service configuration.
//!
//! Settings come from a TOML file (`rating_service.toml` by default, or the
//! path in `RATING_SERVICE_CONFIG`). Every section and key has a default, so
//! a missing file means "run with defaults". The PostgreSQL connection
//! string is never stored in the file: it is read from `DATABASE_URL`,
//! which may be set in a `.env` file.
//!
//! ```toml
//! [logging]
//! level = "info"
//! file = "/var/log/rating_service.log"
//! timestamps = true
//!
//! [repository]
//! backend = "rcv"            # rcv (default) | postgres | memory
//! rcv_folder = "./virtual"
//! schema = "rating"
//!
//! [evaluation]
//! formula = "power_law"      # power_law | shifted_power_law
//! ```

use std::env;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::evaluate::Evaluator;
use crate::evaluate::formula::FormulaKind;
use crate::logging::{self, LogLevel};
use crate::repository::postgres::DEFAULT_SCHEMA;
use crate::repository::{
    CurveRepository, MemoryRepository, PersistError, PostgresRepository, RcvRepository,
};

/// Environment variable naming the config file.
pub const CONFIG_PATH_VAR: &str = "RATING_SERVICE_CONFIG";

/// Config file used when `RATING_SERVICE_CONFIG` is not set.
pub const DEFAULT_CONFIG_PATH: &str = "rating_service.toml";

// ============================================================================
// Configuration Structures
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub logging: LoggingConfig,
    pub repository: RepositoryConfig,
    pub evaluation: EvaluationConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<String>,
    pub timestamps: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
            timestamps: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    /// Process-local; nothing outlives the process.
    Memory,
    #[default]
    Rcv,
    Postgres,
}

impl Backend {
    /// `false` for a backend whose curves are lost when the process exits.
    pub fn is_persistent(self) -> bool {
        !matches!(self, Backend::Memory)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepositoryConfig {
    pub backend: Backend,
    /// Root of the virtual procedure folders holding `.rcv` files.
    pub rcv_folder: PathBuf,
    /// PostgreSQL schema holding the rating tables.
    pub schema: String,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            backend: Backend::default(),
            rcv_folder: PathBuf::from("./virtual"),
            schema: DEFAULT_SCHEMA.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationConfig {
    pub formula: FormulaKind,
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("unknown log level '{0}' (expected debug, info, warn or error)")]
    InvalidLogLevel(String),
    #[error("DATABASE_URL must be set (environment or .env) for the postgres backend")]
    MissingDatabaseUrl,
    #[error("cannot open repository: {0}")]
    Repository(#[from] PersistError),
}

// ============================================================================
// Loading
// ============================================================================

/// Path of the config file: `$RATING_SERVICE_CONFIG` or the default.
pub fn config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_VAR)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// Reads and parses the config file; a missing file yields the defaults.
pub fn load_config(path: &Path) -> Result<ServiceConfig, ConfigError> {
    match fs::read_to_string(path) {
        Ok(text) => parse_config(&text),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(ServiceConfig::default()),
        Err(source) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Parses TOML text into a config, checking values serde cannot.
pub fn parse_config(text: &str) -> Result<ServiceConfig, ConfigError> {
    let config: ServiceConfig = toml::from_str(text)?;
    config.log_level()?;
    Ok(config)
}

/// `DATABASE_URL`, after loading `.env` if present.
pub fn database_url() -> Result<String, ConfigError> {
    dotenv::dotenv().ok();
    env::var("DATABASE_URL").map_err(|_| ConfigError::MissingDatabaseUrl)
}

impl ServiceConfig {
    pub fn log_level(&self) -> Result<LogLevel, ConfigError> {
        LogLevel::parse(&self.logging.level)
            .ok_or_else(|| ConfigError::InvalidLogLevel(self.logging.level.clone()))
    }

    /// Installs the global logger described by `[logging]`.
    pub fn init_logging(&self) -> Result<(), ConfigError> {
        logging::init_logger(
            self.log_level()?,
            self.logging.file.as_deref(),
            self.logging.timestamps,
        );
        Ok(())
    }

    /// Evaluator using the configured formula.
    pub fn evaluator(&self) -> Evaluator {
        Evaluator::new(self.evaluation.formula.build())
    }

    /// Opens the configured repository backend.
    pub fn open_repository(&self) -> Result<Arc<dyn CurveRepository>, ConfigError> {
        let repo: Arc<dyn CurveRepository> = match self.repository.backend {
            Backend::Memory => Arc::new(MemoryRepository::new()),
            Backend::Rcv => Arc::new(RcvRepository::new(&self.repository.rcv_folder)),
            Backend::Postgres => {
                let url = database_url()?;
                Arc::new(PostgresRepository::connect(&url, &self.repository.schema)?)
            }
        };
        Ok(repo)
    }
}

// ============================================================================
// Tests
// ============================================================================
