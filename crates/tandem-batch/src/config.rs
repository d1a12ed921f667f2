//! Job configuration
//!
//! Loaded from an optional TOML file overlaid with `TANDEM__`-prefixed
//! environment variables, e.g. `TANDEM__STEP1__CHUNK_SIZE=50` or
//! `TANDEM__DATABASE__URL=postgres://localhost/people`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::error::{BatchError, Result};
use crate::processor::UnmatchedPolicy;
use crate::step::StepConfig;

// ============================================================================
// Defaults
// ============================================================================

/// Environment variable prefix for job settings.
pub const ENV_PREFIX: &str = "TANDEM";

/// Context key the stage 1 lookup table is published and promoted under.
pub const DEFAULT_LOOKUP_KEY: &str = "entityRef";

/// Default chunk size of both steps.
pub const DEFAULT_CHUNK_SIZE: usize = 10;

/// Default skip limit of fault-tolerant steps.
pub const DEFAULT_SKIP_LIMIT: usize = 10;

/// Default database URL for local runs.
pub const DEFAULT_DATABASE_URL: &str = "sqlite://people.db?mode=rwc";

/// Default maximum database connections in the pool.
pub const DEFAULT_DATABASE_MAX_CONNECTIONS: u32 = 5;

/// Default database connection timeout in seconds.
pub const DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Statement the second step writes with.
pub const DEFAULT_INSERT_SQL: &str =
    "INSERT INTO people (first_name, last_name, age) VALUES (:firstName, :lastName, :age)";

/// Top-level job configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JobConfig {
    /// Stage 1: names into the in-memory lookup table
    pub step1: StepConfig,
    /// Stage 2: ages correlated and written to the database
    pub step2: StepConfig,
    /// Context key the stage 1 table is published under and stage 2 reads
    pub lookup_key: String,
    /// Step 1 context keys copied into the job context
    pub promote_keys: BTreeSet<String>,
    /// Fail when a promotion key is missing from the step context
    pub strict_promotion: bool,
    /// Fail the write when a record affects zero rows
    pub assert_updates: bool,
    /// Stage 2 records without a stage 1 match
    pub on_unmatched: UnmatchedPolicy,
    pub insert_sql: String,
    pub input: InputConfig,
    pub database: DatabaseConfig,
}

/// Input file locations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    /// `firstName,lastName` rows
    pub names_path: PathBuf,
    /// `firstName,age` rows
    pub ages_path: PathBuf,
    pub delimiter: char,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub connect_timeout_secs: u64,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            step1: StepConfig::fault_tolerant(DEFAULT_CHUNK_SIZE, DEFAULT_SKIP_LIMIT),
            step2: StepConfig::new(DEFAULT_CHUNK_SIZE),
            lookup_key: DEFAULT_LOOKUP_KEY.to_string(),
            promote_keys: BTreeSet::from([DEFAULT_LOOKUP_KEY.to_string()]),
            strict_promotion: false,
            assert_updates: true,
            on_unmatched: UnmatchedPolicy::Fail,
            insert_sql: DEFAULT_INSERT_SQL.to_string(),
            input: InputConfig::default(),
            database: DatabaseConfig::default(),
        }
    }
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            names_path: PathBuf::from("data/sample-data.csv"),
            ages_path: PathBuf::from("data/sample-data2.csv"),
            delimiter: ',',
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_DATABASE_URL.to_string(),
            max_connections: DEFAULT_DATABASE_MAX_CONNECTIONS,
            connect_timeout_secs: DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS,
        }
    }
}

impl JobConfig {
    /// Load from an optional TOML file, then the environment
    ///
    /// Not validated here; callers apply their own overrides first and then
    /// call [`JobConfig::validate`].
    pub fn load(path: Option<&Path>) -> Result<Self> {
        dotenvy::dotenv().ok();

        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let config: JobConfig = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| BatchError::Config(e.to_string()))?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        self.step1.validate("step1")?;
        self.step2.validate("step2")?;

        if !self.promote_keys.contains(&self.lookup_key) {
            return Err(BatchError::Config(format!(
                "promote_keys must include the lookup key '{}'; step 2 reads it from the job context",
                self.lookup_key
            )));
        }

        if self.insert_sql.trim().is_empty() {
            return Err(BatchError::Config("insert_sql cannot be empty".to_string()));
        }

        if !self.input.delimiter.is_ascii() {
            return Err(BatchError::Config(format!(
                "delimiter must be a single ASCII character, got '{}'",
                self.input.delimiter
            )));
        }

        if self.database.url.is_empty() {
            return Err(BatchError::Config("Database URL cannot be empty".to_string()));
        }

        if self.database.max_connections == 0 {
            return Err(BatchError::Config(
                "Database max_connections must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

impl InputConfig {
    pub fn delimiter_byte(&self) -> u8 {
        // validate() guarantees ASCII
        self.delimiter as u8
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_match_reference_job() {
        let config = JobConfig::default();

        assert_eq!(config.step1.chunk_size, 10);
        assert!(config.step1.fault_tolerant);
        assert!(!config.step2.fault_tolerant);
        assert!(config.assert_updates);
        assert_eq!(config.lookup_key, "entityRef");
        assert_eq!(config.on_unmatched, UnmatchedPolicy::Fail);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_chunk_size() {
        let mut config = JobConfig::default();
        config.step2.chunk_size = 0;

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("step2"));
    }

    #[test]
    fn test_validate_requires_lookup_key_promotion() {
        let config = JobConfig {
            promote_keys: BTreeSet::new(),
            ..JobConfig::default()
        };
        assert!(matches!(config.validate(), Err(BatchError::Config(_))));
    }

    #[test]
    fn test_load_from_toml_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
assert_updates = false
on_unmatched = "skip"

[step2]
chunk_size = 25

[input]
delimiter = ";"

[database]
url = "sqlite::memory:"
"#
        )
        .unwrap();

        let config = JobConfig::load(Some(file.path())).unwrap();

        assert!(!config.assert_updates);
        assert_eq!(config.on_unmatched, UnmatchedPolicy::Skip);
        assert_eq!(config.step2.chunk_size, 25);
        assert_eq!(config.step1.chunk_size, DEFAULT_CHUNK_SIZE);
        assert_eq!(config.input.delimiter_byte(), b';');
        assert_eq!(config.database.url, "sqlite::memory:");
        assert_eq!(config.database.max_connections, DEFAULT_DATABASE_MAX_CONNECTIONS);
    }

    #[test]
    fn test_load_leaves_validation_to_caller() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[step1]\nchunk_size = 0").unwrap();

        let mut config = JobConfig::load(Some(file.path())).unwrap();
        assert!(config.validate().is_err());

        config.step1.chunk_size = 5;
        assert!(config.validate().is_ok());
    }
}
