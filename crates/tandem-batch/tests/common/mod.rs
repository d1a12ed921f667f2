//! Shared helpers for tandem-batch integration tests

#![allow(dead_code)]

use std::io::Write;
use std::path::PathBuf;
use tandem_batch::config::{DatabaseConfig, JobConfig};
use tandem_batch::people::CREATE_PEOPLE_TABLE;
use tandem_batch::record::Person;
use tandem_batch::sink::SqlxBatchSink;
use tandem_batch::source::IterSource;
use tandem_batch::Result;
use tempfile::NamedTempFile;

pub type PersonSource = IterSource<std::vec::IntoIter<Result<Person>>>;

pub fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join("people")
        .join(name)
}

pub fn names(rows: &[(&str, &str)]) -> PersonSource {
    IterSource::from_records(rows.iter().map(|(f, l)| Person::named(*f, *l)).collect())
}

pub fn ages(rows: &[(&str, &str)]) -> PersonSource {
    IterSource::from_records(rows.iter().map(|(f, a)| Person::aged(*f, *a)).collect())
}

/// Job config reading the given fixture files
pub fn fixture_config(names_file: &str, ages_file: &str) -> JobConfig {
    let mut config = JobConfig::default();
    config.input.names_path = fixture_path(names_file);
    config.input.ages_path = fixture_path(ages_file);
    config
}

/// Write `contents` to a temporary CSV file
pub fn temp_csv(contents: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(".csv")
        .tempfile()
        .expect("Failed to create temp file");
    file.write_all(contents.as_bytes())
        .expect("Failed to write temp file");
    file
}

/// In-memory SQLite database with the people table created
///
/// A single connection keeps every query on the same in-memory database.
pub async fn sqlite_people() -> SqlxBatchSink {
    let config = DatabaseConfig {
        url: "sqlite::memory:".to_string(),
        max_connections: 1,
        connect_timeout_secs: 5,
    };
    let sink = SqlxBatchSink::connect(&config)
        .await
        .expect("Failed to open SQLite database");
    sink.execute(CREATE_PEOPLE_TABLE)
        .await
        .expect("Failed to create people table");
    sink
}
