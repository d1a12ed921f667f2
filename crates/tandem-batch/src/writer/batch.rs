//! Batch SQL writer, the stage 2 sink
//!
//! Every chunk becomes one call to a [`BatchSink`]: the same statement bound
//! once per record. Binding is either named (`:firstName`, resolved through a
//! [`NamedParameterProvider`]) or positional (`?`, filled by a
//! [`PositionalSetter`]), decided by the statement at build time.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt::Display;
use std::sync::Arc;
use tracing::{debug, warn};

use super::statement::{BindingMode, ParsedStatement};
use super::ItemWriter;
use crate::error::{BatchError, Result, SinkError};
use crate::sink::{BatchSink, CommitPolicy, RowBinding, SqlValue};

/// Named parameter values of one record
pub type SqlParameters = HashMap<String, SqlValue>;

/// Resolves named placeholders from a record
pub trait NamedParameterProvider<T>: Send + Sync {
    fn parameters(&self, item: &T) -> Result<SqlParameters>;
}

impl<T, F> NamedParameterProvider<T> for F
where
    F: Fn(&T) -> Result<SqlParameters> + Send + Sync,
{
    fn parameters(&self, item: &T) -> Result<SqlParameters> {
        self(item)
    }
}

/// Names parameters after the record's serialized field names
///
/// A `Person` serializes as `{"firstName": .., "lastName": .., "age": ..}`,
/// so `:firstName`, `:lastName` and `:age` resolve without extra wiring.
#[derive(Debug, Clone, Copy, Default)]
pub struct SerdeParameterProvider;

impl<T: Serialize> NamedParameterProvider<T> for SerdeParameterProvider {
    fn parameters(&self, item: &T) -> Result<SqlParameters> {
        match serde_json::to_value(item)? {
            Value::Object(fields) => Ok(fields
                .iter()
                .map(|(name, value)| (name.clone(), SqlValue::from_json(value)))
                .collect()),
            other => Err(BatchError::Config(format!(
                "Named parameters need a record that serializes to an object, got {}",
                other
            ))),
        }
    }
}

/// Appends one value per `?` placeholder, in statement order
pub trait PositionalSetter<T>: Send + Sync {
    fn set_values(&self, item: &T, row: &mut RowBinding) -> Result<()>;
}

impl<T, F> PositionalSetter<T> for F
where
    F: Fn(&T, &mut RowBinding) -> Result<()> + Send + Sync,
{
    fn set_values(&self, item: &T, row: &mut RowBinding) -> Result<()> {
        self(item, row)
    }
}

enum Binder<T> {
    Named(Box<dyn NamedParameterProvider<T>>),
    Positional(Box<dyn PositionalSetter<T>>),
}

/// Builder for [`BatchSqlWriter`]; all setup validation happens in `build`
pub struct BatchSqlWriterBuilder<T> {
    sql: Option<String>,
    sink: Option<Arc<dyn BatchSink>>,
    named: Option<Box<dyn NamedParameterProvider<T>>>,
    positional: Option<Box<dyn PositionalSetter<T>>>,
    assert_updates: bool,
}

impl<T> Default for BatchSqlWriterBuilder<T> {
    fn default() -> Self {
        Self {
            sql: None,
            sink: None,
            named: None,
            positional: None,
            assert_updates: true,
        }
    }
}

impl<T> BatchSqlWriterBuilder<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sql(mut self, sql: impl Into<String>) -> Self {
        self.sql = Some(sql.into());
        self
    }

    pub fn sink(mut self, sink: Arc<dyn BatchSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn named_parameters<P>(mut self, provider: P) -> Self
    where
        P: NamedParameterProvider<T> + 'static,
    {
        self.named = Some(Box::new(provider));
        self
    }

    pub fn positional_setter<S>(mut self, setter: S) -> Self
    where
        S: PositionalSetter<T> + 'static,
    {
        self.positional = Some(Box::new(setter));
        self
    }

    /// Fail a chunk when any record affects zero rows (default `true`)
    pub fn assert_updates(mut self, assert_updates: bool) -> Self {
        self.assert_updates = assert_updates;
        self
    }

    pub fn build(self) -> Result<BatchSqlWriter<T>> {
        let sink = self
            .sink
            .ok_or_else(|| BatchError::Config("A batch sink is required".to_string()))?;

        let sql = self
            .sql
            .filter(|sql| !sql.trim().is_empty())
            .ok_or_else(|| BatchError::Config("An SQL statement is required".to_string()))?;

        let statement = ParsedStatement::parse(&sql)?;

        let binder = match statement.mode() {
            BindingMode::Named => {
                if self.positional.is_some() {
                    warn!("Statement uses named parameters, ignoring positional setter");
                }
                Binder::Named(self.named.ok_or_else(|| {
                    BatchError::Config(
                        "Using SQL statement with named parameters requires a NamedParameterProvider"
                            .to_string(),
                    )
                })?)
            },
            BindingMode::Positional => {
                if self.named.is_some() {
                    warn!("Statement uses '?' placeholders, ignoring named parameter provider");
                }
                Binder::Positional(self.positional.ok_or_else(|| {
                    BatchError::Config(
                        "Using SQL statement with '?' placeholders requires a PositionalSetter"
                            .to_string(),
                    )
                })?)
            },
        };

        debug!(sql = %statement.sql(), mode = ?statement.mode(), "Prepared batch statement");

        Ok(BatchSqlWriter {
            statement,
            sink,
            binder,
            assert_updates: self.assert_updates,
            written: 0,
        })
    }
}

/// Writes each chunk as one batch through a [`BatchSink`]
pub struct BatchSqlWriter<T> {
    statement: ParsedStatement,
    sink: Arc<dyn BatchSink>,
    binder: Binder<T>,
    assert_updates: bool,
    written: u64,
}

impl<T> BatchSqlWriter<T> {
    pub fn builder() -> BatchSqlWriterBuilder<T> {
        BatchSqlWriterBuilder::new()
    }

    pub fn statement(&self) -> &ParsedStatement {
        &self.statement
    }

    /// Records confirmed by the sink so far
    pub fn written(&self) -> u64 {
        self.written
    }

    fn commit_policy(&self) -> CommitPolicy {
        if self.assert_updates {
            CommitPolicy::RequireUpdates
        } else {
            CommitPolicy::Always
        }
    }

    fn bind(&self, index: usize, item: &T) -> Result<RowBinding> {
        let expected = self.statement.parameter_count();

        match &self.binder {
            Binder::Named(provider) => {
                let mut params = provider.parameters(item)?;
                self.statement
                    .names()
                    .iter()
                    .map(|name| {
                        params.remove(name).ok_or_else(|| {
                            BatchError::Config(format!(
                                "No value for parameter '{}' in item {}",
                                name, index
                            ))
                        })
                    })
                    .collect()
            },
            Binder::Positional(setter) => {
                let mut row = RowBinding::with_capacity(expected);
                setter.set_values(item, &mut row)?;
                if row.len() != expected {
                    return Err(BatchError::Config(format!(
                        "Statement has {} placeholders but item {} bound {} values",
                        expected,
                        index,
                        row.len()
                    )));
                }
                Ok(row)
            },
        }
    }
}

#[async_trait]
impl<T> ItemWriter<T> for BatchSqlWriter<T>
where
    T: Display + Send + Sync,
{
    async fn write(&mut self, chunk: Vec<T>) -> Result<()> {
        if chunk.is_empty() {
            return Ok(());
        }

        let bindings = chunk
            .iter()
            .enumerate()
            .map(|(index, item)| self.bind(index, item))
            .collect::<Result<Vec<_>>>()?;

        debug!(items = chunk.len(), "Executing batch");
        let counts = self
            .sink
            .execute_batch(self.statement.sql(), bindings, self.commit_policy())
            .await?;

        if counts.len() != chunk.len() {
            return Err(SinkError::CountMismatch {
                expected: chunk.len(),
                actual: counts.len(),
            }
            .into());
        }

        if self.assert_updates {
            if let Some(index) = counts.iter().position(|&count| count == 0) {
                return Err(BatchError::WriteAssertion {
                    index,
                    total: counts.len(),
                    record: chunk[index].to_string(),
                });
            }
        }

        self.written += chunk.len() as u64;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_INSERT_SQL;
    use crate::record::Person;
    use crate::sink::MemorySink;

    fn person_writer(sink: Arc<MemorySink>) -> BatchSqlWriter<Person> {
        BatchSqlWriter::builder()
            .sql(DEFAULT_INSERT_SQL)
            .sink(sink)
            .named_parameters(SerdeParameterProvider)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_named_binding_follows_placeholder_order() {
        let sink = Arc::new(MemorySink::new());
        let mut writer = person_writer(sink.clone());

        writer
            .write(vec![Person::full("JOHN", "doe", "34"), Person::full("JANE", "smith", "27")])
            .await
            .unwrap();

        let batches = sink.batches().await;
        assert_eq!(batches.len(), 1);
        assert_eq!(
            batches[0].sql,
            "INSERT INTO people (first_name, last_name, age) VALUES ($1, $2, $3)"
        );
        assert_eq!(
            batches[0].bindings,
            vec![
                vec![SqlValue::from("JOHN"), "doe".into(), "34".into()],
                vec!["JANE".into(), "smith".into(), "27".into()],
            ]
        );
        assert_eq!(writer.written(), 2);
    }

    #[tokio::test]
    async fn test_absent_optional_field_binds_null() {
        let sink = Arc::new(MemorySink::new());
        let mut writer = person_writer(sink.clone());

        writer.write(vec![Person::aged("MIKE", "40")]).await.unwrap();

        assert_eq!(
            sink.rows().await,
            vec![vec!["MIKE".into(), SqlValue::Null, "40".into()]]
        );
    }

    #[tokio::test]
    async fn test_zero_update_count_fails_with_record() {
        let sink = Arc::new(MemorySink::with_outcome(|row| {
            if row[0] == SqlValue::from("JANE") {
                0
            } else {
                1
            }
        }));
        let mut writer = person_writer(sink.clone());

        let err = writer
            .write(vec![
                Person::full("JOHN", "doe", "34"),
                Person::full("JANE", "smith", "27"),
            ])
            .await
            .unwrap_err();

        assert!(sink.batches().await.is_empty());
        assert_eq!(writer.written(), 0);

        match err {
            BatchError::WriteAssertion { index, total, record } => {
                assert_eq!(index, 1);
                assert_eq!(total, 2);
                assert_eq!(record, "firstName: JANE, lastName: smith, age: 27");
            },
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_zero_update_count_tolerated_without_assertion() {
        let sink = Arc::new(MemorySink::with_outcome(|_| 0));
        let mut writer = BatchSqlWriter::builder()
            .sql(DEFAULT_INSERT_SQL)
            .sink(sink)
            .named_parameters(SerdeParameterProvider)
            .assert_updates(false)
            .build()
            .unwrap();

        writer.write(vec![Person::full("JOHN", "doe", "34")]).await.unwrap();
        assert_eq!(writer.written(), 1);
    }

    #[tokio::test]
    async fn test_empty_chunk_does_not_reach_sink() {
        let sink = Arc::new(MemorySink::rejecting("should not be called"));
        let mut writer = person_writer(sink.clone());

        writer.write(Vec::new()).await.unwrap();
        assert!(sink.batches().await.is_empty());
    }

    #[tokio::test]
    async fn test_sink_failure_propagates() {
        let sink = Arc::new(MemorySink::rejecting("unique constraint"));
        let mut writer = person_writer(sink);

        let err = writer
            .write(vec![Person::full("JOHN", "doe", "34")])
            .await
            .unwrap_err();
        assert!(matches!(err, BatchError::Sink(SinkError::Rejected(_))));
    }

    #[tokio::test]
    async fn test_positional_setter() {
        let sink = Arc::new(MemorySink::new());
        let mut writer = BatchSqlWriter::builder()
            .sql("INSERT INTO people (first_name, age) VALUES (?, ?)")
            .sink(sink.clone())
            .positional_setter(|p: &Person, row: &mut RowBinding| -> Result<()> {
                row.push(p.first_name.as_str().into());
                row.push(p.age.clone().into());
                Ok(())
            })
            .build()
            .unwrap();

        writer.write(vec![Person::aged("JOHN", "34")]).await.unwrap();
        assert_eq!(sink.rows().await, vec![vec![SqlValue::from("JOHN"), "34".into()]]);
    }

    #[tokio::test]
    async fn test_missing_named_value_is_reported() {
        let sink = Arc::new(MemorySink::new());
        let mut writer = BatchSqlWriter::builder()
            .sql("INSERT INTO people (first_name, city) VALUES (:firstName, :city)")
            .sink(sink)
            .named_parameters(SerdeParameterProvider)
            .build()
            .unwrap();

        let err = writer
            .write(vec![Person::aged("JOHN", "34")])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("'city'"));
    }

    #[test]
    fn test_build_validation() {
        let sink: Arc<dyn BatchSink> = Arc::new(MemorySink::new());

        let empty = BatchSqlWriter::<Person>::builder()
            .sql("   ")
            .sink(sink.clone())
            .named_parameters(SerdeParameterProvider)
            .build();
        assert!(matches!(empty, Err(BatchError::Config(_))));

        let mixed = BatchSqlWriter::<Person>::builder()
            .sql("INSERT INTO t VALUES (:a, ?)")
            .sink(sink.clone())
            .named_parameters(SerdeParameterProvider)
            .build();
        assert!(matches!(mixed, Err(BatchError::Config(_))));

        let no_provider = BatchSqlWriter::<Person>::builder()
            .sql(DEFAULT_INSERT_SQL)
            .sink(sink.clone())
            .build();
        assert!(matches!(no_provider, Err(BatchError::Config(ref m)) if m.contains("NamedParameterProvider")));

        let no_setter = BatchSqlWriter::<Person>::builder()
            .sql("INSERT INTO t VALUES (?)")
            .sink(sink)
            .named_parameters(SerdeParameterProvider)
            .build();
        assert!(matches!(no_setter, Err(BatchError::Config(ref m)) if m.contains("PositionalSetter")));

        let no_sink = BatchSqlWriter::<Person>::builder()
            .sql(DEFAULT_INSERT_SQL)
            .named_parameters(SerdeParameterProvider)
            .build();
        assert!(matches!(no_sink, Err(BatchError::Config(_))));
    }
}
