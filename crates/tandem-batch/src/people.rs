//! The people job: names into a lookup table, ages correlated into the database

use std::sync::Arc;
use tracing::info;

use crate::config::JobConfig;
use crate::context::{ContextPromotion, JobExecutionContext};
use crate::error::{Result, SinkError};
use crate::job::{JobExecution, Pipeline};
use crate::processor::{CorrelateProcessor, NormalizeProcessor};
use crate::record::Person;
use crate::sink::{BatchSink, SqlxBatchSink};
use crate::source::{CsvRecordSource, RecordSource};
use crate::step::ChunkStep;
use crate::writer::{BatchSqlWriter, InMemoryWriter, SerdeParameterProvider};

pub const JOB_NAME: &str = "importUserJob";
pub const STEP1_NAME: &str = "step1";
pub const STEP2_NAME: &str = "step2";

/// Field order of the names input
pub const NAME_SCHEMA: [&str; 2] = ["firstName", "lastName"];

/// Field order of the ages input
pub const AGE_SCHEMA: [&str; 2] = ["firstName", "age"];

pub const CREATE_PEOPLE_TABLE: &str = "CREATE TABLE IF NOT EXISTS people (\
     first_name VARCHAR(20) NOT NULL, \
     last_name VARCHAR(20), \
     age VARCHAR(8))";

const SELECT_PEOPLE: &str = "SELECT first_name, last_name, age FROM people";

/// CSV sources for both inputs, as configured
pub fn csv_sources(config: &JobConfig) -> Result<(CsvRecordSource<Person>, CsvRecordSource<Person>)> {
    let delimiter = config.input.delimiter_byte();
    let names = CsvRecordSource::from_path(&config.input.names_path, &NAME_SCHEMA, delimiter)?;
    let ages = CsvRecordSource::from_path(&config.input.ages_path, &AGE_SCHEMA, delimiter)?;
    Ok((names, ages))
}

/// The stage 2 writer, validated against the configured statement
pub fn people_writer(config: &JobConfig, sink: Arc<dyn BatchSink>) -> Result<BatchSqlWriter<Person>> {
    BatchSqlWriter::builder()
        .sql(config.insert_sql.clone())
        .sink(sink)
        .named_parameters(SerdeParameterProvider)
        .assert_updates(config.assert_updates)
        .build()
}

/// Build and run the two-step people job
///
/// Everything that can be validated up front (job settings, the insert
/// statement) is checked before step 1 reads its first record.
pub async fn run_people_job<N, A>(
    config: &JobConfig,
    names: N,
    ages: A,
    sink: Arc<dyn BatchSink>,
) -> Result<JobExecution>
where
    N: RecordSource<Item = Person>,
    A: RecordSource<Item = Person>,
{
    config.validate()?;
    let writer = people_writer(config, sink)?;

    let first = ChunkStep::new(
        STEP1_NAME,
        config.step1.clone(),
        names,
        NormalizeProcessor,
        InMemoryWriter::new(config.lookup_key.clone(), Person::key),
    );

    let lookup_key = config.lookup_key.clone();
    let on_unmatched = config.on_unmatched;
    let second_config = config.step2.clone();

    let promotion = ContextPromotion::new(config.promote_keys.iter().cloned())
        .strict(config.strict_promotion);

    let pipeline = Pipeline::new(
        JOB_NAME,
        first,
        STEP2_NAME,
        move |ctx: &JobExecutionContext| -> Result<_> {
            let processor =
                CorrelateProcessor::from_job_context(ctx, &lookup_key)?.on_unmatched(on_unmatched);
            Ok(ChunkStep::new(STEP2_NAME, second_config, ages, processor, writer))
        },
    )
    .promotion(promotion);

    Ok(pipeline.run().await)
}

/// Rows currently in the people table
pub async fn load_people(sink: &SqlxBatchSink) -> Result<Vec<Person>> {
    let rows: Vec<(String, Option<String>, Option<String>)> = sqlx::query_as(SELECT_PEOPLE)
        .fetch_all(sink.pool())
        .await
        .map_err(SinkError::from)?;

    Ok(rows
        .into_iter()
        .map(|(first_name, last_name, age)| Person {
            first_name,
            last_name,
            age,
        })
        .collect())
}

/// Log every stored person once the job has completed
pub async fn report_people(sink: &SqlxBatchSink) -> Result<usize> {
    let people = load_people(sink).await?;
    for person in &people {
        info!(person = %person, "Found person in the database");
    }
    Ok(people.len())
}
