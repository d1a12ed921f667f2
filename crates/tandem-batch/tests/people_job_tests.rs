//! End-to-end people job scenarios against the in-memory sink

mod common;

use common::{ages, names};
use std::sync::Arc;
use tandem_batch::config::JobConfig;
use tandem_batch::people::{run_people_job, STEP1_NAME, STEP2_NAME};
use tandem_batch::record::{Person, PersonTable};
use tandem_batch::sink::{MemorySink, SqlValue};
use tandem_batch::step::StepConfig;
use tandem_batch::{ErrorKind, PipelineState};

fn row(first: &str, last: &str, age: &str) -> Vec<SqlValue> {
    vec![first.into(), last.into(), age.into()]
}

fn config_with_chunk_size(chunk_size: usize) -> JobConfig {
    JobConfig {
        step1: StepConfig::fault_tolerant(chunk_size, 10),
        step2: StepConfig::new(chunk_size),
        ..JobConfig::default()
    }
}

// ============================================================================
// HAPPY PATH
// ============================================================================

#[tokio::test]
async fn test_john_and_jane_are_merged_and_written() {
    let sink = Arc::new(MemorySink::new());

    let job = run_people_job(
        &JobConfig::default(),
        names(&[("john", "doe"), ("jane", "smith")]),
        ages(&[("john", "34"), ("jane", "27")]),
        sink.clone(),
    )
    .await
    .unwrap();

    assert_eq!(job.state, PipelineState::Completed);
    assert_eq!(job.exit_code(), 0);
    assert!(job.failure_detail().is_none());

    let table: PersonTable = job.context.require("entityRef").unwrap();
    assert_eq!(table.len(), 2);
    assert_eq!(table["JOHN"].last_name.as_deref(), Some("doe"));
    assert_eq!(table["JANE"].last_name.as_deref(), Some("smith"));

    let batches = sink.batches().await;
    assert_eq!(batches.len(), 1);
    assert_eq!(
        batches[0].bindings,
        vec![row("JOHN", "doe", "34"), row("JANE", "smith", "27")]
    );

    let step2 = job.step(STEP2_NAME).unwrap();
    assert_eq!(step2.write_count, 2);
    assert_eq!(step2.commit_count, 1);
}

#[tokio::test]
async fn test_duplicate_names_keep_last_entry() {
    let sink = Arc::new(MemorySink::new());

    let job = run_people_job(
        &JobConfig::default(),
        names(&[("john", "doe"), ("John", "roe"), ("jane", "smith")]),
        ages(&[("JOHN", "34")]),
        sink.clone(),
    )
    .await
    .unwrap();

    assert!(job.is_completed());
    let table: PersonTable = job.context.require("entityRef").unwrap();
    assert_eq!(table.len(), 2);
    assert_eq!(sink.rows().await, vec![row("JOHN", "roe", "34")]);
}

#[tokio::test]
async fn test_age_and_last_name_are_carried_unmodified() {
    let sink = Arc::new(MemorySink::new());

    run_people_job(
        &JobConfig::default(),
        names(&[("ana", "de la Cruz"), ("bo", "O'Neil")]),
        ages(&[("bo", "007"), ("ana", " 41")]),
        sink.clone(),
    )
    .await
    .unwrap();

    assert_eq!(
        sink.rows().await,
        vec![row("BO", "O'Neil", "007"), row("ANA", "de la Cruz", " 41")]
    );
}

// ============================================================================
// CHUNKING
// ============================================================================

#[tokio::test]
async fn test_sink_calls_follow_chunk_size() {
    for (m, n) in [(1usize, 10usize), (10, 10), (11, 10), (25, 4), (7, 1)] {
        let people: Vec<(String, String)> = (0..m)
            .map(|i| (format!("p{i}"), format!("{}", 20 + i)))
            .collect();
        let name_rows: Vec<(&str, &str)> =
            people.iter().map(|(f, _)| (f.as_str(), "x")).collect();
        let age_rows: Vec<(&str, &str)> =
            people.iter().map(|(f, a)| (f.as_str(), a.as_str())).collect();

        let sink = Arc::new(MemorySink::new());
        let job = run_people_job(
            &config_with_chunk_size(n),
            names(&name_rows),
            ages(&age_rows),
            sink.clone(),
        )
        .await
        .unwrap();
        assert!(job.is_completed());

        let batches = sink.batches().await;
        assert_eq!(batches.len(), m.div_ceil(n), "m={m} n={n}");

        let expected_last = if m % n == 0 { n } else { m % n };
        assert_eq!(batches.last().unwrap().bindings.len(), expected_last);

        let written: Vec<SqlValue> = sink.rows().await.into_iter().map(|r| r[0].clone()).collect();
        let expected: Vec<SqlValue> = people
            .iter()
            .map(|(f, _)| SqlValue::from(f.to_uppercase()))
            .collect();
        assert_eq!(written, expected);

        assert_eq!(job.step(STEP1_NAME).unwrap().commit_count, m.div_ceil(n) as u64);
    }
}

// ============================================================================
// FAILURES
// ============================================================================

#[tokio::test]
async fn test_unmatched_key_fails_job_before_chunk_is_written() {
    let sink = Arc::new(MemorySink::new());

    let job = run_people_job(
        &JobConfig::default(),
        names(&[("john", "doe"), ("jane", "smith")]),
        ages(&[("john", "34"), ("mike", "40"), ("jane", "27")]),
        sink.clone(),
    )
    .await
    .unwrap();

    assert_eq!(job.state, PipelineState::Failed);
    assert_ne!(job.exit_code(), 0);

    let failure = job.failure.as_ref().unwrap();
    assert_eq!(failure.step, STEP2_NAME);
    assert_eq!(failure.kind, ErrorKind::Correlation);
    assert_eq!(failure.position, Some(2));
    assert!(failure.message.contains("MIKE"));
    assert!(failure.message.contains("firstName: mike"));

    assert!(sink.batches().await.is_empty());
    let step2 = job.step(STEP2_NAME).unwrap();
    assert_eq!(step2.read_count, 2);
    assert_eq!(step2.write_count, 0);
}

#[tokio::test]
async fn test_zero_update_count_fails_job_with_index_and_record() {
    let sink = Arc::new(MemorySink::with_outcome(|row| {
        u64::from(row[0] != SqlValue::from("JANE"))
    }));

    let job = run_people_job(
        &JobConfig::default(),
        names(&[("john", "doe"), ("jane", "smith")]),
        ages(&[("john", "34"), ("jane", "27")]),
        sink.clone(),
    )
    .await
    .unwrap();

    assert_eq!(job.state, PipelineState::Failed);
    let detail = job.failure_detail().unwrap();
    assert!(detail.contains("write_assertion"), "{detail}");
    assert!(detail.contains("Item 1 of 2"), "{detail}");
    assert!(detail.contains("firstName: JANE, lastName: smith, age: 27"), "{detail}");

    // JOHN's row is discarded along with JANE's
    assert!(sink.rows().await.is_empty());
    assert_eq!(job.step(STEP2_NAME).unwrap().write_count, 0);
}

#[tokio::test]
async fn test_malformed_names_are_skipped_in_fault_tolerant_step() {
    let sink = Arc::new(MemorySink::new());
    let names = tandem_batch::source::IterSource::new(
        vec![
            Ok(Person::named("john", "doe")),
            Err(tandem_batch::BatchError::Parse {
                position: 2,
                message: "expected 2 fields (firstName, lastName), found 1".to_string(),
            }),
            Ok(Person::named("jane", "smith")),
        ]
        .into_iter(),
    );

    let job = run_people_job(
        &JobConfig::default(),
        names,
        ages(&[("jane", "27")]),
        sink.clone(),
    )
    .await
    .unwrap();

    assert!(job.is_completed());
    assert_eq!(job.step(STEP1_NAME).unwrap().read_skip_count, 1);
    assert_eq!(sink.rows().await, vec![row("JANE", "smith", "27")]);
}
