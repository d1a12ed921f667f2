//! Stage 2 processor: joins each record against the promoted stage 1 table

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::ItemProcessor;
use crate::context::JobExecutionContext;
use crate::error::{BatchError, Result};
use crate::record::{normalize_key, Person, PersonTable};

/// What to do with a record whose key is absent from the lookup table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnmatchedPolicy {
    /// Raise a correlation error, failing the step
    #[default]
    Fail,
    /// Drop the record and keep going
    Skip,
}

/// Completes `(firstName, age)` records with the last name found in stage 1
#[derive(Debug, Clone)]
pub struct CorrelateProcessor {
    table_key: String,
    table: PersonTable,
    on_unmatched: UnmatchedPolicy,
}

impl CorrelateProcessor {
    pub fn new(table_key: impl Into<String>, table: PersonTable) -> Self {
        Self {
            table_key: table_key.into(),
            table,
            on_unmatched: UnmatchedPolicy::default(),
        }
    }

    /// Bind to the table promoted under `table_key`
    ///
    /// The table is read once here; the job context is read-only afterwards.
    pub fn from_job_context(context: &JobExecutionContext, table_key: &str) -> Result<Self> {
        let table: PersonTable = context.require(table_key)?;
        debug!(key = %table_key, entries = table.len(), "Bound promoted lookup table");
        Ok(Self::new(table_key, table))
    }

    pub fn on_unmatched(mut self, policy: UnmatchedPolicy) -> Self {
        self.on_unmatched = policy;
        self
    }

    pub fn table_len(&self) -> usize {
        self.table.len()
    }
}

impl ItemProcessor<Person> for CorrelateProcessor {
    type Output = Person;

    fn process(&self, person: Person) -> Result<Option<Person>> {
        let key = normalize_key(&person.first_name);

        let Some(partial) = self.table.get(&key) else {
            return match self.on_unmatched {
                UnmatchedPolicy::Fail => Err(BatchError::Correlation {
                    key,
                    table: self.table_key.clone(),
                    record: person.to_string(),
                }),
                UnmatchedPolicy::Skip => {
                    warn!(key = %key, record = %person, "No stage 1 match, dropping record");
                    Ok(None)
                },
            };
        };

        let merged = Person {
            first_name: key,
            last_name: partial.last_name.clone(),
            age: person.age.clone(),
        };
        debug!(from = %person, to = %merged, "Converted record");

        Ok(Some(merged))
    }
}
