//! Step and job execution contexts, and promotion between them
//!
//! Each step owns an [`ExecutionContext`] it may write freely. The job-wide
//! [`JobExecutionContext`] is only ever written by [`ContextPromotion`],
//! once per key, after a step has completed and before the next one starts.
//! Everything downstream reads it.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use crate::error::{BatchError, Result};

/// Step-scoped key/value store
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionContext {
    values: BTreeMap<String, Value>,
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `value` under `key`, replacing any previous value
    pub fn put<T: Serialize>(&mut self, key: impl Into<String>, value: &T) -> Result<()> {
        self.values.insert(key.into(), serde_json::to_value(value)?);
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Typed read; `Ok(None)` when the key is absent
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        get_typed(&self.values, key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Job-scoped key/value store, populated only through promotion
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobExecutionContext {
    values: BTreeMap<String, Value>,
}

impl JobExecutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        get_typed(&self.values, key)
    }

    /// Typed read of a value that must be present
    pub fn require<T: DeserializeOwned>(&self, key: &str) -> Result<T> {
        self.get_as(key)?.ok_or_else(|| BatchError::MissingContext {
            key: key.to_string(),
        })
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn insert_once(&mut self, key: &str, value: Value) -> Result<()> {
        if self.values.contains_key(key) {
            return Err(BatchError::ContextConflict {
                key: key.to_string(),
            });
        }
        self.values.insert(key.to_string(), value);
        Ok(())
    }
}

fn get_typed<T: DeserializeOwned>(values: &BTreeMap<String, Value>, key: &str) -> Result<Option<T>> {
    values
        .get(key)
        .map(|value| T::deserialize(value).map_err(BatchError::from))
        .transpose()
}

/// Copies named keys from a completed step's context into the job context
#[derive(Debug, Clone, Default)]
pub struct ContextPromotion {
    keys: BTreeSet<String>,
    strict: bool,
}

impl ContextPromotion {
    pub fn new<I, K>(keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        Self {
            keys: keys.into_iter().map(Into::into).collect(),
            strict: false,
        }
    }

    /// Fail instead of skipping when a configured key is absent from the step context
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.keys.iter().map(String::as_str)
    }

    /// Promote every configured key present in `step`; returns how many were copied
    pub fn promote(&self, step: &ExecutionContext, job: &mut JobExecutionContext) -> Result<usize> {
        let mut promoted = 0;

        for key in &self.keys {
            match step.get(key) {
                Some(value) => {
                    job.insert_once(key, value.clone())?;
                    debug!(key = %key, "Promoted step context value to job context");
                    promoted += 1;
                },
                None if self.strict => {
                    return Err(BatchError::MissingContext { key: key.clone() });
                },
                None => {
                    debug!(key = %key, "Promotion key not present in step context, skipping");
                },
            }
        }

        Ok(promoted)
    }
}
