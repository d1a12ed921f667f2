//! Keyed in-memory writer, the stage 1 sink

use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use tracing::debug;

use super::ItemWriter;
use crate::context::ExecutionContext;
use crate::error::Result;

type KeyFn<T> = dyn Fn(&T) -> String + Send + Sync;

/// Collects records into a map keyed by `key_fn`
///
/// A later record with the same key replaces the earlier one. On
/// [`ItemWriter::update`] the whole map is published under `context_key`.
pub struct InMemoryWriter<T> {
    context_key: String,
    key_fn: Box<KeyFn<T>>,
    entries: HashMap<String, T>,
}

impl<T> InMemoryWriter<T> {
    pub fn new<F>(context_key: impl Into<String>, key_fn: F) -> Self
    where
        F: Fn(&T) -> String + Send + Sync + 'static,
    {
        Self {
            context_key: context_key.into(),
            key_fn: Box::new(key_fn),
            entries: HashMap::new(),
        }
    }

    pub fn context_key(&self) -> &str {
        &self.context_key
    }

    pub fn entries(&self) -> &HashMap<String, T> {
        &self.entries
    }

    pub fn get(&self, key: &str) -> Option<&T> {
        self.entries.get(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl<T> ItemWriter<T> for InMemoryWriter<T>
where
    T: Serialize + Send + Sync,
{
    async fn write(&mut self, chunk: Vec<T>) -> Result<()> {
        let size = chunk.len();
        for item in chunk {
            let key = (self.key_fn)(&item);
            if self.entries.insert(key.clone(), item).is_some() {
                debug!(key = %key, "Replaced earlier entry");
            }
        }
        debug!(written = size, total = self.entries.len(), "Stored chunk in memory");
        Ok(())
    }

    fn update(&self, context: &mut ExecutionContext) -> Result<()> {
        context.put(self.context_key.clone(), &self.entries)?;
        debug!(
            key = %self.context_key,
            entries = self.entries.len(),
            "Published table to step context"
        );
        Ok(())
    }
}
