//! Record sources and the chunk reader that drains them
//!
//! A [`RecordSource`] yields typed records one at a time until it runs dry.
//! [`ChunkReader`] wraps exactly one source for the duration of a step.

pub mod csv;

pub use self::csv::CsvRecordSource;

use crate::error::Result;

/// Finite, forward-only producer of typed records
pub trait RecordSource: Send {
    type Item: Send;

    /// Next record, `Ok(None)` once the input is exhausted
    fn read_next(&mut self) -> Result<Option<Self::Item>>;

    /// Position of the last record handed out (1-based; 0 before the first read)
    fn position(&self) -> u64;
}

/// Source over any iterator of already-typed results
pub struct IterSource<I> {
    inner: I,
    position: u64,
}

impl<I> IterSource<I> {
    pub fn new(inner: I) -> Self {
        Self { inner, position: 0 }
    }
}

impl<T: Send> IterSource<std::vec::IntoIter<Result<T>>> {
    /// Source over a fixed list of records
    pub fn from_records(records: Vec<T>) -> Self {
        Self::new(records.into_iter().map(Ok).collect::<Vec<_>>().into_iter())
    }
}

impl<I, T> RecordSource for IterSource<I>
where
    I: Iterator<Item = Result<T>> + Send,
    T: Send,
{
    type Item = T;

    fn read_next(&mut self) -> Result<Option<T>> {
        match self.inner.next() {
            Some(item) => {
                self.position += 1;
                item.map(Some)
            },
            None => Ok(None),
        }
    }

    fn position(&self) -> u64 {
        self.position
    }
}

/// Pulls records from one source until it reports end-of-input
///
/// The reader is fused: once the source has returned `Ok(None)` it is never
/// polled again. Read errors do not end the input; the caller decides whether
/// to skip the record or fail the step.
pub struct ChunkReader<S> {
    source: S,
    exhausted: bool,
    read_count: u64,
    error_count: u64,
}

impl<S: RecordSource> ChunkReader<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            exhausted: false,
            read_count: 0,
            error_count: 0,
        }
    }

    pub fn read(&mut self) -> Result<Option<S::Item>> {
        if self.exhausted {
            return Ok(None);
        }

        match self.source.read_next() {
            Ok(Some(item)) => {
                self.read_count += 1;
                Ok(Some(item))
            },
            Ok(None) => {
                self.exhausted = true;
                Ok(None)
            },
            Err(err) => {
                self.error_count += 1;
                Err(err)
            },
        }
    }

    /// Records successfully read so far
    pub fn read_count(&self) -> u64 {
        self.read_count
    }

    pub fn error_count(&self) -> u64 {
        self.error_count
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    pub fn position(&self) -> u64 {
        self.source.position()
    }
}
