//! Item processors
//!
//! A processor turns one record into another, or filters it out by
//! returning `Ok(None)`. Processors never mutate their input in place.

pub mod correlate;
pub mod normalize;

pub use correlate::{CorrelateProcessor, UnmatchedPolicy};
pub use normalize::NormalizeProcessor;

use crate::error::Result;

pub trait ItemProcessor<I>: Send + Sync {
    type Output: Send;

    fn process(&self, item: I) -> Result<Option<Self::Output>>;
}
