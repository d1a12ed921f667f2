//! Item writers: receive one processed chunk at a time
//!
//! A chunk arrives in processing order and is written as a unit. After the
//! last chunk of a successful step, [`ItemWriter::update`] lets the writer
//! publish state into the step's execution context.

pub mod batch;
pub mod memory;
pub mod statement;

pub use batch::{
    BatchSqlWriter, BatchSqlWriterBuilder, NamedParameterProvider, PositionalSetter,
    SerdeParameterProvider, SqlParameters,
};
pub use memory::InMemoryWriter;
pub use statement::{BindingMode, ParsedStatement};

use async_trait::async_trait;

use crate::context::ExecutionContext;
use crate::error::Result;

#[async_trait]
pub trait ItemWriter<T: Send>: Send {
    async fn write(&mut self, chunk: Vec<T>) -> Result<()>;

    /// Publish writer state once the step's final chunk has been written
    fn update(&self, _context: &mut ExecutionContext) -> Result<()> {
        Ok(())
    }
}
