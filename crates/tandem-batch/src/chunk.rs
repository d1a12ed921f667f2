//! Chunk accumulation between the processor and the writer

use std::mem;
use tracing::debug;

use crate::error::Result;
use crate::writer::ItemWriter;

/// Buffers processed records and hands them to the writer `size` at a time
///
/// Order is preserved within and across chunks. The last chunk of a step
/// may be smaller; [`ChunkAccumulator::flush`] on an empty buffer is a no-op.
pub struct ChunkAccumulator<'w, T, W> {
    writer: &'w mut W,
    size: usize,
    buffer: Vec<T>,
    flushes: u64,
    written: u64,
}

impl<'w, T, W> ChunkAccumulator<'w, T, W>
where
    T: Send,
    W: ItemWriter<T>,
{
    /// `size` must be positive; the step validates it before building one
    pub fn new(writer: &'w mut W, size: usize) -> Self {
        let size = size.max(1);
        Self {
            writer,
            size,
            buffer: Vec::with_capacity(size),
            flushes: 0,
            written: 0,
        }
    }

    /// Buffer `item`, writing the chunk once it is full
    pub async fn add(&mut self, item: T) -> Result<()> {
        self.buffer.push(item);
        if self.buffer.len() >= self.size {
            self.flush().await?;
        }
        Ok(())
    }

    /// Write whatever is buffered
    pub async fn flush(&mut self) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }

        let chunk = mem::replace(&mut self.buffer, Vec::with_capacity(self.size));
        let size = chunk.len();
        self.writer.write(chunk).await?;

        self.flushes += 1;
        self.written += size as u64;
        debug!(chunk = self.flushes, items = size, "Flushed chunk");
        Ok(())
    }

    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Chunks handed to the writer successfully
    pub fn flushes(&self) -> u64 {
        self.flushes
    }

    pub fn written(&self) -> u64 {
        self.written
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    #[derive(Default)]
    struct RecordingWriter {
        chunks: Vec<Vec<u32>>,
    }

    #[async_trait]
    impl ItemWriter<u32> for RecordingWriter {
        async fn write(&mut self, chunk: Vec<u32>) -> Result<()> {
            self.chunks.push(chunk);
            Ok(())
        }
    }

    async fn accumulate(items: u32, size: usize) -> (RecordingWriter, u64, u64) {
        let mut writer = RecordingWriter::default();
        let (flushes, written) = {
            let mut acc = ChunkAccumulator::new(&mut writer, size);
            for i in 0..items {
                acc.add(i).await.unwrap();
            }
            acc.flush().await.unwrap();
            (acc.flushes(), acc.written())
        };
        (writer, flushes, written)
    }

    #[tokio::test]
    async fn test_writes_ceil_m_over_n_chunks() {
        for (items, size, expected) in [(0, 3, 0), (1, 3, 1), (3, 3, 1), (7, 3, 3), (10, 10, 1), (11, 10, 2)] {
            let (writer, flushes, written) = accumulate(items, size).await;
            assert_eq!(writer.chunks.len(), expected, "items={items} size={size}");
            assert_eq!(flushes, expected as u64);
            assert_eq!(written, items as u64);
        }
    }

    #[tokio::test]
    async fn test_last_chunk_holds_remainder_and_order_is_kept() {
        let (writer, _, _) = accumulate(7, 3).await;

        assert_eq!(writer.chunks, vec![vec![0, 1, 2], vec![3, 4, 5], vec![6]]);
    }

    #[tokio::test]
    async fn test_empty_flush_is_noop() {
        let mut writer = RecordingWriter::default();
        let mut acc = ChunkAccumulator::new(&mut writer, 5);
        acc.flush().await.unwrap();
        acc.flush().await.unwrap();

        assert_eq!(acc.flushes(), 0);
        assert_eq!(acc.pending(), 0);
        assert!(writer.chunks.is_empty());
    }
}
