//! Generator Driver (spec.md §4.7): adapts a lazy, possibly-looping finite
//! sequence of `(index, vector)` pairs — typically rows read from a stored
//! dataset — into the same per-tick sample source a Stream Worker expects
//! from the live Sample Generator.

use crate::error::{EngineError, Result};

/// A finite, possibly chunked source of sample rows. Implementations read
/// ahead in batches of `read_chunk_size` rows (`0` loads everything up
/// front) so a large dataset doesn't have to be read sample-by-sample.
pub trait RowSource: Send {
    fn channel_count(&self) -> usize;
    /// Pull up to `read_chunk_size` rows (or all remaining if `0`),
    /// returning an empty vec once the source is exhausted.
    fn next_chunk(&mut self, read_chunk_size: usize) -> Result<Vec<Vec<f64>>>;
    /// Rewind to the start, used when `loop=true`.
    fn rewind(&mut self);
}

/// In-memory row source: stands in for the HDF5/pdxdf-backed reader the
/// original playback tool used, with the same chunked-read contract.
pub struct InMemoryRowSource {
    rows: Vec<Vec<f64>>,
    cursor: usize,
}

impl InMemoryRowSource {
    pub fn new(rows: Vec<Vec<f64>>) -> Self {
        Self { rows, cursor: 0 }
    }
}

impl RowSource for InMemoryRowSource {
    fn channel_count(&self) -> usize {
        self.rows.first().map(|row| row.len()).unwrap_or(0)
    }

    fn next_chunk(&mut self, read_chunk_size: usize) -> Result<Vec<Vec<f64>>> {
        if self.cursor >= self.rows.len() {
            return Ok(Vec::new());
        }
        let take = if read_chunk_size == 0 { self.rows.len() - self.cursor } else { read_chunk_size };
        let end = (self.cursor + take).min(self.rows.len());
        let chunk = self.rows[self.cursor..end].to_vec();
        self.cursor = end;
        Ok(chunk)
    }

    fn rewind(&mut self) {
        self.cursor = 0;
    }
}

/// Drives a `RowSource` as a cooperative producer: the worker pulls one
/// row at a time via `next_row`, paced entirely by its own Clock & Pacer,
/// decoupled from how many rows the driver reads ahead at once.
pub struct GeneratorDriver {
    source: Box<dyn RowSource>,
    read_chunk_size: usize,
    loop_playback: bool,
    buffer: std::collections::VecDeque<Vec<f64>>,
    exhausted: bool,
}

impl GeneratorDriver {
    pub fn new(source: Box<dyn RowSource>, read_chunk_size: usize, loop_playback: bool) -> Self {
        Self { source, read_chunk_size, loop_playback, buffer: std::collections::VecDeque::new(), exhausted: false }
    }

    pub fn channel_count(&self) -> usize {
        self.source.channel_count()
    }

    /// Returns the next row, refilling from the source as needed. `Ok(None)`
    /// means the source is exhausted and `loop_playback` is false.
    pub fn next_row(&mut self) -> Result<Option<Vec<f64>>> {
        if let Some(row) = self.buffer.pop_front() {
            return Ok(Some(row));
        }

        if self.exhausted {
            if !self.loop_playback {
                return Ok(None);
            }
            self.source.rewind();
            self.exhausted = false;
        }

        let chunk = self.source.next_chunk(self.read_chunk_size)?;
        if chunk.is_empty() {
            self.exhausted = true;
            if self.loop_playback {
                self.source.rewind();
                let chunk = self.source.next_chunk(self.read_chunk_size)?;
                if chunk.is_empty() {
                    return Err(EngineError::InvalidSampleData("playback source is empty".into()));
                }
                self.buffer.extend(chunk);
            } else {
                return Ok(None);
            }
        } else {
            self.buffer.extend(chunk);
        }

        Ok(self.buffer.pop_front())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows() -> Vec<Vec<f64>> {
        vec![vec![0.0, 1.0], vec![2.0, 3.0], vec![4.0, 5.0]]
    }

    #[test]
    fn yields_rows_in_order_then_exhausts() {
        let mut driver = GeneratorDriver::new(Box::new(InMemoryRowSource::new(rows())), 1, false);
        assert_eq!(driver.next_row().unwrap(), Some(vec![0.0, 1.0]));
        assert_eq!(driver.next_row().unwrap(), Some(vec![2.0, 3.0]));
        assert_eq!(driver.next_row().unwrap(), Some(vec![4.0, 5.0]));
        assert_eq!(driver.next_row().unwrap(), None);
    }

    #[test]
    fn loops_back_to_the_start_on_exhaustion() {
        let mut driver = GeneratorDriver::new(Box::new(InMemoryRowSource::new(rows())), 0, true);
        for _ in 0..3 {
            driver.next_row().unwrap();
        }
        assert_eq!(driver.next_row().unwrap(), Some(vec![0.0, 1.0]));
    }

    #[test]
    fn read_chunk_size_zero_loads_everything_at_once() {
        let mut source = InMemoryRowSource::new(rows());
        let chunk = source.next_chunk(0).unwrap();
        assert_eq!(chunk.len(), 3);
    }
}
