//! Size-bounded batching of cleaned records into JSON files.
//!
//! This module provides greedy, order-preserving packing of records into
//! batches bounded by serialized size, and atomic file writing of each batch
//! with automatic cleanup on failure.

mod packer;
mod writer;

pub use packer::{pack, record_size, Batch, BatchPacker, BATCH_FRAMING_BYTES};
pub use writer::{batch_file_name, write_batches, AtomicJsonWriter, WriteSummary};

#[cfg(test)]
pub(crate) use writer::read_batch_file;

/// Default byte budget per batch file (2 MiB).
pub const DEFAULT_MAX_BATCH_BYTES: u64 = 2 * 1024 * 1024;
