//! Greedy size-bounded packing of records into batches.
//!
//! Records are taken in order and appended to the current batch until the
//! next one would push the running size past `max_bytes`; the batch is then
//! closed and a new one started. A record is never split, so a record that is
//! larger than `max_bytes` on its own ends up alone in its batch.

use tracing::debug;

use crate::error::AppError;
use crate::Record;

/// Bytes a batch file spends outside its records: the closing `\n]`.
///
/// The opening `[` is counted with the first record, see [`record_size`].
pub const BATCH_FRAMING_BYTES: u64 = 2;

/// An ordered, non-empty run of records bound for one output file.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    /// Records in input order.
    pub records: Vec<Record>,
    /// Framing bytes plus the sum of the measured sizes of `records`.
    pub bytes: u64,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Bytes a record occupies as one element of a pretty-printed batch file.
///
/// That is the record's own pretty encoding shifted one indent level to the
/// right (two spaces before its first line and after each of its line
/// breaks), plus the two bytes in front of it: `[\n` for the first element,
/// `,\n` for every later one. A batch file is therefore exactly
/// [`BATCH_FRAMING_BYTES`] plus the sizes of its records.
///
/// Non-ASCII characters are written unescaped, so strings count their UTF-8
/// length.
///
/// # Errors
///
/// Returns `AppError::Serialization` if the record cannot be encoded.
pub fn record_size(record: &Record) -> Result<u64, AppError> {
    let encoded = serde_json::to_vec_pretty(record)?;
    // Line breaks inside strings are escaped, so every raw one is a layout break.
    let line_breaks = encoded.iter().filter(|&&b| b == b'\n').count();
    Ok((2 + 2 + encoded.len() + 2 * line_breaks) as u64)
}

/// Checks if adding a record would exceed the byte budget.
fn would_exceed_limit(
    current_bytes: u64,
    current_records: usize,
    record_size: u64,
    max_bytes: u64,
) -> bool {
    // The first record of a batch is always accepted, however large.
    if current_records == 0 {
        return false;
    }

    // Strictly greater: landing exactly on the budget still fits.
    current_bytes + record_size > max_bytes
}

/// Incremental packer holding at most one open batch.
///
/// Feed records with [`push`](Self::push); a closed batch is handed back as
/// soon as it is complete so the caller can persist it before continuing.
pub struct BatchPacker<F> {
    max_bytes: u64,
    framing_bytes: u64,
    size_fn: F,
    current: Vec<Record>,
    current_bytes: u64,
}

impl<F> BatchPacker<F>
where
    F: FnMut(&Record) -> Result<u64, AppError>,
{
    pub fn new(max_bytes: u64, size_fn: F) -> Self {
        Self {
            max_bytes,
            framing_bytes: 0,
            size_fn,
            current: Vec::new(),
            current_bytes: 0,
        }
    }

    /// Counts `framing_bytes` against every batch on top of its records.
    pub fn with_framing(mut self, framing_bytes: u64) -> Self {
        self.framing_bytes = framing_bytes;
        self.current_bytes = framing_bytes;
        self
    }

    /// Adds a record, returning the previous batch if this record closed it.
    ///
    /// # Errors
    ///
    /// Propagates a failure of the size function. The record is not added.
    pub fn push(&mut self, record: Record) -> Result<Option<Batch>, AppError> {
        let size = (self.size_fn)(&record)?;

        let closed = if would_exceed_limit(
            self.current_bytes,
            self.current.len(),
            size,
            self.max_bytes,
        ) {
            Some(self.take_current())
        } else {
            None
        };

        self.current.push(record);
        self.current_bytes += size;

        Ok(closed)
    }

    /// Closes the open batch, if it holds anything.
    pub fn finish(mut self) -> Option<Batch> {
        if self.current.is_empty() {
            None
        } else {
            Some(self.take_current())
        }
    }

    fn take_current(&mut self) -> Batch {
        let batch = Batch {
            records: std::mem::take(&mut self.current),
            bytes: self.current_bytes,
        };
        self.current_bytes = self.framing_bytes;

        debug!(
            records = batch.records.len(),
            bytes = batch.bytes,
            max_bytes = self.max_bytes,
            "Closed batch"
        );

        batch
    }
}

/// Partitions records into batches bounded by `max_bytes`.
///
/// Flattening the returned batches reproduces `records` exactly.
///
/// # Errors
///
/// A size function failure aborts packing entirely; no record is skipped.
pub fn pack<F>(records: Vec<Record>, max_bytes: u64, size_fn: F) -> Result<Vec<Batch>, AppError>
where
    F: FnMut(&Record) -> Result<u64, AppError>,
{
    let mut packer = BatchPacker::new(max_bytes, size_fn);
    let mut batches = Vec::new();

    for record in records {
        if let Some(batch) = packer.push(record)? {
            batches.push(batch);
        }
    }
    if let Some(batch) = packer.finish() {
        batches.push(batch);
    }

    Ok(batches)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn record(value: Value) -> Record {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {}", other),
        }
    }

    /// Size function reading a declared size from the record itself.
    fn declared_size(record: &Record) -> Result<u64, AppError> {
        record
            .get("size")
            .and_then(Value::as_u64)
            .ok_or_else(|| AppError::Serialization("no size".into()))
    }

    fn sized(id: u64, size: u64) -> Record {
        record(json!({ "id": id, "size": size }))
    }

    fn ids(batch: &Batch) -> Vec<u64> {
        batch.records.iter().map(|r| r["id"].as_u64().unwrap()).collect()
    }

    #[test]
    fn test_greedy_split_40_50_70() {
        let records = vec![sized(1, 40), sized(2, 50), sized(3, 70)];

        let batches = pack(records, 100, declared_size).unwrap();

        assert_eq!(batches.len(), 2);
        assert_eq!(ids(&batches[0]), vec![1, 2]);
        assert_eq!(batches[0].bytes, 90);
        assert_eq!(ids(&batches[1]), vec![3]);
        assert_eq!(batches[1].bytes, 70);
    }

    #[test]
    fn test_oversized_single_record() {
        let batches = pack(vec![sized(1, 300)], 100, declared_size).unwrap();

        assert_eq!(batches.len(), 1);
        assert_eq!(ids(&batches[0]), vec![1]);
        assert_eq!(batches[0].bytes, 300);
    }

    #[test]
    fn test_oversized_record_between_small_ones() {
        let records = vec![sized(1, 10), sized(2, 300), sized(3, 10)];

        let batches = pack(records, 100, declared_size).unwrap();

        let grouped: Vec<Vec<u64>> = batches.iter().map(ids).collect();
        assert_eq!(grouped, vec![vec![1], vec![2], vec![3]]);
    }

    #[test]
    fn test_exact_threshold_stays_in_batch() {
        let records = vec![sized(1, 60), sized(2, 40), sized(3, 1)];

        let batches = pack(records, 100, declared_size).unwrap();

        assert_eq!(ids(&batches[0]), vec![1, 2]);
        assert_eq!(batches[0].bytes, 100);
        assert_eq!(ids(&batches[1]), vec![3]);
    }

    #[test]
    fn test_empty_input_yields_no_batches() {
        let batches = pack(Vec::new(), 100, declared_size).unwrap();
        assert!(batches.is_empty());
    }

    #[test]
    fn test_size_failure_is_fatal() {
        let records = vec![sized(1, 10), record(json!({ "id": 2 })), sized(3, 10)];

        let result = pack(records, 100, declared_size);

        assert!(matches!(result, Err(AppError::Serialization(_))));
    }

    #[test]
    fn test_flatten_reproduces_input_and_respects_budget() {
        let records: Vec<Record> = (0..200)
            .map(|i| {
                record(json!({
                    "RecId": format!("{:032X}", i),
                    "Subject": "é".repeat(i % 17),
                    "Priority": i % 5,
                    "Closed": i % 2 == 0
                }))
            })
            .collect();
        let largest = records.iter().map(|r| record_size(r).unwrap()).max().unwrap();
        let max_bytes = largest * 3;

        let batches = pack(records.clone(), max_bytes, record_size).unwrap();

        assert!(batches.len() > 1);
        for batch in &batches {
            assert!(!batch.is_empty());
            assert!(batch.bytes <= max_bytes, "batch of {} bytes over budget", batch.bytes);
            let measured: u64 = batch.records.iter().map(|r| record_size(r).unwrap()).sum();
            assert_eq!(measured, batch.bytes);
            let encoded = serde_json::to_vec_pretty(&batch.records).unwrap();
            assert_eq!(encoded.len() as u64, measured + BATCH_FRAMING_BYTES);
        }
        let flattened: Vec<Record> = batches.into_iter().flat_map(|b| b.records).collect();
        assert_eq!(flattened, records);
    }

    #[test]
    fn test_packer_hands_back_closed_batch_immediately() {
        let mut packer = BatchPacker::new(100, declared_size);

        assert!(packer.push(sized(1, 60)).unwrap().is_none());
        let closed = packer.push(sized(2, 60)).unwrap().expect("first batch closed");
        assert_eq!(ids(&closed), vec![1]);

        let last = packer.finish().expect("open batch flushed");
        assert_eq!(ids(&last), vec![2]);
    }

    #[test]
    fn test_framing_counts_against_every_batch() {
        let mut packer = BatchPacker::new(100, declared_size).with_framing(10);

        assert!(packer.push(sized(1, 50)).unwrap().is_none());
        assert!(packer.push(sized(2, 40)).unwrap().is_none());
        let closed = packer.push(sized(3, 1)).unwrap().expect("budget reached");
        assert_eq!(ids(&closed), vec![1, 2]);
        assert_eq!(closed.bytes, 100);

        let last = packer.finish().unwrap();
        assert_eq!(last.bytes, 11);
    }

    #[test]
    fn test_record_size_matches_pretty_array_encoding() {
        let records = vec![
            record(json!({ "a": "b" })),
            record(json!({ "Nested": { "x": [1, 2] }, "Text": "line\nbreak" })),
            record(json!({})),
        ];

        let measured: u64 = records.iter().map(|r| record_size(r).unwrap()).sum();
        let encoded = serde_json::to_vec_pretty(&records).unwrap();

        assert_eq!(encoded.len() as u64, measured + BATCH_FRAMING_BYTES);
    }

    #[test]
    fn test_record_size_counts_utf8_bytes_unescaped() {
        // "[\n  {\n    \"a\": \"b\"\n  }" is 22 bytes.
        let ascii = record(json!({ "a": "b" }));
        assert_eq!(record_size(&ascii).unwrap(), 22);

        // "é" is two bytes in UTF-8 and is not written as \u00e9.
        let accented = record(json!({ "a": "é" }));
        assert_eq!(record_size(&accented).unwrap(), 23);
    }
}
