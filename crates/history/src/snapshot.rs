//! Generic tick-indexed snapshot store.
//!
//! Records are opaque byte payloads written field by field through a
//! [`SnapshotWriter`] and read back in the same order through a
//! [`SnapshotReader`]. The format is not self-describing: the reader must
//! mirror the writer's field order exactly. Version the layout by convention
//! (for example, write a `u16` layout version as the first field).

use std::collections::VecDeque;

use bytemuck::Pod;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tempora_common::Tick;

/// Errors from reading or encoding snapshot payloads.
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("read past end of snapshot at tick {tick}: needed {needed} bytes, {remaining} left")]
    Overrun {
        tick: Tick,
        needed: usize,
        remaining: usize,
    },
    #[error("no snapshot recorded at tick {0}")]
    Missing(Tick),
    #[error("slice of {len} elements does not fit a u32 length prefix")]
    SliceTooLong { len: usize },
    #[error("snapshot at tick {tick} has {remaining} unread bytes")]
    TrailingBytes { tick: Tick, remaining: usize },
    #[error("CBOR serialization error: {0}")]
    CborEncode(String),
    #[error("CBOR deserialization error: {0}")]
    CborDecode(String),
}

#[derive(Debug, Clone)]
struct SnapshotRecord {
    tick: Tick,
    bytes: Vec<u8>,
}

/// Capacity-bounded ring of `(tick, bytes)` records ordered by tick.
///
/// Inserting past capacity evicts the oldest record. Inserting at a tick at or
/// before the newest record discards the records it supersedes, so ticks stay
/// strictly increasing.
#[derive(Debug, Clone)]
pub struct TickSnapshotStore {
    records: VecDeque<SnapshotRecord>,
    capacity: usize,
}

impl TickSnapshotStore {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            records: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn oldest_tick(&self) -> Option<Tick> {
        self.records.front().map(|r| r.tick)
    }

    pub fn newest_tick(&self) -> Option<Tick> {
        self.records.back().map(|r| r.tick)
    }

    /// Start a record at `tick`. Nothing is stored until
    /// [`SnapshotWriter::end_record`]; dropping the writer discards it.
    pub fn begin_record(&mut self, tick: Tick) -> SnapshotWriter<'_> {
        SnapshotWriter {
            store: self,
            tick,
            buf: Vec::new(),
        }
    }

    fn insert(&mut self, tick: Tick, bytes: Vec<u8>) {
        self.truncate_from(tick);
        self.records.push_back(SnapshotRecord { tick, bytes });
        while self.records.len() > self.capacity {
            if let Some(evicted) = self.records.pop_front() {
                tracing::trace!(tick = evicted.tick, "evicted oldest snapshot");
            }
        }
    }

    /// Reader for the record stored exactly at `tick`.
    pub fn try_get(&self, tick: Tick) -> Option<SnapshotReader<'_>> {
        let idx = self.records.binary_search_by_key(&tick, |r| r.tick).ok()?;
        Some(SnapshotReader::new(&self.records[idx]))
    }

    /// Like [`Self::try_get`], for callers that require the record.
    pub fn get(&self, tick: Tick) -> Result<SnapshotReader<'_>, SnapshotError> {
        self.try_get(tick).ok_or(SnapshotError::Missing(tick))
    }

    /// Reader for the newest record at or before `tick`.
    pub fn latest_at_or_before(&self, tick: Tick) -> Option<SnapshotReader<'_>> {
        let idx = self.records.partition_point(|r| r.tick <= tick);
        idx.checked_sub(1)
            .map(|i| SnapshotReader::new(&self.records[i]))
    }

    /// Like [`Self::latest_at_or_before`], falling back to the oldest record
    /// when every record is newer than `tick`.
    pub fn nearest_or_earliest(&self, tick: Tick) -> Option<SnapshotReader<'_>> {
        self.latest_at_or_before(tick)
            .or_else(|| self.records.front().map(SnapshotReader::new))
    }

    /// Drop records older than `tick`. Returns how many were dropped.
    pub fn prune_older_than(&mut self, tick: Tick) -> usize {
        let n = self.records.partition_point(|r| r.tick < tick);
        self.records.drain(..n);
        n
    }

    /// Drop records newer than `tick`. Returns how many were dropped.
    pub fn truncate_after(&mut self, tick: Tick) -> usize {
        match tick.checked_add(1) {
            Some(next) => self.truncate_from(next),
            None => 0,
        }
    }

    fn truncate_from(&mut self, tick: Tick) -> usize {
        let keep = self.records.partition_point(|r| r.tick < tick);
        let dropped = self.records.len() - keep;
        self.records.truncate(keep);
        dropped
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }
}

/// Sequential writer for one record.
pub struct SnapshotWriter<'a> {
    store: &'a mut TickSnapshotStore,
    tick: Tick,
    buf: Vec<u8>,
}

impl SnapshotWriter<'_> {
    pub fn tick(&self) -> Tick {
        self.tick
    }

    /// Append a plain-old-data value.
    pub fn write<T: Pod>(&mut self, value: T) -> &mut Self {
        self.buf.extend_from_slice(bytemuck::bytes_of(&value));
        self
    }

    /// Append a length-prefixed slice of plain-old-data values. Nothing is
    /// written if the length does not fit the `u32` prefix.
    pub fn write_slice<T: Pod>(&mut self, values: &[T]) -> Result<&mut Self, SnapshotError> {
        let len = u32::try_from(values.len())
            .map_err(|_| SnapshotError::SliceTooLong { len: values.len() })?;
        self.write(len);
        self.buf.extend_from_slice(bytemuck::cast_slice(values));
        Ok(self)
    }

    /// Append a serde value encoded as CBOR.
    pub fn write_serde<T: Serialize>(&mut self, value: &T) -> Result<&mut Self, SnapshotError> {
        ciborium::into_writer(value, &mut self.buf)
            .map_err(|e| SnapshotError::CborEncode(e.to_string()))?;
        Ok(self)
    }

    /// Bytes written so far.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Commit the record to the store.
    pub fn end_record(self) {
        let SnapshotWriter { store, tick, buf } = self;
        store.insert(tick, buf);
    }
}

/// Sequential reader over one record.
#[derive(Debug, Clone)]
pub struct SnapshotReader<'a> {
    tick: Tick,
    bytes: &'a [u8],
    cursor: usize,
}

impl<'a> SnapshotReader<'a> {
    fn new(record: &'a SnapshotRecord) -> Self {
        Self {
            tick: record.tick,
            bytes: &record.bytes,
            cursor: 0,
        }
    }

    /// Tick the record was written at.
    pub fn tick(&self) -> Tick {
        self.tick
    }

    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.cursor
    }

    fn take(&mut self, needed: usize) -> Result<&'a [u8], SnapshotError> {
        if needed > self.remaining() {
            return Err(SnapshotError::Overrun {
                tick: self.tick,
                needed,
                remaining: self.remaining(),
            });
        }
        let bytes = self.bytes;
        let slice = &bytes[self.cursor..self.cursor + needed];
        self.cursor += needed;
        Ok(slice)
    }

    /// Read the next plain-old-data value.
    pub fn read<T: Pod>(&mut self) -> Result<T, SnapshotError> {
        let bytes = self.take(std::mem::size_of::<T>())?;
        Ok(bytemuck::pod_read_unaligned(bytes))
    }

    /// Read a slice written by [`SnapshotWriter::write_slice`].
    pub fn read_vec<T: Pod>(&mut self) -> Result<Vec<T>, SnapshotError> {
        let len = self.read::<u32>()? as usize;
        let size = std::mem::size_of::<T>();
        let bytes = self.take(len.saturating_mul(size))?;
        Ok(bytes.chunks_exact(size.max(1)).map(bytemuck::pod_read_unaligned).collect())
    }

    /// Read the next CBOR-encoded serde value.
    pub fn read_serde<T: DeserializeOwned>(&mut self) -> Result<T, SnapshotError> {
        let mut rest = &self.bytes[self.cursor..];
        let before = rest.len();
        let value = ciborium::from_reader(&mut rest)
            .map_err(|e| SnapshotError::CborDecode(e.to_string()))?;
        self.cursor += before - rest.len();
        Ok(value)
    }

    /// Assert the whole record was consumed.
    pub fn finish(self) -> Result<(), SnapshotError> {
        match self.remaining() {
            0 => Ok(()),
            remaining => Err(SnapshotError::TrailingBytes {
                tick: self.tick,
                remaining,
            }),
        }
    }
}
