use std::collections::HashMap;

pub const SELECTION_KEY: &str = "tz_select";
pub const RUNTIME_KEY: &str = "runtime";
/// Bytes reserved for the selection record, independent of catalog growth.
pub const SELECTION_RECORD_SIZE: usize = 64;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("storage backend failure: {0}")]
    Backend(String),
    #[error("record `{key}` is {len} bytes, limit is {limit}")]
    RecordTooLarge {
        key: String,
        len: usize,
        limit: usize,
    },
}

/// Persistent storage of small fixed-size records addressed by key.
pub trait KeyValueStore {
    /// Copies the record into `buf` and returns its length, or `None` when absent.
    fn read_record(&mut self, key: &str, buf: &mut [u8]) -> Result<Option<usize>, StoreError>;

    fn write_record(&mut self, key: &str, data: &[u8]) -> Result<(), StoreError>;
}

impl<S: KeyValueStore + ?Sized> KeyValueStore for &mut S {
    fn read_record(&mut self, key: &str, buf: &mut [u8]) -> Result<Option<usize>, StoreError> {
        (**self).read_record(key, buf)
    }

    fn write_record(&mut self, key: &str, data: &[u8]) -> Result<(), StoreError> {
        (**self).write_record(key, data)
    }
}

#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    records: HashMap<String, Vec<u8>>,
    writes: usize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_record(mut self, key: &str, data: &[u8]) -> Self {
        self.records.insert(key.to_string(), data.to_vec());
        self
    }

    pub fn record(&self, key: &str) -> Option<&[u8]> {
        self.records.get(key).map(Vec::as_slice)
    }

    pub fn writes(&self) -> usize {
        self.writes
    }
}

impl KeyValueStore for MemoryStore {
    fn read_record(&mut self, key: &str, buf: &mut [u8]) -> Result<Option<usize>, StoreError> {
        let Some(record) = self.records.get(key) else {
            return Ok(None);
        };
        if record.len() > buf.len() {
            return Err(StoreError::RecordTooLarge {
                key: key.to_string(),
                len: record.len(),
                limit: buf.len(),
            });
        }
        buf[..record.len()].copy_from_slice(record);
        Ok(Some(record.len()))
    }

    fn write_record(&mut self, key: &str, data: &[u8]) -> Result<(), StoreError> {
        self.records.insert(key.to_string(), data.to_vec());
        self.writes += 1;
        Ok(())
    }
}
