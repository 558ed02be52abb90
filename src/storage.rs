//! In-process `StorageAdapter` implementation: an ordered byte-map backed
//! by `BTreeMap`, used by the `run`/`demo` CLI commands. A real embedded
//! backend can implement the same trait without touching `contrast-core`.

use contrast_core::StorageAdapter;
use std::collections::BTreeMap;

#[derive(Debug, Default)]
pub struct MemoryStorage {
    map: BTreeMap<Vec<u8>, Vec<u8>>,
    open: bool,
}

impl MemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self { map: BTreeMap::new(), open: true }
    }
}

impl StorageAdapter for MemoryStorage {
    fn put(&mut self, key: &[u8], value: &[u8]) {
        self.map.insert(key.to_vec(), value.to_vec());
    }

    fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.map.get(key).cloned()
    }

    fn keys(&self) -> Vec<Vec<u8>> {
        self.map.keys().cloned().collect()
    }

    fn close(&mut self) {
        self.open = false;
    }

    fn open(&mut self) {
        self.open = true;
    }
}
