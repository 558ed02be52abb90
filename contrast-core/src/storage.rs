//! Storage adapter trait (C12): an opaque ordered byte-map the core
//! consumes for persistence. The core defines the contract only; a
//! concrete backend (in-memory for the node binary, or an embedded KV
//! store) implements it.

/// Persisted key conventions the core relies on:
/// - `height-<u32>` → block hash bytes
/// - `<hash>` → serialized `BlockData`
/// - `info-<hash>` → serialized header-only projection
/// - `currentHeight` → ASCII decimal integer
pub trait StorageAdapter: Send {
    fn put(&mut self, key: &[u8], value: &[u8]);
    fn get(&self, key: &[u8]) -> Option<Vec<u8>>;
    fn keys(&self) -> Vec<Vec<u8>>;
    fn close(&mut self);
    fn open(&mut self);
}

#[must_use]
pub fn height_key(height: u64) -> Vec<u8> {
    format!("height-{height}").into_bytes()
}

#[must_use]
pub fn info_key(hash: &str) -> Vec<u8> {
    format!("info-{hash}").into_bytes()
}

pub const CURRENT_HEIGHT_KEY: &[u8] = b"currentHeight";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn height_key_formatting() {
        assert_eq!(height_key(42), b"height-42".to_vec());
    }
}
