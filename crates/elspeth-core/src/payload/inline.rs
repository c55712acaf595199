use super::PayloadStore;
use crate::canon::stable_hash_bytes;
use crate::errors::EngineError;
use std::collections::HashMap;
use std::sync::Mutex;

/// Reference payload store that keeps every blob in memory, addressed by its
/// own content hash. Used where the orchestrator decides a payload exceeds
/// the inline threshold but no durable blob store is configured.
#[derive(Default)]
pub struct InlinePayloadStore {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
}

impl InlinePayloadStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PayloadStore for InlinePayloadStore {
    fn put(&self, bytes: &[u8]) -> Result<String, EngineError> {
        let reference = stable_hash_bytes(bytes);
        self.blobs.lock().unwrap().insert(reference.clone(), bytes.to_vec());
        Ok(reference)
    }

    fn get(&self, reference: &str) -> Result<Vec<u8>, EngineError> {
        self.blobs
            .lock()
            .unwrap()
            .get(reference)
            .cloned()
            .ok_or_else(|| EngineError::Validation(format!("no payload for reference {reference}")))
    }

    fn purge(&self, reference: &str) -> Result<(), EngineError> {
        self.blobs.lock().unwrap().remove(reference);
        Ok(())
    }
}
