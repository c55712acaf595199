use super::PayloadStore;
use crate::canon::stable_hash_bytes;
use crate::errors::EngineError;
use std::fs;
use std::path::PathBuf;

/// Content-addressed filesystem blob store: one file per blob, named by its
/// SHA-256 hex digest, under a root directory.
pub struct FilesystemCasPayloadStore {
    root: PathBuf,
}

impl FilesystemCasPayloadStore {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, EngineError> {
        let root = root.into();
        fs::create_dir_all(&root)
            .map_err(|e| EngineError::Validation(format!("cannot create payload store root: {e}")))?;
        Ok(Self { root })
    }

    fn path_for(&self, reference: &str) -> PathBuf {
        self.root.join(reference)
    }
}

impl PayloadStore for FilesystemCasPayloadStore {
    fn put(&self, bytes: &[u8]) -> Result<String, EngineError> {
        let reference = stable_hash_bytes(bytes);
        let path = self.path_for(&reference);
        if !path.exists() {
            fs::write(&path, bytes).map_err(|e| EngineError::Validation(format!("payload write failed: {e}")))?;
        }
        Ok(reference)
    }

    fn get(&self, reference: &str) -> Result<Vec<u8>, EngineError> {
        fs::read(self.path_for(reference))
            .map_err(|e| EngineError::Validation(format!("payload read failed for {reference}: {e}")))
    }

    fn purge(&self, reference: &str) -> Result<(), EngineError> {
        let path = self.path_for(reference);
        if path.exists() {
            fs::remove_file(path).map_err(|e| EngineError::Validation(format!("payload purge failed: {e}")))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_is_content_addressed() {
        let dir = std::env::temp_dir().join(format!("elspeth-payload-test-{}", uuid::Uuid::new_v4()));
        let store = FilesystemCasPayloadStore::new(&dir).unwrap();
        let r1 = store.put(b"same content").unwrap();
        let r2 = store.put(b"same content").unwrap();
        assert_eq!(r1, r2);
        assert_eq!(store.get(&r1).unwrap(), b"same content");
        fs::remove_dir_all(&dir).ok();
    }
}
