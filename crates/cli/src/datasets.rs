//! Content-addressed dataset directory: `<sha256>.json` per dataset.

use std::path::PathBuf;

use mrv_core::{canonicalize, ActivityData, Dataset, DatasetKind};
use mrv_eval::{DatasetResolver, ReplayError};

pub(crate) struct DirectoryDatasets {
    dir: PathBuf,
}

impl DirectoryDatasets {
    pub(crate) fn new(dir: PathBuf) -> Self {
        DirectoryDatasets { dir }
    }

    fn path_of(&self, sha256: &str) -> PathBuf {
        self.dir.join(format!("{}.json", sha256))
    }

    /// Write every non-empty dataset of `activity` in canonical row order and
    /// return their hashes. Equal hashes mean equal bytes, so a file that
    /// already exists is left alone.
    pub(crate) fn write_all(&self, activity: &ActivityData) -> Result<Vec<String>, String> {
        std::fs::create_dir_all(&self.dir)
            .map_err(|e| format!("cannot create '{}': {}", self.dir.display(), e))?;
        let mut written = Vec::new();
        for dataset in activity.datasets() {
            let dataset = dataset.canonical_form().map_err(|e| e.to_string())?;
            let sha256 = dataset.content_hash().map_err(|e| e.to_string())?;
            let path = self.path_of(&sha256);
            if !path.exists() {
                let bytes = canonicalize(&dataset).map_err(|e| e.to_string())?;
                std::fs::write(&path, bytes)
                    .map_err(|e| format!("cannot write '{}': {}", path.display(), e))?;
            }
            written.push(sha256);
        }
        Ok(written)
    }
}

impl DatasetResolver for DirectoryDatasets {
    fn fetch(&self, kind: DatasetKind, sha256: &str) -> Result<Option<Dataset>, ReplayError> {
        // Hashes are hex; anything else cannot name a file here.
        if sha256.is_empty() || !sha256.chars().all(|c| c.is_ascii_hexdigit()) {
            return Ok(None);
        }
        let path = self.path_of(sha256);
        if !path.exists() {
            return Ok(None);
        }
        let bytes = std::fs::read(&path)
            .map_err(|e| ReplayError::DatasetStore(format!("{}: {}", path.display(), e)))?;
        let dataset: Dataset = serde_json::from_slice(&bytes)
            .map_err(|e| ReplayError::DatasetStore(format!("{}: {}", path.display(), e)))?;
        Ok((dataset.kind() == kind).then_some(dataset))
    }
}
