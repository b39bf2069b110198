//! On-disk layout the CLI works against.
//!
//! ```text
//! mrv-ledger.json          snapshot ledger
//! mrv-data/datasets/*.json activity datasets, named by content hash
//! mrv-data/factors.json    factor catalog used by replay
//! ```

use std::path::{Path, PathBuf};

use mrv_core::{FactorKey, FactorRef};
use mrv_eval::StaticFactorCatalog;
use mrv_storage::FileSnapshotStore;

use crate::datasets::DirectoryDatasets;

pub(crate) struct Workspace {
    ledger: PathBuf,
    data_dir: PathBuf,
}

impl Workspace {
    pub(crate) fn new(ledger: PathBuf, data_dir: PathBuf) -> Self {
        Workspace { ledger, data_dir }
    }

    pub(crate) fn store(&self) -> Result<FileSnapshotStore, String> {
        FileSnapshotStore::open(&self.ledger).map_err(|e| e.to_string())
    }

    pub(crate) fn datasets(&self) -> DirectoryDatasets {
        DirectoryDatasets::new(self.data_dir.join("datasets"))
    }

    fn catalog_path(&self) -> PathBuf {
        self.data_dir.join("factors.json")
    }

    /// The recorded factor catalog, or `path` when one is given.
    pub(crate) fn catalog(&self, path: Option<&Path>) -> Result<StaticFactorCatalog, String> {
        let path = path.map(Path::to_path_buf).unwrap_or_else(|| self.catalog_path());
        Ok(StaticFactorCatalog::new(read_factors(&path)?))
    }

    /// Add factors whose identity the catalog does not know yet. Known
    /// identities keep their first recorded value.
    pub(crate) fn record_factors(&self, factors: &[FactorRef]) -> Result<usize, String> {
        let path = self.catalog_path();
        let mut catalog = if path.exists() {
            read_factors(&path)?
        } else {
            Vec::new()
        };
        let mut added = 0;
        for factor in factors {
            let key: FactorKey = factor.key();
            if !catalog.iter().any(|f| f.matches(&key)) {
                catalog.push(factor.clone());
                added += 1;
            }
        }
        if added > 0 {
            std::fs::create_dir_all(&self.data_dir)
                .map_err(|e| format!("cannot create '{}': {}", self.data_dir.display(), e))?;
            let json = serde_json::to_string_pretty(&catalog)
                .map_err(|e| format!("cannot serialize factor catalog: {}", e))?;
            std::fs::write(&path, json)
                .map_err(|e| format!("cannot write '{}': {}", path.display(), e))?;
        }
        Ok(added)
    }
}

fn read_factors(path: &Path) -> Result<Vec<FactorRef>, String> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| format!("cannot read factor catalog '{}': {}", path.display(), e))?;
    serde_json::from_str(&text)
        .map_err(|e| format!("invalid factor catalog '{}': {}", path.display(), e))
}

/// Read and parse a JSON file.
pub(crate) fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, String> {
    let text = std::fs::read_to_string(path)
        .map_err(|_| format!("file not found: {}", path.display()))?;
    serde_json::from_str(&text).map_err(|e| format!("invalid JSON in {}: {}", path.display(), e))
}
