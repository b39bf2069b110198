//! Replay Verifier: recompute a stored snapshot from its recorded references.
//!
//! Datasets are re-fetched by content hash and factors by identity, so a
//! value that changed after the fact surfaces as a hash mismatch. Mismatches
//! are reported with both hashes; they are never corrected.

use std::collections::BTreeMap;

use mrv_core::breakdown::Totals;
use mrv_core::{
    ActivityData, ActivitySnapshotRef, Dataset, DatasetKind, FactorKey, FactorRef, InputBundle,
    SubjectKey,
};
use mrv_storage::SnapshotStore;
use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::error::ReplayError;
use crate::orchestrator::{CalculationRequest, Orchestrator};

// ──────────────────────────────────────────────
// Datasets
// ──────────────────────────────────────────────

/// Looks datasets up by their recorded content hash.
pub trait DatasetResolver {
    /// The dataset of `kind` whose content hash is `sha256`, if known.
    fn fetch(&self, kind: DatasetKind, sha256: &str) -> Result<Option<Dataset>, ReplayError>;

    /// Reassemble the activity data a snapshot was computed from.
    fn activity(&self, refs: &ActivitySnapshotRef) -> Result<ActivityData, ReplayError> {
        let mut datasets = Vec::with_capacity(refs.len());
        let mut sources = BTreeMap::new();
        for (kind, dataset_ref) in refs {
            let dataset = self
                .fetch(*kind, &dataset_ref.sha256)?
                .filter(|d| d.kind() == *kind)
                .ok_or_else(|| ReplayError::DatasetUnavailable {
                    kind: *kind,
                    sha256: dataset_ref.sha256.clone(),
                })?;
            if let Some(uri) = &dataset_ref.uri {
                sources.insert(*kind, uri.clone());
            }
            datasets.push(dataset);
        }
        Ok(ActivityData::from_datasets(datasets, sources))
    }
}

/// In-memory datasets keyed by content hash.
#[derive(Debug, Clone, Default)]
pub struct ContentAddressedDatasets {
    by_hash: BTreeMap<String, Dataset>,
}

impl ContentAddressedDatasets {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a dataset in canonical row order under its content hash and
    /// return the hash.
    pub fn insert(&mut self, dataset: Dataset) -> Result<String, ReplayError> {
        let dataset = dataset.canonical_form()?;
        let sha256 = dataset.content_hash()?;
        self.by_hash.insert(sha256.clone(), dataset);
        Ok(sha256)
    }

    /// Store every non-empty dataset of `activity`.
    pub fn insert_all(&mut self, activity: &ActivityData) -> Result<(), ReplayError> {
        for dataset in activity.datasets() {
            self.insert(dataset)?;
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.by_hash.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_hash.is_empty()
    }
}

impl DatasetResolver for ContentAddressedDatasets {
    fn fetch(&self, kind: DatasetKind, sha256: &str) -> Result<Option<Dataset>, ReplayError> {
        Ok(self
            .by_hash
            .get(sha256)
            .filter(|d| d.kind() == kind)
            .cloned())
    }
}

// ──────────────────────────────────────────────
// Factors
// ──────────────────────────────────────────────

/// Current factor values by identity.
pub trait FactorCatalog {
    fn get(&self, key: &FactorKey) -> Option<FactorRef>;
}

/// A catalog over a fixed list of factors.
#[derive(Debug, Clone, Default)]
pub struct StaticFactorCatalog {
    factors: Vec<FactorRef>,
}

impl StaticFactorCatalog {
    pub fn new(factors: Vec<FactorRef>) -> Self {
        StaticFactorCatalog { factors }
    }

    pub fn factors(&self) -> &[FactorRef] {
        &self.factors
    }
}

impl FactorCatalog for StaticFactorCatalog {
    fn get(&self, key: &FactorKey) -> Option<FactorRef> {
        self.factors.iter().find(|f| f.matches(key)).cloned()
    }
}

// ──────────────────────────────────────────────
// Replay
// ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Pass,
    Fail,
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Verdict::Pass => write!(f, "PASS"),
            Verdict::Fail => write!(f, "FAIL"),
        }
    }
}

/// Outcome of one replay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayReport {
    pub snapshot_id: u64,
    pub subject: SubjectKey,
    pub input_hash_expected: String,
    pub input_hash_recomputed: String,
    pub input_hash_match: bool,
    pub result_hash_expected: String,
    pub result_hash_recomputed: String,
    pub result_hash_match: bool,
    pub verdict: Verdict,
    /// Totals of the recomputed result.
    pub preview: Totals,
}

/// Recompute snapshot `id` and compare its hashes with the stored ones.
///
/// Returns `Err` only when no recomputation is possible; a hash mismatch
/// is a `Fail` verdict.
pub fn replay(
    store: &dyn SnapshotStore,
    id: u64,
    datasets: &dyn DatasetResolver,
    catalog: &dyn FactorCatalog,
    orchestrator: &Orchestrator,
) -> Result<ReplayReport, ReplayError> {
    let snapshot = store.get(id)?;
    let request = rebuild_request(snapshot.input(), datasets, catalog)?;
    let recomputed = orchestrator.run(&request)?;

    let input_hash_recomputed = recomputed.input.reproducibility_key()?;
    let result_hash_recomputed = recomputed.result.result_hash.clone();
    let input_hash_match = input_hash_recomputed == snapshot.input_hash();
    let result_hash_match = result_hash_recomputed == snapshot.result_hash();
    let verdict = if input_hash_match && result_hash_match {
        Verdict::Pass
    } else {
        Verdict::Fail
    };

    match verdict {
        Verdict::Pass => tracing::info!(snapshot = id, "replay verdict PASS"),
        Verdict::Fail => tracing::warn!(
            snapshot = id,
            input_expected = %snapshot.input_hash(),
            input_recomputed = %input_hash_recomputed,
            result_expected = %snapshot.result_hash(),
            result_recomputed = %result_hash_recomputed,
            "replay verdict FAIL"
        ),
    }

    Ok(ReplayReport {
        snapshot_id: id,
        subject: snapshot.subject().clone(),
        input_hash_expected: snapshot.input_hash().to_string(),
        input_hash_recomputed,
        input_hash_match,
        result_hash_expected: snapshot.result_hash().to_string(),
        result_hash_recomputed,
        result_hash_match,
        verdict,
        preview: recomputed.result.content.totals,
    })
}

/// The request a recorded InputBundle describes, with datasets and factor
/// values fetched fresh.
fn rebuild_request(
    input: &InputBundle,
    datasets: &dyn DatasetResolver,
    catalog: &dyn FactorCatalog,
) -> Result<CalculationRequest, ReplayError> {
    let activity = datasets.activity(&input.activity_snapshot_ref)?;
    let factors = input
        .factors
        .iter()
        .map(|recorded| {
            let key = recorded.key();
            catalog.get(&key).ok_or_else(|| ReplayError::FactorUnavailable {
                key: key.to_string(),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    let config: EngineConfig = serde_json::from_value(input.config.clone())
        .map_err(|e| ReplayError::Config(e.to_string()))?;

    Ok(CalculationRequest {
        project_id: input.project_id.clone(),
        period: input.period.clone(),
        facility: input.facility.clone(),
        product_mappings: input.product_mappings.clone(),
        activity,
        factors,
        prices: input.prices.clone(),
        config,
        scenario: input.scenario.clone(),
        monitoring_plan: input.monitoring_plan.clone(),
        methodology: input.methodology.clone(),
    })
}
