//! Activity data rows and dataset content references.
//!
//! Rows arrive already validated for required columns and numeric types.
//! The engine only reads them; it never mutates caller-owned data.

use std::collections::BTreeMap;
use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::canonical::{hash_unordered, sorted_by_canonical, CanonicalError};
use crate::factor::FactorKey;
use crate::numeric::{canonical_decimal, canonical_decimal_opt};

/// Fuel combustion row (direct emissions).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FuelRow {
    pub facility_id: String,
    #[serde(default)]
    pub month: Option<String>,
    pub fuel_type: String,
    #[serde(with = "canonical_decimal")]
    pub quantity: Decimal,
    pub unit: String,
    #[serde(default)]
    pub ncv_ref: Option<FactorKey>,
    #[serde(default)]
    pub ef_ref: Option<FactorKey>,
    #[serde(default)]
    pub oxidation_ref: Option<FactorKey>,
}

/// Purchased electricity row (indirect emissions).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectricityRow {
    pub facility_id: String,
    #[serde(default)]
    pub month: Option<String>,
    #[serde(with = "canonical_decimal")]
    pub quantity: Decimal,
    /// `kWh` or `MWh`.
    pub unit: String,
    #[serde(default)]
    pub grid_ref: Option<FactorKey>,
}

/// Process emissions row (e.g. calcination), keyed by production quantity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessRow {
    pub facility_id: String,
    #[serde(default)]
    pub month: Option<String>,
    pub process: String,
    #[serde(with = "canonical_decimal")]
    pub quantity: Decimal,
    pub unit: String,
    #[serde(default)]
    pub factor_ref: Option<FactorKey>,
}

/// Production output of a product in the period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductionRow {
    pub facility_id: String,
    #[serde(default)]
    pub month: Option<String>,
    pub product_code: String,
    #[serde(with = "canonical_decimal")]
    pub quantity: Decimal,
    pub unit: String,
}

/// Material input row: `product_code` consumed `quantity` of `precursor_code`.
///
/// Either an explicit embedded value, an explicit per-unit intensity, or
/// neither (in which case the value is derived).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterialRow {
    pub product_code: String,
    pub precursor_code: String,
    #[serde(with = "canonical_decimal")]
    pub quantity: Decimal,
    pub unit: String,
    #[serde(default, with = "canonical_decimal_opt")]
    pub embedded_tco2e: Option<Decimal>,
    #[serde(default, with = "canonical_decimal_opt")]
    pub embedded_intensity: Option<Decimal>,
}

/// Export (or import declaration) line for CBAM.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportRow {
    pub product_code: String,
    #[serde(default)]
    pub cn_code: Option<String>,
    #[serde(with = "canonical_decimal")]
    pub quantity: Decimal,
    pub unit: String,
    #[serde(default)]
    pub destination: Option<String>,
    /// Whether actual (installation-specific) data was used rather than
    /// default values.
    #[serde(default)]
    pub actual_data: Option<bool>,
}

/// The kinds of dataset a calculation consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatasetKind {
    Fuel,
    Electricity,
    Process,
    Production,
    Materials,
    Exports,
}

impl DatasetKind {
    pub const ALL: [DatasetKind; 6] = [
        DatasetKind::Fuel,
        DatasetKind::Electricity,
        DatasetKind::Process,
        DatasetKind::Production,
        DatasetKind::Materials,
        DatasetKind::Exports,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DatasetKind::Fuel => "fuel",
            DatasetKind::Electricity => "electricity",
            DatasetKind::Process => "process",
            DatasetKind::Production => "production",
            DatasetKind::Materials => "materials",
            DatasetKind::Exports => "exports",
        }
    }
}

impl fmt::Display for DatasetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Content reference of one dataset: where it came from and what it hashed to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetRef {
    #[serde(default)]
    pub uri: Option<String>,
    pub sha256: String,
    pub rows: usize,
}

/// Content references of every non-empty dataset of a run.
pub type ActivitySnapshotRef = BTreeMap<DatasetKind, DatasetRef>;

/// A single dataset, tagged with its kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "rows", rename_all = "snake_case")]
pub enum Dataset {
    Fuel(Vec<FuelRow>),
    Electricity(Vec<ElectricityRow>),
    Process(Vec<ProcessRow>),
    Production(Vec<ProductionRow>),
    Materials(Vec<MaterialRow>),
    Exports(Vec<ExportRow>),
}

impl Dataset {
    pub fn kind(&self) -> DatasetKind {
        match self {
            Dataset::Fuel(_) => DatasetKind::Fuel,
            Dataset::Electricity(_) => DatasetKind::Electricity,
            Dataset::Process(_) => DatasetKind::Process,
            Dataset::Production(_) => DatasetKind::Production,
            Dataset::Materials(_) => DatasetKind::Materials,
            Dataset::Exports(_) => DatasetKind::Exports,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Dataset::Fuel(r) => r.len(),
            Dataset::Electricity(r) => r.len(),
            Dataset::Process(r) => r.len(),
            Dataset::Production(r) => r.len(),
            Dataset::Materials(r) => r.len(),
            Dataset::Exports(r) => r.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The same rows ordered by their canonical encoding.
    ///
    /// Two datasets with equal `content_hash` have equal canonical forms.
    pub fn canonical_form(&self) -> Result<Dataset, CanonicalError> {
        fn sorted<T: Serialize + Clone>(rows: &[T]) -> Result<Vec<T>, CanonicalError> {
            Ok(sorted_by_canonical(rows)?.into_iter().cloned().collect())
        }
        Ok(match self {
            Dataset::Fuel(r) => Dataset::Fuel(sorted(r)?),
            Dataset::Electricity(r) => Dataset::Electricity(sorted(r)?),
            Dataset::Process(r) => Dataset::Process(sorted(r)?),
            Dataset::Production(r) => Dataset::Production(sorted(r)?),
            Dataset::Materials(r) => Dataset::Materials(sorted(r)?),
            Dataset::Exports(r) => Dataset::Exports(sorted(r)?),
        })
    }

    /// Order-independent content hash of the rows.
    pub fn content_hash(&self) -> Result<String, CanonicalError> {
        match self {
            Dataset::Fuel(r) => hash_unordered(r),
            Dataset::Electricity(r) => hash_unordered(r),
            Dataset::Process(r) => hash_unordered(r),
            Dataset::Production(r) => hash_unordered(r),
            Dataset::Materials(r) => hash_unordered(r),
            Dataset::Exports(r) => hash_unordered(r),
        }
    }
}

/// All activity data of one calculation request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityData {
    #[serde(default)]
    pub fuel: Vec<FuelRow>,
    #[serde(default)]
    pub electricity: Vec<ElectricityRow>,
    #[serde(default)]
    pub process: Vec<ProcessRow>,
    #[serde(default)]
    pub production: Vec<ProductionRow>,
    #[serde(default)]
    pub materials: Vec<MaterialRow>,
    #[serde(default)]
    pub exports: Vec<ExportRow>,
    /// Origin URI of each dataset, passed through for traceability.
    #[serde(default)]
    pub sources: BTreeMap<DatasetKind, String>,
}

impl ActivityData {
    /// Split into the non-empty datasets, in `DatasetKind` order.
    pub fn datasets(&self) -> Vec<Dataset> {
        let all = [
            Dataset::Fuel(self.fuel.clone()),
            Dataset::Electricity(self.electricity.clone()),
            Dataset::Process(self.process.clone()),
            Dataset::Production(self.production.clone()),
            Dataset::Materials(self.materials.clone()),
            Dataset::Exports(self.exports.clone()),
        ];
        all.into_iter().filter(|d| !d.is_empty()).collect()
    }

    /// Reassemble from datasets. Later datasets of the same kind replace
    /// earlier ones.
    pub fn from_datasets<I>(datasets: I, sources: BTreeMap<DatasetKind, String>) -> Self
    where
        I: IntoIterator<Item = Dataset>,
    {
        let mut data = ActivityData {
            sources,
            ..ActivityData::default()
        };
        for dataset in datasets {
            match dataset {
                Dataset::Fuel(r) => data.fuel = r,
                Dataset::Electricity(r) => data.electricity = r,
                Dataset::Process(r) => data.process = r,
                Dataset::Production(r) => data.production = r,
                Dataset::Materials(r) => data.materials = r,
                Dataset::Exports(r) => data.exports = r,
            }
        }
        data
    }

    /// Every dataset in canonical row order.
    ///
    /// Row positions in error paths and QA flags refer to this order, which
    /// is also the order datasets are stored in under their content hash.
    pub fn canonical_form(&self) -> Result<ActivityData, CanonicalError> {
        let datasets = self
            .datasets()
            .iter()
            .map(Dataset::canonical_form)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ActivityData::from_datasets(datasets, self.sources.clone()))
    }

    /// Content references of every non-empty dataset.
    pub fn snapshot_ref(&self) -> Result<ActivitySnapshotRef, CanonicalError> {
        let mut refs = ActivitySnapshotRef::new();
        for dataset in self.datasets() {
            let kind = dataset.kind();
            refs.insert(
                kind,
                DatasetRef {
                    uri: self.sources.get(&kind).cloned(),
                    sha256: dataset.content_hash()?,
                    rows: dataset.len(),
                },
            );
        }
        Ok(refs)
    }
}
