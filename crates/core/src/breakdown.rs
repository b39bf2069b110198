//! Result breakdown records: every computed number together with the
//! factors it was derived from.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::activity::DatasetKind;
use crate::factor::FactorKey;
use crate::numeric::{canonical_decimal, canonical_decimal_opt, Quotient};

/// Direct emissions of one fuel row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FuelLine {
    pub facility_id: String,
    pub month: Option<String>,
    pub fuel_type: String,
    #[serde(with = "canonical_decimal")]
    pub quantity: Decimal,
    pub unit: String,
    #[serde(with = "canonical_decimal")]
    pub ncv: Decimal,
    #[serde(with = "canonical_decimal")]
    pub emission_factor: Decimal,
    #[serde(with = "canonical_decimal")]
    pub oxidation_factor: Decimal,
    #[serde(with = "canonical_decimal")]
    pub tco2e: Decimal,
    pub ncv_ref: FactorKey,
    pub ef_ref: FactorKey,
    pub oxidation_ref: FactorKey,
}

/// Indirect emissions of one electricity row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectricityLine {
    pub facility_id: String,
    pub month: Option<String>,
    #[serde(with = "canonical_decimal")]
    pub kwh: Decimal,
    /// Grid factor in tCO2e per kWh, after unit conversion.
    #[serde(with = "canonical_decimal")]
    pub grid_factor: Decimal,
    pub grid_method: String,
    #[serde(with = "canonical_decimal")]
    pub tco2e: Decimal,
    /// Absent when a configured market factor replaced the lookup.
    pub grid_ref: Option<FactorKey>,
}

/// Process emissions of one process row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessLine {
    pub facility_id: String,
    pub month: Option<String>,
    pub process: String,
    #[serde(with = "canonical_decimal")]
    pub quantity: Decimal,
    pub unit: String,
    #[serde(with = "canonical_decimal")]
    pub factor: Decimal,
    #[serde(with = "canonical_decimal")]
    pub tco2e: Decimal,
    pub factor_ref: FactorKey,
}

/// Emissions attributed to one product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductLine {
    pub product_code: String,
    pub cn_code: Option<String>,
    #[serde(with = "canonical_decimal")]
    pub quantity: Decimal,
    /// Mass share of total production.
    #[serde(with = "canonical_decimal")]
    pub share: Decimal,
    #[serde(with = "canonical_decimal")]
    pub allocated_tco2e: Decimal,
    #[serde(with = "canonical_decimal")]
    pub precursor_tco2e: Decimal,
    #[serde(with = "canonical_decimal")]
    pub embedded_tco2e: Decimal,
    /// tCO2e per unit of product.
    pub intensity: Quotient,
}

/// Embedded emissions of one export line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportLine {
    pub product_code: String,
    pub cn_code: Option<String>,
    pub destination: Option<String>,
    #[serde(with = "canonical_decimal")]
    pub quantity: Decimal,
    #[serde(with = "canonical_decimal")]
    pub intensity: Decimal,
    #[serde(with = "canonical_decimal")]
    pub embedded_tco2e: Decimal,
    #[serde(with = "canonical_decimal")]
    pub certificate_cost_eur: Decimal,
    pub actual_data: Option<bool>,
}

/// How precursor embedded emissions are obtained.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrecursorMode {
    /// Values come straight from the material rows; no graph walk.
    #[default]
    Explicit,
    /// Missing values are derived from each precursor's computed intensity,
    /// walking the graph in topological order.
    Chain,
}

/// Where an edge's embedded value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddedSource {
    /// Row carried an explicit embedded tCO2e.
    Explicit,
    /// Row carried a per-unit intensity, multiplied by the quantity.
    ExplicitIntensity,
    /// Approved precursor factor, multiplied by the quantity.
    Factor,
    /// Precursor's own computed intensity, multiplied by the quantity.
    Chain,
    /// No value could be obtained.
    Unresolved,
}

/// One resolved precursor edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrecursorEdgeLine {
    pub product_code: String,
    pub precursor_code: String,
    #[serde(with = "canonical_decimal")]
    pub quantity: Decimal,
    pub unit: String,
    pub source: EmbeddedSource,
    #[serde(with = "canonical_decimal_opt")]
    pub embedded_tco2e: Option<Decimal>,
    pub factor_ref: Option<FactorKey>,
}

/// Outcome of precursor resolution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrecursorReport {
    pub mode: PrecursorMode,
    pub edges: Vec<PrecursorEdgeLine>,
    /// Topological order (precursors before consumers) of resolved nodes.
    pub order: Vec<String>,
    /// Nodes left unresolved because they sit on or behind a cycle.
    pub cycle_nodes: Vec<String>,
}

/// Itemized breakdown tree of a ResultBundle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Breakdown {
    pub fuel: Vec<FuelLine>,
    pub electricity: Vec<ElectricityLine>,
    pub process: Vec<ProcessLine>,
    pub products: Vec<ProductLine>,
    pub exports: Vec<ExportLine>,
    pub precursors: PrecursorReport,
}

/// A unit conversion applied during the calculation.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UnitConversion {
    pub dataset: DatasetKind,
    pub subject: String,
    pub from_unit: String,
    pub to_unit: String,
    #[serde(with = "canonical_decimal")]
    pub multiplier: Decimal,
}

/// Citation of a factor that contributed to the result.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SourceReference {
    pub factor: FactorKey,
    pub unit: String,
    pub source: String,
}

/// Headline totals, tCO2e.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Totals {
    #[serde(with = "canonical_decimal")]
    pub direct_tco2e: Decimal,
    #[serde(with = "canonical_decimal")]
    pub indirect_tco2e: Decimal,
    #[serde(with = "canonical_decimal")]
    pub process_tco2e: Decimal,
    /// direct + indirect + process.
    #[serde(with = "canonical_decimal")]
    pub facility_tco2e: Decimal,
    #[serde(with = "canonical_decimal")]
    pub precursor_tco2e: Decimal,
    /// Emissions embedded in all production: allocated + precursor.
    #[serde(with = "canonical_decimal")]
    pub embedded_tco2e: Decimal,
    #[serde(with = "canonical_decimal")]
    pub export_embedded_tco2e: Decimal,
}

/// ETS net position and cost.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EtsCost {
    #[serde(with = "canonical_decimal")]
    pub covered_tco2e: Decimal,
    #[serde(with = "canonical_decimal")]
    pub free_allocation_tco2e: Decimal,
    #[serde(with = "canonical_decimal")]
    pub banked_tco2e: Decimal,
    #[serde(with = "canonical_decimal")]
    pub payable_tco2e: Decimal,
    #[serde(with = "canonical_decimal")]
    pub price_eur_per_t: Decimal,
    #[serde(with = "canonical_decimal")]
    pub cost_eur: Decimal,
    #[serde(with = "canonical_decimal")]
    pub cost_local: Decimal,
}

/// CBAM certificate cost.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CbamCost {
    #[serde(with = "canonical_decimal")]
    pub price_eur_per_t: Decimal,
    #[serde(with = "canonical_decimal")]
    pub embedded_tco2e: Decimal,
    /// Facility-level estimate before product allocation.
    #[serde(with = "canonical_decimal")]
    pub facility_estimate_eur: Decimal,
    #[serde(with = "canonical_decimal")]
    pub export_embedded_tco2e: Decimal,
    #[serde(with = "canonical_decimal")]
    pub certificate_cost_eur: Decimal,
    #[serde(with = "canonical_decimal")]
    pub certificate_cost_local: Decimal,
}

/// All cost outputs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostOutputs {
    pub currency: String,
    #[serde(with = "canonical_decimal")]
    pub fx_rate: Decimal,
    pub ets: EtsCost,
    pub cbam: CbamCost,
}
