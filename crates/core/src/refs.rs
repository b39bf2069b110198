//! Opaque references carried through a calculation for traceability.

use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::numeric::{canonical_decimal, canonical_decimal_opt};

/// Installation the calculation is about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FacilityDescriptor {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub sector: String,
    #[serde(default)]
    pub installation_id: Option<String>,
}

/// Reporting period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Period {
    pub year: i32,
    #[serde(default)]
    pub quarter: Option<u8>,
}

/// Maps an internal product code to its customs classification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductMapping {
    pub product_code: String,
    pub cn_code: String,
    #[serde(default)]
    pub product_name: String,
}

impl ProductMapping {
    pub fn sort_key(&self) -> (&str, &str, &str) {
        (
            self.cn_code.as_str(),
            self.product_name.as_str(),
            self.product_code.as_str(),
        )
    }
}

/// Monitoring plan version reference. Passed through, not interpreted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitoringPlanRef {
    pub id: String,
    #[serde(default)]
    pub method: String,
    #[serde(default)]
    pub tier_level: String,
    #[serde(default)]
    pub updated_at: Option<String>,
}

/// Methodology reference. Passed through, not interpreted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodologyRef {
    pub id: String,
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub reg_reference: String,
}

/// Carbon price and FX inputs for cost outputs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceRef {
    /// EU allowance price, EUR per tCO2e.
    #[serde(with = "canonical_decimal")]
    pub carbon_price_eur_per_t: Decimal,
    /// CBAM certificate price; the allowance price applies when absent.
    #[serde(default, with = "canonical_decimal_opt")]
    pub cbam_price_eur_per_t: Option<Decimal>,
    /// Local currency units per EUR.
    #[serde(with = "canonical_decimal")]
    pub fx_rate: Decimal,
    #[serde(default = "default_currency")]
    pub local_currency: String,
}

fn default_currency() -> String {
    "EUR".to_string()
}

impl PriceRef {
    pub fn cbam_price(&self) -> Decimal {
        self.cbam_price_eur_per_t
            .unwrap_or(self.carbon_price_eur_per_t)
    }
}

/// What-if adjustment applied to activity quantities before computation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Scenario {
    #[serde(default)]
    pub name: Option<String>,
    /// Percentage reduction applied to fuel and electricity quantities.
    #[serde(default, with = "canonical_decimal")]
    pub energy_reduction_pct: Decimal,
}

impl Scenario {
    pub fn is_baseline(&self) -> bool {
        self.energy_reduction_pct.is_zero()
    }
}

/// Identity of a snapshot chain: one project at one facility.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubjectKey(pub String);

impl SubjectKey {
    pub fn new(project_id: &str, facility_id: &str) -> Self {
        SubjectKey(format!("{}/{}", project_id, facility_id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
