//! Emission factor references.
//!
//! A factor is identified by `(kind:subject, region, version)`. The numeric
//! value, unit and source citation travel with the reference so that an
//! InputBundle records exactly which number was used.

use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::numeric::canonical_decimal;

/// Factor category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactorKind {
    /// Net calorific value (energy per unit of fuel).
    Ncv,
    /// Emission factor (tCO2e per unit of energy).
    Ef,
    /// Oxidation factor (dimensionless).
    Oxidation,
    /// Grid electricity factor.
    Grid,
    /// Process emission factor (per unit of production).
    Process,
    /// Embedded-emissions intensity of a purchased precursor.
    Precursor,
}

impl FactorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FactorKind::Ncv => "ncv",
            FactorKind::Ef => "ef",
            FactorKind::Oxidation => "oxidation",
            FactorKind::Grid => "grid",
            FactorKind::Process => "process",
            FactorKind::Precursor => "precursor",
        }
    }
}

impl fmt::Display for FactorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of a factor.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FactorKey {
    pub kind: FactorKind,
    /// What the factor applies to: a fuel type, grid method, process or
    /// precursor product code.
    pub subject: String,
    pub region: String,
    pub version: String,
}

impl fmt::Display for FactorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}@{}/{}",
            self.kind, self.subject, self.region, self.version
        )
    }
}

/// A versioned, citable factor value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactorRef {
    pub kind: FactorKind,
    pub subject: String,
    pub region: String,
    #[serde(default)]
    pub year: Option<i32>,
    pub version: String,
    #[serde(with = "canonical_decimal")]
    pub value: Decimal,
    pub unit: String,
    #[serde(default)]
    pub source: String,
    /// Only approved (locked) factors may feed a calculation.
    #[serde(default)]
    pub approved: bool,
}

impl FactorRef {
    pub fn key(&self) -> FactorKey {
        FactorKey {
            kind: self.kind,
            subject: self.subject.clone(),
            region: self.region.clone(),
            version: self.version.clone(),
        }
    }

    pub fn matches(&self, key: &FactorKey) -> bool {
        self.kind == key.kind
            && self.subject == key.subject
            && self.region == key.region
            && self.version == key.version
    }

    /// Fixed ordering used by every canonical list of factors.
    pub fn sort_key(&self) -> (FactorKind, &str, &str, &str, Option<i32>) {
        (
            self.kind,
            self.subject.as_str(),
            self.region.as_str(),
            self.version.as_str(),
            self.year,
        )
    }
}

/// Sort factors by their fixed key tuple.
pub fn sort_factors(factors: &mut [FactorRef]) {
    factors.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn factor(kind: FactorKind, subject: &str, version: &str) -> FactorRef {
        FactorRef {
            kind,
            subject: subject.to_string(),
            region: "TR".to_string(),
            year: Some(2025),
            version: version.to_string(),
            value: Decimal::ONE,
            unit: "-".to_string(),
            source: "test".to_string(),
            approved: true,
        }
    }

    #[test]
    fn key_display() {
        let f = factor(FactorKind::Ncv, "natural_gas", "v2");
        assert_eq!(f.key().to_string(), "ncv:natural_gas@TR/v2");
    }

    #[test]
    fn sort_is_by_kind_then_subject_then_version() {
        let mut list = vec![
            factor(FactorKind::Oxidation, "coal", "v1"),
            factor(FactorKind::Ncv, "natural_gas", "v2"),
            factor(FactorKind::Ncv, "natural_gas", "v1"),
            factor(FactorKind::Ncv, "coal", "v1"),
        ];
        sort_factors(&mut list);
        let keys: Vec<String> = list.iter().map(|f| f.key().to_string()).collect();
        assert_eq!(
            keys,
            vec![
                "ncv:coal@TR/v1",
                "ncv:natural_gas@TR/v1",
                "ncv:natural_gas@TR/v2",
                "oxidation:coal@TR/v1",
            ]
        );
    }
}
