//! InputBundle and ResultBundle: the hashable records of one calculation.
//!
//! The ResultBundle embeds the InputBundle's hash; the InputBundle never
//! refers back to its result, so neither hash depends on itself.

use serde::{Deserialize, Serialize};

use crate::activity::ActivitySnapshotRef;
use crate::breakdown::{Breakdown, CostOutputs, SourceReference, Totals, UnitConversion};
use crate::canonical::{hash, CanonicalError};
use crate::factor::{sort_factors, FactorRef};
use crate::finding::{sort_checks, sort_flags, CheckStatus, ComplianceCheck, QaFlag, RuleSetRef};
use crate::refs::{
    FacilityDescriptor, MethodologyRef, MonitoringPlanRef, Period, PriceRef, ProductMapping,
    Scenario, SubjectKey,
};

/// Everything a result was computed from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputBundle {
    pub engine_version: String,
    pub project_id: String,
    pub period: Period,
    pub facility: FacilityDescriptor,
    pub product_mappings: Vec<ProductMapping>,
    /// Content hashes of the datasets, not the datasets themselves.
    pub activity_snapshot_ref: ActivitySnapshotRef,
    pub monitoring_plan: Option<MonitoringPlanRef>,
    pub methodology: Option<MethodologyRef>,
    /// Factors actually used by the calculation.
    pub factors: Vec<FactorRef>,
    pub prices: PriceRef,
    pub scenario: Scenario,
    /// Compliance rule sets the result was checked against.
    #[serde(default)]
    pub rule_sets: Vec<RuleSetRef>,
    /// Free-form engine configuration as applied.
    pub config: serde_json::Value,
    pub config_hash: String,
}

impl InputBundle {
    pub fn subject(&self) -> SubjectKey {
        SubjectKey::new(&self.project_id, &self.facility.id)
    }

    /// Copy with every list field in its fixed order.
    pub fn canonical_form(&self) -> InputBundle {
        let mut bundle = self.clone();
        sort_factors(&mut bundle.factors);
        bundle.product_mappings.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
        bundle.rule_sets.sort();
        bundle
    }

    pub fn input_bundle_hash(&self) -> Result<String, CanonicalError> {
        hash(&self.canonical_form())
    }

    /// The snapshot `input_hash`: the bundle hash together with every
    /// upstream identity field. Equal keys imply equal results.
    pub fn reproducibility_key(&self) -> Result<String, CanonicalError> {
        let canonical = self.canonical_form();
        let projection = ReproducibilityProjection {
            engine_version: &canonical.engine_version,
            input_bundle_hash: hash(&canonical)?,
            activity_snapshot_ref: &canonical.activity_snapshot_ref,
            scenario: &canonical.scenario,
            methodology_id: canonical.methodology.as_ref().map(|m| m.id.as_str()),
            factors: &canonical.factors,
            monitoring_plan: canonical.monitoring_plan.as_ref(),
            config: &canonical.config,
        };
        hash(&projection)
    }
}

#[derive(Serialize)]
struct ReproducibilityProjection<'a> {
    engine_version: &'a str,
    input_bundle_hash: String,
    activity_snapshot_ref: &'a ActivitySnapshotRef,
    scenario: &'a Scenario,
    methodology_id: Option<&'a str>,
    factors: &'a [FactorRef],
    monitoring_plan: Option<&'a MonitoringPlanRef>,
    config: &'a serde_json::Value,
}

/// Every field of a ResultBundle except its own hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultContent {
    pub engine_version: String,
    pub input_bundle_hash: String,
    pub totals: Totals,
    pub breakdown: Breakdown,
    pub unit_conversions: Vec<UnitConversion>,
    pub source_references: Vec<SourceReference>,
    pub qa_flags: Vec<QaFlag>,
    pub compliance_checks: Vec<ComplianceCheck>,
    pub compliance_status: CheckStatus,
    pub costs: CostOutputs,
}

impl ResultContent {
    pub fn canonical_form(&self) -> ResultContent {
        let mut content = self.clone();
        sort_flags(&mut content.qa_flags);
        sort_checks(&mut content.compliance_checks);
        content.unit_conversions.sort();
        content.unit_conversions.dedup();
        content.source_references.sort();
        content.source_references.dedup();
        content
    }

    pub fn hash(&self) -> Result<String, CanonicalError> {
        hash(&self.canonical_form())
    }
}

/// What a calculation produced, sealed with `result_hash`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultBundle {
    #[serde(flatten)]
    pub content: ResultContent,
    pub result_hash: String,
}

impl ResultBundle {
    /// Put `content` in canonical order and compute its hash.
    pub fn seal(content: ResultContent) -> Result<Self, CanonicalError> {
        let content = content.canonical_form();
        let result_hash = hash(&content)?;
        Ok(ResultBundle {
            content,
            result_hash,
        })
    }

    /// Whether `result_hash` still matches the content.
    pub fn verify_hash(&self) -> Result<bool, CanonicalError> {
        Ok(self.content.hash()? == self.result_hash)
    }
}

/// The pair produced by one orchestrator run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundlePair {
    pub input: InputBundle,
    pub result: ResultBundle,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factor::FactorKind;
    use crate::finding::Severity;
    use rust_decimal::Decimal;
    use std::collections::BTreeMap;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn factor(kind: FactorKind, subject: &str, value: &str) -> FactorRef {
        FactorRef {
            kind,
            subject: subject.to_string(),
            region: "TR".to_string(),
            year: Some(2025),
            version: "v1".to_string(),
            value: dec(value),
            unit: "-".to_string(),
            source: "IPCC 2006".to_string(),
            approved: true,
        }
    }

    fn mapping(code: &str, cn: &str) -> ProductMapping {
        ProductMapping {
            product_code: code.to_string(),
            cn_code: cn.to_string(),
            product_name: String::new(),
        }
    }

    fn input() -> InputBundle {
        InputBundle {
            engine_version: "0.1.0".to_string(),
            project_id: "P1".to_string(),
            period: Period {
                year: 2025,
                quarter: None,
            },
            facility: FacilityDescriptor {
                id: "F1".to_string(),
                name: "Plant".to_string(),
                country: "TR".to_string(),
                sector: "cement".to_string(),
                installation_id: None,
            },
            product_mappings: vec![mapping("A", "2523"), mapping("B", "7208")],
            activity_snapshot_ref: BTreeMap::new(),
            monitoring_plan: None,
            methodology: None,
            factors: vec![
                factor(FactorKind::Ncv, "natural_gas", "2.0"),
                factor(FactorKind::Ef, "natural_gas", "56.1"),
            ],
            prices: PriceRef {
                carbon_price_eur_per_t: dec("80"),
                cbam_price_eur_per_t: None,
                fx_rate: Decimal::ONE,
                local_currency: "EUR".to_string(),
            },
            scenario: Scenario::default(),
            rule_sets: vec![],
            config: serde_json::json!({"region": "TR"}),
            config_hash: String::new(),
        }
    }

    fn content() -> ResultContent {
        ResultContent {
            engine_version: "0.1.0".to_string(),
            input_bundle_hash: "abc".to_string(),
            totals: Totals::default(),
            breakdown: Breakdown::default(),
            unit_conversions: vec![],
            source_references: vec![],
            qa_flags: vec![
                QaFlag::new("B", Severity::Warn, "b"),
                QaFlag::new("A", Severity::Info, "a"),
            ],
            compliance_checks: vec![],
            compliance_status: CheckStatus::Pass,
            costs: CostOutputs::default(),
        }
    }

    #[test]
    fn input_hash_ignores_list_order() {
        let a = input();
        let mut b = input();
        b.factors.reverse();
        b.product_mappings.reverse();
        assert_eq!(a.input_bundle_hash().unwrap(), b.input_bundle_hash().unwrap());
        assert_eq!(
            a.reproducibility_key().unwrap(),
            b.reproducibility_key().unwrap()
        );
    }

    #[test]
    fn input_hash_changes_with_a_factor_value() {
        let a = input();
        let mut b = input();
        b.factors[0].value = dec("2.01");
        assert_ne!(a.input_bundle_hash().unwrap(), b.input_bundle_hash().unwrap());
    }

    #[test]
    fn reproducibility_key_tracks_scenario() {
        let a = input();
        let mut b = input();
        b.scenario.energy_reduction_pct = dec("10");
        assert_ne!(
            a.reproducibility_key().unwrap(),
            b.reproducibility_key().unwrap()
        );
    }

    #[test]
    fn sealed_bundle_verifies_and_detects_edits() {
        let mut bundle = ResultBundle::seal(content()).unwrap();
        assert!(bundle.verify_hash().unwrap());
        assert_eq!(bundle.content.qa_flags[0].flag_id, "A");

        bundle.content.totals.direct_tco2e = dec("1");
        assert!(!bundle.verify_hash().unwrap());
    }

    #[test]
    fn result_hash_is_a_sibling_field() {
        let bundle = ResultBundle::seal(content()).unwrap();
        let value = serde_json::to_value(&bundle).unwrap();
        assert!(value.get("result_hash").is_some());
        assert!(value.get("input_bundle_hash").is_some());

        let back: ResultBundle = serde_json::from_value(value).unwrap();
        assert_eq!(back, bundle);
    }
}
