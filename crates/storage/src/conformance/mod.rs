//! Conformance test suite for `SnapshotStore` implementations.
//!
//! A backend-agnostic suite that any `SnapshotStore` can run to verify:
//!
//! - **Save**: id assignment, pair validation, per-subject chain linkage
//! - **Lock**: the one-way `Draft -> Locked` transition and its write guard
//! - **Chain**: replace/delete restrictions and chain verification
//!
//! # Usage
//!
//! ```ignore
//! use mrv_storage::conformance::run_conformance_suite;
//!
//! #[test]
//! fn my_store_conformance() {
//!     let report = run_conformance_suite(|| MyStore::new());
//!     assert!(report.failed == 0, "{report}");
//! }
//! ```

mod chain;
mod lifecycle;

use std::collections::BTreeMap;
use std::fmt;

use mrv_core::breakdown::{Breakdown, CostOutputs, Totals};
use mrv_core::{
    CheckStatus, FacilityDescriptor, InputBundle, Period, PriceRef, ResultBundle, ResultContent,
    Scenario,
};
use rust_decimal::Decimal;

use crate::SnapshotStore;

/// Result of a single conformance test.
#[derive(Debug, Clone)]
pub struct TestResult {
    /// Test category (e.g. "save", "lock", "chain").
    pub category: String,
    pub name: String,
    pub passed: bool,
    /// Error message if the test failed.
    pub message: Option<String>,
}

impl TestResult {
    fn from_result(category: &str, name: &str, result: Result<(), String>) -> Self {
        let (passed, message) = match result {
            Ok(()) => (true, None),
            Err(msg) => (false, Some(msg)),
        };
        TestResult {
            category: category.to_string(),
            name: name.to_string(),
            passed,
            message,
        }
    }
}

/// Aggregated report from a full conformance suite run.
#[derive(Debug, Clone)]
pub struct ConformanceReport {
    pub results: Vec<TestResult>,
    pub passed: usize,
    pub failed: usize,
    pub total: usize,
}

impl fmt::Display for ConformanceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Conformance: {}/{} passed ({} failed)",
            self.passed, self.total, self.failed
        )?;
        for r in self.results.iter().filter(|r| !r.passed) {
            writeln!(
                f,
                "  FAIL [{}/{}]: {}",
                r.category,
                r.name,
                r.message.as_deref().unwrap_or("(no message)")
            )?;
        }
        Ok(())
    }
}

/// Run the full conformance suite against a store backend.
///
/// `factory` is called once per test and must return a fresh, empty store.
pub fn run_conformance_suite<S, F>(factory: F) -> ConformanceReport
where
    S: SnapshotStore,
    F: Fn() -> S,
{
    let mut results = Vec::new();
    results.extend(lifecycle::run_lifecycle_tests(&factory));
    results.extend(chain::run_chain_tests(&factory));

    let passed = results.iter().filter(|r| r.passed).count();
    let total = results.len();
    ConformanceReport {
        results,
        passed,
        failed: total - passed,
        total,
    }
}

/// A valid, sealed bundle pair for `project/facility`. Different `marker`
/// values give different hashes.
pub fn fixture_pair(project: &str, facility: &str, marker: i64) -> (InputBundle, ResultBundle) {
    let mut input = InputBundle {
        engine_version: "conformance".to_string(),
        project_id: project.to_string(),
        period: Period {
            year: 2025,
            quarter: None,
        },
        facility: FacilityDescriptor {
            id: facility.to_string(),
            name: String::new(),
            country: "TR".to_string(),
            sector: String::new(),
            installation_id: None,
        },
        product_mappings: vec![],
        activity_snapshot_ref: BTreeMap::new(),
        monitoring_plan: None,
        methodology: None,
        factors: vec![],
        prices: PriceRef {
            carbon_price_eur_per_t: Decimal::from(marker),
            cbam_price_eur_per_t: None,
            fx_rate: Decimal::ONE,
            local_currency: "EUR".to_string(),
        },
        scenario: Scenario::default(),
        rule_sets: vec![],
        config: serde_json::json!({ "marker": marker }),
        config_hash: String::new(),
    };
    input.config_hash = mrv_core::hash(&input.config).unwrap_or_default();

    let content = ResultContent {
        engine_version: input.engine_version.clone(),
        input_bundle_hash: input.input_bundle_hash().unwrap_or_default(),
        totals: Totals {
            direct_tco2e: Decimal::from(marker),
            facility_tco2e: Decimal::from(marker),
            ..Totals::default()
        },
        breakdown: Breakdown::default(),
        unit_conversions: vec![],
        source_references: vec![],
        qa_flags: vec![],
        compliance_checks: vec![],
        compliance_status: CheckStatus::Pass,
        costs: CostOutputs::default(),
    };
    let result = match ResultBundle::seal(content.clone()) {
        Ok(bundle) => bundle,
        Err(_) => ResultBundle {
            content,
            result_hash: String::new(),
        },
    };
    (input, result)
}

fn check(condition: bool, msg: impl Into<String>) -> Result<(), String> {
    if condition {
        Ok(())
    } else {
        Err(msg.into())
    }
}
