//! End-to-end calculation scenarios.
//!
//! Each test builds a `CalculationRequest` from a JSON fixture, runs the
//! orchestrator, and checks totals, hashes, and findings. The snapshot
//! tests then persist the pair and replay it.

use mrv_core::breakdown::EmbeddedSource;
use mrv_core::{CheckStatus, FactorRef};
use mrv_eval::{
    replay, CalculationRequest, ContentAddressedDatasets, EngineSettings, Orchestrator, RunError,
    StaticFactorCatalog, Verdict,
};
use mrv_storage::{InMemorySnapshotStore, SnapshotStore, StorageError};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::str::FromStr;

// ──────────────────────────────────────────────
// Fixtures
// ──────────────────────────────────────────────

fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

fn factor(kind: &str, subject: &str, value: &str, unit: &str) -> Value {
    json!({
        "kind": kind,
        "subject": subject,
        "region": "TR",
        "year": 2025,
        "version": "v1",
        "value": value,
        "unit": unit,
        "source": "IPCC 2006 Vol.2",
        "approved": true
    })
}

/// Natural gas burner, one process line, two products, one export.
fn base_request() -> Value {
    json!({
        "project_id": "P-2025",
        "period": { "year": 2025 },
        "facility": {
            "id": "F1",
            "name": "Gebze Steel Works",
            "country": "TR",
            "sector": "iron_steel",
            "installation_id": "TR-INST-001"
        },
        "product_mappings": [
            { "product_code": "A", "cn_code": "72081000", "product_name": "Hot-rolled coil" },
            { "product_code": "B", "cn_code": "72141000", "product_name": "Rebar" }
        ],
        "activity": {
            "fuel": [
                { "facility_id": "F1", "month": "2025-01", "fuel_type": "natural_gas",
                  "quantity": "1000", "unit": "t" }
            ],
            "process": [
                { "facility_id": "F1", "month": "2025-01", "process": "lime_calcination",
                  "quantity": "100", "unit": "t" }
            ],
            "production": [
                { "facility_id": "F1", "month": "2025-01", "product_code": "A",
                  "quantity": "600", "unit": "t" },
                { "facility_id": "F1", "month": "2025-01", "product_code": "B",
                  "quantity": "400", "unit": "t" }
            ],
            "exports": [
                { "product_code": "A", "cn_code": "72081000", "quantity": "200", "unit": "t",
                  "destination": "DE", "actual_data": true }
            ]
        },
        "factors": [
            factor("ncv", "natural_gas", "2.0", "TJ/t"),
            factor("ef", "natural_gas", "56.1", "tCO2/TJ"),
            factor("oxidation", "natural_gas", "0.99", "-"),
            factor("process", "lime_calcination", "0.785", "tCO2/t"),
            factor("grid", "location", "0.442", "kgCO2e/kWh")
        ],
        "prices": {
            "carbon_price_eur_per_t": "80",
            "fx_rate": "35.5",
            "local_currency": "TRY"
        },
        "monitoring_plan": {
            "id": "MP-7",
            "method": "calculation",
            "tier_level": "tier_3"
        },
        "methodology": {
            "id": "MRR-2018-2066",
            "code": "MRR",
            "name": "Monitoring and Reporting Regulation",
            "reg_reference": "2018/2066"
        }
    })
}

fn request(value: Value) -> CalculationRequest {
    serde_json::from_value(value).unwrap()
}

fn orchestrator() -> Orchestrator {
    Orchestrator::new(EngineSettings {
        engine_version: "scenario-test".to_string(),
    })
    .unwrap()
}

/// Replace the process row with one that yields exactly `tco2e`, and drop
/// the fuel rows.
fn facility_of(value: &mut Value, tco2e: &str) {
    value["activity"]["fuel"] = json!([]);
    value["activity"]["process"] = json!([
        { "facility_id": "F1", "process": "fixed", "quantity": tco2e, "unit": "t" }
    ]);
    value["factors"] = json!([factor("process", "fixed", "1", "tCO2/t")]);
}

// ──────────────────────────────────────────────
// Worked examples
// ──────────────────────────────────────────────

#[test]
fn fuel_combustion_is_exact() {
    let mut value = base_request();
    value["activity"]["process"] = json!([]);
    let pair = orchestrator().run(&request(value)).unwrap();
    let totals = &pair.result.content.totals;
    assert_eq!(totals.direct_tco2e, dec("111078"));
    assert_eq!(totals.facility_tco2e, dec("111078"));
    assert_eq!(pair.result.content.breakdown.fuel[0].tco2e, dec("111078"));

    let again = orchestrator().run(&request(base_request_without_process())).unwrap();
    assert_eq!(again.result.result_hash, pair.result.result_hash);
}

fn base_request_without_process() -> Value {
    let mut value = base_request();
    value["activity"]["process"] = json!([]);
    value
}

#[test]
fn mass_share_allocation_is_exact() {
    let mut value = base_request();
    facility_of(&mut value, "100");
    value["activity"]["exports"] = json!([]);
    let pair = orchestrator().run(&request(value)).unwrap();
    let products = &pair.result.content.breakdown.products;
    assert_eq!(products.len(), 2);
    assert_eq!(products[0].product_code, "A");
    assert_eq!(products[0].allocated_tco2e, dec("60"));
    assert_eq!(products[1].allocated_tco2e, dec("40"));
    assert_eq!(products[0].share, dec("0.6"));
}

#[test]
fn export_embedded_and_certificate_cost() {
    let mut value = base_request();
    facility_of(&mut value, "100");
    value["activity"]["production"] = json!([
        { "facility_id": "F1", "product_code": "A", "quantity": "1000", "unit": "t" }
    ]);
    let pair = orchestrator().run(&request(value)).unwrap();
    let content = &pair.result.content;
    let export = &content.breakdown.exports[0];
    assert_eq!(export.intensity, dec("0.1"));
    assert_eq!(export.embedded_tco2e, dec("20"));
    assert_eq!(export.certificate_cost_eur, dec("1600"));
    assert_eq!(content.costs.cbam.certificate_cost_eur, dec("1600"));
    assert_eq!(content.costs.cbam.certificate_cost_local, dec("56800"));
}

#[test]
fn precursor_cycle_is_a_finding_not_a_crash() {
    let mut value = base_request();
    value["activity"]["materials"] = json!([
        { "product_code": "A", "precursor_code": "B", "quantity": "10", "unit": "t" },
        { "product_code": "B", "precursor_code": "A", "quantity": "5", "unit": "t" }
    ]);
    value["config"] = json!({ "precursor_mode": "chain" });
    let pair = orchestrator().run(&request(value)).unwrap();
    let content = &pair.result.content;

    let precursors = &content.breakdown.precursors;
    assert_eq!(precursors.cycle_nodes, vec!["A".to_string(), "B".to_string()]);
    assert!(precursors
        .edges
        .iter()
        .all(|e| e.source == EmbeddedSource::Unresolved));
    assert!(content
        .qa_flags
        .iter()
        .any(|f| f.flag_id == "DQ.PRECURSOR.CYCLE"));

    let check = content
        .compliance_checks
        .iter()
        .find(|c| c.rule_id == "CBAM_PRECURSOR_ACYCLIC")
        .unwrap();
    assert_eq!(check.status, CheckStatus::Fail);
    assert_eq!(content.compliance_status, CheckStatus::Fail);
}

#[test]
fn complete_request_passes_compliance() {
    let pair = orchestrator().run(&request(base_request())).unwrap();
    let content = &pair.result.content;
    let failed: Vec<&str> = content
        .compliance_checks
        .iter()
        .filter(|c| c.status == CheckStatus::Fail)
        .map(|c| c.rule_id.as_str())
        .collect();
    assert!(failed.is_empty(), "unexpected failures: {:?}", failed);
    assert_eq!(content.compliance_status, CheckStatus::Pass);
}

// ──────────────────────────────────────────────
// Properties
// ──────────────────────────────────────────────

#[test]
fn hashes_ignore_row_order() {
    let forward = base_request();
    let mut reversed = base_request();
    for dataset in ["production", "fuel"] {
        let rows = reversed["activity"][dataset].as_array_mut().unwrap();
        rows.reverse();
    }
    reversed["factors"].as_array_mut().unwrap().reverse();
    reversed["product_mappings"].as_array_mut().unwrap().reverse();

    let a = orchestrator().run(&request(forward)).unwrap();
    let b = orchestrator().run(&request(reversed)).unwrap();
    assert_eq!(
        a.input.input_bundle_hash().unwrap(),
        b.input.input_bundle_hash().unwrap()
    );
    assert_eq!(a.result.result_hash, b.result.result_hash);
}

/// Several rows per dataset, including a zero-quantity fuel row and rows
/// that differ only in their pinned factor references.
fn many_rows_request() -> Value {
    let mut value = base_request();
    let ef_v0 = json!({ "kind": "ef", "subject": "natural_gas", "region": "TR", "version": "v0" });
    let grid_v0 = json!({ "kind": "grid", "subject": "location", "region": "TR", "version": "v0" });
    value["activity"]["fuel"] = json!([
        { "facility_id": "F1", "month": "2025-01", "fuel_type": "natural_gas",
          "quantity": "0", "unit": "t" },
        { "facility_id": "F1", "month": "2025-01", "fuel_type": "natural_gas",
          "quantity": "500", "unit": "t" },
        { "facility_id": "F1", "month": "2025-01", "fuel_type": "natural_gas",
          "quantity": "500", "unit": "t", "ef_ref": ef_v0 }
    ]);
    value["activity"]["electricity"] = json!([
        { "facility_id": "F1", "month": "2025-01", "quantity": "2000", "unit": "kWh" },
        { "facility_id": "F1", "month": "2025-01", "quantity": "2000", "unit": "kWh",
          "grid_ref": grid_v0 },
        { "facility_id": "F1", "month": "2025-01", "quantity": "3", "unit": "MWh" }
    ]);
    value["activity"]["materials"] = json!([
        { "product_code": "A", "precursor_code": "B", "quantity": "10", "unit": "t" },
        { "product_code": "A", "precursor_code": "PIG", "quantity": "10", "unit": "t",
          "embedded_tco2e": "4" },
        { "product_code": "A", "precursor_code": "PIG", "quantity": "10", "unit": "t",
          "embedded_intensity": "0.3" }
    ]);
    value["activity"]["exports"] = json!([
        { "product_code": "A", "cn_code": "72081000", "quantity": "200", "unit": "t",
          "destination": "DE", "actual_data": true },
        { "product_code": "A", "cn_code": "72081000", "quantity": "200", "unit": "t",
          "destination": "DE", "actual_data": false },
        { "product_code": "B", "quantity": "50", "unit": "t", "destination": "NL" }
    ]);
    value["config"] = json!({ "precursor_mode": "chain" });

    let mut ef = factor("ef", "natural_gas", "55.0", "tCO2/TJ");
    ef["version"] = json!("v0");
    ef["year"] = json!(2024);
    let mut grid = factor("grid", "location", "0.5", "kgCO2e/kWh");
    grid["version"] = json!("v0");
    grid["year"] = json!(2024);
    let factors = value["factors"].as_array_mut().unwrap();
    factors.push(ef);
    factors.push(grid);
    value
}

fn reversed_rows(mut value: Value) -> Value {
    for dataset in ["fuel", "electricity", "production", "materials", "exports"] {
        value["activity"][dataset].as_array_mut().unwrap().reverse();
    }
    value["factors"].as_array_mut().unwrap().reverse();
    value
}

#[test]
fn every_dataset_ignores_row_order() {
    let forward = request(many_rows_request());
    let reversed = request(reversed_rows(many_rows_request()));

    let a = orchestrator().run(&forward).unwrap();
    let b = orchestrator().run(&reversed).unwrap();
    assert_eq!(
        a.input.reproducibility_key().unwrap(),
        b.input.reproducibility_key().unwrap()
    );
    assert_eq!(a.result.result_hash, b.result.result_hash);
    assert_eq!(a.result.content.breakdown.fuel.len(), 2);
    assert!(a
        .result
        .content
        .qa_flags
        .iter()
        .any(|f| f.flag_id == "DQ.FUEL.ZERO_QTY"));
}

#[test]
fn replay_passes_after_a_reordered_rerun() {
    let forward = request(many_rows_request());
    let reversed = request(reversed_rows(many_rows_request()));
    let rec = record(&forward);
    rec.store.lock(rec.id).unwrap();

    let mut datasets = rec.datasets;
    let pair = orchestrator().run(&reversed).unwrap();
    rec.store.save(pair.input, pair.result).unwrap();
    datasets.insert_all(&reversed.activity).unwrap();

    let catalog = StaticFactorCatalog::new(rec.factors.clone());
    let report = replay(&rec.store, rec.id, &datasets, &catalog, &orchestrator()).unwrap();
    assert!(report.input_hash_match);
    assert!(report.result_hash_match);
    assert_eq!(report.verdict, Verdict::Pass);
}

#[test]
fn one_numeric_change_changes_both_hashes() {
    let a = orchestrator().run(&request(base_request())).unwrap();
    let mut value = base_request();
    value["activity"]["fuel"][0]["quantity"] = json!("1001");
    let b = orchestrator().run(&request(value)).unwrap();
    assert_ne!(
        a.input.input_bundle_hash().unwrap(),
        b.input.input_bundle_hash().unwrap()
    );
    assert_ne!(a.result.result_hash, b.result.result_hash);
}

#[test]
fn allocation_conserves_facility_total() {
    let mut value = base_request();
    value["activity"]["production"] = json!([
        { "facility_id": "F1", "product_code": "A", "quantity": "1", "unit": "t" },
        { "facility_id": "F1", "product_code": "B", "quantity": "1", "unit": "t" },
        { "facility_id": "F1", "product_code": "C", "quantity": "1", "unit": "t" }
    ]);
    let pair = orchestrator().run(&request(value)).unwrap();
    let content = &pair.result.content;
    let allocated = content
        .breakdown
        .products
        .iter()
        .fold(Decimal::ZERO, |acc, p| acc + p.allocated_tco2e);
    assert_eq!(allocated, content.totals.facility_tco2e);
}

#[test]
fn zero_production_total_aborts() {
    let mut value = base_request();
    value["activity"]["production"] = json!([
        { "facility_id": "F1", "product_code": "A", "quantity": "0", "unit": "t" }
    ]);
    value["activity"]["exports"] = json!([]);
    let err = orchestrator().run(&request(value)).unwrap_err();
    assert!(matches!(err, RunError::NonPositiveProduction { .. }));
}

#[test]
fn export_of_unproduced_product_aborts() {
    let mut value = base_request();
    value["activity"]["exports"] = json!([
        { "product_code": "Z", "quantity": "5", "unit": "t" }
    ]);
    let err = orchestrator().run(&request(value)).unwrap_err();
    assert_eq!(
        err.to_string(),
        "exports[0].product_code: product 'Z' has no computed intensity"
    );
}

#[test]
fn missing_factor_names_the_field() {
    let mut value = base_request();
    value["factors"].as_array_mut().unwrap().remove(1);
    let err = orchestrator().run(&request(value)).unwrap_err();
    assert!(matches!(err, RunError::MissingFactor { ref field, .. } if field == "fuel[0].ef"));
}

// ──────────────────────────────────────────────
// Snapshots and replay
// ──────────────────────────────────────────────

struct Recorded {
    store: InMemorySnapshotStore,
    datasets: ContentAddressedDatasets,
    factors: Vec<FactorRef>,
    id: u64,
}

fn record(req: &CalculationRequest) -> Recorded {
    let pair = orchestrator().run(req).unwrap();
    let store = InMemorySnapshotStore::new();
    let snapshot = store.save(pair.input, pair.result).unwrap();
    let mut datasets = ContentAddressedDatasets::new();
    datasets.insert_all(&req.activity).unwrap();
    Recorded {
        store,
        datasets,
        factors: req.factors.clone(),
        id: snapshot.id(),
    }
}

#[test]
fn locked_snapshot_replays_to_pass() {
    let req = request(base_request());
    let rec = record(&req);
    let locked = rec.store.lock(rec.id).unwrap();
    assert!(locked.is_locked());

    let catalog = StaticFactorCatalog::new(rec.factors.clone());
    let report = replay(&rec.store, rec.id, &rec.datasets, &catalog, &orchestrator()).unwrap();
    assert!(report.input_hash_match);
    assert!(report.result_hash_match);
    assert_eq!(report.verdict, Verdict::Pass);
    assert_eq!(report.preview.facility_tco2e, dec("111156.5"));
}

#[test]
fn retroactive_factor_change_fails_replay() {
    let req = request(base_request());
    let rec = record(&req);
    let mut drifted = rec.factors.clone();
    for f in drifted.iter_mut().filter(|f| f.subject == "natural_gas") {
        if f.value == dec("56.1") {
            f.value = dec("56.2");
        }
    }
    let catalog = StaticFactorCatalog::new(drifted);
    let report = replay(&rec.store, rec.id, &rec.datasets, &catalog, &orchestrator()).unwrap();
    assert_eq!(report.verdict, Verdict::Fail);
    assert!(!report.result_hash_match);
    assert_ne!(report.result_hash_expected, report.result_hash_recomputed);
}

#[test]
fn locked_snapshot_rejects_mutation() {
    let req = request(base_request());
    let rec = record(&req);
    rec.store.lock(rec.id).unwrap();

    let again = orchestrator().run(&req).unwrap();
    let err = rec
        .store
        .replace_bundles(rec.id, again.input, again.result)
        .unwrap_err();
    assert!(matches!(err, StorageError::SnapshotLocked { .. }));
    assert!(matches!(
        rec.store.delete(rec.id).unwrap_err(),
        StorageError::SnapshotLocked { .. }
    ));
}

#[test]
fn reruns_of_one_subject_form_a_chain() {
    let req = request(base_request());
    let rec = record(&req);
    let first = rec.store.get(rec.id).unwrap();

    let mut value = base_request();
    value["scenario"] = json!({ "name": "efficiency", "energy_reduction_pct": "10" });
    let pair = orchestrator().run(&request(value)).unwrap();
    let second = rec.store.save(pair.input, pair.result).unwrap();

    assert_eq!(second.previous_snapshot_hash(), Some(first.snapshot_hash()));
    assert!(rec.store.verify_chain(second.subject()).unwrap().is_intact());
    assert_ne!(second.input_hash(), first.input_hash());
}
