use std::path::Path;

use mrv_core::numeric::canonical_string;
use mrv_eval::{CalculationRequest, EngineConfig, EngineSettings, Orchestrator};
use mrv_storage::SnapshotStore;
use serde::Serialize;

use crate::workspace::{read_json, Workspace};
use crate::Printer;

#[derive(Serialize)]
struct RunSummary {
    snapshot_id: u64,
    subject: String,
    input_bundle_hash: String,
    input_hash: String,
    result_hash: String,
    snapshot_hash: String,
    previous_snapshot_hash: Option<String>,
    locked: bool,
    facility_tco2e: String,
    compliance_status: String,
    qa_flags: usize,
    datasets: Vec<String>,
}

/// Compute a request, record its datasets and factors, and append the
/// snapshot. Nothing is written when the calculation fails.
pub(crate) fn cmd_run(
    workspace: &Workspace,
    request_path: &Path,
    config_path: Option<&Path>,
    lock: bool,
    out: Printer,
) -> Result<(), String> {
    let mut request: CalculationRequest = read_json(request_path)?;
    if let Some(path) = config_path {
        let text = std::fs::read_to_string(path)
            .map_err(|_| format!("file not found: {}", path.display()))?;
        request.config = EngineConfig::from_toml_str(&text).map_err(|e| e.to_string())?;
    }

    let orchestrator = Orchestrator::new(EngineSettings::default()).map_err(|e| e.to_string())?;
    let pair = orchestrator.run(&request).map_err(|e| e.to_string())?;

    let datasets = workspace.datasets().write_all(&request.activity)?;
    let added = workspace.record_factors(&pair.input.factors)?;
    tracing::debug!(datasets = datasets.len(), factors_added = added, "references recorded");

    let store = workspace.store()?;
    let input_bundle_hash = pair.result.content.input_bundle_hash.clone();
    let facility_tco2e = canonical_string(pair.result.content.totals.facility_tco2e);
    let compliance_status = pair.result.content.compliance_status.to_string();
    let qa_flags = pair.result.content.qa_flags.len();

    let mut snapshot = store
        .save(pair.input, pair.result)
        .map_err(|e| e.to_string())?;
    if lock {
        snapshot = store.lock(snapshot.id()).map_err(|e| e.to_string())?;
    }

    let summary = RunSummary {
        snapshot_id: snapshot.id(),
        subject: snapshot.subject().to_string(),
        input_bundle_hash,
        input_hash: snapshot.input_hash().to_string(),
        result_hash: snapshot.result_hash().to_string(),
        snapshot_hash: snapshot.snapshot_hash().to_string(),
        previous_snapshot_hash: snapshot.previous_snapshot_hash().map(str::to_string),
        locked: snapshot.is_locked(),
        facility_tco2e,
        compliance_status,
        qa_flags,
        datasets,
    };
    out.emit(&summary, || {
        format!(
            "snapshot {} ({}){}\n  input_hash:     {}\n  result_hash:    {}\n  snapshot_hash:  {}\n  facility_tco2e: {}\n  compliance:     {} ({} QA flags)",
            summary.snapshot_id,
            summary.subject,
            if summary.locked { " locked" } else { "" },
            summary.input_hash,
            summary.result_hash,
            summary.snapshot_hash,
            summary.facility_tco2e,
            summary.compliance_status,
            summary.qa_flags
        )
    });
    Ok(())
}
