use std::path::Path;

use mrv_core::numeric::canonical_string;
use mrv_eval::{replay, EngineSettings, Orchestrator, Verdict};

use crate::workspace::Workspace;
use crate::Printer;

/// Replay a snapshot. A `FAIL` verdict prints the report and exits 1.
pub(crate) fn cmd_replay(
    workspace: &Workspace,
    id: u64,
    factors: Option<&Path>,
    out: Printer,
) -> Result<(), String> {
    let store = workspace.store()?;
    let datasets = workspace.datasets();
    let catalog = workspace.catalog(factors)?;
    let orchestrator = Orchestrator::new(EngineSettings::default()).map_err(|e| e.to_string())?;

    let report =
        replay(&store, id, &datasets, &catalog, &orchestrator).map_err(|e| e.to_string())?;

    out.emit(&report, || {
        let mark = |ok: bool| if ok { "match" } else { "MISMATCH" };
        format!(
            "replay of snapshot {} ({}): {}\n  input_hash  {}\n    expected   {}\n    recomputed {}\n  result_hash {}\n    expected   {}\n    recomputed {}\n  facility_tco2e {}",
            report.snapshot_id,
            report.subject,
            report.verdict,
            mark(report.input_hash_match),
            report.input_hash_expected,
            report.input_hash_recomputed,
            mark(report.result_hash_match),
            report.result_hash_expected,
            report.result_hash_recomputed,
            canonical_string(report.preview.facility_tco2e)
        )
    });

    match report.verdict {
        Verdict::Pass => Ok(()),
        Verdict::Fail => Err(format!("replay of snapshot {} does not match", id)),
    }
}
