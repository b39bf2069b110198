use std::path::PathBuf;

use mrv_core::{CheckStatus, ComplianceCheck};
use mrv_eval::compliance::{self, overall_status, RuleSet};
use mrv_storage::SnapshotStore;
use serde::Serialize;

use crate::workspace::Workspace;
use crate::Printer;

#[derive(Serialize)]
struct CheckReport {
    snapshot_id: u64,
    status: CheckStatus,
    /// The evaluation agrees with the checks sealed into the snapshot.
    matches_recorded: bool,
    checks: Vec<ComplianceCheck>,
}

/// Evaluate rule sets against a stored bundle pair. Reads nothing but the
/// snapshot; an overall `fail` exits 1.
pub(crate) fn cmd_check(
    workspace: &Workspace,
    id: u64,
    rule_files: &[PathBuf],
    out: Printer,
) -> Result<(), String> {
    let rule_sets = if rule_files.is_empty() {
        RuleSet::builtin().map_err(|e| e.to_string())?
    } else {
        rule_files
            .iter()
            .map(|path| {
                let text = std::fs::read_to_string(path)
                    .map_err(|_| format!("file not found: {}", path.display()))?;
                RuleSet::from_toml_str(&text).map_err(|e| format!("{}: {}", path.display(), e))
            })
            .collect::<Result<Vec<_>, String>>()?
    };

    let snapshot = workspace.store()?.get(id).map_err(|e| e.to_string())?;
    let recorded = &snapshot.result().content;
    let checks = compliance::evaluate_pair(&rule_sets, snapshot.input(), recorded)
        .map_err(|e| e.to_string())?;

    let mut reevaluated = recorded.clone();
    reevaluated.compliance_checks = checks;
    let reevaluated = reevaluated.canonical_form();

    let report = CheckReport {
        snapshot_id: id,
        status: overall_status(&reevaluated.compliance_checks),
        matches_recorded: reevaluated.compliance_checks == recorded.compliance_checks,
        checks: reevaluated.compliance_checks,
    };

    out.emit(&report, || {
        let mut lines = vec![format!(
            "snapshot {}: compliance {}{}",
            report.snapshot_id,
            report.status,
            if report.matches_recorded {
                ""
            } else {
                " (differs from recorded checks)"
            }
        )];
        for check in &report.checks {
            lines.push(format!(
                "  [{}] {:<28} {}",
                check.status, check.rule_id, check.message
            ));
            if check.status != CheckStatus::Pass && !check.remediation.is_empty() {
                lines.push(format!("         remediation: {}", check.remediation));
            }
        }
        lines.join("\n")
    });

    if report.status == CheckStatus::Fail {
        Err(format!("snapshot {} fails compliance", id))
    } else {
        Ok(())
    }
}
