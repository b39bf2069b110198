use mrv_core::SubjectKey;
use mrv_storage::{Snapshot, SnapshotStore};
use serde::Serialize;

use crate::workspace::Workspace;
use crate::Printer;

/// A ledger row without the bundles.
#[derive(Serialize)]
struct SnapshotLine {
    id: u64,
    subject: String,
    locked: bool,
    input_hash: String,
    result_hash: String,
    snapshot_hash: String,
    created_at: String,
}

impl From<&Snapshot> for SnapshotLine {
    fn from(s: &Snapshot) -> Self {
        SnapshotLine {
            id: s.id(),
            subject: s.subject().to_string(),
            locked: s.is_locked(),
            input_hash: s.input_hash().to_string(),
            result_hash: s.result_hash().to_string(),
            snapshot_hash: s.snapshot_hash().to_string(),
            created_at: s.created_at().to_string(),
        }
    }
}

impl SnapshotLine {
    fn text(&self) -> String {
        format!(
            "{:>4}  {:<24} {:<6} input {}  result {}  {}",
            self.id,
            self.subject,
            if self.locked { "locked" } else { "draft" },
            short(&self.input_hash),
            short(&self.result_hash),
            self.created_at
        )
    }
}

fn short(hash: &str) -> &str {
    hash.get(..12).unwrap_or(hash)
}

pub(crate) fn cmd_list(
    workspace: &Workspace,
    project: Option<&str>,
    facility: Option<&str>,
    out: Printer,
) -> Result<(), String> {
    let store = workspace.store()?;
    let snapshots = store.list(None).map_err(|e| e.to_string())?;
    let lines: Vec<SnapshotLine> = snapshots
        .iter()
        .filter(|s| {
            let input = s.input();
            project.map_or(true, |p| input.project_id == p)
                && facility.map_or(true, |f| input.facility.id == f)
        })
        .map(SnapshotLine::from)
        .collect();
    out.emit(&lines, || {
        if lines.is_empty() {
            "no snapshots".to_string()
        } else {
            lines
                .iter()
                .map(SnapshotLine::text)
                .collect::<Vec<_>>()
                .join("\n")
        }
    });
    Ok(())
}

pub(crate) fn cmd_lock(workspace: &Workspace, id: u64, out: Printer) -> Result<(), String> {
    let store = workspace.store()?;
    let snapshot = store.lock(id).map_err(|e| e.to_string())?;
    let line = SnapshotLine::from(&snapshot);
    out.emit(&line, || format!("locked snapshot {}", line.id));
    Ok(())
}

pub(crate) fn cmd_delete(workspace: &Workspace, id: u64, out: Printer) -> Result<(), String> {
    let store = workspace.store()?;
    store.delete(id).map_err(|e| e.to_string())?;
    out.emit(&serde_json::json!({ "deleted": id }), || {
        format!("deleted snapshot {}", id)
    });
    Ok(())
}

pub(crate) fn cmd_chain(
    workspace: &Workspace,
    project: &str,
    facility: &str,
    out: Printer,
) -> Result<(), String> {
    let store = workspace.store()?;
    let subject = SubjectKey::new(project, facility);
    let report = store.verify_chain(&subject).map_err(|e| e.to_string())?;
    out.emit(&report, || match &report.broken {
        None => format!(
            "chain {} intact ({} snapshots, head {})",
            report.subject,
            report.length,
            report.head.as_deref().map(short).unwrap_or("-")
        ),
        Some(b) => format!(
            "chain {} broken at snapshot {} ({:?}): expected {}, found {}",
            report.subject,
            b.snapshot_id,
            b.kind,
            b.expected.as_deref().unwrap_or("-"),
            b.actual.as_deref().unwrap_or("-")
        ),
    });
    if report.is_intact() {
        Ok(())
    } else {
        Err(format!("hash chain of {} is broken", subject))
    }
}
