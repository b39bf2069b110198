//! Lineage graph of one snapshot:
//! datasets → input bundle → factor set → calculation → compliance.

use mrv_core::{hash, InputBundle, ResultBundle};
use serde::{Deserialize, Serialize};

use crate::error::EvidenceError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Dataset,
    InputBundle,
    FactorSet,
    Methodology,
    Calculation,
    Compliance,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineageNode {
    pub id: String,
    pub kind: NodeKind,
    pub label: String,
    /// Content hash of what the node stands for.
    pub sha256: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineageEdge {
    pub from: String,
    pub to: String,
    pub relation: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lineage {
    pub snapshot_id: u64,
    pub nodes: Vec<LineageNode>,
    pub edges: Vec<LineageEdge>,
}

impl Lineage {
    pub fn build(
        snapshot_id: u64,
        input: &InputBundle,
        result: &ResultBundle,
    ) -> Result<Self, EvidenceError> {
        let mut lineage = Lineage {
            snapshot_id,
            nodes: Vec::new(),
            edges: Vec::new(),
        };
        let input_id = "input_bundle".to_string();

        for (kind, dataset) in &input.activity_snapshot_ref {
            let id = format!("dataset:{}", kind);
            let label = match &dataset.uri {
                Some(uri) => format!("{} ({} rows, {})", kind, dataset.rows, uri),
                None => format!("{} ({} rows)", kind, dataset.rows),
            };
            lineage.node(&id, NodeKind::Dataset, label, dataset.sha256.clone());
            lineage.edge(&id, &input_id, "recorded_in");
        }

        lineage.node(
            &input_id,
            NodeKind::InputBundle,
            format!("{} / {}", input.subject(), input.engine_version),
            input.input_bundle_hash()?,
        );

        lineage.node(
            "factor_set",
            NodeKind::FactorSet,
            format!("{} factors", input.factors.len()),
            hash(&input.canonical_form().factors)?,
        );
        lineage.edge(&input_id, "factor_set", "pins");

        if let Some(methodology) = &input.methodology {
            lineage.node(
                "methodology",
                NodeKind::Methodology,
                methodology.id.clone(),
                hash(methodology)?,
            );
            lineage.edge(&input_id, "methodology", "follows");
            lineage.edge("methodology", "calculation", "governs");
        }

        lineage.node(
            "calculation",
            NodeKind::Calculation,
            format!("facility {} tCO2e", result.content.totals.facility_tco2e),
            result.result_hash.clone(),
        );
        lineage.edge("factor_set", "calculation", "feeds");

        lineage.node(
            "compliance",
            NodeKind::Compliance,
            format!(
                "{} checks, {}",
                result.content.compliance_checks.len(),
                result.content.compliance_status
            ),
            hash(&result.content.compliance_checks)?,
        );
        lineage.edge("calculation", "compliance", "evaluated_by");

        Ok(lineage)
    }

    fn node(&mut self, id: &str, kind: NodeKind, label: String, sha256: String) {
        self.nodes.push(LineageNode {
            id: id.to_string(),
            kind,
            label,
            sha256,
        });
    }

    fn edge(&mut self, from: &str, to: &str, relation: &str) {
        self.edges.push(LineageEdge {
            from: from.to_string(),
            to: to.to_string(),
            relation: relation.to_string(),
        });
    }
}
