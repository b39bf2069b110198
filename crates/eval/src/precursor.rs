//! Precursor (supply-chain) embedded emissions.
//!
//! Material rows form a directed graph with an edge from each precursor to
//! the product that consumes it. Nodes are visited in topological order
//! (Kahn's algorithm, lexicographic tie-break) so that in chain mode a
//! precursor's own intensity is final before anything consumes it. Nodes on
//! or behind a cycle never reach in-degree zero; they are reported, resolved
//! without chain values, and flagged.

use std::collections::{BTreeMap, BTreeSet};

use mrv_core::breakdown::{
    EmbeddedSource, PrecursorEdgeLine, PrecursorMode, PrecursorReport, UnitConversion,
};
use mrv_core::canonical::indexed_by_canonical;
use mrv_core::numeric::{self, Quotient};
use mrv_core::{FactorKind, MaterialRow, QaFlag, Severity};
use rust_decimal::Decimal;
use serde_json::json;

use crate::allocation::Allocation;
use crate::error::RunError;
use crate::factors::{precursor_factor_to_t_per_unit, FactorResolver};

pub const PRECURSOR_CYCLE: &str = "DQ.PRECURSOR.CYCLE";
pub const PRECURSOR_UNRESOLVED: &str = "DQ.PRECURSOR.UNRESOLVED";
pub const PRECURSOR_UNPRODUCED: &str = "DQ.PRECURSOR.UNPRODUCED";

/// Topological order of a graph and the nodes left over by a cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TopoOrder {
    pub order: Vec<String>,
    pub cycle_nodes: Vec<String>,
}

/// Kahn's algorithm over `(from, to)` edges.
///
/// Ready nodes are taken in lexicographic order. Terminates on any input;
/// every node that never reaches in-degree zero lands in `cycle_nodes`.
pub fn topological_order<'a, I>(edges: I) -> TopoOrder
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut successors: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
    let mut indegree: BTreeMap<&str, usize> = BTreeMap::new();
    for (from, to) in edges {
        indegree.entry(from).or_insert(0);
        indegree.entry(to).or_insert(0);
        if successors.entry(from).or_default().insert(to) {
            *indegree.entry(to).or_insert(0) += 1;
        }
    }

    let mut ready: BTreeSet<&str> = indegree
        .iter()
        .filter(|(_, d)| **d == 0)
        .map(|(n, _)| *n)
        .collect();
    let mut order = Vec::with_capacity(indegree.len());
    while let Some(node) = ready.pop_first() {
        order.push(node.to_string());
        for next in successors.get(node).into_iter().flatten() {
            if let Some(d) = indegree.get_mut(next) {
                *d -= 1;
                if *d == 0 {
                    ready.insert(*next);
                }
            }
        }
    }

    let cycle_nodes = indegree
        .iter()
        .filter(|(_, d)| **d > 0)
        .map(|(n, _)| n.to_string())
        .collect();
    TopoOrder { order, cycle_nodes }
}

/// Outcome of precursor resolution.
#[derive(Debug, Clone, Default)]
pub struct PrecursorOutcome {
    pub report: PrecursorReport,
    /// Resolved precursor tCO2e per consuming product.
    pub precursor_by_product: BTreeMap<String, Decimal>,
    pub unit_conversions: Vec<UnitConversion>,
    pub flags: Vec<QaFlag>,
}

/// Resolve every material row into an embedded value.
///
/// Per edge, the first available source wins: explicit tCO2e, explicit
/// intensity times quantity, an approved precursor factor times quantity,
/// and in chain mode the precursor's computed intensity times quantity.
/// An edge with none of these is unresolved and flagged.
pub fn resolve(
    materials: &[MaterialRow],
    mode: PrecursorMode,
    allocations: &BTreeMap<String, Allocation>,
    factors: &mut FactorResolver<'_>,
) -> Result<PrecursorOutcome, RunError> {
    let mut outcome = PrecursorOutcome {
        report: PrecursorReport {
            mode,
            ..PrecursorReport::default()
        },
        ..PrecursorOutcome::default()
    };
    if materials.is_empty() {
        return Ok(outcome);
    }

    let rows = indexed_by_canonical(materials)?;

    let topo = topological_order(
        rows.iter()
            .map(|(_, r)| (r.precursor_code.as_str(), r.product_code.as_str())),
    );
    tracing::debug!(
        nodes = topo.order.len() + topo.cycle_nodes.len(),
        cycle_nodes = topo.cycle_nodes.len(),
        "precursor graph ordered"
    );

    let mut lines: Vec<Option<PrecursorEdgeLine>> = vec![None; rows.len()];
    let mut intensities: BTreeMap<String, Quotient> = BTreeMap::new();

    for node in topo.order.iter().chain(topo.cycle_nodes.iter()) {
        let mut node_total = Decimal::ZERO;
        for (slot, (index, row)) in rows.iter().enumerate() {
            if row.product_code != *node {
                continue;
            }
            let line = resolve_edge(*index, row, mode, &intensities, factors, &mut outcome)?;
            if let Some(v) = line.embedded_tco2e {
                node_total = numeric::add(node_total, v)?;
            }
            lines[slot] = Some(line);
        }

        let has_edges = rows.iter().any(|(_, r)| r.product_code == *node);
        if has_edges {
            outcome
                .precursor_by_product
                .insert(node.clone(), node_total);
            if !allocations.contains_key(node) {
                outcome.flags.push(
                    QaFlag::new(
                        PRECURSOR_UNPRODUCED,
                        Severity::Warn,
                        format!(
                            "product {} consumes precursors but has no production in the period",
                            node
                        ),
                    )
                    .with_context("product_code", json!(node)),
                );
            }
        }
        // cycle nodes never feed chain values
        let ordered = !topo.cycle_nodes.contains(node);
        if let (true, Some(allocation)) = (ordered, allocations.get(node)) {
            intensities.insert(node.clone(), allocation.intensity(node_total)?);
        }
    }

    if !topo.cycle_nodes.is_empty() {
        tracing::warn!(cycle_nodes = ?topo.cycle_nodes, "precursor graph contains a cycle");
        outcome.flags.push(
            QaFlag::new(
                PRECURSOR_CYCLE,
                Severity::Warn,
                format!(
                    "precursor graph contains a cycle; {} node(s) could not be ordered",
                    topo.cycle_nodes.len()
                ),
            )
            .with_context("cycle_nodes", json!(topo.cycle_nodes)),
        );
    }

    outcome.report.edges = lines.into_iter().flatten().collect();
    outcome.report.order = topo.order;
    outcome.report.cycle_nodes = topo.cycle_nodes;
    Ok(outcome)
}

fn resolve_edge(
    index: usize,
    row: &MaterialRow,
    mode: PrecursorMode,
    intensities: &BTreeMap<String, Quotient>,
    factors: &mut FactorResolver<'_>,
    outcome: &mut PrecursorOutcome,
) -> Result<PrecursorEdgeLine, RunError> {
    let mut line = PrecursorEdgeLine {
        product_code: row.product_code.clone(),
        precursor_code: row.precursor_code.clone(),
        quantity: row.quantity,
        unit: row.unit.clone(),
        source: EmbeddedSource::Unresolved,
        embedded_tco2e: None,
        factor_ref: None,
    };

    if let Some(v) = row.embedded_tco2e {
        line.source = EmbeddedSource::Explicit;
        line.embedded_tco2e = Some(v);
        return Ok(line);
    }
    if let Some(intensity) = row.embedded_intensity {
        line.source = EmbeddedSource::ExplicitIntensity;
        line.embedded_tco2e = Some(numeric::mul(intensity, row.quantity)?);
        return Ok(line);
    }
    if factors.has_default(FactorKind::Precursor, &row.precursor_code) {
        let factor = factors.resolve(
            &format!("materials[{}].factor", index),
            FactorKind::Precursor,
            &row.precursor_code,
            None,
        )?;
        let (m, note) = precursor_factor_to_t_per_unit(&factor.subject, &factor.unit);
        outcome.unit_conversions.extend(note);
        line.source = EmbeddedSource::Factor;
        line.embedded_tco2e = Some(numeric::product(&[factor.value, m, row.quantity])?);
        line.factor_ref = Some(factor.key());
        return Ok(line);
    }
    if mode == PrecursorMode::Chain {
        if let Some(Quotient::Value(intensity)) = intensities.get(&row.precursor_code) {
            line.source = EmbeddedSource::Chain;
            line.embedded_tco2e = Some(numeric::mul(*intensity, row.quantity)?);
            return Ok(line);
        }
    }

    outcome.flags.push(
        QaFlag::new(
            PRECURSOR_UNRESOLVED,
            Severity::Warn,
            format!(
                "embedded emissions of precursor {} consumed by {} could not be determined",
                row.precursor_code, row.product_code
            ),
        )
        .with_context("product_code", json!(row.product_code))
        .with_context("precursor_code", json!(row.precursor_code)),
    );
    Ok(line)
}
