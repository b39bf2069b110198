//! Input validation and data-quality checks.
//!
//! [`validate`] rejects activity data that cannot be computed at all.
//! [`data_quality_flags`] records softer findings as QA flags; a run with
//! flags still completes.

use std::collections::BTreeSet;

use mrv_core::canonical::sorted_by_canonical;
use mrv_core::numeric::canonical_string;
use mrv_core::{ActivityData, MonitoringPlanRef, ProductMapping, QaFlag, Severity};
use rust_decimal::Decimal;
use serde_json::json;

use crate::error::RunError;

pub const MONTHS_MISMATCH: &str = "DQ.COMP.MONTHS.MATCH";
pub const FUEL_ZERO_QUANTITY: &str = "DQ.FUEL.ZERO_QTY";
pub const PRODUCT_ZERO_QUANTITY: &str = "DQ.PRODUCTION.ZERO_QTY";
pub const EXPORT_UNMAPPED: &str = "DQ.EXPORT.UNMAPPED";
pub const ENERGY_SPIKE: &str = "DQ.ANOM.ENERGY.SPIKE";
pub const PRODUCTION_SPIKE: &str = "DQ.ANOM.PRODUCTION.SPIKE";
pub const NO_MONITORING_PLAN: &str = "QA_NO_MONITORING_PLAN";

/// Minimum number of rows before spike detection applies.
const SPIKE_MIN_ROWS: usize = 6;
/// A maximum above this multiple of the median is a spike.
const SPIKE_RATIO: i64 = 5;

/// Reject negative quantities and rows that belong to another facility.
pub fn validate(activity: &ActivityData, facility_id: &str) -> Result<(), RunError> {
    let facility_rows = activity
        .fuel
        .iter()
        .enumerate()
        .map(|(i, r)| (format!("fuel[{}]", i), &r.facility_id, r.quantity))
        .chain(
            activity
                .electricity
                .iter()
                .enumerate()
                .map(|(i, r)| (format!("electricity[{}]", i), &r.facility_id, r.quantity)),
        )
        .chain(
            activity
                .process
                .iter()
                .enumerate()
                .map(|(i, r)| (format!("process[{}]", i), &r.facility_id, r.quantity)),
        )
        .chain(
            activity
                .production
                .iter()
                .enumerate()
                .map(|(i, r)| (format!("production[{}]", i), &r.facility_id, r.quantity)),
        );

    for (path, row_facility, quantity) in facility_rows {
        if row_facility != facility_id {
            return Err(RunError::ForeignFacility {
                field: format!("{}.facility_id", path),
                expected: facility_id.to_string(),
                actual: row_facility.clone(),
            });
        }
        non_negative(&path, quantity)?;
    }

    for (i, row) in activity.materials.iter().enumerate() {
        let path = format!("materials[{}]", i);
        non_negative(&path, row.quantity)?;
        if let Some(v) = row.embedded_tco2e {
            non_negative_field(&format!("{}.embedded_tco2e", path), v)?;
        }
        if let Some(v) = row.embedded_intensity {
            non_negative_field(&format!("{}.embedded_intensity", path), v)?;
        }
    }
    for (i, row) in activity.exports.iter().enumerate() {
        non_negative(&format!("exports[{}]", i), row.quantity)?;
    }
    Ok(())
}

fn non_negative(path: &str, quantity: Decimal) -> Result<(), RunError> {
    non_negative_field(&format!("{}.quantity", path), quantity)
}

fn non_negative_field(field: &str, value: Decimal) -> Result<(), RunError> {
    if value.is_sign_negative() && !value.is_zero() {
        return Err(RunError::NegativeQuantity {
            field: field.to_string(),
            value: canonical_string(value),
        });
    }
    Ok(())
}

/// Data-quality findings over already-validated activity data.
///
/// A row is named by its position in the canonically ordered dataset, so
/// the flags do not depend on the order rows were supplied in.
pub fn data_quality_flags(
    activity: &ActivityData,
    mappings: &[ProductMapping],
) -> Result<Vec<QaFlag>, RunError> {
    let mut flags = Vec::new();
    month_completeness(activity, &mut flags);

    for (i, row) in sorted_by_canonical(&activity.fuel)?.into_iter().enumerate() {
        if row.quantity.is_zero() {
            flags.push(
                QaFlag::new(
                    FUEL_ZERO_QUANTITY,
                    Severity::Info,
                    format!("fuel row {} ({}) has zero quantity and was skipped", i, row.fuel_type),
                )
                .with_context("row", json!(i))
                .with_context("fuel_type", json!(row.fuel_type)),
            );
        }
    }

    let zero_products: BTreeSet<&str> = activity
        .production
        .iter()
        .map(|r| r.product_code.as_str())
        .filter(|code| {
            activity
                .production
                .iter()
                .filter(|r| r.product_code == *code)
                .all(|r| r.quantity.is_zero())
        })
        .collect();
    for code in zero_products {
        flags.push(
            QaFlag::new(
                PRODUCT_ZERO_QUANTITY,
                Severity::Warn,
                format!("product {} has zero production; its intensity is undefined", code),
            )
            .with_context("product_code", json!(code)),
        );
    }

    let mapped: BTreeSet<&str> = mappings.iter().map(|m| m.product_code.as_str()).collect();
    let unmapped: BTreeSet<&str> = activity
        .exports
        .iter()
        .filter(|r| r.cn_code.is_none() && !mapped.contains(r.product_code.as_str()))
        .map(|r| r.product_code.as_str())
        .collect();
    for code in unmapped {
        flags.push(
            QaFlag::new(
                EXPORT_UNMAPPED,
                Severity::Warn,
                format!("exported product {} has no CN code mapping", code),
            )
            .with_context("product_code", json!(code)),
        );
    }

    let energy: Vec<Decimal> = activity
        .fuel
        .iter()
        .map(|r| r.quantity)
        .chain(activity.electricity.iter().map(|r| r.quantity))
        .collect();
    if let Some(flag) = spike(ENERGY_SPIKE, "energy", energy) {
        flags.push(flag);
    }
    let production: Vec<Decimal> = activity.production.iter().map(|r| r.quantity).collect();
    if let Some(flag) = spike(PRODUCTION_SPIKE, "production", production) {
        flags.push(flag);
    }

    Ok(flags)
}

/// A run without a monitoring plan cannot be verified.
pub fn monitoring_plan_flag(plan: Option<&MonitoringPlanRef>) -> Option<QaFlag> {
    match plan {
        Some(_) => None,
        None => Some(
            QaFlag::new(
                NO_MONITORING_PLAN,
                Severity::Fail,
                "no monitoring plan referenced; the ETS verification record is incomplete",
            )
            .with_context("reg_reference", json!("2018/2066")),
        ),
    }
}

fn month_completeness(activity: &ActivityData, flags: &mut Vec<QaFlag>) {
    let energy_months: BTreeSet<&str> = activity
        .fuel
        .iter()
        .filter_map(|r| r.month.as_deref())
        .chain(activity.electricity.iter().filter_map(|r| r.month.as_deref()))
        .collect();
    let production_months: BTreeSet<&str> = activity
        .production
        .iter()
        .filter_map(|r| r.month.as_deref())
        .collect();
    if energy_months.is_empty() || production_months.is_empty() {
        return;
    }

    let missing_in_energy: Vec<&str> = production_months
        .difference(&energy_months)
        .copied()
        .collect();
    let missing_in_production: Vec<&str> = energy_months
        .difference(&production_months)
        .copied()
        .collect();
    if missing_in_energy.is_empty() && missing_in_production.is_empty() {
        return;
    }
    flags.push(
        QaFlag::new(
            MONTHS_MISMATCH,
            Severity::Warn,
            "energy and production data cover different months",
        )
        .with_context("missing_in_energy", json!(missing_in_energy))
        .with_context("missing_in_production", json!(missing_in_production)),
    );
}

fn spike(flag_id: &str, label: &str, mut values: Vec<Decimal>) -> Option<QaFlag> {
    if values.len() < SPIKE_MIN_ROWS {
        return None;
    }
    values.sort();
    let mid = values.len() / 2;
    let median = if values.len() % 2 == 0 {
        (values[mid - 1].checked_add(values[mid])?).checked_div(Decimal::TWO)?
    } else {
        values[mid]
    };
    let max = *values.last()?;
    if median <= Decimal::ZERO || max <= median.checked_mul(Decimal::from(SPIKE_RATIO))? {
        return None;
    }
    Some(
        QaFlag::new(
            flag_id,
            Severity::Warn,
            format!("{} quantity spike: maximum exceeds {}x the median", label, SPIKE_RATIO),
        )
        .with_context("median_quantity", json!(canonical_string(median)))
        .with_context("max_quantity", json!(canonical_string(max))),
    )
}
