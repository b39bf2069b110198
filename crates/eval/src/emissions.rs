//! Direct, indirect and process emissions.
//!
//! Rows are ordered by their canonical encoding before any arithmetic, so
//! the summation order and the order of the lines depend only on row
//! content. Each line carries the factors it used. Field paths name a row by
//! its index in the slice passed in.

use mrv_core::breakdown::{ElectricityLine, FuelLine, ProcessLine, UnitConversion};
use mrv_core::canonical::indexed_by_canonical;
use mrv_core::numeric::{self, canonical_string};
use mrv_core::{
    ActivityData, ElectricityRow, FactorKind, FuelRow, ProcessRow, Scenario,
};
use rust_decimal::Decimal;

use crate::config::{ElectricityMethod, EngineConfig};
use crate::error::RunError;
use crate::factors::{electricity_to_kwh, grid_factor_to_t_per_kwh, FactorResolver};

/// Itemized emissions of one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Emissions {
    pub fuel: Vec<FuelLine>,
    pub electricity: Vec<ElectricityLine>,
    pub process: Vec<ProcessLine>,
    pub direct_tco2e: Decimal,
    pub indirect_tco2e: Decimal,
    pub process_tco2e: Decimal,
    pub unit_conversions: Vec<UnitConversion>,
}

impl Emissions {
    /// direct + indirect + process.
    pub fn facility_tco2e(&self) -> Result<Decimal, RunError> {
        Ok(numeric::sum([
            self.direct_tco2e,
            self.indirect_tco2e,
            self.process_tco2e,
        ])?)
    }
}

/// Compute every emissions category.
pub fn compute(
    activity: &ActivityData,
    config: &EngineConfig,
    factors: &mut FactorResolver<'_>,
) -> Result<Emissions, RunError> {
    let mut out = Emissions::default();

    for (index, row) in indexed_by_canonical(&activity.fuel)? {
        if row.quantity.is_zero() {
            continue;
        }
        out.fuel.push(fuel_line(index, row, factors)?);
    }
    out.direct_tco2e = numeric::sum(out.fuel.iter().map(|l| l.tco2e))?;

    for (index, row) in indexed_by_canonical(&activity.electricity)? {
        let (line, notes) = electricity_line(index, row, config, factors)?;
        out.electricity.push(line);
        out.unit_conversions.extend(notes);
    }
    out.indirect_tco2e = numeric::sum(out.electricity.iter().map(|l| l.tco2e))?;

    for (index, row) in indexed_by_canonical(&activity.process)? {
        out.process.push(process_line(index, row, factors)?);
    }
    out.process_tco2e = numeric::sum(out.process.iter().map(|l| l.tco2e))?;

    Ok(out)
}

fn fuel_line(
    index: usize,
    row: &FuelRow,
    factors: &mut FactorResolver<'_>,
) -> Result<FuelLine, RunError> {
    let ncv = factors.resolve(
        &format!("fuel[{}].ncv", index),
        FactorKind::Ncv,
        &row.fuel_type,
        row.ncv_ref.as_ref(),
    )?;
    let ef = factors.resolve(
        &format!("fuel[{}].ef", index),
        FactorKind::Ef,
        &row.fuel_type,
        row.ef_ref.as_ref(),
    )?;
    let oxidation = factors.resolve(
        &format!("fuel[{}].oxidation", index),
        FactorKind::Oxidation,
        &row.fuel_type,
        row.oxidation_ref.as_ref(),
    )?;
    let tco2e = numeric::product(&[row.quantity, ncv.value, ef.value, oxidation.value])?;

    Ok(FuelLine {
        facility_id: row.facility_id.clone(),
        month: row.month.clone(),
        fuel_type: row.fuel_type.clone(),
        quantity: row.quantity,
        unit: row.unit.clone(),
        ncv: ncv.value,
        emission_factor: ef.value,
        oxidation_factor: oxidation.value,
        tco2e,
        ncv_ref: ncv.key(),
        ef_ref: ef.key(),
        oxidation_ref: oxidation.key(),
    })
}

fn electricity_line(
    index: usize,
    row: &ElectricityRow,
    config: &EngineConfig,
    factors: &mut FactorResolver<'_>,
) -> Result<(ElectricityLine, Vec<UnitConversion>), RunError> {
    let mut notes = Vec::new();
    let (to_kwh, note) = electricity_to_kwh(&format!("electricity[{}].unit", index), &row.unit)?;
    notes.extend(note);
    let kwh = numeric::mul(row.quantity, to_kwh)?;

    let method = config.electricity_method;
    let (grid_factor, grid_ref) = match (method, config.market_grid_factor_override) {
        (ElectricityMethod::Market, Some(kg_per_kwh)) => {
            let (m, note) = grid_factor_to_t_per_kwh(
                "config.market_grid_factor_override",
                method.as_str(),
                "kgCO2e/kWh",
            )?;
            notes.extend(note);
            (numeric::mul(kg_per_kwh, m)?, None)
        }
        _ => {
            let field = format!("electricity[{}].grid", index);
            let factor = factors.resolve(
                &field,
                FactorKind::Grid,
                method.as_str(),
                row.grid_ref.as_ref(),
            )?;
            let (m, note) = grid_factor_to_t_per_kwh(&field, &factor.subject, &factor.unit)?;
            notes.extend(note);
            (numeric::mul(factor.value, m)?, Some(factor.key()))
        }
    };

    let line = ElectricityLine {
        facility_id: row.facility_id.clone(),
        month: row.month.clone(),
        kwh,
        grid_factor,
        grid_method: method.as_str().to_string(),
        tco2e: numeric::mul(kwh, grid_factor)?,
        grid_ref,
    };
    Ok((line, notes))
}

fn process_line(
    index: usize,
    row: &ProcessRow,
    factors: &mut FactorResolver<'_>,
) -> Result<ProcessLine, RunError> {
    let factor = factors.resolve(
        &format!("process[{}].factor", index),
        FactorKind::Process,
        &row.process,
        row.factor_ref.as_ref(),
    )?;
    Ok(ProcessLine {
        facility_id: row.facility_id.clone(),
        month: row.month.clone(),
        process: row.process.clone(),
        quantity: row.quantity,
        unit: row.unit.clone(),
        factor: factor.value,
        tco2e: numeric::mul(row.quantity, factor.value)?,
        factor_ref: factor.key(),
    })
}

/// Apply a what-if scenario: scale fuel and electricity quantities by
/// `1 - energy_reduction_pct / 100`. The baseline returns the data unchanged.
pub fn apply_scenario(
    activity: &ActivityData,
    scenario: &Scenario,
) -> Result<ActivityData, RunError> {
    let pct = scenario.energy_reduction_pct;
    if pct.is_sign_negative() || pct > Decimal::ONE_HUNDRED {
        return Err(RunError::InvalidConfig(format!(
            "scenario.energy_reduction_pct must be between 0 and 100, got {}",
            canonical_string(pct)
        )));
    }
    let mut scaled = activity.clone();
    if scenario.is_baseline() {
        return Ok(scaled);
    }
    let fraction = numeric::ratio(pct, Decimal::ONE_HUNDRED)?
        .value()
        .unwrap_or(Decimal::ZERO);
    let multiplier = numeric::sub(Decimal::ONE, fraction)?;
    for row in &mut scaled.fuel {
        row.quantity = numeric::mul(row.quantity, multiplier)?;
    }
    for row in &mut scaled.electricity {
        row.quantity = numeric::mul(row.quantity, multiplier)?;
    }
    Ok(scaled)
}
