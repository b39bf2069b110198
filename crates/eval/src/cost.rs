//! ETS and CBAM cost outputs. Pure functions of computed totals and prices.

use mrv_core::breakdown::{CbamCost, CostOutputs, EtsCost, Totals};
use mrv_core::numeric::{self, canonical_string};
use mrv_core::PriceRef;
use rust_decimal::Decimal;

use crate::config::EtsConfig;
use crate::error::RunError;

/// Reject prices that cannot produce a meaningful cost.
pub fn validate_prices(prices: &PriceRef) -> Result<(), RunError> {
    let named = [
        ("prices.carbon_price_eur_per_t", Some(prices.carbon_price_eur_per_t)),
        ("prices.cbam_price_eur_per_t", prices.cbam_price_eur_per_t),
    ];
    for (field, value) in named {
        if let Some(v) = value {
            if v.is_sign_negative() && !v.is_zero() {
                return Err(RunError::NegativeQuantity {
                    field: field.to_string(),
                    value: canonical_string(v),
                });
            }
        }
    }
    if prices.fx_rate <= Decimal::ZERO {
        return Err(RunError::InvalidConfig(format!(
            "prices.fx_rate must be positive, got {}",
            canonical_string(prices.fx_rate)
        )));
    }
    Ok(())
}

/// ETS net position: `payable = max(covered - allowances, 0)`.
pub fn ets_cost(totals: &Totals, ets: &EtsConfig, prices: &PriceRef) -> Result<EtsCost, RunError> {
    let mut covered = numeric::add(totals.direct_tco2e, totals.process_tco2e)?;
    if ets.include_indirect {
        covered = numeric::add(covered, totals.indirect_tco2e)?;
    }
    let allowances = numeric::add(ets.free_allocation_tco2e, ets.banked_tco2e)?;
    let payable = numeric::sub(covered, allowances)?.max(Decimal::ZERO);
    let cost_eur = numeric::mul(payable, prices.carbon_price_eur_per_t)?;

    Ok(EtsCost {
        covered_tco2e: covered,
        free_allocation_tco2e: ets.free_allocation_tco2e,
        banked_tco2e: ets.banked_tco2e,
        payable_tco2e: payable,
        price_eur_per_t: prices.carbon_price_eur_per_t,
        cost_eur,
        cost_local: numeric::mul(cost_eur, prices.fx_rate)?,
    })
}

/// CBAM certificate cost for the exported quantities, plus the
/// facility-level estimate over all embedded emissions.
pub fn cbam_cost(totals: &Totals, prices: &PriceRef) -> Result<CbamCost, RunError> {
    let price = prices.cbam_price();
    let certificate_cost_eur = numeric::mul(totals.export_embedded_tco2e, price)?;
    Ok(CbamCost {
        price_eur_per_t: price,
        embedded_tco2e: totals.embedded_tco2e,
        facility_estimate_eur: numeric::mul(totals.embedded_tco2e, price)?,
        export_embedded_tco2e: totals.export_embedded_tco2e,
        certificate_cost_eur,
        certificate_cost_local: numeric::mul(certificate_cost_eur, prices.fx_rate)?,
    })
}

pub fn cost_outputs(
    totals: &Totals,
    ets: &EtsConfig,
    prices: &PriceRef,
) -> Result<CostOutputs, RunError> {
    Ok(CostOutputs {
        currency: prices.local_currency.clone(),
        fx_rate: prices.fx_rate,
        ets: ets_cost(totals, ets, prices)?,
        cbam: cbam_cost(totals, prices)?,
    })
}
