//! Mass-share allocation of facility emissions to products, per-product
//! intensity, and embedded emissions of export lines.

use std::collections::BTreeMap;

use mrv_core::breakdown::{ExportLine, ProductLine};
use mrv_core::canonical::indexed_by_canonical;
use mrv_core::numeric::{self, canonical_string, Quotient};
use mrv_core::{ExportRow, ProductMapping, ProductionRow};
use rust_decimal::Decimal;

use crate::error::RunError;

/// Facility emissions attributed to one product.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Allocation {
    pub product_code: String,
    pub quantity: Decimal,
    pub share: Decimal,
    pub allocated_tco2e: Decimal,
}

impl Allocation {
    /// `(allocated + precursor) / quantity`; undefined at zero quantity.
    pub fn intensity(&self, precursor_tco2e: Decimal) -> Result<Quotient, RunError> {
        let embedded = numeric::add(self.allocated_tco2e, precursor_tco2e)?;
        Ok(numeric::ratio(embedded, self.quantity)?)
    }
}

/// Distribute `facility_tco2e` over products by mass share.
///
/// Production rows are summed per product code and processed in code order.
/// Every product but the last one with positive quantity gets
/// `facility * qty / total`; that last one takes the exact residual so the
/// allocations always sum to `facility_tco2e`.
///
/// No production rows at all yields no allocations. Rows whose total is
/// zero or negative are an error.
pub fn allocate(
    production: &[ProductionRow],
    facility_tco2e: Decimal,
) -> Result<BTreeMap<String, Allocation>, RunError> {
    if production.is_empty() {
        return Ok(BTreeMap::new());
    }

    let mut quantities: BTreeMap<&str, Decimal> = BTreeMap::new();
    for row in production {
        let entry = quantities.entry(row.product_code.as_str()).or_default();
        *entry = numeric::add(*entry, row.quantity)?;
    }
    let total = numeric::sum(quantities.values().copied())?;
    if total <= Decimal::ZERO {
        return Err(RunError::NonPositiveProduction {
            total: canonical_string(total),
        });
    }

    let residual_owner = quantities
        .iter()
        .rev()
        .find(|(_, qty)| **qty > Decimal::ZERO)
        .map(|(code, _)| *code);

    let mut allocations = BTreeMap::new();
    let mut assigned = Decimal::ZERO;
    for (code, qty) in &quantities {
        if Some(*code) == residual_owner {
            continue;
        }
        let share = quotient_value(numeric::ratio(*qty, total)?);
        let allocated = quotient_value(numeric::ratio(numeric::mul(facility_tco2e, *qty)?, total)?);
        assigned = numeric::add(assigned, allocated)?;
        allocations.insert(
            code.to_string(),
            Allocation {
                product_code: code.to_string(),
                quantity: *qty,
                share,
                allocated_tco2e: allocated,
            },
        );
    }
    if let Some(code) = residual_owner {
        let qty = quantities.get(code).copied().unwrap_or_default();
        allocations.insert(
            code.to_string(),
            Allocation {
                product_code: code.to_string(),
                quantity: qty,
                share: quotient_value(numeric::ratio(qty, total)?),
                allocated_tco2e: numeric::sub(facility_tco2e, assigned)?,
            },
        );
    }
    Ok(allocations)
}

// total > 0 is checked before any ratio is taken
fn quotient_value(q: Quotient) -> Decimal {
    q.value().unwrap_or(Decimal::ZERO)
}

fn cn_code<'a>(mappings: &'a [ProductMapping], product_code: &str) -> Option<&'a str> {
    mappings
        .iter()
        .filter(|m| m.product_code == product_code)
        .map(|m| m.cn_code.as_str())
        .min()
}

/// Product lines in product-code order.
pub fn product_lines(
    allocations: &BTreeMap<String, Allocation>,
    precursor_by_product: &BTreeMap<String, Decimal>,
    mappings: &[ProductMapping],
) -> Result<Vec<ProductLine>, RunError> {
    allocations
        .values()
        .map(|a| {
            let precursor = precursor_by_product
                .get(&a.product_code)
                .copied()
                .unwrap_or_default();
            Ok(ProductLine {
                product_code: a.product_code.clone(),
                cn_code: cn_code(mappings, &a.product_code).map(str::to_string),
                quantity: a.quantity,
                share: a.share,
                allocated_tco2e: a.allocated_tco2e,
                precursor_tco2e: precursor,
                embedded_tco2e: numeric::add(a.allocated_tco2e, precursor)?,
                intensity: a.intensity(precursor)?,
            })
        })
        .collect()
}

/// Embedded emissions and certificate cost of every export row.
///
/// An export of a product without a computed intensity is an input error;
/// it is never treated as zero.
pub fn export_lines(
    exports: &[ExportRow],
    products: &[ProductLine],
    mappings: &[ProductMapping],
    price_eur_per_t: Decimal,
) -> Result<Vec<ExportLine>, RunError> {
    let indexed = indexed_by_canonical(exports)?;

    let mut lines = Vec::with_capacity(exports.len());
    for (index, row) in indexed {
        let field = format!("exports[{}].product_code", index);
        let product = products
            .iter()
            .find(|p| p.product_code == row.product_code)
            .ok_or_else(|| RunError::MissingIntensity {
                field: field.clone(),
                product_code: row.product_code.clone(),
            })?;
        let intensity = product
            .intensity
            .value()
            .ok_or_else(|| RunError::UndefinedIntensity {
                field,
                product_code: row.product_code.clone(),
            })?;
        let embedded = numeric::mul(intensity, row.quantity)?;
        lines.push(ExportLine {
            product_code: row.product_code.clone(),
            cn_code: row
                .cn_code
                .clone()
                .or_else(|| cn_code(mappings, &row.product_code).map(str::to_string)),
            destination: row.destination.clone(),
            quantity: row.quantity,
            intensity,
            embedded_tco2e: embedded,
            certificate_cost_eur: numeric::mul(embedded, price_eur_per_t)?,
            actual_data: row.actual_data,
        });
    }
    Ok(lines)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn production(code: &str, qty: &str) -> ProductionRow {
        ProductionRow {
            facility_id: "F1".to_string(),
            month: None,
            product_code: code.to_string(),
            quantity: dec(qty),
            unit: "t".to_string(),
        }
    }

    fn export(code: &str, qty: &str) -> ExportRow {
        ExportRow {
            product_code: code.to_string(),
            cn_code: None,
            quantity: dec(qty),
            unit: "t".to_string(),
            destination: Some("DE".to_string()),
            actual_data: Some(true),
        }
    }

    #[test]
    fn mass_share_splits_exactly() {
        let rows = vec![production("A", "600"), production("B", "400")];
        let alloc = allocate(&rows, dec("100")).unwrap();
        assert_eq!(alloc["A"].allocated_tco2e, dec("60"));
        assert_eq!(alloc["B"].allocated_tco2e, dec("40"));
        assert_eq!(alloc["A"].share, dec("0.6"));
    }

    #[test]
    fn allocations_sum_to_facility_total() {
        let rows = vec![
            production("A", "1"),
            production("B", "1"),
            production("C", "1"),
            production("D", "0"),
        ];
        let alloc = allocate(&rows, dec("100")).unwrap();
        let total = numeric::sum(alloc.values().map(|a| a.allocated_tco2e)).unwrap();
        assert_eq!(total, dec("100"));
        assert_eq!(alloc["D"].allocated_tco2e, Decimal::ZERO);
        assert!(alloc["D"].intensity(Decimal::ZERO).unwrap().is_undefined());
    }

    #[test]
    fn rows_of_one_product_are_summed() {
        let rows = vec![production("A", "250"), production("A", "350"), production("B", "400")];
        let alloc = allocate(&rows, dec("100")).unwrap();
        assert_eq!(alloc["A"].quantity, dec("600"));
        assert_eq!(alloc["A"].allocated_tco2e, dec("60"));
    }

    #[test]
    fn zero_production_total_is_an_error() {
        let rows = vec![production("A", "0")];
        let err = allocate(&rows, dec("100")).unwrap_err();
        assert!(matches!(err, RunError::NonPositiveProduction { ref total } if total == "0"));
        assert!(allocate(&[], dec("100")).unwrap().is_empty());
    }

    #[test]
    fn export_embedded_and_certificate_cost() {
        let rows = vec![production("A", "1000")];
        let alloc = allocate(&rows, dec("100")).unwrap();
        let products = product_lines(&alloc, &BTreeMap::new(), &[]).unwrap();
        assert_eq!(products[0].intensity, Quotient::Value(dec("0.1")));

        let lines = export_lines(&[export("A", "200")], &products, &[], dec("80")).unwrap();
        assert_eq!(lines[0].embedded_tco2e, dec("20"));
        assert_eq!(lines[0].certificate_cost_eur, dec("1600"));
    }

    #[test]
    fn precursor_emissions_raise_intensity() {
        let alloc = allocate(&[production("A", "100")], dec("10")).unwrap();
        let precursor = BTreeMap::from([("A".to_string(), dec("5"))]);
        let mapping = ProductMapping {
            product_code: "A".to_string(),
            cn_code: "7208".to_string(),
            product_name: "Flat-rolled steel".to_string(),
        };
        let products = product_lines(&alloc, &precursor, &[mapping]).unwrap();
        assert_eq!(products[0].embedded_tco2e, dec("15"));
        assert_eq!(products[0].intensity, Quotient::Value(dec("0.15")));
        assert_eq!(products[0].cn_code.as_deref(), Some("7208"));
    }

    #[test]
    fn export_of_unproduced_product_fails() {
        let alloc = allocate(&[production("A", "1")], dec("1")).unwrap();
        let products = product_lines(&alloc, &BTreeMap::new(), &[]).unwrap();
        let err = export_lines(&[export("Z", "1")], &products, &[], dec("80")).unwrap_err();
        assert_eq!(
            err.to_string(),
            "exports[0].product_code: product 'Z' has no computed intensity"
        );
    }

    #[test]
    fn export_of_zero_quantity_product_fails() {
        let alloc = allocate(&[production("A", "1"), production("B", "0")], dec("1")).unwrap();
        let products = product_lines(&alloc, &BTreeMap::new(), &[]).unwrap();
        let err = export_lines(&[export("B", "1")], &products, &[], dec("80")).unwrap_err();
        assert!(matches!(err, RunError::UndefinedIntensity { .. }));
    }

    #[test]
    fn export_line_order_follows_row_content() {
        let alloc = allocate(&[production("A", "1000")], dec("100")).unwrap();
        let products = product_lines(&alloc, &BTreeMap::new(), &[]).unwrap();
        let mut defaults = export("A", "200");
        defaults.actual_data = Some(false);
        let rows = vec![export("A", "200"), defaults];
        let mut reversed = rows.clone();
        reversed.reverse();

        let a = export_lines(&rows, &products, &[], dec("80")).unwrap();
        let b = export_lines(&reversed, &products, &[], dec("80")).unwrap();
        assert_eq!(a, b);
        assert_ne!(a[0].actual_data, a[1].actual_data);
    }
}
