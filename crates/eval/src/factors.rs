//! Factor resolution and unit normalization.
//!
//! A row either names its factor explicitly (matched exactly) or gets the
//! default for `(kind, subject, region)`: the candidate with the latest
//! year, then the highest version. Versions compare with digit runs read as
//! numbers, so `v10` is newer than `v9`. Only approved factors are returned, and
//! only factors actually returned are recorded in the InputBundle.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use mrv_core::breakdown::{SourceReference, UnitConversion};
use mrv_core::{DatasetKind, FactorKey, FactorKind, FactorRef};
use rust_decimal::Decimal;

use crate::error::RunError;

/// Resolves factor references against the factors supplied with a request,
/// remembering which ones were used.
pub struct FactorResolver<'a> {
    available: &'a [FactorRef],
    region: &'a str,
    used: BTreeMap<FactorKey, FactorRef>,
}

impl<'a> FactorResolver<'a> {
    pub fn new(available: &'a [FactorRef], region: &'a str) -> Self {
        FactorResolver {
            available,
            region,
            used: BTreeMap::new(),
        }
    }

    /// Resolve the factor for `field`.
    ///
    /// `explicit` overrides the default lookup. Fails with a specific error
    /// when no factor matches, the match is unapproved, or two factors share
    /// the chosen identity with different contents.
    pub fn resolve(
        &mut self,
        field: &str,
        kind: FactorKind,
        subject: &str,
        explicit: Option<&FactorKey>,
    ) -> Result<FactorRef, RunError> {
        let key = match explicit {
            Some(key) => {
                if key.kind != kind {
                    return Err(RunError::FactorKindMismatch {
                        field: field.to_string(),
                        expected: kind.to_string(),
                        actual: key.to_string(),
                    });
                }
                key.clone()
            }
            None => self.default_key(field, kind, subject)?,
        };

        let mut matches = self.available.iter().filter(|f| f.matches(&key));
        let factor = matches.next().ok_or_else(|| RunError::MissingFactor {
            field: field.to_string(),
            key: key.to_string(),
        })?;
        if matches.any(|other| other != factor) {
            return Err(RunError::ConflictingFactor {
                field: field.to_string(),
                key: key.to_string(),
            });
        }
        if !factor.approved {
            return Err(RunError::UnapprovedFactor {
                field: field.to_string(),
                key: key.to_string(),
            });
        }

        self.used.insert(key, factor.clone());
        Ok(factor.clone())
    }

    /// Whether a default lookup for `(kind, subject)` has any candidate.
    pub fn has_default(&self, kind: FactorKind, subject: &str) -> bool {
        self.available
            .iter()
            .any(|f| f.kind == kind && f.subject == subject && f.region == self.region)
    }

    fn default_key(
        &self,
        field: &str,
        kind: FactorKind,
        subject: &str,
    ) -> Result<FactorKey, RunError> {
        self.available
            .iter()
            .filter(|f| f.kind == kind && f.subject == subject && f.region == self.region)
            .max_by(|a, b| {
                a.year
                    .cmp(&b.year)
                    .then_with(|| compare_versions(&a.version, &b.version))
            })
            .map(FactorRef::key)
            .ok_or_else(|| RunError::MissingFactor {
                field: field.to_string(),
                key: format!("{}:{}@{}/latest", kind, subject, self.region),
            })
    }

    /// Factors used so far, in canonical order.
    pub fn used(&self) -> Vec<FactorRef> {
        self.used.values().cloned().collect()
    }

    /// Source citations of every used factor.
    pub fn source_references(&self) -> Vec<SourceReference> {
        self.used
            .iter()
            .map(|(key, factor)| SourceReference {
                factor: key.clone(),
                unit: factor.unit.clone(),
                source: factor.source.clone(),
            })
            .collect()
    }
}

// ──────────────────────────────────────────────
// Units
// ──────────────────────────────────────────────

fn normalize_unit(unit: &str) -> String {
    unit.trim().to_ascii_lowercase().replace(' ', "")
}

fn conversion(
    dataset: DatasetKind,
    subject: &str,
    from_unit: &str,
    to_unit: &str,
    multiplier: Decimal,
) -> UnitConversion {
    UnitConversion {
        dataset,
        subject: subject.to_string(),
        from_unit: from_unit.to_string(),
        to_unit: to_unit.to_string(),
        multiplier,
    }
}

/// Order version labels, reading runs of ASCII digits as numbers.
///
/// Labels that only differ in leading zeros fall back to byte order, which
/// keeps the ordering total.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let (mut x, mut y) = (a.as_bytes(), b.as_bytes());
    loop {
        match (x.first(), y.first()) {
            (None, None) => return a.cmp(b),
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(cx), Some(cy)) if cx.is_ascii_digit() && cy.is_ascii_digit() => {
                let (nx, rest_x) = digit_run(x);
                let (ny, rest_y) = digit_run(y);
                let order = nx.len().cmp(&ny.len()).then_with(|| nx.cmp(ny));
                if order != Ordering::Equal {
                    return order;
                }
                x = rest_x;
                y = rest_y;
            }
            (Some(cx), Some(cy)) => {
                if cx != cy {
                    return cx.cmp(cy);
                }
                x = &x[1..];
                y = &y[1..];
            }
        }
    }
}

/// Leading digits without leading zeros, and the remainder.
fn digit_run(bytes: &[u8]) -> (&[u8], &[u8]) {
    let end = bytes
        .iter()
        .position(|c| !c.is_ascii_digit())
        .unwrap_or(bytes.len());
    let (run, rest) = bytes.split_at(end);
    let zeros = run.iter().take_while(|c| **c == b'0').count();
    (&run[zeros..], rest)
}

/// Multiplier that turns an electricity quantity into kWh.
pub fn electricity_to_kwh(
    field: &str,
    unit: &str,
) -> Result<(Decimal, Option<UnitConversion>), RunError> {
    match normalize_unit(unit).as_str() {
        "kwh" => Ok((Decimal::ONE, None)),
        "mwh" => {
            let m = Decimal::from(1000);
            Ok((
                m,
                Some(conversion(DatasetKind::Electricity, "quantity", unit, "kWh", m)),
            ))
        }
        _ => Err(RunError::UnsupportedUnit {
            field: field.to_string(),
            unit: unit.to_string(),
            expected: "kWh, MWh".to_string(),
        }),
    }
}

/// Multiplier that turns a grid factor into tCO2e per kWh.
pub fn grid_factor_to_t_per_kwh(
    field: &str,
    subject: &str,
    unit: &str,
) -> Result<(Decimal, Option<UnitConversion>), RunError> {
    let per_thousand = Decimal::new(1, 3);
    match normalize_unit(unit).as_str() {
        "tco2e/kwh" | "tco2/kwh" => Ok((Decimal::ONE, None)),
        "kgco2e/kwh" | "kgco2/kwh" | "tco2e/mwh" | "tco2/mwh" => Ok((
            per_thousand,
            Some(conversion(
                DatasetKind::Electricity,
                subject,
                unit,
                "tCO2e/kWh",
                per_thousand,
            )),
        )),
        _ => Err(RunError::UnsupportedUnit {
            field: field.to_string(),
            unit: unit.to_string(),
            expected: "tCO2e/kWh, kgCO2e/kWh, tCO2e/MWh".to_string(),
        }),
    }
}

/// Multiplier that turns a precursor factor into tCO2e per unit.
pub fn precursor_factor_to_t_per_unit(
    subject: &str,
    unit: &str,
) -> (Decimal, Option<UnitConversion>) {
    let normalized = normalize_unit(unit);
    if normalized.starts_with("kgco2") {
        let m = Decimal::new(1, 3);
        (
            m,
            Some(conversion(DatasetKind::Materials, subject, unit, "tCO2e/unit", m)),
        )
    } else {
        (Decimal::ONE, None)
    }
}
