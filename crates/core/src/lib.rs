//! mrv-core: canonical data contracts for deterministic MRV calculations.
//!
//! Everything here is pure data plus the routines that turn it into bytes:
//!
//! - [`numeric`] -- checked decimal arithmetic and the `Quotient` sentinel
//! - [`canonical`] -- canonical JSON and SHA-256 content hashing
//! - [`activity`] -- activity rows and dataset content references
//! - [`factor`] -- versioned emission factor references
//! - [`bundle`] -- [`InputBundle`] / [`ResultBundle`] and their hashes
//! - [`finding`] -- QA flags and compliance checks

pub mod activity;
pub mod breakdown;
pub mod bundle;
pub mod canonical;
pub mod factor;
pub mod finding;
pub mod numeric;
pub mod refs;

// ── Convenience re-exports ───────────────────────────────────────────

pub use activity::{
    ActivityData, ActivitySnapshotRef, Dataset, DatasetKind, DatasetRef, ElectricityRow,
    ExportRow, FuelRow, MaterialRow, ProcessRow, ProductionRow,
};
pub use bundle::{BundlePair, InputBundle, ResultBundle, ResultContent};
pub use canonical::{canonical_json, canonicalize, hash, sha256_hex, CanonicalError};
pub use factor::{FactorKey, FactorKind, FactorRef};
pub use finding::{
    CheckStatus, ComplianceCheck, QaFlag, Regime, Requirement, RuleSetRef, Severity,
};
pub use numeric::{NumericError, Quotient};
pub use refs::{
    FacilityDescriptor, MethodologyRef, MonitoringPlanRef, Period, PriceRef, ProductMapping,
    Scenario, SubjectKey,
};
