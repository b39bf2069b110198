//! Error types for the calculation engine.
//!
//! Input errors abort a run before anything is persisted; each variant
//! carries the field path and offending value needed to fix the input.
//! Data-quality concerns are not errors: they become QA flags inside a
//! successfully produced ResultBundle.

use mrv_core::{CanonicalError, DatasetKind, NumericError};
use mrv_storage::StorageError;

/// Errors that abort an orchestrator run.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    /// No factor matches the requested identity.
    #[error("{field}: no factor found for {key}")]
    MissingFactor { field: String, key: String },

    /// The matching factor exists but has not been approved.
    #[error("{field}: factor {key} is not approved")]
    UnapprovedFactor { field: String, key: String },

    /// Two factors share one identity but disagree.
    #[error("{field}: conflicting definitions for factor {key}")]
    ConflictingFactor { field: String, key: String },

    /// An explicit factor reference names a factor of the wrong kind.
    #[error("{field}: expected a {expected} factor, got {actual}")]
    FactorKindMismatch {
        field: String,
        expected: String,
        actual: String,
    },

    /// A unit the engine cannot convert.
    #[error("{field}: unsupported unit '{unit}' (expected one of {expected})")]
    UnsupportedUnit {
        field: String,
        unit: String,
        expected: String,
    },

    /// Quantities must not be negative.
    #[error("{field}: negative quantity {value}")]
    NegativeQuantity { field: String, value: String },

    /// A row belongs to a different facility than the request.
    #[error("{field}: row belongs to facility '{actual}', expected '{expected}'")]
    ForeignFacility {
        field: String,
        expected: String,
        actual: String,
    },

    /// Total production is zero or negative; mass-share allocation is
    /// undefined.
    #[error("production total is {total}; allocation requires a positive total")]
    NonPositiveProduction { total: String },

    /// An export references a product that was not produced in the period.
    #[error("{field}: product '{product_code}' has no computed intensity")]
    MissingIntensity { field: String, product_code: String },

    /// An export references a product whose intensity is undefined (zero
    /// production quantity).
    #[error("{field}: intensity of product '{product_code}' is undefined")]
    UndefinedIntensity { field: String, product_code: String },

    /// Engine configuration is invalid.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Numeric(#[from] NumericError),

    #[error(transparent)]
    Canonical(#[from] CanonicalError),
}

/// Errors loading an engine configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid engine config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid engine config: {0}")]
    Invalid(String),
}

/// Errors loading a compliance rule set.
#[derive(Debug, thiserror::Error)]
pub enum RuleSetError {
    #[error("invalid rule set: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("rule '{rule_id}': {message}")]
    InvalidRule { rule_id: String, message: String },

    #[error(transparent)]
    Canonical(#[from] CanonicalError),
}

/// Errors that prevent a replay from producing a verdict.
///
/// A hash mismatch is not an error: it is a `fail` verdict in the report.
#[derive(Debug, thiserror::Error)]
pub enum ReplayError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// A recorded dataset can no longer be resolved by its content hash.
    #[error("dataset {kind} with sha256 {sha256} is not available")]
    DatasetUnavailable { kind: DatasetKind, sha256: String },

    /// The dataset store itself could not be read.
    #[error("dataset store error: {0}")]
    DatasetStore(String),

    /// A recorded factor identity is unknown to the catalog.
    #[error("factor {key} is not available from the catalog")]
    FactorUnavailable { key: String },

    /// The recorded configuration no longer parses.
    #[error("recorded configuration is invalid: {0}")]
    Config(String),

    #[error("recomputation failed: {0}")]
    Run(#[from] RunError),

    #[error(transparent)]
    Canonical(#[from] CanonicalError),
}
