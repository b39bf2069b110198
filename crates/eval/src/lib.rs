//! Deterministic MRV calculation engine.
//!
//! Takes a [`CalculationRequest`] (activity data, factor candidates, prices,
//! configuration) and produces a hashed [`mrv_core::BundlePair`]:
//!
//! - [`emissions`] -- direct, indirect and process emissions
//! - [`cost`] -- ETS net position and CBAM certificate cost
//! - [`allocation`] -- mass-share allocation to products and exports
//! - [`precursor`] -- precursor graph ordering and embedded emissions
//! - [`quality`] -- input validation and data-quality flags
//! - [`compliance`] -- declarative ETS/CBAM rule evaluation
//! - [`orchestrator`] -- composes the above into one run
//! - [`replay`] -- recomputes stored snapshots and compares hashes

pub mod allocation;
pub mod compliance;
pub mod config;
pub mod cost;
pub mod emissions;
pub mod error;
pub mod factors;
pub mod orchestrator;
pub mod precursor;
pub mod quality;
pub mod replay;

pub use config::{ElectricityMethod, EngineConfig, EngineSettings, EtsConfig};
pub use error::{ConfigError, ReplayError, RuleSetError, RunError};
pub use orchestrator::{CalculationRequest, Orchestrator};
pub use replay::{
    replay, ContentAddressedDatasets, DatasetResolver, FactorCatalog, ReplayReport,
    StaticFactorCatalog, Verdict,
};
