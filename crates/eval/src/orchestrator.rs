//! The Orchestrator: one calculation request in, one bundle pair out.
//!
//! A run moves through collecting inputs, computing, and hashing. Any error
//! aborts the whole run; no partial bundle is ever returned.

use mrv_core::breakdown::{Breakdown, Totals};
use mrv_core::numeric;
use mrv_core::{
    hash, ActivityData, BundlePair, CanonicalError, CheckStatus, FacilityDescriptor, FactorRef,
    InputBundle, MethodologyRef, MonitoringPlanRef, Period, PriceRef, ProductMapping,
    ResultBundle, ResultContent, RuleSetRef, Scenario,
};
use serde::{Deserialize, Serialize};

use crate::allocation;
use crate::compliance::{self, overall_status, RuleSet};
use crate::config::{EngineConfig, EngineSettings};
use crate::cost;
use crate::emissions;
use crate::error::{RuleSetError, RunError};
use crate::factors::FactorResolver;
use crate::precursor;
use crate::quality;

/// Everything one calculation needs. The orchestrator only reads it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalculationRequest {
    pub project_id: String,
    pub period: Period,
    pub facility: FacilityDescriptor,
    #[serde(default)]
    pub product_mappings: Vec<ProductMapping>,
    #[serde(default)]
    pub activity: ActivityData,
    /// Candidate factors; only the ones a row resolves to are recorded.
    #[serde(default)]
    pub factors: Vec<FactorRef>,
    pub prices: PriceRef,
    #[serde(default)]
    pub config: EngineConfig,
    #[serde(default)]
    pub scenario: Scenario,
    #[serde(default)]
    pub monitoring_plan: Option<MonitoringPlanRef>,
    #[serde(default)]
    pub methodology: Option<MethodologyRef>,
}

/// Composes the calculators into bundle pairs.
///
/// Holds no mutable state; one instance can serve any number of requests,
/// from any thread.
#[derive(Debug, Clone)]
pub struct Orchestrator {
    settings: EngineSettings,
    rule_sets: Vec<RuleSet>,
}

impl Orchestrator {
    /// An orchestrator with the built-in ETS and CBAM rule sets.
    pub fn new(settings: EngineSettings) -> Result<Self, RuleSetError> {
        Ok(Self::with_rules(settings, RuleSet::builtin()?))
    }

    pub fn with_rules(settings: EngineSettings, rule_sets: Vec<RuleSet>) -> Self {
        Orchestrator {
            settings,
            rule_sets,
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn rule_sets(&self) -> &[RuleSet] {
        &self.rule_sets
    }

    /// Run one calculation.
    pub fn run(&self, request: &CalculationRequest) -> Result<BundlePair, RunError> {
        let span = tracing::info_span!(
            "run",
            project = %request.project_id,
            facility = %request.facility.id
        );
        let _guard = span.enter();

        // ── Collecting inputs ────────────────────────────────────────
        let config = &request.config;
        config
            .validate()
            .map_err(|e| RunError::InvalidConfig(e.to_string()))?;
        cost::validate_prices(&request.prices)?;
        // rows are consumed in content order so only content reaches the result
        let recorded = request.activity.canonical_form()?;
        quality::validate(&recorded, &request.facility.id)?;
        let activity_snapshot_ref = recorded.snapshot_ref()?;
        let rule_set_refs = self
            .rule_sets
            .iter()
            .map(RuleSet::reference)
            .collect::<Result<Vec<RuleSetRef>, _>>()
            .map_err(|e| RunError::InvalidConfig(e.to_string()))?;
        tracing::debug!(datasets = activity_snapshot_ref.len(), "inputs collected");

        // ── Computing ────────────────────────────────────────────────
        let activity = emissions::apply_scenario(&recorded, &request.scenario)?;
        let mut factors = FactorResolver::new(&request.factors, &config.region);

        let emissions = emissions::compute(&activity, config, &mut factors)?;
        let facility_tco2e = emissions.facility_tco2e()?;

        let allocations = allocation::allocate(&activity.production, facility_tco2e)?;
        let precursors = precursor::resolve(
            &activity.materials,
            config.precursor_mode,
            &allocations,
            &mut factors,
        )?;
        let products = allocation::product_lines(
            &allocations,
            &precursors.precursor_by_product,
            &request.product_mappings,
        )?;
        let exports = allocation::export_lines(
            &activity.exports,
            &products,
            &request.product_mappings,
            request.prices.cbam_price(),
        )?;

        let totals = Totals {
            direct_tco2e: emissions.direct_tco2e,
            indirect_tco2e: emissions.indirect_tco2e,
            process_tco2e: emissions.process_tco2e,
            facility_tco2e,
            precursor_tco2e: numeric::sum(products.iter().map(|p| p.precursor_tco2e))?,
            embedded_tco2e: numeric::sum(products.iter().map(|p| p.embedded_tco2e))?,
            export_embedded_tco2e: numeric::sum(exports.iter().map(|e| e.embedded_tco2e))?,
        };
        let costs = cost::cost_outputs(&totals, &config.ets, &request.prices)?;
        tracing::debug!(
            facility_tco2e = %totals.facility_tco2e,
            products = products.len(),
            exports = exports.len(),
            "emissions computed"
        );

        let mut qa_flags = quality::data_quality_flags(&recorded, &request.product_mappings)?;
        qa_flags.extend(quality::monitoring_plan_flag(request.monitoring_plan.as_ref()));
        qa_flags.extend(precursors.flags);

        let mut unit_conversions = emissions.unit_conversions;
        unit_conversions.extend(precursors.unit_conversions);

        // ── Hashing ──────────────────────────────────────────────────
        let config_value = serde_json::to_value(config).map_err(CanonicalError::from)?;
        let input = InputBundle {
            engine_version: self.settings.engine_version.clone(),
            project_id: request.project_id.clone(),
            period: request.period.clone(),
            facility: request.facility.clone(),
            product_mappings: request.product_mappings.clone(),
            activity_snapshot_ref,
            monitoring_plan: request.monitoring_plan.clone(),
            methodology: request.methodology.clone(),
            factors: factors.used(),
            prices: request.prices.clone(),
            scenario: request.scenario.clone(),
            rule_sets: rule_set_refs,
            config_hash: hash(&config_value)?,
            config: config_value,
        }
        .canonical_form();

        let mut content = ResultContent {
            engine_version: self.settings.engine_version.clone(),
            input_bundle_hash: input.input_bundle_hash()?,
            totals,
            breakdown: Breakdown {
                fuel: emissions.fuel,
                electricity: emissions.electricity,
                process: emissions.process,
                products,
                exports,
                precursors: precursors.report,
            },
            unit_conversions,
            source_references: factors.source_references(),
            qa_flags,
            compliance_checks: vec![],
            compliance_status: CheckStatus::Pass,
            costs,
        };

        content.compliance_checks = compliance::evaluate_pair(&self.rule_sets, &input, &content)?;
        content.compliance_status = overall_status(&content.compliance_checks);

        let result = ResultBundle::seal(content)?;
        tracing::info!(
            input_bundle_hash = %result.content.input_bundle_hash,
            result_hash = %result.result_hash,
            compliance = %result.content.compliance_status,
            "run complete"
        );
        Ok(BundlePair { input, result })
    }
}
