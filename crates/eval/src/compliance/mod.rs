//! Compliance Rule Evaluator.
//!
//! Rules are evaluated against the JSON document `{ "input": …, "result": … }`
//! built from one bundle pair. The evaluator reads nothing else, so two
//! evaluations of the same pair always agree.
//!
//! Status policy:
//! - a MUST or CONDITIONAL rule that is not satisfied fails
//! - a SHOULD rule that is not satisfied warns
//! - a present but unverifiable (`opaque`) field warns, never passes
//!
//! Evaluation never errors; malformed data is simply not satisfied.

pub mod path;
mod rules;

use std::collections::BTreeMap;

use mrv_core::numeric::parse_decimal;
use mrv_core::{
    CanonicalError, CheckStatus, ComplianceCheck, InputBundle, ResultContent, Severity,
};
use rust_decimal::Decimal;
use serde_json::{json, Value};

pub use mrv_core::finding::overall_status;
pub use rules::{PredicateKind, Rule, RuleSet};

use path::{is_non_empty, is_present, Resolved};

/// Build the document rules are evaluated against.
pub fn document(input: &InputBundle, result: &ResultContent) -> Result<Value, CanonicalError> {
    Ok(json!({
        "input": serde_json::to_value(input)?,
        "result": serde_json::to_value(result)?,
    }))
}

/// Evaluate a bundle pair as it stood before compliance ran: any checks
/// already recorded in `result` are ignored. The result is read in
/// canonical order, so a sealed bundle evaluates exactly as it did when it
/// was produced.
pub fn evaluate_pair(
    rule_sets: &[RuleSet],
    input: &InputBundle,
    result: &ResultContent,
) -> Result<Vec<ComplianceCheck>, CanonicalError> {
    let mut pending = result.canonical_form();
    pending.compliance_checks.clear();
    pending.compliance_status = CheckStatus::Pass;
    Ok(evaluate(rule_sets, &document(input, &pending)?))
}

/// Evaluate every rule of every set.
pub fn evaluate(rule_sets: &[RuleSet], doc: &Value) -> Vec<ComplianceCheck> {
    let checks: Vec<ComplianceCheck> = rule_sets
        .iter()
        .flat_map(|set| set.rules.iter().map(move |rule| evaluate_rule(set, rule, doc)))
        .collect();
    tracing::debug!(
        rules = checks.len(),
        failed = checks.iter().filter(|c| c.status == CheckStatus::Fail).count(),
        warned = checks.iter().filter(|c| c.status == CheckStatus::Warn).count(),
        "compliance evaluated"
    );
    checks
}

fn evaluate_rule(set: &RuleSet, rule: &Rule, doc: &Value) -> ComplianceCheck {
    let mut details = BTreeMap::new();
    details.insert("path".to_string(), json!(rule.path));

    if let Some(when) = &rule.when {
        let applicable = path::resolve(doc, when)
            .iter()
            .any(|r| is_non_empty(r.value));
        if !applicable {
            details.insert("applicable".to_string(), json!(false));
            return check(
                set,
                rule,
                CheckStatus::Pass,
                format!("Not applicable: {} has no content.", when),
                details,
            );
        }
    }

    let items = path::resolve(doc, &rule.path);
    let failing: Vec<&str> = items
        .iter()
        .filter(|item| !satisfies(rule, item))
        .map(|item| item.path.as_str())
        .collect();
    let unverifiable = match rule.predicate {
        PredicateKind::Opaque => items.iter().filter(|i| is_present(i.value)).count(),
        _ => 0,
    };

    let (status, message) = if !failing.is_empty() {
        details.insert("failing".to_string(), json!(failing));
        let status = if rule.requirement.is_mandatory() {
            CheckStatus::Fail
        } else {
            CheckStatus::Warn
        };
        (status, rule.message.clone())
    } else if unverifiable > 0 {
        details.insert("unverifiable".to_string(), json!(unverifiable));
        (
            CheckStatus::Warn,
            rule.pass_message
                .clone()
                .unwrap_or_else(|| "Present but cannot be verified at this layer.".to_string()),
        )
    } else {
        (
            CheckStatus::Pass,
            rule.pass_message
                .clone()
                .unwrap_or_else(|| "Requirement satisfied.".to_string()),
        )
    };
    check(set, rule, status, message, details)
}

fn satisfies(rule: &Rule, item: &Resolved<'_>) -> bool {
    match rule.predicate {
        PredicateKind::Present | PredicateKind::Opaque => is_present(item.value),
        PredicateKind::NonEmpty => is_non_empty(item.value),
        PredicateKind::Empty => !is_non_empty(item.value),
        PredicateKind::Positive => as_decimal(item.value).is_some_and(|d| d > Decimal::ZERO),
        PredicateKind::OneOf => item.value.is_some_and(|v| rule.values.contains(v)),
    }
}

fn as_decimal(value: Option<&Value>) -> Option<Decimal> {
    match value? {
        Value::String(s) => parse_decimal(s),
        Value::Number(n) => parse_decimal(&n.to_string()),
        _ => None,
    }
}

fn check(
    set: &RuleSet,
    rule: &Rule,
    status: CheckStatus,
    message: String,
    details: BTreeMap<String, Value>,
) -> ComplianceCheck {
    let severity = match status {
        CheckStatus::Pass => Severity::Info,
        CheckStatus::Warn => Severity::Warn,
        CheckStatus::Fail => Severity::Fail,
    };
    ComplianceCheck {
        rule_id: rule.rule_id.clone(),
        regime: set.regime,
        reg_reference: rule.reg_reference.clone(),
        requirement: rule.requirement,
        severity,
        status,
        message,
        remediation: rule.remediation.clone(),
        evidence_requirements: rule.evidence_requirements.clone(),
        details,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mrv_core::{Regime, Requirement};

    fn rule(id: &str, requirement: Requirement, path: &str, predicate: PredicateKind) -> Rule {
        Rule {
            rule_id: id.to_string(),
            reg_reference: "2018/2066".to_string(),
            requirement,
            path: path.to_string(),
            predicate,
            values: vec![],
            when: None,
            message: format!("{} not satisfied", id),
            pass_message: None,
            remediation: String::new(),
            evidence_requirements: vec![],
        }
    }

    fn set(rules: Vec<Rule>) -> RuleSet {
        RuleSet {
            id: "test".to_string(),
            regime: Regime::Ets,
            version: "1".to_string(),
            rules,
        }
    }

    fn status_of(checks: &[ComplianceCheck], id: &str) -> CheckStatus {
        checks
            .iter()
            .find(|c| c.rule_id == id)
            .map(|c| c.status)
            .unwrap()
    }

    #[test]
    fn missing_must_fails_and_missing_should_warns() {
        let doc = json!({ "input": { "monitoring_plan": null } });
        let rules = set(vec![
            rule("MUST", Requirement::Must, "input.monitoring_plan", PredicateKind::Present),
            rule("SHOULD", Requirement::Should, "input.methodology", PredicateKind::Present),
        ]);
        let checks = evaluate(&[rules], &doc);
        assert_eq!(status_of(&checks, "MUST"), CheckStatus::Fail);
        assert_eq!(status_of(&checks, "SHOULD"), CheckStatus::Warn);
        assert_eq!(overall_status(&checks), CheckStatus::Fail);
    }

    #[test]
    fn opaque_present_field_warns_never_passes() {
        let doc = json!({ "result": { "exports": [ { "actual_data": true } ] } });
        let rules = set(vec![rule(
            "OPAQUE",
            Requirement::Must,
            "result.exports.*.actual_data",
            PredicateKind::Opaque,
        )]);
        let checks = evaluate(&[rules], &doc);
        assert_eq!(checks[0].status, CheckStatus::Warn);
        assert_eq!(checks[0].details["unverifiable"], json!(1));
        assert_eq!(overall_status(&checks), CheckStatus::Pass);
    }

    #[test]
    fn conditional_applies_only_when_its_path_has_content() {
        let mut r = rule(
            "COND",
            Requirement::Conditional,
            "result.exports.*.cn_code",
            PredicateKind::NonEmpty,
        );
        r.when = Some("result.exports".to_string());
        let rules = set(vec![r]);

        let none = json!({ "result": { "exports": [] } });
        let checks = evaluate(std::slice::from_ref(&rules), &none);
        assert_eq!(checks[0].status, CheckStatus::Pass);
        assert_eq!(checks[0].details["applicable"], json!(false));

        let some = json!({ "result": { "exports": [ { "cn_code": "7208" }, { "cn_code": "" } ] } });
        let checks = evaluate(&[rules], &some);
        assert_eq!(checks[0].status, CheckStatus::Fail);
        assert_eq!(checks[0].details["failing"], json!(["result.exports.1.cn_code"]));
    }

    #[test]
    fn positive_reads_decimal_strings() {
        let rules = set(vec![rule(
            "POS",
            Requirement::Should,
            "result.totals.facility_tco2e",
            PredicateKind::Positive,
        )]);
        let pass = json!({ "result": { "totals": { "facility_tco2e": "111078" } } });
        let zero = json!({ "result": { "totals": { "facility_tco2e": "0" } } });
        assert_eq!(evaluate(std::slice::from_ref(&rules), &pass)[0].status, CheckStatus::Pass);
        assert_eq!(evaluate(&[rules], &zero)[0].status, CheckStatus::Warn);
    }

    #[test]
    fn empty_predicate_detects_cycles() {
        let rules = set(vec![rule(
            "ACYCLIC",
            Requirement::Must,
            "result.precursors.cycle_nodes",
            PredicateKind::Empty,
        )]);
        let cyclic = json!({ "result": { "precursors": { "cycle_nodes": ["A", "B"] } } });
        let acyclic = json!({ "result": { "precursors": { "cycle_nodes": [] } } });
        assert_eq!(evaluate(std::slice::from_ref(&rules), &cyclic)[0].status, CheckStatus::Fail);
        assert_eq!(evaluate(&[rules], &acyclic)[0].status, CheckStatus::Pass);
    }

    #[test]
    fn one_of_matches_listed_values() {
        let mut r = rule(
            "ONE",
            Requirement::Should,
            "input.config.electricity_method",
            PredicateKind::OneOf,
        );
        r.values = vec![json!("location"), json!("market")];
        let rules = set(vec![r]);
        let ok = json!({ "input": { "config": { "electricity_method": "market" } } });
        let bad = json!({ "input": { "config": { "electricity_method": "guess" } } });
        assert_eq!(evaluate(std::slice::from_ref(&rules), &ok)[0].status, CheckStatus::Pass);
        assert_eq!(evaluate(&[rules], &bad)[0].status, CheckStatus::Warn);
    }
}
