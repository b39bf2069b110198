//! Declarative compliance rule sets.

use mrv_core::{Regime, Requirement, RuleSetRef};
use serde::{Deserialize, Serialize};

use crate::error::RuleSetError;

/// Check applied to every item a rule's path resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredicateKind {
    /// Present and not null.
    Present,
    /// Present with content.
    NonEmpty,
    /// A decimal greater than zero.
    Positive,
    /// Absent, null, or without content.
    Empty,
    /// Equal to one of the rule's `values`.
    OneOf,
    /// The container can be seen but not checked here: present ⇒ warn.
    Opaque,
}

/// One declarative rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Rule {
    pub rule_id: String,
    pub reg_reference: String,
    pub requirement: Requirement,
    pub path: String,
    pub predicate: PredicateKind,
    /// Allowed values for `one_of`.
    #[serde(default)]
    pub values: Vec<serde_json::Value>,
    /// The rule applies only when this path holds content.
    #[serde(default)]
    pub when: Option<String>,
    /// Shown when the rule is not satisfied.
    pub message: String,
    #[serde(default)]
    pub pass_message: Option<String>,
    #[serde(default)]
    pub remediation: String,
    #[serde(default)]
    pub evidence_requirements: Vec<String>,
}

/// A versioned set of rules for one regime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleSet {
    pub id: String,
    pub regime: Regime,
    pub version: String,
    #[serde(default)]
    pub rules: Vec<Rule>,
}

const ETS_RULES: &str = include_str!("../../rules/ets.toml");
const CBAM_RULES: &str = include_str!("../../rules/cbam.toml");

impl RuleSet {
    pub fn from_toml_str(text: &str) -> Result<Self, RuleSetError> {
        let set: RuleSet = toml::from_str(text)?;
        set.validate()?;
        Ok(set)
    }

    /// The built-in ETS (MRR/AVR) and CBAM rule sets.
    pub fn builtin() -> Result<Vec<RuleSet>, RuleSetError> {
        Ok(vec![
            RuleSet::from_toml_str(ETS_RULES)?,
            RuleSet::from_toml_str(CBAM_RULES)?,
        ])
    }

    /// Identity recorded in the InputBundle: the content hash covers every
    /// rule, so an edited rule set is a different input.
    pub fn reference(&self) -> Result<RuleSetRef, RuleSetError> {
        Ok(RuleSetRef {
            id: self.id.clone(),
            regime: self.regime,
            version: self.version.clone(),
            sha256: mrv_core::hash(self)?,
        })
    }

    fn validate(&self) -> Result<(), RuleSetError> {
        let mut seen = std::collections::BTreeSet::new();
        for rule in &self.rules {
            let invalid = |message: &str| RuleSetError::InvalidRule {
                rule_id: rule.rule_id.clone(),
                message: message.to_string(),
            };
            if rule.rule_id.trim().is_empty() {
                return Err(invalid("rule_id must not be empty"));
            }
            if !seen.insert(rule.rule_id.as_str()) {
                return Err(invalid("duplicate rule_id"));
            }
            if rule.path.trim().is_empty() {
                return Err(invalid("path must not be empty"));
            }
            if rule.predicate == PredicateKind::OneOf && rule.values.is_empty() {
                return Err(invalid("one_of requires at least one value"));
            }
            if rule.requirement == Requirement::Conditional && rule.when.is_none() {
                return Err(invalid("conditional rules require a 'when' path"));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_sets_parse() {
        let sets = RuleSet::builtin().unwrap();
        assert_eq!(sets.len(), 2);
        assert_eq!(sets[0].regime, Regime::Ets);
        assert_eq!(sets[1].regime, Regime::Cbam);
        assert!(sets.iter().all(|s| !s.rules.is_empty()));
    }

    #[test]
    fn reference_changes_with_rule_content() {
        let a = RuleSet::from_toml_str(ETS_RULES).unwrap();
        let mut b = a.clone();
        b.rules[0].requirement = Requirement::Should;
        assert_ne!(a.reference().unwrap().sha256, b.reference().unwrap().sha256);
        assert_eq!(a.reference().unwrap(), a.reference().unwrap());
    }

    #[test]
    fn conditional_without_when_is_rejected() {
        let err = RuleSet::from_toml_str(
            r#"
            id = "custom"
            regime = "ets"
            version = "1"

            [[rules]]
            rule_id = "X"
            reg_reference = "2018/2066"
            requirement = "conditional"
            path = "input.methodology"
            predicate = "present"
            message = "methodology missing"
            "#,
        )
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "rule 'X': conditional rules require a 'when' path"
        );
    }

    #[test]
    fn one_of_requires_values() {
        let err = RuleSet::from_toml_str(
            r#"
            id = "custom"
            regime = "cbam"
            version = "1"

            [[rules]]
            rule_id = "Y"
            reg_reference = "2023/1773"
            requirement = "should"
            path = "input.config.electricity_method"
            predicate = "one_of"
            message = "unexpected method"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, RuleSetError::InvalidRule { .. }));
    }
}
