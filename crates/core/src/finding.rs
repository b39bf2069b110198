//! QA flags and compliance findings.
//!
//! Both are produced fresh by each evaluation and never mutated afterwards.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Severity of a QA flag or compliance check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warn,
    Fail,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::Info => "info",
            Severity::Warn => "warn",
            Severity::Fail => "fail",
        })
    }
}

/// Outcome of a compliance check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    Pass,
    Warn,
    Fail,
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CheckStatus::Pass => "pass",
            CheckStatus::Warn => "warn",
            CheckStatus::Fail => "fail",
        })
    }
}

/// How strongly a regulation demands a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Requirement {
    Must,
    Conditional,
    Should,
}

impl Requirement {
    /// MUST and CONDITIONAL gaps fail; SHOULD gaps only warn.
    pub fn is_mandatory(self) -> bool {
        matches!(self, Requirement::Must | Requirement::Conditional)
    }
}

/// Regulatory regime a rule belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Regime {
    Ets,
    Cbam,
}

impl fmt::Display for Regime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Regime::Ets => "ets",
            Regime::Cbam => "cbam",
        })
    }
}

/// A data-quality observation recorded inside a ResultBundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QaFlag {
    pub flag_id: String,
    pub severity: Severity,
    pub message: String,
    #[serde(default)]
    pub context: BTreeMap<String, serde_json::Value>,
}

impl QaFlag {
    pub fn new(flag_id: &str, severity: Severity, message: impl Into<String>) -> Self {
        QaFlag {
            flag_id: flag_id.to_string(),
            severity,
            message: message.into(),
            context: BTreeMap::new(),
        }
    }

    pub fn with_context(mut self, key: &str, value: serde_json::Value) -> Self {
        self.context.insert(key.to_string(), value);
        self
    }
}

/// Result of evaluating one compliance rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplianceCheck {
    pub rule_id: String,
    pub regime: Regime,
    pub reg_reference: String,
    pub requirement: Requirement,
    pub severity: Severity,
    pub status: CheckStatus,
    pub message: String,
    pub remediation: String,
    #[serde(default)]
    pub evidence_requirements: Vec<String>,
    #[serde(default)]
    pub details: BTreeMap<String, serde_json::Value>,
}

/// Identity of a compliance rule set applied to a run.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RuleSetRef {
    pub id: String,
    pub regime: Regime,
    pub version: String,
    /// Content hash of the rule definitions.
    pub sha256: String,
}

/// Overall status: fail if any MUST/CONDITIONAL check failed, else pass.
pub fn overall_status(checks: &[ComplianceCheck]) -> CheckStatus {
    let failed = checks
        .iter()
        .any(|c| c.status == CheckStatus::Fail && c.requirement.is_mandatory());
    if failed {
        CheckStatus::Fail
    } else {
        CheckStatus::Pass
    }
}

/// Sort QA flags by (severity, flag_id), then by context so that repeated
/// flags land in a fixed order too.
pub fn sort_flags(flags: &mut [QaFlag]) {
    flags.sort_by_cached_key(|f| {
        (
            f.severity,
            f.flag_id.clone(),
            serde_json::to_string(&f.context).unwrap_or_default(),
        )
    });
}

/// Sort compliance checks by (reg_reference, severity, rule_id).
pub fn sort_checks(checks: &mut [ComplianceCheck]) {
    checks.sort_by(|a, b| {
        (a.reg_reference.as_str(), a.severity, a.rule_id.as_str()).cmp(&(
            b.reg_reference.as_str(),
            b.severity,
            b.rule_id.as_str(),
        ))
    });
}
