//! Evaluation output types.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A control referenced by a policy module's annotations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Control {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, rename = "class", skip_serializing_if = "Option::is_none")]
    pub class: Option<String>,
}

/// Annotations attached to a policy module.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Annotations {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub controls: Vec<Control>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// Identity of the module a result came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Policy {
    /// Source file of the module inside the bundle.
    pub file: String,
    /// The module's package, e.g. `compliance_framework.local_ssh.deny_password`.
    pub package: String,
    #[serde(default)]
    pub annotations: Annotations,
}

/// One violation produced by a module rule.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remarks: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// Output of evaluating one module against one input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyResult {
    pub policy: Policy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remarks: Option<String>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    /// Empty means the module is satisfied.
    #[serde(default)]
    pub violations: Vec<Violation>,
    /// Module keys outside the recognized set, preserved as-is.
    #[serde(default)]
    pub additional_variables: BTreeMap<String, serde_json::Value>,
}

impl PolicyResult {
    /// Whether the module found nothing wrong.
    pub fn is_satisfied(&self) -> bool {
        self.violations.is_empty()
    }
}
