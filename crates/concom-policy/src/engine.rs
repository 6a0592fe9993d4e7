//! The evaluation engine.

use std::path::Path;

use tracing::debug;

use crate::bundle::{Bundle, Module};
use crate::error::{PolicyError, PolicyEvalResult};
use crate::result::{Policy, PolicyResult, Violation};

/// A pluggable policy evaluator.
///
/// The agent core only depends on this seam; the engine behind it owns the
/// policy language.
pub trait PolicyEngine: Send + Sync {
    /// Compile the bundle at `bundle_path` and evaluate every module
    /// against `input`.
    fn evaluate(
        &self,
        bundle_path: &Path,
        input: &serde_json::Value,
    ) -> PolicyEvalResult<Vec<PolicyResult>>;
}

/// The built-in engine: violation rules are JSON Schemas matched against
/// the input.
#[derive(Debug, Clone, Copy, Default)]
pub struct SchemaPolicyEngine;

impl SchemaPolicyEngine {
    pub fn new() -> Self {
        Self
    }

    fn evaluate_module(
        &self,
        module: &Module,
        input: &serde_json::Value,
    ) -> PolicyEvalResult<PolicyResult> {
        let mut violations = Vec::new();

        for (index, rule) in module.rules.iter().enumerate() {
            let validator =
                jsonschema::validator_for(&rule.when).map_err(|e| PolicyError::Schema {
                    file: module.file.clone(),
                    reason: format!("violation rule {index} condition does not compile: {e}"),
                })?;

            if validator.is_valid(input) {
                let violation: Violation = serde_json::from_value(rule.emit.clone())
                    .map_err(|e| PolicyError::Decode {
                        file: module.file.clone(),
                        reason: format!("violation rule {index}: {e}"),
                    })?;
                violations.push(violation);
            }
        }

        debug!(
            package = %module.package,
            file = %module.file,
            violations = violations.len(),
            "evaluated policy module"
        );

        Ok(PolicyResult {
            policy: Policy {
                file: module.file.clone(),
                package: module.package.clone(),
                annotations: module.annotations.clone(),
            },
            title: module.title.clone(),
            description: module.description.clone(),
            remarks: module.remarks.clone(),
            labels: module.labels.clone(),
            violations,
            additional_variables: module.additional_variables.clone(),
        })
    }
}

impl PolicyEngine for SchemaPolicyEngine {
    fn evaluate(
        &self,
        bundle_path: &Path,
        input: &serde_json::Value,
    ) -> PolicyEvalResult<Vec<PolicyResult>> {
        let bundle = Bundle::compile(bundle_path)?;
        bundle
            .modules
            .iter()
            .map(|module| self.evaluate_module(module, input))
            .collect()
    }
}
