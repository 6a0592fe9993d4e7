//! Bundle loading and the module model.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{PolicyError, PolicyEvalResult};
use crate::result::Annotations;

/// Module keys with defined meaning; everything else is preserved under
/// `additional_variables`.
const RECOGNIZED_KEYS: &[&str] = &[
    "package",
    "annotations",
    "title",
    "description",
    "remarks",
    "labels",
    "violation",
];

/// One violation rule of a module.
#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    /// JSON Schema the input is matched against; a match emits the
    /// violation.
    pub when: serde_json::Value,
    /// The violation object emitted on a match.
    pub emit: serde_json::Value,
}

/// A compiled policy module.
#[derive(Debug, Clone, PartialEq)]
pub struct Module {
    /// Bundle-relative source file.
    pub file: String,
    pub package: String,
    pub annotations: Annotations,
    pub title: Option<String>,
    pub description: Option<String>,
    pub remarks: Option<String>,
    pub labels: BTreeMap<String, String>,
    pub rules: Vec<Rule>,
    pub additional_variables: BTreeMap<String, serde_json::Value>,
}

/// A loaded policy bundle.
#[derive(Debug, Clone, PartialEq)]
pub struct Bundle {
    pub path: PathBuf,
    pub modules: Vec<Module>,
}

impl Bundle {
    /// Load and compile every module under `path`.
    ///
    /// `path` may be a single module file or a directory searched
    /// recursively for `*.yaml`, `*.yml`, and `*.json` files. Modules whose
    /// file stem ends in `_test` are excluded. Files are visited in sorted
    /// order so module order is deterministic.
    pub fn compile(path: &Path) -> PolicyEvalResult<Self> {
        let files = collect_module_files(path).map_err(|e| PolicyError::Compile {
            bundle: path.display().to_string(),
            reason: e.to_string(),
        })?;

        if files.is_empty() {
            return Err(PolicyError::Compile {
                bundle: path.display().to_string(),
                reason: "bundle contains no policy modules".to_string(),
            });
        }

        let mut modules = Vec::new();
        for file in files {
            let relative = file
                .strip_prefix(path)
                .unwrap_or(&file)
                .display()
                .to_string();
            let stem = file
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or_default();
            if stem.ends_with("_test") {
                debug!(file = %relative, "excluding test module");
                continue;
            }

            let text = std::fs::read_to_string(&file).map_err(|e| PolicyError::Compile {
                bundle: path.display().to_string(),
                reason: format!("reading {relative}: {e}"),
            })?;
            modules.push(parse_module(path, &relative, &text)?);
        }

        if modules.is_empty() {
            return Err(PolicyError::Compile {
                bundle: path.display().to_string(),
                reason: "bundle contains only test modules".to_string(),
            });
        }

        Ok(Self {
            path: path.to_path_buf(),
            modules,
        })
    }
}

fn collect_module_files(path: &Path) -> std::io::Result<Vec<PathBuf>> {
    let meta = std::fs::metadata(path)?;
    if meta.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }

    let mut files = Vec::new();
    let mut stack = vec![path.to_path_buf()];
    while let Some(dir) = stack.pop() {
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let entry_path = entry.path();
            if entry.file_type()?.is_dir() {
                stack.push(entry_path);
            } else if matches!(
                entry_path.extension().and_then(|e| e.to_str()),
                Some("yaml") | Some("yml") | Some("json")
            ) {
                files.push(entry_path);
            }
        }
    }
    files.sort();
    Ok(files)
}

fn parse_module(bundle: &Path, file: &str, text: &str) -> PolicyEvalResult<Module> {
    let value: serde_yaml::Value =
        serde_yaml::from_str(text).map_err(|e| PolicyError::Compile {
            bundle: bundle.display().to_string(),
            reason: format!("parsing {file}: {e}"),
        })?;

    let mapping = match value {
        serde_yaml::Value::Mapping(m) => m,
        other => {
            return Err(PolicyError::Schema {
                file: file.to_string(),
                reason: format!("module is not a mapping (found {})", yaml_kind(&other)),
            })
        }
    };

    let get = |key: &str| mapping.get(&serde_yaml::Value::from(key));

    let package = get("package")
        .and_then(|v| v.as_str())
        .ok_or_else(|| PolicyError::Schema {
            file: file.to_string(),
            reason: "module has no package".to_string(),
        })?
        .to_string();

    let annotations: Annotations = match get("annotations") {
        Some(v) => serde_yaml::from_value(v.clone()).map_err(|e| PolicyError::Schema {
            file: file.to_string(),
            reason: format!("annotations: {e}"),
        })?,
        None => Annotations::default(),
    };

    let labels: BTreeMap<String, String> = match get("labels") {
        Some(v) => serde_yaml::from_value(v.clone()).map_err(|e| PolicyError::Schema {
            file: file.to_string(),
            reason: format!("labels: {e}"),
        })?,
        None => BTreeMap::new(),
    };

    let rules = parse_rules(file, get("violation"))?;

    let mut additional_variables = BTreeMap::new();
    for (key, value) in &mapping {
        let Some(key) = key.as_str() else { continue };
        if RECOGNIZED_KEYS.contains(&key) {
            continue;
        }
        let json = serde_json::to_value(value).map_err(|e| PolicyError::Schema {
            file: file.to_string(),
            reason: format!("variable {key}: {e}"),
        })?;
        additional_variables.insert(key.to_string(), json);
    }

    Ok(Module {
        file: file.to_string(),
        package,
        annotations,
        title: get("title").and_then(|v| v.as_str()).map(String::from),
        description: get("description").and_then(|v| v.as_str()).map(String::from),
        remarks: get("remarks").and_then(|v| v.as_str()).map(String::from),
        labels,
        rules,
        additional_variables,
    })
}

fn parse_rules(file: &str, value: Option<&serde_yaml::Value>) -> PolicyEvalResult<Vec<Rule>> {
    let Some(value) = value else {
        return Ok(Vec::new());
    };

    let list = value.as_sequence().ok_or_else(|| PolicyError::Schema {
        file: file.to_string(),
        reason: "violation is not a list of rules".to_string(),
    })?;

    let mut rules = Vec::with_capacity(list.len());
    for (index, rule) in list.iter().enumerate() {
        let mapping = rule.as_mapping().ok_or_else(|| PolicyError::Schema {
            file: file.to_string(),
            reason: format!("violation rule {index} is not a mapping"),
        })?;

        let when = mapping
            .get(&serde_yaml::Value::from("when"))
            .ok_or_else(|| PolicyError::Schema {
                file: file.to_string(),
                reason: format!("violation rule {index} has no when condition"),
            })?;
        let when = serde_json::to_value(when).map_err(|e| PolicyError::Schema {
            file: file.to_string(),
            reason: format!("violation rule {index} condition: {e}"),
        })?;

        let emit = match mapping.get(&serde_yaml::Value::from("emit")) {
            Some(emit) => {
                let emit = serde_json::to_value(emit).map_err(|e| PolicyError::Decode {
                    file: file.to_string(),
                    reason: format!("violation rule {index}: {e}"),
                })?;
                if !emit.is_object() {
                    return Err(PolicyError::Decode {
                        file: file.to_string(),
                        reason: format!("violation rule {index} emits a non-object"),
                    });
                }
                emit
            }
            None => serde_json::Value::Object(serde_json::Map::new()),
        };

        rules.push(Rule { when, emit });
    }
    Ok(rules)
}

fn yaml_kind(value: &serde_yaml::Value) -> &'static str {
    match value {
        serde_yaml::Value::Null => "null",
        serde_yaml::Value::Bool(_) => "bool",
        serde_yaml::Value::Number(_) => "number",
        serde_yaml::Value::String(_) => "string",
        serde_yaml::Value::Sequence(_) => "sequence",
        serde_yaml::Value::Mapping(_) => "mapping",
        serde_yaml::Value::Tagged(_) => "tagged value",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_module(dir: &Path, name: &str, content: &str) {
        let mut file = std::fs::File::create(dir.join(name)).unwrap();
        file.write_all(content.as_bytes()).unwrap();
    }

    const MODULE: &str = r#"
package: compliance_framework.local_ssh.deny_password
annotations:
  title: SSH password authentication
  controls:
    - title: AC-3
      description: Access enforcement
title: Password authentication must be disabled
violation:
  - when:
      type: object
      properties:
        password_authentication: { const: true }
      required: [password_authentication]
    emit:
      title: Password authentication enabled
      description: sshd permits password logins
threshold: 3
"#;

    #[test]
    fn test_compile_directory_bundle() {
        let dir = tempfile::tempdir().unwrap();
        write_module(dir.path(), "ssh.yaml", MODULE);
        write_module(dir.path(), "ssh_test.yaml", "package: x.test");

        let bundle = Bundle::compile(dir.path()).unwrap();
        assert_eq!(bundle.modules.len(), 1, "test module must be excluded");

        let module = &bundle.modules[0];
        assert_eq!(module.package, "compliance_framework.local_ssh.deny_password");
        assert_eq!(module.file, "ssh.yaml");
        assert_eq!(module.annotations.controls.len(), 1);
        assert_eq!(module.rules.len(), 1);
        assert_eq!(
            module.additional_variables.get("threshold"),
            Some(&serde_json::json!(3))
        );
    }

    #[test]
    fn test_compile_single_file_bundle() {
        let dir = tempfile::tempdir().unwrap();
        write_module(dir.path(), "ssh.yaml", MODULE);
        let bundle = Bundle::compile(&dir.path().join("ssh.yaml")).unwrap();
        assert_eq!(bundle.modules.len(), 1);
    }

    #[test]
    fn test_compile_missing_bundle_fails() {
        let err = Bundle::compile(Path::new("/nonexistent/bundle")).unwrap_err();
        assert!(matches!(err, PolicyError::Compile { .. }));
    }

    #[test]
    fn test_compile_unparseable_module_fails() {
        let dir = tempfile::tempdir().unwrap();
        write_module(dir.path(), "broken.yaml", "package: [unclosed");
        let err = Bundle::compile(dir.path()).unwrap_err();
        assert!(matches!(err, PolicyError::Compile { .. }));
    }

    #[test]
    fn test_non_mapping_module_is_schema_error() {
        let dir = tempfile::tempdir().unwrap();
        write_module(dir.path(), "list.yaml", "- just\n- a\n- list");
        let err = Bundle::compile(dir.path()).unwrap_err();
        assert!(matches!(err, PolicyError::Schema { .. }));
    }

    #[test]
    fn test_non_object_emit_is_decode_error() {
        let dir = tempfile::tempdir().unwrap();
        write_module(
            dir.path(),
            "bad.yaml",
            "package: x\nviolation:\n  - when: { type: object }\n    emit: just a string",
        );
        let err = Bundle::compile(dir.path()).unwrap_err();
        assert!(matches!(err, PolicyError::Decode { .. }));
    }

    #[test]
    fn test_bundle_of_only_test_modules_fails() {
        let dir = tempfile::tempdir().unwrap();
        write_module(dir.path(), "ssh_test.yaml", "package: x.test");
        let err = Bundle::compile(dir.path()).unwrap_err();
        assert!(matches!(err, PolicyError::Compile { .. }));
    }
}
