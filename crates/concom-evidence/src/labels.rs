//! Well-known labels and the merge precedence.

use std::collections::BTreeMap;

/// Identifies the agent deployment that produced a record.
pub const LABEL_AGENT: &str = "_agent";

/// Name of the plugin entry that produced a record.
pub const LABEL_PLUGIN: &str = "_plugin";

/// Pure package of the policy module behind a record.
pub const LABEL_POLICY: &str = "_policy";

/// Bundle-relative file of the policy module behind a record.
pub const LABEL_POLICY_PATH: &str = "_policy_path";

/// Merge the four label layers; later layers win:
/// policy identity, then agent labels, then plugin-config labels, then
/// policy-result labels.
pub fn merge_labels(
    policy: &BTreeMap<String, String>,
    agent: &BTreeMap<String, String>,
    plugin: &BTreeMap<String, String>,
    result: &BTreeMap<String, String>,
) -> BTreeMap<String, String> {
    let mut merged = policy.clone();
    merged.extend(agent.iter().map(|(k, v)| (k.clone(), v.clone())));
    merged.extend(plugin.iter().map(|(k, v)| (k.clone(), v.clone())));
    merged.extend(result.iter().map(|(k, v)| (k.clone(), v.clone())));
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(entries: &[(&str, &str)]) -> BTreeMap<String, String> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_later_layers_win() {
        let merged = merge_labels(
            &map(&[("_policy", "a.b"), ("env", "policy")]),
            &map(&[("env", "agent"), ("_agent", "concom")]),
            &map(&[("env", "plugin"), ("team", "sec")]),
            &map(&[("env", "result")]),
        );
        assert_eq!(merged.get("env").unwrap(), "result");
        assert_eq!(merged.get("_agent").unwrap(), "concom");
        assert_eq!(merged.get("team").unwrap(), "sec");
        assert_eq!(merged.get("_policy").unwrap(), "a.b");
    }
}
