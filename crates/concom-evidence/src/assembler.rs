//! Turning policy results into evidence.
//!
//! Assembly happens in two stages. Inside the plugin, [`assemble`] folds
//! one [`PolicyResult`] together with the plugin's collection context into
//! a draft record: status, texts, preserved violations, and the two
//! synthetic activities. The agent then runs [`finalize`] to merge the
//! label layers and stamp the deterministic UUID before shipping.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use concom_policy::PolicyResult;
use concom_proto::{
    Activity, ComponentReference, Evidence, InventoryItem, Origin, OriginActor, Property, Status,
    StatusState, Step, SubjectReference,
};

use crate::identity::{evidence_seed, seeded_uuid};
use crate::labels::{merge_labels, LABEL_POLICY, LABEL_POLICY_PATH};

/// Context a plugin attaches to the evidence of one evaluation.
#[derive(Debug, Clone, Default)]
pub struct PluginContext {
    pub subjects: Vec<SubjectReference>,
    pub components: Vec<ComponentReference>,
    pub inventory_items: Vec<InventoryItem>,
    pub actors: Vec<OriginActor>,
    pub activities: Vec<Activity>,
}

/// Build the draft evidence record for one policy result.
///
/// One record summarizes the whole result: all violation content is
/// preserved verbatim in the props, and the first violation supplies the
/// record's texts when the policy is not satisfied.
pub fn assemble(
    result: &PolicyResult,
    context: &PluginContext,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Evidence {
    let mut labels = result.labels.clone();
    labels.insert(LABEL_POLICY.to_string(), result.policy.package.clone());
    labels.insert(LABEL_POLICY_PATH.to_string(), result.policy.file.clone());

    let policy_title = result
        .title
        .clone()
        .or_else(|| result.policy.annotations.title.clone());

    let (title, description, status) = if result.is_satisfied() {
        (
            policy_title.unwrap_or_else(|| format!("Policy {} is satisfied", result.policy.package)),
            result.description.clone().unwrap_or_else(|| {
                format!(
                    "All checks of policy {} passed against the collected data",
                    result.policy.package
                )
            }),
            Status {
                state: StatusState::Satisfied,
                reason: "no violations found".to_string(),
                remarks: result.remarks.clone().unwrap_or_default(),
            },
        )
    } else {
        let first = &result.violations[0];
        (
            first
                .title
                .clone()
                .or(policy_title)
                .unwrap_or_else(|| format!("Policy {} is not satisfied", result.policy.package)),
            first
                .description
                .clone()
                .or_else(|| result.description.clone())
                .unwrap_or_default(),
            Status {
                state: StatusState::NotSatisfied,
                reason: format!("{} violation(s) found", result.violations.len()),
                remarks: first
                    .remarks
                    .clone()
                    .or_else(|| result.remarks.clone())
                    .unwrap_or_default(),
            },
        )
    };

    let mut activities = vec![
        Activity::new(
            "Execute policy",
            format!(
                "Execute policy {} from {} against the collected data",
                result.policy.package, result.policy.file
            ),
        )
        .with_steps(vec![
            Step::new("Compile policy bundle", "Compile the policy bundle into executable modules"),
            Step::new("Query module package", "Query the module package with the input bound"),
        ]),
        Activity::new("Compile results", "Compile policy output into evidence")
            .with_steps(vec![
                Step::new("Extract violations", "Extract violations from the module output"),
                Step::new("Build evidence", "Attach subjects, components, and labels"),
            ]),
    ];
    activities.extend(context.activities.iter().cloned());

    let origins = if context.actors.is_empty() {
        Vec::new()
    } else {
        vec![Origin {
            actors: context.actors.clone(),
        }]
    };

    Evidence {
        uuid: None,
        title,
        description,
        labels,
        start,
        end,
        status,
        props: build_props(result),
        origins,
        activities,
        subjects: context.subjects.clone(),
        components: context.components.clone(),
        inventory_items: context.inventory_items.clone(),
    }
}

/// Merge label layers and stamp the deterministic UUID.
///
/// The draft's policy-identity labels form the lowest layer, then agent
/// labels, then plugin-config labels, then the remaining draft labels
/// (the policy result's own), later layers winning.
pub fn finalize(
    mut draft: Evidence,
    agent_labels: &BTreeMap<String, String>,
    plugin_labels: &BTreeMap<String, String>,
) -> Evidence {
    let mut policy_part = BTreeMap::new();
    let mut result_part = BTreeMap::new();
    for (key, value) in std::mem::take(&mut draft.labels) {
        if key == LABEL_POLICY || key == LABEL_POLICY_PATH {
            policy_part.insert(key, value);
        } else {
            result_part.insert(key, value);
        }
    }

    let merged = merge_labels(&policy_part, agent_labels, plugin_labels, &result_part);

    let package = merged.get(LABEL_POLICY).cloned().unwrap_or_default();
    let file = merged.get(LABEL_POLICY_PATH).cloned().unwrap_or_default();
    let seed = evidence_seed(&merged, &package, &file);

    draft.uuid = Some(seeded_uuid(&seed));
    draft.labels = merged;
    draft
}

fn build_props(result: &PolicyResult) -> Vec<Property> {
    let mut props = Vec::new();

    for (index, violation) in result.violations.iter().enumerate() {
        if let Some(title) = &violation.title {
            props.push(prop(format!("violation[{index}].title"), title));
        }
        if let Some(description) = &violation.description {
            props.push(prop(format!("violation[{index}].description"), description));
        }
        if let Some(remarks) = &violation.remarks {
            props.push(prop(format!("violation[{index}].remarks"), remarks));
        }
        for (key, value) in &violation.extra {
            props.push(prop(
                format!("violation[{index}].{key}"),
                &value.to_string(),
            ));
        }
    }

    for (key, value) in &result.additional_variables {
        props.push(prop(format!("var.{key}"), &value.to_string()));
    }

    for (index, control) in result.policy.annotations.controls.iter().enumerate() {
        props.push(prop(format!("control[{index}]"), &control.title));
    }

    props
}

fn prop(name: String, value: &str) -> Property {
    Property {
        name,
        value: value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use concom_policy::{Annotations, Control, Policy, Violation};

    fn result_with(violations: Vec<Violation>) -> PolicyResult {
        PolicyResult {
            policy: Policy {
                file: "ssh.yaml".into(),
                package: "compliance_framework.local_ssh".into(),
                annotations: Annotations {
                    title: Some("SSH baseline".into()),
                    description: None,
                    controls: vec![Control {
                        title: "AC-3".into(),
                        description: "Access enforcement".into(),
                        class: None,
                    }],
                    extra: BTreeMap::new(),
                },
            },
            title: None,
            description: None,
            remarks: None,
            labels: BTreeMap::from([("severity".to_string(), "high".to_string())]),
            violations,
            additional_variables: BTreeMap::from([(
                "checked_hosts".to_string(),
                serde_json::json!(3),
            )]),
        }
    }

    fn agent_labels() -> BTreeMap<String, String> {
        BTreeMap::from([("_agent".to_string(), "concom".to_string())])
    }

    fn plugin_labels() -> BTreeMap<String, String> {
        BTreeMap::from([("_plugin".to_string(), "ssh".to_string())])
    }

    #[test]
    fn test_satisfied_result_yields_satisfied_evidence() {
        let result = result_with(Vec::new());
        let draft = assemble(&result, &PluginContext::default(), Utc::now(), Utc::now());

        assert_eq!(draft.status.state, StatusState::Satisfied);
        assert_eq!(draft.title, "SSH baseline");
        assert!(draft.description.contains("passed"));
        assert!(draft.uuid.is_none(), "identity is stamped at finalize");
    }

    #[test]
    fn test_violation_supplies_texts_and_is_preserved_in_props() {
        let result = result_with(vec![Violation {
            title: Some("T".into()),
            description: Some("D".into()),
            remarks: Some("R".into()),
            extra: BTreeMap::new(),
        }]);
        let draft = assemble(&result, &PluginContext::default(), Utc::now(), Utc::now());

        assert_eq!(draft.status.state, StatusState::NotSatisfied);
        assert_eq!(draft.status.reason, "1 violation(s) found");
        assert_eq!(draft.title, "T");
        assert_eq!(draft.description, "D");
        assert_eq!(draft.status.remarks, "R");

        let names: Vec<_> = draft.props.iter().map(|p| p.name.as_str()).collect();
        assert!(names.contains(&"violation[0].title"));
        assert!(names.contains(&"violation[0].description"));
        assert!(names.contains(&"violation[0].remarks"));
        assert!(names.contains(&"var.checked_hosts"));
        assert!(names.contains(&"control[0]"));
    }

    #[test]
    fn test_multiple_violations_lose_no_content() {
        let result = result_with(vec![
            Violation {
                title: Some("first".into()),
                ..Violation::default()
            },
            Violation {
                title: Some("second".into()),
                ..Violation::default()
            },
        ]);
        let draft = assemble(&result, &PluginContext::default(), Utc::now(), Utc::now());

        let titles: Vec<_> = draft
            .props
            .iter()
            .filter(|p| p.name.ends_with(".title"))
            .map(|p| p.value.as_str())
            .collect();
        assert_eq!(titles, vec!["first", "second"]);
    }

    #[test]
    fn test_synthetic_activities_are_prepended() {
        let result = result_with(Vec::new());
        let context = PluginContext {
            activities: vec![Activity::new("Collect sshd config", "Read sshd_config")],
            ..PluginContext::default()
        };
        let draft = assemble(&result, &context, Utc::now(), Utc::now());

        let titles: Vec<_> = draft.activities.iter().map(|a| a.title.as_str()).collect();
        assert_eq!(
            titles,
            vec!["Execute policy", "Compile results", "Collect sshd config"]
        );
        assert_eq!(draft.activities[0].steps.len(), 2);
    }

    #[test]
    fn test_finalize_merges_labels_and_stamps_uuid() {
        let result = result_with(Vec::new());
        let draft = assemble(&result, &PluginContext::default(), Utc::now(), Utc::now());
        let evidence = finalize(draft, &agent_labels(), &plugin_labels());

        assert_eq!(evidence.labels.get("_agent").unwrap(), "concom");
        assert_eq!(evidence.labels.get("_plugin").unwrap(), "ssh");
        assert_eq!(
            evidence.labels.get("_policy").unwrap(),
            "compliance_framework.local_ssh"
        );
        assert_eq!(evidence.labels.get("_policy_path").unwrap(), "ssh.yaml");
        assert_eq!(evidence.labels.get("severity").unwrap(), "high");
        assert!(evidence.uuid.is_some());
    }

    #[test]
    fn test_finalized_uuid_is_stable_across_reruns() {
        let result = result_with(Vec::new());
        let a = finalize(
            assemble(&result, &PluginContext::default(), Utc::now(), Utc::now()),
            &agent_labels(),
            &plugin_labels(),
        );
        let b = finalize(
            assemble(&result, &PluginContext::default(), Utc::now(), Utc::now()),
            &agent_labels(),
            &plugin_labels(),
        );
        assert_eq!(a.uuid, b.uuid);
    }

    #[test]
    fn test_finalized_uuid_differs_across_agents() {
        let result = result_with(Vec::new());
        let ours = finalize(
            assemble(&result, &PluginContext::default(), Utc::now(), Utc::now()),
            &agent_labels(),
            &plugin_labels(),
        );
        let theirs = finalize(
            assemble(&result, &PluginContext::default(), Utc::now(), Utc::now()),
            &BTreeMap::from([("_agent".to_string(), "other-agent".to_string())]),
            &plugin_labels(),
        );
        assert_ne!(ours.uuid, theirs.uuid);
    }

    #[test]
    fn test_result_labels_override_plugin_labels() {
        let mut result = result_with(Vec::new());
        result
            .labels
            .insert("env".to_string(), "from-result".to_string());
        let draft = assemble(&result, &PluginContext::default(), Utc::now(), Utc::now());

        let plugin = BTreeMap::from([("env".to_string(), "from-plugin".to_string())]);
        let evidence = finalize(draft, &agent_labels(), &plugin);
        assert_eq!(evidence.labels.get("env").unwrap(), "from-result");
    }
}
