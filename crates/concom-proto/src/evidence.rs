//! The evidence model.
//!
//! Evidence is the unit a plugin reports back and the agent ships to the
//! control plane: the outcome of one policy observation together with the
//! subjects, components, activities, and actors that produced it. The
//! plugin fills everything it knows; the agent finalizes identity (the
//! deterministic UUID) and the merged label set before shipping.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Observation state constants used by the control plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatusState {
    #[serde(rename = "satisfied")]
    Satisfied,
    #[serde(rename = "not-satisfied")]
    NotSatisfied,
}

/// Outcome of the observation this evidence records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Status {
    pub state: StatusState,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub remarks: String,
}

/// A free-form name/value property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Property {
    pub name: String,
    pub value: String,
}

/// Who produced the evidence.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Origin {
    #[serde(default)]
    pub actors: Vec<OriginActor>,
}

/// One actor inside an origin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OriginActor {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<Uuid>,
    pub title: String,
    #[serde(rename = "type")]
    pub actor_type: String,
}

/// One step of an activity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<Uuid>,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remarks: Option<String>,
}

impl Step {
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            uuid: None,
            title: title.into(),
            description: description.into(),
            remarks: None,
        }
    }
}

/// Something that was done to collect or judge the data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<Uuid>,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remarks: Option<String>,
    #[serde(default)]
    pub steps: Vec<Step>,
}

impl Activity {
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            uuid: None,
            title: title.into(),
            description: description.into(),
            remarks: None,
            steps: Vec::new(),
        }
    }

    pub fn with_steps(mut self, steps: Vec<Step>) -> Self {
        self.steps = steps;
        self
    }
}

/// What the observation was made against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubjectReference {
    pub title: String,
    #[serde(rename = "type")]
    pub subject_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remarks: Option<String>,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

/// A component of the assessed system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentReference {
    pub identifier: String,
}

/// An inventory item discovered while collecting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryItem {
    pub identifier: String,
    #[serde(rename = "type")]
    pub item_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default)]
    pub props: Vec<Property>,
}

/// One unit of evidence.
///
/// `uuid` is optional on the wire: a plugin may leave it unset and let the
/// agent derive the deterministic seeded UUID while finalizing labels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Evidence {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<Uuid>,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub status: Status,
    #[serde(default)]
    pub props: Vec<Property>,
    #[serde(default)]
    pub origins: Vec<Origin>,
    #[serde(default)]
    pub activities: Vec<Activity>,
    #[serde(default)]
    pub subjects: Vec<SubjectReference>,
    #[serde(default)]
    pub components: Vec<ComponentReference>,
    #[serde(default)]
    pub inventory_items: Vec<InventoryItem>,
}
