//! Download trail records.
//!
//! Every resolution produces a small report of how the artifact was
//! obtained. The orchestrator aggregates these into its setup record so an
//! operator can see where each plugin and bundle actually came from.

/// One step of a resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportStep {
    pub title: String,
    pub description: String,
}

impl ReportStep {
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
        }
    }
}

/// The trail of one artifact resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolveReport {
    pub title: String,
    pub description: String,
    pub steps: Vec<ReportStep>,
}

impl ResolveReport {
    pub fn new(kind: &str, source: &str) -> Self {
        Self {
            title: format!("Resolving {kind}"),
            description: format!("Resolving {kind} from {source}"),
            steps: Vec::new(),
        }
    }

    pub fn push(&mut self, step: ReportStep) {
        self.steps.push(step);
    }
}
