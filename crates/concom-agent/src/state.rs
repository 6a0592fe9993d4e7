//! Shared state of one agent run.
//!
//! A `RunState` lives exactly as long as one configuration: one-shot runs
//! build one and tear it down at the end, daemon runs rebuild it from
//! scratch whenever the config file changes.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use concom_config::{AgentConfig, PluginSpec};
use concom_evidence::{ApiClient, LABEL_PLUGIN};
use concom_host::{HostConfig, PluginHandle, PluginHost};
use concom_proto::{EvalStatus, WireConfig};
use concom_registry::{ArtifactKind, ArtifactResolver, ResolveReport};

use crate::error::{AgentError, AgentResult};
use crate::identity::AgentIdentity;
use crate::sink::ShippingSink;

/// Everything a run owns: resolver cache, plugin host, API client, and
/// the live handles keyed by plugin name.
pub struct RunState {
    pub resolver: ArtifactResolver,
    pub host: PluginHost,
    pub api: Arc<ApiClient>,
    pub identity: AgentIdentity,
    /// Ticks hold this shared; shutdown takes it exclusively so in-flight
    /// runs finish before their host is torn down.
    pub reconcile_lock: RwLock<()>,
    handles: Mutex<HashMap<String, PluginHandle>>,
}

impl RunState {
    pub fn new(
        config: &AgentConfig,
        base_dir: PathBuf,
        identity: AgentIdentity,
    ) -> AgentResult<Self> {
        let api = ApiClient::new(&config.api()?.url)?;
        Ok(Self {
            resolver: ArtifactResolver::new(base_dir)?,
            host: PluginHost::new(HostConfig::default()),
            api: Arc::new(api),
            identity,
            reconcile_lock: RwLock::new(()),
            handles: Mutex::new(HashMap::new()),
        })
    }

    /// Pessimistic pre-download: resolve every unique plugin and policy
    /// reference before anything is scheduled, so misconfiguration fails
    /// here rather than at first tick.
    pub async fn predownload(&self, config: &AgentConfig) -> AgentResult<Vec<ResolveReport>> {
        let mut plugin_sources = BTreeSet::new();
        let mut policy_sources = BTreeSet::new();
        for spec in config.plugins.values() {
            plugin_sources.insert(spec.source.clone());
            for policy in &spec.policies {
                policy_sources.insert(policy.clone());
            }
        }

        let mut reports = Vec::new();
        for source in plugin_sources {
            let resolution = self.resolver.resolve(&source, ArtifactKind::Plugin).await?;
            debug!(source = %source, path = %resolution.path.display(), "plugin resolved");
            reports.push(resolution.report);
        }
        for source in policy_sources {
            let resolution = self.resolver.resolve(&source, ArtifactKind::Policy).await?;
            debug!(source = %source, path = %resolution.path.display(), "policy bundle resolved");
            reports.push(resolution.report);
        }

        info!(artifacts = reports.len(), "pre-download complete");
        Ok(reports)
    }

    /// Run one plugin pass: resolve, configure, evaluate, ship.
    pub async fn run_plugin(
        &self,
        name: &str,
        spec: &PluginSpec,
        token: CancellationToken,
    ) -> AgentResult<()> {
        let source = self.resolver.resolve(&spec.source, ArtifactKind::Plugin).await?;
        let mut policy_paths = Vec::with_capacity(spec.policies.len());
        for policy in &spec.policies {
            let resolution = self.resolver.resolve(policy, ArtifactKind::Policy).await?;
            policy_paths.push(resolution.path.display().to_string());
        }

        if token.is_cancelled() {
            debug!(plugin = name, "tick cancelled before configure");
            return Ok(());
        }

        let handle = self.handle_for(name, &source.path).await?;

        let dynamic = spec.dynamic_config()?;
        let wire = match dynamic.as_map() {
            Some(map) => WireConfig::encode(map)?,
            None => WireConfig::default(),
        };
        handle.configure(wire).await?;

        if token.is_cancelled() {
            debug!(plugin = name, "tick cancelled before eval");
            return Ok(());
        }

        let mut plugin_labels = BTreeMap::new();
        plugin_labels.insert(LABEL_PLUGIN.to_string(), name.to_string());
        plugin_labels.extend(spec.labels.iter().map(|(k, v)| (k.clone(), v.clone())));

        let sink = Arc::new(ShippingSink::new(
            Arc::clone(&self.api),
            self.identity.labels().clone(),
            plugin_labels,
        ));

        match handle.eval(policy_paths, sink).await? {
            EvalStatus::Success => Ok(()),
            EvalStatus::Failure => Err(AgentError::PluginRun {
                name: name.to_string(),
                reason: "plugin reported evaluation failure".to_string(),
            }),
        }
    }

    async fn handle_for(&self, name: &str, exec_path: &std::path::Path) -> AgentResult<PluginHandle> {
        let mut handles = self.handles.lock().await;
        if let Some(handle) = handles.get(name) {
            return Ok(handle.clone());
        }
        let handle = self.host.launch(exec_path).await?;
        handles.insert(name.to_string(), handle.clone());
        Ok(handle)
    }

    /// Wait out in-flight ticks and terminate every plugin.
    pub async fn shutdown(&self) {
        let _exclusive = self.reconcile_lock.write().await;
        self.host.close_all().await;
        self.handles.lock().await.clear();
    }
}
