//! The top-level agent.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use concom_config::{AgentConfig, CliOverrides};
use concom_scheduler::{heartbeat_expression, random_heartbeat_offset, Scheduler};

use crate::error::AgentResult;
use crate::heartbeat::HeartbeatHandler;
use crate::identity::AgentIdentity;
use crate::sd_notify;
use crate::state::RunState;
use crate::tick::PluginTickHandler;
use crate::watch::watch_config;

/// How one daemon iteration ended.
enum Outcome {
    /// A termination signal (or external shutdown) arrived.
    Terminate,
    /// The config file changed; rebuild and go again.
    Reload,
}

/// Options the CLI hands to the agent.
#[derive(Debug, Clone)]
pub struct AgentOptions {
    pub config_path: PathBuf,
    pub overrides: CliOverrides,
    /// Base directory of the artifact cache; defaults to the home dir.
    pub base_dir: Option<PathBuf>,
    /// Agent identity override; defaults to the local hostname.
    pub identity: Option<AgentIdentity>,
    /// Cancelling this token shuts the agent down, like a signal would.
    pub shutdown: CancellationToken,
}

impl AgentOptions {
    pub fn new(config_path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
            overrides: CliOverrides::default(),
            base_dir: None,
            identity: None,
            shutdown: CancellationToken::new(),
        }
    }
}

/// The agent orchestrator.
pub struct Agent {
    options: AgentOptions,
}

impl Agent {
    pub fn new(options: AgentOptions) -> Self {
        Self { options }
    }

    /// Run to completion: a single pass in one-shot mode, or until a
    /// termination signal in daemon mode.
    pub async fn run(&self) -> AgentResult<()> {
        let mut config = self.load_config()?;
        info!(daemon = config.daemon, plugins = config.plugins.len(), "starting agent");

        if !config.daemon {
            return self.run_once(&config).await;
        }

        // The watcher must outlive the loop; dropping it stops events.
        let (_watcher, mut reload_rx) = watch_config(&self.options.config_path)?;

        loop {
            match self.run_daemon(&config, &mut reload_rx).await? {
                Outcome::Terminate => return Ok(()),
                Outcome::Reload => match self.load_config() {
                    Ok(fresh) => {
                        info!("configuration reloaded");
                        config = fresh;
                    }
                    Err(err) => {
                        // Keep the previous valid config running rather
                        // than dying on a half-edited file.
                        error!(error = %err, "config reload failed, keeping previous config");
                    }
                },
            }
        }
    }

    fn load_config(&self) -> AgentResult<AgentConfig> {
        let mut config = AgentConfig::load(&self.options.config_path)?;
        config.merge_overrides(&self.options.overrides);
        config.validate()?;
        Ok(config)
    }

    fn build_state(&self, config: &AgentConfig) -> AgentResult<RunState> {
        let base_dir = self
            .options
            .base_dir
            .clone()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."));
        let identity = self
            .options
            .identity
            .clone()
            .unwrap_or_else(AgentIdentity::from_host);
        RunState::new(config, base_dir, identity)
    }

    /// One sequential pass over all plugins; the first failure is fatal.
    async fn run_once(&self, config: &AgentConfig) -> AgentResult<()> {
        let state = self.build_state(config)?;
        state.predownload(config).await?;

        let token = self.options.shutdown.child_token();
        let mut result = Ok(());
        for (name, spec) in &config.plugins {
            if token.is_cancelled() {
                break;
            }
            info!(plugin = %name, "running plugin");
            if let Err(err) = state.run_plugin(name, spec, token.clone()).await {
                result = Err(err);
                break;
            }
        }

        state.shutdown().await;
        result
    }

    /// One daemon iteration: build everything from `config`, run until a
    /// signal or a config change, tear everything down.
    async fn run_daemon(
        &self,
        config: &AgentConfig,
        reload_rx: &mut mpsc::Receiver<()>,
    ) -> AgentResult<Outcome> {
        let state = Arc::new(self.build_state(config)?);
        state.predownload(config).await?;

        let root = self.options.shutdown.child_token();
        let mut scheduler = Scheduler::new(&root);

        for (name, spec) in &config.plugins {
            let handler = PluginTickHandler::new(name, spec.clone(), Arc::clone(&state));
            scheduler.add_entry(name, spec.effective_schedule(), Arc::new(handler))?;
        }

        let offset = random_heartbeat_offset();
        let heartbeat = HeartbeatHandler::new(Arc::clone(&state.api), state.identity.clone());
        scheduler.add_entry("heartbeat", &heartbeat_expression(offset), Arc::new(heartbeat))?;

        scheduler.start();
        sd_notify::notify_ready();
        info!(heartbeat_offset = offset, "daemon running");

        let outcome = tokio::select! {
            _ = self.options.shutdown.cancelled() => Outcome::Terminate,
            _ = wait_for_signal() => {
                info!("received signal to terminate plugins and exit");
                Outcome::Terminate
            }
            changed = reload_rx.recv() => match changed {
                Some(()) => {
                    info!("config file changed, rebuilding");
                    Outcome::Reload
                }
                None => {
                    warn!("config watcher stopped, shutting down");
                    Outcome::Terminate
                }
            },
        };

        root.cancel();
        scheduler.stop().await;
        for status in scheduler.statuses() {
            if status.consecutive_failures > 0 {
                warn!(
                    entry = %status.name,
                    failures = status.consecutive_failures,
                    last_error = ?status.last_error,
                    "entry was failing when the schedule stopped"
                );
            }
        }
        state.shutdown().await;
        Ok(outcome)
    }
}

/// Resolve on SIGINT or SIGTERM.
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    match (signal(SignalKind::interrupt()), signal(SignalKind::terminate())) {
        (Ok(mut int), Ok(mut term)) => {
            tokio::select! {
                _ = int.recv() => {}
                _ = term.recv() => {}
            }
        }
        _ => std::future::pending().await,
    }
}
