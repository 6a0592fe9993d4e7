//! Subprocess lifecycle and the runner RPC surface.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStdout, Command};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use concom_proto::channel::{Incoming, RpcChannel};
use concom_proto::rpc::{error_codes, methods};
use concom_proto::{
    ConfigureRequest, CreateEvidenceRequest, EvalRequest, EvalResponse, EvalStatus, HandshakeLine,
    ProtoError, Response, WireConfig, COOKIE_KEY, COOKIE_VALUE,
};

use crate::broker::{CallbackBroker, EvidenceSink};
use crate::error::{HostError, HostResult};

/// Host tunables.
#[derive(Debug, Clone)]
pub struct HostConfig {
    /// How long a freshly spawned plugin gets to complete the handshake.
    pub handshake_timeout: Duration,
    /// How long a closing plugin gets to exit before it is killed.
    pub shutdown_grace: Duration,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            handshake_timeout: Duration::from_secs(10),
            shutdown_grace: Duration::from_secs(5),
        }
    }
}

/// Launches plugins and keeps track of the handles it handed out.
pub struct PluginHost {
    config: HostConfig,
    broker: Arc<CallbackBroker>,
    handles: StdMutex<Vec<PluginHandle>>,
}

impl PluginHost {
    pub fn new(config: HostConfig) -> Self {
        Self {
            config,
            broker: Arc::new(CallbackBroker::new()),
            handles: StdMutex::new(Vec::new()),
        }
    }

    /// Launch the plugin at `exec_path` and complete the handshake.
    pub async fn launch(&self, exec_path: &Path) -> HostResult<PluginHandle> {
        let handle = PluginHandle {
            inner: Arc::new(HandleInner {
                exec_path: exec_path.to_path_buf(),
                config: self.config.clone(),
                broker: Arc::clone(&self.broker),
                call_slot: Mutex::new(()),
                live: Mutex::new(None),
                closed: AtomicBool::new(false),
            }),
        };

        // Spawn eagerly so a broken plugin fails at launch, not first tick.
        handle.inner.ensure_live().await?;

        if let Ok(mut handles) = self.handles.lock() {
            handles.push(handle.clone());
        }
        Ok(handle)
    }

    /// Terminate every plugin this host launched.
    pub async fn close_all(&self) {
        let handles: Vec<PluginHandle> = match self.handles.lock() {
            Ok(mut handles) => handles.drain(..).collect(),
            Err(_) => Vec::new(),
        };
        for handle in handles {
            handle.close().await;
        }
    }
}

/// A thread-safe reference to one plugin subprocess and its RPC channel.
#[derive(Clone)]
pub struct PluginHandle {
    inner: Arc<HandleInner>,
}

impl std::fmt::Debug for PluginHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginHandle")
            .field("exec_path", &self.inner.exec_path)
            .finish_non_exhaustive()
    }
}

struct HandleInner {
    exec_path: PathBuf,
    config: HostConfig,
    broker: Arc<CallbackBroker>,
    /// Only one `configure` or `eval` may be in flight per handle.
    call_slot: Mutex<()>,
    live: Mutex<Option<LivePlugin>>,
    closed: AtomicBool,
}

struct LivePlugin {
    child: Child,
    channel: Arc<RpcChannel>,
    dispatcher: JoinHandle<()>,
}

impl PluginHandle {
    /// Deliver the plugin's configuration. Plugins validate their typed
    /// view of the config here.
    pub async fn configure(&self, config: WireConfig) -> HostResult<()> {
        let _slot = self.inner.call_slot.lock().await;
        let channel = self.inner.ensure_live().await?;

        let params = serde_json::to_value(ConfigureRequest { config })
            .map_err(|e| HostError::Rpc {
                reason: e.to_string(),
            })?;

        match channel.call(methods::CONFIGURE, params).await {
            Ok(_) => Ok(()),
            Err(ProtoError::ChannelClosed) => Err(self.inner.crashed().await),
            Err(err) => Err(HostError::ConfigureFailed {
                reason: err.to_string(),
            }),
        }
    }

    /// Run an evaluation. Evidence the plugin submits during the call is
    /// routed to `sink`; the call returns when the plugin is done.
    pub async fn eval(
        &self,
        policy_paths: Vec<String>,
        sink: Arc<dyn EvidenceSink>,
    ) -> HostResult<EvalStatus> {
        let _slot = self.inner.call_slot.lock().await;
        let channel = self.inner.ensure_live().await?;

        let callback_id = self.inner.broker.begin(sink);
        let params = serde_json::to_value(EvalRequest {
            policy_paths,
            callback_id,
        })
        .map_err(|e| HostError::Rpc {
            reason: e.to_string(),
        });

        let result = match params {
            Ok(params) => channel.call(methods::EVAL, params).await,
            Err(err) => {
                self.inner.broker.end(callback_id);
                return Err(err);
            }
        };
        self.inner.broker.end(callback_id);

        let value = match result {
            Ok(value) => value,
            Err(ProtoError::ChannelClosed) => return Err(self.inner.crashed().await),
            Err(err) => {
                return Err(HostError::Rpc {
                    reason: err.to_string(),
                })
            }
        };

        let response: EvalResponse =
            serde_json::from_value(value).map_err(|e| HostError::Rpc {
                reason: format!("malformed eval response: {e}"),
            })?;
        Ok(response.status)
    }

    /// Terminate the subprocess and release the handle.
    pub async fn close(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
        let mut live = self.inner.live.lock().await;
        if let Some(mut plugin) = live.take() {
            plugin.dispatcher.abort();
            // Closing the channel closes the child's stdin; give it a
            // grace period to exit on its own before killing it.
            plugin.channel.shutdown();
            match timeout(self.inner.config.shutdown_grace, plugin.child.wait()).await {
                Ok(status) => {
                    debug!(path = %self.inner.exec_path.display(), ?status, "plugin exited")
                }
                Err(_) => {
                    warn!(path = %self.inner.exec_path.display(), "plugin did not exit, killing");
                    let _ = plugin.child.kill().await;
                }
            }
        }
    }
}

impl HandleInner {
    /// Return the live channel, relaunching the subprocess if it died.
    async fn ensure_live(&self) -> HostResult<Arc<RpcChannel>> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(HostError::Closed);
        }

        let mut live = self.live.lock().await;

        if let Some(plugin) = live.as_mut() {
            let exited = matches!(plugin.child.try_wait(), Ok(Some(_)));
            if !exited && !plugin.channel.is_closed() {
                return Ok(Arc::clone(&plugin.channel));
            }
            warn!(path = %self.exec_path.display(), "plugin subprocess is gone, relaunching");
            plugin.dispatcher.abort();
            plugin.channel.shutdown();
            let _ = plugin.child.kill().await;
            *live = None;
        }

        let plugin = self.spawn().await?;
        let channel = Arc::clone(&plugin.channel);
        *live = Some(plugin);
        Ok(channel)
    }

    async fn spawn(&self) -> HostResult<LivePlugin> {
        let path = self.exec_path.display().to_string();
        info!(path = %path, "launching plugin");

        let mut child = Command::new(&self.exec_path)
            .env(COOKIE_KEY, COOKIE_VALUE)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| HostError::Launch {
                path: path.clone(),
                reason: e.to_string(),
            })?;

        let stdout = child.stdout.take().ok_or_else(|| HostError::Launch {
            path: path.clone(),
            reason: "child stdout not captured".to_string(),
        })?;
        let stdin = child.stdin.take().ok_or_else(|| HostError::Launch {
            path: path.clone(),
            reason: "child stdin not captured".to_string(),
        })?;

        let mut reader = BufReader::new(stdout);
        if let Err(err) = self
            .handshake(&mut reader)
            .await
            .map_err(|reason| HostError::HandshakeFailed {
                path: path.clone(),
                reason,
            })
        {
            let _ = child.kill().await;
            return Err(err);
        }

        let (channel, incoming) = RpcChannel::start(reader, stdin);
        let channel = Arc::new(channel);
        let dispatcher = tokio::spawn(dispatch_loop(
            Arc::clone(&channel),
            incoming,
            Arc::clone(&self.broker),
        ));

        Ok(LivePlugin {
            child,
            channel,
            dispatcher,
        })
    }

    async fn handshake(&self, reader: &mut BufReader<ChildStdout>) -> Result<(), String> {
        let mut line = String::new();
        let read = timeout(self.config.handshake_timeout, reader.read_line(&mut line))
            .await
            .map_err(|_| "timed out waiting for handshake".to_string())?
            .map_err(|e| e.to_string())?;
        if read == 0 {
            return Err("plugin closed its stdout before the handshake".to_string());
        }

        let handshake = HandshakeLine::parse(&line).map_err(|e| e.to_string())?;
        handshake.negotiate().map_err(|e| e.to_string())?;
        debug!(
            core = handshake.core_version,
            protocol = handshake.protocol_version,
            "plugin handshake complete"
        );
        Ok(())
    }

    /// Classify a dropped channel once the child's fate is known.
    async fn crashed(&self) -> HostError {
        let mut live = self.live.lock().await;
        let reason = match live.as_mut() {
            Some(plugin) => match plugin.child.try_wait() {
                Ok(Some(status)) => format!("plugin exited with {status}"),
                _ => "plugin closed its rpc channel".to_string(),
            },
            None => "plugin is not running".to_string(),
        };
        HostError::SubprocessCrashed { reason }
    }
}

/// Serve the reverse channel: route evidence submissions to the broker.
async fn dispatch_loop(
    channel: Arc<RpcChannel>,
    mut incoming: mpsc::UnboundedReceiver<Incoming>,
    broker: Arc<CallbackBroker>,
) {
    while let Some(request) = incoming.recv().await {
        let response = match request.method.as_str() {
            methods::CREATE_EVIDENCE => {
                match serde_json::from_value::<CreateEvidenceRequest>(request.params) {
                    Ok(submission) => {
                        match broker
                            .dispatch(submission.callback_id, submission.evidence)
                            .await
                        {
                            Ok(()) => Response::success(request.id, serde_json::json!({})),
                            Err(err) => Response::failure(
                                request.id,
                                error_codes::INTERNAL_ERROR,
                                err.to_string(),
                            ),
                        }
                    }
                    Err(err) => Response::failure(
                        request.id,
                        error_codes::INVALID_PARAMS,
                        err.to_string(),
                    ),
                }
            }
            other => Response::failure(
                request.id,
                error_codes::METHOD_NOT_FOUND,
                format!("unknown method {other}"),
            ),
        };
        if channel.respond(response).is_err() {
            break;
        }
    }
}
