//! Plugin-side SDK.
//!
//! A plugin is an executable that collects data and reports evidence. It
//! implements [`Runner`] and hands it to [`serve`], which checks the magic
//! cookie, emits the handshake line, and then dispatches the agent's
//! `configure` and `eval` calls. During an eval the plugin streams
//! evidence back through the [`EvidenceWriter`] it is given.
//!
//! ```no_run
//! use concom_plugin::{serve, EvidenceWriter, PluginResult, Runner};
//! use concom_proto::{EvalStatus, WireConfig};
//!
//! struct Probe;
//!
//! #[async_trait::async_trait]
//! impl Runner for Probe {
//!     async fn configure(&self, _config: WireConfig) -> PluginResult<()> {
//!         Ok(())
//!     }
//!
//!     async fn eval(
//!         &self,
//!         _policy_paths: Vec<String>,
//!         _evidence: &EvidenceWriter,
//!     ) -> PluginResult<EvalStatus> {
//!         Ok(EvalStatus::Success)
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     if let Err(err) = serve(Probe).await {
//!         eprintln!("plugin failed: {err}");
//!         std::process::exit(1);
//!     }
//! }
//! ```

use std::io::Write as _;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncWrite};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use concom_proto::channel::{Incoming, RpcChannel};
use concom_proto::rpc::{error_codes, methods};
use concom_proto::{
    ConfigureRequest, CreateEvidenceRequest, EvalRequest, EvalResponse, EvalStatus, Evidence,
    HandshakeLine, Response, WireConfig, COOKIE_KEY, COOKIE_VALUE,
};

/// Errors a plugin can fail with.
#[derive(Debug, thiserror::Error)]
pub enum PluginError {
    /// The magic cookie is absent or wrong: the binary was started by
    /// hand instead of by the agent.
    #[error("this binary is a concom plugin and must be launched by the agent")]
    NotLaunchedByAgent,

    /// The plugin rejected its configuration.
    #[error("invalid plugin configuration: {reason}")]
    Config { reason: String },

    /// Data collection or evaluation failed.
    #[error("evaluation failed: {reason}")]
    Eval { reason: String },

    /// The channel to the agent broke down.
    #[error(transparent)]
    Proto(#[from] concom_proto::ProtoError),
}

/// Result type for plugin operations.
pub type PluginResult<T> = Result<T, PluginError>;

/// The contract a plugin implements.
#[async_trait]
pub trait Runner: Send + Sync + 'static {
    /// Validate and adopt the plugin's configuration. Called once before
    /// any eval; decode the typed view with
    /// [`WireConfig::decode_into`].
    async fn configure(&self, config: WireConfig) -> PluginResult<()>;

    /// Collect data, evaluate the given policy bundles, and submit
    /// evidence through `evidence`.
    async fn eval(
        &self,
        policy_paths: Vec<String>,
        evidence: &EvidenceWriter,
    ) -> PluginResult<EvalStatus>;
}

/// Streams evidence batches back to the agent during one eval.
pub struct EvidenceWriter {
    channel: Arc<RpcChannel>,
    callback_id: u32,
}

impl EvidenceWriter {
    /// Submit one batch. Returns once the agent has accepted it, so
    /// evidence submitted before the eval returns is delivered before the
    /// eval's success is.
    pub async fn create_evidence(&self, evidence: Vec<Evidence>) -> PluginResult<()> {
        let params = serde_json::to_value(CreateEvidenceRequest {
            callback_id: self.callback_id,
            evidence,
        })
        .map_err(|e| PluginError::Eval {
            reason: e.to_string(),
        })?;
        self.channel.call(methods::CREATE_EVIDENCE, params).await?;
        Ok(())
    }
}

/// Serve a runner over this process's stdio. Returns when the agent
/// closes the connection.
pub async fn serve<R: Runner>(runner: R) -> PluginResult<()> {
    if std::env::var(COOKIE_KEY).as_deref() != Ok(COOKIE_VALUE) {
        return Err(PluginError::NotLaunchedByAgent);
    }

    // The handshake line goes out before the channel owns stdout.
    {
        let mut stdout = std::io::stdout().lock();
        let _ = writeln!(stdout, "{}", HandshakeLine::current());
        let _ = stdout.flush();
    }

    let reader = tokio::io::BufReader::new(tokio::io::stdin());
    let writer = tokio::io::stdout();
    serve_connection(reader, writer, runner).await
}

/// Serve a runner over an arbitrary connection. [`serve`] uses this with
/// stdio; tests drive it over an in-memory duplex.
pub async fn serve_connection<R, W, T>(reader: R, writer: W, runner: T) -> PluginResult<()>
where
    R: AsyncBufRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
    T: Runner,
{
    let (channel, mut incoming) = RpcChannel::start(reader, writer);
    let channel = Arc::new(channel);

    while let Some(request) = incoming.recv().await {
        let response = handle_request(&channel, &runner, request).await;
        if channel.respond(response).is_err() {
            break;
        }
    }
    debug!("agent closed the connection, shutting down");
    Ok(())
}

async fn handle_request<T: Runner>(
    channel: &Arc<RpcChannel>,
    runner: &T,
    request: Incoming,
) -> Response {
    match request.method.as_str() {
        methods::CONFIGURE => {
            let configure: ConfigureRequest = match serde_json::from_value(request.params) {
                Ok(configure) => configure,
                Err(err) => {
                    return Response::failure(request.id, error_codes::INVALID_PARAMS, err.to_string())
                }
            };
            match runner.configure(configure.config).await {
                Ok(()) => Response::success(request.id, serde_json::json!({})),
                Err(err) => {
                    warn!(error = %err, "configure rejected");
                    Response::failure(request.id, error_codes::INTERNAL_ERROR, err.to_string())
                }
            }
        }
        methods::EVAL => {
            let eval: EvalRequest = match serde_json::from_value(request.params) {
                Ok(eval) => eval,
                Err(err) => {
                    return Response::failure(request.id, error_codes::INVALID_PARAMS, err.to_string())
                }
            };
            let writer = EvidenceWriter {
                channel: Arc::clone(channel),
                callback_id: eval.callback_id,
            };
            match runner.eval(eval.policy_paths, &writer).await {
                Ok(status) => match serde_json::to_value(EvalResponse { status }) {
                    Ok(value) => Response::success(request.id, value),
                    Err(err) => {
                        Response::failure(request.id, error_codes::INTERNAL_ERROR, err.to_string())
                    }
                },
                Err(err) => {
                    warn!(error = %err, "eval failed");
                    Response::failure(request.id, error_codes::INTERNAL_ERROR, err.to_string())
                }
            }
        }
        other => Response::failure(
            request.id,
            error_codes::METHOD_NOT_FOUND,
            format!("unknown method {other}"),
        ),
    }
}
