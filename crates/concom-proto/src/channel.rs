//! Bidirectional JSON-RPC channel.
//!
//! One channel runs over one duplex byte stream (in production the
//! plugin's stdio). Either side can issue calls and serve the peer's
//! requests at the same time: a reader task routes incoming responses to
//! pending calls and forwards incoming requests to the owner, and a writer
//! task serializes outgoing frames. Both sides of the contract use this
//! same machinery.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncBufRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::error::{ProtoError, ProtoResult};
use crate::rpc::{encode_line, Frame, Request, Response};

/// A request received from the peer, to be answered with
/// [`RpcChannel::respond`].
#[derive(Debug)]
pub struct Incoming {
    pub id: u64,
    pub method: String,
    pub params: Value,
}

/// One side of a bidirectional JSON-RPC connection.
pub struct RpcChannel {
    writer_tx: mpsc::UnboundedSender<String>,
    pending: Arc<Mutex<HashMap<u64, oneshot::Sender<Response>>>>,
    next_id: AtomicU64,
    closed_rx: watch::Receiver<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl RpcChannel {
    /// Start the channel over a reader/writer pair.
    ///
    /// Returns the channel and the stream of requests the peer sends us.
    pub fn start<R, W>(reader: R, writer: W) -> (Self, mpsc::UnboundedReceiver<Incoming>)
    where
        R: AsyncBufRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (writer_tx, writer_rx) = mpsc::unbounded_channel::<String>();
        let (incoming_tx, incoming_rx) = mpsc::unbounded_channel();
        let (closed_tx, closed_rx) = watch::channel(false);
        let pending: Arc<Mutex<HashMap<u64, oneshot::Sender<Response>>>> =
            Arc::new(Mutex::new(HashMap::new()));

        let writer_task = tokio::spawn(write_loop(writer, writer_rx));
        let reader_task = tokio::spawn(read_loop(
            reader,
            Arc::clone(&pending),
            incoming_tx,
            closed_tx,
        ));

        (
            Self {
                writer_tx,
                pending,
                next_id: AtomicU64::new(1),
                closed_rx,
                tasks: vec![writer_task, reader_task],
            },
            incoming_rx,
        )
    }

    /// Issue a call and wait for the peer's response.
    pub async fn call(&self, method: &str, params: Value) -> ProtoResult<Value> {
        if self.is_closed() {
            return Err(ProtoError::ChannelClosed);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        if let Ok(mut pending) = self.pending.lock() {
            pending.insert(id, tx);
        }

        let line = encode_line(&Request::new(id, method, params));
        trace!(id, method, "sending request");
        if self.writer_tx.send(line).is_err() {
            if let Ok(mut pending) = self.pending.lock() {
                pending.remove(&id);
            }
            return Err(ProtoError::ChannelClosed);
        }

        // Also watch the close signal: the reader may have torn down the
        // pending table in the window before this call registered.
        tokio::select! {
            biased;
            response = rx => match response {
                Ok(response) => response.into_result(),
                Err(_) => Err(ProtoError::ChannelClosed),
            },
            _ = self.closed() => Err(ProtoError::ChannelClosed),
        }
    }

    /// Answer a request previously received on the incoming stream.
    pub fn respond(&self, response: Response) -> ProtoResult<()> {
        self.writer_tx
            .send(encode_line(&response))
            .map_err(|_| ProtoError::ChannelClosed)
    }

    /// Stop both IO tasks, dropping the underlying reader and writer.
    ///
    /// Over a subprocess's stdio this closes the child's stdin, which is
    /// the signal for a well-behaved plugin to exit.
    pub fn shutdown(&self) {
        for task in &self.tasks {
            task.abort();
        }
    }

    /// Whether the peer has gone away.
    pub fn is_closed(&self) -> bool {
        *self.closed_rx.borrow()
    }

    /// Wait until the peer closes the connection.
    pub async fn closed(&self) {
        let mut rx = self.closed_rx.clone();
        while !*rx.borrow() {
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

impl Drop for RpcChannel {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

async fn write_loop<W>(mut writer: W, mut rx: mpsc::UnboundedReceiver<String>)
where
    W: AsyncWrite + Unpin,
{
    while let Some(mut line) = rx.recv().await {
        line.push('\n');
        if writer.write_all(line.as_bytes()).await.is_err() {
            break;
        }
        if writer.flush().await.is_err() {
            break;
        }
    }
}

async fn read_loop<R>(
    mut reader: R,
    pending: Arc<Mutex<HashMap<u64, oneshot::Sender<Response>>>>,
    incoming_tx: mpsc::UnboundedSender<Incoming>,
    closed_tx: watch::Sender<bool>,
) where
    R: AsyncBufRead + Unpin,
{
    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => break,
            Ok(_) => {}
            Err(err) => {
                debug!(error = %err, "rpc channel read failed");
                break;
            }
        }
        if line.trim().is_empty() {
            continue;
        }

        match Frame::parse(&line) {
            Ok(Frame::Response(response)) => {
                let waiter = pending
                    .lock()
                    .ok()
                    .and_then(|mut pending| pending.remove(&response.id));
                match waiter {
                    Some(tx) => {
                        let _ = tx.send(response);
                    }
                    None => warn!(id = response.id, "response for unknown call"),
                }
            }
            Ok(Frame::Request(request)) => {
                let incoming = Incoming {
                    id: request.id,
                    method: request.method,
                    params: request.params,
                };
                if incoming_tx.send(incoming).is_err() {
                    break;
                }
            }
            Err(err) => {
                warn!(error = %err, "dropping malformed frame");
            }
        }
    }

    // Wake pending calls and the incoming consumer.
    let _ = closed_tx.send(true);
    if let Ok(mut pending) = pending.lock() {
        pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::error_codes;

    fn pair() -> (
        (RpcChannel, mpsc::UnboundedReceiver<Incoming>),
        (RpcChannel, mpsc::UnboundedReceiver<Incoming>),
    ) {
        let (a, b) = tokio::io::duplex(64 * 1024);
        let (a_read, a_write) = tokio::io::split(a);
        let (b_read, b_write) = tokio::io::split(b);
        (
            RpcChannel::start(tokio::io::BufReader::new(a_read), a_write),
            RpcChannel::start(tokio::io::BufReader::new(b_read), b_write),
        )
    }

    #[tokio::test]
    async fn test_call_and_respond() {
        let ((caller, _caller_in), (callee, mut callee_in)) = pair();

        let server = tokio::spawn(async move {
            let incoming = callee_in.recv().await.unwrap();
            assert_eq!(incoming.method, "plugin.configure");
            callee
                .respond(Response::success(incoming.id, serde_json::json!({"ok": true})))
                .unwrap();
            callee
        });

        let result = caller
            .call("plugin.configure", serde_json::json!({"config": {"items": []}}))
            .await
            .unwrap();
        assert_eq!(result, serde_json::json!({"ok": true}));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_error_response_surfaces() {
        let ((caller, _caller_in), (callee, mut callee_in)) = pair();

        tokio::spawn(async move {
            let incoming = callee_in.recv().await.unwrap();
            callee
                .respond(Response::failure(
                    incoming.id,
                    error_codes::INTERNAL_ERROR,
                    "no good",
                ))
                .unwrap();
            callee
        });

        let err = caller.call("plugin.eval", Value::Null).await.unwrap_err();
        assert!(matches!(err, ProtoError::Rpc { .. }));
    }

    #[tokio::test]
    async fn test_concurrent_calls_in_both_directions() {
        let ((host, mut host_in), (plugin, mut plugin_in)) = pair();
        let host = Arc::new(host);
        let plugin = Arc::new(plugin);

        // The plugin answers eval only after a callback to the host
        // completes, which is the shape of a real evaluation.
        let plugin_task = tokio::spawn({
            let plugin = Arc::clone(&plugin);
            async move {
                let eval = plugin_in.recv().await.unwrap();
                assert_eq!(eval.method, "plugin.eval");
                let callback = plugin
                    .call("host.create_evidence", serde_json::json!({"callback_id": 1}))
                    .await
                    .unwrap();
                assert_eq!(callback, Value::Null);
                plugin
                    .respond(Response::success(eval.id, serde_json::json!({"status": "SUCCESS"})))
                    .unwrap();
            }
        });

        let host_dispatch = tokio::spawn({
            let host = Arc::clone(&host);
            async move {
                let incoming = host_in.recv().await.unwrap();
                assert_eq!(incoming.method, "host.create_evidence");
                host.respond(Response::success(incoming.id, Value::Null)).unwrap();
            }
        });

        let result = host.call("plugin.eval", Value::Null).await.unwrap();
        assert_eq!(result["status"], "SUCCESS");
        plugin_task.await.unwrap();
        host_dispatch.await.unwrap();
    }

    #[tokio::test]
    async fn test_peer_hangup_fails_pending_calls() {
        let ((caller, _caller_in), (callee, _callee_in)) = pair();

        let call = tokio::spawn(async move { caller.call("plugin.eval", Value::Null).await });
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        drop(callee);

        let err = call.await.unwrap().unwrap_err();
        assert!(matches!(err, ProtoError::ChannelClosed));
    }

    #[tokio::test]
    async fn test_malformed_lines_are_skipped() {
        let (a, b) = tokio::io::duplex(4096);
        let (a_read, a_write) = tokio::io::split(a);
        let (_b_read, mut b_write) = tokio::io::split(b);

        let (channel, mut incoming) =
            RpcChannel::start(tokio::io::BufReader::new(a_read), a_write);

        b_write.write_all(b"this is not json\n").await.unwrap();
        b_write
            .write_all(
                format!(
                    "{}\n",
                    encode_line(&Request::new(9, "plugin.configure", Value::Null))
                )
                .as_bytes(),
            )
            .await
            .unwrap();

        let request = incoming.recv().await.unwrap();
        assert_eq!(request.id, 9);
        assert!(!channel.is_closed());
    }
}
