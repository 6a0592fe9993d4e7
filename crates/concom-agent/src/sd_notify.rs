//! Service-manager readiness notification.
//!
//! When the agent runs under systemd with `Type=notify`, the manager
//! passes a datagram socket in `NOTIFY_SOCKET`; sending `READY=1` marks
//! the unit started. Outside systemd this is a no-op.

use std::os::unix::net::UnixDatagram;

use tracing::debug;

/// Tell the service manager the daemon is ready.
pub fn notify_ready() {
    let Ok(socket_path) = std::env::var("NOTIFY_SOCKET") else {
        return;
    };
    if socket_path.starts_with('@') {
        debug!("abstract notify sockets are not supported, skipping readiness notification");
        return;
    }
    let Ok(socket) = UnixDatagram::unbound() else {
        return;
    };
    match socket.send_to(b"READY=1", &socket_path) {
        Ok(_) => debug!(socket = %socket_path, "notified service manager"),
        Err(err) => debug!(error = %err, "readiness notification failed"),
    }
}
