//! Plugin handshake.
//!
//! Before any RPC is exchanged the host must know the child it spawned is a
//! concom plugin and speaks a protocol version it understands. The host
//! passes a magic cookie through the environment; the plugin checks it and
//! answers with a single handshake line on stdout:
//!
//! ```text
//! CONCOM|<core-version>|<protocol-version>|stdio
//! ```
//!
//! Anything else on the first line is a handshake failure.

use crate::error::{ProtoError, ProtoResult};

/// Environment variable carrying the magic cookie to the plugin.
pub const COOKIE_KEY: &str = "CONCOM_PLUGIN_COOKIE";

/// Cookie value a plugin must see before serving. This is not a security
/// measure; it keeps users from launching plugin binaries by hand.
pub const COOKIE_VALUE: &str = "f0e36d2c9ad64f1bb3a84d21ec19c56d";

/// Version of the handshake/framing layer itself.
pub const CORE_PROTOCOL_VERSION: u32 = 1;

/// Version of the runner contract (method set and message shapes).
pub const PROTOCOL_VERSION: u32 = 1;

const MAGIC: &str = "CONCOM";
const TRANSPORT_STDIO: &str = "stdio";

/// The parsed first line a plugin prints after a successful cookie check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeLine {
    pub core_version: u32,
    pub protocol_version: u32,
    pub transport: String,
}

impl HandshakeLine {
    /// The line the current plugin SDK emits.
    pub fn current() -> Self {
        Self {
            core_version: CORE_PROTOCOL_VERSION,
            protocol_version: PROTOCOL_VERSION,
            transport: TRANSPORT_STDIO.to_string(),
        }
    }

    /// Parse and validate a handshake line.
    pub fn parse(line: &str) -> ProtoResult<Self> {
        let mut parts = line.trim().split('|');

        let magic = parts.next().unwrap_or_default();
        if magic != MAGIC {
            return Err(ProtoError::Handshake {
                reason: format!("unexpected magic {magic:?}"),
            });
        }

        let core_version = parse_version(parts.next(), "core version")?;
        let protocol_version = parse_version(parts.next(), "protocol version")?;
        let transport = parts
            .next()
            .ok_or_else(|| ProtoError::Handshake {
                reason: "missing transport".to_string(),
            })?
            .to_string();

        if parts.next().is_some() {
            return Err(ProtoError::Handshake {
                reason: "trailing handshake fields".to_string(),
            });
        }

        Ok(Self {
            core_version,
            protocol_version,
            transport,
        })
    }

    /// Check the negotiated versions and transport against what the host
    /// supports.
    pub fn negotiate(&self) -> ProtoResult<()> {
        if self.core_version != CORE_PROTOCOL_VERSION {
            return Err(ProtoError::Handshake {
                reason: format!("unsupported core protocol version {}", self.core_version),
            });
        }
        if self.protocol_version != PROTOCOL_VERSION {
            return Err(ProtoError::Handshake {
                reason: format!("unsupported protocol version {}", self.protocol_version),
            });
        }
        if self.transport != TRANSPORT_STDIO {
            return Err(ProtoError::Handshake {
                reason: format!("unsupported transport {:?}", self.transport),
            });
        }
        Ok(())
    }
}

impl std::fmt::Display for HandshakeLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{MAGIC}|{}|{}|{}",
            self.core_version, self.protocol_version, self.transport
        )
    }
}

fn parse_version(field: Option<&str>, what: &str) -> ProtoResult<u32> {
    field
        .and_then(|v| v.parse().ok())
        .ok_or_else(|| ProtoError::Handshake {
            reason: format!("missing or invalid {what}"),
        })
}
