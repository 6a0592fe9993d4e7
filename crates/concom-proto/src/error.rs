//! Error types for the wire contract.

/// Errors produced while encoding, decoding, or framing protocol data.
#[derive(Debug, thiserror::Error)]
pub enum ProtoError {
    /// A runtime value outside the closed scalar/composite set.
    #[error("unsupported type: {found}")]
    UnsupportedType { found: String },

    /// A frame that is not valid JSON-RPC.
    #[error("malformed frame: {reason}")]
    MalformedFrame { reason: String },

    /// A handshake line that does not match the expected shape.
    #[error("invalid handshake line: {reason}")]
    Handshake { reason: String },

    /// The peer answered with a JSON-RPC error object.
    #[error("rpc error {code}: {message}")]
    Rpc { code: i32, message: String },

    /// The underlying connection is gone.
    #[error("rpc channel closed")]
    ChannelClosed,

    /// A decoded config did not fit the requested target type.
    #[error("config does not match target type: {message}")]
    Decode { message: String },
}

/// Result type for protocol operations.
pub type ProtoResult<T> = Result<T, ProtoError>;
