//! Wire contract between the concom agent and its plugins.
//!
//! The agent and its plugins live in separate processes, so everything that
//! crosses the boundary is defined here: the self-describing dynamic config
//! codec, the JSON-RPC framing and method set, the handshake line, and the
//! evidence model plugins report back with.

pub mod channel;
pub mod error;
pub mod evidence;
pub mod handshake;
pub mod rpc;
pub mod value;
pub mod wire;

pub use channel::{Incoming, RpcChannel};
pub use error::{ProtoError, ProtoResult};
pub use evidence::{
    Activity, ComponentReference, Evidence, InventoryItem, Origin, OriginActor, Property, Status,
    StatusState, Step, SubjectReference,
};
pub use handshake::{HandshakeLine, COOKIE_KEY, COOKIE_VALUE, CORE_PROTOCOL_VERSION, PROTOCOL_VERSION};
pub use rpc::{
    ConfigureRequest, ConfigureResponse, CreateEvidenceRequest, CreateEvidenceResponse,
    EvalRequest, EvalResponse, EvalStatus, Frame, Request, Response, RpcError,
};
pub use value::{DynamicValue, Scalar, ScalarKind};
pub use wire::{Item, WireConfig, WireValue};
