//! Resumable streaming session with a remote agent runtime.

pub mod client;
pub mod connection;
pub mod frame;
pub mod protocol;
pub mod transport;

pub use client::SessionClient;
pub use connection::{ConnectionManager, ReconnectPolicy, TransportEvent};
pub use frame::{ApprovalFrame, InboundFrame, OutboundCommand, ToolCallFrame, ToolResultFrame};
pub use protocol::{
    ApprovalRequest, Session, SessionEvent, SessionMachine, SessionState, TurnBuffers,
};
pub use transport::{Connector, FrameTransport, WebSocketConnector};
