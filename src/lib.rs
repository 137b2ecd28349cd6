//! Library for multiplexing remote calls and notifications between named boxes
//! over a pool of duplex connections.
//!
//! [`Messenger`] keeps the directory of boxes. [`InBox`] serves local handlers,
//! [`OutBox`] represents box of the remote process: it turns calls into envelopes,
//! buffers them and flushes through the [`ConnectionPool`].

// Add warnings for missing public and private documentation.
#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

pub mod boxes;
pub mod common;
pub mod transport;

mod messenger;
mod pool;

#[cfg(test)]
mod tests;

pub use boxes::{
    BoxError, CallError, CallResult, InBox, MethodBox, MethodStub, NotifyStub, OutBox, Reply,
};
pub use common::format::{decode, encode, FormatError};
pub use common::handler::{method, notify, MethodHandler, MethodTable, NotifyHandler, NotifyTable};
pub use common::message::{
    correlation_key, Call, ConfigClient, Context, ErrorMsg, Msg, MsgType, Notify, Return,
};
pub use messenger::{BoxHook, Group, Messenger, MessengerConfig};
pub use pool::{ConnectionPool, PoolError};
pub use transport::{
    memory::MemoryNetwork, tcp::TcpConnector, Connection, ConnectionState, Connector,
    FrameHandler, Handshake, TransportError,
};
