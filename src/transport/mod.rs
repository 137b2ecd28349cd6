//! Definition of the transport contract, which is used by [`ConnectionPool`][crate::ConnectionPool].
//!
//! Transport provides duplex frame-oriented [connections][Connection] and the way to
//! [dial][Connector] new ones. Two implementations are shipped: [`tcp`] for real networks
//! and [`memory`] for running several messengers inside of one process.

pub mod memory;
pub mod tcp;

#[cfg(test)]
pub(crate) mod mock;

use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use thiserror::Error;

////////////////////////////////////////////////////////////////////////////////

/// State of the [connection][Connection].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    /// Connection is being established, frames can not be sent yet.
    Connecting,
    /// Frames can be sent.
    Open,
    /// Connection is being closed.
    Closing,
    /// Connection is closed and will never be open again.
    Closed,
}

impl ConnectionState {
    /// Returns true if connection is open or may become open.
    pub fn is_usable(self) -> bool {
        matches!(self, Self::Connecting | Self::Open)
    }
}

/// Represents error of transport operation.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Frame was sent into connection, which is not open.
    #[error("connection is not open ({0:?})")]
    NotOpen(ConnectionState),
    /// Address can not be interpreted by the transport.
    #[error("invalid address '{0}'")]
    InvalidAddress(String),
    /// Operation requires tokio runtime.
    #[error("no tokio runtime to drive the connection")]
    NoRuntime,
    /// Handshake can not be encoded.
    #[error("handshake: {0}")]
    Handshake(#[from] serde_json::Error),
    /// Underlying io error.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Called for every inbound frame.
pub type FrameHandler = Arc<dyn Fn(String) + Send + Sync>;

/// Represents duplex frame-oriented connection.
pub trait Connection: Send + Sync {
    /// Current state of the connection.
    fn state(&self) -> ConnectionState;

    /// Send text frame. Fails if connection is not [open][ConnectionState::Open].
    fn send(&self, frame: String) -> Result<(), TransportError>;

    /// Close connection gracefully. Does nothing if it is already closing or closed.
    fn close(&self);

    /// Install handler of inbound frames.
    ///
    /// Frames received before the handler is installed are passed to it on install.
    fn on_message(&self, handler: FrameHandler);
}

/// Dials outbound [connections][Connection].
pub trait Connector: Send + Sync {
    /// Returns true if connection to the address can be established from this side.
    fn is_dialable(&self, address: &str) -> bool;

    /// Start connecting to `address`.
    ///
    /// Returned connection is usually in the [connecting][ConnectionState::Connecting] state.
    /// `identity` is declared to the remote side in the [handshake][Handshake];
    /// `None` makes the remote side treat connection as anonymous client session.
    fn connect(
        &self,
        address: &str,
        identity: Option<&str>,
    ) -> Result<Arc<dyn Connection>, TransportError>;
}

/// First message of every connection, which is sent by the dialing side.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Handshake {
    /// Declared name of the dialing side.
    #[serde(default)]
    pub protocol: Option<String>,
}

////////////////////////////////////////////////////////////////////////////////

/// Inbound side of connection: either installed handler
/// or frames which wait for the handler.
#[derive(Default)]
pub(crate) struct Inbound {
    /// Installed handler.
    handler: Option<FrameHandler>,
    /// Frames arrived before the handler.
    queued: Vec<String>,
}

impl Inbound {
    /// Install handler and pass queued frames to it.
    pub fn install(inbound: &Mutex<Inbound>, handler: FrameHandler) {
        // Queued frames are passed under the lock,
        // so concurrent dispatch can not overtake them.
        let mut guard = inbound.lock().unwrap();
        for frame in std::mem::take(&mut guard.queued) {
            handler(frame);
        }
        guard.handler = Some(handler);
    }

    /// Pass frame to the handler or queue it.
    pub fn dispatch(inbound: &Mutex<Inbound>, frame: String) {
        let handler = {
            let mut guard = inbound.lock().unwrap();
            match &guard.handler {
                Some(handler) => handler.clone(),
                None => {
                    guard.queued.push(frame);
                    return;
                }
            }
        };
        handler(frame);
    }
}
