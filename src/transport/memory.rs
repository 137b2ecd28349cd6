//! In-process transport.
//!
//! [`MemoryNetwork`] connects [messengers][Messenger] living in the same process.
//! Frames are delivered asynchronously and in order, like over the real network.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use log::debug;
use tokio::{runtime::Handle, sync::mpsc};

use crate::{messenger::MessengerRef, Messenger};

use super::{Connection, ConnectionState, Connector, FrameHandler, Inbound, TransportError};

/// Addresses with this prefix are dialable inside of [`MemoryNetwork`].
pub const SCHEME: &str = "mem://";

/// One end of in-process link.
pub struct MemoryConnection {
    /// Shared by both ends.
    link: Arc<Mutex<ConnectionState>>,
    /// Delivers frames to the other end. `None` for refused connection.
    peer: Option<mpsc::UnboundedSender<String>>,
    /// Frames from the other end.
    inbound: Arc<Mutex<Inbound>>,
}

impl MemoryConnection {
    /// Create connected pair of ends. Must be called inside of tokio runtime.
    pub fn pair() -> (Arc<Self>, Arc<Self>) {
        let link = Arc::new(Mutex::new(ConnectionState::Open));
        let (first_sender, first_receiver) = mpsc::unbounded_channel();
        let (second_sender, second_receiver) = mpsc::unbounded_channel();

        let first = Self::spawn_end(link.clone(), second_sender, first_receiver);
        let second = Self::spawn_end(link, first_sender, second_receiver);
        (first, second)
    }

    /// Create end, which failed to connect.
    pub fn refused() -> Arc<Self> {
        Arc::new(Self {
            link: Arc::new(Mutex::new(ConnectionState::Closed)),
            peer: None,
            inbound: Arc::default(),
        })
    }

    /// Create end and spawn delivery of its inbound frames.
    fn spawn_end(
        link: Arc<Mutex<ConnectionState>>,
        peer: mpsc::UnboundedSender<String>,
        mut incoming: mpsc::UnboundedReceiver<String>,
    ) -> Arc<Self> {
        let inbound: Arc<Mutex<Inbound>> = Arc::default();
        let delivery = inbound.clone();
        tokio::spawn(async move {
            while let Some(frame) = incoming.recv().await {
                Inbound::dispatch(&delivery, frame);
            }
        });
        Arc::new(Self {
            link,
            peer: Some(peer),
            inbound,
        })
    }
}

impl Connection for MemoryConnection {
    fn state(&self) -> ConnectionState {
        *self.link.lock().unwrap()
    }

    fn send(&self, frame: String) -> Result<(), TransportError> {
        let state = self.state();
        if state != ConnectionState::Open {
            return Err(TransportError::NotOpen(state));
        }
        match &self.peer {
            Some(peer) => peer
                .send(frame)
                .map_err(|_| TransportError::NotOpen(ConnectionState::Closed)),
            None => Err(TransportError::NotOpen(ConnectionState::Closed)),
        }
    }

    fn close(&self) {
        *self.link.lock().unwrap() = ConnectionState::Closed;
    }

    fn on_message(&self, handler: FrameHandler) {
        Inbound::install(&self.inbound, handler);
    }
}

////////////////////////////////////////////////////////////////////////////////

/// Registry of in-process listeners keyed by `mem://` address.
#[derive(Clone, Default)]
pub struct MemoryNetwork {
    /// Bound messengers by address.
    listeners: Arc<Mutex<HashMap<String, MessengerRef>>>,
}

impl MemoryNetwork {
    /// Create empty network.
    pub fn new() -> Self {
        Self::default()
    }

    /// Connector, which dials listeners of this network.
    pub fn connector(&self) -> Arc<dyn Connector> {
        Arc::new(MemoryConnector {
            network: self.clone(),
        })
    }

    /// Accept connections to `address` with `messenger`.
    pub fn bind(&self, address: &str, messenger: &Messenger) {
        self.listeners
            .lock()
            .unwrap()
            .insert(address.to_owned(), messenger.downgrade());
    }

    /// Stop accepting connections to `address`.
    pub fn unbind(&self, address: &str) {
        self.listeners.lock().unwrap().remove(address);
    }

    /// Messenger bound to the address, if it is alive.
    fn listener(&self, address: &str) -> Option<Messenger> {
        self.listeners
            .lock()
            .unwrap()
            .get(address)
            .and_then(MessengerRef::get)
    }
}

/// Dials listeners of [`MemoryNetwork`].
struct MemoryConnector {
    /// Network to dial in.
    network: MemoryNetwork,
}

impl Connector for MemoryConnector {
    fn is_dialable(&self, address: &str) -> bool {
        address.starts_with(SCHEME)
    }

    fn connect(
        &self,
        address: &str,
        identity: Option<&str>,
    ) -> Result<Arc<dyn Connection>, TransportError> {
        let runtime = Handle::try_current().map_err(|_| TransportError::NoRuntime)?;

        let Some(remote) = self.network.listener(address) else {
            debug!("nobody listens on {}", address);
            return Ok(MemoryConnection::refused());
        };

        let (local, peer) = MemoryConnection::pair();
        let protocol = identity.map(str::to_owned);
        runtime.spawn(async move { remote.accept(peer, protocol) });
        Ok(local)
    }
}
