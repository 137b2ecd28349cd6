//! Definition of [`ConnectionPool`], which owns connections of [`Messenger`][crate::Messenger].

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use log::{debug, info, warn};
use thiserror::Error;

use crate::{
    common::{
        format,
        message::{ConfigClient, Context},
    },
    messenger::{Group, MessengerRef},
    transport::{Connection, Connector, TransportError},
};

/// Represents error of [getting connection][ConnectionPool::get_connection].
#[derive(Debug, Error)]
pub enum PoolError {
    /// There is no usable connection and the address can be connected only by the remote side.
    #[error("no connection to '{0}' and it can be connected only by the remote side")]
    NotDialable(String),
    /// Transport failed to start connecting.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Mutable state of [`ConnectionPool`].
#[derive(Default)]
struct PoolState {
    /// Connections by address.
    connections: HashMap<String, Arc<dyn Connection>>,
    /// Id of the next anonymous session.
    next_session: u64,
}

/// Owns connections keyed by address.
///
/// Accepts inbound connections, dials outbound ones on demand
/// and passes inbound frames to [`Messenger::from_outside`][crate::Messenger::from_outside].
pub struct ConnectionPool {
    /// Own address, declared in handshakes.
    url: String,
    /// Group of session boxes.
    client_group: Group,
    /// Dials outbound connections.
    connector: Arc<dyn Connector>,
    /// Messenger, which receives inbound envelopes.
    messenger: MessengerRef,
    /// Mutable part.
    state: Mutex<PoolState>,
}

impl ConnectionPool {
    /// Id of the first anonymous client session.
    pub const INITIAL_SESSION: u64 = 0;

    /// Create empty pool.
    pub(crate) fn new(
        messenger: MessengerRef,
        connector: Arc<dyn Connector>,
        url: String,
        client_group: Group,
    ) -> Self {
        Self {
            url,
            client_group,
            connector,
            messenger,
            state: Mutex::new(PoolState {
                connections: HashMap::new(),
                next_session: Self::INITIAL_SESSION,
            }),
        }
    }

    /// Take accepted inbound connection.
    ///
    /// With declared `protocol` the connection is registered under it;
    /// the box of the remote side must be registered by the application.
    /// Without it the connection is an anonymous client session:
    /// it gets the next session id, out-box with that name is registered
    /// in the client group and [`ConfigClient`] is sent to it.
    pub fn accept(&self, conn: Arc<dyn Connection>, protocol: Option<String>) {
        let Some(name) = protocol else {
            let session = {
                let mut state = self.state.lock().unwrap();
                let session = state.next_session;
                state.next_session += 1;
                session.to_string()
            };
            info!("new client session {}", session);

            // Box goes first, so frames queued on the connection find it.
            let out_box = self
                .messenger
                .get()
                .map(|messenger| messenger.add_out_box(self.client_group, &session, &session));
            self.set_connection(&session, conn);
            if let Some(out_box) = out_box {
                out_box.receive(ConfigClient::new("", "", &session, Context::new()).into());
            }
            return;
        };

        info!("new connection from {}", name);
        self.set_connection(&name, conn);
    }

    /// Returns connection to the address, dialing it if needed.
    ///
    /// Existing connection is returned while it is connecting or open.
    /// Otherwise the address is dialed, if it is dialable.
    pub fn get_connection(&self, address: &str) -> Result<Arc<dyn Connection>, PoolError> {
        debug!("get_connection({})", address);
        if let Some(conn) = self.connection(address) {
            if conn.state().is_usable() {
                return Ok(conn);
            }
        }

        if !self.connector.is_dialable(address) {
            return Err(PoolError::NotDialable(address.to_owned()));
        }

        let conn = self.connector.connect(address, Some(&self.url))?;
        self.set_connection(address, conn.clone());
        Ok(conn)
    }

    /// Register connection under the address.
    ///
    /// Closing or closed connection is ignored.
    /// Other connection registered under the address is closed.
    pub fn set_connection(&self, address: &str, conn: Arc<dyn Connection>) {
        debug!("set_connection({})", address);
        if !conn.state().is_usable() {
            debug!("connection to {} is {:?}, ignored", address, conn.state());
            return;
        }

        let old = self
            .state
            .lock()
            .unwrap()
            .connections
            .insert(address.to_owned(), conn.clone());
        if let Some(old) = old {
            if !same_connection(&old, &conn) {
                debug!("connection to {} is replaced", address);
                old.close();
            }
        }

        let messenger = self.messenger.clone();
        let origin = address.to_owned();
        conn.on_message(Arc::new(move |frame: String| {
            let Some(messenger) = messenger.get() else {
                return;
            };
            match format::decode(&frame) {
                Ok(msgs) => {
                    for msg in msgs {
                        messenger.from_outside(msg);
                    }
                }
                Err(info) => warn!("frame from {} is dropped: {}", origin, info),
            }
        }));
    }

    /// Close and forget connection registered under the address.
    pub fn delete_connection(&self, address: &str) {
        let conn = self.state.lock().unwrap().connections.remove(address);
        if let Some(conn) = conn {
            conn.close();
        }
    }

    /// Connection registered under the address, in any state.
    pub fn connection(&self, address: &str) -> Option<Arc<dyn Connection>> {
        self.state.lock().unwrap().connections.get(address).cloned()
    }
}

/// Returns true if both handles refer to the same connection.
fn same_connection(a: &Arc<dyn Connection>, b: &Arc<dyn Connection>) -> bool {
    std::ptr::eq(
        Arc::as_ptr(a) as *const (),
        Arc::as_ptr(b) as *const (),
    )
}
