//! Scriptable transport for unit tests.

use std::sync::{Arc, Mutex};

use super::{Connection, ConnectionState, Connector, FrameHandler, Inbound, TransportError};

/// Connection, which records sent frames.
pub(crate) struct MockConnection {
    /// Current state.
    state: Mutex<ConnectionState>,
    /// Fail every send while set.
    fail_sends: Mutex<bool>,
    /// Frames sent so far.
    sent: Mutex<Vec<String>>,
    /// Pushed frames.
    inbound: Mutex<Inbound>,
}

impl MockConnection {
    /// Create connection in the given state.
    pub fn new(state: ConnectionState) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(state),
            fail_sends: Mutex::new(false),
            sent: Mutex::default(),
            inbound: Mutex::default(),
        })
    }

    /// Change state of the connection.
    pub fn set_state(&self, state: ConnectionState) {
        *self.state.lock().unwrap() = state;
    }

    /// Make sends fail while `fail` is set.
    pub fn set_fail_sends(&self, fail: bool) {
        *self.fail_sends.lock().unwrap() = fail;
    }

    /// Frames sent so far.
    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }

    /// Simulate frame arrived from the remote side.
    pub fn push(&self, frame: String) {
        Inbound::dispatch(&self.inbound, frame);
    }
}

impl Connection for MockConnection {
    fn state(&self) -> ConnectionState {
        *self.state.lock().unwrap()
    }

    fn send(&self, frame: String) -> Result<(), TransportError> {
        let state = self.state();
        if state != ConnectionState::Open || *self.fail_sends.lock().unwrap() {
            return Err(TransportError::NotOpen(state));
        }
        self.sent.lock().unwrap().push(frame);
        Ok(())
    }

    fn close(&self) {
        self.set_state(ConnectionState::Closed);
    }

    fn on_message(&self, handler: FrameHandler) {
        Inbound::install(&self.inbound, handler);
    }
}

/// Dials `mock://` addresses and remembers every connection it created.
#[derive(Default)]
pub(crate) struct MockConnector {
    /// State of new connections.
    initial_state: Mutex<Option<ConnectionState>>,
    /// Address, identity and connection of every dial.
    dialed: Mutex<Vec<(String, Option<String>, Arc<MockConnection>)>>,
}

impl MockConnector {
    /// Create connector, which opens connections immediately.
    pub fn new() -> Arc<Self> {
        Arc::default()
    }

    /// State of connections created by further dials. Open by default.
    pub fn set_initial_state(&self, state: ConnectionState) {
        *self.initial_state.lock().unwrap() = Some(state);
    }

    /// Every dial so far.
    pub fn dialed(&self) -> Vec<(String, Option<String>, Arc<MockConnection>)> {
        self.dialed.lock().unwrap().clone()
    }

    /// Connection of the last dial.
    pub fn last(&self) -> Option<Arc<MockConnection>> {
        self.dialed.lock().unwrap().last().map(|(_, _, conn)| conn.clone())
    }
}

impl Connector for MockConnector {
    fn is_dialable(&self, address: &str) -> bool {
        address.starts_with("mock://")
    }

    fn connect(
        &self,
        address: &str,
        identity: Option<&str>,
    ) -> Result<Arc<dyn Connection>, TransportError> {
        let state = self
            .initial_state
            .lock()
            .unwrap()
            .unwrap_or(ConnectionState::Open);
        let conn = MockConnection::new(state);
        self.dialed.lock().unwrap().push((
            address.to_owned(),
            identity.map(str::to_owned),
            conn.clone(),
        ));
        Ok(conn)
    }
}
