//! TCP transport.
//!
//! Frames are separated by new line characters. The dialing side writes
//! [handshake][Handshake] as the first line of the stream.

use std::{
    net::SocketAddr,
    sync::{Arc, Mutex},
};

use log::{debug, info, warn};
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader},
    net::{TcpListener, TcpStream},
    runtime::Handle,
    sync::mpsc::{self, UnboundedReceiver, UnboundedSender},
    task::JoinHandle,
};

use crate::Messenger;

use super::{Connection, ConnectionState, Connector, FrameHandler, Handshake, Inbound, TransportError};

/// Addresses with this prefix are dialable by [`TcpConnector`].
pub const SCHEME: &str = "tcp://";

/// Request to the writer task.
enum Outgoing {
    /// Write frame.
    Frame(String),
    /// Shut down the stream.
    Close,
}

/// Connection over TCP stream.
pub struct TcpConnection {
    /// Shared with reader and writer tasks.
    state: Arc<Mutex<ConnectionState>>,
    /// Requests to the writer task.
    outgoing: UnboundedSender<Outgoing>,
    /// Frames read from the stream.
    inbound: Arc<Mutex<Inbound>>,
}

impl TcpConnection {
    /// Create connecting connection and receiver of its writer requests.
    fn new() -> (Arc<Self>, UnboundedReceiver<Outgoing>) {
        let (outgoing, receiver) = mpsc::unbounded_channel();
        let conn = Self {
            state: Arc::new(Mutex::new(ConnectionState::Connecting)),
            outgoing,
            inbound: Arc::default(),
        };
        (Arc::new(conn), receiver)
    }

    /// Set state of the connection.
    fn set_state(&self, state: ConnectionState) {
        *self.state.lock().unwrap() = state;
    }

    /// Spawn reader and writer of established stream.
    fn start<R, W>(&self, reader: BufReader<R>, mut writer: W, mut outgoing: UnboundedReceiver<Outgoing>)
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        {
            let mut state = self.state.lock().unwrap();
            if *state == ConnectionState::Connecting {
                *state = ConnectionState::Open;
            }
        }

        let state = self.state.clone();
        tokio::spawn(async move {
            while let Some(request) = outgoing.recv().await {
                match request {
                    Outgoing::Frame(mut frame) => {
                        frame.push('\n');
                        if let Err(info) = writer.write_all(frame.as_bytes()).await {
                            warn!("can not write frame: {}", info);
                            break;
                        }
                    }
                    Outgoing::Close => break,
                }
            }
            let _ = writer.shutdown().await;
            *state.lock().unwrap() = ConnectionState::Closed;
        });

        let state = self.state.clone();
        let inbound = self.inbound.clone();
        let close = self.outgoing.clone();
        tokio::spawn(async move {
            let mut lines = reader.lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(frame)) => Inbound::dispatch(&inbound, frame),
                    Ok(None) => break,
                    Err(info) => {
                        debug!("can not read frame: {}", info);
                        break;
                    }
                }
            }
            *state.lock().unwrap() = ConnectionState::Closed;
            let _ = close.send(Outgoing::Close);
        });
    }
}

impl Connection for TcpConnection {
    fn state(&self) -> ConnectionState {
        *self.state.lock().unwrap()
    }

    fn send(&self, frame: String) -> Result<(), TransportError> {
        let state = self.state();
        if state != ConnectionState::Open {
            return Err(TransportError::NotOpen(state));
        }
        self.outgoing
            .send(Outgoing::Frame(frame))
            .map_err(|_| TransportError::NotOpen(ConnectionState::Closed))
    }

    fn close(&self) {
        let mut state = self.state.lock().unwrap();
        match *state {
            ConnectionState::Closing | ConnectionState::Closed => {}
            ConnectionState::Connecting | ConnectionState::Open => {
                *state = ConnectionState::Closing;
                let _ = self.outgoing.send(Outgoing::Close);
            }
        }
    }

    fn on_message(&self, handler: FrameHandler) {
        Inbound::install(&self.inbound, handler);
    }
}

////////////////////////////////////////////////////////////////////////////////

/// Dials addresses of form `tcp://host:port`.
#[derive(Clone, Debug, Default)]
pub struct TcpConnector;

impl Connector for TcpConnector {
    fn is_dialable(&self, address: &str) -> bool {
        address.starts_with(SCHEME)
    }

    fn connect(
        &self,
        address: &str,
        identity: Option<&str>,
    ) -> Result<Arc<dyn Connection>, TransportError> {
        let target = address
            .strip_prefix(SCHEME)
            .ok_or_else(|| TransportError::InvalidAddress(address.to_owned()))?
            .to_owned();
        let runtime = Handle::try_current().map_err(|_| TransportError::NoRuntime)?;

        let mut handshake = serde_json::to_string(&Handshake {
            protocol: identity.map(str::to_owned),
        })?;
        handshake.push('\n');

        let (conn, outgoing) = TcpConnection::new();
        let task_conn = conn.clone();
        runtime.spawn(async move {
            let stream = match TcpStream::connect(&target).await {
                Ok(stream) => stream,
                Err(info) => {
                    warn!("can not connect to {}: {}", target, info);
                    task_conn.set_state(ConnectionState::Closed);
                    return;
                }
            };
            let (reader, mut writer) = stream.into_split();
            if let Err(info) = writer.write_all(handshake.as_bytes()).await {
                warn!("can not send handshake to {}: {}", target, info);
                task_conn.set_state(ConnectionState::Closed);
                return;
            }
            debug!("connected to {}", target);
            task_conn.start(BufReader::new(reader), writer, outgoing);
        });

        Ok(conn)
    }
}

////////////////////////////////////////////////////////////////////////////////

/// Start accepting connections on `address` (`tcp://host:port` or `host:port`).
///
/// Accepted connections are passed to [`Messenger::accept`].
/// Returned handle can be aborted to stop listening.
pub async fn listen(address: &str, messenger: Messenger) -> Result<JoinHandle<()>, TransportError> {
    let bind = address.strip_prefix(SCHEME).unwrap_or(address);
    let listener = TcpListener::bind(bind).await?;
    info!("listening on {}", bind);

    Ok(tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    tokio::spawn(accept_stream(stream, peer, messenger.clone()));
                }
                Err(info) => warn!("can not accept connection: {}", info),
            }
        }
    }))
}

/// Read handshake of accepted stream and pass connection to the messenger.
async fn accept_stream(stream: TcpStream, peer: SocketAddr, messenger: Messenger) {
    let (reader, writer) = stream.into_split();
    let mut reader = BufReader::new(reader);

    let mut line = String::new();
    match reader.read_line(&mut line).await {
        Ok(0) => {
            debug!("{} disconnected before handshake", peer);
            return;
        }
        Ok(_) => {}
        Err(info) => {
            warn!("can not read handshake from {}: {}", peer, info);
            return;
        }
    }

    let handshake: Handshake = match serde_json::from_str(line.trim_end()) {
        Ok(handshake) => handshake,
        Err(info) => {
            warn!("invalid handshake from {}: {}", peer, info);
            return;
        }
    };
    info!("new connection from {} (protocol: {:?})", peer, handshake.protocol);

    let (conn, outgoing) = TcpConnection::new();
    conn.start(reader, writer, outgoing);
    messenger.accept(conn, handshake.protocol);
}
