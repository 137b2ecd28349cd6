//! Definition of [`OutBox`], which proxies box of the remote process.

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex, Weak},
    time::Duration,
};

use log::{debug, error, info, warn};
use serde_json::Value;

use crate::{
    common::{
        format,
        handler::is_reserved,
        message::{correlation_key, Call, Context, Msg, Notify},
    },
    messenger::MessengerRef,
    pool::PoolError,
    transport::ConnectionState,
};

use super::{
    reply::{self, CallError, Reply, ReplySender},
    timer::RetryTimer,
    BoxError, MethodBox,
};

/// Box, which represents remote box with the same name.
///
/// Calls and notifications issued through the out-box are buffered
/// and flushed in one frame to the connection of the remote [address][OutBox::address].
/// If connection is not available, flush is retried after the fixed interval.
#[derive(Clone)]
pub struct OutBox {
    /// Shared by all handles and stubs of the box.
    inner: Arc<Inner>,
}

/// State of [`OutBox`].
struct Inner {
    /// Name of the box.
    name: String,
    /// Address of the remote process.
    address: String,
    /// Context key of correlation ids.
    call_key: String,
    /// Delay before flush retry.
    retry_interval: Duration,
    /// Messenger, which owns the connection pool.
    messenger: MessengerRef,
    /// Names of installed methods.
    methods: Mutex<HashSet<String>>,
    /// Names of installed notifications.
    notifies: Mutex<HashSet<String>>,
    /// Mutable part.
    state: Mutex<State>,
}

/// Mutable state of [`OutBox`].
#[derive(Default)]
struct State {
    /// Envelopes waiting for the flush, in enqueue order.
    buffer: Vec<Msg>,
    /// Pending flush retry.
    retry: RetryTimer,
    /// Correlation id of the next call.
    next_call_id: u64,
    /// Calls waiting for the reply, by correlation id.
    pending: HashMap<u64, ReplySender>,
    /// Set when the box is cleared; nothing is sent after that.
    closed: bool,
}

impl OutBox {
    /// Create empty box. Use [`Messenger::add_out_box`][crate::Messenger::add_out_box] to register one.
    pub(crate) fn new(
        name: &str,
        address: &str,
        retry_interval: Duration,
        messenger: MessengerRef,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                name: name.to_owned(),
                address: address.to_owned(),
                call_key: correlation_key(name),
                retry_interval,
                messenger,
                methods: Mutex::default(),
                notifies: Mutex::default(),
                state: Mutex::default(),
            }),
        }
    }

    /// Restore handle from the retry timer.
    fn from_weak(weak: &Weak<Inner>) -> Option<Self> {
        weak.upgrade().map(|inner| Self { inner })
    }

    /// Name of the box. It is the name of the remote box too.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Address of the remote process.
    pub fn address(&self) -> &str {
        &self.inner.address
    }

    /// Install call stubs for the given method names. Reserved names are skipped.
    pub fn add_methods<I, S>(&self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut methods = self.inner.methods.lock().unwrap();
        for name in names.into_iter().map(Into::into) {
            if is_reserved(&name) {
                debug!("box {}: skip reserved method '{}'", self.name(), name);
                continue;
            }
            methods.insert(name);
        }
    }

    /// Install notify stubs for the given names. Reserved names are skipped.
    pub fn add_notifies<I, S>(&self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut notifies = self.inner.notifies.lock().unwrap();
        for name in names.into_iter().map(Into::into) {
            if is_reserved(&name) {
                debug!("box {}: skip reserved notify '{}'", self.name(), name);
                continue;
            }
            notifies.insert(name);
        }
    }

    /// Stub of the installed method.
    pub fn method(&self, name: &str) -> Option<MethodStub> {
        self.inner
            .methods
            .lock()
            .unwrap()
            .contains(name)
            .then(|| MethodStub {
                out_box: self.clone(),
                method: name.to_owned(),
            })
    }

    /// Stub of the installed notification.
    pub fn notifier(&self, name: &str) -> Option<NotifyStub> {
        self.inner
            .notifies
            .lock()
            .unwrap()
            .contains(name)
            .then(|| NotifyStub {
                out_box: self.clone(),
                method: name.to_owned(),
            })
    }

    /// Call installed method of the remote box on behalf of `caller`.
    pub fn call(&self, method: &str, caller: &str, args: Vec<Value>) -> Result<Reply, BoxError> {
        self.method(method)
            .map(|stub| stub.call(caller, args))
            .ok_or_else(|| BoxError::UnknownMethod(method.to_owned()))
    }

    /// Send installed notification to the remote box on behalf of `talker`.
    pub fn notify(&self, method: &str, talker: &str, args: Vec<Value>) -> Result<(), BoxError> {
        self.notifier(method)
            .map(|stub| stub.notify(talker, args))
            .ok_or_else(|| BoxError::UnknownNotify(method.to_owned()))
    }

    /// Stamp new correlation id, register pending reply and enqueue the call.
    fn issue_call(&self, method: &str, caller: &str, args: Vec<Value>) -> Reply {
        let (sender, reply) = reply::channel();

        let call = {
            let mut state = self.inner.state.lock().unwrap();
            if state.closed {
                drop(state);
                sender.complete(Err(CallError::Dropped));
                return reply;
            }
            let id = state.next_call_id;
            state.next_call_id += 1;

            let mut context = Context::new();
            context.insert(self.inner.call_key.clone(), id.into());
            state.pending.insert(id, sender);
            Call::new(method, caller, self.name(), context, args)
        };

        self.receive(call.into());
        reply
    }

    /// Enqueue envelope for the remote side and try to flush.
    pub fn receive(&self, msg: Msg) {
        {
            let mut state = self.inner.state.lock().unwrap();
            if state.closed {
                warn!(
                    "box {}: box is dropped, {:?} from {} is discarded",
                    self.name(),
                    msg.msg_type(),
                    msg.sender()
                );
                return;
            }
            state.buffer.push(msg);
        }
        self.try_flush();
    }

    /// Send all buffered envelopes in one frame.
    ///
    /// If the remote address can not be dialed and there is no connection,
    /// the box is dropped from the messenger together with its dead connection.
    /// Otherwise failure schedules one retry.
    fn try_flush(&self) {
        {
            let mut state = self.inner.state.lock().unwrap();
            if state.buffer.is_empty() || state.closed {
                state.retry.cancel();
                return;
            }
        }

        let Some(messenger) = self.inner.messenger.get() else {
            debug!("box {}: messenger is gone, nothing to flush into", self.name());
            return;
        };

        let conn = match messenger.pool().get_connection(self.address()) {
            Ok(conn) => Some(conn),
            Err(PoolError::NotDialable(address)) => {
                info!(
                    "box {}: no connection to {} and it can not be dialed, dropping box",
                    self.name(),
                    address
                );
                messenger.drop_box(&MethodBox::Out(self.clone()));
                messenger.pool().delete_connection(&address);
                self.clear();
                return;
            }
            Err(info) => {
                warn!("box {}: can not get connection: {}", self.name(), info);
                None
            }
        };

        let mut state = self.inner.state.lock().unwrap();
        if state.buffer.is_empty() || state.closed {
            state.retry.cancel();
            return;
        }

        let conn_state = conn.as_ref().map(|conn| conn.state());
        if let (Some(conn), Some(ConnectionState::Open)) = (&conn, conn_state) {
            match format::encode(&state.buffer) {
                Ok(frame) => match conn.send(frame) {
                    Ok(()) => {
                        state.buffer.clear();
                        state.retry.cancel();
                        return;
                    }
                    Err(info) => warn!("box {}: can not send frame: {}", self.name(), info),
                },
                Err(info) => {
                    error!(
                        "box {}: can not encode {} envelopes, they are discarded: {}",
                        self.name(),
                        state.buffer.len(),
                        info
                    );
                    state.buffer.clear();
                    state.retry.cancel();
                    return;
                }
            }
        } else if let Some(conn_state) = conn_state {
            debug!("box {}: connection is {:?}", self.name(), conn_state);
        }

        if !state.retry.is_pending() {
            debug!(
                "box {}: flush failed, retry in {:?}",
                self.name(),
                self.inner.retry_interval
            );
            let weak = Arc::downgrade(&self.inner);
            state.retry.set_once(self.inner.retry_interval, move |generation| {
                let Some(out_box) = OutBox::from_weak(&weak) else {
                    return;
                };
                let fired = out_box.inner.state.lock().unwrap().retry.fire(generation);
                if fired {
                    out_box.try_flush();
                }
            });
        }
    }

    /// Handle envelope, which came from the remote box.
    ///
    /// Calls and notifications issued by the remote side are routed to local boxes,
    /// replies complete pending calls.
    pub fn interpret(&self, msg: Msg) {
        match msg {
            Msg::Call(_) | Msg::Notify(_) => match self.inner.messenger.get() {
                Some(messenger) => messenger.from_inside(msg),
                None => debug!("box {}: messenger is gone", self.name()),
            },
            Msg::Return(ret) => {
                let id = ret.header.call_id(&self.inner.call_key);
                match self.take_pending(id) {
                    Some(sender) => sender.complete(Ok(ret.value)),
                    None => warn!(
                        "box {}: no call with number {:?}, return is dropped",
                        self.name(),
                        id
                    ),
                }
            }
            Msg::Error(err) => {
                let id = err.header.call_id(&self.inner.call_key);
                match self.take_pending(id) {
                    Some(sender) => sender.complete(Err(CallError::Failed(err.cause))),
                    None => warn!(
                        "box {}: no call with number {:?}, error is dropped",
                        self.name(),
                        id
                    ),
                }
            }
            Msg::ConfigClient(_) => warn!(
                "box {}: config message can not come from the remote side, it is dropped",
                self.name()
            ),
        }
    }

    /// Remove pending reply with the given id.
    fn take_pending(&self, id: Option<u64>) -> Option<ReplySender> {
        let id = id?;
        self.inner.state.lock().unwrap().pending.remove(&id)
    }

    /// Number of calls waiting for the reply.
    pub fn pending_calls(&self) -> usize {
        self.inner.state.lock().unwrap().pending.len()
    }

    /// Number of envelopes waiting for the flush.
    pub fn buffered(&self) -> usize {
        self.inner.state.lock().unwrap().buffer.len()
    }

    /// Release the box: cancel retry timer, discard buffer and reject pending calls.
    ///
    /// Called when the box is dropped from the messenger. Idempotent.
    pub fn clear(&self) {
        let pending = {
            let mut state = self.inner.state.lock().unwrap();
            state.retry.cancel();
            state.closed = true;
            if !state.buffer.is_empty() {
                debug!(
                    "box {}: {} buffered envelopes are discarded",
                    self.name(),
                    state.buffer.len()
                );
                state.buffer.clear();
            }
            std::mem::take(&mut state.pending)
        };
        for (_, sender) in pending {
            sender.complete(Err(CallError::Dropped));
        }
    }

    /// Returns true if both handles refer to the same box.
    pub(crate) fn ptr_eq(&self, other: &OutBox) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

////////////////////////////////////////////////////////////////////////////////

/// Stub of remote method.
#[derive(Clone)]
pub struct MethodStub {
    /// Box, which issues the call.
    out_box: OutBox,
    /// Name of the method.
    method: String,
}

impl MethodStub {
    /// Name of the method.
    pub fn name(&self) -> &str {
        &self.method
    }

    /// Issue the call. Every call gets the next correlation id of the box.
    pub fn call(&self, caller: &str, args: Vec<Value>) -> Reply {
        self.out_box.issue_call(&self.method, caller, args)
    }
}

/// Stub of remote notification.
#[derive(Clone)]
pub struct NotifyStub {
    /// Box, which sends the notification.
    out_box: OutBox,
    /// Name of the notification.
    method: String,
}

impl NotifyStub {
    /// Name of the notification.
    pub fn name(&self) -> &str {
        &self.method
    }

    /// Enqueue the notification.
    pub fn notify(&self, talker: &str, args: Vec<Value>) {
        let out_box = &self.out_box;
        out_box.receive(Notify::new(&self.method, talker, out_box.name(), Context::new(), args).into());
    }
}
