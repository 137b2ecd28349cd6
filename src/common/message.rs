//! Definition of [envelopes][`Msg`] which are routed between [boxes][crate::MethodBox].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

use super::format::{FormatError, WireMsg};

////////////////////////////////////////////////////////////////////////////////

/// Metadata attached to every envelope.
///
/// Carries correlation ids of calls under [per-box keys][correlation_key].
/// Values are arbitrary JSON numbers, other metadata is passed through untouched.
pub type Context = BTreeMap<String, Number>;

/// Returns the [context][Context] key under which an [`OutBox`][crate::OutBox]
/// with the given name stores correlation ids of its calls.
pub fn correlation_key(box_name: &str) -> String {
    format!("_{}_call_", box_name)
}

////////////////////////////////////////////////////////////////////////////////

/// Kind of envelope, as it is written on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MsgType {
    /// Request which expects [`MsgType::Return`] or [`MsgType::Error`].
    Call = 0,
    /// Successful reply on a call.
    Return = 1,
    /// Failed reply on a call.
    Error = 2,
    /// One-way message.
    Notify = 3,
    /// Bootstrap message for anonymous client sessions.
    ConfigClient = 4,
}

impl TryFrom<u8> for MsgType {
    type Error = FormatError;

    fn try_from(value: u8) -> Result<Self, FormatError> {
        match value {
            0 => Ok(Self::Call),
            1 => Ok(Self::Return),
            2 => Ok(Self::Error),
            3 => Ok(Self::Notify),
            4 => Ok(Self::ConfigClient),
            other => Err(FormatError::UnknownType(other)),
        }
    }
}

////////////////////////////////////////////////////////////////////////////////

/// Routing part shared by all kinds of envelopes.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Header {
    /// Sender box.
    pub from: String,
    /// Receiver box.
    pub to: String,
    /// Method or notification name.
    pub method: String,
    /// Envelope metadata.
    pub context: Context,
}

impl Header {
    /// Create header of a new envelope.
    fn new(method: &str, from: &str, to: &str, context: Context) -> Self {
        Self {
            from: from.to_owned(),
            to: to.to_owned(),
            method: method.to_owned(),
            context,
        }
    }

    /// Correlation id stored under `key`, if it is a non-negative integer.
    pub fn call_id(&self, key: &str) -> Option<u64> {
        self.context.get(key).and_then(Number::as_u64)
    }

    /// Header of the reply on the call with this header.
    fn swapped(&self) -> Self {
        Self {
            from: self.to.clone(),
            to: self.from.clone(),
            method: self.method.clone(),
            context: self.context.clone(),
        }
    }
}

/// Request to invoke method on the box named [`Call::to`].
#[derive(Clone, Debug, PartialEq)]
pub struct Call {
    /// Routing part.
    pub(crate) header: Header,
    /// Ordered arguments.
    pub(crate) args: Vec<Value>,
}

impl Call {
    /// Create new call of `method` on box `to` issued by `caller`.
    pub fn new(method: &str, caller: &str, to: &str, context: Context, args: Vec<Value>) -> Self {
        Self {
            header: Header::new(method, caller, to, context),
            args,
        }
    }

    /// Ordered call arguments.
    pub fn args(&self) -> &[Value] {
        &self.args
    }
}

/// Successful reply on a [`Call`].
#[derive(Clone, Debug, PartialEq)]
pub struct Return {
    /// Routing part.
    pub(crate) header: Header,
    /// Returned value.
    pub(crate) value: Value,
}

impl Return {
    /// Create reply on `call` carrying `value`.
    ///
    /// Sender and receiver of the call are swapped,
    /// method and context are preserved.
    pub fn new(call: &Call, value: Value) -> Self {
        Self {
            header: call.header.swapped(),
            value,
        }
    }

    /// Returned value.
    pub fn value(&self) -> &Value {
        &self.value
    }
}

/// Failed reply on a [`Call`].
#[derive(Clone, Debug, PartialEq)]
pub struct ErrorMsg {
    /// Routing part.
    pub(crate) header: Header,
    /// Failure description.
    pub(crate) cause: String,
}

impl ErrorMsg {
    /// Create failed reply on `call` with the given `cause`.
    pub fn new(call: &Call, cause: impl Into<String>) -> Self {
        Self {
            header: call.header.swapped(),
            cause: cause.into(),
        }
    }

    /// Failure description.
    pub fn cause(&self) -> &str {
        &self.cause
    }
}

/// One-way message, which is not answered.
#[derive(Clone, Debug, PartialEq)]
pub struct Notify {
    /// Routing part.
    pub(crate) header: Header,
    /// Ordered arguments.
    pub(crate) args: Vec<Value>,
}

impl Notify {
    /// Create new notification `method` for box `to` from `talker`.
    pub fn new(method: &str, talker: &str, to: &str, context: Context, args: Vec<Value>) -> Self {
        Self {
            header: Header::new(method, talker, to, context),
            args,
        }
    }

    /// Ordered notification arguments.
    pub fn args(&self) -> &[Value] {
        &self.args
    }
}

/// Bootstrap message, which is sent to anonymous client right after it connects.
#[derive(Clone, Debug, PartialEq)]
pub struct ConfigClient {
    /// Routing part.
    pub(crate) header: Header,
}

impl ConfigClient {
    /// Create new bootstrap message.
    pub fn new(method: &str, talker: &str, to: &str, context: Context) -> Self {
        Self {
            header: Header::new(method, talker, to, context),
        }
    }
}

////////////////////////////////////////////////////////////////////////////////

/// Represents envelope, which is routed between boxes and through the network.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(into = "WireMsg", try_from = "WireMsg")]
pub enum Msg {
    /// See [`Call`].
    Call(Call),
    /// See [`Return`].
    Return(Return),
    /// See [`ErrorMsg`].
    Error(ErrorMsg),
    /// See [`Notify`].
    Notify(Notify),
    /// See [`ConfigClient`].
    ConfigClient(ConfigClient),
}

impl Msg {
    /// Routing part of the envelope.
    pub(crate) fn header(&self) -> &Header {
        match self {
            Msg::Call(m) => &m.header,
            Msg::Return(m) => &m.header,
            Msg::Error(m) => &m.header,
            Msg::Notify(m) => &m.header,
            Msg::ConfigClient(m) => &m.header,
        }
    }

    /// Kind of the envelope.
    pub fn msg_type(&self) -> MsgType {
        match self {
            Msg::Call(_) => MsgType::Call,
            Msg::Return(_) => MsgType::Return,
            Msg::Error(_) => MsgType::Error,
            Msg::Notify(_) => MsgType::Notify,
            Msg::ConfigClient(_) => MsgType::ConfigClient,
        }
    }

    /// Name of the sender box.
    pub fn sender(&self) -> &str {
        &self.header().from
    }

    /// Name of the receiver box.
    pub fn receiver(&self) -> &str {
        &self.header().to
    }

    /// Name of the method or notification.
    pub fn method(&self) -> &str {
        &self.header().method
    }

    /// Envelope metadata.
    pub fn context(&self) -> &Context {
        &self.header().context
    }

    /// Correlation id stamped by the [`OutBox`][crate::OutBox] named `box_name`, if any.
    pub fn correlation_id(&self, box_name: &str) -> Option<u64> {
        self.header().call_id(&correlation_key(box_name))
    }
}

impl From<Call> for Msg {
    fn from(value: Call) -> Self {
        Msg::Call(value)
    }
}

impl From<Return> for Msg {
    fn from(value: Return) -> Self {
        Msg::Return(value)
    }
}

impl From<ErrorMsg> for Msg {
    fn from(value: ErrorMsg) -> Self {
        Msg::Error(value)
    }
}

impl From<Notify> for Msg {
    fn from(value: Notify) -> Self {
        Msg::Notify(value)
    }
}

impl From<ConfigClient> for Msg {
    fn from(value: ConfigClient) -> Self {
        Msg::ConfigClient(value)
    }
}
