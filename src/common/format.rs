//! Wire format of frames.
//!
//! Every frame is a JSON array of envelopes. Envelope kind is written as a number
//! in the `Type` field, kind-specific payload goes to `Args`, `Value` or `Cause`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use super::message::{
    Call, ConfigClient, Context, ErrorMsg, Header, Msg, MsgType, Notify, Return,
};

////////////////////////////////////////////////////////////////////////////////

/// Represents error of [encoding][encode] or [decoding][decode] frame.
#[derive(Debug, Error)]
pub enum FormatError {
    /// Frame is not a valid batch of envelopes.
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),
    /// Envelope has unknown `Type` value.
    #[error("unknown envelope type {0}")]
    UnknownType(u8),
}

////////////////////////////////////////////////////////////////////////////////

/// Envelope as it is written on the wire.
#[derive(Serialize, Deserialize)]
pub(crate) struct WireMsg {
    /// Numeric [`MsgType`].
    #[serde(rename = "Type")]
    kind: u8,
    /// Sender box.
    #[serde(rename = "From")]
    from: String,
    /// Receiver box.
    #[serde(rename = "To")]
    to: String,
    /// Method or notification name.
    #[serde(rename = "Method")]
    method: String,
    /// Envelope metadata.
    #[serde(rename = "Context", default)]
    context: Context,
    /// Arguments of call or notification.
    #[serde(rename = "Args", default, skip_serializing_if = "Option::is_none")]
    args: Option<Vec<Value>>,
    /// Returned value.
    #[serde(rename = "Value", default, skip_serializing_if = "Option::is_none")]
    value: Option<Value>,
    /// Failure description.
    #[serde(rename = "Cause", default, skip_serializing_if = "Option::is_none")]
    cause: Option<String>,
}

impl From<Msg> for WireMsg {
    fn from(msg: Msg) -> Self {
        let kind = msg.msg_type() as u8;
        let (header, args, value, cause) = match msg {
            Msg::Call(m) => (m.header, Some(m.args), None, None),
            Msg::Return(m) => (m.header, None, Some(m.value), None),
            Msg::Error(m) => (m.header, None, None, Some(m.cause)),
            Msg::Notify(m) => (m.header, Some(m.args), None, None),
            Msg::ConfigClient(m) => (m.header, None, None, None),
        };
        Self {
            kind,
            from: header.from,
            to: header.to,
            method: header.method,
            context: header.context,
            args,
            value,
            cause,
        }
    }
}

impl TryFrom<WireMsg> for Msg {
    type Error = FormatError;

    fn try_from(wire: WireMsg) -> Result<Self, FormatError> {
        let kind = MsgType::try_from(wire.kind)?;
        let header = Header {
            from: wire.from,
            to: wire.to,
            method: wire.method,
            context: wire.context,
        };
        let msg = match kind {
            MsgType::Call => Msg::Call(Call {
                header,
                args: wire.args.unwrap_or_default(),
            }),
            // `null` value is not distinguished from the missing one.
            MsgType::Return => Msg::Return(Return {
                header,
                value: wire.value.unwrap_or(Value::Null),
            }),
            MsgType::Error => Msg::Error(ErrorMsg {
                header,
                cause: wire.cause.unwrap_or_default(),
            }),
            MsgType::Notify => Msg::Notify(Notify {
                header,
                args: wire.args.unwrap_or_default(),
            }),
            MsgType::ConfigClient => Msg::ConfigClient(ConfigClient { header }),
        };
        Ok(msg)
    }
}

////////////////////////////////////////////////////////////////////////////////

/// Encode batch of envelopes into one text frame, preserving their order.
pub fn encode(msgs: &[Msg]) -> Result<String, FormatError> {
    Ok(serde_json::to_string(msgs)?)
}

/// Decode text frame into the batch of envelopes.
pub fn decode(frame: &str) -> Result<Vec<Msg>, FormatError> {
    Ok(serde_json::from_str(frame)?)
}
