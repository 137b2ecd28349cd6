//! Definition of boxes: named endpoints, which are registered on [`Messenger`][crate::Messenger].
//!
//! [`InBox`] serves local handlers, [`OutBox`] proxies the remote box with the same name.

pub mod in_box;
pub mod out_box;
pub mod reply;

mod timer;


use serde_json::Value;
use thiserror::Error;

pub use in_box::InBox;
pub use out_box::{MethodStub, NotifyStub, OutBox};
pub use reply::{CallError, CallResult, Reply};

use crate::common::{
    handler::{MethodTable, NotifyTable},
    message::Msg,
};

/// Represents error of looking up method or notification on box.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum BoxError {
    /// Box has no method with such name.
    #[error("no method '{0}'")]
    UnknownMethod(String),
    /// Box has no notification with such name.
    #[error("no notify '{0}'")]
    UnknownNotify(String),
}

/// Any box registered on [`Messenger`][crate::Messenger].
#[derive(Clone)]
pub enum MethodBox {
    /// Box serving local handlers.
    In(InBox),
    /// Box proxying remote box.
    Out(OutBox),
}

impl MethodBox {
    /// Name of the box.
    pub fn name(&self) -> &str {
        match self {
            MethodBox::In(b) => b.name(),
            MethodBox::Out(b) => b.name(),
        }
    }

    /// Deliver envelope to the box.
    pub fn receive(&self, msg: Msg) {
        match self {
            MethodBox::In(b) => b.receive(msg),
            MethodBox::Out(b) => b.receive(msg),
        }
    }

    /// Release resources held by the box.
    pub fn clear(&self) {
        match self {
            MethodBox::In(b) => b.clear(),
            MethodBox::Out(b) => b.clear(),
        }
    }

    /// Call method of the box on behalf of `caller`.
    ///
    /// For [`InBox`] local handler is invoked directly,
    /// for [`OutBox`] the call goes to the remote box.
    pub fn call(&self, method: &str, caller: &str, args: Vec<Value>) -> Result<Reply, BoxError> {
        match self {
            MethodBox::In(b) => b.call(method, caller, args),
            MethodBox::Out(b) => b.call(method, caller, args),
        }
    }

    /// Send notification to the box on behalf of `talker`.
    pub fn notify(&self, method: &str, talker: &str, args: Vec<Value>) -> Result<(), BoxError> {
        match self {
            MethodBox::In(b) => b.notify(method, talker, args),
            MethodBox::Out(b) => b.notify(method, talker, args),
        }
    }

    /// Add methods to the box.
    ///
    /// [`InBox`] merges the handlers, [`OutBox`] adds stubs for the names of the table.
    pub fn add_methods(&self, table: MethodTable) {
        match self {
            MethodBox::In(b) => b.add_methods(table),
            MethodBox::Out(b) => b.add_methods(table.names()),
        }
    }

    /// Add notifications to the box.
    ///
    /// [`InBox`] merges the handlers, [`OutBox`] adds stubs for the names of the table.
    pub fn add_notifies(&self, table: NotifyTable) {
        match self {
            MethodBox::In(b) => b.add_notifies(table),
            MethodBox::Out(b) => b.add_notifies(table.names()),
        }
    }

    /// Returns the in-box, if the box is one.
    pub fn as_in_box(&self) -> Option<&InBox> {
        match self {
            MethodBox::In(b) => Some(b),
            MethodBox::Out(_) => None,
        }
    }

    /// Returns the out-box, if the box is one.
    pub fn as_out_box(&self) -> Option<&OutBox> {
        match self {
            MethodBox::In(_) => None,
            MethodBox::Out(b) => Some(b),
        }
    }

    /// Returns true if both handles refer to the same box.
    pub fn ptr_eq(&self, other: &MethodBox) -> bool {
        match (self, other) {
            (MethodBox::In(a), MethodBox::In(b)) => a.ptr_eq(b),
            (MethodBox::Out(a), MethodBox::Out(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl From<InBox> for MethodBox {
    fn from(value: InBox) -> Self {
        MethodBox::In(value)
    }
}

impl From<OutBox> for MethodBox {
    fn from(value: OutBox) -> Self {
        MethodBox::Out(value)
    }
}
