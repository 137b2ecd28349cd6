//! Definition of [`InBox`], which serves local handlers.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use log::{debug, error, warn};
use serde_json::Value;
use tokio::runtime::Handle;

use crate::{
    common::{
        handler::{is_reserved, MethodHandler, MethodTable, NotifyHandler, NotifyTable},
        message::{Call, ErrorMsg, Msg, Return},
    },
    messenger::MessengerRef,
};

use super::{
    reply::{self, CallError, Reply},
    BoxError,
};

/// Box, which executes calls and notifications with local handlers.
///
/// Replies on calls are routed back through [`Messenger::from_inside`][crate::Messenger::from_inside],
/// so the caller must be known to the messenger by the name written in the call.
#[derive(Clone)]
pub struct InBox {
    /// Shared by all handles of the box.
    inner: Arc<Inner>,
}

/// State of [`InBox`].
struct Inner {
    /// Name of the box.
    name: String,
    /// Messenger, which routes replies.
    messenger: MessengerRef,
    /// Method handlers by name.
    methods: Mutex<HashMap<String, Arc<dyn MethodHandler>>>,
    /// Notify handlers by name.
    notifies: Mutex<HashMap<String, Arc<dyn NotifyHandler>>>,
}

impl InBox {
    /// Create empty box. Use [`Messenger::add_in_box`][crate::Messenger::add_in_box] to register one.
    pub(crate) fn new(name: &str, messenger: MessengerRef) -> Self {
        Self {
            inner: Arc::new(Inner {
                name: name.to_owned(),
                messenger,
                methods: Mutex::default(),
                notifies: Mutex::default(),
            }),
        }
    }

    /// Name of the box.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Merge method handlers into the box. Reserved names are skipped.
    pub fn add_methods(&self, table: MethodTable) {
        let mut methods = self.inner.methods.lock().unwrap();
        for (name, handler) in table.into_entries() {
            if is_reserved(&name) {
                debug!("box {}: skip reserved method '{}'", self.name(), name);
                continue;
            }
            methods.insert(name, handler);
        }
    }

    /// Merge notify handlers into the box. Reserved names are skipped.
    pub fn add_notifies(&self, table: NotifyTable) {
        let mut notifies = self.inner.notifies.lock().unwrap();
        for (name, handler) in table.into_entries() {
            if is_reserved(&name) {
                debug!("box {}: skip reserved notify '{}'", self.name(), name);
                continue;
            }
            notifies.insert(name, handler);
        }
    }

    /// Returns true if the box has handler of the method.
    pub fn has_method(&self, name: &str) -> bool {
        self.inner.methods.lock().unwrap().contains_key(name)
    }

    /// Returns true if the box has handler of the notification.
    pub fn has_notify(&self, name: &str) -> bool {
        self.inner.notifies.lock().unwrap().contains_key(name)
    }

    /// Handler of the method, if it is installed.
    fn method_handler(&self, name: &str) -> Option<Arc<dyn MethodHandler>> {
        self.inner.methods.lock().unwrap().get(name).cloned()
    }

    /// Handler of the notification, if it is installed.
    fn notify_handler(&self, name: &str) -> Option<Arc<dyn NotifyHandler>> {
        self.inner.notifies.lock().unwrap().get(name).cloned()
    }

    /// Handle envelope addressed to this box.
    pub fn receive(&self, msg: Msg) {
        match msg {
            Msg::Call(call) => self.serve_call(call),
            Msg::Notify(notify) => match self.notify_handler(&notify.header.method) {
                Some(handler) => handler.invoke(&notify.header.from, notify.args),
                None => warn!(
                    "box {}: no notify '{}', notification from {} is dropped",
                    self.name(),
                    notify.header.method,
                    notify.header.from
                ),
            },
            other => warn!(
                "box {}: in-box can not receive {:?} from {}, it is dropped",
                self.name(),
                other.msg_type(),
                other.sender()
            ),
        }
    }

    /// Run handler of the call and route the reply through the messenger.
    fn serve_call(&self, call: Call) {
        let handler = self.method_handler(&call.header.method);
        let messenger = self.inner.messenger.clone();
        let box_name = self.name().to_owned();

        let Ok(runtime) = Handle::try_current() else {
            error!(
                "box {}: no tokio runtime, call '{}' from {} is dropped",
                box_name, call.header.method, call.header.from
            );
            return;
        };
        runtime.spawn(async move {
            let reply: Msg = match handler {
                Some(handler) => {
                    let result = handler
                        .invoke(call.header.from.clone(), call.args.clone())
                        .await;
                    match result {
                        Ok(value) => Return::new(&call, value).into(),
                        Err(cause) => {
                            debug!(
                                "box {}: method '{}' failed: {}",
                                box_name, call.header.method, cause
                            );
                            ErrorMsg::new(&call, cause).into()
                        }
                    }
                }
                None => {
                    warn!("box {}: no method '{}'", box_name, call.header.method);
                    ErrorMsg::new(
                        &call,
                        format!("no method '{}' on box '{}'", call.header.method, box_name),
                    )
                    .into()
                }
            };

            match messenger.get() {
                Some(messenger) => messenger.from_inside(reply),
                None => debug!("box {}: messenger is gone, reply is dropped", box_name),
            }
        });
    }

    /// Invoke method handler directly, bypassing routing.
    pub fn call(&self, method: &str, caller: &str, args: Vec<Value>) -> Result<Reply, BoxError> {
        let handler = self
            .method_handler(method)
            .ok_or_else(|| BoxError::UnknownMethod(method.to_owned()))?;
        let (sender, reply) = reply::channel();
        let caller = caller.to_owned();
        let Ok(runtime) = Handle::try_current() else {
            error!("box {}: no tokio runtime, call '{}' is dropped", self.name(), method);
            return Ok(reply);
        };
        runtime.spawn(async move {
            let result = handler.invoke(caller, args).await;
            sender.complete(result.map_err(CallError::Failed));
        });
        Ok(reply)
    }

    /// Invoke notify handler directly, bypassing routing.
    pub fn notify(&self, method: &str, talker: &str, args: Vec<Value>) -> Result<(), BoxError> {
        let handler = self
            .notify_handler(method)
            .ok_or_else(|| BoxError::UnknownNotify(method.to_owned()))?;
        handler.invoke(talker, args);
        Ok(())
    }

    /// In-box holds no timers or pending calls, so there is nothing to release.
    pub fn clear(&self) {}

    /// Returns true if both handles refer to the same box.
    pub(crate) fn ptr_eq(&self, other: &InBox) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}
