//! Definition of handlers, which are registered on [`InBox`][crate::InBox].

use std::{collections::HashMap, future::Future, sync::Arc};

use async_trait::async_trait;
use serde_json::Value;

/// Names starting with this prefix are never registered on boxes.
pub const RESERVED_PREFIX: &str = "$";

/// Returns true if the name can not be used as method or notification name.
pub fn is_reserved(name: &str) -> bool {
    name.starts_with(RESERVED_PREFIX)
}

////////////////////////////////////////////////////////////////////////////////

/// Represents local implementation of some method.
///
/// Handler receives name of the calling box and ordered call arguments.
/// Returned error is passed to the caller as the failure cause.
#[async_trait]
pub trait MethodHandler: Send + Sync {
    /// Invoke the method.
    async fn invoke(&self, caller: String, args: Vec<Value>) -> Result<Value, String>;
}

/// Represents local implementation of some notification.
pub trait NotifyHandler: Send + Sync {
    /// Invoke the notification. Nothing is returned to the talker.
    fn invoke(&self, talker: &str, args: Vec<Value>);
}

/// Adapts async closure to [`MethodHandler`].
struct FnMethod<F>(F);

#[async_trait]
impl<F, Fut> MethodHandler for FnMethod<F>
where
    F: Fn(String, Vec<Value>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, String>> + Send + 'static,
{
    async fn invoke(&self, caller: String, args: Vec<Value>) -> Result<Value, String> {
        (self.0)(caller, args).await
    }
}

/// Adapts closure to [`NotifyHandler`].
struct FnNotify<F>(F);

impl<F> NotifyHandler for FnNotify<F>
where
    F: Fn(&str, Vec<Value>) + Send + Sync,
{
    fn invoke(&self, talker: &str, args: Vec<Value>) {
        (self.0)(talker, args)
    }
}

/// Create [method handler][MethodHandler] from asynchronous closure.
pub fn method<F, Fut>(f: F) -> Arc<dyn MethodHandler>
where
    F: Fn(String, Vec<Value>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, String>> + Send + 'static,
{
    Arc::new(FnMethod(f))
}

/// Create [notify handler][NotifyHandler] from closure.
pub fn notify<F>(f: F) -> Arc<dyn NotifyHandler>
where
    F: Fn(&str, Vec<Value>) + Send + Sync + 'static,
{
    Arc::new(FnNotify(f))
}

////////////////////////////////////////////////////////////////////////////////

/// Table of method handlers keyed by method name.
#[derive(Clone, Default)]
pub struct MethodTable {
    /// Handlers by method name.
    entries: HashMap<String, Arc<dyn MethodHandler>>,
}

impl MethodTable {
    /// Create empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add handler and return the table back.
    pub fn with(mut self, name: impl Into<String>, handler: Arc<dyn MethodHandler>) -> Self {
        self.entries.insert(name.into(), handler);
        self
    }

    /// Names of all methods in the table.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Consume the table.
    pub(crate) fn into_entries(self) -> impl Iterator<Item = (String, Arc<dyn MethodHandler>)> {
        self.entries.into_iter()
    }
}

/// Table of notify handlers keyed by notification name.
#[derive(Clone, Default)]
pub struct NotifyTable {
    /// Handlers by notification name.
    entries: HashMap<String, Arc<dyn NotifyHandler>>,
}

impl NotifyTable {
    /// Create empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add handler and return the table back.
    pub fn with(mut self, name: impl Into<String>, handler: Arc<dyn NotifyHandler>) -> Self {
        self.entries.insert(name.into(), handler);
        self
    }

    /// Names of all notifications in the table.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Consume the table.
    pub(crate) fn into_entries(self) -> impl Iterator<Item = (String, Arc<dyn NotifyHandler>)> {
        self.entries.into_iter()
    }
}
