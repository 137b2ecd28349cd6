//! Definition of [`Reply`], the result channel of a call.

use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

use serde_json::Value;
use thiserror::Error;
use tokio::sync::oneshot;

/// Represents rejected call.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum CallError {
    /// Remote handler failed with the given cause.
    #[error("{0}")]
    Failed(String),
    /// Box was dropped before the reply arrived.
    #[error("box was dropped before the reply arrived")]
    Dropped,
}

/// Result of the call.
pub type CallResult = Result<Value, CallError>;

/// Completing side of [`Reply`]. Consumed on completion, so it can complete only once.
pub(crate) struct ReplySender(oneshot::Sender<CallResult>);

impl ReplySender {
    /// Pass result to the waiting [`Reply`].
    pub fn complete(self, result: CallResult) {
        // Caller is allowed to stop waiting for the reply.
        let _ = self.0.send(result);
    }
}

/// Create connected completing side and [`Reply`].
pub(crate) fn channel() -> (ReplySender, Reply) {
    let (sender, receiver) = oneshot::channel();
    (ReplySender(sender), Reply { receiver })
}

/// Future, which resolves when reply on the call arrives.
///
/// If nothing ever answers the call and the box stays registered, it never resolves.
#[must_use = "reply does nothing unless awaited"]
pub struct Reply {
    /// Completed by [`ReplySender`].
    receiver: oneshot::Receiver<CallResult>,
}

impl Future for Reply {
    type Output = CallResult;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.get_mut().receiver)
            .poll(cx)
            .map(|result| result.unwrap_or(Err(CallError::Dropped)))
    }
}
