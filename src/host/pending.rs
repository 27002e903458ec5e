//! Completion handle for an issued request.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::oneshot;

use crate::{BridgeError, Result};

/// Resolves once the executor answers request [`Pending::id`].
///
/// Dropping a `Pending` discards the result; the executor still does the
/// work. If the bridge goes away before an answer arrives the handle
/// resolves to [`BridgeError::ProcessTerminated`].
#[derive(Debug)]
#[must_use = "a Pending does nothing unless awaited"]
pub struct Pending {
    id: u64,
    rx: oneshot::Receiver<Result<serde_json::Value>>,
}

impl Pending {
    pub(crate) fn new(id: u64, rx: oneshot::Receiver<Result<serde_json::Value>>) -> Self {
        Self { id, rx }
    }

    /// A handle that is already settled with `err`.
    pub(crate) fn failed(id: u64, err: BridgeError) -> Self {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(Err(err));
        Self { id, rx }
    }

    /// Id of the request this handle waits for.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Future for Pending {
    type Output = Result<serde_json::Value>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(BridgeError::ProcessTerminated)))
    }
}
