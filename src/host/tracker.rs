//! Host-side request tracker.
//!
//! A single task owns every piece of per-request state: pending completions,
//! memoized reference outcomes and requests whose write is deferred until the
//! references they depend on exist. Public operations talk to it over an
//! unbounded channel, so issuing never blocks and the tracker sees requests
//! in the order they were made.
//!
//! # Deferral rules
//!
//! | Deferred item   | Fires when                  | On a failed dependency             |
//! |-----------------|-----------------------------|------------------------------------|
//! | request write   | every dependency settled    | rejected with that error, unwritten |
//! | `destroy`       | the reference and every deferred request naming it settled | skipped |

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde_json::Value as Json;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::errors::RemoteError;
use crate::protocol::{Request, Response};
use crate::{BridgeError, Result};

/// Callback run once a request settles.
///
/// Receives the outcome, or `None` when the request was not pending at
/// registration time.
pub type SettledAction = Box<dyn FnOnce(Option<Result<Json>>) + Send>;

/// Messages accepted by the tracker task.
pub(crate) enum Command {
    /// Register `request` and write it once `deps` have settled successfully.
    Issue {
        request: Request,
        deps: Vec<u64>,
        memo: bool,
        reply: oneshot::Sender<Result<Json>>,
    },
    /// Answer with the outcome of `id`, waiting if it is still pending.
    Watch {
        id: u64,
        reply: oneshot::Sender<Result<Json>>,
    },
    /// Run `action` once `id` settles.
    AfterSettled { id: u64, action: SettledAction },
    /// Dispose of reference `id` once it is safe to.
    Release { id: u64 },
    /// A response line arrived.
    Response(Response),
    /// The executor is gone; reject everything still pending.
    Closed,
}

enum Listener {
    Reply(oneshot::Sender<Result<Json>>),
    Action(SettledAction),
}

impl Listener {
    fn notify(self, outcome: Option<Result<Json>>) {
        match self {
            Self::Reply(tx) => {
                let _ = tx.send(outcome.unwrap_or(Err(BridgeError::ProcessTerminated)));
            }
            Self::Action(action) => action(outcome),
        }
    }
}

struct Entry {
    memo: bool,
    listeners: Vec<Listener>,
}

enum Deferred {
    Write { request: Request, deps: Vec<u64> },
    Destroy { reference: u64, deps: Vec<u64> },
}

impl Deferred {
    fn deps(&self) -> &[u64] {
        match self {
            Self::Write { deps, .. } | Self::Destroy { deps, .. } => deps,
        }
    }
}

/// State owned by the tracker task.
struct Tracker {
    writer: mpsc::UnboundedSender<Request>,
    noise: Arc<AtomicU64>,
    pending: HashMap<u64, Entry>,
    outcomes: HashMap<u64, Result<Json>>,
    deferred: Vec<Deferred>,
    ended: bool,
}

/// Tracker task: process commands until every sender is gone.
pub(crate) async fn run_tracker(
    mut commands: mpsc::UnboundedReceiver<Command>,
    writer: mpsc::UnboundedSender<Request>,
    noise: Arc<AtomicU64>,
) {
    let mut tracker = Tracker {
        writer,
        noise,
        pending: HashMap::new(),
        outcomes: HashMap::new(),
        deferred: Vec::new(),
        ended: false,
    };

    while let Some(command) = commands.recv().await {
        tracker.handle(command);
    }
    debug!("tracker: all handles dropped, stopping");
}

impl Tracker {
    fn handle(&mut self, command: Command) {
        match command {
            Command::Issue {
                request,
                deps,
                memo,
                reply,
            } => self.issue(request, deps, memo, reply),
            Command::Watch { id, reply } => self.watch(id, Listener::Reply(reply)),
            Command::AfterSettled { id, action } => match self.pending.get_mut(&id) {
                Some(entry) => entry.listeners.push(Listener::Action(action)),
                None => action(None),
            },
            Command::Release { id } => self.release(id),
            Command::Response(response) => self.on_response(response),
            Command::Closed => self.close(),
        }
    }

    fn issue(
        &mut self,
        request: Request,
        deps: Vec<u64>,
        memo: bool,
        reply: oneshot::Sender<Result<Json>>,
    ) {
        let Some(id) = request.id else {
            let _ = reply.send(Err(BridgeError::Protocol("request without id".into())));
            return;
        };
        if self.ended {
            let _ = reply.send(Err(BridgeError::ProcessTerminated));
            return;
        }

        self.pending.insert(
            id,
            Entry {
                memo,
                listeners: vec![Listener::Reply(reply)],
            },
        );

        if deps.iter().any(|dep| self.pending.contains_key(dep)) {
            debug!(id, ?deps, "tracker: deferring request");
            self.deferred.push(Deferred::Write { request, deps });
            return;
        }

        match self.failed_dependency(&deps) {
            Some(err) => {
                self.settle(id, Err(err));
                self.drain_deferred();
            }
            None => self.write(request),
        }
    }

    fn watch(&mut self, id: u64, listener: Listener) {
        if let Some(entry) = self.pending.get_mut(&id) {
            entry.listeners.push(listener);
            return;
        }
        let outcome = match self.outcomes.get(&id) {
            Some(outcome) => outcome.clone(),
            None if self.ended => Err(BridgeError::ProcessTerminated),
            None => Err(BridgeError::Protocol(format!(
                "reference #{id} is not tracked"
            ))),
        };
        listener.notify(Some(outcome));
    }

    fn release(&mut self, id: u64) {
        if self.ended {
            self.outcomes.remove(&id);
            return;
        }

        let mut deps = vec![id];
        for item in &self.deferred {
            if let Deferred::Write { request, deps: wait } = item {
                if wait.contains(&id) {
                    deps.extend(request.id);
                }
            }
        }

        if deps.iter().any(|dep| self.pending.contains_key(dep)) {
            debug!(reference = id, "tracker: deferring destroy");
            self.deferred.push(Deferred::Destroy {
                reference: id,
                deps,
            });
        } else {
            self.dispose(id);
        }
    }

    /// Write `destroy` for `reference` if it was created successfully.
    fn dispose(&mut self, reference: u64) {
        match self.outcomes.remove(&reference) {
            Some(Ok(_)) => {
                debug!(reference, "tracker: destroying reference");
                let _ = self.writer.send(Request::destroy(reference));
            }
            Some(Err(_)) => debug!(reference, "tracker: creation failed, nothing to destroy"),
            None => debug!(reference, "tracker: reference not tracked, nothing to destroy"),
        }
    }

    fn on_response(&mut self, response: Response) {
        let id = response.id;
        if !self.pending.contains_key(&id) {
            self.noise.fetch_add(1, Ordering::Relaxed);
            warn!(id, "tracker: response for unknown request, discarding");
            return;
        }

        let outcome = match response.error {
            Some(error) => Err(BridgeError::Remote(RemoteError::from(error))),
            None => Ok(response.result.unwrap_or(Json::Null)),
        };
        debug!(id, ok = outcome.is_ok(), "tracker: request settled");
        self.settle(id, outcome);
        self.drain_deferred();
    }

    fn close(&mut self) {
        if self.ended {
            return;
        }
        self.ended = true;
        self.deferred.clear();

        let ids: Vec<u64> = self.pending.keys().copied().collect();
        debug!(pending = ids.len(), "tracker: executor gone, rejecting pending requests");
        for id in ids {
            self.settle(id, Err(BridgeError::ProcessTerminated));
        }
    }

    /// Remove `id` from the pending map and notify everyone waiting on it.
    fn settle(&mut self, id: u64, outcome: Result<Json>) {
        let Some(entry) = self.pending.remove(&id) else {
            return;
        };
        if entry.memo {
            self.outcomes.insert(id, outcome.clone());
        }
        for listener in entry.listeners {
            listener.notify(Some(outcome.clone()));
        }
    }

    /// Fire deferred items whose dependencies have all settled, in the order
    /// they were registered. Rejections can unblock further items, so this
    /// repeats until nothing is ready.
    fn drain_deferred(&mut self) {
        while let Some(pos) = self
            .deferred
            .iter()
            .position(|item| !item.deps().iter().any(|dep| self.pending.contains_key(dep)))
        {
            match self.deferred.remove(pos) {
                Deferred::Write { request, deps } => match self.failed_dependency(&deps) {
                    Some(err) => {
                        if let Some(id) = request.id {
                            debug!(id, "tracker: dependency failed, rejecting unwritten request");
                            self.settle(id, Err(err));
                        }
                    }
                    None => self.write(request),
                },
                Deferred::Destroy { reference, .. } => self.dispose(reference),
            }
        }
    }

    fn failed_dependency(&self, deps: &[u64]) -> Option<BridgeError> {
        deps.iter()
            .find_map(|dep| match self.outcomes.get(dep) {
                Some(Err(err)) => Some(err.clone()),
                _ => None,
            })
    }

    fn write(&mut self, request: Request) {
        let id = request.id;
        if self.writer.send(request).is_err() {
            warn!(?id, "tracker: writer gone, rejecting request");
            if let Some(id) = id {
                self.settle(id, Err(BridgeError::ProcessTerminated));
            }
        }
    }
}
