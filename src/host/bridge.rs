//! The host's handle to one executor.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::arg::Arg;
use super::pending::Pending;
use super::reference::Reference;
use super::supervisor::{monitor_exit, run_closer, run_reader, run_stderr, run_writer, spawn_executor};
use super::tracker::{run_tracker, Command, SettledAction};
use crate::config::BridgeConfig;
use crate::protocol::{Request, ReturnMode};
use crate::{BridgeError, Result};

#[derive(Debug)]
struct Shared {
    commands: mpsc::UnboundedSender<Command>,
    /// Next request id. Held while the issue command is sent, so the tracker
    /// sees ids in increasing order even when clones issue from several
    /// threads.
    next_id: Mutex<u64>,
    ended: Arc<AtomicBool>,
    noise: Arc<AtomicU64>,
    cancel: CancellationToken,
}

impl Drop for Shared {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Connection to one executor process.
///
/// Cheap to clone; clones share the connection. The executor is stopped
/// when [`Bridge::close`] is called or when the last clone, including the
/// ones held by [`Reference`]s, is dropped.
#[derive(Debug, Clone)]
pub struct Bridge {
    shared: Arc<Shared>,
}

impl Bridge {
    /// Spawn the executor described by `config` and connect to it.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Config`] for an invalid configuration and
    /// [`BridgeError::Spawn`] if the process cannot be started.
    pub async fn spawn(config: &BridgeConfig) -> Result<Self> {
        config.validate()?;
        let mut child = spawn_executor(config)?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| BridgeError::Spawn("failed to capture executor stdin".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| BridgeError::Spawn("failed to capture executor stdout".into()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| BridgeError::Spawn("failed to capture executor stderr".into()))?;

        let bridge = Self::from_streams(stdin, stdout, config.max_line_bytes);
        tokio::spawn(run_stderr(stderr));
        drop(monitor_exit(child, bridge.shared.cancel.clone()));
        Ok(bridge)
    }

    /// Connect to an executor over existing streams.
    ///
    /// `writer` receives request lines and `reader` yields response lines.
    /// Must be called from within a tokio runtime.
    pub fn from_streams<W, R>(writer: W, reader: R, max_line_bytes: usize) -> Self
    where
        W: AsyncWrite + Unpin + Send + 'static,
        R: AsyncRead + Unpin + Send + 'static,
    {
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (request_tx, request_rx) = mpsc::unbounded_channel();
        let noise = Arc::new(AtomicU64::new(0));
        let ended = Arc::new(AtomicBool::new(false));
        let cancel = CancellationToken::new();

        tokio::spawn(run_tracker(command_rx, request_tx, Arc::clone(&noise)));
        tokio::spawn(run_writer(writer, request_rx, cancel.clone()));
        tokio::spawn(run_reader(
            reader,
            max_line_bytes,
            commands.clone(),
            Arc::clone(&noise),
            cancel.clone(),
        ));
        tokio::spawn(run_closer(cancel.clone(), Arc::clone(&ended), commands.clone()));

        Self {
            shared: Arc::new(Shared {
                commands,
                next_id: Mutex::new(1),
                ended,
                noise,
                cancel,
            }),
        }
    }

    /// Evaluate `code` in the executor's shared context and fetch the result.
    pub fn evaluate(&self, code: &str) -> Pending {
        self.issue(|id| Request::code(id, code, ReturnMode::Value), Vec::new(), false)
            .1
    }

    /// Call a function literal with `args` and fetch the result.
    pub fn evaluate_function(&self, source: &str, args: Vec<Arg>) -> Pending {
        let deps = reference_deps(&args);
        let args = args.iter().map(Arg::to_json).collect();
        self.issue(
            |id| Request::function(id, source, args, ReturnMode::Value),
            deps,
            false,
        )
        .1
    }

    /// Evaluate `source` and keep the result executor-side.
    ///
    /// Source starting with a closure (`|…|`, `move |…|`) or `fn` is called
    /// with `args`; anything else is evaluated as code and `args` are ignored.
    pub fn evaluate_to_ref(&self, source: &str, args: Vec<Arg>) -> Reference {
        if !is_function_literal(source) {
            let (id, _) = self.issue(
                |id| Request::code(id, source, ReturnMode::Reference),
                Vec::new(),
                true,
            );
            return Reference::new(id, self.clone());
        }

        let deps = reference_deps(&args);
        let args = args.iter().map(Arg::to_json).collect();
        let (id, _) = self.issue(
            |id| Request::function(id, source, args, ReturnMode::Reference),
            deps,
            true,
        );
        Reference::new(id, self.clone())
    }

    /// Load a built-in executor module such as `"path"` or `"math"`.
    pub fn require(&self, name: &str) -> Reference {
        self.evaluate_to_ref(&format!("require({name:?})"), Vec::new())
    }

    /// Run `action` once request `id` settles, or right away with `None`
    /// when it is not pending. Actions on the same id run in registration
    /// order.
    pub fn after_settled(
        &self,
        id: u64,
        action: impl FnOnce(Option<Result<serde_json::Value>>) + Send + 'static,
    ) {
        let action: SettledAction = Box::new(action);
        if let Err(mpsc::error::SendError(Command::AfterSettled { action, .. })) = self
            .shared
            .commands
            .send(Command::AfterSettled { id, action })
        {
            action(None);
        }
    }

    /// Number of malformed or stray lines seen from the executor.
    #[must_use]
    pub fn noise(&self) -> u64 {
        self.shared.noise.load(Ordering::Relaxed)
    }

    /// Whether the bridge has ended.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.shared.ended.load(Ordering::SeqCst)
    }

    /// Stop the executor. Pending requests reject with
    /// [`BridgeError::ProcessTerminated`]; so does everything issued later.
    ///
    /// Calling `close` more than once has no further effect.
    pub fn close(&self) {
        if self.shared.ended.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("closing bridge");
        let _ = self.shared.commands.send(Command::Closed);
        self.shared.cancel.cancel();
    }

    /// Register a request and queue it for writing once `deps` settle.
    pub(crate) fn issue(
        &self,
        build: impl FnOnce(u64) -> Request,
        deps: Vec<u64>,
        memo: bool,
    ) -> (u64, Pending) {
        let mut next_id = self
            .shared
            .next_id
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let id = *next_id;
        *next_id += 1;
        if self.is_closed() {
            debug!(id, "bridge ended, failing request");
            return (id, Pending::failed(id, BridgeError::ProcessTerminated));
        }

        let (reply, rx) = oneshot::channel();
        let command = Command::Issue {
            request: build(id),
            deps,
            memo,
            reply,
        };
        let sent = self.shared.commands.send(command);
        drop(next_id);

        if sent.is_err() {
            return (id, Pending::failed(id, BridgeError::ProcessTerminated));
        }
        (id, Pending::new(id, rx))
    }

    /// Outcome of request `id`, waiting for it if needed.
    pub(crate) fn watch(&self, id: u64) -> Pending {
        let (reply, rx) = oneshot::channel();
        if self.shared.commands.send(Command::Watch { id, reply }).is_err() {
            return Pending::failed(id, BridgeError::ProcessTerminated);
        }
        Pending::new(id, rx)
    }

    /// Dispose of reference `id` once its creation and every request
    /// chained on it have settled.
    pub(crate) fn release(&self, id: u64) {
        let _ = self.shared.commands.send(Command::Release { id });
    }
}

/// Whether `source` is sent as a function literal rather than as code.
#[must_use]
pub fn is_function_literal(source: &str) -> bool {
    let source = source.trim_start();
    let after_move = source
        .strip_prefix("move")
        .filter(|rest| rest.starts_with(char::is_whitespace) || rest.starts_with('|'))
        .map_or(source, str::trim_start);
    let after_async = after_move
        .strip_prefix("async")
        .filter(|rest| rest.starts_with(char::is_whitespace))
        .map_or(after_move, str::trim_start);

    after_move.starts_with('|')
        || after_async.starts_with('|')
        || (after_async.starts_with("fn") && !after_async[2..].starts_with(is_ident_char))
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

pub(crate) fn reference_deps(args: &[Arg]) -> Vec<u64> {
    let mut deps: Vec<u64> = Vec::new();
    for id in args.iter().filter_map(Arg::reference_id) {
        if !deps.contains(&id) {
            deps.push(id);
        }
    }
    deps
}
