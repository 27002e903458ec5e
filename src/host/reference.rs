//! Host-side handles to executor-side values.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::arg::Arg;
use super::bridge::{reference_deps, Bridge};
use super::pending::Pending;
use crate::protocol::Request;

/// Client-side replacement for a forwarded method.
pub type Override = Arc<dyn Fn(&Reference, Vec<Arg>) -> Reference + Send + Sync>;

/// Handle to a value retained by the executor.
///
/// A `Reference` never holds the value itself. Every operation issues a new
/// request that the executor runs against its reference table, ordered
/// after the request that created this reference. Dropping the handle
/// releases the executor-side value once that is safe.
pub struct Reference {
    id: u64,
    bridge: Bridge,
    overrides: HashMap<String, Override>,
}

impl fmt::Debug for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reference")
            .field("id", &self.id)
            .field("overrides", &self.overrides.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl Reference {
    pub(crate) fn new(id: u64, bridge: Bridge) -> Self {
        Self {
            id,
            bridge,
            overrides: HashMap::new(),
        }
    }

    /// Id of the request that created this reference.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The bridge this reference belongs to.
    #[must_use]
    pub fn bridge(&self) -> &Bridge {
        &self.bridge
    }

    /// Call method `name` on the referenced value; the result stays
    /// executor-side.
    ///
    /// An override registered under `name` runs instead of the forwarder.
    pub fn call(&self, name: &str, args: Vec<Arg>) -> Reference {
        match self.overrides.get(name) {
            Some(handler) => handler(self, args),
            None => self.forward(name, args),
        }
    }

    /// Call method `name` on the executor, ignoring overrides.
    pub fn forward(&self, name: &str, args: Vec<Arg>) -> Reference {
        let mut deps = vec![self.id];
        deps.extend(reference_deps(&args).into_iter().filter(|&dep| dep != self.id));
        let args = args.iter().map(Arg::to_json).collect();
        let (id, _) = self
            .bridge
            .issue(|id| Request::method(id, self.id, name, args), deps, true);
        Reference::new(id, self.bridge.clone())
    }

    /// Read property `name` of the referenced value; the result stays
    /// executor-side.
    pub fn property(&self, name: &str) -> Reference {
        let (id, _) = self
            .bridge
            .issue(|id| Request::property(id, self.id, name), vec![self.id], true);
        Reference::new(id, self.bridge.clone())
    }

    /// Fetch the referenced value.
    ///
    /// Rejects with the creation error if this reference failed to be created.
    pub fn value(&self) -> Pending {
        self.bridge
            .issue(|id| Request::value_of(id, self.id), vec![self.id], false)
            .1
    }

    /// Wait for the creating request, resolving to the value's type tag.
    pub fn settled(&self) -> Pending {
        self.bridge.watch(self.id)
    }

    /// Replace method `name` with a client-side handler.
    pub fn set_override(
        &mut self,
        name: impl Into<String>,
        handler: impl Fn(&Reference, Vec<Arg>) -> Reference + Send + Sync + 'static,
    ) {
        self.overrides.insert(name.into(), Arc::new(handler));
    }

    /// Remove an override, restoring forwarding for `name`.
    pub fn clear_override(&mut self, name: &str) {
        self.overrides.remove(name);
    }

    /// Pass this reference as a call argument.
    #[must_use]
    pub fn as_arg(&self) -> Arg {
        Arg::Reference(self.id)
    }

    /// Release the executor-side value now instead of at end of scope.
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for Reference {
    fn drop(&mut self) {
        self.bridge.release(self.id);
    }
}
