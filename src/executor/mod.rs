//! The executor side of the bridge.
//!
//! The executor owns a [`Runtime`](crate::runtime::Runtime) and a
//! [`ReferenceTable`](table::ReferenceTable), reads requests on stdin and
//! answers on stdout. The `farside-executor` binary is a thin wrapper around
//! [`serve::serve`].

pub mod dispatch;
pub mod revive;
pub mod serve;
pub mod table;

pub use dispatch::Dispatcher;
pub use serve::{serve, ServeSummary};
pub use table::ReferenceTable;
