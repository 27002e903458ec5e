//! The host side of the bridge.
//!
//! A [`Bridge`] owns one executor process and the tasks that talk to it.
//! Requests return immediately with a [`Pending`] handle or a [`Reference`]
//! to a value that stays inside the executor.
//!
//! ```rust,ignore
//! use farside::{Arg, Bridge, BridgeConfig};
//!
//! let bridge = Bridge::spawn(&BridgeConfig::default()).await?;
//! let path = bridge.require("path");
//! let joined = path.call("join", vec![Arg::from("a"), Arg::from("b")]);
//! assert_eq!(joined.value().await?, "a/b");
//! bridge.close();
//! ```

pub mod arg;
pub mod bridge;
pub mod pending;
pub mod reference;
pub mod supervisor;
pub(crate) mod tracker;

pub use arg::Arg;
pub use bridge::Bridge;
pub use pending::Pending;
pub use reference::{Override, Reference};
