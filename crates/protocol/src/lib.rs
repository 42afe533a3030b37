//! Value types for the frida-host binding.
//!
//! Everything in this crate is plain data: enums describing devices,
//! sessions and scripts, the option structs passed into queries and
//! spawns, and the parsed form of messages posted by injected scripts.
//! Nothing here owns a native handle; the disposable, handle-backed
//! objects live in `frida-runtime` and `frida-host`.
//!
//! All types serialize to the JSON shapes exchanged with the native core.

pub mod message;
pub mod options;
pub mod types;

pub use message::*;
pub use options::*;
pub use types::*;
