//! frida-host runtime - handle lifecycle, async bridging and error translation
//!
//! This crate sits between the entity facades (`frida-host`) and the native
//! instrumentation engine:
//!
//! - **Native boundary**: the [`NativeCore`] trait, implemented by a loaded
//!   shared library (`dylib` feature) or the in-process simulator (`sim`)
//! - **Handles**: typed references to native objects ([`Handle<K>`])
//! - **Disposal**: [`Owned<K>`] releases its handle exactly once, however
//!   many threads ask
//! - **Async bridge**: every native capability as a [`Call`] with
//!   start/finish, blocking and `.await` forms
//! - **Errors**: native codes translated into [`Error`]
//! - **Collections**: [`NativeList<E>`] over native list objects
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐
//! │  frida-host  │  Device, Session, Script, ...
//! └──────┬───────┘
//!        │ Owned<K> + Call<T> + NativeList<E>
//! ┌──────▼───────┐
//! │ frida-runtime│  This crate
//! └──────┬───────┘
//!        │ NativeCore
//! ┌──────▼───────┐
//! │ engine / sim │  libfrida-host or SimCore
//! └──────────────┘
//! ```

mod bridge;
pub mod cancel;
mod collection;
mod decode;
pub mod error;
#[cfg(feature = "dylib")]
pub mod ffi;
pub mod handle;
pub mod library;
pub mod native;
mod owned;
mod signal;
#[cfg(any(test, feature = "sim"))]
pub mod sim;

// Re-export key types at crate root
pub use bridge::{AsyncResult, Call};
pub use cancel::{CancelHandler, Cancellable};
pub use collection::{Element, Iter, NativeList};
pub use decode::{FromNative, encode_bytes};
pub use error::{Error, Result};
pub use handle::{Handle, HandleKind, Kind, RawHandle, kind};
pub use library::{LIBRARY_ENV, library_file_name, locate_library};
pub use native::{
	Core, NativeCompletion, NativeCore, NativeError, NativeErrorCode, NativeResult, SignalHandler, SignalId,
};
pub use owned::{Disposable, HandleCell, Lease, Owned};
pub use signal::Subscription;

/// Locates the native library and loads it as a [`Core`].
#[cfg(feature = "dylib")]
pub fn load_library(explicit: Option<&std::path::Path>) -> Result<Core> {
	let path = locate_library(explicit)?;
	let core = ffi::DylibCore::load(&path)?;
	Ok(std::sync::Arc::new(core))
}
