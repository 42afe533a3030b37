//! The boundary to the native instrumentation engine.
//!
//! [`NativeCore`] is the whole foreign surface this binding relies on:
//! lifecycle, constructor/destructor pairs, property access, immediate
//! calls, one asynchronous primitive and signal connection. Everything
//! above it (wrappers, bridge, facades) is backend-agnostic; a backend is
//! either the simulated engine (`sim` feature) or a shared library loaded
//! at startup (`dylib` feature).
//!
//! Values cross the boundary as JSON. Handles inside payloads are encoded
//! as [`RawHandle`] objects (`{"kind": "session", "id": 7}`).

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::cancel::Cancellable;
use crate::handle::{HandleKind, RawHandle};

/// Error codes reported by the native core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NativeErrorCode {
	ServerNotRunning,
	ExecutableNotFound,
	ExecutableNotSupported,
	ProcessNotFound,
	ProcessNotResponding,
	InvalidArgument,
	InvalidOperation,
	PermissionDenied,
	AddressInUse,
	TimedOut,
	NotSupported,
	Protocol,
	Transport,
	Cancelled,
	/// A code this binding does not know about.
	Other(i32),
}

impl NativeErrorCode {
	/// Numeric code as used on the C boundary.
	pub fn as_i32(self) -> i32 {
		match self {
			Self::ServerNotRunning => 0,
			Self::ExecutableNotFound => 1,
			Self::ExecutableNotSupported => 2,
			Self::ProcessNotFound => 3,
			Self::ProcessNotResponding => 4,
			Self::InvalidArgument => 5,
			Self::InvalidOperation => 6,
			Self::PermissionDenied => 7,
			Self::AddressInUse => 8,
			Self::TimedOut => 9,
			Self::NotSupported => 10,
			Self::Protocol => 11,
			Self::Transport => 12,
			Self::Cancelled => 19,
			Self::Other(code) => code,
		}
	}

	pub fn from_i32(code: i32) -> Self {
		match code {
			0 => Self::ServerNotRunning,
			1 => Self::ExecutableNotFound,
			2 => Self::ExecutableNotSupported,
			3 => Self::ProcessNotFound,
			4 => Self::ProcessNotResponding,
			5 => Self::InvalidArgument,
			6 => Self::InvalidOperation,
			7 => Self::PermissionDenied,
			8 => Self::AddressInUse,
			9 => Self::TimedOut,
			10 => Self::NotSupported,
			11 => Self::Protocol,
			12 => Self::Transport,
			19 => Self::Cancelled,
			other => Self::Other(other),
		}
	}
}

impl fmt::Display for NativeErrorCode {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::ServerNotRunning => write!(f, "server-not-running"),
			Self::ExecutableNotFound => write!(f, "executable-not-found"),
			Self::ExecutableNotSupported => write!(f, "executable-not-supported"),
			Self::ProcessNotFound => write!(f, "process-not-found"),
			Self::ProcessNotResponding => write!(f, "process-not-responding"),
			Self::InvalidArgument => write!(f, "invalid-argument"),
			Self::InvalidOperation => write!(f, "invalid-operation"),
			Self::PermissionDenied => write!(f, "permission-denied"),
			Self::AddressInUse => write!(f, "address-in-use"),
			Self::TimedOut => write!(f, "timed-out"),
			Self::NotSupported => write!(f, "not-supported"),
			Self::Protocol => write!(f, "protocol"),
			Self::Transport => write!(f, "transport"),
			Self::Cancelled => write!(f, "cancelled"),
			Self::Other(code) => write!(f, "code-{code}"),
		}
	}
}

impl Serialize for NativeErrorCode {
	fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
		serializer.serialize_i32(self.as_i32())
	}
}

impl<'de> Deserialize<'de> for NativeErrorCode {
	fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
		i32::deserialize(deserializer).map(Self::from_i32)
	}
}

/// A failure reported by the native core: a tagged code plus message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativeError {
	pub code: NativeErrorCode,
	pub message: String,
}

impl NativeError {
	pub fn new(code: NativeErrorCode, message: impl Into<String>) -> Self {
		Self {
			code,
			message: message.into(),
		}
	}

	pub fn invalid_argument(message: impl Into<String>) -> Self {
		Self::new(NativeErrorCode::InvalidArgument, message)
	}

	pub fn invalid_operation(message: impl Into<String>) -> Self {
		Self::new(NativeErrorCode::InvalidOperation, message)
	}

	pub fn cancelled() -> Self {
		Self::new(NativeErrorCode::Cancelled, "Operation was cancelled")
	}
}

impl fmt::Display for NativeError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{} ({})", self.message, self.code)
	}
}

impl std::error::Error for NativeError {}

/// Result type at the native boundary.
pub type NativeResult<T> = std::result::Result<T, NativeError>;

/// Invoked exactly once when an operation started with
/// [`NativeCore::start`] finishes, on a thread chosen by the core.
pub type NativeCompletion = Box<dyn FnOnce(NativeResult<Value>) + Send + 'static>;

/// Receives a signal's JSON payload and optional raw bytes.
pub type SignalHandler = Arc<dyn Fn(Value, Option<Vec<u8>>) + Send + Sync + 'static>;

/// Identifier of a connected signal handler, unique per core.
pub type SignalId = u64;

/// The foreign-function surface of the instrumentation engine.
///
/// Implementations must be callable from any thread. Completions and
/// signal handlers are dispatched from the core's own worker thread(s) and
/// must never be invoked while the core holds a lock the callback could
/// need.
pub trait NativeCore: Send + Sync {
	/// Initializes process-wide engine state. Calling it twice without an
	/// intervening [`deinit`](Self::deinit) fails.
	fn init(&self) -> NativeResult<()>;

	/// Tears down process-wide engine state.
	fn deinit(&self);

	/// Engine version string, e.g. `"17.5.1"`.
	fn version(&self) -> String;

	/// Creates a root or options object.
	fn create(&self, kind: HandleKind, params: Value) -> NativeResult<RawHandle>;

	/// Drops the binding's reference to `handle` and disconnects every
	/// signal handler connected through it. Called exactly once per handle.
	/// Objects with pending operations stay alive until those complete.
	fn release(&self, handle: RawHandle);

	/// Reads a property.
	fn get(&self, handle: RawHandle, name: &str) -> NativeResult<Value>;

	/// Writes a property.
	fn set(&self, handle: RawHandle, name: &str, value: Value) -> NativeResult<()>;

	/// Performs an immediate, non-blocking call.
	fn invoke(&self, handle: RawHandle, method: &str, params: Value) -> NativeResult<Value>;

	/// Starts an asynchronous operation. Returns immediately; `done` is
	/// called exactly once with the outcome. Cancellation through
	/// `cancellable` is best-effort.
	fn start(&self, handle: RawHandle, method: &str, params: Value, cancellable: &Cancellable, done: NativeCompletion);

	/// Connects `handler` to `signal` emitted by the object behind `handle`.
	fn connect(&self, handle: RawHandle, signal: &str, handler: SignalHandler) -> NativeResult<SignalId>;

	/// Disconnects a handler. Unknown ids are ignored.
	fn disconnect(&self, handle: RawHandle, id: SignalId);
}

/// Shared reference to a backend.
pub type Core = Arc<dyn NativeCore>;
