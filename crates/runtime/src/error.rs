//! Error taxonomy for the binding and the translation from native failures.

use thiserror::Error;

use crate::handle::HandleKind;
use crate::native::{NativeError, NativeErrorCode};

/// Result type alias for binding operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced to callers of the binding.
#[derive(Debug, Error)]
pub enum Error {
	/// A lookup yielded nothing, or a required payload was null.
	#[error("Not found: {0}")]
	NotFound(String),

	/// The wrapper's handle has already been released.
	#[error("{kind} has been disposed")]
	UseAfterDispose { kind: HandleKind },

	/// `finish` was given a result it cannot consume.
	#[error("Invalid async state: {0}")]
	InvalidAsyncState(String),

	/// The platform refused access (e.g. attaching to a privileged process).
	#[error("Permission denied: {0}")]
	PermissionDenied(String),

	/// The platform or backend lacks the capability.
	#[error("Not supported: {0}")]
	NotSupported(String),

	/// A caller-supplied timeout expired.
	#[error("Timeout: {0}")]
	Timeout(String),

	/// The operation was abandoned through its cancellation scope.
	#[error("Operation was cancelled")]
	Cancelled,

	/// Any other failure reported by the native core.
	#[error("Native failure ({code}): {message}")]
	Native { code: NativeErrorCode, message: String },

	/// Rejected before reaching native code, or by the native core.
	#[error("Invalid argument: {0}")]
	InvalidArgument(String),

	/// Collection index outside `[0, len)`.
	#[error("Index {index} out of range for collection of length {len}")]
	IndexOutOfRange { index: usize, len: usize },

	/// Process-wide init/deinit discipline was violated.
	#[error("Lifecycle error: {0}")]
	Lifecycle(String),

	/// The native library could not be located or loaded.
	#[error("Native library error: {0}")]
	Library(String),

	/// The native core returned a payload of the wrong shape.
	#[error("Protocol error: {0}")]
	Protocol(String),

	/// JSON serialization/deserialization error.
	#[error("JSON error: {0}")]
	Json(#[from] serde_json::Error),
}

impl Error {
	pub fn is_not_found(&self) -> bool {
		matches!(self, Error::NotFound(_))
	}

	/// Returns true if this is a timeout error.
	pub fn is_timeout(&self) -> bool {
		matches!(self, Error::Timeout(_))
	}

	pub fn is_cancelled(&self) -> bool {
		matches!(self, Error::Cancelled)
	}

	pub fn is_use_after_dispose(&self) -> bool {
		matches!(self, Error::UseAfterDispose { .. })
	}

	/// Returns the native code for errors that came from the native core.
	pub fn native_code(&self) -> Option<NativeErrorCode> {
		match self {
			Error::Native { code, .. } => Some(*code),
			_ => None,
		}
	}
}

impl From<NativeError> for Error {
	fn from(err: NativeError) -> Self {
		let NativeError { code, message } = err;
		match code {
			NativeErrorCode::ProcessNotFound => Error::NotFound(message),
			NativeErrorCode::PermissionDenied => Error::PermissionDenied(message),
			NativeErrorCode::NotSupported | NativeErrorCode::ExecutableNotSupported => Error::NotSupported(message),
			NativeErrorCode::TimedOut => Error::Timeout(message),
			NativeErrorCode::Cancelled => Error::Cancelled,
			NativeErrorCode::InvalidArgument => Error::InvalidArgument(message),
			code => Error::Native { code, message },
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn translate(code: NativeErrorCode) -> Error {
		NativeError::new(code, "boom").into()
	}

	#[test]
	fn test_translation_table() {
		assert!(translate(NativeErrorCode::ProcessNotFound).is_not_found());
		assert!(matches!(
			translate(NativeErrorCode::PermissionDenied),
			Error::PermissionDenied(_)
		));
		assert!(matches!(translate(NativeErrorCode::NotSupported), Error::NotSupported(_)));
		assert!(matches!(
			translate(NativeErrorCode::ExecutableNotSupported),
			Error::NotSupported(_)
		));
		assert!(translate(NativeErrorCode::TimedOut).is_timeout());
		assert!(translate(NativeErrorCode::Cancelled).is_cancelled());
		assert!(matches!(
			translate(NativeErrorCode::InvalidArgument),
			Error::InvalidArgument(_)
		));
	}

	#[test]
	fn test_unmapped_codes_keep_code_and_message() {
		let err = translate(NativeErrorCode::ExecutableNotFound);
		assert_eq!(err.native_code(), Some(NativeErrorCode::ExecutableNotFound));
		assert_eq!(err.to_string(), "Native failure (executable-not-found): boom");

		let err = translate(NativeErrorCode::Other(42));
		assert_eq!(err.native_code(), Some(NativeErrorCode::Other(42)));
	}

	#[test]
	fn test_timeout_distinct_from_cancelled() {
		let timeout = translate(NativeErrorCode::TimedOut);
		assert!(!timeout.is_cancelled());
		assert!(!Error::Cancelled.is_timeout());
	}

	#[test]
	fn test_use_after_dispose_message_names_kind() {
		let err = Error::UseAfterDispose {
			kind: HandleKind::ProcessList,
		};
		assert_eq!(err.to_string(), "ProcessList has been disposed");
	}
}
