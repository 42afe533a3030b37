use serde_json::json;
use thiserror::Error;

use crate::output::{CommandError, ErrorCode};

pub type Result<T> = std::result::Result<T, CliError>;

#[derive(Debug, Error)]
pub enum CliError {
	#[error("engine unavailable: {0}")]
	Engine(#[source] frida::Error),

	#[error("no device with id '{0}'")]
	DeviceNotFound(String),

	#[error("no process named '{0}'")]
	ProcessNotFound(String),

	#[error("invalid input: {0}")]
	InvalidInput(String),

	#[error(transparent)]
	Io(#[from] std::io::Error),

	#[error(transparent)]
	Json(#[from] serde_json::Error),

	#[error(transparent)]
	Frida(#[from] frida::Error),

	#[error(transparent)]
	Anyhow(#[from] anyhow::Error),
}

impl CliError {
	/// Converts this error to the envelope's error object.
	pub fn to_command_error(&self) -> CommandError {
		let (code, details) = match self {
			CliError::Engine(_) => (ErrorCode::EngineUnavailable, None),
			CliError::DeviceNotFound(id) => (ErrorCode::DeviceNotFound, Some(json!({ "device": id }))),
			CliError::ProcessNotFound(name) => (ErrorCode::ProcessNotFound, Some(json!({ "process": name }))),
			CliError::InvalidInput(_) => (ErrorCode::InvalidInput, None),
			CliError::Io(_) => (ErrorCode::IoError, None),
			CliError::Json(_) | CliError::Anyhow(_) => (ErrorCode::InternalError, None),
			CliError::Frida(err) => classify(err),
		};

		CommandError {
			code,
			message: self.to_string(),
			details,
		}
	}
}

fn classify(err: &frida::Error) -> (ErrorCode, Option<serde_json::Value>) {
	use frida::Error;

	let code = match err {
		Error::NotFound(_) => ErrorCode::ProcessNotFound,
		Error::PermissionDenied(_) => ErrorCode::PermissionDenied,
		Error::NotSupported(_) => ErrorCode::NotSupported,
		Error::Timeout(_) => ErrorCode::Timeout,
		Error::Cancelled => ErrorCode::Cancelled,
		Error::InvalidArgument(_) | Error::IndexOutOfRange { .. } => ErrorCode::InvalidInput,
		Error::Lifecycle(_) | Error::Library(_) => ErrorCode::EngineUnavailable,
		Error::Native { code, .. } => {
			return (ErrorCode::NativeFailure, Some(json!({ "code": code.to_string() })));
		}
		_ => ErrorCode::InternalError,
	};
	(code, None)
}
