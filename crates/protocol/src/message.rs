//! Messages posted by injected scripts to the host.
//!
//! The agent side delivers a JSON text payload plus optional raw bytes.
//! [`ScriptMessage::parse`] turns the text into a typed message; text that
//! does not match a known shape is kept verbatim as [`ScriptMessage::Raw`].

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Severity attached to `console.*` output forwarded from a script.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
	Info,
	Warning,
	Error,
}

/// A message received from a script.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ScriptMessage {
	/// `send(payload)` from the agent.
	Send { payload: Value },

	/// An uncaught exception inside the agent.
	#[serde(rename_all = "camelCase")]
	Error {
		description: String,
		#[serde(default)]
		stack: Option<String>,
		#[serde(default)]
		file_name: Option<String>,
		#[serde(default)]
		line_number: Option<u32>,
		#[serde(default)]
		column_number: Option<u32>,
	},

	/// Console output.
	Log { level: LogLevel, payload: String },

	/// Text that is not one of the shapes above.
	#[serde(skip)]
	Raw(String),
}

impl ScriptMessage {
	/// Parses the text half of a script message. Never fails.
	pub fn parse(text: &str) -> Self {
		serde_json::from_str(text).unwrap_or_else(|_| Self::Raw(text.to_owned()))
	}

	/// Returns the `send()` payload, if this is a send message.
	pub fn payload(&self) -> Option<&Value> {
		match self {
			Self::Send { payload } => Some(payload),
			_ => None,
		}
	}

	pub fn is_error(&self) -> bool {
		matches!(self, Self::Error { .. })
	}
}
