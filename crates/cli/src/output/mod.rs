//! Result envelope and rendering for every command.
//!
//! With `--format json` each command prints one envelope on stdout:
//!
//! ```json
//! { "ok": true, "command": "ps", "data": { ... }, "durationMs": 12 }
//! ```
//!
//! and on failure:
//!
//! ```json
//! { "ok": false, "command": "attach", "error": { "code": "PERMISSION_DENIED", "message": "..." } }
//! ```
//!
//! `attach` additionally prints one JSON line per script message before
//! its envelope. Text output is a table or a short summary per command.

#[cfg(test)]
mod tests;

use std::fmt;
use std::io::{self, Write};
use std::time::Instant;

use colored::Colorize;
use frida::{CrashReport, DetachReason, DeviceType, ScriptMessage};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
	/// Human-readable text
	#[default]
	Text,
	/// JSON envelope
	Json,
}

impl std::str::FromStr for OutputFormat {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_lowercase().as_str() {
			"text" => Ok(OutputFormat::Text),
			"json" => Ok(OutputFormat::Json),
			_ => Err(format!("unknown format: {s}")),
		}
	}
}

impl fmt::Display for OutputFormat {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			OutputFormat::Text => write!(f, "text"),
			OutputFormat::Json => write!(f, "json"),
		}
	}
}

/// The envelope printed by every command.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandResult<T> {
	pub ok: bool,

	pub command: String,

	#[serde(skip_serializing_if = "Option::is_none")]
	pub data: Option<T>,

	#[serde(skip_serializing_if = "Option::is_none")]
	pub error: Option<CommandError>,

	#[serde(skip_serializing_if = "Option::is_none")]
	pub duration_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandError {
	pub code: ErrorCode,

	pub message: String,

	#[serde(skip_serializing_if = "Option::is_none")]
	pub details: Option<Value>,
}

/// Stable error codes for scripted callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
	/// The engine could not be loaded or initialized
	EngineUnavailable,
	DeviceNotFound,
	ProcessNotFound,
	PermissionDenied,
	NotSupported,
	Timeout,
	Cancelled,
	InvalidInput,
	/// The engine reported a failure with its own code (see `details.code`)
	NativeFailure,
	IoError,
	InternalError,
}

impl fmt::Display for ErrorCode {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let text = match self {
			ErrorCode::EngineUnavailable => "ENGINE_UNAVAILABLE",
			ErrorCode::DeviceNotFound => "DEVICE_NOT_FOUND",
			ErrorCode::ProcessNotFound => "PROCESS_NOT_FOUND",
			ErrorCode::PermissionDenied => "PERMISSION_DENIED",
			ErrorCode::NotSupported => "NOT_SUPPORTED",
			ErrorCode::Timeout => "TIMEOUT",
			ErrorCode::Cancelled => "CANCELLED",
			ErrorCode::InvalidInput => "INVALID_INPUT",
			ErrorCode::NativeFailure => "NATIVE_FAILURE",
			ErrorCode::IoError => "IO_ERROR",
			ErrorCode::InternalError => "INTERNAL_ERROR",
		};
		f.write_str(text)
	}
}

/// Builder for [`CommandResult`]; measures the command's duration from
/// construction to [`build`](Self::build).
pub struct ResultBuilder<T> {
	command: String,
	data: Option<T>,
	error: Option<CommandError>,
	started: Instant,
}

impl<T: Serialize> ResultBuilder<T> {
	pub fn new(command: impl Into<String>) -> Self {
		Self {
			command: command.into(),
			data: None,
			error: None,
			started: Instant::now(),
		}
	}

	pub fn data(mut self, data: T) -> Self {
		self.data = Some(data);
		self
	}

	pub fn error(mut self, code: ErrorCode, message: impl Into<String>) -> Self {
		self.error = Some(CommandError {
			code,
			message: message.into(),
			details: None,
		});
		self
	}

	pub fn error_with(mut self, error: CommandError) -> Self {
		self.error = Some(error);
		self
	}

	pub fn build(self) -> CommandResult<T> {
		let ok = self.error.is_none() && self.data.is_some();
		let elapsed = self.started.elapsed().as_millis();
		CommandResult {
			ok,
			command: self.command,
			data: self.data,
			error: self.error,
			duration_ms: Some(u64::try_from(elapsed).unwrap_or(u64::MAX)),
		}
	}
}

/// Text rendering of a command's data.
pub trait Render {
	fn render(&self, out: &mut dyn Write) -> io::Result<()>;
}

impl Render for () {
	fn render(&self, _out: &mut dyn Write) -> io::Result<()> {
		Ok(())
	}
}

pub fn print_result<T: Serialize + Render>(result: &CommandResult<T>, format: OutputFormat) {
	match format {
		OutputFormat::Json => {
			if let Ok(json) = serde_json::to_string_pretty(result) {
				println!("{json}");
			}
		}
		OutputFormat::Text => {
			let mut stdout = io::stdout().lock();
			if let Some(data) = &result.data {
				let _ = data.render(&mut stdout);
			}
		}
	}
}

pub fn print_error_stderr(error: &CommandError) {
	eprintln!("{} [{}]: {}", "error".red().bold(), error.code, error.message);
}

/// Prints one message received from a script, as it arrives.
pub fn print_message(message: &ScriptMessage, data: Option<&[u8]>, format: OutputFormat) {
	match format {
		OutputFormat::Json => println!("{}", message_json(message, data)),
		OutputFormat::Text => {
			let mut line = match message {
				ScriptMessage::Send { payload } => format!("{} {payload}", "send".cyan()),
				ScriptMessage::Error {
					description,
					file_name,
					line_number,
					..
				} => match (file_name, line_number) {
					(Some(file), Some(line)) => format!("{} {description} ({file}:{line})", "error".red()),
					_ => format!("{} {description}", "error".red()),
				},
				ScriptMessage::Log { level, payload } => {
					format!("{} {payload}", format!("{level:?}").to_lowercase().dimmed())
				}
				ScriptMessage::Raw(text) => format!("{} {text}", "raw".dimmed()),
			};
			if let Some(data) = data {
				line.push_str(&format!(" (+{} bytes)", data.len()));
			}
			println!("{line}");
		}
	}
}

/// One NDJSON line for a script message.
pub fn message_json(message: &ScriptMessage, data: Option<&[u8]>) -> Value {
	let body = match message {
		ScriptMessage::Raw(text) => json!({ "type": "raw", "text": text }),
		other => serde_json::to_value(other).unwrap_or(Value::Null),
	};
	json!({ "event": "message", "message": body, "dataLength": data.map(<[u8]>::len) })
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionData {
	pub engine: String,
	pub major: u32,
	pub minor: u32,
	pub micro: u32,
	pub cli: String,
}

impl Render for VersionData {
	fn render(&self, out: &mut dyn Write) -> io::Result<()> {
		writeln!(out, "engine {}", self.engine)?;
		writeln!(out, "cli    {}", self.cli)
	}
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceRow {
	pub id: String,
	pub name: String,
	#[serde(rename = "type")]
	pub kind: DeviceType,
}

#[derive(Debug, Serialize)]
pub struct DevicesData {
	pub devices: Vec<DeviceRow>,
}

impl Render for DevicesData {
	fn render(&self, out: &mut dyn Write) -> io::Result<()> {
		let width = self.devices.iter().map(|d| d.id.len()).max().unwrap_or(0).max(2);
		writeln!(out, "{}", format!("{:<width$}  {:<6}  NAME", "ID", "TYPE").bold())?;
		for device in &self.devices {
			writeln!(out, "{:<width$}  {:<6}  {}", device.id, device.kind.to_string(), device.name)?;
		}
		Ok(())
	}
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessRow {
	pub pid: u32,
	pub name: String,
	#[serde(skip_serializing_if = "Map::is_empty")]
	pub parameters: Map<String, Value>,
}

#[derive(Debug, Serialize)]
pub struct ProcessesData {
	pub device: String,
	pub processes: Vec<ProcessRow>,
}

impl Render for ProcessesData {
	fn render(&self, out: &mut dyn Write) -> io::Result<()> {
		writeln!(out, "{}", format!("{:>7}  NAME", "PID").bold())?;
		for process in &self.processes {
			write!(out, "{:>7}  {}", process.pid, process.name)?;
			if let Some(Value::String(path)) = process.parameters.get("path") {
				write!(out, "  {}", path.dimmed())?;
			}
			writeln!(out)?;
		}
		Ok(())
	}
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationRow {
	pub identifier: String,
	pub name: String,
	/// Absent when the application is not running.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub pid: Option<u32>,
	#[serde(skip_serializing_if = "Map::is_empty")]
	pub parameters: Map<String, Value>,
}

#[derive(Debug, Serialize)]
pub struct ApplicationsData {
	pub device: String,
	pub applications: Vec<ApplicationRow>,
}

impl Render for ApplicationsData {
	fn render(&self, out: &mut dyn Write) -> io::Result<()> {
		writeln!(out, "{}", format!("{:>7}  {:<12}  IDENTIFIER", "PID", "NAME").bold())?;
		for app in &self.applications {
			let pid = app.pid.map_or_else(|| "-".to_owned(), |pid| pid.to_string());
			writeln!(out, "{pid:>7}  {:<12}  {}", app.name, app.identifier)?;
		}
		Ok(())
	}
}

/// Result of `spawn`, `kill` and `resume`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessActionData {
	pub action: &'static str,
	pub pid: u32,
	#[serde(skip_serializing_if = "std::ops::Not::not")]
	pub resumed: bool,
}

impl Render for ProcessActionData {
	fn render(&self, out: &mut dyn Write) -> io::Result<()> {
		let verb = match self.action {
			"spawn" if self.resumed => "spawned and resumed",
			"spawn" => "spawned (suspended)",
			"kill" => "killed",
			_ => "resumed",
		};
		writeln!(out, "{} {}", verb.green(), self.pid)
	}
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachData {
	pub pid: u32,
	pub script: String,
	pub messages: usize,
	/// Why the session ended, when it ended on its own.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub detach_reason: Option<DetachReason>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub crash: Option<CrashReport>,
}

impl Render for AttachData {
	fn render(&self, out: &mut dyn Write) -> io::Result<()> {
		match self.detach_reason {
			Some(reason) => writeln!(out, "{} pid {} ({reason})", "detached".yellow(), self.pid)?,
			None => writeln!(out, "{} from pid {}", "detached".green(), self.pid)?,
		}
		if let Some(crash) = &self.crash {
			writeln!(out, "{}", crash.report.red())?;
		}
		writeln!(out, "{} message(s) from {}", self.messages, self.script)
	}
}
