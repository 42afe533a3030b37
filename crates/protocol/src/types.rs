//! Closed enumerations and small records exchanged with the native core.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Kind of device an instrumentation backend exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
	/// The machine the binding runs on.
	Local,
	/// A device reached over the network (socket backend or remote server).
	Remote,
	/// A device attached over USB.
	Usb,
}

impl fmt::Display for DeviceType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Local => write!(f, "local"),
			Self::Remote => write!(f, "remote"),
			Self::Usb => write!(f, "usb"),
		}
	}
}

impl FromStr for DeviceType {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"local" => Ok(Self::Local),
			"remote" => Ok(Self::Remote),
			"usb" => Ok(Self::Usb),
			other => Err(format!("unknown device type '{other}'")),
		}
	}
}

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DetachReason {
	/// `detach()` was called by the host.
	ApplicationRequested,
	/// The target replaced its image (e.g. `execve`).
	ProcessReplaced,
	/// The target exited or was killed.
	ProcessTerminated,
	/// The transport to the device went away.
	ConnectionTerminated,
	/// The device itself was lost.
	DeviceLost,
}

impl fmt::Display for DetachReason {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let s = match self {
			Self::ApplicationRequested => "application-requested",
			Self::ProcessReplaced => "process-replaced",
			Self::ProcessTerminated => "process-terminated",
			Self::ConnectionTerminated => "connection-terminated",
			Self::DeviceLost => "device-lost",
		};
		f.write_str(s)
	}
}

/// How the standard streams of a spawned program are wired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stdio {
	/// Share the device's own stdio.
	#[default]
	Inherit,
	/// Pipe stdio back through the device's `output` signal.
	Pipe,
}

/// Which realm of an emulated process to attach to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Realm {
	#[default]
	Native,
	Emulated,
}

/// How much metadata a query should collect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
	/// Identifiers and names only.
	#[default]
	Minimal,
	/// Adds parameters such as paths and users.
	Metadata,
	/// Adds icons and other expensive details.
	Full,
}

/// JavaScript runtime used to run an injected script.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScriptRuntime {
	#[default]
	Default,
	Qjs,
	V8,
}

/// How a gated child process came to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChildOrigin {
	Fork,
	Exec,
	Spawn,
}

impl fmt::Display for ChildOrigin {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Fork => write!(f, "fork"),
			Self::Exec => write!(f, "exec"),
			Self::Spawn => write!(f, "spawn"),
		}
	}
}

/// Crash details attached to a `process-terminated` detach.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrashReport {
	pub pid: u32,
	pub process_name: String,
	pub summary: String,
	#[serde(default)]
	pub report: String,
}

/// Payload of a session's `detached` signal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetachEvent {
	pub reason: DetachReason,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub crash: Option<CrashReport>,
}

/// Native core version, `major.minor.micro[.nano]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Version {
	pub major: u32,
	pub minor: u32,
	pub micro: u32,
	pub nano: u32,
}

impl fmt::Display for Version {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}.{}.{}", self.major, self.minor, self.micro)?;
		if self.nano != 0 {
			write!(f, ".{}", self.nano)?;
		}
		Ok(())
	}
}

impl FromStr for Version {
	type Err = String;

	/// Parses `17.5.1` or `17.5.1.3`; a trailing `-suffix` on the last
	/// component (as in development builds) is ignored.
	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let core = s.trim().split(['-', '+']).next().unwrap_or_default();
		let parts: Vec<&str> = core.split('.').collect();
		if !(3..=4).contains(&parts.len()) {
			return Err(format!("malformed version string '{s}'"));
		}

		let mut numbers = [0u32; 4];
		for (slot, part) in numbers.iter_mut().zip(&parts) {
			*slot = part
				.parse()
				.map_err(|_| format!("malformed version component '{part}' in '{s}'"))?;
		}

		Ok(Self {
			major: numbers[0],
			minor: numbers[1],
			micro: numbers[2],
			nano: numbers[3],
		})
	}
}
