//! State of the simulated machine: devices, their processes and
//! applications, and the sessions and scripts attached to them.

use std::collections::{BTreeMap, HashMap};

use frida_protocol::{ChildOrigin, DetachReason, DeviceType, Scope};
use serde_json::{Map, Value, json};

use crate::native::{NativeError, NativeErrorCode, NativeResult};

pub const LOCAL_DEVICE: &str = "local";
pub const SOCKET_DEVICE: &str = "socket";
pub const USB_DEVICE: &str = "usb-1a2b3c";

/// Programs `spawn` accepts on non-USB devices.
const EXECUTABLES: &[&str] = &["/bin/sh", "/bin/cat", "/usr/bin/true", "/usr/bin/sleep"];

/// Prefix of compiled script bytes.
pub(super) const BYTECODE_MAGIC: &[u8] = b"FRIDA-BC\0";

#[derive(Debug, Clone)]
pub(super) struct ProcessInfo {
	pub pid: u32,
	pub name: String,
	pub parameters: Map<String, Value>,
	pub suspended: bool,
}

impl ProcessInfo {
	pub fn new(pid: u32, name: &str, path: &str, user: &str) -> Self {
		let mut parameters = Map::new();
		parameters.insert("path".into(), json!(path));
		parameters.insert("user".into(), json!(user));
		Self {
			pid,
			name: name.to_owned(),
			parameters,
			suspended: false,
		}
	}

	/// Copy trimmed to what `scope` asks for.
	pub fn scoped(&self, scope: Scope) -> Self {
		let mut copy = self.clone();
		if scope == Scope::Minimal {
			copy.parameters.clear();
		}
		copy
	}
}

#[derive(Debug, Clone)]
pub(super) struct AppInfo {
	pub identifier: String,
	pub name: String,
	pub pid: u32,
	pub parameters: Map<String, Value>,
}

impl AppInfo {
	pub fn scoped(&self, scope: Scope) -> Self {
		let mut copy = self.clone();
		if scope == Scope::Minimal {
			copy.parameters.clear();
		}
		copy
	}
}

#[derive(Debug, Clone)]
pub(super) struct SpawnInfo {
	pub pid: u32,
	pub identifier: Option<String>,
}

#[derive(Debug, Clone)]
pub(super) struct ChildInfo {
	pub pid: u32,
	pub parent_pid: u32,
	pub origin: ChildOrigin,
	pub identifier: Option<String>,
	pub path: Option<String>,
	pub argv: Option<Vec<String>>,
	pub envp: Option<BTreeMap<String, String>>,
}

pub(super) struct DeviceState {
	pub id: String,
	pub name: String,
	pub kind: DeviceType,
	pub lost: bool,
	pub parameters: Map<String, Value>,
	pub processes: Vec<ProcessInfo>,
	pub applications: Vec<AppInfo>,
	pub frontmost: Option<String>,
	pub spawn_gating: bool,
	pub pending_spawn: Vec<SpawnInfo>,
	pub pending_children: Vec<ChildInfo>,
	next_pid: u32,
}

impl DeviceState {
	pub fn new(id: &str, name: &str, kind: DeviceType, parameters: Value) -> Self {
		Self {
			id: id.to_owned(),
			name: name.to_owned(),
			kind,
			lost: false,
			parameters: match parameters {
				Value::Object(map) => map,
				_ => Map::new(),
			},
			processes: Vec::new(),
			applications: Vec::new(),
			frontmost: None,
			spawn_gating: false,
			pending_spawn: Vec::new(),
			pending_children: Vec::new(),
			next_pid: 4000,
		}
	}

	pub fn process(&self, pid: u32) -> Option<&ProcessInfo> {
		self.processes.iter().find(|p| p.pid == pid)
	}

	pub fn process_by_name(&self, name: &str) -> Option<&ProcessInfo> {
		self.processes.iter().find(|p| p.name.eq_ignore_ascii_case(name))
	}

	pub fn require_process(&self, pid: u32) -> NativeResult<&ProcessInfo> {
		self.process(pid).ok_or_else(|| process_not_found(pid))
	}

	/// Launches `program` suspended and returns its pid.
	pub fn spawn(&mut self, program: &str) -> NativeResult<u32> {
		let name = if self.kind == DeviceType::Usb {
			let app = self
				.applications
				.iter()
				.find(|a| a.identifier == program)
				.ok_or_else(|| {
					NativeError::new(
						NativeErrorCode::ExecutableNotFound,
						format!("unable to find application with identifier '{program}'"),
					)
				})?;
			app.identifier.clone()
		} else {
			if !EXECUTABLES.contains(&program) {
				return Err(NativeError::new(
					NativeErrorCode::ExecutableNotFound,
					format!("unable to find executable at '{program}'"),
				));
			}
			program.rsplit('/').next().unwrap_or(program).to_owned()
		};

		let pid = self.next_pid;
		self.next_pid += 1;
		let mut process = ProcessInfo::new(pid, &name, program, "mobile");
		process.suspended = true;
		self.processes.push(process);
		if let Some(app) = self.applications.iter_mut().find(|a| a.identifier == program) {
			app.pid = pid;
		}
		if self.spawn_gating {
			self.pending_spawn.push(SpawnInfo {
				pid,
				identifier: Some(program.to_owned()),
			});
		}
		Ok(pid)
	}

	pub fn resume(&mut self, pid: u32) -> NativeResult<()> {
		self.pending_spawn.retain(|s| s.pid != pid);
		self.pending_children.retain(|c| c.pid != pid);
		let process = self
			.processes
			.iter_mut()
			.find(|p| p.pid == pid)
			.ok_or_else(|| process_not_found(pid))?;
		if !process.suspended {
			return Err(NativeError::invalid_operation(format!("process {pid} is not suspended")));
		}
		process.suspended = false;
		Ok(())
	}

	pub fn kill(&mut self, pid: u32) -> NativeResult<()> {
		self.require_process(pid)?;
		if pid == 1 {
			return Err(permission_denied(pid));
		}
		self.processes.retain(|p| p.pid != pid);
		self.pending_spawn.retain(|s| s.pid != pid);
		for app in self.applications.iter_mut().filter(|a| a.pid == pid) {
			app.pid = 0;
		}
		Ok(())
	}
}

pub(super) fn process_not_found(pid: u32) -> NativeError {
	NativeError::new(
		NativeErrorCode::ProcessNotFound,
		format!("unable to find process with pid {pid}"),
	)
}

fn permission_denied(pid: u32) -> NativeError {
	NativeError::new(
		NativeErrorCode::PermissionDenied,
		format!("unable to access process with pid {pid} from the current user account"),
	)
}

pub(super) struct SessionState {
	pub device: String,
	pub pid: u32,
	pub detached: bool,
	pub persist_timeout: u32,
	pub child_gating: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum ScriptPhase {
	Created,
	Loaded,
	Destroyed,
}

pub(super) struct ScriptState {
	pub session: u64,
	pub name: String,
	pub source: String,
	pub phase: ScriptPhase,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Backends {
	All,
	NonLocal,
	Socket,
}

impl Backends {
	pub fn parse(value: &Value) -> NativeResult<Self> {
		match value.get("backends").and_then(Value::as_str).unwrap_or("all") {
			"all" => Ok(Self::All),
			"nonlocal" => Ok(Self::NonLocal),
			"socket" => Ok(Self::Socket),
			other => Err(NativeError::invalid_argument(format!("unknown backend selection '{other}'"))),
		}
	}

	pub fn includes(self, device: &DeviceState) -> bool {
		match self {
			Self::All => true,
			Self::NonLocal => device.kind != DeviceType::Local,
			Self::Socket => device.kind == DeviceType::Remote,
		}
	}
}

pub(super) struct ManagerState {
	pub backends: Backends,
	pub closed: bool,
}

/// Everything the simulated engine knows.
pub(super) struct World {
	pub devices: Vec<DeviceState>,
	pub sessions: HashMap<u64, SessionState>,
	pub scripts: HashMap<u64, ScriptState>,
	pub managers: HashMap<u64, ManagerState>,
	next_entity: u64,
}

impl World {
	/// A local machine, a local socket server and one USB phone.
	pub fn fixture() -> Self {
		let mut local = DeviceState::new(
			LOCAL_DEVICE,
			"Local System",
			DeviceType::Local,
			json!({"os": {"id": "linux", "name": "Linux"}, "platform": "linux", "arch": "x86_64", "access": "full"}),
		);
		local.processes = vec![
			ProcessInfo::new(1, "init", "/sbin/init", "root"),
			ProcessInfo::new(412, "sshd", "/usr/sbin/sshd", "root"),
			ProcessInfo::new(2048, "zsh", "/usr/bin/zsh", "user"),
			ProcessInfo::new(3141, "python3", "/usr/bin/python3", "user"),
		];

		let mut socket = DeviceState::new(
			SOCKET_DEVICE,
			"Local Socket",
			DeviceType::Remote,
			json!({"os": {"id": "linux", "name": "Linux"}, "platform": "linux", "arch": "x86_64", "access": "full"}),
		);
		socket.processes = vec![
			ProcessInfo::new(1, "init", "/sbin/init", "root"),
			ProcessInfo::new(5120, "frida-server", "/usr/local/bin/frida-server", "root"),
		];

		let mut usb = DeviceState::new(
			USB_DEVICE,
			"Pixel Sim",
			DeviceType::Usb,
			json!({
				"os": {"id": "android", "name": "Android", "version": "14"},
				"platform": "linux",
				"arch": "arm64",
				"access": "jailed",
			}),
		);
		usb.processes = vec![
			ProcessInfo::new(1, "init", "/system/bin/init", "root"),
			ProcessInfo::new(640, "system_server", "/system/bin/app_process64", "system"),
			ProcessInfo::new(2100, "com.example.notes", "/system/bin/app_process64", "u0_a120"),
		];
		usb.applications = vec![
			AppInfo {
				identifier: "com.example.notes".into(),
				name: "Notes".into(),
				pid: 2100,
				parameters: json!({"version": "3.2.0", "build": "320"})
					.as_object()
					.cloned()
					.unwrap_or_default(),
			},
			AppInfo {
				identifier: "com.example.camera".into(),
				name: "Camera".into(),
				pid: 0,
				parameters: json!({"version": "1.0.4", "build": "104"})
					.as_object()
					.cloned()
					.unwrap_or_default(),
			},
		];
		usb.frontmost = Some("com.example.notes".into());

		Self {
			devices: vec![local, socket, usb],
			sessions: HashMap::new(),
			scripts: HashMap::new(),
			managers: HashMap::new(),
			next_entity: 1,
		}
	}

	pub fn next_entity(&mut self) -> u64 {
		let id = self.next_entity;
		self.next_entity += 1;
		id
	}

	pub fn device(&self, id: &str) -> NativeResult<&DeviceState> {
		self.devices
			.iter()
			.find(|d| d.id == id)
			.ok_or_else(|| NativeError::invalid_operation(format!("device '{id}' is gone")))
	}

	pub fn device_mut(&mut self, id: &str) -> NativeResult<&mut DeviceState> {
		self.devices
			.iter_mut()
			.find(|d| d.id == id)
			.ok_or_else(|| NativeError::invalid_operation(format!("device '{id}' is gone")))
	}

	/// Like [`device_mut`](Self::device_mut) but also rejects lost devices.
	pub fn live_device_mut(&mut self, id: &str) -> NativeResult<&mut DeviceState> {
		let device = self.device_mut(id)?;
		if device.lost {
			return Err(NativeError::invalid_operation(format!("device '{id}' is gone")));
		}
		Ok(device)
	}

	pub fn manager(&self, id: u64) -> NativeResult<&ManagerState> {
		let manager = self
			.managers
			.get(&id)
			.ok_or_else(|| NativeError::invalid_argument("invalid device manager"))?;
		if manager.closed {
			return Err(NativeError::invalid_operation("device manager is closed"));
		}
		Ok(manager)
	}

	pub fn session(&self, id: u64) -> NativeResult<&SessionState> {
		self.sessions
			.get(&id)
			.ok_or_else(|| NativeError::invalid_argument("invalid session"))
	}

	pub fn live_session_mut(&mut self, id: u64) -> NativeResult<&mut SessionState> {
		let session = self
			.sessions
			.get_mut(&id)
			.ok_or_else(|| NativeError::invalid_argument("invalid session"))?;
		if session.detached {
			return Err(NativeError::invalid_operation("session is gone"));
		}
		Ok(session)
	}

	pub fn script_mut(&mut self, id: u64) -> NativeResult<&mut ScriptState> {
		self.scripts
			.get_mut(&id)
			.ok_or_else(|| NativeError::invalid_argument("invalid script"))
	}

	/// Marks a session detached and destroys its scripts. Returns the ids
	/// of scripts that were destroyed, or `None` if it was already detached.
	pub fn detach(&mut self, session: u64) -> Option<Vec<u64>> {
		let state = self.sessions.get_mut(&session)?;
		if state.detached {
			return None;
		}
		state.detached = true;
		let mut destroyed = Vec::new();
		for (id, script) in self.scripts.iter_mut() {
			if script.session == session && script.phase != ScriptPhase::Destroyed {
				script.phase = ScriptPhase::Destroyed;
				destroyed.push(*id);
			}
		}
		destroyed.sort_unstable();
		Some(destroyed)
	}

	/// Sessions attached to `pid` on `device` (all pids when `None`).
	pub fn sessions_on(&self, device: &str, pid: Option<u32>) -> Vec<u64> {
		let mut ids: Vec<u64> = self
			.sessions
			.iter()
			.filter(|(_, s)| !s.detached && s.device == device && pid.is_none_or(|pid| s.pid == pid))
			.map(|(id, _)| *id)
			.collect();
		ids.sort_unstable();
		ids
	}
}

/// Payload of a `detached` signal.
pub(super) fn detach_payload(reason: DetachReason) -> Value {
	json!({ "reason": reason, "crash": null })
}

/// Checks that brackets balance outside string literals. Returns the
/// agent-style error message on failure.
pub(super) fn check_syntax(source: &str) -> Result<(), String> {
	let mut stack = Vec::new();
	let mut line = 1;
	let mut chars = source.chars();
	while let Some(c) = chars.next() {
		match c {
			'\n' => line += 1,
			'"' | '\'' | '`' => {
				let quote = c;
				loop {
					match chars.next() {
						Some('\\') => {
							chars.next();
						}
						Some('\n') => line += 1,
						Some(ch) if ch == quote => break,
						Some(_) => {}
						None => return Err(format!("script({line}): SyntaxError: unterminated string literal")),
					}
				}
			}
			'(' | '{' | '[' => stack.push(c),
			')' | '}' | ']' => {
				let expected = match c {
					')' => '(',
					'}' => '{',
					_ => '[',
				};
				if stack.pop() != Some(expected) {
					return Err(format!("script({line}): SyntaxError: unexpected token '{c}'"));
				}
			}
			_ => {}
		}
	}
	if !stack.is_empty() {
		return Err(format!("script({line}): SyntaxError: unexpected end of input"));
	}
	Ok(())
}

/// Payloads of the top-level `send(<literal>)` calls in `source`, in order.
pub(super) fn sent_literals(source: &str) -> Vec<Value> {
	let mut out = Vec::new();
	let mut rest = source;
	while let Some(start) = rest.find("send(") {
		let after = &rest[start + "send(".len()..];
		let Some(end) = closing_paren(after) else {
			break;
		};
		let argument = after[..end].trim();
		if let Some(value) = literal(argument) {
			out.push(value);
		}
		rest = &after[end..];
	}
	out
}

fn closing_paren(text: &str) -> Option<usize> {
	let mut depth = 0usize;
	let mut quote = None;
	let mut escaped = false;
	for (i, c) in text.char_indices() {
		if let Some(q) = quote {
			if escaped {
				escaped = false;
			} else if c == '\\' {
				escaped = true;
			} else if c == q {
				quote = None;
			}
			continue;
		}
		match c {
			'"' | '\'' | '`' => quote = Some(c),
			'(' | '{' | '[' => depth += 1,
			')' if depth == 0 => return Some(i),
			')' | '}' | ']' => depth = depth.saturating_sub(1),
			_ => {}
		}
	}
	None
}

fn literal(text: &str) -> Option<Value> {
	if let Ok(value) = serde_json::from_str(text) {
		return Some(value);
	}
	let inner = text.strip_prefix('\'')?.strip_suffix('\'')?;
	Some(Value::String(inner.replace("\\'", "'")))
}
