//! Value-struct options passed into queries, attaches and spawns.
//!
//! These are plain property bags serialized into call parameters. They do
//! not own native resources; the options objects that do
//! (`ApplicationQueryOptions`, `FrontmostQueryOptions`) live in `frida-host`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{Realm, Scope, ScriptRuntime, Stdio};

/// Filter for `enumerate_processes`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessQueryOptions {
	/// Restrict the result to these pids (empty = all processes).
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub pids: Vec<u32>,

	/// How much metadata to collect per process.
	#[serde(default)]
	pub scope: Scope,
}

impl ProcessQueryOptions {
	pub fn new() -> Self {
		Self::default()
	}

	/// Adds a pid to the selection.
	pub fn select_pid(mut self, pid: u32) -> Self {
		self.pids.push(pid);
		self
	}

	pub fn scope(mut self, scope: Scope) -> Self {
		self.scope = scope;
		self
	}
}

/// Options for `find_process_by_*` / `get_process_by_*`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessMatchOptions {
	/// How long the native core may wait for a matching process, in
	/// milliseconds. `None` means do not wait.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub timeout: Option<u32>,

	#[serde(default)]
	pub scope: Scope,
}

impl ProcessMatchOptions {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn timeout(mut self, timeout_ms: u32) -> Self {
		self.timeout = Some(timeout_ms);
		self
	}

	pub fn scope(mut self, scope: Scope) -> Self {
		self.scope = scope;
		self
	}
}

/// Options for `attach`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionOptions {
	#[serde(default)]
	pub realm: Realm,

	/// Seconds the session survives a dropped transport before it is
	/// detached (0 = detach immediately).
	#[serde(default)]
	pub persist_timeout: u32,
}

impl SessionOptions {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn realm(mut self, realm: Realm) -> Self {
		self.realm = realm;
		self
	}

	pub fn persist_timeout(mut self, seconds: u32) -> Self {
		self.persist_timeout = seconds;
		self
	}
}

/// Options for `spawn`.
///
/// `argv` includes the program name in position 0 when set. `envp`
/// replaces the environment entirely while `env` is merged on top of the
/// device's environment; setting both is rejected by the native core.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpawnOptions {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub argv: Option<Vec<String>>,

	#[serde(skip_serializing_if = "Option::is_none")]
	pub envp: Option<BTreeMap<String, String>>,

	#[serde(skip_serializing_if = "Option::is_none")]
	pub env: Option<BTreeMap<String, String>>,

	#[serde(skip_serializing_if = "Option::is_none")]
	pub cwd: Option<String>,

	#[serde(default)]
	pub stdio: Stdio,

	/// Backend-specific extras.
	#[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
	pub aux: BTreeMap<String, Value>,
}

impl SpawnOptions {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn argv<I, S>(mut self, argv: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.argv = Some(argv.into_iter().map(Into::into).collect());
		self
	}

	pub fn envp<I, K, V>(mut self, envp: I) -> Self
	where
		I: IntoIterator<Item = (K, V)>,
		K: Into<String>,
		V: Into<String>,
	{
		self.envp = Some(envp.into_iter().map(|(k, v)| (k.into(), v.into())).collect());
		self
	}

	/// Adds one variable to the merged environment.
	pub fn env_var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
		self.env.get_or_insert_with(BTreeMap::new).insert(key.into(), value.into());
		self
	}

	pub fn cwd(mut self, cwd: impl Into<String>) -> Self {
		self.cwd = Some(cwd.into());
		self
	}

	pub fn stdio(mut self, stdio: Stdio) -> Self {
		self.stdio = stdio;
		self
	}

	pub fn aux(mut self, key: impl Into<String>, value: Value) -> Self {
		self.aux.insert(key.into(), value);
		self
	}
}

/// Options for `DeviceManager::add_remote_device`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteDeviceOptions {
	/// PEM-encoded certificate to pin for TLS.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub certificate: Option<String>,

	#[serde(skip_serializing_if = "Option::is_none")]
	pub origin: Option<String>,

	#[serde(skip_serializing_if = "Option::is_none")]
	pub token: Option<String>,

	/// Keepalive interval in seconds; `None` uses the backend default.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub keepalive_interval: Option<i32>,
}

impl RemoteDeviceOptions {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn certificate(mut self, pem: impl Into<String>) -> Self {
		self.certificate = Some(pem.into());
		self
	}

	pub fn origin(mut self, origin: impl Into<String>) -> Self {
		self.origin = Some(origin.into());
		self
	}

	pub fn token(mut self, token: impl Into<String>) -> Self {
		self.token = Some(token.into());
		self
	}

	pub fn keepalive_interval(mut self, seconds: i32) -> Self {
		self.keepalive_interval = Some(seconds);
		self
	}
}

/// Options for `create_script`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptOptions {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub name: Option<String>,

	#[serde(default)]
	pub runtime: ScriptRuntime,
}

impl ScriptOptions {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn name(mut self, name: impl Into<String>) -> Self {
		self.name = Some(name.into());
		self
	}

	pub fn runtime(mut self, runtime: ScriptRuntime) -> Self {
		self.runtime = runtime;
		self
	}
}
