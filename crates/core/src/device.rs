use frida_protocol::{DeviceType, ProcessMatchOptions, ProcessQueryOptions, SessionOptions, SpawnOptions};
use frida_runtime::{Call, Error, Result, Subscription, encode_bytes};
use serde_json::{Map, Value, json};

use crate::{
	Application, ApplicationList, ApplicationQueryOptions, Child, ChildList, FrontmostQueryOptions, Process,
	ProcessList, Session, Spawn, SpawnList, events,
};

native_object! {
	/// A machine or phone reachable through one of the engine's backends.
	Device => Device, list = DeviceList
}

impl Device {
	pub fn id(&self) -> Result<String> {
		self.owned.get("id")
	}

	pub fn name(&self) -> Result<String> {
		self.owned.get("name")
	}

	pub fn kind(&self) -> Result<DeviceType> {
		self.owned.get("type")
	}

	/// Whether the device has gone away. A lost device fails every call.
	pub fn is_lost(&self) -> Result<bool> {
		self.owned.get("is_lost")
	}

	/// OS, platform and architecture details.
	pub fn query_system_parameters(&self) -> Call<Map<String, Value>> {
		Call::new(&self.owned, "query_system_parameters", Value::Null)
	}

	pub fn frontmost_application(&self, options: Option<&FrontmostQueryOptions>) -> Call<Option<Application>> {
		let call = Call::new(
			&self.owned,
			"get_frontmost_application",
			json!({ "options": options.map(|o| o.owned.raw()) }),
		);
		match options {
			Some(options) => call.holding(&options.owned),
			None => call,
		}
	}

	pub fn enumerate_applications(&self, options: Option<&ApplicationQueryOptions>) -> Call<ApplicationList> {
		let call = Call::new(
			&self.owned,
			"enumerate_applications",
			json!({ "options": options.map(|o| o.owned.raw()) }),
		);
		match options {
			Some(options) => call.holding(&options.owned),
			None => call,
		}
	}

	pub fn enumerate_processes(&self, options: &ProcessQueryOptions) -> Result<Call<ProcessList>> {
		let options = serde_json::to_value(options)?;
		Ok(Call::new(&self.owned, "enumerate_processes", json!({ "options": options })))
	}

	pub fn find_process_by_pid(&self, pid: u32, options: &ProcessMatchOptions) -> Result<Call<Option<Process>>> {
		self.process_lookup("find_process_by_pid", json!({ "pid": checked_pid(pid)? }), options)
	}

	pub fn get_process_by_pid(&self, pid: u32, options: &ProcessMatchOptions) -> Result<Call<Process>> {
		self.process_lookup("get_process_by_pid", json!({ "pid": checked_pid(pid)? }), options)
	}

	pub fn find_process_by_name(&self, name: &str, options: &ProcessMatchOptions) -> Result<Call<Option<Process>>> {
		self.process_lookup("find_process_by_name", json!({ "name": checked_name(name)? }), options)
	}

	pub fn get_process_by_name(&self, name: &str, options: &ProcessMatchOptions) -> Result<Call<Process>> {
		self.process_lookup("get_process_by_name", json!({ "name": checked_name(name)? }), options)
	}

	fn process_lookup<T: frida_runtime::FromNative>(
		&self,
		method: &'static str,
		mut params: Value,
		options: &ProcessMatchOptions,
	) -> Result<Call<T>> {
		params["options"] = serde_json::to_value(options)?;
		Ok(Call::new(&self.owned, method, params))
	}

	pub fn enable_spawn_gating(&self) -> Call<()> {
		Call::new(&self.owned, "enable_spawn_gating", Value::Null)
	}

	pub fn disable_spawn_gating(&self) -> Call<()> {
		Call::new(&self.owned, "disable_spawn_gating", Value::Null)
	}

	pub fn enumerate_pending_spawn(&self) -> Call<SpawnList> {
		Call::new(&self.owned, "enumerate_pending_spawn", Value::Null)
	}

	pub fn enumerate_pending_children(&self) -> Call<ChildList> {
		Call::new(&self.owned, "enumerate_pending_children", Value::Null)
	}

	/// Launches `program` suspended and yields its pid.
	///
	/// On mobile devices `program` is an application identifier.
	pub fn spawn(&self, program: &str, options: &SpawnOptions) -> Result<Call<u32>> {
		if program.is_empty() {
			return Err(Error::InvalidArgument("program must not be empty".into()));
		}
		if options.envp.is_some() && options.env.is_some() {
			return Err(Error::InvalidArgument("envp and env cannot both be set".into()));
		}
		let options = serde_json::to_value(options)?;
		Ok(Call::new(&self.owned, "spawn", json!({ "program": program, "options": options })))
	}

	/// Writes `data` to the stdin of a process spawned with piped stdio.
	pub fn input(&self, pid: u32, data: &[u8]) -> Result<Call<()>> {
		let pid = checked_pid(pid)?;
		Ok(Call::new(&self.owned, "input", json!({ "pid": pid, "data": encode_bytes(data) })))
	}

	pub fn resume(&self, pid: u32) -> Result<Call<()>> {
		Ok(Call::new(&self.owned, "resume", json!({ "pid": checked_pid(pid)? })))
	}

	pub fn kill(&self, pid: u32) -> Result<Call<()>> {
		Ok(Call::new(&self.owned, "kill", json!({ "pid": checked_pid(pid)? })))
	}

	pub fn attach(&self, pid: u32, options: &SessionOptions) -> Result<Call<Session>> {
		let pid = checked_pid(pid)?;
		let options = serde_json::to_value(options)?;
		Ok(Call::new(&self.owned, "attach", json!({ "pid": pid, "options": options })))
	}

	/// Looks up a running process by name and attaches to it.
	pub fn attach_by_name(&self, name: &str, options: &SessionOptions) -> Result<Session> {
		let process = self.get_process_by_name(name, &ProcessMatchOptions::new())?.sync(None)?;
		let pid = process.pid()?;
		drop(process);
		self.attach(pid, options)?.sync(None)
	}

	/// Returns the first running process matching `predicate`.
	pub fn find_process<F>(&self, mut predicate: F) -> Result<Option<Process>>
	where
		F: FnMut(&Process) -> Result<bool>,
	{
		let processes = self.enumerate_processes(&ProcessQueryOptions::new())?.sync(None)?;
		for process in &processes {
			let process = process?;
			if predicate(&process)? {
				return Ok(Some(process));
			}
		}
		Ok(None)
	}

	/// Running processes whose name matches the glob `pattern`.
	pub fn processes_matching(&self, pattern: &str) -> Result<Vec<Process>> {
		let pattern = glob::Pattern::new(pattern)
			.map_err(|e| Error::InvalidArgument(format!("invalid process pattern '{pattern}': {e}")))?;
		let processes = self.enumerate_processes(&ProcessQueryOptions::new())?.sync(None)?;
		let mut matched = Vec::new();
		for process in &processes {
			let process = process?;
			if pattern.matches(&process.name()?) {
				matched.push(process);
			}
		}
		Ok(matched)
	}

	/// Calls `handler` once the device goes away.
	pub fn on_lost<F>(&self, handler: F) -> Result<Subscription>
	where
		F: Fn() + Send + Sync + 'static,
	{
		events::on_unit(&self.owned, "lost", handler)
	}

	/// Calls `handler` with each process caught by spawn gating.
	pub fn on_spawn_added<F>(&self, handler: F) -> Result<Subscription>
	where
		F: Fn(Spawn) + Send + Sync + 'static,
	{
		events::on_object(&self.owned, "spawn-added", "spawn", handler)
	}

	/// Calls `handler` with each child process caught by child gating.
	pub fn on_child_added<F>(&self, handler: F) -> Result<Subscription>
	where
		F: Fn(Child) + Send + Sync + 'static,
	{
		events::on_object(&self.owned, "child-added", "child", handler)
	}
}

fn checked_pid(pid: u32) -> Result<u32> {
	if pid == 0 {
		return Err(Error::InvalidArgument("pid must be positive".into()));
	}
	Ok(pid)
}

fn checked_name(name: &str) -> Result<&str> {
	if name.is_empty() {
		return Err(Error::InvalidArgument("process name must not be empty".into()));
	}
	Ok(name)
}
