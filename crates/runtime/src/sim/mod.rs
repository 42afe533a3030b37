//! In-process simulated engine.
//!
//! [`SimCore`] implements [`NativeCore`] over a small fixed world (a local
//! machine, a local socket server and a USB phone) without touching any
//! real process. It behaves like the real core where the binding can
//! observe it: completions and signals are dispatched from a dedicated
//! worker thread, objects with pending operations outlive their handles,
//! and errors carry the engine's codes.
//!
//! It also exposes what tests need to check the lifecycle layer: a count
//! of live handles, per-handle release counts, and the ability to stall a
//! method (so cancellation can be observed) or ignore cancellation (so
//! late completions can be).

mod world;

use std::collections::HashSet;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use dashmap::DashMap;
use frida_protocol::{
	ChildOrigin, DetachReason, DeviceType, ProcessMatchOptions, ProcessQueryOptions, Scope, ScriptOptions,
	SessionOptions, SpawnOptions,
};
use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};
use tokio::sync::mpsc;

use self::world::{
	AppInfo, BYTECODE_MAGIC, Backends, ChildInfo, DeviceState, ManagerState, ProcessInfo, ScriptPhase, ScriptState,
	SessionState, SpawnInfo, World, check_syntax, detach_payload, process_not_found, sent_literals,
};
use crate::cancel::{CancelHandler, Cancellable};
use crate::decode::encode_bytes;
use crate::handle::{HandleKind, RawHandle};
use crate::native::{
	Core, NativeCompletion, NativeCore, NativeError, NativeErrorCode, NativeResult, SignalHandler, SignalId,
};

pub use self::world::{LOCAL_DEVICE as LOCAL_DEVICE_ID, SOCKET_DEVICE as SOCKET_DEVICE_ID, USB_DEVICE as USB_DEVICE_ID};

const VERSION: &str = "17.2.15";

type Job = Box<dyn FnOnce() + Send + 'static>;
type Slot = Arc<Mutex<Pending>>;

/// A completion not yet delivered, and the cancel hook that can deliver it
/// early. Taking the completion disconnects the hook.
struct Pending {
	done: Option<NativeCompletion>,
	on_cancel: Option<CancelHandler>,
}

impl Pending {
	fn is_live(&self) -> bool {
		self.done.is_some()
	}
}

fn take_completion(slot: &Slot) -> Option<NativeCompletion> {
	let (done, on_cancel) = {
		let mut pending = slot.lock();
		(pending.done.take(), pending.on_cancel.take())
	};
	drop(on_cancel);
	done
}

/// What a handle points at.
#[derive(Clone)]
enum Object {
	Manager(u64),
	Device(String),
	Session(u64),
	Script(u64),
	Process(ProcessInfo),
	Application(AppInfo),
	Spawn(SpawnInfo),
	Child(ChildInfo),
	DeviceList(Vec<String>),
	ProcessList(Vec<ProcessInfo>),
	ApplicationList(Vec<AppInfo>),
	SpawnList(Vec<SpawnInfo>),
	ChildList(Vec<ChildInfo>),
	Options(Map<String, Value>),
}

/// The world entity a signal is emitted by. Several handles may refer to
/// the same emitter.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Emitter {
	Manager(u64),
	Device(String),
	Session(u64),
	Script(u64),
}

struct Connection {
	handle: RawHandle,
	emitter: Emitter,
	signal: String,
	handler: SignalHandler,
}

struct Parked {
	method: String,
	raw: RawHandle,
	object: Object,
	params: Value,
	cancellable: Cancellable,
	slot: Slot,
}

enum Outcome {
	Ready(NativeResult<Value>),
	After(Duration, NativeResult<Value>),
	/// Completes only through cancellation.
	Never,
}

/// Simulated [`NativeCore`].
pub struct SimCore {
	me: Weak<SimCore>,
	jobs: mpsc::UnboundedSender<Job>,
	objects: DashMap<u64, (HandleKind, Object)>,
	releases: DashMap<RawHandle, usize>,
	next_handle: AtomicU64,
	next_signal: AtomicU64,
	next_parked: AtomicU64,
	world: Mutex<World>,
	connections: Mutex<IndexMap<SignalId, Connection>>,
	stalled: Mutex<HashSet<String>>,
	failing: Mutex<HashSet<String>>,
	init_failure: Mutex<Option<NativeError>>,
	parked: Mutex<IndexMap<u64, Parked>>,
	waiting: Mutex<Vec<Slot>>,
	ignore_cancellation: AtomicBool,
	initialized: AtomicBool,
}

impl SimCore {
	/// Creates an engine with a fresh world and starts its worker thread.
	pub fn new() -> Arc<Self> {
		let (jobs, mut queue) = mpsc::unbounded_channel::<Job>();
		std::thread::spawn(move || {
			while let Some(job) = queue.blocking_recv() {
				if catch_unwind(AssertUnwindSafe(job)).is_err() {
					tracing::error!("Simulated engine job panicked");
				}
			}
			tracing::trace!("Simulated engine worker stopped");
		});

		Arc::new_cyclic(|me| Self {
			me: me.clone(),
			jobs,
			objects: DashMap::new(),
			releases: DashMap::new(),
			next_handle: AtomicU64::new(1),
			next_signal: AtomicU64::new(1),
			next_parked: AtomicU64::new(1),
			world: Mutex::new(World::fixture()),
			connections: Mutex::new(IndexMap::new()),
			stalled: Mutex::new(HashSet::new()),
			failing: Mutex::new(HashSet::new()),
			init_failure: Mutex::new(None),
			parked: Mutex::new(IndexMap::new()),
			waiting: Mutex::new(Vec::new()),
			ignore_cancellation: AtomicBool::new(false),
			initialized: AtomicBool::new(false),
		})
	}

	/// This engine as a shared [`Core`].
	pub fn core(self: &Arc<Self>) -> Core {
		Arc::clone(self) as Core
	}

	/// Number of handles handed out and not yet released.
	pub fn live_handles(&self) -> usize {
		self.objects.len()
	}

	/// How many times `handle` has been released.
	pub fn release_count(&self, handle: RawHandle) -> usize {
		self.releases.get(&handle).map_or(0, |count| *count)
	}

	pub fn is_initialized(&self) -> bool {
		self.initialized.load(Ordering::SeqCst)
	}

	/// Holds every operation named `method` until [`unstall`](Self::unstall).
	pub fn stall(&self, method: &str) {
		self.stalled.lock().insert(method.to_owned());
	}

	/// Runs the operations held for `method`, in the order they started.
	/// Operations already completed through cancellation are skipped.
	pub fn unstall(&self, method: &str) {
		self.stalled.lock().remove(method);
		let resumed: Vec<Parked> = {
			let mut parked = self.parked.lock();
			let ids: Vec<u64> = parked
				.iter()
				.filter(|(_, p)| p.method == method)
				.map(|(id, _)| *id)
				.collect();
			ids.into_iter().filter_map(|id| parked.shift_remove(&id)).collect()
		};
		for op in resumed {
			let me = self.me.clone();
			self.post(move || {
				let Some(sim) = me.upgrade() else {
					return;
				};
				let Some(done) = take_completion(&op.slot) else {
					return;
				};
				sim.run(op.raw, &op.object, &op.method, op.params, &op.cancellable, done);
			});
		}
	}

	/// Makes every read of the property `name` fail with a transport error.
	pub fn fail_property(&self, name: &str) {
		self.failing.lock().insert(name.to_owned());
	}

	/// Makes [`NativeCore::init`] fail with `code` until cleared with `None`.
	pub fn fail_init(&self, code: Option<NativeErrorCode>) {
		*self.init_failure.lock() = code.map(|code| NativeError::new(code, "engine refused to start"));
	}

	/// Sessions not yet detached.
	pub fn attached_sessions(&self) -> usize {
		self.world.lock().sessions.values().filter(|s| !s.detached).count()
	}

	/// Scripts not yet destroyed.
	pub fn live_scripts(&self) -> usize {
		self.world
			.lock()
			.scripts
			.values()
			.filter(|s| s.phase != ScriptPhase::Destroyed)
			.count()
	}

	/// When set, cancellation no longer completes pending operations; they
	/// run to completion and deliver their real result late.
	pub fn set_ignore_cancellation(&self, ignore: bool) {
		self.ignore_cancellation.store(ignore, Ordering::SeqCst);
	}

	/// Operations started but not yet completed.
	pub fn pending_operations(&self) -> usize {
		let parked = self.parked.lock().values().filter(|p| p.slot.lock().is_live()).count();
		let mut waiting = self.waiting.lock();
		waiting.retain(|slot| slot.lock().is_live());
		parked + waiting.len()
	}

	/// Blocks until the worker has run every job queued before this call.
	/// Must not be called from a completion or signal handler.
	pub fn wait_idle(&self) {
		let (tx, rx) = std::sync::mpsc::channel();
		self.post(move || {
			let _ = tx.send(());
		});
		let _ = rx.recv();
	}

	/// Adds a running process to a device.
	pub fn add_process(&self, device: &str, pid: u32, name: &str) {
		let mut world = self.world.lock();
		if let Ok(device) = world.device_mut(device) {
			device.processes.push(ProcessInfo::new(pid, name, &format!("/usr/bin/{name}"), "user"));
		}
	}

	/// Records a gated child process and emits `child-added`.
	pub fn add_pending_child(&self, device: &str, pid: u32, parent_pid: u32, origin: ChildOrigin, path: &str) {
		let child = ChildInfo {
			pid,
			parent_pid,
			origin,
			identifier: None,
			path: Some(path.to_owned()),
			argv: Some(vec![path.to_owned()]),
			envp: None,
		};
		{
			let mut world = self.world.lock();
			let Ok(state) = world.device_mut(device) else {
				return;
			};
			state.pending_children.push(child.clone());
			let mut process = ProcessInfo::new(pid, path.rsplit('/').next().unwrap_or(path), path, "user");
			process.suspended = true;
			state.processes.push(process);
		}
		self.emit(
			Emitter::Device(device.to_owned()),
			"child-added",
			move |sim| json!({ "child": sim.adopt(HandleKind::Child, Object::Child(child.clone())) }),
			None,
		);
	}

	/// Kills `pid` abnormally: sessions attached to it detach with a crash report.
	pub fn crash_process(&self, device: &str, pid: u32, summary: &str) {
		let mut world = self.world.lock();
		let Ok(state) = world.device_mut(device) else {
			return;
		};
		let Some(name) = state.process(pid).map(|p| p.name.clone()) else {
			return;
		};
		state.processes.retain(|p| p.pid != pid);
		let crash = json!({
			"pid": pid,
			"processName": name,
			"summary": summary,
			"report": format!("Process {name} [{pid}] crashed: {summary}"),
		});
		for session in world.sessions_on(device, Some(pid)) {
			self.detach_session(&mut world, session, DetachReason::ProcessTerminated, crash.clone());
		}
	}

	/// Makes a device disappear as if unplugged.
	pub fn lose_device(&self, device: &str) {
		let mut world = self.world.lock();
		self.drop_device(&mut world, device);
	}

	fn post(&self, job: impl FnOnce() + Send + 'static) {
		if self.jobs.send(Box::new(job)).is_err() {
			tracing::warn!("Simulated engine worker is gone, dropping job");
		}
	}

	fn adopt(&self, kind: HandleKind, object: Object) -> RawHandle {
		let id = self.next_handle.fetch_add(1, Ordering::Relaxed);
		self.objects.insert(id, (kind, object));
		RawHandle::new(kind, id)
	}

	fn handle_value(&self, kind: HandleKind, object: Object) -> Value {
		json!(self.adopt(kind, object))
	}

	fn lookup(&self, raw: RawHandle) -> NativeResult<Object> {
		match self.objects.get(&raw.id) {
			Some(entry) if entry.0 == raw.kind => Ok(entry.1.clone()),
			_ => Err(NativeError::invalid_argument(format!("invalid {} handle", raw.kind))),
		}
	}

	/// Parks `done` so it completes through cancellation or [`fire`](Self::fire).
	fn defer(&self, cancellable: &Cancellable, done: NativeCompletion) -> Slot {
		let slot: Slot = Arc::new(Mutex::new(Pending {
			done: Some(done),
			on_cancel: None,
		}));
		if !self.ignore_cancellation.load(Ordering::SeqCst) {
			let weak = Arc::downgrade(&slot);
			let me = self.me.clone();
			let on_cancel = cancellable.connect(move || {
				if let (Some(slot), Some(sim)) = (weak.upgrade(), me.upgrade()) {
					tracing::debug!("Cancelling pending simulated operation");
					sim.fire(&slot, Err(NativeError::cancelled()));
				}
			});
			let mut pending = slot.lock();
			if pending.is_live() {
				pending.on_cancel = Some(on_cancel);
			}
		}
		slot
	}

	fn fire(&self, slot: &Slot, outcome: NativeResult<Value>) {
		if let Some(done) = take_completion(slot) {
			self.post(move || done(outcome));
		}
		self.waiting.lock().retain(|waiting| !Arc::ptr_eq(waiting, slot));
	}

	/// Performs an operation on the worker and routes its outcome to `done`.
	fn run(
		&self,
		raw: RawHandle,
		object: &Object,
		method: &str,
		params: Value,
		cancellable: &Cancellable,
		done: NativeCompletion,
	) {
		if cancellable.is_cancelled() && !self.ignore_cancellation.load(Ordering::SeqCst) {
			return done(Err(NativeError::cancelled()));
		}
		match self.perform(raw, object, method, params) {
			Outcome::Ready(outcome) => done(outcome),
			Outcome::After(delay, outcome) => {
				let slot = self.defer(cancellable, done);
				let me = self.me.clone();
				std::thread::spawn(move || {
					std::thread::sleep(delay);
					if let Some(sim) = me.upgrade() {
						sim.fire(&slot, outcome);
					}
				});
			}
			Outcome::Never => {
				let slot = self.defer(cancellable, done);
				let mut waiting = self.waiting.lock();
				waiting.retain(|slot| slot.lock().is_live());
				waiting.push(slot);
			}
		}
	}

	fn perform(&self, raw: RawHandle, object: &Object, method: &str, params: Value) -> Outcome {
		let outcome = match object {
			Object::Manager(id) => return self.manager_op(*id, method, &params),
			Object::Device(id) => self.device_op(id, method, &params),
			Object::Session(id) => self.session_op(*id, method, &params),
			Object::Script(id) => self.script_op(*id, method),
			_ => Err(unknown_method(raw, method)),
		};
		Outcome::Ready(outcome)
	}

	fn manager_op(&self, id: u64, method: &str, params: &Value) -> Outcome {
		let mut world = self.world.lock();
		if method == "close" {
			if let Some(manager) = world.managers.get_mut(&id) {
				manager.closed = true;
			}
			return Outcome::Ready(Ok(Value::Null));
		}
		let backends = match world.manager(id) {
			Ok(manager) => manager.backends,
			Err(err) => return Outcome::Ready(Err(err)),
		};
		let visible = |d: &&DeviceState| !d.lost && backends.includes(d);

		match method {
			"enumerate_devices" => {
				let ids = world.devices.iter().filter(visible).map(|d| d.id.clone()).collect();
				Outcome::Ready(Ok(self.handle_value(HandleKind::DeviceList, Object::DeviceList(ids))))
			}
			"get_device_by_id" | "find_device_by_id" => {
				let wanted = match param_str(params, "id") {
					Ok(id) => id,
					Err(err) => return Outcome::Ready(Err(err)),
				};
				let found = world.devices.iter().filter(visible).find(|d| d.id == wanted).map(|d| d.id.clone());
				self.lookup_outcome(found, method.starts_with("get"), timeout(params), format!("with id '{wanted}'"))
			}
			"get_device_by_type" | "find_device_by_type" => {
				let wanted: DeviceType = match param(params, "type") {
					Ok(kind) => kind,
					Err(err) => return Outcome::Ready(Err(err)),
				};
				let found = world.devices.iter().filter(visible).find(|d| d.kind == wanted).map(|d| d.id.clone());
				self.lookup_outcome(found, method.starts_with("get"), timeout(params), format!("of type {wanted}"))
			}
			"add_remote_device" => Outcome::Ready(self.add_remote_device(&mut world, params)),
			"remove_remote_device" => {
				let result = param_str(params, "address").and_then(|address| {
					let id = remote_id(address);
					if !world.devices.iter().any(|d| d.id == id && !d.lost) {
						return Err(NativeError::invalid_argument(format!("no remote device at '{address}'")));
					}
					self.drop_device(&mut world, &id);
					Ok(Value::Null)
				});
				Outcome::Ready(result)
			}
			_ => Outcome::Ready(Err(NativeError::invalid_argument(format!(
				"DeviceManager has no operation '{method}'"
			)))),
		}
	}

	fn lookup_outcome(&self, found: Option<String>, required: bool, timeout: i64, what: String) -> Outcome {
		match found {
			Some(id) => Outcome::Ready(Ok(self.handle_value(HandleKind::Device, Object::Device(id)))),
			None if timeout == 0 => Outcome::Ready(Ok(Value::Null)),
			None if timeout < 0 => Outcome::Never,
			None => {
				let delay = Duration::from_millis(timeout.unsigned_abs());
				let outcome = if required {
					Err(NativeError::new(
						NativeErrorCode::TimedOut,
						format!("timed out while waiting for device {what} to appear"),
					))
				} else {
					Ok(Value::Null)
				};
				Outcome::After(delay, outcome)
			}
		}
	}

	fn add_remote_device(&self, world: &mut World, params: &Value) -> NativeResult<Value> {
		let address = param_str(params, "address")?;
		if address.is_empty() {
			return Err(NativeError::invalid_argument("remote address must not be empty"));
		}
		let id = remote_id(address);
		match world.devices.iter_mut().find(|d| d.id == id) {
			Some(device) => device.lost = false,
			None => {
				let parameters = params.get("options").cloned().unwrap_or(Value::Null);
				let mut device = DeviceState::new(&id, address, DeviceType::Remote, json!({"remote": parameters}));
				device.processes.push(ProcessInfo::new(1, "init", "/sbin/init", "root"));
				world.devices.push(device);
			}
		}
		tracing::debug!(device = %id, "Added remote device");
		self.notify_managers(world, &id, "added");
		Ok(self.handle_value(HandleKind::Device, Object::Device(id)))
	}

	fn drop_device(&self, world: &mut World, id: &str) {
		let Ok(device) = world.device_mut(id) else {
			return;
		};
		if device.lost {
			return;
		}
		device.lost = true;
		for session in world.sessions_on(id, None) {
			self.detach_session(world, session, DetachReason::DeviceLost, Value::Null);
		}
		self.emit(Emitter::Device(id.to_owned()), "lost", |_| Value::Null, None);
		self.notify_managers(world, id, "removed");
	}

	fn notify_managers(&self, world: &World, device: &str, signal: &'static str) {
		let Some(state) = world.devices.iter().find(|d| d.id == device) else {
			return;
		};
		let mut managers: Vec<u64> = world
			.managers
			.iter()
			.filter(|(_, m)| !m.closed && m.backends.includes(state))
			.map(|(id, _)| *id)
			.collect();
		managers.sort_unstable();
		for manager in managers {
			let device = device.to_owned();
			self.emit(
				Emitter::Manager(manager),
				signal,
				move |sim| json!({ "device": sim.adopt(HandleKind::Device, Object::Device(device.clone())) }),
				None,
			);
		}
	}

	fn device_op(&self, id: &str, method: &str, params: &Value) -> NativeResult<Value> {
		let mut world = self.world.lock();
		let device = world.live_device_mut(id)?;

		match method {
			"query_system_parameters" => Ok(Value::Object(device.parameters.clone())),
			"get_frontmost_application" => {
				let scope = self.options_scope(params)?;
				let app = device
					.frontmost
					.as_ref()
					.and_then(|ident| device.applications.iter().find(|a| &a.identifier == ident))
					.map(|a| a.scoped(scope));
				Ok(app.map_or(Value::Null, |a| {
					self.handle_value(HandleKind::Application, Object::Application(a))
				}))
			}
			"enumerate_applications" => {
				let (identifiers, scope) = self.application_query(params)?;
				let apps = device
					.applications
					.iter()
					.filter(|a| identifiers.is_empty() || identifiers.contains(&a.identifier))
					.map(|a| a.scoped(scope))
					.collect();
				Ok(self.handle_value(HandleKind::ApplicationList, Object::ApplicationList(apps)))
			}
			"enumerate_processes" => {
				let options: ProcessQueryOptions = param_or_default(params, "options")?;
				let processes = device
					.processes
					.iter()
					.filter(|p| options.pids.is_empty() || options.pids.contains(&p.pid))
					.map(|p| p.scoped(options.scope))
					.collect();
				Ok(self.handle_value(HandleKind::ProcessList, Object::ProcessList(processes)))
			}
			"find_process_by_pid" | "get_process_by_pid" => {
				let pid = param_u32(params, "pid")?;
				let options: ProcessMatchOptions = param_or_default(params, "options")?;
				match device.process(pid) {
					Some(p) => Ok(self.handle_value(HandleKind::Process, Object::Process(p.scoped(options.scope)))),
					None if method.starts_with("find") => Ok(Value::Null),
					None => Err(process_not_found(pid)),
				}
			}
			"find_process_by_name" | "get_process_by_name" => {
				let name = param_str(params, "name")?;
				let options: ProcessMatchOptions = param_or_default(params, "options")?;
				match device.process_by_name(name) {
					Some(p) => Ok(self.handle_value(HandleKind::Process, Object::Process(p.scoped(options.scope)))),
					None if method.starts_with("find") => Ok(Value::Null),
					None => Err(NativeError::new(
						NativeErrorCode::ProcessNotFound,
						format!("unable to find process with name '{name}'"),
					)),
				}
			}
			"enable_spawn_gating" | "disable_spawn_gating" => {
				device.spawn_gating = method.starts_with("enable");
				Ok(Value::Null)
			}
			"enumerate_pending_spawn" => {
				let spawns = device.pending_spawn.clone();
				Ok(self.handle_value(HandleKind::SpawnList, Object::SpawnList(spawns)))
			}
			"enumerate_pending_children" => {
				let children = device.pending_children.clone();
				Ok(self.handle_value(HandleKind::ChildList, Object::ChildList(children)))
			}
			"spawn" => {
				let program = param_str(params, "program")?;
				if program.is_empty() {
					return Err(NativeError::invalid_argument("program must not be empty"));
				}
				let options: SpawnOptions = param_or_default(params, "options")?;
				if options.envp.is_some() && options.env.is_some() {
					return Err(NativeError::invalid_argument("envp and env cannot both be set"));
				}
				let pid = device.spawn(program)?;
				if device.spawn_gating {
					let spawn = SpawnInfo {
						pid,
						identifier: Some(program.to_owned()),
					};
					self.emit(
						Emitter::Device(id.to_owned()),
						"spawn-added",
						move |sim| json!({ "spawn": sim.adopt(HandleKind::Spawn, Object::Spawn(spawn.clone())) }),
						None,
					);
				}
				tracing::debug!(device = id, program, pid, "Spawned process");
				Ok(json!(pid))
			}
			"input" => {
				let pid = param_u32(params, "pid")?;
				let data = param_str(params, "data")?;
				BASE64
					.decode(data)
					.map_err(|e| NativeError::invalid_argument(format!("invalid input data: {e}")))?;
				device.require_process(pid)?;
				Ok(Value::Null)
			}
			"resume" => {
				let pid = param_u32(params, "pid")?;
				device.resume(pid)?;
				Ok(Value::Null)
			}
			"kill" => {
				let pid = param_u32(params, "pid")?;
				device.kill(pid)?;
				for session in world.sessions_on(id, Some(pid)) {
					self.detach_session(&mut world, session, DetachReason::ProcessTerminated, Value::Null);
				}
				Ok(Value::Null)
			}
			"attach" => {
				let pid = param_u32(params, "pid")?;
				let options: SessionOptions = param_or_default(params, "options")?;
				device.require_process(pid)?;
				if pid == 1 {
					return Err(NativeError::new(
						NativeErrorCode::PermissionDenied,
						"unable to access process with pid 1 from the current user account",
					));
				}
				let session = world.next_entity();
				world.sessions.insert(
					session,
					SessionState {
						device: id.to_owned(),
						pid,
						detached: false,
						persist_timeout: options.persist_timeout,
						child_gating: false,
					},
				);
				tracing::debug!(device = id, pid, session, "Attached");
				Ok(self.handle_value(HandleKind::Session, Object::Session(session)))
			}
			_ => Err(NativeError::invalid_argument(format!("Device has no operation '{method}'"))),
		}
	}

	fn session_op(&self, id: u64, method: &str, params: &Value) -> NativeResult<Value> {
		let mut world = self.world.lock();
		match method {
			"detach" => {
				world.session(id)?;
				self.detach_session(&mut world, id, DetachReason::ApplicationRequested, Value::Null);
				Ok(Value::Null)
			}
			"resume" => {
				world.live_session_mut(id)?;
				Ok(Value::Null)
			}
			"enable_child_gating" | "disable_child_gating" => {
				world.live_session_mut(id)?.child_gating = method.starts_with("enable");
				Ok(Value::Null)
			}
			"create_script" => {
				world.live_session_mut(id)?;
				let source = param_str(params, "source")?.to_owned();
				self.create_script(&mut world, id, source, params)
			}
			"create_script_from_bytes" => {
				world.live_session_mut(id)?;
				let bytes = BASE64
					.decode(param_str(params, "bytes")?)
					.map_err(|e| NativeError::invalid_argument(format!("invalid script bytes: {e}")))?;
				let body = bytes
					.strip_prefix(BYTECODE_MAGIC)
					.ok_or_else(|| NativeError::invalid_argument("invalid bytecode: missing header"))?;
				let source = String::from_utf8(body.to_vec())
					.map_err(|_| NativeError::invalid_argument("invalid bytecode: corrupt body"))?;
				self.create_script(&mut world, id, source, params)
			}
			"compile_script" => {
				world.live_session_mut(id)?;
				let source = param_str(params, "source")?;
				check_syntax(source).map_err(NativeError::invalid_argument)?;
				let mut bytes = BYTECODE_MAGIC.to_vec();
				bytes.extend_from_slice(source.as_bytes());
				Ok(json!(encode_bytes(&bytes)))
			}
			_ => Err(NativeError::invalid_argument(format!("Session has no operation '{method}'"))),
		}
	}

	fn create_script(&self, world: &mut World, session: u64, source: String, params: &Value) -> NativeResult<Value> {
		check_syntax(&source).map_err(NativeError::invalid_argument)?;
		let options: ScriptOptions = param_or_default(params, "options")?;
		let script = world.next_entity();
		let name = options.name.unwrap_or_else(|| format!("script{script}"));
		world.scripts.insert(
			script,
			ScriptState {
				session,
				name,
				source,
				phase: ScriptPhase::Created,
			},
		);
		Ok(self.handle_value(HandleKind::Script, Object::Script(script)))
	}

	fn script_op(&self, id: u64, method: &str) -> NativeResult<Value> {
		let mut world = self.world.lock();
		let script = world.script_mut(id)?;
		match (method, script.phase) {
			(_, ScriptPhase::Destroyed) => Err(NativeError::invalid_operation("script is destroyed")),
			("load", ScriptPhase::Loaded) => Err(NativeError::invalid_operation("script is already loaded")),
			("load", ScriptPhase::Created) => {
				script.phase = ScriptPhase::Loaded;
				for payload in sent_literals(&script.source) {
					let text = json!({ "type": "send", "payload": payload }).to_string();
					self.emit(Emitter::Script(id), "message", move |_| json!({ "message": text.clone() }), None);
				}
				Ok(Value::Null)
			}
			("unload" | "eternalize", _) => {
				script.phase = ScriptPhase::Destroyed;
				self.emit(Emitter::Script(id), "destroyed", |_| Value::Null, None);
				Ok(Value::Null)
			}
			_ => Err(NativeError::invalid_argument(format!("Script has no operation '{method}'"))),
		}
	}

	fn post_message(&self, id: u64, params: &Value) -> NativeResult<Value> {
		let text = param_str(params, "message")?;
		let data = match params.get("data") {
			None | Some(Value::Null) => None,
			Some(Value::String(encoded)) => Some(
				BASE64
					.decode(encoded)
					.map_err(|e| NativeError::invalid_argument(format!("invalid message data: {e}")))?,
			),
			Some(_) => return Err(NativeError::invalid_argument("message data must be base64")),
		};

		let world = self.world.lock();
		let script = world
			.scripts
			.get(&id)
			.ok_or_else(|| NativeError::invalid_argument("invalid script"))?;
		match script.phase {
			ScriptPhase::Destroyed => return Err(NativeError::invalid_operation("script is destroyed")),
			ScriptPhase::Created => return Err(NativeError::invalid_operation("script is not loaded")),
			ScriptPhase::Loaded => {}
		}
		drop(world);

		let reply = match serde_json::from_str::<Value>(text) {
			Ok(payload) => json!({ "type": "send", "payload": payload }),
			Err(err) => json!({ "type": "error", "description": format!("SyntaxError: {err}") }),
		}
		.to_string();
		self.emit(Emitter::Script(id), "message", move |_| json!({ "message": reply.clone() }), data);
		Ok(Value::Null)
	}

	/// Detaches a session, destroying its scripts first.
	fn detach_session(&self, world: &mut World, session: u64, reason: DetachReason, crash: Value) {
		let Some(scripts) = world.detach(session) else {
			return;
		};
		for script in scripts {
			self.emit(Emitter::Script(script), "destroyed", |_| Value::Null, None);
		}
		tracing::debug!(session, %reason, "Session detached");
		let mut payload = detach_payload(reason);
		payload["crash"] = crash;
		self.emit(Emitter::Session(session), "detached", move |_| payload.clone(), None);
	}

	/// Queues `signal` for every handler connected to `emitter`. The payload
	/// is built per delivery, so handles inside it are owned by exactly one
	/// handler, and nothing is built for handlers disconnected meanwhile.
	fn emit<P>(&self, emitter: Emitter, signal: &'static str, payload: P, data: Option<Vec<u8>>)
	where
		P: Fn(&SimCore) -> Value + Send + 'static,
	{
		let targets: Vec<(SignalId, SignalHandler)> = self
			.connections
			.lock()
			.iter()
			.filter(|(_, c)| c.emitter == emitter && c.signal == signal)
			.map(|(id, c)| (*id, Arc::clone(&c.handler)))
			.collect();
		if targets.is_empty() {
			return;
		}
		let me = self.me.clone();
		self.post(move || {
			let Some(sim) = me.upgrade() else {
				return;
			};
			for (id, handler) in targets {
				if !sim.connections.lock().contains_key(&id) {
					continue;
				}
				handler(payload(&sim), data.clone());
			}
		});
	}

	fn options_props(&self, params: &Value) -> NativeResult<Option<Map<String, Value>>> {
		let Some(value) = params.get("options").filter(|v| !v.is_null()) else {
			return Ok(None);
		};
		let raw: RawHandle = serde_json::from_value(value.clone())
			.map_err(|e| NativeError::invalid_argument(format!("invalid options handle: {e}")))?;
		match self.lookup(raw)? {
			Object::Options(props) => Ok(Some(props)),
			_ => Err(NativeError::invalid_argument(format!("{} is not an options object", raw.kind))),
		}
	}

	fn options_scope(&self, params: &Value) -> NativeResult<Scope> {
		let props = self.options_props(params)?.unwrap_or_default();
		scope_of(&props)
	}

	fn application_query(&self, params: &Value) -> NativeResult<(Vec<String>, Scope)> {
		let props = self.options_props(params)?.unwrap_or_default();
		let identifiers = match props.get("identifiers") {
			Some(value) => serde_json::from_value(value.clone())
				.map_err(|e| NativeError::invalid_argument(format!("invalid identifiers: {e}")))?,
			None => Vec::new(),
		};
		Ok((identifiers, scope_of(&props)?))
	}

	fn list_get(&self, raw: RawHandle, object: &Object, params: &Value) -> NativeResult<Value> {
		let index = params
			.get("index")
			.and_then(Value::as_u64)
			.and_then(|i| usize::try_from(i).ok())
			.ok_or_else(|| NativeError::invalid_argument("missing or invalid 'index'"))?;
		let out_of_range = || NativeError::invalid_argument(format!("index {index} out of range"));
		let (kind, element) = match object {
			Object::DeviceList(items) => {
				let id = items.get(index).ok_or_else(out_of_range)?;
				(HandleKind::Device, Object::Device(id.clone()))
			}
			Object::ProcessList(items) => {
				let process = items.get(index).ok_or_else(out_of_range)?;
				(HandleKind::Process, Object::Process(process.clone()))
			}
			Object::ApplicationList(items) => {
				let app = items.get(index).ok_or_else(out_of_range)?;
				(HandleKind::Application, Object::Application(app.clone()))
			}
			Object::SpawnList(items) => {
				let spawn = items.get(index).ok_or_else(out_of_range)?;
				(HandleKind::Spawn, Object::Spawn(spawn.clone()))
			}
			Object::ChildList(items) => {
				let child = items.get(index).ok_or_else(out_of_range)?;
				(HandleKind::Child, Object::Child(child.clone()))
			}
			_ => return Err(unknown_method(raw, "get")),
		};
		Ok(self.handle_value(kind, element))
	}
}

impl NativeCore for SimCore {
	fn init(&self) -> NativeResult<()> {
		if let Some(err) = self.init_failure.lock().clone() {
			return Err(err);
		}
		if self.initialized.swap(true, Ordering::SeqCst) {
			return Err(NativeError::invalid_operation("already initialized"));
		}
		tracing::debug!(version = VERSION, "Simulated engine initialized");
		Ok(())
	}

	fn deinit(&self) {
		self.initialized.store(false, Ordering::SeqCst);
	}

	fn version(&self) -> String {
		VERSION.to_owned()
	}

	fn create(&self, kind: HandleKind, params: Value) -> NativeResult<RawHandle> {
		match kind {
			HandleKind::DeviceManager => {
				let backends = Backends::parse(&params)?;
				let id = {
					let mut world = self.world.lock();
					let id = world.next_entity();
					world.managers.insert(id, ManagerState { backends, closed: false });
					id
				};
				Ok(self.adopt(kind, Object::Manager(id)))
			}
			HandleKind::ApplicationQueryOptions => {
				let mut props = Map::new();
				props.insert("identifiers".into(), json!([]));
				props.insert("scope".into(), json!(Scope::Minimal));
				Ok(self.adopt(kind, Object::Options(props)))
			}
			HandleKind::FrontmostQueryOptions => {
				let mut props = Map::new();
				props.insert("scope".into(), json!(Scope::Minimal));
				Ok(self.adopt(kind, Object::Options(props)))
			}
			other => Err(NativeError::invalid_argument(format!("{other} cannot be constructed directly"))),
		}
	}

	fn release(&self, handle: RawHandle) {
		*self.releases.entry(handle).or_insert(0) += 1;
		if self.objects.remove(&handle.id).is_none() {
			tracing::warn!(%handle, "Release of unknown handle");
		}
		self.connections.lock().retain(|_, c| c.handle != handle);
	}

	fn get(&self, handle: RawHandle, name: &str) -> NativeResult<Value> {
		let object = self.lookup(handle)?;
		if self.failing.lock().contains(name) {
			return Err(NativeError::new(
				NativeErrorCode::Transport,
				format!("connection closed while reading '{name}'"),
			));
		}
		let world = self.world.lock();
		let value = match (&object, name) {
			(Object::Device(id), "id") => json!(id),
			(Object::Device(id), "name") => json!(world.device(id)?.name),
			(Object::Device(id), "type") => json!(world.device(id)?.kind),
			(Object::Device(id), "is_lost") => json!(world.device(id)?.lost),
			(Object::Session(id), "pid") => json!(world.session(*id)?.pid),
			(Object::Session(id), "is_detached") => json!(world.session(*id)?.detached),
			(Object::Session(id), "persist_timeout") => json!(world.session(*id)?.persist_timeout),
			(Object::Script(id), "name" | "is_destroyed") => {
				let script = world
					.scripts
					.get(id)
					.ok_or_else(|| NativeError::invalid_argument("invalid script"))?;
				match name {
					"name" => json!(script.name),
					_ => json!(script.phase == ScriptPhase::Destroyed),
				}
			}
			(Object::Process(p), "pid") => json!(p.pid),
			(Object::Process(p), "name") => json!(p.name),
			(Object::Process(p), "parameters") => Value::Object(p.parameters.clone()),
			(Object::Application(a), "identifier") => json!(a.identifier),
			(Object::Application(a), "name") => json!(a.name),
			(Object::Application(a), "pid") => json!(a.pid),
			(Object::Application(a), "parameters") => Value::Object(a.parameters.clone()),
			(Object::Spawn(s), "pid") => json!(s.pid),
			(Object::Spawn(s), "identifier") => json!(s.identifier),
			(Object::Child(c), "pid") => json!(c.pid),
			(Object::Child(c), "parent_pid") => json!(c.parent_pid),
			(Object::Child(c), "origin") => json!(c.origin),
			(Object::Child(c), "identifier") => json!(c.identifier),
			(Object::Child(c), "path") => json!(c.path),
			(Object::Child(c), "argv") => json!(c.argv),
			(Object::Child(c), "envp") => json!(c.envp),
			(Object::Options(props), key) => props.get(key).cloned().unwrap_or(Value::Null),
			_ => return Err(NativeError::invalid_argument(format!("{} has no property '{name}'", handle.kind))),
		};
		Ok(value)
	}

	fn set(&self, handle: RawHandle, name: &str, value: Value) -> NativeResult<()> {
		let mut entry = self
			.objects
			.get_mut(&handle.id)
			.filter(|entry| entry.0 == handle.kind)
			.ok_or_else(|| NativeError::invalid_argument(format!("invalid {} handle", handle.kind)))?;
		let Object::Options(props) = &mut entry.1 else {
			return Err(NativeError::invalid_argument(format!("{} has no writable properties", handle.kind)));
		};
		match name {
			"scope" => {
				serde_json::from_value::<Scope>(value.clone())
					.map_err(|e| NativeError::invalid_argument(format!("invalid scope: {e}")))?;
			}
			"identifiers" if handle.kind == HandleKind::ApplicationQueryOptions => {
				serde_json::from_value::<Vec<String>>(value.clone())
					.map_err(|e| NativeError::invalid_argument(format!("invalid identifiers: {e}")))?;
			}
			_ => return Err(NativeError::invalid_argument(format!("{} has no property '{name}'", handle.kind))),
		}
		props.insert(name.to_owned(), value);
		Ok(())
	}

	fn invoke(&self, handle: RawHandle, method: &str, params: Value) -> NativeResult<Value> {
		let object = self.lookup(handle)?;
		match (&object, method) {
			(Object::DeviceList(items), "size") => Ok(json!(items.len())),
			(Object::ProcessList(items), "size") => Ok(json!(items.len())),
			(Object::ApplicationList(items), "size") => Ok(json!(items.len())),
			(Object::SpawnList(items), "size") => Ok(json!(items.len())),
			(Object::ChildList(items), "size") => Ok(json!(items.len())),
			(_, "get") => self.list_get(handle, &object, &params),
			(Object::Options(_), "select_identifier") if handle.kind == HandleKind::ApplicationQueryOptions => {
				let identifier = param_str(&params, "identifier")?.to_owned();
				let mut entry = self
					.objects
					.get_mut(&handle.id)
					.ok_or_else(|| NativeError::invalid_argument("invalid options handle"))?;
				if let Object::Options(props) = &mut entry.1 {
					match props.get_mut("identifiers") {
						Some(Value::Array(list)) => list.push(json!(identifier)),
						_ => {
							props.insert("identifiers".into(), json!([identifier]));
						}
					}
				}
				Ok(Value::Null)
			}
			(Object::Script(id), "post") => self.post_message(*id, &params),
			_ => Err(unknown_method(handle, method)),
		}
	}

	fn start(&self, handle: RawHandle, method: &str, params: Value, cancellable: &Cancellable, done: NativeCompletion) {
		let object = match self.lookup(handle) {
			Ok(object) => object,
			Err(err) => return self.post(move || done(Err(err))),
		};

		if self.stalled.lock().contains(method) {
			let slot = self.defer(cancellable, done);
			let id = self.next_parked.fetch_add(1, Ordering::Relaxed);
			self.parked.lock().insert(
				id,
				Parked {
					method: method.to_owned(),
					raw: handle,
					object,
					params,
					cancellable: cancellable.clone(),
					slot,
				},
			);
			tracing::debug!(%handle, method, "Operation stalled");
			return;
		}

		let me = self.me.clone();
		let method = method.to_owned();
		let cancellable = cancellable.clone();
		self.post(move || {
			if let Some(sim) = me.upgrade() {
				sim.run(handle, &object, &method, params, &cancellable, done);
			}
		});
	}

	fn connect(&self, handle: RawHandle, signal: &str, handler: SignalHandler) -> NativeResult<SignalId> {
		let object = self.lookup(handle)?;
		let emitter = match (&object, signal) {
			(Object::Manager(id), "added" | "removed") => Emitter::Manager(*id),
			(Object::Device(id), "lost" | "spawn-added" | "child-added") => Emitter::Device(id.clone()),
			(Object::Session(id), "detached") => Emitter::Session(*id),
			(Object::Script(id), "message" | "destroyed") => Emitter::Script(*id),
			_ => return Err(NativeError::invalid_argument(format!("{} has no signal '{signal}'", handle.kind))),
		};
		let id = self.next_signal.fetch_add(1, Ordering::Relaxed);
		self.connections.lock().insert(
			id,
			Connection {
				handle,
				emitter,
				signal: signal.to_owned(),
				handler,
			},
		);
		Ok(id)
	}

	fn disconnect(&self, handle: RawHandle, id: SignalId) {
		let mut connections = self.connections.lock();
		if connections.get(&id).is_some_and(|c| c.handle == handle) {
			connections.shift_remove(&id);
		}
	}
}

fn unknown_method(raw: RawHandle, method: &str) -> NativeError {
	NativeError::invalid_argument(format!("{} has no method '{method}'", raw.kind))
}

fn remote_id(address: &str) -> String {
	format!("socket@{address}")
}

fn timeout(params: &Value) -> i64 {
	params.get("timeout").and_then(Value::as_i64).unwrap_or(0)
}

fn scope_of(props: &Map<String, Value>) -> NativeResult<Scope> {
	match props.get("scope") {
		Some(value) => serde_json::from_value(value.clone())
			.map_err(|e| NativeError::invalid_argument(format!("invalid scope: {e}"))),
		None => Ok(Scope::Minimal),
	}
}

fn param_str<'a>(params: &'a Value, key: &str) -> NativeResult<&'a str> {
	params
		.get(key)
		.and_then(Value::as_str)
		.ok_or_else(|| NativeError::invalid_argument(format!("missing or invalid '{key}'")))
}

fn param_u32(params: &Value, key: &str) -> NativeResult<u32> {
	params
		.get(key)
		.and_then(Value::as_u64)
		.and_then(|v| u32::try_from(v).ok())
		.ok_or_else(|| NativeError::invalid_argument(format!("missing or invalid '{key}'")))
}

fn param<T: DeserializeOwned>(params: &Value, key: &str) -> NativeResult<T> {
	let value = params
		.get(key)
		.ok_or_else(|| NativeError::invalid_argument(format!("missing '{key}'")))?;
	serde_json::from_value(value.clone()).map_err(|e| NativeError::invalid_argument(format!("invalid '{key}': {e}")))
}

fn param_or_default<T: DeserializeOwned + Default>(params: &Value, key: &str) -> NativeResult<T> {
	match params.get(key) {
		None | Some(Value::Null) => Ok(T::default()),
		Some(_) => param(params, key),
	}
}
