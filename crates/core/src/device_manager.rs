//! Root object for device discovery.

use frida_protocol::{DeviceType, RemoteDeviceOptions};
use frida_runtime::{Call, Error, Owned, Result, Subscription};
use serde_json::{Value, json};

use crate::{Device, DeviceList, Frida, events};

native_object! {
	/// Discovers devices through the engine's backends.
	///
	/// Lookups that take a `timeout_ms` wait for a matching device to
	/// appear: `0` checks once, a positive value waits that many
	/// milliseconds, a negative value waits until cancelled. `get_*`
	/// lookups fail with [`Error::Timeout`] when the wait expires and with
	/// [`Error::NotFound`] when nothing matched without waiting; `find_*`
	/// lookups yield `None` instead.
	DeviceManager => DeviceManager
}

impl DeviceManager {
	/// Creates a manager over every backend.
	pub fn new(frida: &Frida) -> Result<Self> {
		Self::with_backends(frida, "all")
	}

	/// Creates a manager that skips the local system.
	pub fn with_nonlocal_backends_only(frida: &Frida) -> Result<Self> {
		Self::with_backends(frida, "nonlocal")
	}

	/// Creates a manager that only talks to socket (remote) devices.
	pub fn with_socket_backend_only(frida: &Frida) -> Result<Self> {
		Self::with_backends(frida, "socket")
	}

	fn with_backends(frida: &Frida, backends: &str) -> Result<Self> {
		let owned = Owned::create(frida.core(), json!({ "backends": backends }))?;
		tracing::debug!(backends, "Created device manager");
		Ok(Self { owned })
	}

	pub fn enumerate_devices(&self) -> Call<DeviceList> {
		Call::new(&self.owned, "enumerate_devices", Value::Null)
	}

	pub fn get_device_by_id(&self, id: &str, timeout_ms: i32) -> Call<Device> {
		Call::new(&self.owned, "get_device_by_id", json!({ "id": id, "timeout": timeout_ms }))
	}

	pub fn get_device_by_type(&self, kind: DeviceType, timeout_ms: i32) -> Call<Device> {
		Call::new(&self.owned, "get_device_by_type", json!({ "type": kind, "timeout": timeout_ms }))
	}

	pub fn find_device_by_id(&self, id: &str, timeout_ms: i32) -> Call<Option<Device>> {
		Call::new(&self.owned, "find_device_by_id", json!({ "id": id, "timeout": timeout_ms }))
	}

	pub fn find_device_by_type(&self, kind: DeviceType, timeout_ms: i32) -> Call<Option<Device>> {
		Call::new(&self.owned, "find_device_by_type", json!({ "type": kind, "timeout": timeout_ms }))
	}

	/// Connects to a remote engine at `address` (`host[:port]`).
	pub fn add_remote_device(&self, address: &str, options: &RemoteDeviceOptions) -> Result<Call<Device>> {
		if address.is_empty() {
			return Err(Error::InvalidArgument("remote address must not be empty".into()));
		}
		let options = serde_json::to_value(options)?;
		Ok(Call::new(
			&self.owned,
			"add_remote_device",
			json!({ "address": address, "options": options }),
		))
	}

	pub fn remove_remote_device(&self, address: &str) -> Call<()> {
		Call::new(&self.owned, "remove_remote_device", json!({ "address": address }))
	}

	/// Stops device discovery. The manager still has to be disposed.
	pub fn close(&self) -> Call<()> {
		Call::new(&self.owned, "close", Value::Null)
	}

	/// The local system.
	pub fn local_device(&self) -> Result<Device> {
		self.find_device(|device| Ok(device.kind()? == DeviceType::Local))?
			.ok_or_else(|| Error::NotFound("no local device".into()))
	}

	/// Scans the current devices for `id`.
	pub fn device_by_id(&self, id: &str) -> Result<Device> {
		self.find_device(|device| Ok(device.id()? == id))?
			.ok_or_else(|| Error::NotFound(format!("no device with id '{id}'")))
	}

	/// Scans the current devices for one named `name`.
	pub fn device_by_name(&self, name: &str) -> Result<Device> {
		self.find_device(|device| Ok(device.name()? == name))?
			.ok_or_else(|| Error::NotFound(format!("no device named '{name}'")))
	}

	/// Returns the first current device matching `predicate`.
	///
	/// Non-matching devices and the list itself are disposed before this
	/// returns.
	pub fn find_device<F>(&self, mut predicate: F) -> Result<Option<Device>>
	where
		F: FnMut(&Device) -> Result<bool>,
	{
		let devices = self.enumerate_devices().sync(None)?;
		for device in &devices {
			let device = device?;
			if predicate(&device)? {
				return Ok(Some(device));
			}
		}
		Ok(None)
	}

	/// Calls `handler` with each device that appears.
	pub fn on_added<F>(&self, handler: F) -> Result<Subscription>
	where
		F: Fn(Device) + Send + Sync + 'static,
	{
		events::on_object(&self.owned, "added", "device", handler)
	}

	/// Calls `handler` with each device that goes away.
	pub fn on_removed<F>(&self, handler: F) -> Result<Subscription>
	where
		F: Fn(Device) + Send + Sync + 'static,
	{
		events::on_object(&self.owned, "removed", "device", handler)
	}
}
