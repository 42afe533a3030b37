//! Shared fixtures for integration tests against the simulated engine.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use frida::{Device, DeviceManager, Frida, Session, SessionOptions};
use frida_runtime::sim::SimCore;

pub use frida_runtime::sim::{LOCAL_DEVICE_ID, SOCKET_DEVICE_ID, USB_DEVICE_ID};

/// How long a test waits for a signal before giving up.
pub const WAIT: Duration = Duration::from_secs(5);

/// pid of `zsh` on the local device.
pub const SHELL_PID: u32 = 2048;

/// pid of `python3` on the local device.
pub const PYTHON_PID: u32 = 3141;

pub struct Fixture {
	pub sim: Arc<SimCore>,
	pub frida: Frida,
	pub manager: DeviceManager,
}

impl Fixture {
	pub fn new() -> Self {
		let sim = SimCore::new();
		let frida = Frida::init(sim.core()).expect("engine init");
		let manager = DeviceManager::new(&frida).expect("device manager");
		Self { sim, frida, manager }
	}

	pub fn device(&self, id: &str) -> Device {
		self.manager.get_device_by_id(id, 0).sync(None).expect("device lookup")
	}

	pub fn local(&self) -> Device {
		self.device(LOCAL_DEVICE_ID)
	}

	pub fn attach(&self, device: &Device, pid: u32) -> Session {
		device
			.attach(pid, &SessionOptions::new())
			.and_then(|call| call.sync(None))
			.expect("attach")
	}
}
