//! Opening the engine and resolving the target device.

use std::path::Path;

use frida::{Device, DeviceManager, DeviceType, Frida, ProcessMatchOptions};

use crate::cli::{Backend, ProcessTarget};
use crate::error::{CliError, Result};

/// An initialized engine plus the device manager every command starts from.
pub struct Engine {
	frida: Frida,
	manager: DeviceManager,
}

impl Engine {
	pub fn open(backend: Backend, library: Option<&Path>) -> Result<Self> {
		let frida = match backend {
			Backend::Library => Frida::load(library),
			Backend::Sim => Frida::init(frida::sim::SimCore::new().core()),
		}
		.map_err(CliError::Engine)?;
		let manager = DeviceManager::new(&frida)?;
		tracing::debug!(?backend, "Engine ready");
		Ok(Self { frida, manager })
	}

	pub fn frida(&self) -> &Frida {
		&self.frida
	}

	pub fn manager(&self) -> &DeviceManager {
		&self.manager
	}

	/// The device with `id`, or the local system when `id` is `None`.
	pub async fn device(&self, id: Option<&str>) -> Result<Device> {
		let found = match id {
			Some(id) => self.manager.find_device_by_id(id, 0).await?,
			None => self.manager.find_device_by_type(DeviceType::Local, 0).await?,
		};
		found.ok_or_else(|| CliError::DeviceNotFound(id.unwrap_or("local").to_owned()))
	}

	/// Releases the manager, then shuts the engine down.
	pub fn close(self) {
		let Self { frida, manager } = self;
		drop(manager);
		frida.deinit();
	}
}

/// Resolves a pid-or-name target on `device`.
pub async fn resolve_pid(device: &Device, target: &ProcessTarget) -> Result<u32> {
	match target {
		ProcessTarget::Pid(pid) => Ok(*pid),
		ProcessTarget::Name(name) => {
			let process = device
				.find_process_by_name(name, &ProcessMatchOptions::new())?
				.await?
				.ok_or_else(|| CliError::ProcessNotFound(name.clone()))?;
			Ok(process.pid()?)
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn test_sim_engine_resolves_devices_and_names() {
		let engine = Engine::open(Backend::Sim, None).unwrap();

		let local = engine.device(None).await.unwrap();
		assert_eq!(local.kind().unwrap(), DeviceType::Local);
		let pid = resolve_pid(&local, &ProcessTarget::Name("zsh".into())).await.unwrap();
		assert_eq!(pid, 2048);
		assert_eq!(resolve_pid(&local, &ProcessTarget::Pid(7)).await.unwrap(), 7);

		let err = resolve_pid(&local, &ProcessTarget::Name("nginx".into())).await.unwrap_err();
		assert!(matches!(err, CliError::ProcessNotFound(name) if name == "nginx"));

		let err = engine.device(Some("usb-9")).await.unwrap_err();
		assert!(matches!(err, CliError::DeviceNotFound(id) if id == "usb-9"));

		drop(local);
		engine.close();
	}

	#[test]
	fn test_missing_library_is_engine_error() {
		let dir = tempfile::tempdir().unwrap();
		let missing = dir.path().join("libfrida-host-missing.so");
		let err = Engine::open(Backend::Library, Some(&missing)).err().unwrap();
		assert!(matches!(err, CliError::Engine(_)), "got {err}");
	}
}
