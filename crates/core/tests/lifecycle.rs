//! Exactly-once release for every entity kind, and the engine's
//! init/deinit discipline.

mod common;

use std::sync::Arc;
use std::thread;

use common::{Fixture, SHELL_PID, USB_DEVICE_ID};
use frida::{
	ApplicationQueryOptions, Disposable, Error, Frida, FrontmostQueryOptions, NativeErrorCode, ProcessMatchOptions,
	ProcessQueryOptions, ScriptOptions,
};
use frida_runtime::sim::SimCore;

/// Disposes `object` from several threads at once and checks the native
/// release ran exactly once.
fn dispose_concurrently<D>(sim: &SimCore, object: D, raw: frida_runtime::RawHandle)
where
	D: Disposable + Send + Sync + 'static,
{
	let object = Arc::new(object);
	let workers: Vec<_> = (0..8)
		.map(|_| {
			let object = Arc::clone(&object);
			thread::spawn(move || {
				object.dispose();
				object.dispose();
			})
		})
		.collect();
	for worker in workers {
		worker.join().unwrap();
	}
	assert!(object.is_disposed());
	drop(object);
	assert_eq!(sim.release_count(raw), 1, "{raw} released more than once");
}

#[test]
fn test_every_entity_is_released_exactly_once() {
	let fx = Fixture::new();
	let local = fx.local();
	let usb = fx.device(USB_DEVICE_ID);
	let session = fx.attach(&local, SHELL_PID);
	let script = session
		.create_script("send(1);", &ScriptOptions::new())
		.unwrap()
		.sync(None)
		.unwrap();
	let process = local
		.get_process_by_pid(SHELL_PID, &ProcessMatchOptions::new())
		.unwrap()
		.sync(None)
		.unwrap();
	let processes = local
		.enumerate_processes(&ProcessQueryOptions::new())
		.unwrap()
		.sync(None)
		.unwrap();
	let apps = usb.enumerate_applications(None).sync(None).unwrap();
	let app = apps.get(0).unwrap();
	let app_options = ApplicationQueryOptions::new(&fx.frida).unwrap();
	let frontmost_options = FrontmostQueryOptions::new(&fx.frida).unwrap();

	macro_rules! check {
		($($object:expr),* $(,)?) => {
			$(
				let raw = $object.handle_cell().lease().unwrap().raw();
				dispose_concurrently(&fx.sim, $object, raw);
			)*
		};
	}
	check!(script, session, process, processes, app, apps, app_options, frontmost_options, usb, local);
}

#[test]
fn test_operations_after_dispose_fail() {
	let fx = Fixture::new();
	let local = fx.local();
	local.dispose();

	assert!(local.id().unwrap_err().is_use_after_dispose());
	assert!(local.kill(SHELL_PID).unwrap().sync(None).unwrap_err().is_use_after_dispose());
	assert!(local.on_lost(|| {}).unwrap_err().is_use_after_dispose());
	assert!(
		local
			.enumerate_processes(&ProcessQueryOptions::new())
			.unwrap()
			.sync(None)
			.unwrap_err()
			.is_use_after_dispose()
	);
}

#[test]
fn test_using_releases_on_early_return() {
	let fx = Fixture::new();
	let before = fx.sim.live_handles();

	let found: Result<String, Error> = fx.local().using(|device| {
		let name = device.name()?;
		if name.is_empty() {
			return Err(Error::NotFound("unnamed".into()));
		}
		Ok(name)
	});

	assert_eq!(found.unwrap(), "Local System");
	assert_eq!(fx.sim.live_handles(), before);
}

#[test]
fn test_init_twice_is_a_lifecycle_error() {
	let sim = SimCore::new();
	let frida = Frida::init(sim.core()).unwrap();

	let err = Frida::init(sim.core()).unwrap_err();
	assert!(matches!(err, Error::Lifecycle(_)));

	frida.deinit();
	assert!(!sim.is_initialized());
	Frida::init(sim.core()).unwrap().deinit();
}

#[test]
fn test_init_failures_keep_their_kind() {
	let sim = SimCore::new();
	sim.fail_init(Some(NativeErrorCode::PermissionDenied));
	let err = Frida::init(sim.core()).unwrap_err();
	assert!(matches!(err, Error::PermissionDenied(_)));

	sim.fail_init(Some(NativeErrorCode::NotSupported));
	let err = Frida::init(sim.core()).unwrap_err();
	assert!(matches!(err, Error::NotSupported(_)));

	sim.fail_init(Some(NativeErrorCode::Transport));
	let err = Frida::init(sim.core()).unwrap_err();
	assert_eq!(err.native_code(), Some(NativeErrorCode::Transport));
	assert!(!sim.is_initialized());

	sim.fail_init(None);
	Frida::init(sim.core()).unwrap().deinit();
}

#[test]
fn test_version() {
	let fx = Fixture::new();
	let version = fx.frida.version().unwrap();
	assert_eq!((version.major, version.minor, version.micro), (17, 2, 15));
	assert_eq!(fx.frida.version_string(), "17.2.15");
}

#[test]
fn test_dropping_everything_leaves_no_handles() {
	let sim = {
		let fx = Fixture::new();
		let local = fx.local();
		let session = fx.attach(&local, SHELL_PID);
		let _script = session
			.create_script("send('x');", &ScriptOptions::new())
			.unwrap()
			.sync(None)
			.unwrap();
		let _devices = fx.manager.enumerate_devices().sync(None).unwrap().to_vec().unwrap();
		Arc::clone(&fx.sim)
	};
	assert_eq!(sim.live_handles(), 0);
}
