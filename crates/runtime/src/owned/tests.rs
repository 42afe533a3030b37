use std::sync::{Arc, Barrier};
use std::thread;

use serde_json::json;

use super::*;
use crate::bridge::Call;
use crate::handle::kind;
use crate::sim::{LOCAL_DEVICE_ID, SimCore};

fn manager(sim: &Arc<SimCore>) -> Owned<kind::DeviceManager> {
	Owned::create(&sim.core(), json!({ "backends": "all" })).unwrap()
}

fn local_session(sim: &Arc<SimCore>) -> (Owned<kind::DeviceManager>, Owned<kind::Device>, Owned<kind::Session>) {
	let manager = manager(sim);
	let params = json!({ "id": LOCAL_DEVICE_ID, "timeout": 0 });
	let device: Owned<kind::Device> = Call::new(&manager, "get_device_by_id", params).sync(None).unwrap();
	let session: Owned<kind::Session> = Call::new(&device, "attach", json!({ "pid": 2048 }))
		.sync(None)
		.unwrap();
	(manager, device, session)
}

#[test]
fn test_dispose_is_idempotent() {
	let sim = SimCore::new();
	let manager = manager(&sim);
	let raw = manager.raw();

	manager.dispose();
	manager.dispose();
	manager.dispose();
	assert!(manager.is_disposed());
	drop(manager);

	assert_eq!(sim.release_count(raw), 1);
	assert_eq!(sim.live_handles(), 0);
}

#[test]
fn test_concurrent_dispose_releases_once() {
	let sim = SimCore::new();
	let manager = Arc::new(manager(&sim));
	let raw = manager.raw();
	let barrier = Arc::new(Barrier::new(16));

	let workers: Vec<_> = (0..16)
		.map(|_| {
			let manager = Arc::clone(&manager);
			let barrier = Arc::clone(&barrier);
			thread::spawn(move || {
				barrier.wait();
				manager.dispose();
			})
		})
		.collect();
	for worker in workers {
		worker.join().unwrap();
	}

	assert_eq!(sim.release_count(raw), 1);
}

#[test]
fn test_only_one_caller_performs_the_transition() {
	let sim = SimCore::new();
	let manager = manager(&sim);

	assert!(manager.cell().dispose());
	assert!(!manager.cell().dispose());
}

#[test]
fn test_use_after_dispose() {
	let sim = SimCore::new();
	let manager = manager(&sim);
	manager.dispose();

	let err = manager.invoke::<Value>("size", Value::Null).unwrap_err();
	assert!(err.is_use_after_dispose());
	assert!(matches!(err, Error::UseAfterDispose { kind: HandleKind::DeviceManager }));

	assert!(manager.get::<String>("id").unwrap_err().is_use_after_dispose());
	assert!(manager.set("scope", "full").unwrap_err().is_use_after_dispose());
	assert!(manager.connect("added", Arc::new(|_, _| {})).unwrap_err().is_use_after_dispose());
	assert!(manager.handle().unwrap_err().is_use_after_dispose());

	let call: Call<Value> = Call::new(&manager, "enumerate_devices", Value::Null);
	assert!(call.start(None, |_| {}).unwrap_err().is_use_after_dispose());
}

#[test]
fn test_release_waits_for_outstanding_lease() {
	let sim = SimCore::new();
	let manager = manager(&sim);
	let raw = manager.raw();

	let lease = manager.cell().lease().unwrap();
	manager.dispose();
	assert!(manager.is_disposed());
	assert_eq!(sim.release_count(raw), 0);

	drop(lease);
	assert_eq!(sim.release_count(raw), 1);
}

#[test]
fn test_using_disposes_on_exit() {
	let sim = SimCore::new();
	let raw = manager(&sim).using(|m| {
		assert!(!m.is_disposed());
		m.raw()
	});
	assert_eq!(sim.release_count(raw), 1);
}

#[test]
fn test_using_disposes_on_panic() {
	let sim = SimCore::new();
	let manager = manager(&sim);
	let raw = manager.raw();

	let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
		let _: () = manager.using(|_| panic!("boom"));
	}));
	assert!(outcome.is_err());
	assert_eq!(sim.release_count(raw), 1);
}

#[test]
fn test_drop_releases() {
	let sim = SimCore::new();
	let raw = {
		let manager = manager(&sim);
		manager.raw()
	};
	assert_eq!(sim.release_count(raw), 1);
}

#[test]
fn test_create_rejects_non_constructible_kind() {
	let sim = SimCore::new();
	let err = Owned::<kind::Session>::create(&sim.core(), Value::Null).unwrap_err();
	assert!(matches!(err, Error::InvalidArgument(_)));
	assert_eq!(sim.live_handles(), 0);
}

#[test]
fn test_disposing_session_requests_detach() {
	let sim = SimCore::new();
	let (_manager, _device, session) = local_session(&sim);
	assert_eq!(sim.attached_sessions(), 1);

	session.dispose();
	sim.wait_idle();

	assert_eq!(sim.attached_sessions(), 0);
	assert_eq!(sim.release_count(session.raw()), 1);
}

#[test]
fn test_disposing_detached_session_skips_detach() {
	let sim = SimCore::new();
	let (_manager, _device, session) = local_session(&sim);
	Call::<()>::new(&session, "detach", Value::Null).sync(None).unwrap();

	sim.stall("detach");
	session.dispose();
	assert_eq!(sim.pending_operations(), 0);
	assert_eq!(sim.release_count(session.raw()), 1);
}

#[test]
fn test_session_teardown_does_not_wait() {
	let sim = SimCore::new();
	let (_manager, _device, session) = local_session(&sim);

	sim.stall("detach");
	session.dispose();
	assert_eq!(sim.pending_operations(), 1);
	assert_eq!(sim.release_count(session.raw()), 1);

	sim.unstall("detach");
	sim.wait_idle();
	assert_eq!(sim.attached_sessions(), 0);
}

#[test]
fn test_failed_detach_check_still_releases_session() {
	let sim = SimCore::new();
	let (_manager, _device, session) = local_session(&sim);
	sim.fail_property("is_detached");

	session.dispose();
	assert!(session.is_disposed());
	assert_eq!(sim.release_count(session.raw()), 1);

	session.dispose();
	assert_eq!(sim.release_count(session.raw()), 1);
	let err = session.get::<bool>("is_detached").unwrap_err();
	assert!(err.is_use_after_dispose());
}

#[test]
fn test_failed_destroyed_check_still_releases_script() {
	let sim = SimCore::new();
	let (_manager, _device, session) = local_session(&sim);
	let script: Owned<kind::Script> = Call::new(&session, "create_script", json!({ "source": "send(1);" }))
		.sync(None)
		.unwrap();
	let raw = script.raw();
	sim.fail_property("is_destroyed");

	drop(script);
	assert_eq!(sim.release_count(raw), 1);
}

#[test]
fn test_disposing_script_requests_unload() {
	let sim = SimCore::new();
	let (_manager, _device, session) = local_session(&sim);
	let script: Owned<kind::Script> = Call::new(&session, "create_script", json!({ "source": "send(1);" }))
		.sync(None)
		.unwrap();
	assert_eq!(sim.live_scripts(), 1);

	drop(script);
	sim.wait_idle();
	assert_eq!(sim.live_scripts(), 0);
}
