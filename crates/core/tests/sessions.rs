//! Attaching, detaching, and what a detached session still allows.

mod common;

use std::sync::mpsc;

use common::{Fixture, LOCAL_DEVICE_ID, PYTHON_PID, SHELL_PID, WAIT};
use frida::{
	DetachReason, Disposable, Error, NativeErrorCode, ProcessMatchOptions, Realm, ScriptOptions, SessionOptions,
};

#[test]
fn test_attach_reports_session_properties() {
	let fx = Fixture::new();
	let local = fx.local();
	let options = SessionOptions::new().realm(Realm::Native).persist_timeout(30);
	let session = local.attach(SHELL_PID, &options).unwrap().sync(None).unwrap();

	assert_eq!(session.pid().unwrap(), SHELL_PID);
	assert_eq!(session.persist_timeout().unwrap(), 30);
	assert!(!session.is_detached().unwrap());
	session.resume().sync(None).unwrap();
}

#[test]
fn test_attach_failures() {
	let fx = Fixture::new();
	let local = fx.local();
	let before = fx.sim.live_handles();

	let err = local.attach(1, &SessionOptions::new()).unwrap().sync(None).unwrap_err();
	assert!(matches!(err, Error::PermissionDenied(_)));
	let err = local.attach(77777, &SessionOptions::new()).unwrap().sync(None).unwrap_err();
	assert!(err.is_not_found());
	assert!(matches!(
		local.attach(0, &SessionOptions::new()).unwrap_err(),
		Error::InvalidArgument(_)
	));

	assert_eq!(fx.sim.live_handles(), before);
}

#[test]
fn test_attach_by_name() {
	let fx = Fixture::new();
	let session = fx.local().attach_by_name("python3", &SessionOptions::new()).unwrap();
	assert_eq!(session.pid().unwrap(), PYTHON_PID);

	let err = fx.local().attach_by_name("nginx", &SessionOptions::new()).unwrap_err();
	assert!(err.is_not_found());
}

#[test]
fn test_operations_after_detach_fail() {
	let fx = Fixture::new();
	let session = fx.attach(&fx.local(), SHELL_PID);
	let (tx, rx) = mpsc::channel();
	let _sub = session
		.on_detached(move |event| {
			let _ = tx.send(event);
		})
		.unwrap();

	session.detach().sync(None).unwrap();
	let event = rx.recv_timeout(WAIT).unwrap();
	assert_eq!(event.reason, DetachReason::ApplicationRequested);
	assert!(event.crash.is_none());
	assert!(session.is_detached().unwrap());

	let err = session
		.create_script("send(1);", &ScriptOptions::new())
		.unwrap()
		.sync(None)
		.unwrap_err();
	assert_eq!(err.native_code(), Some(NativeErrorCode::InvalidOperation));
	let err = session.enable_child_gating().sync(None).unwrap_err();
	assert_eq!(err.native_code(), Some(NativeErrorCode::InvalidOperation));

	// Detaching again is harmless.
	session.detach().sync(None).unwrap();
}

#[test]
fn test_crash_detaches_with_report() {
	let fx = Fixture::new();
	let session = fx.attach(&fx.local(), PYTHON_PID);
	let (tx, rx) = mpsc::channel();
	let _sub = session
		.on_detached(move |event| {
			let _ = tx.send(event);
		})
		.unwrap();

	fx.sim.crash_process(LOCAL_DEVICE_ID, PYTHON_PID, "SIGSEGV");

	let event = rx.recv_timeout(WAIT).unwrap();
	assert_eq!(event.reason, DetachReason::ProcessTerminated);
	let crash = event.crash.expect("crash report");
	assert_eq!(crash.pid, PYTHON_PID);
	assert_eq!(crash.process_name, "python3");
	assert_eq!(crash.summary, "SIGSEGV");
	assert!(crash.report.contains("crashed"));

	let err = fx
		.local()
		.get_process_by_pid(PYTHON_PID, &ProcessMatchOptions::new())
		.unwrap()
		.sync(None)
		.unwrap_err();
	assert!(err.is_not_found());
}

#[test]
fn test_kill_detaches_sessions() {
	let fx = Fixture::new();
	let local = fx.local();
	let session = fx.attach(&local, PYTHON_PID);
	let (tx, rx) = mpsc::channel();
	let _sub = session
		.on_detached(move |event| {
			let _ = tx.send(event.reason);
		})
		.unwrap();

	local.kill(PYTHON_PID).unwrap().sync(None).unwrap();
	assert_eq!(rx.recv_timeout(WAIT).unwrap(), DetachReason::ProcessTerminated);
	assert!(session.is_detached().unwrap());
}

#[test]
fn test_device_loss_detaches_sessions() {
	let fx = Fixture::new();
	let session = fx.attach(&fx.local(), SHELL_PID);
	let (tx, rx) = mpsc::channel();
	let _sub = session
		.on_detached(move |event| {
			let _ = tx.send(event.reason);
		})
		.unwrap();

	fx.sim.lose_device(LOCAL_DEVICE_ID);
	assert_eq!(rx.recv_timeout(WAIT).unwrap(), DetachReason::DeviceLost);
}

#[test]
fn test_disposing_session_detaches_it() {
	let fx = Fixture::new();
	let session = fx.attach(&fx.local(), SHELL_PID);
	let _script = session
		.create_script("send(1);", &ScriptOptions::new())
		.unwrap()
		.sync(None)
		.unwrap();
	assert_eq!(fx.sim.attached_sessions(), 1);

	session.dispose();
	fx.sim.wait_idle();

	assert_eq!(fx.sim.attached_sessions(), 0);
	assert_eq!(fx.sim.live_scripts(), 0);
}

#[test]
fn test_child_gating_toggles() {
	let fx = Fixture::new();
	let session = fx.attach(&fx.local(), SHELL_PID);
	session.enable_child_gating().sync(None).unwrap();
	session.disable_child_gating().sync(None).unwrap();
}
