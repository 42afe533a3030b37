//! Native list snapshots as seen through the facades.

mod common;

use common::{Fixture, USB_DEVICE_ID};
use frida::{ApplicationQueryOptions, Disposable, Error, ProcessQueryOptions, Scope};

#[test]
fn test_get_past_the_end_is_index_out_of_range() {
	let fx = Fixture::new();
	let devices = fx.manager.enumerate_devices().sync(None).unwrap();
	let len = devices.len().unwrap();
	assert_eq!(len, 3);

	match devices.get(len) {
		Err(Error::IndexOutOfRange { index, len: reported }) => {
			assert_eq!(index, 3);
			assert_eq!(reported, 3);
		}
		other => panic!("Expected IndexOutOfRange, got {other:?}"),
	}
}

#[test]
fn test_element_outlives_its_list() {
	let fx = Fixture::new();
	let processes = fx
		.local()
		.enumerate_processes(&ProcessQueryOptions::new())
		.unwrap()
		.sync(None)
		.unwrap();
	let last = processes.get(processes.len().unwrap() - 1).unwrap();
	processes.dispose();

	assert_eq!(last.name().unwrap(), "python3");
	assert!(processes.len().unwrap_err().is_use_after_dispose());
	assert!(processes.iter().next().unwrap().unwrap_err().is_use_after_dispose());
}

#[test]
fn test_to_vec_elements_are_independent() {
	let fx = Fixture::new();
	let devices = fx.manager.enumerate_devices().sync(None).unwrap();
	let all = devices.to_vec().unwrap();
	drop(devices);

	let names: Vec<String> = all.iter().map(|d| d.name().unwrap()).collect();
	assert_eq!(names, ["Local System", "Local Socket", "Pixel Sim"]);

	all[0].dispose();
	assert_eq!(all[1].name().unwrap(), "Local Socket");
}

#[test]
fn test_process_query_selects_pids_and_scope() {
	let fx = Fixture::new();
	let options = ProcessQueryOptions::new().select_pid(412).scope(Scope::Metadata);
	let processes = fx.local().enumerate_processes(&options).unwrap().sync(None).unwrap();

	assert_eq!(processes.len().unwrap(), 1);
	let sshd = processes.get(0).unwrap();
	assert_eq!(sshd.pid().unwrap(), 412);
	assert_eq!(sshd.parameters().unwrap()["user"], "root");
}

#[test]
fn test_minimal_scope_omits_parameters() {
	let fx = Fixture::new();
	let processes = fx
		.local()
		.enumerate_processes(&ProcessQueryOptions::new())
		.unwrap()
		.sync(None)
		.unwrap();
	assert!(processes.get(0).unwrap().parameters().unwrap().is_empty());
}

#[test]
fn test_application_query_options() {
	let fx = Fixture::new();
	let usb = fx.device(USB_DEVICE_ID);

	let options = ApplicationQueryOptions::new(&fx.frida).unwrap();
	assert!(!options.has_selected_identifiers().unwrap());
	options.select_identifier("com.example.camera").unwrap();
	options.set_scope(Scope::Full).unwrap();
	assert_eq!(options.identifiers().unwrap(), ["com.example.camera"]);
	assert_eq!(options.scope().unwrap(), Scope::Full);

	let apps = usb.enumerate_applications(Some(&options)).sync(None).unwrap();
	assert_eq!(apps.len().unwrap(), 1);
	let camera = apps.get(0).unwrap();
	assert_eq!(camera.name().unwrap(), "Camera");
	assert!(!camera.is_running().unwrap());
	assert_eq!(camera.parameters().unwrap()["version"], "1.0.4");

	let everything = usb.enumerate_applications(None).sync(None).unwrap();
	assert_eq!(everything.len().unwrap(), 2);
}

#[test]
fn test_disposed_options_reject_the_call() {
	let fx = Fixture::new();
	let usb = fx.device(USB_DEVICE_ID);
	let options = ApplicationQueryOptions::new(&fx.frida).unwrap();
	let call = usb.enumerate_applications(Some(&options));
	options.dispose();

	assert!(call.sync(None).unwrap_err().is_use_after_dispose());
}
