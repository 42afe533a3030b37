//! End-to-end runs of the binary against the simulated engine.

use std::path::PathBuf;
use std::process::Command;

use serde_json::Value;

fn binary() -> PathBuf {
	let mut path = std::env::current_exe().unwrap();
	path.pop();
	path.pop();
	path.push("frida-host");
	path
}

struct Run {
	status: i32,
	/// Every JSON document printed on stdout, in order.
	documents: Vec<Value>,
	stderr: String,
}

impl Run {
	fn envelope(&self) -> &Value {
		self.documents.last().expect("no output on stdout")
	}
}

fn run(args: &[&str]) -> Run {
	let output = Command::new(binary())
		.args(["--backend", "sim", "-f", "json"])
		.args(args)
		.env_remove("RUST_LOG")
		.output()
		.expect("failed to execute frida-host");

	let stdout = String::from_utf8_lossy(&output.stdout).to_string();
	let documents = serde_json::Deserializer::from_str(&stdout)
		.into_iter::<Value>()
		.collect::<Result<_, _>>()
		.unwrap_or_else(|e| panic!("stdout is not JSON ({e}): {stdout}"));
	Run {
		status: output.status.code().unwrap_or(-1),
		documents,
		stderr: String::from_utf8_lossy(&output.stderr).to_string(),
	}
}

#[test]
fn version_reports_engine() {
	let out = run(&["version"]);
	assert_eq!(out.status, 0, "stderr: {}", out.stderr);
	let envelope = out.envelope();
	assert_eq!(envelope["ok"], true);
	assert_eq!(envelope["command"], "version");
	assert_eq!(envelope["data"]["engine"], "17.2.15");
}

#[test]
fn devices_lists_the_simulated_world() {
	let out = run(&["devices"]);
	assert_eq!(out.status, 0, "stderr: {}", out.stderr);
	let devices = out.envelope()["data"]["devices"].as_array().unwrap().clone();
	let types: Vec<&str> = devices.iter().map(|d| d["type"].as_str().unwrap()).collect();
	assert_eq!(types, ["local", "remote", "usb"]);
}

#[test]
fn ps_filters_by_pattern() {
	let out = run(&["ps", "py*", "--details"]);
	assert_eq!(out.status, 0, "stderr: {}", out.stderr);
	let processes = &out.envelope()["data"]["processes"];
	assert_eq!(processes.as_array().unwrap().len(), 1);
	assert_eq!(processes[0]["pid"], 3141);
	assert_eq!(processes[0]["parameters"]["path"], "/usr/bin/python3");
}

#[test]
fn apps_on_usb_device() {
	let out = run(&["-D", "usb-1a2b3c", "apps"]);
	assert_eq!(out.status, 0, "stderr: {}", out.stderr);
	let apps = out.envelope()["data"]["applications"].as_array().unwrap().clone();
	assert_eq!(apps.len(), 2);
	assert_eq!(apps[0]["identifier"], "com.example.notes");
	assert_eq!(apps[0]["pid"], 2100);
	assert!(apps[1].get("pid").is_none());
}

#[test]
fn spawn_and_resume() {
	let out = run(&["spawn", "--resume", "/bin/sh", "-c", "true"]);
	assert_eq!(out.status, 0, "stderr: {}", out.stderr);
	let data = &out.envelope()["data"];
	assert_eq!(data["pid"], 4000);
	assert_eq!(data["resumed"], true);
}

#[test]
fn spawn_missing_program_fails_with_native_code() {
	let out = run(&["spawn", "/no/such/program"]);
	assert_eq!(out.status, 1);
	let error = &out.envelope()["error"];
	assert_eq!(out.envelope()["ok"], false);
	assert_eq!(error["code"], "NATIVE_FAILURE");
	assert_eq!(error["details"]["code"], "executable-not-found");
	assert!(out.stderr.contains("NATIVE_FAILURE"));
}

#[test]
fn kill_init_is_denied() {
	let out = run(&["kill", "init"]);
	assert_eq!(out.status, 1);
	assert_eq!(out.envelope()["error"]["code"], "PERMISSION_DENIED");
}

#[test]
fn unknown_device_is_reported() {
	let out = run(&["-D", "usb-ffff", "ps"]);
	assert_eq!(out.status, 1);
	assert_eq!(out.envelope()["error"]["code"], "DEVICE_NOT_FOUND");
	assert_eq!(out.envelope()["command"], "ps");
}

#[test]
fn attach_streams_messages_then_envelope() {
	let out = run(&[
		"attach",
		"zsh",
		"-e",
		r#"send("hello"); send({"n": 2});"#,
		"--name",
		"probe",
		"--duration-ms",
		"300",
	]);
	assert_eq!(out.status, 0, "stderr: {}", out.stderr);

	let (envelope, lines) = out.documents.split_last().unwrap();
	let payloads: Vec<&Value> = lines.iter().map(|line| &line["message"]["payload"]).collect();
	assert_eq!(payloads, [&Value::from("hello"), &serde_json::json!({"n": 2})]);

	assert_eq!(envelope["data"]["pid"], 2048);
	assert_eq!(envelope["data"]["script"], "probe");
	assert_eq!(envelope["data"]["messages"], 2);
	assert!(envelope["data"].get("detachReason").is_none());
}

#[test]
fn attach_reads_script_file() {
	let dir = tempfile::tempdir().unwrap();
	let script = dir.path().join("agent.js");
	std::fs::write(&script, "send('from file');").unwrap();

	let out = run(&["attach", "2048", "-s", script.to_str().unwrap(), "--duration-ms", "300"]);
	assert_eq!(out.status, 0, "stderr: {}", out.stderr);
	assert_eq!(out.documents[0]["message"]["payload"], "from file");
}

#[test]
fn attach_with_broken_script_is_invalid_input() {
	let out = run(&["attach", "2048", "-e", "send(1;", "--duration-ms", "100"]);
	assert_eq!(out.status, 1);
	assert_eq!(out.envelope()["error"]["code"], "INVALID_INPUT");
}

#[test]
fn attach_missing_script_file_fails() {
	let dir = tempfile::tempdir().unwrap();
	let missing = dir.path().join("missing.js");
	let out = run(&["attach", "2048", "-s", missing.to_str().unwrap()]);
	assert_eq!(out.status, 1);
	assert!(out.envelope()["error"]["message"].as_str().unwrap().contains("missing.js"));
}
