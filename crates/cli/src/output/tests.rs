use super::*;

fn rendered(data: &impl Render) -> String {
	colored::control::set_override(false);
	let mut out = Vec::new();
	data.render(&mut out).unwrap();
	String::from_utf8(out).unwrap()
}

#[test]
fn result_builder_success() {
	let result = ResultBuilder::new("resume")
		.data(ProcessActionData {
			action: "resume",
			pid: 4000,
			resumed: false,
		})
		.build();

	assert!(result.ok);
	assert_eq!(result.command, "resume");
	assert!(result.error.is_none());
	assert!(result.duration_ms.is_some());
}

#[test]
fn result_builder_error() {
	let result: CommandResult<()> = ResultBuilder::new("attach")
		.error(ErrorCode::PermissionDenied, "unable to access process with pid 1")
		.build();

	assert!(!result.ok);
	assert!(result.data.is_none());
	assert_eq!(result.error.as_ref().unwrap().code, ErrorCode::PermissionDenied);
}

#[test]
fn envelope_serializes_camel_case() {
	let result = ResultBuilder::new("attach")
		.data(AttachData {
			pid: 3141,
			script: "agent".into(),
			messages: 2,
			detach_reason: Some(DetachReason::ProcessTerminated),
			crash: None,
		})
		.build();
	let value = serde_json::to_value(&result).unwrap();

	assert_eq!(value["ok"], true);
	assert_eq!(value["data"]["detachReason"], "process-terminated");
	assert!(value["data"].get("crash").is_none());
	assert!(value.get("error").is_none());
	assert!(value["durationMs"].is_u64());
}

#[test]
fn error_code_display_matches_serde() {
	for code in [ErrorCode::EngineUnavailable, ErrorCode::NativeFailure, ErrorCode::DeviceNotFound] {
		assert_eq!(serde_json::to_value(code).unwrap(), code.to_string());
	}
}

#[test]
fn output_format_parse() {
	assert_eq!("json".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
	assert_eq!("TEXT".parse::<OutputFormat>().unwrap(), OutputFormat::Text);
	assert!("toon".parse::<OutputFormat>().is_err());
}

#[test]
fn message_json_handles_every_shape() {
	let send = ScriptMessage::parse(r#"{"type":"send","payload":{"n":1}}"#);
	let line = message_json(&send, Some(&[1, 2, 3]));
	assert_eq!(line["message"]["type"], "send");
	assert_eq!(line["message"]["payload"]["n"], 1);
	assert_eq!(line["dataLength"], 3);

	let raw = ScriptMessage::parse("not json");
	let line = message_json(&raw, None);
	assert_eq!(line["message"], json!({ "type": "raw", "text": "not json" }));
	assert!(line["dataLength"].is_null());
}

#[test]
fn processes_render_as_table() {
	let mut parameters = Map::new();
	parameters.insert("path".into(), json!("/usr/bin/zsh"));
	let data = ProcessesData {
		device: "local".into(),
		processes: vec![
			ProcessRow {
				pid: 1,
				name: "init".into(),
				parameters: Map::new(),
			},
			ProcessRow {
				pid: 2048,
				name: "zsh".into(),
				parameters,
			},
		],
	};

	let text = rendered(&data);
	let lines: Vec<&str> = text.lines().collect();
	assert_eq!(lines[0], "    PID  NAME");
	assert_eq!(lines[1], "      1  init");
	assert_eq!(lines[2], "   2048  zsh  /usr/bin/zsh");
}

#[test]
fn stopped_applications_show_no_pid() {
	let data = ApplicationsData {
		device: "usb".into(),
		applications: vec![ApplicationRow {
			identifier: "com.example.camera".into(),
			name: "Camera".into(),
			pid: None,
			parameters: Map::new(),
		}],
	};
	assert!(rendered(&data).lines().nth(1).unwrap().trim_start().starts_with("-  Camera"));
	assert!(serde_json::to_value(&data).unwrap()["applications"][0].get("pid").is_none());
}
