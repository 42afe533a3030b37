use std::path::PathBuf;

use clap::Parser;

use super::*;

#[test]
fn parse_global_flags_after_subcommand() {
	let cli =
		Cli::try_parse_from(["frida-host", "ps", "-vv", "--backend", "sim", "-f", "json", "-D", "usb-1"]).unwrap();

	assert_eq!(cli.verbose, 2);
	assert_eq!(cli.backend, Backend::Sim);
	assert_eq!(cli.format, OutputFormat::Json);
	assert_eq!(cli.device.as_deref(), Some("usb-1"));
	assert_eq!(cli.command.name(), "ps");
}

#[test]
fn parse_spawn_with_trailing_args() {
	let cli = Cli::try_parse_from([
		"frida-host",
		"spawn",
		"-e",
		"LANG=C",
		"--resume",
		"/bin/sh",
		"-c",
		"echo hi",
	])
	.unwrap();

	match cli.command {
		Commands::Spawn(args) => {
			assert_eq!(args.program, "/bin/sh");
			assert_eq!(args.args, ["-c", "echo hi"]);
			assert_eq!(args.env, [("LANG".to_owned(), "C".to_owned())]);
			assert!(args.resume);
		}
		_ => panic!("Expected Spawn command"),
	}
}

#[test]
fn parse_env_var_requires_key() {
	assert!(Cli::try_parse_from(["frida-host", "spawn", "-e", "=x", "/bin/sh"]).is_err());
	assert!(Cli::try_parse_from(["frida-host", "spawn", "-e", "NOEQUALS", "/bin/sh"]).is_err());
	assert_eq!(parse_env_var("A=b=c").unwrap(), ("A".to_owned(), "b=c".to_owned()));
}

#[test]
fn parse_attach_by_name_with_script_file() {
	let cli =
		Cli::try_parse_from(["frida-host", "attach", "python3", "-s", "agent.js", "--duration-ms", "500"]).unwrap();

	match cli.command {
		Commands::Attach(args) => {
			assert_eq!(args.target, ProcessTarget::Name("python3".into()));
			assert_eq!(args.script, Some(PathBuf::from("agent.js")));
			assert_eq!(args.eval, None);
			assert_eq!(args.duration_ms, Some(500));
		}
		_ => panic!("Expected Attach command"),
	}
}

#[test]
fn parse_attach_needs_exactly_one_source() {
	assert!(Cli::try_parse_from(["frida-host", "attach", "2048"]).is_err());
	assert!(Cli::try_parse_from(["frida-host", "attach", "2048", "-s", "a.js", "-e", "send(1)"]).is_err());
	assert!(Cli::try_parse_from(["frida-host", "attach", "2048", "-e", "send(1)"]).is_ok());
}

#[test]
fn parse_process_target() {
	assert_eq!("2048".parse::<ProcessTarget>().unwrap(), ProcessTarget::Pid(2048));
	assert_eq!("zsh".parse::<ProcessTarget>().unwrap(), ProcessTarget::Name("zsh".into()));
	assert_eq!("7zip".parse::<ProcessTarget>().unwrap(), ProcessTarget::Name("7zip".into()));
	assert!("0".parse::<ProcessTarget>().is_err());
	assert!("99999999999".parse::<ProcessTarget>().is_err());
	assert!("".parse::<ProcessTarget>().is_err());
}

#[test]
fn default_format_is_text() {
	let cli = Cli::try_parse_from(["frida-host", "version"]).unwrap();
	assert_eq!(cli.format, OutputFormat::Text);
	assert_eq!(cli.verbose, 0);
}
