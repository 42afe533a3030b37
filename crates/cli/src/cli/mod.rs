#[cfg(test)]
mod tests;

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use clap::builder::Styles;
use clap::builder::styling::AnsiColor;
use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::output::OutputFormat;

/// Root CLI.
#[derive(Parser, Debug)]
#[command(name = "frida-host")]
#[command(about = "Inspect devices and processes, spawn programs and inject scripts")]
#[command(version)]
#[command(styles = help_styles())]
pub struct Cli {
	/// Increase verbosity (-v info, -vv debug)
	#[arg(short, long, global = true, action = clap::ArgAction::Count)]
	pub verbose: u8,

	/// Output format
	#[arg(short = 'f', long, global = true, value_enum, default_value = "text")]
	pub format: OutputFormat,

	/// Engine to drive: the native library or the built-in simulator
	#[arg(long, global = true, value_enum, env = "FRIDA_HOST_BACKEND", default_value = "library")]
	pub backend: Backend,

	/// Native library to load instead of searching for one
	#[arg(long, global = true, value_name = "PATH", env = "FRIDA_HOST_LIBRARY")]
	pub library: Option<PathBuf>,

	/// Device id (defaults to the local system)
	#[arg(short = 'D', long, global = true, value_name = "ID")]
	pub device: Option<String>,

	#[command(subcommand)]
	pub command: Commands,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum Backend {
	/// Load libfrida-host
	#[default]
	Library,
	/// In-process simulated engine
	Sim,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
	/// Show the engine version.
	Version,
	/// List connected devices.
	Devices,
	/// List running processes.
	Ps(PsArgs),
	/// List installed applications.
	Apps(AppsArgs),
	/// Launch a program suspended.
	Spawn(SpawnArgs),
	/// Kill a process.
	Kill(TargetArgs),
	/// Resume a suspended process.
	Resume(ResumeArgs),
	/// Attach to a process, load a script and print its messages.
	Attach(AttachArgs),
}

impl Commands {
	/// Name used in result envelopes.
	pub fn name(&self) -> &'static str {
		match self {
			Commands::Version => "version",
			Commands::Devices => "devices",
			Commands::Ps(_) => "ps",
			Commands::Apps(_) => "apps",
			Commands::Spawn(_) => "spawn",
			Commands::Kill(_) => "kill",
			Commands::Resume(_) => "resume",
			Commands::Attach(_) => "attach",
		}
	}
}

#[derive(Args, Debug, Clone)]
pub struct PsArgs {
	/// Only processes whose name matches this glob
	#[arg(value_name = "PATTERN")]
	pub pattern: Option<String>,

	/// Include process parameters (path, user, ...)
	#[arg(short, long)]
	pub details: bool,
}

#[derive(Args, Debug, Clone)]
pub struct AppsArgs {
	/// Only these application identifiers
	#[arg(value_name = "IDENTIFIER")]
	pub identifiers: Vec<String>,

	/// Include application parameters (version, build, ...)
	#[arg(short, long)]
	pub details: bool,
}

#[derive(Args, Debug, Clone)]
pub struct SpawnArgs {
	/// Executable path, or application identifier on mobile devices
	#[arg(value_name = "PROGRAM")]
	pub program: String,

	/// Arguments passed to the program
	#[arg(value_name = "ARGS", trailing_var_arg = true, allow_hyphen_values = true)]
	pub args: Vec<String>,

	/// Extra environment variable (repeatable)
	#[arg(short, long = "env", value_name = "KEY=VALUE", value_parser = parse_env_var)]
	pub env: Vec<(String, String)>,

	/// Working directory
	#[arg(long, value_name = "DIR")]
	pub cwd: Option<String>,

	/// Resume the process right away
	#[arg(long)]
	pub resume: bool,
}

#[derive(Args, Debug, Clone)]
pub struct TargetArgs {
	/// Process id or name
	#[arg(value_name = "PID|NAME")]
	pub target: ProcessTarget,
}

#[derive(Args, Debug, Clone)]
pub struct ResumeArgs {
	#[arg(value_name = "PID")]
	pub pid: u32,
}

#[derive(Args, Debug, Clone)]
pub struct AttachArgs {
	/// Process id or name
	#[arg(value_name = "PID|NAME")]
	pub target: ProcessTarget,

	/// Script file to load
	#[arg(short, long, value_name = "FILE", conflicts_with = "eval", required_unless_present = "eval")]
	pub script: Option<PathBuf>,

	/// Inline script source
	#[arg(short, long, value_name = "SOURCE")]
	pub eval: Option<String>,

	/// Script name shown by the engine
	#[arg(long, value_name = "NAME")]
	pub name: Option<String>,

	/// Stop after this many milliseconds instead of waiting for Ctrl-C
	#[arg(long, value_name = "MS")]
	pub duration_ms: Option<u64>,
}

/// A process given on the command line, by pid or by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessTarget {
	Pid(u32),
	Name(String),
}

impl FromStr for ProcessTarget {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		if s.is_empty() {
			return Err("process target must not be empty".into());
		}
		if s.bytes().all(|b| b.is_ascii_digit()) {
			return match s.parse() {
				Ok(0) | Err(_) => Err(format!("invalid pid: {s}")),
				Ok(pid) => Ok(ProcessTarget::Pid(pid)),
			};
		}
		Ok(ProcessTarget::Name(s.to_owned()))
	}
}

impl fmt::Display for ProcessTarget {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ProcessTarget::Pid(pid) => write!(f, "{pid}"),
			ProcessTarget::Name(name) => f.write_str(name),
		}
	}
}

fn parse_env_var(s: &str) -> Result<(String, String), String> {
	match s.split_once('=') {
		Some((key, value)) if !key.is_empty() => Ok((key.to_owned(), value.to_owned())),
		_ => Err(format!("expected KEY=VALUE, got '{s}'")),
	}
}

fn help_styles() -> Styles {
	Styles::styled()
		.header(AnsiColor::Yellow.on_default().bold())
		.usage(AnsiColor::Yellow.on_default().bold())
		.literal(AnsiColor::Green.on_default())
		.placeholder(AnsiColor::Blue.on_default())
}
