//! Process control: spawn, kill, resume.

use frida::SpawnOptions;

use crate::backend::{Engine, resolve_pid};
use crate::cli::{ResumeArgs, SpawnArgs, TargetArgs};
use crate::error::Result;
use crate::output::{self, OutputFormat, ProcessActionData, ResultBuilder};

pub async fn spawn(engine: &Engine, device: Option<&str>, args: SpawnArgs, format: OutputFormat) -> Result<()> {
	let device = engine.device(device).await?;

	let mut options = SpawnOptions::new();
	if !args.args.is_empty() {
		options = options.argv(std::iter::once(args.program.clone()).chain(args.args));
	}
	for (key, value) in args.env {
		options = options.env_var(key, value);
	}
	if let Some(cwd) = args.cwd {
		options = options.cwd(cwd);
	}

	let pid = device.spawn(&args.program, &options)?.await?;
	tracing::info!(program = %args.program, pid, "Spawned");
	if args.resume {
		device.resume(pid)?.await?;
	}

	let data = ProcessActionData {
		action: "spawn",
		pid,
		resumed: args.resume,
	};
	output::print_result(&ResultBuilder::new("spawn").data(data).build(), format);
	Ok(())
}

pub async fn kill(engine: &Engine, device: Option<&str>, args: TargetArgs, format: OutputFormat) -> Result<()> {
	let device = engine.device(device).await?;
	let pid = resolve_pid(&device, &args.target).await?;
	device.kill(pid)?.await?;

	let data = ProcessActionData {
		action: "kill",
		pid,
		resumed: false,
	};
	output::print_result(&ResultBuilder::new("kill").data(data).build(), format);
	Ok(())
}

pub async fn resume(engine: &Engine, device: Option<&str>, args: ResumeArgs, format: OutputFormat) -> Result<()> {
	let device = engine.device(device).await?;
	device.resume(args.pid)?.await?;

	let data = ProcessActionData {
		action: "resume",
		pid: args.pid,
		resumed: true,
	};
	output::print_result(&ResultBuilder::new("resume").data(data).build(), format);
	Ok(())
}
