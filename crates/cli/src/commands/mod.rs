//! Command dispatch.

mod attach;
mod inventory;
mod process;

use frida::Version;

use crate::backend::Engine;
use crate::cli::{Cli, Commands};
use crate::error::Result;
use crate::output::{self, OutputFormat, ResultBuilder, VersionData};

pub async fn dispatch(cli: Cli) -> Result<()> {
	let Cli {
		format,
		backend,
		library,
		device,
		command,
		..
	} = cli;

	let engine = Engine::open(backend, library.as_deref())?;
	let outcome = run(&engine, device.as_deref(), command, format).await;
	engine.close();
	outcome
}

async fn run(engine: &Engine, device: Option<&str>, command: Commands, format: OutputFormat) -> Result<()> {
	match command {
		Commands::Version => version(engine, format),
		Commands::Devices => inventory::devices(engine, format).await,
		Commands::Ps(args) => inventory::processes(engine, device, args, format).await,
		Commands::Apps(args) => inventory::applications(engine, device, args, format).await,
		Commands::Spawn(args) => process::spawn(engine, device, args, format).await,
		Commands::Kill(args) => process::kill(engine, device, args, format).await,
		Commands::Resume(args) => process::resume(engine, device, args, format).await,
		Commands::Attach(args) => attach::run(engine, device, args, format).await,
	}
}

fn version(engine: &Engine, format: OutputFormat) -> Result<()> {
	let Version { major, minor, micro, .. } = engine.frida().version()?;
	let data = VersionData {
		engine: engine.frida().version_string(),
		major,
		minor,
		micro,
		cli: env!("CARGO_PKG_VERSION").to_owned(),
	};
	output::print_result(&ResultBuilder::new("version").data(data).build(), format);
	Ok(())
}
