//! Read-only listings: devices, processes, applications.

use frida::{ApplicationQueryOptions, Disposable, ProcessQueryOptions, Scope};

use crate::backend::Engine;
use crate::cli::{AppsArgs, PsArgs};
use crate::error::{CliError, Result};
use crate::output::{
	self, ApplicationRow, ApplicationsData, DeviceRow, DevicesData, OutputFormat, ProcessRow, ProcessesData,
	ResultBuilder,
};

fn scope(details: bool) -> Scope {
	if details { Scope::Metadata } else { Scope::Minimal }
}

pub async fn devices(engine: &Engine, format: OutputFormat) -> Result<()> {
	let list = engine.manager().enumerate_devices().await?;
	let mut devices = Vec::new();
	for device in &list {
		let device = device?;
		devices.push(DeviceRow {
			id: device.id()?,
			name: device.name()?,
			kind: device.kind()?,
		});
	}
	list.dispose();

	output::print_result(&ResultBuilder::new("devices").data(DevicesData { devices }).build(), format);
	Ok(())
}

pub async fn processes(engine: &Engine, device: Option<&str>, args: PsArgs, format: OutputFormat) -> Result<()> {
	let device = engine.device(device).await?;
	let pattern = args
		.pattern
		.as_deref()
		.map(glob_matcher)
		.transpose()?;

	let options = ProcessQueryOptions::new().scope(scope(args.details));
	let list = device.enumerate_processes(&options)?.await?;
	let mut processes = Vec::new();
	for process in &list {
		let process = process?;
		let name = process.name()?;
		if pattern.as_ref().is_some_and(|pattern| !pattern.matches(&name)) {
			continue;
		}
		processes.push(ProcessRow {
			pid: process.pid()?,
			name,
			parameters: process.parameters()?,
		});
	}
	tracing::debug!(count = processes.len(), "Listed processes");

	let data = ProcessesData {
		device: device.id()?,
		processes,
	};
	output::print_result(&ResultBuilder::new("ps").data(data).build(), format);
	Ok(())
}

pub async fn applications(engine: &Engine, device: Option<&str>, args: AppsArgs, format: OutputFormat) -> Result<()> {
	let device = engine.device(device).await?;
	let options = ApplicationQueryOptions::new(engine.frida())?;
	for identifier in &args.identifiers {
		options.select_identifier(identifier)?;
	}
	options.set_scope(scope(args.details))?;

	let list = device.enumerate_applications(Some(&options)).await?;
	let mut applications = Vec::new();
	for app in &list {
		let app = app?;
		let pid = app.pid()?;
		applications.push(ApplicationRow {
			identifier: app.identifier()?,
			name: app.name()?,
			pid: (pid != 0).then_some(pid),
			parameters: app.parameters()?,
		});
	}

	let data = ApplicationsData {
		device: device.id()?,
		applications,
	};
	output::print_result(&ResultBuilder::new("apps").data(data).build(), format);
	Ok(())
}

fn glob_matcher(pattern: &str) -> Result<glob::Pattern> {
	glob::Pattern::new(pattern).map_err(|e| CliError::InvalidInput(format!("invalid process pattern '{pattern}': {e}")))
}

#[cfg(test)]
mod tests {
	use super::*;

	fn matches(pattern: &str, name: &str) -> bool {
		glob_matcher(pattern).unwrap().matches(name)
	}

	#[test]
	fn test_wildcards() {
		assert!(matches("*", "zsh"));
		assert!(matches("s*", "sshd"));
		assert!(!matches("s*", "zsh"));
		assert!(matches("py*3", "python3"));
		assert!(matches("?sh", "zsh"));
		assert!(!matches("?sh", "bash"));
		assert!(matches("[sz]sh*", "sshd"));
		assert!(!matches("python", "python3"));
	}

	#[test]
	fn test_malformed_pattern_rejected() {
		assert!(matches!(glob_matcher("[py"), Err(CliError::InvalidInput(_))));
	}
}
