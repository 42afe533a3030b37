//! `attach`: inject a script and stream what it sends.

use std::time::Duration;

use anyhow::Context as _;
use frida::{DetachEvent, ScriptOptions, SessionOptions};
use futures_util::StreamExt;
use tokio::sync::mpsc;

use crate::backend::{Engine, resolve_pid};
use crate::cli::AttachArgs;
use crate::error::{CliError, Result};
use crate::output::{self, AttachData, OutputFormat, ResultBuilder};

/// How long to wait for the detach reason once the script's message
/// stream has ended.
const DETACH_GRACE: Duration = Duration::from_millis(250);

pub async fn run(engine: &Engine, device: Option<&str>, args: AttachArgs, format: OutputFormat) -> Result<()> {
	let source = match (&args.script, &args.eval) {
		(Some(path), _) => {
			std::fs::read_to_string(path).with_context(|| format!("failed to read script {}", path.display()))?
		}
		(None, Some(source)) => source.clone(),
		(None, None) => return Err(CliError::InvalidInput("either --script or --eval is required".into())),
	};

	let device = engine.device(device).await?;
	let pid = resolve_pid(&device, &args.target).await?;
	let session = device.attach(pid, &SessionOptions::new())?.await?;

	let (detached_tx, mut detached_rx) = mpsc::unbounded_channel::<DetachEvent>();
	let _detached = session.on_detached(move |event| {
		let _ = detached_tx.send(event);
	})?;

	let mut options = ScriptOptions::new();
	if let Some(name) = &args.name {
		options = options.name(name);
	}
	let script = session.create_script(&source, &options)?.await?;
	let mut messages = script.messages()?;
	script.load().await?;
	let script_name = script.name()?;
	tracing::info!(pid, script = %script_name, "Script loaded");

	let stop = async {
		match args.duration_ms {
			Some(ms) => tokio::time::sleep(Duration::from_millis(ms)).await,
			None => std::future::pending().await,
		}
	};
	tokio::pin!(stop);

	let mut count = 0;
	let mut detach = None;
	loop {
		tokio::select! {
			message = messages.next() => match message {
				Some((message, data)) => {
					count += 1;
					output::print_message(&message, data.as_deref(), format);
				}
				None => {
					// The script is gone; the session's detach signal follows.
					detach = tokio::time::timeout(DETACH_GRACE, detached_rx.recv()).await.ok().flatten();
					break;
				}
			},
			Some(event) = detached_rx.recv() => {
				detach = Some(event);
				break;
			}
			_ = &mut stop => break,
			_ = tokio::signal::ctrl_c() => {
				tracing::info!("Interrupted");
				break;
			}
		}
	}

	if detach.is_none() && !session.is_detached()? {
		session.detach().await?;
	}

	let (detach_reason, crash) = match detach {
		Some(DetachEvent { reason, crash }) => (Some(reason), crash),
		None => (None, None),
	};
	let data = AttachData {
		pid,
		script: script_name,
		messages: count,
		detach_reason,
		crash,
	};
	output::print_result(&ResultBuilder::new("attach").data(data).build(), format);
	Ok(())
}
