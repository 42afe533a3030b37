//! Diagnostic logging on stderr. `RUST_LOG` overrides the level chosen by
//! `-v`.

use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is unset.
pub fn default_filter(verbosity: u8) -> &'static str {
	match verbosity {
		0 => "error",
		// Handle traffic from the runtime is debug noise even at -v.
		1 => "info,frida_runtime=warn",
		_ => "debug",
	}
}

pub fn init_logging(verbosity: u8) {
	let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter(verbosity)));

	tracing_subscriber::fmt()
		.with_env_filter(env_filter)
		.with_writer(std::io::stderr)
		.with_target(verbosity > 1)
		.compact()
		.init();
}
