//! Process-wide engine lifecycle.

use std::fmt;

use frida_protocol::Version;
use frida_runtime::{Core, Error, NativeErrorCode, Result};

/// An initialized engine.
///
/// The engine has process-wide state: [`init`](Self::init) must succeed
/// before any other object is created, and [`deinit`](Self::deinit) must be
/// called after the last one is gone. Initializing twice without
/// deinitializing in between fails with [`Error::Lifecycle`].
pub struct Frida {
	core: Core,
}

impl Frida {
	/// Initializes the engine behind `core`.
	pub fn init(core: Core) -> Result<Self> {
		core.init().map_err(|err| match err.code {
			NativeErrorCode::InvalidOperation => Error::Lifecycle(err.message),
			_ => Error::from(err),
		})?;
		tracing::info!(version = %core.version(), "Engine initialized");
		Ok(Self { core })
	}

	/// Locates and loads the native library, then initializes it.
	///
	/// See [`frida_runtime::locate_library`] for the search order. Failing
	/// to find or load the library is fatal.
	#[cfg(feature = "dylib")]
	pub fn load(library: Option<&std::path::Path>) -> Result<Self> {
		Self::init(frida_runtime::load_library(library)?)
	}

	pub fn core(&self) -> &Core {
		&self.core
	}

	pub fn version(&self) -> Result<Version> {
		self.core.version().parse().map_err(Error::Protocol)
	}

	pub fn version_string(&self) -> String {
		self.core.version()
	}

	/// Shuts the engine down.
	pub fn deinit(self) {
		self.core.deinit();
		tracing::info!("Engine deinitialized");
	}
}

impl fmt::Debug for Frida {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Frida").field("version", &self.core.version()).finish()
	}
}
