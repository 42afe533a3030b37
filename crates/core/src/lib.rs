//! frida-host - Rust bindings for a dynamic instrumentation engine
//!
//! Devices, processes, sessions and injectable scripts as disposable Rust
//! objects. Every object owns exactly one native handle and releases it
//! exactly once, on [`Disposable::dispose`] or on drop. Every operation
//! that may block is a [`Call`] that can be started with a completion
//! callback, run to completion on the calling thread, or awaited.
//!
//! # Example
//!
//! ```ignore
//! use frida::{DeviceManager, Frida, SessionOptions, ScriptOptions};
//!
//! let frida = Frida::load(None)?;
//! let manager = DeviceManager::new(&frida)?;
//! let device = manager.local_device()?;
//! let session = device.attach(2048, &SessionOptions::new())?.sync(None)?;
//! let script = session
//! 	.create_script("send('hello');", &ScriptOptions::new())?
//! 	.sync(None)?;
//! let _sub = script.on_message(|message, _data| println!("{message:?}"))?;
//! script.load().sync(None)?;
//! ```

#[macro_use]
mod macros;

mod application;
mod device;
mod device_manager;
mod events;
mod frida;
mod lists;
mod options;
mod process;
mod script;
mod session;
mod spawn;

pub use application::Application;
pub use device::Device;
pub use device_manager::DeviceManager;
pub use frida::Frida;
pub use lists::{ApplicationList, ChildList, DeviceList, ProcessList, SpawnList};
pub use options::{ApplicationQueryOptions, FrontmostQueryOptions};
pub use process::Process;
pub use script::{MessageStream, Script};
pub use session::Session;
pub use spawn::{Child, Spawn};

// Re-export key types at crate root
pub use frida_protocol::{
	ChildOrigin, CrashReport, DetachEvent, DetachReason, DeviceType, LogLevel, ProcessMatchOptions,
	ProcessQueryOptions, Realm, RemoteDeviceOptions, Scope, ScriptMessage, ScriptOptions, ScriptRuntime,
	SessionOptions, SpawnOptions, Stdio, Version,
};
pub use frida_runtime::{
	AsyncResult, Call, CancelHandler, Cancellable, Core, Disposable, Error, NativeCore, NativeErrorCode, Result,
	Subscription,
};

/// The in-process simulated engine.
#[cfg(feature = "sim")]
pub use frida_runtime::sim;
