use frida_protocol::{DetachEvent, ScriptOptions};
use frida_runtime::{Call, Error, Result, Subscription, encode_bytes};
use serde_json::{Value, json};

use crate::{Script, events};

native_object! {
	/// An attachment to one process.
	///
	/// A session is attached until it detaches, either through
	/// [`detach`](Self::detach) or because the process, connection or
	/// device went away. Every operation on a detached session fails.
	/// Disposing an attached session detaches it.
	Session => Session
}

impl Session {
	pub fn pid(&self) -> Result<u32> {
		self.owned.get("pid")
	}

	pub fn is_detached(&self) -> Result<bool> {
		self.owned.get("is_detached")
	}

	/// Seconds the session survives a lost connection; 0 when not persistent.
	pub fn persist_timeout(&self) -> Result<u32> {
		self.owned.get("persist_timeout")
	}

	pub fn detach(&self) -> Call<()> {
		Call::new(&self.owned, "detach", Value::Null)
	}

	/// Resumes a persistent session after reconnecting.
	pub fn resume(&self) -> Call<()> {
		Call::new(&self.owned, "resume", Value::Null)
	}

	pub fn enable_child_gating(&self) -> Call<()> {
		Call::new(&self.owned, "enable_child_gating", Value::Null)
	}

	pub fn disable_child_gating(&self) -> Call<()> {
		Call::new(&self.owned, "disable_child_gating", Value::Null)
	}

	/// Creates a script from JavaScript source. The script is not loaded.
	pub fn create_script(&self, source: &str, options: &ScriptOptions) -> Result<Call<Script>> {
		let options = serde_json::to_value(options)?;
		Ok(Call::new(
			&self.owned,
			"create_script",
			json!({ "source": source, "options": options }),
		))
	}

	/// Creates a script from bytecode produced by [`compile_script`](Self::compile_script).
	pub fn create_script_from_bytes(&self, bytes: &[u8], options: &ScriptOptions) -> Result<Call<Script>> {
		if bytes.is_empty() {
			return Err(Error::InvalidArgument("script bytecode must not be empty".into()));
		}
		let options = serde_json::to_value(options)?;
		Ok(Call::new(
			&self.owned,
			"create_script_from_bytes",
			json!({ "bytes": encode_bytes(bytes), "options": options }),
		))
	}

	/// Compiles JavaScript source to bytecode without creating a script.
	pub fn compile_script(&self, source: &str, options: &ScriptOptions) -> Result<Call<Vec<u8>>> {
		let options = serde_json::to_value(options)?;
		Ok(Call::new(
			&self.owned,
			"compile_script",
			json!({ "source": source, "options": options }),
		))
	}

	/// Calls `handler` once the session detaches, with the reason and, for
	/// a crashed process, its crash report.
	pub fn on_detached<F>(&self, handler: F) -> Result<Subscription>
	where
		F: Fn(DetachEvent) + Send + Sync + 'static,
	{
		events::on_value(&self.owned, "detached", handler)
	}
}
