use frida_runtime::Result;
use serde_json::{Map, Value};

native_object! {
	/// An installed application.
	Application => Application, list = ApplicationList
}

impl Application {
	pub fn identifier(&self) -> Result<String> {
		self.owned.get("identifier")
	}

	pub fn name(&self) -> Result<String> {
		self.owned.get("name")
	}

	/// Pid of the running instance, or 0 when not running.
	pub fn pid(&self) -> Result<u32> {
		self.owned.get("pid")
	}

	pub fn is_running(&self) -> Result<bool> {
		Ok(self.pid()? != 0)
	}

	pub fn parameters(&self) -> Result<Map<String, Value>> {
		self.owned.get("parameters")
	}
}
