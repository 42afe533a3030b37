use frida_runtime::Result;
use serde_json::{Map, Value};

native_object! {
	/// A process running on a device, as seen when it was enumerated.
	Process => Process, list = ProcessList
}

impl Process {
	pub fn pid(&self) -> Result<u32> {
		self.owned.get("pid")
	}

	pub fn name(&self) -> Result<String> {
		self.owned.get("name")
	}

	/// Extra metadata, populated according to the query's scope.
	pub fn parameters(&self) -> Result<Map<String, Value>> {
		self.owned.get("parameters")
	}
}
