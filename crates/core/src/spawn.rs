//! Processes held suspended by spawn or child gating.

use std::collections::BTreeMap;

use frida_protocol::ChildOrigin;
use frida_runtime::Result;

native_object! {
	/// A process caught by spawn gating, waiting to be resumed.
	Spawn => Spawn, list = SpawnList
}

impl Spawn {
	pub fn pid(&self) -> Result<u32> {
		self.owned.get("pid")
	}

	pub fn identifier(&self) -> Result<Option<String>> {
		self.owned.get("identifier")
	}
}

native_object! {
	/// A child process caught by child gating, waiting to be resumed.
	Child => Child, list = ChildList
}

impl Child {
	pub fn pid(&self) -> Result<u32> {
		self.owned.get("pid")
	}

	pub fn parent_pid(&self) -> Result<u32> {
		self.owned.get("parent_pid")
	}

	pub fn origin(&self) -> Result<ChildOrigin> {
		self.owned.get("origin")
	}

	pub fn identifier(&self) -> Result<Option<String>> {
		self.owned.get("identifier")
	}

	pub fn path(&self) -> Result<Option<String>> {
		self.owned.get("path")
	}

	pub fn argv(&self) -> Result<Option<Vec<String>>> {
		self.owned.get("argv")
	}

	pub fn envp(&self) -> Result<Option<BTreeMap<String, String>>> {
		self.owned.get("envp")
	}
}
