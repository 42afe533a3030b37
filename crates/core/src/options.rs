//! Options objects owned by the native core.
//!
//! Unlike the value structs re-exported from `frida-protocol`, these hold a
//! native handle and must be disposed. A call that takes one keeps it
//! pinned while the call starts and fails with
//! [`Error::UseAfterDispose`](frida_runtime::Error::UseAfterDispose) if it
//! was disposed first.

use frida_protocol::Scope;
use frida_runtime::{Owned, Result};
use serde_json::{Value, json};

use crate::Frida;

native_object! {
	/// Filter for [`Device::enumerate_applications`](crate::Device::enumerate_applications).
	ApplicationQueryOptions => ApplicationQueryOptions
}

impl ApplicationQueryOptions {
	pub fn new(frida: &Frida) -> Result<Self> {
		Ok(Self {
			owned: Owned::create(frida.core(), Value::Null)?,
		})
	}

	/// Restricts the query to `identifier`; may be called repeatedly.
	pub fn select_identifier(&self, identifier: &str) -> Result<()> {
		self.owned.invoke("select_identifier", json!({ "identifier": identifier }))
	}

	pub fn identifiers(&self) -> Result<Vec<String>> {
		self.owned.get("identifiers")
	}

	pub fn has_selected_identifiers(&self) -> Result<bool> {
		Ok(!self.identifiers()?.is_empty())
	}

	pub fn scope(&self) -> Result<Scope> {
		self.owned.get("scope")
	}

	pub fn set_scope(&self, scope: Scope) -> Result<()> {
		self.owned.set("scope", scope)
	}
}

native_object! {
	/// Options for [`Device::frontmost_application`](crate::Device::frontmost_application).
	FrontmostQueryOptions => FrontmostQueryOptions
}

impl FrontmostQueryOptions {
	pub fn new(frida: &Frida) -> Result<Self> {
		Ok(Self {
			owned: Owned::create(frida.core(), Value::Null)?,
		})
	}

	pub fn scope(&self) -> Result<Scope> {
		self.owned.get("scope")
	}

	pub fn set_scope(&self, scope: Scope) -> Result<()> {
		self.owned.set("scope", scope)
	}
}
