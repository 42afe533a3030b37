//! Typed references to native-owned objects.
//!
//! A handle is only meaningful together with its kind, so the raw form
//! ([`RawHandle`]) always carries both, and the typed form ([`Handle<K>`])
//! fixes the kind at compile time through a marker type from [`kind`].

use std::fmt;
use std::marker::PhantomData;

use serde::{Deserialize, Serialize};

/// Every kind of native object the binding can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HandleKind {
	DeviceManager,
	Device,
	DeviceList,
	Session,
	Script,
	Process,
	ProcessList,
	Application,
	ApplicationList,
	Spawn,
	SpawnList,
	Child,
	ChildList,
	ApplicationQueryOptions,
	FrontmostQueryOptions,
}

impl HandleKind {
	/// Numeric tag used on the C boundary.
	pub fn as_u32(self) -> u32 {
		self as u32
	}

	pub fn from_u32(tag: u32) -> Option<Self> {
		const ALL: [HandleKind; 15] = [
			HandleKind::DeviceManager,
			HandleKind::Device,
			HandleKind::DeviceList,
			HandleKind::Session,
			HandleKind::Script,
			HandleKind::Process,
			HandleKind::ProcessList,
			HandleKind::Application,
			HandleKind::ApplicationList,
			HandleKind::Spawn,
			HandleKind::SpawnList,
			HandleKind::Child,
			HandleKind::ChildList,
			HandleKind::ApplicationQueryOptions,
			HandleKind::FrontmostQueryOptions,
		];
		ALL.get(tag as usize).copied()
	}

	/// Human-readable name used in error messages.
	pub fn name(self) -> &'static str {
		match self {
			Self::DeviceManager => "DeviceManager",
			Self::Device => "Device",
			Self::DeviceList => "DeviceList",
			Self::Session => "Session",
			Self::Script => "Script",
			Self::Process => "Process",
			Self::ProcessList => "ProcessList",
			Self::Application => "Application",
			Self::ApplicationList => "ApplicationList",
			Self::Spawn => "Spawn",
			Self::SpawnList => "SpawnList",
			Self::Child => "Child",
			Self::ChildList => "ChildList",
			Self::ApplicationQueryOptions => "ApplicationQueryOptions",
			Self::FrontmostQueryOptions => "FrontmostQueryOptions",
		}
	}
}

impl fmt::Display for HandleKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.name())
	}
}

/// An untyped handle as it crosses the native boundary.
///
/// Application code never sees one; facades hold [`Owned`](crate::Owned)
/// wrappers instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RawHandle {
	pub kind: HandleKind,
	pub id: u64,
}

impl RawHandle {
	pub fn new(kind: HandleKind, id: u64) -> Self {
		Self { kind, id }
	}
}

impl fmt::Display for RawHandle {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}#{}", self.kind, self.id)
	}
}

/// Compile-time marker for a handle kind.
pub trait Kind: Send + Sync + 'static {
	const KIND: HandleKind;
}

/// Marker types, one per [`HandleKind`].
pub mod kind {
	use super::{HandleKind, Kind};

	macro_rules! kinds {
		($($name:ident),* $(,)?) => {
			$(
				#[derive(Debug)]
				pub enum $name {}

				impl Kind for $name {
					const KIND: HandleKind = HandleKind::$name;
				}
			)*
		};
	}

	kinds!(
		DeviceManager,
		Device,
		DeviceList,
		Session,
		Script,
		Process,
		ProcessList,
		Application,
		ApplicationList,
		Spawn,
		SpawnList,
		Child,
		ChildList,
		ApplicationQueryOptions,
		FrontmostQueryOptions,
	);
}

/// A handle whose kind is fixed at compile time.
///
/// Serializes as its [`RawHandle`], which is how handle-typed arguments
/// (e.g. a native options object) are passed inside call parameters.
pub struct Handle<K: Kind> {
	id: u64,
	_kind: PhantomData<K>,
}

impl<K: Kind> Handle<K> {
	pub(crate) fn new(id: u64) -> Self {
		Self { id, _kind: PhantomData }
	}

	/// Checks a raw handle's kind and narrows it.
	pub(crate) fn from_raw(raw: RawHandle) -> Option<Self> {
		(raw.kind == K::KIND).then(|| Self::new(raw.id))
	}

	pub(crate) fn raw(&self) -> RawHandle {
		RawHandle::new(K::KIND, self.id)
	}
}

impl<K: Kind> Clone for Handle<K> {
	fn clone(&self) -> Self {
		*self
	}
}

impl<K: Kind> Copy for Handle<K> {}

impl<K: Kind> PartialEq for Handle<K> {
	fn eq(&self, other: &Self) -> bool {
		self.id == other.id
	}
}

impl<K: Kind> Eq for Handle<K> {}

impl<K: Kind> fmt::Debug for Handle<K> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "Handle<{}>({})", K::KIND, self.id)
	}
}

impl<K: Kind> Serialize for Handle<K> {
	fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
		self.raw().serialize(serializer)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_kind_tags_round_trip() {
		for tag in 0..15 {
			let kind = HandleKind::from_u32(tag).unwrap();
			assert_eq!(kind.as_u32(), tag);
		}
		assert!(HandleKind::from_u32(15).is_none());
	}

	#[test]
	fn test_raw_handle_json_shape() {
		let raw = RawHandle::new(HandleKind::ProcessList, 42);
		let json = serde_json::to_value(raw).unwrap();
		assert_eq!(json, serde_json::json!({"kind": "process-list", "id": 42}));
	}

	#[test]
	fn test_typed_handle_rejects_other_kind() {
		let raw = RawHandle::new(HandleKind::Script, 3);
		assert!(Handle::<kind::Session>::from_raw(raw).is_none());
		let typed = Handle::<kind::Script>::from_raw(raw).unwrap();
		assert_eq!(typed.raw(), raw);
	}

	#[test]
	fn test_typed_handle_serializes_with_kind() {
		let handle = Handle::<kind::FrontmostQueryOptions>::new(9);
		let json = serde_json::to_value(handle).unwrap();
		assert_eq!(json["kind"], "frontmost-query-options");
		assert_eq!(json["id"], 9);
	}
}
