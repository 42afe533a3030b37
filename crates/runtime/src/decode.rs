//! Decoding native payloads into host values.
//!
//! Handles inside a payload are adopted as they are decoded, so a decoded
//! value owns everything the native core handed over. Dropping it (even
//! unused) releases those handles again.

use std::collections::BTreeMap;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use frida_protocol::{ChildOrigin, DetachReason, DeviceType, Scope};
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::handle::{Handle, Kind, RawHandle};
use crate::native::Core;
use crate::owned::Owned;

/// A value that can be produced from a native payload.
pub trait FromNative: Sized + Send + 'static {
	fn from_native(core: &Core, value: Value) -> Result<Self>;
}

/// Rejects the null payload a successful lookup must never return.
pub(crate) fn require(value: Value) -> Result<Value> {
	if value.is_null() {
		return Err(Error::NotFound("native call returned no value".into()));
	}
	Ok(value)
}

impl<K: Kind> FromNative for Owned<K> {
	fn from_native(core: &Core, value: Value) -> Result<Self> {
		let raw: RawHandle = serde_json::from_value(require(value)?)
			.map_err(|e| Error::Protocol(format!("expected {} handle: {e}", K::KIND)))?;
		match Handle::<K>::from_raw(raw) {
			Some(handle) => Ok(Owned::adopt(core, handle)),
			None => {
				core.release(raw);
				Err(Error::Protocol(format!("expected {} handle, got {}", K::KIND, raw.kind)))
			}
		}
	}
}

impl<T: FromNative> FromNative for Option<T> {
	fn from_native(core: &Core, value: Value) -> Result<Self> {
		if value.is_null() {
			return Ok(None);
		}
		T::from_native(core, value).map(Some)
	}
}

impl FromNative for () {
	fn from_native(_core: &Core, _value: Value) -> Result<Self> {
		Ok(())
	}
}

impl FromNative for Value {
	fn from_native(_core: &Core, value: Value) -> Result<Self> {
		Ok(value)
	}
}

/// Raw bytes travel base64-encoded.
impl FromNative for Vec<u8> {
	fn from_native(_core: &Core, value: Value) -> Result<Self> {
		let Value::String(text) = require(value)? else {
			return Err(Error::Protocol("expected base64 string".into()));
		};
		BASE64
			.decode(text.as_bytes())
			.map_err(|e| Error::Protocol(format!("invalid base64 payload: {e}")))
	}
}

macro_rules! from_native_via_serde {
	($($ty:ty),* $(,)?) => {
		$(
			impl FromNative for $ty {
				fn from_native(_core: &Core, value: Value) -> Result<Self> {
					Ok(serde_json::from_value(require(value)?)?)
				}
			}
		)*
	};
}

from_native_via_serde!(
	bool,
	u32,
	u64,
	i32,
	i64,
	usize,
	String,
	Vec<String>,
	Map<String, Value>,
	BTreeMap<String, String>,
	DeviceType,
	DetachReason,
	ChildOrigin,
	Scope,
);

/// Encodes bytes the way [`Vec<u8>`]'s decoder expects them.
pub fn encode_bytes(bytes: &[u8]) -> String {
	BASE64.encode(bytes)
}
