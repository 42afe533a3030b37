//! Typed signal handlers over native payloads.

use std::sync::Arc;

use frida_runtime::{FromNative, Kind, Owned, Result, Subscription};
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Connects `handler` to `signal`, decoding `payload[field]` into `T` for
/// each delivery. Handles in the payload are owned by the decoded value.
pub(crate) fn on_object<K, T, F>(
	owner: &Owned<K>,
	signal: &'static str,
	field: &'static str,
	handler: F,
) -> Result<Subscription>
where
	K: Kind,
	T: FromNative,
	F: Fn(T) + Send + Sync + 'static,
{
	let core = Arc::downgrade(owner.core());
	owner.connect(
		signal,
		Arc::new(move |mut payload: Value, _data| {
			let Some(core) = core.upgrade() else {
				return;
			};
			match T::from_native(&core, payload[field].take()) {
				Ok(value) => handler(value),
				Err(err) => tracing::warn!(signal, error = %err, "Dropping undecodable signal payload"),
			}
		}),
	)
}

/// Connects `handler` to `signal`, deserializing the whole payload.
pub(crate) fn on_value<K, T, F>(owner: &Owned<K>, signal: &'static str, handler: F) -> Result<Subscription>
where
	K: Kind,
	T: DeserializeOwned,
	F: Fn(T) + Send + Sync + 'static,
{
	owner.connect(
		signal,
		Arc::new(move |payload: Value, _data| match serde_json::from_value(payload) {
			Ok(value) => handler(value),
			Err(err) => tracing::warn!(signal, error = %err, "Dropping malformed signal payload"),
		}),
	)
}

/// Connects `handler` to a signal whose payload carries nothing of interest.
pub(crate) fn on_unit<K, F>(owner: &Owned<K>, signal: &'static str, handler: F) -> Result<Subscription>
where
	K: Kind,
	F: Fn() + Send + Sync + 'static,
{
	owner.connect(signal, Arc::new(move |_payload, _data| handler()))
}
