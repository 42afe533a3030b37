//! Disposable wrappers: exactly-once release of native handles.
//!
//! An [`Owned<K>`] is the single owner of one native handle. Its state is a
//! word packing a `DISPOSED` bit with a count of in-progress native calls
//! ("leases"). Every native call takes a lease first, which fails once the
//! bit is set, so no call can start on a released handle. Disposal sets the
//! bit with one atomic `fetch_or`; whoever observes the transition and a
//! zero lease count performs the release, otherwise the last lease to finish
//! does. Either way the native release runs exactly once.

use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use serde::Serialize;
use serde_json::Value;

use crate::cancel::Cancellable;
use crate::decode::FromNative;
use crate::error::{Error, Result};
use crate::handle::{Handle, HandleKind, Kind, RawHandle};
use crate::native::{Core, SignalHandler};
use crate::signal::Subscription;

const DISPOSED: usize = 1 << (usize::BITS - 1);

/// Work done just before a handle is released. Failures are logged and
/// never stop the release.
type Teardown = fn(&Core, RawHandle) -> Result<()>;

/// Shared state behind an [`Owned`] handle.
///
/// Completions and subscriptions keep a `Weak` reference so they can tell
/// whether their owner is still live without extending its lifetime.
pub struct HandleCell {
	raw: RawHandle,
	core: Core,
	state: AtomicUsize,
	teardown: Option<Teardown>,
}

impl HandleCell {
	fn new(core: Core, raw: RawHandle) -> Self {
		Self {
			raw,
			core,
			state: AtomicUsize::new(0),
			teardown: teardown_for(raw.kind),
		}
	}

	pub fn kind(&self) -> HandleKind {
		self.raw.kind
	}

	pub fn core(&self) -> &Core {
		&self.core
	}

	pub fn is_disposed(&self) -> bool {
		self.state.load(Ordering::Acquire) & DISPOSED != 0
	}

	/// Pins the handle for one native call.
	pub fn lease(&self) -> Result<Lease<'_>> {
		let mut current = self.state.load(Ordering::Acquire);
		loop {
			if current & DISPOSED != 0 {
				return Err(Error::UseAfterDispose { kind: self.raw.kind });
			}
			match self
				.state
				.compare_exchange_weak(current, current + 1, Ordering::AcqRel, Ordering::Acquire)
			{
				Ok(_) => return Ok(Lease { cell: self }),
				Err(actual) => current = actual,
			}
		}
	}

	/// Marks the handle disposed. Returns `true` for the one caller that
	/// performed the transition.
	pub fn dispose(&self) -> bool {
		let previous = self.state.fetch_or(DISPOSED, Ordering::AcqRel);
		if previous & DISPOSED != 0 {
			return false;
		}
		tracing::debug!(handle = %self.raw, leases = previous, "Disposing handle");
		if previous == 0 {
			self.release();
		}
		true
	}

	fn release(&self) {
		if let Some(teardown) = self.teardown {
			if let Err(err) = teardown(&self.core, self.raw) {
				tracing::warn!(handle = %self.raw, error = %err, "Teardown failed during dispose");
			}
		}
		self.core.release(self.raw);
		tracing::debug!(handle = %self.raw, "Released handle");
	}
}

impl fmt::Debug for HandleCell {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("HandleCell")
			.field("handle", &self.raw)
			.field("disposed", &self.is_disposed())
			.finish()
	}
}

/// Proof that a handle will not be released while the lease is held.
#[derive(Debug)]
pub struct Lease<'a> {
	cell: &'a HandleCell,
}

impl Lease<'_> {
	pub fn raw(&self) -> RawHandle {
		self.cell.raw
	}
}

impl Drop for Lease<'_> {
	fn drop(&mut self) {
		let previous = self.cell.state.fetch_sub(1, Ordering::AcqRel);
		if previous == DISPOSED | 1 {
			self.cell.release();
		}
	}
}

/// Exclusive owner of one native handle of kind `K`.
///
/// Dropping the owner disposes it, so scope exit (including unwinding)
/// always releases the handle.
pub struct Owned<K: Kind> {
	cell: Arc<HandleCell>,
	_kind: PhantomData<K>,
}

impl<K: Kind> Owned<K> {
	/// Takes ownership of a handle freshly returned by the native core.
	pub fn adopt(core: &Core, handle: Handle<K>) -> Self {
		Self {
			cell: Arc::new(HandleCell::new(Arc::clone(core), handle.raw())),
			_kind: PhantomData,
		}
	}

	/// Calls the native constructor for `K` and adopts the result.
	pub fn create(core: &Core, params: Value) -> Result<Self> {
		let raw = core.create(K::KIND, params)?;
		let handle = Handle::<K>::from_raw(raw).ok_or_else(|| {
			core.release(raw);
			Error::Protocol(format!("constructor for {} returned a {} handle", K::KIND, raw.kind))
		})?;
		tracing::debug!(handle = %raw, "Created native object");
		Ok(Self::adopt(core, handle))
	}

	pub fn cell(&self) -> &HandleCell {
		&self.cell
	}

	pub(crate) fn shared(&self) -> Arc<HandleCell> {
		Arc::clone(&self.cell)
	}

	pub(crate) fn downgrade(&self) -> Weak<HandleCell> {
		Arc::downgrade(&self.cell)
	}

	pub fn core(&self) -> &Core {
		&self.cell.core
	}

	/// The raw handle, for identity checks and logging only.
	pub fn raw(&self) -> RawHandle {
		self.cell.raw
	}

	/// Typed handle for passing this object as an argument to another call.
	///
	/// The caller must keep the returned lease alive until that call returns.
	pub fn handle(&self) -> Result<(Lease<'_>, Handle<K>)> {
		let lease = self.cell.lease()?;
		Ok((lease, Handle::new(self.cell.raw.id)))
	}

	/// Reads a property.
	pub fn get<T: FromNative>(&self, name: &str) -> Result<T> {
		let lease = self.cell.lease()?;
		let value = self.cell.core.get(lease.raw(), name)?;
		drop(lease);
		T::from_native(&self.cell.core, value)
	}

	/// Writes a property.
	pub fn set(&self, name: &str, value: impl Serialize) -> Result<()> {
		let value = serde_json::to_value(value)?;
		let lease = self.cell.lease()?;
		self.cell.core.set(lease.raw(), name, value)?;
		Ok(())
	}

	/// Performs an immediate native call.
	pub fn invoke<T: FromNative>(&self, method: &str, params: Value) -> Result<T> {
		let lease = self.cell.lease()?;
		let value = self.cell.core.invoke(lease.raw(), method, params)?;
		drop(lease);
		T::from_native(&self.cell.core, value)
	}

	/// Connects a handler to one of this object's signals.
	pub fn connect(&self, signal: &str, handler: SignalHandler) -> Result<Subscription> {
		let lease = self.cell.lease()?;
		let id = self.cell.core.connect(lease.raw(), signal, handler)?;
		tracing::debug!(handle = %self.cell.raw, signal, id, "Connected signal handler");
		Ok(Subscription::new(self.downgrade(), id))
	}
}

impl<K: Kind> Drop for Owned<K> {
	fn drop(&mut self) {
		self.cell.dispose();
	}
}

impl<K: Kind> fmt::Debug for Owned<K> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		fmt::Debug::fmt(&*self.cell, f)
	}
}

/// Explicit, idempotent disposal plus scoped acquisition.
pub trait Disposable {
	fn handle_cell(&self) -> &HandleCell;

	/// Releases the native handle. Safe to call any number of times from
	/// any thread; only the first call has an effect.
	fn dispose(&self) {
		self.handle_cell().dispose();
	}

	fn is_disposed(&self) -> bool {
		self.handle_cell().is_disposed()
	}

	/// Runs `f` with the object, then disposes it even if `f` panics.
	fn using<R, F>(self, f: F) -> R
	where
		Self: Sized,
		F: FnOnce(&Self) -> R,
	{
		let guard = DisposeOnExit(&self);
		let out = f(guard.0);
		drop(guard);
		out
	}
}

struct DisposeOnExit<'a, D: Disposable + ?Sized>(&'a D);

impl<D: Disposable + ?Sized> Drop for DisposeOnExit<'_, D> {
	fn drop(&mut self) {
		self.0.dispose();
	}
}

impl<K: Kind> Disposable for Owned<K> {
	fn handle_cell(&self) -> &HandleCell {
		&self.cell
	}
}

fn teardown_for(kind: HandleKind) -> Option<Teardown> {
	match kind {
		HandleKind::Session => Some(detach_unless_detached),
		HandleKind::Script => Some(unload_unless_destroyed),
		_ => None,
	}
}

fn detach_unless_detached(core: &Core, raw: RawHandle) -> Result<()> {
	if core.get(raw, "is_detached")?.as_bool() == Some(true) {
		return Ok(());
	}
	request(core, raw, "detach");
	Ok(())
}

fn unload_unless_destroyed(core: &Core, raw: RawHandle) -> Result<()> {
	if core.get(raw, "is_destroyed")?.as_bool() == Some(true) {
		return Ok(());
	}
	request(core, raw, "unload");
	Ok(())
}

/// Starts `method` without waiting for it; the outcome is only logged.
fn request(core: &Core, raw: RawHandle, method: &'static str) {
	tracing::debug!(handle = %raw, method, "Requesting teardown");
	core.start(
		raw,
		method,
		Value::Null,
		&Cancellable::new(),
		Box::new(move |outcome| {
			if let Err(err) = outcome {
				tracing::warn!(handle = %raw, method, error = %err, "Teardown request failed");
			}
		}),
	);
}

#[cfg(test)]
mod tests;
