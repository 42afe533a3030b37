//! Cooperative cancellation scopes.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use parking_lot::Mutex;

type CancelFn = Box<dyn FnOnce() + Send + 'static>;

struct Inner {
	cancelled: AtomicBool,
	next_id: AtomicU64,
	handlers: Mutex<IndexMap<u64, CancelFn>>,
}

/// A caller-supplied token that lets an in-flight operation be abandoned.
///
/// Cloning shares the same scope. Cancelling is sticky: once cancelled a
/// scope stays cancelled, and handlers connected afterwards run at once.
#[derive(Clone)]
pub struct Cancellable {
	inner: Arc<Inner>,
}

impl Cancellable {
	pub fn new() -> Self {
		Self {
			inner: Arc::new(Inner {
				cancelled: AtomicBool::new(false),
				next_id: AtomicU64::new(1),
				handlers: Mutex::new(IndexMap::new()),
			}),
		}
	}

	/// Requests cancellation and runs every connected handler once, in
	/// connection order, on the calling thread.
	pub fn cancel(&self) {
		let handlers = {
			let mut handlers = self.inner.handlers.lock();
			if self.inner.cancelled.swap(true, Ordering::SeqCst) {
				return;
			}
			std::mem::take(&mut *handlers)
		};
		tracing::debug!(handlers = handlers.len(), "Cancellation requested");
		for (_, handler) in handlers {
			handler();
		}
	}

	pub fn is_cancelled(&self) -> bool {
		self.inner.cancelled.load(Ordering::SeqCst)
	}

	/// Runs `f` when the scope is cancelled, or immediately if it already
	/// is. Dropping the returned guard disconnects `f`.
	pub fn connect<F>(&self, f: F) -> CancelHandler
	where
		F: FnOnce() + Send + 'static,
	{
		let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
		{
			let mut handlers = self.inner.handlers.lock();
			if !self.inner.cancelled.load(Ordering::SeqCst) {
				handlers.insert(id, Box::new(f));
				return CancelHandler {
					scope: Arc::downgrade(&self.inner),
					id,
				};
			}
		}
		f();
		CancelHandler {
			scope: Weak::new(),
			id,
		}
	}

	pub(crate) fn handler_count(&self) -> usize {
		self.inner.handlers.lock().len()
	}
}

impl Default for Cancellable {
	fn default() -> Self {
		Self::new()
	}
}

impl fmt::Debug for Cancellable {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Cancellable")
			.field("cancelled", &self.is_cancelled())
			.finish()
	}
}

/// RAII guard for a handler connected with [`Cancellable::connect`].
#[must_use = "dropping the guard disconnects the handler"]
pub struct CancelHandler {
	scope: Weak<Inner>,
	id: u64,
}

impl Drop for CancelHandler {
	fn drop(&mut self) {
		if let Some(inner) = self.scope.upgrade() {
			inner.handlers.lock().shift_remove(&self.id);
		}
	}
}
