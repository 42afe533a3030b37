//! The async bridge: one native asynchronous primitive, four host forms.
//!
//! A [`Call`] names one capability of one native object (`attach` on a
//! device, `load` on a script, ...). It can be driven as
//!
//! - [`Call::start`] + [`Call::finish`]: begin the operation, receive an
//!   [`AsyncResult`] on the native worker thread, resolve it into `T`;
//! - [`Call::sync`]: block the calling thread until completion or
//!   cancellation;
//! - `.await`: a future that cancels the operation when dropped.
//!
//! All of them go through [`NativeCore::start`](crate::NativeCore::start),
//! so the forms agree on results by construction.

mod latch;

use std::fmt;
use std::future::{Future, IntoFuture};
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::{Arc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::oneshot;

use self::latch::{Latch, Wake};
use crate::cancel::Cancellable;
use crate::decode::FromNative;
use crate::error::{Error, Result};
use crate::handle::{Kind, RawHandle};
use crate::native::{Core, NativeCompletion};
use crate::owned::{HandleCell, Owned};

static NEXT_OP_ID: AtomicU64 = AtomicU64::new(1);

/// Outcome of one started operation, handed to the completion callback.
///
/// Consumed exactly once by [`Call::finish`]. If it is dropped while still
/// holding a successful payload, any handles in that payload are released.
#[derive(Clone)]
pub struct AsyncResult {
	inner: Arc<Pending>,
}

struct Pending {
	op: u64,
	source: RawHandle,
	method: &'static str,
	core: Core,
	outcome: Mutex<Option<Result<Value>>>,
	discard: fn(&Core, Value),
}

impl AsyncResult {
	fn new(
		op: u64,
		source: RawHandle,
		method: &'static str,
		core: Core,
		outcome: Result<Value>,
		discard: fn(&Core, Value),
	) -> Self {
		Self {
			inner: Arc::new(Pending {
				op,
				source,
				method,
				core,
				outcome: Mutex::new(Some(outcome)),
				discard,
			}),
		}
	}

	pub fn op_id(&self) -> u64 {
		self.inner.op
	}

	pub fn method(&self) -> &'static str {
		self.inner.method
	}

	/// Whether the outcome is still waiting to be consumed.
	pub fn is_pending(&self) -> bool {
		self.inner.outcome.lock().is_some()
	}
}

impl fmt::Debug for AsyncResult {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("AsyncResult")
			.field("op", &self.inner.op)
			.field("source", &self.inner.source)
			.field("method", &self.inner.method)
			.field("pending", &self.is_pending())
			.finish()
	}
}

impl Drop for Pending {
	fn drop(&mut self) {
		if let Some(Ok(value)) = self.outcome.get_mut().take() {
			if !value.is_null() {
				tracing::debug!(op = self.op, method = self.method, "Discarding unconsumed result");
			}
			(self.discard)(&self.core, value);
		}
	}
}

fn discard_payload<T: FromNative>(core: &Core, value: Value) {
	drop(T::from_native(core, value));
}

/// One asynchronous capability of one native object, yielding `T`.
pub struct Call<T> {
	target: Weak<HandleCell>,
	source: RawHandle,
	method: &'static str,
	params: Value,
	args: Vec<Arc<HandleCell>>,
	_output: PhantomData<fn() -> T>,
}

impl<T> Clone for Call<T> {
	fn clone(&self) -> Self {
		Self {
			target: self.target.clone(),
			source: self.source,
			method: self.method,
			params: self.params.clone(),
			args: self.args.clone(),
			_output: PhantomData,
		}
	}
}

impl<T> fmt::Debug for Call<T> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Call")
			.field("target", &self.source)
			.field("method", &self.method)
			.field("params", &self.params)
			.finish()
	}
}

impl<T: FromNative> Call<T> {
	pub fn new<K: Kind>(owner: &Owned<K>, method: &'static str, params: Value) -> Self {
		Self {
			target: owner.downgrade(),
			source: owner.raw(),
			method,
			params,
			args: Vec::new(),
			_output: PhantomData,
		}
	}

	/// Declares a native object referenced from `params`. Starting the call
	/// fails with [`Error::UseAfterDispose`] once `arg` is disposed, and
	/// `arg` cannot be released while the native core takes the call.
	pub fn holding<K: Kind>(mut self, arg: &Owned<K>) -> Self {
		self.args.push(arg.shared());
		self
	}

	pub fn method(&self) -> &'static str {
		self.method
	}

	/// Begins the operation and returns immediately.
	///
	/// `on_complete` runs exactly once, on a thread chosen by the native
	/// core. If the target has been disposed by then, the payload is
	/// released and the result carries [`Error::UseAfterDispose`]. Fails
	/// without calling into native code if the target is already disposed.
	pub fn start<F>(&self, cancellable: Option<&Cancellable>, on_complete: F) -> Result<()>
	where
		F: FnOnce(AsyncResult) + Send + 'static,
	{
		let cell = self.target.upgrade().ok_or(Error::UseAfterDispose {
			kind: self.source.kind,
		})?;
		let lease = cell.lease()?;
		let arg_leases = self.args.iter().map(|arg| arg.lease()).collect::<Result<Vec<_>>>()?;

		let op = NEXT_OP_ID.fetch_add(1, Ordering::Relaxed);
		let source = self.source;
		let method = self.method;
		let owner = self.target.clone();
		let core = cell.core().clone();
		let discard: fn(&Core, Value) = discard_payload::<T>;

		let done: NativeCompletion = Box::new(move |outcome| {
			let owner_live = owner.upgrade().is_some_and(|cell| !cell.is_disposed());
			let outcome = match outcome {
				Ok(value) if !owner_live => {
					tracing::debug!(
						op,
						handle = %source,
						method,
						"Owner disposed before completion, discarding result"
					);
					discard(&core, value);
					Err(Error::UseAfterDispose { kind: source.kind })
				}
				Ok(value) => Ok(value),
				Err(err) => Err(Error::from(err)),
			};
			tracing::debug!(op, handle = %source, method, ok = outcome.is_ok(), "Operation completed");
			on_complete(AsyncResult::new(op, source, method, core, outcome, discard));
		});

		tracing::debug!(op, handle = %source, method, "Starting operation");
		let fallback;
		let cancellable = match cancellable {
			Some(c) => c,
			None => {
				fallback = Cancellable::new();
				&fallback
			}
		};
		cell.core().start(lease.raw(), method, self.params.clone(), cancellable, done);
		drop(arg_leases);
		Ok(())
	}

	/// Resolves a result delivered to a [`start`](Self::start) callback.
	///
	/// Fails with [`Error::InvalidAsyncState`] if `result` belongs to a
	/// different call or has already been consumed.
	pub fn finish(&self, result: &AsyncResult) -> Result<T> {
		let pending = &result.inner;
		if pending.source != self.source || pending.method != self.method {
			return Err(Error::InvalidAsyncState(format!(
				"result of {}.{} passed to finish of {}.{}",
				pending.source, pending.method, self.source, self.method
			)));
		}
		let outcome = pending.outcome.lock().take().ok_or_else(|| {
			Error::InvalidAsyncState(format!("result of {}.{} already consumed", self.source, self.method))
		})?;
		T::from_native(&pending.core, outcome?)
	}

	/// Starts the operation and blocks until it completes or `cancellable`
	/// fires, whichever comes first.
	pub fn sync(&self, cancellable: Option<&Cancellable>) -> Result<T> {
		let scope = cancellable.cloned().unwrap_or_default();
		if scope.is_cancelled() {
			return Err(Error::Cancelled);
		}

		let latch = Latch::new();
		let _wake_on_cancel = {
			let latch = latch.clone();
			scope.connect(move || latch.cancel())
		};

		let delivered = latch.clone();
		self.start(Some(&scope), move |result| delivered.complete(result))?;

		match latch.wait() {
			Wake::Done(result) => self.finish(&result),
			Wake::Cancelled => {
				tracing::debug!(handle = %self.source, method = self.method, "Blocking call cancelled");
				Err(Error::Cancelled)
			}
		}
	}
}

/// Cancels an operation whose future was dropped before completion.
struct CancelOnDrop {
	scope: Cancellable,
	completed: bool,
}

impl CancelOnDrop {
	fn new(scope: Cancellable) -> Self {
		Self { scope, completed: false }
	}

	fn complete(&mut self) {
		self.completed = true;
	}
}

impl Drop for CancelOnDrop {
	fn drop(&mut self) {
		if !self.completed {
			tracing::debug!("Future dropped before completion, cancelling operation");
			self.scope.cancel();
		}
	}
}

impl<T: FromNative> IntoFuture for Call<T> {
	type Output = Result<T>;
	type IntoFuture = Pin<Box<dyn Future<Output = Result<T>> + Send>>;

	fn into_future(self) -> Self::IntoFuture {
		Box::pin(async move {
			let scope = Cancellable::new();
			let mut guard = CancelOnDrop::new(scope.clone());
			let (tx, rx) = oneshot::channel();
			self.start(Some(&scope), move |result| {
				let _ = tx.send(result);
			})?;
			let result = rx
				.await
				.map_err(|_| Error::InvalidAsyncState("completion was never delivered".into()))?;
			guard.complete();
			self.finish(&result)
		})
	}
}
