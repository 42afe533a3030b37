use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use super::AsyncResult;

enum State {
	Pending,
	Done(AsyncResult),
	Cancelled,
	Taken,
}

pub(super) enum Wake {
	Done(AsyncResult),
	Cancelled,
}

/// One-shot rendezvous between a blocked caller and a completion running
/// on a native worker thread.
///
/// Nothing but this latch's own mutex is held while waiting, and that
/// mutex is never held while calling into the native core.
#[derive(Clone)]
pub(super) struct Latch {
	inner: Arc<(Mutex<State>, Condvar)>,
}

impl Latch {
	pub(super) fn new() -> Self {
		Self {
			inner: Arc::new((Mutex::new(State::Pending), Condvar::new())),
		}
	}

	/// Delivers the completion. A result arriving after cancellation is
	/// dropped here, which discards its payload.
	pub(super) fn complete(&self, result: AsyncResult) {
		let (lock, cvar) = &*self.inner;
		let mut state = lock.lock();
		if matches!(*state, State::Pending) {
			*state = State::Done(result);
			cvar.notify_all();
			return;
		}
		drop(state);
		tracing::debug!(op = result.op_id(), "Discarding late completion");
	}

	pub(super) fn cancel(&self) {
		let (lock, cvar) = &*self.inner;
		let mut state = lock.lock();
		if matches!(*state, State::Pending) {
			*state = State::Cancelled;
			cvar.notify_all();
		}
	}

	pub(super) fn wait(&self) -> Wake {
		let (lock, cvar) = &*self.inner;
		let mut state = lock.lock();
		while matches!(*state, State::Pending) {
			cvar.wait(&mut state);
		}
		match std::mem::replace(&mut *state, State::Taken) {
			State::Done(result) => Wake::Done(result),
			_ => Wake::Cancelled,
		}
	}
}
