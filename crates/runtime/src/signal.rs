//! Signal subscriptions.

use std::fmt;
use std::sync::Weak;

use crate::native::SignalId;
use crate::owned::HandleCell;

/// RAII handle that disconnects a signal handler on drop.
///
/// Holds a weak reference to the emitting object, so dropping it after the
/// object was disposed is a no-op: releasing a handle already disconnects
/// everything connected through it.
pub struct Subscription {
	target: Weak<HandleCell>,
	id: SignalId,
	active: bool,
}

impl Subscription {
	pub(crate) fn new(target: Weak<HandleCell>, id: SignalId) -> Self {
		Self {
			target,
			id,
			active: true,
		}
	}

	pub fn id(&self) -> SignalId {
		self.id
	}

	/// Explicitly disconnects. Equivalent to dropping.
	pub fn unsubscribe(mut self) {
		self.disconnect();
	}

	/// Keeps the handler connected until the emitting object is disposed.
	pub fn detach(mut self) {
		self.active = false;
	}

	fn disconnect(&mut self) {
		if !std::mem::replace(&mut self.active, false) {
			return;
		}
		let Some(cell) = self.target.upgrade() else {
			return;
		};
		if let Ok(lease) = cell.lease() {
			cell.core().disconnect(lease.raw(), self.id);
			tracing::debug!(handle = %lease.raw(), id = self.id, "Disconnected signal handler");
		}
	}
}

impl Drop for Subscription {
	fn drop(&mut self) {
		self.disconnect();
	}
}

impl fmt::Debug for Subscription {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Subscription")
			.field("id", &self.id)
			.field("active", &self.active)
			.finish()
	}
}
