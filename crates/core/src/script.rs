//! Injected scripts and the messages they post.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use frida_protocol::ScriptMessage;
use frida_runtime::{Call, Result, Subscription, encode_bytes};
use futures_util::Stream;
use serde::Serialize;
use serde_json::{Value, json};
use tokio::sync::mpsc;

use crate::events;

native_object! {
	/// A script created in a session.
	///
	/// Lifecycle: created, then [`load`](Self::load)ed, then destroyed by
	/// [`unload`](Self::unload), [`eternalize`](Self::eternalize) or the
	/// session detaching. Disposing a script that is not yet destroyed
	/// unloads it.
	Script => Script
}

/// One message posted by a script: the parsed text part and the optional
/// binary part.
type Message = (ScriptMessage, Option<Vec<u8>>);

impl Script {
	pub fn name(&self) -> Result<String> {
		self.owned.get("name")
	}

	pub fn is_destroyed(&self) -> Result<bool> {
		self.owned.get("is_destroyed")
	}

	pub fn load(&self) -> Call<()> {
		Call::new(&self.owned, "load", Value::Null)
	}

	pub fn unload(&self) -> Call<()> {
		Call::new(&self.owned, "unload", Value::Null)
	}

	/// Keeps the script running after the session goes away.
	pub fn eternalize(&self) -> Call<()> {
		Call::new(&self.owned, "eternalize", Value::Null)
	}

	/// Posts `message` (serialized as JSON) and optional raw bytes to the
	/// script. Only a loaded script accepts messages.
	pub fn post(&self, message: &impl Serialize, data: Option<&[u8]>) -> Result<()> {
		let text = serde_json::to_string(message)?;
		self.owned.invoke(
			"post",
			json!({ "message": text, "data": data.map(encode_bytes) }),
		)
	}

	/// Calls `handler` for each message the script posts, in posting order.
	pub fn on_message<F>(&self, handler: F) -> Result<Subscription>
	where
		F: Fn(ScriptMessage, Option<Vec<u8>>) + Send + Sync + 'static,
	{
		self.owned.connect(
			"message",
			Arc::new(move |payload: Value, data| match payload["message"].as_str() {
				Some(text) => handler(ScriptMessage::parse(text), data),
				None => tracing::warn!("Dropping script message without text"),
			}),
		)
	}

	/// Calls `handler` once the script is destroyed.
	pub fn on_destroyed<F>(&self, handler: F) -> Result<Subscription>
	where
		F: Fn() + Send + Sync + 'static,
	{
		events::on_unit(&self.owned, "destroyed", handler)
	}

	/// Messages as a [`Stream`]. The stream ends once the script is
	/// destroyed, or right away if it already is; dropping it disconnects.
	pub fn messages(&self) -> Result<MessageStream> {
		let (tx, rx) = mpsc::unbounded_channel();
		let on_message = {
			let tx = tx.clone();
			self.on_message(move |message, data| {
				let _ = tx.send(Some((message, data)));
			})?
		};
		let on_destroyed = {
			let tx = tx.clone();
			self.on_destroyed(move || {
				let _ = tx.send(None);
			})?
		};
		// The destroyed signal may have fired before the handlers were connected.
		if self.is_destroyed()? {
			let _ = tx.send(None);
		}
		Ok(MessageStream {
			rx,
			done: false,
			_subscriptions: [on_message, on_destroyed],
		})
	}
}

/// Stream returned by [`Script::messages`].
pub struct MessageStream {
	rx: mpsc::UnboundedReceiver<Option<Message>>,
	done: bool,
	_subscriptions: [Subscription; 2],
}

impl Stream for MessageStream {
	type Item = Message;

	fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
		let this = self.get_mut();
		if this.done {
			return Poll::Ready(None);
		}
		match this.rx.poll_recv(cx) {
			Poll::Ready(Some(Some(message))) => Poll::Ready(Some(message)),
			Poll::Ready(Some(None) | None) => {
				this.done = true;
				Poll::Ready(None)
			}
			Poll::Pending => Poll::Pending,
		}
	}
}
