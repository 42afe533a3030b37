/// Declares a facade over one native object kind.
///
/// Generates the struct, its [`Disposable`](frida_runtime::Disposable),
/// [`FromNative`](frida_runtime::FromNative) and `Debug` impls, and, when a
/// list kind is given, the [`Element`](frida_runtime::Element) impl that
/// lets the type be fetched from that list.
macro_rules! native_object {
	($(#[$meta:meta])* $name:ident => $kind:ident $(, list = $list:ident)?) => {
		$(#[$meta])*
		pub struct $name {
			pub(crate) owned: frida_runtime::Owned<frida_runtime::kind::$kind>,
		}

		impl frida_runtime::Disposable for $name {
			fn handle_cell(&self) -> &frida_runtime::HandleCell {
				self.owned.cell()
			}
		}

		impl frida_runtime::FromNative for $name {
			fn from_native(
				core: &frida_runtime::Core,
				value: serde_json::Value,
			) -> frida_runtime::Result<Self> {
				let owned: frida_runtime::Owned<frida_runtime::kind::$kind> =
					frida_runtime::FromNative::from_native(core, value)?;
				Ok(Self { owned })
			}
		}

		impl std::fmt::Debug for $name {
			fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
				f.debug_tuple(stringify!($name)).field(&self.owned.raw()).finish()
			}
		}

		$(
			impl frida_runtime::Element for $name {
				type List = frida_runtime::kind::$list;
			}
		)?
	};
}
