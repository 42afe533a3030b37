//! [`NativeCore`] backed by the engine's shared library.
//!
//! The library exports one symbol, `frida_host_vtable`, returning a table
//! of C functions. Values cross as NUL-terminated UTF-8 JSON. Strings the
//! library returns through out-parameters are owned by the caller and
//! handed back through `free_string`; strings passed into callbacks are
//! borrowed for the duration of the call.

use std::ffi::{CStr, CString, c_char, c_int, c_void};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::Path;
use std::ptr;
use std::sync::Arc;

use serde_json::Value;

use crate::cancel::{CancelHandler, Cancellable};
use crate::error::{Error, Result};
use crate::handle::{HandleKind, RawHandle};
use crate::native::{
	NativeCompletion, NativeCore, NativeError, NativeErrorCode, NativeResult, SignalHandler, SignalId,
};

/// Table layout revision this binding was built against.
pub const ABI_VERSION: u32 = 1;

const VTABLE_SYMBOL: &[u8] = b"frida_host_vtable\0";

type CompleteFn = unsafe extern "C" fn(user_data: *mut c_void, result: *const c_char, error: *const c_char);
type SignalFn = unsafe extern "C" fn(user_data: *mut c_void, payload: *const c_char, data: *const u8, data_len: usize);
type DestroyFn = unsafe extern "C" fn(user_data: *mut c_void);

/// Function table exported by the native library.
#[repr(C)]
pub struct VTable {
	pub abi_version: u32,
	pub init: unsafe extern "C" fn(error: *mut *mut c_char) -> c_int,
	pub deinit: unsafe extern "C" fn(),
	pub version_string: unsafe extern "C" fn() -> *mut c_char,
	pub create: unsafe extern "C" fn(kind: u32, params: *const c_char, id: *mut u64, error: *mut *mut c_char) -> c_int,
	pub release: unsafe extern "C" fn(kind: u32, id: u64),
	pub get: unsafe extern "C" fn(
		kind: u32,
		id: u64,
		name: *const c_char,
		value: *mut *mut c_char,
		error: *mut *mut c_char,
	) -> c_int,
	pub set: unsafe extern "C" fn(
		kind: u32,
		id: u64,
		name: *const c_char,
		value: *const c_char,
		error: *mut *mut c_char,
	) -> c_int,
	pub invoke: unsafe extern "C" fn(
		kind: u32,
		id: u64,
		method: *const c_char,
		params: *const c_char,
		result: *mut *mut c_char,
		error: *mut *mut c_char,
	) -> c_int,
	pub cancellable_new: unsafe extern "C" fn() -> *mut c_void,
	pub cancellable_cancel: unsafe extern "C" fn(cancellable: *mut c_void),
	pub cancellable_free: unsafe extern "C" fn(cancellable: *mut c_void),
	pub start: unsafe extern "C" fn(
		kind: u32,
		id: u64,
		method: *const c_char,
		params: *const c_char,
		cancellable: *mut c_void,
		done: CompleteFn,
		user_data: *mut c_void,
	),
	pub connect: unsafe extern "C" fn(
		kind: u32,
		id: u64,
		signal: *const c_char,
		handler: SignalFn,
		user_data: *mut c_void,
		destroy: DestroyFn,
		handler_id: *mut u64,
		error: *mut *mut c_char,
	) -> c_int,
	pub disconnect: unsafe extern "C" fn(kind: u32, id: u64, handler_id: u64),
	pub free_string: unsafe extern "C" fn(s: *mut c_char),
}

/// The native core loaded from a shared library.
pub struct DylibCore {
	vtable: *const VTable,
	_library: libloading::Library,
}

// SAFETY: the vtable is immutable for the library's lifetime and every
// entry point is documented as callable from any thread.
unsafe impl Send for DylibCore {}
unsafe impl Sync for DylibCore {}

impl DylibCore {
	/// Loads the library at `path` and resolves its function table.
	pub fn load(path: &Path) -> Result<Self> {
		tracing::info!(path = %path.display(), "Loading native library");
		// SAFETY: loading runs the library's initializers; the located file is
		// trusted to be the engine library.
		let library = unsafe { libloading::Library::new(path) }.map_err(|e| Error::Library(e.to_string()))?;

		let vtable = unsafe {
			let entry: libloading::Symbol<unsafe extern "C" fn() -> *const VTable> =
				library.get(VTABLE_SYMBOL).map_err(|e| Error::Library(e.to_string()))?;
			entry()
		};
		if vtable.is_null() {
			return Err(Error::Library("frida_host_vtable returned null".into()));
		}

		let abi = unsafe { (*vtable).abi_version };
		if abi != ABI_VERSION {
			return Err(Error::Library(format!(
				"library ABI version {abi} does not match expected {ABI_VERSION}"
			)));
		}

		Ok(Self {
			vtable,
			_library: library,
		})
	}

	fn vt(&self) -> &VTable {
		// SAFETY: non-null and valid while `_library` is loaded.
		unsafe { &*self.vtable }
	}

	/// Copies and frees a string returned through an out-parameter.
	fn take_string(&self, s: *mut c_char) -> Option<String> {
		if s.is_null() {
			return None;
		}
		let owned = unsafe { CStr::from_ptr(s) }.to_string_lossy().into_owned();
		unsafe { (self.vt().free_string)(s) };
		Some(owned)
	}

	fn check(&self, status: c_int, error: *mut c_char) -> NativeResult<()> {
		let message = self.take_string(error);
		if status == 0 {
			return Ok(());
		}
		Err(message.map_or_else(
			|| NativeError::new(NativeErrorCode::Other(status), "native call failed"),
			|text| parse_error(&text),
		))
	}

	fn take_value(&self, s: *mut c_char) -> NativeResult<Value> {
		self.take_string(s).map_or(Ok(Value::Null), |text| parse_value(&text))
	}
}

fn cstring(s: &str) -> NativeResult<CString> {
	CString::new(s).map_err(|_| NativeError::invalid_argument(format!("interior NUL in {s:?}")))
}

fn json_cstring(value: &Value) -> NativeResult<CString> {
	cstring(&value.to_string())
}

fn parse_value(text: &str) -> NativeResult<Value> {
	serde_json::from_str(text)
		.map_err(|e| NativeError::new(NativeErrorCode::Protocol, format!("malformed payload from native core: {e}")))
}

fn parse_error(text: &str) -> NativeError {
	serde_json::from_str(text).unwrap_or_else(|_| NativeError::new(NativeErrorCode::Other(-1), text))
}

unsafe fn borrowed(s: *const c_char) -> Option<String> {
	(!s.is_null()).then(|| unsafe { CStr::from_ptr(s) }.to_string_lossy().into_owned())
}

struct NativeCancellable {
	ptr: *mut c_void,
	vtable: *const VTable,
}

// SAFETY: native cancellables are thread-safe objects.
unsafe impl Send for NativeCancellable {}
unsafe impl Sync for NativeCancellable {}

impl Drop for NativeCancellable {
	fn drop(&mut self) {
		unsafe { ((*self.vtable).cancellable_free)(self.ptr) };
	}
}

struct StartContext {
	done: NativeCompletion,
	_cancellable: Arc<NativeCancellable>,
	_on_cancel: CancelHandler,
}

unsafe extern "C" fn complete_trampoline(user_data: *mut c_void, result: *const c_char, error: *const c_char) {
	let context = unsafe { Box::from_raw(user_data.cast::<StartContext>()) };
	let outcome = match unsafe { borrowed(error) } {
		Some(text) => Err(parse_error(&text)),
		None => unsafe { borrowed(result) }.map_or(Ok(Value::Null), |text| parse_value(&text)),
	};
	let StartContext { done, .. } = *context;
	if catch_unwind(AssertUnwindSafe(move || done(outcome))).is_err() {
		tracing::error!("Completion callback panicked");
	}
}

unsafe extern "C" fn signal_trampoline(
	user_data: *mut c_void,
	payload: *const c_char,
	data: *const u8,
	data_len: usize,
) {
	let handler = unsafe { &*user_data.cast::<SignalHandler>() };
	let payload = match unsafe { borrowed(payload) }.map(|text| parse_value(&text)) {
		Some(Ok(value)) => value,
		Some(Err(err)) => {
			tracing::warn!(error = %err, "Dropping signal with malformed payload");
			return;
		}
		None => Value::Null,
	};
	let data = (!data.is_null()).then(|| unsafe { std::slice::from_raw_parts(data, data_len) }.to_vec());
	if catch_unwind(AssertUnwindSafe(|| handler(payload, data))).is_err() {
		tracing::error!("Signal handler panicked");
	}
}

unsafe extern "C" fn signal_destroy(user_data: *mut c_void) {
	drop(unsafe { Box::from_raw(user_data.cast::<SignalHandler>()) });
}

impl NativeCore for DylibCore {
	fn init(&self) -> NativeResult<()> {
		let mut error = ptr::null_mut();
		let status = unsafe { (self.vt().init)(&mut error) };
		self.check(status, error)
	}

	fn deinit(&self) {
		unsafe { (self.vt().deinit)() };
	}

	fn version(&self) -> String {
		let s = unsafe { (self.vt().version_string)() };
		self.take_string(s).unwrap_or_default()
	}

	fn create(&self, kind: HandleKind, params: Value) -> NativeResult<RawHandle> {
		let params = json_cstring(&params)?;
		let mut id = 0u64;
		let mut error = ptr::null_mut();
		let status = unsafe { (self.vt().create)(kind.as_u32(), params.as_ptr(), &mut id, &mut error) };
		self.check(status, error)?;
		Ok(RawHandle::new(kind, id))
	}

	fn release(&self, handle: RawHandle) {
		unsafe { (self.vt().release)(handle.kind.as_u32(), handle.id) };
	}

	fn get(&self, handle: RawHandle, name: &str) -> NativeResult<Value> {
		let name = cstring(name)?;
		let mut value = ptr::null_mut();
		let mut error = ptr::null_mut();
		let status = unsafe {
			(self.vt().get)(handle.kind.as_u32(), handle.id, name.as_ptr(), &mut value, &mut error)
		};
		self.check(status, error)?;
		self.take_value(value)
	}

	fn set(&self, handle: RawHandle, name: &str, value: Value) -> NativeResult<()> {
		let name = cstring(name)?;
		let value = json_cstring(&value)?;
		let mut error = ptr::null_mut();
		let status = unsafe {
			(self.vt().set)(handle.kind.as_u32(), handle.id, name.as_ptr(), value.as_ptr(), &mut error)
		};
		self.check(status, error)
	}

	fn invoke(&self, handle: RawHandle, method: &str, params: Value) -> NativeResult<Value> {
		let method = cstring(method)?;
		let params = json_cstring(&params)?;
		let mut result = ptr::null_mut();
		let mut error = ptr::null_mut();
		let status = unsafe {
			(self.vt().invoke)(
				handle.kind.as_u32(),
				handle.id,
				method.as_ptr(),
				params.as_ptr(),
				&mut result,
				&mut error,
			)
		};
		self.check(status, error)?;
		self.take_value(result)
	}

	fn start(&self, handle: RawHandle, method: &str, params: Value, cancellable: &Cancellable, done: NativeCompletion) {
		let (method, params) = match (cstring(method), json_cstring(&params)) {
			(Ok(method), Ok(params)) => (method, params),
			(Err(err), _) | (_, Err(err)) => return done(Err(err)),
		};

		let native = Arc::new(NativeCancellable {
			ptr: unsafe { (self.vt().cancellable_new)() },
			vtable: self.vtable,
		});
		let on_cancel = {
			let native = Arc::clone(&native);
			cancellable.connect(move || unsafe { ((*native.vtable).cancellable_cancel)(native.ptr) })
		};
		let cancellable_ptr = native.ptr;
		let context = Box::new(StartContext {
			done,
			_cancellable: native,
			_on_cancel: on_cancel,
		});

		unsafe {
			(self.vt().start)(
				handle.kind.as_u32(),
				handle.id,
				method.as_ptr(),
				params.as_ptr(),
				cancellable_ptr,
				complete_trampoline,
				Box::into_raw(context).cast(),
			)
		};
	}

	fn connect(&self, handle: RawHandle, signal: &str, handler: SignalHandler) -> NativeResult<SignalId> {
		let signal = cstring(signal)?;
		let user_data = Box::into_raw(Box::new(handler)).cast::<c_void>();
		let mut handler_id = 0u64;
		let mut error = ptr::null_mut();
		let status = unsafe {
			(self.vt().connect)(
				handle.kind.as_u32(),
				handle.id,
				signal.as_ptr(),
				signal_trampoline,
				user_data,
				signal_destroy,
				&mut handler_id,
				&mut error,
			)
		};
		if let Err(err) = self.check(status, error) {
			unsafe { signal_destroy(user_data) };
			return Err(err);
		}
		Ok(handler_id)
	}

	fn disconnect(&self, handle: RawHandle, id: SignalId) {
		unsafe { (self.vt().disconnect)(handle.kind.as_u32(), handle.id, id) };
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_load_missing_library_is_library_error() {
		let dir = tempfile::tempdir().unwrap();
		let err = DylibCore::load(&dir.path().join("missing.so")).err().unwrap();
		assert!(matches!(err, Error::Library(_)));
	}

	#[test]
	fn test_error_payload_parsing() {
		let err = parse_error(r#"{"code": 3, "message": "no such process"}"#);
		assert_eq!(err.code, NativeErrorCode::ProcessNotFound);
		let err = parse_error("segfault-ish garbage");
		assert_eq!(err.code, NativeErrorCode::Other(-1));
		assert_eq!(err.message, "segfault-ish garbage");
	}
}
