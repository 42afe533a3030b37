//! Generic wrapper over index-addressable native lists.
//!
//! A list is a snapshot taken by the native core. Every element fetched
//! from it is a new, independently owned wrapper: disposing the list
//! releases only the list container, and disposing an element never
//! affects the list.

use std::fmt;
use std::marker::PhantomData;

use serde_json::{Value, json};

use crate::decode::FromNative;
use crate::error::{Error, Result};
use crate::handle::Kind;
use crate::native::Core;
use crate::owned::{Disposable, HandleCell, Owned};

/// An element type that native lists of kind [`List`](Self::List) yield.
pub trait Element: FromNative {
	type List: Kind;
}

/// A disposable native list of `E`.
pub struct NativeList<E: Element> {
	owned: Owned<E::List>,
	_element: PhantomData<fn() -> E>,
}

impl<E: Element> NativeList<E> {
	pub fn from_owned(owned: Owned<E::List>) -> Self {
		Self {
			owned,
			_element: PhantomData,
		}
	}

	/// Number of elements in the snapshot.
	pub fn len(&self) -> Result<usize> {
		self.owned.invoke("size", Value::Null)
	}

	pub fn is_empty(&self) -> Result<bool> {
		Ok(self.len()? == 0)
	}

	/// Fetches the element at `index` as a new owned wrapper.
	pub fn get(&self, index: usize) -> Result<E> {
		let len = self.len()?;
		if index >= len {
			return Err(Error::IndexOutOfRange { index, len });
		}
		self.owned.invoke("get", json!({ "index": index }))
	}

	/// Materializes every element. Each must be disposed by the caller
	/// (dropping the vector does so).
	pub fn to_vec(&self) -> Result<Vec<E>> {
		let len = self.len()?;
		let mut items = Vec::with_capacity(len);
		for index in 0..len {
			items.push(self.owned.invoke("get", json!({ "index": index }))?);
		}
		Ok(items)
	}

	pub fn iter(&self) -> Iter<'_, E> {
		Iter {
			list: self,
			next: 0,
			len: None,
		}
	}
}

impl<E: Element> Disposable for NativeList<E> {
	fn handle_cell(&self) -> &HandleCell {
		self.owned.cell()
	}
}

impl<E: Element> FromNative for NativeList<E> {
	fn from_native(core: &Core, value: Value) -> Result<Self> {
		Owned::from_native(core, value).map(Self::from_owned)
	}
}

impl<E: Element> fmt::Debug for NativeList<E> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_tuple("NativeList").field(&self.owned).finish()
	}
}

impl<'a, E: Element> IntoIterator for &'a NativeList<E> {
	type Item = Result<E>;
	type IntoIter = Iter<'a, E>;

	fn into_iter(self) -> Self::IntoIter {
		self.iter()
	}
}

/// Iterator over a [`NativeList`], fetching one element per step.
///
/// The length is read on the first step; an error ends the iteration after
/// it has been yielded.
pub struct Iter<'a, E: Element> {
	list: &'a NativeList<E>,
	next: usize,
	len: Option<usize>,
}

impl<E: Element> Iterator for Iter<'_, E> {
	type Item = Result<E>;

	fn next(&mut self) -> Option<Self::Item> {
		let len = match self.len {
			Some(len) => len,
			None => match self.list.len() {
				Ok(len) => *self.len.insert(len),
				Err(err) => {
					self.len = Some(0);
					return Some(Err(err));
				}
			},
		};
		if self.next >= len {
			return None;
		}
		let index = self.next;
		self.next += 1;
		let item = self.list.owned.invoke("get", json!({ "index": index }));
		if item.is_err() {
			self.next = len;
		}
		Some(item)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::handle::{HandleKind, kind};
	use crate::sim::SimCore;
	use std::sync::Arc;

	#[derive(Debug)]
	struct Dev(Owned<kind::Device>);

	impl FromNative for Dev {
		fn from_native(core: &Core, value: Value) -> Result<Self> {
			Owned::from_native(core, value).map(Dev)
		}
	}

	impl Element for Dev {
		type List = kind::DeviceList;
	}

	fn device_list() -> (Arc<SimCore>, Owned<kind::DeviceManager>, NativeList<Dev>) {
		let sim = SimCore::new();
		let core: Core = sim.clone();
		let manager = Owned::<kind::DeviceManager>::create(&core, Value::Null).unwrap();
		let list = crate::Call::<NativeList<Dev>>::new(&manager, "enumerate_devices", Value::Null)
			.sync(None)
			.unwrap();
		(sim, manager, list)
	}

	#[test]
	fn test_get_within_bounds_and_out_of_range() {
		let (_sim, _manager, list) = device_list();
		let len = list.len().unwrap();
		assert!(len > 0);
		for i in 0..len {
			let dev = list.get(i).unwrap();
			assert_eq!(dev.0.raw().kind, HandleKind::Device);
		}
		match list.get(len) {
			Err(Error::IndexOutOfRange { index, len: l }) => {
				assert_eq!(index, len);
				assert_eq!(l, len);
			}
			Err(err) => panic!("Expected IndexOutOfRange, got {err}"),
			Ok(_) => panic!("Expected IndexOutOfRange, got an element"),
		}
	}

	#[test]
	fn test_each_get_yields_distinct_owner() {
		let (_sim, _manager, list) = device_list();
		let a = list.get(0).unwrap();
		let b = list.get(0).unwrap();
		assert_ne!(a.0.raw(), b.0.raw());
		a.0.dispose();
		let name: String = b.0.get("name").unwrap();
		assert!(!name.is_empty());
	}

	#[test]
	fn test_disposing_list_keeps_elements() {
		let (sim, _manager, list) = device_list();
		let first = list.get(0).unwrap();
		let list_raw = list.owned.raw();
		list.dispose();
		assert_eq!(sim.release_count(list_raw), 1);

		let id: String = first.0.get("id").unwrap();
		assert!(!id.is_empty());
		assert_eq!(sim.release_count(first.0.raw()), 0);
	}

	#[test]
	fn test_len_after_dispose_is_use_after_dispose() {
		let (_sim, _manager, list) = device_list();
		list.len().unwrap();
		list.dispose();
		assert!(list.len().unwrap_err().is_use_after_dispose());
		assert!(list.get(0).unwrap_err().is_use_after_dispose());
	}

	#[test]
	fn test_to_vec_and_iter_agree() {
		let (_sim, _manager, list) = device_list();
		let all = list.to_vec().unwrap();
		let iterated: Vec<Dev> = list.iter().collect::<Result<_>>().unwrap();
		assert_eq!(all.len(), list.len().unwrap());
		assert_eq!(iterated.len(), all.len());
	}
}
