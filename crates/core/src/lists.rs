//! Snapshot lists returned by enumerations.
//!
//! Each list is a [`NativeList`]: disposing it releases only the list,
//! never elements already fetched from it.

use frida_runtime::NativeList;

use crate::{Application, Child, Device, Process, Spawn};

pub type DeviceList = NativeList<Device>;
pub type ProcessList = NativeList<Process>;
pub type ApplicationList = NativeList<Application>;
pub type SpawnList = NativeList<Spawn>;
pub type ChildList = NativeList<Child>;
