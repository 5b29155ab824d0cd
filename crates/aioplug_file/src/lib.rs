//! # aioplug file backend
//!
//! Reference [`Device`](aioplug_device::Device) implementation over ordinary
//! files. Built as a `cdylib`, it is a loadable backend: copy the library
//! into the plugin directory as `file_op.<ext>` and load it by name.
//!
//! ```text
//! cp target/release/libaioplug_file.so aioplug/plugins/file_op.so
//! aioplug probe file
//! ```
//!
//! The plugin factory takes no arguments, so the loaded backend reads its
//! configuration from `AIOPLUG_*` environment variables
//! (see [`DeviceConfig::from_env`](aioplug_device::DeviceConfig::from_env)).
//! Linked as an `rlib` it can also be constructed directly.

#![warn(missing_docs)]

mod device;
mod digest;
mod io;
mod pinned;
mod pool;

pub use device::FileDevice;

aioplug_device::export_device!(FileDevice::from_env);
