//! # aioplug loader
//!
//! Run-time selection of aioplug device backends.
//!
//! The host names a backend; the [`PluginLoader`] maps the name to a code
//! image under its plugin directory (or to a builtin factory), verifies the
//! plugin ABI, constructs the backend and keeps the image open for as long
//! as the backend lives. Callers talk to the backend through a [`Facade`],
//! whose operations keep working across reloads and fail with
//! `DeviceError::NoBackend` while nothing is loaded.
//!
//! ## Lifecycle
//!
//! ```text
//! Unloaded --load(ok)--> Loaded(name)
//! Loaded   --load(ok)--> Loaded(other)   previous backend released
//! Loaded   --load(err)-> Unloaded        (ReloadPolicy::DiscardOnFailure)
//! Loaded   --load(err)-> Loaded          (ReloadPolicy::KeepLastGood)
//! Loaded   --unload----> Unloaded
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use aioplug_device::{ElementType, IoBuffer};
//! use aioplug_loader::{LoaderConfig, PluginLoader};
//! use std::sync::Arc;
//!
//! let loader = Arc::new(PluginLoader::new(LoaderConfig::new().root("/opt/app")));
//! loader.load("posix")?;
//!
//! let facade = loader.facade();
//! let buffer = IoBuffer::zeroed(ElementType::F32, 1024);
//! facade.write(&buffer, "/data/tensor.bin".as_ref(), true)?;
//! ```

#![warn(missing_docs)]

mod config;
mod error;
mod facade;
mod loader;
mod registry;
mod stats;

pub use config::{
    backend_name_from_file, plugin_file_name, LoaderConfig, ReloadPolicy, DEFAULT_PLUGIN_DIR,
    PLUGIN_SUFFIX,
};
pub use error::{LoadError, LoadResult};
pub use facade::Facade;
pub use loader::{BackendInfo, BackendSource, PluginLoader};
pub use registry::{BackendRegistry, BuiltinFactory};
pub use stats::{LoaderStats, StatsSnapshot};
