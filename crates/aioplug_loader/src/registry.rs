//! Registry of in-process backend factories.

use aioplug_device::{Device, DeviceResult};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// A factory constructing a backend in-process.
pub type BuiltinFactory = Arc<dyn Fn() -> DeviceResult<Box<dyn Device>> + Send + Sync>;

/// Maps backend names to in-process factories.
///
/// A [`PluginLoader`](crate::PluginLoader) consults its registry before the
/// on-disk plugin convention, so a registered name never touches the dynamic
/// linker. Hosts use this for statically linked backends; tests use it for
/// instrumented ones.
///
/// # Example
///
/// ```rust,ignore
/// let registry = BackendRegistry::new();
/// registry.register("file", || Ok(Box::new(FileDevice::new(DeviceConfig::default())?) as Box<dyn Device>));
/// assert!(registry.contains("file"));
/// ```
#[derive(Default, Clone)]
pub struct BackendRegistry {
    factories: Arc<RwLock<HashMap<String, BuiltinFactory>>>,
}

impl BackendRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `factory` under `name`, replacing any previous entry.
    pub fn register<F>(&self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> DeviceResult<Box<dyn Device>> + Send + Sync + 'static,
    {
        self.factories.write().insert(name.into(), Arc::new(factory));
    }

    /// Removes the factory registered under `name`.
    ///
    /// Returns true if an entry was removed.
    pub fn unregister(&self, name: &str) -> bool {
        self.factories.write().remove(name).is_some()
    }

    /// Returns true if `name` has a registered factory.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.factories.read().contains_key(name)
    }

    /// Registered names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Returns the factory registered under `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<BuiltinFactory> {
        self.factories.read().get(name).cloned()
    }
}

impl std::fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendRegistry")
            .field("names", &self.names())
            .finish()
    }
}
