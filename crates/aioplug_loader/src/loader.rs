//! Dynamic backend loading using libloading.

use crate::config::{backend_name_from_file, LoaderConfig, ReloadPolicy};
use crate::error::{LoadError, LoadResult};
use crate::facade::Facade;
use crate::registry::BackendRegistry;
use crate::stats::LoaderStats;
use aioplug_device::{
    device_from_raw, symbol_name, AbiVersionFn, Device, DeviceFactoryFn, ABI_VERSION_SYMBOL,
    AIOPLUG_ABI_VERSION, FACTORY_SYMBOL,
};
use libloading::{Library, Symbol};
use parking_lot::RwLock;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Where a backend instance came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendSource {
    /// Constructed by a factory in the loader's [`BackendRegistry`].
    Builtin,
    /// Constructed from a code image on disk.
    Library(PathBuf),
}

/// A backend the loader can load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendInfo {
    /// Name passed to [`PluginLoader::load`].
    pub name: String,
    /// Where the backend would be loaded from.
    pub source: BackendSource,
}

/// A backend instance together with the code image that defines it.
pub(crate) struct LoadedBackend {
    name: String,
    source: BackendSource,
    generation: u64,
    // Fields drop in declaration order: the instance's code lives in
    // `library`, so `device` must stay above it.
    device: Box<dyn Device>,
    library: Option<Library>,
}

impl LoadedBackend {
    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }

    pub(crate) fn device(&self) -> &dyn Device {
        self.device.as_ref()
    }
}

impl Drop for LoadedBackend {
    fn drop(&mut self) {
        tracing::debug!(
            backend = %self.name,
            generation = self.generation,
            library = self.library.is_some(),
            "backend instance destroyed"
        );
    }
}

/// Owns the load/unload lifecycle of one backend.
///
/// A loader is either *Unloaded* or *Loaded*. [`load`](Self::load) maps a
/// backend name to `<root>/<plugin_dir>/<name>_op.<ext>` (or to a builtin
/// factory), opens the code image, checks its ABI version, calls its factory
/// and adopts both the image and the instance. Callers reach the backend
/// only through a [`Facade`].
///
/// The current backend is reference counted: an operation already running
/// on a facade keeps its backend (and code image) alive across a reload,
/// and the old backend is released once that operation returns.
///
/// # Trust
///
/// Loading runs code from the plugin directory with the privileges of the
/// host. Only point the loader at directories holding trusted backends.
///
/// # Example
///
/// ```rust,ignore
/// use aioplug_loader::{LoaderConfig, PluginLoader};
/// use std::sync::Arc;
///
/// let loader = Arc::new(PluginLoader::new(LoaderConfig::default()));
/// loader.load("nvme")?;
/// let facade = loader.facade();
/// println!("block size: {}", facade.block_size()?);
/// ```
pub struct PluginLoader {
    config: LoaderConfig,
    registry: BackendRegistry,
    current: RwLock<Option<Arc<LoadedBackend>>>,
    generation: AtomicU64,
    stats: LoaderStats,
}

impl PluginLoader {
    /// Creates an unloaded loader with an empty registry.
    #[must_use]
    pub fn new(config: LoaderConfig) -> Self {
        Self::with_registry(config, BackendRegistry::new())
    }

    /// Creates an unloaded loader that consults `registry` before disk.
    #[must_use]
    pub fn with_registry(config: LoaderConfig, registry: BackendRegistry) -> Self {
        Self {
            config,
            registry,
            current: RwLock::new(None),
            generation: AtomicU64::new(0),
            stats: LoaderStats::new(),
        }
    }

    /// Returns the loader configuration.
    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    /// Returns the builtin registry.
    pub fn registry(&self) -> &BackendRegistry {
        &self.registry
    }

    /// Returns the loader statistics.
    pub fn stats(&self) -> &LoaderStats {
        &self.stats
    }

    /// Creates a facade bound to this loader.
    #[must_use]
    pub fn facade(self: &Arc<Self>) -> Facade {
        Facade::new(Arc::clone(self))
    }

    /// Loads the backend called `name`, replacing the current one.
    ///
    /// Under [`ReloadPolicy::DiscardOnFailure`] the current backend is
    /// released before anything else happens, so a failure leaves the
    /// loader unloaded. Under [`ReloadPolicy::KeepLastGood`] the current
    /// backend is replaced only once the new one is constructed.
    ///
    /// Concurrent calls are serialised.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `name` is empty or contains a path separator
    /// - The code image cannot be opened
    /// - A plugin symbol is missing or the ABI version differs
    /// - The factory returns no instance
    pub fn load(&self, name: &str) -> LoadResult<()> {
        let mut current = self.current.write();

        if self.config.reload_policy == ReloadPolicy::DiscardOnFailure {
            if let Some(previous) = current.take() {
                self.release(previous);
            }
        }

        let generation = self.generation.load(Ordering::Acquire) + 1;
        match self.open_backend(name, generation) {
            Ok(backend) => {
                let source = backend.source.clone();
                if let Some(previous) = current.replace(Arc::new(backend)) {
                    self.release(previous);
                }
                self.generation.store(generation, Ordering::Release);
                self.stats.record_load();
                tracing::info!(backend = name, generation, source = ?source, "backend loaded");
                Ok(())
            }
            Err(e) => {
                self.stats.record_load_failure();
                tracing::error!(
                    backend = name,
                    error = %e,
                    kept_previous = current.is_some(),
                    "backend load failed"
                );
                Err(e)
            }
        }
    }

    /// Releases the current backend.
    ///
    /// Returns true if a backend was loaded.
    pub fn unload(&self) -> bool {
        let previous = self.current.write().take();
        match previous {
            Some(backend) => {
                self.release(backend);
                true
            }
            None => false,
        }
    }

    /// Returns true if a backend is loaded.
    pub fn is_loaded(&self) -> bool {
        self.current.read().is_some()
    }

    /// Name of the loaded backend.
    pub fn backend_name(&self) -> Option<String> {
        self.current.read().as_ref().map(|b| b.name.clone())
    }

    /// Source of the loaded backend.
    pub fn backend_source(&self) -> Option<BackendSource> {
        self.current.read().as_ref().map(|b| b.source.clone())
    }

    /// Number of successful loads so far; identifies the current backend.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Lists loadable backends: builtin names plus code images following the
    /// naming convention in the plugin directory. Sorted by name; a builtin
    /// shadows a code image of the same name.
    pub fn discover(&self) -> Vec<BackendInfo> {
        let mut found: Vec<BackendInfo> = self
            .registry
            .names()
            .into_iter()
            .map(|name| BackendInfo {
                name,
                source: BackendSource::Builtin,
            })
            .collect();

        if let Ok(entries) = std::fs::read_dir(self.config.plugin_path()) {
            for entry in entries.flatten() {
                let path = entry.path();
                if !path.is_file() {
                    continue;
                }
                if let Some(name) = backend_name_from_file(&path) {
                    if !self.registry.contains(&name) {
                        found.push(BackendInfo {
                            name,
                            source: BackendSource::Library(path),
                        });
                    }
                }
            }
        }

        found.sort_by(|a, b| a.name.cmp(&b.name));
        found
    }

    pub(crate) fn current(&self) -> Option<Arc<LoadedBackend>> {
        self.current.read().clone()
    }

    fn release(&self, backend: Arc<LoadedBackend>) {
        self.stats.record_unload();
        tracing::info!(
            backend = %backend.name,
            generation = backend.generation,
            in_flight = Arc::strong_count(&backend) - 1,
            "unloading backend"
        );
    }

    fn open_backend(&self, name: &str, generation: u64) -> LoadResult<LoadedBackend> {
        validate_name(name)?;

        if let Some(factory) = self.registry.get(name) {
            let device = factory().map_err(|e| LoadError::Builtin {
                name: name.to_string(),
                reason: e.to_string(),
            })?;
            return Ok(LoadedBackend {
                name: name.to_string(),
                source: BackendSource::Builtin,
                generation,
                device,
                library: None,
            });
        }

        let path = self.config.library_path(name);
        tracing::debug!(backend = name, path = %path.display(), "opening code image");

        // SAFETY: Opening a library runs its initialisers. The plugin
        // directory is trusted configuration (see the type docs).
        let library = unsafe { Library::new(&path) }.map_err(|e| LoadError::Open {
            path: path.clone(),
            reason: e.to_string(),
        })?;

        // SAFETY: The library was just opened and comes from the trusted
        // plugin directory. On error it is closed when `library` drops.
        let device = unsafe { instantiate(&library, name)? };

        Ok(LoadedBackend {
            name: name.to_string(),
            source: BackendSource::Library(path),
            generation,
            device,
            library: Some(library),
        })
    }
}

impl Drop for PluginLoader {
    fn drop(&mut self) {
        if let Some(backend) = self.current.get_mut().take() {
            self.release(backend);
        }
    }
}

impl std::fmt::Debug for PluginLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginLoader")
            .field("plugin_path", &self.config.plugin_path())
            .field("backend", &self.backend_name())
            .field("generation", &self.generation())
            .finish()
    }
}

fn validate_name(name: &str) -> LoadResult<()> {
    let invalid = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\', '\0']);
    if invalid {
        return Err(LoadError::InvalidName(name.to_string()));
    }
    Ok(())
}

/// Checks the ABI version and calls the factory of an opened code image.
///
/// # Safety
///
/// `library` must be an aioplug backend image: its exported symbols must
/// have the signatures declared in `aioplug_device`.
unsafe fn instantiate(library: &Library, name: &str) -> LoadResult<Box<dyn Device>> {
    // SAFETY: Caller guarantees the symbol has the AbiVersionFn signature.
    let version: Symbol<AbiVersionFn> =
        unsafe { library.get(ABI_VERSION_SYMBOL) }.map_err(|e| LoadError::MissingSymbol {
            symbol: symbol_name(ABI_VERSION_SYMBOL),
            reason: e.to_string(),
        })?;

    // SAFETY: Calling a C function without arguments from the trusted image.
    let actual = unsafe { version() };
    if actual != AIOPLUG_ABI_VERSION {
        return Err(LoadError::AbiMismatch {
            expected: AIOPLUG_ABI_VERSION,
            actual,
        });
    }

    // SAFETY: Caller guarantees the symbol has the DeviceFactoryFn signature.
    let factory: Symbol<DeviceFactoryFn> =
        unsafe { library.get(FACTORY_SYMBOL) }.map_err(|e| LoadError::MissingSymbol {
            symbol: symbol_name(FACTORY_SYMBOL),
            reason: e.to_string(),
        })?;

    // SAFETY: The ABI version matched, so the factory follows the contract
    // of device_into_raw.
    let raw = unsafe { factory() };
    if raw.is_null() {
        return Err(LoadError::NullInstance {
            name: name.to_string(),
        });
    }

    // SAFETY: Non-null pointer produced by device_into_raw in an image with
    // the same ABI version. Ownership passes to us here.
    Ok(unsafe { device_from_raw(raw) })
}
