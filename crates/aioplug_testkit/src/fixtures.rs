//! Loader fixtures.
//!
//! Helpers for setting up a loader over a scratch directory with
//! instrumented in-memory backends.

use crate::memory::{LiveCounter, MemoryDevice, MemoryStore};
use aioplug_device::{Device, DeviceConfig, DeviceError};
use aioplug_loader::{
    plugin_file_name, BackendRegistry, Facade, LoaderConfig, PluginLoader, ReloadPolicy,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

/// Configuration of the first standard test backend.
#[must_use]
pub fn config_a() -> DeviceConfig {
    DeviceConfig::new()
        .with_block_size(4096)
        .with_queue_depth(8)
        .with_single_submit(false)
        .with_overlap_events(true)
        .with_thread_count(1)
}

/// Configuration of the second standard test backend, differing from
/// [`config_a`] in every query.
#[must_use]
pub fn config_b() -> DeviceConfig {
    DeviceConfig::new()
        .with_block_size(65536)
        .with_queue_depth(32)
        .with_single_submit(true)
        .with_overlap_events(false)
        .with_thread_count(4)
}

/// A registry of in-memory backends sharing one store and one live counter.
#[derive(Debug, Clone, Default)]
pub struct TestPlugins {
    /// Registry to hand to a loader.
    pub registry: BackendRegistry,
    /// Counts instances constructed through this registry.
    pub live: LiveCounter,
    /// Files shared by every instance.
    pub store: MemoryStore,
}

impl TestPlugins {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a set with `a` and `b` registered with [`config_a`] and
    /// [`config_b`].
    #[must_use]
    pub fn standard() -> Self {
        let plugins = Self::new();
        plugins.register("a", config_a());
        plugins.register("b", config_b());
        plugins
    }

    /// Registers a [`MemoryDevice`] backend under `name`.
    pub fn register(&self, name: &str, config: DeviceConfig) {
        let live = self.live.clone();
        let store = self.store.clone();
        self.registry.register(name, move || {
            let device = MemoryDevice::with_config(config.clone())
                .with_store(store.clone())
                .with_live_counter(&live);
            Ok(Box::new(device) as Box<dyn Device>)
        });
    }

    /// Registers a backend whose construction always fails.
    pub fn register_failing(&self, name: &str, reason: &str) {
        let reason = reason.to_string();
        self.registry
            .register(name, move || Err(DeviceError::Backend(reason.clone())));
    }
}

/// A loader rooted in a temporary directory.
///
/// The plugin directory exists and is empty; the scratch directory holds
/// data files for transfers.
pub struct TestLoader {
    /// The loader.
    pub loader: Arc<PluginLoader>,
    /// Backends registered with the loader.
    pub plugins: TestPlugins,
    temp_dir: TempDir,
}

impl TestLoader {
    /// Creates a loader with the standard plugins and the default policy.
    pub fn new() -> Self {
        Self::with_policy(ReloadPolicy::default())
    }

    /// Creates a loader with the standard plugins and `policy`.
    pub fn with_policy(policy: ReloadPolicy) -> Self {
        Self::with_plugins(TestPlugins::standard(), policy)
    }

    /// Creates a loader over `plugins`.
    pub fn with_plugins(plugins: TestPlugins, policy: ReloadPolicy) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let config = LoaderConfig::new()
            .root(temp_dir.path())
            .reload_policy(policy);
        std::fs::create_dir_all(config.plugin_path()).expect("Failed to create plugin directory");
        std::fs::create_dir_all(temp_dir.path().join("data"))
            .expect("Failed to create data directory");

        let loader = Arc::new(PluginLoader::with_registry(config, plugins.registry.clone()));
        Self {
            loader,
            plugins,
            temp_dir,
        }
    }

    /// Returns a facade bound to the loader.
    pub fn facade(&self) -> Facade {
        self.loader.facade()
    }

    /// Root directory of the loader.
    pub fn root(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Directory scanned for code images.
    pub fn plugin_dir(&self) -> PathBuf {
        self.loader.config().plugin_path()
    }

    /// Path for a data file named `name`.
    pub fn data_path(&self, name: &str) -> PathBuf {
        self.temp_dir.path().join("data").join(name)
    }

    /// Writes `contents` as the code image for backend `name`.
    pub fn install_image(&self, name: &str, contents: &[u8]) -> PathBuf {
        let path = self.plugin_dir().join(plugin_file_name(name));
        std::fs::write(&path, contents).expect("Failed to write plugin image");
        path
    }

    /// Links an existing library into the plugin directory as backend `name`.
    ///
    /// Copies where symlinks are unavailable.
    pub fn install_library(&self, name: &str, library: &Path) -> PathBuf {
        let path = self.plugin_dir().join(plugin_file_name(name));
        #[cfg(unix)]
        std::os::unix::fs::symlink(library, &path).expect("Failed to link plugin library");
        #[cfg(not(unix))]
        std::fs::copy(library, &path).expect("Failed to copy plugin library");
        path
    }
}

impl Default for TestLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Runs a test with a fresh [`TestLoader`].
///
/// # Example
///
/// ```rust,ignore
/// use aioplug_testkit::with_loader;
///
/// #[test]
/// fn my_test() {
///     with_loader(|t| {
///         t.loader.load("a").unwrap();
///         assert_eq!(t.facade().block_size().unwrap(), 4096);
///     });
/// }
/// ```
pub fn with_loader<F, R>(f: F) -> R
where
    F: FnOnce(&TestLoader) -> R,
{
    let fixture = TestLoader::new();
    f(&fixture)
}

/// Finds a shared library that exists on this system but exports none of
/// the plugin symbols.
pub fn foreign_library() -> Option<PathBuf> {
    const CANDIDATES: &[&str] = &[
        "/lib/x86_64-linux-gnu/libc.so.6",
        "/lib/aarch64-linux-gnu/libc.so.6",
        "/usr/lib/x86_64-linux-gnu/libc.so.6",
        "/usr/lib/aarch64-linux-gnu/libc.so.6",
        "/lib64/libc.so.6",
        "/usr/lib64/libc.so.6",
        "/lib/libc.so.6",
        "/usr/lib/libc.so.6",
        "/lib/ld-musl-x86_64.so.1",
        "/lib/ld-musl-aarch64.so.1",
        "/usr/lib/libSystem.B.dylib",
        "C:\\Windows\\System32\\kernel32.dll",
    ];
    CANDIDATES
        .iter()
        .map(PathBuf::from)
        .find(|path| path.exists())
}

/// Finds the `cdylib` built for workspace crate `crate_name`, next to the
/// running test executable.
pub fn built_plugin(crate_name: &str) -> Option<PathBuf> {
    use std::env::consts::{DLL_EXTENSION, DLL_PREFIX};

    let file = format!("{DLL_PREFIX}{crate_name}.{DLL_EXTENSION}");
    let exe = std::env::current_exe().ok()?;
    let deps = exe.parent()?;
    [deps.to_path_buf(), deps.parent()?.to_path_buf()]
        .into_iter()
        .map(|dir| dir.join(&file))
        .find(|path| path.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_configs_differ() {
        let a = config_a();
        let b = config_b();
        assert_ne!(a.block_size, b.block_size);
        assert_ne!(a.queue_depth, b.queue_depth);
        assert_ne!(a.single_submit, b.single_submit);
        assert_ne!(a.overlap_events, b.overlap_events);
        assert_ne!(a.thread_count, b.thread_count);
    }

    #[test]
    fn fixture_layout() {
        with_loader(|t| {
            assert!(t.plugin_dir().is_dir());
            assert!(t.data_path("x").parent().unwrap().is_dir());
            assert!(!t.loader.is_loaded());
            assert_eq!(t.plugins.registry.names(), vec!["a", "b"]);
        });
    }

    #[test]
    fn installed_image_is_discovered() {
        with_loader(|t| {
            t.install_image("disk", b"not a library");
            let names: Vec<String> = t.loader.discover().into_iter().map(|b| b.name).collect();
            assert_eq!(names, vec!["a", "b", "disk"]);
        });
    }

    #[test]
    fn registered_backends_are_counted() {
        with_loader(|t| {
            t.loader.load("a").unwrap();
            assert_eq!(t.plugins.live.get(), 1);
            t.loader.unload();
            assert_eq!(t.plugins.live.get(), 0);
        });
    }
}
