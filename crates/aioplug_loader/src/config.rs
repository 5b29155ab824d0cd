//! Loader configuration.

use std::env::consts::DLL_EXTENSION;
use std::path::{Path, PathBuf};

/// Plugin directory, relative to the loader root.
pub const DEFAULT_PLUGIN_DIR: &str = "aioplug/plugins";

/// Suffix appended to a backend name, before the platform library extension.
pub const PLUGIN_SUFFIX: &str = "_op";

/// What happens to the current backend when a reload fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReloadPolicy {
    /// Release the current backend before attempting the new one. A failed
    /// load leaves the loader unloaded.
    #[default]
    DiscardOnFailure,
    /// Build the new backend first and swap only on success. A failed load
    /// keeps the previous backend.
    KeepLastGood,
}

/// Configuration for a [`PluginLoader`](crate::PluginLoader).
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    /// Directory the plugin directory is resolved against.
    pub root: PathBuf,

    /// Plugin directory, relative to `root`.
    pub plugin_dir: PathBuf,

    /// Behaviour of a failed reload.
    pub reload_policy: ReloadPolicy,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            root: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            plugin_dir: PathBuf::from(DEFAULT_PLUGIN_DIR),
            reload_policy: ReloadPolicy::default(),
        }
    }
}

impl LoaderConfig {
    /// Creates a configuration rooted at the current working directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the root directory.
    #[must_use]
    pub fn root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = root.into();
        self
    }

    /// Sets the plugin directory, relative to the root.
    #[must_use]
    pub fn plugin_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.plugin_dir = dir.into();
        self
    }

    /// Sets the reload policy.
    #[must_use]
    pub fn reload_policy(mut self, policy: ReloadPolicy) -> Self {
        self.reload_policy = policy;
        self
    }

    /// Absolute directory scanned for code images.
    #[must_use]
    pub fn plugin_path(&self) -> PathBuf {
        self.root.join(&self.plugin_dir)
    }

    /// Path of the code image for `name`.
    #[must_use]
    pub fn library_path(&self, name: &str) -> PathBuf {
        self.plugin_path().join(plugin_file_name(name))
    }
}

/// File name of the code image for backend `name`, e.g. `nvme_op.so`.
#[must_use]
pub fn plugin_file_name(name: &str) -> String {
    format!("{name}{PLUGIN_SUFFIX}.{DLL_EXTENSION}")
}

/// Backend name for a code image file name, if it follows the convention.
#[must_use]
pub fn backend_name_from_file(path: &Path) -> Option<String> {
    if path.extension()?.to_str()? != DLL_EXTENSION {
        return None;
    }
    let stem = path.file_stem()?.to_str()?;
    let name = stem.strip_suffix(PLUGIN_SUFFIX)?;
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}
