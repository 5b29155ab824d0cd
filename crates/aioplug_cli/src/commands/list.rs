//! List command implementation.

use aioplug_loader::{BackendSource, PluginLoader};
use serde::Serialize;

/// One loadable backend.
#[derive(Debug, Serialize)]
pub struct ListEntry {
    /// Backend name.
    pub name: String,
    /// `builtin` or the path of the code image.
    pub source: String,
}

/// Runs the list command.
pub fn run(loader: &PluginLoader, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let entries = entries(loader);

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&entries)?);
        }
        _ => {
            println!(
                "Plugin directory: {}",
                loader.config().plugin_path().display()
            );
            if entries.is_empty() {
                println!("No backends found");
            }
            for entry in &entries {
                println!("  {:<16} {}", entry.name, entry.source);
            }
        }
    }

    Ok(())
}

fn entries(loader: &PluginLoader) -> Vec<ListEntry> {
    loader
        .discover()
        .into_iter()
        .map(|info| ListEntry {
            name: info.name,
            source: match info.source {
                BackendSource::Builtin => "builtin".to_string(),
                BackendSource::Library(path) => path.display().to_string(),
            },
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use aioplug_loader::{plugin_file_name, LoaderConfig};
    use tempfile::tempdir;

    #[test]
    fn lists_images_in_plugin_dir() {
        let dir = tempdir().unwrap();
        let config = LoaderConfig::new().root(dir.path()).plugin_dir("plugins");
        std::fs::create_dir_all(config.plugin_path()).unwrap();
        std::fs::write(config.plugin_path().join(plugin_file_name("nvme")), b"").unwrap();

        let loader = PluginLoader::new(config);
        let listed = entries(&loader);
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name, "nvme");
        assert!(listed[0].source.ends_with(&plugin_file_name("nvme")));
    }
}
