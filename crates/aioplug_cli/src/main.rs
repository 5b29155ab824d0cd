//! aioplug CLI
//!
//! Command-line tools for inspecting and exercising aioplug backends.
//!
//! # Commands
//!
//! - `list` - List backends the loader can find
//! - `probe` - Load a backend and print its configuration
//! - `roundtrip` - Write a buffer through a backend and read it back

mod commands;

use aioplug_device::{Device, ElementType};
use aioplug_file::FileDevice;
use aioplug_loader::{BackendRegistry, LoaderConfig, PluginLoader, DEFAULT_PLUGIN_DIR};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Name under which the file backend is available without a code image.
const BUILTIN_FILE: &str = "file";

/// aioplug backend tools.
#[derive(Parser)]
#[command(name = "aioplug")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Directory the plugin directory is resolved against (default: cwd)
    #[arg(global = true, short, long)]
    root: Option<PathBuf>,

    /// Plugin directory, relative to the root
    #[arg(global = true, long, default_value = DEFAULT_PLUGIN_DIR)]
    plugin_dir: PathBuf,

    /// Only load backends from code images
    #[arg(global = true, long)]
    no_builtins: bool,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List backends the loader can find
    List {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Load a backend and print its configuration
    Probe {
        /// Backend name
        backend: String,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Write a buffer through a backend and read it back
    Roundtrip {
        /// Backend name
        backend: String,

        /// File to write
        path: PathBuf,

        /// Number of elements
        #[arg(short, long, default_value = "1048576")]
        elements: usize,

        /// Element type (u8, i8, i16, i32, i64, f16, bf16, f32, f64)
        #[arg(short, long, default_value = "f32")]
        dtype: String,

        /// Validate both transfers
        #[arg(long)]
        validate: bool,

        /// Use asynchronous transfers completed by wait
        #[arg(short, long)]
        r#async: bool,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut config = LoaderConfig::new().plugin_dir(cli.plugin_dir);
    if let Some(root) = cli.root {
        config = config.root(root);
    }
    let registry = BackendRegistry::new();
    if !cli.no_builtins {
        registry.register(BUILTIN_FILE, || {
            Ok(Box::new(FileDevice::from_env()?) as Box<dyn Device>)
        });
    }
    let loader = Arc::new(PluginLoader::with_registry(config, registry));

    match cli.command {
        Commands::List { format } => {
            commands::list::run(&loader, &format)?;
        }
        Commands::Probe { backend, format } => {
            commands::probe::run(&loader, &backend, &format)?;
        }
        Commands::Roundtrip {
            backend,
            path,
            elements,
            dtype,
            validate,
            r#async,
        } => {
            let dtype = ElementType::from_name(&dtype)
                .ok_or_else(|| format!("Unknown element type: {dtype}"))?;
            let options = commands::roundtrip::Options {
                elements,
                dtype,
                validate,
                async_op: r#async,
            };
            commands::roundtrip::run(&loader, &backend, &path, &options)?;
        }
        Commands::Version => {
            println!("aioplug CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("Plugin ABI v{}", aioplug_device::AIOPLUG_ABI_VERSION);
        }
    }

    Ok(())
}
