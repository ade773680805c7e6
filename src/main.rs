use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use game_shim::runtime::{wrap_host_page, PageOptions};
use game_shim::server::ServeOptions;
use game_shim::ShimConfig;

#[derive(Parser)]
#[command(name = "game-shim", version)]
#[command(about = "Host a prebuilt game module in a full-viewport canvas")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the host page, the shim package and the game module with live reload
    Serve {
        /// Directory holding the game module build (client.js, client.wasm, ...)
        #[arg(long, default_value = "game")]
        assets: PathBuf,

        /// wasm-pack output directory for the shim
        #[arg(long, default_value = "pkg")]
        pkg: PathBuf,

        /// Server port
        #[arg(long, default_value_t = 3333)]
        port: u16,

        /// Shim config JSON file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Page title
        #[arg(long, default_value = "Game")]
        title: String,
    },

    /// Write the host page HTML
    Page {
        /// Shim config JSON file
        #[arg(long)]
        config: Option<PathBuf>,

        /// URL of the shim's JS glue as seen from the page
        #[arg(long, default_value = "/pkg/game_shim.js")]
        pkg_url: String,

        /// Page title
        #[arg(long, default_value = "Game")]
        title: String,

        /// Write output to file instead of stdout
        #[arg(short)]
        o: Option<PathBuf>,
    },

    /// Validate a config file and print the effective config
    Check {
        /// Shim config JSON file
        file: PathBuf,
    },
}

fn load_config(path: Option<&Path>) -> anyhow::Result<ShimConfig> {
    match path {
        Some(path) => ShimConfig::load(path)
            .with_context(|| format!("cannot load config '{}'", path.display())),
        None => Ok(ShimConfig::default()),
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Serve {
            assets,
            pkg,
            port,
            config,
            title,
        } => {
            let config = load_config(config.as_deref())?;
            if !assets.is_dir() {
                anyhow::bail!("'{}' is not a directory", assets.display());
            }
            let options = ServeOptions {
                assets_dir: assets,
                pkg_dir: pkg,
                config,
                page: PageOptions {
                    title,
                    ..PageOptions::default()
                },
            };
            let rt = tokio::runtime::Runtime::new().context("failed to create tokio runtime")?;
            rt.block_on(game_shim::server::run_dev_server(options, port))
                .map_err(|e| anyhow::anyhow!("dev server failed: {e}"))?;
        }

        Commands::Page {
            config,
            pkg_url,
            title,
            o,
        } => {
            let config = load_config(config.as_deref())?;
            let options = PageOptions {
                title,
                pkg_url,
                ..PageOptions::default()
            };
            let html = wrap_host_page(&config, &options)?;
            if let Some(out_path) = o {
                fs::write(&out_path, &html)
                    .with_context(|| format!("cannot write '{}'", out_path.display()))?;
                eprintln!("wrote host page to {} ({} bytes)", out_path.display(), html.len());
            } else {
                print!("{html}");
            }
        }

        Commands::Check { file } => {
            let config = load_config(Some(&file))?;
            eprintln!("{}: ok", file.display());
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
    }
    Ok(())
}

fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(Cli::parse()) {
        eprintln!("error: {e:#}");
        process::exit(1);
    }
}
