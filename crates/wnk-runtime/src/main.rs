//! Guest UI runtime. Reads newline-delimited JSON requests on stdin and
//! writes results, panels, actions, effects and render payloads on stdout.
//! Diagnostics go to stderr.

mod settings;

use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tokio::io::BufReader;
use tokio::task::LocalSet;
use tracing::{info, warn};
use wnk_core::dispatch::Dispatcher;
use wnk_core::plugin::{discover_manifests, Plugin, PluginRegistry};
use wnk_core::transport::{serve, OutputSink, DEFAULT_SHUTDOWN_GRACE};
use wnk_plugins::BuiltinConfig;

use settings::{load_settings, RuntimeSettings};

const DEFAULT_LOG_FILTER: &str = "wnk_runtime=info,wnk_core=info,wnk_plugins=info";

#[derive(Parser, Debug)]
#[command(name = "wnk-runtime")]
#[command(version, about, long_about = None)]
struct Args {
    /// Settings file (JSON)
    #[arg(short = 'c', long, env = "WNK_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Directory holding `<plugin>/manifest.json` entries
    #[arg(long, value_name = "DIR")]
    plugins_dir: Option<PathBuf>,

    /// Enable only these plugin ids (repeatable)
    #[arg(short = 'p', long = "plugin", value_name = "ID")]
    plugins: Vec<String>,

    /// Log filter, overridden by RUST_LOG
    #[arg(short = 'l', long, value_name = "FILTER")]
    log: Option<String>,
}

fn init_logging(filter: Option<&str>) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(filter.unwrap_or(DEFAULT_LOG_FILTER))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_target(true)
        .init();
}

fn build_registry(settings: &RuntimeSettings, plugins_dir: Option<&Path>) -> Result<PluginRegistry> {
    let config: BuiltinConfig = settings.to_builtin_config();
    let mut registry = PluginRegistry::new();

    let candidates: Vec<Rc<dyn Plugin>> = match plugins_dir {
        Some(dir) => {
            let manifests = discover_manifests(dir)
                .with_context(|| format!("discover plugins in {}", dir.display()))?;
            manifests
                .into_iter()
                .filter_map(|manifest| {
                    let id = manifest.id.clone();
                    let plugin = wnk_plugins::bind(manifest, &config);
                    if plugin.is_none() {
                        warn!(plugin = %id, "no implementation for manifest; skipped");
                    }
                    plugin
                })
                .collect()
        }
        None => wnk_plugins::builtins(&config),
    };

    for plugin in candidates {
        let id = plugin.manifest().id.clone();
        if !settings.is_enabled(&id) {
            continue;
        }
        if let Err(err) = registry.register(plugin) {
            warn!(plugin = %id, error = %err, "plugin rejected");
        }
    }
    Ok(registry)
}

async fn run(registry: PluginRegistry) -> Result<()> {
    let (sink, output) = OutputSink::channel();
    let dispatcher = Dispatcher::new(registry, sink);
    let stdin = BufReader::new(tokio::io::stdin());
    let stdout = tokio::io::stdout();
    serve(dispatcher, output, stdin, stdout, DEFAULT_SHUTDOWN_GRACE).await
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.log.as_deref());

    let mut settings = match &args.config {
        Some(path) => load_settings(path)?,
        None => RuntimeSettings::default(),
    };
    if !args.plugins.is_empty() {
        settings.enabled_plugins = args.plugins.clone();
    }
    let plugins_dir = args.plugins_dir.clone().or_else(|| settings.plugins_dir.clone());

    let registry = build_registry(&settings, plugins_dir.as_deref())?;
    info!(plugins = ?registry.ids(), "runtime starting");

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("build tokio runtime")?;
    LocalSet::new().block_on(&runtime, run(registry))?;
    info!("runtime stopped");
    Ok(())
}
