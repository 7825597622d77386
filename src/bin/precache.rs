//! precache CLI - drive the offline cache agent from the command line.

#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

use std::env;
use std::path::PathBuf;
use std::time::Instant;

use precache::{
    AppConfig, CacheAgent, CacheStorage, DiskStorage, HttpNetwork, LifecycleHandler, Request,
    describe_outcome, describe_store, format_elapsed,
};

// ============================================================================
// CLI Configuration
// ============================================================================

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Install,
    Activate,
    Fetch(String),
    List,
    Serve,
}

#[derive(Debug, PartialEq, Eq)]
struct CliArgs {
    command: Command,
    config_path: Option<PathBuf>,
    cache_dir: Option<PathBuf>,
    host: Option<String>,
    port: Option<u16>,
}

fn print_usage() {
    eprintln!("Usage: precache [OPTIONS] <COMMAND>");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  install             Open the current cache and pre-cache every asset");
    eprintln!("  activate            Delete every cache store except the current one");
    eprintln!("  fetch <url>         Answer a request cache-first, falling back to the network");
    eprintln!("  list                List cache stores and their entry counts");
    eprintln!("  serve               Install, activate, then serve cache-first over HTTP");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --config <PATH>     Configuration file (default: <config dir>/precache/config.toml)");
    eprintln!("  --cache-dir <PATH>  Directory holding the cache stores");
    eprintln!("  --host <HOST>       Bind address for serve (default: 127.0.0.1)");
    eprintln!("  --port <PORT>       Bind port for serve (default: 8787)");
    eprintln!("  -h, --help          Show this help");
    eprintln!();
    eprintln!("Logging is controlled by RUST_LOG (default: info).");
}

/// Parses arguments. `Ok(None)` means help was requested.
fn parse_args(args: &[String]) -> Result<Option<CliArgs>, String> {
    let mut command = None;
    let mut config_path = None;
    let mut cache_dir = None;
    let mut host = None;
    let mut port = None;

    let mut i = 0;
    while i < args.len() {
        let arg = args[i].as_str();
        let mut value = |name: &str| -> Result<String, String> {
            i += 1;
            args.get(i)
                .cloned()
                .ok_or_else(|| format!("{name} requires a value"))
        };
        match arg {
            "-h" | "--help" => return Ok(None),
            "--config" => config_path = Some(PathBuf::from(value("--config")?)),
            "--cache-dir" => cache_dir = Some(PathBuf::from(value("--cache-dir")?)),
            "--host" => host = Some(value("--host")?),
            "--port" => {
                let raw = value("--port")?;
                port = Some(raw.parse().map_err(|_| format!("invalid port: {raw}"))?);
            }
            "install" | "activate" | "fetch" | "list" | "serve" if command.is_none() => {
                command = Some(match arg {
                    "install" => Command::Install,
                    "activate" => Command::Activate,
                    "fetch" => Command::Fetch(value("fetch")?),
                    "list" => Command::List,
                    _ => Command::Serve,
                });
            }
            other if other.starts_with('-') => return Err(format!("Unknown option: {other}")),
            other => return Err(format!("Unexpected argument: {other}")),
        }
        i += 1;
    }

    let command = command.ok_or_else(|| "no command given".to_string())?;
    Ok(Some(CliArgs {
        command,
        config_path,
        cache_dir,
        host,
        port,
    }))
}

// ============================================================================
// Commands
// ============================================================================

type Agent = CacheAgent<DiskStorage, HttpNetwork>;

async fn run_install(agent: &Agent) -> precache::Result<()> {
    let start = Instant::now();
    agent.on_install().await?;
    println!(
        "Installed {} assets into {} in {}",
        agent.config().asset_urls.len(),
        agent.config().cache_name,
        format_elapsed(start.elapsed())
    );
    Ok(())
}

async fn run_activate(agent: &Agent) -> precache::Result<()> {
    let report = agent.on_activate().await?;
    if report.deleted.is_empty() {
        println!("No stale caches; {} is current", report.current);
    } else {
        println!("Deleted {}; {} is current", report.deleted.join(", "), report.current);
    }
    Ok(())
}

async fn run_fetch(agent: &Agent, url: String) -> precache::Result<()> {
    let outcome = agent.on_fetch(Request::get(url)).await?;
    println!("{}", describe_outcome(&outcome));
    Ok(())
}

async fn run_list(agent: &Agent) -> precache::Result<()> {
    let storage = agent.storage();
    for name in storage.keys().await? {
        let entries = storage.entries(&name).await?.len();
        let current = name == agent.config().cache_name;
        println!("{}", describe_store(&name, entries, current));
    }
    Ok(())
}

#[cfg(feature = "server")]
async fn run_serve(agent: Agent, host: &str, port: u16) -> precache::Result<()> {
    let registration = std::sync::Arc::new(precache::Registration::new(agent));
    registration.install().await?;
    registration.activate().await?;
    precache::server::serve(registration, host, port).await
}

#[tokio::main]
async fn main() -> precache::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = env::args().skip(1).collect();
    let cli = match parse_args(&args) {
        Ok(Some(cli)) => cli,
        Ok(None) => {
            print_usage();
            std::process::exit(0);
        }
        Err(msg) => {
            eprintln!("Error: {msg}");
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    };

    let mut config = match &cli.config_path {
        Some(path) => AppConfig::load_from(path)?,
        None => AppConfig::load()?,
    };
    if let Some(dir) = cli.cache_dir {
        config.paths.cache_dir = dir;
    }
    if let Some(host) = cli.host {
        config.server.host = host;
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }

    let storage = DiskStorage::new(&config.paths.cache_dir);
    let network = HttpNetwork::new(config.agent.origin.as_deref())?;
    let agent = CacheAgent::new(config.agent.clone(), storage, network)?;
    log::debug!("Cache directory: {}", config.paths.cache_dir.display());

    match cli.command {
        Command::Install => run_install(&agent).await,
        Command::Activate => run_activate(&agent).await,
        Command::Fetch(url) => run_fetch(&agent, url).await,
        Command::List => run_list(&agent).await,
        Command::Serve => {
            #[cfg(feature = "server")]
            {
                run_serve(agent, &config.server.host, config.server.port).await
            }
            #[cfg(not(feature = "server"))]
            {
                eprintln!("Server support not compiled in");
                std::process::exit(1);
            }
        }
    }
}
