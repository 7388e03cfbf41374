//! reqcache - fetch URLs through the disk-backed response cache
//!
//! Small command-line front end over the library: fetches with a chosen
//! cache policy, and inspects or clears the cache directory.

use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use tokio::runtime::Handle;
use tracing::{error, info};

use reqcache::{
    logging, CachePolicy, Config, DiskCache, DispatchOutcome, Dispatcher, ExecutorDelivery,
    HttpNetwork, Request, RequestError, Response, ResponseListener, ResponseSource, StringParser,
    SystemClock,
};

/// CLI command
#[derive(Debug)]
enum Command {
    /// Fetch a URL
    Fetch { url: String, policy: CachePolicy },
    /// Show cache usage
    Stats,
    /// Delete every cached record
    Clear,
    /// Show help
    Help,
}

fn print_help() {
    eprintln!(
        r#"reqcache - fetch URLs through a disk-backed response cache

USAGE:
    reqcache fetch <url> [policy]
    reqcache stats
    reqcache clear
    reqcache help

POLICIES:
    cache-then-network   Print any cached body, then fetch (default)
    when-expired         Print any cached body; fetch only when it is stale
    cache-only           Print the cached body or fail
    network-only         Always fetch; the result is still cached

ENVIRONMENT:
    REQCACHE_CONFIG      Path to a JSON config file
    RUST_LOG             Log level (trace, debug, info, warn, error)
"#
    );
}

fn parse_policy(value: &str) -> Result<CachePolicy> {
    match value {
        "cache-then-network" => Ok(CachePolicy::CacheThenNetwork),
        "when-expired" => Ok(CachePolicy::CacheThenNetworkWhenExpired),
        "cache-only" => Ok(CachePolicy::CacheOnly),
        "network-only" => Ok(CachePolicy::NetworkOnly),
        other => Err(anyhow!("Unknown cache policy: {}", other)),
    }
}

fn parse_args() -> Result<Command> {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        return Ok(Command::Help);
    }

    match args[1].as_str() {
        "fetch" => {
            let url = args
                .get(2)
                .cloned()
                .ok_or_else(|| anyhow!("Usage: reqcache fetch <url> [policy]"))?;
            let policy = match args.get(3) {
                Some(value) => parse_policy(value)?,
                None => CachePolicy::default(),
            };
            Ok(Command::Fetch { url, policy })
        }
        "stats" => Ok(Command::Stats),
        "clear" => Ok(Command::Clear),
        "help" | "--help" | "-h" => Ok(Command::Help),
        _ => {
            eprintln!("Unknown command: {}", args[1]);
            Ok(Command::Help)
        }
    }
}

fn load_config() -> Result<Config> {
    match env::var_os("REQCACHE_CONFIG") {
        Some(path) => Config::load(&PathBuf::from(path)),
        None => Ok(Config::default()),
    }
}

/// Prints each delivered body as it arrives
struct PrintListener;

impl ResponseListener<String> for PrintListener {
    fn on_response(&mut self, _cache_key: &str, response: Response<String>) {
        let source = match response.source {
            ResponseSource::Cache => "cache",
            ResponseSource::Network => "network",
        };
        println!("--- {} ---", source);
        println!("{}", response.value);
    }

    fn on_error(&mut self, _cache_key: &str, error: RequestError) {
        eprintln!("Error: {}", error);
    }
}

async fn fetch(config: Config, cache: DiskCache, url: String, policy: CachePolicy) -> Result<()> {
    let (delivery, listener) = ExecutorDelivery::spawn(&Handle::current(), PrintListener);

    // The blocking HTTP client must stay off the async worker threads
    let outcome = tokio::task::spawn_blocking(move || -> Result<DispatchOutcome<String>> {
        let network = HttpNetwork::new()?;
        let dispatcher = Dispatcher::new(cache, Arc::new(network), Arc::new(SystemClock));
        let request = Request::get(url);
        info!(url = request.url(), policy = ?policy, "Dispatching request");
        Ok(dispatcher.dispatch(&request, &StringParser::default(), &delivery, policy, &config.retry))
    })
    .await
    .context("Fetch task failed")??;

    listener.await.context("Delivery task failed")?;

    match outcome {
        DispatchOutcome::Success(_) | DispatchOutcome::NotModified => Ok(()),
        DispatchOutcome::RecoverableError(e) | DispatchOutcome::FatalError(e) => Err(e.into()),
        DispatchOutcome::Canceled => Err(anyhow!("Request canceled")),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::init()?;

    // Parse command
    let command = match parse_args() {
        Ok(cmd) => cmd,
        Err(e) => {
            eprintln!("Error: {}", e);
            print_help();
            std::process::exit(1);
        }
    };

    if let Command::Help = command {
        print_help();
        return Ok(());
    }

    let config = load_config()?;
    config.cache.validate()?;
    let cache = DiskCache::open(&config.cache);

    match command {
        Command::Fetch { url, policy } => {
            if let Err(e) = fetch(config, cache, url, policy).await {
                error!(error = %e, "Fetch failed");
                return Err(e);
            }
        }
        Command::Stats => {
            cache.wait_for_load();
            println!("Cache directory: {}", cache.root_dir().display());
            println!("Records:         {}", cache.len());
            println!(
                "Size:            {} / {} bytes",
                cache.total_size(),
                config.cache.max_size_bytes
            );
        }
        Command::Clear => {
            cache.clear();
            println!("Cache cleared.");
        }
        Command::Help => print_help(),
    }

    Ok(())
}
