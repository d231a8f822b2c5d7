mod cache;
mod config;
mod event;
mod network;
mod worker;

use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use cache::{CacheStorage, Method, Request, SqliteStorage};
use event::{EventDispatcher, EventOutcome, EventSender, LifecycleEvent};
use network::HttpClient;
use worker::{OfflineWorker, WorkerOptions};

#[derive(Parser, Debug)]
#[command(name = "owpwa")]
#[command(about = "Offline asset cache for the open-window PWA")]
#[command(version)]
struct Args {
  /// Path to config file (default: ./owpwa.yaml or $XDG_CONFIG_HOME/owpwa/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Cache name (version token) to use instead of the configured one
  #[arg(long)]
  cache_name: Option<String>,

  /// Cache database to use instead of the configured one
  #[arg(long)]
  database: Option<PathBuf>,

  /// Also log to stderr
  #[arg(short, long)]
  verbose: bool,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Pre-cache every configured asset into the current cache
  Install,
  /// Delete every cache other than the current one
  Activate,
  /// Install, then activate (roll out a new version)
  Update,
  /// Request paths through the cache, falling back to the network
  Fetch {
    /// Paths or URLs, resolved against the configured origin
    #[arg(required = true)]
    paths: Vec<String>,
    /// Request method
    #[arg(short = 'X', long, default_value = "GET")]
    method: String,
    /// Write the body of the (single) response to this file
    #[arg(short, long)]
    output: Option<PathBuf>,
  },
  /// List cache names
  Caches,
  /// List the requests held by a cache (default: the current one)
  Entries { name: Option<String> },
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let _guard = init_tracing(args.verbose)?;

  // Load configuration
  let mut config = config::Config::load(args.config.as_deref())?;

  // Override from the command line
  if let Some(name) = args.cache_name {
    config.cache_name = name;
  }
  if let Some(database) = args.database {
    config.database = Some(database);
  }
  config.validate()?;

  let storage = SqliteStorage::open(&config.database_path()?)?;
  let worker = OfflineWorker::new(storage, HttpClient::new()?, WorkerOptions::from_config(&config)?);

  match args.command {
    Command::Caches => list_caches(&worker),
    Command::Entries { name } => {
      let name = name.as_deref().unwrap_or(worker.cache_name());
      for key in worker.storage().keys(name)? {
        println!("{}", key);
      }
      Ok(())
    }
    Command::Fetch {
      paths,
      method,
      output,
    } => {
      if output.is_some() && paths.len() != 1 {
        return Err(eyre!("--output needs exactly one path"));
      }
      let method: Method = method.parse()?;
      let requests = paths
        .iter()
        .map(|path| {
          worker.request(path).map(|request| Request {
            method,
            ..request
          })
        })
        .collect::<Result<Vec<_>>>()?;

      let events = spawn_dispatcher(worker);
      fetch(&events, requests, output.as_deref()).await
    }
    Command::Install => {
      let events = spawn_dispatcher(worker);
      lifecycle(&events, LifecycleEvent::Install).await
    }
    Command::Activate => {
      let events = spawn_dispatcher(worker);
      lifecycle(&events, LifecycleEvent::Activate).await
    }
    Command::Update => {
      let events = spawn_dispatcher(worker);
      lifecycle(&events, LifecycleEvent::Install).await?;
      lifecycle(&events, LifecycleEvent::Activate).await
    }
  }
}

/// Set up file logging (and stderr when verbose).
///
/// The returned guard flushes the log file when dropped.
fn init_tracing(verbose: bool) -> Result<WorkerGuard> {
  let log_dir = dirs::data_dir()
    .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
    .ok_or_else(|| eyre!("Could not determine data directory"))?
    .join("owpwa");

  let file_appender = tracing_appender::rolling::daily(log_dir, "owpwa.log");
  let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

  let filter = EnvFilter::try_from_env("OWPWA_LOG")
    .or_else(|_| EnvFilter::try_from_default_env())
    .unwrap_or_else(|_| EnvFilter::new("info"));

  tracing_subscriber::registry()
    .with(filter)
    .with(fmt::layer().with_writer(file_writer).with_ansi(false))
    .with(verbose.then(|| fmt::layer().with_writer(std::io::stderr)))
    .try_init()
    .map_err(|e| eyre!("Failed to initialize logging: {}", e))?;

  Ok(guard)
}

fn spawn_dispatcher(worker: OfflineWorker<SqliteStorage, HttpClient>) -> EventSender {
  let (dispatcher, events) = EventDispatcher::new(worker);
  tokio::spawn(dispatcher.run());
  events
}

fn list_caches<S: CacheStorage, N: network::Network>(worker: &OfflineWorker<S, N>) -> Result<()> {
  for name in worker.storage().cache_names()? {
    let marker = if name == worker.cache_name() { "*" } else { " " };
    let entries = worker.storage().keys(&name)?.len();
    println!("{} {} ({} entries)", marker, name, entries);
  }
  Ok(())
}

async fn lifecycle(events: &EventSender, event: LifecycleEvent) -> Result<()> {
  match events.send(event).await? {
    EventOutcome::Installed(report) => {
      println!(
        "installed {} entries into {}",
        report.entries, report.cache_name
      );
    }
    EventOutcome::Activated(report) => {
      for name in &report.deleted {
        println!("deleted {}", name);
      }
      for name in &report.failed {
        println!("failed to delete {}", name);
      }
      if report.deleted.is_empty() && report.failed.is_empty() {
        println!("no stale caches");
      }
      println!("current cache {}", report.kept);
    }
    EventOutcome::Fetched(_) => {}
  }
  Ok(())
}

async fn fetch(events: &EventSender, requests: Vec<Request>, output: Option<&Path>) -> Result<()> {
  let sends = requests.into_iter().map(|request| {
    let url = request.url.clone();
    async move { (url, events.send(LifecycleEvent::Fetch(request)).await) }
  });

  let mut failed = 0;
  for (url, result) in futures::future::join_all(sends).await {
    match result {
      Ok(EventOutcome::Fetched(result)) => {
        let content_type = result.data.header_str("content-type").unwrap_or("-");
        println!(
          "{} {:<7} {:>8} {:<24} {}",
          result.data.status,
          result.source,
          result.data.body.len(),
          content_type,
          url
        );
        if let Some(cached_at) = result.cached_at {
          println!("    cached at {}", cached_at.format("%Y-%m-%d %H:%M:%S UTC"));
        }
        if let Some(path) = output {
          tokio::fs::write(path, &result.data.body)
            .await
            .map_err(|e| eyre!("Failed to write {}: {}", path.display(), e))?;
        }
      }
      Ok(_) => {}
      Err(e) => {
        eprintln!("failed {}: {}", url, e);
        failed += 1;
      }
    }
  }

  if failed > 0 {
    return Err(eyre!("{} request(s) failed", failed));
  }
  Ok(())
}
