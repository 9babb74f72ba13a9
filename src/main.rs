use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use sluice_config::{AdmissionPolicy, ServiceConfig};
use sluice_route::validate;

mod app;
mod logging;
mod seed;
mod transport;

/// Sluice - dispatch core for a container-based functions service
#[derive(Parser)]
#[command(name = "sluice")]
#[command(version, about, long_about = None)]
struct Cli {
  #[command(subcommand)]
  command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
  /// Run the service
  Serve(ServeArgs),

  /// Check a routes file without starting anything
  Validate {
    /// Path to a JSON array of route definitions
    routes_file: PathBuf,
  },
}

#[derive(Args)]
struct ServeArgs {
  /// Path to a JSON config file
  #[arg(long, env = "SLUICE_CONFIG")]
  config: Option<PathBuf>,

  /// Routes to load into the datastore at startup
  #[arg(long)]
  routes: Option<PathBuf>,

  #[arg(long, env = "PORT")]
  port: Option<u16>,

  /// `memory://` or `sqlite://<path>`
  #[arg(long, env = "DB_URL")]
  db_url: Option<String>,

  /// `memory://` or `sqlite://<path>`
  #[arg(long, env = "MQ_URL")]
  mq_url: Option<String>,

  /// Base URL for async status callbacks
  #[arg(long, env = "API_URL")]
  api_url: Option<String>,

  #[arg(long, env = "LOG_LEVEL")]
  log_level: Option<String>,

  /// Number of execution slots
  #[arg(long, env = "POOL_SIZE")]
  pool_size: Option<usize>,

  /// What to do when every slot is busy: `block` or `reject`
  #[arg(long, value_parser = parse_admission)]
  admission: Option<AdmissionPolicy>,
}

impl ServeArgs {
  /// File (or defaults) first, then flags and env on top.
  fn load_config(&self) -> Result<ServiceConfig> {
    let mut config = match &self.config {
      Some(path) => ServiceConfig::from_file(path)?,
      None => ServiceConfig::default(),
    };

    if let Some(port) = self.port {
      config.port = port;
    }
    if let Some(url) = &self.db_url {
      config.db_url = url.clone();
    }
    if let Some(url) = &self.mq_url {
      config.mq_url = url.clone();
    }
    if let Some(url) = &self.api_url {
      config.api_url = Some(url.clone());
    }
    if let Some(level) = &self.log_level {
      config.log_level = level.clone();
    }
    if let Some(size) = self.pool_size {
      config.pool.size = size;
    }
    if let Some(admission) = self.admission {
      config.pool.admission = admission;
    }

    config.check()?;
    Ok(config)
  }
}

fn parse_admission(s: &str) -> Result<AdmissionPolicy, String> {
  match s {
    "block" => Ok(AdmissionPolicy::Block),
    "reject" => Ok(AdmissionPolicy::Reject),
    other => Err(format!("unknown admission policy '{other}' (expected block or reject)")),
  }
}

fn main() -> Result<()> {
  let cli = Cli::parse();

  match cli.command {
    Some(Commands::Serve(args)) => serve(args)?,
    Some(Commands::Validate { routes_file }) => validate_routes(routes_file)?,
    None => {
      println!("sluice - use --help to see available commands");
    }
  }

  Ok(())
}

fn serve(args: ServeArgs) -> Result<()> {
  let config = args.load_config().context("invalid configuration")?;
  logging::init(&config.log_level)?;

  let rt = tokio::runtime::Runtime::new()?;
  rt.block_on(app::App::new(config, args.routes).run())
}

fn validate_routes(routes_file: PathBuf) -> Result<()> {
  let defs = seed::read_routes(&routes_file)?;
  let total = defs.len();
  let mut invalid = 0;

  for def in defs {
    let label = format!("{}{}", def.app_name, def.path);
    match validate(def) {
      Ok(route) => println!("ok      {} ({})", route.key(), route.route_type.as_str()),
      Err(e) => {
        invalid += 1;
        println!("invalid {label}: {e}");
      }
    }
  }

  if invalid > 0 {
    anyhow::bail!("{invalid} of {total} routes are invalid");
  }
  println!("all {total} routes are valid");
  Ok(())
}
