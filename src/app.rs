//! Wiring: build every component from the config and hand the long-running
//! ones to the supervisor.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use sluice_config::ServiceConfig;
use sluice_container::DockerRuntime;
use sluice_dispatch::{AsyncEnqueuer, Invoker, SyncDispatcher};
use sluice_pool::WorkerPool;
use sluice_runner::{AsyncRunner, HttpCallback};
use sluice_supervisor::Supervisor;
use sluice_task::OutcomeLedger;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::seed;
use crate::transport::{self, AppState, StatusBoard};

pub struct App {
  config: ServiceConfig,
  routes_file: Option<PathBuf>,
}

impl App {
  pub fn new(config: ServiceConfig, routes_file: Option<PathBuf>) -> Self {
    Self {
      config,
      routes_file,
    }
  }

  /// Run until ctrl-c, then drain.
  pub async fn run(self) -> Result<()> {
    let shutdown = CancellationToken::new();
    {
      let shutdown = shutdown.clone();
      tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
          warn!(error = %e, "failed to listen for ctrl-c");
          return;
        }
        info!("shutdown requested");
        shutdown.cancel();
      });
    }

    self.serve(shutdown).await
  }

  pub async fn serve(self, shutdown: CancellationToken) -> Result<()> {
    let config = self.config;

    let datastore = sluice_datastore::open(&config.db_url)
      .await
      .with_context(|| format!("failed to open datastore {}", config.db_url))?;
    if let Some(path) = &self.routes_file {
      let defs = seed::read_routes(path)?;
      seed::seed_routes(datastore.as_ref(), defs).await?;
    }

    let queue = sluice_queue::open(&config.mq_url, &config.queue)
      .await
      .with_context(|| format!("failed to open queue {}", config.mq_url))?;

    let ledger = Arc::new(OutcomeLedger::new(
      config.ledger.capacity,
      config.ledger.ttl(),
    ));
    let pool = WorkerPool::new(config.pool.clone(), Arc::new(DockerRuntime::new()), ledger);

    let callback = HttpCallback::new(config.callback_base_url())
      .context("failed to build status callback client")?;
    let runner = AsyncRunner::new(
      queue.clone(),
      pool.clone(),
      Arc::new(callback),
      config.runner.clone(),
    );

    let invoker = Invoker::new(
      datastore,
      SyncDispatcher::new(pool.clone()),
      AsyncEnqueuer::new(queue),
      config.sync_timeout(),
    );
    let board = StatusBoard::new(config.ledger.capacity, config.ledger.ttl());
    let state = AppState::new(invoker, board);
    let addr = format!("0.0.0.0:{}", config.port);

    let mut supervisor = Supervisor::new(config.supervisor.clone());
    supervisor
      .add("pool", move |cancel| {
        let pool = pool.clone();
        async move { anyhow::Ok(pool.run(cancel).await?) }
      })
      .add("runner", move |cancel| {
        let runner = runner.clone();
        async move { anyhow::Ok(runner.run(cancel).await?) }
      })
      .add("http", move |cancel| {
        let state = state.clone();
        let addr = addr.clone();
        async move {
          let listener = TcpListener::bind(&addr)
            .await
            .with_context(|| format!("failed to bind {addr}"))?;
          transport::serve(listener, state, cancel).await
        }
      });

    info!(
      port = config.port,
      pool_size = config.pool.size,
      db = %config.db_url,
      mq = %config.mq_url,
      "sluice started"
    );
    supervisor.serve(shutdown).await?;
    info!("sluice stopped");
    Ok(())
  }
}
