//! Process orchestration.
//!
//! [`GuildhallRuntime`] owns the configuration and a shutdown token. On
//! [`run`](GuildhallRuntime::run) it builds an [`AppContext`], then runs the
//! dashboard server and the gateway side by side until Ctrl+C / SIGTERM.
//!
//! ```text
//!                 ┌──────────────┐
//! Discord ──ws──▶ │   Gateway    │──▶ SyncHub ──▶ StateCache
//!                 └──────────────┘        │
//!                                         ▼
//! Dashboard ◀─ws── /push ◀──────────  EventRelay
//! Dashboard ──http─▶ routes ──▶ DashboardService ──▶ DiscordClient ──▶ Discord
//! ```
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use guildhall_runtime::GuildhallRuntime;
//!
//! let runtime = GuildhallRuntime::builder()
//!     .config_file("guildhall.toml")
//!     .profile("production")
//!     .build()?;
//! runtime.run().await?;
//! ```

use std::future::Future;
use std::sync::Arc;

use tokio::signal;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use guildhall_adapter_discord::{DiscordClient, Gateway};
use guildhall_core::{EventRelay, RetryExecutor, StateCache, SyncHub, TimeoutGuard};
use guildhall_transport::{DashboardServer, DashboardService};

use crate::config::{ConfigLoader, ConfigResult, GuildhallConfig, validate_config};
use crate::error::{RuntimeError, RuntimeResult};
use crate::logging;

/// Everything a running bridge shares, built once per process.
pub struct AppContext {
    pub hub: SyncHub,
    pub platform: Arc<DiscordClient>,
    pub service: Arc<DashboardService>,
}

/// The Guildhall process runtime.
pub struct GuildhallRuntime {
    config: GuildhallConfig,
    shutdown: CancellationToken,
}

impl GuildhallRuntime {
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    /// Creates a runtime from loaded configuration and initializes logging.
    pub fn from_config(config: GuildhallConfig) -> Self {
        logging::init_from_config(&config.logging);
        info!(
            log_level = %config.logging.level,
            log_format = ?config.logging.format,
            "Runtime initialized from configuration"
        );
        Self {
            config,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn config(&self) -> &GuildhallConfig {
        &self.config
    }

    /// Cancelling this token stops a running runtime.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Builds the shared context from configuration.
    pub fn build_context(&self) -> RuntimeResult<AppContext> {
        let policy = self.config.retry.to_policy()?;
        let platform = Arc::new(DiscordClient::new(self.config.discord.clone())?);
        let hub = SyncHub::new(
            Arc::new(StateCache::new(self.config.cache.message_limit)),
            Arc::new(EventRelay::new()),
        );

        let service = DashboardService::new(platform.clone(), &hub)
            .with_retry(RetryExecutor::new(policy).with_cancellation(self.shutdown.clone()))
            .with_timeout(
                TimeoutGuard::new(self.config.upstream.timeout())
                    .with_message("upstream call timed out")
                    .with_parent(self.shutdown.clone()),
            )
            .with_shutdown(self.shutdown.clone());

        debug!(
            max_attempts = policy.max_attempts(),
            timeout_ms = self.config.upstream.timeout_ms,
            message_limit = self.config.cache.message_limit,
            "Application context built"
        );

        Ok(AppContext {
            hub,
            platform,
            service: Arc::new(service),
        })
    }

    /// Runs until Ctrl+C or SIGTERM.
    pub async fn run(&self) -> RuntimeResult<()> {
        info!("Guildhall is now running. Press Ctrl+C to stop.");
        self.run_until(wait_for_shutdown()).await
    }

    /// Runs until `signal` completes, the shutdown token is cancelled, or
    /// the gateway stops permanently.
    pub async fn run_until<F>(&self, signal: F) -> RuntimeResult<()>
    where
        F: Future<Output = ()>,
    {
        let ctx = self.build_context()?;

        let server = DashboardServer::bind(
            &self.config.server.bind_addr(),
            ctx.service.clone(),
            &self.config.server.push_path,
        )
        .await?;
        info!(addr = %server.local_addr(), push_path = %self.config.server.push_path, "Dashboard bound");
        let mut server_task = Some(tokio::spawn(server.serve(self.shutdown.clone())));

        let mut gateway_task = if self.config.discord.enabled {
            let gateway = Gateway::new(
                Arc::new(self.config.discord.clone()),
                Arc::new(ctx.hub.clone()),
                self.config.retry.to_policy()?,
                self.shutdown.clone(),
            );
            Some(tokio::spawn(gateway.run()))
        } else {
            warn!("Discord gateway disabled, dashboard will not receive push updates");
            None
        };

        let mut outcome = Ok(());
        tokio::select! {
            _ = signal => {}
            _ = self.shutdown.cancelled() => {}
            result = join_task(&mut server_task) => {
                server_task = None;
                outcome = flatten(result).inspect_err(|e| error!(error = %e, "Dashboard server stopped"));
            }
            result = join_task(&mut gateway_task) => {
                gateway_task = None;
                outcome = flatten(result).inspect_err(|e| error!(error = %e, "Gateway stopped"));
            }
        }

        info!("Stopping Guildhall");
        self.shutdown.cancel();

        if let Some(task) = server_task
            && let Err(e) = flatten(task.await)
        {
            warn!(error = %e, "Dashboard server did not stop cleanly");
        }
        if let Some(task) = gateway_task
            && let Err(e) = flatten(task.await)
        {
            warn!(error = %e, "Gateway did not stop cleanly");
        }

        info!("Guildhall stopped");
        outcome
    }
}

/// Joins an optional task; pends forever when there is none.
async fn join_task<T>(task: &mut Option<JoinHandle<T>>) -> Result<T, JoinError> {
    match task {
        Some(handle) => handle.await,
        None => std::future::pending().await,
    }
}

fn flatten<T, E>(result: Result<Result<T, E>, JoinError>) -> RuntimeResult<T>
where
    RuntimeError: From<E>,
{
    match result {
        Ok(inner) => inner.map_err(RuntimeError::from),
        Err(e) => Err(RuntimeError::Task(e.to_string())),
    }
}

/// Waits for Ctrl+C or, on Unix, SIGTERM.
async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = signal::ctrl_c() => info!("Received Ctrl+C, shutting down"),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down"),
                }
                return;
            }
            Err(e) => warn!(error = %e, "Failed to register SIGTERM handler"),
        }
    }

    match signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C, shutting down"),
        Err(e) => error!(error = %e, "Failed to listen for Ctrl+C"),
    }
}

// =============================================================================
// RuntimeBuilder
// =============================================================================

/// Builder that loads and validates configuration before creating the runtime.
pub struct RuntimeBuilder {
    config_loader: ConfigLoader,
}

impl RuntimeBuilder {
    pub fn new() -> Self {
        Self {
            config_loader: ConfigLoader::new(),
        }
    }

    pub fn config_file<P: AsRef<std::path::Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.file(path);
        self
    }

    pub fn profile(mut self, profile: impl AsRef<str>) -> Self {
        self.config_loader = self.config_loader.profile(profile);
        self
    }

    pub fn search_path<P: AsRef<std::path::Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.search_path(path);
        self
    }

    pub fn without_env(mut self) -> Self {
        self.config_loader = self.config_loader.without_env();
        self
    }

    pub fn merge(mut self, config: GuildhallConfig) -> Self {
        self.config_loader = self.config_loader.merge(config);
        self
    }

    /// Loads and validates the configuration without starting anything.
    pub fn load(self) -> ConfigResult<GuildhallConfig> {
        let config = self.config_loader.load()?;
        validate_config(&config)?;
        Ok(config)
    }

    pub fn build(self) -> ConfigResult<GuildhallRuntime> {
        Ok(GuildhallRuntime::from_config(self.load()?))
    }
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}
