//! TCP listener and serve loop for the dashboard.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::error::ServerError;
use crate::routes::router;
use crate::service::DashboardService;

/// A bound, not yet serving, dashboard server.
pub struct DashboardServer {
    listener: TcpListener,
    router: Router,
    local_addr: SocketAddr,
}

impl DashboardServer {
    /// Binds `addr` and builds the router.
    pub async fn bind(
        addr: &str,
        service: Arc<DashboardService>,
        push_path: &str,
    ) -> Result<Self, ServerError> {
        let bind_err = |source| ServerError::Bind {
            addr: addr.to_string(),
            source,
        };
        let listener = TcpListener::bind(addr).await.map_err(bind_err)?;
        let local_addr = listener.local_addr().map_err(bind_err)?;
        Ok(Self {
            listener,
            router: router(service, push_path),
            local_addr,
        })
    }

    /// The address actually bound (resolves port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Serves until `shutdown` is cancelled.
    pub async fn serve(self, shutdown: CancellationToken) -> Result<(), ServerError> {
        info!(addr = %self.local_addr, "Dashboard listening");
        axum::serve(
            self.listener,
            self.router
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
        info!(addr = %self.local_addr, "Dashboard stopped");
        Ok(())
    }
}
