use std::future::Future;
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::Router;
use gallery_core::AssetManager;
use tokio::net::{TcpListener, ToSocketAddrs};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use crate::middlewares::MultipartConfig;
use crate::routes;
use crate::GalleryState;

pub struct GalleryApp {
    pub assets: Arc<AssetManager>,
    pub router: Router<()>,
}

impl Clone for GalleryApp {
    fn clone(&self) -> Self {
        Self {
            assets: Arc::clone(&self.assets),
            router: self.router.clone(),
        }
    }
}

impl GalleryApp {
    /// Router with form limits derived from the manager's payload limit.
    pub fn new(assets: AssetManager) -> Self {
        let multipart = MultipartConfig::for_payload_limit(assets.max_payload_bytes());
        Self::with_multipart(assets, multipart)
    }

    pub fn with_multipart(assets: AssetManager, multipart: MultipartConfig) -> Self {
        let assets = Arc::new(assets);
        let body_limit = multipart.max_total_size;
        let state = GalleryState::new(Arc::clone(&assets), multipart);

        let router = routes::router(state)
            .layer(DefaultBodyLimit::max(body_limit))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid));

        Self { assets, router }
    }

    /// Serve until Ctrl+C or SIGTERM.
    pub async fn listen<A>(self, addr: A) -> anyhow::Result<()>
    where
        A: ToSocketAddrs,
    {
        self.listen_until(addr, shutdown_signal()).await
    }

    /// Serve until `shutdown` resolves, drain in-flight requests, then close the stores.
    pub async fn listen_until<A, F>(self, addr: A, shutdown: F) -> anyhow::Result<()>
    where
        A: ToSocketAddrs,
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(addr).await?;
        tracing::info!(addr = ?listener.local_addr()?, "gallery listening");
        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown)
            .await?;

        self.assets.close().await?;
        tracing::info!("gallery stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::debug!("received Ctrl+C, shutting down"),
        _ = terminate => tracing::debug!("received SIGTERM, shutting down"),
    }
}

pub fn gallery(assets: AssetManager) -> GalleryApp {
    GalleryApp::new(assets)
}
