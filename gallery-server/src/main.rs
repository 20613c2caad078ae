use anyhow::Result;
use gallery_core::GalleryConfig;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = gallery_server::with_defaults(GalleryConfig::from_env());
    let addr = gallery_server::listen_addr(&config.snapshot());

    let ax = gallery_server::build(config).await?;
    ax.listen(addr).await?;

    Ok(())
}
