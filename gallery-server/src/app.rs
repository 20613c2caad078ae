use anyhow::{bail, Context, Result};
use gallery_core::{GalleryConfig, GalleryConfigSnapshot};

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: &str = "3030";

/// Longest accepted stats window, roughly a century.
pub const MAX_WINDOW_DAYS: u64 = 36_500;

/// Fill in every key the server reads that the caller left unset.
pub fn with_defaults(mut config: GalleryConfig) -> GalleryConfig {
    config.set_default("http.host", DEFAULT_HOST);
    config.set_default("http.port", DEFAULT_PORT);
    config.set_default("upload.max_bytes", gallery_blob::DEFAULT_MAX_BLOB_BYTES.to_string());
    config.set_default("blob.backend", "fs");
    config.set_default("blob.root", "./uploads");
    config.set_default("metadata.backend", "fs");
    config.set_default("metadata.root", "./data/items");
    config.set_default("stats.recent_days", "7");
    config.set_default("stats.monthly_days", "30");

    let public_url = format!(
        "http://{}:{}/uploads",
        config.get("http.host").unwrap_or(DEFAULT_HOST),
        config.get("http.port").unwrap_or(DEFAULT_PORT),
    );
    config.set_default("blob.public_url", public_url);
    config
}

pub fn listen_addr(config: &GalleryConfigSnapshot) -> String {
    let host = config.get_or("http.host", DEFAULT_HOST);
    let port = config.get_or("http.port", DEFAULT_PORT);
    format!("{host}:{port}")
}

/// A numeric key; present-but-unparseable values are an error, not a silent default.
pub fn number(config: &GalleryConfigSnapshot, key: &str, default: u64) -> Result<u64> {
    match config.get(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("config key '{key}' must be a non-negative integer, got '{raw}'")),
    }
}

/// A stats window length in days, between 1 and [`MAX_WINDOW_DAYS`].
pub fn window_days(config: &GalleryConfigSnapshot, key: &str, default: u64) -> Result<i64> {
    let days = number(config, key, default)?;
    if !(1..=MAX_WINDOW_DAYS).contains(&days) {
        bail!("config key '{key}' must be between 1 and {MAX_WINDOW_DAYS} days, got {days}");
    }
    Ok(i64::try_from(days)?)
}
