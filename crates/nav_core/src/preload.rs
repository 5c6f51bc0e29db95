//! Startup asset-preload gate.
//!
//! Tracks a fixed set of assets enumerated at construction, publishes
//! rounded percent progress, and completes exactly once after the hide
//! choreography. Assets added later are invisible to the gate.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::watch;
use tracing::{debug, info, warn};
use url::Url;

/// Pause between the last asset completing and the hide choreography.
pub const GATE_HIDE_DELAY: Duration = Duration::from_secs(2);

#[async_trait]
pub trait AssetLoader: Send + Sync {
    /// Loads one asset to completion.
    async fn load(&self, src: &str) -> Result<()>;
}

/// Loader that warms assets over HTTP, resolving sources against the
/// site origin.
pub struct HttpAssetLoader {
    http: reqwest::Client,
    origin: Url,
}

impl HttpAssetLoader {
    pub fn new(origin: Url) -> Self {
        Self {
            http: reqwest::Client::new(),
            origin,
        }
    }
}

#[async_trait]
impl AssetLoader for HttpAssetLoader {
    async fn load(&self, src: &str) -> Result<()> {
        let url = self.origin.join(src)?;
        let response = self.http.get(url).send().await?.error_for_status()?;
        let bytes = response.bytes().await?;
        debug!(asset = src, size = bytes.len(), "asset warmed");
        Ok(())
    }
}

/// Visual half of the gate: a progress counter and a hide choreography.
/// The gate owns the sequencing; how the fade/slide looks is not its
/// business.
#[async_trait]
pub trait GateChrome: Send + Sync {
    async fn set_progress(&self, percent: u8) -> Result<()>;
    /// Plays the hide sequence; resolves when the gate is off screen.
    async fn conceal(&self) -> Result<()>;
}

pub struct NoopChrome;

#[async_trait]
impl GateChrome for NoopChrome {
    async fn set_progress(&self, _percent: u8) -> Result<()> {
        Ok(())
    }

    async fn conceal(&self) -> Result<()> {
        Ok(())
    }
}

pub struct AssetLoadGate {
    assets: Vec<String>,
    loader: Arc<dyn AssetLoader>,
    chrome: Arc<dyn GateChrome>,
    hide_delay: Duration,
    progress: watch::Sender<u8>,
}

impl AssetLoadGate {
    pub fn new(
        assets: Vec<String>,
        loader: Arc<dyn AssetLoader>,
        chrome: Arc<dyn GateChrome>,
    ) -> Self {
        let (progress, _) = watch::channel(0);
        Self {
            assets,
            loader,
            chrome,
            hide_delay: GATE_HIDE_DELAY,
            progress,
        }
    }

    pub fn with_hide_delay(mut self, hide_delay: Duration) -> Self {
        self.hide_delay = hide_delay;
        self
    }

    pub fn total(&self) -> usize {
        self.assets.len()
    }

    /// Rounded percent readings, non-decreasing, 0..=100.
    pub fn subscribe_progress(&self) -> watch::Receiver<u8> {
        self.progress.subscribe()
    }

    /// Runs the gate to completion. Consuming `self` makes the completion
    /// signal one-shot by construction. A load error counts toward
    /// progress; a broken asset must not wedge the gate.
    pub async fn run(self) {
        let total = self.assets.len();
        if total == 0 {
            debug!("no tracked assets; releasing the load gate immediately");
            self.progress.send_replace(100);
            return;
        }

        let mut loads: FuturesUnordered<_> = self
            .assets
            .iter()
            .map(|src| {
                let loader = Arc::clone(&self.loader);
                let src = src.clone();
                async move {
                    let result = loader.load(&src).await;
                    (src, result)
                }
            })
            .collect();

        let mut loaded = 0usize;
        while let Some((src, result)) = loads.next().await {
            if let Err(err) = result {
                warn!(asset = %src, error = %err, "asset failed to load; counting it anyway");
            }
            loaded += 1;
            let percent = ((loaded as f64 / total as f64) * 100.0).round() as u8;
            self.progress.send_replace(percent);
            if let Err(err) = self.chrome.set_progress(percent).await {
                warn!(error = %err, "gate chrome rejected a progress update");
            }
        }

        info!(total, "all tracked assets settled; hiding the load gate");
        tokio::time::sleep(self.hide_delay).await;
        if let Err(err) = self.chrome.conceal().await {
            warn!(error = %err, "gate hide choreography failed");
        }
    }
}
