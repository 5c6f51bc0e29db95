//! Client-side navigation engine for server-rendered sites: an asset
//! preload gate in front of the first paint, fetch-based content swaps for
//! same-origin links, and a per-page lifecycle coordinated with a
//! transition overlay and a custom cursor.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, error, info, warn};
use url::Url;

pub mod cursor;
pub mod document;
pub mod error;
pub mod page;
pub mod preload;

pub use cursor::{CursorController, CursorSnapshot, Detection, StaticDetection};
pub use document::ContentDocument;
pub use error::{DocumentError, NavigationError};
pub use page::{Page, PageContent, PageRegistry};
pub use preload::{AssetLoadGate, AssetLoader, GateChrome, HttpAssetLoader, NoopChrome};

/// Full-viewport visual curtain shown while content is swapped.
#[async_trait]
pub trait TransitionOverlay: Send + Sync {
    /// Resolves once the overlay fully covers the viewport.
    async fn show(&self) -> Result<()>;
    /// Resolves once the overlay is fully gone.
    async fn hide(&self) -> Result<()>;
}

/// Overlay that completes instantly; stands in when no visual layer is
/// wired up.
pub struct PassthroughOverlay;

#[async_trait]
impl TransitionOverlay for PassthroughOverlay {
    async fn show(&self) -> Result<()> {
        Ok(())
    }

    async fn hide(&self) -> Result<()> {
        Ok(())
    }
}

/// Browser history commit point. Only forward navigations push; popstate
/// replays never do.
pub trait HistorySink: Send + Sync {
    fn push(&self, url: &str);
}

pub struct NoopHistory;

impl HistorySink for NoopHistory {
    fn push(&self, _url: &str) {}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationRequest {
    pub url: String,
    /// Whether the navigated URL gets a new history entry.
    pub push: bool,
}

impl NavigationRequest {
    /// A user-initiated navigation (link click): pushes history.
    pub fn user(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            push: true,
        }
    }

    /// A history replay (back/forward): never pushes.
    pub fn replay(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            push: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavPhase {
    Idle,
    Fetching,
    TransitioningOut,
    Swapping,
    TransitioningIn,
}

/// What became of an activated link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkDisposition {
    /// Same-origin: intercepted and navigated client-side.
    Intercepted,
    /// Foreign origin: left to default browser navigation.
    Browser,
}

#[derive(Debug, Clone)]
pub enum ShellEvent {
    PreloadProgress { percent: u8 },
    PreloadCompleted,
    NavigationStarted { url: String },
    /// A request arrived while another navigation was in flight.
    NavigationDropped { url: String },
    ContentSwapped { template: String },
    NavigationSettled { template: String },
    NavigationFailed { url: String, reason: String },
}

#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub origin: Url,
    pub gate_hide_delay: Duration,
}

impl EngineOptions {
    pub fn new(origin: Url) -> Self {
        Self {
            origin,
            gate_hide_delay: preload::GATE_HIDE_DELAY,
        }
    }

    pub fn with_gate_hide_delay(mut self, delay: Duration) -> Self {
        self.gate_hide_delay = delay;
        self
    }
}

struct EngineState {
    phase: NavPhase,
    template: String,
    markup: String,
    bound_anchors: Vec<String>,
}

/// The navigation orchestrator. Exclusively owns the current template,
/// current page binding and the in-flight phase; collaborators are
/// injected and hold no references back.
pub struct NavigationEngine {
    http: Client,
    options: EngineOptions,
    pages: PageRegistry,
    overlay: Arc<dyn TransitionOverlay>,
    history: Arc<dyn HistorySink>,
    cursor: Arc<CursorController>,
    assets: Arc<dyn AssetLoader>,
    chrome: Arc<dyn GateChrome>,
    inner: Mutex<EngineState>,
    events: broadcast::Sender<ShellEvent>,
}

impl NavigationEngine {
    /// Engine with passthrough visuals and a desktop cursor; fetches
    /// assets over HTTP from the configured origin.
    pub fn new(options: EngineOptions, pages: PageRegistry) -> Arc<Self> {
        let assets: Arc<dyn AssetLoader> =
            Arc::new(HttpAssetLoader::new(options.origin.clone()));
        Self::new_with_dependencies(
            options,
            pages,
            Arc::new(PassthroughOverlay),
            Arc::new(NoopHistory),
            Arc::new(StaticDetection::desktop()),
            assets,
            Arc::new(NoopChrome),
        )
    }

    #[allow(clippy::too_many_arguments)]
    pub fn new_with_dependencies(
        options: EngineOptions,
        pages: PageRegistry,
        overlay: Arc<dyn TransitionOverlay>,
        history: Arc<dyn HistorySink>,
        detection: Arc<dyn Detection>,
        assets: Arc<dyn AssetLoader>,
        chrome: Arc<dyn GateChrome>,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(256);
        Arc::new(Self {
            http: Client::new(),
            options,
            pages,
            overlay,
            history,
            cursor: Arc::new(CursorController::new(detection)),
            assets,
            chrome,
            inner: Mutex::new(EngineState {
                phase: NavPhase::Idle,
                template: String::new(),
                markup: String::new(),
                bound_anchors: Vec::new(),
            }),
            events,
        })
    }

    pub fn origin(&self) -> &Url {
        &self.options.origin
    }

    pub fn cursor(&self) -> Arc<CursorController> {
        Arc::clone(&self.cursor)
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ShellEvent> {
        self.events.subscribe()
    }

    pub async fn phase(&self) -> NavPhase {
        self.inner.lock().await.phase
    }

    pub async fn current_template(&self) -> String {
        self.inner.lock().await.template.clone()
    }

    pub async fn content_markup(&self) -> String {
        self.inner.lock().await.markup.clone()
    }

    /// Anchors currently bound for interception. Replaced wholesale on
    /// every swap; repeated swaps never stack handlers.
    pub async fn bound_anchors(&self) -> Vec<String> {
        self.inner.lock().await.bound_anchors.clone()
    }

    /// Fetches the initial document from `path` and runs [`Self::start`].
    pub async fn bootstrap(&self, path: &str) -> Result<(), NavigationError> {
        let url = self.join_url(path)?;
        let response =
            self.http
                .get(url.clone())
                .send()
                .await
                .map_err(|source| NavigationError::Fetch {
                    url: url.to_string(),
                    source,
                })?;
        let body = response
            .text()
            .await
            .map_err(|source| NavigationError::Fetch {
                url: url.to_string(),
                source,
            })?;
        self.start(&body).await
    }

    /// Startup: bind the live document, run the asset load gate to
    /// completion, then play the initial entrance animation once.
    pub async fn start(&self, initial_html: &str) -> Result<(), NavigationError> {
        let document = ContentDocument::parse(initial_html)?;
        let page = self.lookup_page(&document.template)?;

        let content = self.swap_content(&document).await;
        self.cursor.rebind_hover_targets(&content.anchors);
        page.create(&content)
            .await
            .map_err(|source| NavigationError::PageActivation {
                template: content.template.clone(),
                source,
            })?;

        let gate = AssetLoadGate::new(
            document.images.clone(),
            Arc::clone(&self.assets),
            Arc::clone(&self.chrome),
        )
        .with_hide_delay(self.options.gate_hide_delay);
        info!(template = %content.template, assets = gate.total(), "running asset load gate");

        let mut progress = gate.subscribe_progress();
        let events = self.events.clone();
        tokio::spawn(async move {
            // Ends by itself once the gate (and its sender) is gone.
            while progress.changed().await.is_ok() {
                let percent = *progress.borrow_and_update();
                let _ = events.send(ShellEvent::PreloadProgress { percent });
            }
        });
        gate.run().await;
        let _ = self.events.send(ShellEvent::PreloadCompleted);

        page.animate_in()
            .await
            .map_err(|source| NavigationError::PageActivation {
                template: content.template,
                source,
            })?;
        Ok(())
    }

    /// Link activation entry point. Same-origin hrefs are intercepted;
    /// everything else stays with the browser.
    pub async fn on_link_activated(&self, href: &str) -> Result<LinkDisposition, NavigationError> {
        if !document::is_same_origin(href, &self.options.origin) {
            debug!(href, "foreign origin; leaving the link to the browser");
            return Ok(LinkDisposition::Browser);
        }
        self.navigate(NavigationRequest::user(href)).await?;
        Ok(LinkDisposition::Intercepted)
    }

    /// Browser back/forward: replay the current location without pushing.
    pub async fn on_pop_state(&self, path: &str) -> Result<(), NavigationError> {
        self.navigate(NavigationRequest::replay(path)).await
    }

    /// Runs one navigation to completion. At most one is in flight;
    /// requests arriving while busy are dropped. The cursor loading
    /// affordance and the Idle phase are restored on every exit path.
    pub async fn navigate(&self, request: NavigationRequest) -> Result<(), NavigationError> {
        {
            let mut inner = self.inner.lock().await;
            if inner.phase != NavPhase::Idle {
                warn!(url = %request.url, phase = ?inner.phase, "navigation in flight; dropping request");
                let _ = self.events.send(ShellEvent::NavigationDropped {
                    url: request.url.clone(),
                });
                return Ok(());
            }
            inner.phase = NavPhase::Fetching;
        }
        let _ = self.events.send(ShellEvent::NavigationStarted {
            url: request.url.clone(),
        });
        self.cursor.begin_loading();

        let result = self.run_navigation(&request).await;

        self.cursor.end_loading();
        self.set_phase(NavPhase::Idle).await;

        match result {
            Ok(template) => {
                info!(url = %request.url, template = %template, "navigation settled");
                let _ = self.events.send(ShellEvent::NavigationSettled { template });
                Ok(())
            }
            Err(err) => {
                error!(url = %request.url, error = %err, "navigation failed");
                let _ = self.events.send(ShellEvent::NavigationFailed {
                    url: request.url.clone(),
                    reason: err.to_string(),
                });
                Err(err)
            }
        }
    }

    async fn run_navigation(&self, request: &NavigationRequest) -> Result<String, NavigationError> {
        let (body, final_url) = self.fetch_with_home_fallback(&request.url).await?;

        // Everything fallible about the incoming document is resolved
        // before the overlay goes up: a bad fragment or an unregistered
        // template must leave the live content untouched and the overlay
        // hidden.
        let document = ContentDocument::parse(&body)?;
        let incoming = self.lookup_page(&document.template)?;
        let outgoing = {
            let inner = self.inner.lock().await;
            self.pages.get(&inner.template).cloned()
        };

        self.set_phase(NavPhase::TransitioningOut).await;
        self.overlay.show().await.map_err(NavigationError::Overlay)?;

        // Exit animation plays behind the overlay; completion is not
        // awaited.
        if let Some(page) = outgoing {
            let template = page.template().to_string();
            tokio::spawn(async move {
                if let Err(err) = page.animate_out().await {
                    warn!(template = %template, error = %err, "exit animation failed");
                }
            });
        }

        if request.push {
            self.history.push(final_url.as_str());
        }

        self.set_phase(NavPhase::Swapping).await;
        self.overlay.hide().await.map_err(NavigationError::Overlay)?;

        let content = self.swap_content(&document).await;
        let _ = self.events.send(ShellEvent::ContentSwapped {
            template: content.template.clone(),
        });

        self.set_phase(NavPhase::TransitioningIn).await;
        incoming
            .create(&content)
            .await
            .map_err(|source| NavigationError::PageActivation {
                template: content.template.clone(),
                source,
            })?;
        incoming
            .animate_in()
            .await
            .map_err(|source| NavigationError::PageActivation {
                template: content.template.clone(),
                source,
            })?;

        // The swap destroyed the old anchors; interception and hover
        // targets follow the new subtree, and no stale label survives.
        self.cursor.rebind_hover_targets(&content.anchors);
        self.cursor.reset_label();

        Ok(content.template)
    }

    /// GET with success pinned to HTTP 200. A non-200 target falls back to
    /// the root route exactly once; a failing root is surfaced, never
    /// retried.
    async fn fetch_with_home_fallback(
        &self,
        raw_url: &str,
    ) -> Result<(String, Url), NavigationError> {
        let url = self.join_url(raw_url)?;
        let response =
            self.http
                .get(url.clone())
                .send()
                .await
                .map_err(|source| NavigationError::Fetch {
                    url: url.to_string(),
                    source,
                })?;
        let status = response.status();
        if status == StatusCode::OK {
            let body = response
                .text()
                .await
                .map_err(|source| NavigationError::Fetch {
                    url: url.to_string(),
                    source,
                })?;
            return Ok((body, url));
        }

        warn!(url = %url, status = %status, "navigation target unavailable; falling back to the root route");
        let home = self.join_url("/")?;
        let response =
            self.http
                .get(home.clone())
                .send()
                .await
                .map_err(|source| NavigationError::Fetch {
                    url: home.to_string(),
                    source,
                })?;
        let home_status = response.status();
        if home_status != StatusCode::OK {
            return Err(NavigationError::HomeUnreachable {
                url: url.to_string(),
                status: status.as_u16(),
                fallback_status: home_status.as_u16(),
            });
        }
        let body = response
            .text()
            .await
            .map_err(|source| NavigationError::Fetch {
                url: home.to_string(),
                source,
            })?;
        Ok((body, home))
    }

    async fn swap_content(&self, document: &ContentDocument) -> PageContent {
        let mut inner = self.inner.lock().await;
        inner.template = document.template.clone();
        inner.markup = document.markup.clone();
        inner.bound_anchors = document.anchors.clone();
        PageContent {
            template: document.template.clone(),
            markup: document.markup.clone(),
            anchors: document.anchors.clone(),
        }
    }

    fn lookup_page(&self, template: &str) -> Result<Arc<dyn Page>, NavigationError> {
        self.pages
            .get(template)
            .cloned()
            .ok_or_else(|| NavigationError::UnknownTemplate {
                template: template.to_string(),
            })
    }

    fn join_url(&self, raw: &str) -> Result<Url, NavigationError> {
        self.options
            .origin
            .join(raw)
            .map_err(|source| NavigationError::InvalidUrl {
                url: raw.to_string(),
                source,
            })
    }

    async fn set_phase(&self, phase: NavPhase) {
        self.inner.lock().await.phase = phase;
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
