//! Page contract and the closed set of shipped page variants.
//!
//! A page is long-lived: the same instance is re-activated by `create()`
//! every time navigation enters its template, never re-instantiated.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;

/// The freshly swapped content a page binds against on activation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageContent {
    pub template: String,
    pub markup: String,
    pub anchors: Vec<String>,
}

#[async_trait]
pub trait Page: Send + Sync {
    /// Template identifier this page renders.
    fn template(&self) -> &str;
    /// Re-binds content-scoped state. Idempotent; called on every
    /// activation, including repeated activations of the same template.
    async fn create(&self, content: &PageContent) -> Result<()>;
    /// Entrance animation; resolves when it completes.
    async fn animate_in(&self) -> Result<()>;
    /// Exit animation. The orchestrator fires this without awaiting it;
    /// the transition overlay already covers the swap.
    async fn animate_out(&self) -> Result<()>;
}

/// Template id to page instance, built once at startup.
pub type PageRegistry = HashMap<String, Arc<dyn Page>>;

#[derive(Debug, Default, Clone)]
struct PageState {
    activations: u32,
    markup: String,
}

macro_rules! content_page {
    ($name:ident, $template:literal) => {
        pub struct $name {
            state: Mutex<PageState>,
        }

        impl $name {
            pub fn new() -> Self {
                Self {
                    state: Mutex::new(PageState::default()),
                }
            }

            /// How many times this page has been activated.
            pub fn activations(&self) -> u32 {
                self.state.lock().activations
            }

            /// Markup captured by the latest `create()`.
            pub fn bound_markup(&self) -> String {
                self.state.lock().markup.clone()
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        #[async_trait]
        impl Page for $name {
            fn template(&self) -> &str {
                $template
            }

            async fn create(&self, content: &PageContent) -> Result<()> {
                let mut state = self.state.lock();
                state.activations += 1;
                state.markup = content.markup.clone();
                debug!(
                    template = $template,
                    activations = state.activations,
                    "page bound to swapped content"
                );
                Ok(())
            }

            async fn animate_in(&self) -> Result<()> {
                debug!(template = $template, "entrance animation complete");
                Ok(())
            }

            async fn animate_out(&self) -> Result<()> {
                debug!(template = $template, "exit animation started");
                Ok(())
            }
        }
    };
}

content_page!(HomePage, "home");
content_page!(AboutPage, "about");
content_page!(NotFoundPage, "not-found");

/// Registry with the three shipped variants.
pub fn standard_registry() -> PageRegistry {
    let pages: [Arc<dyn Page>; 3] = [
        Arc::new(HomePage::new()),
        Arc::new(AboutPage::new()),
        Arc::new(NotFoundPage::new()),
    ];
    pages
        .into_iter()
        .map(|page| (page.template().to_string(), page))
        .collect()
}
