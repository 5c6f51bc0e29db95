use thiserror::Error;

/// Failures while turning a fetched HTML body into a [`crate::ContentDocument`].
#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("document has no content container carrying a data-template attribute")]
    MissingContainer,
    #[error("content container <{tag}> is never closed")]
    UnterminatedContainer { tag: String },
    #[error("malformed markup: {0}")]
    Markup(#[from] quick_xml::Error),
    #[error("non-utf8 attribute value: {0}")]
    Encoding(#[from] std::str::Utf8Error),
}

#[derive(Debug, Error)]
pub enum NavigationError {
    #[error("invalid navigation url {url:?}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("failed to fetch {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    /// The target answered non-200 and so did the single home fallback.
    /// The fallback is never retried, so a missing home route cannot
    /// turn into a fetch loop.
    #[error("{url} answered {status} and the home fallback answered {fallback_status}")]
    HomeUnreachable {
        url: String,
        status: u16,
        fallback_status: u16,
    },
    /// The fetched fragment names a template the page registry does not
    /// know. This is a registry/markup mismatch and is surfaced loudly;
    /// the live content is left untouched.
    #[error("template {template:?} is not present in the page registry")]
    UnknownTemplate { template: String },
    #[error(transparent)]
    Document(#[from] DocumentError),
    #[error("transition overlay failed: {0}")]
    Overlay(#[source] anyhow::Error),
    #[error("page {template:?} failed to activate: {source}")]
    PageActivation {
        template: String,
        #[source]
        source: anyhow::Error,
    },
}
