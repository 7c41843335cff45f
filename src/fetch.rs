//! Page retrieval and markup stripping.
//!
//! [`HttpFetcher`] downloads a page and reduces it to plain text plus
//! metadata. Fetching is deliberately infallible at the trait level: a
//! failed download produces a short placeholder document with the error
//! recorded in its metadata, and the short-content guard downstream turns
//! that into the user-facing apology. Nothing in this module raises.
//!
//! TLS certificate verification is disabled on purpose. The service
//! indexes arbitrary user-supplied URLs, and a refused self-signed cert
//! would otherwise look identical to a dead site.

use std::time::Duration;

use async_trait::async_trait;
use ego_tree::NodeRef;
use scraper::{Html, Node, Selector};
use tracing::{debug, warn};
use url::Url;

use crate::models::{DocumentMetadata, SourceDocument};

/// Placeholder body for pages that could not be retrieved. Short enough
/// that the minimum-content guard always rejects it.
pub const FETCH_FAILURE_TEXT: &str = "Failed to retrieve content from this URL.";

/// Elements whose entire subtree is boilerplate, not content.
const SKIPPED_TAGS: [&str; 5] = ["script", "style", "nav", "footer", "header"];

const DEFAULT_DESCRIPTION: &str = "No description found.";
const DEFAULT_LANGUAGE: &str = "en";

// ============ Trait ============

/// Turns a URL into a plain-text document, never failing outright.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> SourceDocument;
}

// ============ HTTP fetcher ============

pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    /// Build a fetcher with the given request timeout. Redirects are
    /// followed and invalid certificates accepted.
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .danger_accept_invalid_certs(true)
            .build()?;
        Ok(Self { client })
    }

    async fn get_text(&self, url: &str) -> Result<String, reqwest::Error> {
        let response = self.client.get(url).send().await?.error_for_status()?;
        response.text().await
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> SourceDocument {
        match self.get_text(url).await {
            Ok(body) => {
                debug!(url = %url, bytes = body.len(), "fetched page");
                extract_document(url, &body)
            }
            Err(e) => {
                warn!(url = %url, error = %e, "failed to fetch page");
                failure_document(url, &e.to_string())
            }
        }
    }
}

fn failure_document(url: &str, error: &str) -> SourceDocument {
    SourceDocument {
        text: FETCH_FAILURE_TEXT.to_string(),
        metadata: DocumentMetadata {
            source: url.to_string(),
            error: Some(error.to_string()),
            ..DocumentMetadata::default()
        },
    }
}

// ============ Extraction ============

/// Strip markup from `body` and build the document for `url`.
///
/// Synchronous on purpose: the parsed DOM is not `Send`, so it must never
/// live across an await point.
pub fn extract_document(url: &str, body: &str) -> SourceDocument {
    let document = Html::parse_document(body);

    let mut blocks = Vec::new();
    collect_text(document.tree.root(), &mut blocks);
    let text = blocks.join("\n");

    SourceDocument {
        metadata: extract_metadata(url, &document),
        text,
    }
}

/// Depth-first text collection, pruning boilerplate subtrees whole.
fn collect_text(node: NodeRef<'_, Node>, out: &mut Vec<String>) {
    for child in node.children() {
        match child.value() {
            Node::Element(element) => {
                if !SKIPPED_TAGS.contains(&element.name()) {
                    collect_text(child, out);
                }
            }
            Node::Text(text) => {
                let trimmed = text.text.trim();
                if !trimmed.is_empty() {
                    out.push(trimmed.to_string());
                }
            }
            _ => {}
        }
    }
}

fn extract_metadata(url: &str, document: &Html) -> DocumentMetadata {
    let title_selector = Selector::parse("title").expect("title selector");
    let title = document
        .select(&title_selector)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty());

    // Placeholders cover an element missing its attribute, not a missing
    // element: a page with no description meta leaves the field unset.
    let description_selector =
        Selector::parse(r#"meta[name="description"]"#).expect("description selector");
    let description = document.select(&description_selector).next().map(|el| {
        el.value()
            .attr("content")
            .unwrap_or(DEFAULT_DESCRIPTION)
            .to_string()
    });

    let html_selector = Selector::parse("html").expect("html selector");
    let language = document.select(&html_selector).next().map(|el| {
        el.value()
            .attr("lang")
            .unwrap_or(DEFAULT_LANGUAGE)
            .to_string()
    });

    let domain = Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string));

    DocumentMetadata {
        source: url.to_string(),
        title,
        description,
        language,
        domain,
        error: None,
    }
}
