//! HTTP client for pushing pages to a destination CMS.
//!
//! Builds the authenticated page-creation request, interprets the response,
//! and classifies every failure so the dispatch cycle can record outcomes
//! without inspecting HTTP details itself.

use std::time::Duration;

use dripfeed_core::models::{Page, Site};
use serde::{Deserialize, Serialize};
use tracing::{debug, info_span, warn, Instrument};

use crate::error::{PublishError, Result};

/// Response body kept for logging is capped at this size.
const MAX_BODY_CAPTURE: usize = 1024;

/// Configuration for the publish client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Timeout for the whole request; exceeding it is a transport failure.
    pub timeout: Duration,
    /// User agent string for requests.
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            user_agent: "dripfeed/0.1".to_string(),
        }
    }
}

/// Locator assigned by the destination for a successfully created page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedPage {
    /// Remote id of the created page.
    pub remote_id: i64,
    /// Public URL of the created page, verbatim from the response.
    pub url: String,
}

/// Request body for the CMS page-creation endpoint.
#[derive(Debug, Serialize)]
struct PageRequest<'a> {
    title: &'a str,
    content: &'a str,
    status: &'static str,
    slug: &'a str,
}

/// The fields of the creation response the client cares about.
#[derive(Debug, Deserialize)]
struct PageResponse {
    id: i64,
    link: String,
}

/// HTTP client for page delivery.
///
/// Delivery is not idempotent at the destination: re-sending a page creates
/// a duplicate remote resource. Callers must only invoke [`publish`] for
/// pages that are not yet published.
///
/// [`publish`]: PublishClient::publish
#[derive(Debug, Clone)]
pub struct PublishClient {
    client: reqwest::Client,
    config: ClientConfig,
}

impl PublishClient {
    /// Creates a new publish client with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns `PublishError::Configuration` if the HTTP client cannot be
    /// built with the provided settings.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| {
                PublishError::configuration(format!("failed to build HTTP client: {e}"))
            })?;

        Ok(Self { client, config })
    }

    /// Creates a publish client with default configuration.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be initialized.
    pub fn with_defaults() -> Result<Self> {
        Self::new(ClientConfig::default())
    }

    /// Pushes one page to one site's page-creation endpoint.
    ///
    /// On success returns the destination-assigned locator verbatim.
    ///
    /// # Errors
    ///
    /// - `AuthenticationFailure` for 401/403 responses
    /// - `RemoteRejected` for any other non-success status
    /// - `TransportFailure` for connection errors and timeouts
    /// - `UnexpectedResponse` for success responses without a usable locator
    /// - `Configuration` if the page carries no rendered content
    pub async fn publish(&self, page: &Page, site: &Site) -> Result<PublishedPage> {
        let content = page.content_html.as_deref().ok_or_else(|| {
            PublishError::configuration(format!("page {} has no rendered content", page.id))
        })?;

        let url = pages_endpoint(&site.endpoint_url);
        let body = PageRequest {
            title: &page.title,
            content,
            status: "publish",
            slug: &page.slug,
        };

        let span = info_span!(
            "page_publish",
            page_id = %page.id,
            site_id = %site.id,
            slug = %page.slug,
            url = %url
        );

        async move {
            debug!("sending page to destination");

            let response = match self
                .client
                .post(&url)
                .basic_auth(&site.username, Some(&site.app_password))
                .json(&body)
                .send()
                .await
            {
                Ok(response) => response,
                Err(e) => {
                    warn!(error = %e, "request failed before a response arrived");
                    if e.is_timeout() {
                        return Err(PublishError::transport(format!(
                            "request timed out after {}s",
                            self.config.timeout.as_secs()
                        )));
                    }
                    if e.is_connect() {
                        return Err(PublishError::transport(format!("connection failed: {e}")));
                    }
                    return Err(PublishError::transport(e.to_string()));
                },
            };

            let status = response.status();
            debug!(status = status.as_u16(), "received response");

            if status == reqwest::StatusCode::UNAUTHORIZED
                || status == reqwest::StatusCode::FORBIDDEN
            {
                return Err(PublishError::authentication(status.as_u16()));
            }

            if !status.is_success() {
                let body = capture_body(response).await;
                return Err(PublishError::rejected(status.as_u16(), body));
            }

            // 201-equivalent: the creation response must carry the locator
            let created: PageResponse = response.json().await.map_err(|e| {
                PublishError::unexpected(format!("creation response not parsable: {e}"))
            })?;

            Ok(PublishedPage { remote_id: created.id, url: created.link })
        }
        .instrument(span)
        .await
    }
}

/// Page-creation endpoint for a site's base URL.
fn pages_endpoint(endpoint_url: &str) -> String {
    format!("{}/wp-json/wp/v2/pages", endpoint_url.trim_end_matches('/'))
}

/// Reads a response body for error reporting, truncated to a bounded size.
async fn capture_body(response: reqwest::Response) -> String {
    match response.text().await {
        Ok(text) if text.len() > MAX_BODY_CAPTURE => {
            let mut end = MAX_BODY_CAPTURE;
            while !text.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}... (truncated)", &text[..end])
        },
        Ok(text) => text,
        Err(e) => format!("[failed to read response body: {e}]"),
    }
}
