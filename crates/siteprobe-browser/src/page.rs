//! Browser capability traits consumed by the scan orchestrator.
//!
//! The orchestrator and scanner modules only ever see these traits, so they
//! run unchanged against a real Chromium session or an in-process page.

use crate::console::ConsoleCapture;
use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;

/// Main-document response observed during a navigation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NavigationResponse {
    /// Final URL after redirects
    pub url: String,
    /// HTTP status, when the browser reported one
    pub status: Option<u16>,
    /// Response headers with lowercased names
    pub headers: HashMap<String, String>,
}

impl NavigationResponse {
    /// Case-insensitive header lookup.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }
}

/// One page inside an isolated browsing context.
#[async_trait]
pub trait BrowserPage: Send + Sync {
    /// Navigate and wait for the page to settle, bounded by `timeout`.
    async fn goto(&self, url: &str, timeout: Duration) -> Result<NavigationResponse>;

    /// Resize the page viewport.
    async fn set_viewport(&self, width: u32, height: u32) -> Result<()>;

    /// Capture a PNG screenshot.
    async fn screenshot(&self, full_page: bool) -> Result<Vec<u8>>;

    /// Serialized DOM of the current document.
    async fn content(&self) -> Result<String>;

    /// Evaluate a script, awaiting promises, and return its JSON value.
    async fn evaluate(&self, expression: &str) -> Result<serde_json::Value>;

    /// Start collecting console messages, keeping at most `limit`.
    async fn capture_console(&self, limit: usize) -> Result<ConsoleCapture>;

    /// DevTools port of the owning browser process, for external audit tools.
    fn control_port(&self) -> Option<u16>;
}

/// An isolated browsing context (own cookies and storage) with one page.
#[async_trait]
pub trait BrowserSession: Send + Sync {
    /// The session's page.
    fn page(&self) -> &dyn BrowserPage;

    /// Close the context. The shared browser process stays up.
    async fn close(self: Box<Self>);
}

/// Source of browser sessions.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    /// Open a fresh isolated session, waiting for capacity if necessary.
    async fn open_session(&self) -> Result<Box<dyn BrowserSession>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let mut headers = HashMap::new();
        headers.insert("x-frame-options".to_string(), "DENY".to_string());
        let response = NavigationResponse {
            url: "https://example.com".to_string(),
            status: Some(200),
            headers,
        };

        assert_eq!(response.header("X-Frame-Options"), Some("DENY"));
        assert_eq!(response.header("content-security-policy"), None);
    }
}
