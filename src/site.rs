//! Public website text extraction.
//!
//! The page is reduced to plain text with a handful of regex passes. This is
//! intentionally approximate: adjacent tags can glue words together and
//! broken markup is not repaired.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use std::time::Duration;

pub const DOWNLOAD_ERROR_PREFIX: &str = "ERROR_DOWNLOADING_SITE";
pub const NO_TEXT_EXTRACTED: &str = "NO_TEXT_EXTRACTED";
pub const TRUNCATION_MARKER: &str = " ...[TRUNCATED]";

static SCRIPT_BLOCK: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<script.*?</script>").unwrap());
static STYLE_BLOCK: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<style.*?</style>").unwrap());
static TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"</?[^>]+(>|$)").unwrap());
// U+FEFF counts as whitespace for browsers' `\s`, not for regex's.
static WS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\s\x{FEFF}]+").unwrap());

/// Source of auxiliary site text. Implementations never fail: problems are
/// reported through the returned text itself.
#[async_trait]
pub trait SiteFetcher: Send + Sync {
    async fn fetch_text(&self, url: &str, max_chars: usize) -> String;
}

pub fn download_error(reason: impl std::fmt::Display) -> String {
    format!("{}: {}", DOWNLOAD_ERROR_PREFIX, reason)
}

/// Strips scripts, styles and tags from `html`, collapses whitespace and caps
/// the result at `max_chars` characters.
pub fn extract_text(html: &str, max_chars: usize) -> String {
    let html = SCRIPT_BLOCK.replace_all(html, " ");
    let html = STYLE_BLOCK.replace_all(&html, " ");
    let text = TAG.replace_all(&html, " ");
    let text = WS.replace_all(&text, " ");
    let text = text.trim();

    if text.is_empty() {
        return NO_TEXT_EXTRACTED.to_string();
    }

    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}{}", &text[..cut], TRUNCATION_MARKER),
        None => text.to_string(),
    }
}

pub struct HttpSiteFetcher {
    client: Client,
}

impl HttpSiteFetcher {
    pub fn new(timeout_secs: u64) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self { client })
    }

    async fn download(&self, url: &str) -> Result<Result<String, u16>, reqwest::Error> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Ok(Err(status.as_u16()));
        }
        Ok(Ok(response.text().await?))
    }
}

#[async_trait]
impl SiteFetcher for HttpSiteFetcher {
    async fn fetch_text(&self, url: &str, max_chars: usize) -> String {
        tracing::debug!("Fetching site text from {}", url);
        match self.download(url).await {
            Ok(Ok(html)) => {
                let text = extract_text(&html, max_chars);
                tracing::debug!(chars = text.chars().count(), "Site text extracted");
                text
            }
            Ok(Err(status)) => {
                tracing::warn!(status, "Site returned a non-success status");
                download_error(status)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Site download failed");
                download_error(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn removes_scripts_and_collapses_whitespace() {
        let text = extract_text("<script>bad()</script><p>Hello   world</p>", 20_000);
        assert_eq!(text, "Hello world");
    }

    #[test]
    fn removes_multiline_styles_case_insensitively() {
        let html = "<HTML><STYLE type=\"text/css\">\nbody {\n  color: red;\n}\n</Style>\n<body>Hi <b>there</b></body>";
        assert_eq!(extract_text(html, 100), "Hi there");
    }

    #[test]
    fn script_removal_is_non_greedy() {
        let html = "<script>a()</script>keep<script>b()</script>";
        assert_eq!(extract_text(html, 100), "keep");
    }

    #[test]
    fn unterminated_tag_is_stripped_to_end() {
        assert_eq!(extract_text("text <div class=\"x\"", 100), "text");
    }

    #[test]
    fn byte_order_mark_is_treated_as_whitespace() {
        let html = "\u{FEFF}<html><p>Hola\u{FEFF}mundo</p></html>";
        assert_eq!(extract_text(html, 100), "Hola mundo");
        assert_eq!(extract_text("\u{FEFF}", 100), NO_TEXT_EXTRACTED);
    }

    #[test]
    fn truncates_to_max_chars_with_marker() {
        let body = "a".repeat(50);
        let text = extract_text(&body, 10);
        assert_eq!(text, format!("{}{}", "a".repeat(10), TRUNCATION_MARKER));
    }

    #[test]
    fn text_at_exact_limit_is_not_truncated() {
        assert_eq!(extract_text("abcde", 5), "abcde");
    }

    #[test]
    fn truncation_counts_characters_not_bytes() {
        let text = extract_text("cerámica", 5);
        assert_eq!(text, format!("cerám{}", TRUNCATION_MARKER));
    }

    #[test]
    fn empty_document_yields_sentinel() {
        assert_eq!(
            extract_text("<html><script>x()</script>  </html>", 100),
            NO_TEXT_EXTRACTED
        );
    }

    #[tokio::test]
    async fn fetches_and_extracts_page() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/")
            .with_status(200)
            .with_header("content-type", "text/html")
            .with_body("<html><body><h1>JB</h1><p>Ceramics   workshop</p></body></html>")
            .create_async()
            .await;

        let fetcher = HttpSiteFetcher::new(5).unwrap();
        let text = fetcher.fetch_text(&format!("{}/", server.url()), 100).await;

        mock.assert_async().await;
        assert_eq!(text, "JB Ceramics workshop");
    }

    #[tokio::test]
    async fn non_success_status_yields_sentinel_with_code() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/")
            .with_status(503)
            .with_body("<p>down</p>")
            .create_async()
            .await;

        let fetcher = HttpSiteFetcher::new(5).unwrap();
        let text = fetcher.fetch_text(&format!("{}/", server.url()), 100).await;

        assert_eq!(text, "ERROR_DOWNLOADING_SITE: 503");
    }

    #[tokio::test]
    async fn connection_failure_yields_sentinel() {
        let fetcher = HttpSiteFetcher::new(5).unwrap();
        let text = fetcher.fetch_text("http://127.0.0.1:1/", 100).await;
        assert!(
            text.starts_with("ERROR_DOWNLOADING_SITE: "),
            "unexpected text: {}",
            text
        );
    }
}
