//! Media fetching for push delivery.
//!
//! Backends hand out short-lived media URLs, some behind hotlink protection.
//! The fetcher rotates request-header strategies across attempts and the
//! caller degrades to a plain text link when every attempt fails.

use std::time::Duration;

use {bytes::Bytes, tracing::{info, warn}};

use crate::error::{Error, Result};

/// Extensions worth downloading for re-upload; everything else is delivered
/// as a link.
const DOWNLOADABLE_EXTENSIONS: &[&str] = &[
    // images
    ".jpg", ".jpeg", ".png", ".gif", ".bmp", ".webp", ".svg",
    // audio
    ".mp3", ".wav", ".ogg", ".m4a", ".aac", ".flac",
    // documents
    ".pdf", ".doc", ".docx", ".xls", ".xlsx", ".ppt", ".pptx", ".txt",
];

/// Header strategies tried in rotation across attempts.
const HEADER_STRATEGIES: &[&[(&str, &str)]] = &[
    &[
        (
            "User-Agent",
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
        ),
        ("Accept", "image/webp,image/apng,image/*,*/*;q=0.8"),
        ("Cache-Control", "no-cache"),
    ],
    &[
        (
            "User-Agent",
            "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
        ),
        ("Accept", "image/*,*/*;q=0.8"),
    ],
    &[("User-Agent", "curl/8.5.0"), ("Accept", "*/*")],
];

/// Whether a URL points at something we download and re-upload.
#[must_use]
pub fn is_downloadable(url: &str) -> bool {
    let path = url
        .split(['?', '#'])
        .next()
        .unwrap_or(url)
        .to_lowercase();
    DOWNLOADABLE_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
}

/// File name for a fetched URL, for the re-upload.
#[must_use]
pub fn filename_for(url: &str) -> String {
    url.split(['?', '#'])
        .next()
        .unwrap_or(url)
        .rsplit('/')
        .next()
        .filter(|name| !name.is_empty())
        .unwrap_or("download.bin")
        .to_string()
}

/// HTTP media fetcher with bounded retries.
pub struct MediaFetcher {
    client: reqwest::Client,
    max_attempts: usize,
}

impl Default for MediaFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl MediaFetcher {
    #[must_use]
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            max_attempts: 3,
        }
    }

    /// Fetch a media URL, rotating header strategies between attempts.
    pub async fn fetch(&self, url: &str) -> Result<Bytes> {
        let mut last_error = None;

        for attempt in 0..self.max_attempts {
            let headers = HEADER_STRATEGIES[attempt % HEADER_STRATEGIES.len()];
            let mut request = self.client.get(url);
            for (name, value) in headers {
                request = request.header(*name, *value);
            }

            match request.send().await.and_then(|r| r.error_for_status()) {
                Ok(response) => match response.bytes().await {
                    Ok(data) => {
                        info!(url, bytes = data.len(), attempt, "media fetch succeeded");
                        return Ok(data);
                    },
                    Err(e) => last_error = Some(e),
                },
                Err(e) => last_error = Some(e),
            }

            warn!(url, attempt, "media fetch attempt failed");
            if attempt + 1 < self.max_attempts {
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }

        match last_error {
            Some(e) => Err(Error::media_fetch(url, e)),
            None => Err(Error::media_fetch(url, "no attempts made")),
        }
    }
}
