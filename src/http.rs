// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: (C) 2025 Cranky Kernel <crankykernel@proton.me>

use crate::error::{SourceError, SourceResult};
use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use std::sync::LazyLock;
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_TIMEOUT_SECS: u64 = 15;

static PASSWORD_PARAM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(password=)[^&]*").expect("password pattern is a valid regex")
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

/// Issues a GET for a fully formed URL and hands back status and body as-is.
///
/// Non-2xx statuses are not errors here; callers decide what they mean.
/// Transport failures and timeouts are `SourceError::Http`.
#[async_trait]
pub trait HttpFetch: Send + Sync {
    async fn fetch(&self, url: &str) -> SourceResult<HttpResponse>;
}

/// Fetches through a same-origin style proxy (`{proxy}?url=<target>`), or
/// directly when no proxy is configured.
#[derive(Debug, Clone)]
pub struct ProxyFetcher {
    client: Client,
    proxy: Option<String>,
}

impl ProxyFetcher {
    pub fn new(proxy: Option<&str>, timeout: Duration) -> SourceResult<Self> {
        let proxy = match proxy.map(str::trim).filter(|p| !p.is_empty()) {
            Some(p) => {
                url::Url::parse(p)
                    .map_err(|e| SourceError::InvalidUrl(format!("proxy {}: {}", p, e)))?;
                Some(p.to_string())
            }
            None => None,
        };

        let client = Client::builder()
            .timeout(timeout)
            .user_agent("Mozilla/5.0")
            .build()
            .map_err(|e| SourceError::Http {
                url: proxy.clone().unwrap_or_default(),
                message: format!("failed to build HTTP client: {}", e),
            })?;

        Ok(Self { client, proxy })
    }

    /// The URL actually requested for `target`.
    pub fn route(&self, target: &str) -> String {
        match &self.proxy {
            Some(proxy) => {
                let separator = if proxy.contains('?') { '&' } else { '?' };
                format!("{}{}url={}", proxy, separator, urlencoding::encode(target))
            }
            None => target.to_string(),
        }
    }
}

#[async_trait]
impl HttpFetch for ProxyFetcher {
    async fn fetch(&self, url: &str) -> SourceResult<HttpResponse> {
        let routed = self.route(url);
        debug!("GET {}", redact(url));

        let response = self.client.get(&routed).send().await.map_err(|e| {
            let message = if e.is_timeout() {
                "timed out".to_string()
            } else if e.is_connect() {
                "connection failed".to_string()
            } else {
                redact(&e.without_url().to_string())
            };
            SourceError::Http {
                url: redact(url),
                message,
            }
        })?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| SourceError::Http {
            url: redact(url),
            message: format!(
                "failed to read response body: {}",
                redact(&e.without_url().to_string())
            ),
        })?;

        debug!("{} -> {} ({} bytes)", redact(url), status, body.len());
        Ok(HttpResponse { status, body })
    }
}

/// Masks the password query parameter for logging.
pub fn redact(url: &str) -> String {
    PASSWORD_PARAM.replace_all(url, "${1}***").into_owned()
}
