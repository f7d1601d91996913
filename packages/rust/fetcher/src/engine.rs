//! HTTP page fetching with SSRF protection and bounded, order-preserving fan-out.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::redirect::Policy;
use tokio::sync::Semaphore;
use tracing::{debug, instrument, warn};
use url::Url;

use linkdigest_shared::{FetchConfig, LinkDigestError, Result};

/// Browser-like User-Agent; plenty of article hosts refuse unknown agents.
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                          (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// Maximum redirects followed per request.
const MAX_REDIRECTS: usize = 5;

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Retrieves the raw markup behind a URL.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetch `url`, returning the body of a successful (2xx) response.
    async fn fetch(&self, url: &str) -> Result<String>;
}

// ---------------------------------------------------------------------------
// HttpFetcher
// ---------------------------------------------------------------------------

/// Options for [`HttpFetcher`].
#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// Per-request timeout.
    pub timeout: Duration,
    /// Allow loopback/private targets (integration tests, intranet links).
    pub allow_private_hosts: bool,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            allow_private_hosts: false,
        }
    }
}

impl From<&FetchConfig> for FetchOptions {
    fn from(config: &FetchConfig) -> Self {
        Self {
            timeout: Duration::from_secs(config.timeout_secs),
            allow_private_hosts: config.allow_private_hosts,
        }
    }
}

/// reqwest-backed [`PageFetcher`].
pub struct HttpFetcher {
    client: Client,
    allow_private_hosts: bool,
}

impl HttpFetcher {
    /// Create a new fetcher with the given options.
    pub fn new(options: FetchOptions) -> Result<Self> {
        Ok(Self {
            client: build_client(options.timeout, options.allow_private_hosts)?,
            allow_private_hosts: options.allow_private_hosts,
        })
    }
}

fn build_client(timeout: Duration, allow_private_hosts: bool) -> Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .redirect(redirect_policy(allow_private_hosts))
        .timeout(timeout)
        .build()
        .map_err(|e| LinkDigestError::Network(format!("failed to build HTTP client: {e}")))
}

/// Follows up to [`MAX_REDIRECTS`] hops, refusing any hop onto a non-public target.
fn redirect_policy(allow_private_hosts: bool) -> Policy {
    Policy::custom(move |attempt| {
        if attempt.previous().len() >= MAX_REDIRECTS {
            return attempt.error(format!("more than {MAX_REDIRECTS} redirects"));
        }
        if !allow_private_hosts && is_ssrf_target(attempt.url()) {
            let target = attempt.url().to_string();
            warn!(%target, "SSRF protection: blocked redirect");
            return attempt.error(format!("redirect to non-public URL blocked: {target}"));
        }
        attempt.follow()
    })
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    #[instrument(skip(self))]
    async fn fetch(&self, url: &str) -> Result<String> {
        let parsed = Url::parse(url)
            .map_err(|e| LinkDigestError::validation(format!("invalid URL '{url}': {e}")))?;

        if !self.allow_private_hosts && is_ssrf_target(&parsed) {
            warn!(%url, "SSRF protection: blocked");
            return Err(LinkDigestError::validation(format!(
                "refusing to fetch non-public URL: {url}"
            )));
        }

        debug!(%url, "fetching page");

        let response = self
            .client
            .get(parsed.as_str())
            .send()
            .await
            .map_err(|e| LinkDigestError::Network(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(LinkDigestError::Network(format!("{url}: HTTP {status}")));
        }

        response
            .text()
            .await
            .map_err(|e| LinkDigestError::Network(format!("{url}: body read failed: {e}")))
    }
}

// ---------------------------------------------------------------------------
// Fan-out
// ---------------------------------------------------------------------------

/// Fetch every URL with at most `concurrency` requests in flight.
///
/// Completions may arrive in any order; the returned vector lines up with `urls`.
pub async fn fetch_all(
    fetcher: Arc<dyn PageFetcher>,
    urls: Vec<String>,
    concurrency: usize,
) -> Vec<(String, Result<String>)> {
    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut handles = Vec::with_capacity(urls.len());

    for url in urls {
        let fetcher = fetcher.clone();
        let sem = semaphore.clone();
        let task_url = url.clone();

        let handle = tokio::spawn(async move {
            let _permit = sem
                .acquire_owned()
                .await
                .map_err(|e| LinkDigestError::Network(format!("fetch pool closed: {e}")))?;
            fetcher.fetch(&task_url).await
        });
        handles.push((url, handle));
    }

    // Awaiting in spawn order is what recombines results in request order.
    let mut results = Vec::with_capacity(handles.len());
    for (url, handle) in handles {
        let result = match handle.await {
            Ok(result) => result,
            Err(e) => Err(LinkDigestError::Network(format!("{url}: fetch task failed: {e}"))),
        };
        results.push((url, result));
    }
    results
}

// ---------------------------------------------------------------------------
// SSRF protection
// ---------------------------------------------------------------------------

/// Check if a URL targets a potentially dangerous resource.
fn is_ssrf_target(url: &Url) -> bool {
    match url.scheme() {
        "http" | "https" => {}
        _ => return true,
    }

    match url.host() {
        Some(url::Host::Ipv4(v4)) => is_private_ip(&IpAddr::V4(v4)),
        Some(url::Host::Ipv6(v6)) => is_private_ip(&IpAddr::V6(v6)),
        Some(url::Host::Domain(host)) => {
            host == "localhost" || host.ends_with(".local") || host.ends_with(".internal")
        }
        None => true,
    }
}

/// Check if an IP is in a private/reserved range.
fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_broadcast()
                || v4.is_unspecified()
                // 100.64.0.0/10 (Carrier-grade NAT)
                || (v4.octets()[0] == 100 && (v4.octets()[1] & 0xC0) == 64)
                // 192.0.0.0/24
                || (v4.octets()[0] == 192 && v4.octets()[1] == 0 && v4.octets()[2] == 0)
        }
        IpAddr::V6(v6) => {
            if let Some(v4) = v6.to_ipv4_mapped() {
                return is_private_ip(&IpAddr::V4(v4));
            }
            let first = v6.segments()[0];
            v6.is_loopback()
                || v6.is_unspecified()
                // fc00::/7 (unique local)
                || (first & 0xfe00) == 0xfc00
                // fe80::/10 (link-local)
                || (first & 0xffc0) == 0xfe80
        }
    }
}
