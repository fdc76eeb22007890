use std::collections::HashSet;
use std::time::Duration;

use anyhow::Context as _;
use reqwest::header::{
    ACCEPT, ACCEPT_LANGUAGE, CACHE_CONTROL, CONTENT_DISPOSITION, CONTENT_TYPE, HeaderMap,
    HeaderValue, ORIGIN, PRAGMA, REFERER, USER_AGENT,
};
use tokio::sync::Mutex;
use url::Url;

use crate::error::AssetError;
use crate::profile::RefererOverride;

const ORIGIN_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";
const EXTERNAL_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
const PAGE_ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";
const IMAGE_ACCEPT: &str = "image/avif,image/webp,image/apng,image/svg+xml,image/*,*/*;q=0.8";
const LANGUAGE: &str = "zh-CN,zh;q=0.9,en;q=0.8";

#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub timeout: Duration,
    /// Pause after every page request, taken by the worker that made it.
    pub delay: Duration,
    pub referer_overrides: Vec<RefererOverride>,
}

/// Which set of default headers a request goes out with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestProfile {
    Origin,
    External,
}

#[derive(Debug, Clone)]
pub struct FetchedBody {
    pub url: Url,
    pub content_type: Option<String>,
    pub content_disposition: Option<String>,
    pub bytes: Vec<u8>,
}

#[derive(Debug)]
struct HostHeaders {
    host: String,
    referer: HeaderValue,
    origin: Option<HeaderValue>,
}

/// HTTP access to the origin site and to third-party asset hosts.
#[derive(Debug)]
pub struct Fetcher {
    origin: reqwest::Client,
    external: reqwest::Client,
    delay: Duration,
    host_headers: Vec<HostHeaders>,
    visited: Mutex<HashSet<String>>,
}

impl Fetcher {
    pub fn new(config: &FetchConfig) -> anyhow::Result<Self> {
        let mut origin_headers = HeaderMap::new();
        origin_headers.insert(USER_AGENT, HeaderValue::from_static(ORIGIN_USER_AGENT));
        origin_headers.insert(ACCEPT, HeaderValue::from_static(PAGE_ACCEPT));
        origin_headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static(LANGUAGE));

        let origin = reqwest::Client::builder()
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::limited(10))
            .default_headers(origin_headers)
            .build()
            .context("build origin http client")?;

        let mut external_headers = HeaderMap::new();
        external_headers.insert(USER_AGENT, HeaderValue::from_static(EXTERNAL_USER_AGENT));
        external_headers.insert(ACCEPT, HeaderValue::from_static(IMAGE_ACCEPT));
        external_headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static(LANGUAGE));
        external_headers.insert("sec-fetch-dest", HeaderValue::from_static("image"));
        external_headers.insert("sec-fetch-mode", HeaderValue::from_static("no-cors"));
        external_headers.insert("sec-fetch-site", HeaderValue::from_static("cross-site"));
        external_headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        external_headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));

        let external = reqwest::Client::builder()
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::limited(10))
            .default_headers(external_headers)
            .build()
            .context("build external http client")?;

        let host_headers = config
            .referer_overrides
            .iter()
            .map(|o| {
                let referer = HeaderValue::from_str(&o.referer)
                    .with_context(|| format!("invalid referer for {}: {}", o.host, o.referer))?;
                let origin = o
                    .origin
                    .as_deref()
                    .map(HeaderValue::from_str)
                    .transpose()
                    .with_context(|| format!("invalid origin for {}", o.host))?;
                Ok(HostHeaders {
                    host: o.host.to_ascii_lowercase(),
                    referer,
                    origin,
                })
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        Ok(Self {
            origin,
            external,
            delay: config.delay,
            host_headers,
            visited: Mutex::new(HashSet::new()),
        })
    }

    /// Fetches an HTML page at most once per run.
    ///
    /// Returns `Ok(None)` when the URL was already requested earlier in the run.
    pub async fn fetch_page(&self, url: &Url) -> anyhow::Result<Option<String>> {
        let key = page_key(url);
        if !self.visited.lock().await.insert(key) {
            tracing::debug!(url = %url, "skip already visited page");
            return Ok(None);
        }

        self.fetch_html(url).await.map(Some)
    }

    /// Fetches an HTML page without consulting the visited set.
    ///
    /// Article jobs are already unique by ID, so they go through here.
    pub async fn fetch_html(&self, url: &Url) -> anyhow::Result<String> {
        let result = self.get_page(url).await;
        self.throttle().await;
        result
    }

    async fn get_page(&self, url: &Url) -> anyhow::Result<String> {
        tracing::debug!(url = %url, "GET page");
        let response = self
            .origin
            .get(url.clone())
            .send()
            .await
            .with_context(|| format!("GET {url}"))?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("GET {url}: HTTP {}", status.as_u16());
        }

        let bytes = response
            .bytes()
            .await
            .with_context(|| format!("read body: {url}"))?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Single attempt at downloading an asset body. Never retried.
    pub async fn fetch_asset(
        &self,
        url: &Url,
        profile: RequestProfile,
    ) -> Result<FetchedBody, AssetError> {
        let request = match profile {
            RequestProfile::Origin => self.origin.get(url.clone()),
            RequestProfile::External => {
                let mut request = self.external.get(url.clone());
                let host = url.host_str().unwrap_or_default().to_ascii_lowercase();
                if let Some(headers) = self.host_headers.iter().find(|h| host.contains(&h.host)) {
                    request = request.header(REFERER, headers.referer.clone());
                    if let Some(origin) = &headers.origin {
                        request = request.header(ORIGIN, origin.clone());
                    }
                }
                request
            }
        };

        let response = request
            .send()
            .await
            .map_err(|err| AssetError::Request(err.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(AssetError::Status(status.as_u16()));
        }

        let final_url = response.url().clone();
        let content_type = header_string(response.headers(), CONTENT_TYPE);
        let content_disposition = header_string(response.headers(), CONTENT_DISPOSITION);
        let bytes = response
            .bytes()
            .await
            .map_err(|err| AssetError::Request(err.to_string()))?;

        Ok(FetchedBody {
            url: final_url,
            content_type,
            content_disposition,
            bytes: bytes.to_vec(),
        })
    }

    pub async fn throttle(&self) {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
    }
}

fn header_string(headers: &HeaderMap, name: reqwest::header::HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned)
}

/// Canonical form used for the visited set: no fragment, no trailing slash.
pub fn page_key(url: &Url) -> String {
    let mut canonical = url.clone();
    canonical.set_fragment(None);
    let mut path = canonical.path().to_owned();
    while path.len() > 1 && path.ends_with('/') {
        path.pop();
    }
    canonical.set_path(&path);
    canonical.to_string()
}

/// Resolves `href` against `base`, dropping the fragment.
pub fn resolve_link(base: &Url, href: &str) -> Option<Url> {
    let mut url = base.join(href.trim()).ok()?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return None;
    }
    url.set_fragment(None);
    Some(url)
}
