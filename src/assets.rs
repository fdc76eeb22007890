//! Image and attachment downloads.
//!
//! Every URL is fetched at most once per run: the first caller runs the
//! download inside a per-URL `OnceCell`, concurrent callers await the same
//! cell, and later callers read the cached outcome.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use sha2::{Digest as _, Sha256};
use tokio::sync::{Mutex, OnceCell};
use url::Url;

use crate::error::AssetError;
use crate::fetch::{FetchedBody, Fetcher, RequestProfile};
use crate::formats::AssetStats;
use crate::paths::{self, OutputLayout};

pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "bmp", "webp", "svg"];
pub const ATTACHMENT_EXTENSIONS: &[&str] = &[
    "pdf", "doc", "docx", "xls", "xlsx", "ppt", "pptx", "zip", "rar", "7z", "txt", "csv", "json",
    "xml",
];
pub const PREVIEWABLE_EXTENSIONS: &[&str] = &["pdf", "txt", "json", "xml", "csv"];

const IMAGE_HASH_CHARS: usize = 16;
const ATTACHMENT_HASH_CHARS: usize = 8;
const ATTACHMENT_NAME_CHARS: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssetKind {
    Image,
    Attachment,
}

impl AssetKind {
    /// Output subdirectory, also the prefix of root-relative references.
    pub fn dir_name(self) -> &'static str {
        match self {
            AssetKind::Image => "images",
            AssetKind::Attachment => "attachments",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetRequest {
    pub url: Url,
    pub kind: AssetKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetOutcome {
    Stored { file_name: String, kind: AssetKind },
    Failed { external: bool },
}

impl AssetOutcome {
    /// Reference relative to the output root, e.g. `images/ab12.png`.
    pub fn local_path(&self) -> Option<String> {
        match self {
            AssetOutcome::Stored { file_name, kind } => {
                Some(format!("{}/{file_name}", kind.dir_name()))
            }
            AssetOutcome::Failed { .. } => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AssetPolicy {
    pub try_external: bool,
    pub external_hosts: Vec<String>,
    pub trusted_attachment_paths: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Settled {
    Downloaded(String, AssetKind),
    Reused(String, AssetKind),
    Failed(AssetError),
    SkippedExternal,
}

type Cell = Arc<OnceCell<Settled>>;

/// Resolves asset URLs to local files under `images/` and `attachments/`.
#[derive(Debug)]
pub struct AssetResolver {
    fetcher: Arc<Fetcher>,
    origin_host: String,
    images_dir: PathBuf,
    attachments_dir: PathBuf,
    policy: AssetPolicy,
    cells: Mutex<HashMap<String, Cell>>,
    // Serializes collision checks for attachment names.
    attachment_names: Mutex<()>,
}

impl AssetResolver {
    pub fn new(
        fetcher: Arc<Fetcher>,
        origin: &Url,
        layout: &OutputLayout,
        policy: AssetPolicy,
    ) -> anyhow::Result<Self> {
        let origin_host = origin
            .host_str()
            .ok_or_else(|| anyhow::anyhow!("origin url must have host: {origin}"))?
            .to_ascii_lowercase();
        Ok(Self {
            fetcher,
            origin_host,
            images_dir: layout.images_dir(),
            attachments_dir: layout.attachments_dir(),
            policy,
            cells: Mutex::new(HashMap::new()),
            attachment_names: Mutex::new(()),
        })
    }

    /// Resolves one asset; concurrent calls for the same URL share a single fetch.
    ///
    /// The cache is keyed by URL alone, so the kind of the first request for
    /// a URL decides where it is stored.
    pub async fn resolve(&self, request: &AssetRequest) -> AssetOutcome {
        let key = canonical_key(&request.url);
        let cell = {
            let mut cells = self.cells.lock().await;
            cells.entry(key).or_default().clone()
        };

        let settled = cell.get_or_init(|| self.settle(request)).await;
        match settled {
            Settled::Downloaded(name, kind) | Settled::Reused(name, kind) => AssetOutcome::Stored {
                file_name: name.clone(),
                kind: *kind,
            },
            Settled::Failed(_) | Settled::SkippedExternal => AssetOutcome::Failed {
                external: self.is_external(&request.url),
            },
        }
    }

    /// Resolves every request in order; the map is keyed by canonical URL.
    pub async fn resolve_all(&self, requests: &[AssetRequest]) -> HashMap<String, AssetOutcome> {
        let mut out = HashMap::new();
        for request in requests {
            let outcome = self.resolve(request).await;
            out.insert(canonical_key(&request.url), outcome);
        }
        out
    }

    pub async fn stats(&self) -> AssetStats {
        let cells = self.cells.lock().await;
        let mut stats = AssetStats::default();
        for cell in cells.values() {
            match cell.get() {
                Some(Settled::Downloaded(_, kind)) => match kind {
                    AssetKind::Image => stats.images_downloaded += 1,
                    AssetKind::Attachment => stats.attachments_downloaded += 1,
                },
                Some(Settled::Reused(..)) => stats.reused_from_disk += 1,
                Some(Settled::Failed(_)) => stats.failed += 1,
                Some(Settled::SkippedExternal) => stats.skipped_external += 1,
                None => {}
            }
        }
        stats
    }

    /// URLs that failed in this run, with the reason.
    pub async fn failures(&self) -> Vec<(String, String)> {
        let cells = self.cells.lock().await;
        let mut out = cells
            .iter()
            .filter_map(|(url, cell)| match cell.get() {
                Some(Settled::Failed(err)) => Some((url.clone(), err.to_string())),
                _ => None,
            })
            .collect::<Vec<_>>();
        out.sort();
        out
    }

    /// Hosts outside the origin's registrable domain, or on the known image-host list.
    pub fn is_external(&self, url: &Url) -> bool {
        let Some(host) = url.host_str() else {
            return false;
        };
        let host = host.to_ascii_lowercase();
        if self
            .policy
            .external_hosts
            .iter()
            .any(|known| host.contains(known.as_str()))
        {
            return true;
        }
        host != self.origin_host && main_domain(&host) != main_domain(&self.origin_host)
    }

    fn is_trusted_attachment(&self, url: &Url) -> bool {
        let url = url.as_str();
        self.policy
            .trusted_attachment_paths
            .iter()
            .any(|p| url.contains(p.as_str()))
    }

    async fn settle(&self, request: &AssetRequest) -> Settled {
        let result = match request.kind {
            AssetKind::Image => self.settle_image(&request.url).await,
            AssetKind::Attachment => self.settle_attachment(&request.url).await,
        };
        match result {
            Ok(settled) => settled,
            Err(AssetError::ExternalDisabled) => {
                tracing::debug!(url = %request.url, "skip external asset");
                Settled::SkippedExternal
            }
            Err(err) => {
                tracing::warn!(url = %request.url, kind = ?request.kind, error = %err, "asset download failed");
                Settled::Failed(err)
            }
        }
    }

    async fn settle_image(&self, url: &Url) -> Result<Settled, AssetError> {
        let hash = url_hash(url, IMAGE_HASH_CHARS);
        if let Some(existing) = find_by_stem(&self.images_dir, &hash) {
            tracing::debug!(url = %url, file = %existing, "reuse image from disk");
            return Ok(Settled::Reused(existing, AssetKind::Image));
        }

        let external = self.is_external(url);
        if external && !self.policy.try_external {
            return Err(AssetError::ExternalDisabled);
        }
        let profile = if external {
            RequestProfile::External
        } else {
            RequestProfile::Origin
        };

        tracing::info!(url = %url, external, "download image");
        let body = self.fetcher.fetch_asset(url, profile).await?;
        let ext = validate_image(&body, url, self.is_trusted_attachment(url), external)?;

        let file_name = format!("{hash}.{ext}");
        let path = self.images_dir.join(&file_name);
        paths::write_atomic(&path, &body.bytes).map_err(|err| AssetError::Write(format!("{err:#}")))?;
        Ok(Settled::Downloaded(file_name, AssetKind::Image))
    }

    async fn settle_attachment(&self, url: &Url) -> Result<Settled, AssetError> {
        let hash = url_hash(url, ATTACHMENT_HASH_CHARS);
        if let Some(existing) = find_attachment(&self.attachments_dir, &hash) {
            tracing::debug!(url = %url, file = %existing, "reuse attachment from disk");
            return Ok(Settled::Reused(existing, AssetKind::Attachment));
        }

        let profile = if self.is_external(url) {
            RequestProfile::External
        } else {
            RequestProfile::Origin
        };

        tracing::info!(url = %url, "download attachment");
        let body = self.fetcher.fetch_asset(url, profile).await?;
        if body.bytes.is_empty() {
            return Err(AssetError::EmptyBody);
        }

        let preferred = attachment_file_name(&hash, &body);
        let _guard = self.attachment_names.lock().await;
        let file_name = unique_file_name(&self.attachments_dir, &preferred);
        let path = self.attachments_dir.join(&file_name);
        paths::write_atomic(&path, &body.bytes).map_err(|err| AssetError::Write(format!("{err:#}")))?;
        Ok(Settled::Downloaded(file_name, AssetKind::Attachment))
    }
}

/// Canonical cache key: absolute URL without fragment.
pub fn canonical_key(url: &Url) -> String {
    let mut url = url.clone();
    url.set_fragment(None);
    url.to_string()
}

pub fn url_hash(url: &Url, chars: usize) -> String {
    let digest = Sha256::digest(canonical_key(url).as_bytes());
    let mut hex = hex::encode(digest);
    hex.truncate(chars);
    hex
}

fn main_domain(host: &str) -> String {
    let parts = host.split('.').collect::<Vec<_>>();
    if parts.len() >= 2 {
        parts[parts.len() - 2..].join(".")
    } else {
        host.to_owned()
    }
}

/// Lowercase extension of the URL path's last segment.
pub fn url_extension(url: &Url) -> Option<String> {
    let last = url.path_segments()?.next_back()?;
    let (_, ext) = last.rsplit_once('.')?;
    if ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// Image format recognized from the first bytes of a body.
pub fn sniff_image(bytes: &[u8]) -> Option<&'static str> {
    if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        return Some("jpg");
    }
    if bytes.starts_with(b"\x89PNG") {
        return Some("png");
    }
    if bytes.starts_with(b"GIF8") {
        return Some("gif");
    }
    if bytes.starts_with(b"BM") {
        return Some("bmp");
    }
    if bytes.starts_with(b"RIFF") && bytes.len() >= 12 && &bytes[8..12] == b"WEBP" {
        return Some("webp");
    }

    let head = &bytes[..bytes.len().min(512)];
    let head = String::from_utf8_lossy(head);
    let head = head.trim_start_matches('\u{feff}').trim_start();
    if head.starts_with("<svg") || (head.starts_with("<?xml") && head.contains("<svg")) {
        return Some("svg");
    }
    None
}

fn content_type_extension(content_type: &str) -> Option<&'static str> {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    match mime.as_str() {
        "image/jpeg" | "image/jpg" | "image/pjpeg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/gif" => Some("gif"),
        "image/bmp" | "image/x-ms-bmp" => Some("bmp"),
        "image/webp" => Some("webp"),
        "image/svg+xml" => Some("svg"),
        _ => None,
    }
}

/// Accepts or rejects a downloaded image body and picks its extension.
///
/// A body is kept when it carries a known image signature, comes from a
/// trusted attachment path, or is external (lenient policy). The extension
/// comes from the URL, then the signature, then the content type.
pub fn validate_image(
    body: &FetchedBody,
    url: &Url,
    trusted_attachment: bool,
    external: bool,
) -> Result<String, AssetError> {
    if body.bytes.is_empty() {
        return Err(AssetError::EmptyBody);
    }

    let sniffed = sniff_image(&body.bytes);
    if sniffed.is_none() && !trusted_attachment && !external {
        return Err(AssetError::UnrecognizedImage(
            body.content_type.clone().unwrap_or_else(|| "unknown".to_owned()),
        ));
    }

    let ext = url_extension(url)
        .filter(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
        .or_else(|| sniffed.map(str::to_owned))
        .or_else(|| {
            body.content_type
                .as_deref()
                .and_then(content_type_extension)
                .map(str::to_owned)
        })
        .unwrap_or_else(|| "jpg".to_owned());
    Ok(ext)
}

/// File name from a `Content-Disposition` header, preferring the RFC 5987 form.
pub fn content_disposition_filename(header: &str) -> Option<String> {
    let mut legacy = None;
    for part in header.split(';') {
        let part = part.trim();
        if let Some(value) = part.strip_prefix("filename*=") {
            let encoded = value.rsplit('\'').next().unwrap_or(value).trim_matches('"');
            if let Ok(decoded) = urlencoding::decode(encoded) {
                let decoded = decoded.trim().to_owned();
                if !decoded.is_empty() {
                    return Some(decoded);
                }
            }
        } else if let Some(value) = part.strip_prefix("filename=") {
            let value = value.trim().trim_matches('"').trim_matches('\'').trim();
            if !value.is_empty() {
                legacy = Some(value.to_owned());
            }
        }
    }
    legacy
}

/// Last path segment that looks like a file name, percent-decoded.
pub fn url_tail_filename(url: &Url) -> Option<String> {
    let segments = url.path_segments()?.collect::<Vec<_>>();
    segments
        .iter()
        .rev()
        .find(|s| !s.is_empty() && s.contains('.'))
        .map(|s| {
            urlencoding::decode(s)
                .map(|d| d.into_owned())
                .unwrap_or_else(|_| (*s).to_owned())
        })
}

fn extension_for_content_type(content_type: &str) -> &'static str {
    let ct = content_type.to_ascii_lowercase();
    if ct.contains("pdf") {
        "pdf"
    } else if ct.contains("zip") || ct.contains("compressed") {
        "zip"
    } else if ct.contains("word") {
        "doc"
    } else if ct.contains("excel") || ct.contains("spreadsheet") {
        "xlsx"
    } else if ct.contains("json") {
        "json"
    } else if ct.contains("text") {
        "txt"
    } else {
        "bin"
    }
}

/// `<hash>_<original name>` when a name is known, else `<hash>.<ext>`.
pub fn attachment_file_name(hash: &str, body: &FetchedBody) -> String {
    let original = body
        .content_disposition
        .as_deref()
        .and_then(content_disposition_filename)
        .or_else(|| url_tail_filename(&body.url));

    match original {
        Some(name) => format!(
            "{hash}_{}",
            paths::sanitize_filename(&name, ATTACHMENT_NAME_CHARS)
        ),
        None => format!(
            "{hash}.{}",
            extension_for_content_type(body.content_type.as_deref().unwrap_or_default())
        ),
    }
}

/// `name`, or `stem_1.ext`, `stem_2.ext`, ... whichever does not exist yet.
pub fn unique_file_name(dir: &Path, name: &str) -> String {
    if !dir.join(name).exists() {
        return name.to_owned();
    }
    let (stem, ext) = match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem, Some(ext)),
        _ => (name, None),
    };
    let mut counter = 1usize;
    loop {
        let candidate = match ext {
            Some(ext) => format!("{stem}_{counter}.{ext}"),
            None => format!("{stem}_{counter}"),
        };
        if !dir.join(&candidate).exists() {
            return candidate;
        }
        counter += 1;
    }
}

pub fn is_previewable(file_name: &str) -> bool {
    file_name
        .rsplit_once('.')
        .map(|(_, ext)| PREVIEWABLE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

fn find_by_stem(dir: &Path, stem: &str) -> Option<String> {
    let entries = std::fs::read_dir(dir).ok()?;
    entries
        .filter_map(Result::ok)
        .filter_map(|e| e.file_name().into_string().ok())
        .find(|name| name.split_once('.').map(|(s, _)| s) == Some(stem))
}

fn find_attachment(dir: &Path, hash: &str) -> Option<String> {
    let underscore = format!("{hash}_");
    let dot = format!("{hash}.");
    let entries = std::fs::read_dir(dir).ok()?;
    entries
        .filter_map(Result::ok)
        .filter_map(|e| e.file_name().into_string().ok())
        .find(|name| name.starts_with(&underscore) || name.starts_with(&dot))
}
