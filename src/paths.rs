use std::io::Write as _;
use std::path::{Path, PathBuf};

use anyhow::Context as _;

pub const ARTICLE_EXT: &str = "html";
pub const MAX_FILENAME_CHARS: usize = 100;
const ELLIPSIS: char = '…';

/// Directory layout of one output tree.
#[derive(Debug, Clone)]
pub struct OutputLayout {
    root: PathBuf,
}

impl OutputLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn html_dir(&self) -> PathBuf {
        self.root.join("html")
    }

    pub fn images_dir(&self) -> PathBuf {
        self.root.join("images")
    }

    pub fn attachments_dir(&self) -> PathBuf {
        self.root.join("attachments")
    }

    pub fn css_dir(&self) -> PathBuf {
        self.root.join("css")
    }

    pub fn index_path(&self) -> PathBuf {
        self.root.join("index.html")
    }

    pub fn report_path(&self) -> PathBuf {
        self.root.join("report.json")
    }

    /// Absolute location of a page given its `/`-separated path under `html/`.
    pub fn article_file(&self, rel_path: &str) -> PathBuf {
        let mut path = self.html_dir();
        for segment in rel_path.split('/') {
            path.push(segment);
        }
        path
    }

    pub fn create_dirs(&self) -> anyhow::Result<()> {
        for dir in [
            self.root.clone(),
            self.html_dir(),
            self.images_dir(),
            self.attachments_dir(),
            self.css_dir(),
        ] {
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("create output dir: {}", dir.display()))?;
        }
        Ok(())
    }
}

/// Maps a display string onto a portable file name.
///
/// Reserved characters go through a fixed substitution table, surrounding
/// spaces and dots are trimmed, and names longer than `max_chars` are cut and
/// end with `…`. Applying it to its own output returns the input unchanged.
pub fn sanitize_filename(name: &str, max_chars: usize) -> String {
    let substituted: String = name
        .chars()
        .filter(|ch| !ch.is_control())
        .map(|ch| match ch {
            '/' | '\\' => '_',
            ':' => '：',
            '*' => '＊',
            '?' => '？',
            '"' => '＂',
            '<' => '＜',
            '>' => '＞',
            '|' => '｜',
            '#' => '＃',
            '%' => '％',
            other => other,
        })
        .collect();

    let trimmed = substituted.trim_matches(|ch| ch == ' ' || ch == '.');
    if trimmed.is_empty() {
        return "untitled".to_owned();
    }

    let max_chars = max_chars.max(2);
    if trimmed.chars().count() <= max_chars {
        return trimmed.to_owned();
    }

    let head: String = trimmed.chars().take(max_chars - 1).collect();
    let head = head.trim_end_matches(|ch| ch == ' ' || ch == '.');
    format!("{head}{ELLIPSIS}")
}

/// Splits a two-level category path into its directory segments.
pub fn category_dirs(category_path: &str, catch_all: &str) -> Vec<String> {
    let category_path = category_path.trim().trim_matches('/');
    if category_path.is_empty() {
        return vec![sanitize_filename(catch_all, MAX_FILENAME_CHARS)];
    }

    match category_path.split_once('/') {
        Some((main, sub)) if !sub.trim().is_empty() => vec![
            sanitize_filename(main, MAX_FILENAME_CHARS),
            sanitize_filename(sub, MAX_FILENAME_CHARS),
        ],
        Some((main, _)) => vec![sanitize_filename(main, MAX_FILENAME_CHARS)],
        None => vec![sanitize_filename(category_path, MAX_FILENAME_CHARS)],
    }
}

/// Canonical `/`-separated path of an article page under `html/`.
pub fn article_rel_path(category_path: &str, id: &str, title: &str, catch_all: &str) -> String {
    let mut segments = category_dirs(category_path, catch_all);
    segments.push(format!(
        "{id}_{}.{ARTICLE_EXT}",
        sanitize_filename(title, MAX_FILENAME_CHARS)
    ));
    segments.join("/")
}

/// Path of the placeholder page for an article that is not part of the mirror.
pub fn stub_rel_path(id: &str, catch_all: &str) -> String {
    format!(
        "{}/{id}.{ARTICLE_EXT}",
        sanitize_filename(catch_all, MAX_FILENAME_CHARS)
    )
}

/// Parses `<id>_<title>.html` file names.
pub fn parse_article_file_name(file_name: &str) -> Option<(String, String)> {
    let stem = file_name.strip_suffix(&format!(".{ARTICLE_EXT}"))?;
    let (id, title) = stem.split_once('_')?;
    if id.is_empty() || !id.chars().all(|ch| ch.is_ascii_digit()) {
        return None;
    }
    Some((id.to_owned(), title.to_owned()))
}

/// `../` chain leading from a page at `rel_path` (under `html/`) back to the output root.
pub fn root_prefix(rel_path: &str) -> String {
    let depth = rel_path.split('/').count();
    "../".repeat(depth)
}

/// Relative href from one page to another, both given relative to `html/`.
pub fn relative_href(from_rel: &str, to_rel: &str) -> String {
    let from_parts: Vec<&str> = from_rel.split('/').collect();
    let to_parts: Vec<&str> = to_rel.split('/').collect();

    let from_dirs = &from_parts[..from_parts.len().saturating_sub(1)];
    let to_dirs = &to_parts[..to_parts.len().saturating_sub(1)];

    let common = from_dirs
        .iter()
        .zip(to_dirs.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut out = "../".repeat(from_dirs.len() - common);
    out.push_str(&to_parts[common..].join("/"));
    out
}

/// Finds every page under `html_dir` whose file name starts with `<id>_`.
pub fn find_article_files(html_dir: &Path, id: &str) -> anyhow::Result<Vec<PathBuf>> {
    let prefix = format!("{id}_");
    let mut found = Vec::new();
    for path in list_files_recursively(html_dir)? {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if name.starts_with(&prefix) && name.ends_with(&format!(".{ARTICLE_EXT}")) {
            found.push(path);
        }
    }
    Ok(found)
}

pub fn list_files_recursively(root: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    if !root.exists() {
        return Ok(out);
    }

    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        for entry in
            std::fs::read_dir(&dir).with_context(|| format!("read dir: {}", dir.display()))?
        {
            let entry = entry.with_context(|| format!("read dir entry: {}", dir.display()))?;
            let path = entry.path();
            let file_type = entry
                .file_type()
                .with_context(|| format!("stat: {}", path.display()))?;
            if file_type.is_dir() {
                stack.push(path);
            } else if file_type.is_file() {
                out.push(path);
            }
        }
    }

    out.sort();
    Ok(out)
}

/// Writes `bytes` to `path` through a temporary file in the same directory,
/// so a reader never observes a partially written file.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> anyhow::Result<()> {
    let parent_dir = path
        .parent()
        .ok_or_else(|| anyhow::anyhow!("output path must have parent: {}", path.display()))?;
    std::fs::create_dir_all(parent_dir)
        .with_context(|| format!("create parent dir: {}", parent_dir.display()))?;

    let mut tmp = tempfile::NamedTempFile::new_in(parent_dir)
        .with_context(|| format!("create temp file in: {}", parent_dir.display()))?;
    tmp.write_all(bytes)
        .with_context(|| format!("write temp file for: {}", path.display()))?;
    tmp.persist(path)
        .map_err(|err| anyhow::anyhow!("persist {}: {}", path.display(), err.error))?;
    Ok(())
}
