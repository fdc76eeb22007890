//! Output assembly: article pages, global link fixup, and the hash-routed index.
//!
//! Every article page carries its metadata in `<meta name="kbmirror:*">`
//! tags and its body between fixed markers, so the whole index can be
//! rebuilt from the output tree alone.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;
use std::time::SystemTime;

use anyhow::Context as _;
use regex::{Captures, Regex};
use scraper::Html;

use crate::categories;
use crate::cli::AssembleArgs;
use crate::dom::{self, escape_attr, escape_text};
use crate::formats::{Article, Category, LinkStats, SectionSummary};
use crate::paths::{self, OutputLayout};
use crate::profile::SiteProfile;
use crate::route::{self, Route};
use crate::rules::SiteRules;

const CONTENT_START: &str = "<!-- kbmirror:content:start -->";
const CONTENT_END: &str = "<!-- kbmirror:content:end -->";
const META_ID: &str = "kbmirror:id";
const META_TITLE: &str = "kbmirror:title";
const META_CATEGORY: &str = "kbmirror:category";
const META_SECTION: &str = "kbmirror:section";
const META_SOURCE: &str = "kbmirror:source";
const META_UPDATED: &str = "kbmirror:updated";
const META_STUB: &str = "kbmirror:stub";

const ARTICLE_CSS: &str = include_str!("../assets/article.css");
const INDEX_CSS: &str = include_str!("../assets/index.css");

/// Metadata written into every article page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageMeta {
    pub id: String,
    pub title: String,
    pub category_path: String,
    pub section_title: String,
    pub source_url: String,
    pub last_updated: Option<String>,
}

impl PageMeta {
    pub fn from_article(article: &Article) -> Self {
        Self {
            id: article.id.clone(),
            title: article.title.clone(),
            category_path: article.category_path.clone(),
            section_title: article.section_title.clone(),
            source_url: article.url.clone(),
            last_updated: article.last_updated.clone(),
        }
    }
}

/// An article page found in the output tree.
#[derive(Debug, Clone)]
pub struct StoredPage {
    /// `/`-separated path under `html/`.
    pub rel_path: String,
    pub meta: PageMeta,
    /// Body with asset references relative to the output root.
    pub content: String,
    pub modified: SystemTime,
}

#[derive(Debug, Clone, Default)]
pub struct Assembly {
    pub published: usize,
    pub links: LinkStats,
    pub categories: Vec<Category>,
}

fn prefix_assets(content: &str, prefix: &str) -> String {
    content
        .replace("src=\"images/", &format!("src=\"{prefix}images/"))
        .replace("href=\"attachments/", &format!("href=\"{prefix}attachments/"))
}

fn unprefix_assets(content: &str, prefix: &str) -> String {
    content
        .replace(&format!("src=\"{prefix}images/"), "src=\"images/")
        .replace(&format!("href=\"{prefix}attachments/"), "href=\"attachments/")
}

fn meta_tag(out: &mut String, name: &str, value: &str) {
    out.push_str(&format!(
        "  <meta name=\"{name}\" content=\"{}\">\n",
        escape_attr(value)
    ));
}

pub fn render_article_page(meta: &PageMeta, rel_path: &str, content: &str) -> String {
    let prefix = paths::root_prefix(rel_path);
    let mut out = String::new();
    out.push_str("<!DOCTYPE html>\n<html lang=\"zh-CN\">\n<head>\n");
    out.push_str("  <meta charset=\"utf-8\">\n");
    out.push_str(&format!("  <title>{}</title>\n", escape_text(&meta.title)));
    meta_tag(&mut out, META_ID, &meta.id);
    meta_tag(&mut out, META_TITLE, &meta.title);
    meta_tag(&mut out, META_CATEGORY, &meta.category_path);
    meta_tag(&mut out, META_SECTION, &meta.section_title);
    meta_tag(&mut out, META_SOURCE, &meta.source_url);
    if let Some(updated) = &meta.last_updated {
        meta_tag(&mut out, META_UPDATED, updated);
    }
    out.push_str(&format!(
        "  <link rel=\"stylesheet\" href=\"{prefix}css/article.css\">\n"
    ));
    out.push_str("</head>\n<body>\n");
    out.push_str("<header class=\"article-header\">\n");
    out.push_str(&format!(
        "  <a class=\"back-link\" href=\"{prefix}index.html{}\">← Index</a>\n",
        Route::article(&meta.id).to_hash()
    ));
    out.push_str(&format!("  <h1>{}</h1>\n", escape_text(&meta.title)));
    out.push_str(&article_meta_line(meta));
    out.push_str("</header>\n");
    out.push_str("<main class=\"article-content\">\n");
    out.push_str(CONTENT_START);
    out.push('\n');
    out.push_str(&prefix_assets(content, &prefix));
    out.push('\n');
    out.push_str(CONTENT_END);
    out.push_str("\n</main>\n</body>\n</html>\n");
    out
}

fn article_meta_line(meta: &PageMeta) -> String {
    let mut line = format!(
        "  <p class=\"article-meta\"><span class=\"category\">{}</span>",
        escape_text(&meta.category_path)
    );
    if let Some(updated) = &meta.last_updated {
        line.push_str(&format!(
            " · <span class=\"updated\">Updated {}</span>",
            escape_text(updated)
        ));
    }
    line.push_str(&format!(
        " · <a class=\"external-link\" href=\"{}\" target=\"_blank\" rel=\"noopener noreferrer\">Original</a></p>\n",
        escape_attr(&meta.source_url)
    ));
    line
}

/// Writes one article page at its canonical path and returns that path.
pub fn write_article_page(
    layout: &OutputLayout,
    catch_all: &str,
    meta: &PageMeta,
    content: &str,
) -> anyhow::Result<String> {
    let rel_path = paths::article_rel_path(&meta.category_path, &meta.id, &meta.title, catch_all);
    let page = render_article_page(meta, &rel_path, content);
    paths::write_atomic(&layout.article_file(&rel_path), page.as_bytes())
        .with_context(|| format!("write article page: {rel_path}"))?;
    Ok(rel_path)
}

fn meta_values(doc: &Html) -> HashMap<String, String> {
    let Ok(selector) = dom::parse_selector("meta[name]") else {
        return HashMap::new();
    };
    doc.select(&selector)
        .filter_map(|el| {
            let name = el.value().attr("name")?;
            let content = el.value().attr("content")?;
            name.starts_with("kbmirror:")
                .then(|| (name.to_owned(), content.to_owned()))
        })
        .collect()
}

fn body_between_markers(page: &str) -> Option<&str> {
    let start = page.find(CONTENT_START)? + CONTENT_START.len();
    let end = page[start..].find(CONTENT_END)? + start;
    Some(page[start..end].trim_matches('\n'))
}

/// Parses a page written by [`render_article_page`].
pub fn parse_article_page(page: &str, rel_path: &str) -> Option<(PageMeta, String)> {
    let doc = Html::parse_document(page);
    let mut values = meta_values(&doc);
    let id = values.remove(META_ID)?;
    let meta = PageMeta {
        id,
        title: values.remove(META_TITLE).unwrap_or_default(),
        category_path: values.remove(META_CATEGORY).unwrap_or_default(),
        section_title: values.remove(META_SECTION).unwrap_or_default(),
        source_url: values.remove(META_SOURCE).unwrap_or_default(),
        last_updated: values.remove(META_UPDATED),
    };
    let body = body_between_markers(page)?;
    let content = unprefix_assets(body, &paths::root_prefix(rel_path));
    Some((meta, content))
}

fn rel_path_of(html_dir: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(html_dir).ok()?;
    let parts = rel
        .components()
        .map(|c| c.as_os_str().to_str())
        .collect::<Option<Vec<_>>>()?;
    Some(parts.join("/"))
}

#[derive(Debug, Default)]
struct Scan {
    pages: Vec<StoredPage>,
    stubs: Vec<(String, String)>,
}

fn scan_output(layout: &OutputLayout) -> anyhow::Result<Scan> {
    let html_dir = layout.html_dir();
    let mut scan = Scan::default();
    for path in paths::list_files_recursively(&html_dir)? {
        let Some(rel_path) = rel_path_of(&html_dir, &path) else {
            continue;
        };
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if !name.ends_with(&format!(".{}", paths::ARTICLE_EXT)) {
            continue;
        }

        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("read page: {}", path.display()))?;

        if paths::parse_article_file_name(name).is_none() {
            if text.contains(META_STUB) {
                scan.stubs.push((rel_path, path.display().to_string()));
            }
            continue;
        }

        let Some((meta, content)) = parse_article_page(&text, &rel_path) else {
            tracing::warn!(path = %path.display(), "skip page without article metadata");
            continue;
        };
        let modified = std::fs::metadata(&path)
            .and_then(|m| m.modified())
            .unwrap_or(SystemTime::UNIX_EPOCH);
        scan.pages.push(StoredPage {
            rel_path,
            meta,
            content,
            modified,
        });
    }
    Ok(scan)
}

/// Keeps one page per article ID and deletes the rest.
///
/// The page written by the current run wins; otherwise the most recently
/// modified one does.
fn reconcile(
    layout: &OutputLayout,
    pages: Vec<StoredPage>,
    written_this_run: &HashMap<String, String>,
) -> anyhow::Result<BTreeMap<String, StoredPage>> {
    let mut by_id: BTreeMap<String, Vec<StoredPage>> = BTreeMap::new();
    for page in pages {
        by_id.entry(page.meta.id.clone()).or_default().push(page);
    }

    let mut index = BTreeMap::new();
    for (id, mut candidates) in by_id {
        let current = written_this_run.get(&id);
        candidates.sort_by(|a, b| {
            let a_current = current == Some(&a.rel_path);
            let b_current = current == Some(&b.rel_path);
            b_current
                .cmp(&a_current)
                .then_with(|| b.modified.cmp(&a.modified))
                .then_with(|| a.rel_path.cmp(&b.rel_path))
        });
        let mut candidates = candidates.into_iter();
        let Some(winner) = candidates.next() else {
            continue;
        };
        for stale in candidates {
            let path = layout.article_file(&stale.rel_path);
            tracing::warn!(
                article_id = %id,
                kept = %winner.rel_path,
                removed = %stale.rel_path,
                "remove duplicate page for article"
            );
            std::fs::remove_file(&path)
                .with_context(|| format!("remove stale page: {}", path.display()))?;
        }
        index.insert(id, winner);
    }
    Ok(index)
}

/// Regexes of the phase-2 pass over serialized article links.
#[derive(Debug)]
pub struct LinkFixer {
    tag: Regex,
    href: Regex,
    anchor: Regex,
    original: Regex,
    fragment_href: Regex,
}

/// A reference to an article missing from the output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingTarget {
    pub id: String,
    pub original_href: String,
}

impl LinkFixer {
    pub fn new() -> anyhow::Result<Self> {
        Ok(Self {
            tag: Regex::new(r#"<a\s[^>]*\bdata-article-id="(\d+)"[^>]*>"#)
                .context("compile article link regex")?,
            href: Regex::new(r#"(\s)href="[^"]*""#).context("compile href regex")?,
            anchor: Regex::new(r#"\sdata-anchor="([^"]*)""#).context("compile anchor regex")?,
            original: Regex::new(r#"\sdata-original-href="([^"]*)""#)
                .context("compile original href regex")?,
            fragment_href: Regex::new(r##"(\s)href="#([^"]+)""##)
                .context("compile fragment href regex")?,
        })
    }

    /// Rewrites the `href` of every article link with `resolve(target_id, anchor)`.
    ///
    /// Returns the rewritten markup and the references whose target is missing,
    /// as reported by `resolve` returning `None`; those get `fallback(id)`.
    pub fn fix<R, F>(&self, html: &str, mut resolve: R, mut fallback: F) -> (String, usize, Vec<MissingTarget>)
    where
        R: FnMut(&str, Option<&str>) -> Option<String>,
        F: FnMut(&str) -> String,
    {
        let mut resolved = 0usize;
        let mut missing = Vec::new();
        let out = self.tag.replace_all(html, |caps: &Captures<'_>| {
            let tag = &caps[0];
            let id = &caps[1];
            let anchor = self
                .anchor
                .captures(tag)
                .and_then(|c| c.get(1))
                .map(|m| m.as_str())
                .filter(|a| !a.is_empty());

            let href = match resolve(id, anchor) {
                Some(href) => {
                    resolved += 1;
                    href
                }
                None => {
                    let original_href = self
                        .original
                        .captures(tag)
                        .and_then(|c| c.get(1))
                        .map(|m| m.as_str().replace("&amp;", "&"))
                        .unwrap_or_default();
                    missing.push(MissingTarget {
                        id: id.to_owned(),
                        original_href,
                    });
                    fallback(id)
                }
            };
            let href = escape_attr(&href);
            self.href
                .replacen(tag, 1, |c: &Captures<'_>| format!("{}href=\"{href}\"", &c[1]))
                .into_owned()
        });
        (out.into_owned(), resolved, missing)
    }

    /// Points in-page fragment links of an article body at its index route.
    pub fn route_fragments(&self, html: &str, article_id: &str) -> String {
        self.fragment_href
            .replace_all(html, |caps: &Captures<'_>| {
                let fragment = &caps[2];
                if fragment.starts_with("article-") {
                    return caps[0].to_owned();
                }
                let route = Route::Article {
                    id: article_id.to_owned(),
                    anchor: Some(fragment.to_owned()),
                };
                format!("{}href=\"{}\"", &caps[1], escape_attr(&route.to_hash()))
            })
            .into_owned()
    }
}

pub fn render_stub_page(id: &str, original_href: &str, rel_path: &str) -> String {
    let prefix = paths::root_prefix(rel_path);
    let mut out = String::new();
    out.push_str("<!DOCTYPE html>\n<html lang=\"zh-CN\">\n<head>\n");
    out.push_str("  <meta charset=\"utf-8\">\n");
    out.push_str(&format!(
        "  <title>Article {} (not mirrored)</title>\n",
        escape_text(id)
    ));
    meta_tag(&mut out, META_STUB, id);
    out.push_str(&format!(
        "  <link rel=\"stylesheet\" href=\"{prefix}css/article.css\">\n"
    ));
    out.push_str("</head>\n<body>\n<div class=\"stub-page\">\n");
    out.push_str(&format!(
        "  <h1>Article {} is not part of this mirror</h1>\n",
        escape_text(id)
    ));
    if !original_href.is_empty() {
        out.push_str(&format!(
            "  <p><a class=\"external-link\" href=\"{}\" target=\"_blank\" rel=\"noopener noreferrer\">Open the original article</a></p>\n",
            escape_attr(original_href)
        ));
    }
    out.push_str(&format!(
        "  <p><a href=\"{prefix}index.html\">Back to index</a></p>\n"
    ));
    out.push_str("</div>\n</body>\n</html>\n");
    out
}

/// Rebuilds every cross-article link, stub page, and the index from the output tree.
///
/// `written_this_run` maps article IDs to the page paths written by the
/// current run; those win when several pages claim one ID.
pub fn assemble(
    layout: &OutputLayout,
    profile: &SiteProfile,
    written_this_run: &HashMap<String, String>,
) -> anyhow::Result<Assembly> {
    layout.create_dirs()?;
    let catch_all = profile.catch_all_category.as_str();

    let scan = scan_output(layout)?;
    let pages = reconcile(layout, scan.pages, written_this_run)?;
    tracing::info!(pages = pages.len(), "assemble: indexed article pages");

    let fixer = LinkFixer::new()?;
    let mut links = LinkStats::default();
    let mut missing: BTreeMap<String, String> = BTreeMap::new();
    let mut bodies: BTreeMap<String, String> = BTreeMap::new();

    for (id, page) in &pages {
        let from = page.rel_path.as_str();
        let (content, resolved, page_missing) = fixer.fix(
            &page.content,
            |target, anchor| {
                let target_page = pages.get(target)?;
                let mut href = paths::relative_href(from, &target_page.rel_path);
                if let Some(anchor) = anchor {
                    href.push('#');
                    href.push_str(anchor);
                }
                Some(href)
            },
            |target| paths::relative_href(from, &paths::stub_rel_path(target, catch_all)),
        );
        links.resolved_references += resolved;
        for target in page_missing {
            tracing::debug!(article_id = %id, target = %target.id, "reference to missing article");
            let entry = missing.entry(target.id).or_default();
            if entry.is_empty() {
                *entry = target.original_href;
            }
        }

        if content != page.content {
            let rendered = render_article_page(&page.meta, from, &content);
            paths::write_atomic(&layout.article_file(from), rendered.as_bytes())
                .with_context(|| format!("rewrite article page: {from}"))?;
        }
        bodies.insert(id.clone(), content);
    }
    links.missing_targets = missing.len();

    for (rel_path, path) in &scan.stubs {
        let stub_id = rel_path
            .rsplit('/')
            .next()
            .and_then(|name| name.strip_suffix(&format!(".{}", paths::ARTICLE_EXT)))
            .unwrap_or_default();
        let still_needed = missing.contains_key(stub_id)
            && *rel_path == paths::stub_rel_path(stub_id, catch_all);
        if !still_needed {
            tracing::debug!(path = %path, "remove stub page");
            std::fs::remove_file(path).with_context(|| format!("remove stub page: {path}"))?;
        }
    }
    for (id, original_href) in &missing {
        let rel_path = paths::stub_rel_path(id, catch_all);
        let page = render_stub_page(id, original_href, &rel_path);
        paths::write_atomic(&layout.article_file(&rel_path), page.as_bytes())
            .with_context(|| format!("write stub page: {rel_path}"))?;
    }
    links.stub_pages = missing.len();

    let categories = group_pages(&pages, profile);
    let index = render_index(profile, &pages, &bodies, &categories, &fixer);
    paths::write_atomic(&layout.index_path(), index.as_bytes()).context("write index.html")?;
    write_stylesheets(layout)?;

    tracing::info!(
        published = pages.len(),
        resolved = links.resolved_references,
        missing = links.missing_targets,
        "assemble: done"
    );

    Ok(Assembly {
        published: pages.len(),
        links,
        categories,
    })
}

fn write_stylesheets(layout: &OutputLayout) -> anyhow::Result<()> {
    let css_dir = layout.css_dir();
    paths::write_atomic(&css_dir.join("article.css"), ARTICLE_CSS.as_bytes())
        .context("write article.css")?;
    paths::write_atomic(&css_dir.join("index.css"), INDEX_CSS.as_bytes())
        .context("write index.css")?;
    Ok(())
}

fn section_label(page: &StoredPage) -> String {
    let sub = categories::sub_category(&page.meta.category_path);
    if sub.is_empty() {
        page.meta.section_title.clone()
    } else {
        sub.to_owned()
    }
}

fn group_pages(pages: &BTreeMap<String, StoredPage>, profile: &SiteProfile) -> Vec<Category> {
    let mut counts: Vec<SectionSummary> = Vec::new();
    for page in pages.values() {
        let path = page.meta.category_path.as_str();
        match counts.iter_mut().find(|s| s.category_path == path) {
            Some(summary) => summary.article_count += 1,
            None => counts.push(SectionSummary {
                title: section_label(page),
                category_path: path.to_owned(),
                article_count: 1,
            }),
        }
    }
    counts.sort_by(|a, b| a.category_path.cmp(&b.category_path));
    categories::group_sections(
        &counts,
        &profile.category_order,
        &profile.catch_all_category,
    )
}

fn numeric_order(a: &StoredPage, b: &StoredPage) -> std::cmp::Ordering {
    let key = |p: &StoredPage| (p.meta.id.len(), p.meta.id.clone());
    key(a).cmp(&key(b))
}

fn render_index(
    profile: &SiteProfile,
    pages: &BTreeMap<String, StoredPage>,
    bodies: &BTreeMap<String, String>,
    categories: &[Category],
    fixer: &LinkFixer,
) -> String {
    let catch_all = profile.catch_all_category.as_str();
    let title = escape_text(&profile.site_title);
    let mut out = String::new();
    out.push_str("<!DOCTYPE html>\n<html lang=\"zh-CN\">\n<head>\n");
    out.push_str("  <meta charset=\"utf-8\">\n");
    out.push_str("  <meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n");
    out.push_str(&format!("  <title>{title}</title>\n"));
    out.push_str("  <link rel=\"stylesheet\" href=\"css/index.css\">\n");
    out.push_str("</head>\n<body>\n");

    out.push_str("<nav id=\"sidebar\">\n");
    out.push_str(&format!("  <h1 class=\"site-title\"><a href=\"#\">{title}</a></h1>\n"));
    out.push_str(&format!(
        "  <p class=\"site-stats\">{} articles</p>\n",
        pages.len()
    ));
    out.push_str("  <ul class=\"nav-tree\">\n");
    for category in categories {
        out.push_str(&format!(
            "    <li class=\"nav-category\"><details open><summary>{} <span class=\"count\">({})</span></summary>\n      <ul>\n",
            escape_text(&category.name),
            category.total_articles()
        ));
        for section in &category.sections {
            out.push_str(&format!(
                "        <li class=\"nav-section\"><details><summary>{} <span class=\"count\">({})</span></summary>\n          <ul>\n",
                escape_text(&section.title),
                section.article_count
            ));
            let mut section_pages = pages
                .values()
                .filter(|p| p.meta.category_path == section.category_path)
                .collect::<Vec<_>>();
            section_pages.sort_by(|a, b| numeric_order(a, b));
            for page in section_pages {
                out.push_str(&format!(
                    "            <li><a class=\"nav-article\" href=\"{}\" data-article-id=\"{}\">{}</a></li>\n",
                    Route::article(&page.meta.id).to_hash(),
                    escape_attr(&page.meta.id),
                    escape_text(&page.meta.title)
                ));
            }
            out.push_str("          </ul>\n        </details></li>\n");
        }
        out.push_str("      </ul>\n    </details></li>\n");
    }
    out.push_str("  </ul>\n</nav>\n");

    out.push_str("<main id=\"content\">\n");
    out.push_str("<section id=\"welcome\" class=\"welcome-panel\">\n");
    out.push_str(&format!("  <h1>{title}</h1>\n"));
    out.push_str(&format!(
        "  <p>{} articles in {} categories. Pick an article from the navigation.</p>\n",
        pages.len(),
        categories.len()
    ));
    out.push_str("  <ul class=\"welcome-categories\">\n");
    for category in categories {
        out.push_str(&format!(
            "    <li>{} <span class=\"count\">({})</span></li>\n",
            escape_text(&category.name),
            category.total_articles()
        ));
    }
    out.push_str("  </ul>\n</section>\n");

    for (id, page) in pages {
        let body = bodies.get(id).unwrap_or(&page.content);
        let body = fixer.route_fragments(body, id);
        let (body, _, _) = fixer.fix(
            &body,
            |target, anchor| {
                pages.get(target)?;
                Some(
                    Route::Article {
                        id: target.to_owned(),
                        anchor: anchor.map(str::to_owned),
                    }
                    .to_hash(),
                )
            },
            |target| format!("html/{}", paths::stub_rel_path(target, catch_all)),
        );

        out.push_str(&format!(
            "<article id=\"article-{}\" class=\"article-panel\" style=\"display:none\">\n",
            escape_attr(id)
        ));
        out.push_str("  <header class=\"article-header\">\n");
        out.push_str(&format!("    <h1>{}</h1>\n", escape_text(&page.meta.title)));
        out.push_str(&article_meta_line(&page.meta));
        out.push_str(&format!(
            "    <p class=\"page-link\"><a href=\"html/{}\">Standalone page</a></p>\n",
            escape_attr(&page.rel_path)
        ));
        out.push_str("  </header>\n  <div class=\"article-body\">\n");
        out.push_str(&body);
        out.push_str("\n  </div>\n</article>\n");
    }
    out.push_str("</main>\n");

    out.push_str("<script>\n");
    out.push_str(route::ROUTER_SCRIPT);
    out.push_str("</script>\n</body>\n</html>\n");
    out
}

/// `assemble` subcommand: rebuilds links and the index of an existing output tree.
pub fn run(args: AssembleArgs) -> anyhow::Result<()> {
    let profile = SiteProfile::load(args.profile.as_deref()).context("load site profile")?;
    let rules = SiteRules::compile(profile).context("compile site rules")?;
    let layout = OutputLayout::new(&args.out);
    if !layout.html_dir().exists() {
        anyhow::bail!(
            "no article pages found under: {}",
            layout.html_dir().display()
        );
    }

    let assembly = assemble(&layout, &rules.profile, &HashMap::new())?;
    let categories = assembly
        .categories
        .iter()
        .map(|c| c.name.as_str())
        .collect::<BTreeSet<_>>();
    tracing::info!(
        out = %layout.root().display(),
        published = assembly.published,
        categories = categories.len(),
        stubs = assembly.links.stub_pages,
        "assembled output"
    );
    Ok(())
}
