//! Phase-1 rewriting of one article's content.
//!
//! Links and media are rewritten into offline-valid markup. Links to other
//! articles become abstract references (`data-article-id`) that the
//! assembler resolves once every article's final path is known.

use std::collections::{HashMap, HashSet};

use scraper::{ElementRef, Html};
use url::Url;

use crate::assets::{self, AssetKind, AssetOutcome, AssetRequest};
use crate::dom::{self, Edit};
use crate::fetch::resolve_link;
use crate::formats::ArticleRef;
use crate::rules::SiteRules;

pub const ARTICLE_LINK_CLASS: &str = "article-link";

const HEADING_TAGS: &[&str] = &["h1", "h2", "h3", "h4", "h5", "h6"];
const HEADING_TRAILING_PUNCTUATION: &[char] = &['？', '?', '！', '!', '。', '.', '：', ':'];

/// The article being rewritten.
#[derive(Debug, Clone, Copy)]
pub struct TransformContext<'a> {
    pub article_id: &'a str,
    pub article_url: &'a Url,
    pub rules: &'a SiteRules,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexKind {
    Section,
    Category,
}

/// What phase 1 does with one `<a>` element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkAction {
    /// `<a>` without `href`: a named anchor, kept verbatim.
    NamedAnchor,
    /// No text and no image.
    Drop,
    /// `#`, `javascript:` or empty href.
    Inert,
    /// Link to the current article with a fragment.
    SelfAnchor(String),
    /// Link to the current article without a fragment.
    SelfPlain,
    ArticleRef {
        target_id: String,
        url: Url,
        anchor: Option<String>,
    },
    /// `#fragment` on the same page.
    PageAnchor,
    License(Url),
    Attachment(Url),
    SiteIndex(IndexKind),
    External(Url),
    /// Non-http scheme such as `mailto:`.
    Other,
}

#[derive(Debug, Clone, Default)]
pub struct Rewritten {
    pub html: String,
    /// Root-relative paths of every stored asset the content references.
    pub assets: Vec<String>,
    pub references: Vec<ArticleRef>,
}

impl TransformContext<'_> {
    fn is_same_site(&self, url: &Url) -> bool {
        match (url.host_str(), self.article_url.host_str()) {
            (Some(a), Some(b)) => a.eq_ignore_ascii_case(b),
            _ => false,
        }
    }

    fn is_trusted_attachment(&self, url: &Url) -> bool {
        let url = url.as_str();
        self.rules
            .profile
            .trusted_attachment_paths
            .iter()
            .any(|p| url.contains(p.as_str()))
    }

    fn is_attachment(&self, url: &Url) -> bool {
        self.is_trusted_attachment(url)
            || assets::url_extension(url)
                .is_some_and(|ext| assets::ATTACHMENT_EXTENSIONS.contains(&ext.as_str()))
    }

    fn is_license(&self, url: &Url) -> bool {
        let lower = url.as_str().to_ascii_lowercase();
        lower.contains("license")
            && (lower.contains(".txt") || lower.contains(".md"))
            && self.is_trusted_attachment(url)
    }
}

fn wraps_image(link: ElementRef<'_>) -> bool {
    link.descendants()
        .filter_map(ElementRef::wrap)
        .any(|el| el.value().name() == "img")
}

pub fn classify_link(link: ElementRef<'_>, ctx: &TransformContext<'_>) -> LinkAction {
    let Some(href) = link.value().attr("href") else {
        return LinkAction::NamedAnchor;
    };

    if !wraps_image(link) && dom::collapsed_text(link).is_empty() {
        return LinkAction::Drop;
    }

    let href = href.trim();
    if href.is_empty() || href == "#" || href.to_ascii_lowercase().starts_with("javascript:") {
        return LinkAction::Inert;
    }

    if href.starts_with('#') {
        return LinkAction::PageAnchor;
    }

    let Ok(absolute) = ctx.article_url.join(href) else {
        return LinkAction::Other;
    };
    if absolute.scheme() != "http" && absolute.scheme() != "https" {
        return LinkAction::Other;
    }
    let fragment = absolute
        .fragment()
        .filter(|f| !f.is_empty())
        .map(str::to_owned);

    if ctx.is_same_site(&absolute)
        && let Some(target_id) = ctx.rules.article_id(absolute.path())
    {
        if target_id == ctx.article_id {
            return match fragment {
                Some(anchor) => LinkAction::SelfAnchor(anchor),
                None => LinkAction::SelfPlain,
            };
        }
        let mut url = absolute;
        url.set_fragment(None);
        return LinkAction::ArticleRef {
            target_id,
            url,
            anchor: fragment,
        };
    }

    if ctx.is_license(&absolute) {
        return LinkAction::License(absolute);
    }
    if ctx.is_attachment(&absolute) {
        return LinkAction::Attachment(absolute);
    }

    if ctx.is_same_site(&absolute) {
        let path = absolute.path();
        if path.contains(ctx.rules.profile.section_path_marker.as_str()) {
            return LinkAction::SiteIndex(IndexKind::Section);
        }
        if path.contains(ctx.rules.profile.category_path_marker.as_str()) {
            return LinkAction::SiteIndex(IndexKind::Category);
        }
    }

    LinkAction::External(absolute)
}

fn image_url(img: ElementRef<'_>, ctx: &TransformContext<'_>) -> Option<Url> {
    let src = img.value().attr("src")?;
    resolve_link(ctx.article_url, src)
}

/// Every asset the content would need, one request per URL, in document order.
///
/// A URL used both as an `<img>` source and as an attachment link is
/// planned once, as an image.
pub fn plan_assets(content_html: &str, ctx: &TransformContext<'_>) -> Vec<AssetRequest> {
    let fragment = Html::parse_fragment(content_html);
    let mut planned: HashMap<String, usize> = HashMap::new();
    let mut out: Vec<AssetRequest> = Vec::new();

    for el in fragment.root_element().descendants().filter_map(ElementRef::wrap) {
        let request = match el.value().name() {
            "img" => image_url(el, ctx).map(|url| AssetRequest {
                url,
                kind: AssetKind::Image,
            }),
            "a" => match classify_link(el, ctx) {
                LinkAction::Attachment(url) => Some(AssetRequest {
                    url,
                    kind: AssetKind::Attachment,
                }),
                _ => None,
            },
            _ => None,
        };
        let Some(request) = request else {
            continue;
        };
        match planned.get(&assets::canonical_key(&request.url)) {
            Some(&idx) => {
                if request.kind == AssetKind::Image {
                    out[idx].kind = AssetKind::Image;
                }
            }
            None => {
                planned.insert(assets::canonical_key(&request.url), out.len());
                out.push(request);
            }
        }
    }
    out
}

/// Applies every phase-1 rule to `content_html` given resolved asset outcomes.
pub fn rewrite(
    content_html: &str,
    ctx: &TransformContext<'_>,
    outcomes: &HashMap<String, AssetOutcome>,
) -> Rewritten {
    let fragment = Html::parse_fragment(content_html);
    let mut stored_assets: Vec<String> = Vec::new();
    let mut references: Vec<ArticleRef> = Vec::new();
    let mut used_heading_ids = existing_ids(&fragment);

    let html = dom::render_fragment(&fragment, |el| {
        let name = el.value().name();
        match name {
            "a" => rewrite_link(el, ctx, outcomes, &mut stored_assets, &mut references),
            "img" => rewrite_image(el, ctx, outcomes, &mut stored_assets),
            "iframe" => rewrite_iframe(el, ctx),
            _ if HEADING_TAGS.contains(&name) => {
                heading_anchor(el, ctx, &mut used_heading_ids).unwrap_or(Edit::Keep)
            }
            _ => Edit::Keep,
        }
    });

    Rewritten {
        html,
        assets: stored_assets,
        references,
    }
}

fn existing_ids(fragment: &Html) -> HashSet<String> {
    fragment
        .root_element()
        .descendants()
        .filter_map(ElementRef::wrap)
        .filter_map(|el| el.value().attr("id").map(str::to_owned))
        .collect()
}

fn push_unique(list: &mut Vec<String>, value: String) {
    if !list.contains(&value) {
        list.push(value);
    }
}

fn text_span(class: &str, text: &str) -> Edit {
    Edit::Replace(format!(
        "<span class=\"{}\">{}</span>",
        dom::escape_attr(class),
        dom::escape_text(text)
    ))
}

fn with_class(el: ElementRef<'_>, marker: &str) -> String {
    match el.value().attr("class").map(str::trim) {
        Some(existing) if !existing.is_empty() => format!("{existing} {marker}"),
        _ => marker.to_owned(),
    }
}

fn external_attrs(href: &str, class: &str) -> Vec<(String, String)> {
    vec![
        ("href".to_owned(), href.to_owned()),
        ("class".to_owned(), class.to_owned()),
        ("target".to_owned(), "_blank".to_owned()),
        ("rel".to_owned(), "noopener noreferrer".to_owned()),
    ]
}

fn rewrite_link(
    el: ElementRef<'_>,
    ctx: &TransformContext<'_>,
    outcomes: &HashMap<String, AssetOutcome>,
    stored_assets: &mut Vec<String>,
    references: &mut Vec<ArticleRef>,
) -> Edit {
    let text = dom::collapsed_text(el);
    match classify_link(el, ctx) {
        LinkAction::NamedAnchor | LinkAction::PageAnchor | LinkAction::Other => Edit::Keep,
        LinkAction::Drop => Edit::Remove,
        LinkAction::SelfPlain => Edit::Unwrap,
        LinkAction::Inert => Edit::Retag(
            "span".to_owned(),
            vec![("class".to_owned(), with_class(el, "inactive-link"))],
        ),
        LinkAction::SelfAnchor(anchor) => {
            Edit::Rewrite(dom::attrs_with(el, &[("href", format!("#{anchor}").as_str())], &[]))
        }
        LinkAction::ArticleRef {
            target_id,
            url,
            anchor,
        } => {
            references.push(ArticleRef {
                target_id: target_id.clone(),
                original_href: url.to_string(),
            });
            let mut attrs = vec![
                ("href".to_owned(), "#".to_owned()),
                ("class".to_owned(), ARTICLE_LINK_CLASS.to_owned()),
                ("data-article-id".to_owned(), target_id),
                ("data-original-href".to_owned(), url.to_string()),
            ];
            if let Some(anchor) = anchor {
                attrs.push(("data-anchor".to_owned(), anchor));
            }
            Edit::Rewrite(attrs)
        }
        LinkAction::License(url) => {
            let haystack = format!("{} {}", text.to_lowercase(), url.as_str().to_lowercase());
            let project = ctx
                .rules
                .profile
                .license_projects
                .iter()
                .find(|p| haystack.contains(&p.keyword.to_lowercase()));
            match project {
                Some(project) => {
                    tracing::debug!(href = %url, project = %project.url, "license link to project homepage");
                    Edit::Replace(format!(
                        "{}{} (project homepage)</a>",
                        dom::start_tag("a", &external_attrs(&project.url, "external-link")),
                        dom::escape_text(&text)
                    ))
                }
                None => text_span("license-text", &format!("{text} (project license)")),
            }
        }
        LinkAction::Attachment(url) => match outcomes.get(&assets::canonical_key(&url)) {
            Some(AssetOutcome::Stored { file_name, kind }) => {
                let local = format!("{}/{file_name}", kind.dir_name());
                push_unique(stored_assets, local.clone());
                let mut attrs = vec![
                    ("href".to_owned(), local),
                    ("class".to_owned(), "attachment-link".to_owned()),
                    ("target".to_owned(), "_blank".to_owned()),
                ];
                if *kind == AssetKind::Attachment && !assets::is_previewable(file_name) {
                    attrs.push(("download".to_owned(), file_name.clone()));
                }
                if wraps_image(el) {
                    return Edit::Rewrite(attrs);
                }
                Edit::Replace(format!(
                    "{}📎 {}</a>",
                    dom::start_tag("a", &attrs),
                    dom::escape_text(&text)
                ))
            }
            // The wrapped image renders its own placeholder.
            _ if wraps_image(el) => Edit::Unwrap,
            _ => {
                tracing::warn!(article_id = %ctx.article_id, href = %url, "attachment unavailable, using placeholder");
                text_span("failed-attachment", &format!("{text} (download failed)"))
            }
        },
        LinkAction::SiteIndex(kind) => {
            let class = match kind {
                IndexKind::Section => "section-text",
                IndexKind::Category => "category-text",
            };
            Edit::Retag(
                "span".to_owned(),
                vec![("class".to_owned(), class.to_owned())],
            )
        }
        LinkAction::External(url) => {
            let class = with_class(el, "external-link");
            let mut attrs = dom::attrs_with(
                el,
                &[
                    ("href", url.as_str()),
                    ("class", class.as_str()),
                    ("target", "_blank"),
                    ("rel", "noopener noreferrer"),
                ],
                &[],
            );
            attrs.sort_by_key(|(name, _)| name != "href");
            Edit::Rewrite(attrs)
        }
    }
}

fn rewrite_image(
    img: ElementRef<'_>,
    ctx: &TransformContext<'_>,
    outcomes: &HashMap<String, AssetOutcome>,
    stored_assets: &mut Vec<String>,
) -> Edit {
    let Some(url) = image_url(img, ctx) else {
        return Edit::Keep;
    };
    let alt = img
        .value()
        .attr("alt")
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .unwrap_or("image");

    match outcomes.get(&assets::canonical_key(&url)) {
        Some(outcome) => match outcome.local_path() {
            Some(local) => {
                push_unique(stored_assets, local.clone());
                Edit::Rewrite(dom::attrs_with(
                    img,
                    &[("src", local.as_str())],
                    &["srcset", "data-src", "data-original"],
                ))
            }
            None => {
                let external = matches!(outcome, AssetOutcome::Failed { external: true });
                image_placeholder(alt, external)
            }
        },
        None => {
            tracing::debug!(article_id = %ctx.article_id, src = %url, "image was not resolved");
            image_placeholder(alt, false)
        }
    }
}

fn image_placeholder(alt: &str, external: bool) -> Edit {
    let (class, label) = if external {
        ("external-image-placeholder", "External image unavailable")
    } else {
        ("failed-image-placeholder", "Image unavailable")
    };
    Edit::Replace(format!(
        "<div class=\"{class}\">{label}: {}</div>",
        dom::escape_text(alt)
    ))
}

/// Outbound link for a known video embed: `(platform, label, url)`.
pub fn video_link(src: &Url) -> Option<(&'static str, String, String)> {
    let host = src.host_str()?.to_ascii_lowercase();
    if host.contains("bilibili.com") {
        let query = src.query_pairs().collect::<HashMap<_, _>>();
        if let Some(bvid) = query.get("bvid").filter(|v| !v.is_empty()) {
            return Some((
                "Bilibili",
                bvid.to_string(),
                format!("https://www.bilibili.com/video/{bvid}"),
            ));
        }
        if let Some(aid) = query.get("aid").filter(|v| !v.is_empty()) {
            return Some((
                "Bilibili",
                format!("av{aid}"),
                format!("https://www.bilibili.com/video/av{aid}"),
            ));
        }
        return None;
    }
    if host.contains("youtube.com") || host.contains("youtube-nocookie.com") {
        let id = src.path().strip_prefix("/embed/")?.split('/').next()?;
        if id.is_empty() {
            return None;
        }
        return Some((
            "YouTube",
            id.to_owned(),
            format!("https://www.youtube.com/watch?v={id}"),
        ));
    }
    None
}

fn rewrite_iframe(iframe: ElementRef<'_>, ctx: &TransformContext<'_>) -> Edit {
    let Some(src) = iframe
        .value()
        .attr("src")
        .and_then(|src| ctx.article_url.join(src.trim()).ok())
    else {
        return Edit::Keep;
    };
    let Some((platform, label, url)) = video_link(&src) else {
        return Edit::Keep;
    };
    tracing::debug!(article_id = %ctx.article_id, platform, video = %label, "replace video embed");
    Edit::Replace(format!(
        "<div class=\"video-link\"><p class=\"video-title\">{platform} video: {}</p><p>{}Watch {} on {platform} →</a></p></div>",
        dom::escape_text(&label),
        dom::start_tag("a", &external_attrs(&url, "video-external-link")),
        dom::escape_text(&label),
    ))
}

/// Fixed anchor ID for a heading whose text matches the anchor table.
pub fn anchor_for_heading(text: &str, rules: &SiteRules) -> Option<String> {
    let normalized = text
        .trim()
        .trim_end_matches(HEADING_TRAILING_PUNCTUATION)
        .trim()
        .to_lowercase();
    if normalized.is_empty() {
        return None;
    }
    rules
        .profile
        .heading_anchors
        .iter()
        .find(|a| normalized.contains(&a.keyword.to_lowercase()))
        .map(|a| a.id.clone())
}

fn heading_anchor(
    heading: ElementRef<'_>,
    ctx: &TransformContext<'_>,
    used: &mut HashSet<String>,
) -> Option<Edit> {
    if heading.value().attr("id").is_some() {
        return None;
    }
    let id = anchor_for_heading(&dom::collapsed_text(heading), ctx.rules)?;
    if !used.insert(id.clone()) {
        return None;
    }
    Some(Edit::Rewrite(dom::attrs_with(heading, &[("id", id.as_str())], &[])))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::SiteProfile;

    fn rules() -> SiteRules {
        SiteRules::compile(SiteProfile::default()).unwrap()
    }

    fn first_link(html: &str) -> Html {
        Html::parse_fragment(html)
    }

    fn classify(html: &str) -> LinkAction {
        let rules = rules();
        let url = Url::parse("https://example.com/hc/kb/article/100/").unwrap();
        let ctx = TransformContext {
            article_id: "100",
            article_url: &url,
            rules: &rules,
        };
        let fragment = first_link(html);
        let selector = dom::parse_selector("a").unwrap();
        let link = fragment.select(&selector).next().unwrap();
        classify_link(link, &ctx)
    }

    fn rewrite_with(html: &str, outcomes: &HashMap<String, AssetOutcome>) -> Rewritten {
        let rules = rules();
        let url = Url::parse("https://example.com/hc/kb/article/100/").unwrap();
        let ctx = TransformContext {
            article_id: "100",
            article_url: &url,
            rules: &rules,
        };
        rewrite(html, &ctx, outcomes)
    }

    #[test]
    fn classifies_links_in_rule_order() {
        assert_eq!(classify(r#"<a href="https://x.com/"> </a>"#), LinkAction::Drop);
        assert_eq!(classify(r##"<a href="#">Top</a>"##), LinkAction::Inert);
        assert_eq!(
            classify(r#"<a href="javascript:void(0)">Click</a>"#),
            LinkAction::Inert
        );
        assert_eq!(
            classify(r#"<a href="/hc/kb/article/100/#step2">here</a>"#),
            LinkAction::SelfAnchor("step2".to_owned())
        );
        assert_eq!(
            classify(r#"<a href="/hc/kb/article/100/">here</a>"#),
            LinkAction::SelfPlain
        );
        assert!(matches!(
            classify(r#"<a href="https://example.com/hc/kb/article/200/">B</a>"#),
            LinkAction::ArticleRef { target_id, anchor: None, .. } if target_id == "200"
        ));
        assert_eq!(classify(r##"<a href="#intro">Intro</a>"##), LinkAction::PageAnchor);
        assert!(matches!(
            classify(r#"<a href="/attachments/download/9/manual.pdf">Manual</a>"#),
            LinkAction::Attachment(_)
        ));
        assert!(matches!(
            classify(r#"<a href="/attachments/download/9/LICENSE.txt">MIT</a>"#),
            LinkAction::License(_)
        ));
        assert_eq!(
            classify(r#"<a href="/hc/kb/section/3/">All</a>"#),
            LinkAction::SiteIndex(IndexKind::Section)
        );
        assert_eq!(
            classify(r#"<a href="/hc/kb/category/3/">Cat</a>"#),
            LinkAction::SiteIndex(IndexKind::Category)
        );
        assert!(matches!(
            classify(r#"<a href="https://github.com/x">gh</a>"#),
            LinkAction::External(_)
        ));
        assert_eq!(classify(r#"<a href="mailto:a@b.c">mail</a>"#), LinkAction::Other);
        assert_eq!(classify(r#"<a name="top"></a>"#), LinkAction::NamedAnchor);
    }

    #[test]
    fn image_only_link_is_not_empty() {
        assert!(matches!(
            classify(r#"<a href="https://cdn.example.org/big.png"><img src="x.png"></a>"#),
            LinkAction::External(_)
        ));
    }

    #[test]
    fn article_links_become_abstract_references() {
        let out = rewrite_with(
            r#"<p>See <a href="../200/#faq" target="_blank">B</a>.</p>"#,
            &HashMap::new(),
        );
        assert_eq!(
            out.html,
            r##"<p>See <a href="#" class="article-link" data-article-id="200" data-original-href="https://example.com/hc/kb/article/200/" data-anchor="faq">B</a>.</p>"##
        );
        assert_eq!(
            out.references,
            vec![ArticleRef {
                target_id: "200".to_owned(),
                original_href: "https://example.com/hc/kb/article/200/".to_owned(),
            }]
        );
    }

    #[test]
    fn inert_and_index_links_become_text() {
        let out = rewrite_with(
            r##"<p><a href="#" class="btn">Open</a> <a href="/hc/kb/category/1/">Cat</a> <a href="/hc/kb/article/100/">self</a></p>"##,
            &HashMap::new(),
        );
        assert_eq!(
            out.html,
            r#"<p><span class="btn inactive-link">Open</span> <span class="category-text">Cat</span> self</p>"#
        );
    }

    #[test]
    fn images_use_local_paths_or_placeholders() {
        let mut outcomes = HashMap::new();
        outcomes.insert(
            "https://example.com/img/a.png".to_owned(),
            AssetOutcome::Stored {
                file_name: "0123456789abcdef.png".to_owned(),
                kind: AssetKind::Image,
            },
        );
        outcomes.insert(
            "https://example.com/img/bad.png".to_owned(),
            AssetOutcome::Failed { external: false },
        );
        outcomes.insert(
            "https://imgur.com/x.png".to_owned(),
            AssetOutcome::Failed { external: true },
        );

        let out = rewrite_with(
            r#"<p><img src="/img/a.png" srcset="a2.png 2x"><img src="/img/a.png#dup"><img src="/img/bad.png" alt="Diagram"><img src="https://imgur.com/x.png"></p>"#,
            &outcomes,
        );
        assert_eq!(
            out.html,
            concat!(
                r#"<p><img src="images/0123456789abcdef.png"><img src="images/0123456789abcdef.png">"#,
                r#"<div class="failed-image-placeholder">Image unavailable: Diagram</div>"#,
                r#"<div class="external-image-placeholder">External image unavailable: image</div></p>"#
            )
        );
        assert_eq!(out.assets, vec!["images/0123456789abcdef.png".to_owned()]);
    }

    #[test]
    fn attachments_link_locally_or_degrade() {
        let mut outcomes = HashMap::new();
        outcomes.insert(
            "https://example.com/attachments/download/1/guide.pdf".to_owned(),
            AssetOutcome::Stored {
                file_name: "abcd1234_guide.pdf".to_owned(),
                kind: AssetKind::Attachment,
            },
        );
        outcomes.insert(
            "https://example.com/attachments/download/2/src.zip".to_owned(),
            AssetOutcome::Stored {
                file_name: "ef567890_src.zip".to_owned(),
                kind: AssetKind::Attachment,
            },
        );

        let out = rewrite_with(
            concat!(
                r#"<a href="/attachments/download/1/guide.pdf">Guide</a>"#,
                r#"<a href="/attachments/download/2/src.zip">Source</a>"#,
                r#"<a href="/attachments/download/3/gone.doc">Gone</a>"#,
            ),
            &outcomes,
        );
        assert_eq!(
            out.html,
            concat!(
                r#"<a href="attachments/abcd1234_guide.pdf" class="attachment-link" target="_blank">📎 Guide</a>"#,
                r#"<a href="attachments/ef567890_src.zip" class="attachment-link" target="_blank" download="ef567890_src.zip">📎 Source</a>"#,
                r#"<span class="failed-attachment">Gone (download failed)</span>"#,
            )
        );
    }

    #[test]
    fn license_links_resolve_to_project_or_text() {
        let out = rewrite_with(
            concat!(
                r#"<a href="/attachments/download/4/jquery-LICENSE.txt">jQuery license</a>"#,
                r#"<a href="/attachments/download/5/LICENSE.md">Some license</a>"#,
            ),
            &HashMap::new(),
        );
        assert_eq!(
            out.html,
            concat!(
                r#"<a href="https://github.com/jquery/jquery" class="external-link" target="_blank" rel="noopener noreferrer">jQuery license (project homepage)</a>"#,
                r#"<span class="license-text">Some license (project license)</span>"#,
            )
        );
    }

    #[test]
    fn external_links_get_absolute_href_and_safety_attributes() {
        let out = rewrite_with(
            r#"<a title="t" href="//cdn.example.org/doc">Docs</a>"#,
            &HashMap::new(),
        );
        assert_eq!(
            out.html,
            r#"<a href="https://cdn.example.org/doc" title="t" class="external-link" target="_blank" rel="noopener noreferrer">Docs</a>"#
        );
    }

    #[test]
    fn video_embeds_become_outbound_links() {
        let out = rewrite_with(
            r#"<iframe src="//player.bilibili.com/player.html?aid=42&bvid=BV1xx"></iframe><iframe src="https://www.youtube.com/embed/abc123"></iframe><iframe src="https://maps.example.org/"></iframe>"#,
            &HashMap::new(),
        );
        assert!(out.html.contains("https://www.bilibili.com/video/BV1xx"));
        assert!(out.html.contains("https://www.youtube.com/watch?v=abc123"));
        assert!(out.html.contains(r#"<iframe src="https://maps.example.org/"></iframe>"#));
        assert!(!out.html.contains("player.bilibili.com"));
    }

    #[test]
    fn headings_get_fixed_anchor_ids_once() {
        let out = rewrite_with(
            r#"<h2>前言</h2><h3>如何实现？</h3><h2 id="keep">注意事项</h2><h2>前言 (2)</h2><h4>Other</h4>"#,
            &HashMap::new(),
        );
        assert_eq!(
            out.html,
            r#"<h2 id="step1">前言</h2><h3 id="step4">如何实现？</h3><h2 id="keep">注意事项</h2><h2>前言 (2)</h2><h4>Other</h4>"#
        );
    }

    #[test]
    fn plan_collects_images_and_attachments_once() {
        let rules = rules();
        let url = Url::parse("https://example.com/hc/kb/article/100/").unwrap();
        let ctx = TransformContext {
            article_id: "100",
            article_url: &url,
            rules: &rules,
        };
        let plan = plan_assets(
            r#"<img src="/a.png"><img src="/a.png"><a href="/attachments/download/1/x.pdf">x</a><a href="https://other.org/">o</a><img src="data:image/png;base64,AAAA">"#,
            &ctx,
        );
        let got = plan
            .iter()
            .map(|r| (r.kind, r.url.as_str()))
            .collect::<Vec<_>>();
        assert_eq!(
            got,
            [
                (AssetKind::Image, "https://example.com/a.png"),
                (
                    AssetKind::Attachment,
                    "https://example.com/attachments/download/1/x.pdf"
                ),
            ]
        );
    }

    #[test]
    fn image_inside_attachment_link_is_planned_once_and_kept() {
        let rules = rules();
        let url = Url::parse("https://example.com/hc/kb/article/100/").unwrap();
        let ctx = TransformContext {
            article_id: "100",
            article_url: &url,
            rules: &rules,
        };
        let html = r#"<p><a href="/attachments/download/9/shot.png"><img src="/attachments/download/9/shot.png" alt="shot"></a></p>"#;
        let shot = "https://example.com/attachments/download/9/shot.png";

        let plan = plan_assets(html, &ctx);
        assert_eq!(
            plan.iter().map(|r| (r.kind, r.url.as_str())).collect::<Vec<_>>(),
            [(AssetKind::Image, shot)]
        );

        let mut outcomes = HashMap::new();
        outcomes.insert(
            shot.to_owned(),
            AssetOutcome::Stored {
                file_name: "0123456789abcdef.png".to_owned(),
                kind: AssetKind::Image,
            },
        );
        let stored = rewrite(html, &ctx, &outcomes);
        assert_eq!(
            stored.html,
            r#"<p><a href="images/0123456789abcdef.png" class="attachment-link" target="_blank"><img alt="shot" src="images/0123456789abcdef.png"></a></p>"#
        );
        assert_eq!(stored.assets, vec!["images/0123456789abcdef.png".to_owned()]);

        outcomes.insert(shot.to_owned(), AssetOutcome::Failed { external: false });
        let failed = rewrite(html, &ctx, &outcomes);
        assert_eq!(
            failed.html,
            r#"<p><div class="failed-image-placeholder">Image unavailable: shot</div></p>"#
        );
    }
}
