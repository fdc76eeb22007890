use scraper::{ElementRef, Html};
use url::Url;

use crate::categories;
use crate::dom;
use crate::error::ArticleError;
use crate::fetch::resolve_link;
use crate::formats::Section;
use crate::rules::SiteRules;

/// Metadata and cleaned content of one article page.
#[derive(Debug, Clone)]
pub struct ParsedArticle {
    pub id: String,
    pub title: String,
    pub last_updated: Option<String>,
    /// Outer HTML of the content region after cleanup.
    pub content_html: String,
    pub plain_text: String,
}

pub fn parse_section(html: &str, url: &Url, rules: &SiteRules) -> Section {
    let doc = Html::parse_document(html);

    let title = section_title(&doc, rules).unwrap_or_default();
    let description = doc
        .select(&rules.section_description)
        .next()
        .map(dom::collapsed_text)
        .filter(|s| !s.is_empty());

    let category_path = breadcrumb_items(&doc, rules)
        .and_then(|items| categories::from_breadcrumb(&items))
        .unwrap_or_else(|| {
            let path = categories::from_table(&title, &rules.profile.categories, rules.catch_all());
            tracing::debug!(section = %title, category = %path, "category from mapping table");
            path
        });

    let mut article_urls: Vec<String> = Vec::new();
    let mut seen_ids: Vec<String> = Vec::new();
    for link in doc.select(&rules.article_links) {
        let Some(href) = link.value().attr("href") else {
            continue;
        };
        let Some(article_url) = resolve_link(url, href) else {
            continue;
        };
        let Some(id) = rules.article_id(article_url.path()) else {
            continue;
        };
        if seen_ids.contains(&id) {
            continue;
        }
        seen_ids.push(id);
        article_urls.push(article_url.to_string());
    }

    Section {
        url: url.to_string(),
        title,
        description,
        category_path,
        article_urls,
    }
}

fn section_title(doc: &Html, rules: &SiteRules) -> Option<String> {
    if let Some(title) = doc.select(&rules.page_title).next() {
        let text = dom::collapsed_text(title);
        let first = text.split(" - ").next().unwrap_or_default().trim();
        if !first.is_empty() {
            return Some(first.to_owned());
        }
    }

    rules
        .section_titles
        .iter()
        .filter_map(|selector| doc.select(selector).next())
        .map(dom::collapsed_text)
        .find(|text| !text.is_empty())
}

fn breadcrumb_items(doc: &Html, rules: &SiteRules) -> Option<Vec<String>> {
    let container = rules
        .breadcrumbs
        .iter()
        .find_map(|selector| doc.select(selector).next())?;
    let items = container
        .select(&rules.list_items)
        .map(dom::collapsed_text)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>();
    Some(items)
}

pub fn parse_article(html: &str, url: &Url, rules: &SiteRules) -> Result<ParsedArticle, ArticleError> {
    let id = rules
        .article_id(url.path())
        .ok_or_else(|| ArticleError::MissingId(url.to_string()))?;

    let doc = Html::parse_document(html);
    let content = content_region(&doc, rules);

    let title = content
        .and_then(|root| {
            root.select(&rules.landmark_headings)
                .map(dom::collapsed_text)
                .find(|t| !t.is_empty())
        })
        .or_else(|| {
            rules
                .article_titles
                .iter()
                .filter_map(|selector| doc.select(selector).next())
                .map(dom::collapsed_text)
                .find(|t| !t.is_empty())
        })
        .ok_or(ArticleError::MissingTitle)?;

    let content = content.ok_or(ArticleError::MissingContent)?;

    let last_updated = rules.last_updated.iter().find_map(|selector| {
        let el = doc.select(selector).next()?;
        el.value()
            .attr("datetime")
            .map(|v| v.trim().to_owned())
            .filter(|v| !v.is_empty())
            .or_else(|| Some(dom::collapsed_text(el)).filter(|t| !t.is_empty()))
    });

    let content_html = rules.cleanup.apply(content);
    let plain_text = plain_text(&content_html);

    Ok(ParsedArticle {
        id,
        title,
        last_updated,
        content_html,
        plain_text,
    })
}

fn content_region<'a>(doc: &'a Html, rules: &SiteRules) -> Option<ElementRef<'a>> {
    rules
        .content
        .iter()
        .find_map(|selector| doc.select(selector).next())
}

/// Whitespace-collapsed text of an HTML fragment.
pub fn plain_text(fragment_html: &str) -> String {
    let fragment = Html::parse_fragment(fragment_html);
    dom::collapsed_text(fragment.root_element())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::SiteProfile;

    fn rules() -> SiteRules {
        SiteRules::compile(SiteProfile::default()).unwrap()
    }

    #[test]
    fn section_uses_breadcrumb_category_and_dedupes_articles() {
        let html = r#"<html><head><title>Getting Started - Developer Network</title></head><body>
            <ol class="breadcrumb"><li>Home</li><li>Tutorials</li><li>Getting Started</li></ol>
            <p class="section-description">First steps.</p>
            <a href="/hc/kb/article/2/">B</a>
            <a href="/hc/kb/article/1/">A</a>
            <a href="https://example.com/hc/kb/article/2/#comments">B again</a>
        </body></html>"#;
        let url = Url::parse("https://example.com/hc/kb/section/9/").unwrap();
        let section = parse_section(html, &url, &rules());

        assert_eq!(section.title, "Getting Started");
        assert_eq!(section.description.as_deref(), Some("First steps."));
        assert_eq!(section.category_path, "Tutorials/Getting Started");
        assert_eq!(
            section.article_urls,
            [
                "https://example.com/hc/kb/article/2/",
                "https://example.com/hc/kb/article/1/"
            ]
        );
    }

    #[test]
    fn section_without_breadcrumb_uses_table_or_catch_all() {
        let html = "<html><body><h1 class=\"section-title\">Release notes</h1></body></html>";
        let url = Url::parse("https://example.com/hc/kb/section/9/").unwrap();
        let section = parse_section(html, &url, &rules());
        assert_eq!(section.title, "Release notes");
        assert_eq!(section.category_path, "Other/Release notes");
    }

    #[test]
    fn article_extracts_metadata_and_cleans_content() {
        let html = r#"<html><body>
            <h1 class="article-title">Outer title</h1>
            <time datetime="2024-03-01T10:00:00+08:00">March 1</time>
            <article><h2>Hello offline</h2><p>Body text.</p><div class="share">share me</div></article>
        </body></html>"#;
        let url = Url::parse("https://example.com/hc/kb/article/77/").unwrap();
        let parsed = parse_article(html, &url, &rules()).unwrap();

        assert_eq!(parsed.id, "77");
        assert_eq!(parsed.title, "Hello offline");
        assert_eq!(
            parsed.last_updated.as_deref(),
            Some("2024-03-01T10:00:00+08:00")
        );
        assert!(!parsed.content_html.contains("share me"));
        assert_eq!(parsed.plain_text, "Hello offline Body text.");
    }

    #[test]
    fn article_without_content_region_fails() {
        let html = "<html><body><h1>Only a title</h1></body></html>";
        let url = Url::parse("https://example.com/hc/kb/article/5/").unwrap();
        let err = parse_article(html, &url, &rules()).unwrap_err();
        assert!(matches!(err, ArticleError::MissingContent));
    }

    #[test]
    fn article_without_title_fails() {
        let html = "<html><body><div class=\"article-content\"><p>no heading</p></div></body></html>";
        let url = Url::parse("https://example.com/hc/kb/article/5/").unwrap();
        let err = parse_article(html, &url, &rules()).unwrap_err();
        assert!(matches!(err, ArticleError::MissingTitle));
    }
}
