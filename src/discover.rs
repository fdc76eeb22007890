use std::io::{BufWriter, Write as _};
use std::time::Duration;

use anyhow::Context as _;
use scraper::{Html, Selector};
use url::Url;

use crate::cli::DiscoverArgs;
use crate::extract;
use crate::fetch::{FetchConfig, Fetcher, page_key, resolve_link};
use crate::formats::Section;
use crate::profile::SiteProfile;
use crate::rules::SiteRules;

/// Enumerates section URLs from the home page and every category page it links to.
///
/// Best-effort: a page that fails to load is logged and skipped.
pub async fn discover_sections(fetcher: &Fetcher, home: &Url, rules: &SiteRules) -> Vec<Url> {
    let mut sections = UniqueUrls::default();

    let home_html = match fetcher.fetch_page(home).await {
        Ok(Some(html)) => html,
        Ok(None) => return Vec::new(),
        Err(err) => {
            tracing::warn!(url = %home, error = %format!("{err:#}"), "discover: home page failed");
            return Vec::new();
        }
    };

    for url in links_matching(&home_html, home, &rules.section_links) {
        sections.push(url);
    }
    let categories = links_matching(&home_html, home, &rules.category_links);
    tracing::info!(
        sections = sections.len(),
        categories = categories.len(),
        "discover: home page"
    );

    for category_url in categories {
        let html = match fetcher.fetch_page(&category_url).await {
            Ok(Some(html)) => html,
            Ok(None) => continue,
            Err(err) => {
                tracing::warn!(url = %category_url, error = %format!("{err:#}"), "discover: category page failed");
                continue;
            }
        };
        let before = sections.len();
        for url in links_matching(&html, &category_url, &rules.section_links) {
            sections.push(url);
        }
        tracing::debug!(
            url = %category_url,
            added = sections.len() - before,
            "discover: category page"
        );
    }

    sections.into_vec()
}

/// Absolute, fragment-free targets of every link matching `selector`, in document order.
pub fn links_matching(html: &str, base: &Url, selector: &Selector) -> Vec<Url> {
    let doc = Html::parse_document(html);
    let mut out = UniqueUrls::default();
    for link in doc.select(selector) {
        if let Some(url) = link
            .value()
            .attr("href")
            .and_then(|href| resolve_link(base, href))
        {
            out.push(url);
        }
    }
    out.into_vec()
}

#[derive(Debug, Default)]
struct UniqueUrls {
    keys: std::collections::HashSet<String>,
    urls: Vec<Url>,
}

impl UniqueUrls {
    fn push(&mut self, url: Url) {
        if self.keys.insert(page_key(&url)) {
            self.urls.push(url);
        }
    }

    fn len(&self) -> usize {
        self.urls.len()
    }

    fn into_vec(self) -> Vec<Url> {
        self.urls
    }
}

/// `discover` subcommand: prints every discovered section as a JSON line.
pub async fn run(args: DiscoverArgs) -> anyhow::Result<()> {
    let home = Url::parse(&args.url).context("parse --url")?;
    if home.scheme() != "http" && home.scheme() != "https" {
        anyhow::bail!("--url must be http/https: {home}");
    }

    let profile = SiteProfile::load(args.profile.as_deref()).context("load site profile")?;
    let rules = SiteRules::compile(profile).context("compile site rules")?;
    let fetcher = Fetcher::new(&FetchConfig {
        timeout: Duration::from_secs(args.timeout_secs),
        delay: Duration::from_millis(args.delay_ms),
        referer_overrides: rules.profile.referer_overrides.clone(),
    })?;

    let section_urls = discover_sections(&fetcher, &home, &rules).await;

    let mut sections: Vec<Section> = Vec::new();
    for url in section_urls {
        let html = match fetcher.fetch_page(&url).await {
            Ok(Some(html)) => html,
            Ok(None) => continue,
            Err(err) => {
                tracing::warn!(url = %url, error = %format!("{err:#}"), "discover: section page failed");
                continue;
            }
        };
        sections.push(extract::parse_section(&html, &url, &rules));
    }

    let stdout = std::io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    for section in &sections {
        serde_json::to_writer(&mut out, section).context("write section json")?;
        out.write_all(b"\n").context("write section newline")?;
    }
    out.flush().context("flush stdout")?;

    Ok(())
}
