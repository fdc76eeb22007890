//! The `crawl` subcommand: discovery, per-article extraction on a bounded
//! pool, assembly, and the run report.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context as _;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::api::{self, ApiClient, ApiConfig};
use crate::assemble::{self, PageMeta};
use crate::assets::{AssetPolicy, AssetResolver};
use crate::cli::{CrawlArgs, Source};
use crate::discover;
use crate::error::ArticleError;
use crate::extract;
use crate::fetch::{FetchConfig, Fetcher};
use crate::formats::{Article, FailedArticle, RunReport, Section};
use crate::paths::{self, OutputLayout};
use crate::profile::SiteProfile;
use crate::rules::SiteRules;
use crate::transform::{self, TransformContext};

/// One article scheduled for extraction.
#[derive(Debug, Clone)]
struct ArticleJob {
    id: String,
    url: Url,
    category_path: String,
    section_title: String,
}

/// What the pool workers share.
#[derive(Debug)]
struct Worker {
    fetcher: Arc<Fetcher>,
    resolver: Arc<AssetResolver>,
    rules: Arc<SiteRules>,
    layout: OutputLayout,
}

#[derive(Debug)]
struct Extracted {
    id: String,
    rel_path: String,
    content_length: usize,
    assets: usize,
    references: usize,
}

/// Articles listed by the sections, split by what happens to them.
#[derive(Debug, Default)]
struct Plan {
    total: usize,
    jobs: Vec<ArticleJob>,
    skipped_existing: usize,
    failed: Vec<FailedArticle>,
}

pub async fn run(args: CrawlArgs) -> anyhow::Result<()> {
    let started_at = chrono::Utc::now();
    let started = Instant::now();

    let home = Url::parse(&args.url).context("parse --url")?;
    if home.scheme() != "http" && home.scheme() != "https" {
        anyhow::bail!("--url must be http/https: {home}");
    }

    let profile = SiteProfile::load(args.profile.as_deref()).context("load site profile")?;
    let rules = Arc::new(SiteRules::compile(profile).context("compile site rules")?);
    let layout = OutputLayout::new(&args.out);
    layout.create_dirs()?;

    let timeout = Duration::from_secs(args.timeout_secs);
    let fetcher = Arc::new(Fetcher::new(&FetchConfig {
        timeout,
        delay: Duration::from_millis(args.delay_ms),
        referer_overrides: rules.profile.referer_overrides.clone(),
    })?);
    let resolver = Arc::new(AssetResolver::new(
        Arc::clone(&fetcher),
        &home,
        &layout,
        AssetPolicy {
            try_external: args.try_external_images,
            external_hosts: rules.profile.external_image_hosts.clone(),
            trusted_attachment_paths: rules.profile.trusted_attachment_paths.clone(),
        },
    )?);

    let cancel = CancellationToken::new();
    let interrupt = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupt received; finishing in-flight articles");
                cancel.cancel();
            }
        }
    });

    let sections = match args.source {
        Source::Api => match sections_from_api(&home, &rules, timeout).await {
            Some(sections) => sections,
            None => sections_from_pages(&fetcher, &home, &rules, &cancel).await,
        },
        Source::Pages => sections_from_pages(&fetcher, &home, &rules, &cancel).await,
    };
    tracing::info!(sections = sections.len(), "crawl: sections collected");

    let plan = plan_articles(&sections, &rules, &layout, args.resume, args.max_articles)?;
    tracing::info!(
        listed = plan.total,
        scheduled = plan.jobs.len(),
        skipped_existing = plan.skipped_existing,
        "crawl: articles planned"
    );

    let worker = Arc::new(Worker {
        fetcher,
        resolver: Arc::clone(&resolver),
        rules: Arc::clone(&rules),
        layout: layout.clone(),
    });
    let Plan {
        total,
        jobs,
        skipped_existing,
        mut failed,
    } = plan;

    let concurrency = args.concurrency.max(1).min(jobs.len().max(1));
    let mut written: HashMap<String, String> = HashMap::new();
    let mut join_set = tokio::task::JoinSet::new();
    let mut pending = jobs.into_iter();
    let mut done = 0usize;
    let mut last_progress_log_at = Instant::now();

    loop {
        while join_set.len() < concurrency && !cancel.is_cancelled() {
            let Some(job) = pending.next() else {
                break;
            };
            let worker = Arc::clone(&worker);
            join_set.spawn(async move {
                let outcome = extract_article(&worker, &job).await;
                (job, outcome)
            });
        }

        let Some(joined) = join_set.join_next().await else {
            break;
        };
        let (job, outcome) = joined.context("join article task")?;
        done += 1;
        match outcome {
            Ok(extracted) => {
                tracing::info!(
                    article_id = %extracted.id,
                    path = %extracted.rel_path,
                    chars = extracted.content_length,
                    assets = extracted.assets,
                    references = extracted.references,
                    "article saved"
                );
                written.insert(extracted.id, extracted.rel_path);
            }
            Err(err) => {
                tracing::warn!(article_id = %job.id, url = %job.url, error = %err, "article failed");
                failed.push(FailedArticle {
                    id: Some(job.id),
                    url: job.url.to_string(),
                    reason: err.to_string(),
                });
            }
        }

        if last_progress_log_at.elapsed() >= Duration::from_secs(5) {
            tracing::info!(done, saved = written.len(), failed = failed.len(), "crawl: progress");
            last_progress_log_at = Instant::now();
        }
    }

    let interrupted = cancel.is_cancelled();
    for job in pending {
        failed.push(FailedArticle {
            id: Some(job.id),
            url: job.url.to_string(),
            reason: ArticleError::Cancelled.to_string(),
        });
    }
    interrupt.abort();

    let assembly = assemble::assemble(&layout, &rules.profile, &written).context("assemble output")?;

    let assets = resolver.stats().await;
    for (url, reason) in resolver.failures().await {
        tracing::debug!(url = %url, reason = %reason, "asset failed");
    }

    let successful = written.len() + skipped_existing;
    let success_rate = if total == 0 {
        0.0
    } else {
        successful as f64 * 100.0 / total as f64
    };
    let finished_at = chrono::Utc::now();
    let report = RunReport {
        started_at: started_at.to_rfc3339(),
        finished_at: finished_at.to_rfc3339(),
        duration_secs: started.elapsed().as_secs_f64(),
        total_sections: sections.len(),
        total_articles: total,
        successful,
        skipped_existing,
        failed: failed.len(),
        success_rate,
        published_articles: assembly.published,
        interrupted,
        failed_articles: failed,
        assets,
        links: assembly.links,
        categories: assembly.categories,
    };
    write_report(&layout, &report)?;

    tracing::info!(
        out = %layout.root().display(),
        total = report.total_articles,
        successful = report.successful,
        skipped = report.skipped_existing,
        failed = report.failed,
        published = report.published_articles,
        downloaded = report.assets.total_downloaded(),
        images = report.assets.images_downloaded,
        attachments = report.assets.attachments_downloaded,
        asset_failures = report.assets.failed,
        missing_targets = report.links.missing_targets,
        interrupted = report.interrupted,
        "crawl finished"
    );
    Ok(())
}

async fn sections_from_pages(
    fetcher: &Fetcher,
    home: &Url,
    rules: &SiteRules,
    cancel: &CancellationToken,
) -> Vec<Section> {
    let urls = discover::discover_sections(fetcher, home, rules).await;
    let mut sections = Vec::with_capacity(urls.len());
    for url in urls {
        if cancel.is_cancelled() {
            break;
        }
        let html = match fetcher.fetch_page(&url).await {
            Ok(Some(html)) => html,
            Ok(None) => continue,
            Err(err) => {
                tracing::warn!(url = %url, error = %format!("{err:#}"), "section page failed");
                continue;
            }
        };
        let section = extract::parse_section(&html, &url, rules);
        tracing::info!(
            section = %section.title,
            category = %section.category_path,
            articles = section.article_urls.len(),
            "section parsed"
        );
        sections.push(section);
    }
    sections
}

/// `None` means the API is unavailable and pages should be scraped instead.
async fn sections_from_api(home: &Url, rules: &SiteRules, timeout: Duration) -> Option<Vec<Section>> {
    let Some(config) = ApiConfig::from_env() else {
        tracing::warn!("metadata api not configured; falling back to page discovery");
        return None;
    };
    let client = match ApiClient::new(config, timeout) {
        Ok(client) => client,
        Err(err) => {
            tracing::warn!(error = %format!("{err:#}"), "metadata api client failed; falling back to page discovery");
            return None;
        }
    };
    match client.list_posts().await {
        Ok(posts) if !posts.is_empty() => Some(api::posts_to_sections(&posts, home, rules)),
        Ok(_) => {
            tracing::warn!("metadata api listed no posts; falling back to page discovery");
            None
        }
        Err(err) => {
            tracing::warn!(error = %format!("{err:#}"), "metadata api failed; falling back to page discovery");
            None
        }
    }
}

/// Deduplicates articles by ID (first section wins), applies the cap, and
/// sets aside articles that already have a page when resuming.
fn plan_articles(
    sections: &[Section],
    rules: &SiteRules,
    layout: &OutputLayout,
    resume: bool,
    max_articles: Option<usize>,
) -> anyhow::Result<Plan> {
    let mut plan = Plan::default();
    let mut seen: HashSet<String> = HashSet::new();
    let html_dir = layout.html_dir();

    for section in sections {
        for raw_url in &section.article_urls {
            if max_articles.is_some_and(|max| plan.total >= max) {
                return Ok(plan);
            }
            let parsed = Url::parse(raw_url).ok();
            let Some(id) = parsed.as_ref().and_then(|u| rules.article_id(u.path())) else {
                plan.total += 1;
                plan.failed.push(FailedArticle {
                    id: None,
                    url: raw_url.clone(),
                    reason: ArticleError::MissingId(raw_url.clone()).to_string(),
                });
                continue;
            };
            if !seen.insert(id.clone()) {
                continue;
            }
            plan.total += 1;

            if resume {
                let existing = paths::find_article_files(&html_dir, &id)
                    .with_context(|| format!("look up existing pages for article {id}"))?;
                if !existing.is_empty() {
                    tracing::debug!(article_id = %id, "skip existing article");
                    plan.skipped_existing += 1;
                    continue;
                }
            }

            let Some(url) = parsed else {
                continue;
            };
            plan.jobs.push(ArticleJob {
                id,
                url,
                category_path: section.category_path.clone(),
                section_title: section.title.clone(),
            });
        }
    }
    Ok(plan)
}

/// Fetch, extract, resolve assets, rewrite, and write one article page.
async fn extract_article(worker: &Worker, job: &ArticleJob) -> Result<Extracted, ArticleError> {
    let html = worker
        .fetcher
        .fetch_html(&job.url)
        .await
        .map_err(|err| ArticleError::Fetch(format!("{err:#}")))?;

    let rules = worker.rules.as_ref();
    let parsed = extract::parse_article(&html, &job.url, rules)?;
    let ctx = TransformContext {
        article_id: &job.id,
        article_url: &job.url,
        rules,
    };

    let requests = transform::plan_assets(&parsed.content_html, &ctx);
    let outcomes = worker.resolver.resolve_all(&requests).await;
    let rewritten = transform::rewrite(&parsed.content_html, &ctx, &outcomes);

    let article = Article {
        id: job.id.clone(),
        url: job.url.to_string(),
        title: parsed.title,
        category_path: job.category_path.clone(),
        section_title: job.section_title.clone(),
        last_updated: parsed.last_updated,
        content_html: rewritten.html,
        plain_text: parsed.plain_text,
        assets: rewritten.assets,
        references: rewritten.references,
    };

    let rel_path = assemble::write_article_page(
        &worker.layout,
        rules.catch_all(),
        &PageMeta::from_article(&article),
        &article.content_html,
    )
    .map_err(|err| ArticleError::Write(format!("{err:#}")))?;

    Ok(Extracted {
        content_length: article.content_length(),
        assets: article.assets.len(),
        references: article.references.len(),
        id: article.id,
        rel_path,
    })
}

fn write_report(layout: &OutputLayout, report: &RunReport) -> anyhow::Result<()> {
    let mut bytes = serde_json::to_vec_pretty(report).context("serialize run report")?;
    bytes.push(b'\n');
    paths::write_atomic(&layout.report_path(), &bytes)
        .with_context(|| format!("write run report: {}", layout.report_path().display()))
}
