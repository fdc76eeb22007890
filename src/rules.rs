use anyhow::Context as _;
use regex::Regex;
use scraper::Selector;

use crate::cleanup::CleanupRules;
use crate::dom::{parse_selector, parse_selectors};
use crate::profile::SiteProfile;

/// A site profile with every selector and pattern compiled once.
#[derive(Debug)]
pub struct SiteRules {
    pub profile: SiteProfile,
    pub article_id: Regex,
    pub section_links: Selector,
    pub category_links: Selector,
    pub article_links: Selector,
    pub section_titles: Vec<Selector>,
    pub section_description: Selector,
    pub breadcrumbs: Vec<Selector>,
    pub content: Vec<Selector>,
    pub article_titles: Vec<Selector>,
    pub last_updated: Vec<Selector>,
    pub cleanup: CleanupRules,
    pub page_title: Selector,
    pub list_items: Selector,
    pub landmark_headings: Selector,
}

impl SiteRules {
    pub fn compile(profile: SiteProfile) -> anyhow::Result<Self> {
        let article_id = Regex::new(&profile.article_id_pattern)
            .with_context(|| format!("compile article id pattern: {}", profile.article_id_pattern))?;
        if article_id.captures_len() < 2 {
            anyhow::bail!(
                "article id pattern needs a capture group: {}",
                profile.article_id_pattern
            );
        }

        Ok(Self {
            article_id,
            section_links: parse_selector(&profile.section_link_selector)?,
            category_links: parse_selector(&profile.category_link_selector)?,
            article_links: parse_selector(&profile.article_link_selector)?,
            section_titles: parse_selectors(&profile.section_title_selectors)?,
            section_description: parse_selector(&profile.section_description_selector)?,
            breadcrumbs: parse_selectors(&profile.breadcrumb_selectors)?,
            content: parse_selectors(&profile.content_selectors)?,
            article_titles: parse_selectors(&profile.article_title_selectors)?,
            last_updated: parse_selectors(&profile.last_updated_selectors)?,
            cleanup: CleanupRules::compile(&profile.cleanup).context("compile cleanup rules")?,
            page_title: parse_selector("title")?,
            list_items: parse_selector("li")?,
            landmark_headings: parse_selector("h1, h2, h3")?,
            profile,
        })
    }

    /// Article ID embedded in a URL or path, if any.
    pub fn article_id(&self, url: &str) -> Option<String> {
        self.article_id
            .captures(url)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_owned())
    }

    pub fn catch_all(&self) -> &str {
        &self.profile.catch_all_category
    }
}
