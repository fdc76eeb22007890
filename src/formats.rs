use serde::{Deserialize, Serialize};

use crate::paths;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Section {
    pub url: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Two-level path such as `Tutorials/Getting Started`.
    pub category_path: String,
    pub article_urls: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    pub name: String,
    pub path_segment: String,
    pub sections: Vec<SectionSummary>,
}

impl Category {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            path_segment: paths::sanitize_filename(name, paths::MAX_FILENAME_CHARS),
            sections: Vec::new(),
        }
    }

    pub fn total_articles(&self) -> usize {
        self.sections.iter().map(|s| s.article_count).sum()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectionSummary {
    pub title: String,
    pub category_path: String,
    pub article_count: usize,
}

/// An unresolved same-origin link to another article.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleRef {
    pub target_id: String,
    pub original_href: String,
}

#[derive(Debug, Clone)]
pub struct Article {
    pub id: String,
    pub url: String,
    pub title: String,
    pub category_path: String,
    pub section_title: String,
    pub last_updated: Option<String>,
    /// Content after phase-1 rewriting; asset paths are relative to the output root.
    pub content_html: String,
    pub plain_text: String,
    pub assets: Vec<String>,
    pub references: Vec<ArticleRef>,
}

impl Article {
    pub fn content_length(&self) -> usize {
        self.plain_text.chars().count()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedArticle {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub url: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetStats {
    pub images_downloaded: usize,
    pub attachments_downloaded: usize,
    pub reused_from_disk: usize,
    pub failed: usize,
    pub skipped_external: usize,
}

impl AssetStats {
    pub fn total_downloaded(&self) -> usize {
        self.images_downloaded + self.attachments_downloaded
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LinkStats {
    pub resolved_references: usize,
    pub missing_targets: usize,
    pub stub_pages: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub started_at: String,
    pub finished_at: String,
    pub duration_secs: f64,
    pub total_sections: usize,
    pub total_articles: usize,
    pub successful: usize,
    pub skipped_existing: usize,
    pub failed: usize,
    pub success_rate: f64,
    pub published_articles: usize,
    pub interrupted: bool,
    pub failed_articles: Vec<FailedArticle>,
    pub assets: AssetStats,
    pub links: LinkStats,
    pub categories: Vec<Category>,
}
