use std::path::Path;

use anyhow::Context as _;
use serde::{Deserialize, Serialize};

/// Site-specific rule tables.
///
/// Every field has a built-in default tuned for a help-center layout
/// (`/hc/kb/category/`, `/hc/kb/section/`, `/hc/kb/article/<id>`). A YAML
/// profile passed with `--profile` overrides individual fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteProfile {
    /// Title shown on the generated index page.
    pub site_title: String,
    /// Regex with one capture group extracting the article ID from a URL path.
    pub article_id_pattern: String,
    /// Article URL path with an `{id}` placeholder, used when only an ID is known.
    pub article_path_template: String,
    pub section_path_marker: String,
    pub category_path_marker: String,
    pub section_link_selector: String,
    pub category_link_selector: String,
    pub article_link_selector: String,
    pub section_title_selectors: Vec<String>,
    pub section_description_selector: String,
    pub breadcrumb_selectors: Vec<String>,
    pub content_selectors: Vec<String>,
    pub article_title_selectors: Vec<String>,
    pub last_updated_selectors: Vec<String>,
    pub cleanup: CleanupProfile,
    pub categories: Vec<CategoryGroup>,
    pub category_order: Vec<String>,
    pub catch_all_category: String,
    pub heading_anchors: Vec<HeadingAnchor>,
    pub license_projects: Vec<LicenseProject>,
    pub trusted_attachment_paths: Vec<String>,
    pub external_image_hosts: Vec<String>,
    pub referer_overrides: Vec<RefererOverride>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CleanupProfile {
    pub selectors: Vec<String>,
    pub phrases: Vec<String>,
    /// Containers with at least this many non-whitespace characters survive the phrase pass.
    pub max_phrase_container_chars: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryGroup {
    pub name: String,
    #[serde(default)]
    pub subcategories: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeadingAnchor {
    pub keyword: String,
    pub id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LicenseProject {
    pub keyword: String,
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefererOverride {
    pub host: String,
    pub referer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
}

impl SiteProfile {
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read site profile: {}", path.display()))?;
        let profile: Self = serde_yaml::from_str(&text)
            .with_context(|| format!("parse site profile yaml: {}", path.display()))?;
        tracing::debug!(path = %path.display(), "loaded site profile");
        Ok(profile)
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_owned()).collect()
}

fn group(name: &str, subcategories: &[&str]) -> CategoryGroup {
    CategoryGroup {
        name: name.to_owned(),
        subcategories: strings(subcategories),
    }
}

fn anchor(keyword: &str, id: &str) -> HeadingAnchor {
    HeadingAnchor {
        keyword: keyword.to_owned(),
        id: id.to_owned(),
    }
}

fn project(keyword: &str, url: &str) -> LicenseProject {
    LicenseProject {
        keyword: keyword.to_owned(),
        url: url.to_owned(),
    }
}

impl Default for CleanupProfile {
    fn default() -> Self {
        Self {
            selectors: strings(&[
                "script",
                "style",
                "footer",
                ".footer",
                ".article-nav",
                ".article-navigation",
                ".prev-next",
                ".pagination",
                "[class*=\"prev\"]",
                "[class*=\"next\"]",
                ".rating",
                ".feedback",
                ".helpful",
                ".vote",
                "[class*=\"helpful\"]",
                "[class*=\"vote\"]",
                "[class*=\"rating\"]",
                ".share",
                ".social",
                "[class*=\"share\"]",
                "[class*=\"social\"]",
                ".comments",
                ".comment",
                "[class*=\"comment\"]",
                ".breadcrumb",
                ".sidebar",
                ".related",
                ".tags",
                ".category-nav",
            ]),
            phrases: strings(&[
                "上一篇",
                "下一篇",
                "有帮助",
                "人觉得有帮助",
                "觉得有帮助",
                "分享",
                "收藏",
                "点赞",
                "评论",
                "相关文章",
                "Previous article",
                "Next article",
                "Was this article helpful",
                "Related articles",
            ]),
            max_phrase_container_chars: 200,
        }
    }
}

impl Default for SiteProfile {
    fn default() -> Self {
        Self {
            site_title: "Developer Network (offline)".to_owned(),
            article_id_pattern: r"/hc/kb/article/(\d+)".to_owned(),
            article_path_template: "/hc/kb/article/{id}/".to_owned(),
            section_path_marker: "/hc/kb/section/".to_owned(),
            category_path_marker: "/hc/kb/category/".to_owned(),
            section_link_selector: r#"a.more[href*="/hc/kb/section/"]"#.to_owned(),
            category_link_selector: r#"a[href*="/hc/kb/category/"]"#.to_owned(),
            article_link_selector: r#"a[href*="/hc/kb/article/"]"#.to_owned(),
            section_title_selectors: strings(&[
                "h1.section-title",
                ".section-header h1",
                "h1",
                ".breadcrumb li:last-child",
            ]),
            section_description_selector: "p.section-description".to_owned(),
            breadcrumb_selectors: strings(&[".breadcrumbs", ".breadcrumb"]),
            content_selectors: strings(&[
                "article",
                ".article-content",
                ".kb-article-content",
                ".content-body",
                ".main-content",
            ]),
            article_title_selectors: strings(&[
                "h1.article-title",
                ".kb-article-title h1",
                "h1",
                ".article-header h1",
            ]),
            last_updated_selectors: strings(&["time", ".updated-time", ".last-modified"]),
            cleanup: CleanupProfile::default(),
            categories: vec![
                group(
                    "API文档",
                    &[
                        "kintone REST API",
                        "kintone JavaScript API",
                        "kintone API指南",
                        "cybozu User API/OAuth",
                    ],
                ),
                group("工具", &["SDK", "开发工具", "资源库"]),
                group(
                    "新手教程",
                    &["新手入门", "kintone API入门系列", "kintone自定义技巧"],
                ),
                group("插件", &["插件API/CSS", "插件开发", "插件范例"]),
                group("开发范例", &["自定义开发"]),
                group("通知", &["API更新信息"]),
                group(
                    "开发学习视频专栏",
                    &[
                        "云上办公解决方案",
                        "才望云开发",
                        "前端技术",
                        "前端中级进阶",
                        "培训",
                    ],
                ),
                group("应用场景", &["共通"]),
                group(
                    "账号&协议",
                    &["协议规章", "kintone开发者账号", "kintone开发者演示环境"],
                ),
            ],
            category_order: strings(&[
                "新手教程",
                "API文档",
                "工具",
                "插件",
                "开发范例",
                "应用场景",
                "Other",
                "开发学习视频专栏",
                "通知",
                "账号&协议",
            ]),
            catch_all_category: "Other".to_owned(),
            heading_anchors: vec![
                anchor("前言", "step1"),
                anchor("Introduction", "step1"),
                anchor("视频学习", "step8"),
                anchor("功能梳理", "step2"),
                anchor("Demo演示", "step3"),
                anchor("效果图", "step3"),
                anchor("如何实现", "step4"),
                anchor("代码分享", "step5"),
                anchor("代码共享", "step5"),
                anchor("Demo代码使用条款", "step6"),
                anchor("注意事项", "step7"),
                anchor("Notes", "step7"),
                anchor("最后", "step9"),
            ],
            license_projects: vec![
                project("express", "https://github.com/expressjs/express"),
                project("react", "https://github.com/facebook/react"),
                project("vue", "https://github.com/vuejs/vue"),
                project("angular", "https://github.com/angular/angular"),
                project("jquery", "https://github.com/jquery/jquery"),
                project("bootstrap", "https://github.com/twbs/bootstrap"),
                project("lodash", "https://github.com/lodash/lodash"),
                project("moment", "https://github.com/moment/moment"),
                project("axios", "https://github.com/axios/axios"),
                project("webpack", "https://github.com/webpack/webpack"),
                project("babel", "https://github.com/babel/babel"),
                project("eslint", "https://github.com/eslint/eslint"),
                project("typescript", "https://github.com/microsoft/TypeScript"),
                project("node", "https://github.com/nodejs/node"),
                project("npm", "https://github.com/npm/cli"),
            ],
            trusted_attachment_paths: strings(&["attachments/download", "files.kf5.com"]),
            external_image_hosts: strings(&[
                "s3.bmp.ovh",
                "imgchr.com",
                "imgtu.com",
                "sm.ms",
                "imgur.com",
                "githubusercontent.com",
                "raw.githubusercontent.com",
                "cloudflare-ipfs.com",
                "ipfs.io",
                "pinata.cloud",
                "arweave.net",
                "nft.storage",
                "web3.storage",
                "infura-ipfs.io",
            ]),
            referer_overrides: vec![RefererOverride {
                host: "s3.bmp.ovh".to_owned(),
                referer: "https://bmp.ovh/".to_owned(),
                origin: Some("https://bmp.ovh".to_owned()),
            }],
        }
    }
}
