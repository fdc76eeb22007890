//! Optional help-center metadata API, used as an alternative discovery source.
//!
//! Deployments differ in path prefix and authentication scheme, so every
//! request walks a fixed list of prefixes and auth variants; the first
//! combination that answers is remembered for the rest of the run.

use std::collections::HashSet;
use std::time::Duration;

use anyhow::Context as _;
use tokio::sync::Mutex;
use url::Url;

use crate::categories;
use crate::formats::Section;
use crate::rules::SiteRules;

pub const PREFIXES: &[&str] = &[
    "apiv2",
    "api/v2/helpcenter",
    "api/v1/helpcenter",
    "api/v2/help_center",
    "api/v1/help_center",
    "hc/api/v2/helpcenter",
    "hc/api/v1/helpcenter",
];

pub const POSTS_PER_PAGE: usize = 100;
const MAX_POST_PAGES: usize = 500;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiConfig {
    pub base_url: String,
    pub api_key: String,
    pub email: Option<String>,
}

impl ApiConfig {
    /// Reads `KBMIRROR_API_BASE_URL`, `KBMIRROR_API_KEY` and `KBMIRROR_API_EMAIL`.
    pub fn from_env() -> Option<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Option<Self> {
        let non_empty = |name: &str| lookup(name).map(|v| v.trim().to_owned()).filter(|v| !v.is_empty());
        let base_url = non_empty("KBMIRROR_API_BASE_URL")?
            .trim_end_matches('/')
            .to_owned();
        let api_key = non_empty("KBMIRROR_API_KEY")?;
        Some(Self {
            base_url,
            api_key,
            email: non_empty("KBMIRROR_API_EMAIL"),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct AuthVariant {
    query: Vec<(String, String)>,
    headers: Vec<(String, String)>,
    basic: Option<(String, String)>,
}

fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
    items
        .iter()
        .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
        .collect()
}

fn query_auth(items: &[(&str, &str)]) -> AuthVariant {
    AuthVariant {
        query: pairs(items),
        ..AuthVariant::default()
    }
}

fn header_auth(items: &[(&str, &str)]) -> AuthVariant {
    AuthVariant {
        headers: pairs(items),
        ..AuthVariant::default()
    }
}

fn basic_auth(user: String, password: &str) -> AuthVariant {
    AuthVariant {
        basic: Some((user, password.to_owned())),
        ..AuthVariant::default()
    }
}

fn auth_variants(config: &ApiConfig) -> Vec<AuthVariant> {
    let key = config.api_key.as_str();
    let token = format!("Token {key}");
    let bearer = format!("Bearer {key}");

    let mut variants = vec![
        query_auth(&[("apikey", key)]),
        query_auth(&[("api_key", key)]),
        header_auth(&[("x-api-key", key)]),
        header_auth(&[("apikey", key)]),
        header_auth(&[("authorization", token.as_str())]),
        header_auth(&[("authorization", bearer.as_str())]),
    ];
    if let Some(email) = config.email.as_deref() {
        variants.push(basic_auth(email.to_owned(), key));
        variants.push(basic_auth(format!("{email}/token"), key));
        variants.push(query_auth(&[("email", email), ("apikey", key)]));
        variants.push(query_auth(&[("user_email", email), ("apikey", key)]));
        variants.push(header_auth(&[("x-api-key", key), ("x-user-email", email)]));
    }
    variants
}

/// One article as listed by the API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiPost {
    pub id: String,
    pub title: String,
    pub url: Option<String>,
    pub section: Option<String>,
}

#[derive(Debug)]
pub struct ApiClient {
    http: reqwest::Client,
    config: ApiConfig,
    variants: Vec<AuthVariant>,
    working: Mutex<Option<(usize, usize)>>,
}

impl ApiClient {
    pub fn new(config: ApiConfig, timeout: Duration) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("kbmirror/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("build api http client")?;
        Ok(Self {
            http,
            variants: auth_variants(&config),
            config,
            working: Mutex::new(None),
        })
    }

    async fn attempt(
        &self,
        prefix: &str,
        variant: &AuthVariant,
        path: &str,
        params: &[(String, String)],
    ) -> anyhow::Result<Result<serde_json::Value, u16>> {
        let url = format!("{}/{prefix}/{}", self.config.base_url, path.trim_start_matches('/'));
        let mut request = self
            .http
            .get(&url)
            .header(reqwest::header::ACCEPT, "application/json")
            .query(params)
            .query(&variant.query);
        for (name, value) in &variant.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        if let Some((user, password)) = &variant.basic {
            request = request.basic_auth(user, Some(password));
        }

        let response = request.send().await.with_context(|| format!("GET {url}"))?;
        let status = response.status();
        if !status.is_success() {
            return Ok(Err(status.as_u16()));
        }
        let value = response
            .json::<serde_json::Value>()
            .await
            .with_context(|| format!("parse api response: {url}"))?;
        Ok(Ok(value))
    }

    /// GETs `path` under the first prefix and auth variant that answers.
    pub async fn get_json(
        &self,
        path: &str,
        params: &[(String, String)],
    ) -> anyhow::Result<serde_json::Value> {
        let known = *self.working.lock().await;
        if let Some((p, v)) = known
            && let Ok(Ok(value)) = self.attempt(PREFIXES[p], &self.variants[v], path, params).await
        {
            return Ok(value);
        }

        let mut last_error: Option<anyhow::Error> = None;
        for (p, prefix) in PREFIXES.iter().enumerate() {
            for (v, variant) in self.variants.iter().enumerate() {
                match self.attempt(prefix, variant, path, params).await {
                    Ok(Ok(value)) => {
                        tracing::debug!(prefix, variant = v, "api endpoint answered");
                        *self.working.lock().await = Some((p, v));
                        return Ok(value);
                    }
                    Ok(Err(404)) => {
                        last_error = Some(anyhow::anyhow!("{prefix}/{path}: HTTP 404"));
                        break;
                    }
                    Ok(Err(status)) => {
                        last_error = Some(anyhow::anyhow!("{prefix}/{path}: HTTP {status}"));
                    }
                    Err(err) => last_error = Some(err),
                }
            }
        }
        Err(last_error.unwrap_or_else(|| anyhow::anyhow!("no api endpoint answered: {path}")))
    }

    /// Lists every post, one page of [`POSTS_PER_PAGE`] at a time, until a short page.
    pub async fn list_posts(&self) -> anyhow::Result<Vec<ApiPost>> {
        let mut posts: Vec<ApiPost> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();

        for page in 1..=MAX_POST_PAGES {
            let params = vec![
                ("page".to_owned(), page.to_string()),
                ("per_page".to_owned(), POSTS_PER_PAGE.to_string()),
            ];
            let value = self
                .get_json("posts.json", &params)
                .await
                .with_context(|| format!("list posts page {page}"))?;
            let items = post_items(&value);
            let count = items.len();

            let mut added = 0usize;
            for post in items.iter().filter_map(parse_post) {
                if seen.insert(post.id.clone()) {
                    posts.push(post);
                    added += 1;
                }
            }
            tracing::debug!(page, items = count, added, "api: posts page");
            if count < POSTS_PER_PAGE || added == 0 {
                break;
            }
        }
        tracing::info!(posts = posts.len(), "api: listed posts");
        Ok(posts)
    }
}

fn post_items(value: &serde_json::Value) -> Vec<serde_json::Value> {
    if let Some(items) = value.as_array() {
        return items.clone();
    }
    ["posts", "data", "items", "articles"]
        .iter()
        .find_map(|key| value.get(key).and_then(|v| v.as_array()))
        .cloned()
        .unwrap_or_default()
}

fn json_string(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_owned()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn first_field(item: &serde_json::Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|key| item.get(key).and_then(json_string))
}

fn parse_post(item: &serde_json::Value) -> Option<ApiPost> {
    let id = first_field(item, &["id", "post_id", "article_id", "_id"])?;
    let title = first_field(item, &["title", "name"]).unwrap_or_default();
    let url = first_field(item, &["html_url", "url"]);
    let section = first_field(item, &["section_name", "forum_name", "category_name"]).or_else(|| {
        ["section", "forum", "category"].iter().find_map(|key| {
            let nested = item.get(key)?;
            json_string(nested).filter(|_| nested.is_string()).or_else(|| first_field(nested, &["name", "title"]))
        })
    });
    Some(ApiPost {
        id,
        title,
        url,
        section,
    })
}

/// Groups listed posts into sections by section name, in first-seen order.
pub fn posts_to_sections(posts: &[ApiPost], home: &Url, rules: &SiteRules) -> Vec<Section> {
    let mut sections: Vec<Section> = Vec::new();
    for post in posts {
        let article_url = post
            .url
            .as_deref()
            .and_then(|u| home.join(u).ok())
            .filter(|u| rules.article_id(u.path()).as_deref() == Some(post.id.as_str()))
            .or_else(|| {
                home.join(&rules.profile.article_path_template.replace("{id}", &post.id))
                    .ok()
            });
        let Some(article_url) = article_url else {
            continue;
        };

        let title = post
            .section
            .clone()
            .unwrap_or_else(|| "Unknown".to_owned());
        let idx = match sections.iter().position(|s| s.title == title) {
            Some(idx) => idx,
            None => {
                sections.push(Section {
                    url: String::new(),
                    category_path: categories::from_table(
                        &title,
                        &rules.profile.categories,
                        rules.catch_all(),
                    ),
                    title,
                    description: None,
                    article_urls: Vec::new(),
                });
                sections.len() - 1
            }
        };
        sections[idx].article_urls.push(article_url.to_string());
    }
    sections
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::SiteProfile;

    #[test]
    fn config_needs_base_url_and_key() {
        let env = |pairs: &'static [(&'static str, &'static str)]| {
            move |name: &str| {
                pairs
                    .iter()
                    .find(|(k, _)| *k == name)
                    .map(|(_, v)| (*v).to_owned())
            }
        };
        assert_eq!(ApiConfig::from_lookup(env(&[("KBMIRROR_API_KEY", "k")])), None);
        assert_eq!(
            ApiConfig::from_lookup(env(&[
                ("KBMIRROR_API_BASE_URL", "https://api.example.com/"),
                ("KBMIRROR_API_KEY", "k"),
                ("KBMIRROR_API_EMAIL", " "),
            ])),
            Some(ApiConfig {
                base_url: "https://api.example.com".to_owned(),
                api_key: "k".to_owned(),
                email: None,
            })
        );
    }

    #[test]
    fn email_adds_auth_variants() {
        let mut config = ApiConfig {
            base_url: "https://api.example.com".to_owned(),
            api_key: "k".to_owned(),
            email: None,
        };
        assert_eq!(auth_variants(&config).len(), 6);
        config.email = Some("me@example.com".to_owned());
        let variants = auth_variants(&config);
        assert_eq!(variants.len(), 11);
        assert_eq!(
            variants[7].basic,
            Some(("me@example.com/token".to_owned(), "k".to_owned()))
        );
    }

    #[test]
    fn posts_are_parsed_from_loose_shapes() {
        let value = serde_json::json!({
            "posts": [
                {"id": 11, "title": "A", "forum_name": "SDK"},
                {"post_id": "12", "name": "B", "section": {"name": "插件开发"}},
                {"title": "no id"}
            ]
        });
        let posts = post_items(&value)
            .iter()
            .filter_map(parse_post)
            .collect::<Vec<_>>();
        assert_eq!(posts.len(), 2);
        assert_eq!(posts[0].id, "11");
        assert_eq!(posts[0].section.as_deref(), Some("SDK"));
        assert_eq!(posts[1].title, "B");
        assert_eq!(posts[1].section.as_deref(), Some("插件开发"));
    }

    #[test]
    fn posts_group_into_sections() {
        let rules = SiteRules::compile(SiteProfile::default()).unwrap();
        let home = Url::parse("https://example.com/hc/").unwrap();
        let post = |id: &str, section: Option<&str>, url: Option<&str>| ApiPost {
            id: id.to_owned(),
            title: format!("t{id}"),
            url: url.map(str::to_owned),
            section: section.map(str::to_owned),
        };
        let sections = posts_to_sections(
            &[
                post("1", Some("SDK"), None),
                post("2", Some("插件开发"), Some("/hc/kb/article/2/")),
                post("3", Some("SDK"), Some("https://elsewhere.org/x")),
                post("4", None, None),
            ],
            &home,
            &rules,
        );
        assert_eq!(sections.len(), 3);
        assert_eq!(sections[0].category_path, "工具/SDK");
        assert_eq!(
            sections[0].article_urls,
            [
                "https://example.com/hc/kb/article/1/",
                "https://example.com/hc/kb/article/3/"
            ]
        );
        assert_eq!(sections[1].category_path, "插件/插件开发");
        assert_eq!(sections[2].title, "Unknown");
    }

    #[tokio::test]
    async fn client_falls_through_prefixes_and_auth_variants() -> anyhow::Result<()> {
        let server = tiny_http::Server::http("127.0.0.1:0").map_err(|e| anyhow::anyhow!("{e}"))?;
        let base = format!("http://{}", server.server_addr());
        let (shutdown_tx, shutdown_rx) = std::sync::mpsc::channel::<()>();
        let handle = std::thread::spawn(move || {
            while shutdown_rx.try_recv().is_err() {
                let Ok(Some(request)) = server.recv_timeout(Duration::from_millis(50)) else {
                    continue;
                };
                let path = request.url().to_owned();
                let has_header = request
                    .headers()
                    .iter()
                    .any(|h| h.field.equiv("x-api-key") && h.value.as_str() == "secret");
                let (status, body) = if !path.starts_with("/api/v2/helpcenter/") {
                    (404, String::new())
                } else if !has_header {
                    (401, String::new())
                } else if path.contains("?page=1&") {
                    (200, r#"{"posts":[{"id":5,"title":"Five","forum_name":"SDK"}]}"#.to_owned())
                } else {
                    (200, r#"{"posts":[]}"#.to_owned())
                };
                let response = tiny_http::Response::from_string(body).with_status_code(status);
                let _ = request.respond(response);
            }
        });

        let client = ApiClient::new(
            ApiConfig {
                base_url: base,
                api_key: "secret".to_owned(),
                email: None,
            },
            Duration::from_secs(5),
        )?;
        let posts = client.list_posts().await?;
        assert_eq!(
            posts,
            vec![ApiPost {
                id: "5".to_owned(),
                title: "Five".to_owned(),
                url: None,
                section: Some("SDK".to_owned()),
            }]
        );
        assert_eq!(*client.working.lock().await, Some((1, 2)));

        let _ = shutdown_tx.send(());
        let _ = handle.join();
        Ok(())
    }
}
