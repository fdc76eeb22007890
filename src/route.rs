//! Hash routes of the aggregated index page.
//!
//! `#article-<id>` shows one article, `#article-<id>:<anchor>` additionally
//! scrolls to an anchor inside it, and anything else shows the welcome panel.
//! The router script embedded in `index.html` implements the same grammar.

pub const ARTICLE_PREFIX: &str = "#article-";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Welcome,
    Article { id: String, anchor: Option<String> },
}

impl Route {
    pub fn article(id: &str) -> Self {
        Route::Article {
            id: id.to_owned(),
            anchor: None,
        }
    }

    pub fn parse(hash: &str) -> Self {
        let Some(rest) = hash.strip_prefix(ARTICLE_PREFIX) else {
            return Route::Welcome;
        };
        let (id, anchor) = match rest.split_once(':') {
            Some((id, anchor)) => (id, Some(anchor)),
            None => (rest, None),
        };
        if id.is_empty() || !id.chars().all(|ch| ch.is_ascii_digit()) {
            return Route::Welcome;
        }
        Route::Article {
            id: id.to_owned(),
            anchor: anchor.filter(|a| !a.is_empty()).map(str::to_owned),
        }
    }

    pub fn to_hash(&self) -> String {
        match self {
            Route::Welcome => String::new(),
            Route::Article { id, anchor: None } => format!("{ARTICLE_PREFIX}{id}"),
            Route::Article {
                id,
                anchor: Some(anchor),
            } => format!("{ARTICLE_PREFIX}{id}:{anchor}"),
        }
    }
}

/// Client-side router: applies the route from `location.hash` on load and on
/// every `hashchange`. Applying the same route twice leaves the page as is.
pub const ROUTER_SCRIPT: &str = r#"(function () {
  var PREFIX = '#article-';
  var current = null;

  function parse(hash) {
    if (!hash || hash.indexOf(PREFIX) !== 0) return { id: null, anchor: null };
    var rest = hash.slice(PREFIX.length);
    var sep = rest.indexOf(':');
    var id = sep < 0 ? rest : rest.slice(0, sep);
    var anchor = sep < 0 ? null : rest.slice(sep + 1) || null;
    if (!/^\d+$/.test(id)) return { id: null, anchor: null };
    return { id: id, anchor: anchor };
  }

  function apply() {
    var route = parse(window.location.hash);
    var target = route.id ? document.getElementById('article-' + route.id) : null;
    if (route.id && !target) route = { id: null, anchor: null };
    var key = route.id ? route.id + ':' + (route.anchor || '') : '';
    if (key === current) return;
    current = key;

    var articles = document.querySelectorAll('.article-panel');
    for (var i = 0; i < articles.length; i++) {
      articles[i].style.display = articles[i] === target ? 'block' : 'none';
    }
    document.getElementById('welcome').style.display = target ? 'none' : 'block';

    var links = document.querySelectorAll('.nav-article');
    for (var j = 0; j < links.length; j++) {
      links[j].classList.toggle('active', links[j].getAttribute('data-article-id') === route.id);
    }

    if (target && route.anchor) {
      var anchor = target.querySelector('[id="' + route.anchor.replace(/"/g, '') + '"]');
      if (anchor) { anchor.scrollIntoView(); return; }
    }
    window.scrollTo(0, 0);
  }

  window.addEventListener('hashchange', apply);
  document.addEventListener('DOMContentLoaded', apply);
})();
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_article_routes() {
        assert_eq!(Route::parse("#article-42"), Route::article("42"));
        assert_eq!(
            Route::parse("#article-42:step2"),
            Route::Article {
                id: "42".to_owned(),
                anchor: Some("step2".to_owned())
            }
        );
        assert_eq!(Route::parse("#article-42:"), Route::article("42"));
    }

    #[test]
    fn anything_else_is_welcome() {
        for hash in ["", "#", "#intro", "#article-", "#article-abc", "article-1"] {
            assert_eq!(Route::parse(hash), Route::Welcome, "hash: {hash:?}");
        }
    }

    #[test]
    fn hashes_parse_back_to_the_same_route() {
        let routes = [
            Route::Welcome,
            Route::article("7"),
            Route::Article {
                id: "7".to_owned(),
                anchor: Some("faq".to_owned()),
            },
        ];
        for route in routes {
            assert_eq!(Route::parse(&route.to_hash()), route);
        }
    }
}
