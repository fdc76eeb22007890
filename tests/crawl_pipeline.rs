use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use predicates::prelude::*;

static LOGO_PNG: &[u8] = &[
    137, 80, 78, 71, 13, 10, 26, 10, 0, 0, 0, 13, 73, 72, 68, 82, 0, 0, 0, 1, 0, 0, 0, 1, 8, 4, 0,
    0, 0, 181, 28, 12, 2, 0, 0, 0, 11, 73, 68, 65, 84, 120, 218, 99, 252, 255, 23, 0, 2, 3, 1, 128,
    110, 220, 25, 0, 0, 0, 0, 73, 69, 78, 68, 174, 66, 96, 130,
];

const HOME: &str = r#"<!doctype html>
<html>
  <head><title>Help Center</title></head>
  <body>
    <a class="more" href="/hc/kb/section/10/">View all</a>
    <a href="/hc/kb/category/5/">Tutorials</a>
  </body>
</html>
"#;

const CATEGORY: &str = r#"<!doctype html>
<html>
  <head><title>Tutorials - Help Center</title></head>
  <body>
    <a class="more" href="/hc/kb/section/10/">View all</a>
    <a class="more" href="/hc/kb/section/11/">View all</a>
  </body>
</html>
"#;

const SECTION_BASICS: &str = r#"<!doctype html>
<html>
  <head><title>Basics - Help Center</title></head>
  <body>
    <ol class="breadcrumbs"><li>Home</li><li>Tutorials</li><li>Basics</li></ol>
    <ul>
      <li><a href="/hc/kb/article/201/">ArticleA</a></li>
      <li><a href="/hc/kb/article/202/">ArticleB</a></li>
    </ul>
  </body>
</html>
"#;

const SECTION_ADVANCED: &str = r#"<!doctype html>
<html>
  <head><title>Advanced - Help Center</title></head>
  <body>
    <ol class="breadcrumbs"><li>Home</li><li>Tutorials</li><li>Advanced</li></ol>
    <ul>
      <li><a href="/hc/kb/article/201/">ArticleA again</a></li>
      <li><a href="/hc/kb/article/203/">Gone</a></li>
    </ul>
  </body>
</html>
"#;

const ARTICLE_A: &str = r##"<!doctype html>
<html>
  <head><title>ArticleA</title></head>
  <body>
    <article>
      <h1>ArticleA</h1>
      <p>Continue with <a href="/hc/kb/article/202/">the second article</a>.</p>
      <p><img src="/static/logo.png" alt="logo"></p>
      <p><img src="/static/broken.png" alt="diagram"></p>
      <p><img src="{external_image}" alt="chart"></p>
      <p><a href="#">Click here</a></p>
    </article>
  </body>
</html>
"##;

const ARTICLE_B: &str = r#"<!doctype html>
<html>
  <head><title>ArticleB</title></head>
  <body>
    <article>
      <h1>ArticleB</h1>
      <p><img src="/static/logo.png" alt="logo again"></p>
      <p>See <a href="/hc/kb/article/203/">a retired article</a>.</p>
      <p><a href="/attachments/download/7/">Sample project</a></p>
      <p><a href="/attachments/download/8/manual.pdf">Manual</a></p>
    </article>
  </body>
</html>
"#;

#[derive(Debug, Default)]
struct Hits {
    articles: AtomicUsize,
    by_path: Mutex<HashMap<String, usize>>,
}

impl Hits {
    fn path(&self, path: &str) -> usize {
        self.by_path
            .lock()
            .expect("hits lock")
            .get(path)
            .copied()
            .unwrap_or(0)
    }
}

fn header(name: &str, value: &str) -> tiny_http::Header {
    tiny_http::Header::from_bytes(name.as_bytes(), value.as_bytes()).expect("header")
}

fn spawn_help_center(hits: Arc<Hits>) -> (String, mpsc::Sender<()>, thread::JoinHandle<()>) {
    let server = tiny_http::Server::http("127.0.0.1:0").expect("start tiny_http server");
    let addr = server.server_addr().to_ip().expect("tcp listen addr");
    let base_url = format!("http://{addr}");
    // Same server, different host name: classified as an external image host.
    let article_a = ARTICLE_A.replace(
        "{external_image}",
        &format!("http://localhost:{}/ext/photo.png", addr.port()),
    );

    let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

    let handle = thread::spawn(move || {
        loop {
            if shutdown_rx.try_recv().is_ok() {
                break;
            }

            let request = match server.recv_timeout(Duration::from_millis(50)) {
                Ok(Some(req)) => req,
                Ok(None) => continue,
                Err(_) => break,
            };

            let url = request.url().to_string();
            let path = url.split('?').next().unwrap_or(&url).to_owned();
            if path.starts_with("/hc/kb/article/") {
                hits.articles.fetch_add(1, Ordering::SeqCst);
            }
            *hits
                .by_path
                .lock()
                .expect("hits lock")
                .entry(path.clone())
                .or_default() += 1;

            let html = |body: &str| {
                tiny_http::Response::from_string(body)
                    .with_header(header("Content-Type", "text/html; charset=utf-8"))
            };

            let _ = match path.as_str() {
                "/hc/" => request.respond(html(HOME)),
                "/hc/kb/category/5/" => request.respond(html(CATEGORY)),
                "/hc/kb/section/10/" => request.respond(html(SECTION_BASICS)),
                "/hc/kb/section/11/" => request.respond(html(SECTION_ADVANCED)),
                "/hc/kb/article/201/" => request.respond(html(&article_a)),
                "/hc/kb/article/202/" => request.respond(html(ARTICLE_B)),
                "/static/logo.png" | "/ext/photo.png" => request.respond(
                    tiny_http::Response::from_data(LOGO_PNG).with_header(header("Content-Type", "image/png")),
                ),
                "/static/broken.png" => request.respond(html("<html><body>login required</body></html>")),
                "/attachments/download/7/" => request.respond(
                    tiny_http::Response::from_data(&b"PK\x03\x04sample"[..])
                        .with_header(header("Content-Type", "application/zip"))
                        .with_header(header("Content-Disposition", "attachment; filename=\"sample.zip\"")),
                ),
                "/attachments/download/8/manual.pdf" => request.respond(
                    tiny_http::Response::from_data(&b"%PDF-1.4 manual"[..])
                        .with_header(header("Content-Type", "application/pdf"))
                        .with_header(header(
                            "Content-Disposition",
                            "attachment; filename*=UTF-8''user%20guide.pdf",
                        )),
                ),
                _ => request.respond(tiny_http::Response::from_string("not found").with_status_code(404)),
            };
        }
    });

    (base_url, shutdown_tx, handle)
}

fn crawl(base_url: &str, out: &Path, resume: bool) {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("kbmirror");
    cmd.args([
        "crawl",
        "--url",
        &format!("{base_url}/hc/"),
        "--out",
        out.to_str().expect("utf-8 out path"),
        "--delay-ms",
        "0",
        "--concurrency",
        "2",
    ]);
    if resume {
        cmd.arg("--resume");
    }
    cmd.assert()
        .success()
        .stderr(predicate::str::contains("crawl finished"));
}

fn files_in(dir: &Path) -> Vec<PathBuf> {
    let mut out = Vec::new();
    let Ok(entries) = fs::read_dir(dir) else {
        return out;
    };
    for entry in entries {
        let path = entry.expect("dir entry").path();
        if path.is_dir() {
            out.extend(files_in(&path));
        } else {
            out.push(path);
        }
    }
    out.sort();
    out
}

fn report(out: &Path) -> anyhow::Result<serde_json::Value> {
    let text = fs::read_to_string(out.join("report.json"))?;
    Ok(serde_json::from_str(&text)?)
}

#[test]
fn crawl_mirrors_articles_and_resume_fetches_nothing_new() -> anyhow::Result<()> {
    let hits = Arc::new(Hits::default());
    let (base_url, shutdown_tx, handle) = spawn_help_center(Arc::clone(&hits));

    let temp = tempfile::tempdir()?;
    let out = temp.path().join("mirror");

    crawl(&base_url, &out, false);

    let page_a = out.join("html/Tutorials/Basics/201_ArticleA.html");
    let page_b = out.join("html/Tutorials/Basics/202_ArticleB.html");
    assert!(page_a.exists(), "missing {}", page_a.display());
    assert!(page_b.exists(), "missing {}", page_b.display());
    assert!(out.join("index.html").exists());
    assert!(out.join("css/article.css").exists());

    // One shared image, fetched once, referenced by both pages.
    let images = files_in(&out.join("images"));
    assert_eq!(images.len(), 1, "images: {images:?}");
    assert_eq!(hits.path("/static/logo.png"), 1);
    let image_name = images[0]
        .file_name()
        .and_then(|n| n.to_str())
        .expect("image name")
        .to_owned();
    assert!(image_name.ends_with(".png"));

    let a = fs::read_to_string(&page_a)?;
    let b = fs::read_to_string(&page_b)?;
    let image_src = format!("src=\"../../../images/{image_name}\"");
    assert!(a.contains(&image_src), "article A: {a}");
    assert!(b.contains(&image_src), "article B: {b}");

    // A links to B by its final path.
    assert!(a.contains("data-article-id=\"202\""));
    assert!(a.contains("href=\"202_ArticleB.html\""), "article A: {a}");

    // Unrecognized image body and inert link.
    assert!(a.contains("failed-image-placeholder"));
    assert!(a.contains("diagram"));
    assert!(a.contains("inactive-link"));
    assert!(!a.contains("href=\"#\">Click here"));
    assert_eq!(hits.path("/static/broken.png"), 1);

    // External image hosts are never contacted without --try-external-images.
    assert!(a.contains("external-image-placeholder"), "article A: {a}");
    assert!(a.contains("chart"));
    assert_eq!(hits.path("/ext/photo.png"), 0);

    // Attachments keep their server-side names behind the URL hash.
    let attachments = files_in(&out.join("attachments"));
    assert_eq!(attachments.len(), 2, "attachments: {attachments:?}");
    let attachment_name = |suffix: &str| {
        attachments
            .iter()
            .filter_map(|p| p.file_name().and_then(|n| n.to_str()))
            .find(|n| n.ends_with(suffix))
            .map(str::to_owned)
            .unwrap_or_else(|| panic!("no attachment ending {suffix}: {attachments:?}"))
    };
    let zip_name = attachment_name("_sample.zip");
    let pdf_name = attachment_name("_user guide.pdf");
    assert_eq!(fs::read(out.join("attachments").join(&zip_name))?, b"PK\x03\x04sample");
    assert_eq!(hits.path("/attachments/download/7/"), 1);
    assert_eq!(hits.path("/attachments/download/8/manual.pdf"), 1);

    assert!(
        b.contains(&format!(
            "href=\"../../../attachments/{zip_name}\" class=\"attachment-link\" target=\"_blank\" download=\"{zip_name}\">📎 Sample project</a>"
        )),
        "article B: {b}"
    );
    assert!(
        b.contains(&format!(
            "href=\"../../../attachments/{pdf_name}\" class=\"attachment-link\" target=\"_blank\">📎 Manual</a>"
        )),
        "article B: {b}"
    );

    // B's link to the missing article points at a stub page.
    assert!(b.contains("href=\"../../Other/203.html\""), "article B: {b}");
    assert!(out.join("html/Other/203.html").exists());

    let index = fs::read_to_string(out.join("index.html"))?;
    assert!(index.contains("ArticleA"));
    assert!(index.contains("ArticleB"));
    assert!(index.contains("#article-202"));

    let first = report(&out)?;
    assert_eq!(first["total_sections"], 2);
    assert_eq!(first["total_articles"], 3);
    assert_eq!(first["successful"], 2);
    assert_eq!(first["failed"], 1);
    assert_eq!(first["failed_articles"][0]["id"], "203");
    assert_eq!(first["published_articles"], 2);
    assert_eq!(first["interrupted"], false);
    assert_eq!(first["assets"]["images_downloaded"], 1);
    assert_eq!(first["assets"]["attachments_downloaded"], 2);
    assert_eq!(first["assets"]["failed"], 1);
    assert_eq!(first["assets"]["skipped_external"], 1);
    assert_eq!(first["links"]["missing_targets"], 1);

    let article_hits = hits.articles.load(Ordering::SeqCst);
    crawl(&base_url, &out, true);

    // Only the failed article is requested again; no asset is re-fetched.
    assert_eq!(hits.articles.load(Ordering::SeqCst), article_hits + 1);
    assert_eq!(hits.path("/static/logo.png"), 1);
    assert_eq!(hits.path("/static/broken.png"), 1);
    assert_eq!(hits.path("/attachments/download/7/"), 1);
    assert_eq!(hits.path("/attachments/download/8/manual.pdf"), 1);
    assert_eq!(hits.path("/ext/photo.png"), 0);
    assert_eq!(files_in(&out.join("images")).len(), 1);
    assert_eq!(files_in(&out.join("attachments")).len(), 2);

    let second = report(&out)?;
    assert_eq!(second["skipped_existing"], 2);
    assert_eq!(second["successful"], 2);
    assert_eq!(second["published_articles"], 2);
    let a_again = fs::read_to_string(&page_a)?;
    assert!(a_again.contains("href=\"202_ArticleB.html\""));

    let _ = shutdown_tx.send(());
    let _ = handle.join();
    Ok(())
}

#[test]
fn assemble_rebuilds_index_without_network() -> anyhow::Result<()> {
    let hits = Arc::new(Hits::default());
    let (base_url, shutdown_tx, handle) = spawn_help_center(Arc::clone(&hits));

    let temp = tempfile::tempdir()?;
    let out = temp.path().join("mirror");
    crawl(&base_url, &out, false);
    let _ = shutdown_tx.send(());
    let _ = handle.join();

    fs::remove_file(out.join("index.html"))?;

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("kbmirror");
    cmd.args(["assemble", "--out", out.to_str().expect("utf-8 out path")])
        .assert()
        .success()
        .stderr(predicate::str::contains("assembled output"));

    let index = fs::read_to_string(out.join("index.html"))?;
    assert!(index.contains("#article-201"));
    assert!(index.contains("#article-202"));
    Ok(())
}
