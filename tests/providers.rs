//! Scraping providers end to end: the built-in tables against canned pages.

mod common;

use common::{PNG, Stub, client, header, html, image};
use hondana::net::Request;
use hondana::prelude::*;
use hondana::provider::build_with_client;
use hondana::sources::{kissmanga, mangakakalot};
use std::sync::Arc;

fn form_value<'a>(request: &'a Request, key: &str) -> Option<&'a str> {
    request
        .form
        .as_ref()?
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

const KAKALOT_SEARCH: &str = r#"
<div class="panel_story_list">
  <div class="story_item">
    <a href="https://www.mangakakalot.gg/manga/kimetsu-no-yaiba"><img src="/covers/kny.jpg"></a>
    <h3 class="story_name"><a href="https://www.mangakakalot.gg/manga/kimetsu-no-yaiba">Kimetsu no Yaiba</a></h3>
  </div>
  <div class="story_item">
    <h3 class="story_name"><a href="/manga/kimetsu-gakuen">Kimetsu Gakuen</a></h3>
  </div>
</div>
"#;

const KAKALOT_READER: &str = r#"
<div class="container-chapter-reader">
  <img src="https://img.example/kny/3/1.jpg" alt="page 1">
  <img src="data:image/gif;base64,R0lGOD" data-src="https://img.example/kny/3/2.jpg" alt="page 2">
  <img src="https://img.example/kny/3/1.jpg" alt="repeat">
</div>
"#;

fn kakalot(stub: &Arc<Stub>) -> Arc<dyn Provider> {
    build_with_client(mangakakalot::config(), client(stub)).unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_web_search_walks_pages_until_nothing_new() {
    let stub = Stub::new();
    stub.route("https://www.mangakakalot.gg/search/story/", |req| {
        html(KAKALOT_SEARCH, &req.url)
    });
    let provider = kakalot(&stub);
    let options = SearchOptions {
        pages: 0,
        ..Default::default()
    };

    let found = provider
        .search(&Context::background(), "Kimetsu!", &options)
        .await
        .unwrap();

    let ids: Vec<_> = found.iter().map(|m| m.id.as_str()).collect();
    assert_eq!(ids, ["kimetsu-no-yaiba", "kimetsu-gakuen"]);
    assert_eq!(found[0].title, "Kimetsu no Yaiba");

    let urls: Vec<_> = stub.requests().into_iter().map(|r| r.url).collect();
    assert_eq!(
        urls,
        [
            "https://www.mangakakalot.gg/search/story/kimetsu?page=1",
            "https://www.mangakakalot.gg/search/story/kimetsu?page=2",
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_web_chapter_download_sends_referer() {
    let stub = Stub::new();
    stub.route("https://www.mangakakalot.gg/manga/kimetsu-no-yaiba/chapter-3", |req| {
        html(KAKALOT_READER, &req.url)
    });
    stub.route("https://img.example/", |req| image(PNG, &req.url));
    let provider = kakalot(&stub);
    let ctx = Context::background();

    let chapter = provider
        .get_chapter(&ctx, "kimetsu-no-yaiba/chapter-3")
        .await
        .unwrap();
    assert_eq!(chapter.manga_id, "kimetsu-no-yaiba");
    assert_eq!(chapter.info.number, Some(3.0));
    let urls: Vec<_> = chapter.pages.iter().map(|p| p.url.as_str()).collect();
    assert_eq!(
        urls,
        ["https://img.example/kny/3/1.jpg", "https://img.example/kny/3/2.jpg"]
    );

    let root = tempfile::tempdir().unwrap();
    let options = DownloadOptions {
        manga_title: Some("Demon Slayer".into()),
        volume: Some("1".into()),
        ..DownloadOptions::new(root.path())
    };
    let report = provider
        .download_chapter(&ctx, "kimetsu-no-yaiba/chapter-3", &options)
        .await
        .unwrap();
    assert_eq!(report.dir, root.path().join("Demon Slayer").join("0001-003"));
    assert_eq!(report.written, 2);

    let image_requests: Vec<_> = stub
        .requests()
        .into_iter()
        .filter(|r| r.url.starts_with("https://img.example/"))
        .collect();
    assert_eq!(image_requests.len(), 2);
    for request in &image_requests {
        assert_eq!(header(request, "referer"), Some("https://www.mangakakalot.gg"));
    }
}

#[tokio::test(start_paused = true)]
async fn test_web_chapter_without_images_is_not_found() {
    let stub = Stub::new();
    stub.html("https://www.mangakakalot.gg/manga/x/chapter-1", "<p>Removed</p>");
    let err = kakalot(&stub)
        .get_chapter(&Context::background(), "x/chapter-1")
        .await
        .unwrap_err();
    assert_eq!(err.category(), Category::NotFound);
}

const KISS_HOME: &str = r#"
<html><head><script>
var madara = {"ajaxurl":"https:\/\/kissmanga.in\/custom\/admin-ajax.php","nonce":"x"};
</script></head><body></body></html>
"#;

const KISS_RESULTS: &str = r#"
<div class="c-tabs-item__content">
  <div class="post-title"><h3 class="h4"><a href="https://kissmanga.in/manga/tower/">Tower of God</a></h3></div>
</div>
<div class="c-tabs-item__content">
  <div class="post-title"><h3 class="h4"><a href="https://kissmanga.in/kissmanga/hardcore-leveling/">Hardcore Leveling</a></h3></div>
</div>
"#;

const KISS_MANGA: &str = r#"
<div class="post-title"><h1>Tower of God</h1></div>
<div class="author-content"><a href="/author/siu">SIU</a></div>
<div class="genres-content"><a href="/genre/fantasy">Fantasy</a></div>
<div class="description-summary"><div class="summary__content"><p>Climb the tower.</p></div></div>
<div id="manga-chapters-holder" data-id="77"></div>
"#;

const KISS_CHAPTERS: &str = r#"
<ul class="main version-chap">
  <li class="wp-manga-chapter"><a href="https://kissmanga.in/manga/tower/chapter-12/">Chapter 12</a>
    <span class="chapter-release-date"><i>March 3, 2024</i></span></li>
  <li class="wp-manga-chapter"><a href="https://kissmanga.in/manga/tower/chapter-11/">Chapter 11</a>
    <span class="chapter-release-date"><i>February 25, 2024</i></span></li>
</ul>
"#;

const KISS_READER: &str = r#"
<div class="reading-content">
  <div class="page-break"><img src="https://kissmanga.in/img/loading.gif" data-src=" https://cdn.kiss.example/t/12/01.jpg "></div>
  <div class="page-break"><img src="https://kissmanga.in/img/loading.gif" data-src="https://cdn.kiss.example/t/12/02.jpg"></div>
</div>
"#;

fn kiss(stub: &Arc<Stub>) -> Arc<dyn Provider> {
    stub.route("https://kissmanga.in", |req| html(KISS_HOME, &req.url));
    build_with_client(kissmanga::config(), client(stub)).unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_themed_search_uses_discovered_ajax_endpoint() {
    let stub = Stub::new();
    stub.route("https://kissmanga.in/custom/admin-ajax.php", |req| {
        match form_value(req, "action") {
            Some("madara_load_more") => html(KISS_RESULTS, &req.url),
            _ => html("0", &req.url),
        }
    });
    let provider = kiss(&stub);
    let ctx = Context::background();

    let found = provider.search(&ctx, "tower", &SearchOptions::default()).await.unwrap();
    let ids: Vec<_> = found.iter().map(|m| m.id.as_str()).collect();
    assert_eq!(ids, ["tower", "hardcore-leveling"]);

    let ajax: Vec<_> = stub
        .requests()
        .into_iter()
        .filter(|r| r.url.contains("admin-ajax.php"))
        .collect();
    assert_eq!(ajax.len(), 1);
    assert_eq!(form_value(&ajax[0], "vars[s]"), Some("tower"));
    assert_eq!(form_value(&ajax[0], "page"), Some("0"));

    // warm-up ran once
    provider.search(&ctx, "tower", &SearchOptions::default()).await.unwrap();
    let home = stub
        .requests()
        .iter()
        .filter(|r| r.url == "https://kissmanga.in/")
        .count();
    assert_eq!(home, 1);
}

#[tokio::test(start_paused = true)]
async fn test_themed_search_falls_back_to_search_page() {
    let stub = Stub::new();
    stub.html("https://kissmanga.in/custom/admin-ajax.php", "0");
    stub.route("https://kissmanga.in/page/1/", |req| html(KISS_RESULTS, &req.url));
    let provider = kiss(&stub);

    let found = provider
        .search(&Context::background(), "tower", &SearchOptions::default())
        .await
        .unwrap();
    assert_eq!(found.len(), 2);
    assert_eq!(
        stub.hits("https://kissmanga.in/page/1/?s=tower&post_type=wp-manga"),
        1
    );
}

#[tokio::test(start_paused = true)]
async fn test_themed_manga_loads_chapters_over_ajax() {
    let stub = Stub::new();
    stub.html("https://kissmanga.in/manga/tower/", KISS_MANGA);
    stub.status("https://kissmanga.in/manga/tower/ajax/", 400);
    stub.route("https://kissmanga.in/custom/admin-ajax.php", |req| {
        match (form_value(req, "action"), form_value(req, "manga")) {
            (Some("manga_get_chapters"), Some("77")) => html(KISS_CHAPTERS, &req.url),
            _ => html("0", &req.url),
        }
    });
    let provider = kiss(&stub);

    let info = provider.get_manga(&Context::background(), "tower").await.unwrap();
    assert_eq!(info.manga.title, "Tower of God");
    assert_eq!(info.manga.authors, ["SIU"]);
    assert_eq!(info.manga.tags, ["Fantasy"]);
    assert_eq!(info.manga.qualified_id().to_string(), "kmg:tower");

    let chapters: Vec<_> = info
        .chapters
        .iter()
        .map(|c| (c.id.as_str(), c.number))
        .collect();
    assert_eq!(
        chapters,
        [("tower/chapter-11", Some(11.0)), ("tower/chapter-12", Some(12.0))]
    );
    let updated = info.last_updated.unwrap();
    assert_eq!(updated.format("%Y-%m-%d").to_string(), "2024-03-03");
    assert_eq!(stub.hits("https://kissmanga.in/manga/tower/ajax/chapters/"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_themed_chapter_prefers_list_view() {
    let stub = Stub::new();
    stub.html("https://kissmanga.in/manga/tower/chapter-12/", KISS_READER);
    let provider = kiss(&stub);

    let chapter = provider
        .get_chapter(&Context::background(), "tower/chapter-12")
        .await
        .unwrap();
    assert_eq!(chapter.manga_id, "tower");
    assert_eq!(chapter.pages.len(), 2);
    assert_eq!(chapter.pages[0].url, "https://cdn.kiss.example/t/12/01.jpg");
    assert_eq!(chapter.pages[1].filename, "02.jpg");

    let reader: Vec<_> = stub
        .requests()
        .into_iter()
        .filter(|r| r.url.starts_with("https://kissmanga.in/manga/"))
        .map(|r| r.url)
        .collect();
    assert_eq!(reader, ["https://kissmanga.in/manga/tower/chapter-12/?style=list"]);
}
