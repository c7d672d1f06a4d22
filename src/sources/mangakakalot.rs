//! MangaKakalot, a MangaBox-family site scraped from its HTML pages.
//!
//! Search takes the query as a slug (`one_piece`) in the path. Listing
//! everything walks the "all genres, latest" view.

use crate::provider::{HttpPreamble, ProviderConfig, ProviderKind, Selectors, WebConfig, selectors};
use std::time::Duration;

pub const ID: &str = "mkk";
pub const SITE_URL: &str = "https://www.mangakakalot.gg";

pub fn config() -> ProviderConfig {
    let mut config = ProviderConfig::new(ID, "MangaKakalot", SITE_URL, ProviderKind::Web);
    config.description = "Large MangaBox catalogue of scanlated manga".to_string();
    config.http = HttpPreamble {
        headers: vec![
            (
                "Accept".to_string(),
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8".to_string(),
            ),
            ("Referer".to_string(), format!("{SITE_URL}/")),
        ],
        rate_limit: Duration::from_millis(500),
        throttle: Duration::from_millis(250),
        ..Default::default()
    };

    let mut web = WebConfig {
        search_path: "/search/story/{query}?page={page}".to_string(),
        list_path: Some("/genre/all?filter=4&page={page}".to_string()),
        manga_path: "/manga/{id}".to_string(),
        chapter_path: "/manga/{id}".to_string(),
        path_prefixes: selectors(&["/manga/"]),
        query_separator: Some('_'),
        selectors: Selectors {
            search: selectors(&[
                ".panel_story_list .story_item .story_name a",
                ".story_item h3 a",
                ".list-truyen-item-wrap h3 a",
            ]),
            title: selectors(&["div.manga-info-top h1", "div.panel-story-info h1"]),
            alt_titles: selectors(&["div.manga-info-top h2.story-alternative"]),
            description: selectors(&["div#contentBox", "div#panel-story-info-description"]),
            chapters: selectors(&["div.chapter-list div.row", "ul.row-content-chapter li"]),
            pages: selectors(&["div.container-chapter-reader > img"]),
            authors: selectors(&[
                "div.manga-info-top a[href*='/author/']",
                "td.table-value a[href*='/author/']",
            ]),
            tags: selectors(&[
                "div.manga-info-top a[href*='/genre/']",
                "td.table-value a[href*='/genre/']",
            ]),
            dates: selectors(&["span[title]"]),
            cover: selectors(&["div.manga-info-pic img", "span.info-image img"]),
            ..Default::default()
        },
        ..Default::default()
    };
    web.date_formats.insert(0, "%b-%d-%Y %H:%M".to_string());
    config.web = Some(web);
    config
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::HttpClient;
    use crate::provider::web::WebProvider;
    use url::Url;

    #[test]
    fn test_search_url_uses_slug() {
        let provider = WebProvider::new(config(), HttpClient::new()).unwrap();
        assert_eq!(
            provider.search_url("Kimetsu no Yaiba", 1),
            "https://www.mangakakalot.gg/search/story/kimetsu_no_yaiba?page=1"
        );
        assert_eq!(
            provider.search_url("", 3),
            "https://www.mangakakalot.gg/genre/all?filter=4&page=3"
        );
    }

    #[test]
    fn test_parses_manga_page() {
        let provider = WebProvider::new(config(), HttpClient::new()).unwrap();
        let html = r#"
            <div class="manga-info-top">
                <h1>Naruto</h1>
                <a href="/author/kishimoto">Kishimoto Masashi</a>
                <a href="/genre/action">Action</a>
            </div>
            <div id="contentBox">Ninja story.</div>
            <div class="chapter-list">
                <div class="row"><span><a href="https://www.mangakakalot.gg/manga/naruto/chapter-700-5">Chapter 700.5</a></span><span title="Nov-10-2014 09:00">10 years ago</span></div>
                <div class="row"><span><a href="https://www.mangakakalot.gg/manga/naruto/chapter-1">Vol.1 Chapter 1: Uzumaki</a></span><span title="Jan-02-2010 09:00">Jan-02-2010</span></div>
            </div>
        "#;
        let base = Url::parse("https://www.mangakakalot.gg/manga/naruto").unwrap();
        let info = provider.parse_manga(html, &base, "naruto").unwrap();

        assert_eq!(info.manga.authors, ["Kishimoto Masashi"]);
        assert_eq!(info.manga.tags, ["Action"]);
        assert_eq!(info.chapters.len(), 2);
        assert_eq!(info.chapters[0].id, "naruto/chapter-1");
        assert_eq!(info.chapters[0].volume.as_deref(), Some("1"));
        assert_eq!(info.chapters[1].number, Some(700.5));
        let published = info.chapters[0].published.unwrap();
        assert_eq!(published.format("%Y-%m-%d").to_string(), "2010-01-02");
    }
}
