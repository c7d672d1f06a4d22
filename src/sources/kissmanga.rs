//! KissManga, a site on the Madara WordPress theme.

use crate::provider::{HttpPreamble, ProviderConfig, ProviderKind, Selectors, WebConfig, selectors};
use std::time::Duration;

pub const ID: &str = "kmg";
pub const SITE_URL: &str = "https://kissmanga.in";

const BROWSER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                             (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

pub fn config() -> ProviderConfig {
    let mut config = ProviderConfig::new(ID, "KissManga", SITE_URL, ProviderKind::ThemedWeb);
    config.description = "Madara-themed reader with a broad English catalogue".to_string();
    config.http = HttpPreamble {
        headers: vec![
            ("User-Agent".to_string(), BROWSER_AGENT.to_string()),
            (
                "Accept".to_string(),
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8".to_string(),
            ),
            ("Accept-Language".to_string(), "en-US,en;q=0.9".to_string()),
            ("Cache-Control".to_string(), "no-cache".to_string()),
            ("Referer".to_string(), format!("{SITE_URL}/")),
        ],
        rate_limit: Duration::from_secs(2),
        ..Default::default()
    };
    config.web = Some(WebConfig {
        search_path: "/page/{page}/?s={query}&post_type=wp-manga".to_string(),
        manga_path: "/manga/{id}/".to_string(),
        chapter_path: "/manga/{id}/".to_string(),
        path_prefixes: selectors(&["/manga/", "/kissmanga/"]),
        list_style: true,
        selectors: Selectors {
            search: selectors(&["div.post-title h3 a", "div.post-title h5 a", ".post-title a"]),
            title: selectors(&["div.post-title h1", ".post-title h1", "h1"]),
            alt_titles: selectors(&[
                ".post-content_item:nth-of-type(4) .summary-content",
                ".manga-alternative .summary-content",
            ]),
            description: selectors(&[
                "div.description-summary div.summary__content",
                "div.summary_content div.post-content_item > h5 + div",
                ".manga-excerpt",
            ]),
            chapters: selectors(&[
                "li.wp-manga-chapter",
                ".wp-manga-chapter",
                "ul.main li",
                ".chapter-list li",
            ]),
            pages: selectors(&[
                "div.page-break img",
                ".reading-content img",
                ".wp-manga-chapter-img",
            ]),
            authors: selectors(&["div.author-content a", ".author-content a"]),
            tags: selectors(&["div.genres-content a", ".genres-content a"]),
            status: selectors(&["div.post-status div.summary-content"]),
            dates: selectors(&["span.chapter-release-date i", "span.chapter-release-date"]),
            cover: selectors(&[".summary_image img", ".tab-thumb img"]),
        },
        ..Default::default()
    });
    config
}
