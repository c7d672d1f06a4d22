//! Providers for sites running the Madara WordPress manga theme.
//!
//! These sites render like any other scraped site but expose two AJAX
//! helpers the plain [`WebProvider`] does not know about:
//!
//! - `admin-ajax.php` with `action=madara_load_more` renders search result
//!   pages as HTML fragments.
//! - Chapter lists are often not inlined. The manga page carries a
//!   `#manga-chapters-holder` element whose `data-id` is the WordPress post
//!   id, and the list is fetched with a POST to `<manga>/ajax/chapters/`
//!   (newer theme versions) or `admin-ajax.php` with
//!   `action=manga_get_chapters` (older ones).
//!
//! The admin-ajax location itself is discovered from the home page on
//! [`Provider::initialize`].

use super::web::WebProvider;
use super::{Lifecycle, Provider, ProviderConfig};
use crate::context::Context;
use crate::error::{Error, Result, ResultExt};
use crate::net::html::Document;
use crate::net::{Body, HttpClient, Request};
use crate::types::{Chapter, ChapterInfo, Manga, MangaInfo, SearchOptions};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use regex::Regex;
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

static AJAX_URL: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r#""?ajax_?url"?\s*[:=]\s*["']([^"']+admin-ajax\.php)["']"#).ok());
static SCRIPT_MANGA_ID: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"manga_id\s*[=:]\s*['\x22]?(\d+)").ok());

const DEFAULT_AJAX_PATH: &str = "/wp-admin/admin-ajax.php";

/// The admin-ajax URL advertised in a page's inline scripts.
pub fn discover_ajax_url(html: &str) -> Option<String> {
    let caps = AJAX_URL.as_ref()?.captures(html)?;
    Some(caps.get(1)?.as_str().replace("\\/", "/"))
}

/// The WordPress post id of the manga, from the chapter holder or, failing
/// that, from an inline script.
pub fn chapter_holder_id(html: &str) -> Option<String> {
    let from_holder = {
        let doc = Document::parse(html);
        doc.optional("#manga-chapters-holder")
            .and_then(|holder| holder.attr("data-id"))
            .map(str::trim)
            .filter(|id| !id.is_empty() && id.bytes().all(|b| b.is_ascii_digit()))
            .map(String::from)
    };
    from_holder.or_else(|| {
        SCRIPT_MANGA_ID
            .as_ref()?
            .captures(html)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
    })
}

/// A "0" or "-1" body is how admin-ajax reports an unknown action.
fn is_ajax_failure(text: &str) -> bool {
    matches!(text.trim(), "" | "0" | "-1")
}

pub struct ThemedWebProvider {
    web: WebProvider,
    ajax_url: RwLock<String>,
    lifecycle: Lifecycle,
}

impl ThemedWebProvider {
    pub fn new(config: ProviderConfig, client: HttpClient) -> Result<Self> {
        let ajax_url = format!("{}{}", config.site_url.trim_end_matches('/'), DEFAULT_AJAX_PATH);
        Ok(Self {
            web: WebProvider::new(config, client)?,
            ajax_url: RwLock::new(ajax_url),
            lifecycle: Lifecycle::new(),
        })
    }

    fn config(&self) -> &ProviderConfig {
        self.web.config()
    }

    pub fn ajax_url(&self) -> String {
        self.ajax_url.read().clone()
    }

    /// Looks for the theme's ajax endpoint on the home page. Failure keeps
    /// the default location.
    async fn warmup(&self, ctx: &Context) -> Result<()> {
        match self.web.fetch_page(ctx, Request::get(self.site_url())).await {
            Ok((html, base)) => match discover_ajax_url(&html) {
                Some(found) => {
                    let resolved = base.join(&found).map(String::from).unwrap_or(found);
                    debug!(provider = self.id(), ajax_url = %resolved, "ajax endpoint discovered");
                    *self.ajax_url.write() = resolved;
                }
                None => debug!(provider = self.id(), "no ajax endpoint advertised, using default"),
            },
            Err(err) if err.is_cancelled() => return Err(err),
            Err(err) => warn!(provider = self.id(), error = %err, "ajax discovery failed"),
        }
        Ok(())
    }

    fn load_more_form(query: &str, page: usize, per_page: usize) -> Vec<(String, String)> {
        [
            ("action", "madara_load_more".to_string()),
            ("page", (page - 1).to_string()),
            ("template", "madara-core/content/content-search".to_string()),
            ("vars[s]", query.trim().to_string()),
            ("vars[orderby]", String::new()),
            ("vars[paged]", page.to_string()),
            ("vars[template]", "search".to_string()),
            ("vars[post_type]", "wp-manga".to_string()),
            ("vars[post_status]", "publish".to_string()),
            ("vars[meta_query][0][relation]", "AND".to_string()),
            ("vars[posts_per_page]", per_page.to_string()),
            ("vars[numberposts]", per_page.to_string()),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
    }

    async fn ajax_search(
        &self,
        ctx: &Context,
        query: &str,
        options: &SearchOptions,
    ) -> Result<Vec<Manga>> {
        let limit = options.limit.max(1);
        let ajax = self.ajax_url();
        let base = Url::parse(self.site_url())?;
        let mut seen = HashSet::new();
        let mut out = Vec::new();

        for page in 1.. {
            if options.pages != 0 && page > options.pages {
                break;
            }
            let request = Request::post(&ajax).form(Self::load_more_form(query, page, limit));
            let (html, _) = self.web.fetch_page(ctx, request).await?;
            if is_ajax_failure(&html) {
                if page == 1 {
                    return Err(Error::provider(self.id(), "load-more search rejected")
                        .with_context("url", &ajax));
                }
                break;
            }

            let before = out.len();
            out.extend(
                self.web
                    .parse_search(&html, &base)
                    .into_iter()
                    .filter(|m| seen.insert(m.id.clone()))
                    .take(limit),
            );
            if out.len() == before {
                break;
            }
            ctx.sleep(self.throttle()).await?;
        }
        Ok(out)
    }

    /// Chapter rows from an ajax response, which is an HTML fragment or a
    /// JSON envelope whose `data` field holds one.
    async fn ajax_chapters(&self, ctx: &Context, request: Request) -> Result<Vec<ChapterInfo>> {
        let base = Url::parse(self.site_url())?;
        let response = self.client().execute(ctx, request).await?;
        let chapters = match response.sniff()? {
            Body::Json(value) => {
                let html = value
                    .get("data")
                    .and_then(|data| data.as_str())
                    .ok_or_else(|| Error::parse("chapter response has no html data"))?;
                self.web.parse_chapter_list(html, &base)
            }
            Body::Html(text) if is_ajax_failure(text) => Vec::new(),
            Body::Html(text) => self.web.parse_chapter_list(text, &base),
        };
        if chapters.is_empty() {
            return Err(Error::not_found("ajax chapter list is empty"));
        }
        Ok(chapters)
    }

    /// Tries the path-nested endpoint, then admin-ajax.
    async fn fetch_chapter_list(
        &self,
        ctx: &Context,
        manga_id: &str,
        post_id: &str,
    ) -> Result<Vec<ChapterInfo>> {
        let manga_url = self.web.manga_url(manga_id);
        let nested = format!("{}/ajax/chapters/", manga_url.trim_end_matches('/'));
        let request = Request::post(&nested).form(Vec::<(String, String)>::new());
        match self.ajax_chapters(ctx, request).await {
            Ok(chapters) => return Ok(chapters),
            Err(err) if err.is_cancelled() => return Err(err),
            Err(err) => {
                debug!(provider = self.id(), error = %err, "nested chapter endpoint failed")
            }
        }

        let request = Request::post(self.ajax_url())
            .form([("action", "manga_get_chapters"), ("manga", post_id)]);
        self.ajax_chapters(ctx, request)
            .await
            .with_context("post_id", post_id)
    }
}

#[async_trait]
impl Provider for ThemedWebProvider {
    fn id(&self) -> &str {
        &self.config().id
    }

    fn name(&self) -> &str {
        &self.config().name
    }

    fn description(&self) -> &str {
        &self.config().description
    }

    fn site_url(&self) -> &str {
        &self.config().site_url
    }

    fn client(&self) -> &HttpClient {
        self.web.client()
    }

    fn referer(&self) -> Option<&str> {
        Some(self.site_url())
    }

    fn throttle(&self) -> Duration {
        self.config().http.throttle
    }

    async fn initialize(&self, ctx: &Context) -> Result<()> {
        self.lifecycle.ensure(|| self.warmup(ctx)).await
    }

    async fn search(
        &self,
        ctx: &Context,
        query: &str,
        options: &SearchOptions,
    ) -> Result<Vec<Manga>> {
        self.initialize(ctx).await?;
        match self.ajax_search(ctx, query, options).await {
            Ok(found) => Ok(found),
            Err(err) if err.is_cancelled() => Err(err),
            Err(err) => {
                warn!(
                    provider = self.id(),
                    error = %err,
                    "ajax search failed, scraping search page"
                );
                self.web.scrape_search(ctx, query, options).await
            }
        }
    }

    async fn get_manga(&self, ctx: &Context, id: &str) -> Result<MangaInfo> {
        self.initialize(ctx).await?;
        let (html, base) = self
            .web
            .fetch_page(ctx, Request::get(self.web.manga_url(id)))
            .await
            .with_context("manga", id)
            .op("get_manga")?;
        let mut info = self.web.parse_manga(&html, &base, id)?;

        if let Some(post_id) = chapter_holder_id(&html) {
            match self.fetch_chapter_list(ctx, id, &post_id).await {
                Ok(chapters) => {
                    let mut rebuilt = MangaInfo::new(std::mem::take(&mut info.manga), chapters);
                    rebuilt.last_updated = rebuilt
                        .chapters
                        .iter()
                        .filter_map(|c| c.published)
                        .max()
                        .or(info.last_updated);
                    info = rebuilt;
                }
                Err(err) if err.is_cancelled() => return Err(err),
                Err(err) => {
                    debug!(
                        provider = self.id(),
                        manga = id,
                        error = %err,
                        "ajax chapters failed, keeping static list"
                    );
                }
            }
        }
        Ok(info)
    }

    async fn get_chapter(&self, ctx: &Context, id: &str) -> Result<Chapter> {
        self.initialize(ctx).await?;
        self.web.scrape_chapter(ctx, id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discover_ajax_url() {
        let html = r#"<script>var manga = {"ajax_url":"https:\/\/kiss.example\/wp-admin\/admin-ajax.php","nonce":"x"};</script>"#;
        assert_eq!(
            discover_ajax_url(html).as_deref(),
            Some("https://kiss.example/wp-admin/admin-ajax.php")
        );
        let html = r#"<script>var ajaxurl = '/wp-admin/admin-ajax.php';</script>"#;
        assert_eq!(discover_ajax_url(html).as_deref(), Some("/wp-admin/admin-ajax.php"));
        assert_eq!(discover_ajax_url("<p>nothing</p>"), None);
    }

    #[test]
    fn test_chapter_holder_id() {
        assert_eq!(
            chapter_holder_id(r#"<div id="manga-chapters-holder" data-id="4812"></div>"#)
                .as_deref(),
            Some("4812")
        );
        assert_eq!(
            chapter_holder_id(r#"<div id="manga-chapters-holder" data-id="abc"></div>"#),
            None
        );
        assert_eq!(
            chapter_holder_id("<script>var manga_id = '77';</script>").as_deref(),
            Some("77")
        );
    }

    #[test]
    fn test_load_more_form_pages_from_zero() {
        let form = ThemedWebProvider::load_more_form("one piece", 2, 20);
        let get = |key: &str| form.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str());
        assert_eq!(get("action"), Some("madara_load_more"));
        assert_eq!(get("page"), Some("1"));
        assert_eq!(get("vars[paged]"), Some("2"));
        assert_eq!(get("vars[s]"), Some("one piece"));
        assert_eq!(get("vars[posts_per_page]"), Some("20"));
    }

    #[test]
    fn test_ajax_failure_bodies() {
        assert!(is_ajax_failure(" 0 "));
        assert!(is_ajax_failure("-1"));
        assert!(!is_ajax_failure("<div></div>"));
    }
}
