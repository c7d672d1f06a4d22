//! HTML scraping providers.
//!
//! A [`WebProvider`] fetches the site's own pages and reads them through the
//! selector lists of its [`WebConfig`]. Ids are the site paths with one of
//! the configured prefixes stripped, so `/manga/foo/chapter-3/` becomes
//! `foo/chapter-3` and resolves back through the path templates.

use super::{Lifecycle, Provider, ProviderConfig, WebConfig};
use crate::context::Context;
use crate::error::{Error, Result, ResultExt, Sentinel};
use crate::net::html::{Document, Node, extract_number};
use crate::net::{HttpClient, Request};
use crate::types::{Chapter, ChapterInfo, Manga, MangaInfo, SearchOptions};
use async_trait::async_trait;
use chrono::{DateTime, Duration as Age, NaiveDate, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use std::time::Duration;
use tracing::debug;
use url::Url;

static CHAPTER_TEXT: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"(?i)\b(?:chapter|chap|ch|episode|ep)\.?\s*(\d+(?:\.\d+)?)").ok());
static CHAPTER_URL: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"(?i)(?:chapter|chap|ch)[-_](\d+)(?:[-_.](\d+))?").ok());
static VOLUME: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"(?i)\bvol(?:ume)?\.?\s*(\d+)").ok());
static RELATIVE_DATE: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(r"(?i)(\d+)\s*(sec|min|hour|day|week|month|year)\w*\s+ago").ok()
});

/// Attributes that may carry a page image, in priority order.
const IMAGE_ATTRS: [&str; 4] = ["src", "data-src", "data-url", "data-lazy-src"];

/// Chapter number from a title such as "Vol.2 Chapter 12.5".
pub fn chapter_number_from_text(text: &str) -> Option<f64> {
    CHAPTER_TEXT
        .as_ref()?
        .captures(text)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Chapter number from a link such as `/manga/x/chapter-12-5/`.
pub fn chapter_number_from_url(url: &str) -> Option<f64> {
    let caps = CHAPTER_URL.as_ref()?.captures(url)?;
    let whole = caps.get(1)?.as_str();
    match caps.get(2) {
        Some(frac) => format!("{whole}.{}", frac.as_str()).parse().ok(),
        None => whole.parse().ok(),
    }
}

fn volume_from_text(text: &str) -> Option<String> {
    let caps = VOLUME.as_ref()?.captures(text)?;
    let volume: u32 = caps.get(1)?.as_str().parse().ok()?;
    Some(volume.to_string())
}

/// Parses a chapter date with the given chrono formats, also accepting
/// "3 days ago" style stamps. Trailing text after a matched date is ignored.
pub fn parse_date(text: &str, formats: &[String]) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    if let Some(caps) = RELATIVE_DATE.as_ref().and_then(|re| re.captures(text)) {
        return relative_age(caps.get(1)?.as_str(), caps.get(2)?.as_str())
            .and_then(|age| Utc::now().checked_sub_signed(age));
    }
    formats.iter().find_map(|format| {
        NaiveDate::parse_and_remainder(text, format)
            .ok()
            .and_then(|(date, _)| date.and_hms_opt(0, 0, 0))
            .map(|dt| dt.and_utc())
    })
}

/// "3 days ago" as a duration. Counts too large to represent are `None`.
fn relative_age(count: &str, unit: &str) -> Option<Age> {
    let n: i64 = count.parse().ok()?;
    match unit.to_ascii_lowercase().as_str() {
        "sec" => Age::try_seconds(n),
        "min" => Age::try_minutes(n),
        "hour" => Age::try_hours(n),
        "day" => Age::try_days(n),
        "week" => Age::try_weeks(n),
        "month" => Age::try_days(n.checked_mul(30)?),
        _ => Age::try_days(n.checked_mul(365)?),
    }
}

fn is_placeholder(value: &str) -> bool {
    let lower = value.to_ascii_lowercase();
    lower.starts_with("data:") || lower.contains("placeholder") || lower.contains("loading")
}

fn is_url(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}

/// Turns free text into the slug form some sites expect in search paths.
fn slugify(query: &str, separator: char) -> String {
    let mut out = String::with_capacity(query.len());
    for c in query.trim().chars() {
        if c.is_alphanumeric() {
            out.extend(c.to_lowercase());
        } else if !out.is_empty() && !out.ends_with(separator) {
            out.push(separator);
        }
    }
    out.trim_end_matches(separator).to_string()
}

pub struct WebProvider {
    config: ProviderConfig,
    web: WebConfig,
    site: Url,
    client: HttpClient,
    lifecycle: Lifecycle,
}

impl WebProvider {
    pub fn new(config: ProviderConfig, client: HttpClient) -> Result<Self> {
        let web = config
            .web
            .clone()
            .ok_or_else(|| Error::provider(&config.id, "web selectors not configured"))?;
        let site = Url::parse(&config.site_url).with_context("provider", &config.id)?;
        Ok(Self {
            config,
            web,
            site,
            client,
            lifecycle: Lifecycle::new(),
        })
    }

    pub(crate) fn config(&self) -> &ProviderConfig {
        &self.config
    }

    fn absolute(&self, path: &str) -> String {
        if is_url(path) {
            return path.to_string();
        }
        format!(
            "{}/{}",
            self.config.site_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    /// The listing URL for one page of a search. An empty query uses the
    /// list path when the site has one.
    pub fn search_url(&self, query: &str, page: usize) -> String {
        let template = match (&self.web.list_path, query.trim().is_empty()) {
            (Some(list), true) => list.as_str(),
            _ => self.web.search_path.as_str(),
        };
        let query = match self.web.query_separator {
            Some(sep) => slugify(query, sep),
            None => urlencoding::encode(query.trim()).into_owned(),
        };
        self.absolute(
            &template
                .replace("{query}", &query)
                .replace("{page}", &page.to_string()),
        )
    }

    /// Ids that are full URLs (links to a foreign host) are used as-is.
    pub fn manga_url(&self, id: &str) -> String {
        if is_url(id) {
            return id.to_string();
        }
        self.absolute(&self.web.manga_path.replace("{id}", id))
    }

    pub fn chapter_url(&self, id: &str) -> String {
        if is_url(id) {
            return id.to_string();
        }
        self.absolute(&self.web.chapter_path.replace("{id}", id))
    }

    /// The provider-local id of a link: same-site links lose the site, one
    /// known path prefix, the query and the fragment. Foreign links keep
    /// their full URL.
    pub fn local_id(&self, href: &str) -> Option<String> {
        let url = self.site.join(href.trim()).ok()?;
        if url.host_str() != self.site.host_str() {
            return Some(url.to_string());
        }
        let path = url.path();
        let path = self
            .web
            .path_prefixes
            .iter()
            .find_map(|prefix| path.strip_prefix(prefix.as_str()))
            .unwrap_or(path);
        let id = path.trim_matches('/');
        (!id.is_empty()).then(|| id.to_string())
    }

    /// The manga a chapter id belongs to, by dropping its last segment.
    pub fn manga_id_of(chapter_id: &str) -> String {
        chapter_id
            .trim_end_matches('/')
            .rsplit_once('/')
            .map(|(manga, _)| manga.to_string())
            .unwrap_or_default()
    }

    pub(crate) async fn fetch_page(
        &self,
        ctx: &Context,
        request: Request,
    ) -> Result<(String, Url)> {
        let response = self.client.execute(ctx, request).await?;
        Ok((response.text().to_string(), response.url.clone()))
    }

    pub(crate) fn parse_search(&self, html: &str, base: &Url) -> Vec<Manga> {
        let doc = Document::parse(html).with_base(base.clone());
        let mut seen = HashSet::new();
        doc.all_of(&self.web.selectors.search)
            .into_iter()
            .filter_map(|anchor| {
                let link = if anchor.name() == "a" {
                    anchor
                } else {
                    anchor.select_first("a")?
                };
                let id = self.local_id(&link.href()?)?;
                let title = Some(link.text())
                    .filter(|t| !t.is_empty())
                    .or_else(|| link.attr("title").map(|t| t.trim().to_string()))?;
                if !seen.insert(id.clone()) {
                    return None;
                }
                let mut manga = Manga::new(id, title, &self.config.id);
                manga.cover_url = link.select_first("img").and_then(|img| img.src());
                Some(manga)
            })
            .collect()
    }

    pub(crate) fn parse_manga(&self, html: &str, base: &Url, id: &str) -> Result<MangaInfo> {
        let doc = Document::parse(html).with_base(base.clone());
        let selectors = &self.web.selectors;

        let title = doc.text_of(&selectors.title).ok_or_else(|| {
            Error::parse("manga title not found")
                .with_context("provider", &self.config.id)
                .with_context("manga", id)
        })?;

        let mut manga = Manga::new(id, title, &self.config.id);
        manga.alt_titles = doc
            .texts_of(&selectors.alt_titles)
            .iter()
            .flat_map(|t| t.split([';', ',']))
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();
        manga.description = doc.text_of(&selectors.description);
        manga.authors = doc.texts_of(&selectors.authors);
        manga.tags = doc.texts_of(&selectors.tags);
        manga.status = doc.text_of(&selectors.status);
        manga.cover_url = doc.first_of(&selectors.cover).and_then(|img| img.src());

        let chapters = self.parse_chapter_rows(&doc);
        let last_updated = chapters.iter().filter_map(|c| c.published).max();
        let mut info = MangaInfo::new(manga, chapters);
        info.last_updated = last_updated;
        Ok(info)
    }

    /// Chapter rows of a manga page or an ajax fragment.
    pub(crate) fn parse_chapter_list(&self, html: &str, base: &Url) -> Vec<ChapterInfo> {
        let doc = Document::parse(html).with_base(base.clone());
        self.parse_chapter_rows(&doc)
    }

    /// Rows are listed newest first, so they are read bottom up and the
    /// appearance position is the fallback chapter number.
    fn parse_chapter_rows(&self, doc: &Document) -> Vec<ChapterInfo> {
        let rows = doc.all_of(&self.web.selectors.chapters);
        rows.iter()
            .rev()
            .enumerate()
            .filter_map(|(position, row)| self.parse_chapter_row(row, position))
            .collect()
    }

    fn parse_chapter_row(&self, row: &Node<'_>, position: usize) -> Option<ChapterInfo> {
        let link = if row.name() == "a" {
            *row
        } else {
            row.select_first("a")?
        };
        let href = link.href()?;
        let id = self.local_id(&href)?;
        let title = link.text();

        let number = chapter_number_from_text(&title)
            .or_else(|| chapter_number_from_url(&href))
            .or_else(|| extract_number(&title))
            .or(Some((position + 1) as f64));

        let published = self.web.selectors.dates.iter().find_map(|css| {
            let node = row.select_first(css)?;
            node.attr("title")
                .and_then(|t| parse_date(t, &self.web.date_formats))
                .or_else(|| parse_date(&node.text(), &self.web.date_formats))
        });

        Some(ChapterInfo {
            id,
            volume: volume_from_text(&title),
            title,
            number,
            language: None,
            published,
        })
    }

    /// Page image URLs in reading order, placeholders and repeats dropped.
    pub(crate) fn parse_pages(&self, html: &str, base: &Url) -> Vec<String> {
        let doc = Document::parse(html).with_base(base.clone());
        let mut seen = HashSet::new();
        doc.all_of(&self.web.selectors.pages)
            .into_iter()
            .filter_map(|img| {
                IMAGE_ATTRS
                    .iter()
                    .filter_map(|name| img.attr(name))
                    .map(str::trim)
                    .find(|value| !value.is_empty() && !is_placeholder(value))
                    .and_then(|value| img.resolve(value))
            })
            .filter(|url| seen.insert(url.clone()))
            .collect()
    }

    pub(crate) async fn scrape_search(
        &self,
        ctx: &Context,
        query: &str,
        options: &SearchOptions,
    ) -> Result<Vec<Manga>> {
        let paged = self.web.search_path.contains("{page}")
            || (query.trim().is_empty()
                && self.web.list_path.as_deref().is_some_and(|p| p.contains("{page}")));
        let limit = options.limit.max(1);
        let mut seen = HashSet::new();
        let mut out = Vec::new();

        for page in 1.. {
            if options.pages != 0 && page > options.pages {
                break;
            }
            let url = self.search_url(query, page);
            let (html, base) = match self.fetch_page(ctx, Request::get(&url)).await {
                Ok(fetched) => fetched,
                Err(err) if page > 1 && err.is(Sentinel::NotFound) => break,
                Err(err) => return Err(err.with_context("page", page).op("search")),
            };

            let before = out.len();
            out.extend(
                self.parse_search(&html, &base)
                    .into_iter()
                    .filter(|m| seen.insert(m.id.clone()))
                    .take(limit),
            );
            debug!(provider = %self.config.id, page, found = out.len() - before, "search page");

            if out.len() == before || !paged {
                break;
            }
            ctx.sleep(self.config.http.throttle).await?;
        }
        Ok(out)
    }

    pub(crate) async fn scrape_manga(&self, ctx: &Context, id: &str) -> Result<MangaInfo> {
        let (html, base) = self
            .fetch_page(ctx, Request::get(self.manga_url(id)))
            .await
            .with_context("manga", id)
            .op("get_manga")?;
        self.parse_manga(&html, &base, id)
    }

    pub(crate) async fn scrape_chapter(&self, ctx: &Context, id: &str) -> Result<Chapter> {
        let url = self.chapter_url(id);
        let mut fetched = None;
        if self.web.list_style {
            match self
                .fetch_page(ctx, Request::get(&url).param("style", "list"))
                .await
            {
                Ok(page) => fetched = Some(page),
                Err(err) if err.is_cancelled() => return Err(err),
                Err(err) => debug!(chapter = id, error = %err, "list view failed, using bare url"),
            }
        }
        let (html, base) = match fetched {
            Some(page) => page,
            None => self
                .fetch_page(ctx, Request::get(&url))
                .await
                .with_context("chapter", id)
                .op("get_chapter")?,
        };

        let urls = self.parse_pages(&html, &base);
        if urls.is_empty() {
            return Err(Error::not_found(format!("no pages found for chapter '{id}'"))
                .with_context("provider", &self.config.id)
                .op("get_chapter"));
        }

        let info = ChapterInfo {
            id: id.to_string(),
            number: chapter_number_from_url(id),
            ..Default::default()
        };
        Ok(Chapter::with_page_urls(info, Self::manga_id_of(id), urls))
    }
}

#[async_trait]
impl Provider for WebProvider {
    fn id(&self) -> &str {
        &self.config.id
    }

    fn name(&self) -> &str {
        &self.config.name
    }

    fn description(&self) -> &str {
        &self.config.description
    }

    fn site_url(&self) -> &str {
        &self.config.site_url
    }

    fn client(&self) -> &HttpClient {
        &self.client
    }

    fn referer(&self) -> Option<&str> {
        Some(&self.config.site_url)
    }

    fn throttle(&self) -> Duration {
        self.config.http.throttle
    }

    async fn initialize(&self, ctx: &Context) -> Result<()> {
        self.lifecycle.ensure(|| async { ctx.check() }).await
    }

    async fn search(
        &self,
        ctx: &Context,
        query: &str,
        options: &SearchOptions,
    ) -> Result<Vec<Manga>> {
        self.initialize(ctx).await?;
        self.scrape_search(ctx, query, options).await
    }

    async fn get_manga(&self, ctx: &Context, id: &str) -> Result<MangaInfo> {
        self.initialize(ctx).await?;
        self.scrape_manga(ctx, id).await
    }

    async fn get_chapter(&self, ctx: &Context, id: &str) -> Result<Chapter> {
        self.initialize(ctx).await?;
        self.scrape_chapter(ctx, id).await
    }
}
