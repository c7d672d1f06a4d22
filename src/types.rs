//! Core data types for manga, chapters, pages and search options.
//!
//! This module defines the records every provider produces:
//!
//! - [`Manga`] - A summary record returned by searches
//! - [`MangaInfo`] - A manga with its chapter list, returned by `get_manga`
//! - [`ChapterInfo`] - One entry of a chapter list
//! - [`Chapter`] - A chapter with its pages, returned by `get_chapter`
//! - [`Page`] - A single image of a chapter
//! - [`QualifiedId`] - The `<provider>:<id>` form used at the system boundary
//! - [`SearchOptions`] - Query, paging, sort and filter settings
//!
//! Records form a tree. A chapter refers to its manga by id only.
//!
//! # Examples
//!
//! ```rust
//! use hondana::types::{Manga, QualifiedId};
//!
//! let manga = Manga::new("abc-123", "One Piece", "mgd");
//! let qid: QualifiedId = manga.qualified_id().to_string().parse().unwrap();
//! assert_eq!(qid.provider, "mgd");
//! assert_eq!(qid.local, "abc-123");
//! ```

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// A manga summary as extracted from a provider response.
///
/// # Fields
///
/// * `id` - Identifier local to the provider
/// * `title` - Display title
/// * `alt_titles` - Alternative titles in provider order
/// * `authors` - Author names
/// * `tags` - Genres and tags
/// * `status` - Publication status as reported by the provider
/// * `description` - Plot summary
/// * `cover_url` - Absolute URL of the cover image
/// * `provider_id` - Short id of the provider this record came from
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Manga {
    /// Identifier local to the provider
    pub id: String,

    /// Display title
    pub title: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub alt_titles: Vec<String>,

    #[serde(default)]
    pub authors: Vec<String>,

    #[serde(default)]
    pub tags: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_url: Option<String>,

    /// Provider this manga came from
    #[serde(default)]
    pub provider_id: String,
}

impl Manga {
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        provider_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            provider_id: provider_id.into(),
            ..Default::default()
        }
    }

    pub fn qualified_id(&self) -> QualifiedId {
        QualifiedId::new(&self.provider_id, &self.id)
    }
}

/// A manga together with its chapter list.
///
/// The chapters are sorted by ascending chapter number. Chapters without a
/// number follow the numbered ones in the order the provider listed them.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MangaInfo {
    #[serde(flatten)]
    pub manga: Manga,

    #[serde(default)]
    pub chapters: Vec<ChapterInfo>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub languages: Vec<String>,
}

impl MangaInfo {
    pub fn new(manga: Manga, mut chapters: Vec<ChapterInfo>) -> Self {
        sort_chapters(&mut chapters);
        let languages = collect_languages(&chapters);
        Self {
            manga,
            chapters,
            last_updated: None,
            languages,
        }
    }

    /// Keeps only chapters in one of `languages` (case-insensitive).
    ///
    /// Chapters that carry no language code are kept. An empty filter keeps
    /// everything.
    pub fn retain_languages(&mut self, languages: &[String]) {
        if languages.is_empty() {
            return;
        }
        self.chapters.retain(|chapter| match &chapter.language {
            Some(lang) => languages.iter().any(|l| l.eq_ignore_ascii_case(lang)),
            None => true,
        });
        self.languages = collect_languages(&self.chapters);
    }
}

fn collect_languages(chapters: &[ChapterInfo]) -> Vec<String> {
    let mut languages: Vec<String> = Vec::new();
    for lang in chapters.iter().filter_map(|c| c.language.as_ref()) {
        if !languages.contains(lang) {
            languages.push(lang.clone());
        }
    }
    languages
}

/// One entry in a manga's chapter list.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ChapterInfo {
    /// Identifier resolvable by the same provider's `get_chapter`
    pub id: String,

    #[serde(default)]
    pub title: String,

    /// Chapter number, fractional for extras such as 5.5
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<String>,

    /// Language code such as "en"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published: Option<DateTime<Utc>>,
}

/// Sorts chapters by ascending number, unnumbered ones last in source order.
pub fn sort_chapters(chapters: &mut [ChapterInfo]) {
    // `sort_by` is stable, which keeps unnumbered chapters in source order.
    chapters.sort_by(|a, b| match (a.number, b.number) {
        (Some(x), Some(y)) => x.total_cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    });
}

/// A chapter with its ordered pages.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Chapter {
    #[serde(flatten)]
    pub info: ChapterInfo,

    /// Parent manga id, empty when the provider does not expose it
    #[serde(default)]
    pub manga_id: String,

    #[serde(default)]
    pub pages: Vec<Page>,
}

impl Chapter {
    /// Builds a chapter from page URLs, numbering pages by position.
    pub fn with_page_urls<I, S>(info: ChapterInfo, manga_id: impl Into<String>, urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let pages = urls
            .into_iter()
            .enumerate()
            .map(|(index, url)| Page::new(index, url))
            .collect();
        Self {
            info,
            manga_id: manga_id.into(),
            pages,
        }
    }
}

/// A single page image.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Page {
    /// Zero-based position within the chapter
    pub index: usize,
    pub url: String,
    /// File name as served by the source, used for the extension
    #[serde(default)]
    pub filename: String,
}

impl Page {
    pub fn new(index: usize, url: impl Into<String>) -> Self {
        let url = url.into();
        let filename = url
            .split(['?', '#'])
            .next()
            .and_then(|path| path.rsplit('/').next())
            .unwrap_or_default()
            .to_string();
        Self {
            index,
            url,
            filename,
        }
    }
}

/// An identifier qualified by the provider it belongs to.
///
/// The textual form is `<provider>:<local-id>`. Only the first colon
/// separates, so local ids may contain colons themselves.
///
/// ```rust
/// use hondana::types::QualifiedId;
///
/// let qid: QualifiedId = "mgd:abc:def".parse().unwrap();
/// assert_eq!(qid.provider, "mgd");
/// assert_eq!(qid.local, "abc:def");
/// assert!("mgd".parse::<QualifiedId>().is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QualifiedId {
    pub provider: String,
    pub local: String,
}

impl QualifiedId {
    pub fn new(provider: impl Into<String>, local: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            local: local.into(),
        }
    }
}

impl FromStr for QualifiedId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.split_once(':') {
            Some((provider, local)) if !provider.is_empty() && !local.is_empty() => {
                Ok(Self::new(provider, local))
            }
            _ => Err(Error::parse(format!(
                "invalid id '{s}', expected <provider>:<id>"
            ))),
        }
    }
}

impl fmt::Display for QualifiedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.provider, self.local)
    }
}

/// How search results are ordered.
///
/// Providers translate the key into their own sort parameter where they
/// have one; [`SearchResultExt::sort_by_key`](crate::search::SearchResultExt)
/// applies it locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortKey {
    Relevance,
    Popularity,
    Name,
    Newest,
    Updated,
    Author,
    Status,
}

impl FromStr for SortKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "relevance" => Ok(Self::Relevance),
            "popularity" | "popular" => Ok(Self::Popularity),
            "name" | "title" => Ok(Self::Name),
            "newest" | "new" => Ok(Self::Newest),
            "updated" | "latest" => Ok(Self::Updated),
            "author" => Ok(Self::Author),
            "status" => Ok(Self::Status),
            other => Err(Error::parse(format!("unknown sort key '{other}'"))),
        }
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Relevance => "relevance",
            Self::Popularity => "popularity",
            Self::Name => "name",
            Self::Newest => "newest",
            Self::Updated => "updated",
            Self::Author => "author",
            Self::Status => "status",
        };
        f.write_str(s)
    }
}

/// Recognized filter keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterKey {
    Author,
    Genre,
    Status,
    Title,
    Tag,
}

impl FromStr for FilterKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "author" => Ok(Self::Author),
            "genre" => Ok(Self::Genre),
            "status" => Ok(Self::Status),
            "title" => Ok(Self::Title),
            "tag" => Ok(Self::Tag),
            other => Err(Error::parse(format!("unknown filter key '{other}'"))),
        }
    }
}

/// Parses `k=v[,k=v]` into a filter map.
pub fn parse_filters(spec: &str) -> Result<BTreeMap<FilterKey, String>> {
    let mut filters = BTreeMap::new();
    for pair in spec.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| Error::parse(format!("filter '{pair}' is not key=value")))?;
        filters.insert(key.parse()?, value.trim().to_string());
    }
    Ok(filters)
}

/// Search settings shared by every provider.
///
/// The builder is generated by `derive_builder`:
///
/// ```rust
/// use hondana::types::{SearchOptionsBuilder, SortKey};
///
/// let options = SearchOptionsBuilder::default()
///     .query("one piece")
///     .limit(20usize)
///     .sort(Some(SortKey::Updated))
///     .build()
///     .unwrap();
/// assert_eq!(options.pages, 1);
/// ```
#[derive(Debug, Clone, PartialEq, Builder)]
#[builder(setter(into))]
pub struct SearchOptions {
    /// Search text; empty lists everything
    #[builder(default)]
    pub query: String,

    /// Results per page
    #[builder(default = "20")]
    pub limit: usize,

    /// Number of pages to fetch; zero means no cap
    #[builder(default = "1")]
    pub pages: usize,

    #[builder(default)]
    pub sort: Option<SortKey>,

    #[builder(default)]
    pub filters: BTreeMap<FilterKey, String>,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            query: String::new(),
            limit: 20,
            pages: 1,
            sort: None,
            filters: BTreeMap::new(),
        }
    }
}

impl From<&str> for SearchOptions {
    fn from(query: &str) -> Self {
        Self {
            query: query.to_string(),
            ..Default::default()
        }
    }
}

impl From<String> for SearchOptions {
    fn from(query: String) -> Self {
        Self {
            query,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chapter(id: &str, number: Option<f64>) -> ChapterInfo {
        ChapterInfo {
            id: id.to_string(),
            number,
            ..Default::default()
        }
    }

    #[test]
    fn test_qualified_id_parsing() {
        let qid: QualifiedId = "mgd:abc-123".parse().unwrap();
        assert_eq!(qid, QualifiedId::new("mgd", "abc-123"));

        assert!("mgd".parse::<QualifiedId>().is_err());
        assert!(":abc".parse::<QualifiedId>().is_err());
        assert!("mgd:".parse::<QualifiedId>().is_err());

        let nested: QualifiedId = "mgd:abc:def".parse().unwrap();
        assert_eq!(nested.local, "abc:def");
    }

    #[test]
    fn test_qualified_id_round_trip() {
        for (provider, local) in [("mgd", "x"), ("kmg", "a/b:c"), ("mkk", "manga-aa951409")] {
            let formatted = QualifiedId::new(provider, local).to_string();
            let parsed: QualifiedId = formatted.parse().unwrap();
            assert_eq!(parsed.provider, provider);
            assert_eq!(parsed.local, local);
        }
    }

    #[test]
    fn test_chapter_sorting_keeps_unnumbered_last_in_order() {
        let mut chapters = vec![
            chapter("x", None),
            chapter("c3", Some(3.0)),
            chapter("y", None),
            chapter("c1", Some(1.0)),
            chapter("c1.5", Some(1.5)),
        ];
        sort_chapters(&mut chapters);
        let ids: Vec<_> = chapters.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, ["c1", "c1.5", "c3", "x", "y"]);
    }

    #[test]
    fn test_page_filename_from_url() {
        let page = Page::new(0, "https://cdn.example.com/data/abc/x1-page.png?token=1");
        assert_eq!(page.filename, "x1-page.png");
    }

    #[test]
    fn test_retain_languages() {
        let mut info = MangaInfo::new(
            Manga::new("m", "M", "mgd"),
            vec![
                ChapterInfo {
                    language: Some("en".into()),
                    ..chapter("a", Some(1.0))
                },
                ChapterInfo {
                    language: Some("fr".into()),
                    ..chapter("b", Some(2.0))
                },
                chapter("c", Some(3.0)),
            ],
        );
        assert_eq!(info.languages, ["en", "fr"]);

        info.retain_languages(&["EN".to_string()]);
        let ids: Vec<_> = info.chapters.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, ["a", "c"]);
        assert_eq!(info.languages, ["en"]);
    }

    #[test]
    fn test_parse_filters() {
        let filters = parse_filters("author=oda, status=Ongoing").unwrap();
        assert_eq!(filters.get(&FilterKey::Author).unwrap(), "oda");
        assert_eq!(filters.get(&FilterKey::Status).unwrap(), "Ongoing");
        assert!(parse_filters("colour=red").is_err());
        assert!(parse_filters("author").is_err());
    }

    #[test]
    fn test_sort_key_aliases() {
        assert_eq!("title".parse::<SortKey>().unwrap(), SortKey::Name);
        assert_eq!("Updated".parse::<SortKey>().unwrap(), SortKey::Updated);
        assert!("random".parse::<SortKey>().is_err());
    }
}
