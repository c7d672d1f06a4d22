//! MangaDex, through its public JSON API.
//!
//! Titles, descriptions and tag names are language maps; the best entry is
//! picked in the order en, en-us, ja, ja-ro, then whatever comes first.
//! Authors and covers live in the `relationships` array, which the search
//! and manga endpoints expand with `includes[]`.
//!
//! Page images are served by an "at-home" node returned per chapter:
//! `{baseUrl}/data/{hash}/{file}`, or the data-saver variant when the full
//! quality list is empty.

use crate::error::{Error, Result};
use crate::extract::ExtractorSet;
use crate::net::Query;
use crate::net::json;
use crate::paginate::PaginationConfig;
use crate::provider::{
    ApiConfig, ChapterListConfig, Decoded, Endpoint, HttpPreamble, ProviderConfig, ProviderKind,
    ResponseMapping, ResponseShape,
};
use crate::types::{FilterKey, SearchOptions, SortKey};
use serde_json::Value;
use std::time::Duration;

pub const ID: &str = "mgd";
pub const SITE_URL: &str = "https://mangadex.org";
pub const API_URL: &str = "https://api.mangadex.org";
const COVER_URL: &str = "https://uploads.mangadex.org/covers";

const TITLE_LANGS: [&str; 4] = ["en", "en-us", "ja", "ja-ro"];
const CONTENT_RATINGS: [&str; 4] = ["safe", "suggestive", "erotica", "pornographic"];

/// The API refuses `offset + limit` beyond this.
const MAX_OFFSET: usize = 10_000;

/// Picks the best entry of a language map.
fn best_title(map: &Value) -> Option<String> {
    let map = map.as_object()?;
    TITLE_LANGS
        .iter()
        .filter_map(|lang| map.get(*lang).and_then(Value::as_str))
        .chain(map.values().filter_map(Value::as_str))
        .map(str::trim)
        .find(|title| !title.is_empty())
        .map(String::from)
}

fn title(value: &Value) -> Result<Value> {
    best_title(value)
        .map(Value::String)
        .ok_or_else(|| Error::parse("no usable title"))
}

fn optional_title(value: &Value) -> Result<Value> {
    Ok(best_title(value).map(Value::String).unwrap_or(Value::Null))
}

fn alt_titles(value: &Value) -> Result<Value> {
    let titles: Vec<Value> = value
        .as_array()
        .map(Vec::as_slice)
        .unwrap_or_default()
        .iter()
        .filter_map(best_title)
        .map(Value::String)
        .collect();
    Ok(Value::Array(titles))
}

fn tag_names(value: &Value) -> Result<Value> {
    let names: Vec<Value> = value
        .as_array()
        .map(Vec::as_slice)
        .unwrap_or_default()
        .iter()
        .filter_map(|tag| json::extract_path(tag, "attributes.name"))
        .filter_map(best_title)
        .map(Value::String)
        .collect();
    Ok(Value::Array(names))
}

/// Names of the author and artist relationships, without repeats.
fn creators(value: &Value) -> Result<Value> {
    let mut names: Vec<String> = Vec::new();
    for rel in value.as_array().map(Vec::as_slice).unwrap_or_default() {
        let kind = json::extract_str(rel, "type").unwrap_or_default();
        if kind != "author" && kind != "artist" {
            continue;
        }
        if let Some(name) = json::extract_str(rel, "attributes.name") {
            if !names.iter().any(|n| n == name) {
                names.push(name.to_string());
            }
        }
    }
    Ok(names.into_iter().map(Value::String).collect())
}

fn relationship<'a>(item: &'a Value, kind: &str) -> Option<&'a Value> {
    json::extract_array(item, "relationships")
        .iter()
        .find(|rel| json::extract_str(rel, "type") == Some(kind))
}

/// Cover URL built from the manga id and its cover_art relationship.
fn cover_url(item: &Value) -> Result<Value> {
    let url = json::extract_str(item, "id").and_then(|id| {
        let file = relationship(item, "cover_art")
            .and_then(|rel| json::extract_str(rel, "attributes.fileName"))?;
        Some(format!("{COVER_URL}/{id}/{file}"))
    });
    Ok(url.map(Value::String).unwrap_or(Value::Null))
}

fn manga_of_chapter(item: &Value) -> Result<Value> {
    Ok(relationship(item, "manga")
        .and_then(|rel| json::extract_str(rel, "id"))
        .map(|id| Value::String(id.to_string()))
        .unwrap_or(Value::Null))
}

fn chapter_title(attributes: &Value) -> Result<Value> {
    let title = json::extract_str(attributes, "title").filter(|t| !t.is_empty());
    let number = json::extract_str(attributes, "chapter").filter(|n| !n.is_empty());
    let title = match (title, number) {
        (Some(title), _) => title.to_string(),
        (None, Some(number)) => format!("Chapter {number}"),
        (None, None) => "Oneshot".to_string(),
    };
    Ok(Value::String(title))
}

fn chapter_number(value: &Value) -> Result<Value> {
    Ok(value
        .as_str()
        .and_then(|s| s.trim().parse::<f64>().ok())
        .map(Value::from)
        .unwrap_or(Value::Null))
}

fn non_empty_string(value: &Value) -> Result<Value> {
    Ok(match value.as_str().map(str::trim) {
        Some(s) if !s.is_empty() => Value::String(s.to_string()),
        _ => Value::Null,
    })
}

fn manga_mapping() -> ExtractorSet {
    ExtractorSet::new("mangadex manga")
        .required("id", "id")
        .transform("attributes.title", "title", true, title)
        .transform("attributes.altTitles", "alt_titles", false, alt_titles)
        .transform("attributes.description", "description", false, optional_title)
        .optional("attributes.status", "status")
        .transform("attributes.tags", "tags", false, tag_names)
        .transform("relationships", "authors", false, creators)
        .transform("", "cover_url", false, cover_url)
}

fn chapter_mapping() -> ExtractorSet {
    ExtractorSet::new("mangadex chapter")
        .required("id", "id")
        .transform("attributes", "title", false, chapter_title)
        .transform("attributes.chapter", "number", false, chapter_number)
        .transform("attributes.volume", "volume", false, non_empty_string)
        .optional("attributes.translatedLanguage", "language")
        .optional("attributes.publishAt", "published")
        .transform("", "manga_id", false, manga_of_chapter)
}

fn search_query(options: &SearchOptions) -> Query {
    let mut query = Query::new();
    let text = options.query.trim();
    if !text.is_empty() {
        query.set("title", text);
    }
    for include in ["cover_art", "author", "artist"] {
        query.push("includes[]", include);
    }
    for rating in CONTENT_RATINGS {
        query.push("contentRating[]", rating);
    }
    match options.sort {
        Some(SortKey::Popularity) => query.set("order[followedCount]", "desc"),
        Some(SortKey::Name) => query.set("order[title]", "asc"),
        Some(SortKey::Newest) => query.set("order[createdAt]", "desc"),
        Some(SortKey::Updated) => query.set("order[latestUploadedChapter]", "desc"),
        _ if !text.is_empty() => query.set("order[relevance]", "desc"),
        _ => query.set("order[followedCount]", "desc"),
    }
    if let Some(status) = options.filters.get(&FilterKey::Status) {
        query.push("status[]", status.trim().to_ascii_lowercase());
    }
    query
}

/// Page URLs from an at-home server response.
fn at_home_pages(body: &Value, chapter_id: &str) -> Result<Decoded> {
    let base = json::extract_str(body, "baseUrl")
        .ok_or_else(|| Error::parse("at-home response without baseUrl"))?;
    let hash = json::extract_str(body, "chapter.hash")
        .ok_or_else(|| Error::parse("at-home response without chapter hash"))?;

    let (quality, files) = match json::extract_array(body, "chapter.data") {
        [] => ("data-saver", json::extract_array(body, "chapter.dataSaver")),
        files => ("data", files),
    };
    if files.is_empty() {
        return Err(Error::not_found(format!("chapter '{chapter_id}' has no pages")));
    }

    Ok(Decoded::Pages(
        files
            .iter()
            .filter_map(Value::as_str)
            .map(|file| format!("{base}/{quality}/{hash}/{file}"))
            .collect(),
    ))
}

/// The MangaDex provider table.
pub fn config() -> ProviderConfig {
    let mut feed = Endpoint::get("/manga/{id}/feed", ResponseShape::ChapterList)
        .root("data")
        .param("order[volume]", "asc")
        .param("order[chapter]", "asc");
    for rating in CONTENT_RATINGS {
        feed = feed.param("contentRating[]", rating);
    }

    let api = ApiConfig::new(API_URL)
        .endpoint(
            "search",
            Endpoint::get("/manga", ResponseShape::MangaList)
                .root("data")
                .query_builder(search_query),
        )
        .endpoint(
            "manga",
            Endpoint::get("/manga/{id}", ResponseShape::Manga)
                .root("data")
                .param("includes[]", "cover_art")
                .param("includes[]", "author")
                .param("includes[]", "artist"),
        )
        .endpoint("feed", feed)
        .endpoint(
            "chapter",
            Endpoint::get("/chapter/{id}", ResponseShape::Chapter).root("data"),
        )
        .endpoint(
            "pages",
            Endpoint::get("/at-home/server/{id}", ResponseShape::Pages).postprocess(at_home_pages),
        );

    let mut config = ProviderConfig::new(ID, "MangaDex", SITE_URL, ProviderKind::Api);
    config.description = "Community scanlation library with a public JSON API".to_string();
    config.http = HttpPreamble {
        headers: vec![("Accept".to_string(), "application/json".to_string())],
        rate_limit: Duration::from_millis(250),
        ..Default::default()
    };
    config.api = Some(ApiConfig {
        mapping: ResponseMapping {
            manga: Some(manga_mapping()),
            chapter: Some(chapter_mapping()),
        },
        search_param: "title".to_string(),
        ..api
    });
    config.pagination = PaginationConfig::offset("data", "total")
        .with_limits(20, 100)
        .with_max_items(MAX_OFFSET);
    config.chapter_list = Some(ChapterListConfig {
        endpoint: "feed".to_string(),
        pagination: PaginationConfig::offset("data", "total")
            .with_limits(500, 500)
            .with_max_items(MAX_OFFSET),
        row: None,
    });
    config
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Chapter, ChapterInfo, Manga};
    use serde_json::json;

    fn manga_item() -> Value {
        json!({
            "id": "m-1",
            "type": "manga",
            "attributes": {
                "title": {"ja-ro": "Shingeki no Kyojin", "en": "Attack on Titan"},
                "altTitles": [{"ja": "進撃の巨人"}, {"fr": "  "}],
                "description": {"en": ""},
                "status": "completed",
                "tags": [{"attributes": {"name": {"en": "Action"}}}]
            },
            "relationships": [
                {"type": "author", "attributes": {"name": "Isayama Hajime"}},
                {"type": "artist", "attributes": {"name": "Isayama Hajime"}},
                {"type": "cover_art", "attributes": {"fileName": "c.jpg"}}
            ]
        })
    }

    #[test]
    fn test_manga_mapping() {
        let manga: Manga = manga_mapping().apply(&manga_item()).unwrap();
        assert_eq!(manga.title, "Attack on Titan");
        assert_eq!(manga.alt_titles, ["進撃の巨人"]);
        assert_eq!(manga.description, None);
        assert_eq!(manga.authors, ["Isayama Hajime"]);
        assert_eq!(manga.tags, ["Action"]);
        assert_eq!(manga.status.as_deref(), Some("completed"));
        assert_eq!(
            manga.cover_url.as_deref(),
            Some("https://uploads.mangadex.org/covers/m-1/c.jpg")
        );
    }

    #[test]
    fn test_chapter_mapping() {
        let item = json!({
            "id": "c-9",
            "attributes": {
                "title": null,
                "chapter": "10.5",
                "volume": "",
                "translatedLanguage": "en",
                "publishAt": "2023-04-01T12:00:00+00:00"
            },
            "relationships": [{"type": "manga", "id": "m-1"}]
        });
        let info: ChapterInfo = chapter_mapping().apply(&item).unwrap();
        assert_eq!(info.title, "Chapter 10.5");
        assert_eq!(info.number, Some(10.5));
        assert_eq!(info.volume, None);
        assert_eq!(info.language.as_deref(), Some("en"));
        assert!(info.published.is_some());

        let chapter: Chapter = chapter_mapping().apply(&item).unwrap();
        assert_eq!(chapter.manga_id, "m-1");
    }

    #[test]
    fn test_at_home_falls_back_to_data_saver() {
        let body = json!({
            "baseUrl": "https://node.example",
            "chapter": {"hash": "h", "data": [], "dataSaver": ["1.jpg", "2.jpg"]}
        });
        match at_home_pages(&body, "c").unwrap() {
            Decoded::Pages(urls) => assert_eq!(
                urls,
                [
                    "https://node.example/data-saver/h/1.jpg",
                    "https://node.example/data-saver/h/2.jpg",
                ]
            ),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_search_query() {
        let options = SearchOptions {
            query: "berserk".into(),
            filters: [(FilterKey::Status, "Ongoing".to_string())].into(),
            ..Default::default()
        };
        let query = search_query(&options);
        assert_eq!(query.get("title"), Some("berserk"));
        assert_eq!(query.get("order[relevance]"), Some("desc"));
        assert_eq!(query.get("status[]"), Some("ongoing"));
        assert_eq!(query.iter().filter(|(k, _)| *k == "contentRating[]").count(), 4);

        let listing = search_query(&SearchOptions::default());
        assert_eq!(listing.get("title"), None);
        assert_eq!(listing.get("order[followedCount]"), Some("desc"));
    }

    #[test]
    fn test_config_is_valid() {
        config().validate().unwrap();
    }
}
