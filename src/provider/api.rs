//! JSON API providers.
//!
//! An [`ApiProvider`] runs entirely off its [`ApiConfig`]: operations pick a
//! named endpoint, render its path, build the query, and decode the body
//! through the endpoint's post-processor or the configured extractor sets.
//!
//! Endpoint names the provider looks up:
//!
//! | Name       | Used by        | Default decoding                            |
//! |------------|----------------|---------------------------------------------|
//! | `search`   | `search`       | paginated, items through `mapping.manga`    |
//! | `manga`    | `get_manga`    | record at `root` through `mapping.manga`    |
//! | `chapter`  | `get_chapter`  | record at `root` through `mapping.chapter`  |
//! | `pages`    | `get_chapter`  | string array at `root`                      |
//!
//! The chapter list comes from the endpoint named by the config's
//! [`ChapterListConfig`](super::ChapterListConfig) and is always paginated.

use super::{
    ApiConfig, Decoded, Endpoint, Lifecycle, Provider, ProviderConfig, ResponseShape,
};
use crate::context::Context;
use crate::error::{Error, Result, ResultExt};
use crate::extract::{self, ExtractorSet};
use crate::net::{HttpClient, Query, Request};
use crate::paginate::Paginator;
use crate::types::{Chapter, ChapterInfo, Manga, MangaInfo, Page, SearchOptions, sort_chapters};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

pub struct ApiProvider {
    config: ProviderConfig,
    api: ApiConfig,
    client: HttpClient,
    lifecycle: Lifecycle,
}

impl ApiProvider {
    pub fn new(config: ProviderConfig, client: HttpClient) -> Result<Self> {
        let api = config
            .api
            .clone()
            .ok_or_else(|| Error::provider(&config.id, "API endpoint table not configured"))?;
        Ok(Self {
            config,
            api,
            client,
            lifecycle: Lifecycle::new(),
        })
    }

    fn endpoint(&self, name: &str) -> Result<&Endpoint> {
        self.api.endpoints.get(name).ok_or_else(|| {
            Error::provider(&self.config.id, format!("endpoint '{name}' not configured"))
        })
    }

    fn request(&self, endpoint: &Endpoint, id: &str, options: Option<&SearchOptions>) -> Request {
        let url = format!(
            "{}{}",
            self.api.base_url.trim_end_matches('/'),
            endpoint.render(id)
        );
        let mut request = Request::new(endpoint.method, url).query(endpoint.query.clone());
        if let Some(options) = options {
            let query = match &endpoint.query_builder {
                Some(builder) => builder(options),
                None => self.default_query(options),
            };
            request = request.query(query);
        }
        request
    }

    /// Search text plus sort, used when the endpoint has no query builder.
    fn default_query(&self, options: &SearchOptions) -> Query {
        let mut query = Query::new();
        if !options.query.is_empty() {
            query.set(self.api.search_param.clone(), &options.query);
        }
        if let Some(sort) = options.sort {
            query.set("sort", sort);
        }
        query
    }

    fn record<'a>(&self, endpoint: &Endpoint, body: &'a Value) -> Result<&'a Value> {
        extract::walk(body, &endpoint.root).with_context("provider", &self.config.id)
    }

    fn map_record<T: DeserializeOwned>(set: Option<&ExtractorSet>, item: &Value) -> Result<T> {
        match set {
            Some(set) => set.apply(item),
            None => serde_json::from_value(item.clone()).map_err(Into::into),
        }
    }

    fn map_manga(&self, item: &Value) -> Result<Manga> {
        let mut manga: Manga = Self::map_record(self.api.mapping.manga.as_ref(), item)?;
        manga.provider_id = self.config.id.clone();
        Ok(manga)
    }

    fn map_chapter_row(&self, item: &Value) -> Result<ChapterInfo> {
        match self.config.chapter_list.as_ref().and_then(|cl| cl.row.as_ref()) {
            Some(row) => row(item),
            None => Self::map_record(self.api.mapping.chapter.as_ref(), item),
        }
    }

    /// Calls an endpoint once and decodes the body into its shape.
    async fn call(
        &self,
        ctx: &Context,
        name: &str,
        id: &str,
        options: Option<&SearchOptions>,
    ) -> Result<Decoded> {
        let endpoint = self.endpoint(name)?;
        let request = self.request(endpoint, id, options);
        let response = self
            .client
            .execute(ctx, request)
            .await
            .with_context("endpoint", name)?;
        let body = response.json()?;

        if let Some(postprocess) = &endpoint.postprocess {
            return postprocess(body, id).with_context("endpoint", name);
        }

        let record = self.record(endpoint, body)?;
        let decoded = match endpoint.shape {
            ResponseShape::MangaList => Decoded::MangaList(
                as_items(record)?
                    .iter()
                    .filter_map(|item| skip_failed(self.map_manga(item)))
                    .collect(),
            ),
            ResponseShape::Manga => {
                Decoded::Manga(MangaInfo::new(self.map_manga(record)?, Vec::new()))
            }
            ResponseShape::Chapter => {
                Decoded::Chapter(Self::map_record(self.api.mapping.chapter.as_ref(), record)?)
            }
            ResponseShape::ChapterList => Decoded::ChapterList(
                as_items(record)?
                    .iter()
                    .filter_map(|item| skip_failed(self.map_chapter_row(item)))
                    .collect(),
            ),
            ResponseShape::Pages => Decoded::Pages(
                as_items(record)?
                    .iter()
                    .filter_map(|v| v.as_str().map(String::from))
                    .collect(),
            ),
        };
        Ok(decoded)
    }

    async fn chapter_list(&self, ctx: &Context, manga_id: &str) -> Result<Vec<ChapterInfo>> {
        let Some(list) = &self.config.chapter_list else {
            return Ok(Vec::new());
        };
        let endpoint = self.endpoint(&list.endpoint)?;
        let request = self.request(endpoint, manga_id, None);
        Paginator::new(&self.client, &list.pagination)
            .throttle(self.config.http.throttle)
            .fetch_with(ctx, &request, |item| self.map_chapter_row(item))
            .await
            .with_context("manga", manga_id)
    }

    async fn warmup(&self, ctx: &Context) -> Result<()> {
        ctx.check()?;
        for (name, endpoint) in &self.api.endpoints {
            if endpoint.requires_auth {
                debug!(
                    provider = %self.config.id,
                    endpoint = %name,
                    "endpoint requires credentials and will be skipped"
                );
            }
        }
        Ok(())
    }
}

fn as_items(value: &Value) -> Result<&Vec<Value>> {
    value
        .as_array()
        .ok_or_else(|| Error::parse("expected an array of items"))
}

fn skip_failed<T>(result: Result<T>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(err) => {
            debug!(error = %err, "item skipped");
            None
        }
    }
}

#[async_trait]
impl Provider for ApiProvider {
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

    fn throttle(&self) -> Duration {
        self.config.http.throttle
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
        let options = SearchOptions {
            query: query.to_string(),
            ..options.clone()
        };
        let endpoint = self.endpoint("search")?;

        if endpoint.postprocess.is_some() || endpoint.shape != ResponseShape::MangaList {
            return match self.call(ctx, "search", "", Some(&options)).await? {
                Decoded::MangaList(list) => Ok(list),
                _ => Err(Error::provider(
                    &self.config.id,
                    "search endpoint returned no manga list",
                )),
            };
        }

        let mut pagination = self.config.pagination.clone();
        pagination.items_path = endpoint.root.clone();
        let request = self.request(endpoint, "", Some(&options));
        Paginator::new(&self.client, &pagination)
            .limit(options.limit)
            .max_pages(options.pages)
            .throttle(self.config.http.throttle)
            .fetch_with(ctx, &request, |item| self.map_manga(item))
            .await
            .with_context("provider", &self.config.id)
            .op("search")
    }

    async fn get_manga(&self, ctx: &Context, id: &str) -> Result<MangaInfo> {
        self.initialize(ctx).await?;
        let mut info = match self.call(ctx, "manga", id, None).await.op("get_manga")? {
            Decoded::Manga(info) => info,
            _ => return Err(Error::provider(&self.config.id, "manga endpoint returned no manga")),
        };
        info.manga.provider_id = self.config.id.clone();
        if info.manga.id.is_empty() {
            info.manga.id = id.to_string();
        }

        let mut chapters = std::mem::take(&mut info.chapters);
        chapters.extend(self.chapter_list(ctx, id).await.op("get_manga")?);
        sort_chapters(&mut chapters);
        let manga = std::mem::take(&mut info.manga);
        let last_updated = info.last_updated;

        let mut info = MangaInfo::new(manga, chapters);
        info.last_updated = last_updated;
        Ok(info)
    }

    async fn get_chapter(&self, ctx: &Context, id: &str) -> Result<Chapter> {
        self.initialize(ctx).await?;
        let mut chapter = match self.call(ctx, "chapter", id, None).await.op("get_chapter")? {
            Decoded::Chapter(chapter) => chapter,
            _ => {
                let msg = "chapter endpoint returned no chapter";
                return Err(Error::provider(&self.config.id, msg));
            }
        };
        if chapter.info.id.is_empty() {
            chapter.info.id = id.to_string();
        }

        if self.api.endpoints.contains_key("pages") {
            match self.call(ctx, "pages", id, None).await.op("get_chapter")? {
                Decoded::Pages(urls) => {
                    chapter.pages = urls
                        .into_iter()
                        .enumerate()
                        .map(|(index, url)| Page::new(index, url))
                        .collect();
                }
                _ => {
                    let msg = "pages endpoint returned no pages";
                    return Err(Error::provider(&self.config.id, msg));
                }
            }
        }
        Ok(chapter)
    }
}
