//! Command-line front-end for hondana.
//!
//! Every command prints either human-readable text or, with `--json`, one
//! `{"status", "data", "error"}` object. Failures exit non-zero.

use clap::{Parser, Subcommand};
use hondana::download::DownloadOptions;
use hondana::error;
use hondana::prelude::*;
use hondana::types::parse_filters;
use serde_json::{Map, Value, json};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "hondana",
    version,
    about = "Search, inspect and download manga from many providers"
)]
struct Cli {
    /// Print one JSON object instead of text
    #[arg(long, global = true)]
    json: bool,

    /// Verbose logging and call-chain traces on errors
    #[arg(long, global = true)]
    debug: bool,

    /// Deadline in seconds for searches across providers
    #[arg(long, global = true, default_value_t = 30)]
    timeout: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List the available providers
    #[command(visible_alias = "agents")]
    Providers,

    /// Search for manga
    Search {
        query: String,

        /// Only search this provider
        #[arg(short, long)]
        provider: Option<String>,

        /// Results per page
        #[arg(short, long, default_value_t = 20)]
        limit: usize,

        /// Pages per provider; 0 fetches every page
        #[arg(long, default_value_t = 1)]
        pages: usize,

        /// name, author, status, relevance, popularity, newest or updated
        #[arg(short, long)]
        sort: Option<SortKey>,

        /// Filters as key=value[,key=value]
        #[arg(short, long)]
        filter: Option<String>,

        /// Fields to show, comma separated
        #[arg(long, value_delimiter = ',')]
        fields: Vec<String>,
    },

    /// Show a manga and its chapters
    Info {
        /// <provider>:<id>
        id: QualifiedId,

        /// Keep only chapters in these languages
        #[arg(long, value_delimiter = ',')]
        lang: Vec<String>,
    },

    /// List everything a provider offers
    List {
        #[arg(short, long)]
        provider: Option<String>,

        #[arg(short, long, default_value_t = 20)]
        limit: usize,

        #[arg(long, default_value_t = 1)]
        pages: usize,
    },

    /// Download chapters
    Download {
        /// One or more <provider>:<chapter-id>
        #[arg(required = true)]
        ids: Vec<QualifiedId>,

        #[arg(short, long, default_value = "downloads")]
        output: PathBuf,

        /// Pages fetched at once
        #[arg(short, long, default_value_t = hondana::download::DEFAULT_CONCURRENCY)]
        concurrent: usize,

        /// Volume to file the chapters under
        #[arg(long)]
        vol: Option<String>,
    },

    /// Print the version
    Version,
}

struct App {
    providers: Providers,
    ctx: Context,
    timeout: Duration,
    json: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_filter = if cli.debug { "hondana=debug" } else { "hondana=warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    let json = cli.json;
    let debug = cli.debug;
    match run(cli).await {
        Ok(data) => {
            if json {
                print_json(&json!({ "status": "success", "data": data, "error": null }));
            }
            ExitCode::SUCCESS
        }
        Err(err) => {
            report(&err, json, debug);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<Value> {
    let app = App {
        providers: hondana::sources::registry()?,
        ctx: Context::background(),
        timeout: Duration::from_secs(cli.timeout),
        json: cli.json,
    };

    match cli.command {
        Commands::Providers => app.providers(),
        Commands::Search {
            query,
            provider,
            limit,
            pages,
            sort,
            filter,
            fields,
        } => {
            let filters = filter.as_deref().map(parse_filters).transpose()?;
            app.search(query, provider, limit, pages, sort, filters.unwrap_or_default(), fields)
                .await
        }
        Commands::Info { id, lang } => app.info(&id, &lang).await,
        Commands::List {
            provider,
            limit,
            pages,
        } => app.list(provider, limit, pages).await,
        Commands::Download {
            ids,
            output,
            concurrent,
            vol,
        } => {
            let options = DownloadOptions {
                output,
                concurrency: concurrent,
                volume: vol,
                ..Default::default()
            };
            app.download(&ids, &options).await
        }
        Commands::Version => {
            let version = env!("CARGO_PKG_VERSION");
            if !app.json {
                println!("hondana {version}");
            }
            Ok(json!({ "version": version }))
        }
    }
}

impl App {
    fn providers(&self) -> Result<Value> {
        let rows: Vec<Value> = self
            .providers
            .iter()
            .map(|p| {
                json!({
                    "id": p.id(),
                    "name": p.name(),
                    "description": p.description(),
                    "site_url": p.site_url(),
                })
            })
            .collect();
        if !self.json {
            for p in self.providers.iter() {
                println!("{:<5} {:<14} {}", p.id(), p.name(), p.site_url());
                if !p.description().is_empty() {
                    println!("      {}", p.description());
                }
            }
        }
        Ok(json!({ "providers": rows, "count": rows.len() }))
    }

    #[allow(clippy::too_many_arguments)]
    async fn search(
        &self,
        query: String,
        provider: Option<String>,
        limit: usize,
        pages: usize,
        sort: Option<SortKey>,
        filters: std::collections::BTreeMap<FilterKey, String>,
        fields: Vec<String>,
    ) -> Result<Value> {
        let results = self.fetch(&query, provider.as_deref(), limit, pages, sort, filters).await?;
        let rows: Vec<Value> = results
            .iter()
            .map(|manga| project(manga, &fields))
            .collect::<Result<_>>()?;

        if !self.json {
            if results.is_empty() {
                println!("No results for '{query}'");
            }
            for (manga, row) in results.iter().zip(&rows) {
                print_manga(manga, row, &fields);
            }
        }
        Ok(json!({ "query": query, "results": rows, "count": rows.len() }))
    }

    async fn list(&self, provider: Option<String>, limit: usize, pages: usize) -> Result<Value> {
        let results = self
            .fetch("", provider.as_deref(), limit, pages, None, Default::default())
            .await?;
        let mut data = json!({
            "mangas": serde_json::to_value(&results)?,
            "count": results.len(),
        });
        if let Some(p) = provider.as_deref().and_then(|id| self.providers.get(id)) {
            data["provider"] = json!(p.id());
            data["provider_name"] = json!(p.name());
        }

        if !self.json {
            for manga in &results {
                println!("{}  {}", manga.qualified_id(), manga.title);
            }
            println!("{} manga", results.len());
        }
        Ok(data)
    }

    async fn fetch(
        &self,
        query: &str,
        provider: Option<&str>,
        limit: usize,
        pages: usize,
        sort: Option<SortKey>,
        filters: std::collections::BTreeMap<FilterKey, String>,
    ) -> Result<Vec<Manga>> {
        let mut search = self
            .providers
            .search(query)
            .context(&self.ctx)
            .limit(limit)
            .pages(pages)
            .filters(filters)
            .timeout(self.timeout);
        if let Some(sort) = sort {
            search = search.sort(sort);
        }
        if let Some(id) = provider {
            search = search.provider(id);
        }
        search.flatten().await
    }

    async fn info(&self, id: &QualifiedId, languages: &[String]) -> Result<Value> {
        let provider = self.providers.resolve(id)?;
        let mut info = provider.get_manga(&self.ctx, &id.local).await?;
        if !languages.is_empty() {
            info.retain_languages(languages);
        }

        let mut manga = serde_json::to_value(&info.manga)?;
        manga["chapters"] = serde_json::to_value(&info.chapters)?;
        manga["last_updated"] = serde_json::to_value(info.last_updated)?;
        manga["languages"] = serde_json::to_value(&info.languages)?;

        if !self.json {
            print_info(&info);
        }
        Ok(json!({ "manga": manga }))
    }

    async fn download(&self, ids: &[QualifiedId], options: &DownloadOptions) -> Result<Value> {
        let mut downloads = Vec::new();
        let mut errors = Vec::new();
        for id in ids {
            let provider = match self.providers.resolve(id) {
                Ok(provider) => provider,
                Err(err) => {
                    errors.push(err);
                    continue;
                }
            };
            if !self.json {
                println!("Downloading {id}...");
            }
            match provider.download_chapter(&self.ctx, &id.local, options).await {
                Ok(report) => {
                    if !self.json {
                        println!(
                            "  {} written, {} already present -> {}",
                            report.written,
                            report.skipped,
                            report.dir.display()
                        );
                    }
                    downloads.push(json!({
                        "id": id.to_string(),
                        "dir": report.dir,
                        "written": report.written,
                        "skipped": report.skipped,
                    }));
                }
                Err(err) => errors.push(err.with_context("id", id)),
            }
        }

        match Error::join(errors) {
            Some(err) => Err(err),
            None => Ok(json!({ "downloads": downloads, "count": downloads.len() })),
        }
    }
}

/// Serializes `manga`, keeping only `fields` when any are given.
fn project(manga: &Manga, fields: &[String]) -> Result<Value> {
    let mut value = serde_json::to_value(manga)?;
    if fields.is_empty() {
        return Ok(value);
    }
    let Value::Object(all) = &mut value else {
        return Ok(value);
    };
    let kept: Map<String, Value> = fields
        .iter()
        .filter_map(|field| {
            let field = field.trim();
            all.remove(field).map(|v| (field.to_string(), v))
        })
        .collect();
    Ok(Value::Object(kept))
}

fn print_manga(manga: &Manga, row: &Value, fields: &[String]) {
    println!("{}  {}", manga.qualified_id(), manga.title);
    if fields.is_empty() {
        if !manga.authors.is_empty() {
            println!("    by {}", manga.authors.join(", "));
        }
        return;
    }
    for field in fields {
        let field = field.trim();
        match row.get(field) {
            Some(Value::String(s)) => println!("    {field}: {s}"),
            Some(Value::Array(items)) => {
                let items: Vec<String> = items
                    .iter()
                    .map(|v| v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string()))
                    .collect();
                println!("    {field}: {}", items.join(", "));
            }
            Some(Value::Null) | None => {}
            Some(other) => println!("    {field}: {other}"),
        }
    }
}

fn print_info(info: &MangaInfo) {
    let manga = &info.manga;
    println!("{}  ({})", manga.title, manga.qualified_id());
    if !manga.alt_titles.is_empty() {
        println!("Also known as: {}", manga.alt_titles.join("; "));
    }
    if !manga.authors.is_empty() {
        println!("Authors: {}", manga.authors.join(", "));
    }
    if let Some(status) = &manga.status {
        println!("Status: {status}");
    }
    if !manga.tags.is_empty() {
        println!("Tags: {}", manga.tags.join(", "));
    }
    if let Some(updated) = info.last_updated {
        println!("Updated: {}", updated.format("%Y-%m-%d"));
    }
    if let Some(description) = &manga.description {
        println!("\n{description}\n");
    }
    println!("{} chapters", info.chapters.len());
    for chapter in &info.chapters {
        let number = chapter
            .number
            .map(|n| n.to_string())
            .unwrap_or_else(|| "?".to_string());
        let volume = chapter
            .volume
            .as_deref()
            .map(|v| format!("Vol.{v} "))
            .unwrap_or_default();
        let language = chapter
            .language
            .as_deref()
            .map(|l| format!(" [{l}]"))
            .unwrap_or_default();
        println!(
            "  {volume}Ch.{number}  {}{language}  {}:{}",
            chapter.title, manga.provider_id, chapter.id
        );
    }
}

fn report(err: &Error, json: bool, debug: bool) {
    if json {
        print_json(&json!({ "status": "error", "data": null, "error": err.to_string() }));
        return;
    }
    eprintln!("{err}");
    let hints = error::suggestions(err);
    if !hints.is_empty() {
        eprintln!("\nSuggestions:");
        for hint in hints {
            eprintln!("  - {hint}");
        }
    }
    if debug {
        let chain = err.call_chain();
        if !chain.is_empty() {
            eprintln!("\nCall chain:");
            for frame in chain {
                eprintln!("  at {frame}");
            }
        }
        for (key, value) in err.context() {
            eprintln!("  {key} = {value}");
        }
    }
}

fn print_json(value: &Value) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{text}"),
        Err(err) => eprintln!("[PARSER] {err}"),
    }
}
