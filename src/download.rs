//! Concurrent chapter downloads with a deterministic on-disk layout.
//!
//! A chapter lands at
//! `<output>/<manga>/<NNNN>-<CCC[.d]>/<PP>.<ext>`, where `NNNN` is the
//! volume (or a sequential pseudo-volume), `CCC[.d]` the chapter number and
//! `PP` the zero-padded page index. Pages are written to `<file>.tmp` and
//! renamed into place, and pages already on disk are skipped, so running a
//! download twice is harmless.

use crate::context::Context;
use crate::error::{Category, Error, Result, ResultExt};
use crate::net::{HttpClient, Request};
use crate::types::{Chapter, Page};
use futures::stream::{self, StreamExt};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tracing::{debug, info};

/// Default number of pages fetched at once.
pub const DEFAULT_CONCURRENCY: usize = 5;

const MAX_NAME_LEN: usize = 100;
const UNKNOWN_MANGA: &str = "Unknown-Manga";
const UNKNOWN_CHAPTER: &str = "unknown";
/// Holds the chapter id inside directories of chapters without a number.
const CHAPTER_MARKER: &str = ".chapter-id";

/// Last pseudo-volume handed out in this process.
static SEQUENCE: Lazy<Mutex<u32>> = Lazy::new(|| Mutex::new(0));

/// Sanitizes a name for use as a directory.
///
/// Characters that are invalid on common filesystems (`<>:"/\|?*`) become
/// underscores, leading and trailing spaces and dots are trimmed, and the
/// result is clamped to 100 characters.
///
/// # Examples
///
/// ```rust
/// use hondana::download::sanitize;
///
/// assert_eq!(sanitize("  Hellø / World?  "), "Hellø _ World_");
/// assert_eq!(sanitize(" ... "), "Unknown-Manga");
/// ```
pub fn sanitize(name: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            c => c,
        })
        .collect();
    let trimmed = replaced.trim_matches(|c| c == ' ' || c == '.');
    let clamped: String = trimmed.chars().take(MAX_NAME_LEN).collect();
    let clamped = clamped.trim_end_matches([' ', '.']);
    if clamped.is_empty() {
        UNKNOWN_MANGA.to_string()
    } else {
        clamped.to_string()
    }
}

/// Formats a chapter number as three zero-padded digits plus any fraction.
///
/// ```rust
/// use hondana::download::format_chapter_number;
///
/// assert_eq!(format_chapter_number(5.0), "005");
/// assert_eq!(format_chapter_number(5.5), "005.5");
/// assert_eq!(format_chapter_number(1024.25), "1024.25");
/// ```
pub fn format_chapter_number(number: f64) -> String {
    let number = number.max(0.0);
    let whole = number.trunc() as u64;
    if number.fract() == 0.0 {
        return format!("{whole:03}");
    }
    let text = number.to_string();
    match text.split_once('.') {
        Some((_, fraction)) => format!("{whole:03}.{fraction}"),
        None => format!("{whole:03}"),
    }
}

/// Four-digit volume label; non-numeric volumes are kept, sanitized.
pub fn volume_label(volume: &str) -> String {
    match volume.trim().parse::<f64>() {
        Ok(v) if v >= 0.0 && v.fract() == 0.0 => format!("{:04}", v as u64),
        _ => sanitize(volume),
    }
}

/// The `<volume>-<chapter>` directory name.
pub fn chapter_dir_name(volume: &str, chapter: Option<f64>) -> String {
    let chapter = chapter
        .map(format_chapter_number)
        .unwrap_or_else(|| UNKNOWN_CHAPTER.to_string());
    format!("{volume}-{chapter}")
}

/// `{index}.{ext}` with the index padded to the digits of `total`, at
/// least two.
///
/// ```rust
/// use hondana::download::page_filename;
///
/// assert_eq!(page_filename(3, 12, "png"), "03.png");
/// assert_eq!(page_filename(7, 150, "jpg"), "007.jpg");
/// ```
pub fn page_filename(index: usize, total: usize, ext: &str) -> String {
    let width = total.to_string().len().max(2);
    format!("{index:0width$}.{ext}")
}

/// Extracts a file extension from a URL or file name, ignoring query
/// parameters and fragments.
///
/// ```rust
/// use hondana::download::extract_extension;
///
/// assert_eq!(extract_extension("https://example.com/image.PNG?v=1"), Some("png".to_string()));
/// assert_eq!(extract_extension("https://example.com/image"), None);
/// ```
pub fn extract_extension(url: &str) -> Option<String> {
    let clean = url.split(['?', '#']).next()?;
    let name = clean.rsplit('/').next()?;
    let (_, ext) = name.rsplit_once('.')?;
    (!ext.is_empty() && ext.len() <= 5 && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .then(|| ext.to_ascii_lowercase())
}

fn page_extension(page: &Page) -> String {
    extract_extension(&page.filename)
        .or_else(|| extract_extension(&page.url))
        .unwrap_or_else(|| "jpg".to_string())
}

/// Settings of one chapter download.
#[derive(Debug, Clone)]
pub struct DownloadOptions {
    /// Root under which manga directories are created
    pub output: PathBuf,
    pub concurrency: usize,
    /// Pause before each page request; the provider's throttle when unset
    pub throttle: Option<Duration>,
    /// Overrides the volume the provider reports
    pub volume: Option<String>,
    /// Skips the manga lookup used for the directory name
    pub manga_title: Option<String>,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            output: PathBuf::from("downloads"),
            concurrency: DEFAULT_CONCURRENCY,
            throttle: None,
            volume: None,
            manga_title: None,
        }
    }
}

impl DownloadOptions {
    pub fn new(output: impl Into<PathBuf>) -> Self {
        Self {
            output: output.into(),
            ..Default::default()
        }
    }
}

/// What the layout needs to know about a chapter.
#[derive(Debug, Clone, Default)]
pub struct ChapterMeta {
    pub provider_id: String,
    pub manga_id: String,
    pub manga_title: Option<String>,
    /// Provider-local chapter id; names unnumbered chapters on disk
    pub chapter_id: String,
    pub chapter_number: Option<f64>,
    pub volume: Option<String>,
}

impl ChapterMeta {
    /// The manga directory name: the title, else `<provider>-<manga id>`.
    pub fn manga_dir_name(&self) -> String {
        match &self.manga_title {
            Some(title) if !title.trim().is_empty() => sanitize(title),
            _ if !self.manga_id.is_empty() => {
                sanitize(&format!("{}-{}", self.provider_id, self.manga_id))
            }
            _ => UNKNOWN_MANGA.to_string(),
        }
    }
}

/// Outcome of a finished download.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DownloadReport {
    pub dir: PathBuf,
    pub written: usize,
    pub skipped: usize,
}

enum PageOutcome {
    Written,
    Skipped,
}

/// Picks the pseudo-volume directory for a chapter without a volume.
///
/// An existing `NNNN-<chapter>` directory is reused so repeated downloads
/// land in the same place. Unnumbered chapters all share the `unknown`
/// suffix, so theirs is reused only when its marker names the same
/// chapter id. Otherwise the next number above both the process counter
/// and the highest prefix on disk is taken.
async fn sequential_dir_name(
    manga_dir: &Path,
    chapter: Option<f64>,
    chapter_id: &str,
) -> Result<String> {
    let wanted = chapter_dir_name("", chapter);
    let mut highest = 0u32;

    if fs::try_exists(manga_dir).await? {
        let mut entries = fs::read_dir(manga_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            let Some(prefix) = name.get(..4) else {
                continue;
            };
            let Ok(n) = prefix.parse::<u32>() else {
                continue;
            };
            if name[4..] == wanted && owns_dir(&entry.path(), chapter, chapter_id).await {
                return Ok(name);
            }
            highest = highest.max(n);
        }
    }

    let mut counter = SEQUENCE.lock();
    *counter = (*counter).max(highest) + 1;
    Ok(chapter_dir_name(&format!("{:04}", *counter), chapter))
}

async fn owns_dir(dir: &Path, chapter: Option<f64>, chapter_id: &str) -> bool {
    if chapter.is_some() {
        return true;
    }
    if chapter_id.is_empty() {
        return false;
    }
    match fs::read_to_string(dir.join(CHAPTER_MARKER)).await {
        Ok(marker) => marker.trim() == chapter_id,
        Err(_) => false,
    }
}

/// Fetches the pages of a chapter concurrently.
#[derive(Debug, Clone)]
pub struct Downloader {
    client: HttpClient,
    concurrency: usize,
    throttle: Duration,
    referer: Option<String>,
}

impl Downloader {
    pub fn new(client: HttpClient) -> Self {
        Self {
            client,
            concurrency: DEFAULT_CONCURRENCY,
            throttle: Duration::ZERO,
            referer: None,
        }
    }

    /// Pages in flight at once; at least one.
    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn throttle(mut self, throttle: Duration) -> Self {
        self.throttle = throttle;
        self
    }

    pub fn referer(mut self, referer: &str) -> Self {
        self.referer = Some(referer.to_string());
        self
    }

    /// Resolves the chapter directory under `root`.
    pub async fn chapter_dir(&self, root: &Path, meta: &ChapterMeta) -> Result<PathBuf> {
        let manga_dir = root.join(meta.manga_dir_name());
        let name = match meta.volume.as_deref().filter(|v| !v.trim().is_empty()) {
            Some(volume) => chapter_dir_name(&volume_label(volume), meta.chapter_number),
            None => sequential_dir_name(&manga_dir, meta.chapter_number, &meta.chapter_id)
                .await
                .with_context("path", manga_dir.display())?,
        };
        Ok(manga_dir.join(name))
    }

    /// Downloads every page of `chapter` under `root`.
    ///
    /// # Parameters
    ///
    /// * `ctx` - Cancels pending pages; in-flight requests observe it too
    /// * `chapter` - The chapter with its ordered pages
    /// * `root` - Output root
    /// * `meta` - Naming information for the directory layout
    ///
    /// # Returns
    ///
    /// The chapter directory with written and skipped page counts. Page
    /// failures do not stop the other pages; they are joined into one
    /// Download error once every page has been attempted. A cancelled
    /// context wins over page failures and surfaces as Timeout.
    pub async fn download(
        &self,
        ctx: &Context,
        chapter: &Chapter,
        root: &Path,
        meta: &ChapterMeta,
    ) -> Result<DownloadReport> {
        ctx.check()?;
        if chapter.pages.is_empty() {
            return Err(Error::not_found("chapter has no pages")
                .with_context("chapter", &chapter.info.id)
                .op("download"));
        }

        let dir = self.chapter_dir(root, meta).await?;
        fs::create_dir_all(&dir)
            .await
            .with_context("path", dir.display())
            .op("download")?;
        if meta.chapter_number.is_none() && !meta.chapter_id.is_empty() {
            let marker = dir.join(CHAPTER_MARKER);
            fs::write(&marker, &meta.chapter_id)
                .await
                .with_context("path", marker.display())
                .op("download")?;
        }

        let total = chapter.pages.len();
        let pending: Vec<_> = chapter
            .pages
            .iter()
            .map(|page| self.fetch_page(ctx, page, &dir, total))
            .collect();
        let outcomes: Vec<Result<PageOutcome>> = stream::iter(pending)
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let (mut written, mut skipped) = (0, 0);
        let mut errors = Vec::new();
        for outcome in outcomes {
            match outcome {
                Ok(PageOutcome::Written) => written += 1,
                Ok(PageOutcome::Skipped) => skipped += 1,
                Err(err) => errors.push(err),
            }
        }

        if let Some(pos) = errors.iter().position(Error::is_cancelled) {
            return Err(errors
                .swap_remove(pos)
                .with_context("chapter", &chapter.info.id)
                .op("download"));
        }
        if let Some(err) = Error::join(errors) {
            let failed = total - written - skipped;
            return Err(err
                .categorize(Category::Download)
                .wrap(format!("{failed} of {total} pages failed"))
                .with_context("chapter", &chapter.info.id)
                .with_context("path", dir.display())
                .op("download"));
        }

        info!(
            chapter = %chapter.info.id,
            dir = %dir.display(),
            written,
            skipped,
            "chapter downloaded"
        );
        Ok(DownloadReport {
            dir,
            written,
            skipped,
        })
    }

    async fn fetch_page(
        &self,
        ctx: &Context,
        page: &Page,
        dir: &Path,
        total: usize,
    ) -> Result<PageOutcome> {
        let ext = page_extension(page);
        let path = dir.join(page_filename(page.index, total, &ext));
        if fs::try_exists(&path).await? {
            debug!(path = %path.display(), "page exists, skipping");
            return Ok(PageOutcome::Skipped);
        }

        ctx.check()?;
        ctx.sleep(self.throttle).await?;

        let mut request = Request::get(&page.url).header("Accept", "image/*");
        if let Some(referer) = &self.referer {
            request = request.header("Referer", referer);
        }
        let response = self
            .client
            .execute(ctx, request)
            .await
            .with_context("page", page.index)?;

        let tmp = path.with_extension(format!("{ext}.tmp"));
        fs::write(&tmp, &response.body)
            .await
            .with_context("path", tmp.display())?;
        fs::rename(&tmp, &path)
            .await
            .with_context("path", path.display())?;
        Ok(PageOutcome::Written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize() {
        assert_eq!(sanitize("  Hellø / World?  "), "Hellø _ World_");
        assert_eq!(sanitize("a<b>c:d\"e\\f|g*h"), "a_b_c_d_e_f_g_h");
        assert_eq!(sanitize("..hidden.."), "hidden");
        assert_eq!(sanitize(""), "Unknown-Manga");
        assert_eq!(sanitize(&"é".repeat(150)).chars().count(), 100);
    }

    #[test]
    fn test_chapter_numbers() {
        assert_eq!(format_chapter_number(0.0), "000");
        assert_eq!(format_chapter_number(5.0), "005");
        assert_eq!(format_chapter_number(999.0), "999");
        assert_eq!(format_chapter_number(5.5), "005.5");
        assert_eq!(format_chapter_number(12.25), "012.25");
        assert_eq!(chapter_dir_name(&volume_label("1"), Some(5.0)), "0001-005");
        assert_eq!(chapter_dir_name("0003", None), "0003-unknown");
        assert_eq!(volume_label("Extra"), "Extra");
    }

    #[test]
    fn test_page_filenames() {
        assert_eq!(page_filename(0, 1, "png"), "00.png");
        assert_eq!(page_filename(9, 10, "jpg"), "09.jpg");
        assert_eq!(page_filename(99, 100, "jpg"), "099.jpg");
        let page = Page::new(0, "https://cdn.example/x/001?token=a");
        assert_eq!(page_extension(&page), "jpg");
        let page = Page::new(0, "https://cdn.example/x/001.webp");
        assert_eq!(page_extension(&page), "webp");
    }

    #[test]
    fn test_manga_dir_name() {
        let mut meta = ChapterMeta {
            provider_id: "mgd".into(),
            manga_id: "abc".into(),
            ..Default::default()
        };
        assert_eq!(meta.manga_dir_name(), "mgd-abc");
        meta.manga_title = Some("Berserk: Deluxe".into());
        assert_eq!(meta.manga_dir_name(), "Berserk_ Deluxe");
        assert_eq!(ChapterMeta::default().manga_dir_name(), "Unknown-Manga");
    }

    #[tokio::test]
    async fn test_sequential_dirs_are_reused_and_increase() {
        let root = tempfile::tempdir().unwrap();
        let downloader = Downloader::new(HttpClient::new());
        let meta = ChapterMeta {
            provider_id: "tst".into(),
            manga_title: Some("Seq".into()),
            chapter_number: Some(5.5),
            ..Default::default()
        };

        let first = downloader.chapter_dir(root.path(), &meta).await.unwrap();
        let name = first.file_name().unwrap().to_string_lossy().into_owned();
        assert_eq!(name.len(), "0000-005.5".len());
        assert!(name.ends_with("-005.5"));
        fs::create_dir_all(&first).await.unwrap();

        assert_eq!(downloader.chapter_dir(root.path(), &meta).await.unwrap(), first);

        let next = ChapterMeta {
            chapter_number: Some(6.0),
            ..meta.clone()
        };
        let second = downloader.chapter_dir(root.path(), &next).await.unwrap();
        let second_name = second.file_name().unwrap().to_string_lossy().into_owned();
        assert!(second_name[..4] > name[..4]);
        assert!(second_name.ends_with("-006"));
    }

    #[tokio::test]
    async fn test_unnumbered_chapters_reuse_their_own_dir() {
        let root = tempfile::tempdir().unwrap();
        let downloader = Downloader::new(HttpClient::new());
        let meta = ChapterMeta {
            provider_id: "tst".into(),
            manga_title: Some("Oneshots".into()),
            chapter_id: "oneshot-a".into(),
            ..Default::default()
        };

        let first = downloader.chapter_dir(root.path(), &meta).await.unwrap();
        assert!(first.to_string_lossy().ends_with("-unknown"));
        fs::create_dir_all(&first).await.unwrap();
        fs::write(first.join(CHAPTER_MARKER), "oneshot-a").await.unwrap();

        assert_eq!(downloader.chapter_dir(root.path(), &meta).await.unwrap(), first);

        let other = ChapterMeta {
            chapter_id: "oneshot-b".into(),
            ..meta.clone()
        };
        let second = downloader.chapter_dir(root.path(), &other).await.unwrap();
        assert_ne!(second, first);
        assert!(second.to_string_lossy().ends_with("-unknown"));
    }
}
