//! HTML tree decoding with CSS-selector queries.
//!
//! [`Document`] wraps a parsed `scraper` tree and an optional base URL.
//! Queries take CSS selector strings; an invalid selector matches nothing.
//! Multi-selector variants ([`Document::first_of`], [`Document::all_of`]) try
//! a list of selectors in order and return the first non-empty result, which
//! is how provider selector tables express fallbacks.
//!
//! Documents are not `Send`. Parse, query and copy out owned data in one
//! synchronous step; never hold a document across an `.await`.
//!
//! # Examples
//!
//! ```rust
//! use hondana::net::html::Document;
//! use url::Url;
//!
//! let doc = Document::parse(r#"
//!     <div class="manga-item">
//!         <h3 class="title">One Piece</h3>
//!         <a href="/chapter-1105">Chapter 1105</a>
//!     </div>
//! "#)
//! .with_base(Url::parse("https://example.com/manga/one-piece/").unwrap());
//!
//! assert_eq!(doc.text_of(&[".missing", ".title"]).as_deref(), Some("One Piece"));
//! let link = doc.optional("a").unwrap();
//! assert_eq!(link.href().as_deref(), Some("https://example.com/chapter-1105"));
//! assert_eq!(link.number(), Some(1105.0));
//! ```

use crate::error::{Error, Result};
use once_cell::sync::Lazy;
use rayon::prelude::*;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;
use url::Url;

static NUMBER: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"(\d+(?:\.\d+)?)").ok());

/// Extracts the first decimal number from `text`.
///
/// ```rust
/// use hondana::net::html::extract_number;
///
/// assert_eq!(extract_number("Chapter 12.5: The Return"), Some(12.5));
/// assert_eq!(extract_number("Oneshot"), None);
/// ```
pub fn extract_number(text: &str) -> Option<f64> {
    NUMBER
        .as_ref()?
        .captures(text)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

fn selector(css: &str) -> Option<Selector> {
    match Selector::parse(css) {
        Ok(sel) => Some(sel),
        Err(err) => {
            debug!(selector = css, error = %err, "invalid css selector");
            None
        }
    }
}

/// Collapses runs of whitespace and trims.
fn clean_text<'a>(parts: impl Iterator<Item = &'a str>) -> String {
    parts
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

/// A parsed HTML document.
pub struct Document {
    html: Html,
    base: Option<Url>,
}

impl Document {
    pub fn parse(html: &str) -> Self {
        Self {
            html: Html::parse_document(html),
            base: None,
        }
    }

    pub fn parse_fragment(html: &str) -> Self {
        Self {
            html: Html::parse_fragment(html),
            base: None,
        }
    }

    /// Sets the URL relative links resolve against.
    pub fn with_base(mut self, base: Url) -> Self {
        self.base = Some(base);
        self
    }

    pub fn base(&self) -> Option<&Url> {
        self.base.as_ref()
    }

    fn node<'a>(&'a self, el: ElementRef<'a>) -> Node<'a> {
        Node {
            el,
            base: self.base.as_ref(),
        }
    }

    /// The first match, or a Parser error naming the selector.
    pub fn first(&self, css: &str) -> Result<Node<'_>> {
        self.optional(css)
            .ok_or_else(|| Error::parse(format!("selector '{css}' matched nothing")))
    }

    pub fn optional(&self, css: &str) -> Option<Node<'_>> {
        let sel = selector(css)?;
        self.html.select(&sel).next().map(|el| self.node(el))
    }

    pub fn all(&self, css: &str) -> Vec<Node<'_>> {
        match selector(css) {
            Some(sel) => self.html.select(&sel).map(|el| self.node(el)).collect(),
            None => Vec::new(),
        }
    }

    pub fn count(&self, css: &str) -> usize {
        selector(css)
            .map(|sel| self.html.select(&sel).count())
            .unwrap_or(0)
    }

    pub fn exists(&self, css: &str) -> bool {
        self.optional(css).is_some()
    }

    /// Calls `f` with the position and node of every match.
    pub fn each<F>(&self, css: &str, mut f: F)
    where
        F: FnMut(usize, Node<'_>),
    {
        for (i, node) in self.all(css).into_iter().enumerate() {
            f(i, node);
        }
    }

    pub fn map<T, F>(&self, css: &str, f: F) -> Vec<T>
    where
        F: Fn(Node<'_>) -> T,
    {
        self.all(css).into_iter().map(f).collect()
    }

    pub fn filter<F>(&self, css: &str, predicate: F) -> Vec<Node<'_>>
    where
        F: Fn(&Node<'_>) -> bool,
    {
        self.all(css).into_iter().filter(predicate).collect()
    }

    /// The first match of the first selector that matches anything.
    pub fn first_of<S: AsRef<str>>(&self, selectors: &[S]) -> Option<Node<'_>> {
        selectors.iter().find_map(|css| self.optional(css.as_ref()))
    }

    /// All matches of the first selector that matches anything.
    pub fn all_of<S: AsRef<str>>(&self, selectors: &[S]) -> Vec<Node<'_>> {
        selectors
            .iter()
            .map(|css| self.all(css.as_ref()))
            .find(|nodes| !nodes.is_empty())
            .unwrap_or_default()
    }

    /// The first non-empty text among the selectors.
    pub fn text_of<S: AsRef<str>>(&self, selectors: &[S]) -> Option<String> {
        selectors.iter().find_map(|css| {
            self.all(css.as_ref())
                .into_iter()
                .map(|node| node.text())
                .find(|text| !text.is_empty())
        })
    }

    /// Texts of all matches of the first matching selector, empties dropped.
    pub fn texts_of<S: AsRef<str>>(&self, selectors: &[S]) -> Vec<String> {
        self.all_of(selectors)
            .into_iter()
            .map(|node| node.text())
            .filter(|text| !text.is_empty())
            .collect()
    }

    /// Parses every match of `css` in parallel.
    ///
    /// Matching elements are serialized and re-parsed as fragments on the
    /// rayon pool, so `parser` sees a standalone element. Output order
    /// follows document order.
    pub fn par_map<T, F>(&self, css: &str, parser: F) -> Vec<T>
    where
        T: Send,
        F: Fn(Node<'_>) -> Option<T> + Sync,
    {
        let fragments: Vec<String> = self.all(css).iter().map(|node| node.html()).collect();
        let base = self.base.clone();

        fragments
            .into_par_iter()
            .filter_map(|fragment| {
                let doc = Html::parse_fragment(&fragment);
                let root = doc.root_element();
                let el = root.children().find_map(ElementRef::wrap).unwrap_or(root);
                parser(Node {
                    el,
                    base: base.as_ref(),
                })
            })
            .collect()
    }
}

/// One element of a [`Document`].
#[derive(Clone, Copy)]
pub struct Node<'a> {
    el: ElementRef<'a>,
    base: Option<&'a Url>,
}

impl<'a> Node<'a> {
    /// Text content with whitespace collapsed.
    pub fn text(&self) -> String {
        clean_text(self.el.text())
    }

    pub fn attr(&self, name: &str) -> Option<&'a str> {
        self.el.value().attr(name)
    }

    /// The first present, non-blank attribute among `names`.
    pub fn first_attr(&self, names: &[&str]) -> Option<&'a str> {
        names
            .iter()
            .filter_map(|name| self.attr(name))
            .map(str::trim)
            .find(|value| !value.is_empty())
    }

    /// Resolves an attribute value against `base`.
    pub fn abs_attr(&self, name: &str, base: &Url) -> Option<String> {
        let value = self.attr(name)?.trim();
        if value.is_empty() {
            return None;
        }
        base.join(value).ok().map(String::from)
    }

    /// `href` resolved against the document's base URL.
    pub fn href(&self) -> Option<String> {
        self.resolve(self.attr("href")?)
    }

    /// Image source resolved against the document's base URL, looking at the
    /// lazy-loading attributes as well as `src`.
    pub fn src(&self) -> Option<String> {
        self.resolve(self.first_attr(&["src", "data-src", "data-url", "data-lazy-src"])?)
    }

    /// Resolves `value` against the document's base URL when there is one.
    pub fn resolve(&self, value: &str) -> Option<String> {
        let value = value.trim();
        if value.is_empty() {
            return None;
        }
        match self.base {
            Some(base) => base.join(value).ok().map(String::from),
            None => Url::parse(value).ok().map(String::from),
        }
    }

    /// The first decimal number in the element's text.
    pub fn number(&self) -> Option<f64> {
        extract_number(&self.text())
    }

    pub fn select(&self, css: &str) -> Vec<Node<'a>> {
        let base = self.base;
        match selector(css) {
            Some(sel) => self.el.select(&sel).map(|el| Node { el, base }).collect(),
            None => Vec::new(),
        }
    }

    pub fn select_first(&self, css: &str) -> Option<Node<'a>> {
        let sel = selector(css)?;
        self.el.select(&sel).next().map(|el| Node {
            el,
            base: self.base,
        })
    }

    /// Text of the first descendant matching any of `selectors`.
    pub fn text_of<S: AsRef<str>>(&self, selectors: &[S]) -> Option<String> {
        selectors
            .iter()
            .filter_map(|css| self.select_first(css.as_ref()))
            .map(|node| node.text())
            .find(|text| !text.is_empty())
    }

    pub fn html(&self) -> String {
        self.el.html()
    }

    pub fn name(&self) -> &'a str {
        self.el.value().name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = r#"
        <div class="story_item"><h3 class="story_name"><a href="/manga/aa1">Alpha</a></h3></div>
        <div class="story_item"><h3 class="story_name"><a href="/manga/bb2">  Beta
            Two </a></h3></div>
        <ul class="chapters">
            <li><a href="/c/3" title="Chapter 3">Ch. 3</a></li>
            <li><a href="/c/2.5">Chapter 2.5</a></li>
        </ul>
        <img class="page" data-src=" https://cdn.example.com/1.jpg ">
        <img class="page" src="" data-lazy-src="/2.png">
    "#;

    fn doc() -> Document {
        Document::parse(LISTING).with_base(Url::parse("https://site.example/list").unwrap())
    }

    #[test]
    fn test_queries() {
        let doc = doc();
        assert_eq!(doc.count(".story_item"), 2);
        assert!(doc.exists(".chapters"));
        assert!(!doc.exists(".nothing"));
        assert!(doc.first(".nothing").is_err());
        assert_eq!(doc.count("::invalid::"), 0);

        let titles = doc.map(".story_name a", |n| n.text());
        assert_eq!(titles, ["Alpha", "Beta Two"]);

        let beta = doc.filter(".story_name a", |n| n.text().starts_with('B'));
        assert_eq!(beta.len(), 1);
        assert_eq!(beta[0].href().as_deref(), Some("https://site.example/manga/bb2"));
    }

    #[test]
    fn test_multi_selector_takes_first_non_empty() {
        let doc = doc();
        let nodes = doc.all_of(&[".missing a", ".chapters a", ".story_name a"]);
        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[0].number(), Some(3.0));
        assert_eq!(nodes[1].number(), Some(2.5));
        assert!(doc.first_of(&[".none", ".also-none"]).is_none());
    }

    #[test]
    fn test_image_sources() {
        let doc = doc();
        let srcs: Vec<_> = doc.all("img.page").iter().filter_map(|n| n.src()).collect();
        assert_eq!(
            srcs,
            ["https://cdn.example.com/1.jpg", "https://site.example/2.png"]
        );
    }

    #[test]
    fn test_par_map_keeps_document_order() {
        let doc = doc();
        let hrefs = doc.par_map(".story_name a", |n| n.href());
        assert_eq!(
            hrefs,
            ["https://site.example/manga/aa1", "https://site.example/manga/bb2"]
        );
    }

    #[test]
    fn test_each_counts_positions() {
        let doc = doc();
        let mut seen = Vec::new();
        doc.each(".chapters li", |i, n| seen.push((i, n.text())));
        assert_eq!(seen, [(0, "Ch. 3".to_string()), (1, "Chapter 2.5".to_string())]);
    }
}
