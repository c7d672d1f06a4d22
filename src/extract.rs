//! Path-based field extraction over loosely typed responses.
//!
//! A [`Path`] is an ordered list of keys. Walking it dispatches on the node
//! at each step: objects are indexed by key, arrays by a non-negative integer
//! key. Typed records are first serialized with serde, so their field names
//! (as serde spells them) are the keys.
//!
//! An [`ExtractorSet`] bundles [`FieldExtractor`]s (source path, target
//! field, optional transform, required flag) and builds a fresh output record
//! from one response item.
//!
//! ```rust
//! use hondana::extract::ExtractorSet;
//! use hondana::types::Manga;
//! use serde_json::json;
//!
//! let set = ExtractorSet::new("manga")
//!     .required("id", "id")
//!     .required("attributes.title.en", "title")
//!     .optional("attributes.description.en", "description");
//!
//! let item = json!({"id": "x1", "attributes": {"title": {"en": "Berserk"}}});
//! let manga: Manga = set.apply(&item).unwrap();
//! assert_eq!(manga.title, "Berserk");
//! assert_eq!(manga.description, None);
//! ```

use crate::error::{Error, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// An ordered sequence of keys.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Path(Vec<String>);

impl Path {
    /// Splits a dot-separated path. The empty string is the empty path,
    /// which addresses the value itself.
    pub fn parse(path: &str) -> Self {
        Self(
            path.split('.')
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect(),
        )
    }

    pub fn from_keys<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(keys.into_iter().map(Into::into).collect())
    }

    pub fn keys(&self) -> &[String] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for Path {
    fn from(path: &str) -> Self {
        Self::parse(path)
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("."))
    }
}

/// Walks `path` through `value`.
///
/// Fails with a Parser error naming the key at which the walk stopped.
pub fn walk<'a>(value: &'a Value, path: &Path) -> Result<&'a Value> {
    let mut current = value;
    for key in path.keys() {
        let next = match current {
            Value::Object(map) => map.get(key),
            Value::Array(items) => key.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        };
        current = next.ok_or_else(|| {
            Error::parse(format!("no value at '{key}' while walking '{path}'"))
                .with_context("key", key)
                .with_context("path", path)
        })?;
    }
    Ok(current)
}

/// Walks `path` through any serializable record.
pub fn extract<T: Serialize + ?Sized>(source: &T, path: &Path) -> Result<Value> {
    let value = serde_json::to_value(source)?;
    walk(&value, path).cloned()
}

/// Rewrites an extracted value before it is stored.
pub type Transform = Arc<dyn Fn(&Value) -> Result<Value> + Send + Sync>;

/// One source-path to target-field rule.
#[derive(Clone)]
pub struct FieldExtractor {
    pub source: Path,
    pub target: String,
    pub transform: Option<Transform>,
    pub required: bool,
}

impl fmt::Debug for FieldExtractor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldExtractor")
            .field("source", &self.source)
            .field("target", &self.target)
            .field("transform", &self.transform.is_some())
            .field("required", &self.required)
            .finish()
    }
}

impl FieldExtractor {
    pub fn new(source: impl Into<Path>, target: impl Into<String>, required: bool) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            transform: None,
            required,
        }
    }

    pub fn with_transform<F>(mut self, transform: F) -> Self
    where
        F: Fn(&Value) -> Result<Value> + Send + Sync + 'static,
    {
        self.transform = Some(Arc::new(transform));
        self
    }

    fn resolve(&self, item: &Value) -> Result<Value> {
        let raw = walk(item, &self.source)?;
        match &self.transform {
            Some(transform) => transform(raw),
            None => Ok(raw.clone()),
        }
    }
}

/// A named list of field rules producing one output record per item.
#[derive(Debug, Clone, Default)]
pub struct ExtractorSet {
    name: String,
    fields: Vec<FieldExtractor>,
}

impl ExtractorSet {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[FieldExtractor] {
        &self.fields
    }

    pub fn field(mut self, field: FieldExtractor) -> Self {
        self.fields.push(field);
        self
    }

    pub fn required(self, source: &str, target: &str) -> Self {
        self.field(FieldExtractor::new(source, target, true))
    }

    pub fn optional(self, source: &str, target: &str) -> Self {
        self.field(FieldExtractor::new(source, target, false))
    }

    /// Adds a rule whose raw value goes through `transform` first.
    pub fn transform<F>(self, source: &str, target: &str, required: bool, transform: F) -> Self
    where
        F: Fn(&Value) -> Result<Value> + Send + Sync + 'static,
    {
        self.field(FieldExtractor::new(source, target, required).with_transform(transform))
    }

    /// Builds the output object for one item.
    ///
    /// A failing required rule aborts with its error. A failing optional
    /// rule is logged and left out, as is any rule producing `null`.
    pub fn apply_value(&self, item: &Value) -> Result<Value> {
        let mut out = Map::new();
        for field in &self.fields {
            match field.resolve(item) {
                Ok(Value::Null) if field.required => {
                    return Err(Error::parse(format!(
                        "{}: required field '{}' is null",
                        self.name, field.target
                    ))
                    .with_context("path", &field.source));
                }
                Ok(Value::Null) => {}
                Ok(value) => {
                    out.insert(field.target.clone(), value);
                }
                Err(err) if field.required => {
                    return Err(err
                        .wrap(format!("{}: required field '{}'", self.name, field.target))
                        .with_context("extractor", &self.name));
                }
                Err(err) => {
                    debug!(
                        extractor = %self.name,
                        field = %field.target,
                        error = %err,
                        "optional field skipped"
                    );
                }
            }
        }
        Ok(Value::Object(out))
    }

    /// Builds a fresh `T` from one item.
    pub fn apply<T: DeserializeOwned>(&self, item: &Value) -> Result<T> {
        let value = self.apply_value(item)?;
        serde_json::from_value(value)
            .map_err(|e| Error::from(e).wrap(format!("{}: output shape mismatch", self.name)))
    }

    /// Builds a fresh `T` from a typed record.
    pub fn apply_record<S, T>(&self, record: &S) -> Result<T>
    where
        S: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.apply(&serde_json::to_value(record)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Category, Sentinel};
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Row {
        id: String,
        #[serde(default)]
        number: Option<f64>,
        #[serde(default)]
        tags: Vec<String>,
    }

    #[derive(Serialize)]
    struct Record {
        #[serde(rename = "chapterId")]
        chapter_id: String,
        pages: Vec<&'static str>,
    }

    #[test]
    fn test_walk_dispatches_on_node_kind() {
        let value = json!({"data": [{"attributes": {"Title": "x"}}]});
        let found = walk(&value, &Path::parse("data.0.attributes.Title")).unwrap();
        assert_eq!(found, "x");

        let err = walk(&value, &Path::parse("data.0.attributes.title")).unwrap_err();
        assert!(err.is(Sentinel::Parse));
        assert_eq!(err.context().get("key").map(String::as_str), Some("title"));

        assert!(walk(&value, &Path::parse("data.3")).is_err());
        assert!(walk(&value, &Path::parse("data.-1")).is_err());
        assert_eq!(walk(&value, &Path::parse("")).unwrap(), &value);
    }

    #[test]
    fn test_extract_from_record_uses_field_names() {
        let record = Record {
            chapter_id: "c1".into(),
            pages: vec!["a.png", "b.png"],
        };
        assert_eq!(extract(&record, &Path::parse("chapterId")).unwrap(), "c1");
        assert_eq!(extract(&record, &Path::parse("pages.1")).unwrap(), "b.png");
        assert!(extract(&record, &Path::parse("chapter_id")).is_err());
    }

    #[test]
    fn test_required_failure_aborts() {
        let set = ExtractorSet::new("row").required("id", "id");
        let err = set.apply::<Row>(&json!({"number": 1})).unwrap_err();
        assert_eq!(err.category(), Category::Parser);
        assert!(err.to_string().contains("required field 'id'"));
    }

    #[test]
    fn test_optional_failure_is_skipped() {
        let set = ExtractorSet::new("row")
            .required("id", "id")
            .optional("attributes.chapter", "number")
            .optional("tags", "tags");
        let row: Row = set.apply(&json!({"id": "a", "tags": null})).unwrap();
        assert_eq!(
            row,
            Row {
                id: "a".into(),
                number: None,
                tags: vec![]
            }
        );
    }

    #[test]
    fn test_transform_may_change_kind() {
        let set = ExtractorSet::new("row").required("id", "id").transform(
            "attributes.chapter",
            "number",
            false,
            |v| Ok(v.as_str().and_then(|s| s.parse::<f64>().ok()).into()),
        );
        let row: Row = set
            .apply(&json!({"id": "a", "attributes": {"chapter": "12.5"}}))
            .unwrap();
        assert_eq!(row.number, Some(12.5));
    }
}
