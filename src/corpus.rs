//! Corpus loading and page-level passage assembly.
//!
//! The raw corpus is a JSON array of extraction fragments. Several fragments
//! usually share one printed page; [`preprocess`] folds them into a single
//! [`Passage`] per page so each embedding covers a whole page of text.

use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Merged passages must be strictly longer than this many characters.
pub const MIN_PASSAGE_CHARS: usize = 10;

/// Default JSON key holding a fragment's page number.
pub const DEFAULT_PAGE_FIELD: &str = "文件页码";

/// Default JSON key holding a fragment's text.
pub const DEFAULT_CONTENT_FIELD: &str = "内容";

/// JSON keys used to pull page and content out of raw corpus records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldNames {
    /// Key of the page-number field.
    pub page: String,
    /// Key of the text field.
    pub content: String,
}

impl FieldNames {
    /// Builds a field mapping from explicit keys.
    pub fn new(page: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            page: page.into(),
            content: content.into(),
        }
    }
}

impl Default for FieldNames {
    fn default() -> Self {
        Self::new(DEFAULT_PAGE_FIELD, DEFAULT_CONTENT_FIELD)
    }
}

/// One extraction unit from the corpus dump. Not necessarily a full page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawFragment {
    /// Page key, compared verbatim when grouping.
    pub page: String,
    /// Extracted text.
    pub content: String,
}

impl RawFragment {
    /// Creates a fragment from its page key and text.
    pub fn new(page: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            page: page.into(),
            content: content.into(),
        }
    }

    /// Reads a fragment out of an arbitrary JSON value.
    ///
    /// Missing keys, non-object values and fields of unexpected types all
    /// produce empty strings; [`preprocess`] later skips such fragments.
    pub fn from_value(value: &Value, fields: &FieldNames) -> Self {
        let page = value.get(&fields.page).map(lenient_string);
        let content = value.get(&fields.content).map(lenient_string);
        Self {
            page: page.unwrap_or_default(),
            content: content.unwrap_or_default(),
        }
    }
}

fn lenient_string(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Number(number) => number.to_string(),
        _ => String::new(),
    }
}

/// One page of merged text belonging to one book.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Passage {
    /// Page key shared by every merged fragment.
    pub page: String,
    /// Newline-joined fragment text in encounter order.
    pub content: String,
    /// Book the passage was imported for.
    pub book: String,
}

/// Loads raw fragments from a JSON array on disk.
pub fn load_fragments(path: &Path, fields: &FieldNames) -> Result<Vec<RawFragment>> {
    let file =
        File::open(path).with_context(|| format!("failed to open corpus file {:?}", path))?;
    let value: Value = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("corpus file {:?} is not valid JSON", path))?;
    fragments_from_value(&value, fields)
        .with_context(|| format!("unexpected corpus layout in {:?}", path))
}

/// Extracts fragments from an already-parsed JSON document.
pub fn fragments_from_value(value: &Value, fields: &FieldNames) -> Result<Vec<RawFragment>> {
    let records = value
        .as_array()
        .context("corpus must be a JSON array of fragment objects")?;
    Ok(records
        .iter()
        .map(|record| RawFragment::from_value(record, fields))
        .collect())
}

/// Groups fragments by page and merges each group into one passage.
///
/// Fragments with a blank page or blank content are dropped before grouping.
/// Groups whose merged text is [`MIN_PASSAGE_CHARS`] characters or shorter are
/// dropped afterwards. Pages are emitted in the order they were first seen.
pub fn preprocess<'a, I>(fragments: I, book: &str) -> Vec<Passage>
where
    I: IntoIterator<Item = &'a RawFragment>,
{
    let mut order: Vec<&str> = Vec::new();
    let mut pages: HashMap<&str, Vec<&str>> = HashMap::new();
    for fragment in fragments {
        let page = fragment.page.as_str();
        let content = fragment.content.trim();
        if page.trim().is_empty() || content.is_empty() {
            continue;
        }
        pages
            .entry(page)
            .or_insert_with(|| {
                order.push(page);
                Vec::new()
            })
            .push(content);
    }

    order
        .into_iter()
        .filter_map(|page| {
            let merged = pages.remove(page)?.join("\n");
            (merged.chars().count() > MIN_PASSAGE_CHARS).then(|| Passage {
                page: page.to_string(),
                content: merged,
                book: book.to_string(),
            })
        })
        .collect()
}
