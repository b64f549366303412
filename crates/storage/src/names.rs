//! Store-name derivation and value rendering shared by the sink writers.
//!
//! Every writer derives the same names from dataset metadata and then
//! applies its own sanitisation level (object names for the database,
//! file names for the filesystem-shaped backends).

use grid_common::metadata::Metadata;
use grid_common::sanitise;
use grid_common::{DataError, DataResult, Dataset, Value};

/// Fallback when a dataset or record holder carries no title.
pub const DEFAULT_TITLE: &str = "DEFAULT";

const MSG_NAME_COUNT: &str =
    "Number of record store names and number of record holders to store do not match.";

/// The dataset's raw title, or the fixed default.
pub fn dataset_title(dataset: &Dataset) -> String {
    dataset
        .metadata()
        .title
        .clone()
        .filter(|t| !t.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_TITLE.to_string())
}

/// One store name per record holder.
///
/// Pre-set names win but must match the record holder count. Otherwise
/// names come from holder titles, with a positional ordinal appended to
/// untitled or repeated titles. `sanitiser` is the backend's identifier
/// rule, applied last.
pub fn derive_store_names(
    dataset: &Dataset,
    preset: Option<&[String]>,
    sanitiser: fn(&str) -> String,
) -> DataResult<Vec<String>> {
    if let Some(preset) = preset {
        if preset.len() != dataset.tables().len() {
            return Err(DataError::Configuration(MSG_NAME_COUNT.to_string()));
        }
        return Ok(preset.iter().map(|name| sanitiser(name)).collect());
    }

    let raw: Vec<String> = dataset
        .tables()
        .iter()
        .map(|table| {
            table
                .metadata()
                .title
                .clone()
                .filter(|t| !t.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_TITLE.to_string())
        })
        .collect();

    let names = raw
        .iter()
        .enumerate()
        .map(|(i, title)| {
            let repeated = raw.iter().filter(|other| *other == title).count() > 1;
            if title == DEFAULT_TITLE || repeated {
                sanitiser(&format!("{}{}", title, i + 1))
            } else {
                sanitiser(title)
            }
        })
        .collect();

    Ok(names)
}

/// Render a value for persistence; text passes the weak level.
pub fn stored_value(value: &Value) -> String {
    match value {
        Value::Text(text) => sanitise::weak(text),
        other => other.to_string(),
    }
}

/// Render a value for a CSV cell: weak level plus comma folding.
pub fn csv_value(value: &Value) -> String {
    stored_value(value).replace(',', ";")
}

/// Metadata as `category=value` property lines; embedded newlines fold
/// to `" | "` so each entry stays on one line.
pub fn metadata_properties(metadata: &Metadata) -> String {
    let mut out = String::new();
    for (category, value) in metadata.entries() {
        let rendered = sanitise::weak(&value.to_stored_string()).replace('\n', " | ");
        out.push_str(category);
        out.push('=');
        out.push_str(&rendered);
        out.push('\n');
    }
    out
}
