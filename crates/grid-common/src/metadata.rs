//! Dataset and record-holder metadata.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A metadata value: either free text or a calendar date.
///
/// `None` means the field was never populated; sinks persist it with an
/// explicit missing marker rather than dropping the entry.
#[derive(Debug, Clone, PartialEq)]
pub enum MetadataValue {
    Text(Option<String>),
    Date(Option<NaiveDate>),
}

impl MetadataValue {
    /// Render for persistence. Unset fields become the missing marker.
    pub fn to_stored_string(&self) -> String {
        match self {
            MetadataValue::Text(Some(s)) if !s.is_empty() => s.clone(),
            MetadataValue::Date(Some(d)) => d.format("%Y-%m-%d").to_string(),
            _ => MISSING_MARKER.to_string(),
        }
    }
}

/// Written to metadata stores in place of unset fields.
pub const MISSING_MARKER: &str = "MISSINGFROMDATASET";

/// A fixed, closed set of descriptive fields attached to a dataset or
/// record holder.
///
/// The set is a Dublin Core subset with additions. Other components
/// discover the contents only through [`Metadata::entries`], so the field
/// set and its order are part of the public contract.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Metadata {
    pub standard: Option<String>,
    pub title: Option<String>,
    pub creator: Option<String>,
    pub source: Option<String>,
    pub notes: Option<String>,
    pub date_submitted: Option<NaiveDate>,
    pub date_last_edited: Option<NaiveDate>,
    pub date_format: Option<String>,
    pub version: Option<String>,
}

impl Metadata {
    /// Empty metadata with the describing standard pre-filled.
    pub fn new() -> Self {
        Self {
            standard: Some("Dublin Core subset with additions".to_string()),
            notes: Some(String::new()),
            date_format: Some("yyyy-mm-dd".to_string()),
            ..Default::default()
        }
    }

    /// All fields as `(name, value)` pairs in a fixed, stable order.
    pub fn entries(&self) -> Vec<(&'static str, MetadataValue)> {
        vec![
            ("standard", MetadataValue::Text(self.standard.clone())),
            ("title", MetadataValue::Text(self.title.clone())),
            ("creator", MetadataValue::Text(self.creator.clone())),
            ("source", MetadataValue::Text(self.source.clone())),
            ("notes", MetadataValue::Text(self.notes.clone())),
            ("dateSubmitted", MetadataValue::Date(self.date_submitted)),
            ("dateLastEdited", MetadataValue::Date(self.date_last_edited)),
            ("dateFormat", MetadataValue::Text(self.date_format.clone())),
            ("version", MetadataValue::Text(self.version.clone())),
        ]
    }

    /// Append a fragment to the notes field.
    pub fn append_note(&mut self, note: &str) {
        match &mut self.notes {
            Some(existing) if !existing.is_empty() => {
                existing.push(' ');
                existing.push_str(note);
            }
            _ => self.notes = Some(note.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entries_fixed_order() {
        let meta = Metadata::new();
        let names: Vec<&str> = meta.entries().iter().map(|(n, _)| *n).collect();
        assert_eq!(
            names,
            vec![
                "standard",
                "title",
                "creator",
                "source",
                "notes",
                "dateSubmitted",
                "dateLastEdited",
                "dateFormat",
                "version",
            ]
        );
    }

    #[test]
    fn test_unset_fields_use_missing_marker() {
        let meta = Metadata::default();
        let entries = meta.entries();
        let (_, title) = &entries[1];
        assert_eq!(title.to_stored_string(), MISSING_MARKER);
    }

    #[test]
    fn test_date_renders_iso() {
        let value = MetadataValue::Date(NaiveDate::from_ymd_opt(2004, 1, 22));
        assert_eq!(value.to_stored_string(), "2004-01-22");
    }

    #[test]
    fn test_append_note() {
        let mut meta = Metadata::new();
        meta.append_note("[Long=-180.00, 180.00]");
        meta.append_note("[Lati= -90.00, 90.00]");
        assert_eq!(
            meta.notes.as_deref(),
            Some("[Long=-180.00, 180.00] [Lati= -90.00, 90.00]")
        );
    }
}
