//! Parser for CRU TS 2.1 gridded climate time-series files.
//!
//! Each source file carries a five-line header followed by data blocks.
//! A block is one `Grid-ref=x,y` line plus one line per year of the
//! series, and each data line is exactly `values-per-year × token-width`
//! characters. The data is width-delimited, not separator-delimited:
//! large values run into their neighbours, so a tokenizer that splits on
//! whitespace would corrupt them.
//!
//! [`CruTsSupplier`] implements the [`DataSupplier`] contract: it builds
//! one record holder per file with fields `Xref`, `Yref`, `Date`, `Value`,
//! and either materialises all rows (`read_data`) or streams them block
//! by block to listeners (`push_data`).

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::NaiveDate;
use tracing::debug;

use grid_common::{
    DataConsumer, DataError, DataResult, DataSupplier, Dataset, FieldType, Metadata, RecordBatch,
    Reporter, Row, Table, Value,
};

const HEADER_LINES: usize = 5;
const VALUES_PER_YEAR: usize = 12;
const TOKEN_WIDTH: usize = 5;

const MSG_NO_FILES: &str = "No file/s chosen to read.";
const MSG_NO_DATA: &str = "At least one of the files does not appear to contain data.";
const MSG_CONNECTION: &str =
    "Cannot connect to file. Please check you have permission to read the file/s.";
const MSG_FILE_FORMAT: &str =
    "Having difficulty reading a file. Are you sure all your files are CRU TS 2.x format?";
const MSG_HEADER_DATE: &str = "There is a problem with a date in a file header: ";
const MSG_HEADER_FORMAT: &str = "There has been a problem reading a file header.";
const MSG_GRID_REF: &str = "There is a problem reading a grid reference in a file.";
const MSG_LINE_FORMAT: &str = "Ill-formatted line, extra, or missing data within: ";
const MSG_MISSING_DATA: &str = "Missing data without missing data flag within: ";
const MSG_EXTRA_VALUES: &str = "Extra / too-long values at: ";

/// Year span parsed from one file's header, cached for block parsing.
#[derive(Debug, Clone, Copy)]
struct FileSpan {
    start_year: i32,
    years: usize,
}

/// Supplier for CRU TS 2.1 format files.
///
/// Single-use: header and position state accumulate during a run, so a
/// fresh instance is required for each unrelated input set.
pub struct CruTsSupplier {
    source: Option<PathBuf>,
    file_names: Vec<String>,
    reporter: Reporter,
    dataset: Option<Dataset>,
    spans: Vec<FileSpan>,
    reader: Option<BufReader<File>>,
    total_estimate: u64,
    progress: u64,
}

impl CruTsSupplier {
    pub fn new() -> Self {
        Self {
            source: None,
            file_names: Vec::new(),
            reporter: Reporter::disabled(),
            dataset: None,
            spans: Vec::new(),
            reader: None,
            total_estimate: 0,
            progress: 0,
        }
    }

    /// The field schema is fixed by the format; the files carry no
    /// schema of their own.
    fn field_names() -> Vec<String> {
        vec![
            "Xref".to_string(),
            "Yref".to_string(),
            "Date".to_string(),
            "Value".to_string(),
        ]
    }

    fn field_types() -> Vec<FieldType> {
        vec![
            FieldType::Decimal,
            FieldType::Decimal,
            FieldType::Date,
            FieldType::Decimal,
        ]
    }

    fn setup_dataset(&mut self) -> DataResult<()> {
        let mut dataset = Dataset::new(Metadata::new());
        for _ in 0..self.file_names.len() {
            dataset.add_table(Table::new(
                Metadata::new(),
                Self::field_names(),
                Self::field_types(),
            )?);
        }
        self.dataset = Some(dataset);
        Ok(())
    }

    /// Read up to `count` lines. `None` only when the file is exhausted;
    /// a short final group is returned as-is and the next call is `None`.
    fn read_lines(&mut self, count: usize) -> DataResult<Option<Vec<String>>> {
        let reader = self
            .reader
            .as_mut()
            .ok_or_else(|| DataError::Configuration(MSG_CONNECTION.to_string()))?;

        let mut lines = Vec::with_capacity(count);
        for _ in 0..count {
            let mut line = String::new();
            let read = reader.read_line(&mut line)?;
            if read == 0 {
                break;
            }
            while line.ends_with('\n') || line.ends_with('\r') {
                line.pop();
            }
            lines.push(line);
        }

        if lines.is_empty() {
            Ok(None)
        } else {
            Ok(Some(lines))
        }
    }

    /// Parse the five-line header of file `index`, filling dataset and
    /// record-holder metadata and caching the year span.
    fn parse_header(&mut self, index: usize) -> DataResult<()> {
        let header = self
            .read_lines(HEADER_LINES)?
            .filter(|lines| lines.len() == HEADER_LINES)
            .ok_or_else(|| DataError::Format(MSG_FILE_FORMAT.to_string()))?;

        // Line 1: "<source> created on <dd.mm.yyyy> at <hh.mm> by <creator>"
        let line1 = &header[0];
        let source = line1
            .split(" created")
            .next()
            .filter(|_| line1.contains(" created"))
            .ok_or_else(|| DataError::Format(MSG_FILE_FORMAT.to_string()))?
            .to_string();

        let date_string = between(line1, "on ", " at")
            .ok_or_else(|| DataError::Format(MSG_HEADER_FORMAT.to_string()))?;
        let submitted = NaiveDate::parse_from_str(date_string, "%d.%m.%Y")
            .map_err(|_| DataError::Format(format!("{}{}", MSG_HEADER_DATE, date_string)))?;

        let creator = after(line1, "by ")
            .ok_or_else(|| DataError::Format(MSG_HEADER_FORMAT.to_string()))?
            .to_string();

        // Line 2: observation code between "." and "=".
        let observation = between(&header[1], ".", "=")
            .ok_or_else(|| DataError::Format(MSG_HEADER_FORMAT.to_string()))?
            .trim()
            .to_string();

        // Line 3: human-readable dataset title.
        let title = header[2].clone();

        // Line 4: bounding box, three bracketed groups.
        let box_line = &header[3];
        let (long_min, long_max) = bracket_pair(box_line, "[Long=")?;
        let (lati_min, lati_max) = bracket_pair(box_line, "[Lati=")?;
        let (grid_x, grid_y) = bracket_pair(box_line, "[Grid X,Y=")?;

        // Line 5: series descriptor, four bracketed groups.
        let series_line = &header[4];
        let valid_boxes: i64 = bracket_value(series_line, "[Boxes=")?
            .parse()
            .map_err(|_| DataError::Format(MSG_HEADER_FORMAT.to_string()))?;
        let year_range = bracket_value(series_line, "[Years=")?;
        let (start_text, end_text) = year_range
            .split_once('-')
            .ok_or_else(|| DataError::Format(MSG_HEADER_FORMAT.to_string()))?;
        let start_year: i32 = start_text
            .trim()
            .parse()
            .map_err(|_| DataError::Format(MSG_HEADER_FORMAT.to_string()))?;
        let end_year: i32 = end_text
            .trim()
            .parse()
            .map_err(|_| DataError::Format(MSG_HEADER_FORMAT.to_string()))?;
        let multiplier = bracket_value(series_line, "[Multi=")?.to_string();
        let missing_flag = bracket_value(series_line, "[Missing=")?.to_string();

        let years = (end_year - start_year + 1).max(0) as usize;
        if years == 0 {
            return Err(DataError::Format(MSG_HEADER_FORMAT.to_string()));
        }
        self.spans.push(FileSpan { start_year, years });

        let notes = format!(
            "Bounding box: Long={},{} Lati={},{} Grid X,Y={},{} \
             Potential boxes={} Valid boxes={} Years={}-{} \
             Multiplier={} Missing data flag={} \
             NB: multiply data by the multiplier to gain true values.",
            long_min,
            long_max,
            lati_min,
            lati_max,
            grid_x,
            grid_y,
            grid_x * grid_y,
            valid_boxes,
            start_year,
            end_year,
            multiplier,
            missing_flag,
        );

        let dataset = self
            .dataset
            .as_mut()
            .ok_or_else(|| DataError::Configuration(MSG_NO_FILES.to_string()))?;
        let table_title = format!("{} {} {} {}", observation, start_year, end_year, index + 1);

        {
            let meta = dataset.metadata_mut();
            meta.title = Some(title.clone());
            meta.source = Some(source.clone());
        }
        {
            let meta = dataset.tables_mut()[index].metadata_mut();
            meta.title = Some(table_title.clone());
            meta.source = Some(source);
            meta.creator = Some(creator);
            meta.date_submitted = Some(submitted);
            meta.append_note(&notes);
        }

        self.reporter.message(format!(
            "Dataset read in: {}\nDetails from file:\nTitle: {}\nNotes: {}",
            title, table_title, notes
        ));

        Ok(())
    }

    /// Count the data blocks of file `index` and rewind to the end of its
    /// header. Called with the stream positioned just past the header.
    fn estimate_record_count(&mut self, index: usize) -> DataResult<u64> {
        let span = self.spans[index];

        let mut block_count: u64 = 0;
        while self.read_lines(span.years + 1)?.is_some() {
            block_count += 1;
        }

        // Reset the stream to the end of the header.
        self.disconnect_source();
        self.connect_source(index)?;
        self.read_lines(HEADER_LINES)?;

        Ok(block_count * span.years as u64 * VALUES_PER_YEAR as u64)
    }

    /// Parse the next data block of file `index` into rows, or `None` at
    /// end of file.
    fn parse_block(&mut self, index: usize) -> DataResult<Option<Vec<Row>>> {
        let span = self.spans[index];

        let lines = match self.read_lines(span.years + 1)? {
            Some(lines) => lines,
            None => return Ok(None),
        };

        // Block header: "Grid-ref=   x, y"
        let numbers = after(&lines[0], "Grid-ref=")
            .ok_or_else(|| DataError::Format(MSG_GRID_REF.to_string()))?;
        let (x_text, y_text) = numbers
            .split_once(',')
            .ok_or_else(|| DataError::Format(MSG_GRID_REF.to_string()))?;
        let x_ref: f64 = x_text
            .trim()
            .parse()
            .map_err(|_| DataError::Format(MSG_GRID_REF.to_string()))?;
        let y_ref: f64 = y_text
            .trim()
            .parse()
            .map_err(|_| DataError::Format(MSG_GRID_REF.to_string()))?;

        let expected_width = VALUES_PER_YEAR * TOKEN_WIDTH;
        let mut rows = Vec::with_capacity((lines.len() - 1) * VALUES_PER_YEAR);
        let mut current_year = span.start_year;

        for line in &lines[1..] {
            if line.len() > expected_width {
                return Err(DataError::DataQuality(format!(
                    "{}{}",
                    MSG_EXTRA_VALUES, line
                )));
            }
            if line.len() != expected_width {
                return Err(DataError::DataQuality(format!(
                    "{}{}",
                    MSG_LINE_FORMAT, line
                )));
            }

            for month in 0..VALUES_PER_YEAR {
                let start = month * TOKEN_WIDTH;
                // The width check above is in bytes; a multibyte character
                // can still straddle a slot boundary, so slice fallibly.
                let token = line
                    .get(start..start + TOKEN_WIDTH)
                    .ok_or_else(|| {
                        DataError::DataQuality(format!("{}{}", MSG_LINE_FORMAT, line))
                    })?
                    .trim();
                if token.is_empty() {
                    return Err(DataError::DataQuality(format!(
                        "{}{}",
                        MSG_MISSING_DATA, line
                    )));
                }
                let value: f64 = token.parse().map_err(|_| {
                    DataError::DataQuality(format!("{}{}", MSG_LINE_FORMAT, line))
                })?;

                let date = NaiveDate::from_ymd_opt(current_year, month as u32 + 1, 1)
                    .ok_or_else(|| DataError::Format(MSG_HEADER_FORMAT.to_string()))?;

                rows.push(Row::from_values(vec![
                    Value::Decimal(x_ref),
                    Value::Decimal(y_ref),
                    Value::Date(date),
                    Value::Decimal(value),
                ]));

                self.progress += 1;
                self.reporter
                    .record_progress(self.progress, self.total_estimate);
            }

            current_year += 1;
        }

        Ok(Some(rows))
    }

    /// Reopen file `index` and skip its header, ready for block reads.
    fn rewind_to_data(&mut self, index: usize) -> DataResult<()> {
        self.disconnect_source();
        self.connect_source(index)?;
        self.read_lines(HEADER_LINES)?;
        Ok(())
    }
}

impl Default for CruTsSupplier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DataSupplier for CruTsSupplier {
    fn set_source(&mut self, source: PathBuf) {
        self.source = Some(source);
    }

    fn set_file_names(&mut self, names: Vec<String>) {
        self.file_names = names;
    }

    fn set_reporter(&mut self, reporter: Reporter) {
        self.reporter = reporter;
    }

    fn source_files(&self) -> Vec<PathBuf> {
        match &self.source {
            Some(dir) => self.file_names.iter().map(|name| dir.join(name)).collect(),
            None => Vec::new(),
        }
    }

    async fn initialise(&mut self) -> DataResult<()> {
        if self.source.is_none() || self.file_names.is_empty() {
            return Err(DataError::Configuration(MSG_NO_FILES.to_string()));
        }

        self.setup_dataset()?;
        self.spans.clear();
        self.total_estimate = 0;
        self.progress = 0;

        for index in 0..self.file_names.len() {
            self.connect_source(index)?;
            self.parse_header(index)?;

            let estimate = self.estimate_record_count(index)?;
            if estimate == 0 {
                return Err(DataError::DataQuality(MSG_NO_DATA.to_string()));
            }
            self.total_estimate += estimate;
        }

        if let Some(dataset) = self.dataset.as_mut() {
            dataset.set_estimated_record_count(self.total_estimate);
        }
        self.disconnect_source();

        Ok(())
    }

    fn dataset(&self) -> Option<&Dataset> {
        self.dataset.as_ref()
    }

    fn dataset_mut(&mut self) -> Option<&mut Dataset> {
        self.dataset.as_mut()
    }

    async fn read_data(&mut self) -> DataResult<()> {
        self.reporter.message("Reading in file.");

        for index in 0..self.file_names.len() {
            self.rewind_to_data(index)?;

            while let Some(rows) = self.parse_block(index)? {
                if let Some(dataset) = self.dataset.as_mut() {
                    dataset.tables_mut()[index].add_rows(rows);
                }
            }
        }

        self.reporter.reset();
        self.disconnect_source();
        Ok(())
    }

    async fn push_data(
        &mut self,
        listeners: &mut [Box<dyn DataConsumer>],
    ) -> DataResult<()> {
        self.reporter.message("Pushing data file piecemeal.");
        self.reporter.progress(2, 100);

        for index in 0..self.file_names.len() {
            self.rewind_to_data(index)?;

            while let Some(rows) = self.parse_block(index)? {
                let batch = RecordBatch {
                    holder: index,
                    rows,
                };
                for listener in listeners.iter_mut() {
                    listener.load(&batch).await?;
                }
                // The batch drops here; blocks are never retained.
            }
        }

        self.reporter.reset();
        self.disconnect_source();
        Ok(())
    }

    fn connect_source(&mut self, index: usize) -> DataResult<()> {
        let dir = self
            .source
            .as_ref()
            .ok_or_else(|| DataError::Configuration(MSG_NO_FILES.to_string()))?;
        let name = self
            .file_names
            .get(index)
            .ok_or_else(|| DataError::Configuration(MSG_NO_FILES.to_string()))?;

        let path = dir.join(name);
        let file = File::open(&path)
            .map_err(|_| DataError::Configuration(MSG_CONNECTION.to_string()))?;
        self.reader = Some(BufReader::new(file));
        Ok(())
    }

    fn disconnect_source(&mut self) {
        if self.reader.take().is_some() {
            debug!("source stream closed");
        }
    }
}

/// The substring between `start` and the next occurrence of `end`.
fn between<'a>(text: &'a str, start: &str, end: &str) -> Option<&'a str> {
    let from = text.find(start)? + start.len();
    let to = text[from..].find(end)? + from;
    Some(&text[from..to])
}

/// The substring after the first occurrence of `marker`.
fn after<'a>(text: &'a str, marker: &str) -> Option<&'a str> {
    let from = text.find(marker)? + marker.len();
    Some(&text[from..])
}

/// The trimmed contents of a `[Key=...]` bracketed group.
fn bracket_value<'a>(text: &'a str, key: &str) -> DataResult<&'a str> {
    between(text, key, "]")
        .map(str::trim)
        .ok_or_else(|| DataError::Format(MSG_HEADER_FORMAT.to_string()))
}

/// A `[Key=a,b]` bracketed group parsed as two numbers.
fn bracket_pair(text: &str, key: &str) -> DataResult<(f64, f64)> {
    let body = bracket_value(text, key)?;
    let (a, b) = body
        .split_once(',')
        .ok_or_else(|| DataError::Format(MSG_HEADER_FORMAT.to_string()))?;
    let a = a
        .trim()
        .parse()
        .map_err(|_| DataError::Format(MSG_HEADER_FORMAT.to_string()))?;
    let b = b
        .trim()
        .parse()
        .map_err(|_| DataError::Format(MSG_HEADER_FORMAT.to_string()))?;
    Ok((a, b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_between_and_after() {
        let line = "Tyndall Centre grim file created on 22.01.2004 at 13.52 by Dr. Tim Mitchell";
        assert_eq!(between(line, "on ", " at"), Some("22.01.2004"));
        assert_eq!(after(line, "by "), Some("Dr. Tim Mitchell"));
        assert_eq!(between(line, "nowhere", " at"), None);
    }

    #[test]
    fn test_bracket_value() {
        let line = "[Boxes=   67420] [Years=1901-2002] [Multi=    0.1] [Missing=-999]";
        assert_eq!(bracket_value(line, "[Boxes=").unwrap(), "67420");
        assert_eq!(bracket_value(line, "[Years=").unwrap(), "1901-2002");
        assert_eq!(bracket_value(line, "[Missing=").unwrap(), "-999");
        assert!(bracket_value(line, "[Absent=").is_err());
    }

    #[test]
    fn test_bracket_pair() {
        let line = "[Long=-180.00, 180.00] [Lati= -90.00,  90.00] [Grid X,Y= 720, 360]";
        assert_eq!(bracket_pair(line, "[Long=").unwrap(), (-180.0, 180.0));
        assert_eq!(bracket_pair(line, "[Grid X,Y=").unwrap(), (720.0, 360.0));
    }
}
