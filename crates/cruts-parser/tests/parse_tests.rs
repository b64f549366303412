//! End-to-end parsing tests against generated CRU TS 2.1 files.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::NaiveDate;

use cruts_parser::CruTsSupplier;
use grid_common::{
    DataConsumer, DataResult, DataSupplier, Dataset, RecordBatch, Reporter, Value,
};

const HEADER_1: &str =
    "Tyndall Centre grim file created on 22.01.2004 at 13.52 by Dr. Tim Mitchell";
const HEADER_2: &str = ".pre = precipitation (mm)";
const HEADER_3: &str = "CRU TS 2.1";
const HEADER_4: &str = "[Long=-180.00, 180.00] [Lati= -90.00,  90.00] [Grid X,Y= 720, 360]";

fn header(start_year: i32, end_year: i32) -> String {
    format!(
        "{}\n{}\n{}\n{}\n[Boxes=   67420] [Years={}-{}] [Multi=    0.1] [Missing=-999]\n",
        HEADER_1, HEADER_2, HEADER_3, HEADER_4, start_year, end_year
    )
}

fn data_line(values: &[i32]) -> String {
    assert_eq!(values.len(), 12);
    values.iter().map(|v| format!("{:>5}", v)).collect()
}

fn block(x: i32, y: i32, years: usize, values: &[i32]) -> String {
    let mut out = format!("Grid-ref={:>4},{:>4}\n", x, y);
    for _ in 0..years {
        out.push_str(&data_line(values));
        out.push('\n');
    }
    out
}

fn write_file(dir: &Path, name: &str, contents: &str) {
    fs::write(dir.join(name), contents).unwrap();
}

fn supplier_for(dir: &Path, names: &[&str]) -> CruTsSupplier {
    let mut supplier = CruTsSupplier::new();
    supplier.set_source(PathBuf::from(dir));
    supplier.set_file_names(names.iter().map(|s| s.to_string()).collect());
    supplier.set_reporter(Reporter::disabled());
    supplier
}

/// Consumer that records every pushed batch in memory.
#[derive(Default, Clone)]
struct CollectingConsumer {
    batches: Arc<Mutex<Vec<RecordBatch>>>,
    disconnected: Arc<Mutex<bool>>,
}

#[async_trait]
impl DataConsumer for CollectingConsumer {
    fn set_store(&mut self, _store: &str) {}
    fn set_record_store_names(&mut self, _names: Vec<String>) {}
    fn set_reporter(&mut self, _reporter: Reporter) {}

    async fn initialise(&mut self, _dataset: &Dataset) -> DataResult<()> {
        Ok(())
    }

    async fn bulk_load(&mut self, _dataset: &Dataset) -> DataResult<()> {
        Ok(())
    }

    async fn load(&mut self, batch: &RecordBatch) -> DataResult<()> {
        self.batches.lock().unwrap().push(batch.clone());
        Ok(())
    }

    async fn connect_store(&mut self) -> DataResult<()> {
        Ok(())
    }

    async fn disconnect_store(&mut self) {
        *self.disconnected.lock().unwrap() = true;
    }
}

#[tokio::test]
async fn estimate_is_exact_for_well_formed_input() {
    let dir = tempfile::tempdir().unwrap();
    let values = [3020, 2820, 3040, 2880, 1740, 1360, 1130, 1280, 1960, 2890, 2860, 2990];
    let mut contents = header(1991, 2000);
    contents.push_str(&block(1, 148, 10, &values));
    write_file(dir.path(), "single.pre", &contents);

    let mut supplier = supplier_for(dir.path(), &["single.pre"]);
    supplier.initialise().await.unwrap();

    // 1 block x 10 years x 12 values per year.
    let dataset = supplier.dataset().unwrap();
    assert_eq!(dataset.estimated_record_count(), 120);
}

#[tokio::test]
async fn estimate_counts_every_block() {
    let dir = tempfile::tempdir().unwrap();
    let values = [1; 12];
    let mut contents = header(2001, 2002);
    for i in 0..3 {
        contents.push_str(&block(i, i + 1, 2, &values));
    }
    write_file(dir.path(), "blocks.pre", &contents);

    let mut supplier = supplier_for(dir.path(), &["blocks.pre"]);
    supplier.initialise().await.unwrap();

    assert_eq!(supplier.dataset().unwrap().estimated_record_count(), 72);
}

#[tokio::test]
async fn unconfigured_supplier_fails() {
    let mut supplier = CruTsSupplier::new();
    let err = supplier.initialise().await.unwrap_err();
    assert!(err.to_string().contains("No file/s chosen"));
}

#[tokio::test]
async fn missing_header_fails_with_format_message() {
    let dir = tempfile::tempdir().unwrap();
    write_file(dir.path(), "notcru.txt", "this is not a grid file\n");

    let mut supplier = supplier_for(dir.path(), &["notcru.txt"]);
    let err = supplier.initialise().await.unwrap_err();
    let msg = err.to_string().to_lowercase();
    assert!(msg.contains("format") || msg.contains("header"));
}

#[tokio::test]
async fn bad_header_date_names_the_date() {
    let dir = tempfile::tempdir().unwrap();
    let bad = header(1991, 1992).replacen("22.01.2004", "29.02.2005", 1);
    write_file(dir.path(), "baddate.pre", &bad);

    let mut supplier = supplier_for(dir.path(), &["baddate.pre"]);
    let err = supplier.initialise().await.unwrap_err();
    assert!(err.to_string().contains("29.02.2005"));
}

#[tokio::test]
async fn empty_data_section_fails() {
    let dir = tempfile::tempdir().unwrap();
    write_file(dir.path(), "empty.pre", &header(1991, 2000));

    let mut supplier = supplier_for(dir.path(), &["empty.pre"]);
    let err = supplier.initialise().await.unwrap_err();
    assert!(err.to_string().contains("does not appear to contain data"));
}

#[tokio::test]
async fn blank_slot_fails_with_missing_data_message() {
    let dir = tempfile::tempdir().unwrap();
    let mut contents = header(1991, 1991);
    contents.push_str("Grid-ref=   1,   2\n");
    // Slot seven is blank: five spaces in a line of otherwise valid values.
    let mut line = data_line(&[10; 12]);
    line.replace_range(30..35, "     ");
    contents.push_str(&line);
    contents.push('\n');
    write_file(dir.path(), "gap.pre", &contents);

    let mut supplier = supplier_for(dir.path(), &["gap.pre"]);
    supplier.initialise().await.unwrap();
    let err = supplier.read_data().await.unwrap_err();
    assert!(err.to_string().contains("missing data"));
}

#[tokio::test]
async fn overlong_line_fails_with_extra_message() {
    let dir = tempfile::tempdir().unwrap();
    let mut contents = header(1991, 1991);
    contents.push_str("Grid-ref=   1,   2\n");
    contents.push_str(&data_line(&[10; 12]));
    contents.push_str("   42\n"); // a thirteenth slot
    write_file(dir.path(), "extra.pre", &contents);

    let mut supplier = supplier_for(dir.path(), &["extra.pre"]);
    supplier.initialise().await.unwrap();
    let err = supplier.read_data().await.unwrap_err();
    let msg = err.to_string().to_lowercase();
    assert!(msg.contains("extra") || msg.contains("ill-formatted"));
}

#[tokio::test]
async fn short_line_fails_with_ill_formatted_message() {
    let dir = tempfile::tempdir().unwrap();
    let mut contents = header(1991, 1991);
    contents.push_str("Grid-ref=   1,   2\n");
    contents.push_str(&data_line(&[10; 12])[..55]);
    contents.push('\n');
    write_file(dir.path(), "short.pre", &contents);

    let mut supplier = supplier_for(dir.path(), &["short.pre"]);
    supplier.initialise().await.unwrap();
    let err = supplier.read_data().await.unwrap_err();
    assert!(err.to_string().contains("Ill-formatted"));
}

#[tokio::test]
async fn multibyte_character_fails_with_ill_formatted_message() {
    let dir = tempfile::tempdir().unwrap();
    let mut contents = header(1991, 1991);
    contents.push_str("Grid-ref=   1,   2\n");
    // 60 bytes overall, but the two-byte character straddles the first
    // slot boundary; this must fail cleanly rather than panic.
    let mut line = String::from("   1é");
    line.push_str(&" 1234".repeat(10));
    line.push_str("9999");
    assert_eq!(line.len(), 60);
    contents.push_str(&line);
    contents.push('\n');
    write_file(dir.path(), "multibyte.pre", &contents);

    let mut supplier = supplier_for(dir.path(), &["multibyte.pre"]);
    supplier.initialise().await.unwrap();
    let err = supplier.read_data().await.unwrap_err();
    assert!(err.to_string().contains("Ill-formatted"));
}

#[tokio::test]
async fn full_width_adjacent_digits_parse() {
    // Width defines token boundaries; twelve five-digit numbers with no
    // separators form one valid 60-character line.
    let dir = tempfile::tempdir().unwrap();
    let mut contents = header(1991, 1991);
    contents.push_str("Grid-ref=   1,   2\n");
    contents.push_str(&"99999".repeat(12));
    contents.push('\n');
    write_file(dir.path(), "largenumberright.pre", &contents);

    let mut supplier = supplier_for(dir.path(), &["largenumberright.pre"]);
    supplier.initialise().await.unwrap();
    supplier.read_data().await.unwrap();

    let table = &supplier.dataset().unwrap().tables()[0];
    assert_eq!(table.row_count(), 12);
    for row in table.rows() {
        assert_eq!(row.values()[3], Value::Decimal(99999.0));
    }
}

#[tokio::test]
async fn read_data_materialises_expected_rows() {
    let dir = tempfile::tempdir().unwrap();
    let values = [3020, 2820, 3040, 2880, 1740, 1360, 1130, 1280, 1960, 2890, 2860, 2990];
    let mut contents = header(1991, 2000);
    contents.push_str(&block(1, 148, 10, &values));
    write_file(dir.path(), "single.pre", &contents);

    let mut supplier = supplier_for(dir.path(), &["single.pre"]);
    supplier.initialise().await.unwrap();
    supplier.read_data().await.unwrap();

    let dataset = supplier.dataset().unwrap();
    let table = &dataset.tables()[0];
    assert_eq!(table.row_count(), 120);

    let first = table.rows().first().unwrap();
    assert_eq!(
        first.values(),
        &[
            Value::Decimal(1.0),
            Value::Decimal(148.0),
            Value::Date(NaiveDate::from_ymd_opt(1991, 1, 1).unwrap()),
            Value::Decimal(3020.0),
        ]
    );

    let last = table.rows().last().unwrap();
    assert_eq!(
        last.values(),
        &[
            Value::Decimal(1.0),
            Value::Decimal(148.0),
            Value::Date(NaiveDate::from_ymd_opt(2000, 12, 1).unwrap()),
            Value::Decimal(2990.0),
        ]
    );
}

#[tokio::test]
async fn header_metadata_is_captured() {
    let dir = tempfile::tempdir().unwrap();
    let mut contents = header(1991, 2000);
    contents.push_str(&block(1, 148, 10, &[5; 12]));
    write_file(dir.path(), "meta.pre", &contents);

    let mut supplier = supplier_for(dir.path(), &["meta.pre"]);
    supplier.initialise().await.unwrap();

    let dataset = supplier.dataset().unwrap();
    assert_eq!(dataset.metadata().title.as_deref(), Some("CRU TS 2.1"));
    assert_eq!(
        dataset.metadata().source.as_deref(),
        Some("Tyndall Centre grim file")
    );

    let table_meta = dataset.tables()[0].metadata();
    assert_eq!(table_meta.title.as_deref(), Some("pre 1991 2000 1"));
    assert_eq!(table_meta.creator.as_deref(), Some("Dr. Tim Mitchell"));
    assert_eq!(
        table_meta.date_submitted,
        NaiveDate::from_ymd_opt(2004, 1, 22)
    );
    assert!(table_meta.notes.as_deref().unwrap_or("").contains("720"));
}

#[tokio::test]
async fn push_data_streams_every_block_once() {
    let dir = tempfile::tempdir().unwrap();
    let mut contents = header(2001, 2003);
    for i in 0..4 {
        contents.push_str(&block(i, 100 + i, 3, &[7; 12]));
    }
    write_file(dir.path(), "pushed.pre", &contents);

    let mut supplier = supplier_for(dir.path(), &["pushed.pre"]);
    supplier.initialise().await.unwrap();

    let collector = CollectingConsumer::default();
    let mut listeners: Vec<Box<dyn DataConsumer>> = vec![Box::new(collector.clone())];
    supplier.push_data(&mut listeners).await.unwrap();

    let batches = collector.batches.lock().unwrap();
    assert_eq!(batches.len(), 4);
    let total: usize = batches.iter().map(|b| b.rows.len()).sum();
    assert_eq!(total, 4 * 3 * 12);
    assert!(batches.iter().all(|b| b.holder == 0));

    // Push never signals end-of-stream itself; that is the orchestrator's job.
    assert!(!*collector.disconnected.lock().unwrap());
}

#[tokio::test]
async fn multiple_files_accumulate_estimates_and_tables() {
    let dir = tempfile::tempdir().unwrap();
    let mut first = header(1991, 1992);
    first.push_str(&block(1, 2, 2, &[3; 12]));
    write_file(dir.path(), "one.pre", &first);

    let mut second = header(2001, 2005);
    second.push_str(&block(3, 4, 5, &[4; 12]));
    second.push_str(&block(5, 6, 5, &[4; 12]));
    write_file(dir.path(), "two.pre", &second);

    let mut supplier = supplier_for(dir.path(), &["one.pre", "two.pre"]);
    supplier.initialise().await.unwrap();

    // 1x2x12 + 2x5x12
    assert_eq!(supplier.dataset().unwrap().estimated_record_count(), 144);

    supplier.read_data().await.unwrap();
    let dataset = supplier.dataset().unwrap();
    assert_eq!(dataset.tables()[0].row_count(), 24);
    assert_eq!(dataset.tables()[1].row_count(), 120);
    assert_eq!(
        dataset.tables()[1].metadata().title.as_deref(),
        Some("pre 2001 2005 2")
    );
}
