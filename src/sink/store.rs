// src/sink/store.rs

use std::{
    fs::{self, File},
    io::{self, BufWriter, Write},
    path::{Path, PathBuf},
};

use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use glob::glob;
use parquet::arrow::arrow_reader::{ParquetRecordBatchReader, ParquetRecordBatchReaderBuilder};
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use parquet::file::reader::{FileReader, SerializedFileReader};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info};

use super::convert::records_to_batch;
use super::{check_columns, take_rows, validate_dataset_name, DatasetReader, Sink};
use crate::decode::Record;
use crate::error::{IngestError, Result};
use crate::layout::{build_arrow_schema, columns_arrow_schema, Schema};

const COLUMNS_FILE: &str = "_columns.json";
const LAYOUT_FILE: &str = "_layout.json";
const PART_PREFIX: &str = "part-";
const READ_BATCH_ROWS: usize = 8192;

/// Directory-backed columnar store.
///
/// Each dataset is a directory under `root` holding the ordered column list
/// (`_columns.json`), the layout it was loaded with when there was one
/// (`_layout.json`), and one Parquet file per written batch
/// (`part-00000.parquet`, `part-00001.parquet`, ...). Files are written to a
/// `.tmp` path first and renamed into place, so readers never see a
/// half-written part.
pub struct ParquetSink {
    root: PathBuf,
    props: WriterProperties,
}

impl ParquetSink {
    /// Open a store rooted at `root`, creating the directory if needed.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| IngestError::io(&root, e))?;
        Ok(Self {
            root,
            props: writer_properties(),
        })
    }

    /// Open a store that must already exist. Never touches the filesystem
    /// beyond checking `root`, so it suits read-only callers.
    pub fn open_existing(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        if !root.is_dir() {
            let e = io::Error::new(io::ErrorKind::NotFound, "store directory does not exist");
            return Err(IngestError::io(&root, e));
        }
        Ok(Self {
            root,
            props: writer_properties(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn dataset_dir(&self, dataset: &str) -> Result<PathBuf> {
        validate_dataset_name(dataset)?;
        Ok(self.root.join(dataset))
    }

    pub fn exists(&self, dataset: &str) -> Result<bool> {
        Ok(self.dataset_dir(dataset)?.join(COLUMNS_FILE).is_file())
    }

    /// Part files of a dataset, ordered by part index.
    pub fn part_files(&self, dataset: &str) -> Result<Vec<PathBuf>> {
        let dir = self.existing_dir(dataset)?;
        list_parts(&dir)
    }

    /// The layout a dataset was loaded with, if it was loaded from one.
    pub fn layout(&self, dataset: &str) -> Result<Option<Schema>> {
        read_layout(&self.existing_dir(dataset)?)
    }

    fn existing_dir(&self, dataset: &str) -> Result<PathBuf> {
        let dir = self.dataset_dir(dataset)?;
        if !dir.join(COLUMNS_FILE).is_file() {
            return Err(IngestError::DatasetNotFound(dataset.to_string()));
        }
        Ok(dir)
    }

    fn replace(
        &mut self,
        dataset: &str,
        columns: &[String],
        layout: Option<&Schema>,
        rows: &[Record],
    ) -> Result<u64> {
        check_columns(dataset, columns, rows)?;
        let dir = self.dataset_dir(dataset)?;

        if dir.exists() {
            info!(dataset, "dropping existing dataset");
            fs::remove_dir_all(&dir).map_err(|e| IngestError::io(&dir, e))?;
        }
        fs::create_dir_all(&dir).map_err(|e| IngestError::io(&dir, e))?;
        write_json_atomic(&dir.join(COLUMNS_FILE), columns)?;

        let arrow = match layout {
            Some(layout) => {
                write_json_atomic(&dir.join(LAYOUT_FILE), layout)?;
                build_arrow_schema(layout)
            }
            None => columns_arrow_schema(columns),
        };
        self.write_part(&dir, 0, arrow, rows)
    }

    fn write_part(
        &self,
        dir: &Path,
        index: usize,
        arrow: SchemaRef,
        rows: &[Record],
    ) -> Result<u64> {
        let batch = records_to_batch(arrow, rows)?;
        let out_path = dir.join(format!("{}{:05}.parquet", PART_PREFIX, index));
        let temp_path = out_path.with_extension("parquet.tmp");

        if let Err(e) = write_parquet(&temp_path, &batch, &self.props) {
            let _ = fs::remove_file(&temp_path);
            return Err(e);
        }
        fs::rename(&temp_path, &out_path).map_err(|e| IngestError::io(&out_path, e))?;

        debug!(part = %out_path.display(), rows = batch.num_rows(), "wrote part");
        Ok(batch.num_rows() as u64)
    }
}

impl Sink for ParquetSink {
    fn replace_and_write(
        &mut self,
        dataset: &str,
        columns: &[String],
        rows: &[Record],
    ) -> Result<u64> {
        self.replace(dataset, columns, None, rows)
    }

    fn replace_with_layout(
        &mut self,
        dataset: &str,
        layout: &Schema,
        rows: &[Record],
    ) -> Result<u64> {
        self.replace(dataset, &layout.column_names(), Some(layout), rows)
    }

    fn append(&mut self, dataset: &str, rows: &[Record]) -> Result<u64> {
        let dir = self.existing_dir(dataset)?;
        let columns: Vec<String> = read_json(&dir.join(COLUMNS_FILE))?;
        check_columns(dataset, &columns, rows)?;
        if rows.is_empty() {
            return Ok(0);
        }

        // later parts carry the same field metadata as part 0
        let arrow = match read_layout(&dir)? {
            Some(layout) => build_arrow_schema(&layout),
            None => columns_arrow_schema(&columns),
        };
        let index = next_part_index(&list_parts(&dir)?);
        self.write_part(&dir, index, arrow, rows)
    }
}

impl DatasetReader for ParquetSink {
    fn columns(&self, dataset: &str) -> Result<Vec<String>> {
        read_json(&self.existing_dir(dataset)?.join(COLUMNS_FILE))
    }

    fn read_batches(&self, dataset: &str) -> Result<Vec<RecordBatch>> {
        let mut out = Vec::new();
        for path in self.part_files(dataset)? {
            for batch in open_part(&path)? {
                out.push(batch?);
            }
        }
        Ok(out)
    }

    /// Sums row counts from Parquet footers without decoding any pages.
    fn row_count(&self, dataset: &str) -> Result<u64> {
        let mut total = 0u64;
        for path in self.part_files(dataset)? {
            let file = File::open(&path).map_err(|e| IngestError::io(&path, e))?;
            let reader = SerializedFileReader::new(file)?;
            total += reader.metadata().file_metadata().num_rows() as u64;
        }
        Ok(total)
    }

    /// Opens parts one at a time and stops decoding once `limit` rows are in.
    fn read_head(&self, dataset: &str, limit: usize) -> Result<Vec<RecordBatch>> {
        let mut out = Vec::new();
        let mut remaining = limit;
        for path in self.part_files(dataset)? {
            if remaining == 0 {
                break;
            }
            let batches = open_part(&path)?.map(|b| b.map_err(IngestError::from));
            let head = take_rows(batches, remaining)?;
            remaining -= head.iter().map(RecordBatch::num_rows).sum::<usize>();
            out.extend(head);
        }
        Ok(out)
    }
}

fn writer_properties() -> WriterProperties {
    WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .set_dictionary_enabled(true)
        .build()
}

fn open_part(path: &Path) -> Result<ParquetRecordBatchReader> {
    let file = File::open(path).map_err(|e| IngestError::io(path, e))?;
    Ok(ParquetRecordBatchReaderBuilder::try_new(file)?
        .with_batch_size(READ_BATCH_ROWS)
        .build()?)
}

fn write_parquet(path: &Path, batch: &RecordBatch, props: &WriterProperties) -> Result<()> {
    let file = File::create(path).map_err(|e| IngestError::io(path, e))?;
    let mut writer =
        ArrowWriter::try_new(BufWriter::new(file), batch.schema(), Some(props.clone()))?;
    writer.write(batch)?;
    writer.close()?;
    Ok(())
}

/// Write `value` as JSON to a hidden tmp file beside `path`, then rename
/// over. The tmp file is removed if anything fails before the rename.
fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp_path = path.with_file_name(format!(".{}.tmp", file_name));

    let written = (|| -> Result<()> {
        let mut tmp = File::create(&tmp_path).map_err(|e| IngestError::io(&tmp_path, e))?;
        serde_json::to_writer_pretty(&mut tmp, value)?;
        tmp.write_all(b"\n").map_err(|e| IngestError::io(&tmp_path, e))
    })();
    if let Err(e) = written {
        let _ = fs::remove_file(&tmp_path);
        return Err(e);
    }

    fs::rename(&tmp_path, path).map_err(|e| IngestError::io(path, e))
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let f = File::open(path).map_err(|e| IngestError::io(path, e))?;
    Ok(serde_json::from_reader(f)?)
}

fn read_layout(dir: &Path) -> Result<Option<Schema>> {
    let path = dir.join(LAYOUT_FILE);
    if !path.is_file() {
        return Ok(None);
    }
    read_json(&path).map(Some)
}

fn list_parts(dir: &Path) -> Result<Vec<PathBuf>> {
    let pattern = format!(
        "{}/{}*.parquet",
        glob::Pattern::escape(&dir.display().to_string()),
        PART_PREFIX
    );
    let entries = glob(&pattern).map_err(|e| IngestError::Storage(e.to_string()))?;

    let mut parts: Vec<(usize, PathBuf)> = entries
        .filter_map(|entry| entry.ok())
        .filter_map(|path| part_index(&path).map(|idx| (idx, path)))
        .collect();
    parts.sort_by_key(|(idx, _)| *idx);
    Ok(parts.into_iter().map(|(_, path)| path).collect())
}

fn part_index(path: &Path) -> Option<usize> {
    path.file_stem()?
        .to_str()?
        .strip_prefix(PART_PREFIX)?
        .parse()
        .ok()
}

fn next_part_index(parts: &[PathBuf]) -> usize {
    parts
        .iter()
        .filter_map(|p| part_index(p))
        .max()
        .map_or(0, |idx| idx + 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::{Decoder, MissingTokens};
    use crate::layout::parse;
    use crate::sink::batches_to_rows;
    use tempfile::tempdir;

    fn decoder(layout: &str) -> Decoder {
        Decoder::new(parse(layout), MissingTokens::default())
    }

    #[test]
    fn replace_then_append_accumulates_parts() -> anyhow::Result<()> {
        let tmp = tempdir()?;
        let mut sink = ParquetSink::open(tmp.path().join("store"))?;
        let d = decoder("INPUT\n AGE 1-2\n SEX $3-3\n;\n");
        let cols = d.columns().to_vec();

        let first = [d.decode_line("29M"), d.decode_line("L F")];
        let n = sink.replace_and_write("nssrn", &cols, &first)?;
        assert_eq!(n, 2);
        let n = sink.append("nssrn", &[d.decode_line("41F")])?;
        assert_eq!(n, 1);

        assert_eq!(sink.columns("nssrn")?, cols);
        assert_eq!(sink.row_count("nssrn")?, 3);
        assert_eq!(sink.part_files("nssrn")?.len(), 2);

        let rows = batches_to_rows(&sink.read_batches("nssrn")?)?;
        assert_eq!(
            rows,
            vec![
                vec![Some("29".to_string()), Some("M".to_string())],
                vec![None, Some("F".to_string())],
                vec![Some("41".to_string()), Some("F".to_string())],
            ]
        );
        Ok(())
    }

    #[test]
    fn replace_drops_previous_contents() -> anyhow::Result<()> {
        let tmp = tempdir()?;
        let mut sink = ParquetSink::open(tmp.path())?;
        let d = decoder("INPUT\n A 1-1\n;\n");
        let cols = d.columns().to_vec();

        sink.replace_and_write("t", &cols, &[d.decode_line("1")])?;
        sink.append("t", &[d.decode_line("2")])?;
        sink.append("t", &[d.decode_line("3")])?;
        assert_eq!(sink.row_count("t")?, 3);

        sink.replace_and_write("t", &cols, &[d.decode_line("9")])?;
        assert_eq!(sink.row_count("t")?, 1);
        assert_eq!(sink.part_files("t")?.len(), 1);
        Ok(())
    }

    #[test]
    fn append_rejects_other_columns_and_unknown_datasets() -> anyhow::Result<()> {
        let tmp = tempdir()?;
        let mut sink = ParquetSink::open(tmp.path())?;
        let d1 = decoder("INPUT\n A 1-1\n B 2-2\n;\n");
        let d2 = decoder("INPUT\n A 1-1\n C 2-2\n;\n");

        let err = sink.append("nope", &[d1.decode_line("12")]).unwrap_err();
        assert!(matches!(err, IngestError::DatasetNotFound(_)));

        sink.replace_and_write("t", &d1.columns().to_vec(), &[d1.decode_line("12")])?;
        let err = sink.append("t", &[d2.decode_line("34")]).unwrap_err();
        match err {
            IngestError::SchemaMismatch {
                dataset,
                expected,
                actual,
            } => {
                assert_eq!(dataset, "t");
                assert_eq!(expected, vec!["A", "B"]);
                assert_eq!(actual, vec!["A", "C"]);
            }
            other => panic!("unexpected error: {other}"),
        }
        // nothing was written by the failed append
        assert_eq!(sink.row_count("t")?, 1);
        Ok(())
    }

    #[test]
    fn empty_replace_still_creates_the_dataset() -> anyhow::Result<()> {
        let tmp = tempdir()?;
        let mut sink = ParquetSink::open(tmp.path())?;
        let cols = vec!["A".to_string(), "B".to_string()];

        assert!(!sink.exists("t")?);
        assert_eq!(sink.replace_and_write("t", &cols, &[])?, 0);
        assert!(sink.exists("t")?);
        assert_eq!(sink.columns("t")?, cols);
        assert_eq!(sink.row_count("t")?, 0);
        assert_eq!(sink.append("t", &[])?, 0);
        Ok(())
    }

    #[test]
    fn parts_are_ordered_numerically() {
        let parts: Vec<PathBuf> = [
            "part-00002.parquet",
            "part-00010.parquet",
            "part-00000.parquet",
        ]
        .iter()
        .map(PathBuf::from)
        .collect();
        assert_eq!(next_part_index(&parts), 11);
        assert_eq!(part_index(Path::new("part-00010.parquet")), Some(10));
        assert_eq!(part_index(Path::new("_columns.json")), None);
        assert_eq!(next_part_index(&[]), 0);
    }

    #[test]
    fn layout_metadata_is_stored_in_every_part() -> anyhow::Result<()> {
        let tmp = tempdir()?;
        let mut sink = ParquetSink::open(tmp.path())?;
        let d = decoder("INPUT\n AGE 1-2\n SEX $3-3\n;\n");

        sink.replace_with_layout("nssrn", d.schema(), &[d.decode_line("29M")])?;
        sink.append("nssrn", &[d.decode_line("41F")])?;
        assert_eq!(sink.layout("nssrn")?.as_ref(), Some(d.schema()));

        let parts = sink.part_files("nssrn")?;
        assert_eq!(parts.len(), 2);
        for path in parts {
            let builder = ParquetRecordBatchReaderBuilder::try_new(File::open(&path)?)?;
            let schema = builder.schema();
            let age = schema.field_with_name("AGE")?.metadata();
            assert_eq!(age.get("start").map(String::as_str), Some("1"));
            assert_eq!(age.get("end").map(String::as_str), Some("2"));
            assert_eq!(age.get("kind").map(String::as_str), Some("numeric"));
            let sex = schema.field_with_name("SEX")?.metadata();
            assert_eq!(sex.get("kind").map(String::as_str), Some("text"));
        }

        // a plain replace drops the old layout with the rest of the dataset
        sink.replace_and_write("nssrn", &d.columns().to_vec(), &[])?;
        assert_eq!(sink.layout("nssrn")?, None);
        Ok(())
    }

    #[test]
    fn open_existing_does_not_create_the_root() -> anyhow::Result<()> {
        let tmp = tempdir()?;
        let root = tmp.path().join("missing");

        let err = ParquetSink::open_existing(&root).err();
        assert!(matches!(err, Some(IngestError::Io { .. })));
        assert!(!root.exists());

        ParquetSink::open(&root)?;
        assert!(ParquetSink::open_existing(&root).is_ok());
        Ok(())
    }

    #[test]
    fn read_head_stops_at_the_limit() -> anyhow::Result<()> {
        let tmp = tempdir()?;
        let mut sink = ParquetSink::open(tmp.path())?;
        let d = decoder("INPUT\n A 1-1\n;\n");

        sink.replace_with_layout("t", d.schema(), &[d.decode_line("1"), d.decode_line("2")])?;
        sink.append("t", &[d.decode_line("3"), d.decode_line("4")])?;
        sink.append("t", &[d.decode_line("5")])?;

        let head = batches_to_rows(&sink.read_head("t", 3)?)?;
        assert_eq!(
            head,
            vec![
                vec![Some("1".to_string())],
                vec![Some("2".to_string())],
                vec![Some("3".to_string())],
            ]
        );
        assert!(sink.read_head("t", 0)?.is_empty());
        assert_eq!(batches_to_rows(&sink.read_head("t", 99)?)?.len(), 5);
        Ok(())
    }

    #[test]
    fn no_tmp_files_are_left_behind() -> anyhow::Result<()> {
        let tmp = tempdir()?;
        let mut sink = ParquetSink::open(tmp.path())?;
        let d = decoder("INPUT\n A 1-1\n;\n");

        sink.replace_with_layout("t", d.schema(), &[d.decode_line("1")])?;
        sink.append("t", &[d.decode_line("2")])?;

        let mut names: Vec<String> = fs::read_dir(sink.dataset_dir("t")?)?
            .map(|e| e.map(|e| e.file_name().to_string_lossy().into_owned()))
            .collect::<std::io::Result<_>>()?;
        names.sort();
        assert_eq!(
            names,
            vec![
                "_columns.json",
                "_layout.json",
                "part-00000.parquet",
                "part-00001.parquet"
            ]
        );
        Ok(())
    }
}
