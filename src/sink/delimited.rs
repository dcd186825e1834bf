//! CSV/TSV file sink with optional gzip compression.

use super::{Sink, SinkFactory};
use crate::model::Table;
use crate::row::RowView;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

pub const WRITER_BUFFER_SIZE: usize = 256 * 1024;

/// Field-separated output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DelimitedFormat {
    #[default]
    Csv,
    Tsv,
}

impl DelimitedFormat {
    pub fn delimiter(&self) -> u8 {
        match self {
            DelimitedFormat::Csv => b',',
            DelimitedFormat::Tsv => b'\t',
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            DelimitedFormat::Csv => "csv",
            DelimitedFormat::Tsv => "tsv",
        }
    }
}

impl std::str::FromStr for DelimitedFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "csv" => Ok(DelimitedFormat::Csv),
            "tsv" | "tab" => Ok(DelimitedFormat::Tsv),
            _ => Err(format!("Unknown format: {}. Valid options: csv, tsv", s)),
        }
    }
}

impl std::fmt::Display for DelimitedFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.extension())
    }
}

/// Settings shared by every file the factory opens
#[derive(Debug, Clone)]
pub struct DelimitedOptions {
    pub dir: PathBuf,
    pub format: DelimitedFormat,
    pub header: bool,
    pub gzip: bool,
    /// Refuse further rows once this many have been written
    pub max_rows: Option<u64>,
}

impl DelimitedOptions {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            format: DelimitedFormat::Csv,
            header: true,
            gzip: false,
            max_rows: None,
        }
    }

    /// Output path for `table`
    pub fn path_for(&self, table: &str) -> PathBuf {
        let mut name = format!("{}.{}", table, self.format.extension());
        if self.gzip {
            name.push_str(".gz");
        }
        self.dir.join(name)
    }
}

/// Opens one delimited file per table under the output directory
#[derive(Debug, Clone)]
pub struct DelimitedSinkFactory {
    options: DelimitedOptions,
}

impl DelimitedSinkFactory {
    pub fn new(options: DelimitedOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &DelimitedOptions {
        &self.options
    }

    pub fn ensure_output_dir(&self) -> io::Result<()> {
        fs::create_dir_all(&self.options.dir)
    }
}

impl SinkFactory for DelimitedSinkFactory {
    fn open(&self, table: &Table) -> io::Result<Box<dyn Sink>> {
        self.ensure_output_dir()?;
        let path = self.options.path_for(&table.name);
        let mut sink = DelimitedSink::create(&path, &self.options)?;
        if self.options.header {
            sink.write_header(&table.visible_columns())?;
        }
        Ok(Box::new(sink))
    }
}

enum Output {
    Plain(BufWriter<File>),
    Gzip(GzEncoder<BufWriter<File>>),
}

impl Output {
    fn finish(self) -> io::Result<()> {
        match self {
            Output::Plain(mut w) => w.flush(),
            Output::Gzip(enc) => enc.finish()?.flush(),
        }
    }
}

impl Write for Output {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Output::Plain(w) => w.write(buf),
            Output::Gzip(w) => w.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Output::Plain(w) => w.flush(),
            Output::Gzip(w) => w.flush(),
        }
    }
}

/// Writes rows of one table to a delimited file
pub struct DelimitedSink {
    path: PathBuf,
    writer: Option<csv::Writer<Output>>,
    rows: u64,
    max_rows: Option<u64>,
}

impl DelimitedSink {
    pub fn create(path: &Path, options: &DelimitedOptions) -> io::Result<Self> {
        let file = File::create(path)?;
        let buffered = BufWriter::with_capacity(WRITER_BUFFER_SIZE, file);
        let output = if options.gzip {
            Output::Gzip(GzEncoder::new(buffered, Compression::default()))
        } else {
            Output::Plain(buffered)
        };

        let writer = csv::WriterBuilder::new()
            .delimiter(options.format.delimiter())
            .has_headers(false)
            .from_writer(output);

        Ok(Self {
            path: path.to_path_buf(),
            writer: Some(writer),
            rows: 0,
            max_rows: options.max_rows,
        })
    }

    pub fn write_header(&mut self, columns: &[&str]) -> io::Result<()> {
        self.writer()?.write_record(columns).map_err(csv_error)
    }

    pub fn rows(&self) -> u64 {
        self.rows
    }

    fn writer(&mut self) -> io::Result<&mut csv::Writer<Output>> {
        self.writer
            .as_mut()
            .ok_or_else(|| io::Error::other(format!("{} is already closed", self.path.display())))
    }
}

impl Sink for DelimitedSink {
    fn consume(&mut self, row: RowView<'_>, _estimate: i64) -> io::Result<bool> {
        if self.max_rows.is_some_and(|max| self.rows >= max) {
            return Ok(false);
        }

        let writer = self.writer()?;
        for value in row.values() {
            writer.write_field(value.to_string()).map_err(csv_error)?;
        }
        writer.write_record(None::<&[u8]>).map_err(csv_error)?;
        self.rows += 1;

        Ok(self.max_rows.is_none_or(|max| self.rows < max))
    }

    fn finish(&mut self) -> io::Result<()> {
        match self.writer.take() {
            Some(writer) => writer
                .into_inner()
                .map_err(|e| e.into_error())?
                .finish(),
            None => Ok(()),
        }
    }

    fn locations(&self) -> Vec<String> {
        vec![self.path.display().to_string()]
    }
}

fn csv_error(err: csv::Error) -> io::Error {
    match err.into_kind() {
        csv::ErrorKind::Io(e) => e,
        other => io::Error::other(format!("{:?}", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_for() {
        let mut options = DelimitedOptions::new("out");
        assert_eq!(options.path_for("users"), PathBuf::from("out/users.csv"));

        options.format = DelimitedFormat::Tsv;
        options.gzip = true;
        assert_eq!(options.path_for("users"), PathBuf::from("out/users.tsv.gz"));
    }

    #[test]
    fn test_format_from_str() {
        assert_eq!("CSV".parse::<DelimitedFormat>(), Ok(DelimitedFormat::Csv));
        assert_eq!("tsv".parse::<DelimitedFormat>(), Ok(DelimitedFormat::Tsv));
        assert!("json".parse::<DelimitedFormat>().is_err());
    }
}
