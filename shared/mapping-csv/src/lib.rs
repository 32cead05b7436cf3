//! CSV cache of the mapping list.
//!
//! The admin API serves listings from this file so it does not have to walk
//! the whole namespace on every page load; the CLI uses it as an offline
//! fallback and as its export format. The file is rewritten in full after
//! every mutation.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use csv::{QuoteStyle, ReaderBuilder, WriterBuilder};
use domain::Mapping;
use serde::Serialize;
use tracing::debug;

pub const HEADER: [&str; 5] = [
    "Short Code",
    "Long URL",
    "UTM Source",
    "UTM Medium",
    "UTM Campaign",
];

#[derive(Debug, thiserror::Error)]
pub enum CsvCacheError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Csv(#[from] csv::Error),
}

#[derive(Debug, Serialize)]
struct CsvRow {
    #[serde(rename = "Short Code")]
    short_code: String,
    #[serde(rename = "Long URL")]
    long_url: String,
    #[serde(rename = "UTM Source")]
    utm_source: String,
    #[serde(rename = "UTM Medium")]
    utm_medium: String,
    #[serde(rename = "UTM Campaign")]
    utm_campaign: String,
}

impl From<&Mapping> for CsvRow {
    fn from(m: &Mapping) -> Self {
        Self {
            short_code: m.short_code.clone(),
            long_url: m.long_url.clone(),
            utm_source: m.utm_source.clone(),
            utm_medium: m.utm_medium.clone(),
            utm_campaign: m.utm_campaign.clone(),
        }
    }
}

/// Write mappings with a header row. Every field is quoted.
pub fn write_mappings<W: Write>(writer: W, mappings: &[Mapping]) -> Result<(), CsvCacheError> {
    let mut w = WriterBuilder::new()
        .quote_style(QuoteStyle::Always)
        .from_writer(writer);
    if mappings.is_empty() {
        // serialize() emits the header only alongside the first record
        w.write_record(HEADER)?;
    }
    for m in mappings {
        w.serialize(CsvRow::from(m))?;
    }
    w.flush()?;
    Ok(())
}

/// Read mappings back by column position. Short rows are padded with
/// empty fields; rows missing a code or URL are dropped. Tags are not part
/// of the file and come back empty.
pub fn read_mappings<R: Read>(reader: R) -> Result<Vec<Mapping>, CsvCacheError> {
    let mut r = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);
    let mut out = Vec::new();
    for rec in r.records() {
        let rec = rec?;
        let field = |i: usize| rec.get(i).unwrap_or("").to_string();
        let row = Mapping {
            short_code: field(0),
            long_url: field(1),
            utm_source: field(2),
            utm_medium: field(3),
            utm_campaign: field(4),
            tags: Vec::new(),
        };
        if row.short_code.is_empty() || row.long_url.is_empty() {
            continue;
        }
        out.push(row);
    }
    Ok(out)
}

/// The cache file on disk.
#[derive(Clone, Debug)]
pub struct CsvCache {
    path: PathBuf,
}

impl CsvCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Replace the file contents. Writes to a sibling temp file first and
    /// renames it over the old one.
    pub fn write(&self, mappings: &[Mapping]) -> Result<(), CsvCacheError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("csv.tmp");
        {
            let file = File::create(&tmp)?;
            write_mappings(BufWriter::new(file), mappings)?;
        }
        fs::rename(&tmp, &self.path)?;
        debug!(path = %self.path.display(), rows = mappings.len(), "csv cache written");
        Ok(())
    }

    /// `Ok(None)` when the file does not exist yet.
    pub fn read(&self) -> Result<Option<Vec<Mapping>>, CsvCacheError> {
        let file = match File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        read_mappings(BufReader::new(file)).map(Some)
    }
}
