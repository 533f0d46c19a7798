// Append-only CSV result sink
//
// One sink per output file. Existing rows are never rewritten or reordered;
// the header is written exactly once, when the file is first created (or is
// empty). Both record shapes go through the same sink against their own
// schemas.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::records::CsvRecord;

pub struct ResultSink {
    path: PathBuf,
}

impl ResultSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the schema header unless the file already has content
    pub fn write_header_if_absent<R: CsvRecord>(&self) -> Result<()> {
        let needs_header = match std::fs::metadata(&self.path) {
            Ok(meta) => meta.len() == 0,
            Err(_) => true,
        };
        if needs_header {
            if let Some(parent) = self.path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let mut file = File::create(&self.path)?;
            writeln!(file, "{}", R::HEADER)?;
        }
        Ok(())
    }

    /// Append one record, writing the header first if the file is new
    pub fn append_row<R: CsvRecord>(&self, record: &R) -> Result<()> {
        self.write_header_if_absent::<R>()?;
        let mut file = OpenOptions::new().append(true).open(&self.path)?;
        writeln!(file, "{}", record.to_row())?;
        Ok(())
    }
}
