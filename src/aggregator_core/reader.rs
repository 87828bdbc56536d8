//! Batch JSONL record reader
//!
//! One ingestion run consumes a finite record set, so this reads the file
//! front to back rather than tailing it. A line that fails to parse is a
//! row-level reject carrying its line number, not a reader failure.

use super::normalizer::{RawRecord, ValidationError};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

pub struct RecordFileReader {
    path: PathBuf,
    reader: BufReader<File>,
}

impl RecordFileReader {
    pub fn open(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        log::info!("📖 Reading records from: {}", path.display());
        Ok(Self {
            path,
            reader: BufReader::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Iterate raw records; blank lines are skipped, malformed lines are
    /// yielded as row-level `ValidationError`s
    pub fn records(self) -> impl Iterator<Item = Result<RawRecord, ValidationError>> {
        self.reader
            .lines()
            .enumerate()
            .filter_map(|(idx, line)| {
                let line_no = idx as u64 + 1;
                match line {
                    Ok(text) => {
                        let trimmed = text.trim().to_string();
                        if trimmed.is_empty() {
                            None
                        } else {
                            Some(RawRecord::from_jsonl(&trimmed, line_no))
                        }
                    }
                    Err(e) => Some(Err(ValidationError::Parse {
                        line: line_no,
                        reason: e.to_string(),
                    })),
                }
            })
    }
}
