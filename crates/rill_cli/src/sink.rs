//! Appends parsed events to the output file.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rill_core::config::OutputFormat;
use rill_core::Event;
use serde::Serialize;

#[derive(Serialize)]
struct Record<'a> {
    seq: u64,
    event: &'a Event,
}

pub struct FileSink {
    path: PathBuf,
    format: OutputFormat,
    file: File,
}

impl FileSink {
    /// Open `path` for appending, creating it if missing.
    pub fn open(path: &Path, format: OutputFormat) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open output file: {}", path.display()))?;
        Ok(Self {
            path: path.to_path_buf(),
            format,
            file,
        })
    }

    /// Append one event; `seq` is its 1-based position in the stream.
    pub fn append(&mut self, seq: u64, event: &Event) -> Result<()> {
        let mut line = match self.format {
            OutputFormat::Raw => event.to_string(),
            OutputFormat::Json => serde_json::to_string(&Record { seq, event })?,
        };
        line.push('\n');
        self.file
            .write_all(line.as_bytes())
            .and_then(|_| self.file.flush())
            .with_context(|| format!("Failed to write to {}", self.path.display()))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
