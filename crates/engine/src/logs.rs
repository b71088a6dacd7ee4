// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Hourly-rotated append-only log files.
//!
//! Child process output and alert lines go to files suffixed with the
//! current hour (`resource.log.2026-08-01_14`); rotation is implicit in
//! the name, nothing is ever renamed.

use chrono::Local;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct HourlyLog {
    dir: PathBuf,
    prefix: String,
}

impl HourlyLog {
    pub fn new(dir: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            prefix: prefix.into(),
        }
    }

    /// Path of the file for the current hour.
    pub fn current_path(&self) -> PathBuf {
        let suffix = Local::now().format("%Y-%m-%d_%H");
        self.dir.join(format!("{}.{}", self.prefix, suffix))
    }

    /// Open the current hour's file for appending.
    pub fn open(&self) -> io::Result<File> {
        std::fs::create_dir_all(&self.dir)?;
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.current_path())
    }

    /// Append one line to the current hour's file.
    pub fn append_line(&self, line: &str) -> io::Result<()> {
        let mut file = self.open()?;
        writeln!(file, "{}", line)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[cfg(test)]
#[path = "logs_tests.rs"]
mod tests;
