// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Crash-safe ack cursor: the byte offset separating delivered-and-acked
//! records from pending ones, persisted via write-temp-then-rename.

use std::io;
use std::path::{Path, PathBuf};

/// A single persisted cursor file.
pub struct CursorFile {
    path: PathBuf,
}

impl CursorFile {
    pub fn open(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        if !path.exists() {
            Self::write_atomic(&path, 0)?;
        }
        Ok(Self { path })
    }

    pub fn load(&self) -> io::Result<u64> {
        let raw = std::fs::read_to_string(&self.path)?;
        raw.trim().parse::<u64>().map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    /// Advance the persisted cursor. Monotone: a lower or equal offset is a no-op.
    pub fn advance(&self, offset: u64) -> io::Result<()> {
        let current = self.load()?;
        if offset <= current {
            return Ok(());
        }
        Self::write_atomic(&self.path, offset)
    }

    fn write_atomic(path: &Path, offset: u64) -> io::Result<()> {
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, offset.to_string())?;
        std::fs::rename(&tmp, path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advance_is_monotone() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cursor = CursorFile::open(dir.path().join("c")).expect("open");
        cursor.advance(100).expect("advance");
        cursor.advance(50).expect("advance no-op");
        assert_eq!(cursor.load().expect("load"), 100);
    }

    #[test]
    fn reopen_preserves_value() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("c");
        {
            let cursor = CursorFile::open(&path).expect("open");
            cursor.advance(42).expect("advance");
        }
        let reopened = CursorFile::open(&path).expect("reopen");
        assert_eq!(reopened.load().expect("load"), 42);
    }
}
