// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The agent's durable on-disk buffer (C1): a single-writer append-only
//! log with one or more independent readers, each tracking its own
//! crash-safe ack cursor. A single cursor is shared by every sender in
//! [`crate::config::BufferMode::Shared`] mode (each envelope reaches
//! exactly one gateway); [`crate::config::BufferMode::PerGateway`] gives
//! each sender its own cursor file so every gateway sees every envelope.

pub mod cursor;

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write as _};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use bytes::Bytes;
use wire::record::{BufferRecord, RecordError};

use cursor::CursorFile;

/// Records whose declared length would exceed this are rejected as corrupt
/// rather than trusted, per the spec's implausible-length ceiling.
pub const MAX_RECORD_LEN: u32 = 16 * 1024 * 1024;

/// Outcome of [`BufferReader::read_next`].
#[derive(Debug)]
pub enum NextRecord {
    /// No unacked record is available right now.
    Empty,
    /// A well-formed record, ready to be consumed.
    Ready { start: u64, end: u64, payload: Bytes },
    /// A record failed to decode. `resync` is the offset the cursor should
    /// advance to via [`BufferReader::skip_corrupt`] to move past it.
    Corrupt { start: u64, resync: u64, reason: String },
}

/// The append-only log file shared by the writer and all readers.
pub struct Buffer {
    path: PathBuf,
    file: Mutex<File>,
}

impl Buffer {
    pub fn open(dir: &Path, name: &str) -> io::Result<Self> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(format!("{name}.log"));
        let file = OpenOptions::new().create(true).read(true).append(true).open(&path)?;
        Ok(Self { path, file: Mutex::new(file) })
    }

    /// Append `payload` as a framed record, fsync, and return the offset
    /// where the frame starts.
    pub fn write(&self, payload: &[u8]) -> io::Result<u64> {
        let frame = BufferRecord::encode(payload);
        let mut file = self.file.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let start = file.seek(SeekFrom::End(0))?;
        file.write_all(&frame)?;
        file.sync_data()?;
        Ok(start)
    }

    /// Open an independent reader tracking its own cursor file, identified
    /// by `cursor_name` (e.g. the gateway address in per-gateway mode, or a
    /// fixed name in shared mode).
    pub fn reader(&self, dir: &Path, cursor_name: &str) -> io::Result<BufferReader> {
        let file = File::open(&self.path)?;
        let cursor = CursorFile::open(dir.join(format!("{cursor_name}.cursor")))?;
        Ok(BufferReader { file, cursor, max_record_len: MAX_RECORD_LEN })
    }

    pub fn close(&self) -> io::Result<()> {
        self.file.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).sync_all()
    }
}

/// A single reader over a [`Buffer`], with its own ack cursor.
pub struct BufferReader {
    file: File,
    cursor: CursorFile,
    max_record_len: u32,
}

impl BufferReader {
    pub fn read_next(&mut self) -> io::Result<NextRecord> {
        let cursor_offset = self.cursor.load()?;
        let file_len = self.file.metadata()?.len();
        if cursor_offset >= file_len {
            return Ok(NextRecord::Empty);
        }

        let remaining = file_len - cursor_offset;
        let mut buf = vec![0u8; remaining as usize];
        self.file.seek(SeekFrom::Start(cursor_offset))?;
        self.file.read_exact(&mut buf)?;

        match BufferRecord::decode(&buf, self.max_record_len) {
            Ok(Some(record)) => {
                let end = cursor_offset + record.frame_len as u64;
                Ok(NextRecord::Ready { start: cursor_offset, end, payload: record.payload })
            }
            // A short read at the tail is a crash-truncated write, not corruption.
            Ok(None) => Ok(NextRecord::Empty),
            Err(RecordError::CrcMismatch { frame_len, .. }) => Ok(NextRecord::Corrupt {
                start: cursor_offset,
                resync: cursor_offset + frame_len as u64,
                reason: "crc mismatch".to_owned(),
            }),
            Err(RecordError::TooLarge(len, ceiling)) => Ok(NextRecord::Corrupt {
                start: cursor_offset,
                // The length field itself cannot be trusted; resync one
                // byte at a time rather than skip a guessed frame size.
                resync: cursor_offset + 1,
                reason: format!("declared length {len} exceeds ceiling {ceiling}"),
            }),
            Err(RecordError::Truncated { .. }) => Ok(NextRecord::Empty),
        }
    }

    /// Advance the cursor to the end offset of a consumed record. A no-op
    /// if `end` does not exceed the current cursor.
    pub fn ack(&self, end: u64) -> io::Result<()> {
        self.cursor.advance(end)
    }

    /// Advance past a corrupt record using the `resync` offset reported by
    /// [`NextRecord::Corrupt`].
    pub fn skip_corrupt(&self, resync: u64) -> io::Result<()> {
        self.cursor.advance(resync)
    }

    pub fn cursor_offset(&self) -> io::Result<u64> {
        self.cursor.load()
    }
}
