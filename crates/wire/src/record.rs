// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! On-disk framing for the agent's durable buffer: `[u32 len][u32 crc32][bytes]`.
//! This module only frames opaque payload bytes; callers encode/decode the
//! payload itself (an `AgentMessage` protobuf) separately.

use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Header size: 4-byte length + 4-byte CRC32, both little-endian.
const HEADER_LEN: usize = 8;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RecordError {
    #[error("declared length {0} exceeds ceiling {1}")]
    TooLarge(u32, u32),
    #[error("crc mismatch: declared {declared:08x}, computed {computed:08x}")]
    CrcMismatch { declared: u32, computed: u32, frame_len: usize },
    #[error("truncated tail: need {needed} more bytes")]
    Truncated { needed: usize },
}

/// A single framed record: its payload bytes plus the byte length of the
/// full frame (header + payload), used by callers to compute offsets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferRecord {
    pub payload: Bytes,
    pub frame_len: usize,
}

impl BufferRecord {
    /// Encode `payload` into a framed record ready to append to the log.
    pub fn encode(payload: &[u8]) -> BytesMut {
        let crc = crc32fast::hash(payload);
        let mut buf = BytesMut::with_capacity(HEADER_LEN + payload.len());
        buf.put_u32_le(payload.len() as u32);
        buf.put_u32_le(crc);
        buf.put_slice(payload);
        buf
    }

    /// Attempt to decode one record from the front of `data`.
    ///
    /// Returns `Ok(None)` when `data` holds fewer bytes than the declared
    /// frame (a truncated tail from a crashed write — not corruption).
    /// Returns `Err` when the declared length exceeds `max_payload_len` or
    /// the CRC does not match (corruption, see [`RecordError`]).
    pub fn decode(data: &[u8], max_payload_len: u32) -> Result<Option<BufferRecord>, RecordError> {
        if data.len() < HEADER_LEN {
            return Ok(None);
        }
        let mut header = &data[..HEADER_LEN];
        let len = header.get_u32_le();
        let crc = header.get_u32_le();

        if len > max_payload_len {
            return Err(RecordError::TooLarge(len, max_payload_len));
        }

        let total = HEADER_LEN + len as usize;
        if data.len() < total {
            return Ok(None);
        }

        let payload = &data[HEADER_LEN..total];
        let computed = crc32fast::hash(payload);
        if computed != crc {
            return Err(RecordError::CrcMismatch { declared: crc, computed, frame_len: total });
        }

        Ok(Some(BufferRecord { payload: Bytes::copy_from_slice(payload), frame_len: total }))
    }

    /// Minimum number of bytes needed to even read a header, for callers
    /// deciding whether to treat a short read as "try again later".
    pub const HEADER_LEN: usize = HEADER_LEN;
}
