// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Append-only record file.
//!
//! # File Format
//! ```text
//! [Header: 16 bytes][Frame][Frame][Frame]...
//! ```
//!
//! Header:
//! - magic: 4 bytes ("KSEQ")
//! - version: u32 (1)
//! - reserved: u64 (0)
//!
//! Frame:
//! - sequence: u64
//! - payload_len: u32
//! - header_checksum: u64 (CRC64 over sequence, payload_len)
//! - payload_checksum: u64 (CRC64 over sequence, payload_len, payload)
//! - payload
//!
//! # Guarantees
//! - Every append is fsync'd before returning
//! - Sequences are strictly increasing within a file
//! - A failed append is cut off again, so it never becomes visible
//! - On open, an incomplete final frame (crash mid-write) is truncated
//! - A frame header is trusted only after its own checksum passes, so a
//!   corrupted length can never turn committed frames into a "torn tail"
//! - A bad frame anywhere but at the end fails closed

use crate::error::{PersistenceError, Result};
use crc64fast::Digest;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

const MAGIC: [u8; 4] = *b"KSEQ";
const VERSION: u32 = 1;
pub const HEADER_SIZE: usize = 16;
pub const FRAME_HEADER_SIZE: usize = 8 + 4 + 8 + 8;
/// Largest payload a frame may carry.
pub const MAX_PAYLOAD_SIZE: usize = 64 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub sequence: u64,
    /// Byte offset of the frame within its file.
    pub offset: u64,
    pub payload: Vec<u8>,
}

fn header_checksum(sequence: u64, payload_len: u32) -> u64 {
    let mut digest = Digest::new();
    digest.write(&sequence.to_le_bytes());
    digest.write(&payload_len.to_le_bytes());
    digest.sum64()
}

fn payload_checksum(sequence: u64, payload: &[u8]) -> u64 {
    let mut digest = Digest::new();
    digest.write(&sequence.to_le_bytes());
    digest.write(&(payload.len() as u32).to_le_bytes());
    digest.write(payload);
    digest.sum64()
}

fn header_bytes() -> [u8; HEADER_SIZE] {
    let mut buf = [0u8; HEADER_SIZE];
    buf[0..4].copy_from_slice(&MAGIC);
    buf[4..8].copy_from_slice(&VERSION.to_le_bytes());
    buf
}

fn encode_frame(sequence: u64, payload: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(FRAME_HEADER_SIZE + payload.len());
    buf.extend_from_slice(&sequence.to_le_bytes());
    buf.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    buf.extend_from_slice(&header_checksum(sequence, payload.len() as u32).to_le_bytes());
    buf.extend_from_slice(&payload_checksum(sequence, payload).to_le_bytes());
    buf.extend_from_slice(payload);
    buf
}

fn read_u64(bytes: &[u8], at: usize) -> u64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&bytes[at..at + 8]);
    u64::from_le_bytes(raw)
}

fn read_u32(bytes: &[u8], at: usize) -> u32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&bytes[at..at + 4]);
    u32::from_le_bytes(raw)
}

struct FrameHeader {
    sequence: u64,
    payload_len: usize,
    payload_checksum: u64,
}

/// Parse and verify the frame header at `offset`.
///
/// Returns `None` when the header and everything after it is zero, which is
/// what a crash during a file extension leaves behind.
fn read_frame_header(bytes: &[u8], offset: usize) -> Result<Option<FrameHeader>> {
    let sequence = read_u64(bytes, offset);
    let payload_len = read_u32(bytes, offset + 8);
    let stored = read_u64(bytes, offset + 12);

    let computed = header_checksum(sequence, payload_len);
    if computed != stored {
        if bytes[offset..].iter().all(|b| *b == 0) {
            return Ok(None);
        }
        return Err(PersistenceError::ChecksumMismatch {
            sequence,
            offset,
            expected: stored,
            found: computed,
        });
    }

    let payload_len = payload_len as usize;
    if payload_len > MAX_PAYLOAD_SIZE {
        return Err(PersistenceError::InvalidFormat(format!(
            "frame {} at offset {} claims {} payload bytes",
            sequence, offset, payload_len
        )));
    }

    Ok(Some(FrameHeader {
        sequence,
        payload_len,
        payload_checksum: read_u64(bytes, offset + 20),
    }))
}

/// Decode the frames of a complete file image.
///
/// Returns the frames and the length of the valid prefix. Anything after the
/// valid prefix is an incomplete tail left by a crash.
pub fn decode_frames(bytes: &[u8]) -> Result<(Vec<Frame>, usize)> {
    if bytes.len() < HEADER_SIZE {
        return Err(PersistenceError::InvalidFormat(format!(
            "file shorter than header ({} bytes)",
            bytes.len()
        )));
    }
    if bytes[0..4] != MAGIC {
        return Err(PersistenceError::InvalidMagic);
    }
    let version = read_u32(bytes, 4);
    if version != VERSION {
        return Err(PersistenceError::UnsupportedVersion(version));
    }

    let mut frames = Vec::new();
    let mut offset = HEADER_SIZE;
    let mut last = 0u64;

    while offset < bytes.len() {
        let remaining = bytes.len() - offset;
        if remaining < FRAME_HEADER_SIZE {
            break;
        }
        let header = read_frame_header(bytes, offset)?;
        let header = match header {
            Some(header) => header,
            // Zero-filled space past the last write.
            None => break,
        };

        let frame_len = FRAME_HEADER_SIZE + header.payload_len;
        if remaining < frame_len {
            break;
        }

        let payload = &bytes[offset + FRAME_HEADER_SIZE..offset + frame_len];
        let computed = payload_checksum(header.sequence, payload);
        if computed != header.payload_checksum {
            if offset + frame_len == bytes.len() {
                // Torn final frame.
                break;
            }
            return Err(PersistenceError::ChecksumMismatch {
                sequence: header.sequence,
                offset,
                expected: header.payload_checksum,
                found: computed,
            });
        }
        if header.sequence <= last {
            return Err(PersistenceError::SequenceOrder {
                last,
                found: header.sequence,
            });
        }
        last = header.sequence;

        frames.push(Frame {
            sequence: header.sequence,
            offset: offset as u64,
            payload: payload.to_vec(),
        });
        offset += frame_len;
    }

    Ok((frames, offset))
}

/// Writer half of a record file.
pub struct LogFile {
    path: PathBuf,
    file: File,
    len: u64,
    last_sequence: u64,
}

impl LogFile {
    /// Open or create a record file, returning every committed frame.
    ///
    /// An incomplete tail is truncated so later appends start on a frame
    /// boundary.
    pub fn open(path: impl AsRef<Path>) -> Result<(Self, Vec<Frame>)> {
        let path = path.as_ref().to_path_buf();
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)?;

        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)?;

        if bytes.is_empty() {
            file.write_all(&header_bytes())?;
            file.sync_all()?;
            let log = Self {
                path,
                file,
                len: HEADER_SIZE as u64,
                last_sequence: 0,
            };
            return Ok((log, Vec::new()));
        }

        let (frames, valid_len) = decode_frames(&bytes)?;
        if valid_len < bytes.len() {
            tracing::warn!(
                path = ?path,
                discarded = bytes.len() - valid_len,
                "Truncating incomplete frame at end of log"
            );
            file.set_len(valid_len as u64)?;
            file.sync_all()?;
        }

        let last_sequence = frames.last().map(|f| f.sequence).unwrap_or(0);
        let log = Self {
            path,
            file,
            len: valid_len as u64,
            last_sequence,
        };
        Ok((log, frames))
    }

    /// Append one frame and fsync, returning the frame's offset.
    ///
    /// On failure the file is cut back to its previous length, so the
    /// sequence is not consumed.
    pub fn append(&mut self, sequence: u64, payload: &[u8]) -> Result<u64> {
        if payload.len() > MAX_PAYLOAD_SIZE {
            return Err(PersistenceError::InvalidFormat(format!(
                "payload of {} bytes exceeds the frame limit",
                payload.len()
            )));
        }
        if sequence <= self.last_sequence {
            return Err(PersistenceError::SequenceOrder {
                last: self.last_sequence,
                found: sequence,
            });
        }

        let frame = encode_frame(sequence, payload);
        let written = self
            .file
            .write_all(&frame)
            .and_then(|_| self.file.sync_data());

        if let Err(e) = written {
            if let Err(undo) = self.file.set_len(self.len) {
                tracing::error!(path = ?self.path, error = %undo, "Failed to roll back partial append");
            }
            return Err(e.into());
        }

        let offset = self.len;
        self.len += frame.len() as u64;
        self.last_sequence = sequence;
        Ok(offset)
    }

    /// Read back the committed frame starting at `offset`.
    pub fn read_at(&self, offset: u64) -> Result<Frame> {
        if offset < HEADER_SIZE as u64 || offset + FRAME_HEADER_SIZE as u64 > self.len {
            return Err(PersistenceError::InvalidFormat(format!("no frame at offset {}", offset)));
        }

        let mut file = &self.file;
        file.seek(SeekFrom::Start(offset))?;
        let mut header = [0u8; FRAME_HEADER_SIZE];
        file.read_exact(&mut header)?;

        let at = offset as usize;
        let parsed = read_frame_header(&header, 0).map_err(|e| match e {
            PersistenceError::ChecksumMismatch { sequence, expected, found, .. } => {
                PersistenceError::ChecksumMismatch {
                    sequence,
                    offset: at,
                    expected,
                    found,
                }
            }
            other => other,
        })?;
        let header = parsed.ok_or_else(|| PersistenceError::InvalidFormat(format!("no frame at offset {}", offset)))?;
        if offset + (FRAME_HEADER_SIZE + header.payload_len) as u64 > self.len {
            return Err(PersistenceError::InvalidFormat(format!(
                "frame at offset {} runs past the end of the file",
                offset
            )));
        }

        let mut payload = vec![0u8; header.payload_len];
        file.read_exact(&mut payload)?;
        let computed = payload_checksum(header.sequence, &payload);
        if computed != header.payload_checksum {
            return Err(PersistenceError::ChecksumMismatch {
                sequence: header.sequence,
                offset: at,
                expected: header.payload_checksum,
                found: computed,
            });
        }

        Ok(Frame {
            sequence: header.sequence,
            offset,
            payload,
        })
    }

    pub fn last_sequence(&self) -> u64 {
        self.last_sequence
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.last_sequence == 0
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
