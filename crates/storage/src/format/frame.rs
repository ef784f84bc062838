//! Document log file and frame format.
//!
//! Each namespace keeps one append-only `documents.log`.
//!
//! # File Layout
//!
//! ```text
//! ┌────────────────────────────────────┐
//! │ Header: "DCLG" + format (u32 LE)   │
//! ├────────────────────────────────────┤
//! │ Frame 1                            │
//! ├────────────────────────────────────┤
//! │ Frame 2                            │
//! └────────────────────────────────────┘
//! ```
//!
//! # Frame Layout
//!
//! ```text
//! ┌─────────────────┬──────────────┬───────────────────┬──────────┐
//! │ Length (4 bytes)│ Format (1)   │ Payload (variable)│ CRC32 (4)│
//! └─────────────────┴──────────────┴───────────────────┴──────────┘
//! ```
//!
//! Length counts payload bytes only. The CRC covers the format byte and the
//! payload. The first frame that is short or fails its CRC marks the end of
//! the valid log; everything after it is a torn tail from an interrupted
//! append.

use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};

/// Magic bytes identifying a document log: "DCLG"
pub const LOG_MAGIC: [u8; 4] = *b"DCLG";

/// Size of the file header in bytes
pub const LOG_HEADER_SIZE: usize = 8;

/// Legacy format: string operation markers, no `last_modified`
pub const LOG_FORMAT_V1: u32 = 1;

/// Current format: typed records
pub const LOG_FORMAT_V2: u32 = 2;

/// Length + format byte + CRC
pub const FRAME_OVERHEAD: usize = 9;

/// Largest accepted frame payload (64 MiB)
pub const MAX_FRAME_PAYLOAD: usize = 64 * 1024 * 1024;

/// Serialize the file header.
pub fn encode_header(format_version: u32) -> [u8; LOG_HEADER_SIZE] {
    let mut bytes = [0u8; LOG_HEADER_SIZE];
    bytes[0..4].copy_from_slice(&LOG_MAGIC);
    LittleEndian::write_u32(&mut bytes[4..8], format_version);
    bytes
}

/// Parse the file header, returning the format version.
pub fn decode_header(bytes: &[u8]) -> Option<u32> {
    if bytes.len() < LOG_HEADER_SIZE || bytes[0..4] != LOG_MAGIC {
        return None;
    }
    Some(LittleEndian::read_u32(&bytes[4..8]))
}

/// Wrap a payload in a checksummed frame.
pub fn encode_frame(format_version: u8, payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(payload.len() + FRAME_OVERHEAD);
    // Writes into a Vec cannot fail.
    let _ = frame.write_u32::<LittleEndian>(payload.len() as u32);
    frame.push(format_version);
    frame.extend_from_slice(payload);
    let crc = crc32fast::hash(&frame[4..]);
    let _ = frame.write_u32::<LittleEndian>(crc);
    frame
}

/// Result of scanning the frames that follow the header.
#[derive(Debug, Default)]
pub struct DecodedFrames<'a> {
    /// Payloads of every intact frame, in order
    pub payloads: Vec<&'a [u8]>,
    /// Bytes (after the header) covered by intact frames
    pub valid_len: usize,
    /// Bytes after the last intact frame
    pub torn_bytes: usize,
}

/// Scan frames until the end of input or the first damaged frame.
pub fn decode_frames(body: &[u8]) -> DecodedFrames<'_> {
    let mut decoded = DecodedFrames::default();
    let mut cursor = 0usize;

    while body.len() - cursor >= FRAME_OVERHEAD {
        let len = LittleEndian::read_u32(&body[cursor..cursor + 4]) as usize;
        if len > MAX_FRAME_PAYLOAD || body.len() - cursor < len + FRAME_OVERHEAD {
            break;
        }
        let checked = &body[cursor + 4..cursor + 5 + len];
        let crc_at = cursor + 5 + len;
        let stored_crc = LittleEndian::read_u32(&body[crc_at..crc_at + 4]);
        if crc32fast::hash(checked) != stored_crc {
            break;
        }
        decoded.payloads.push(&checked[1..]);
        cursor += len + FRAME_OVERHEAD;
    }

    decoded.valid_len = cursor;
    decoded.torn_bytes = body.len() - cursor;
    decoded
}
