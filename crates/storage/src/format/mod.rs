//! On-disk byte formats for the MANIFEST and document logs.
//!
//! Keeping serialization separate from operational logic (how logs are
//! appended, replayed and compacted) makes format evolution easier to manage.
//!
//! - `manifest`: store-level layout version and identity
//! - `frame`: document log header and checksummed frames

pub mod frame;
pub mod manifest;

pub use frame::{
    decode_frames, decode_header, encode_frame, encode_header, DecodedFrames, FRAME_OVERHEAD,
    LOG_FORMAT_V1, LOG_FORMAT_V2, LOG_HEADER_SIZE, LOG_MAGIC, MAX_FRAME_PAYLOAD,
};
pub use manifest::{Manifest, ManifestError, ManifestManager, MANIFEST_MAGIC, MANIFEST_SIZE};
