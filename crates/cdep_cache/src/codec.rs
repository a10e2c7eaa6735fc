//! Binary encoding of [`CompilationState`] with an integrity header.
//!
//! Layout: a 4-byte little-endian header length, the bincode-encoded
//! [`StateHeader`], then the bincode-encoded state. The header carries magic
//! bytes, the format version, the tool version that wrote the file and a
//! checksum of the payload.

use cdep_common::ContentHash;
use serde::{Deserialize, Serialize};

use crate::error::CacheError;
use crate::state::CompilationState;

/// Magic bytes identifying a cdep state file.
const STATE_MAGIC: [u8; 4] = *b"CDEP";

/// Current state format version. Increment on breaking changes to the
/// header or the state model.
const STATE_FORMAT_VERSION: u32 = 1;

/// Header prepended to every persisted state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateHeader {
    /// Magic bytes: must be `b"CDEP"`.
    pub magic: [u8; 4],

    /// State format version.
    pub format_version: u32,

    /// Version of the tool that wrote the state.
    pub tool_version: String,

    /// Content hash of the payload bytes.
    pub checksum: ContentHash,
}

/// Encodes `state` for writing to disk.
pub fn encode_state(state: &CompilationState, tool_version: &str) -> Result<Vec<u8>, CacheError> {
    let payload = bincode::serde::encode_to_vec(state, bincode::config::standard()).map_err(|e| {
        CacheError::Serialization {
            reason: e.to_string(),
        }
    })?;

    let header = StateHeader {
        magic: STATE_MAGIC,
        format_version: STATE_FORMAT_VERSION,
        tool_version: tool_version.to_string(),
        checksum: ContentHash::from_bytes(&payload),
    };
    let header_bytes = bincode::serde::encode_to_vec(&header, bincode::config::standard())
        .map_err(|e| CacheError::Serialization {
            reason: e.to_string(),
        })?;

    let header_len = u32::try_from(header_bytes.len()).map_err(|_| CacheError::InvalidHeader {
        reason: "header too large".to_string(),
    })?;
    let mut output = Vec::with_capacity(4 + header_bytes.len() + payload.len());
    output.extend_from_slice(&header_len.to_le_bytes());
    output.extend_from_slice(&header_bytes);
    output.extend_from_slice(&payload);
    Ok(output)
}

/// Decodes a state previously produced by [`encode_state`].
///
/// Fails if the bytes are truncated, the magic or versions do not match, or
/// the payload checksum does not verify.
pub fn decode_state(raw: &[u8], tool_version: &str) -> Result<CompilationState, CacheError> {
    let len_bytes: [u8; 4] = raw
        .get(..4)
        .and_then(|b| b.try_into().ok())
        .ok_or_else(|| CacheError::InvalidHeader {
            reason: "missing header length".to_string(),
        })?;
    let header_len = u32::from_le_bytes(len_bytes) as usize;
    let header_bytes = raw.get(4..4 + header_len).ok_or_else(|| CacheError::InvalidHeader {
        reason: "truncated header".to_string(),
    })?;

    let (header, _): (StateHeader, usize) =
        bincode::serde::decode_from_slice(header_bytes, bincode::config::standard()).map_err(
            |e| CacheError::InvalidHeader {
                reason: e.to_string(),
            },
        )?;

    if header.magic != STATE_MAGIC {
        return Err(CacheError::InvalidHeader {
            reason: "bad magic bytes".to_string(),
        });
    }
    if header.format_version != STATE_FORMAT_VERSION {
        return Err(CacheError::VersionMismatch {
            expected: format!("format {STATE_FORMAT_VERSION}"),
            actual: format!("format {}", header.format_version),
        });
    }
    if header.tool_version != tool_version {
        return Err(CacheError::VersionMismatch {
            expected: tool_version.to_string(),
            actual: header.tool_version,
        });
    }

    let payload = &raw[4 + header_len..];
    let actual = ContentHash::from_bytes(payload);
    if actual != header.checksum {
        return Err(CacheError::ChecksumMismatch {
            expected: header.checksum.to_string(),
            actual: actual.to_string(),
        });
    }

    let (state, _): (CompilationState, usize) =
        bincode::serde::decode_from_slice(payload, bincode::config::standard()).map_err(|e| {
            CacheError::Serialization {
                reason: e.to_string(),
            }
        })?;
    Ok(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::SourceFileState;
    use cdep_common::{Include, IncludeDirectives, IncludeKind};
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    fn sample_state() -> CompilationState {
        let path = PathBuf::from("/src/a.c");
        let snapshot = SourceFileState {
            path: path.clone(),
            hash: ContentHash::from_bytes(b"#include \"b.h\""),
            directives: IncludeDirectives {
                includes: vec![Include::new(IncludeKind::Quoted, "b.h")],
                macros: vec![],
            },
            resolved: vec![],
        };
        let mut files = BTreeMap::new();
        files.insert(path.clone(), snapshot);
        CompilationState::new(
            ContentHash::from_bytes(b"settings"),
            [path].into_iter().collect(),
            files,
        )
    }

    fn encode_with_header(header: &StateHeader, payload: &[u8]) -> Vec<u8> {
        let header_bytes =
            bincode::serde::encode_to_vec(header, bincode::config::standard()).unwrap();
        let mut output = Vec::new();
        output.extend_from_slice(&(header_bytes.len() as u32).to_le_bytes());
        output.extend_from_slice(&header_bytes);
        output.extend_from_slice(payload);
        output
    }

    #[test]
    fn decode_encoded_state() {
        let state = sample_state();
        let bytes = encode_state(&state, "0.1.0").unwrap();
        assert_eq!(decode_state(&bytes, "0.1.0").unwrap(), state);
    }

    #[test]
    fn truncated_input_is_rejected() {
        assert!(matches!(
            decode_state(b"AB", "0.1.0"),
            Err(CacheError::InvalidHeader { .. })
        ));
        let bytes = encode_state(&sample_state(), "0.1.0").unwrap();
        assert!(decode_state(&bytes[..6], "0.1.0").is_err());
    }

    #[test]
    fn wrong_magic_is_rejected() {
        let header = StateHeader {
            magic: *b"BAAD",
            format_version: STATE_FORMAT_VERSION,
            tool_version: "0.1.0".to_string(),
            checksum: ContentHash::from_bytes(b"data"),
        };
        let bytes = encode_with_header(&header, b"data");
        assert!(matches!(
            decode_state(&bytes, "0.1.0"),
            Err(CacheError::InvalidHeader { .. })
        ));
    }

    #[test]
    fn wrong_format_version_is_rejected() {
        let header = StateHeader {
            magic: STATE_MAGIC,
            format_version: 999,
            tool_version: "0.1.0".to_string(),
            checksum: ContentHash::from_bytes(b"data"),
        };
        let bytes = encode_with_header(&header, b"data");
        assert!(matches!(
            decode_state(&bytes, "0.1.0"),
            Err(CacheError::VersionMismatch { .. })
        ));
    }

    #[test]
    fn other_tool_version_is_rejected() {
        let bytes = encode_state(&sample_state(), "0.1.0").unwrap();
        assert!(matches!(
            decode_state(&bytes, "0.2.0"),
            Err(CacheError::VersionMismatch { .. })
        ));
    }

    #[test]
    fn tampered_payload_is_rejected() {
        let mut bytes = encode_state(&sample_state(), "0.1.0").unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        assert!(matches!(
            decode_state(&bytes, "0.1.0"),
            Err(CacheError::ChecksumMismatch { .. })
        ));
    }
}
