//! Slot line codec
//!
//! Fixed-width text encoding of one record per slot.
//!
//! ## Slot Format
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │ <id> = <value> | . . . . . . . . . . . . . . . . . .  \n │
//! │ ◄──── line ───►   ◄──────── filler (tail) ────────►      │
//! │ ◄──────────────────── slot_width bytes ────────────────► │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! A vacant slot carries no `=`: `|` followed by filler and a newline.
//! Slot `n` starts at byte `n * slot_width`, so every slot is also exactly
//! one line of the file.

use crate::error::{Result, SimstorError};

/// Slot width granularity in bytes (`slot_width = increment * SLOT_UNIT`)
pub const SLOT_UNIT: u64 = 1000;

/// Separates the encoded ID from the encoded value
pub const KEY_SEPARATOR: u8 = b'=';

/// Ends the record text; everything after it is padding
pub const RECORD_TERMINATOR: u8 = b'|';

/// Padding byte between the terminator and the newline
pub const FILLER: u8 = b'.';

const NEWLINE: u8 = b'\n';

/// Fixed slot geometry for one table file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotLayout {
    width: u64,
}

/// Parsed content of a slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotContent {
    /// Slot holds no record
    Vacant,

    /// Slot holds an encoded record
    Record { id: String, value: String },
}

impl SlotLayout {
    /// Create a layout with the given slot width in bytes
    ///
    /// Widths below 2 cannot hold a terminator and newline; the config
    /// builder only produces multiples of `SLOT_UNIT`.
    pub fn new(width: u64) -> Self {
        debug_assert!(width >= 2);
        Self { width }
    }

    /// Slot width in bytes
    pub fn width(&self) -> u64 {
        self.width
    }

    /// Byte offset where the given slot starts
    pub fn offset(&self, slot: u64) -> u64 {
        slot * self.width
    }

    /// Longest `id=value` line that fits
    pub fn capacity(&self) -> usize {
        self.width as usize - 2
    }

    /// Encode a record into exactly `width` bytes
    ///
    /// Fails with `SlotOverflow` when `id=value` is longer than `capacity()`.
    pub fn encode(&self, id: &str, value: &str) -> Result<Vec<u8>> {
        let line_len = id.len() + 1 + value.len();
        let available = self.capacity();
        if line_len > available {
            return Err(SimstorError::SlotOverflow {
                needed: line_len,
                available,
            });
        }

        let mut slot = Vec::with_capacity(self.width as usize);
        slot.extend_from_slice(id.as_bytes());
        slot.push(KEY_SEPARATOR);
        slot.extend_from_slice(value.as_bytes());
        Ok(self.pad(slot))
    }

    /// Encode an empty slot
    pub fn vacant(&self) -> Vec<u8> {
        self.pad(Vec::with_capacity(self.width as usize))
    }

    /// Append terminator, filler and newline; `slot` must fit `capacity()`
    fn pad(&self, mut slot: Vec<u8>) -> Vec<u8> {
        let tail = self.capacity() - slot.len();
        slot.push(RECORD_TERMINATOR);
        slot.resize(slot.len() + tail, FILLER);
        slot.push(NEWLINE);
        debug_assert_eq!(slot.len() as u64, self.width);
        slot
    }

    /// Parse the bytes of one slot (the trailing newline is optional)
    ///
    /// `slot` is only used to label errors.
    pub fn decode(&self, slot: u64, bytes: &[u8]) -> Result<SlotContent> {
        let body = record_body(bytes).ok_or_else(|| SimstorError::MalformedRecord {
            slot,
            reason: "missing record terminator".to_string(),
        })?;

        let text = std::str::from_utf8(body).map_err(|e| SimstorError::MalformedRecord {
            slot,
            reason: format!("invalid UTF-8: {}", e),
        })?;

        if text.trim().is_empty() {
            return Ok(SlotContent::Vacant);
        }

        let (id, value) = text
            .split_once(KEY_SEPARATOR as char)
            .ok_or_else(|| SimstorError::MalformedRecord {
                slot,
                reason: "missing '=' separator".to_string(),
            })?;

        if id.trim().is_empty() {
            return Err(SimstorError::MalformedRecord {
                slot,
                reason: "empty id".to_string(),
            });
        }
        if value.trim().is_empty() {
            return Err(SimstorError::MalformedRecord {
                slot,
                reason: "empty value".to_string(),
            });
        }

        Ok(SlotContent::Record {
            id: id.to_string(),
            value: value.to_string(),
        })
    }
}

/// Bytes before the first terminator, or None if there is none
fn record_body(bytes: &[u8]) -> Option<&[u8]> {
    let end = bytes.iter().position(|&b| b == RECORD_TERMINATOR)?;
    Some(&bytes[..end])
}

/// Encoded ID of a scanned line, or None for vacant or unreadable lines
///
/// Only looks at the text before `=`; the value is not validated here.
pub fn scan_id(line: &[u8]) -> Option<&str> {
    let body = record_body(line)?;
    let sep = body.iter().position(|&b| b == KEY_SEPARATOR)?;
    let id = std::str::from_utf8(&body[..sep]).ok()?;
    if id.trim().is_empty() {
        None
    } else {
        Some(id)
    }
}

/// Check an encoded ID for reserved bytes
pub fn check_id(id: &str) -> std::result::Result<(), String> {
    if id.trim().is_empty() {
        return Err("encoded id is empty".to_string());
    }
    check_reserved(id, &[KEY_SEPARATOR, RECORD_TERMINATOR, NEWLINE])
        .map_err(|b| format!("encoded id '{}' contains reserved byte {:?}", id, b as char))
}

/// Check an encoded value for reserved bytes
///
/// `=` is allowed since decoding splits at the first one.
pub fn check_value(value: &str) -> std::result::Result<(), String> {
    if value.trim().is_empty() {
        return Err("encoded value is empty".to_string());
    }
    check_reserved(value, &[RECORD_TERMINATOR, NEWLINE])
        .map_err(|b| format!("encoded value contains reserved byte {:?}", b as char))
}

fn check_reserved(text: &str, reserved: &[u8]) -> std::result::Result<(), u8> {
    match text.bytes().find(|b| reserved.contains(b)) {
        Some(b) => Err(b),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_layout() {
        let layout = SlotLayout::new(20);
        let slot = layout.encode("k1", "v").unwrap();

        assert_eq!(slot.len(), 20);
        assert_eq!(slot, format!("k1=v|{}\n", ".".repeat(14)).into_bytes());
    }

    #[test]
    fn test_encode_exact_fit() {
        let layout = SlotLayout::new(10);
        // 8 bytes of line, terminator, newline, no filler
        let slot = layout.encode("abc", "wxyz").unwrap();
        assert_eq!(&slot, b"abc=wxyz|\n");
    }

    #[test]
    fn test_encode_overflow() {
        let layout = SlotLayout::new(10);
        let err = layout.encode("abc", "wxyz1").unwrap_err();

        assert!(matches!(
            err,
            SimstorError::SlotOverflow {
                needed: 9,
                available: 8
            }
        ));
    }

    #[test]
    fn test_value_with_dots_survives_filler() {
        let layout = SlotLayout::new(40);
        let slot = layout.encode("Key0", "1.200000,3.").unwrap();

        let content = layout.decode(0, &slot[..39]).unwrap();
        assert_eq!(
            content,
            SlotContent::Record {
                id: "Key0".to_string(),
                value: "1.200000,3.".to_string()
            }
        );
    }

    #[test]
    fn test_value_may_contain_equals() {
        let layout = SlotLayout::new(30);
        let slot = layout.encode("k", "a=b").unwrap();

        match layout.decode(0, &slot).unwrap() {
            SlotContent::Record { id, value } => {
                assert_eq!(id, "k");
                assert_eq!(value, "a=b");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_vacant_slot() {
        let layout = SlotLayout::new(12);
        let slot = layout.vacant();

        assert_eq!(slot, format!("|{}\n", ".".repeat(10)).into_bytes());
        assert_eq!(layout.decode(3, &slot).unwrap(), SlotContent::Vacant);
        assert_eq!(scan_id(&slot), None);
    }

    #[test]
    fn test_decode_malformed() {
        let layout = SlotLayout::new(20);

        let missing_sep = layout.decode(1, b"novalue|....").unwrap_err();
        assert!(matches!(missing_sep, SimstorError::MalformedRecord { slot: 1, .. }));

        let empty_value = layout.decode(2, b"id= |....").unwrap_err();
        assert!(matches!(empty_value, SimstorError::MalformedRecord { slot: 2, .. }));

        let empty_id = layout.decode(3, b"=v|....").unwrap_err();
        assert!(matches!(empty_id, SimstorError::MalformedRecord { slot: 3, .. }));

        let zeroed = layout.decode(4, &[0u8; 19]).unwrap_err();
        assert!(matches!(zeroed, SimstorError::MalformedRecord { slot: 4, .. }));
    }

    #[test]
    fn test_scan_id() {
        assert_eq!(scan_id(b"Key7=1.0|...\n"), Some("Key7"));
        assert_eq!(scan_id(b"=1.0|...\n"), None);
        assert_eq!(scan_id(b"garbage\n"), None);
    }

    #[test]
    fn test_reserved_bytes() {
        assert!(check_id("Key0").is_ok());
        assert!(check_id("a=b").is_err());
        assert!(check_id("a|b").is_err());
        assert!(check_id("a\nb").is_err());
        assert!(check_id("").is_err());

        assert!(check_value("x=y").is_ok());
        assert!(check_value("x|y").is_err());
        assert!(check_value(" ").is_err());
    }
}
