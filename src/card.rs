//! Card Codec - fixed-width keyword/value records
//!
//! A status region is a flat run of 80-byte textual cards terminated by an
//! end-marker card (keyword `END`). Each card carries an 8-byte left-justified
//! keyword field, a `"= "` separator, and a 70-byte value field. String values
//! are single-quoted with embedded quotes doubled; numeric values are plain
//! decimal text, right-justified. The layout is byte-compatible with the
//! regions written and read by the unmodified pipeline processes.
//!
//! Everything here is pure slice manipulation: no OS handles, no locking.
//! Callers hold the region lock around every call.
//!
//! Truncation is silent, inherited from the format: keywords are
//! matched and stored on their first 8 bytes, string payloads are capped at
//! 68 bytes. Over-length input is never rejected, it is clipped.

use crate::error::{Result, StatusError};

/// One record in the status region
pub const CARD_SIZE: usize = 80;

/// Left-justified keyword field width; keywords are truncated to this
pub const KEYWORD_WIDTH: usize = 8;

/// Offset of the value field within a card (after keyword and `"= "`)
pub const VALUE_OFFSET: usize = 10;

/// Longest string payload one card can carry (value field minus quotes)
pub const STRING_VALUE_MAX: usize = CARD_SIZE - VALUE_OFFSET - 2;

/// Cards per region, end marker included
pub const REGION_CARDS: usize = 2304;

/// Fixed region capacity in bytes
pub const REGION_SIZE: usize = REGION_CARDS * CARD_SIZE;

const END_FIELD: [u8; KEYWORD_WIDTH] = *b"END     ";

// FITS-style minimum: short strings are space-padded to 8 chars inside the
// quotes so external readers see a fixed-looking field.
const STRING_VALUE_MIN: usize = 8;

/// Initialize a buffer to an empty well-formed region: the end marker at
/// card 0 and space fill everywhere else.
pub fn init(buf: &mut [u8]) {
    debug_assert!(buf.len() >= CARD_SIZE);
    for b in buf.iter_mut() {
        *b = b' ';
    }
    buf[..KEYWORD_WIDTH].copy_from_slice(&END_FIELD);
}

/// Look up a keyword and return its raw value text.
///
/// `None` means the keyword is absent (or the buffer holds no cards before
/// its end); lookups never fail. The returned string has quoting removed and
/// trailing padding trimmed.
pub fn get_str(buf: &[u8], keyword: &str) -> Option<String> {
    let field = keyword_field(keyword);
    match scan(buf, &field) {
        Scan::Found(offset) => Some(decode_value(&buf[offset + KEYWORD_WIDTH..offset + CARD_SIZE])),
        Scan::Absent { .. } => None,
    }
}

/// Look up a keyword and parse its value as a double.
///
/// Absence is reported explicitly as `Ok(None)`; a present value that does
/// not parse is a [`StatusError::MalformedValue`].
pub fn get_f64(buf: &[u8], keyword: &str) -> Result<Option<f64>> {
    let text = match get_str(buf, keyword) {
        Some(t) => t,
        None => return Ok(None),
    };
    match text.trim().parse::<f64>() {
        Ok(v) => Ok(Some(v)),
        Err(_) => Err(StatusError::MalformedValue {
            keyword: keyword.to_string(),
            value: text,
        }),
    }
}

/// Write a string value, overwriting in place when the keyword exists and
/// inserting a new card just before the end marker otherwise.
///
/// The payload is truncated to [`STRING_VALUE_MAX`] encoded bytes. A full
/// region is a capacity error; the end marker is never moved on failure.
pub fn put_str(buf: &mut [u8], keyword: &str, value: &str) -> Result<()> {
    let encoded = encode_string_value(value);
    put_card(buf, keyword, &encoded)
}

/// Write a numeric value; same overwrite/insert rules as [`put_str`].
pub fn put_f64(buf: &mut [u8], keyword: &str, value: f64) -> Result<()> {
    let encoded = encode_f64_value(value);
    put_card(buf, keyword, &encoded)
}

/// Number of cards in use, end marker included. Used for capacity reporting.
pub fn cards_used(buf: &[u8]) -> usize {
    match end_offset(buf) {
        Some(offset) => offset / CARD_SIZE + 1,
        None => buf.len() / CARD_SIZE,
    }
}

/// Byte offset of the end-marker card, if the buffer holds one
fn end_offset(buf: &[u8]) -> Option<usize> {
    let mut offset = 0;
    while offset + CARD_SIZE <= buf.len() {
        if buf[offset..offset + KEYWORD_WIDTH].eq_ignore_ascii_case(&END_FIELD) {
            return Some(offset);
        }
        offset += CARD_SIZE;
    }
    None
}

enum Scan {
    /// Byte offset of the card whose keyword matched
    Found(usize),
    /// No match before the end marker (offset given when one exists)
    Absent { end: Option<usize> },
}

/// Walk cards from the front, stopping at the first end marker. Cards past
/// the marker are stale and never examined.
fn scan(buf: &[u8], field: &[u8; KEYWORD_WIDTH]) -> Scan {
    let mut offset = 0;
    while offset + CARD_SIZE <= buf.len() {
        let card_kw = &buf[offset..offset + KEYWORD_WIDTH];
        if card_kw.eq_ignore_ascii_case(&END_FIELD) {
            return Scan::Absent { end: Some(offset) };
        }
        if card_kw.eq_ignore_ascii_case(field) {
            return Scan::Found(offset);
        }
        offset += CARD_SIZE;
    }
    Scan::Absent { end: None }
}

fn put_card(buf: &mut [u8], keyword: &str, encoded_value: &[u8]) -> Result<()> {
    let field = keyword_field(keyword);
    let offset = match scan(buf, &field) {
        Scan::Found(offset) => offset,
        Scan::Absent { end: None } => return Err(StatusError::EndMarkerMissing),
        Scan::Absent { end: Some(end) } => {
            // Insert before the marker: the new card takes the marker's slot
            // and the marker shifts one card, which must still fit.
            if end + 2 * CARD_SIZE > buf.len() {
                return Err(StatusError::CapacityExhausted {
                    cards: buf.len() / CARD_SIZE,
                });
            }
            let marker = end + CARD_SIZE;
            buf[marker..marker + CARD_SIZE].fill(b' ');
            buf[marker..marker + KEYWORD_WIDTH].copy_from_slice(&END_FIELD);
            buf[end..end + KEYWORD_WIDTH].copy_from_slice(&field);
            end
        }
    };

    let card = &mut buf[offset..offset + CARD_SIZE];
    card[KEYWORD_WIDTH..VALUE_OFFSET].copy_from_slice(b"= ");
    card[VALUE_OFFSET..].fill(b' ');
    let n = encoded_value.len().min(CARD_SIZE - VALUE_OFFSET);
    card[VALUE_OFFSET..VALUE_OFFSET + n].copy_from_slice(&encoded_value[..n]);
    Ok(())
}

/// Truncate to the field width and left-justify with space padding.
/// Matching is case-insensitive, so the keyword is stored as given.
fn keyword_field(keyword: &str) -> [u8; KEYWORD_WIDTH] {
    let mut field = [b' '; KEYWORD_WIDTH];
    let bytes = keyword.as_bytes();
    let n = bytes.len().min(KEYWORD_WIDTH);
    field[..n].copy_from_slice(&bytes[..n]);
    field
}

/// Quote a string payload, doubling embedded quotes, capped at the value
/// field. Truncation never splits a doubled quote pair.
fn encode_string_value(value: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(STRING_VALUE_MAX + 2);
    out.push(b'\'');
    for &b in value.as_bytes() {
        let needed = if b == b'\'' { 2 } else { 1 };
        if out.len() - 1 + needed > STRING_VALUE_MAX {
            break;
        }
        out.push(b);
        if b == b'\'' {
            out.push(b'\'');
        }
    }
    while out.len() - 1 < STRING_VALUE_MIN {
        out.push(b' ');
    }
    out.push(b'\'');
    out
}

/// Shortest decimal text that round-trips the exact f64, right-justified to
/// 20 columns. Exponential notation keeps extreme magnitudes inside the
/// value field.
fn encode_f64_value(value: f64) -> Vec<u8> {
    let text = if value == 0.0 || (value.abs() >= 1e-4 && value.abs() < 1e16) {
        format!("{:?}", value)
    } else {
        format!("{:e}", value)
    };
    format!("{:>20}", text).into_bytes()
}

/// Decode the `"= value"` tail of a card: strip the separator, unquote when
/// quoted, trim padding.
fn decode_value(tail: &[u8]) -> String {
    // Tolerate a missing "= " separator from foreign writers; treat the
    // whole tail as the value in that case.
    let field = if tail.len() >= 2 && &tail[..2] == b"= " {
        &tail[2..]
    } else {
        tail
    };

    let trimmed: &[u8] = trim_spaces(field);
    if trimmed.first() == Some(&b'\'') {
        let mut out = Vec::with_capacity(trimmed.len());
        let inner = &trimmed[1..];
        let mut i = 0;
        while i < inner.len() {
            if inner[i] == b'\'' {
                if inner.get(i + 1) == Some(&b'\'') {
                    out.push(b'\'');
                    i += 2;
                    continue;
                }
                break; // closing quote
            }
            out.push(inner[i]);
            i += 1;
        }
        while out.last() == Some(&b' ') {
            out.pop();
        }
        String::from_utf8_lossy(&out).into_owned()
    } else {
        String::from_utf8_lossy(trimmed).into_owned()
    }
}

fn trim_spaces(mut bytes: &[u8]) -> &[u8] {
    while bytes.first() == Some(&b' ') {
        bytes = &bytes[1..];
    }
    while bytes.last() == Some(&b' ') {
        bytes = &bytes[..bytes.len() - 1];
    }
    bytes
}
