//! Recovers the exact bytes of the `SDODataPart` element covered by the seal signature.
//!
//! The seal digest was computed over the element as it appears in the file. Serializing a parsed
//! tree does not reproduce quoting, whitespace or namespace declarations, so the span is cut from
//! the original text and re-encoded with the producer's encoding.

use log::{debug, error};

use crate::{Error, Result, TextEncoding};

pub const DATA_PART_START: &str = "<SDODataPart>";
pub const DATA_PART_END: &str = "</SDODataPart>";

/// Returns the slice of `text` from the first `<SDODataPart>` through the matching
/// `</SDODataPart>`, tags included.
pub fn data_part_span(text: &str) -> Result<&str> {
    let start = match text.find(DATA_PART_START) {
        Some(start) => start,
        None => {
            error!("No {DATA_PART_START} tag in SDO text");
            return Err(Error::MalformedDocument(format!(
                "{DATA_PART_START} not found"
            )));
        }
    };
    let body = start + DATA_PART_START.len();
    let end = match text[body..].find(DATA_PART_END) {
        Some(end) => body + end + DATA_PART_END.len(),
        None => {
            error!("No {DATA_PART_END} tag after offset {body}");
            return Err(Error::MalformedDocument(format!("{DATA_PART_END} not found")));
        }
    };
    Ok(&text[start..end])
}

/// Extracts the `SDODataPart` span and encodes it as the bytes the seal was computed over.
pub fn extract_data_part(text: &str, encoding: TextEncoding) -> Result<Vec<u8>> {
    let span = data_part_span(text)?;
    let bytes = encoding.encode(span)?;
    debug!("Extracted {} byte SDODataPart payload ({encoding:?})", bytes.len());
    Ok(bytes)
}
