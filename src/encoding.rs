//! Text encodings used by SDO producers. Older producers emitted Windows-1252 / ISO-8859-1 text,
//! newer ones UTF-8; the seal digest is computed over the encoded bytes, so the encoding has to be
//! reproduced exactly.

use encoding_rs::WINDOWS_1252;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub enum TextEncoding {
    #[default]
    Utf8,
    Windows1252,
    /// Strict ISO-8859-1, every character must be below U+0100.
    Latin1,
}

impl TextEncoding {
    /// Maps an IANA charset label as found in an XML declaration.
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "utf-8" | "utf8" => Some(TextEncoding::Utf8),
            "windows-1252" | "cp1252" | "x-cp1252" => Some(TextEncoding::Windows1252),
            "iso-8859-1" | "iso8859-1" | "latin1" | "l1" => Some(TextEncoding::Latin1),
            _ => None,
        }
    }

    /// Looks for `encoding="..."` in a leading `<?xml ...?>` declaration. Falls back to UTF-8.
    pub fn sniff(data: &[u8]) -> Self {
        if data.starts_with(UTF8_BOM) {
            return TextEncoding::Utf8;
        }
        if !data.starts_with(b"<?xml") {
            return TextEncoding::Utf8;
        }
        let end = match data.iter().position(|b| *b == b'>') {
            Some(end) => end,
            None => return TextEncoding::Utf8,
        };
        let decl = String::from_utf8_lossy(&data[..end]);
        let rest = match decl.find("encoding") {
            Some(pos) => &decl[pos + "encoding".len()..],
            None => return TextEncoding::Utf8,
        };
        let rest = rest.trim_start().trim_start_matches('=').trim_start();
        let quote = match rest.chars().next() {
            Some(q @ ('"' | '\'')) => q,
            _ => return TextEncoding::Utf8,
        };
        rest[1..]
            .split(quote)
            .next()
            .and_then(TextEncoding::from_label)
            .unwrap_or_default()
    }

    pub fn decode(&self, data: &[u8]) -> Result<String> {
        match self {
            TextEncoding::Utf8 => {
                let data = data.strip_prefix(UTF8_BOM).unwrap_or(data);
                String::from_utf8(data.to_vec())
                    .map_err(|e| Error::Encoding(format!("invalid UTF-8: {e}")))
            }
            TextEncoding::Windows1252 => {
                let (text, had_errors) = WINDOWS_1252.decode_without_bom_handling(data);
                if had_errors {
                    return Err(Error::Encoding("invalid windows-1252 text".to_string()));
                }
                Ok(text.into_owned())
            }
            TextEncoding::Latin1 => Ok(data.iter().map(|b| char::from(*b)).collect()),
        }
    }

    pub fn can_encode(&self, c: char) -> bool {
        match self {
            TextEncoding::Utf8 => true,
            TextEncoding::Windows1252 => {
                let mut buf = [0; 4];
                !WINDOWS_1252.encode(c.encode_utf8(&mut buf)).2
            }
            TextEncoding::Latin1 => u32::from(c) < 0x100,
        }
    }

    /// Encodes `text`. Characters the target encoding cannot represent are an error rather than
    /// being replaced, since a replacement would silently change digested bytes.
    pub fn encode(&self, text: &str) -> Result<Vec<u8>> {
        match self {
            TextEncoding::Utf8 => Ok(text.as_bytes().to_vec()),
            TextEncoding::Windows1252 => {
                let (bytes, _, had_errors) = WINDOWS_1252.encode(text);
                if had_errors {
                    return Err(Error::Encoding(
                        "text not representable in windows-1252".to_string(),
                    ));
                }
                Ok(bytes.into_owned())
            }
            TextEncoding::Latin1 => text
                .chars()
                .map(|c| {
                    u8::try_from(u32::from(c)).map_err(|_| {
                        Error::Encoding(format!("character {c:?} not representable in ISO-8859-1"))
                    })
                })
                .collect(),
        }
    }
}
