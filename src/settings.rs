//! Settings that influence how an SDO is decoded and how its signatures are interpreted.

use serde::{Deserialize, Serialize};

use crate::TextEncoding;

/// Issuer name fragment that identifies a certificate issued directly by the BankID root, i.e., the
/// bank's intermediate CA certificate.
pub const BANKID_ROOT_CA_MARKER: &str = "BankID Root CA";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SdoSettings {
    /// Encoding of the SDO file itself. When absent the XML declaration is consulted.
    pub source_encoding: Option<TextEncoding>,
    /// Encoding used to reproduce the `SDODataPart` bytes covered by the seal. When absent the source
    /// encoding is used.
    pub seal_encoding: Option<TextEncoding>,
    pub root_ca_marker: String,
}

impl Default for SdoSettings {
    fn default() -> Self {
        SdoSettings {
            source_encoding: None,
            seal_encoding: None,
            root_ca_marker: BANKID_ROOT_CA_MARKER.to_string(),
        }
    }
}

impl SdoSettings {
    pub fn with_source_encoding(mut self, encoding: TextEncoding) -> Self {
        self.source_encoding = Some(encoding);
        self
    }

    pub fn with_seal_encoding(mut self, encoding: TextEncoding) -> Self {
        self.seal_encoding = Some(encoding);
        self
    }

    pub fn with_root_ca_marker(mut self, marker: impl Into<String>) -> Self {
        self.root_ca_marker = marker.into();
        self
    }
}
