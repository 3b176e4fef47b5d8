//! Parses and verifies SEID SDO (Signed Document Object) containers as produced by Norwegian BankID.
//! An SDO wraps a signed document together with one CMS SignedData signature per signer and a seal
//! signature, issued by the merchant, that covers the whole `SDODataPart` element. This is not a
//! general purpose CMS or X.509 path validation library.
//!
//! ```no_run
//! use sdo_verify::SdoDocument;
//!
//! let sdo = SdoDocument::from_path("Test1.sdo")?;
//! for signature in sdo.signatures()? {
//!     let signature = signature?;
//!     println!("{} verified: {}", signature.name, signature.verified);
//! }
//! let seal = sdo.sealed_by()?;
//! println!("sealed by {} at {}", seal.name, seal.timestamp);
//! # Ok::<(), sdo_verify::Error>(())
//! ```

pub(crate) mod asn1;
pub mod chain;
pub mod encoding;
pub mod payload;
pub mod record;
pub mod sdo;
pub mod settings;
pub mod signer;
pub(crate) mod timestamp;
pub(crate) mod xml;

pub use chain::{ChainResolution, ResolvedCertificatePair};
pub use encoding::TextEncoding;
pub use record::{BankIdSignature, BankIdType, Name, Signature};
pub use sdo::{DocumentType, MetaData, SdoDocument};
pub use settings::SdoSettings;
pub use signer::CmsEnvelope;

/// Errors produced while loading an SDO or interpreting its signatures.
///
/// `DigestMismatch`, `VerificationFailed`, `UnsupportedAlgorithm` and `Certval` describe why a
/// signature did not verify. The accessors on [`SdoDocument`] report those as `verified == false`
/// rather than returning them.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("file not found: {0}")]
    NotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("XML parsing error: {0}")]
    XmlParse(String),

    #[error("malformed SDO: {0}")]
    MalformedDocument(String),

    #[error("unknown document type: {0}")]
    UnknownDocumentType(String),

    #[error("signed attributes carry no signing time")]
    MissingSigningTime,

    #[error("cannot tell signer certificate from bank certificate: {0}")]
    AmbiguousCertificateChain(String),

    #[error("cannot decode CMS signature: {0}")]
    CmsDecode(String),

    #[error("base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("ASN.1 error: {0}")]
    Asn1(#[from] der::Error),

    #[error("text encoding error: {0}")]
    Encoding(String),

    #[error("message digest does not match content")]
    DigestMismatch,

    #[error("signature verification failed: {0}")]
    VerificationFailed(String),

    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("certificate processing error: {0:?}")]
    Certval(certval::Error),
}

impl From<certval::Error> for Error {
    fn from(e: certval::Error) -> Self {
        Error::Certval(e)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
