//! Tells the end-entity signer certificate apart from the bank's intermediate certificate.
//!
//! A BankID signature carries two certificates and omits the root. The bank certificate is the one
//! issued by the BankID root, recognised by a marker in its issuer name (see
//! [`crate::settings::BANKID_ROOT_CA_MARKER`]). This is a naming heuristic for a fixed two level
//! chain, not path building.

use const_oid::ObjectIdentifier;
use der::{asn1::Any, Tag, Tagged};
use log::{debug, error};
use x509_cert::{name::Name, Certificate};

use crate::{Error, Result};

pub const OID_CN: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.3");
pub const OID_SERIAL_NUMBER: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.5");
pub const OID_OU: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.11");

/// Outcome of inspecting the issuer names of the first two certificates.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ChainResolution {
    FirstIsBank,
    SecondIsBank,
    /// Neither or both certificates carry the root marker, or fewer than two certificates exist.
    Ambiguous,
}

impl ChainResolution {
    pub fn classify(certificates: &[Certificate], root_ca_marker: &str) -> Self {
        let (first, second) = match certificates {
            [first, second, ..] => (first, second),
            _ => return ChainResolution::Ambiguous,
        };
        let issued_by_root = |cert: &Certificate| {
            cert.tbs_certificate
                .issuer
                .0
                .iter()
                .flat_map(|rdn| rdn.0.iter())
                .filter_map(|atv| directory_string(&atv.value))
                .any(|value| value.contains(root_ca_marker))
        };
        match (issued_by_root(first), issued_by_root(second)) {
            (true, false) => ChainResolution::FirstIsBank,
            (false, true) => ChainResolution::SecondIsBank,
            _ => ChainResolution::Ambiguous,
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ResolvedCertificatePair {
    pub signer: Certificate,
    pub bank: Certificate,
}

impl ResolvedCertificatePair {
    pub fn resolve(certificates: &[Certificate], root_ca_marker: &str) -> Result<Self> {
        let resolution = ChainResolution::classify(certificates, root_ca_marker);
        debug!("Resolved certificate roles: {resolution:?}");
        let (bank, signer) = match resolution {
            ChainResolution::FirstIsBank => (&certificates[0], &certificates[1]),
            ChainResolution::SecondIsBank => (&certificates[1], &certificates[0]),
            ChainResolution::Ambiguous => {
                error!(
                    "Cannot resolve certificate roles among {} certificates using marker {root_ca_marker:?}",
                    certificates.len()
                );
                return Err(Error::AmbiguousCertificateChain(format!(
                    "{} certificates, marker {root_ca_marker:?} on neither or both",
                    certificates.len()
                )));
            }
        };
        Ok(ResolvedCertificatePair {
            signer: signer.clone(),
            bank: bank.clone(),
        })
    }
}

/// First value of the `oid` attribute in `name`, decoded to a string.
pub fn name_attribute(name: &Name, oid: ObjectIdentifier) -> Option<String> {
    name.0
        .iter()
        .flat_map(|rdn| rdn.0.iter())
        .find(|atv| atv.oid == oid)
        .and_then(|atv| directory_string(&atv.value))
}

pub fn common_name(name: &Name) -> Option<String> {
    name_attribute(name, OID_CN)
}

pub fn organizational_unit(name: &Name) -> Option<String> {
    name_attribute(name, OID_OU)
}

pub fn serial_number(name: &Name) -> Option<String> {
    name_attribute(name, OID_SERIAL_NUMBER)
}

/// Decodes the DirectoryString flavours found in BankID names. TeletexString is treated as Latin-1,
/// which is what issuers put in it in practice.
fn directory_string(value: &Any) -> Option<String> {
    let bytes = value.value();
    match value.tag() {
        Tag::Utf8String | Tag::PrintableString | Tag::Ia5String | Tag::VisibleString => {
            String::from_utf8(bytes.to_vec()).ok()
        }
        Tag::TeletexString => Some(bytes.iter().map(|b| char::from(*b)).collect()),
        Tag::BmpString => {
            if bytes.len() % 2 != 0 {
                return None;
            }
            let units: Vec<u16> = bytes
                .chunks_exact(2)
                .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
                .collect();
            String::from_utf16(&units).ok()
        }
        _ => None,
    }
}
