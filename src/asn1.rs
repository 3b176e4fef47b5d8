//! Lenient SignedData decoder for BankID signatures.

use cms::{
    content_info::CmsVersion,
    signed_data::{DigestAlgorithmIdentifiers, EncapsulatedContentInfo, SignerInfos},
};
use der::{
    asn1::SetOfVec,
    Any, Decode, Encode, Sequence,
};
use x509_cert::{impl_newtype, Certificate};

/// SignedData with the certificate and CRL sets kept as opaque values.
///
/// The `cms` crate rejects the whole structure when a `CertificateChoices` entry is something other
/// than an X.509 certificate (e.g., obsolete v1 attribute certificates). Only the X.509
/// certificates are needed here, so the rest is skipped when collecting them.
#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
#[allow(missing_docs)]
pub(crate) struct LenientSignedData {
    pub version: CmsVersion,
    pub digest_algorithms: DigestAlgorithmIdentifiers,
    pub encap_content_info: EncapsulatedContentInfo,
    #[asn1(context_specific = "0", tag_mode = "IMPLICIT", optional = "true")]
    pub certificates: Option<AnySet>,
    #[asn1(context_specific = "1", tag_mode = "IMPLICIT", optional = "true")]
    pub crls: Option<AnySet>,
    pub signer_infos: SignerInfos,
}

#[derive(Clone, Eq, PartialEq, Debug)]
pub(crate) struct AnySet(pub SetOfVec<Any>);
impl_newtype!(AnySet, SetOfVec<Any>);

impl LenientSignedData {
    /// X.509 certificates from the certificate set, other choices dropped.
    pub(crate) fn x509_certificates(&self) -> Vec<Certificate> {
        let pile = match &self.certificates {
            Some(pile) => pile,
            None => return vec![],
        };
        let mut certs = vec![];
        for item in pile.0.iter() {
            if let Ok(d) = item.to_der() {
                if let Ok(c) = Certificate::from_der(&d) {
                    certs.push(c);
                }
            }
        }
        certs
    }
}
