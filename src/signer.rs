//! Decodes a detached CMS SignedData value and verifies it against the content it covers.
//!
//! Verification covers the message-digest attribute, the signature over the signed attributes and
//! an issuer name based check that the bank certificate issued the signer certificate. There is no
//! trust anchor and no revocation check.

use base64::Engine;
use chrono::{DateTime, Utc};
use cms::{
    attr::MessageDigest,
    content_info::ContentInfo,
    signed_data::{SignerIdentifier, SignerInfo},
};
use const_oid::{
    db::{
        rfc5911::{ID_MESSAGE_DIGEST, ID_SIGNED_DATA},
        rfc5912::{
            ID_SHA_1, ID_SHA_256, ID_SHA_384, ID_SHA_512, RSA_ENCRYPTION,
            SHA_1_WITH_RSA_ENCRYPTION, SHA_256_WITH_RSA_ENCRYPTION, SHA_384_WITH_RSA_ENCRYPTION,
            SHA_512_WITH_RSA_ENCRYPTION,
        },
        rfc5280::ID_CE_SUBJECT_KEY_IDENTIFIER,
    },
    ObjectIdentifier,
};
use der::{Decode, Encode};
use log::{debug, error, warn};
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha384, Sha512};
use x509_cert::{ext::pkix::SubjectKeyIdentifier, spki::AlgorithmIdentifierOwned, Certificate};

use certval::PkiEnvironment;

use crate::{asn1::LenientSignedData, Error, ResolvedCertificatePair, Result};

/// A decoded BankID CMS signature whose content is held elsewhere.
#[derive(Clone, Debug)]
pub struct CmsEnvelope {
    signed_data: LenientSignedData,
    certificates: Vec<Certificate>,
}

/// What a signature says about itself once checked against its content.
#[derive(Clone, Debug)]
pub struct Verification {
    pub timestamp: DateTime<Utc>,
    pub verified: bool,
    pub certificates: Vec<Certificate>,
}

impl CmsEnvelope {
    /// Decodes base64 text as found in a `CMSSignature` element. Line breaks and other whitespace
    /// in the text are ignored.
    pub fn decode(base64_text: &str) -> Result<Self> {
        let compact: String = base64_text
            .chars()
            .filter(|c| !c.is_ascii_whitespace())
            .collect();
        let der_bytes = match base64::engine::general_purpose::STANDARD.decode(compact) {
            Ok(der_bytes) => der_bytes,
            Err(e) => {
                error!("Failed to base64 decode CMS signature: {e:?}");
                return Err(e.into());
            }
        };
        Self::from_der(&der_bytes)
    }

    pub fn from_der(der_bytes: &[u8]) -> Result<Self> {
        let ci = match ContentInfo::from_der(der_bytes) {
            Ok(ci) => ci,
            Err(e) => {
                error!("Failed to parse ContentInfo: {e:?}");
                return Err(Error::CmsDecode(e.to_string()));
            }
        };
        if ci.content_type != ID_SIGNED_DATA {
            error!("ContentInfo carries {} rather than SignedData", ci.content_type);
            return Err(Error::CmsDecode(format!(
                "unexpected content type {}",
                ci.content_type
            )));
        }
        let sd_bytes = ci.content.to_der()?;
        let signed_data = match LenientSignedData::from_der(&sd_bytes) {
            Ok(sd) => sd,
            Err(e) => {
                error!("Failed to parse SignedData: {e:?}");
                return Err(Error::CmsDecode(e.to_string()));
            }
        };
        if signed_data.signer_infos.0.is_empty() {
            return Err(Error::CmsDecode("SignedData has no SignerInfo".to_string()));
        }
        let certificates = signed_data.x509_certificates();
        debug!("Decoded SignedData with {} certificates", certificates.len());
        Ok(CmsEnvelope {
            signed_data,
            certificates,
        })
    }

    /// Embedded X.509 certificates.
    pub fn certificates(&self) -> &[Certificate] {
        &self.certificates
    }

    pub(crate) fn signer_info(&self) -> Result<&SignerInfo> {
        match self.signed_data.signer_infos.0.get(0) {
            Some(si) => Ok(si),
            None => Err(Error::CmsDecode("SignedData has no SignerInfo".to_string())),
        }
    }

    /// Checks the signature over `content` with the certificate roles given by `roles`.
    pub fn verify(&self, content: &[u8], roles: &ResolvedCertificatePair) -> Result<()> {
        let signer_info = self.signer_info()?;

        let digest = digest_content(&signer_info.digest_alg.oid, content)?;
        let signed_attrs = match &signer_info.signed_attrs {
            Some(signed_attrs) => signed_attrs,
            None => {
                return Err(Error::VerificationFailed(
                    "SignerInfo has no signed attributes".to_string(),
                ))
            }
        };

        let md_attr = signed_attrs.iter().find(|a| a.oid == ID_MESSAGE_DIGEST);
        match md_attr {
            Some(attr) => {
                if let Some(val) = attr.values.get(0) {
                    let md_attr = MessageDigest::from_der(&val.to_der()?)?;
                    if md_attr.as_bytes() != digest.as_slice() {
                        return Err(Error::DigestMismatch);
                    }
                } else {
                    return Err(Error::DigestMismatch);
                }
            }
            None => return Err(Error::DigestMismatch),
        };

        let signer_cert = match get_signer_cert(&signer_info.sid, &self.certificates) {
            Some(cert) => cert,
            None => {
                return Err(Error::VerificationFailed(
                    "no certificate matches the signer identifier".to_string(),
                ))
            }
        };
        if *signer_cert != roles.signer {
            return Err(Error::VerificationFailed(
                "signer identifier names the bank certificate".to_string(),
            ));
        }

        let enc_signed_attrs = signed_attrs.to_der()?;
        let sig_alg = signature_algorithm(signer_info)?;

        let mut pe = PkiEnvironment::new();
        pe.populate_5280_pki_environment();
        pe.verify_signature_message(
            &pe,
            &enc_signed_attrs,
            signer_info.signature.as_bytes(),
            &sig_alg,
            &signer_cert.tbs_certificate.subject_public_key_info,
        )?;

        verify_issued_by(&pe, &roles.signer, &roles.bank)
    }

    /// Decodes, resolves certificate roles and verifies in one step.
    ///
    /// Decoding problems and a missing signing time are errors. Anything that goes wrong while
    /// checking digest, signature or chain only yields `verified == false`, as does a missing
    /// `content`.
    pub fn verify_detached(
        base64_text: &str,
        content: Option<&[u8]>,
        root_ca_marker: &str,
    ) -> Result<Verification> {
        let envelope = Self::decode(base64_text)?;
        let timestamp = envelope.signing_time()?;
        let verified = match content {
            Some(content) => envelope.is_verified(content, root_ca_marker),
            None => {
                warn!("No content available for signature, reporting it as unverified");
                false
            }
        };
        Ok(Verification {
            timestamp,
            verified,
            certificates: envelope.certificates,
        })
    }

    /// Like [`CmsEnvelope::verify`] with roles resolved from the embedded certificates, reporting
    /// every failure as `false`.
    pub fn is_verified(&self, content: &[u8], root_ca_marker: &str) -> bool {
        let outcome = ResolvedCertificatePair::resolve(&self.certificates, root_ca_marker)
            .and_then(|roles| self.verify(content, &roles));
        match outcome {
            Ok(()) => true,
            Err(e) => {
                warn!("Signature did not verify: {e}");
                false
            }
        }
    }
}

fn digest_content(alg: &ObjectIdentifier, content: &[u8]) -> Result<Vec<u8>> {
    let digest = if *alg == ID_SHA_1 {
        Sha1::digest(content).to_vec()
    } else if *alg == ID_SHA_256 {
        Sha256::digest(content).to_vec()
    } else if *alg == ID_SHA_384 {
        Sha384::digest(content).to_vec()
    } else if *alg == ID_SHA_512 {
        Sha512::digest(content).to_vec()
    } else {
        return Err(Error::UnsupportedAlgorithm(format!("digest {alg}")));
    };
    Ok(digest)
}

/// Some signers use rsaEncryption as the signature algorithm. Pair it with the digest algorithm
/// before attempting verification.
fn signature_algorithm(signer_info: &SignerInfo) -> Result<AlgorithmIdentifierOwned> {
    if RSA_ENCRYPTION != signer_info.signature_algorithm.oid {
        return Ok(signer_info.signature_algorithm.clone());
    }
    let digest_alg = signer_info.digest_alg.oid;
    let oid = if digest_alg == ID_SHA_1 {
        SHA_1_WITH_RSA_ENCRYPTION
    } else if digest_alg == ID_SHA_256 {
        SHA_256_WITH_RSA_ENCRYPTION
    } else if digest_alg == ID_SHA_384 {
        SHA_384_WITH_RSA_ENCRYPTION
    } else if digest_alg == ID_SHA_512 {
        SHA_512_WITH_RSA_ENCRYPTION
    } else {
        return Err(Error::UnsupportedAlgorithm(format!(
            "rsaEncryption with digest {digest_alg}"
        )));
    };
    Ok(AlgorithmIdentifierOwned {
        oid,
        parameters: signer_info.signature_algorithm.parameters.clone(),
    })
}

/// Issuer name match plus a check of the bank's signature on the signer certificate.
fn verify_issued_by(pe: &PkiEnvironment, signer: &Certificate, bank: &Certificate) -> Result<()> {
    if signer.tbs_certificate.issuer != bank.tbs_certificate.subject {
        return Err(Error::VerificationFailed(format!(
            "signer certificate issued by {}, bank certificate is {}",
            signer.tbs_certificate.issuer, bank.tbs_certificate.subject
        )));
    }
    let enc_tbs = signer.tbs_certificate.to_der()?;
    pe.verify_signature_message(
        pe,
        &enc_tbs,
        signer.signature.raw_bytes(),
        &signer.signature_algorithm,
        &bank.tbs_certificate.subject_public_key_info,
    )?;
    Ok(())
}

fn subject_key_identifier(cert: &Certificate) -> Option<SubjectKeyIdentifier> {
    cert.tbs_certificate
        .extensions
        .as_ref()?
        .iter()
        .find(|ext| ext.extn_id == ID_CE_SUBJECT_KEY_IDENTIFIER)
        .and_then(|ext| SubjectKeyIdentifier::from_der(ext.extn_value.as_bytes()).ok())
}

fn get_signer_cert<'a>(sid: &SignerIdentifier, certs: &'a [Certificate]) -> Option<&'a Certificate> {
    certs.iter().find(|cert| match sid {
        SignerIdentifier::SubjectKeyIdentifier(skid) => {
            subject_key_identifier(cert).as_ref() == Some(skid)
        }
        SignerIdentifier::IssuerAndSerialNumber(iasn) => {
            cert.tbs_certificate.serial_number == iasn.serial_number
                && cert.tbs_certificate.issuer == iasn.issuer
        }
    })
}
