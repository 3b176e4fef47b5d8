//! Generates BankID style certificate chains, detached CMS signatures and SDO files for tests.

#![allow(dead_code)]

use std::{sync::OnceLock, time::Duration};

use base64::Engine;
use cms::{
    cert::{CertificateChoices, IssuerAndSerialNumber},
    content_info::{CmsVersion, ContentInfo},
    signed_data::{
        CertificateSet, EncapsulatedContentInfo, SignedData, SignerIdentifier, SignerInfo,
        SignerInfos,
    },
};
use const_oid::{
    db::{
        rfc5911::{ID_CONTENT_TYPE, ID_DATA, ID_MESSAGE_DIGEST, ID_SIGNED_DATA},
        rfc5280::ID_CE_SUBJECT_KEY_IDENTIFIER,
        rfc5912::{
            ID_SHA_1, ID_SHA_256, ID_SHA_384, ID_SHA_512, RSA_ENCRYPTION,
            SHA_256_WITH_RSA_ENCRYPTION,
        },
    },
    ObjectIdentifier,
};
use der::{
    asn1::{BitString, OctetString, SetOfVec, UtcTime},
    Any, Decode, Encode, Tag,
};
use rsa::{
    pkcs1v15::SigningKey,
    pkcs8::EncodePublicKey,
    signature::{SignatureEncoding, Signer},
    RsaPrivateKey,
};
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha384, Sha512};
use x509_cert::{
    attr::{Attribute, AttributeTypeAndValue},
    certificate::{TbsCertificate, Version},
    ext::{pkix::SubjectKeyIdentifier, Extension},
    name::{Name, RdnSequence, RelativeDistinguishedName},
    serial_number::SerialNumber,
    spki::{AlgorithmIdentifierOwned, SubjectPublicKeyInfoOwned},
    time::{Time, Validity},
    Certificate,
};

use sdo_verify::chain::{OID_CN, OID_OU, OID_SERIAL_NUMBER};

pub const OID_C: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.6");
pub const OID_O: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.10");
pub const ID_SIGNING_TIME: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.5");

pub const ROOT_CN: &str = "BankID Root CA";
pub const POLICY: &str = "urn:oid:2.16.578.1.16.4.1";
pub const DOCUMENT: &[u8] = b"%PDF-1.4\n% signed test document\n%%EOF\n";

/// 2013-05-27 12:44:56 UTC
pub const SEAL_TIME: u64 = 1369658696;

pub struct Keys {
    pub ca: RsaPrivateKey,
    pub end_entity: RsaPrivateKey,
    pub rogue: RsaPrivateKey,
}

pub fn keys() -> &'static Keys {
    static KEYS: OnceLock<Keys> = OnceLock::new();
    KEYS.get_or_init(|| {
        let mut rng = rand::thread_rng();
        Keys {
            ca: RsaPrivateKey::new(&mut rng, 2048).unwrap(),
            end_entity: RsaPrivateKey::new(&mut rng, 2048).unwrap(),
            rogue: RsaPrivateKey::new(&mut rng, 2048).unwrap(),
        }
    })
}

pub fn name(attrs: &[(ObjectIdentifier, &str)]) -> Name {
    RdnSequence(
        attrs
            .iter()
            .map(|(oid, value)| {
                let atv = AttributeTypeAndValue {
                    oid: *oid,
                    value: Any::new(Tag::Utf8String, value.as_bytes()).unwrap(),
                };
                RelativeDistinguishedName(SetOfVec::try_from(vec![atv]).unwrap())
            })
            .collect(),
    )
}

/// Like [`name`] with every value encoded as a BMPString.
pub fn bmp_name(attrs: &[(ObjectIdentifier, &str)]) -> Name {
    RdnSequence(
        attrs
            .iter()
            .map(|(oid, value)| {
                let utf16: Vec<u8> = value.encode_utf16().flat_map(u16::to_be_bytes).collect();
                let atv = AttributeTypeAndValue {
                    oid: *oid,
                    value: Any::new(Tag::BmpString, utf16).unwrap(),
                };
                RelativeDistinguishedName(SetOfVec::try_from(vec![atv]).unwrap())
            })
            .collect(),
    )
}

pub fn root_name() -> Name {
    name(&[(OID_C, "NO"), (OID_O, "Bankenes ID-tjeneste"), (OID_CN, ROOT_CN)])
}

fn sha256_with_rsa() -> AlgorithmIdentifierOwned {
    AlgorithmIdentifierOwned {
        oid: SHA_256_WITH_RSA_ENCRYPTION,
        parameters: Some(Any::null()),
    }
}

fn sign(key: &RsaPrivateKey, message: &[u8]) -> Vec<u8> {
    SigningKey::<Sha256>::new(key.clone()).sign(message).to_vec()
}

fn sign_certificate(tbs_certificate: TbsCertificate, issuer_key: &RsaPrivateKey) -> Certificate {
    sign_certificate(tbs_certificate, issuer_key)
}

/// Re-issues `cert` with a subject key identifier extension holding `key_id`.
pub fn with_subject_key_identifier(
    cert: &Certificate,
    key_id: &[u8],
    issuer_key: &RsaPrivateKey,
) -> Certificate {
    let skid = SubjectKeyIdentifier(OctetString::new(key_id.to_vec()).unwrap());
    let mut tbs_certificate = cert.tbs_certificate.clone();
    tbs_certificate.extensions = Some(vec![Extension {
        extn_id: ID_CE_SUBJECT_KEY_IDENTIFIER,
        critical: false,
        extn_value: OctetString::new(skid.to_der().unwrap()).unwrap(),
    }]);
    sign_certificate(tbs_certificate, issuer_key)
}

/// Issues a certificate for `subject_key`, signed with `issuer_key`.
pub fn issue(
    subject: Name,
    issuer: Name,
    serial: u8,
    subject_key: &RsaPrivateKey,
    issuer_key: &RsaPrivateKey,
) -> Certificate {
    let spki_der = subject_key.to_public_key().to_public_key_der().unwrap();
    let tbs_certificate = TbsCertificate {
        version: Version::V3,
        serial_number: SerialNumber::new(&[serial]).unwrap(),
        signature: sha256_with_rsa(),
        issuer,
        validity: Validity {
            not_before: Time::UtcTime(
                UtcTime::from_unix_duration(Duration::from_secs(1_300_000_000)).unwrap(),
            ),
            not_after: Time::UtcTime(
                UtcTime::from_unix_duration(Duration::from_secs(1_900_000_000)).unwrap(),
            ),
        },
        subject,
        subject_public_key_info: SubjectPublicKeyInfoOwned::from_der(spki_der.as_bytes()).unwrap(),
        issuer_unique_id: None,
        subject_unique_id: None,
        extensions: None,
    };
    sign_certificate(tbs_certificate, issuer_key)
}

/// A bank intermediate certificate, `BankID <bank> Bank CA 2`, issued by the BankID root.
pub fn bank_certificate(bank: &str, serial: u8) -> Certificate {
    let subject = name(&[
        (OID_C, "NO"),
        (OID_O, bank),
        (OID_CN, &format!("BankID {bank} Bank CA 2")),
    ]);
    issue(subject, root_name(), serial, &keys().ca, &keys().ca)
}

/// One signer of an SDO.
#[derive(Clone, Debug)]
pub struct SignerSpec {
    pub common_name: String,
    pub organizational_unit: Option<String>,
    pub serial_number: String,
    pub bank: String,
    pub signing_time: Option<u64>,
    pub serial: u8,
}

impl SignerSpec {
    pub fn new(common_name: &str, ou: Option<&str>, serial_number: &str, bank: &str, time: u64, serial: u8) -> Self {
        SignerSpec {
            common_name: common_name.to_string(),
            organizational_unit: ou.map(str::to_string),
            serial_number: serial_number.to_string(),
            bank: bank.to_string(),
            signing_time: Some(time),
            serial,
        }
    }

    pub fn bank_certificate(&self) -> Certificate {
        bank_certificate(&self.bank, self.serial.wrapping_add(100))
    }

    pub fn certificate(&self, bank: &Certificate) -> Certificate {
        let mut attrs = vec![(OID_C, "NO")];
        if let Some(ou) = &self.organizational_unit {
            attrs.push((OID_OU, ou.as_str()));
        }
        attrs.push((OID_CN, self.common_name.as_str()));
        attrs.push((OID_SERIAL_NUMBER, self.serial_number.as_str()));
        issue(
            name(&attrs),
            bank.tbs_certificate.subject.clone(),
            self.serial,
            &keys().end_entity,
            &keys().ca,
        )
    }

    /// Base64 detached signature over `content`, wrapped in 64 character lines.
    pub fn sign(&self, content: &[u8]) -> String {
        let bank = self.bank_certificate();
        let signer = self.certificate(&bank);
        let der = signed_data(content, &signer, &bank, &keys().end_entity, self.signing_time);
        wrap_base64(&der)
    }
}

fn attribute(oid: ObjectIdentifier, value: Any) -> Attribute {
    Attribute {
        oid,
        values: SetOfVec::try_from(vec![value]).unwrap(),
    }
}

/// Digest used for the message-digest attribute and the signature over the signed attributes.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum FixtureDigest {
    Sha1,
    Sha256,
    Sha384,
    Sha512,
}

impl FixtureDigest {
    pub fn oid(&self) -> ObjectIdentifier {
        match self {
            FixtureDigest::Sha1 => ID_SHA_1,
            FixtureDigest::Sha256 => ID_SHA_256,
            FixtureDigest::Sha384 => ID_SHA_384,
            FixtureDigest::Sha512 => ID_SHA_512,
        }
    }

    fn digest(&self, content: &[u8]) -> Vec<u8> {
        match self {
            FixtureDigest::Sha1 => Sha1::digest(content).to_vec(),
            FixtureDigest::Sha256 => Sha256::digest(content).to_vec(),
            FixtureDigest::Sha384 => Sha384::digest(content).to_vec(),
            FixtureDigest::Sha512 => Sha512::digest(content).to_vec(),
        }
    }

    fn sign(&self, key: &RsaPrivateKey, message: &[u8]) -> Vec<u8> {
        let key = key.clone();
        match self {
            FixtureDigest::Sha1 => SigningKey::<Sha1>::new(key).sign(message).to_vec(),
            FixtureDigest::Sha256 => SigningKey::<Sha256>::new(key).sign(message).to_vec(),
            FixtureDigest::Sha384 => SigningKey::<Sha384>::new(key).sign(message).to_vec(),
            FixtureDigest::Sha512 => SigningKey::<Sha512>::new(key).sign(message).to_vec(),
        }
    }
}

/// How the SignerInfo names its certificate.
#[derive(Clone, Debug, PartialEq)]
pub enum FixtureSid {
    IssuerAndSerial,
    SubjectKeyIdentifier(Vec<u8>),
}

/// Knobs for [`signed_data_with`].
#[derive(Clone, Debug)]
pub struct EnvelopeOptions {
    pub digest: FixtureDigest,
    pub sid: FixtureSid,
    /// The sid names the bank certificate instead of the signer certificate.
    pub sid_names_bank: bool,
    /// One signing-time attribute per entry.
    pub signing_times: Vec<u64>,
}

impl EnvelopeOptions {
    pub fn new(signing_time: Option<u64>) -> Self {
        EnvelopeOptions {
            digest: FixtureDigest::Sha256,
            sid: FixtureSid::IssuerAndSerial,
            sid_names_bank: false,
            signing_times: signing_time.into_iter().collect(),
        }
    }
}

/// DER ContentInfo holding a detached SHA-256 SignedData over `content`.
pub fn signed_data(
    content: &[u8],
    signer: &Certificate,
    bank: &Certificate,
    key: &RsaPrivateKey,
    signing_time: Option<u64>,
) -> Vec<u8> {
    signed_data_with(content, signer, bank, key, &EnvelopeOptions::new(signing_time))
}

pub fn signed_data_with(
    content: &[u8],
    signer: &Certificate,
    bank: &Certificate,
    key: &RsaPrivateKey,
    options: &EnvelopeOptions,
) -> Vec<u8> {
    let digest = options.digest.digest(content);
    let mut attrs = vec![
        attribute(ID_CONTENT_TYPE, Any::encode_from(&ID_DATA).unwrap()),
        attribute(
            ID_MESSAGE_DIGEST,
            Any::encode_from(&OctetString::new(digest).unwrap()).unwrap(),
        ),
    ];
    for secs in &options.signing_times {
        let time = Time::UtcTime(UtcTime::from_unix_duration(Duration::from_secs(*secs)).unwrap());
        attrs.push(attribute(ID_SIGNING_TIME, Any::encode_from(&time).unwrap()));
    }
    let signed_attrs = SetOfVec::try_from(attrs).unwrap();
    let signature = options.digest.sign(key, &signed_attrs.to_der().unwrap());

    let named = if options.sid_names_bank { bank } else { signer };
    let sid = match &options.sid {
        FixtureSid::IssuerAndSerial => SignerIdentifier::IssuerAndSerialNumber(IssuerAndSerialNumber {
            issuer: named.tbs_certificate.issuer.clone(),
            serial_number: named.tbs_certificate.serial_number.clone(),
        }),
        FixtureSid::SubjectKeyIdentifier(key_id) => SignerIdentifier::SubjectKeyIdentifier(
            SubjectKeyIdentifier(OctetString::new(key_id.clone()).unwrap()),
        ),
    };
    let digest_alg = AlgorithmIdentifierOwned {
        oid: options.digest.oid(),
        parameters: None,
    };

    let version = match options.sid {
        FixtureSid::IssuerAndSerial => CmsVersion::V1,
        FixtureSid::SubjectKeyIdentifier(_) => CmsVersion::V3,
    };
    let signer_info = SignerInfo {
        version,
        sid,
        digest_alg: digest_alg.clone(),
        signed_attrs: Some(signed_attrs),
        signature_algorithm: AlgorithmIdentifierOwned {
            oid: RSA_ENCRYPTION,
            parameters: Some(Any::null()),
        },
        signature: OctetString::new(signature).unwrap(),
        unsigned_attrs: None,
    };

    let sd = SignedData {
        version: CmsVersion::V1,
        digest_algorithms: SetOfVec::try_from(vec![digest_alg]).unwrap(),
        encap_content_info: EncapsulatedContentInfo {
            econtent_type: ID_DATA,
            econtent: None,
        },
        certificates: Some(CertificateSet(
            SetOfVec::try_from(vec![
                CertificateChoices::Certificate(signer.clone()),
                CertificateChoices::Certificate(bank.clone()),
            ])
            .unwrap(),
        )),
        crls: None,
        signer_infos: SignerInfos(SetOfVec::try_from(vec![signer_info]).unwrap()),
    };

    ContentInfo {
        content_type: ID_SIGNED_DATA,
        content: Any::encode_from(&sd).unwrap(),
    }
    .to_der()
    .unwrap()
}

pub fn wrap_base64(der: &[u8]) -> String {
    let b64 = base64::engine::general_purpose::STANDARD.encode(der);
    b64.as_bytes()
        .chunks(64)
        .map(|line| std::str::from_utf8(line).unwrap())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Text encodings an SDO fixture can be written in.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum FixtureEncoding {
    Utf8,
    Windows1252,
}

impl FixtureEncoding {
    fn label(&self) -> &'static str {
        match self {
            FixtureEncoding::Utf8 => "UTF-8",
            FixtureEncoding::Windows1252 => "windows-1252",
        }
    }

    pub fn encode(&self, text: &str) -> Vec<u8> {
        match self {
            FixtureEncoding::Utf8 => text.as_bytes().to_vec(),
            FixtureEncoding::Windows1252 => {
                let (bytes, _, had_errors) = encoding_rs::WINDOWS_1252.encode(text);
                assert!(!had_errors);
                bytes.into_owned()
            }
        }
    }
}

/// Builds SDO XML the way BankID lays it out.
#[derive(Clone, Debug)]
pub struct SdoBuilder {
    pub document: Vec<u8>,
    pub mime_type: String,
    pub sdo_profile: String,
    pub signers: Vec<SignerSpec>,
    pub seal: SignerSpec,
    pub metadata: Vec<(String, String)>,
    pub encoding: FixtureEncoding,
}

impl SdoBuilder {
    /// Three signers and a signere.no seal, mirroring a real multi-signature SDO.
    pub fn test1() -> Self {
        SdoBuilder {
            document: DOCUMENT.to_vec(),
            mime_type: "application/pdf".to_string(),
            sdo_profile: "SEIDSDO-BankID-1.0".to_string(),
            signers: vec![
                SignerSpec::new("Synnevåg, Rune", Some("BankID"), "9578-5993-4-1617343", "Bankenes ID-tjeneste", 1369658642, 1),
                SignerSpec::new("signere.no", None, "998303168", "DnB NOR", 1369658517, 2),
                SignerSpec::new("FØLLESDAL, ESBEN ANDRE", Some("BankID"), "9578-5994-4-629257", "Skandiabanken", 1369658497, 3),
            ],
            seal: SignerSpec::new("signere.no", None, "998303168", "DnB NOR", SEAL_TIME, 4),
            metadata: vec![("MerchantDesc".to_string(), "Test paa multisignatur".to_string())],
            encoding: FixtureEncoding::Utf8,
        }
    }

    pub fn data_part(&self) -> String {
        let mut part = String::from("<SDODataPart>");
        for signer in &self.signers {
            part.push_str(&format!(
                "<SignatureElement><CMSSignatureElement>\
                 <SDOProfile>{}</SDOProfile>\
                 <SignersDocumentFormat><MimeType>{}</MimeType></SignersDocumentFormat>\
                 <SignaturePolicyIdentifier><SignaturePolicyId><SigPolicyId>\
                 <XAdES:Identifier>{POLICY}</XAdES:Identifier>\
                 </SigPolicyId></SignaturePolicyId></SignaturePolicyIdentifier>\
                 <CMSSignature>{}</CMSSignature>\
                 </CMSSignatureElement></SignatureElement>",
                self.sdo_profile,
                self.mime_type,
                signer.sign(&self.document)
            ));
        }
        part.push_str("</SDODataPart>");
        part
    }

    pub fn build(&self) -> String {
        let data_part = self.data_part();
        let seal = self.seal.sign(&self.encoding.encode(&data_part));
        let metadata: String = self
            .metadata
            .iter()
            .map(|(name, value)| format!("<ValuePair><Name>{name}</Name><Value>{value}</Value></ValuePair>"))
            .collect();
        format!(
            "<?xml version=\"1.0\" encoding=\"{}\"?>\n\
             <SDOList xmlns=\"http://www.npt.no/seid/xmlskjema/SDO_v1.0\" xmlns:XAdES=\"http://uri.etsi.org/01903/v1.2.2#\">\
             <SDO><SEIDSDOVersion>1.0</SEIDSDOVersion>\
             <SignedObject><SignersDocument>{}</SignersDocument></SignedObject>\
             {data_part}\
             <SDOSeal><SDOSignature><CMSSignatureElement><CMSSignature>{seal}</CMSSignature></CMSSignatureElement></SDOSignature></SDOSeal>\
             <Metadata>{metadata}</Metadata>\
             </SDO></SDOList>",
            self.encoding.label(),
            wrap_base64(&self.document),
        )
    }

    pub fn bytes(&self) -> Vec<u8> {
        self.encoding.encode(&self.build())
    }
}
