//! A loaded SDO and the accessors that interpret it.
//!
//! Nothing is cached. Every accessor parses the retained source text again and re-verifies the
//! signatures it reports on, so repeated calls on the same document give the same answers.

use std::{
    fs,
    io::Read,
    path::{Path, PathBuf},
};

use base64::Engine;
use log::{debug, error, info};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    payload::extract_data_part,
    xml::{
        escape_text, inner_text, required_text, sdo_list, select_nodes, select_single,
        single_text, CMS_SIGNATURE, METADATA, METADATA_PAIRS, MIME_TYPE, POLICY_IDENTIFIER,
        SDO_PROFILE, SEAL_SIGNATURE, SEID_SDO_VERSION, SIGNATURE_ELEMENTS, SIGNERS_DOCUMENT,
    },
    BankIdSignature, CmsEnvelope, Error, ResolvedCertificatePair, Result, SdoSettings, Signature,
    TextEncoding,
};

/// Kind of document carried in `SignersDocument`.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum DocumentType {
    PDF,
    TEXT,
    XML,
}

impl DocumentType {
    pub fn from_mime_type(mime_type: &str) -> Result<Self> {
        match mime_type.trim().to_ascii_lowercase().as_str() {
            "application/pdf" => Ok(DocumentType::PDF),
            "text/bidxml" => Ok(DocumentType::XML),
            "text/plain" => Ok(DocumentType::TEXT),
            other => Err(Error::UnknownDocumentType(other.to_string())),
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            DocumentType::PDF => "pdf",
            DocumentType::TEXT => "txt",
            DocumentType::XML => "xml",
        }
    }
}

/// A `ValuePair` from the SDO `Metadata` element. `MerchantDesc` is reserved by BankID for the
/// document title.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct MetaData {
    pub name: String,
    pub value: String,
    pub description: Option<String>,
}

/// A loaded SDO.
///
/// The source text is kept verbatim since the seal covers the `SDODataPart` bytes as written by
/// the producer. A document is never modified in place; [`SdoDocument::with_metadata`] returns a
/// new one.
#[derive(Clone, Debug)]
pub struct SdoDocument {
    text: String,
    encoding: TextEncoding,
    settings: SdoSettings,
}

impl std::str::FromStr for SdoDocument {
    type Err = Error;

    fn from_str(text: &str) -> Result<Self> {
        Self::from_str_with(text, SdoSettings::default())
    }
}

impl SdoDocument {
    /// Parses already decoded text. The encoding the text was stored in, taken from `settings` or
    /// the XML declaration, is still needed to reproduce the sealed bytes and to save.
    pub fn from_str_with(text: &str, settings: SdoSettings) -> Result<Self> {
        let encoding = settings
            .source_encoding
            .unwrap_or_else(|| TextEncoding::sniff(text.as_bytes()));
        Self::from_text(text.to_string(), encoding, settings)
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        Self::load(data, SdoSettings::default())
    }

    /// Decodes `data` according to `settings` (or its XML declaration) and parses it.
    pub fn load(data: &[u8], settings: SdoSettings) -> Result<Self> {
        let encoding = settings
            .source_encoding
            .unwrap_or_else(|| TextEncoding::sniff(data));
        let text = match encoding.decode(data) {
            Ok(text) => text,
            Err(e) => {
                error!("Failed to decode SDO as {encoding:?}: {e}");
                return Err(e);
            }
        };
        Self::from_text(text, encoding, settings)
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_path_with(path, SdoSettings::default())
    }

    pub fn from_path_with<P: AsRef<Path>>(path: P, settings: SdoSettings) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            error!("Cannot load SDO, {} does not exist", path.display());
            return Err(Error::NotFound(path.display().to_string()));
        }
        let data = fs::read(path)?;
        Self::load(&data, settings)
    }

    pub fn from_reader<R: Read>(mut reader: R, settings: SdoSettings) -> Result<Self> {
        let mut data = vec![];
        reader.read_to_end(&mut data)?;
        Self::load(&data, settings)
    }

    fn from_text(text: String, encoding: TextEncoding, settings: SdoSettings) -> Result<Self> {
        let sdo = SdoDocument {
            text,
            encoding,
            settings,
        };
        // Loading fails unless the tree parses and the signed document is present.
        sdo.signed_document()?;
        info!("Loaded SDO ({encoding:?}, {} characters)", sdo.text.len());
        Ok(sdo)
    }

    /// The source text as loaded, plus any metadata added since.
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn encoding(&self) -> TextEncoding {
        self.encoding
    }

    pub fn settings(&self) -> &SdoSettings {
        &self.settings
    }

    fn parse_doc(&self) -> Result<roxmltree::Document<'_>> {
        roxmltree::Document::parse(&self.text).map_err(|e| {
            error!("Failed to parse SDO XML: {e}");
            Error::XmlParse(e.to_string())
        })
    }

    pub fn number_of_signatures(&self) -> Result<usize> {
        let doc = self.parse_doc()?;
        Ok(select_nodes(sdo_list(&doc)?, SIGNATURE_ELEMENTS).len())
    }

    /// Value of the first metadata entry, whatever its name.
    pub fn document_description(&self) -> Result<String> {
        let doc = self.parse_doc()?;
        required_text(sdo_list(&doc)?, "SDO/Metadata/ValuePair/Value")
    }

    /// Value of the first metadata entry named `name`.
    pub fn metadata_value(&self, name: &str) -> Result<Option<String>> {
        Ok(self
            .metadata()?
            .into_iter()
            .find(|m| m.name == name)
            .map(|m| m.value))
    }

    pub fn seid_sdo_version(&self) -> Result<String> {
        let doc = self.parse_doc()?;
        required_text(sdo_list(&doc)?, SEID_SDO_VERSION)
    }

    /// Type of the signed document, taken from the first signature element.
    pub fn document_type(&self) -> Result<DocumentType> {
        let doc = self.parse_doc()?;
        let list = sdo_list(&doc)?;
        let mime_type = select_single(list, SIGNATURE_ELEMENTS)
            .and_then(|element| single_text(element, MIME_TYPE));
        match mime_type {
            Some(mime_type) => DocumentType::from_mime_type(&mime_type),
            None => Err(Error::UnknownDocumentType("no MimeType element".to_string())),
        }
    }

    /// The document that was signed, base64 decoded.
    pub fn signed_document(&self) -> Result<Vec<u8>> {
        let doc = self.parse_doc()?;
        let encoded = required_text(sdo_list(&doc)?, SIGNERS_DOCUMENT)?;
        let compact: String = encoded.chars().filter(|c| !c.is_ascii_whitespace()).collect();
        match base64::engine::general_purpose::STANDARD.decode(compact) {
            Ok(document) => Ok(document),
            Err(e) => {
                error!("Failed to base64 decode SignersDocument: {e:?}");
                Err(e.into())
            }
        }
    }

    /// Per-signer signatures in document order.
    ///
    /// The outer error reports a document that cannot be interpreted at all. The inner results
    /// report signatures that could not be read, e.g., one without a signing time, without
    /// affecting the others. A signature that fails verification is `Ok` with `verified == false`.
    pub fn signatures(&self) -> Result<Vec<Result<BankIdSignature>>> {
        let document = self.signed_document()?;
        let doc = self.parse_doc()?;
        let elements = select_nodes(sdo_list(&doc)?, SIGNATURE_ELEMENTS);
        if elements.is_empty() {
            error!("SDODataPart contains no SignatureElement");
            return Err(Error::MalformedDocument(
                "no SignatureElement in SDODataPart".to_string(),
            ));
        }

        let mut signatures = Vec::with_capacity(elements.len());
        for (index, element) in elements.into_iter().enumerate() {
            let sdo_profile = required_text(element, SDO_PROFILE)?;
            let signature_text = required_text(element, CMS_SIGNATURE)?;
            let policy = required_text(element, POLICY_IDENTIFIER)?;

            let record = CmsEnvelope::verify_detached(
                &signature_text,
                Some(&document),
                &self.settings.root_ca_marker,
            )
            .and_then(|verification| {
                let roles = ResolvedCertificatePair::resolve(
                    &verification.certificates,
                    &self.settings.root_ca_marker,
                )?;
                BankIdSignature::assemble(verification, roles, sdo_profile, &policy)
            });
            match &record {
                Ok(signature) => debug!(
                    "Signature {index} by {} verified: {}",
                    signature.name, signature.verified
                ),
                Err(e) => error!("Failed to read signature {index}: {e}"),
            }
            signatures.push(record);
        }
        Ok(signatures)
    }

    /// The seal over the whole `SDODataPart`.
    ///
    /// When the data part span cannot be located in the source text the seal is still decoded and
    /// reported, with `verified == false`.
    pub fn sealed_by(&self) -> Result<Signature> {
        let doc = self.parse_doc()?;
        let signature_text = required_text(sdo_list(&doc)?, SEAL_SIGNATURE)?;

        let seal_encoding = self.settings.seal_encoding.unwrap_or(self.encoding);
        let payload = match extract_data_part(&self.text, seal_encoding) {
            Ok(payload) => Some(payload),
            Err(e) => {
                error!("Cannot reproduce sealed payload: {e}");
                None
            }
        };

        let marker = &self.settings.root_ca_marker;
        let verification = CmsEnvelope::verify_detached(&signature_text, payload.as_deref(), marker)?;
        let roles = ResolvedCertificatePair::resolve(&verification.certificates, marker)?;
        let seal = Signature::assemble(verification, roles)?;
        debug!("Seal by {} verified: {}", seal.name, seal.verified);
        Ok(seal)
    }

    pub fn metadata(&self) -> Result<Vec<MetaData>> {
        let doc = self.parse_doc()?;
        let pairs = select_nodes(sdo_list(&doc)?, METADATA_PAIRS);
        pairs
            .into_iter()
            .map(|pair| {
                Ok(MetaData {
                    name: required_text(pair, "Name")?,
                    value: required_text(pair, "Value")?,
                    description: select_single(pair, "Description").map(inner_text),
                })
            })
            .collect()
    }

    /// Returns a copy of this document with `metadata` appended as a new `ValuePair`.
    ///
    /// The pair is spliced into the source text, leaving every other byte, in particular the signed
    /// `SDODataPart`, untouched.
    pub fn with_metadata(&self, metadata: &MetaData) -> Result<SdoDocument> {
        let mut pair = format!(
            "<ValuePair><Name>{}</Name><Value>{}</Value>",
            escape_text(&metadata.name, self.encoding),
            escape_text(&metadata.value, self.encoding)
        );
        if let Some(description) = &metadata.description {
            pair.push_str(&format!(
                "<Description>{}</Description>",
                escape_text(description, self.encoding)
            ));
        }
        pair.push_str("</ValuePair>");

        let text = {
            let doc = self.parse_doc()?;
            let list = sdo_list(&doc)?;
            match select_single(list, METADATA) {
                Some(node) => splice_into_element(&self.text, node.range(), &pair)?,
                None => {
                    let sdo = select_single(list, "SDO").ok_or_else(|| {
                        Error::MalformedDocument("missing element SDO".to_string())
                    })?;
                    let block = format!("<Metadata>{pair}</Metadata>");
                    splice_into_element(&self.text, sdo.range(), &block)?
                }
            }
        };
        debug!("Added metadata entry {:?}", metadata.name);
        Self::from_text(text, self.encoding, self.settings.clone())
    }

    /// Serializes the document, including added metadata, in its source encoding.
    pub fn save_sdo(&self) -> Result<Vec<u8>> {
        self.encoding.encode(&self.text)
    }

    /// Writes the document to `<uuid>.SDO` in `folder`, or the temp directory, and returns the path.
    pub fn save_sdo_to(&self, folder: Option<&Path>) -> Result<PathBuf> {
        let path = unique_path(folder, "SDO");
        fs::write(&path, self.save_sdo()?)?;
        info!("Saved SDO to {}", path.display());
        Ok(path)
    }

    /// Writes the signed document to `<uuid>.pdf|.txt|.xml` in `folder`, or the temp directory, and
    /// returns the path.
    pub fn save_signed_document(&self, folder: Option<&Path>) -> Result<PathBuf> {
        let path = unique_path(folder, self.document_type()?.extension());
        fs::write(&path, self.signed_document()?)?;
        info!("Saved signed document to {}", path.display());
        Ok(path)
    }
}

fn unique_path(folder: Option<&Path>, extension: &str) -> PathBuf {
    let folder = match folder {
        Some(folder) => folder.to_path_buf(),
        None => std::env::temp_dir(),
    };
    folder.join(format!("{}.{extension}", Uuid::new_v4().simple()))
}

/// Inserts `content` as the last child of the element spanning `range` in `text`.
fn splice_into_element(text: &str, range: std::ops::Range<usize>, content: &str) -> Result<String> {
    let element = &text[range.clone()];
    if element.ends_with("/>") {
        // <Tag .../> becomes <Tag ...>content</Tag>
        let tag = element[1..]
            .split(|c: char| c.is_whitespace() || c == '/' || c == '>')
            .next()
            .unwrap_or_default();
        let open = element[..element.len() - 2].trim_end();
        return Ok(format!(
            "{}{open}>{content}</{tag}>{}",
            &text[..range.start],
            &text[range.end..]
        ));
    }
    let close = match element.rfind("</") {
        Some(close) => Some(range.start + close),
        // range only covers the start tag, look for the end tag after it
        None => {
            let tag = element[1..]
                .split(|c: char| c.is_whitespace() || c == '>')
                .next()
                .unwrap_or_default();
            text[range.end..]
                .find(&format!("</{tag}"))
                .map(|close| range.end + close)
        }
    };
    match close {
        Some(close) => Ok(format!("{}{content}{}", &text[..close], &text[close..])),
        None => Err(Error::MalformedDocument(format!(
            "no closing tag for element at offset {}",
            range.start
        ))),
    }
}
