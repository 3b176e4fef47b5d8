//! Path navigation over the SDO element tree.
//!
//! SDO files put their own elements in the default namespace (or in none, for some producers) and
//! the signature policy in the XAdES namespace. Paths are written as `/`-separated local names, with
//! an optional `prefix:` resolved against [`NAMESPACES`].

use roxmltree::Node;

use crate::{Error, Result, TextEncoding};

pub(crate) const SDO_NS: &str = "http://www.npt.no/seid/xmlskjema/SDO_v1.0";
pub(crate) const XADES_NS: &str = "http://uri.etsi.org/01903/v1.2.2#";

/// Fixed prefix table used by paths.
pub(crate) const NAMESPACES: &[(&str, &str)] = &[("XAdES", XADES_NS)];

pub(crate) const SIGNATURE_ELEMENTS: &str = "SDO/SDODataPart/SignatureElement";
pub(crate) const SEAL_SIGNATURE: &str = "SDO/SDOSeal/SDOSignature/CMSSignatureElement/CMSSignature";
pub(crate) const SIGNERS_DOCUMENT: &str = "SDO/SignedObject/SignersDocument";
pub(crate) const SEID_SDO_VERSION: &str = "SDO/SEIDSDOVersion";
pub(crate) const METADATA: &str = "SDO/Metadata";
pub(crate) const METADATA_PAIRS: &str = "SDO/Metadata/ValuePair";

pub(crate) const SDO_PROFILE: &str = "CMSSignatureElement/SDOProfile";
pub(crate) const CMS_SIGNATURE: &str = "CMSSignatureElement/CMSSignature";
pub(crate) const MIME_TYPE: &str = "CMSSignatureElement/SignersDocumentFormat/MimeType";
pub(crate) const POLICY_IDENTIFIER: &str =
    "CMSSignatureElement/SignaturePolicyIdentifier/SignaturePolicyId/SigPolicyId/XAdES:Identifier";

fn step_matches(node: &Node, step: &str) -> bool {
    if !node.is_element() {
        return false;
    }
    let name = node.tag_name();
    match step.split_once(':') {
        Some((prefix, local)) => {
            let ns = NAMESPACES
                .iter()
                .find(|(p, _)| *p == prefix)
                .map(|(_, uri)| *uri);
            ns.is_some() && name.namespace() == ns && name.name() == local
        }
        None => {
            name.name() == step && matches!(name.namespace(), None | Some(SDO_NS))
        }
    }
}

/// All elements reached from `context` by following `path`, in document order.
pub(crate) fn select_nodes<'a, 'input>(
    context: Node<'a, 'input>,
    path: &str,
) -> Vec<Node<'a, 'input>> {
    let mut current = vec![context];
    for step in path.split('/').filter(|s| !s.is_empty()) {
        current = current
            .iter()
            .flat_map(|n| n.children().filter(|c| step_matches(c, step)))
            .collect();
    }
    current
}

pub(crate) fn select_single<'a, 'input>(
    context: Node<'a, 'input>,
    path: &str,
) -> Option<Node<'a, 'input>> {
    select_nodes(context, path).into_iter().next()
}

/// Concatenated descendant text of `node`.
pub(crate) fn inner_text(node: Node) -> String {
    node.descendants()
        .filter(|n| n.is_text())
        .filter_map(|n| n.text())
        .collect()
}

pub(crate) fn single_text(context: Node, path: &str) -> Option<String> {
    select_single(context, path).map(inner_text)
}

pub(crate) fn required_text(context: Node, path: &str) -> Result<String> {
    single_text(context, path)
        .ok_or_else(|| Error::MalformedDocument(format!("missing element {path}")))
}

/// Returns the `SDOList` root element.
pub(crate) fn sdo_list<'a, 'input>(doc: &'a roxmltree::Document<'input>) -> Result<Node<'a, 'input>> {
    let root = doc.root_element();
    if step_matches(&root, "SDOList") {
        Ok(root)
    } else {
        Err(Error::MalformedDocument(format!(
            "root element is {}, expected SDOList",
            root.tag_name().name()
        )))
    }
}

/// Escapes `text` for element content written in `encoding`. CR and characters `encoding` cannot
/// represent become numeric character references so they survive saving and reloading.
pub(crate) fn escape_text(text: &str, encoding: TextEncoding) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\r' => out.push_str("&#13;"),
            c if !encoding.can_encode(c) => out.push_str(&format!("&#{};", u32::from(c))),
            _ => out.push(c),
        }
    }
    out
}
