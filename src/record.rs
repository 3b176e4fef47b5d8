//! Signature records as reported to callers.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use x509_cert::Certificate;

use crate::{
    chain::{common_name, organizational_unit, serial_number},
    signer::Verification,
    Error, ResolvedCertificatePair, Result,
};

const POLICY_OID_PREFIX: &str = "urn:oid:";
const PERSON_OU: &str = "BankID";

#[derive(Clone, Debug, PartialEq)]
pub struct Signature {
    /// Common name of the signer certificate.
    pub name: String,
    pub timestamp: DateTime<Utc>,
    pub verified: bool,
    pub certificate: Certificate,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum BankIdType {
    /// Personal BankID
    PersonBankID,
    /// Merchant or organization BankID
    BrukerstedsBankID,
}

impl fmt::Display for BankIdType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BankIdType::PersonBankID => f.write_str("PersonBankID"),
            BankIdType::BrukerstedsBankID => f.write_str("BrukerstedsBankID"),
        }
    }
}

/// A per-signer signature from the data part of an SDO.
#[derive(Clone, Debug, PartialEq)]
pub struct BankIdSignature {
    pub name: String,
    pub timestamp: DateTime<Utc>,
    pub verified: bool,
    pub certificate: Certificate,
    pub bank_id_type: BankIdType,
    pub bank_name: String,
    pub sdo_profile: String,
    /// Signature policy OID without the `urn:oid:` prefix.
    pub sign_policy: String,
    /// Subject serial number. An organization number for merchants, a BankID specific person
    /// identifier (not the national identity number) for persons.
    pub unique_id: String,
}

/// Display name split into parts.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Name {
    pub first_name: String,
    pub last_name: String,
}

impl Signature {
    pub(crate) fn assemble(verification: Verification, roles: ResolvedCertificatePair) -> Result<Self> {
        Ok(Signature {
            name: signer_name(&roles.signer)?,
            timestamp: verification.timestamp,
            verified: verification.verified,
            certificate: roles.signer,
        })
    }
}

impl BankIdSignature {
    pub(crate) fn assemble(
        verification: Verification,
        roles: ResolvedCertificatePair,
        sdo_profile: String,
        policy_identifier: &str,
    ) -> Result<Self> {
        let subject = &roles.signer.tbs_certificate.subject;
        let unique_id = serial_number(subject).ok_or_else(|| {
            Error::MalformedDocument(format!("signer certificate {subject} has no serial number"))
        })?;
        let bank_id_type = match organizational_unit(subject) {
            Some(ou) if ou == PERSON_OU => BankIdType::PersonBankID,
            _ => BankIdType::BrukerstedsBankID,
        };
        let bank_name = bank_name(&roles.bank)?;
        let sign_policy = policy_identifier
            .trim()
            .trim_start_matches(POLICY_OID_PREFIX)
            .to_string();

        Ok(BankIdSignature {
            name: signer_name(&roles.signer)?,
            timestamp: verification.timestamp,
            verified: verification.verified,
            certificate: roles.signer,
            bank_id_type,
            bank_name,
            sdo_profile,
            sign_policy,
            unique_id,
        })
    }

    pub fn first_and_last_name(&self) -> Name {
        split_display_name(&self.name)
    }
}

fn signer_name(signer: &Certificate) -> Result<String> {
    let subject = &signer.tbs_certificate.subject;
    common_name(subject).ok_or_else(|| {
        Error::MalformedDocument(format!("signer certificate {subject} has no common name"))
    })
}

/// Bank certificate CN with the fixed `BankID ` and `Bank CA 2` decorations removed.
pub fn bank_name(bank: &Certificate) -> Result<String> {
    let subject = &bank.tbs_certificate.subject;
    let cn = common_name(subject).ok_or_else(|| {
        Error::MalformedDocument(format!("bank certificate {subject} has no common name"))
    })?;
    Ok(cn
        .replace("BankID ", "")
        .replace("Bank CA 2", "")
        .trim()
        .to_string())
}

/// Splits a `"Last, First"` common name. A name without a comma, such as a merchant name, yields the
/// whole name in both parts.
pub fn split_display_name(name: &str) -> Name {
    let (last, first) = name.split_once(',').unwrap_or((name, name));
    Name {
        first_name: title_case(first.trim()),
        last_name: title_case(last.trim()),
    }
}

/// Title cases with Norwegian conventions: every letter that does not follow another letter, digit
/// or apostrophe is upper cased, the rest lower cased.
pub fn title_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_word = false;
    for c in text.chars() {
        if in_word {
            out.extend(c.to_lowercase());
        } else {
            out.extend(c.to_uppercase());
        }
        in_word = c.is_alphanumeric() || c == '\'';
    }
    out
}
