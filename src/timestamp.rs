//! Extracts the authenticated signing time from a BankID CMS signature.

use chrono::{DateTime, TimeZone, Utc};
use const_oid::ObjectIdentifier;
use der::{Decode, Encode};
use log::error;
use x509_cert::time::Time;

use crate::{CmsEnvelope, Error, Result};

/// pkcs-9 signingTime
pub(crate) const ID_SIGNING_TIME: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.5");

impl CmsEnvelope {
    /// Returns the signing-time signed attribute of the first signer as UTC.
    pub fn signing_time(&self) -> Result<DateTime<Utc>> {
        let signer_info = self.signer_info()?;
        let signed_attrs = match &signer_info.signed_attrs {
            Some(signed_attrs) => signed_attrs,
            None => {
                error!("SignerInfo has no signed attributes, cannot read signing time");
                return Err(Error::MissingSigningTime);
            }
        };

        let mut time_attrs = signed_attrs.iter().filter(|a| a.oid == ID_SIGNING_TIME);
        let attr = match (time_attrs.next(), time_attrs.next()) {
            (Some(attr), None) => attr,
            (None, _) => return Err(Error::MissingSigningTime),
            (Some(_), Some(_)) => {
                error!("SignerInfo has more than one signing-time attribute");
                return Err(Error::CmsDecode(
                    "more than one signing-time attribute".to_string(),
                ));
            }
        };
        let val = match attr.values.get(0) {
            Some(val) => val,
            None => return Err(Error::MissingSigningTime),
        };

        let time = Time::from_der(&val.to_der()?)?;
        let since_epoch = time.to_unix_duration();
        let secs = i64::try_from(since_epoch.as_secs())
            .map_err(|_| Error::CmsDecode(format!("signing time out of range: {time:?}")))?;
        match Utc.timestamp_opt(secs, since_epoch.subsec_nanos()).single() {
            Some(ts) => Ok(ts),
            None => Err(Error::CmsDecode(format!("signing time out of range: {time:?}"))),
        }
    }
}
