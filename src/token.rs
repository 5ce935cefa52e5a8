use std::fmt;

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac, NewMac};
use sha2::Sha256;
use thiserror::Error;

use crate::connection_string::{ConnectionString, Credential};

type HmacSha256 = Hmac<Sha256>;

/// Returned when a device key cannot be used to sign tokens
#[derive(Debug, Error)]
pub enum TokenError {
    ///
    #[error("device key is not valid base64: {0}")]
    InvalidKey(#[from] base64::DecodeError),
    ///
    #[error("device key has an unusable length")]
    InvalidKeyLength,
}

/// Source of the password presented to the hub on connect
pub trait TokenSource: Send + Sync {
    /// A token valid until `expiry`
    fn get(&self, expiry: &DateTime<Utc>) -> String;
}

///
#[derive(Debug, Clone)]
pub struct SasTokenSource {
    sas: String,
}

impl SasTokenSource {
    ///
    pub fn new(sas: impl Into<String>) -> Self {
        SasTokenSource { sas: sas.into() }
    }
}

impl TokenSource for SasTokenSource {
    fn get(&self, _: &DateTime<Utc>) -> String {
        self.sas.clone()
    }
}

/// Signs tokens locally with the device's symmetric key
#[derive(Clone)]
pub struct DeviceKeyTokenSource {
    resource_uri: String,
    mac: HmacSha256,
}

impl fmt::Debug for DeviceKeyTokenSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceKeyTokenSource")
            .field("resource_uri", &self.resource_uri)
            .finish()
    }
}

impl DeviceKeyTokenSource {
    ///
    pub fn new(hub: &str, device_id: &str, key: &str) -> Result<Self, TokenError> {
        let key = base64::decode(key)?;
        let mac = HmacSha256::new_varkey(&key).map_err(|_| TokenError::InvalidKeyLength)?;
        let resource_uri = format!("{}/devices/{}", hub, device_id);

        Ok(DeviceKeyTokenSource {
            resource_uri: form_urlencoded::byte_serialize(resource_uri.as_bytes()).collect(),
            mac,
        })
    }
}

impl TokenSource for DeviceKeyTokenSource {
    fn get(&self, expiry: &DateTime<Utc>) -> String {
        let sas = generate_sas(&self.resource_uri, &self.mac, expiry.timestamp());
        trace!("Using device key token for {}", self.resource_uri);
        sas
    }
}

/// Token source matching the credential in a parsed connection string
pub fn token_source_for(
    connection_string: &ConnectionString,
) -> Result<Box<dyn TokenSource>, TokenError> {
    Ok(match &connection_string.credential {
        Credential::SharedAccessKey(key) => Box::new(DeviceKeyTokenSource::new(
            &connection_string.host_name,
            &connection_string.device_id,
            key,
        )?),
        Credential::SharedAccessSignature(sas) => Box::new(SasTokenSource::new(sas.as_str())),
    })
}

fn generate_sas(encoded_resource_uri: &str, mac: &HmacSha256, expiry_timestamp: i64) -> String {
    let to_sign = format!("{}\n{}", encoded_resource_uri, expiry_timestamp);

    let mut mac = mac.clone();
    mac.update(to_sign.as_bytes());
    let signature = base64::encode(mac.finalize().into_bytes());

    let token = form_urlencoded::Serializer::new(String::new())
        .append_pair("sig", &signature)
        .finish();

    format!(
        "SharedAccessSignature sr={}&{}&se={}",
        encoded_resource_uri, token, expiry_timestamp
    )
}
