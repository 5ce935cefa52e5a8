//! Device connection string parsing
//!
//! A device connection string as shown in the Azure portal has the form
//! `HostName=<hub>.azure-devices.net;DeviceId=<device>;SharedAccessKey=<base64 key>`.
//! A pre-issued `SharedAccessSignature=<sas>` may be given in place of the key.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

const HOSTNAME_KEY: &str = "HostName";
const DEVICEID_KEY: &str = "DeviceId";
const SHAREDACCESSKEY_KEY: &str = "SharedAccessKey";
const SHAREDACCESSSIGNATURE_KEY: &str = "SharedAccessSignature";

/// Returned when a connection string cannot be parsed
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConnectionStringError {
    ///
    #[error("connection string is empty")]
    Empty,
    /// A `;` separated segment has no `=`
    #[error("segment `{0}` is not a key=value pair")]
    MalformedSegment(String),
    /// A required parameter is absent or empty
    #[error("missing required parameter `{0}`")]
    MissingParameter(&'static str),
}

/// How the device authenticates with the hub
#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    /// Base64 encoded symmetric device key
    SharedAccessKey(String),
    /// A signature issued ahead of time, used verbatim
    SharedAccessSignature(String),
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credential::SharedAccessKey(_) => f.write_str("SharedAccessKey(..)"),
            Credential::SharedAccessSignature(_) => f.write_str("SharedAccessSignature(..)"),
        }
    }
}

/// The parts of a device connection string needed to open a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionString {
    /// Fully qualified IoT hub host name
    pub host_name: String,
    /// The registered device to connect as
    pub device_id: String,
    ///
    pub credential: Credential,
}

impl FromStr for ConnectionString {
    type Err = ConnectionStringError;

    fn from_str(connection_string: &str) -> Result<Self, Self::Err> {
        let connection_string = connection_string.trim();
        if connection_string.is_empty() {
            return Err(ConnectionStringError::Empty);
        }

        let mut host_name = None;
        let mut device_id = None;
        let mut key = None;
        let mut signature = None;

        for segment in connection_string.split(';').filter(|s| !s.trim().is_empty()) {
            // Only split on the first `=` so base64 padding stays in the value
            let (name, value) = segment
                .split_once('=')
                .ok_or_else(|| ConnectionStringError::MalformedSegment(segment.to_string()))?;
            let value = value.trim();
            match name.trim() {
                HOSTNAME_KEY => host_name = Some(value),
                DEVICEID_KEY => device_id = Some(value),
                SHAREDACCESSKEY_KEY => key = Some(value),
                SHAREDACCESSSIGNATURE_KEY => signature = Some(value),
                _ => (), // Ignore extraneous component in the connection string
            }
        }

        let host_name = required(host_name, HOSTNAME_KEY)?;
        let device_id = required(device_id, DEVICEID_KEY)?;
        let credential = match (non_empty(key), non_empty(signature)) {
            (Some(key), _) => Credential::SharedAccessKey(key.to_string()),
            (None, Some(sas)) => Credential::SharedAccessSignature(sas.to_string()),
            (None, None) => {
                return Err(ConnectionStringError::MissingParameter(SHAREDACCESSKEY_KEY))
            }
        };

        Ok(ConnectionString {
            host_name: host_name.to_string(),
            device_id: device_id.to_string(),
            credential,
        })
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

fn required<'a>(
    value: Option<&'a str>,
    name: &'static str,
) -> Result<&'a str, ConnectionStringError> {
    non_empty(value).ok_or(ConnectionStringError::MissingParameter(name))
}
