//! Station URLs.
//!
//! `prudp:/address=1.2.3.4;port=9103;PID=1001;sid=15;type=3;RVCID=12`
//!
//! Parameters keep their original order. Keys the server does not know are
//! carried through untouched.

use std::{fmt, str::FromStr};

use crate::{
    errors::{ProtocolError, Result},
    stream::{StreamReader, StreamWriter, Structure},
};

/// Station URL key for the peer address.
pub const KEY_ADDRESS: &str = "address";
/// Station URL key for the peer port.
pub const KEY_PORT: &str = "port";
/// Station URL key for the connection id.
pub const KEY_CID: &str = "CID";
/// Station URL key for the principal id.
pub const KEY_PID: &str = "PID";
/// Station URL key for the stream id.
pub const KEY_SID: &str = "sid";
/// Station URL key for the stream type.
pub const KEY_STREAM: &str = "stream";
/// Station URL key for the URL type.
pub const KEY_TYPE: &str = "type";
/// Station URL key for the rendez-vous connection id.
pub const KEY_RVCID: &str = "RVCID";

/// URL scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UrlScheme {
    /// `prudp:/`
    Prudp,
    /// `prudps:/`
    Prudps,
}

impl UrlScheme {
    fn as_str(self) -> &'static str {
        match self {
            Self::Prudp => "prudp",
            Self::Prudps => "prudps",
        }
    }
}

/// Parsed station URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StationUrl {
    scheme: UrlScheme,
    params: Vec<(String, String)>,
}

impl StationUrl {
    /// URL with no parameters.
    pub fn new(scheme: UrlScheme) -> Self {
        Self { scheme, params: Vec::new() }
    }

    /// Parse `prudp:/k=v;k=v` or `prudps:/...`.
    ///
    /// # Errors
    ///
    /// - `InvalidStationUrl` on an unknown scheme or a parameter without `=`
    pub fn parse(text: &str) -> Result<Self> {
        let (scheme, rest) = text
            .split_once(":/")
            .ok_or_else(|| ProtocolError::InvalidStationUrl(format!("missing scheme in {text:?}")))?;

        let scheme = match scheme {
            "prudp" => UrlScheme::Prudp,
            "prudps" => UrlScheme::Prudps,
            other => return Err(ProtocolError::InvalidStationUrl(format!("unknown scheme {other:?}"))),
        };

        let mut params = Vec::new();
        for pair in rest.split(';').filter(|p| !p.is_empty()) {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| ProtocolError::InvalidStationUrl(format!("parameter without value: {pair:?}")))?;
            params.push((key.to_string(), value.to_string()));
        }

        Ok(Self { scheme, params })
    }

    /// URL scheme.
    pub fn scheme(&self) -> UrlScheme {
        self.scheme
    }

    /// Value of `key`, if present.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.params.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    /// Value of `key` parsed as an integer.
    pub fn get_u32(&self, key: &str) -> Option<u32> {
        self.get(key).and_then(|v| v.parse().ok())
    }

    /// Set `key`, replacing in place or appending.
    pub fn set(&mut self, key: &str, value: impl ToString) -> &mut Self {
        let value = value.to_string();
        match self.params.iter_mut().find(|(k, _)| k == key) {
            Some((_, existing)) => *existing = value,
            None => self.params.push((key.to_string(), value)),
        }
        self
    }

    /// Parameters in order.
    pub fn params(&self) -> impl Iterator<Item = (&str, &str)> {
        self.params.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl fmt::Display for StationUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:/", self.scheme.as_str())?;
        for (i, (key, value)) in self.params.iter().enumerate() {
            if i > 0 {
                f.write_str(";")?;
            }
            write!(f, "{key}={value}")?;
        }
        Ok(())
    }
}

impl FromStr for StationUrl {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Structure for StationUrl {
    fn write_to(&self, writer: &mut StreamWriter) {
        writer.write_string(&self.to_string());
    }

    fn read_from(reader: &mut StreamReader<'_>) -> Result<Self> {
        Self::parse(&reader.read_string()?)
    }
}
