// src/listeners/uri.rs

//! Bind URI parsing (`tcp://host:port`, `ssl://host:port?...`, `unix://path`).

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::LaunchError;

/// Transport scheme of a listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    Tcp,
    Unix,
    /// TCP socket whose TLS termination is done by the serving engine.
    Ssl,
}

impl Scheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Tcp => "tcp",
            Scheme::Unix => "unix",
            Scheme::Ssl => "ssl",
        }
    }

    /// Whether the underlying socket is a TCP socket.
    pub fn is_tcp(&self) -> bool {
        matches!(self, Scheme::Tcp | Scheme::Ssl)
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scheme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "tcp" => Ok(Scheme::Tcp),
            "unix" => Ok(Scheme::Unix),
            "ssl" => Ok(Scheme::Ssl),
            other => Err(format!(
                "unsupported scheme '{other}' (expected tcp, ssl or unix)"
            )),
        }
    }
}

/// A parsed `scheme://address` bind string.
///
/// `address` is everything after `://`, including an optional `?query` for
/// `ssl` binds; it round-trips through `Display` unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BindUri {
    scheme: Scheme,
    address: String,
}

impl BindUri {
    pub fn new(scheme: Scheme, address: impl Into<String>) -> Result<Self, LaunchError> {
        let address = address.into();
        let uri = Self { scheme, address };
        uri.validate()?;
        Ok(uri)
    }

    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// `host:port` for tcp/ssl binds, with any query string removed.
    pub fn host_port(&self) -> Option<&str> {
        if !self.scheme.is_tcp() {
            return None;
        }
        Some(self.address.split('?').next().unwrap_or(&self.address))
    }

    /// Filesystem path of a unix bind.
    pub fn unix_path(&self) -> Option<PathBuf> {
        match self.scheme {
            Scheme::Unix => Some(PathBuf::from(&self.address)),
            _ => None,
        }
    }

    fn invalid(&self, reason: impl Into<String>) -> LaunchError {
        LaunchError::InvalidBind {
            uri: self.to_string(),
            reason: reason.into(),
        }
    }

    fn validate(&self) -> Result<(), LaunchError> {
        if self.address.is_empty() {
            return Err(self.invalid("empty address"));
        }

        if let Some(host_port) = self.host_port() {
            let (host, port) = host_port
                .rsplit_once(':')
                .ok_or_else(|| self.invalid("expected host:port"))?;
            if host.is_empty() {
                return Err(self.invalid("missing host"));
            }
            port.parse::<u16>()
                .map_err(|e| self.invalid(format!("invalid port '{port}': {e}")))?;
        }

        Ok(())
    }
}

impl fmt::Display for BindUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.scheme, self.address)
    }
}

impl FromStr for BindUri {
    type Err = LaunchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (scheme, address) = s.split_once("://").ok_or_else(|| LaunchError::InvalidBind {
            uri: s.to_string(),
            reason: "missing '://'".to_string(),
        })?;
        let scheme = Scheme::from_str(scheme).map_err(|reason| LaunchError::InvalidBind {
            uri: s.to_string(),
            reason,
        })?;
        BindUri::new(scheme, address)
    }
}

impl TryFrom<String> for BindUri {
    type Error = LaunchError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<BindUri> for String {
    fn from(uri: BindUri) -> Self {
        uri.to_string()
    }
}

impl Serialize for BindUri {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for BindUri {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
