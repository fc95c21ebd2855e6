//! A `[Peer]` block of a tunnel configuration

use std::fmt;

use super::attribute::Attribute;
use crate::error::{TunnelError, TunnelResult};
use crate::validation;

/// Remote side of a tunnel, identified by its public key
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Peer {
    allowed_ips: Vec<String>,
    endpoint: Option<String>,
    persistent_keepalive: Option<String>,
    preshared_key: Option<String>,
    public_key: Option<String>,
}

impl Peer {
    pub fn new(public_key: impl Into<String>) -> TunnelResult<Self> {
        let mut peer = Self::default();
        peer.set_public_key(public_key)?;
        Ok(peer)
    }

    pub fn allowed_ips(&self) -> &[String] {
        &self.allowed_ips
    }

    pub fn endpoint(&self) -> Option<&str> {
        self.endpoint.as_deref()
    }

    pub fn persistent_keepalive(&self) -> Option<&str> {
        self.persistent_keepalive.as_deref()
    }

    pub fn preshared_key(&self) -> Option<&str> {
        self.preshared_key.as_deref()
    }

    pub fn public_key(&self) -> Option<&str> {
        self.public_key.as_deref()
    }

    /// Replace the allowed IPs with a comma-separated list; empty clears it
    pub fn set_allowed_ips(&mut self, allowed_ips: &str) -> TunnelResult<()> {
        let entries = Self::split_allowed_ips(allowed_ips)?;
        self.allowed_ips = entries;
        Ok(())
    }

    /// Append entries from a comma-separated list
    pub fn add_allowed_ips(&mut self, allowed_ips: &str) -> TunnelResult<()> {
        let entries = Self::split_allowed_ips(allowed_ips)?;
        self.allowed_ips.extend(entries);
        Ok(())
    }

    fn split_allowed_ips(allowed_ips: &str) -> TunnelResult<Vec<String>> {
        let mut entries = Vec::new();
        for entry in allowed_ips.split(',') {
            if let Some(entry) = Attribute::AllowedIps.normalize(entry)? {
                entries.push(entry);
            }
        }
        Ok(entries)
    }

    pub fn set_endpoint(&mut self, endpoint: impl Into<String>) -> TunnelResult<()> {
        self.endpoint = Attribute::Endpoint.normalize(endpoint)?;
        Ok(())
    }

    pub fn set_persistent_keepalive(&mut self, keepalive: impl Into<String>) -> TunnelResult<()> {
        self.persistent_keepalive = Attribute::PersistentKeepalive.normalize(keepalive)?;
        Ok(())
    }

    pub fn set_preshared_key(&mut self, preshared_key: impl Into<String>) -> TunnelResult<()> {
        self.preshared_key = Attribute::PresharedKey.normalize(preshared_key)?;
        Ok(())
    }

    pub fn set_public_key(&mut self, public_key: impl Into<String>) -> TunnelResult<()> {
        self.public_key = Attribute::PublicKey.normalize(public_key)?;
        Ok(())
    }

    /// Apply one `Token = value` line belonging to this section.
    ///
    /// Repeated `AllowedIPs` lines accumulate, as wg-quick accepts.
    pub(crate) fn parse_line(&mut self, line_no: usize, line: &str) -> TunnelResult<()> {
        let attribute = Attribute::from_line(line)
            .ok_or_else(|| TunnelError::parse(line_no, format!("unknown attribute: {}", line)))?;
        let value = attribute.parse(line).unwrap_or_default();
        match attribute {
            Attribute::AllowedIps => self.add_allowed_ips(value)?,
            Attribute::Endpoint => self.set_endpoint(value)?,
            Attribute::PersistentKeepalive => self.set_persistent_keepalive(value)?,
            Attribute::PresharedKey => self.set_preshared_key(value)?,
            Attribute::PublicKey => self.set_public_key(value)?,
            other => {
                return Err(TunnelError::parse(
                    line_no,
                    format!("{} is not valid in [Peer]", other),
                ))
            }
        }
        Ok(())
    }

    /// Check attribute values without changing them
    pub fn validate(&self) -> TunnelResult<()> {
        match self.public_key() {
            Some(key) => validation::validate_key(key)?,
            None => {
                return Err(TunnelError::InvalidValue(
                    "[Peer] requires a PublicKey".to_string(),
                ))
            }
        }
        if let Some(psk) = self.preshared_key() {
            validation::validate_key(psk)?;
        }
        for ip in &self.allowed_ips {
            validation::validate_cidr(ip)?;
        }
        if let Some(endpoint) = self.endpoint() {
            validation::validate_endpoint(endpoint)?;
        }
        if let Some(keepalive) = self.persistent_keepalive() {
            if keepalive != "off" {
                keepalive.parse::<u16>().map_err(|_| {
                    TunnelError::InvalidValue(format!("Invalid PersistentKeepalive: {}", keepalive))
                })?;
            }
        }
        Ok(())
    }
}

impl fmt::Display for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[Peer]\n")?;
        if !self.allowed_ips.is_empty() {
            f.write_str(&Attribute::AllowedIps.compose(self.allowed_ips.join(", ")))?;
        }
        let fields = [
            (Attribute::Endpoint, &self.endpoint),
            (Attribute::PersistentKeepalive, &self.persistent_keepalive),
            (Attribute::PresharedKey, &self.preshared_key),
            (Attribute::PublicKey, &self.public_key),
        ];
        for (attribute, value) in fields {
            if let Some(value) = value {
                f.write_str(&attribute.compose(value))?;
            }
        }
        Ok(())
    }
}
