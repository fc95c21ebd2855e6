//! The `[Interface]` block of a tunnel configuration

use std::fmt;

use super::attribute::Attribute;
use crate::crypto::KeyPair;
use crate::error::{TunnelError, TunnelResult};
use crate::validation;

/// Local side of a tunnel.
///
/// Every optional field treats an empty string as absent, and setters refuse
/// values that span lines. The public key is never stored: it is derived
/// from the private key whenever that is set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Interface {
    address: Option<String>,
    dns: Option<String>,
    listen_port: Option<String>,
    mtu: Option<String>,
    private_key: Option<String>,
    keypair: Option<KeyPair>,
}

impl Interface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn address(&self) -> Option<&str> {
        self.address.as_deref()
    }

    pub fn dns(&self) -> Option<&str> {
        self.dns.as_deref()
    }

    pub fn listen_port(&self) -> Option<&str> {
        self.listen_port.as_deref()
    }

    pub fn mtu(&self) -> Option<&str> {
        self.mtu.as_deref()
    }

    pub fn private_key(&self) -> Option<&str> {
        self.private_key.as_deref()
    }

    /// Public key derived from the private key, if it decodes
    pub fn public_key(&self) -> Option<&str> {
        self.keypair.as_ref().map(KeyPair::public_key)
    }

    pub fn set_address(&mut self, address: impl Into<String>) -> TunnelResult<()> {
        self.address = Attribute::Address.normalize(address)?;
        Ok(())
    }

    pub fn set_dns(&mut self, dns: impl Into<String>) -> TunnelResult<()> {
        self.dns = Attribute::Dns.normalize(dns)?;
        Ok(())
    }

    pub fn set_listen_port(&mut self, listen_port: impl Into<String>) -> TunnelResult<()> {
        self.listen_port = Attribute::ListenPort.normalize(listen_port)?;
        Ok(())
    }

    pub fn set_mtu(&mut self, mtu: impl Into<String>) -> TunnelResult<()> {
        self.mtu = Attribute::Mtu.normalize(mtu)?;
        Ok(())
    }

    /// Set the private key and re-derive the key pair in the same step.
    ///
    /// A key that does not decode to 32 bytes is kept as text but leaves the
    /// public key absent.
    pub fn set_private_key(&mut self, private_key: impl Into<String>) -> TunnelResult<()> {
        self.private_key = Attribute::PrivateKey.normalize(private_key)?;
        self.keypair = self.private_key.as_deref().and_then(KeyPair::from_private_key);
        Ok(())
    }

    /// Replace the private key with a freshly generated one
    pub fn generate_keypair(&mut self) {
        let pair = KeyPair::generate();
        self.private_key = Some(pair.private_key().to_string());
        self.keypair = Some(pair);
    }

    /// Drop the keys only wg-quick understands
    pub(crate) fn clear_quick_keys(&mut self) {
        self.address = None;
        self.dns = None;
        self.mtu = None;
    }

    /// Apply one `Token = value` line belonging to this section
    pub(crate) fn parse_line(&mut self, line_no: usize, line: &str) -> TunnelResult<()> {
        let attribute = Attribute::from_line(line)
            .ok_or_else(|| TunnelError::parse(line_no, format!("unknown attribute: {}", line)))?;
        // A line with no value clears the attribute
        let value = attribute.parse(line).unwrap_or_default();
        match attribute {
            Attribute::Address => self.set_address(value)?,
            Attribute::Dns => self.set_dns(value)?,
            Attribute::ListenPort => self.set_listen_port(value)?,
            Attribute::Mtu => self.set_mtu(value)?,
            Attribute::PrivateKey => self.set_private_key(value)?,
            other => {
                return Err(TunnelError::parse(
                    line_no,
                    format!("{} is not valid in [Interface]", other),
                ))
            }
        }
        Ok(())
    }

    /// Check attribute values without changing them
    pub fn validate(&self) -> TunnelResult<()> {
        if let Some(address) = self.address() {
            validation::validate_cidr_list(address)?;
        }
        if let Some(dns) = self.dns() {
            for server in dns.split(',') {
                validation::validate_ip_address(server.trim())?;
            }
        }
        if let Some(port) = self.listen_port() {
            validation::validate_port(port)?;
        }
        if let Some(mtu) = self.mtu() {
            mtu.parse::<u16>()
                .map_err(|_| TunnelError::InvalidValue(format!("Invalid MTU: {}", mtu)))?;
        }
        match self.private_key() {
            Some(key) => validation::validate_key(key)?,
            None => {
                return Err(TunnelError::InvalidValue(
                    "[Interface] requires a PrivateKey".to_string(),
                ))
            }
        }
        Ok(())
    }
}

impl fmt::Display for Interface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[Interface]\n")?;
        let fields = [
            (Attribute::Address, &self.address),
            (Attribute::Dns, &self.dns),
            (Attribute::ListenPort, &self.listen_port),
            (Attribute::Mtu, &self.mtu),
            (Attribute::PrivateKey, &self.private_key),
        ];
        for (attribute, value) in fields {
            if let Some(value) = value {
                f.write_str(&attribute.compose(value))?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_string_clears_fields() {
        let mut iface = Interface::new();
        iface.set_address("10.0.0.2/32").unwrap();
        iface.set_dns("1.1.1.1").unwrap();
        iface.set_listen_port("51820").unwrap();
        iface.set_mtu("1420").unwrap();
        iface.set_address("").unwrap();
        iface.set_dns("").unwrap();
        iface.set_listen_port("").unwrap();
        iface.set_mtu("").unwrap();
        assert_eq!(iface, Interface::new());
        assert_eq!(iface.to_string(), "[Interface]\n");
    }

    #[test]
    fn test_private_key_derives_public_key() {
        let pair = KeyPair::generate();
        let mut iface = Interface::new();
        iface.set_private_key(pair.private_key()).unwrap();
        assert_eq!(iface.public_key(), Some(pair.public_key()));

        iface.set_private_key("").unwrap();
        assert_eq!(iface.private_key(), None);
        assert_eq!(iface.public_key(), None);

        iface.set_private_key("not-a-key").unwrap();
        assert_eq!(iface.private_key(), Some("not-a-key"));
        assert_eq!(iface.public_key(), None);
    }

    #[test]
    fn test_generate_keypair_is_consistent() {
        let mut iface = Interface::new();
        iface.generate_keypair();
        let private = iface.private_key().unwrap().to_string();
        assert_eq!(
            iface.public_key().map(str::to_string),
            crate::crypto::public_key_for(&private)
        );
    }

    #[test]
    fn test_parse_line_rejects_peer_attributes() {
        let mut iface = Interface::new();
        assert!(iface.parse_line(2, "Address = 10.0.0.2/32").is_ok());
        let err = iface.parse_line(3, "PublicKey = abc").unwrap_err();
        assert!(matches!(err, TunnelError::Parse { line: 3, .. }));
        assert!(iface.parse_line(4, "Bogus = 1").is_err());
    }

    #[test]
    fn test_multi_line_values_are_refused() {
        let mut iface = Interface::new();
        iface.set_dns("1.1.1.1").unwrap();
        let err = iface.set_dns("1.1.1.1\nListenPort = 1").unwrap_err();
        assert!(matches!(err, TunnelError::InvalidValue(_)));
        assert_eq!(iface.dns(), Some("1.1.1.1"));
        assert!(iface.set_private_key("key\r\nAddress = 0.0.0.0/0").is_err());
        assert_eq!(iface.private_key(), None);
    }

    #[test]
    fn test_parse_line_without_value_clears() {
        let mut iface = Interface::new();
        iface.parse_line(2, "DNS = 1.1.1.1").unwrap();
        iface.parse_line(3, "DNS =").unwrap();
        assert_eq!(iface.dns(), None);
    }

    #[test]
    fn test_render_order() {
        let mut iface = Interface::new();
        iface.set_private_key("key").unwrap();
        iface.set_mtu("1420").unwrap();
        iface.set_address("10.0.0.2/32").unwrap();
        assert_eq!(
            iface.to_string(),
            "[Interface]\nAddress = 10.0.0.2/32\nMTU = 1420\nPrivateKey = key\n"
        );
    }

    #[test]
    fn test_validate() {
        let mut iface = Interface::new();
        assert!(iface.validate().is_err());
        iface.generate_keypair();
        iface.set_address("10.0.0.2/32, fd00::2/128").unwrap();
        iface.set_dns("1.1.1.1").unwrap();
        iface.set_listen_port("51820").unwrap();
        assert!(iface.validate().is_ok());
        iface.set_mtu("huge").unwrap();
        assert!(matches!(iface.validate(), Err(TunnelError::InvalidValue(_))));
    }
}
