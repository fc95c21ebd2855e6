//! The fixed vocabulary of keys recognised in `[Interface]` and `[Peer]` sections

use std::fmt;

use crate::error::{TunnelError, TunnelResult};

/// A recognised configuration key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Attribute {
    Address,
    AllowedIps,
    Dns,
    Endpoint,
    ListenPort,
    Mtu,
    PersistentKeepalive,
    PresharedKey,
    PrivateKey,
    PublicKey,
}

impl Attribute {
    pub const ALL: [Attribute; 10] = [
        Attribute::Address,
        Attribute::AllowedIps,
        Attribute::Dns,
        Attribute::Endpoint,
        Attribute::ListenPort,
        Attribute::Mtu,
        Attribute::PersistentKeepalive,
        Attribute::PresharedKey,
        Attribute::PrivateKey,
        Attribute::PublicKey,
    ];

    /// The literal key as it appears in config text
    pub fn token(self) -> &'static str {
        match self {
            Attribute::Address => "Address",
            Attribute::AllowedIps => "AllowedIPs",
            Attribute::Dns => "DNS",
            Attribute::Endpoint => "Endpoint",
            Attribute::ListenPort => "ListenPort",
            Attribute::Mtu => "MTU",
            Attribute::PersistentKeepalive => "PersistentKeepalive",
            Attribute::PresharedKey => "PresharedKey",
            Attribute::PrivateKey => "PrivateKey",
            Attribute::PublicKey => "PublicKey",
        }
    }

    /// Identify the attribute a line sets.
    ///
    /// The key is everything before the first whitespace or `=`, compared
    /// case-sensitively against the token set. Unknown keys yield `None`;
    /// whether that is fatal is up to the caller.
    pub fn from_line(line: &str) -> Option<Attribute> {
        let key = line
            .split(|c: char| c.is_whitespace() || c == '=')
            .next()
            .unwrap_or_default();
        Self::ALL.into_iter().find(|attribute| attribute.token() == key)
    }

    /// Extract the value from a `Token = value` line.
    ///
    /// Returns `None` if the line does not start with this attribute's token
    /// followed by `=` and a non-empty value.
    pub fn parse(self, line: &str) -> Option<&str> {
        let rest = line.strip_prefix(self.token())?;
        let rest = rest.trim_start().strip_prefix('=')?;
        let value = rest.trim();
        if value.is_empty() {
            None
        } else {
            Some(value)
        }
    }

    /// Prepare a value for storage under this attribute.
    ///
    /// Surrounding whitespace is dropped and an empty value means absent.
    /// A value spanning lines would render as extra attribute lines, so it
    /// is refused.
    pub fn normalize(self, value: impl Into<String>) -> TunnelResult<Option<String>> {
        let value = value.into();
        if value.contains(&['\n', '\r'][..]) {
            return Err(TunnelError::InvalidValue(format!(
                "{} must not contain line breaks",
                self.token()
            )));
        }
        let value = value.trim();
        Ok(if value.is_empty() {
            None
        } else {
            Some(value.to_string())
        })
    }

    /// Render a `Token = value` line, including the trailing newline
    pub fn compose(self, value: impl fmt::Display) -> String {
        format!("{} = {}\n", self.token(), value)
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_tokens_are_unique() {
        let tokens: HashSet<_> = Attribute::ALL.iter().map(|a| a.token()).collect();
        assert_eq!(tokens.len(), Attribute::ALL.len());
    }

    #[test]
    fn test_match_splits_on_whitespace_or_equals() {
        assert_eq!(Attribute::from_line("Address = 10.0.0.1/24"), Some(Attribute::Address));
        assert_eq!(Attribute::from_line("Address=10.0.0.1/24"), Some(Attribute::Address));
        assert_eq!(Attribute::from_line("MTU\t= 1420"), Some(Attribute::Mtu));
        assert_eq!(Attribute::from_line("AllowedIPs = 0.0.0.0/0"), Some(Attribute::AllowedIps));
    }

    #[test]
    fn test_match_is_exact_and_case_sensitive() {
        assert_eq!(Attribute::from_line("address = 10.0.0.1/24"), None);
        assert_eq!(Attribute::from_line("AllowedIps = 0.0.0.0/0"), None);
        assert_eq!(Attribute::from_line("AddressX = 1"), None);
        assert_eq!(Attribute::from_line("Table = off"), None);
        assert_eq!(Attribute::from_line(""), None);
    }

    #[test]
    fn test_parse_value() {
        assert_eq!(Attribute::Dns.parse("DNS = 1.1.1.1, 8.8.8.8"), Some("1.1.1.1, 8.8.8.8"));
        assert_eq!(Attribute::Dns.parse("DNS=1.1.1.1"), Some("1.1.1.1"));
        assert_eq!(Attribute::Dns.parse("DNS ="), None);
        assert_eq!(Attribute::Dns.parse("DNS 1.1.1.1"), None);
        // Base64 padding survives
        assert_eq!(Attribute::PublicKey.parse("PublicKey = abc="), Some("abc="));
    }

    #[test]
    fn test_normalize() {
        assert_eq!(Attribute::Dns.normalize("").unwrap(), None);
        assert_eq!(Attribute::Dns.normalize("  ").unwrap(), None);
        assert_eq!(Attribute::Dns.normalize(" 1.1.1.1 ").unwrap().as_deref(), Some("1.1.1.1"));
        assert!(matches!(
            Attribute::Dns.normalize("1.1.1.1\nListenPort = 1"),
            Err(TunnelError::InvalidValue(_))
        ));
        assert!(Attribute::Endpoint.normalize("a:1\r").is_err());
    }

    #[test]
    fn test_compose() {
        assert_eq!(Attribute::ListenPort.compose("51820"), "ListenPort = 51820\n");
        assert_eq!(Attribute::PersistentKeepalive.compose(25), "PersistentKeepalive = 25\n");
    }
}
