//! WireGuard tunnel configuration model
//!
//! A [`Config`] is one `[Interface]` block followed by any number of `[Peer]`
//! blocks. Text produced by [`Config::to_string`] parses back to an equal
//! `Config`. Unknown keys, keys in the wrong section, and attribute lines
//! outside any section reject the whole document. A known key with no value
//! leaves that attribute absent.

pub mod attribute;
pub mod interface;
pub mod peer;

use std::fmt;
use std::str::FromStr;

pub use attribute::Attribute;
pub use interface::Interface;
pub use peer::Peer;

use crate::error::{TunnelError, TunnelResult};

/// Complete configuration of one tunnel
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
    pub interface: Interface,
    pub peers: Vec<Peer>,
}

enum Section {
    None,
    Interface,
    Peer,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse configuration text
    pub fn parse(text: &str) -> TunnelResult<Self> {
        let mut config = Config::default();
        let mut section = Section::None;
        let mut seen_interface = false;

        // `lines()` already strips a trailing '\r'
        for (index, raw) in text.lines().enumerate() {
            let line_no = index + 1;
            let line = raw.trim();

            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }

            if line.starts_with('[') {
                if line.eq_ignore_ascii_case("[Interface]") {
                    if seen_interface {
                        return Err(TunnelError::parse(line_no, "duplicate [Interface] section"));
                    }
                    seen_interface = true;
                    section = Section::Interface;
                } else if line.eq_ignore_ascii_case("[Peer]") {
                    config.peers.push(Peer::default());
                    section = Section::Peer;
                } else {
                    return Err(TunnelError::parse(line_no, format!("unknown section: {}", line)));
                }
                continue;
            }

            match section {
                Section::Interface => config.interface.parse_line(line_no, line)?,
                Section::Peer => match config.peers.last_mut() {
                    Some(peer) => peer.parse_line(line_no, line)?,
                    None => return Err(TunnelError::parse(line_no, "attribute outside of a section")),
                },
                Section::None => {
                    return Err(TunnelError::parse(line_no, "attribute outside of a section"))
                }
            }
        }

        Ok(config)
    }

    /// Check every attribute value; parsing itself does not
    pub fn validate(&self) -> TunnelResult<()> {
        self.interface.validate()?;
        for peer in &self.peers {
            peer.validate()?;
        }
        Ok(())
    }

    /// Render the config in the form `wg setconf` / `wg syncconf` accept,
    /// without the wg-quick-only `Address`, `DNS` and `MTU` keys
    pub fn to_wg_string(&self) -> String {
        let mut stripped = self.clone();
        stripped.interface.clear_quick_keys();
        stripped.to_string()
    }
}

impl FromStr for Config {
    type Err = TunnelError;

    fn from_str(text: &str) -> TunnelResult<Self> {
        Self::parse(text)
    }
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.interface)?;
        for peer in &self.peers {
            write!(f, "\n{}", peer)?;
        }
        Ok(())
    }
}
