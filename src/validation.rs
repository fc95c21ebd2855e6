//! Input validation and sanitization
//!
//! Tunnel names end up as file names and interface names, so they are held to
//! the interface-name rule. Attribute values are checked separately from
//! parsing so that parsing itself stays lossless.

use crate::crypto;
use crate::error::{TunnelError, TunnelResult};
use std::net::IpAddr;

/// Maximum length for tunnel names (Linux kernel interface name limit is 15)
const MAX_TUNNEL_NAME_LEN: usize = 15;

/// Maximum length for error messages shown to users
const MAX_ERROR_MESSAGE_LEN: usize = 500;

/// Validate a tunnel name
///
/// Names must be 1 to 15 characters from `[A-Za-z0-9_=+.-]`, which keeps
/// them safe as both a file stem and a network interface name.
pub fn validate_tunnel_name(name: &str) -> TunnelResult<()> {
    if name.is_empty() {
        return Err(TunnelError::InvalidName("name cannot be empty".to_string()));
    }

    if name.len() > MAX_TUNNEL_NAME_LEN {
        return Err(TunnelError::InvalidName(format!(
            "'{}' is too long (max {} characters)",
            name, MAX_TUNNEL_NAME_LEN
        )));
    }

    for c in name.chars() {
        if !c.is_ascii_alphanumeric() && !matches!(c, '_' | '=' | '+' | '.' | '-') {
            return Err(TunnelError::InvalidName(format!(
                "'{}' contains invalid character '{}'",
                name, c
            )));
        }
    }

    // "." and ".." would escape the config directory
    if name == "." || name == ".." {
        return Err(TunnelError::InvalidName(format!("'{}' is reserved", name)));
    }

    Ok(())
}

/// Validate an IP address
pub fn validate_ip_address(addr: &str) -> TunnelResult<IpAddr> {
    addr.parse::<IpAddr>()
        .map_err(|_| TunnelError::InvalidValue(format!("Invalid IP address: {}", addr)))
}

/// Validate a CIDR notation (e.g., "10.0.0.1/24"); a bare address is a host route
pub fn validate_cidr(cidr: &str) -> TunnelResult<()> {
    let (ip, prefix) = match cidr.split_once('/') {
        Some((ip, prefix)) => (ip, Some(prefix)),
        None => (cidr, None),
    };
    let addr = validate_ip_address(ip)?;
    if let Some(prefix) = prefix {
        let prefix_len = prefix
            .parse::<u8>()
            .map_err(|_| TunnelError::InvalidValue(format!("Invalid prefix length in {}", cidr)))?;
        let max = if addr.is_ipv6() { 128 } else { 32 };
        if prefix_len > max {
            return Err(TunnelError::InvalidValue(format!(
                "Prefix length {} exceeds maximum {} in {}",
                prefix_len, max, cidr
            )));
        }
    }
    Ok(())
}

/// Validate a comma-separated list of CIDRs
pub fn validate_cidr_list(list: &str) -> TunnelResult<()> {
    for item in list.split(',') {
        validate_cidr(item.trim())?;
    }
    Ok(())
}

/// Validate a port number
pub fn validate_port(port: &str) -> TunnelResult<u16> {
    port.parse::<u16>()
        .map_err(|_| TunnelError::InvalidValue(format!("Invalid port: {}", port)))
}

/// Validate an endpoint of the form `host:port` or `[v6addr]:port`
pub fn validate_endpoint(endpoint: &str) -> TunnelResult<()> {
    let (host, port) = endpoint
        .rsplit_once(':')
        .ok_or_else(|| TunnelError::InvalidValue(format!("Endpoint must be host:port: {}", endpoint)))?;
    validate_port(port)?;

    if let Some(inner) = host.strip_prefix('[').and_then(|h| h.strip_suffix(']')) {
        return match validate_ip_address(inner)? {
            IpAddr::V6(_) => Ok(()),
            IpAddr::V4(_) => Err(TunnelError::InvalidValue(format!(
                "Bracketed endpoint host must be IPv6: {}",
                endpoint
            ))),
        };
    }
    validate_hostname(host)
}

/// Validate a base64 key
pub fn validate_key(key: &str) -> TunnelResult<()> {
    crypto::decode_key(key)
        .map(|_| ())
        .ok_or_else(|| TunnelError::InvalidValue("Key must be 32 bytes of base64".to_string()))
}

/// Validate hostname
pub fn validate_hostname(host: &str) -> TunnelResult<()> {
    if host.is_empty() {
        return Err(TunnelError::InvalidValue("Hostname cannot be empty".to_string()));
    }

    if host.len() > 253 {
        return Err(TunnelError::InvalidValue("Hostname too long".to_string()));
    }

    if host.parse::<IpAddr>().is_ok() {
        return Ok(());
    }

    for c in host.chars() {
        if !c.is_ascii_alphanumeric() && c != '-' && c != '.' {
            return Err(TunnelError::InvalidValue(format!("Invalid hostname character: {}", c)));
        }
    }

    if host.starts_with('-') || host.starts_with('.') || host.ends_with('-') || host.ends_with('.') {
        return Err(TunnelError::InvalidValue("Invalid hostname format".to_string()));
    }

    Ok(())
}

/// Sanitize subprocess output before it reaches an error message
pub fn sanitize_error_message(stderr: &str) -> String {
    let mut sanitized = stderr.trim().to_string();

    if sanitized.len() > MAX_ERROR_MESSAGE_LEN {
        let mut cut = MAX_ERROR_MESSAGE_LEN;
        while !sanitized.is_char_boundary(cut) {
            cut -= 1;
        }
        sanitized.truncate(cut);
        sanitized.push_str("... (truncated)");
    }

    sanitized
}
