//! Shared validation rules
//!
//! Small parsers and predicates used by more than one validator.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use once_cell::sync::Lazy;
use regex::Regex;

/// Bytes in one kibibyte
pub const KIB: u64 = 1024;
/// Bytes in one mebibyte
pub const MIB: u64 = KIB * 1024;
/// Bytes in one gibibyte
pub const GIB: u64 = MIB * 1024;
/// Bytes in one tebibyte
pub const TIB: u64 = GIB * 1024;

/// Lowest usable TCP/UDP port
pub const MIN_PORT: i64 = 1;
/// Highest usable TCP/UDP port
pub const MAX_PORT: i64 = 65535;

static MEMORY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\s*(\d+)\s*([kmg]b?)?\s*$").expect("invalid regex"));

static HOSTNAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9]([A-Za-z0-9-]{0,61}[A-Za-z0-9])?(\.[A-Za-z0-9]([A-Za-z0-9-]{0,61}[A-Za-z0-9])?)*$")
        .expect("invalid regex")
});

/// Bind addresses accepted without further parsing
pub const SPECIAL_BIND_ADDRESSES: &[&str] = &["localhost", "*", "0.0.0.0", "::"];

/// Parse a memory size such as `256mb`, `1G` or `1048576` into bytes.
///
/// Units are powers of 1024. Returns `None` when the string is malformed,
/// zero, or overflows.
pub fn parse_memory(value: &str) -> Option<u64> {
    let caps = MEMORY.captures(value)?;
    let amount: u64 = caps.get(1)?.as_str().parse().ok()?;
    if amount == 0 {
        return None;
    }

    let multiplier = match caps
        .get(2)
        .and_then(|unit| unit.as_str().chars().next())
        .map(|c| c.to_ascii_lowercase())
    {
        None => 1,
        Some('k') => KIB,
        Some('m') => MIB,
        Some('g') => GIB,
        Some(_) => return None,
    };

    amount.checked_mul(multiplier)
}

/// Whether a port number is in the usable range
pub fn is_valid_port(port: i64) -> bool {
    (MIN_PORT..=MAX_PORT).contains(&port)
}

/// Whether the value is a bind address Redis accepts
pub fn is_valid_bind_address(value: &str) -> bool {
    let value = value.trim();
    if SPECIAL_BIND_ADDRESSES
        .iter()
        .any(|special| special.eq_ignore_ascii_case(value))
    {
        return true;
    }

    if value.parse::<IpAddr>().is_ok() {
        return true;
    }

    // Dotted digits that did not parse as an address are a typo, not a host name
    let numeric = value.chars().all(|c| c.is_ascii_digit() || c == '.');
    !numeric && value.len() <= 253 && HOSTNAME.is_match(value)
}

/// Whether the bind address only accepts local connections
pub fn is_loopback_address(value: &str) -> bool {
    let value = value.trim();
    value.eq_ignore_ascii_case("localhost")
        || value.parse::<IpAddr>().map(|ip| ip.is_loopback()).unwrap_or(false)
}

/// Whether the bind address listens on every interface
pub fn is_all_interfaces(value: &str) -> bool {
    match value.trim() {
        "*" => true,
        other => match other.parse::<IpAddr>() {
            Ok(IpAddr::V4(ip)) => ip == Ipv4Addr::UNSPECIFIED,
            Ok(IpAddr::V6(ip)) => ip == Ipv6Addr::UNSPECIFIED,
            Err(_) => false,
        },
    }
}

/// Syntactic check of a file system path.
///
/// Accepts Windows and POSIX style paths. Rejects control characters,
/// characters Windows does not allow in paths, and colons other than a
/// leading drive letter.
pub fn is_valid_path(value: &str) -> bool {
    if value.trim().is_empty() {
        return false;
    }
    if value.chars().any(|c| c.is_control() || matches!(c, '<' | '>' | '"' | '|' | '?' | '*')) {
        return false;
    }

    let bytes = value.as_bytes();
    let has_drive = bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':';
    let rest = if has_drive { &value[2..] } else { value };
    !rest.contains(':')
}

/// Absolute POSIX path, as used inside a WSL distribution
pub fn is_absolute_unix_path(value: &str) -> bool {
    value.starts_with('/') && is_valid_path(value)
}

/// Extension of a path, lowercased
pub fn extension(path: &str) -> Option<String> {
    let file = path.rsplit(['/', '\\']).next()?;
    let (stem, ext) = file.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// Transport protocol of a port mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    Tcp,
    Udp,
}

/// Parsed `host:container[/proto]` port mapping
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortMapping {
    pub host: u16,
    pub container: u16,
    pub protocol: Protocol,
}

impl PortMapping {
    /// Parse a mapping, describing what is wrong on failure
    pub fn parse(value: &str) -> Result<Self, String> {
        let value = value.trim();
        let (ports, protocol) = match value.split_once('/') {
            Some((ports, proto)) => {
                let protocol = match proto.to_ascii_lowercase().as_str() {
                    "tcp" => Protocol::Tcp,
                    "udp" => Protocol::Udp,
                    _ => return Err(format!("protocol '{}' must be tcp or udp", proto)),
                };
                (ports, protocol)
            }
            None => (value, Protocol::Tcp),
        };

        let (host, container) = ports
            .split_once(':')
            .ok_or_else(|| format!("'{}' must have the form host:container[/proto]", value))?;

        Ok(Self {
            host: parse_port(host, "host")?,
            container: parse_port(container, "container")?,
            protocol,
        })
    }
}

fn parse_port(raw: &str, which: &str) -> Result<u16, String> {
    let port: i64 = raw
        .trim()
        .parse()
        .map_err(|_| format!("{} port '{}' is not a number", which, raw))?;

    if !is_valid_port(port) {
        return Err(format!(
            "{} port {} must be between {} and {}",
            which, port, MIN_PORT, MAX_PORT
        ));
    }

    u16::try_from(port).map_err(|_| format!("{} port {} is out of range", which, port))
}

/// Access mode of a volume mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumeMode {
    ReadOnly,
    ReadWrite,
}

/// Parsed `source:target[:mode]` volume mapping
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeMapping {
    pub source: String,
    pub target: String,
    pub mode: Option<VolumeMode>,
}

impl VolumeMapping {
    /// Parse a mapping. The source may be a named volume or a Windows path
    /// with a drive letter.
    pub fn parse(value: &str) -> Result<Self, String> {
        let value = value.trim();
        let bytes = value.as_bytes();
        let skip = if bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' {
            2
        } else {
            0
        };

        let (source, rest) = match value[skip..].find(':') {
            Some(i) => (&value[..skip + i], &value[skip + i + 1..]),
            None => return Err(format!("'{}' must have the form source:target[:mode]", value)),
        };

        let (target, mode) = match rest.rsplit_once(':') {
            Some((target, mode)) => {
                let mode = match mode.to_ascii_lowercase().as_str() {
                    "ro" => VolumeMode::ReadOnly,
                    "rw" => VolumeMode::ReadWrite,
                    _ => return Err(format!("volume mode '{}' must be ro or rw", mode)),
                };
                (target, Some(mode))
            }
            None => (rest, None),
        };

        if source.is_empty() {
            return Err("volume source is empty".to_string());
        }
        if !target.starts_with('/') {
            return Err(format!("volume target '{}' must be an absolute container path", target));
        }

        Ok(Self {
            source: source.to_string(),
            target: target.to_string(),
            mode,
        })
    }
}
