//! TC handle parsing and formatting.
//!
//! A handle is a 32-bit identifier split into 16-bit major:minor parts.
//! Qdiscs sit at `major:0`; classes carry `major:minor` with a non-zero
//! minor. The kernel accepts both decimal and hex spellings, and `"N:"`
//! is shorthand for `N:0`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Error, Result};

/// A parsed TC handle with major:minor components.
///
/// `0:0` is not a valid handle and cannot be constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle {
    major: u16,
    minor: u16,
}

impl Handle {
    /// Create a handle from major:minor components.
    ///
    /// Fails on `0:0`, which the kernel treats as "unspecified".
    pub fn new(major: u16, minor: u16) -> Result<Self> {
        if major == 0 && minor == 0 {
            return Err(Error::validation("handle 0:0 is not valid"));
        }
        Ok(Self { major, minor })
    }

    /// Create a root (qdisc) handle `major:0`.
    pub fn root(major: u16) -> Result<Self> {
        Self::new(major, 0)
    }

    /// Major number (upper 16 bits).
    pub const fn major(self) -> u16 {
        self.major
    }

    /// Minor number (lower 16 bits).
    pub const fn minor(self) -> u16 {
        self.minor
    }

    /// Check if this is a qdisc (root) handle, i.e. `minor == 0`.
    pub const fn is_root(self) -> bool {
        self.minor == 0
    }

    /// Convert to the raw 32-bit kernel representation.
    pub const fn to_raw(self) -> u32 {
        ((self.major as u32) << 16) | (self.minor as u32)
    }

    /// Create a handle from the raw 32-bit kernel representation.
    pub fn from_raw(raw: u32) -> Result<Self> {
        Self::new((raw >> 16) as u16, (raw & 0xFFFF) as u16)
    }
}

/// Parse one 16-bit part, decimal or hex (`0x` prefix or bare hex digits).
fn parse_part(s: &str, what: &str) -> Result<u16> {
    if s.is_empty() {
        return Err(Error::validation(format!("handle {what} part is empty")));
    }
    let parsed = if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u16::from_str_radix(hex, 16)
    } else if s.bytes().all(|b| b.is_ascii_digit()) {
        s.parse()
    } else {
        u16::from_str_radix(s, 16)
    };
    parsed.map_err(|_| Error::validation(format!("invalid handle {what} part: {s}")))
}

impl FromStr for Handle {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(Error::validation("handle is empty"));
        }
        let Some((major, minor)) = s.split_once(':') else {
            return Err(Error::validation(format!(
                "invalid handle (expected MAJOR:MINOR): {s}"
            )));
        };
        let major = parse_part(major, "major")?;
        // "N:" is shorthand for N:0.
        let minor = if minor.is_empty() {
            0
        } else {
            parse_part(minor, "minor")?
        };
        Self::new(major, minor)
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.major, self.minor)
    }
}

impl Serialize for Handle {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Handle {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_decimal() {
        let h: Handle = "1:10".parse().unwrap();
        assert_eq!(h.major(), 1);
        assert_eq!(h.minor(), 10);

        let h: Handle = "1:999".parse().unwrap();
        assert_eq!(h.minor(), 999);
    }

    #[test]
    fn test_parse_hex() {
        let h: Handle = "0x10:0x20".parse().unwrap();
        assert_eq!(h.major(), 0x10);
        assert_eq!(h.minor(), 0x20);

        // Bare hex digits are accepted the way the kernel accepts them.
        let h: Handle = "ff:fe".parse().unwrap();
        assert_eq!(h.major(), 0xff);
        assert_eq!(h.minor(), 0xfe);
    }

    #[test]
    fn test_parse_shorthand_root() {
        let h: Handle = "1:".parse().unwrap();
        assert_eq!(h.major(), 1);
        assert_eq!(h.minor(), 0);
        assert!(h.is_root());
    }

    #[test]
    fn test_parse_rejects() {
        assert!("".parse::<Handle>().is_err());
        assert!("1".parse::<Handle>().is_err());
        assert!(":1".parse::<Handle>().is_err());
        assert!("0:0".parse::<Handle>().is_err());
        assert!("1:2:3".parse::<Handle>().is_err());
        assert!("zz:1".parse::<Handle>().is_err());
        assert!("99999:0".parse::<Handle>().is_err());
    }

    #[test]
    fn test_display_roundtrip() {
        for s in ["1:0", "1:10", "1:999", "10:20", "65535:65535"] {
            let h: Handle = s.parse().unwrap();
            assert_eq!(h.to_string(), s);
        }
    }

    #[test]
    fn test_raw_roundtrip() {
        let h = Handle::new(1, 10).unwrap();
        assert_eq!(h.to_raw(), 0x0001_000A);
        assert_eq!(Handle::from_raw(h.to_raw()).unwrap(), h);
        assert!(Handle::from_raw(0).is_err());
    }

    #[test]
    fn test_constructors() {
        assert!(Handle::new(0, 0).is_err());
        assert!(Handle::new(0, 1).is_ok());
        assert!(Handle::root(1).unwrap().is_root());
        assert!(!Handle::new(1, 1).unwrap().is_root());
    }

    #[test]
    fn test_serde_as_string() {
        let h = Handle::new(1, 10).unwrap();
        assert_eq!(serde_json::to_string(&h).unwrap(), "\"1:10\"");
        let back: Handle = serde_json::from_str("\"1:10\"").unwrap();
        assert_eq!(back, h);
    }
}
