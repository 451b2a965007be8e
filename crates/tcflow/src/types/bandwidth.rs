//! Bandwidth values with kernel-style unit parsing.
//!
//! A [`Bandwidth`] is a count of bits per second plus the unit it was
//! written in, so `"20mbit"` formats back as `20mbit` in error messages
//! and views. The parser accepts the spellings the kernel accepts
//! (`100mbit`, `1gbps`, `512kbit`, ...).

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Error, Result};

/// Display unit for a bandwidth value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BandwidthUnit {
    /// Bits per second.
    Bit,
    /// Kilobits per second (1000 bits).
    Kbit,
    /// Megabits per second.
    Mbit,
    /// Gigabits per second.
    Gbit,
}

impl BandwidthUnit {
    /// Multiplier to bits per second.
    pub const fn multiplier(self) -> u64 {
        match self {
            Self::Bit => 1,
            Self::Kbit => 1_000,
            Self::Mbit => 1_000_000,
            Self::Gbit => 1_000_000_000,
        }
    }

    /// Kernel-style suffix.
    pub const fn suffix(self) -> &'static str {
        match self {
            Self::Bit => "bit",
            Self::Kbit => "kbit",
            Self::Mbit => "mbit",
            Self::Gbit => "gbit",
        }
    }
}

/// A bandwidth: bits per second plus the unit it is displayed in.
///
/// Equality, ordering, and hashing consider only the bit rate; `1000kbit`
/// and `1mbit` are the same bandwidth.
#[derive(Debug, Clone, Copy)]
pub struct Bandwidth {
    bits_per_second: u64,
    unit: BandwidthUnit,
}

impl Bandwidth {
    /// Create a bandwidth in bits per second.
    pub const fn bits(bps: u64) -> Self {
        Self {
            bits_per_second: bps,
            unit: BandwidthUnit::Bit,
        }
    }

    /// Create a bandwidth in kilobits per second.
    pub const fn kilobits(kbps: u64) -> Self {
        Self {
            bits_per_second: kbps * 1_000,
            unit: BandwidthUnit::Kbit,
        }
    }

    /// Create a bandwidth in megabits per second.
    pub const fn megabits(mbps: u64) -> Self {
        Self {
            bits_per_second: mbps * 1_000_000,
            unit: BandwidthUnit::Mbit,
        }
    }

    /// Create a bandwidth in gigabits per second.
    pub const fn gigabits(gbps: u64) -> Self {
        Self {
            bits_per_second: gbps * 1_000_000_000,
            unit: BandwidthUnit::Gbit,
        }
    }

    /// Bits per second.
    pub const fn bits_per_second(self) -> u64 {
        self.bits_per_second
    }

    /// Bytes per second, as the kernel rate tables want it.
    pub const fn bytes_per_second(self) -> u64 {
        self.bits_per_second / 8
    }

    /// The unit this value displays in.
    pub const fn unit(self) -> BandwidthUnit {
        self.unit
    }

    /// Saturating sum, keeping the left-hand unit.
    pub fn saturating_add(self, other: Self) -> Self {
        Self {
            bits_per_second: self.bits_per_second.saturating_add(other.bits_per_second),
            unit: self.unit,
        }
    }

    /// True for a zero rate.
    pub const fn is_zero(self) -> bool {
        self.bits_per_second == 0
    }
}

impl PartialEq for Bandwidth {
    fn eq(&self, other: &Self) -> bool {
        self.bits_per_second == other.bits_per_second
    }
}

impl Eq for Bandwidth {}

impl PartialOrd for Bandwidth {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Bandwidth {
    fn cmp(&self, other: &Self) -> Ordering {
        self.bits_per_second.cmp(&other.bits_per_second)
    }
}

impl Hash for Bandwidth {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.bits_per_second.hash(state);
    }
}

impl FromStr for Bandwidth {
    type Err = Error;

    /// Parse a kernel-style rate string, e.g. `"100mbit"`, `"1gbps"`.
    fn from_str(s: &str) -> Result<Self> {
        let lower = s.trim().to_lowercase();
        if lower.is_empty() {
            return Err(Error::validation("bandwidth is empty"));
        }
        let split = lower
            .find(|c: char| !c.is_ascii_digit() && c != '.')
            .unwrap_or(lower.len());
        let (num_str, unit_str) = lower.split_at(split);

        let num: f64 = num_str
            .parse()
            .map_err(|_| Error::validation(format!("invalid bandwidth number: {s}")))?;
        if num < 0.0 {
            return Err(Error::validation(format!("negative bandwidth: {s}")));
        }

        let unit = match unit_str {
            "" | "bit" | "bps" => BandwidthUnit::Bit,
            "kbit" | "kbps" | "k" => BandwidthUnit::Kbit,
            "mbit" | "mbps" | "m" => BandwidthUnit::Mbit,
            "gbit" | "gbps" | "g" => BandwidthUnit::Gbit,
            _ => {
                return Err(Error::validation(format!(
                    "unknown bandwidth unit: {unit_str}"
                )));
            }
        };

        Ok(Self {
            bits_per_second: (num * unit.multiplier() as f64) as u64,
            unit,
        })
    }
}

impl fmt::Display for Bandwidth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mult = self.unit.multiplier();
        if self.bits_per_second.is_multiple_of(mult) {
            write!(f, "{}{}", self.bits_per_second / mult, self.unit.suffix())
        } else {
            let value = self.bits_per_second as f64 / mult as f64;
            write!(f, "{}{}", value, self.unit.suffix())
        }
    }
}

impl Serialize for Bandwidth {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Bandwidth {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
