//! Validated network interface names.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Maximum interface name length (IFNAMSIZ minus the NUL terminator).
const MAX_LEN: usize = 15;

/// A validated kernel interface name.
///
/// Kernel naming rules: non-empty, at most 15 bytes, printable ASCII,
/// no whitespace and no `/`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DeviceName(String);

impl DeviceName {
    /// Create a device name, validating kernel interface-naming rules.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(Error::validation("device name is empty"));
        }
        if name.len() > MAX_LEN {
            return Err(Error::validation(format!(
                "device name too long ({} bytes, max {MAX_LEN}): {name}",
                name.len()
            )));
        }
        if name == "." || name == ".." {
            return Err(Error::validation(format!("invalid device name: {name}")));
        }
        if let Some(c) = name
            .chars()
            .find(|c| !c.is_ascii_graphic() || *c == '/')
        {
            return Err(Error::validation(format!(
                "invalid character {c:?} in device name: {name}"
            )));
        }
        Ok(Self(name))
    }

    /// The interface name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The event-stream aggregate id for this device, `tc:<device>`.
    pub fn aggregate_id(&self) -> String {
        format!("tc:{}", self.0)
    }
}

impl fmt::Display for DeviceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for DeviceName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for DeviceName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<String> for DeviceName {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<DeviceName> for String {
    fn from(value: DeviceName) -> Self {
        value.0
    }
}
