//! Hardware addresses and vendor (OUI) prefixes.
//!
//! Cameras are identified by the first three octets of their MAC address
//! rather than by an assumed IP, so every discovery channel funnels its
//! output through [`MacAddr`] and [`VendorPrefix`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A 48-bit Ethernet hardware address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MacAddr([u8; 6]);

impl MacAddr {
    pub fn new(octets: [u8; 6]) -> Self {
        Self(octets)
    }

    pub fn octets(&self) -> [u8; 6] {
        self.0
    }

    pub fn has_prefix(&self, prefix: &VendorPrefix) -> bool {
        self.0[..3] == prefix.0
    }

    pub fn matches_any(&self, prefixes: &[VendorPrefix]) -> bool {
        prefixes.iter().any(|p| self.has_prefix(p))
    }
}

/// Accepts `1c:0f:af:01:02:03`, `1C-0F-AF-01-02-03` and the separator-less
/// `1C0FAF010203` some vendor tools print.
impl FromStr for MacAddr {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let octets = parse_octets(s, 6).ok_or_else(|| format!("Invalid MAC address: {}", s))?;
        let mut out = [0u8; 6];
        out.copy_from_slice(&octets);
        Ok(Self(out))
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let o = self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            o[0], o[1], o[2], o[3], o[4], o[5]
        )
    }
}

impl TryFrom<String> for MacAddr {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<MacAddr> for String {
    fn from(mac: MacAddr) -> Self {
        mac.to_string()
    }
}

/// Organizationally unique identifier: the first three octets of a MAC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VendorPrefix([u8; 3]);

impl FromStr for VendorPrefix {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let octets =
            parse_octets(s, 3).ok_or_else(|| format!("Invalid vendor prefix: {}", s))?;
        Ok(Self([octets[0], octets[1], octets[2]]))
    }
}

impl fmt::Display for VendorPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02X}:{:02X}:{:02X}", self.0[0], self.0[1], self.0[2])
    }
}

impl TryFrom<String> for VendorPrefix {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<VendorPrefix> for String {
    fn from(prefix: VendorPrefix) -> Self {
        prefix.to_string()
    }
}

fn parse_octets(s: &str, count: usize) -> Option<Vec<u8>> {
    let s = s.trim();
    let groups: Vec<&str> = if s.contains(':') {
        s.split(':').collect()
    } else if s.contains('-') {
        s.split('-').collect()
    } else {
        if s.len() != count * 2 || !s.is_ascii() {
            return None;
        }
        (0..count).map(|i| &s[i * 2..i * 2 + 2]).collect()
    };

    if groups.len() != count {
        return None;
    }
    groups
        .iter()
        .map(|g| {
            if g.len() == 2 {
                u8::from_str_radix(g, 16).ok()
            } else {
                None
            }
        })
        .collect()
}
