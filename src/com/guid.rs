//! 128-bit interface and class identifiers

use std::fmt;
use std::str::FromStr;

/// GUID in its native in-memory layout
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(C)]
pub struct Guid {
    pub data1: u32,
    pub data2: u16,
    pub data3: u16,
    pub data4: [u8; 8],
}

impl Guid {
    #[inline]
    pub const fn zeroed() -> Self {
        Self {
            data1: 0,
            data2: 0,
            data3: 0,
            data4: [0; 8],
        }
    }

    /// Build from the canonical hex spelling read as one number,
    /// e.g. `0x00020400_0000_0000_C000_000000000046`
    #[inline]
    pub const fn from_u128(value: u128) -> Self {
        Self {
            data1: (value >> 96) as u32,
            data2: (value >> 80) as u16,
            data3: (value >> 64) as u16,
            data4: (value as u64).to_be_bytes(),
        }
    }

    #[inline]
    pub const fn to_u128(self) -> u128 {
        ((self.data1 as u128) << 96)
            | ((self.data2 as u128) << 80)
            | ((self.data3 as u128) << 64)
            | (u64::from_be_bytes(self.data4) as u128)
    }
}

impl fmt::Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let d = &self.data4;
        write!(
            f,
            "{:08X}-{:04X}-{:04X}-{:02X}{:02X}-{:02X}{:02X}{:02X}{:02X}{:02X}{:02X}",
            self.data1, self.data2, self.data3, d[0], d[1], d[2], d[3], d[4], d[5], d[6], d[7]
        )
    }
}

impl fmt::Debug for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{}}}", self)
    }
}

/// Malformed GUID text
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed GUID: {0}")]
pub struct ParseGuidError(pub String);

impl FromStr for Guid {
    type Err = ParseGuidError;

    /// Accepts `XXXXXXXX-XXXX-XXXX-XXXX-XXXXXXXXXXXX`, optionally braced
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseGuidError(s.to_string());
        let body = s
            .strip_prefix('{')
            .and_then(|rest| rest.strip_suffix('}'))
            .unwrap_or(s);

        let groups: Vec<&str> = body.split('-').collect();
        let lengths: Vec<usize> = groups.iter().map(|g| g.len()).collect();
        if lengths != [8, 4, 4, 4, 12] {
            return Err(err());
        }
        let hex: String = groups.concat();
        if !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(err());
        }
        u128::from_str_radix(&hex, 16)
            .map(Self::from_u128)
            .map_err(|_| err())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout() {
        assert_eq!(core::mem::size_of::<Guid>(), 16);
        let g = Guid::from_u128(0x00020400_0000_0000_C000_000000000046);
        assert_eq!(g.data1, 0x00020400);
        assert_eq!(g.data4, [0xC0, 0, 0, 0, 0, 0, 0, 0x46]);
        assert_eq!(g.to_u128(), 0x00020400_0000_0000_C000_000000000046);
    }

    #[test]
    fn test_display_and_parse() {
        let g = Guid::from_u128(0x6f15aaf2_d208_4e89_9ab4_489535d34f9c);
        let text = g.to_string();
        assert_eq!(text, "6F15AAF2-D208-4E89-9AB4-489535D34F9C");
        assert_eq!(text.parse::<Guid>().unwrap(), g);
        assert_eq!(format!("{{{}}}", text).parse::<Guid>().unwrap(), g);
        assert!("not-a-guid".parse::<Guid>().is_err());
        assert!("6F15AAF2-D208-4E89-9AB4-489535D34F9".parse::<Guid>().is_err());
    }
}
