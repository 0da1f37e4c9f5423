//! In-memory reader for IPv6-capable IP2Location BIN databases
//!
//! Only the short country code is resolved. Rows are sorted by their
//! starting address; a row covers `[from(row), from(row + 1))`.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::path::Path;

use super::header::{DbHeader, DbVersion};
use crate::error::{Error, Result};

/// Country resolution for a single address
#[cfg_attr(test, mockall::automock)]
pub trait CountryLookup: Send + Sync {
    /// Two-letter country code for `ip`
    fn lookup_country(&self, ip: IpAddr) -> Result<String>;
}

/// Byte offset of the country pointer inside a row, after the start address
const V4_FIRST_COLUMN: u64 = 4;
const V6_FIRST_COLUMN: u64 = 16;

/// Opened database
pub struct Ip2LocationReader {
    data: Vec<u8>,
    header: DbHeader,
}

impl std::fmt::Debug for Ip2LocationReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ip2LocationReader")
            .field("size", &self.data.len())
            .field("header", &self.header)
            .finish()
    }
}

impl Ip2LocationReader {
    /// Read a database file fully into memory
    pub fn open(path: &Path) -> Result<Self> {
        let data = std::fs::read(path)?;
        Self::from_bytes(data, path)
    }

    /// Wrap database bytes; `path` is only used in errors
    pub fn from_bytes(data: Vec<u8>, path: &Path) -> Result<Self> {
        let header = DbHeader::parse(&data, path)?;
        Ok(Self { data, header })
    }

    /// Parsed header
    pub fn header(&self) -> &DbHeader {
        &self.header
    }

    /// Release date
    pub fn version(&self) -> DbVersion {
        self.header.version
    }

    /// Bytes read while looking up `ip`; out of range reads fail that lookup
    fn slice(&self, offset: u64, len: usize, ip: IpAddr) -> Result<&[u8]> {
        usize::try_from(offset)
            .ok()
            .and_then(|start| self.data.get(start..start.checked_add(len)?))
            .ok_or_else(|| Error::lookup(ip, format!("read past end of database at offset {offset}")))
    }

    /// Little-endian u32 at a 1-based position
    fn u32_at(&self, pos: u64, ip: IpAddr) -> Result<u32> {
        let b = self.slice(pos.saturating_sub(1), 4, ip)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Little-endian u128 at a 1-based position
    fn u128_at(&self, pos: u64, ip: IpAddr) -> Result<u128> {
        let b = self.slice(pos.saturating_sub(1), 16, ip)?;
        let mut buf = [0u8; 16];
        buf.copy_from_slice(b);
        Ok(u128::from_le_bytes(buf))
    }

    /// Length-prefixed string at a 0-based position
    fn str_at(&self, pos: u32, ip: IpAddr) -> Result<String> {
        let len = self.slice(u64::from(pos), 1, ip)?[0] as usize;
        let b = self.slice(u64::from(pos) + 1, len, ip)?;
        Ok(String::from_utf8_lossy(b).into_owned())
    }

    fn lookup_v4(&self, ip: Ipv4Addr) -> Result<String> {
        let h = &self.header;
        let addr = IpAddr::from(ip);
        let width = u64::from(h.ipv4_row_width());
        let ipno = u32::from(ip).min(u32::MAX - 1);

        let (mut low, mut high) = if h.ipv4_index_base > 0 {
            let at = u64::from(h.ipv4_index_base) + (u64::from(ipno >> 16) << 3);
            (self.u32_at(at, addr)?, self.u32_at(at + 4, addr)?)
        } else {
            (0, h.ipv4_count)
        };

        while low <= high {
            let mid = low + (high - low) / 2;
            let row = u64::from(h.ipv4_base) + u64::from(mid) * width;
            let from = self.u32_at(row, addr)?;
            let to = self.u32_at(row + width, addr)?;

            if ipno >= from && ipno < to {
                let pointer = self.u32_at(row + V4_FIRST_COLUMN, addr)?;
                return self.str_at(pointer, addr);
            }
            if ipno < from {
                if mid == 0 {
                    break;
                }
                high = mid - 1;
            } else {
                low = mid + 1;
            }
        }

        Err(Error::lookup(ip, "address not covered by database"))
    }

    fn lookup_v6(&self, ip: Ipv6Addr) -> Result<String> {
        let h = &self.header;
        let addr = IpAddr::from(ip);
        if h.ipv6_count == 0 {
            return Err(Error::lookup(ip, "database has no IPv6 table"));
        }
        let width = u64::from(h.ipv6_row_width());
        let ipno = u128::from(ip).min(u128::MAX - 1);

        let (mut low, mut high) = if h.ipv6_index_base > 0 {
            let at = u64::from(h.ipv6_index_base) + (((ipno >> 112) as u64) << 3);
            (self.u32_at(at, addr)?, self.u32_at(at + 4, addr)?)
        } else {
            (0, h.ipv6_count)
        };

        while low <= high {
            let mid = low + (high - low) / 2;
            let row = u64::from(h.ipv6_base) + u64::from(mid) * width;
            let from = self.u128_at(row, addr)?;
            let to = self.u128_at(row + width, addr)?;

            if ipno >= from && ipno < to {
                let pointer = self.u32_at(row + V6_FIRST_COLUMN, addr)?;
                return self.str_at(pointer, addr);
            }
            if ipno < from {
                if mid == 0 {
                    break;
                }
                high = mid - 1;
            } else {
                low = mid + 1;
            }
        }

        Err(Error::lookup(ip, "address not covered by database"))
    }
}

/// IPv4 address embedded in a 6to4 or Teredo address
fn embedded_v4(ip: Ipv6Addr) -> Option<Ipv4Addr> {
    let s = ip.segments();
    match (s[0], s[1]) {
        (0x2002, _) => Some(Ipv4Addr::new(
            (s[1] >> 8) as u8,
            s[1] as u8,
            (s[2] >> 8) as u8,
            s[2] as u8,
        )),
        (0x2001, 0x0000) => Some(Ipv4Addr::from(!((u32::from(s[6]) << 16) | u32::from(s[7])))),
        _ => None,
    }
}

impl CountryLookup for Ip2LocationReader {
    fn lookup_country(&self, ip: IpAddr) -> Result<String> {
        let country = match ip.to_canonical() {
            IpAddr::V4(v4) => self.lookup_v4(v4)?,
            IpAddr::V6(v6) => match embedded_v4(v6) {
                Some(v4) => self.lookup_v4(v4)?,
                None => self.lookup_v6(v6)?,
            },
        };

        if country.is_empty() || country.to_ascii_lowercase().starts_with("invalid") {
            return Err(Error::lookup(ip, format!("database returned '{country}'")));
        }
        Ok(country)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedded_v4() {
        let six_to_four: Ipv6Addr = "2002:0808:0808::1".parse().unwrap();
        assert_eq!(embedded_v4(six_to_four), Some(Ipv4Addr::new(8, 8, 8, 8)));

        let teredo: Ipv6Addr = "2001:0:4136:e378:8000:63bf:f7f7:f7f7".parse().unwrap();
        assert_eq!(embedded_v4(teredo), Some(Ipv4Addr::new(8, 8, 8, 8)));

        let plain: Ipv6Addr = "2001:db8::1".parse().unwrap();
        assert_eq!(embedded_v4(plain), None);
    }

    #[test]
    fn test_truncated_table_fails_the_lookup() {
        let mut data = vec![0u8; 512];
        data[0] = 1;
        data[1] = 2;
        data[2] = 24;
        data[3] = 1;
        data[4] = 1;
        data[29] = 1;
        // 100 IPv4 rows starting at position 513, none of them present
        data[5..9].copy_from_slice(&100u32.to_le_bytes());
        data[9..13].copy_from_slice(&513u32.to_le_bytes());
        let reader = Ip2LocationReader::from_bytes(data, Path::new("short.BIN")).unwrap();

        let ip: IpAddr = "8.8.8.8".parse().unwrap();
        let err = reader.lookup_country(ip).unwrap_err();
        assert!(matches!(err, Error::Lookup { ref ip, .. } if ip == "8.8.8.8"), "{err}");
    }

    #[test]
    fn test_rejects_short_file() {
        assert!(Ip2LocationReader::from_bytes(vec![1, 2, 3], Path::new("x.BIN")).is_err());
    }
}
