//! Fixed 512-byte database header

use chrono::NaiveDate;
use std::fmt;
use std::io::Read;
use std::path::Path;

use crate::error::{Error, Result};

/// Size of the header block at the start of every database file
pub const HEADER_LEN: usize = 512;

/// Parsed database header
///
/// Base and index addresses are 1-based file offsets, as stored on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DbHeader {
    /// Database type, stored on disk plus one
    pub db_type: u8,
    /// Number of 4-byte columns per IPv4 row
    pub columns: u8,
    /// Release date
    pub version: DbVersion,
    /// Rows in the IPv4 table
    pub ipv4_count: u32,
    /// Start of the IPv4 table
    pub ipv4_base: u32,
    /// Rows in the IPv6 table
    pub ipv6_count: u32,
    /// Start of the IPv6 table
    pub ipv6_base: u32,
    /// Start of the IPv4 /16 index, zero when absent
    pub ipv4_index_base: u32,
    /// Start of the IPv6 index, zero when absent
    pub ipv6_index_base: u32,
    /// Product code, never zero in a valid file
    pub product_code: u8,
    /// License code
    pub license_code: u8,
    /// Database size class
    pub database_size: u8,
}

/// Release date embedded in a database header
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DbVersion {
    /// Full year
    pub year: u16,
    /// Month, 1-12
    pub month: u8,
    /// Day of month
    pub day: u8,
}

impl DbVersion {
    /// Calendar date, `None` when the header holds an impossible date
    pub fn date(&self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(i32::from(self.year), u32::from(self.month), u32::from(self.day))
    }

    /// Days between the release date and `today`
    pub fn age_days(&self, today: NaiveDate) -> Option<i64> {
        self.date().map(|d| (today - d).num_days())
    }
}

impl fmt::Display for DbVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.year, self.month, self.day)
    }
}

fn le_u32(b: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([b[at], b[at + 1], b[at + 2], b[at + 3]])
}

impl DbHeader {
    /// Parse the header block; `path` is only used in errors
    pub fn parse(bytes: &[u8], path: &Path) -> Result<Self> {
        if bytes.len() < HEADER_LEN {
            return Err(Error::invalid_header(
                path,
                format!("incomplete header: got {} bytes, expected {HEADER_LEN}", bytes.len()),
            ));
        }

        let header = Self {
            db_type: bytes[0].wrapping_sub(1),
            columns: bytes[1],
            version: DbVersion {
                year: 2000 + u16::from(bytes[2]),
                month: bytes[3],
                day: bytes[4],
            },
            ipv4_count: le_u32(bytes, 5),
            ipv4_base: le_u32(bytes, 9),
            ipv6_count: le_u32(bytes, 13),
            ipv6_base: le_u32(bytes, 17),
            ipv4_index_base: le_u32(bytes, 21),
            ipv6_index_base: le_u32(bytes, 25),
            product_code: bytes[29],
            license_code: bytes[30],
            database_size: bytes[31],
        };

        if header.product_code == 0 {
            return Err(Error::invalid_header(path, "product code is zero"));
        }
        Ok(header)
    }

    /// Width in bytes of an IPv4 row
    pub fn ipv4_row_width(&self) -> u32 {
        u32::from(self.columns) * 4
    }

    /// Width in bytes of an IPv6 row
    pub fn ipv6_row_width(&self) -> u32 {
        16 + u32::from(self.columns.saturating_sub(1)) * 4
    }
}

/// Read and parse the header of a database file
pub fn read_header(path: &Path) -> Result<DbHeader> {
    let file = std::fs::File::open(path)?;
    let mut buf = Vec::with_capacity(HEADER_LEN);
    file.take(HEADER_LEN as u64).read_to_end(&mut buf)?;
    DbHeader::parse(&buf, path)
}

/// Release date of a database file
pub fn read_version(path: &Path) -> Result<DbVersion> {
    read_header(path).map(|h| h.version)
}
