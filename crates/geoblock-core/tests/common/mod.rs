//! Shared fixtures: tiny country databases in the on-disk BIN layout

#![allow(dead_code)]

use chrono::{Datelike, NaiveDate, Utc};
use std::collections::BTreeMap;
use std::io::{BufRead, BufReader, Write};
use std::net::{Ipv4Addr, Ipv6Addr, TcpListener};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

const HEADER_LEN: usize = 512;
const V4_WIDTH: usize = 8;
const V6_WIDTH: usize = 20;
const GAP: &str = "-";

/// Builder for a two-column (address, country) database
#[derive(Debug, Clone)]
pub struct DbBuilder {
    date: NaiveDate,
    v4: Vec<(u32, u32, String)>,
    v6: Vec<(u128, u128, String)>,
    v4_index: bool,
}

impl DbBuilder {
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date,
            v4: Vec::new(),
            v6: Vec::new(),
            v4_index: false,
        }
    }

    /// Inclusive IPv4 range
    pub fn v4(mut self, from: &str, to: &str, country: &str) -> Self {
        let from: Ipv4Addr = from.parse().unwrap();
        let to: Ipv4Addr = to.parse().unwrap();
        self.v4.push((from.into(), to.into(), country.to_string()));
        self
    }

    /// Inclusive IPv6 range
    pub fn v6(mut self, from: &str, to: &str, country: &str) -> Self {
        let from: Ipv6Addr = from.parse().unwrap();
        let to: Ipv6Addr = to.parse().unwrap();
        self.v6.push((from.into(), to.into(), country.to_string()));
        self
    }

    /// Emit the IPv4 /16 index
    pub fn with_index(mut self) -> Self {
        self.v4_index = true;
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut v4 = self.v4.clone();
        v4.sort_by_key(|r| r.0);
        let mut v6 = self.v6.clone();
        v6.sort_by_key(|r| r.0);

        let v4_rows = fill_gaps(
            v4.iter().map(|(f, t, c)| (u128::from(*f), u128::from(*t), c.clone())),
            u128::from(u32::MAX),
        );
        let v6_rows = if v6.is_empty() {
            Vec::new()
        } else {
            fill_gaps(v6.into_iter(), u128::MAX)
        };

        // country strings, each stored once
        let mut strings: BTreeMap<String, u32> = BTreeMap::new();
        let mut pool = Vec::new();
        for (_, country) in v4_rows.iter().chain(v6_rows.iter()) {
            if !strings.contains_key(country) {
                let offset = u32::try_from(HEADER_LEN + pool.len()).unwrap();
                strings.insert(country.clone(), offset);
                pool.push(u8::try_from(country.len()).unwrap());
                pool.extend_from_slice(country.as_bytes());
            }
        }

        let v4_offset = HEADER_LEN + pool.len();
        let v6_offset = v4_offset + v4_rows.len() * V4_WIDTH;
        let index_offset = v6_offset + v6_rows.len() * V6_WIDTH;

        let mut data = vec![0u8; HEADER_LEN];
        data.extend_from_slice(&pool);

        for (from, country) in &v4_rows {
            data.extend_from_slice(&u32::try_from(*from).unwrap().to_le_bytes());
            data.extend_from_slice(&strings[country].to_le_bytes());
        }
        for (from, country) in &v6_rows {
            data.extend_from_slice(&from.to_le_bytes());
            data.extend_from_slice(&strings[country].to_le_bytes());
        }

        if self.v4_index {
            let starts: Vec<u32> = v4_rows
                .iter()
                .map(|(from, _)| u32::try_from(*from).unwrap())
                .collect();
            let row_of = |ip: u32| -> u32 {
                let at = starts.partition_point(|s| *s <= ip);
                u32::try_from(at.saturating_sub(1)).unwrap()
            };
            for bucket in 0u32..=0xffff {
                let low = row_of(bucket << 16);
                let high = row_of((bucket << 16) | 0xffff);
                data.extend_from_slice(&low.to_le_bytes());
                data.extend_from_slice(&high.to_le_bytes());
            }
        }

        // v4 count excludes the terminating row
        let v4_count = u32::try_from(v4_rows.len() - 1).unwrap();
        let v6_count = u32::try_from(v6_rows.len().saturating_sub(1)).unwrap();
        let base = |offset: usize| u32::try_from(offset + 1).unwrap();

        data[0] = 1;
        data[1] = 2;
        data[2] = u8::try_from(self.date.year() - 2000).unwrap();
        data[3] = u8::try_from(self.date.month()).unwrap();
        data[4] = u8::try_from(self.date.day()).unwrap();
        data[5..9].copy_from_slice(&v4_count.to_le_bytes());
        data[9..13].copy_from_slice(&base(v4_offset).to_le_bytes());
        data[13..17].copy_from_slice(&v6_count.to_le_bytes());
        let v6_base = if v6_rows.is_empty() { 0 } else { base(v6_offset) };
        data[17..21].copy_from_slice(&v6_base.to_le_bytes());
        let index_base = if self.v4_index { base(index_offset) } else { 0 };
        data[21..25].copy_from_slice(&index_base.to_le_bytes());
        data[29] = 1;
        data[30] = 1;
        data[31] = 1;
        data
    }

    pub fn write(&self, path: &Path) -> PathBuf {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, self.build()).unwrap();
        path.to_path_buf()
    }
}

/// Rows covering `0..=max`, unlisted space mapped to "-", plus a terminating row at `max`
fn fill_gaps(
    ranges: impl Iterator<Item = (u128, u128, String)>,
    max: u128,
) -> Vec<(u128, String)> {
    let mut rows = Vec::new();
    let mut cursor = 0u128;
    for (from, to, country) in ranges {
        if from > cursor {
            rows.push((cursor, GAP.to_string()));
        }
        rows.push((from, country));
        cursor = to + 1;
    }
    if cursor < max {
        rows.push((cursor, GAP.to_string()));
    }
    rows.push((max, GAP.to_string()));
    rows
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn today() -> NaiveDate {
    Utc::now().date_naive()
}

/// Database resolving 8.8.8.0/24 and 2001:4860::/32 to `country`
pub fn world(date: NaiveDate, country: &str) -> DbBuilder {
    DbBuilder::new(date)
        .v4("1.1.1.0", "1.1.1.255", "AU")
        .v4("8.8.8.0", "8.8.8.255", country)
        .v4("85.214.0.0", "85.214.255.255", "DE")
        .v4("203.0.113.0", "203.0.113.255", "INVALID IP ADDRESS")
        .v6("2001:4860::", "2001:4860:ffff:ffff:ffff:ffff:ffff:ffff", country)
        .v6("2a01:4f8::", "2a01:4f8:ffff:ffff:ffff:ffff:ffff:ffff", "DE")
}

/// Dated file name as written by the updater
pub fn dated_name(date: NaiveDate) -> String {
    format!("{}_IP2LOCATION-LITE-DB1.IPV6.BIN", date.format("%Y%m%d"))
}

/// Zip archive holding `entries` as (name, bytes)
pub fn write_zip(path: &Path, entries: &[(&str, Vec<u8>)]) {
    let file = std::fs::File::create(path).unwrap();
    let mut zip = zip::ZipWriter::new(file);
    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated);
    for (name, bytes) in entries {
        zip.start_file(*name, options).unwrap();
        zip.write_all(bytes).unwrap();
    }
    zip.finish().unwrap();
}

/// Files in `dir` whose name starts with `prefix`, empty when `dir` is missing
pub fn files_with_prefix(dir: &Path, prefix: &str) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    entries
        .flatten()
        .map(|e| e.path())
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(prefix))
        })
        .collect()
}

/// Local HTTP server answering every GET with `body`
///
/// Returns the URL to fetch and a counter of requests served.
pub fn serve(body: Vec<u8>) -> (String, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let url = format!("http://{}/IP2LOCATION-LITE-DB1.IPV6.BIN.ZIP", listener.local_addr().unwrap());
    let hits = Arc::new(AtomicUsize::new(0));
    let served = Arc::clone(&hits);

    thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(mut stream) = stream else { continue };
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            let mut line = String::new();
            while reader.read_line(&mut line).is_ok_and(|n| n > 0) && line != "\r\n" {
                line.clear();
            }
            served.fetch_add(1, Ordering::SeqCst);
            let head = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: application/zip\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                body.len()
            );
            let _ = stream.write_all(head.as_bytes()).and_then(|()| stream.write_all(&body));
        }
    });

    (url, hits)
}

/// Zip archive bytes holding one database entry
pub fn zipped_database(bytes: Vec<u8>) -> Vec<u8> {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("db.zip");
    write_zip(&path, &[("IP2LOCATION-LITE-DB1.IPV6.BIN", bytes)]);
    std::fs::read(path).unwrap()
}
