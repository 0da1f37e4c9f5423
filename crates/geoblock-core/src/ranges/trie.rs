//! Binary prefix trie over the 128-bit address space
//!
//! IPv4 networks are stored under the `::ffff:0:0/96` branch, so IPv4 and
//! IPv6 entries share one tree. Lookups only walk as deep as the address
//! family allows and only report endpoints of the same family.

use ipnet::IpNet;
use std::net::IpAddr;

use crate::error::{Error, Result};

/// Depth at which IPv4 prefixes start inside the mapped space
const V4_OFFSET: u8 = 96;

#[derive(Debug, Default)]
struct Node {
    children: [Option<Box<Node>>; 2],
    /// Set when an inserted network terminates exactly here
    prefix_len: Option<u8>,
}

/// Longest-prefix-match trie for IPv4 and IPv6 networks
#[derive(Debug, Default)]
pub struct PrefixTrie {
    root: Node,
    len: usize,
}

/// Address bits plus the depth at which its family starts
fn key(ip: IpAddr) -> (u128, u8) {
    match ip.to_canonical() {
        IpAddr::V4(v4) => (u128::from(v4.to_ipv6_mapped()), V4_OFFSET),
        IpAddr::V6(v6) => (u128::from(v6), 0),
    }
}

#[inline]
fn bit(bits: u128, depth: u8) -> usize {
    ((bits >> (127 - u32::from(depth))) & 1) as usize
}

/// Parse a CIDR, accepting a bare address as a host route
pub fn parse_cidr(s: &str) -> Result<IpNet> {
    let s = s.trim();
    if let Ok(net) = s.parse::<IpNet>() {
        return Ok(net.trunc());
    }
    s.parse::<IpAddr>()
        .map(IpNet::from)
        .map_err(|_| Error::InvalidCidr { cidr: s.to_string() })
}

/// Fold `::ffff:a.b.c.d/n` (n >= 96) back into its IPv4 form
fn canonical_net(net: IpNet) -> IpNet {
    match net {
        IpNet::V6(v6) if v6.prefix_len() >= V4_OFFSET => match v6.addr().to_ipv4_mapped() {
            Some(v4) => ipnet::Ipv4Net::new(v4, v6.prefix_len() - V4_OFFSET)
                .map(IpNet::V4)
                .unwrap_or(net),
            None => net,
        },
        other => other,
    }
}

impl PrefixTrie {
    /// Create an empty trie
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a network
    pub fn insert(&mut self, net: IpNet) {
        let net = canonical_net(net.trunc());
        let (bits, offset) = key(net.network());
        let depth = offset + net.prefix_len();

        let mut node = &mut self.root;
        for d in 0..depth {
            node = node.children[bit(bits, d)].get_or_insert_with(Box::default);
        }

        if node.prefix_len.is_none() {
            self.len += 1;
        }
        node.prefix_len = Some(net.prefix_len());
    }

    /// Parse and insert a CIDR string
    pub fn insert_str(&mut self, cidr: &str) -> Result<()> {
        self.insert(parse_cidr(cidr)?);
        Ok(())
    }

    /// Most specific prefix length among inserted networks containing `ip`
    pub fn longest_match(&self, ip: IpAddr) -> Option<u8> {
        let (bits, offset) = key(ip);
        let mut best = None;
        let mut node = &self.root;
        let mut depth: u8 = 0;

        loop {
            if depth >= offset {
                if let Some(len) = node.prefix_len {
                    best = Some(len);
                }
            }
            if depth == 128 {
                break;
            }
            match node.children[bit(bits, depth)].as_deref() {
                Some(child) => node = child,
                None => break,
            }
            depth += 1;
        }

        best
    }

    /// Whether any inserted network contains `ip`
    pub fn contains(&self, ip: IpAddr) -> bool {
        self.longest_match(ip).is_some()
    }

    /// Number of distinct networks inserted
    pub fn len(&self) -> usize {
        self.len
    }

    /// Check if the trie is empty
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}
