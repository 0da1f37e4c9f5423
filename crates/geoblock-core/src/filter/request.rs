//! Request view and client address extraction

use std::collections::HashSet;
use std::net::{IpAddr, SocketAddr};

/// Header name standing for the connection peer address
pub const REMOTE_ADDRESS: &str = "remoteAddress";

/// The parts of an HTTP request the filter reads
pub trait RequestView {
    /// First value of a header, if present and valid UTF-8
    fn header(&self, name: &str) -> Option<&str>;

    /// Request method
    fn method(&self) -> &str;

    /// Connection peer
    fn remote_addr(&self) -> Option<SocketAddr>;

    /// Requested host
    fn host(&self) -> Option<&str>;

    /// Request path
    fn path(&self) -> &str;
}

impl<B> RequestView for http::Request<B> {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers().get(name).and_then(|v| v.to_str().ok())
    }

    fn method(&self) -> &str {
        self.method().as_str()
    }

    /// Read from a `SocketAddr` request extension
    fn remote_addr(&self) -> Option<SocketAddr> {
        self.extensions().get::<SocketAddr>().copied()
    }

    fn host(&self) -> Option<&str> {
        self.uri().host().or_else(|| {
            self.headers()
                .get(http::header::HOST)
                .and_then(|v| v.to_str().ok())
        })
    }

    fn path(&self) -> &str {
        self.uri().path()
    }
}

/// Drop a port suffix from an address
///
/// Handles `1.2.3.4:80`, `[2001:db8::1]:443` and `[2001:db8::1]`; bare
/// IPv6 addresses are returned unchanged.
pub fn strip_port(value: &str) -> &str {
    let value = value.trim();
    if let Some(rest) = value.strip_prefix('[') {
        if let Some(end) = rest.find(']') {
            return &rest[..end];
        }
    }
    if value.parse::<IpAddr>().is_ok() {
        return value;
    }
    match value.rsplit_once(':') {
        Some((host, port)) if !host.contains(':') && port.bytes().all(|b| b.is_ascii_digit()) => host,
        _ => value,
    }
}

/// Client addresses from `headers`, in order and without duplicates
///
/// Header values are split on commas. [`REMOTE_ADDRESS`] yields the peer.
pub fn candidate_ips<R: RequestView + ?Sized>(req: &R, headers: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut ips = Vec::new();

    let mut push = |raw: &str| {
        let ip = strip_port(raw);
        if !ip.is_empty() && seen.insert(ip.to_string()) {
            ips.push(ip.to_string());
        }
    };

    for name in headers {
        if name.eq_ignore_ascii_case(REMOTE_ADDRESS) {
            if let Some(peer) = req.remote_addr() {
                push(&peer.ip().to_string());
            }
            continue;
        }
        if let Some(value) = req.header(name) {
            value.split(',').for_each(&mut push);
        }
    }

    ips
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(headers: &[(&str, &str)], peer: Option<&str>) -> http::Request<()> {
        let mut builder = http::Request::builder().uri("http://example.com/admin");
        for (k, v) in headers {
            builder = builder.header(*k, *v);
        }
        let mut req = builder.body(()).unwrap();
        if let Some(peer) = peer {
            req.extensions_mut().insert(peer.parse::<SocketAddr>().unwrap());
        }
        req
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_strip_port() {
        assert_eq!(strip_port(" 1.2.3.4:8080 "), "1.2.3.4");
        assert_eq!(strip_port("1.2.3.4"), "1.2.3.4");
        assert_eq!(strip_port("[2001:db8::1]:443"), "2001:db8::1");
        assert_eq!(strip_port("[2001:db8::1]"), "2001:db8::1");
        assert_eq!(strip_port("2001:db8::1"), "2001:db8::1");
        assert_eq!(strip_port("garbage"), "garbage");
    }

    #[test]
    fn test_header_order_and_dedup() {
        let req = request(
            &[
                ("x-forwarded-for", "8.8.8.8, 1.1.1.1:443,8.8.8.8"),
                ("x-real-ip", "1.1.1.1"),
            ],
            None,
        );
        let ips = candidate_ips(&req, &names(&["x-forwarded-for", "x-real-ip"]));
        assert_eq!(ips, vec!["8.8.8.8", "1.1.1.1"]);
    }

    #[test]
    fn test_remote_address_header() {
        let req = request(&[("x-real-ip", "9.9.9.9")], Some("[2001:db8::5]:51000"));
        let ips = candidate_ips(&req, &names(&["remoteAddress", "x-real-ip"]));
        assert_eq!(ips, vec!["2001:db8::5", "9.9.9.9"]);

        let no_peer = request(&[], None);
        assert!(candidate_ips(&no_peer, &names(&["remoteAddress"])).is_empty());
    }

    #[test]
    fn test_request_view_for_http() {
        let req = request(&[("host", "ignored.example")], Some("10.0.0.1:1234"));
        assert_eq!(RequestView::method(&req), "GET");
        assert_eq!(RequestView::host(&req), Some("example.com"));
        assert_eq!(RequestView::path(&req), "/admin");
        assert_eq!(
            RequestView::remote_addr(&req),
            Some("10.0.0.1:1234".parse().unwrap())
        );
    }
}
