//! Universal addresses (RFC 5665): the textual `host.p1.p2` form rpcbind
//! uses to publish transport addresses, where `p1`/`p2` are the high and low
//! bytes of the port.

use std::net::{IpAddr, SocketAddr};

/// Formats `addr` as a universal address, e.g. `127.0.0.1.8.1` for port 2049.
pub fn taddr2uaddr(addr: &SocketAddr) -> String {
    let port = addr.port();
    format!("{}.{}.{}", addr.ip(), port >> 8, port & 0xff)
}

/// Parses a universal address back into a socket address.
pub fn uaddr2taddr(uaddr: &str) -> Option<SocketAddr> {
    let (rest, low) = uaddr.rsplit_once('.')?;
    let (host, high) = rest.rsplit_once('.')?;
    let high = high.parse::<u8>().ok()?;
    let low = low.parse::<u8>().ok()?;
    let ip = host.parse::<IpAddr>().ok()?;
    Some(SocketAddr::new(ip, (u16::from(high) << 8) | u16::from(low)))
}
