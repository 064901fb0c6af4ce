//! Network address helpers

use std::net::IpAddr;

/// True for addresses that can never be geolocated externally: loopback,
/// RFC 1918 ranges, link-local, unspecified, and their IPv6 equivalents.
pub fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback() || v4.is_private() || v4.is_link_local() || v4.is_unspecified()
        }
        IpAddr::V6(v6) => {
            let segments = v6.segments();
            v6.is_loopback()
                || v6.is_unspecified()
                // fc00::/7 unique local
                || (segments[0] & 0xfe00) == 0xfc00
                // fe80::/10 link local
                || (segments[0] & 0xffc0) == 0xfe80
        }
    }
}

/// Parse an IP string and report whether it is private/internal.
pub fn is_private_ip_str(ip: &str) -> Option<bool> {
    ip.parse::<IpAddr>().ok().map(|addr| is_private_ip(&addr))
}
