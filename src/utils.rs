use crate::common::{box_error::BoxError, multicast_sock::ALLES_PORT};
use simple_error::bail;
use std::net::{IpAddr, Ipv4Addr, SocketAddrV4, UdpSocket};

// utility functions

/// Figure out which local interface the OS would use to reach `target`.
///
/// Connecting a UDP socket sends nothing, it just asks the routing table,
/// so this is safe to call before the real session is set up.
pub fn get_local_ip(target: Ipv4Addr) -> Result<Ipv4Addr, BoxError> {
    let probe = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?;
    probe.connect(SocketAddrV4::new(target, ALLES_PORT))?;
    let local = probe.local_addr()?.ip();
    if let IpAddr::V4(ip) = local {
        if !ip.is_unspecified() {
            return Ok(ip);
        }
    }
    bail!("no usable local address for {} (got {})", target, local);
}

#[cfg(test)]
mod test_utils {
    use super::*;

    #[test]
    fn loopback_routes_to_loopback() {
        let ip = get_local_ip(Ipv4Addr::LOCALHOST).unwrap();
        assert!(ip.is_loopback());
    }
}
