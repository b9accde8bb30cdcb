use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use anyhow::bail;
use network_interface::NetworkInterface;

/// Picks the address of ours that the gateway at `local_dest` should forward traffic to.
pub fn get_local_ip_relative_to(
    local_dest: SocketAddr,
    interfaces: &[NetworkInterface],
) -> anyhow::Result<IpAddr> {
    fn masked_v4(ip: Ipv4Addr, mask: Ipv4Addr) -> u32 {
        ip.to_bits() & mask.to_bits()
    }

    fn masked_v6(ip: Ipv6Addr, mask: Ipv6Addr) -> u128 {
        ip.to_bits() & mask.to_bits()
    }

    for i in interfaces {
        for addr in i.addr.iter() {
            match (local_dest, addr.ip(), addr.netmask()) {
                // The gateway runs on this host.
                (l, a, _) if l.ip() == a => return Ok(addr.ip()),
                (SocketAddr::V4(l), IpAddr::V4(a), Some(IpAddr::V4(m)))
                    if masked_v4(*l.ip(), m) == masked_v4(a, m) =>
                {
                    return Ok(addr.ip());
                }
                // Link-local gateways are only reachable through the interface they answered on.
                (SocketAddr::V6(l), IpAddr::V6(a), _)
                    if l.ip().is_unicast_link_local() && l.scope_id() > 0 =>
                {
                    if a.is_unicast_link_local() && l.scope_id() == i.index {
                        return Ok(addr.ip());
                    }
                }
                (SocketAddr::V6(l), IpAddr::V6(a), Some(IpAddr::V6(m)))
                    if masked_v6(*l.ip(), m) == masked_v6(a, m) =>
                {
                    return Ok(addr.ip());
                }
                (SocketAddr::V6(_), IpAddr::V6(_), None) => return Ok(addr.ip()),
                _ => continue,
            }
        }
    }
    bail!("couldn't find a local ip address")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn iface(index: u32, ip: Ipv4Addr, netmask: Ipv4Addr) -> NetworkInterface {
        NetworkInterface::new_afinet(
            &format!("eth{index}"),
            ip,
            Some(netmask),
            None,
            index,
            false,
        )
    }

    #[test]
    fn test_picks_interface_on_gateway_subnet() {
        let nics = [
            iface(1, Ipv4Addr::new(10, 8, 0, 5), Ipv4Addr::new(255, 255, 255, 0)),
            iface(2, Ipv4Addr::new(192, 168, 1, 23), Ipv4Addr::new(255, 255, 255, 0)),
        ];
        let ip = get_local_ip_relative_to("192.168.1.1:1900".parse().unwrap(), &nics).unwrap();
        assert_eq!(ip, IpAddr::V4(Ipv4Addr::new(192, 168, 1, 23)));
    }

    #[test]
    fn test_no_matching_interface() {
        let nics = [iface(
            1,
            Ipv4Addr::new(10, 8, 0, 5),
            Ipv4Addr::new(255, 255, 255, 0),
        )];
        assert!(get_local_ip_relative_to("192.168.1.1:1900".parse().unwrap(), &nics).is_err());
    }
}
