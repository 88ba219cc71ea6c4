//! Capture predicate construction.
//!
//! The predicate admits TCP and UDP packets except those to or from loopback
//! and the detected VPN addresses. It renders to the WinDivert filter language
//! and can also be evaluated in-process.

use std::collections::BTreeSet;
use std::fmt;
use std::net::Ipv4Addr;

use crate::core::state::Direction;

/// Transport protocol of a packet as seen by the predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Tcp,
    Udp,
    Other(u8),
}

/// Capture predicate. Excluded addresses are kept sorted and deduplicated,
/// so equal VPN sets always render the same filter text.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CaptureFilter {
    excluded: BTreeSet<Ipv4Addr>,
}

/// Build the predicate for the given VPN addresses. Loopback is always excluded.
pub fn build_filter<'a>(vpn_addresses: impl IntoIterator<Item = &'a Ipv4Addr>) -> CaptureFilter {
    CaptureFilter {
        excluded: vpn_addresses
            .into_iter()
            .copied()
            .filter(|addr| *addr != Ipv4Addr::LOCALHOST)
            .collect(),
    }
}

impl CaptureFilter {
    /// VPN addresses excluded in addition to loopback.
    pub fn excluded(&self) -> &BTreeSet<Ipv4Addr> {
        &self.excluded
    }

    /// Evaluate the predicate against a packet's protocol and addresses.
    pub fn admits(&self, protocol: Protocol, src: Ipv4Addr, dst: Ipv4Addr) -> bool {
        if !matches!(protocol, Protocol::Tcp | Protocol::Udp) {
            return false;
        }
        let excluded = |addr: Ipv4Addr| addr == Ipv4Addr::LOCALHOST || self.excluded.contains(&addr);
        !excluded(src) && !excluded(dst)
    }

    /// WinDivert filter for one pipeline: the predicate restricted to `direction`.
    pub fn for_direction(&self, direction: Direction) -> String {
        let layer = match direction {
            Direction::Inbound => "inbound",
            Direction::Outbound => "outbound",
        };
        format!("{layer} and ({self})")
    }
}

impl fmt::Display for CaptureFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let loopback = Ipv4Addr::LOCALHOST;
        write!(
            f,
            "(tcp or udp) and ip.SrcAddr != {loopback} and ip.DstAddr != {loopback}"
        )?;
        for addr in &self.excluded {
            write!(f, " and ip.SrcAddr != {addr} and ip.DstAddr != {addr}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VPN: Ipv4Addr = Ipv4Addr::new(10, 8, 0, 2);
    const LAN: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 5);
    const REMOTE: Ipv4Addr = Ipv4Addr::new(93, 184, 216, 34);
    const NONE: [Ipv4Addr; 0] = [];

    #[test]
    fn test_filter_rejects_vpn_address_either_side() {
        let filter = build_filter(&[VPN]);
        assert!(!filter.admits(Protocol::Tcp, VPN, REMOTE));
        assert!(!filter.admits(Protocol::Udp, REMOTE, VPN));
        assert!(filter.admits(Protocol::Tcp, LAN, REMOTE));
    }

    #[test]
    fn test_filter_always_rejects_loopback() {
        for filter in [build_filter(&NONE), build_filter(&[VPN])] {
            assert!(!filter.admits(Protocol::Tcp, Ipv4Addr::LOCALHOST, REMOTE));
            assert!(!filter.admits(Protocol::Udp, LAN, Ipv4Addr::LOCALHOST));
        }
    }

    #[test]
    fn test_filter_rejects_other_protocols() {
        let filter = build_filter(&NONE);
        assert!(!filter.admits(Protocol::Other(1), LAN, REMOTE));
    }

    #[test]
    fn test_empty_set_renders_base_filter() {
        assert_eq!(
            build_filter(&NONE).to_string(),
            "(tcp or udp) and ip.SrcAddr != 127.0.0.1 and ip.DstAddr != 127.0.0.1"
        );
    }

    #[test]
    fn test_render_includes_each_vpn_address_once() {
        let filter = build_filter(&[VPN, VPN, Ipv4Addr::new(10, 14, 0, 2)]);
        let text = filter.to_string();
        assert_eq!(text.matches("ip.SrcAddr != 10.8.0.2").count(), 1);
        assert_eq!(text.matches("ip.DstAddr != 10.8.0.2").count(), 1);
        assert_eq!(text.matches("10.14.0.2").count(), 2);
        assert_eq!(filter.excluded().len(), 2);
    }

    #[test]
    fn test_equal_sets_render_identically() {
        let a = build_filter(&[VPN, LAN]);
        let b = build_filter(&[LAN, VPN]);
        assert_eq!(a, b);
        assert_eq!(a.to_string(), b.to_string());
    }

    #[test]
    fn test_direction_prefix() {
        let filter = build_filter(&NONE);
        assert!(filter.for_direction(Direction::Outbound).starts_with("outbound and ((tcp or udp)"));
        assert!(filter.for_direction(Direction::Inbound).starts_with("inbound and ("));
        assert!(filter.for_direction(Direction::Inbound).ends_with(')'));
    }
}
