//! The set of IPv4 addresses kept out of interception because they belong
//! to VPN or tunnel adapters.

use std::collections::BTreeSet;
use std::net::Ipv4Addr;

use serde::Serialize;

/// How detection results are folded into the set each cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VpnTracking {
    /// Union every cycle; an address once seen stays excluded for the process lifetime.
    #[default]
    Accumulate,
    /// Replace with the latest detection result; a tunnel that goes away is intercepted again.
    Snapshot,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VpnAddressSet {
    addresses: BTreeSet<Ipv4Addr>,
    tracking: VpnTracking,
}

impl VpnAddressSet {
    pub fn new(tracking: VpnTracking) -> Self {
        Self {
            addresses: BTreeSet::new(),
            tracking,
        }
    }

    /// Fold one detection pass into the set. Returns `true` if the set changed.
    pub fn update(&mut self, detected: BTreeSet<Ipv4Addr>) -> bool {
        match self.tracking {
            VpnTracking::Accumulate => {
                let before = self.addresses.len();
                self.addresses.extend(detected);
                self.addresses.len() != before
            }
            VpnTracking::Snapshot => {
                if self.addresses == detected {
                    false
                } else {
                    self.addresses = detected;
                    true
                }
            }
        }
    }

    pub fn addresses(&self) -> &BTreeSet<Ipv4Addr> {
        &self.addresses
    }

    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }

    pub fn tracking(&self) -> VpnTracking {
        self.tracking
    }
}
