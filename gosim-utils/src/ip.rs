//
// Copyright (c) The Gosim Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::Ipv4Addr;

// Extension methods for Ipv4Addr.
pub trait Ipv4AddrExt {
    const LENGTH: usize;

    // Returns true if this is an usable address.
    fn is_usable(&self) -> bool;

    // Returns a stable hash identifying the traffic flowing from this address
    // to the given destination.
    fn fec_hash(&self, destination: &Ipv4Addr) -> u32;

    // Returns the GoS flow identifier of the traffic originated from this
    // address.
    fn flow_id(&self) -> u32;
}

// ===== impl Ipv4Addr =====

impl Ipv4AddrExt for Ipv4Addr {
    const LENGTH: usize = 4;

    fn is_usable(&self) -> bool {
        !(self.is_broadcast()
            || self.is_multicast()
            || self.is_unspecified()
            || self.is_loopback())
    }

    fn fec_hash(&self, destination: &Ipv4Addr) -> u32 {
        // 32-bit FNV-1a over both addresses.
        const OFFSET_BASIS: u32 = 0x811c9dc5;
        const PRIME: u32 = 0x01000193;

        self.octets()
            .iter()
            .chain(destination.octets().iter())
            .fold(OFFSET_BASIS, |hash, byte| {
                (hash ^ u32::from(*byte)).wrapping_mul(PRIME)
            })
    }

    fn flow_id(&self) -> u32 {
        u32::from(*self)
    }
}
