// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Socket handles. A handle is a lightweight, move-only value: it names a
//! hardware socket slot, not a borrow of the driver. Every I/O method takes
//! the driver explicitly (`socket.read(&mut driver, ...)`), so a protocol
//! client can hold both a driver reference and a handle at once without
//! fighting the borrow checker the way a self-referential "socket owns a
//! reference to its driver" design would.
//!
//! Exclusivity is enforced by the driver's slot bitset: [`W5500::reset`]
//! starts with every slot free, and opening a socket marks its slot in use
//! until the handle is explicitly closed. A second `open()` on an in-use
//! slot returns [`Error::BadSocketIndex`].

mod tcp;
mod udp;

pub use tcp::TcpSocket;
pub use udp::UdpSocket;

use crate::driver::MAX_SOCKETS;
use crate::error::Error;

/// A validated hardware socket slot, `0..8`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SocketIndex(u8);

impl SocketIndex {
    pub fn new(n: u8) -> Result<Self, Error> {
        if (n as usize) < MAX_SOCKETS {
            Ok(Self(n))
        } else {
            Err(Error::BadSocketIndex)
        }
    }

    pub fn value(self) -> u8 {
        self.0
    }
}
