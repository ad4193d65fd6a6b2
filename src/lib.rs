// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Host-side driver and minimal network-application stack for the WIZnet
//! W5500 SPI Ethernet controller: a bank-selected register/socket engine plus
//! cooperative DHCP, DNS and SNTP client state machines built on top of it.
//!
//! The entire crate runs on one logical thread. Nothing here blocks on
//! network I/O; callers drive progress by calling `tick()` on each protocol
//! client from a main loop. See [`bus::Bus`] for the capability the caller
//! must supply (SPI transfer, chip select, millis clock, PRNG, logging).

#![cfg_attr(not(test), no_std)]

pub mod bus;
pub mod crc16;
pub mod dhcp;
pub mod dns;
pub mod driver;
pub mod error;
pub mod frame;
pub mod regs;
pub mod sntp;
pub mod socket;

pub use bus::Bus;
pub use driver::{BufferSize, SocketBufferPlan, W5500};
pub use error::Error;
pub use socket::{SocketIndex, TcpSocket, UdpSocket};
