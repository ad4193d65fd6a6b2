// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The SPI wire contract with the chip: a 3-byte address+control header,
//! `[addr_hi, addr_lo, control]`, followed by payload whose length is
//! delimited by chip-select duration (VDM mode). `control = bank<<3 |
//! rw<<2 | op_mode`, with `op_mode` always `0` (variable data length).

use zerocopy::{AsBytes, FromBytes, Unaligned};

const OP_MODE_VDM: u8 = 0x00;
const RW_WRITE: u8 = 1 << 2;
const RW_READ: u8 = 0 << 2;

/// The fixed 3-byte header preceding every SPI transaction's payload.
#[derive(Clone, Copy, AsBytes, FromBytes, Unaligned)]
#[repr(C)]
pub struct FrameHeader {
    addr_hi: u8,
    addr_lo: u8,
    control: u8,
}

impl FrameHeader {
    pub fn new(addr: u16, bank: u8, write: bool) -> Self {
        let rw_bit = if write { RW_WRITE } else { RW_READ };
        Self {
            addr_hi: (addr >> 8) as u8,
            addr_lo: addr as u8,
            control: (bank << 3) | rw_bit | OP_MODE_VDM,
        }
    }

    pub fn as_bytes(&self) -> &[u8; 3] {
        zerocopy::AsBytes::as_bytes(self)
            .try_into()
            .expect("FrameHeader is exactly 3 bytes")
    }
}

/// The 8-byte header the chip prepends to every UDP datagram it delivers
/// into a socket's RX ring: source IP, source port, and payload length, all
/// big-endian.
#[derive(Clone, Copy, AsBytes, FromBytes, Unaligned)]
#[repr(C)]
pub struct UdpRxHeader {
    pub src_ip: [u8; 4],
    src_port_be: [u8; 2],
    len_be: [u8; 2],
}

impl UdpRxHeader {
    pub const SIZE: usize = 8;

    pub fn from_bytes(buf: [u8; Self::SIZE]) -> Self {
        zerocopy::LayoutVerified::<_, UdpRxHeader>::new_unaligned(&buf[..])
            .expect("UdpRxHeader is exactly 8 bytes")
            .into_ref()
            .clone()
    }

    pub fn src_port(&self) -> u16 {
        u16::from_be_bytes(self.src_port_be)
    }

    pub fn len(&self) -> u16 {
        u16::from_be_bytes(self.len_be)
    }
}
