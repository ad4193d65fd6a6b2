// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Register descriptors and bank addressing. Compile-time constants only, no
//! runtime lookup tables; grouped into `common` and `socket` modules the way
//! the original C++ driver grouped them (`Registers::Common`,
//! `Registers::Socket`).

use bitflags::bitflags;
use num_derive::FromPrimitive;

/// Common register bank selector.
pub const COMMON_REGISTER_BANK: u8 = 0x00;

/// Bank selector for socket `n`'s register block (`Sn_MR`, `Sn_CR`, ...).
pub const fn socket_register_bank(socket_n: u8) -> u8 {
    socket_n * 4 + 1
}

/// Bank selector for socket `n`'s TX buffer.
pub const fn socket_tx_buffer_bank(socket_n: u8) -> u8 {
    socket_n * 4 + 2
}

/// Bank selector for socket `n`'s RX buffer.
pub const fn socket_rx_buffer_bank(socket_n: u8) -> u8 {
    socket_n * 4 + 3
}

/// A register's offset within its bank and its width in bytes. Multi-byte
/// registers are big-endian (most significant byte at the lowest offset).
#[derive(Clone, Copy)]
pub struct RegisterDescriptor {
    pub offset: u16,
    pub width: u8,
}

const fn reg(offset: u16, width: u8) -> RegisterDescriptor {
    RegisterDescriptor { offset, width }
}

pub mod common {
    use super::{reg, RegisterDescriptor};

    pub const MODE: RegisterDescriptor = reg(0x0000, 1);
    pub const GATEWAY_ADDR: RegisterDescriptor = reg(0x0001, 4);
    pub const SUBNET_MASK: RegisterDescriptor = reg(0x0005, 4);
    pub const SOURCE_HW_ADDR: RegisterDescriptor = reg(0x0009, 6);
    pub const SOURCE_IP_ADDR: RegisterDescriptor = reg(0x000F, 4);
    pub const INTERRUPT: RegisterDescriptor = reg(0x0015, 1);
    pub const INTERRUPT_MASK: RegisterDescriptor = reg(0x0016, 1);
    pub const SOCKET_INTERRUPT: RegisterDescriptor = reg(0x0017, 1);
    pub const SOCKET_INTERRUPT_MASK: RegisterDescriptor = reg(0x0018, 1);
    pub const RETRY_TIME: RegisterDescriptor = reg(0x0019, 2);
    pub const RETRY_COUNT: RegisterDescriptor = reg(0x001B, 1);
    pub const PHY_CONFIG: RegisterDescriptor = reg(0x002E, 1);
    pub const CHIP_VERSION: RegisterDescriptor = reg(0x0039, 1);
}

pub mod socket {
    use super::{reg, RegisterDescriptor};

    pub const MODE: RegisterDescriptor = reg(0x0000, 1);
    pub const COMMAND: RegisterDescriptor = reg(0x0001, 1);
    pub const INTERRUPT: RegisterDescriptor = reg(0x0002, 1);
    pub const STATUS: RegisterDescriptor = reg(0x0003, 1);
    pub const SOURCE_PORT: RegisterDescriptor = reg(0x0004, 2);
    pub const DEST_HW_ADDR: RegisterDescriptor = reg(0x0006, 6);
    pub const DEST_IP_ADDR: RegisterDescriptor = reg(0x000C, 4);
    pub const DEST_PORT: RegisterDescriptor = reg(0x0010, 2);
    pub const RX_BUFFER_SIZE: RegisterDescriptor = reg(0x001E, 1);
    pub const TX_BUFFER_SIZE: RegisterDescriptor = reg(0x001F, 1);
    pub const TX_FREE_SIZE: RegisterDescriptor = reg(0x0020, 2);
    pub const TX_READ_PTR: RegisterDescriptor = reg(0x0022, 2);
    pub const TX_WRITE_PTR: RegisterDescriptor = reg(0x0024, 2);
    pub const RX_RECEIVED_SIZE: RegisterDescriptor = reg(0x0026, 2);
    pub const RX_READ_PTR: RegisterDescriptor = reg(0x0028, 2);
    pub const RX_WRITE_PTR: RegisterDescriptor = reg(0x002A, 2);
    pub const INTERRUPT_MASK: RegisterDescriptor = reg(0x002C, 1);
}

bitflags! {
    /// Common mode register (`MR`) flags.
    pub struct ModeFlags: u8 {
        const RESET = 1 << 7;
        const WAKE_ON_LAN = 1 << 5;
        const PING_BLOCK = 1 << 4;
        const PPPOE_MODE = 1 << 3;
        const FORCE_ARP = 1 << 1;
    }
}

bitflags! {
    /// Common-level interrupt flags/mask (`IR`/`IMR`).
    pub struct InterruptFlags: u8 {
        const IP_CONFLICT = 1 << 7;
        const UNREACHABLE = 1 << 6;
        const PPPOE_CLOSED = 1 << 5;
        const MAGIC_PACKET = 1 << 4;
    }
}

bitflags! {
    /// PHY configuration register (`PHYCFGR`) flags.
    pub struct PhyConfigFlags: u8 {
        const RESET = 1 << 7;
        const OPERATION_MODE = 1 << 6;
        const DUPLEX_STATUS = 1 << 2;
        const SPEED_STATUS = 1 << 1;
        const LINK_STATUS = 1 << 0;
    }
}

bitflags! {
    /// Per-socket mode register (`Sn_MR`) flags; the low nibble selects the
    /// protocol via [`SocketProtocol`] rather than a flag bit.
    pub struct SocketModeFlags: u8 {
        const MULTICAST = 1 << 7;
        const BROADCAST_BLOCK = 1 << 6;
        const ND_MC_MMC = 1 << 5;
        const UCASTB_MIP6B = 1 << 4;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive)]
#[repr(u8)]
pub enum SocketProtocol {
    Closed = 0b0000,
    Tcp = 0b0001,
    Udp = 0b0010,
    MacRaw = 0b0100,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SocketCommand {
    Open = 0x01,
    Listen = 0x02,
    Connect = 0x04,
    Disconnect = 0x08,
    Close = 0x10,
    Send = 0x20,
    SendMac = 0x21,
    SendKeep = 0x22,
    Recv = 0x40,
}

bitflags! {
    /// Per-socket interrupt flags/mask (`Sn_IR`/`Sn_IMR`).
    pub struct SocketInterruptFlags: u8 {
        const SEND_OK = 1 << 4;
        const TIMEOUT = 1 << 3;
        const RECV = 1 << 2;
        const DISCONNECT = 1 << 1;
        const CONNECT = 1 << 0;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive)]
#[repr(u8)]
pub enum SocketStatus {
    Closed = 0x00,
    Init = 0x13,
    Listen = 0x14,
    SynSent = 0x15,
    SynRecv = 0x16,
    Established = 0x17,
    FinWait = 0x18,
    Closing = 0x1A,
    TimeWait = 0x1B,
    CloseWait = 0x1C,
    LastAck = 0x1D,
    Udp = 0x22,
    MacRaw = 0x42,
}

/// Per-socket RX/TX buffer size. Values equal the size in KiB; the register
/// holds this value directly on the W5500 (unlike the W5100's bitmask
/// encoding). `0` disables the socket's buffer in that direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum BufferSizeKb {
    Zero = 0,
    One = 1,
    Two = 2,
    Four = 4,
    Eight = 8,
    Sixteen = 16,
}

impl BufferSizeKb {
    pub const fn bytes(self) -> u16 {
        (self as u16) * 1024
    }
}
