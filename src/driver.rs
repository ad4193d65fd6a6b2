// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The chip driver: bank-selected register access, socket buffer plan
//! configuration, and the TX/RX ring engine (write/send, peek/read/flush).
//! The driver never mirrors TX/RX pointers in host memory — every operation
//! reads them back from the chip, per spec.

use crate::bus::Bus;
use crate::error::Error;
use crate::frame::FrameHeader;
use crate::regs::{
    self, common, socket, ModeFlags, RegisterDescriptor, SocketCommand,
    SocketInterruptFlags, SocketProtocol, SocketStatus,
};
use crate::socket::SocketIndex;
use num_traits::FromPrimitive;

pub use crate::regs::BufferSizeKb as BufferSize;

pub const MAX_SOCKETS: usize = 8;

/// Per-socket TX/RX buffer sizes. The chip has 16 KiB of TX RAM and 16 KiB
/// of RX RAM shared across all 8 sockets; the sum of configured sizes in
/// each direction must not exceed that.
#[derive(Clone, Copy)]
pub struct SocketBufferPlan {
    tx: [BufferSize; MAX_SOCKETS],
    rx: [BufferSize; MAX_SOCKETS],
}

impl Default for SocketBufferPlan {
    /// 2 KiB TX and RX per socket, the chip's power-on default.
    fn default() -> Self {
        Self {
            tx: [BufferSize::Two; MAX_SOCKETS],
            rx: [BufferSize::Two; MAX_SOCKETS],
        }
    }
}

impl SocketBufferPlan {
    pub fn new(tx: [BufferSize; MAX_SOCKETS], rx: [BufferSize; MAX_SOCKETS]) -> Result<Self, Error> {
        let plan = Self { tx, rx };
        plan.validate()?;
        Ok(plan)
    }

    fn validate(&self) -> Result<(), Error> {
        let tx_total: u32 = self.tx.iter().map(|s| s.bytes() as u32).sum();
        let rx_total: u32 = self.rx.iter().map(|s| s.bytes() as u32).sum();
        if tx_total > 16 * 1024 || rx_total > 16 * 1024 {
            return Err(Error::BadBufferPlan);
        }
        Ok(())
    }
}

pub struct W5500<B: Bus> {
    bus: B,
    sockets_in_use: u8,
    tx_sizes: [u16; MAX_SOCKETS],
    rx_sizes: [u16; MAX_SOCKETS],
    next_ephemeral_port: u16,
}

/// First port handed out by [`W5500::next_ephemeral_port`]; the low end of
/// the classic Linux ephemeral range, chosen only so the sequence starts
/// somewhere nonzero and memorable.
const EPHEMERAL_PORT_BASE: u16 = 49152;

impl<B: Bus> W5500<B> {
    /// Construct the driver around a bus. Does not touch hardware; call
    /// [`Self::reset`] before using any socket.
    pub fn new(bus: B) -> Self {
        Self {
            bus,
            sockets_in_use: 0,
            tx_sizes: [BufferSize::Two.bytes(); MAX_SOCKETS],
            rx_sizes: [BufferSize::Two.bytes(); MAX_SOCKETS],
            next_ephemeral_port: EPHEMERAL_PORT_BASE,
        }
    }

    /// Next port in the monotonically increasing (wrapping) ephemeral port
    /// sequence used by outbound TCP connections.
    pub(crate) fn next_ephemeral_port(&mut self) -> u16 {
        let port = self.next_ephemeral_port;
        self.next_ephemeral_port = match self.next_ephemeral_port.checked_add(1) {
            Some(p) if p != 0 => p,
            _ => EPHEMERAL_PORT_BASE,
        };
        port
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    /// Soft reset, confirm the chip is present and responding, configure
    /// socket buffer sizes and the MAC address.
    pub fn reset(
        &mut self,
        mac: [u8; 6],
        buffer_plan: SocketBufferPlan,
    ) -> Result<(), Error> {
        buffer_plan.validate()?;
        self.reset_raw()?;
        self.configure_socket_buffers(&buffer_plan)?;
        self.set_mac(mac)?;
        Ok(())
    }

    fn reset_raw(&mut self) -> Result<(), Error> {
        self.write_u8(common::MODE, ModeFlags::RESET.bits())?;
        for _ in 0..20 {
            if self.read_u8(common::MODE)? == ModeFlags::empty().bits() {
                return self.confirm_reset();
            }
        }
        crate::w5500_log!(self.bus, "w5500 reset timed out");
        Err(Error::ResetFailed)
    }

    /// Attempt to write/read back a few MR bit patterns as a sanity check on
    /// SPI wiring and chip presence.
    fn confirm_reset(&mut self) -> Result<(), Error> {
        for mode in [
            ModeFlags::PING_BLOCK.bits(),
            (ModeFlags::PING_BLOCK | ModeFlags::FORCE_ARP).bits(),
            ModeFlags::empty().bits(),
        ] {
            self.write_u8(common::MODE, mode)?;
            if self.read_u8(common::MODE)? != mode {
                return Err(Error::ResetFailed);
            }
        }
        Ok(())
    }

    fn configure_socket_buffers(
        &mut self,
        plan: &SocketBufferPlan,
    ) -> Result<(), Error> {
        for i in 0..MAX_SOCKETS {
            let idx = SocketIndex::new(i as u8).expect("i < MAX_SOCKETS");
            self.write_socket_u8(idx, socket::TX_BUFFER_SIZE, plan.tx[i] as u8)?;
            self.write_socket_u8(idx, socket::RX_BUFFER_SIZE, plan.rx[i] as u8)?;
            self.tx_sizes[i] = plan.tx[i].bytes();
            self.rx_sizes[i] = plan.rx[i].bytes();
        }
        Ok(())
    }

    pub fn set_mac(&mut self, mac: [u8; 6]) -> Result<(), Error> {
        self.write_common(common::SOURCE_HW_ADDR, &mac)
    }

    pub fn get_mac(&mut self) -> Result<[u8; 6], Error> {
        let mut mac = [0u8; 6];
        self.read_common(common::SOURCE_HW_ADDR, &mut mac)?;
        Ok(mac)
    }

    pub fn set_ip(&mut self, ip: [u8; 4]) -> Result<(), Error> {
        self.write_common(common::SOURCE_IP_ADDR, &ip)
    }

    pub fn get_ip(&mut self) -> Result<[u8; 4], Error> {
        let mut ip = [0u8; 4];
        self.read_common(common::SOURCE_IP_ADDR, &mut ip)?;
        Ok(ip)
    }

    pub fn set_gateway(&mut self, ip: [u8; 4]) -> Result<(), Error> {
        self.write_common(common::GATEWAY_ADDR, &ip)
    }

    pub fn set_subnet_mask(&mut self, mask: [u8; 4]) -> Result<(), Error> {
        self.write_common(common::SUBNET_MASK, &mask)
    }

    pub fn get_version(&mut self) -> Result<u8, Error> {
        self.read_u8(common::CHIP_VERSION)
    }

    /// True if the PHY reports an active link (`PHYCFGR` bit 0).
    pub fn link_up(&mut self) -> Result<bool, Error> {
        let v = self.read_u8(common::PHY_CONFIG)?;
        Ok(v & regs::PhyConfigFlags::LINK_STATUS.bits() != 0)
    }

    pub fn set_force_arp(&mut self, enable: bool) -> Result<(), Error> {
        let mut mode = ModeFlags::from_bits_truncate(self.read_u8(common::MODE)?);
        mode.set(ModeFlags::FORCE_ARP, enable);
        self.write_u8(common::MODE, mode.bits())
    }

    pub fn set_interrupt_mask(&mut self, mask: regs::InterruptFlags) -> Result<(), Error> {
        self.write_u8(common::INTERRUPT_MASK, mask.bits())
    }

    pub fn interrupt_state(&mut self) -> Result<regs::InterruptFlags, Error> {
        let raw = self.read_u8(common::INTERRUPT)?;
        Ok(regs::InterruptFlags::from_bits_truncate(raw))
    }

    pub fn clear_interrupt_flag(&mut self, flag: regs::InterruptFlags) -> Result<(), Error> {
        self.write_u8(common::INTERRUPT, flag.bits())
    }

    // -- socket slot bookkeeping --------------------------------------

    pub(crate) fn acquire_slot(&mut self, idx: SocketIndex) -> Result<(), Error> {
        let bit = 1 << idx.value();
        if self.sockets_in_use & bit != 0 {
            return Err(Error::BadSocketIndex);
        }
        self.sockets_in_use |= bit;
        Ok(())
    }

    pub(crate) fn release_slot(&mut self, idx: SocketIndex) {
        self.sockets_in_use &= !(1 << idx.value());
    }

    // -- per-socket register access ------------------------------------

    pub(crate) fn set_socket_mode(
        &mut self,
        idx: SocketIndex,
        proto: SocketProtocol,
        flags: crate::regs::SocketModeFlags,
    ) -> Result<(), Error> {
        self.write_socket_u8(idx, socket::MODE, flags.bits() | proto as u8)
    }

    pub(crate) fn send_socket_command(
        &mut self,
        idx: SocketIndex,
        command: SocketCommand,
    ) -> Result<(), Error> {
        self.write_socket_u8(idx, socket::COMMAND, command as u8)
    }

    pub(crate) fn socket_status(&mut self, idx: SocketIndex) -> Result<SocketStatus, Error> {
        let raw = self.read_socket_u8(idx, socket::STATUS)?;
        SocketStatus::from_u8(raw).ok_or(Error::UnknownSocketStatus(raw))
    }

    pub(crate) fn set_socket_source_port(&mut self, idx: SocketIndex, port: u16) -> Result<(), Error> {
        self.write_socket_u16(idx, socket::SOURCE_PORT, port)
    }

    pub(crate) fn set_socket_dest_ip(&mut self, idx: SocketIndex, ip: [u8; 4]) -> Result<(), Error> {
        self.write_socket(idx, socket::DEST_IP_ADDR, &ip)
    }

    pub(crate) fn set_socket_dest_port(&mut self, idx: SocketIndex, port: u16) -> Result<(), Error> {
        self.write_socket_u16(idx, socket::DEST_PORT, port)
    }

    pub(crate) fn socket_interrupt_flags(
        &mut self,
        idx: SocketIndex,
    ) -> Result<SocketInterruptFlags, Error> {
        let raw = self.read_socket_u8(idx, socket::INTERRUPT)?;
        Ok(SocketInterruptFlags::from_bits_truncate(raw))
    }

    pub(crate) fn clear_socket_interrupt_flag(
        &mut self,
        idx: SocketIndex,
        flag: SocketInterruptFlags,
    ) -> Result<(), Error> {
        // Write-one-to-clear.
        self.write_socket_u8(idx, socket::INTERRUPT, flag.bits())
    }

    // -- TX/RX ring engine ----------------------------------------------

    pub(crate) fn rx_byte_count(&mut self, idx: SocketIndex) -> Result<u16, Error> {
        self.read_socket_u16(idx, socket::RX_RECEIVED_SIZE)
    }

    fn tx_free_size(&mut self, idx: SocketIndex) -> Result<u16, Error> {
        self.read_socket_u16(idx, socket::TX_FREE_SIZE)
    }

    /// Issue `SEND` without writing new data; transmits whatever is already
    /// queued between `tx_read_ptr` and `tx_write_ptr`.
    pub fn send(&mut self, idx: SocketIndex) -> Result<(), Error> {
        self.send_socket_command(idx, SocketCommand::Send)
    }

    /// Write up to `buf.len()` bytes into the socket's TX ring. Returns the
    /// number of bytes actually written, which may be less than
    /// `buf.len()` if the TX free size is smaller (0 if the ring is full).
    /// Does not trigger a send; the caller (or [`Self::send_buf`]) must
    /// follow up with [`Self::send`].
    pub fn write(&mut self, idx: SocketIndex, buf: &[u8]) -> Result<usize, Error> {
        let free = self.tx_free_size(idx)? as usize;
        let n = buf.len().min(free);
        if n == 0 {
            return Ok(0);
        }

        let tx_size = self.tx_sizes[idx.value() as usize];
        let write_ptr = self.read_socket_u16(idx, socket::TX_WRITE_PTR)?;
        let offset = write_ptr & (tx_size - 1);
        let bank = regs::socket_tx_buffer_bank(idx.value());

        if offset as usize + n > tx_size as usize {
            let to_end = tx_size as usize - offset as usize;
            self.transfer(offset, bank, &buf[..to_end])?;
            self.transfer(0, bank, &buf[to_end..n])?;
        } else {
            self.transfer(offset, bank, &buf[..n])?;
        }

        let new_write_ptr = write_ptr.wrapping_add(n as u16);
        self.write_socket_u16(idx, socket::TX_WRITE_PTR, new_write_ptr)?;
        Ok(n)
    }

    /// `write` followed immediately by `SEND`.
    pub fn send_buf(&mut self, idx: SocketIndex, buf: &[u8]) -> Result<usize, Error> {
        let n = self.write(idx, buf)?;
        if n > 0 {
            self.send(idx)?;
        }
        Ok(n)
    }

    /// Read from the RX ring without advancing `rx_read_ptr`.
    pub fn peek(&mut self, idx: SocketIndex, out: &mut [u8]) -> Result<(), Error> {
        self.rx_transfer(idx, out.len(), Some(out), false)
    }

    /// Read `n` bytes from the RX ring, advancing `rx_read_ptr` and issuing
    /// `RECV`. Pass `None` to discard the bytes instead of copying them.
    pub fn read(
        &mut self,
        idx: SocketIndex,
        out: Option<&mut [u8]>,
        n: usize,
    ) -> Result<(), Error> {
        self.rx_transfer(idx, n, out, true)
    }

    /// Discard all pending RX data, advancing `rx_read_ptr` to
    /// `rx_write_ptr`. Returns the number of bytes discarded.
    pub fn flush(&mut self, idx: SocketIndex) -> Result<u16, Error> {
        let n = self.rx_byte_count(idx)?;
        if n > 0 {
            self.read(idx, None, n as usize)?;
        }
        Ok(n)
    }

    fn rx_transfer(
        &mut self,
        idx: SocketIndex,
        n: usize,
        mut out: Option<&mut [u8]>,
        advance: bool,
    ) -> Result<(), Error> {
        if n == 0 {
            return Ok(());
        }
        let rx_size = self.rx_sizes[idx.value() as usize];
        let read_ptr = self.read_socket_u16(idx, socket::RX_READ_PTR)?;
        let offset = read_ptr & (rx_size - 1);
        let bank = regs::socket_rx_buffer_bank(idx.value());

        if offset as usize + n > rx_size as usize {
            let to_end = rx_size as usize - offset as usize;
            let (first, second) = match out.as_deref_mut() {
                Some(buf) => {
                    let (a, b) = buf.split_at_mut(to_end);
                    (Some(a), Some(b))
                }
                None => (None, None),
            };
            self.rx_read_raw(offset, bank, to_end, first)?;
            self.rx_read_raw(0, bank, n - to_end, second)?;
        } else {
            self.rx_read_raw(offset, bank, n, out)?;
        }

        if advance {
            let new_read_ptr = read_ptr.wrapping_add(n as u16);
            self.write_socket_u16(idx, socket::RX_READ_PTR, new_read_ptr)?;
            self.send_socket_command(idx, SocketCommand::Recv)?;
        }
        Ok(())
    }

    fn rx_read_raw(
        &mut self,
        offset: u16,
        bank: u8,
        n: usize,
        out: Option<&mut [u8]>,
    ) -> Result<(), Error> {
        if n == 0 {
            return Ok(());
        }
        match out {
            Some(buf) => self.transfer_mut(offset, bank, &mut buf[..n]),
            None => {
                let mut scratch = [0u8; 64];
                let mut remaining = n;
                let mut addr = offset;
                while remaining > 0 {
                    let chunk = remaining.min(scratch.len());
                    self.transfer_mut(addr, bank, &mut scratch[..chunk])?;
                    addr = addr.wrapping_add(chunk as u16);
                    remaining -= chunk;
                }
                Ok(())
            }
        }
    }

    // -- low-level register/bank transfer --------------------------------

    fn write_common(&mut self, reg: RegisterDescriptor, data: &[u8]) -> Result<(), Error> {
        debug_assert_eq!(data.len(), reg.width as usize);
        self.transfer(reg.offset, regs::COMMON_REGISTER_BANK, data)
    }

    fn read_common(&mut self, reg: RegisterDescriptor, data: &mut [u8]) -> Result<(), Error> {
        debug_assert_eq!(data.len(), reg.width as usize);
        self.transfer_mut(reg.offset, regs::COMMON_REGISTER_BANK, data)
    }

    fn write_u8(&mut self, reg: RegisterDescriptor, value: u8) -> Result<(), Error> {
        self.write_common(reg, &[value])
    }

    fn read_u8(&mut self, reg: RegisterDescriptor) -> Result<u8, Error> {
        let mut out = [0u8; 1];
        self.read_common(reg, &mut out)?;
        Ok(out[0])
    }

    fn write_socket(
        &mut self,
        idx: SocketIndex,
        reg: RegisterDescriptor,
        data: &[u8],
    ) -> Result<(), Error> {
        debug_assert_eq!(data.len(), reg.width as usize);
        let bank = regs::socket_register_bank(idx.value());
        self.transfer(reg.offset, bank, data)
    }

    fn read_socket(
        &mut self,
        idx: SocketIndex,
        reg: RegisterDescriptor,
        data: &mut [u8],
    ) -> Result<(), Error> {
        debug_assert_eq!(data.len(), reg.width as usize);
        let bank = regs::socket_register_bank(idx.value());
        self.transfer_mut(reg.offset, bank, data)
    }

    fn write_socket_u8(
        &mut self,
        idx: SocketIndex,
        reg: RegisterDescriptor,
        value: u8,
    ) -> Result<(), Error> {
        self.write_socket(idx, reg, &[value])
    }

    fn read_socket_u8(&mut self, idx: SocketIndex, reg: RegisterDescriptor) -> Result<u8, Error> {
        let mut out = [0u8; 1];
        self.read_socket(idx, reg, &mut out)?;
        Ok(out[0])
    }

    fn write_socket_u16(
        &mut self,
        idx: SocketIndex,
        reg: RegisterDescriptor,
        value: u16,
    ) -> Result<(), Error> {
        self.write_socket(idx, reg, &value.to_be_bytes())
    }

    fn read_socket_u16(&mut self, idx: SocketIndex, reg: RegisterDescriptor) -> Result<u16, Error> {
        let mut out = [0u8; 2];
        self.read_socket(idx, reg, &mut out)?;
        Ok(u16::from_be_bytes(out))
    }

    /// One SPI write transaction: assert CS, send the 3-byte frame header
    /// with the write bit set, then write `data`, deassert CS.
    fn transfer(&mut self, addr: u16, bank: u8, data: &[u8]) -> Result<(), Error> {
        let header = FrameHeader::new(addr, bank, true);
        self.bus.chip_select();
        self.bus.spi_xfer_bulk(Some(header.as_bytes()), None);
        self.bus.spi_xfer_bulk(Some(data), None);
        self.bus.chip_deselect();
        Ok(())
    }

    /// One SPI read transaction: assert CS, send the 3-byte frame header
    /// with the write bit clear, then read into `data`, deassert CS.
    fn transfer_mut(&mut self, addr: u16, bank: u8, data: &mut [u8]) -> Result<(), Error> {
        let header = FrameHeader::new(addr, bank, false);
        self.bus.chip_select();
        self.bus.spi_xfer_bulk(Some(header.as_bytes()), None);
        self.bus.spi_xfer_bulk(None, Some(data));
        self.bus.chip_deselect();
        Ok(())
    }
}
