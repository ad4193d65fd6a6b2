// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! UDP socket handle. Every datagram the chip lands in the RX ring is
//! preceded by an 8-byte header (source IP, source port, payload length);
//! [`UdpSocket`] tracks how many payload bytes remain in the datagram
//! currently being read so callers can't accidentally read past it into the
//! next datagram's header.

use super::SocketIndex;
use crate::bus::Bus;
use crate::driver::W5500;
use crate::error::Error;
use crate::frame::UdpRxHeader;
use crate::regs::{SocketCommand, SocketModeFlags, SocketProtocol, SocketStatus};

pub struct UdpSocket {
    index: SocketIndex,
    remaining_bytes_in_packet: u16,
}

impl UdpSocket {
    /// Claim `index`'s slot, set its mode to UDP, and issue `OPEN`.
    pub fn open<B: Bus>(driver: &mut W5500<B>, index: SocketIndex) -> Result<Self, Error> {
        driver.acquire_slot(index)?;
        if let Err(e) = Self::init(driver, index) {
            driver.release_slot(index);
            return Err(e);
        }
        Ok(Self {
            index,
            remaining_bytes_in_packet: 0,
        })
    }

    fn init<B: Bus>(driver: &mut W5500<B>, index: SocketIndex) -> Result<(), Error> {
        driver.set_socket_mode(index, SocketProtocol::Udp, SocketModeFlags::empty())?;
        driver.send_socket_command(index, SocketCommand::Open)?;
        if driver.socket_status(index)? != SocketStatus::Udp {
            return Err(Error::OpenFailed);
        }
        Ok(())
    }

    pub fn index(&self) -> SocketIndex {
        self.index
    }

    pub fn ready<B: Bus>(&self, driver: &mut W5500<B>) -> bool {
        driver.socket_status(self.index) == Ok(SocketStatus::Udp)
    }

    /// Passthrough to the chip's PHY link status; convenient for callers
    /// that only hold a socket handle, not the driver, at the call site.
    pub fn phy_link_up<B: Bus>(&self, driver: &mut W5500<B>) -> bool {
        driver.link_up().unwrap_or(false)
    }

    pub fn set_source_port<B: Bus>(&self, driver: &mut W5500<B>, port: u16) -> Result<(), Error> {
        driver.set_socket_source_port(self.index, port)
    }

    pub fn set_dest<B: Bus>(
        &self,
        driver: &mut W5500<B>,
        ip: [u8; 4],
        port: u16,
    ) -> Result<(), Error> {
        driver.set_socket_dest_ip(self.index, ip)?;
        driver.set_socket_dest_port(self.index, port)
    }

    pub fn has_packet<B: Bus>(&self, driver: &mut W5500<B>) -> bool {
        driver
            .rx_byte_count(self.index)
            .map(|n| n as usize >= UdpRxHeader::SIZE)
            .unwrap_or(false)
    }

    /// If a datagram header is available, consume it, record its payload
    /// length in `remaining_bytes_in_packet`, and return that length. If no
    /// datagram is available, return `-1` without touching the RX ring.
    pub fn read_packet_header<B: Bus>(
        &mut self,
        driver: &mut W5500<B>,
        out_src_ip: &mut [u8; 4],
        out_src_port: &mut u16,
    ) -> Result<i32, Error> {
        if !self.has_packet(driver) {
            return Ok(-1);
        }
        let mut raw = [0u8; UdpRxHeader::SIZE];
        driver.read(self.index, Some(&mut raw), UdpRxHeader::SIZE)?;
        let header = UdpRxHeader::from_bytes(raw);
        *out_src_ip = header.src_ip;
        *out_src_port = header.src_port();
        self.remaining_bytes_in_packet = header.len();
        Ok(header.len() as i32)
    }

    /// Read up to `out.len()` bytes of the current datagram's payload,
    /// bounded by `remaining_bytes_in_packet`. Returns the number of bytes
    /// actually read.
    pub fn read<B: Bus>(&mut self, driver: &mut W5500<B>, out: &mut [u8]) -> Result<usize, Error> {
        let n = out.len().min(self.remaining_bytes_in_packet as usize);
        if n == 0 {
            return Ok(0);
        }
        driver.read(self.index, Some(&mut out[..n]), n)?;
        self.remaining_bytes_in_packet -= n as u16;
        Ok(n)
    }

    /// Discard whatever remains of the datagram currently being read.
    pub fn skip_to_packet_end<B: Bus>(&mut self, driver: &mut W5500<B>) -> Result<(), Error> {
        if self.remaining_bytes_in_packet > 0 {
            driver.read(self.index, None, self.remaining_bytes_in_packet as usize)?;
            self.remaining_bytes_in_packet = 0;
        }
        Ok(())
    }

    /// Write a datagram to `ip:port` and send it immediately.
    pub fn send_to<B: Bus>(
        &self,
        driver: &mut W5500<B>,
        ip: [u8; 4],
        port: u16,
        buf: &[u8],
    ) -> Result<usize, Error> {
        self.set_dest(driver, ip, port)?;
        driver.send_buf(self.index, buf)
    }

    /// Release the slot. Any unread datagram data is discarded.
    pub fn close<B: Bus>(self, driver: &mut W5500<B>) -> Result<(), Error> {
        driver.send_socket_command(self.index, SocketCommand::Close)?;
        driver.release_slot(self.index);
        Ok(())
    }
}
