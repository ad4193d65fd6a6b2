// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! TCP socket handle. Unlike the classic blocking driver pattern (a
//! phantom-typestate handle whose `accept()`/`connect()` busy-wait inside a
//! sleep loop until the link comes up), every method here returns
//! immediately; callers poll [`TcpSocket::status`] from their own `tick()`
//! loop. The whole stack is cooperative and single-threaded, so nothing may
//! block waiting on the network.

use super::SocketIndex;
use crate::bus::Bus;
use crate::driver::W5500;
use crate::error::Error;
use crate::regs::{SocketCommand, SocketModeFlags, SocketProtocol, SocketStatus};

pub struct TcpSocket {
    index: SocketIndex,
}

impl TcpSocket {
    /// Claim `index`'s slot, set its mode to TCP, and issue `OPEN`.
    pub fn open<B: Bus>(driver: &mut W5500<B>, index: SocketIndex) -> Result<Self, Error> {
        driver.acquire_slot(index)?;
        if let Err(e) = Self::init(driver, index) {
            driver.release_slot(index);
            return Err(e);
        }
        Ok(Self { index })
    }

    fn init<B: Bus>(driver: &mut W5500<B>, index: SocketIndex) -> Result<(), Error> {
        driver.set_socket_mode(index, SocketProtocol::Tcp, SocketModeFlags::empty())?;
        driver.send_socket_command(index, SocketCommand::Open)?;
        if driver.socket_status(index)? != SocketStatus::Init {
            return Err(Error::OpenFailed);
        }
        Ok(())
    }

    pub fn index(&self) -> SocketIndex {
        self.index
    }

    pub fn status<B: Bus>(&self, driver: &mut W5500<B>) -> Result<SocketStatus, Error> {
        driver.socket_status(self.index)
    }

    /// True while the socket is in any state short of having torn down:
    /// `INIT`, `LISTEN`, `SYN_SENT`, `SYN_RECV`, or `ESTABLISHED`.
    pub fn ready<B: Bus>(&self, driver: &mut W5500<B>) -> bool {
        matches!(
            self.status(driver),
            Ok(SocketStatus::Init)
                | Ok(SocketStatus::Listen)
                | Ok(SocketStatus::SynSent)
                | Ok(SocketStatus::SynRecv)
                | Ok(SocketStatus::Established)
        )
    }

    pub fn is_established<B: Bus>(&self, driver: &mut W5500<B>) -> bool {
        self.status(driver) == Ok(SocketStatus::Established)
    }

    /// Passthrough to the chip's PHY link status; convenient for callers
    /// that only hold a socket handle, not the driver, at the call site.
    pub fn phy_link_up<B: Bus>(&self, driver: &mut W5500<B>) -> bool {
        driver.link_up().unwrap_or(false)
    }

    /// Assign the next ephemeral source port, set the destination, and
    /// issue `CONNECT`. Returns immediately; poll `status`/`is_established`
    /// to find out when the handshake completes.
    pub fn connect<B: Bus>(
        &self,
        driver: &mut W5500<B>,
        ip: [u8; 4],
        port: u16,
    ) -> Result<(), Error> {
        let source_port = driver.next_ephemeral_port();
        driver.set_socket_source_port(self.index, source_port)?;
        driver.set_socket_dest_ip(self.index, ip)?;
        driver.set_socket_dest_port(self.index, port)?;
        driver.send_socket_command(self.index, SocketCommand::Connect)
    }

    /// Set the source port and issue `LISTEN`.
    pub fn listen<B: Bus>(&self, driver: &mut W5500<B>, port: u16) -> Result<(), Error> {
        driver.set_socket_source_port(self.index, port)?;
        driver.send_socket_command(self.index, SocketCommand::Listen)
    }

    pub fn write<B: Bus>(&self, driver: &mut W5500<B>, buf: &[u8]) -> Result<usize, Error> {
        driver.send_buf(self.index, buf)
    }

    pub fn read<B: Bus>(&self, driver: &mut W5500<B>, out: &mut [u8]) -> Result<usize, Error> {
        let available = driver.rx_byte_count(self.index)? as usize;
        let n = out.len().min(available);
        if n == 0 {
            return Ok(0);
        }
        driver.read(self.index, Some(&mut out[..n]), n)?;
        Ok(n)
    }

    pub fn disconnect<B: Bus>(&self, driver: &mut W5500<B>) -> Result<(), Error> {
        driver.send_socket_command(self.index, SocketCommand::Disconnect)
    }

    /// Release the slot. Does not wait for a graceful close; call
    /// `disconnect` first and poll `status` if one is needed.
    pub fn close<B: Bus>(self, driver: &mut W5500<B>) -> Result<(), Error> {
        driver.send_socket_command(self.index, SocketCommand::Close)?;
        driver.release_slot(self.index);
        Ok(())
    }
}
