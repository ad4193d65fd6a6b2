// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! A fake W5500 for the integration tests in `tests/integration.rs`.
//!
//! Decodes the same 3-byte address+control SPI frame the real chip expects
//! (see `src/frame.rs`) and backs it with in-memory common/per-socket
//! register banks and per-socket TX/RX rings, addressed with the same
//! `ptr & (size - 1)` masking the driver uses. `OPEN`/`SEND`/`CONNECT`/etc.
//! commands are applied synchronously (no ARP, no handshake, no real wire) —
//! enough to drive the protocol clients end to end without a real chip.

use std::cell::RefCell;
use std::rc::Rc;

use w5500_net::bus::Bus;

const RING_SIZE: usize = 2048;

#[derive(Clone, Copy)]
enum BankKind {
    Common,
    SocketReg(u8),
    SocketTx(u8),
    SocketRx(u8),
}

fn decode_bank(bank: u8) -> BankKind {
    if bank == 0 {
        return BankKind::Common;
    }
    let n = (bank - 1) / 4;
    match (bank - 1) % 4 {
        0 => BankKind::SocketReg(n),
        1 => BankKind::SocketTx(n),
        2 => BankKind::SocketRx(n),
        _ => unreachable!("bank math only produces the three socket bank kinds"),
    }
}

struct CommonSim {
    regs: [u8; 0x40],
}

impl CommonSim {
    fn new() -> Self {
        Self { regs: [0; 0x40] }
    }

    fn reg_read(&self, addr: u16) -> u8 {
        self.regs[addr as usize]
    }

    fn reg_write(&mut self, addr: u16, val: u8) {
        if addr == 0x00 && val & 0x80 != 0 {
            // Mode register RESET bit: the real chip clears it once the soft
            // reset completes. Model that as instantaneous.
            self.regs[0x00] = val & !0x80;
        } else {
            self.regs[addr as usize] = val;
        }
    }
}

struct SocketSim {
    regs: [u8; 0x30],
    tx_buf: Vec<u8>,
    rx_buf: Vec<u8>,
}

impl SocketSim {
    fn new() -> Self {
        Self {
            regs: [0; 0x30],
            tx_buf: vec![0; RING_SIZE],
            rx_buf: vec![0; RING_SIZE],
        }
    }

    fn get_u16(&self, addr: u16) -> u16 {
        u16::from_be_bytes([self.regs[addr as usize], self.regs[addr as usize + 1]])
    }

    fn set_u16(&mut self, addr: u16, v: u16) {
        let b = v.to_be_bytes();
        self.regs[addr as usize] = b[0];
        self.regs[addr as usize + 1] = b[1];
    }

    fn tx_free_size(&self) -> u16 {
        (RING_SIZE as u16).wrapping_sub(self.get_u16(0x24).wrapping_sub(self.get_u16(0x22)))
    }

    fn rx_received_size(&self) -> u16 {
        self.get_u16(0x2A).wrapping_sub(self.get_u16(0x28))
    }

    fn reg_read(&self, addr: u16) -> u8 {
        match addr {
            0x20 => self.tx_free_size().to_be_bytes()[0],
            0x21 => self.tx_free_size().to_be_bytes()[1],
            0x26 => self.rx_received_size().to_be_bytes()[0],
            0x27 => self.rx_received_size().to_be_bytes()[1],
            _ => self.regs[addr as usize],
        }
    }

    fn reg_write(&mut self, addr: u16, val: u8) {
        self.regs[addr as usize] = val;
        if addr == 0x01 {
            self.handle_command(val);
        }
    }

    fn handle_command(&mut self, cmd: u8) {
        match cmd {
            0x01 => {
                // OPEN: status follows from the protocol nibble of Sn_MR.
                let proto = self.regs[0x00] & 0x0F;
                self.regs[0x03] = match proto {
                    0b0001 => 0x13, // Init (TCP)
                    0b0010 => 0x22, // Udp
                    0b0100 => 0x42, // MacRaw
                    _ => 0x00,
                };
            }
            0x02 => self.regs[0x03] = 0x14,       // Listen
            0x04 => self.regs[0x03] = 0x15,       // Connect -> SynSent
            0x08 => self.regs[0x03] = 0x1C,       // Disconnect -> CloseWait
            0x10 => self.regs[0x03] = 0x00,       // Close
            0x20 | 0x21 | 0x22 => {
                // SEND / SEND_MAC / SEND_KEEP: the chip has transmitted
                // everything queued, so tx_read_ptr catches up to
                // tx_write_ptr.
                let wp = self.get_u16(0x24);
                self.set_u16(0x22, wp);
            }
            _ => {}
        }
    }

    /// Appends a UDP datagram (8-byte chip header + payload) to this
    /// socket's RX ring, as the chip would on receiving it from the wire.
    fn inject_datagram(&mut self, src_ip: [u8; 4], src_port: u16, payload: &[u8]) {
        let mut framed = Vec::with_capacity(8 + payload.len());
        framed.extend_from_slice(&src_ip);
        framed.extend_from_slice(&src_port.to_be_bytes());
        framed.extend_from_slice(&(payload.len() as u16).to_be_bytes());
        framed.extend_from_slice(payload);

        let mut wp = self.get_u16(0x2A);
        for &b in &framed {
            self.rx_buf[wp as usize % RING_SIZE] = b;
            wp = wp.wrapping_add(1);
        }
        self.set_u16(0x2A, wp);
    }
}

struct FakeChip {
    millis: u64,
    random_value: u64,
    common: CommonSim,
    sockets: [SocketSim; 8],
    header: [u8; 3],
    header_len: usize,
    payload_offset: u16,
    interrupt_pending: bool,
}

impl FakeChip {
    fn new() -> Self {
        Self {
            millis: 0,
            random_value: 0,
            common: CommonSim::new(),
            sockets: [
                SocketSim::new(),
                SocketSim::new(),
                SocketSim::new(),
                SocketSim::new(),
                SocketSim::new(),
                SocketSim::new(),
                SocketSim::new(),
                SocketSim::new(),
            ],
            header: [0; 3],
            header_len: 0,
            payload_offset: 0,
            interrupt_pending: false,
        }
    }

    fn chip_select(&mut self) {
        self.header_len = 0;
        self.payload_offset = 0;
    }

    fn chip_deselect(&mut self) {}

    fn spi_xfer(&mut self, tx: u8) -> u8 {
        if self.header_len < 3 {
            self.header[self.header_len] = tx;
            self.header_len += 1;
            return 0;
        }

        let addr = u16::from_be_bytes([self.header[0], self.header[1]]);
        let control = self.header[2];
        let bank = control >> 3;
        let write = control & 0b0100 != 0;
        let cur = addr.wrapping_add(self.payload_offset);
        self.payload_offset = self.payload_offset.wrapping_add(1);

        match decode_bank(bank) {
            BankKind::Common => {
                if write {
                    self.common.reg_write(cur, tx);
                    0
                } else {
                    self.common.reg_read(cur)
                }
            }
            BankKind::SocketReg(n) => {
                let s = &mut self.sockets[n as usize];
                if write {
                    s.reg_write(cur, tx);
                    0
                } else {
                    s.reg_read(cur)
                }
            }
            BankKind::SocketTx(n) => {
                let s = &mut self.sockets[n as usize];
                let idx = cur as usize % RING_SIZE;
                if write {
                    s.tx_buf[idx] = tx;
                    0
                } else {
                    s.tx_buf[idx]
                }
            }
            BankKind::SocketRx(n) => {
                let s = &mut self.sockets[n as usize];
                let idx = cur as usize % RING_SIZE;
                if write {
                    s.rx_buf[idx] = tx;
                    0
                } else {
                    s.rx_buf[idx]
                }
            }
        }
    }
}

/// Shared handle to a [`FakeChip`]: one clone goes to the driver under test,
/// the other stays with the test body to inject datagrams and advance the
/// clock.
#[derive(Clone)]
pub struct FakeBus(Rc<RefCell<FakeChip>>);

impl FakeBus {
    pub fn new() -> Self {
        Self(Rc::new(RefCell::new(FakeChip::new())))
    }

    pub fn set_millis(&self, t: u64) {
        self.0.borrow_mut().millis = t;
    }

    pub fn set_random(&self, v: u64) {
        self.0.borrow_mut().random_value = v;
    }

    pub fn inject_datagram(&self, socket: u8, src_ip: [u8; 4], src_port: u16, payload: &[u8]) {
        self.0.borrow_mut().sockets[socket as usize].inject_datagram(src_ip, src_port, payload);
    }

    /// Directly sets a socket's RX read/write pointers, for tests that need
    /// to force a ring wraparound rather than wait for one.
    pub fn set_socket_rx_ptrs(&self, socket: u8, read_ptr: u16, write_ptr: u16) {
        let mut chip = self.0.borrow_mut();
        chip.sockets[socket as usize].set_u16(0x28, read_ptr);
        chip.sockets[socket as usize].set_u16(0x2A, write_ptr);
    }
}

impl Bus for FakeBus {
    fn millis(&self) -> u64 {
        self.0.borrow().millis
    }

    fn random(&mut self) -> u64 {
        self.0.borrow().random_value
    }

    fn spi_xfer(&mut self, tx: u8) -> u8 {
        self.0.borrow_mut().spi_xfer(tx)
    }

    fn chip_select(&mut self) {
        self.0.borrow_mut().chip_select();
    }

    fn chip_deselect(&mut self) {
        self.0.borrow_mut().chip_deselect();
    }

    fn trigger_interrupt(&mut self) {
        self.0.borrow_mut().interrupt_pending = true;
    }

    fn has_pending_interrupt(&self) -> bool {
        self.0.borrow().interrupt_pending
    }

    fn clear_pending_interrupt(&mut self) {
        self.0.borrow_mut().interrupt_pending = false;
    }
}
