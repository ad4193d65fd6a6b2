// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! RFC 4330 SNTP client mode: a single 48-byte request/response exchange,
//! no authentication, no round-trip delay estimation (the server's
//! timestamp is taken as-is).

use crate::bus::Bus;
use crate::driver::W5500;
use crate::socket::UdpSocket;

const SNTP_PORT: u16 = 123;
const PACKET_SIZE: usize = 48;

/// NTP epoch (1900-01-01) to Unix epoch (1970-01-01), in seconds.
const NTP_UNIX_EPOCH_DELTA: u64 = 2_208_988_800;

const MIN_REQUEST_INTERVAL_MS: u64 = 30_000;

/// Poll interval assumed before the server has ever told us otherwise:
/// 2^6 = 64 seconds.
const DEFAULT_POLL_INTERVAL_LOG2: u8 = 6;

/// `(version=4) << 3 | mode=client(3)`.
const LI_VN_MODE_CLIENT: u8 = (4 << 3) | 3;

pub struct SntpClient {
    socket: UdpSocket,
    server_ip: [u8; 4],
    last_request_ms: Option<u64>,
    last_response_ms: Option<u64>,
    poll_interval_log2: u8,
}

impl SntpClient {
    pub fn new(socket: UdpSocket, server_ip: [u8; 4]) -> Self {
        Self {
            socket,
            server_ip,
            last_request_ms: None,
            last_response_ms: None,
            poll_interval_log2: DEFAULT_POLL_INTERVAL_LOG2,
        }
    }

    pub fn set_server_ip(&mut self, ip: [u8; 4]) {
        self.server_ip = ip;
    }

    /// Check for a waiting response (applying it to `out_now_ms` if valid),
    /// then send a new request if the poll interval has elapsed and at
    /// least 30 s have passed since the last request. Returns `true` iff a
    /// valid response updated `out_now_ms` this call.
    pub fn tick<B: Bus>(&mut self, driver: &mut W5500<B>, now_ms: u64, out_now_ms: &mut u64) -> bool {
        let responded = self.try_read_response(driver, now_ms, out_now_ms);

        let due_by_poll = match self.last_response_ms {
            None => true,
            Some(t) => now_ms.saturating_sub(t) > (1u64 << self.poll_interval_log2) * 1000,
        };
        let min_gate_elapsed = match self.last_request_ms {
            None => true,
            Some(t) => now_ms.saturating_sub(t) >= MIN_REQUEST_INTERVAL_MS,
        };
        if due_by_poll && min_gate_elapsed {
            self.send_request(driver);
            self.last_request_ms = Some(now_ms);
        }

        responded
    }

    fn send_request<B: Bus>(&mut self, driver: &mut W5500<B>) {
        let mut buf = [0u8; PACKET_SIZE];
        buf[0] = LI_VN_MODE_CLIENT;
        let _ = self.socket.send_to(driver, self.server_ip, SNTP_PORT, &buf);
    }

    fn try_read_response<B: Bus>(
        &mut self,
        driver: &mut W5500<B>,
        now_ms: u64,
        out_now_ms: &mut u64,
    ) -> bool {
        let mut src_ip = [0u8; 4];
        let mut src_port = 0u16;
        let len = match self
            .socket
            .read_packet_header(driver, &mut src_ip, &mut src_port)
        {
            Ok(n) if n > 0 => n as usize,
            _ => return false,
        };
        let mut buf = [0u8; PACKET_SIZE];
        let n = len.min(PACKET_SIZE);
        let _ = self.socket.read(driver, &mut buf[..n]);
        let _ = self.socket.skip_to_packet_end(driver);

        if n < PACKET_SIZE {
            return false;
        }

        self.poll_interval_log2 = buf[2];
        *out_now_ms = convert_timestamp(&buf);
        self.last_response_ms = Some(now_ms);
        true
    }
}

/// Convert the 8-byte NTP timestamp at offset 40 of a 48-byte packet
/// (seconds, then fraction, both big-endian `u32`) to Unix milliseconds.
fn convert_timestamp(packet: &[u8; PACKET_SIZE]) -> u64 {
    let seconds = u32::from_be_bytes([packet[40], packet[41], packet[42], packet[43]]);
    let fraction = u32::from_be_bytes([packet[44], packet[45], packet[46], packet[47]]);
    let unix_seconds = seconds as u64 - NTP_UNIX_EPOCH_DELTA;
    let fraction_ms = fraction as u64 / (0xFFFF_FFFFu64 / 1000);
    unix_seconds * 1000 + fraction_ms
}
