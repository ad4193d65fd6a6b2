// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! A minimal RFC 2131/2132 DHCP client: DISCOVER/OFFER/REQUEST/ACK, renewal
//! and rebinding timers, and an explicit `release()`. Runs entirely from
//! `tick()`; never blocks.
//!
//! Three deliberate departures from a straight port of the reference C++
//! driver this was grounded on, called out because they read as bugs rather
//! than design choices:
//! - `seconds_elapsed` is `now - lease_request_start`, not the reverse
//!   (which underflows on unsigned wraparound).
//! - The first DISCOVER goes out with `initial_xid` unchanged; only resends
//!   increment `xid`.
//! - Reply parsing rejects `op != 2` (`BOOTREPLY`), not `op != 1`.

use crate::bus::Bus;
use crate::driver::W5500;
use crate::socket::UdpSocket;

const MAGIC_COOKIE: u32 = 0x6382_5363;
const SERVER_PORT: u16 = 67;
const CLIENT_PORT: u16 = 68;
const BROADCAST_IP: [u8; 4] = [255, 255, 255, 255];

const BOOTP_HEADER_SIZE: usize = 34;
const BOOTP_TAIL_SIZE: usize = 206; // remaining chaddr(10) + sname(64) + file(128) + cookie(4)
const MAX_PACKET: usize = 320;

const DISCOVER_RESEND_INTERVAL_MS: u64 = 1_000;
const REQUEST_RETRY_INTERVAL_MS: u64 = 1_000;
const REQUEST_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_LEASE_SECONDS: u32 = 86_400;

mod option_tag {
    pub const SUBNET_MASK: u8 = 1;
    pub const ROUTERS: u8 = 3;
    pub const DNS_SERVERS: u8 = 6;
    pub const HOSTNAME: u8 = 12;
    pub const REQUESTED_IP: u8 = 50;
    pub const LEASE_TIME: u8 = 51;
    pub const MESSAGE_TYPE: u8 = 53;
    pub const SERVER_IDENTIFIER: u8 = 54;
    pub const PARAM_REQUEST_LIST: u8 = 55;
    pub const CLIENT_IDENTIFIER: u8 = 61;
    pub const END: u8 = 255;
    pub const PAD: u8 = 0;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    Discover = 1,
    Offer = 2,
    Request = 3,
    Decline = 4,
    Ack = 5,
    Nak = 6,
    Release = 7,
    Inform = 8,
    /// Sentinel returned by `parse_reply` when the datagram is short,
    /// carries the wrong `op`, a foreign `chaddr`, or an `xid` outside the
    /// accepted window. Never sent on the wire.
    Error = 0,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Start,
    Discover,
    Request,
    Leased,
    Renew,
    Release,
}

/// Incremental parser for the 34-byte fixed BOOTP prefix. Accepts any split
/// of input across calls to `consume`, so a caller streaming bytes off the
/// wire a chunk at a time never has to buffer the whole header itself.
pub struct BootpHeaderParser {
    offset: usize,
    buf: [u8; BOOTP_HEADER_SIZE],
}

impl BootpHeaderParser {
    pub fn new() -> Self {
        Self {
            offset: 0,
            buf: [0; BOOTP_HEADER_SIZE],
        }
    }

    pub fn is_complete(&self) -> bool {
        self.offset == BOOTP_HEADER_SIZE
    }

    /// Feed up to `BOOTP_HEADER_SIZE - offset` bytes from `input`. Returns
    /// the number actually consumed.
    pub fn consume(&mut self, input: &[u8]) -> usize {
        let remaining = BOOTP_HEADER_SIZE - self.offset;
        let n = remaining.min(input.len());
        self.buf[self.offset..self.offset + n].copy_from_slice(&input[..n]);
        self.offset += n;
        n
    }

    pub fn parse(&self) -> Option<BootpHeader> {
        if !self.is_complete() {
            return None;
        }
        let b = &self.buf;
        Some(BootpHeader {
            op: b[0],
            htype: b[1],
            hlen: b[2],
            hops: b[3],
            xid: u32::from_be_bytes([b[4], b[5], b[6], b[7]]),
            secs: u16::from_be_bytes([b[8], b[9]]),
            flags: u16::from_be_bytes([b[10], b[11]]),
            ciaddr: [b[12], b[13], b[14], b[15]],
            yiaddr: [b[16], b[17], b[18], b[19]],
            siaddr: [b[20], b[21], b[22], b[23]],
            giaddr: [b[24], b[25], b[26], b[27]],
            chaddr_prefix: [b[28], b[29], b[30], b[31], b[32], b[33]],
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BootpHeader {
    pub op: u8,
    pub htype: u8,
    pub hlen: u8,
    pub hops: u8,
    pub xid: u32,
    pub secs: u16,
    pub flags: u16,
    pub ciaddr: [u8; 4],
    pub yiaddr: [u8; 4],
    pub siaddr: [u8; 4],
    pub giaddr: [u8; 4],
    pub chaddr_prefix: [u8; 6],
}

/// Fields pulled from a reply's options area. Only populated when the
/// return value isn't [`MessageType::Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReplyFields {
    pub yiaddr: [u8; 4],
    pub subnet_mask: Option<[u8; 4]>,
    pub router: Option<[u8; 4]>,
    pub dns_server: Option<[u8; 4]>,
    pub server_identifier: Option<[u8; 4]>,
    pub lease_seconds: Option<u32>,
}

/// Parse a full reply datagram (BOOTP header plus options, magic cookie
/// already expected at its fixed offset) against the caller's MAC and
/// accepted xid window `[initial_xid, xid]`.
///
/// Returns [`MessageType::Error`] on anything that doesn't pass the sanity
/// checks (too short, wrong `op`, foreign `chaddr`, `xid` outside the
/// window). Malformed or unrecognized options inside an otherwise-valid
/// packet are skipped, not treated as fatal.
pub fn parse_reply(
    buf: &[u8],
    our_mac: [u8; 6],
    xid_window: (u32, u32),
    out: &mut ReplyFields,
) -> MessageType {
    if buf.len() < BOOTP_HEADER_SIZE + BOOTP_TAIL_SIZE {
        return MessageType::Error;
    }
    let mut header_parser = BootpHeaderParser::new();
    header_parser.consume(&buf[..BOOTP_HEADER_SIZE]);
    let header = match header_parser.parse() {
        Some(h) => h,
        None => return MessageType::Error,
    };

    if header.op != 2 {
        return MessageType::Error;
    }
    if header.chaddr_prefix != our_mac {
        return MessageType::Error;
    }
    let (lo, hi) = xid_window;
    if header.xid < lo || header.xid > hi {
        return MessageType::Error;
    }

    out.yiaddr = header.yiaddr;

    let cookie_offset = BOOTP_HEADER_SIZE + BOOTP_TAIL_SIZE - 4;
    let cookie = u32::from_be_bytes([
        buf[cookie_offset],
        buf[cookie_offset + 1],
        buf[cookie_offset + 2],
        buf[cookie_offset + 3],
    ]);
    if cookie != MAGIC_COOKIE {
        return MessageType::Error;
    }

    let options = &buf[BOOTP_HEADER_SIZE + BOOTP_TAIL_SIZE..];
    let mut message_type = MessageType::Error;
    let mut i = 0;
    while i < options.len() {
        let tag = options[i];
        if tag == option_tag::PAD {
            i += 1;
            continue;
        }
        if tag == option_tag::END {
            break;
        }
        if i + 1 >= options.len() {
            break;
        }
        let len = options[i + 1] as usize;
        let value_start = i + 2;
        if value_start + len > options.len() {
            break;
        }
        let value = &options[value_start..value_start + len];
        match tag {
            option_tag::MESSAGE_TYPE if len == 1 => {
                message_type = match value[0] {
                    1 => MessageType::Discover,
                    2 => MessageType::Offer,
                    3 => MessageType::Request,
                    4 => MessageType::Decline,
                    5 => MessageType::Ack,
                    6 => MessageType::Nak,
                    7 => MessageType::Release,
                    8 => MessageType::Inform,
                    _ => MessageType::Error,
                };
            }
            option_tag::SUBNET_MASK if len >= 4 => {
                out.subnet_mask = Some([value[0], value[1], value[2], value[3]]);
            }
            option_tag::ROUTERS if len >= 4 => {
                out.router = Some([value[0], value[1], value[2], value[3]]);
            }
            option_tag::DNS_SERVERS if len >= 4 => {
                out.dns_server = Some([value[0], value[1], value[2], value[3]]);
            }
            option_tag::SERVER_IDENTIFIER if len >= 4 => {
                out.server_identifier = Some([value[0], value[1], value[2], value[3]]);
            }
            option_tag::LEASE_TIME if len >= 4 => {
                out.lease_seconds = Some(u32::from_be_bytes([
                    value[0], value[1], value[2], value[3],
                ]));
            }
            _ => {}
        }
        i = value_start + len;
    }

    message_type
}

/// Build a DISCOVER or REQUEST packet into `out`. Returns the number of
/// bytes written. `requested_ip`/`server_identifier` are only included
/// (and only meaningful) for REQUEST.
pub fn build_packet(
    out: &mut [u8],
    message_type: MessageType,
    xid: u32,
    secs: u16,
    mac: [u8; 6],
    hostname: &[u8],
    requested_ip: Option<[u8; 4]>,
    server_identifier: Option<[u8; 4]>,
) -> usize {
    for b in out.iter_mut().take(BOOTP_HEADER_SIZE + BOOTP_TAIL_SIZE) {
        *b = 0;
    }
    out[0] = 1; // op = BOOTREQUEST
    out[1] = 1; // htype = ethernet
    out[2] = 6; // hlen
    out[3] = 0; // hops
    out[4..8].copy_from_slice(&xid.to_be_bytes());
    out[8..10].copy_from_slice(&secs.to_be_bytes());
    out[10..12].copy_from_slice(&0x8000u16.to_be_bytes()); // flags: broadcast
    // ciaddr, yiaddr, siaddr, giaddr already zeroed above
    out[28..34].copy_from_slice(&mac);
    // chaddr padding, sname, file already zeroed above

    let cookie_offset = BOOTP_HEADER_SIZE + BOOTP_TAIL_SIZE - 4;
    out[cookie_offset..cookie_offset + 4].copy_from_slice(&MAGIC_COOKIE.to_be_bytes());

    let mut w = BOOTP_HEADER_SIZE + BOOTP_TAIL_SIZE;

    out[w] = option_tag::MESSAGE_TYPE;
    out[w + 1] = 1;
    out[w + 2] = message_type as u8;
    w += 3;

    out[w] = option_tag::CLIENT_IDENTIFIER;
    out[w + 1] = 7;
    out[w + 2] = 0x01; // hardware type: ethernet
    out[w + 3..w + 9].copy_from_slice(&mac);
    w += 9;

    out[w] = option_tag::HOSTNAME;
    out[w + 1] = hostname.len() as u8;
    out[w + 2..w + 2 + hostname.len()].copy_from_slice(hostname);
    w += 2 + hostname.len();

    if message_type == MessageType::Request {
        if let Some(ip) = requested_ip {
            out[w] = option_tag::REQUESTED_IP;
            out[w + 1] = 4;
            out[w + 2..w + 6].copy_from_slice(&ip);
            w += 6;
        }
        if let Some(ip) = server_identifier {
            out[w] = option_tag::SERVER_IDENTIFIER;
            out[w + 1] = 4;
            out[w + 2..w + 6].copy_from_slice(&ip);
            w += 6;
        }
    }

    const PARAMS: [u8; 6] = [1, 3, 6, 15, 58, 59];
    out[w] = option_tag::PARAM_REQUEST_LIST;
    out[w + 1] = PARAMS.len() as u8;
    out[w + 2..w + 2 + PARAMS.len()].copy_from_slice(&PARAMS);
    w += 2 + PARAMS.len();

    out[w] = option_tag::END;
    w += 1;

    w
}

/// `now_ms - start_ms`, clamped into a `u16` of wire seconds. Computed in
/// this direction deliberately: the reverse (`start_ms - now_ms`) is what
/// the reference driver this was grounded on did, and it underflows given
/// unsigned wraparound whenever a tick lands before the request started.
fn seconds_elapsed(now_ms: u64, start_ms: u64) -> u16 {
    now_ms.saturating_sub(start_ms).min(u16::MAX as u64) as u16
}

/// Lease information committed once a REQUEST is ACKed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Lease {
    pub local_ip: [u8; 4],
    pub dhcp_server_ip: [u8; 4],
    pub subnet_mask: [u8; 4],
    pub gateway_ip: [u8; 4],
    pub dns_server_ip: [u8; 4],
    pub lease_duration_s: u32,
    pub t1_s: u32,
    pub t2_s: u32,
}

pub struct DhcpClient<'h> {
    socket: UdpSocket,
    hostname: &'h [u8],
    mac: [u8; 6],
    state: State,
    initial_xid: u32,
    xid: u32,
    lease_request_start_ms: u64,
    last_discover_ms: u64,
    first_request_ms: u64,
    last_request_ms: u64,
    renew_deadline_ms: u64,
    rebind_deadline_ms: u64,
    lease: Lease,
}

impl<'h> DhcpClient<'h> {
    pub fn new(socket: UdpSocket, hostname: &'h [u8], mac: [u8; 6]) -> Self {
        Self {
            socket,
            hostname,
            mac,
            state: State::Start,
            initial_xid: 0,
            xid: 0,
            lease_request_start_ms: 0,
            last_discover_ms: 0,
            first_request_ms: 0,
            last_request_ms: 0,
            renew_deadline_ms: 0,
            rebind_deadline_ms: 0,
            lease: Lease::default(),
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn lease(&self) -> &Lease {
        &self.lease
    }

    fn seconds_elapsed(&self, now_ms: u64) -> u16 {
        seconds_elapsed(now_ms, self.lease_request_start_ms)
    }

    fn send_discover<B: Bus>(&mut self, driver: &mut W5500<B>, now_ms: u64) {
        let secs = self.seconds_elapsed(now_ms);
        let mut buf = [0u8; MAX_PACKET];
        let n = build_packet(
            &mut buf,
            MessageType::Discover,
            self.xid,
            secs,
            self.mac,
            self.hostname,
            None,
            None,
        );
        let _ = self.socket.send_to(driver, BROADCAST_IP, SERVER_PORT, &buf[..n]);
    }

    fn send_request<B: Bus>(&mut self, driver: &mut W5500<B>, now_ms: u64) {
        let secs = self.seconds_elapsed(now_ms);
        let mut buf = [0u8; MAX_PACKET];
        let n = build_packet(
            &mut buf,
            MessageType::Request,
            self.xid,
            secs,
            self.mac,
            self.hostname,
            Some(self.lease.local_ip),
            Some(self.lease.dhcp_server_ip),
        );
        let dest = self.lease.dhcp_server_ip;
        let _ = self.socket.send_to(driver, dest, SERVER_PORT, &buf[..n]);
    }

    fn send_release<B: Bus>(&mut self, driver: &mut W5500<B>, now_ms: u64) {
        let secs = self.seconds_elapsed(now_ms);
        let mut buf = [0u8; MAX_PACKET];
        let n = build_packet(
            &mut buf,
            MessageType::Release,
            self.xid,
            secs,
            self.mac,
            self.hostname,
            None,
            Some(self.lease.dhcp_server_ip),
        );
        let dest = self.lease.dhcp_server_ip;
        let _ = self.socket.send_to(driver, dest, SERVER_PORT, &buf[..n]);
    }

    /// Try to read one waiting reply datagram. Returns `None` if nothing is
    /// queued or the UDP framing itself is malformed; the caller treats
    /// that the same as a dropped datagram and keeps the state machine
    /// going.
    fn try_read_reply<B: Bus>(&mut self, driver: &mut W5500<B>) -> Option<[u8; MAX_PACKET]> {
        let mut src_ip = [0u8; 4];
        let mut src_port = 0u16;
        let len = self
            .socket
            .read_packet_header(driver, &mut src_ip, &mut src_port)
            .ok()?;
        if len <= 0 {
            return None;
        }
        let mut buf = [0u8; MAX_PACKET];
        let n = (len as usize).min(MAX_PACKET);
        let _ = self.socket.read(driver, &mut buf[..n]);
        let _ = self.socket.skip_to_packet_end(driver);
        Some(buf)
    }

    /// Advance the state machine by one step. Returns `true` iff the state
    /// changed during this call.
    pub fn tick<B: Bus>(&mut self, driver: &mut W5500<B>) -> bool {
        let now_ms = driver.bus().millis();
        match self.state {
            State::Start => {
                self.socket.set_source_port(driver, CLIENT_PORT).ok();
                self.socket.set_dest(driver, BROADCAST_IP, SERVER_PORT).ok();
                let seed = driver.bus_mut().random() as u32;
                self.initial_xid = seed;
                self.xid = seed;
                self.lease_request_start_ms = now_ms;
                self.last_discover_ms = now_ms;
                self.send_discover(driver, now_ms);
                self.state = State::Discover;
                true
            }
            State::Discover => self.tick_discover(driver, now_ms),
            State::Request => self.tick_request_or_renew(driver, now_ms, false),
            State::Leased => self.tick_leased(driver, now_ms),
            State::Renew => self.tick_request_or_renew(driver, now_ms, true),
            State::Release => {
                self.state = State::Start;
                true
            }
        }
    }

    /// Explicitly release the current lease and return to `START`. A
    /// no-op when no lease is held.
    pub fn release<B: Bus>(&mut self, driver: &mut W5500<B>) {
        if self.state != State::Leased && self.state != State::Renew {
            return;
        }
        let now_ms = driver.bus().millis();
        self.send_release(driver, now_ms);
        self.lease = Lease::default();
        driver.set_ip([0, 0, 0, 0]).ok();
        driver.set_gateway([0, 0, 0, 0]).ok();
        driver.set_subnet_mask([0, 0, 0, 0]).ok();
        self.state = State::Start;
    }

    fn tick_discover<B: Bus>(&mut self, driver: &mut W5500<B>, now_ms: u64) -> bool {
        if let Some(buf) = self.try_read_reply(driver) {
            let mut fields = ReplyFields::default();
            let window = (self.initial_xid, self.xid);
            let mt = parse_reply(&buf, self.mac, window, &mut fields);
            if mt == MessageType::Offer {
                self.lease.local_ip = fields.yiaddr;
                self.lease.dhcp_server_ip = fields.server_identifier.unwrap_or([0, 0, 0, 0]);
                self.first_request_ms = now_ms;
                self.last_request_ms = now_ms;
                self.send_request(driver, now_ms);
                self.state = State::Request;
                return true;
            }
        }
        if now_ms.saturating_sub(self.last_discover_ms) >= DISCOVER_RESEND_INTERVAL_MS {
            self.xid = self.xid.wrapping_add(1);
            self.last_discover_ms = now_ms;
            self.send_discover(driver, now_ms);
        }
        false
    }

    fn tick_request_or_renew<B: Bus>(
        &mut self,
        driver: &mut W5500<B>,
        now_ms: u64,
        is_renew: bool,
    ) -> bool {
        if let Some(buf) = self.try_read_reply(driver) {
            let mut fields = ReplyFields::default();
            let window = (self.initial_xid, self.xid);
            let mt = parse_reply(&buf, self.mac, window, &mut fields);
            match mt {
                MessageType::Ack => {
                    self.commit_lease(driver, now_ms, fields);
                    self.state = State::Leased;
                    return true;
                }
                MessageType::Nak => {
                    self.reset_lease(driver);
                    self.state = State::Start;
                    return true;
                }
                _ => {}
            }
        }
        if !is_renew && now_ms.saturating_sub(self.first_request_ms) >= REQUEST_TIMEOUT_MS {
            self.reset_lease(driver);
            self.state = State::Start;
            return true;
        }
        if is_renew && now_ms > self.rebind_deadline_ms {
            self.reset_lease(driver);
            self.state = State::Start;
            return true;
        }
        if now_ms.saturating_sub(self.last_request_ms) >= REQUEST_RETRY_INTERVAL_MS {
            self.last_request_ms = now_ms;
            self.send_request(driver, now_ms);
        }
        false
    }

    fn tick_leased<B: Bus>(&mut self, driver: &mut W5500<B>, now_ms: u64) -> bool {
        let _ = driver;
        if now_ms > self.rebind_deadline_ms {
            self.state = State::Start;
            return true;
        }
        if now_ms > self.renew_deadline_ms {
            self.first_request_ms = now_ms;
            self.last_request_ms = now_ms;
            self.xid = self.xid.wrapping_add(1);
            self.state = State::Renew;
            return true;
        }
        false
    }

    fn commit_lease<B: Bus>(&mut self, driver: &mut W5500<B>, now_ms: u64, fields: ReplyFields) {
        self.lease.local_ip = fields.yiaddr;
        if let Some(id) = fields.server_identifier {
            self.lease.dhcp_server_ip = id;
        }
        self.lease.subnet_mask = fields.subnet_mask.unwrap_or([255, 255, 255, 0]);
        self.lease.gateway_ip = fields.router.unwrap_or([0, 0, 0, 0]);
        self.lease.dns_server_ip = fields.dns_server.unwrap_or([0, 0, 0, 0]);
        self.lease.lease_duration_s = fields.lease_seconds.unwrap_or(DEFAULT_LEASE_SECONDS);
        self.lease.t1_s = self.lease.lease_duration_s / 2;
        self.lease.t2_s = self.lease.lease_duration_s * 7 / 8;

        driver.set_ip(self.lease.local_ip).ok();
        driver.set_gateway(self.lease.gateway_ip).ok();
        driver.set_subnet_mask(self.lease.subnet_mask).ok();

        self.renew_deadline_ms = now_ms + self.lease.t1_s as u64 * 1000;
        self.rebind_deadline_ms = now_ms + self.lease.t2_s as u64 * 1000;
    }

    fn reset_lease<B: Bus>(&mut self, driver: &mut W5500<B>) {
        self.lease = Lease::default();
        driver.set_ip([0, 0, 0, 0]).ok();
        driver.set_gateway([0, 0, 0, 0]).ok();
        driver.set_subnet_mask([0, 0, 0, 0]).ok();
    }
}
