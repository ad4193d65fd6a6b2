// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! A minimal RFC 1035 stub resolver: A-record queries only, backed by a
//! small fixed-size TTL cache keyed by a CRC-16 of the hostname (stable
//! across retries, unlike a random transaction id).

use crate::bus::Bus;
use crate::crc16;
use crate::driver::W5500;
use crate::socket::UdpSocket;

const DNS_PORT: u16 = 53;
const MAX_PACKET: usize = 256;
const CACHE_SIZE: usize = 8;

const QTYPE_A: u16 = 1;
const QCLASS_IN: u16 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
struct DnsCacheEntry {
    filled: bool,
    query_id: u16,
    ip: [u8; 4],
    expires_at_ms: u64,
}

/// Bounded set of resolved A records. Eviction: the first unfilled slot
/// wins; once every slot has been used at least once, the entry with the
/// smallest `expires_at_ms` is overwritten, expired or not.
#[derive(Clone, Copy)]
pub struct DnsCache {
    entries: [DnsCacheEntry; CACHE_SIZE],
}

impl Default for DnsCache {
    fn default() -> Self {
        Self {
            entries: [DnsCacheEntry::default(); CACHE_SIZE],
        }
    }
}

impl DnsCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn store(&mut self, query_id: u16, ip: [u8; 4], expires_at_ms: u64) {
        if let Some(slot) = self.entries.iter_mut().find(|e| !e.filled) {
            *slot = DnsCacheEntry {
                filled: true,
                query_id,
                ip,
                expires_at_ms,
            };
            return;
        }
        let evict = self
            .entries
            .iter_mut()
            .min_by_key(|e| e.expires_at_ms)
            .expect("cache is non-empty");
        *evict = DnsCacheEntry {
            filled: true,
            query_id,
            ip,
            expires_at_ms,
        };
    }

    fn lookup(&self, query_id: u16, now_ms: u64) -> Option<[u8; 4]> {
        self.entries
            .iter()
            .find(|e| e.filled && e.query_id == query_id && now_ms < e.expires_at_ms)
            .map(|e| e.ip)
    }

    /// True if a live (unexpired) entry exists for `query_id`.
    fn has_live_entry(&self, query_id: u16, now_ms: u64) -> bool {
        self.lookup(query_id, now_ms).is_some()
    }
}

/// Encode `hostname` (dot-separated ASCII labels, no trailing dot) as a
/// sequence of length-prefixed DNS labels terminated by a zero byte.
/// Returns the number of bytes written, or `None` if any label exceeds 255
/// bytes.
fn encode_qname(out: &mut [u8], hostname: &[u8]) -> Option<usize> {
    let mut w = 0;
    for label in hostname.split(|&b| b == b'.') {
        if label.len() > 255 {
            return None;
        }
        out[w] = label.len() as u8;
        out[w + 1..w + 1 + label.len()].copy_from_slice(label);
        w += 1 + label.len();
    }
    out[w] = 0;
    w += 1;
    Some(w)
}

fn build_query(out: &mut [u8], query_id: u16, hostname: &[u8]) -> Option<usize> {
    out[0..2].copy_from_slice(&query_id.to_be_bytes());
    out[2..4].copy_from_slice(&0x0100u16.to_be_bytes()); // RD=1
    out[4..6].copy_from_slice(&1u16.to_be_bytes()); // qdcount
    out[6..8].copy_from_slice(&0u16.to_be_bytes());
    out[8..10].copy_from_slice(&0u16.to_be_bytes());
    out[10..12].copy_from_slice(&0u16.to_be_bytes());

    let name_len = encode_qname(&mut out[12..], hostname)?;
    let mut w = 12 + name_len;
    out[w..w + 2].copy_from_slice(&QTYPE_A.to_be_bytes());
    out[w + 2..w + 4].copy_from_slice(&QCLASS_IN.to_be_bytes());
    w += 4;
    Some(w)
}

/// Advance past one DNS name starting at `offset`: length-prefixed labels
/// terminated by a zero byte, or a 2-byte compression pointer (top two bits
/// of the first byte set), which this subset treats purely as a
/// terminator rather than following it. Returns the offset just past the
/// name, or `None` if the name runs past the end of `buf`.
fn skip_name(buf: &[u8], mut offset: usize) -> Option<usize> {
    loop {
        let len = *buf.get(offset)?;
        if len & 0xC0 == 0xC0 {
            return Some(offset + 2);
        }
        if len == 0 {
            return Some(offset + 1);
        }
        offset += 1 + len as usize;
        if offset > buf.len() {
            return None;
        }
    }
}

/// Parse one response datagram. Returns the resolved `(query_id, ip,
/// ttl_seconds)` for the first `A`/`IN` answer record found, or `None` if
/// the packet is a query (`QR=0`), carries a nonzero `RCODE`, is too
/// short, or contains no matching answer.
fn parse_response(buf: &[u8]) -> Option<(u16, [u8; 4], u32)> {
    if buf.len() < 12 {
        return None;
    }
    let id = u16::from_be_bytes([buf[0], buf[1]]);
    let flags = u16::from_be_bytes([buf[2], buf[3]]);
    let qr = (flags >> 15) & 1;
    let rcode = flags & 0xF;
    if qr == 0 || rcode != 0 {
        return None;
    }
    let qdcount = u16::from_be_bytes([buf[4], buf[5]]) as usize;
    let ancount = u16::from_be_bytes([buf[6], buf[7]]) as usize;

    let mut offset = 12;
    for _ in 0..qdcount {
        offset = skip_name(buf, offset)?;
        offset += 4; // QTYPE + QCLASS
    }

    for _ in 0..ancount {
        offset = skip_name(buf, offset)?;
        if offset + 10 > buf.len() {
            return None;
        }
        let rtype = u16::from_be_bytes([buf[offset], buf[offset + 1]]);
        let rclass = u16::from_be_bytes([buf[offset + 2], buf[offset + 3]]);
        let ttl = u32::from_be_bytes([
            buf[offset + 4],
            buf[offset + 5],
            buf[offset + 6],
            buf[offset + 7],
        ]);
        let rdlength = u16::from_be_bytes([buf[offset + 8], buf[offset + 9]]) as usize;
        let rdata_start = offset + 10;
        if rdata_start + rdlength > buf.len() {
            return None;
        }
        if rtype == QTYPE_A && rclass == QCLASS_IN && rdlength >= 4 {
            let ip = [
                buf[rdata_start],
                buf[rdata_start + 1],
                buf[rdata_start + 2],
                buf[rdata_start + 3],
            ];
            return Some((id, ip, ttl));
        }
        offset = rdata_start + rdlength;
    }
    None
}

pub struct DnsClient {
    socket: UdpSocket,
    server_ip: [u8; 4],
    cache: DnsCache,
}

impl DnsClient {
    pub fn new(socket: UdpSocket, cache: DnsCache, server_ip: [u8; 4]) -> Self {
        Self {
            socket,
            server_ip,
            cache,
        }
    }

    pub fn set_server_ip(&mut self, ip: [u8; 4]) {
        self.server_ip = ip;
    }

    /// Resolve `hostname`. If a live cached answer already exists, sets
    /// `out_query_id` and returns `true` with no I/O. Otherwise sends a
    /// fresh query and returns `true`, or `false` if `hostname` can't be
    /// encoded (a label over 255 bytes).
    pub fn query<B: Bus>(
        &mut self,
        driver: &mut W5500<B>,
        hostname: &[u8],
        now_ms: u64,
        out_query_id: &mut u16,
    ) -> bool {
        let query_id = crc16::of(hostname);
        if self.cache.has_live_entry(query_id, now_ms) {
            *out_query_id = query_id;
            return true;
        }
        let mut buf = [0u8; MAX_PACKET];
        let n = match build_query(&mut buf, query_id, hostname) {
            Some(n) => n,
            None => return false,
        };
        let _ = self.socket.send_to(driver, self.server_ip, DNS_PORT, &buf[..n]);
        *out_query_id = query_id;
        true
    }

    /// Drain every waiting response datagram, caching any `A` record
    /// found in each.
    pub fn tick<B: Bus>(&mut self, driver: &mut W5500<B>, now_ms: u64) {
        while self.parse_one(driver, now_ms) {}
    }

    fn parse_one<B: Bus>(&mut self, driver: &mut W5500<B>, now_ms: u64) -> bool {
        let mut src_ip = [0u8; 4];
        let mut src_port = 0u16;
        let len = match self
            .socket
            .read_packet_header(driver, &mut src_ip, &mut src_port)
        {
            Ok(n) if n > 0 => n as usize,
            _ => return false,
        };
        let mut buf = [0u8; MAX_PACKET];
        let n = len.min(MAX_PACKET);
        let _ = self.socket.read(driver, &mut buf[..n]);
        let _ = self.socket.skip_to_packet_end(driver);

        if let Some((query_id, ip, ttl)) = parse_response(&buf[..n]) {
            self.cache.store(query_id, ip, now_ms + ttl as u64 * 1000);
        }
        true
    }

    pub fn get(&self, query_id: u16, now_ms: u64, out_ip: &mut [u8; 4]) -> bool {
        match self.cache.lookup(query_id, now_ms) {
            Some(ip) => {
                *out_ip = ip;
                true
            }
            None => false,
        }
    }
}
