// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Black-box tests against a fake W5500 built from the same SPI wire
//! contract [`w5500_net::frame`] describes: a 3-byte address+control header
//! decoded into a bank/offset pair, banked common/per-socket registers, and
//! per-socket TX/RX rings addressed with the same `ptr & (size - 1)` masking
//! the driver uses. Exercises end-to-end scenarios across the stack: DHCP
//! happy path and NAK, a DNS resolve-then-cache round trip, an SNTP
//! timestamp conversion, and RX ring wraparound.

use w5500_net::dhcp::{DhcpClient, State as DhcpState};
use w5500_net::dns::DnsClient;
use w5500_net::sntp::SntpClient;
use w5500_net::{SocketBufferPlan, SocketIndex, UdpSocket, W5500};

mod fake_chip;
use fake_chip::FakeBus;

fn mac(last: u8) -> [u8; 6] {
    [0x02, 0x00, 0x00, 0x00, 0x00, last]
}

/// Builds a DHCP reply (BOOTREPLY) datagram: 34-byte BOOTP header, 206-byte
/// tail, magic cookie, then the option set a real server would send.
fn build_dhcp_reply(
    xid: u32,
    client_mac: [u8; 6],
    yiaddr: [u8; 4],
    message_type: u8,
    server_id: [u8; 4],
    lease_secs: u32,
) -> Vec<u8> {
    const HEADER: usize = 34;
    const TAIL: usize = 206;
    let mut buf = vec![0u8; HEADER + TAIL + 40];
    buf[0] = 2; // op = BOOTREPLY
    buf[1] = 1; // htype = ethernet
    buf[2] = 6; // hlen
    buf[4..8].copy_from_slice(&xid.to_be_bytes());
    buf[16..20].copy_from_slice(&yiaddr);
    buf[28..34].copy_from_slice(&client_mac);
    let cookie_offset = HEADER + TAIL - 4;
    buf[cookie_offset..cookie_offset + 4].copy_from_slice(&0x6382_5363u32.to_be_bytes());

    let mut w = HEADER + TAIL;
    buf[w] = 53; // MESSAGE_TYPE
    buf[w + 1] = 1;
    buf[w + 2] = message_type;
    w += 3;
    if message_type == 2 || message_type == 5 {
        // OFFER / ACK carry lease parameters; NAK does not.
        buf[w] = 1; // SUBNET_MASK
        buf[w + 1] = 4;
        buf[w + 2..w + 6].copy_from_slice(&[255, 255, 255, 0]);
        w += 6;
        buf[w] = 3; // ROUTERS
        buf[w + 1] = 4;
        buf[w + 2..w + 6].copy_from_slice(&server_id);
        w += 6;
        buf[w] = 54; // SERVER_IDENTIFIER
        buf[w + 1] = 4;
        buf[w + 2..w + 6].copy_from_slice(&server_id);
        w += 6;
        buf[w] = 51; // LEASE_TIME
        buf[w + 1] = 4;
        buf[w + 2..w + 6].copy_from_slice(&lease_secs.to_be_bytes());
        w += 6;
    }
    buf[w] = 255; // END
    w += 1;
    buf.truncate(w);
    buf
}

/// Builds a single-answer `A`/`IN` DNS response whose question name matches
/// `hostname` verbatim (no compression; the compression-pointer path is
/// covered by `src/dns.rs`'s own unit tests).
fn build_dns_a_response(id: u16, hostname: &[u8], ip: [u8; 4], ttl: u32) -> Vec<u8> {
    let mut buf = vec![0u8; 512];
    buf[0..2].copy_from_slice(&id.to_be_bytes());
    buf[2..4].copy_from_slice(&0x8180u16.to_be_bytes()); // QR=1, RD+RA, RCODE=0
    buf[4..6].copy_from_slice(&1u16.to_be_bytes()); // qdcount
    buf[6..8].copy_from_slice(&1u16.to_be_bytes()); // ancount

    let mut w = 12;
    for label in hostname.split(|&b| b == b'.') {
        buf[w] = label.len() as u8;
        w += 1;
        buf[w..w + label.len()].copy_from_slice(label);
        w += label.len();
    }
    buf[w] = 0;
    w += 1;
    buf[w..w + 2].copy_from_slice(&1u16.to_be_bytes()); // QTYPE A
    buf[w + 2..w + 4].copy_from_slice(&1u16.to_be_bytes()); // QCLASS IN
    w += 4;

    buf[w] = 0xC0; // name: pointer back to the question at offset 12
    buf[w + 1] = 12;
    w += 2;
    buf[w..w + 2].copy_from_slice(&1u16.to_be_bytes()); // TYPE A
    buf[w + 2..w + 4].copy_from_slice(&1u16.to_be_bytes()); // CLASS IN
    buf[w + 4..w + 8].copy_from_slice(&ttl.to_be_bytes());
    buf[w + 8..w + 10].copy_from_slice(&4u16.to_be_bytes()); // RDLENGTH
    buf[w + 10..w + 14].copy_from_slice(&ip);
    w += 14;

    buf.truncate(w);
    buf
}

#[test]
fn dhcp_happy_path_reaches_leased_state() {
    let bus = FakeBus::new();
    bus.set_millis(1_000);
    bus.set_random(0xDEAD_BEEF);
    let client_mac = mac(1);

    let mut driver = W5500::new(bus.clone());
    driver.reset(client_mac, SocketBufferPlan::default()).unwrap();

    let socket = UdpSocket::open(&mut driver, SocketIndex::new(0).unwrap()).unwrap();
    let mut dhcp = DhcpClient::new(socket, b"host-1", client_mac);

    assert!(dhcp.tick(&mut driver)); // START -> DISCOVER
    assert_eq!(dhcp.state(), DhcpState::Discover);

    let offer = build_dhcp_reply(0xDEAD_BEEF, client_mac, [192, 168, 1, 50], 2, [192, 168, 1, 1], 3600);
    bus.inject_datagram(0, [192, 168, 1, 1], 67, &offer);

    assert!(dhcp.tick(&mut driver)); // DISCOVER -> REQUEST
    assert_eq!(dhcp.state(), DhcpState::Request);
    assert_eq!(dhcp.lease().local_ip, [192, 168, 1, 50]);

    let ack = build_dhcp_reply(0xDEAD_BEEF, client_mac, [192, 168, 1, 50], 5, [192, 168, 1, 1], 3600);
    bus.inject_datagram(0, [192, 168, 1, 1], 67, &ack);

    assert!(dhcp.tick(&mut driver)); // REQUEST -> LEASED
    assert_eq!(dhcp.state(), DhcpState::Leased);
    assert_eq!(dhcp.lease().local_ip, [192, 168, 1, 50]);
    assert_eq!(dhcp.lease().t1_s, 1800); // lease/2, so renew_deadline = 1000 + 1_800_000
    assert_eq!(driver.get_ip().unwrap(), [192, 168, 1, 50]);
}

#[test]
fn dhcp_nak_returns_to_start_and_clears_lease() {
    let bus = FakeBus::new();
    bus.set_millis(1_000);
    bus.set_random(0x1111_2222);
    let client_mac = mac(2);

    let mut driver = W5500::new(bus.clone());
    driver.reset(client_mac, SocketBufferPlan::default()).unwrap();

    let socket = UdpSocket::open(&mut driver, SocketIndex::new(0).unwrap()).unwrap();
    let mut dhcp = DhcpClient::new(socket, b"host-2", client_mac);

    assert!(dhcp.tick(&mut driver)); // START -> DISCOVER
    let offer = build_dhcp_reply(0x1111_2222, client_mac, [10, 0, 0, 5], 2, [10, 0, 0, 1], 3600);
    bus.inject_datagram(0, [10, 0, 0, 1], 67, &offer);
    assert!(dhcp.tick(&mut driver)); // DISCOVER -> REQUEST
    assert_eq!(dhcp.state(), DhcpState::Request);

    let nak = build_dhcp_reply(0x1111_2222, client_mac, [0, 0, 0, 0], 6, [10, 0, 0, 1], 0);
    bus.inject_datagram(0, [10, 0, 0, 1], 67, &nak);
    assert!(dhcp.tick(&mut driver)); // REQUEST -> START
    assert_eq!(dhcp.state(), DhcpState::Start);
    assert_eq!(dhcp.lease().local_ip, [0, 0, 0, 0]);
    assert_eq!(driver.get_ip().unwrap(), [0, 0, 0, 0]);
}

#[test]
fn dns_client_resolves_then_serves_from_cache() {
    let bus = FakeBus::new();
    bus.set_millis(10_000);
    let mut driver = W5500::new(bus.clone());
    driver.reset(mac(3), SocketBufferPlan::default()).unwrap();

    let socket = UdpSocket::open(&mut driver, SocketIndex::new(1).unwrap()).unwrap();
    let mut dns = DnsClient::new(socket, Default::default(), [8, 8, 8, 8]);

    let mut query_id = 0u16;
    assert!(dns.query(&mut driver, b"www.google.com", 10_000, &mut query_id));
    assert_eq!(query_id, w5500_net::crc16::of(b"www.google.com"));

    let response = build_dns_a_response(query_id, b"www.google.com", [142, 250, 80, 46], 300);
    bus.inject_datagram(1, [8, 8, 8, 8], 53, &response);
    dns.tick(&mut driver, 10_000);

    let mut ip = [0u8; 4];
    assert!(dns.get(query_id, 10_000, &mut ip));
    assert_eq!(ip, [142, 250, 80, 46]);
    assert!(!dns.get(query_id, 10_000 + 300_000 + 1, &mut ip));

    // A repeat query before expiry hits the cache: no datagram goes out, and
    // the fake chip has no pending RX so tick() would find nothing anyway.
    let mut query_id2 = 0u16;
    assert!(dns.query(&mut driver, b"www.google.com", 10_000 + 1, &mut query_id2));
    assert_eq!(query_id2, query_id);
}

#[test]
fn sntp_client_converts_response_timestamp() {
    let bus = FakeBus::new();
    bus.set_millis(5_000);
    let mut driver = W5500::new(bus.clone());
    driver.reset(mac(4), SocketBufferPlan::default()).unwrap();

    let socket = UdpSocket::open(&mut driver, SocketIndex::new(2).unwrap()).unwrap();
    let mut sntp = SntpClient::new(socket, [129, 6, 15, 28]);

    let mut now_ms = 0u64;
    assert!(!sntp.tick(&mut driver, 5_000, &mut now_ms)); // sends the request; nothing queued yet

    let mut response = [0u8; 48];
    response[40..44].copy_from_slice(&0xE62A_3B80u32.to_be_bytes());
    response[44..48].copy_from_slice(&0x8000_0000u32.to_be_bytes());
    bus.inject_datagram(2, [129, 6, 15, 28], 123, &response);

    assert!(sntp.tick(&mut driver, 5_050, &mut now_ms));
    assert_eq!(now_ms, 1_652_512_000_500);
}

#[test]
fn udp_ring_read_handles_wraparound() {
    let bus = FakeBus::new();
    bus.set_millis(0);
    let mut driver = W5500::new(bus.clone());
    driver.reset(mac(5), SocketBufferPlan::default()).unwrap();

    let idx = SocketIndex::new(3).unwrap();
    let _socket = UdpSocket::open(&mut driver, idx).unwrap();

    // Push both ring pointers to 4 bytes from the end of the 2 KiB buffer so
    // the 8-byte chip-inserted header straddles the wrap boundary.
    bus.set_socket_rx_ptrs(3, 2044, 2044);
    let payload = b"hello";
    bus.inject_datagram(3, [1, 2, 3, 4], 53, payload);

    let mut header = [0u8; 8];
    driver.peek(idx, &mut header).unwrap();
    assert_eq!(&header[0..4], &[1, 2, 3, 4]);
    assert_eq!(u16::from_be_bytes([header[6], header[7]]), payload.len() as u16);

    driver.read(idx, None, 8).unwrap(); // discard the header
    let mut out = [0u8; 5];
    driver.read(idx, Some(&mut out), 5).unwrap();
    assert_eq!(&out, payload);
}

#[test]
fn sockets_on_different_slots_do_not_interfere() {
    let bus = FakeBus::new();
    bus.set_millis(0);
    let mut driver = W5500::new(bus.clone());
    driver.reset(mac(6), SocketBufferPlan::default()).unwrap();

    let a = UdpSocket::open(&mut driver, SocketIndex::new(4).unwrap()).unwrap();
    let b = UdpSocket::open(&mut driver, SocketIndex::new(5).unwrap()).unwrap();

    bus.inject_datagram(4, [10, 0, 0, 1], 1000, b"for-a");
    assert!(!b.has_packet(&mut driver));
    assert!(a.has_packet(&mut driver));

    bus.inject_datagram(5, [10, 0, 0, 2], 2000, b"for-b");
    assert!(b.has_packet(&mut driver));
}
