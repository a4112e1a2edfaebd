//! End-to-end PRUDP handshake over encoded datagrams
//!
//! A minimal client drives a server-side `Connection` through SYN, a secure
//! CONNECT carrying a real ticket, and DATA in both directions. Every packet
//! goes through `Packet::encode`/`Packet::decode` with the platform's
//! checksum seed.

use std::time::Duration;

use bytes::Bytes;
use encore_core::{
    platform::{AccessKey, AccessKeys, Platform},
    prudp::{
        ConnectPayload, Connection, ConnectionAction, ConnectionConfig, ConnectionState, fragment::Reassembler,
        signature,
    },
    session::Endpoint,
};
use encore_crypto::{Rc4, SessionKey, build_ticket, verify_ticket};
use encore_proto::{Packet, PacketFlags, PacketType};

type T = Duration;

const SERVER_SIG: u32 = 0x1357_9BDF;
const CLIENT_SIG: u32 = 0x2468_ACE0;
const PID: u32 = 1001;
const PASSWORD: &str = "";

struct TestClient {
    key: AccessKey,
    session_id: u8,
    server_signature: u32,
    next_seq: u16,
    outbound: Rc4,
    inbound: Rc4,
    reassembler: Reassembler,
}

impl TestClient {
    fn new(platform: Platform) -> Self {
        let key = platform.default_access_key();
        Self {
            key,
            session_id: 0x42,
            server_signature: 0,
            next_seq: 1,
            outbound: Rc4::new(key.as_bytes()).unwrap(),
            inbound: Rc4::new(key.as_bytes()).unwrap(),
            reassembler: Reassembler::new(),
        }
    }

    fn wire(&self, packet: &Packet) -> Bytes {
        packet.encode(self.key.checksum_seed()).unwrap()
    }

    fn sign(&self, mut packet: Packet) -> Bytes {
        packet.signature = signature::client_outbound(&packet, &self.key, self.server_signature);
        self.wire(&packet)
    }

    fn syn(&self) -> Bytes {
        let mut p = Packet::client(PacketType::Syn, PacketFlags::NEED_ACK, self.session_id);
        p.connection_signature = Some(CLIENT_SIG);
        self.sign(p)
    }

    fn connect(&self, payload: &ConnectPayload) -> Bytes {
        let mut p = Packet::client(PacketType::Connect, PacketFlags::RELIABLE | PacketFlags::NEED_ACK, self.session_id);
        p.sequence_id = 1;
        p.connection_signature = Some(CLIENT_SIG);
        p.payload = Bytes::from(Rc4::new(self.key.as_bytes()).unwrap().process(&payload.encode()));
        self.sign(p)
    }

    fn rekey(&mut self, session_key: &SessionKey) {
        self.outbound = Rc4::new(session_key.as_bytes()).unwrap();
        self.inbound = Rc4::new(session_key.as_bytes()).unwrap();
    }

    fn data(&mut self, message: &[u8]) -> Bytes {
        self.next_seq = self.next_seq.wrapping_add(1);
        let mut p = Packet::client(
            PacketType::Data,
            PacketFlags::RELIABLE | PacketFlags::NEED_ACK | PacketFlags::HAS_SIZE,
            self.session_id,
        );
        p.sequence_id = self.next_seq;
        p.payload = Bytes::from(self.outbound.process(message));
        self.sign(p)
    }

    fn receive(&mut self, packet: &Packet) -> Option<Bytes> {
        let plain = self.inbound.process(&packet.payload);
        self.reassembler.push(packet.fragment_id, &plain).unwrap()
    }
}

fn server_step(conn: &mut Connection<T>, datagram: &[u8], now: T) -> Vec<ConnectionAction> {
    let packet = Packet::decode(datagram, conn.checksum_seed()).unwrap();
    conn.handle_packet(packet, now).unwrap()
}

fn sent(actions: &[ConnectionAction], seed: u8) -> Vec<Packet> {
    actions
        .iter()
        .filter_map(|a| match a {
            ConnectionAction::Send(p) => Some(Packet::decode(&p.encode(seed).unwrap(), seed).unwrap()),
            _ => None,
        })
        .collect()
}

#[test]
fn secure_handshake_with_ticket_then_data() {
    let mut client = TestClient::new(Platform::Wii);
    let (platform, key) = AccessKeys::default().detect(&client.syn()).unwrap();
    assert_eq!(platform, Platform::Wii);

    let mut conn = Connection::new(Endpoint::Secure, key, SERVER_SIG, ConnectionConfig::default(), T::ZERO).unwrap();
    let seed = conn.checksum_seed();

    // SYN
    let replies = sent(&server_step(&mut conn, &client.syn(), T::ZERO), seed);
    assert_eq!(replies[0].signature, CLIENT_SIG);
    client.server_signature = replies[0].connection_signature.unwrap();

    // CONNECT with a ticket issued for PID
    let session_key = SessionKey::from_bytes([0x5A; 16]);
    let ticket = build_ticket(PID, PASSWORD, &session_key, &[0x11; 16]).unwrap();
    let payload = ConnectPayload { ticket: Bytes::from(ticket.ticket), pid: PID, challenge: 0xFFFF_FFFF };

    let actions = server_step(&mut conn, &client.connect(&payload), T::ZERO);
    let ConnectionAction::VerifyTicket(request) = &actions[0] else {
        panic!("expected ticket verification, got {actions:?}");
    };
    let recovered = verify_ticket(request.pid, PASSWORD, &request.ticket).unwrap();
    assert_eq!(recovered, session_key);

    let replies = sent(&conn.accept_connect(&recovered, request.challenge, T::ZERO).unwrap(), seed);
    client.rekey(&session_key);
    let answer = client.inbound.process(&replies[0].payload);
    assert_eq!(answer, [4, 0, 0, 0, 0, 0, 0, 0], "challenge + 1 wraps");
    assert_eq!(conn.state(), ConnectionState::Connected);

    // DATA client -> server
    let actions = server_step(&mut conn, &client.data(b"hello server"), T::from_millis(10));
    assert!(actions.contains(&ConnectionAction::Deliver(Bytes::from_static(b"hello server"))));

    // fragmented DATA server -> client
    let big: Vec<u8> = (0..2_000u32).map(|i| i as u8).collect();
    let packets = sent(&conn.send(&Bytes::from(big.clone()), T::from_millis(20)).unwrap(), seed);
    assert_eq!(packets.len(), 3);

    let mut delivered = None;
    for p in &packets {
        if let Some(message) = client.receive(p) {
            delivered = Some(message);
        }
    }
    assert_eq!(delivered.as_deref(), Some(big.as_slice()));
}

#[test]
fn ticket_for_another_pid_is_rejected() {
    let mut client = TestClient::new(Platform::Ps3);
    let key = client.key;
    let mut conn = Connection::new(Endpoint::Secure, key, SERVER_SIG, ConnectionConfig::default(), T::ZERO).unwrap();

    let replies = sent(&server_step(&mut conn, &client.syn(), T::ZERO), conn.checksum_seed());
    client.server_signature = replies[0].connection_signature.unwrap();

    let ticket = build_ticket(PID, PASSWORD, &SessionKey::from_bytes([1; 16]), &[2; 16]).unwrap();
    let payload = ConnectPayload { ticket: Bytes::from(ticket.ticket), pid: PID + 1, challenge: 7 };

    let actions = server_step(&mut conn, &client.connect(&payload), T::ZERO);
    let ConnectionAction::VerifyTicket(request) = &actions[0] else {
        panic!("expected ticket verification");
    };
    assert!(verify_ticket(request.pid, PASSWORD, &request.ticket).is_err());

    let actions = conn.reject_connect("ticket rejected");
    assert!(matches!(&actions[0], ConnectionAction::Close { .. }));
    assert_eq!(conn.state(), ConnectionState::Closed);
}

#[test]
fn datagram_with_wrong_key_fails_checksum() {
    let client = TestClient::new(Platform::Xbox360);
    let other_seed = Platform::Ps3.default_access_key().checksum_seed();
    assert!(Packet::decode(&client.syn(), other_seed).is_err());
}
