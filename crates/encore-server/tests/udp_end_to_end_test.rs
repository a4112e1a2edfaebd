//! A console's full journey over real sockets.
//!
//! Logs in on the auth endpoint, takes the ticket to the secure endpoint
//! and makes a tunnel request there.

use std::{net::SocketAddr, time::Duration};

use bytes::Bytes;
use encore_core::{
    AccessKey, Endpoint, Platform,
    prudp::{ConnectPayload, fragment::Reassembler, signature},
};
use encore_crypto::{Rc4, SessionKey, verify_ticket};
use encore_proto::{
    Packet, PacketFlags, PacketType, ProtocolId, RmcRequest, RmcResponse, StreamReader, StreamWriter, protocol,
};
use encore_server::{MemoryStorage, Server, ServerRuntimeConfig};
use tokio::{net::UdpSocket, time::timeout};

const CLIENT_SIG: u32 = 0x0BAD_F00D;
const PATIENCE: Duration = Duration::from_secs(5);

/// Minimal PRUDP client for one endpoint.
struct Console {
    socket: UdpSocket,
    server: SocketAddr,
    key: AccessKey,
    session_id: u8,
    server_signature: u32,
    next_seq: u16,
    next_call: u32,
    outbound: Rc4,
    inbound: Rc4,
    reassembler: Reassembler,
}

impl Console {
    async fn new(server: SocketAddr, platform: Platform, session_id: u8) -> Self {
        let key = platform.default_access_key();
        Self {
            socket: UdpSocket::bind("127.0.0.1:0").await.unwrap(),
            server,
            key,
            session_id,
            server_signature: 0,
            next_seq: 1,
            next_call: 1,
            outbound: Rc4::new(key.as_bytes()).unwrap(),
            inbound: Rc4::new(key.as_bytes()).unwrap(),
            reassembler: Reassembler::new(),
        }
    }

    async fn send(&self, mut packet: Packet) {
        packet.signature = signature::client_outbound(&packet, &self.key, self.server_signature);
        let wire = packet.encode(self.key.checksum_seed()).unwrap();
        self.socket.send_to(&wire, self.server).await.unwrap();
    }

    async fn recv(&self) -> Packet {
        let mut buf = vec![0u8; 2048];
        let (len, _) = timeout(PATIENCE, self.socket.recv_from(&mut buf)).await.unwrap().unwrap();
        Packet::decode(&buf[..len], self.key.checksum_seed()).unwrap()
    }

    async fn recv_type(&self, packet_type: PacketType) -> Packet {
        loop {
            let packet = self.recv().await;
            if packet.packet_type == packet_type {
                return packet;
            }
        }
    }

    async fn syn(&mut self) {
        let mut p = Packet::client(PacketType::Syn, PacketFlags::NEED_ACK, self.session_id);
        p.connection_signature = Some(CLIENT_SIG);
        self.send(p).await;

        let reply = self.recv_type(PacketType::Syn).await;
        self.server_signature = reply.connection_signature.unwrap();
    }

    async fn connect(&mut self, payload: Bytes) -> Packet {
        let mut p = Packet::client(PacketType::Connect, PacketFlags::RELIABLE | PacketFlags::NEED_ACK, self.session_id);
        p.sequence_id = 1;
        p.connection_signature = Some(CLIENT_SIG);
        p.payload = payload;
        self.send(p).await;

        self.recv_type(PacketType::Connect).await
    }

    fn rekey(&mut self, session_key: &SessionKey) {
        self.outbound = Rc4::new(session_key.as_bytes()).unwrap();
        self.inbound = Rc4::new(session_key.as_bytes()).unwrap();
    }

    /// Send one request and wait for its response.
    async fn call(&mut self, protocol: ProtocolId, method: u32, params: StreamWriter) -> RmcResponse {
        let call_id = self.next_call;
        self.next_call += 1;
        let request = RmcRequest { protocol_id: protocol.to_u8(), call_id, method_id: method, parameters: params.freeze() };

        self.next_seq = self.next_seq.wrapping_add(1);
        let mut p = Packet::client(
            PacketType::Data,
            PacketFlags::RELIABLE | PacketFlags::NEED_ACK | PacketFlags::HAS_SIZE,
            self.session_id,
        );
        p.sequence_id = self.next_seq;
        p.payload = Bytes::from(self.outbound.process(&request.encode()));
        self.send(p).await;

        loop {
            let packet = self.recv_type(PacketType::Data).await;
            if packet.is_ack() {
                continue;
            }
            let plain = self.inbound.process(&packet.payload);
            if let Some(message) = self.reassembler.push(packet.fragment_id, &plain).unwrap() {
                let response = RmcResponse::decode(&message).unwrap();
                assert_eq!(response.call_id(), call_id);
                return response;
            }
        }
    }
}

fn success(response: RmcResponse) -> Bytes {
    match response {
        RmcResponse::Success { payload, .. } => payload,
        RmcResponse::Error { error_code, .. } => panic!("request failed with {error_code:#010x}"),
    }
}

#[tokio::test]
async fn login_then_secure_tunnel_request() {
    let config = ServerRuntimeConfig {
        listen_address: [127, 0, 0, 1].into(),
        auth_port: 0,
        secure_port: 0,
        ..ServerRuntimeConfig::default()
    };
    let server = Server::bind(config, MemoryStorage::new()).unwrap();
    let auth_addr = server.local_addr(Endpoint::Auth).unwrap();
    let secure_addr = server.local_addr(Endpoint::Secure).unwrap();
    let shutdown = server.shutdown_handle();
    let running = tokio::spawn(server.run());

    // auth endpoint: handshake and login
    let mut auth = Console::new(auth_addr, Platform::Ps3, 0x21).await;
    auth.syn().await;
    auth.connect(Bytes::new()).await;

    let mut params = StreamWriter::new();
    params.write_string("alice");
    let reply = success(auth.call(ProtocolId::Authentication, protocol::authentication::LOGIN, params).await);
    let mut reader = StreamReader::new(&reply);
    assert_eq!(reader.read_u32().unwrap(), protocol::LOGIN_RESULT_SUCCESS);
    let pid = reader.read_u32().unwrap();
    let ticket = reader.read_buffer().unwrap();
    let url = reader.read_string().unwrap();
    assert!(url.contains(&format!("port={}", secure_addr.port())), "{url}");

    // secure endpoint: present the ticket
    let session_key = verify_ticket(pid, "", &ticket).unwrap();
    let mut secure = Console::new(secure_addr, Platform::Ps3, 0x22).await;
    secure.syn().await;

    let challenge = 0x0102_0304;
    let connect = ConnectPayload { ticket, pid, challenge };
    let encrypted = Rc4::new(secure.key.as_bytes()).unwrap().process(&connect.encode());
    let ack = secure.connect(Bytes::from(encrypted)).await;

    secure.rekey(&session_key);
    let answer = secure.inbound.process(&ack.payload);
    let mut reader = StreamReader::new(&answer);
    assert_eq!(reader.read_u32().unwrap(), 4);
    assert_eq!(reader.read_u32().unwrap(), challenge + 1);

    let mut params = StreamWriter::new();
    params.write_string(&format!(r#"[["misc/get_accounts_setlist_creation_status",[["pid"],[{pid}]]]]"#));
    let reply = success(secure.call(ProtocolId::Json, protocol::json::REQUEST, params).await);
    assert_eq!(
        StreamReader::new(&reply).read_string().unwrap(),
        format!(r#"[["misc/get_accounts_setlist_creation_status","dd",["pid","creator"],[{pid},0]]]"#)
    );

    shutdown.shutdown();
    timeout(PATIENCE, running).await.unwrap().unwrap().unwrap();
}

#[tokio::test]
async fn forged_ticket_gets_no_connect_ack() {
    let config = ServerRuntimeConfig {
        listen_address: [127, 0, 0, 1].into(),
        auth_port: 0,
        secure_port: 0,
        ..ServerRuntimeConfig::default()
    };
    let server = Server::bind(config, MemoryStorage::new()).unwrap();
    let secure_addr = server.local_addr(Endpoint::Secure).unwrap();
    let shutdown = server.shutdown_handle();
    let running = tokio::spawn(server.run());

    let mut secure = Console::new(secure_addr, Platform::Wii, 0x31).await;
    secure.syn().await;

    let connect = ConnectPayload { ticket: Bytes::from_static(&[0xEE; 40]), pid: 1001, challenge: 9 };
    let encrypted = Rc4::new(secure.key.as_bytes()).unwrap().process(&connect.encode());
    let mut p = Packet::client(PacketType::Connect, PacketFlags::RELIABLE | PacketFlags::NEED_ACK, secure.session_id);
    p.sequence_id = 1;
    p.connection_signature = Some(CLIENT_SIG);
    p.payload = Bytes::from(encrypted);
    secure.send(p).await;

    let mut buf = vec![0u8; 2048];
    let outcome = timeout(Duration::from_millis(500), secure.socket.recv_from(&mut buf)).await;
    if let Ok(Ok((len, _))) = outcome {
        let packet = Packet::decode(&buf[..len], secure.key.checksum_seed()).unwrap();
        assert_ne!(packet.packet_type, PacketType::Connect);
    }

    shutdown.shutdown();
    timeout(PATIENCE, running).await.unwrap().unwrap().unwrap();
}
