//! Per-client PRUDP state machine.
//!
//! Methods take time as input and return actions for the driver. No I/O,
//! no clock, no randomness: the server signature is supplied at
//! construction and session keys arrive through [`Connection::accept_connect`].
//!
//! # Handshake
//!
//! ```text
//! client                          server
//!   SYN (sig 0, conn_sig Sc)  ─>
//!                             <─  SYN|ACK (sig Sc, conn_sig Ss)
//!   CONNECT (sig Ss, payload) ─>
//!                                 secure endpoint: VerifyTicket, driver checks
//!                                 the ticket and calls accept_connect
//!                             <─  CONNECT|ACK (sig Sc, RC4_session(challenge + 1))
//!   DATA ...                  <─> DATA ...
//! ```

use std::{
    fmt,
    ops::{Add, Sub},
    time::Duration,
};

use bytes::{BufMut, Bytes, BytesMut};
use encore_crypto::{Rc4, SessionKey};
use encore_proto::{Packet, PacketFlags, PacketType, StreamReader, StreamWriter};

use super::{
    ConnectionConfig,
    fragment::{self, Reassembler},
    reliability::{Arrival, InboundWindow, RetransmitQueue, SequenceCounter},
    signature,
};
use crate::{error::ConnectionError, platform::AccessKey, session::Endpoint};

/// Actions returned by the connection state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionAction {
    /// Encode and send this packet
    Send(Packet),

    /// A complete, decrypted RMC message
    Deliver(Bytes),

    /// Secure CONNECT received; verify the ticket, then call
    /// [`Connection::accept_connect`] or [`Connection::reject_connect`]
    VerifyTicket(ConnectPayload),

    /// Close the connection with this reason
    Close {
        /// Reason for closing
        reason: String,
    },
}

/// Connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// Waiting for SYN
    Listen,
    /// SYN answered, waiting for CONNECT
    SynReceived,
    /// Secure CONNECT received, ticket under verification
    ConnectPending,
    /// DATA may flow
    Connected,
    /// Closed (graceful or error)
    Closed,
}

/// Decrypted payload of a secure-endpoint CONNECT.
///
/// ```text
/// buffer{ticket} | pid u32 | challenge u32
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectPayload {
    /// Ticket issued by the auth endpoint
    pub ticket: Bytes,
    /// Principal the client claims
    pub pid: u32,
    /// Nonce the server answers with `challenge + 1`
    pub challenge: u32,
}

impl ConnectPayload {
    /// Parse a decrypted CONNECT payload.
    pub fn decode(bytes: &[u8]) -> Result<Self, ConnectionError> {
        let mut reader = StreamReader::new(bytes);
        let parse = |reader: &mut StreamReader<'_>| -> encore_proto::Result<Self> {
            Ok(Self { ticket: reader.read_buffer()?, pid: reader.read_u32()?, challenge: reader.read_u32()? })
        };
        parse(&mut reader).map_err(|e| ConnectionError::MalformedConnect(e.to_string()))
    }

    /// Encode (before encryption).
    pub fn encode(&self) -> Bytes {
        let mut writer = StreamWriter::new();
        writer.write_buffer(&self.ticket).write_u32(self.pid).write_u32(self.challenge);
        writer.freeze()
    }
}

/// PRUDP connection state machine for one client.
///
/// # Invariants
///
/// - DATA payloads are decrypted strictly in sequence order, so both RC4
///   streams stay aligned with the peer's
/// - Every reliable outbound packet stays queued until acknowledged or the
///   retransmit cap closes the connection
pub struct Connection<I> {
    state: ConnectionState,
    endpoint: Endpoint,
    config: ConnectionConfig,
    access_key: AccessKey,
    session_id: u8,
    client_signature: u32,
    server_signature: u32,
    inbound_cipher: Rc4,
    outbound_cipher: Rc4,
    outbound_sequence: SequenceCounter,
    inbound: Option<InboundWindow<Packet>>,
    retransmit: RetransmitQueue<I>,
    reassembler: Reassembler,
    last_activity: I,
    syn_ack: Option<Packet>,
    connect_ack: Option<Packet>,
    connect_sequence: u16,
}

impl<I> fmt::Debug for Connection<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("state", &self.state)
            .field("endpoint", &self.endpoint)
            .field("session_id", &self.session_id)
            .field("client_signature", &self.client_signature)
            .field("server_signature", &self.server_signature)
            .finish_non_exhaustive()
    }
}

impl<I> Connection<I>
where
    I: Copy + Ord + Sub<Output = Duration> + Add<Duration, Output = I>,
{
    /// New connection in [`ConnectionState::Listen`].
    ///
    /// `server_signature` is the random connection signature this server
    /// issues in its SYN+ACK.
    pub fn new(
        endpoint: Endpoint,
        access_key: AccessKey,
        server_signature: u32,
        config: ConnectionConfig,
        now: I,
    ) -> Result<Self, ConnectionError> {
        Ok(Self {
            state: ConnectionState::Listen,
            endpoint,
            inbound_cipher: Rc4::new(access_key.as_bytes())?,
            outbound_cipher: Rc4::new(access_key.as_bytes())?,
            retransmit: RetransmitQueue::new(config.retransmit_timeout, config.max_retransmits),
            config,
            access_key,
            session_id: 0,
            client_signature: 0,
            server_signature,
            outbound_sequence: SequenceCounter::new(1),
            inbound: None,
            reassembler: Reassembler::new(),
            last_activity: now,
            syn_ack: None,
            connect_ack: None,
            connect_sequence: 0,
        })
    }

    /// Current state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Endpoint this connection belongs to.
    pub fn endpoint(&self) -> Endpoint {
        self.endpoint
    }

    /// Access key of the client's platform.
    pub fn access_key(&self) -> &AccessKey {
        &self.access_key
    }

    /// Checksum seed for encoding and decoding this client's datagrams.
    pub fn checksum_seed(&self) -> u8 {
        self.access_key.checksum_seed()
    }

    /// Session id chosen by the client at SYN.
    pub fn session_id(&self) -> u8 {
        self.session_id
    }

    /// Connection signature the client sent in its SYN.
    pub fn client_signature(&self) -> u32 {
        self.client_signature
    }

    /// Connection signature this server issued.
    pub fn server_signature(&self) -> u32 {
        self.server_signature
    }

    /// Reliable packets awaiting acknowledgement.
    pub fn unacknowledged(&self) -> usize {
        self.retransmit.len()
    }

    fn reply(&self, packet_type: PacketType, flags: PacketFlags, sequence_id: u16) -> Packet {
        let mut packet = Packet::server(packet_type, flags, self.session_id);
        packet.sequence_id = sequence_id;
        packet
    }

    fn sign(&self, mut packet: Packet) -> Packet {
        packet.signature = signature::outbound(&packet, &self.access_key, self.client_signature);
        packet
    }

    /// Process one decoded inbound packet.
    ///
    /// # Errors
    ///
    /// - `InvalidState` if the connection is closed
    /// - `SessionMismatch` if the session id differs from the SYN's
    /// - `BadSignature` if the signature does not verify
    /// - `UnexpectedPacket` if the type is not valid in the current state
    /// - `MalformedConnect` if a secure CONNECT payload cannot be parsed
    /// - `MessageTooLarge` if reassembly exceeds the size cap
    pub fn handle_packet(&mut self, packet: Packet, now: I) -> Result<Vec<ConnectionAction>, ConnectionError> {
        if self.state == ConnectionState::Closed {
            return Err(ConnectionError::InvalidState { state: self.state, operation: "handle_packet" });
        }

        if self.state != ConnectionState::Listen && packet.session_id != self.session_id {
            return Err(ConnectionError::SessionMismatch { expected: self.session_id, actual: packet.session_id });
        }

        let expected = signature::expected_inbound(&packet, &self.access_key, self.server_signature);
        if packet.signature != expected {
            return Err(ConnectionError::BadSignature { expected, actual: packet.signature });
        }

        self.last_activity = now;

        if packet.is_ack() {
            self.handle_ack(&packet);
            return Ok(Vec::new());
        }

        match (self.state, packet.packet_type) {
            (ConnectionState::Listen, PacketType::Syn) => Ok(self.handle_syn(&packet)),
            (ConnectionState::SynReceived, PacketType::Syn) => {
                Ok(self.syn_ack.clone().map(ConnectionAction::Send).into_iter().collect())
            },
            (ConnectionState::SynReceived, PacketType::Connect) => self.handle_connect(&packet),
            (ConnectionState::ConnectPending, PacketType::Connect) => Ok(Vec::new()),
            (ConnectionState::Connected, PacketType::Connect) => {
                Ok(self.connect_ack.clone().map(ConnectionAction::Send).into_iter().collect())
            },
            (ConnectionState::Connected, PacketType::Data) => self.handle_data(packet),
            (_, PacketType::Ping) => {
                let pong = self.sign(self.reply(PacketType::Ping, PacketFlags::ACK, packet.sequence_id));
                Ok(vec![ConnectionAction::Send(pong)])
            },
            (_, PacketType::Disconnect) => {
                let ack = self.sign(self.reply(PacketType::Disconnect, PacketFlags::ACK, packet.sequence_id));
                self.state = ConnectionState::Closed;
                Ok(vec![ConnectionAction::Send(ack), ConnectionAction::Close { reason: "peer disconnect".to_string() }])
            },
            (state, packet_type) => Err(ConnectionError::UnexpectedPacket { state, packet_type }),
        }
    }

    fn handle_syn(&mut self, packet: &Packet) -> Vec<ConnectionAction> {
        self.session_id = packet.session_id;
        self.client_signature = packet.connection_signature.unwrap_or_default();
        self.state = ConnectionState::SynReceived;

        let mut syn_ack = self.reply(PacketType::Syn, PacketFlags::ACK, packet.sequence_id);
        syn_ack.connection_signature = Some(self.server_signature);
        let syn_ack = self.sign(syn_ack);
        self.syn_ack = Some(syn_ack.clone());

        vec![ConnectionAction::Send(syn_ack)]
    }

    fn handle_connect(&mut self, packet: &Packet) -> Result<Vec<ConnectionAction>, ConnectionError> {
        self.connect_sequence = packet.sequence_id;

        match self.endpoint {
            Endpoint::Auth => {
                let ack = self.finish_connect(Bytes::new());
                Ok(vec![ConnectionAction::Send(ack)])
            },
            Endpoint::Secure => {
                // CONNECT payloads use a fresh access-key stream, independent
                // of the DATA ciphers.
                let plain = Rc4::new(self.access_key.as_bytes())?.process(&packet.payload);
                let payload = ConnectPayload::decode(&plain)?;
                self.state = ConnectionState::ConnectPending;
                Ok(vec![ConnectionAction::VerifyTicket(payload)])
            },
        }
    }

    fn finish_connect(&mut self, payload: Bytes) -> Packet {
        let mut ack = self.reply(PacketType::Connect, PacketFlags::ACK, self.connect_sequence);
        ack.connection_signature = Some(self.server_signature);
        ack.payload = payload;
        let ack = self.sign(ack);

        self.inbound = Some(InboundWindow::new(self.connect_sequence.wrapping_add(1), self.config.reorder_window));
        self.connect_ack = Some(ack.clone());
        self.state = ConnectionState::Connected;
        ack
    }

    /// Complete a secure CONNECT after the ticket verified.
    ///
    /// Rekeys both ciphers with `session_key` and answers with the encrypted
    /// `challenge + 1`.
    ///
    /// # Errors
    ///
    /// - `InvalidState` unless a CONNECT is awaiting verification
    pub fn accept_connect(
        &mut self,
        session_key: &SessionKey,
        challenge: u32,
        now: I,
    ) -> Result<Vec<ConnectionAction>, ConnectionError> {
        if self.state != ConnectionState::ConnectPending {
            return Err(ConnectionError::InvalidState { state: self.state, operation: "accept_connect" });
        }

        self.inbound_cipher = Rc4::new(session_key.as_bytes())?;
        self.outbound_cipher = Rc4::new(session_key.as_bytes())?;
        self.last_activity = now;

        let mut response = BytesMut::with_capacity(8);
        response.put_u32_le(4);
        response.put_u32_le(challenge.wrapping_add(1));
        self.outbound_cipher.apply(&mut response);

        let ack = self.finish_connect(response.freeze());
        Ok(vec![ConnectionAction::Send(ack)])
    }

    /// Refuse a secure CONNECT whose ticket did not verify.
    pub fn reject_connect(&mut self, reason: impl Into<String>) -> Vec<ConnectionAction> {
        self.state = ConnectionState::Closed;
        vec![ConnectionAction::Close { reason: reason.into() }]
    }

    fn handle_ack(&mut self, packet: &Packet) {
        if packet.flags.contains(PacketFlags::MULTI_ACK) {
            let mut reader = StreamReader::new(&packet.payload);
            let Ok(count) = reader.read_u16() else {
                return;
            };
            for _ in 0..count {
                let Ok(seq) = reader.read_u16() else {
                    return;
                };
                self.retransmit.acknowledge(seq);
            }
        } else if packet.packet_type == PacketType::Data {
            self.retransmit.acknowledge(packet.sequence_id);
        }
    }

    fn handle_data(&mut self, packet: Packet) -> Result<Vec<ConnectionAction>, ConnectionError> {
        let sequence_id = packet.sequence_id;
        let need_ack = packet.flags.contains(PacketFlags::NEED_ACK);

        let Some(window) = self.inbound.as_mut() else {
            return Err(ConnectionError::InvalidState { state: self.state, operation: "handle_data" });
        };
        let arrival = window.accept(sequence_id, packet);

        let mut actions = Vec::new();
        if need_ack && arrival != Arrival::OutOfWindow {
            let ack = self.sign(self.reply(PacketType::Data, PacketFlags::ACK, sequence_id));
            actions.push(ConnectionAction::Send(ack));
        }

        if let Arrival::Ready(packets) = arrival {
            for packet in packets {
                let plain = self.inbound_cipher.process(&packet.payload);
                if let Some(message) = self.reassembler.push(packet.fragment_id, &plain)? {
                    actions.push(ConnectionAction::Deliver(message));
                }
            }
        }

        Ok(actions)
    }

    /// Queue `message` for reliable delivery, fragmenting as needed.
    ///
    /// # Errors
    ///
    /// - `InvalidState` unless connected
    pub fn send(&mut self, message: &Bytes, now: I) -> Result<Vec<ConnectionAction>, ConnectionError> {
        if self.state != ConnectionState::Connected {
            return Err(ConnectionError::InvalidState { state: self.state, operation: "send" });
        }

        let mut actions = Vec::new();
        for (fragment_id, chunk) in fragment::split(message, self.config.fragment_size) {
            let sequence_id = self.outbound_sequence.next_id();
            let mut packet = self.reply(
                PacketType::Data,
                PacketFlags::RELIABLE | PacketFlags::NEED_ACK | PacketFlags::HAS_SIZE,
                sequence_id,
            );
            packet.fragment_id = fragment_id;
            packet.payload = Bytes::from(self.outbound_cipher.process(&chunk));
            let packet = self.sign(packet);

            self.retransmit.track(packet.clone(), now);
            actions.push(ConnectionAction::Send(packet));
        }

        Ok(actions)
    }

    /// Periodic maintenance: idle eviction and retransmission.
    pub fn tick(&mut self, now: I) -> Vec<ConnectionAction> {
        if self.state == ConnectionState::Closed {
            return Vec::new();
        }

        let elapsed = now - self.last_activity;
        if elapsed > self.config.idle_timeout {
            self.state = ConnectionState::Closed;
            return vec![ConnectionAction::Close { reason: ConnectionError::IdleTimeout { elapsed }.to_string() }];
        }

        match self.retransmit.due(now) {
            Ok(packets) => packets.into_iter().map(ConnectionAction::Send).collect(),
            Err(err) => {
                self.state = ConnectionState::Closed;
                vec![ConnectionAction::Close { reason: err.to_string() }]
            },
        }
    }

    /// Server-initiated disconnect.
    pub fn disconnect(&mut self) -> Vec<ConnectionAction> {
        if self.state == ConnectionState::Closed {
            return Vec::new();
        }
        let sequence_id = self.outbound_sequence.next_id();
        let packet = self.sign(self.reply(PacketType::Disconnect, PacketFlags::empty(), sequence_id));
        self.state = ConnectionState::Closed;
        vec![ConnectionAction::Send(packet), ConnectionAction::Close { reason: "server disconnect".to_string() }]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::Platform;

    type T = Duration;

    const SERVER_SIG: u32 = 0x5EED_0001;
    const CLIENT_SIG: u32 = 0xC11E_0002;

    fn key() -> AccessKey {
        Platform::Ps3.default_access_key()
    }

    fn client_packet(packet_type: PacketType, flags: PacketFlags, seq: u16) -> Packet {
        let mut p = Packet::client(packet_type, flags, 9);
        p.sequence_id = seq;
        p
    }

    fn signed(mut p: Packet) -> Packet {
        p.signature = signature::client_outbound(&p, &key(), SERVER_SIG);
        p
    }

    fn syn() -> Packet {
        let mut p = client_packet(PacketType::Syn, PacketFlags::NEED_ACK, 0);
        p.connection_signature = Some(CLIENT_SIG);
        signed(p)
    }

    fn connect(payload: Bytes) -> Packet {
        let mut p = client_packet(PacketType::Connect, PacketFlags::RELIABLE | PacketFlags::NEED_ACK, 1);
        p.connection_signature = Some(CLIENT_SIG);
        p.payload = payload;
        signed(p)
    }

    fn auth_connection() -> Connection<T> {
        let mut c = Connection::new(Endpoint::Auth, key(), SERVER_SIG, ConnectionConfig::default(), T::ZERO).unwrap();
        c.handle_packet(syn(), T::ZERO).unwrap();
        c.handle_packet(connect(Bytes::new()), T::ZERO).unwrap();
        c
    }

    fn sent(actions: &[ConnectionAction]) -> Vec<&Packet> {
        actions
            .iter()
            .filter_map(|a| match a {
                ConnectionAction::Send(p) => Some(p),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn syn_is_answered_with_server_signature() {
        let mut c = Connection::new(Endpoint::Auth, key(), SERVER_SIG, ConnectionConfig::default(), T::ZERO).unwrap();
        let actions = c.handle_packet(syn(), T::ZERO).unwrap();

        let reply = sent(&actions)[0];
        assert_eq!(reply.packet_type, PacketType::Syn);
        assert!(reply.flags.contains(PacketFlags::ACK));
        assert_eq!(reply.signature, CLIENT_SIG);
        assert_eq!(reply.connection_signature, Some(SERVER_SIG));
        assert_eq!(c.state(), ConnectionState::SynReceived);
        assert_eq!(c.client_signature(), CLIENT_SIG);
    }

    #[test]
    fn auth_connect_needs_no_ticket() {
        let c = auth_connection();
        assert_eq!(c.state(), ConnectionState::Connected);
    }

    #[test]
    fn connect_with_wrong_signature_is_dropped() {
        let mut c = Connection::new(Endpoint::Auth, key(), SERVER_SIG, ConnectionConfig::default(), T::ZERO).unwrap();
        c.handle_packet(syn(), T::ZERO).unwrap();

        let mut bad = connect(Bytes::new());
        bad.signature ^= 1;
        assert!(matches!(c.handle_packet(bad, T::ZERO), Err(ConnectionError::BadSignature { .. })));
        assert_eq!(c.state(), ConnectionState::SynReceived);
    }

    #[test]
    fn secure_connect_requests_verification() {
        let payload = ConnectPayload { ticket: Bytes::from_static(&[1, 2, 3]), pid: 1001, challenge: 41 };
        let encrypted = Rc4::new(key().as_bytes()).unwrap().process(&payload.encode());

        let mut c =
            Connection::new(Endpoint::Secure, key(), SERVER_SIG, ConnectionConfig::default(), T::ZERO).unwrap();
        c.handle_packet(syn(), T::ZERO).unwrap();
        let actions = c.handle_packet(connect(Bytes::from(encrypted)), T::ZERO).unwrap();

        assert_eq!(actions, vec![ConnectionAction::VerifyTicket(payload)]);
        assert_eq!(c.state(), ConnectionState::ConnectPending);

        let session_key = SessionKey::from_bytes([9; 16]);
        let actions = c.accept_connect(&session_key, 41, T::ZERO).unwrap();
        let ack = sent(&actions)[0];
        let plain = Rc4::new(session_key.as_bytes()).unwrap().process(&ack.payload);
        assert_eq!(plain, [4, 0, 0, 0, 42, 0, 0, 0]);
        assert_eq!(c.state(), ConnectionState::Connected);
    }

    #[test]
    fn out_of_order_data_is_delivered_in_order() {
        let mut c = auth_connection();
        let mut client_cipher = Rc4::new(key().as_bytes()).unwrap();

        let mut packets = Vec::new();
        for (i, text) in [&b"first"[..], b"second"].iter().enumerate() {
            let mut p = client_packet(PacketType::Data, PacketFlags::RELIABLE | PacketFlags::NEED_ACK, 2 + i as u16);
            p.payload = Bytes::from(client_cipher.process(text));
            packets.push(signed(p));
        }

        let second = c.handle_packet(packets[1].clone(), T::ZERO).unwrap();
        assert_eq!(sent(&second).len(), 1);
        assert!(!second.iter().any(|a| matches!(a, ConnectionAction::Deliver(_))));

        let first = c.handle_packet(packets[0].clone(), T::ZERO).unwrap();
        let delivered: Vec<&Bytes> = first
            .iter()
            .filter_map(|a| match a {
                ConnectionAction::Deliver(m) => Some(m),
                _ => None,
            })
            .collect();
        assert_eq!(delivered, vec![&Bytes::from_static(b"first"), &Bytes::from_static(b"second")]);

        // duplicate is re-acknowledged, not redelivered
        let dup = c.handle_packet(packets[0].clone(), T::ZERO).unwrap();
        assert_eq!(dup.len(), 1);
        assert!(matches!(&dup[0], ConnectionAction::Send(p) if p.flags.contains(PacketFlags::ACK)));
    }

    #[test]
    fn large_send_fragments_and_waits_for_acks() {
        let mut c = auth_connection();
        let message = Bytes::from(vec![0xAB; 1600]);
        let actions = c.send(&message, T::ZERO).unwrap();

        let packets = sent(&actions);
        assert_eq!(packets.len(), 3);
        assert_eq!(packets.iter().map(|p| p.fragment_id).collect::<Vec<_>>(), vec![1, 2, 0]);
        assert_eq!(c.unacknowledged(), 3);

        let mut multi = client_packet(PacketType::Data, PacketFlags::MULTI_ACK, 0);
        let mut payload = BytesMut::new();
        payload.put_u16_le(2);
        payload.put_u16_le(packets[0].sequence_id);
        payload.put_u16_le(packets[1].sequence_id);
        multi.payload = payload.freeze();
        c.handle_packet(signed(multi), T::ZERO).unwrap();
        assert_eq!(c.unacknowledged(), 1);

        let ack = signed(client_packet(PacketType::Data, PacketFlags::ACK, packets[2].sequence_id));
        c.handle_packet(ack, T::ZERO).unwrap();
        assert_eq!(c.unacknowledged(), 0);
    }

    #[test]
    fn retransmit_cap_closes() {
        let config = ConnectionConfig { max_retransmits: 2, ..ConnectionConfig::default() };
        let mut c = Connection::new(Endpoint::Auth, key(), SERVER_SIG, config, T::ZERO).unwrap();
        c.handle_packet(syn(), T::ZERO).unwrap();
        c.handle_packet(connect(Bytes::new()), T::ZERO).unwrap();
        c.send(&Bytes::from_static(b"x"), T::ZERO).unwrap();

        let keep_alive = |c: &mut Connection<T>, t: T| {
            let ping = signed(client_packet(PacketType::Ping, PacketFlags::NEED_ACK, 7));
            c.handle_packet(ping, t).unwrap();
        };

        keep_alive(&mut c, T::from_secs(1));
        assert_eq!(sent(&c.tick(T::from_secs(1))).len(), 1);
        keep_alive(&mut c, T::from_secs(3));
        let actions = c.tick(T::from_secs(3));
        assert!(matches!(&actions[0], ConnectionAction::Close { .. }));
        assert_eq!(c.state(), ConnectionState::Closed);
    }

    #[test]
    fn idle_timeout_closes() {
        let mut c = auth_connection();
        assert!(c.tick(T::from_secs(60)).is_empty());
        let actions = c.tick(T::from_secs(61));
        assert!(matches!(&actions[0], ConnectionAction::Close { .. }));
    }

    #[test]
    fn disconnect_acks_and_closes() {
        let mut c = auth_connection();
        let actions = c.handle_packet(signed(client_packet(PacketType::Disconnect, PacketFlags::empty(), 5)), T::ZERO);
        let actions = actions.unwrap();

        assert!(matches!(&actions[0], ConnectionAction::Send(p) if p.packet_type == PacketType::Disconnect));
        assert!(matches!(&actions[1], ConnectionAction::Close { .. }));
        assert!(c.handle_packet(syn(), T::ZERO).is_err());
    }

    #[test]
    fn data_before_connect_is_unexpected() {
        let mut c = Connection::new(Endpoint::Auth, key(), SERVER_SIG, ConnectionConfig::default(), T::ZERO).unwrap();
        c.handle_packet(syn(), T::ZERO).unwrap();
        let data = signed(client_packet(PacketType::Data, PacketFlags::RELIABLE, 2));
        assert!(matches!(c.handle_packet(data, T::ZERO), Err(ConnectionError::UnexpectedPacket { .. })));
    }
}
