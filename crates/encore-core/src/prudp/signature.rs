//! Packet signatures.
//!
//! ```text
//! SYN (client)        fixed SYN_SIGNATURE
//! DATA (either way)   HMAC-MD5(access key, seq | session | type_flags | payload)[..4]
//! other, inbound      server connection signature issued in SYN+ACK
//! other, outbound     client connection signature from its SYN
//! ```

use encore_crypto::data_signature;
use encore_proto::{Packet, PacketType, packet::SYN_SIGNATURE};

use crate::platform::AccessKey;

/// Signature an inbound client packet must carry.
pub fn expected_inbound(packet: &Packet, access_key: &AccessKey, server_signature: u32) -> u32 {
    match packet.packet_type {
        PacketType::Syn => SYN_SIGNATURE,
        PacketType::Data => data_signature(access_key.as_bytes(), &packet.signed_bytes()),
        PacketType::Connect | PacketType::Disconnect | PacketType::Ping => server_signature,
    }
}

/// Signature for an outbound server packet.
pub fn outbound(packet: &Packet, access_key: &AccessKey, client_signature: u32) -> u32 {
    match packet.packet_type {
        PacketType::Data => data_signature(access_key.as_bytes(), &packet.signed_bytes()),
        PacketType::Syn | PacketType::Connect | PacketType::Disconnect | PacketType::Ping => client_signature,
    }
}

/// Signature a client attaches to its own packet.
///
/// Mirror of [`expected_inbound`] for test clients and tools.
pub fn client_outbound(packet: &Packet, access_key: &AccessKey, server_signature: u32) -> u32 {
    expected_inbound(packet, access_key, server_signature)
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use encore_proto::PacketFlags;

    use super::*;
    use crate::platform::Platform;

    #[test]
    fn syn_uses_fixed_constant() {
        let key = Platform::Ps3.default_access_key();
        let syn = Packet::client(PacketType::Syn, PacketFlags::NEED_ACK, 1);
        assert_eq!(expected_inbound(&syn, &key, 0xABCD), SYN_SIGNATURE);
    }

    #[test]
    fn data_signature_covers_payload() {
        let key = Platform::Ps3.default_access_key();
        let mut data = Packet::client(PacketType::Data, PacketFlags::RELIABLE, 1);
        data.payload = Bytes::from_static(b"one");
        let a = expected_inbound(&data, &key, 0);
        data.payload = Bytes::from_static(b"two");
        let b = expected_inbound(&data, &key, 0);
        assert_ne!(a, b);
    }

    #[test]
    fn control_packets_use_connection_signatures() {
        let key = Platform::Wii.default_access_key();
        let ping = Packet::client(PacketType::Ping, PacketFlags::NEED_ACK, 1);
        assert_eq!(expected_inbound(&ping, &key, 0x1111), 0x1111);
        assert_eq!(outbound(&ping, &key, 0x2222), 0x2222);
    }
}
