//! ## Encoder for http payloads
//!
//! There is 3 different encoders:
//! * engine.io v4 encoder
//! * engine.io v3 encoder:
//!    * string encoder (used when there is no binary packet or when the channel does not support binary)
//!    * binary encoder (used when there are binary packets and the channel supports binary)
//!
//! Splitting the packets according to the server `maxPayload` is done by the caller
//! with [`Packet::get_size_hint`].

use bytes::{BufMut, BytesMut};

use crate::{
    Packet,
    payload::{
        BINARY_PACKET_SEPARATOR_V3, PACKET_SEPARATOR_V4, Payload, STRING_PACKET_SEPARATOR_V3,
    },
};

/// Encode multiple packets into a string payload according to the
/// [engine.io v4 protocol](https://socket.io/fr/docs/v4/engine-io-protocol/#http-long-polling-1)
pub fn v4_encoder(packets: impl IntoIterator<Item = Packet>) -> Payload {
    #[cfg(feature = "tracing")]
    tracing::trace!("encoding payload with v4 encoder");
    let mut data = BytesMut::new();

    for packet in packets {
        let packet: String = packet.into();
        if !data.is_empty() {
            data.put_u8(PACKET_SEPARATOR_V4);
        }
        data.put_slice(packet.as_bytes());
    }

    Payload::new(data.freeze(), false)
}

/// Encode one packet into a *binary* payload record according to the
/// [engine.io v3 protocol](https://github.com/socketio/engine.io-protocol/tree/v3#payload)
pub fn v3_bin_packet_encoder(packet: Packet, data: &mut BytesMut) {
    let mut itoa = itoa::Buffer::new();
    match packet {
        Packet::Binary(bin) => {
            let len = itoa.format(bin.len() + 1);

            data.reserve(1 + len.len() + 2 + bin.len());

            data.put_u8(0x1); // 1 = binary
            for digit in len.bytes() {
                data.put_u8(digit - b'0');
            }
            data.put_u8(BINARY_PACKET_SEPARATOR_V3);
            data.put_u8(0x04); // message packet type
            data.extend_from_slice(&bin);
        }
        packet => {
            let packet: String = packet.into();
            let len = itoa.format(packet.len());

            data.reserve(1 + len.len() + 1 + packet.len());

            data.put_u8(0x0); // 0 = string
            for digit in len.bytes() {
                data.put_u8(digit - b'0');
            }
            data.put_u8(BINARY_PACKET_SEPARATOR_V3);
            data.extend_from_slice(packet.as_bytes());
        }
    };
}

/// Encode one packet into a *string* payload according to the
/// [engine.io v3 protocol](https://github.com/socketio/engine.io-protocol/tree/v3#payload)
///
/// The length prefix counts UTF-16 code units, like the reference javascript servers do.
pub fn v3_string_packet_encoder(packet: Packet, data: &mut BytesMut) {
    let packet = packet.into_v3_string();
    let len = packet.encode_utf16().count();
    let mut itoa = itoa::Buffer::new();
    data.put_slice(itoa.format(len).as_bytes());
    data.put_u8(STRING_PACKET_SEPARATOR_V3);
    data.put_slice(packet.as_bytes());
}

/// Encode multiple packets into a *string* payload according to the
/// [engine.io v3 protocol](https://github.com/socketio/engine.io-protocol/tree/v3#payload)
///
/// An empty payload is encoded as `0:`.
pub fn v3_string_encoder(packets: impl IntoIterator<Item = Packet>) -> Payload {
    #[cfg(feature = "tracing")]
    tracing::trace!("encoding payload with v3 string encoder");
    let mut data = BytesMut::new();
    for packet in packets {
        v3_string_packet_encoder(packet, &mut data);
    }
    if data.is_empty() {
        data.put_slice(b"0:");
    }
    Payload::new(data.freeze(), false)
}

/// Encode multiple packets into a *string* payload if there is no binary packet
/// or into a *binary* payload if there are binary packets
/// according to the [engine.io v3 protocol](https://github.com/socketio/engine.io-protocol/tree/v3#payload)
pub fn v3_binary_encoder(packets: impl IntoIterator<Item = Packet>) -> Payload {
    let packets: Vec<Packet> = packets.into_iter().collect();
    if !packets.iter().any(Packet::is_binary) {
        return v3_string_encoder(packets);
    }

    #[cfg(feature = "tracing")]
    tracing::trace!("encoding payload with v3 binary encoder");
    let mut data = BytesMut::new();
    for packet in packets {
        v3_bin_packet_encoder(packet, &mut data);
    }
    Payload::new(data.freeze(), true)
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;

    #[test]
    fn encode_v4_payload() {
        const PAYLOAD: &str = "4hello€\x1ebAQIDBA==\x1e4hello€";

        let packets = [
            Packet::Message("hello€".into()),
            Packet::Binary(Bytes::from_static(&[1, 2, 3, 4])),
            Packet::Message("hello€".into()),
        ];

        let Payload { data, has_binary } = v4_encoder(packets);
        assert_eq!(data, PAYLOAD.as_bytes());
        assert!(!has_binary);
    }

    #[test]
    fn encode_v4_empty_payload() {
        let Payload { data, .. } = v4_encoder([]);
        assert!(data.is_empty());
    }

    #[test]
    fn encode_v3b64_payload() {
        const PAYLOAD: &str = "7:4hello€10:b4AQIDBA==7:4hello€";
        let packets = [
            Packet::Message("hello€".into()),
            Packet::Binary(Bytes::from_static(&[1, 2, 3, 4])),
            Packet::Message("hello€".into()),
        ];

        let Payload { data, has_binary } = v3_string_encoder(packets);
        assert_eq!(data, PAYLOAD.as_bytes());
        assert!(!has_binary);
    }

    #[test]
    fn encode_v3_utf16_length() {
        // '😀' is one char but two utf16 code units
        let Payload { data, .. } = v3_string_encoder([Packet::Message("😀".into())]);
        assert_eq!(data, "3:4😀".as_bytes());
    }

    #[test]
    fn encode_v3_empty_payload() {
        let Payload { data, .. } = v3_string_encoder([]);
        assert_eq!(data, "0:".as_bytes());
        let Payload { data, has_binary } = v3_binary_encoder([]);
        assert_eq!(data, "0:".as_bytes());
        assert!(!has_binary);
    }

    #[test]
    fn encode_v3binary_payload() {
        const PAYLOAD: [u8; 20] = [
            0, 9, 255, 52, 104, 101, 108, 108, 111, 226, 130, 172, 1, 5, 255, 4, 1, 2, 3, 4,
        ];

        let packets = [
            Packet::Message("hello€".into()),
            Packet::Binary(Bytes::from_static(&[1, 2, 3, 4])),
        ];

        let Payload { data, has_binary } = v3_binary_encoder(packets);
        assert_eq!(*data, PAYLOAD);
        assert!(has_binary);
    }

    #[test]
    fn encode_v3binary_without_binary_packets() {
        let packets = [Packet::Message("hello€".into()), Packet::Ping];
        let Payload { data, has_binary } = v3_binary_encoder(packets);
        assert_eq!(data, "7:4hello€1:2".as_bytes());
        assert!(!has_binary);
    }
}
