//! The [`Codec`] maps [`Packet`]s to wire fragments and payloads for one protocol version.
//!
//! It is selected once per connection with [`ProtocolVersion::codec`].

use std::{fmt, ops::ControlFlow};

use bytes::{BufMut, Bytes, BytesMut};

use crate::{
    Packet, PacketParseError, ProtocolVersion, Str,
    payload::{Payload, decoder, encoder},
};

/// A single encoded packet, as sent in a websocket frame or a webtransport message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fragment {
    /// A text frame
    Text(Str),
    /// A binary frame
    Binary(Bytes),
}

/// How packets are framed into http long-polling payloads
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Framing {
    /// `<length>:<packet>` records (engine.io v3)
    LengthPrefixed,
    /// Packets separated by `\x1e` (engine.io v4)
    RecordSeparated,
}

/// Which side sends the heartbeat pings
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Heartbeat {
    /// The client pings every `pingInterval` and expects a pong within `pingTimeout` (engine.io v3)
    ClientPing,
    /// The server pings every `pingInterval` and the client answers (engine.io v4)
    ServerPing,
}

/// Serialize and deserialize packets and payloads for a given protocol version.
pub trait Codec: fmt::Debug + Send + Sync + 'static {
    /// The protocol version implemented by this codec
    fn protocol(&self) -> ProtocolVersion;

    /// The payload framing used by this codec
    fn framing(&self) -> Framing;

    /// The heartbeat direction used by this codec
    fn heartbeat(&self) -> Heartbeat;

    /// Encode a packet into a fragment.
    /// Binary packets are base64 encoded with a leading marker if `supports_binary` is false.
    fn encode_packet(&self, packet: Packet, supports_binary: bool) -> Fragment;

    /// Decode a fragment into a packet.
    fn decode_packet(&self, fragment: Fragment) -> Result<Packet, PacketParseError>;

    /// Encode packets into a single payload.
    fn encode_payload(&self, packets: Vec<Packet>, supports_binary: bool) -> Payload;

    /// Decode a payload, `on_packet` is called once per packet in order
    /// and can stop the decoding by returning [`ControlFlow::Break`].
    fn decode_payload(
        &self,
        payload: Payload,
        on_packet: &mut dyn FnMut(Packet) -> ControlFlow<()>,
    ) -> Result<(), PacketParseError>;
}

impl ProtocolVersion {
    /// Get the codec implementing this protocol version
    pub fn codec(self) -> &'static dyn Codec {
        match self {
            ProtocolVersion::V3 => &V3Codec,
            ProtocolVersion::V4 => &V4Codec,
        }
    }
}

/// The engine.io v3 codec
#[derive(Debug, Clone, Copy, Default)]
pub struct V3Codec;

impl Codec for V3Codec {
    fn protocol(&self) -> ProtocolVersion {
        ProtocolVersion::V3
    }
    fn framing(&self) -> Framing {
        Framing::LengthPrefixed
    }
    fn heartbeat(&self) -> Heartbeat {
        Heartbeat::ClientPing
    }

    fn encode_packet(&self, packet: Packet, supports_binary: bool) -> Fragment {
        match packet {
            // v3 binary frames carry the packet type as the first byte
            Packet::Binary(data) if supports_binary => {
                let mut buf = BytesMut::with_capacity(data.len() + 1);
                buf.put_u8(0x04);
                buf.put_slice(&data);
                Fragment::Binary(buf.freeze())
            }
            packet => Fragment::Text(packet.into_v3_string().into()),
        }
    }

    fn decode_packet(&self, fragment: Fragment) -> Result<Packet, PacketParseError> {
        match fragment {
            Fragment::Text(data) => Packet::try_from_v3(data),
            Fragment::Binary(data) => match data.first() {
                Some(4) => Ok(Packet::Binary(data.slice(1..))),
                Some(c) => Err(PacketParseError::InvalidPacketType(Some(*c as char))),
                None => Err(PacketParseError::InvalidPacketType(None)),
            },
        }
    }

    fn encode_payload(&self, packets: Vec<Packet>, supports_binary: bool) -> Payload {
        if supports_binary {
            encoder::v3_binary_encoder(packets)
        } else {
            encoder::v3_string_encoder(packets)
        }
    }

    fn decode_payload(
        &self,
        payload: Payload,
        on_packet: &mut dyn FnMut(Packet) -> ControlFlow<()>,
    ) -> Result<(), PacketParseError> {
        #[cfg(feature = "tracing")]
        tracing::trace!(len = payload.data.len(), binary = payload.has_binary, "decoding v3 payload");
        if payload.has_binary {
            decoder::v3_binary_decoder(payload.data, on_packet)
        } else {
            decoder::v3_string_decoder(Str::try_from(payload.data)?, on_packet)
        }
    }
}

/// The engine.io v4 codec
#[derive(Debug, Clone, Copy, Default)]
pub struct V4Codec;

impl Codec for V4Codec {
    fn protocol(&self) -> ProtocolVersion {
        ProtocolVersion::V4
    }
    fn framing(&self) -> Framing {
        Framing::RecordSeparated
    }
    fn heartbeat(&self) -> Heartbeat {
        Heartbeat::ServerPing
    }

    fn encode_packet(&self, packet: Packet, supports_binary: bool) -> Fragment {
        match packet {
            Packet::Binary(data) if supports_binary => Fragment::Binary(data),
            packet => Fragment::Text(String::from(packet).into()),
        }
    }

    fn decode_packet(&self, fragment: Fragment) -> Result<Packet, PacketParseError> {
        match fragment {
            Fragment::Text(data) => Packet::try_from(data),
            Fragment::Binary(data) => Ok(Packet::Binary(data)),
        }
    }

    /// Http long-polling payloads are always text in engine.io v4.
    fn encode_payload(&self, packets: Vec<Packet>, _supports_binary: bool) -> Payload {
        encoder::v4_encoder(packets)
    }

    fn decode_payload(
        &self,
        payload: Payload,
        on_packet: &mut dyn FnMut(Packet) -> ControlFlow<()>,
    ) -> Result<(), PacketParseError> {
        #[cfg(feature = "tracing")]
        tracing::trace!(len = payload.data.len(), "decoding v4 payload");
        decoder::v4_decoder(Str::try_from(payload.data)?, on_packet)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::OpenPacket;

    fn decode_all(codec: &dyn Codec, payload: Payload) -> Vec<Packet> {
        let mut packets = Vec::new();
        codec
            .decode_payload(payload, &mut |p| {
                packets.push(p);
                ControlFlow::Continue(())
            })
            .unwrap();
        packets
    }

    fn sample() -> Vec<Packet> {
        vec![
            Packet::Open(OpenPacket::default()),
            Packet::Message("hello€".into()),
            Packet::Binary(Bytes::from_static(&[1, 2, 3, 4])),
            Packet::Ping,
            Packet::Noop,
            Packet::Message("".into()),
            Packet::Close,
        ]
    }

    #[test]
    fn select_codec() {
        assert_eq!(ProtocolVersion::V3.codec().protocol(), ProtocolVersion::V3);
        assert_eq!(ProtocolVersion::V4.codec().framing(), Framing::RecordSeparated);
        assert_eq!(ProtocolVersion::V3.codec().heartbeat(), Heartbeat::ClientPing);
    }

    #[test]
    fn v3_binary_fragment() {
        let bin = Packet::Binary(Bytes::from_static(&[1, 2]));
        let frag = V3Codec.encode_packet(bin.clone(), true);
        assert_eq!(frag, Fragment::Binary(Bytes::from_static(&[4, 1, 2])));
        assert_eq!(V3Codec.decode_packet(frag).unwrap(), bin);

        let frag = V3Codec.encode_packet(bin.clone(), false);
        assert_eq!(frag, Fragment::Text("b4AQI=".into()));
        assert_eq!(V3Codec.decode_packet(frag).unwrap(), bin);
    }

    #[test]
    fn v4_binary_fragment() {
        let bin = Packet::Binary(Bytes::from_static(&[1, 2]));
        let frag = V4Codec.encode_packet(bin.clone(), true);
        assert_eq!(frag, Fragment::Binary(Bytes::from_static(&[1, 2])));
        let frag = V4Codec.encode_packet(bin.clone(), false);
        assert_eq!(frag, Fragment::Text("bAQI=".into()));
        assert_eq!(V4Codec.decode_packet(frag).unwrap(), bin);
    }

    #[test]
    fn v3_invalid_binary_fragment() {
        let err = V3Codec
            .decode_packet(Fragment::Binary(Bytes::from_static(&[2, 1])))
            .unwrap_err();
        assert!(matches!(err, PacketParseError::InvalidPacketType(Some('\u{2}'))));
    }

    #[test]
    fn payload_roundtrip() {
        for codec in [ProtocolVersion::V3.codec(), ProtocolVersion::V4.codec()] {
            for supports_binary in [true, false] {
                let payload = codec.encode_payload(sample(), supports_binary);
                assert_eq!(decode_all(codec, payload), sample(), "{codec:?}");
            }
        }
    }

    #[test]
    fn empty_payload_roundtrip() {
        for codec in [ProtocolVersion::V3.codec(), ProtocolVersion::V4.codec()] {
            let payload = codec.encode_payload(vec![], false);
            assert!(decode_all(codec, payload).is_empty());
        }
    }
}
