use std::ops::ControlFlow;

use bytes::Bytes;
use engineioxide_core::{Codec, OpenPacket, Packet, ProtocolVersion};
use proptest::prelude::*;

fn open_packet() -> impl Strategy<Value = OpenPacket> {
    (
        "[A-Za-z0-9_-]{1,20}",
        proptest::collection::vec(prop_oneof!["websocket", "webtransport"], 0..2),
        any::<u32>(),
        any::<u32>(),
        any::<u32>(),
    )
        .prop_map(|(sid, upgrades, interval, timeout, max_payload)| OpenPacket {
            sid: sid.parse().unwrap(),
            upgrades: upgrades.into_iter().map(String::from).collect(),
            ping_interval: interval.into(),
            ping_timeout: timeout.into(),
            max_payload: max_payload.into(),
        })
}

fn packet() -> impl Strategy<Value = Packet> {
    prop_oneof![
        open_packet().prop_map(Packet::Open),
        Just(Packet::Close),
        Just(Packet::Ping),
        Just(Packet::Pong),
        Just(Packet::PingUpgrade),
        Just(Packet::PongUpgrade),
        Just(Packet::Upgrade),
        Just(Packet::Noop),
        // The v4 record separator cannot appear inside a text packet
        "[^\\x1e]*".prop_map(|s| Packet::Message(s.into())),
        proptest::collection::vec(any::<u8>(), 0..64)
            .prop_map(|data| Packet::Binary(Bytes::from(data))),
    ]
}

fn protocol() -> impl Strategy<Value = ProtocolVersion> {
    prop_oneof![Just(ProtocolVersion::V3), Just(ProtocolVersion::V4)]
}

fn decode_all(codec: &dyn Codec, payload: engineioxide_core::payload::Payload) -> Vec<Packet> {
    let mut packets = Vec::new();
    codec
        .decode_payload(payload, &mut |p| {
            packets.push(p);
            ControlFlow::Continue(())
        })
        .unwrap();
    packets
}

proptest! {
    #[test]
    fn packet_roundtrip(p in packet(), protocol in protocol(), supports_binary in any::<bool>()) {
        let codec = protocol.codec();
        let fragment = codec.encode_packet(p.clone(), supports_binary);
        prop_assert_eq!(codec.decode_packet(fragment).unwrap(), p);
    }

    #[test]
    fn payload_roundtrip(
        packets in proptest::collection::vec(packet(), 0..16),
        protocol in protocol(),
        supports_binary in any::<bool>(),
    ) {
        let codec = protocol.codec();
        let payload = codec.encode_payload(packets.clone(), supports_binary);
        prop_assert_eq!(decode_all(codec, payload), packets);
    }

    #[test]
    fn payload_decode_never_panics(data in proptest::collection::vec(any::<u8>(), 0..128), has_binary in any::<bool>()) {
        for codec in [ProtocolVersion::V3.codec(), ProtocolVersion::V4.codec()] {
            let payload = engineioxide_core::payload::Payload::new(data.clone(), has_binary);
            let _ = codec.decode_payload(payload, &mut |_| ControlFlow::Continue(()));
        }
    }
}
