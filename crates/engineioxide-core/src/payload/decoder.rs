//! ## Decodes a payload into packets
//!
//! There is three decoders:
//! - v4_decoder: Decodes the payload according to the [engine.io v4 protocol](https://socket.io/fr/docs/v4/engine-io-protocol/#http-long-polling-1)
//! - v3_string_decoder: Decodes a string payload according to the [engine.io v3 protocol](https://github.com/socketio/engine.io-protocol/tree/v3#payload)
//! - v3_binary_decoder: Decodes a binary payload according to the [engine.io v3 protocol](https://github.com/socketio/engine.io-protocol/tree/v3#payload)
//!
//! Every decoder calls `on_packet` once per packet, in order. Returning [`ControlFlow::Break`]
//! stops the decoding. Packets are sliced from the payload without copying.

use std::ops::ControlFlow;

use bytes::Bytes;

use crate::{
    Packet, PacketParseError, Str,
    payload::{
        BINARY_PACKET_SEPARATOR_V3, MAX_BINARY_LEN_DIGITS_V3, PACKET_SEPARATOR_V4,
        STRING_PACKET_SEPARATOR_V3,
    },
};

/// Decode a v4 payload. An empty payload contains no packet.
pub fn v4_decoder(
    data: Str,
    on_packet: &mut dyn FnMut(Packet) -> ControlFlow<()>,
) -> Result<(), PacketParseError> {
    if data.is_empty() {
        return Ok(());
    }
    let mut start = 0;
    loop {
        let end = memchr::memchr(PACKET_SEPARATOR_V4, &data.as_bytes()[start..])
            .map(|i| start + i)
            .unwrap_or(data.len());
        let packet = Packet::try_from(data.slice(start..end))?;
        if on_packet(packet).is_break() || end == data.len() {
            return Ok(());
        }
        start = end + 1;
    }
}

/// Decode a v3 string payload: `<length>:<packet>` repeated.
///
/// The length counts UTF-16 code units. Zero length packets are skipped.
pub fn v3_string_decoder(
    data: Str,
    on_packet: &mut dyn FnMut(Packet) -> ControlFlow<()>,
) -> Result<(), PacketParseError> {
    let mut i = 0;
    while i < data.len() {
        let sep = memchr::memchr(STRING_PACKET_SEPARATOR_V3, &data.as_bytes()[i..])
            .map(|sep| i + sep)
            .ok_or(PacketParseError::InvalidPacketLen)?;
        let len_str = &data[i..sep];
        if len_str.is_empty() || !len_str.bytes().all(|c| c.is_ascii_digit()) {
            return Err(PacketParseError::InvalidPacketLen);
        }
        let len: usize = len_str
            .parse()
            .map_err(|_| PacketParseError::InvalidPacketLen)?;

        let start = sep + 1;
        let end = utf16_offset(&data[start..], len)
            .map(|end| start + end)
            .ok_or(PacketParseError::InvalidPacketLen)?;

        if end > start {
            let packet = Packet::try_from_v3(data.slice(start..end))?;
            if on_packet(packet).is_break() {
                return Ok(());
            }
        }
        i = end;
    }
    Ok(())
}

/// Decode a v3 binary payload: records made of a type byte (0 = string, 1 = binary),
/// the length as one byte per decimal digit, a `0xFF` separator and the data.
pub fn v3_binary_decoder(
    data: Bytes,
    on_packet: &mut dyn FnMut(Packet) -> ControlFlow<()>,
) -> Result<(), PacketParseError> {
    let mut i = 0;
    while i < data.len() {
        let is_binary = match data[i] {
            0 => false,
            1 => true,
            c => return Err(PacketParseError::InvalidPacketType(Some(c as char))),
        };
        i += 1;

        let mut len: usize = 0;
        let mut digits = 0;
        loop {
            match data.get(i) {
                Some(&BINARY_PACKET_SEPARATOR_V3) if digits > 0 => break,
                Some(&d) if d <= 9 && digits < MAX_BINARY_LEN_DIGITS_V3 => {
                    len = len
                        .checked_mul(10)
                        .and_then(|len| len.checked_add(d as usize))
                        .ok_or(PacketParseError::InvalidPacketLen)?;
                    digits += 1;
                    i += 1;
                }
                _ => return Err(PacketParseError::InvalidPacketLen),
            }
        }
        i += 1;

        let end = i
            .checked_add(len)
            .filter(|end| *end <= data.len())
            .ok_or(PacketParseError::InvalidPacketLen)?;
        let record = data.slice(i..end);
        i = end;

        let packet = if is_binary {
            match record.first() {
                Some(4) => Packet::Binary(record.slice(1..)),
                Some(c) => return Err(PacketParseError::InvalidPacketType(Some(*c as char))),
                None => return Err(PacketParseError::InvalidPacketLen),
            }
        } else {
            Packet::try_from_v3(Str::try_from(record)?)?
        };
        if on_packet(packet).is_break() {
            return Ok(());
        }
    }
    Ok(())
}

/// The byte offset after `units` UTF-16 code units of `s`.
/// Returns `None` if `s` is too short or if the offset splits a surrogate pair.
fn utf16_offset(s: &str, units: usize) -> Option<usize> {
    let mut count = 0;
    for (i, c) in s.char_indices() {
        if count == units {
            return Some(i);
        }
        count += c.len_utf16();
        if count > units {
            return None;
        }
    }
    (count == units).then_some(s.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(
        decoder: impl FnOnce(
            &mut dyn FnMut(Packet) -> ControlFlow<()>,
        ) -> Result<(), PacketParseError>,
    ) -> Result<Vec<Packet>, PacketParseError> {
        let mut packets = Vec::new();
        decoder(&mut |p| {
            packets.push(p);
            ControlFlow::Continue(())
        })?;
        Ok(packets)
    }

    #[test]
    fn test_payload_v4() {
        let data = Str::from("4foo\x1e4€f\x1e4f\x1ebAQID");
        let packets = collect(|f| v4_decoder(data, f)).unwrap();
        assert_eq!(
            packets,
            [
                Packet::Message("foo".into()),
                Packet::Message("€f".into()),
                Packet::Message("f".into()),
                Packet::Binary(vec![1, 2, 3].into()),
            ]
        );
    }

    #[test]
    fn test_payload_v4_long_packets() {
        let msgs: Vec<String> = (0..20).map(|i| "x".repeat(i * 37)).collect();
        let data = msgs
            .iter()
            .map(|m| format!("4{m}"))
            .collect::<Vec<_>>()
            .join("\x1e");
        let packets = collect(|f| v4_decoder(Str::from(data), f)).unwrap();
        let expected: Vec<Packet> = msgs
            .into_iter()
            .map(|m| Packet::Message(m.into()))
            .collect();
        assert_eq!(packets, expected);
    }

    #[test]
    fn test_payload_v3_long_len() {
        let msg = "é".repeat(300);
        let data = Str::from(format!("301:4{msg}1:2"));
        let packets = collect(|f| v3_string_decoder(data, f)).unwrap();
        assert_eq!(packets, [Packet::Message(msg.into()), Packet::Ping]);
    }

    #[test]
    fn test_payload_v4_empty() {
        let packets = collect(|f| v4_decoder(Str::default(), f)).unwrap();
        assert!(packets.is_empty());
    }

    #[test]
    fn test_payload_v4_invalid_packet() {
        let err = collect(|f| v4_decoder(Str::from("4foo\x1e\x1e4f"), f)).unwrap_err();
        assert!(matches!(err, PacketParseError::InvalidPacketType(None)));
    }

    #[test]
    fn test_payload_v3() {
        let data = Str::from("4:4foo3:4€f10:4faaaaaaaa0:6:b4AQID");
        let packets = collect(|f| v3_string_decoder(data, f)).unwrap();
        assert_eq!(
            packets,
            [
                Packet::Message("foo".into()),
                Packet::Message("€f".into()),
                Packet::Message("faaaaaaaa".into()),
                Packet::Binary(vec![1, 2, 3].into()),
            ]
        );
    }

    #[test]
    fn test_payload_v3_utf16() {
        let data = Str::from("3:4😀1:2");
        let packets = collect(|f| v3_string_decoder(data, f)).unwrap();
        assert_eq!(packets, [Packet::Message("😀".into()), Packet::Ping]);

        // A length that splits a surrogate pair is invalid
        let err = collect(|f| v3_string_decoder(Str::from("2:4😀"), f)).unwrap_err();
        assert!(matches!(err, PacketParseError::InvalidPacketLen));
    }

    #[test]
    fn test_payload_v3_invalid_len() {
        for data in ["4:4fo", "a:4foo", ":4foo", "4:4foo3", "-1:4"] {
            let err = collect(|f| v3_string_decoder(Str::from(data), f)).unwrap_err();
            assert!(
                matches!(err, PacketParseError::InvalidPacketLen),
                "{data}: {err:?}"
            );
        }
    }

    #[test]
    fn test_payload_v3_stop() {
        let data = Str::from("1:11:4");
        let mut packets = Vec::new();
        v3_string_decoder(data, &mut |p| {
            let is_close = p == Packet::Close;
            packets.push(p);
            if is_close {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        })
        .unwrap();
        assert_eq!(packets, [Packet::Close]);
    }

    #[test]
    fn test_payload_v3_binary() {
        const PAYLOAD: [u8; 20] = [
            0, 9, 255, 52, 104, 101, 108, 108, 111, 226, 130, 172, 1, 5, 255, 4, 1, 2, 3, 4,
        ];
        let packets =
            collect(|f| v3_binary_decoder(Bytes::from_static(&PAYLOAD), f)).unwrap();
        assert_eq!(
            packets,
            [
                Packet::Message("hello€".into()),
                Packet::Binary(vec![1, 2, 3, 4].into()),
            ]
        );
    }

    #[test]
    fn test_payload_v3_binary_invalid() {
        let cases: [&'static [u8]; 5] = [
            &[2, 1, 255, 52],         // invalid record type
            &[0, 255, 52],            // no length digits
            &[0, 12, 255, 52],        // not a digit
            &[0, 3, 255, 52],         // truncated record
            &[1, 2, 255, 2, 1],       // binary record which is not a message
        ];
        for data in cases {
            assert!(collect(|f| v3_binary_decoder(Bytes::from_static(data), f)).is_err());
        }
    }

    #[test]
    fn test_payload_v3_binary_too_many_digits() {
        let mut data = vec![0];
        data.extend(std::iter::repeat_n(0, MAX_BINARY_LEN_DIGITS_V3 + 1));
        data.push(255);
        let err = collect(|f| v3_binary_decoder(data.into(), f)).unwrap_err();
        assert!(matches!(err, PacketParseError::InvalidPacketLen));
    }
}
