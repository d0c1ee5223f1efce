use bytes::Bytes;
use criterion::{BatchSize, Criterion, black_box, criterion_group, criterion_main};
use engineioxide_core::{Codec, OpenPacket, Packet, ProtocolVersion};

fn criterion_benchmark(c: &mut Criterion) {
    for protocol in [ProtocolVersion::V3, ProtocolVersion::V4] {
        let codec = protocol.codec();
        let mut group = c.benchmark_group(format!("engineio_packet/encode/v{protocol}"));
        group.bench_function("Encode packet open", |b| {
            let packet = Packet::Open(OpenPacket::default());
            b.iter_batched(
                || packet.clone(),
                |p| codec.encode_packet(p, true),
                BatchSize::SmallInput,
            )
        });
        group.bench_function("Encode packet ping/pong upgrade", |b| {
            b.iter_batched(
                || Packet::PingUpgrade,
                |p| codec.encode_packet(p, true),
                BatchSize::SmallInput,
            )
        });
        group.bench_function("Encode packet message", |b| {
            let packet = Packet::Message(black_box("Hello").into());
            b.iter_batched(
                || packet.clone(),
                |p| codec.encode_packet(p, true),
                BatchSize::SmallInput,
            )
        });
        group.bench_function("Encode packet binary", |b| {
            const BYTES: Bytes = Bytes::from_static(&[0x00, 0x01, 0x02, 0x03, 0x04, 0x05]);
            b.iter_batched(
                || Packet::Binary(BYTES),
                |p| codec.encode_packet(p, true),
                BatchSize::SmallInput,
            )
        });
        group.bench_function("Encode packet binary b64", |b| {
            const BYTES: Bytes = Bytes::from_static(&[0x00, 0x01, 0x02, 0x03, 0x04, 0x05]);
            b.iter_batched(
                || Packet::Binary(BYTES),
                |p| codec.encode_packet(p, false),
                BatchSize::SmallInput,
            )
        });
        group.finish();
    }
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
