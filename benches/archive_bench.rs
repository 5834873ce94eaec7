//! Criterion benchmark untuk archive, framing, dan packet
//!
//! Run dengan: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use kurir::core::{PayloadBuffer, Reader, Writer};
use kurir::protocol::{FrameReader, Message, ReadEvent};
use kurir::rpc::RpcPacket;

fn bench_archive(c: &mut Criterion) {
    let mut group = c.benchmark_group("archive");
    group.throughput(Throughput::Elements(1));

    let args = (42i32, String::from("alice"), 3.5f64, true);

    group.bench_function("serialize_tuple", |b| {
        let mut buf = [0u8; 256];
        b.iter(|| {
            let mut writer = Writer::new(&mut buf);
            black_box(writer.serialize(black_box(&args)).unwrap());
        });
    });

    let mut buf = [0u8; 256];
    let len = Writer::new(&mut buf).serialize(&args).unwrap();
    group.bench_function("deserialize_tuple", |b| {
        b.iter(|| {
            let mut reader = Reader::new(black_box(&buf[..len]));
            let value: (i32, String, f64, bool) = reader.deserialize().unwrap();
            black_box(value);
        });
    });

    group.bench_function("payload_from_args", |b| {
        b.iter(|| black_box(PayloadBuffer::from_args(black_box(&args)).unwrap()));
    });

    group.finish();
}

fn bench_framing(c: &mut Criterion) {
    let mut group = c.benchmark_group("framing");

    for size in [0usize, 64, 1024, 16 * 1024] {
        let payload = vec![0xABu8; size];
        group.throughput(Throughput::Bytes(size as u64));

        group.bench_with_input(BenchmarkId::new("from_payload", size), &payload, |b, p| {
            b.iter(|| black_box(Message::from_payload(1, black_box(p)).unwrap()));
        });

        // 64 frame berurutan dalam satu buffer
        let mut wire = Vec::new();
        for _ in 0..64 {
            wire.extend_from_slice(Message::from_payload(1, &payload).unwrap().as_bytes());
        }
        group.bench_with_input(BenchmarkId::new("read_64_frames", size), &wire, |b, w| {
            b.iter(|| {
                let mut reader = FrameReader::new();
                let mut src = w.as_slice();
                let mut count = 0;
                while let ReadEvent::Message(msg) = reader.poll_read(&mut src).unwrap() {
                    black_box(msg);
                    count += 1;
                }
                assert_eq!(count, 64);
            });
        });
    }

    group.finish();
}

fn bench_packet(c: &mut Criterion) {
    let mut group = c.benchmark_group("packet");
    group.throughput(Throughput::Elements(1));

    let payload = PayloadBuffer::from_args(&(3.0f64,)).unwrap();
    let packet = RpcPacket::call(0, 4, 1, payload);
    let message = packet.to_message().unwrap();

    group.bench_function("to_message", |b| {
        b.iter(|| black_box(black_box(&packet).to_message().unwrap()));
    });

    group.bench_function("from_message", |b| {
        b.iter(|| black_box(RpcPacket::from_message(black_box(&message)).unwrap()));
    });

    group.finish();
}

criterion_group!(benches, bench_archive, bench_framing, bench_packet);
criterion_main!(benches);
