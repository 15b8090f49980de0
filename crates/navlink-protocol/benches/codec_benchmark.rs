//! Throughput of the checksum and frame decoding hot paths.
//!
//! ```bash
//! cargo bench -p navlink-protocol
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use navlink_protocol::{
    crc16_ccitt, crc24q, crc32_ieee_variant, encode_uart, FrameDecoder, PacketType, UartDecoder,
};

fn bench_crc(c: &mut Criterion) {
    let mut group = c.benchmark_group("crc");
    for size in [64usize, 256, 4096] {
        let data: Vec<u8> = (0..size).map(|i| i as u8).collect();
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::new("crc16_ccitt", size), &data, |b, d| {
            b.iter(|| crc16_ccitt(black_box(d)))
        });
        group.bench_with_input(BenchmarkId::new("crc24q", size), &data, |b, d| {
            b.iter(|| crc24q(black_box(d)))
        });
        group.bench_with_input(BenchmarkId::new("crc32_ieee_variant", size), &data, |b, d| {
            b.iter(|| crc32_ieee_variant(black_box(d)))
        });
    }
    group.finish();
}

fn bench_uart_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("uart_decode");
    let telemetry = PacketType::new(*b"s1");
    for payload_len in [16usize, 64, 255] {
        let payload = vec![0xA5u8; payload_len];
        let mut stream = Vec::new();
        for _ in 0..100 {
            if let Ok(frame) = encode_uart(telemetry, &payload) {
                stream.extend_from_slice(&frame);
            }
        }
        group.throughput(Throughput::Bytes(stream.len() as u64));
        group.bench_with_input(
            BenchmarkId::new("100_frames", payload_len),
            &stream,
            |b, s| {
                b.iter(|| {
                    let mut decoder = UartDecoder::new();
                    let mut out = Vec::with_capacity(100);
                    decoder.feed(black_box(s), &mut out);
                    black_box(out.len())
                })
            },
        );
    }
    group.finish();
}

criterion_group!(benches, bench_crc, bench_uart_decode);
criterion_main!(benches);
