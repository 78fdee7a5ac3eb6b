use criterion::{black_box, criterion_group, criterion_main, Criterion};

use dot11_link::protocol::{codec, FrameType};
use dot11_link::MacAddr;

fn bench_encode(c: &mut Criterion) {
    let payload = vec![0xA5u8; 1024];
    c.bench_function("encode 1KiB data frame", |b| {
        b.iter(|| {
            codec::encode(
                black_box(MacAddr(1)),
                black_box(MacAddr(2)),
                black_box(&payload),
                FrameType::Data,
                black_box(17),
                false,
            )
        })
    });
}

fn bench_verify(c: &mut Criterion) {
    let frame = codec::encode(MacAddr(1), MacAddr(2), &[0x5Au8; 1024], FrameType::Data, 17, false)
        .expect("payload fits in a frame");
    c.bench_function("verify 1KiB data frame", |b| {
        b.iter(|| codec::verify_checksum(black_box(&frame)))
    });

    c.bench_function("mark retry 1KiB data frame", |b| {
        b.iter(|| codec::mark_retry(black_box(&frame)))
    });
}

criterion_group!(benches, bench_encode, bench_verify);
criterion_main!(benches);
